//! Per-kind payload schemas.
//!
//! Payloads travel and persist as JSON objects. Before anything is written,
//! [`validate`] deserializes the object into the typed schema for its
//! [`Kind`], checks ranges and enums, and serializes it back, so stored
//! payloads are normalized while unknown keys survive untouched.

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::RESERVED_RECORD_KEYS;
use crate::error::ValidationError;
use crate::types::{format_timestamp, parse_timestamp, Kind};

pub type Payload = Map<String, Value>;

// ---------------------------------------------------------------------------
// Schemas
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoodLevel {
    Great,
    Good,
    Okay,
    Low,
    Bad,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoodCheckIn {
    pub mood: MoodLevel,
    pub energy: u8,
    pub stress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Payload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Payload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StressExercise {
    pub id: String,
    pub title: String,
    pub completed: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StressKit {
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default)]
    pub helpful_actions: Vec<String>,
    #[serde(default)]
    pub people: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_check_in: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quick_phrase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub exercises: Vec<StressExercise>,
    #[serde(flatten)]
    pub extra: Payload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StressCompletion {
    pub exercise_id: String,
    pub title: String,
    #[serde(flatten)]
    pub extra: Payload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepEntry {
    pub quality: u8,
    /// Hours slept.
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, rename = "createdAtISO", skip_serializing_if = "Option::is_none")]
    pub created_at_iso: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(flatten)]
    pub extra: Payload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MindfulSession {
    pub minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, rename = "dateISO", skip_serializing_if = "Option::is_none")]
    pub date_iso: Option<String>,
    #[serde(flatten)]
    pub extra: Payload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    Free,
    Trial,
    Monthly,
    Yearly,
    Lifetime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    #[serde(rename = "type")]
    pub tier: SubscriptionTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<String>,
    #[serde(flatten)]
    pub extra: Payload,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Check `value` against the schema for `kind` and return the normalized
/// payload with server-owned keys removed.
pub fn validate(kind: Kind, value: Value) -> Result<Payload, ValidationError> {
    let Value::Object(mut map) = value else {
        return Err(ValidationError::NotAnObject);
    };
    for key in RESERVED_RECORD_KEYS {
        map.remove(key);
    }
    if kind.stamps_order_field() {
        map.remove("date");
    }

    match kind {
        Kind::Mood => {
            let mut entry: MoodCheckIn = parse(kind, map)?;
            check_range("energy", entry.energy, 1, 5)?;
            check_range("stress", entry.stress, 0, 10)?;
            entry.tags = entry.tags.map(dedup_tags);
            render(&entry)
        }
        Kind::Journal => {
            let mut entry: JournalEntry = parse(kind, map)?;
            entry.tags = entry.tags.map(dedup_tags);
            render(&entry)
        }
        Kind::StressKit => {
            let kit: StressKit = parse(kind, map)?;
            if let Some(level) = kit.level {
                check_range("level", level, 0, 10)?;
            }
            if let Some(ref at) = kit.last_check_in {
                parse_date("lastCheckIn", at)?;
            }
            render(&kit)
        }
        Kind::StressHistory => {
            let entry: StressCompletion = parse(kind, map)?;
            if entry.exercise_id.trim().is_empty() {
                return Err(ValidationError::MissingField("exerciseId"));
            }
            render(&entry)
        }
        Kind::Sleep => {
            let entry: SleepEntry = parse(kind, map)?;
            check_range("quality", entry.quality, 1, 5)?;
            if !(0.0..=24.0).contains(&entry.duration) {
                return Err(ValidationError::invalid(
                    "duration",
                    "must be between 0 and 24 hours",
                ));
            }
            if let Some(ref date) = entry.date {
                parse_date("date", date)?;
            }
            if let Some(ref date) = entry.created_at_iso {
                parse_date("createdAtISO", date)?;
            }
            render(&entry)
        }
        Kind::Mindfulness => {
            let entry: MindfulSession = parse(kind, map)?;
            if entry.minutes == 0 {
                return Err(ValidationError::invalid("minutes", "must be positive"));
            }
            if let Some(ref date) = entry.date {
                parse_date("date", date)?;
            }
            if let Some(ref date) = entry.date_iso {
                parse_date("dateISO", date)?;
            }
            render(&entry)
        }
        Kind::Subscription => {
            let sub: Subscription = parse(kind, map)?;
            if let Some(ref expiry) = sub.expiry_date {
                parse_date("expiryDate", expiry)?;
            }
            render(&sub)
        }
        Kind::Profile | Kind::Assessment => Ok(map),
    }
}

/// Value read back for a singleton kind that was never written.
pub fn default_payload(kind: Kind) -> Payload {
    match kind {
        Kind::StressKit => match serde_json::to_value(StressKit::default()) {
            Ok(Value::Object(map)) => map,
            _ => Payload::new(),
        },
        _ => Payload::new(),
    }
}

/// Storage key that orders a record within its kind, newest first.
///
/// Kinds with an ordering field use the client's date when it parses, then
/// the legacy field older clients send, falling back to `created_at`.
pub fn order_key(kind: Kind, payload: &Payload, created_at: &DateTime<Utc>) -> String {
    if kind.stamps_order_field() {
        return format_timestamp(created_at);
    }
    [kind.order_field(), kind.legacy_order_field()]
        .into_iter()
        .flatten()
        .find_map(|field| {
            payload
                .get(field)
                .and_then(Value::as_str)
                .and_then(|raw| parse_date(field, raw).ok())
        })
        .map(|ts| format_timestamp(&ts))
        .unwrap_or_else(|| format_timestamp(created_at))
}

/// Minutes recorded by a mindfulness payload; zero if absent.
pub fn minutes_of(payload: &Payload) -> u64 {
    payload.get("minutes").and_then(Value::as_u64).unwrap_or(0)
}

/// Accepts RFC 3339 timestamps and plain `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_date(field: &'static str, raw: &str) -> Result<DateTime<Utc>, ValidationError> {
    if let Ok(ts) = parse_timestamp(raw) {
        return Ok(ts);
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| ValidationError::invalid(field, format!("not an ISO-8601 date: {raw:?}")))
}

fn parse<T: DeserializeOwned>(kind: Kind, map: Payload) -> Result<T, ValidationError> {
    serde_json::from_value(Value::Object(map)).map_err(|e| ValidationError::Malformed {
        kind: kind.as_str(),
        reason: e.to_string(),
    })
}

fn render<T: Serialize>(value: &T) -> Result<Payload, ValidationError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(ValidationError::NotAnObject),
    }
}

fn check_range(field: &'static str, value: u8, min: u8, max: u8) -> Result<(), ValidationError> {
    if value < min || value > max {
        return Err(ValidationError::invalid(
            field,
            format!("{value} is outside {min}..={max}"),
        ));
    }
    Ok(())
}

fn dedup_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_string();
        if !tag.is_empty() && !seen.contains(&tag) {
            seen.push(tag);
        }
    }
    seen
}
