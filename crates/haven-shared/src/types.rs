use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::ANONYMOUS_USER_ID;
use crate::error::ValidationError;

// Opaque, never-empty caller identity; the scoping key for every query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    pub fn new(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyUserId);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn anonymous() -> Self {
        Self(ANONYMOUS_USER_ID.to_string())
    }

    pub fn is_anonymous(&self) -> bool {
        self.0 == ANONYMOUS_USER_ID
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for UserId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

/// Record kinds and the identity/ordering rules attached to each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Mood,
    Journal,
    StressKit,
    StressHistory,
    Sleep,
    Mindfulness,
    Profile,
    Assessment,
    Subscription,
}

impl Kind {
    pub const ALL: [Kind; 9] = [
        Kind::Mood,
        Kind::Journal,
        Kind::StressKit,
        Kind::StressHistory,
        Kind::Sleep,
        Kind::Mindfulness,
        Kind::Profile,
        Kind::Assessment,
        Kind::Subscription,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Mood => "mood",
            Kind::Journal => "journal",
            Kind::StressKit => "stress_kit",
            Kind::StressHistory => "stress_history",
            Kind::Sleep => "sleep",
            Kind::Mindfulness => "mindfulness",
            Kind::Profile => "profile",
            Kind::Assessment => "assessment",
            Kind::Subscription => "subscription",
        }
    }

    /// At most one record per user.
    pub fn is_singleton(self) -> bool {
        matches!(
            self,
            Kind::StressKit | Kind::Profile | Kind::Assessment | Kind::Subscription
        )
    }

    /// Whether records of this kind carry an `updatedAt` stamp.
    pub fn tracks_updates(self) -> bool {
        matches!(self, Kind::Journal) || self.is_singleton()
    }

    pub fn supports_delete(self) -> bool {
        matches!(self, Kind::Mood | Kind::Journal | Kind::Sleep)
    }

    pub fn supports_upsert_by_id(self) -> bool {
        matches!(self, Kind::Journal)
    }

    /// Payload field whose value orders the list, newest first. `None` means
    /// the list is ordered by `createdAt`.
    pub fn order_field(self) -> Option<&'static str> {
        match self {
            Kind::Sleep | Kind::Mindfulness | Kind::StressHistory => Some("date"),
            _ => None,
        }
    }

    /// Older clients' name for the ordering date, read when `date` is absent.
    pub fn legacy_order_field(self) -> Option<&'static str> {
        match self {
            Kind::Sleep => Some("createdAtISO"),
            Kind::Mindfulness => Some("dateISO"),
            _ => None,
        }
    }

    /// Whether the server stamps the ordering date itself, ignoring the client.
    pub fn stamps_order_field(self) -> bool {
        matches!(self, Kind::StressHistory)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Kind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownKind(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }

    /// Legacy clients send `sender`; anything other than "user" is the assistant.
    pub fn from_sender(sender: &str) -> Self {
        if sender.eq_ignore_ascii_case("user") {
            ChatRole::User
        } else {
            ChatRole::Assistant
        }
    }
}

impl FromStr for ChatRole {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(ChatRole::User),
            "assistant" => Ok(ChatRole::Assistant),
            other => Err(ValidationError::invalid(
                "role",
                format!("expected \"user\" or \"assistant\", got {other:?}"),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Render a timestamp the way it is stored: RFC 3339, UTC, microseconds.
///
/// Fixed width means lexical order equals chronological order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
}

/// Current time truncated to storage precision.
pub fn now_utc() -> DateTime<Utc> {
    truncate_micros(Utc::now())
}

/// A stamp strictly after `previous`, normally "now".
pub fn stamp_after(previous: &DateTime<Utc>) -> DateTime<Utc> {
    let now = now_utc();
    if now > *previous {
        now
    } else {
        *previous + Duration::microseconds(1)
    }
}

/// Drop sub-microsecond precision so a value survives a storage round trip unchanged.
pub fn truncate_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    let micros = ts.timestamp_micros();
    DateTime::from_timestamp_micros(micros).unwrap_or(ts)
}
