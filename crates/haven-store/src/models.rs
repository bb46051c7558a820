//! Domain model structs persisted in the SQLite database.
//!
//! Records and messages serialize in the camelCase wire form the HTTP layer
//! hands straight back to clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use haven_shared::{ChatRole, Kind, Payload, UserId};

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// A stored entity of some [`Kind`], scoped to one user.
///
/// The payload is flattened into the serialized form, giving
/// `{id, userId, createdAt, updatedAt?, ...payload}`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Unique within the owner's partition for this kind.
    pub id: String,
    pub user_id: UserId,
    #[serde(skip)]
    pub kind: Kind,
    pub created_at: DateTime<Utc>,
    /// Present for kinds that track updates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub payload: Payload,
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// One message in a topic transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub text: String,
    pub role: ChatRole,
    pub created_at: DateTime<Utc>,
}

/// A message about to be appended; missing `id`/`created_at` are stamped by
/// the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChatMessage {
    pub id: Option<String>,
    pub text: String,
    pub role: ChatRole,
    pub created_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// An email/password account. The password hash is deliberately not part of
/// this struct; see [`Database::find_credentials`](crate::Database::find_credentials).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Everything kept for a user, one field per kind, used to hydrate clients.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub mood_check_ins: Vec<Record>,
    pub journal_entries: Vec<Record>,
    pub stress_kit: Payload,
    pub stress_history: Vec<Record>,
    pub sleep_entries: Vec<Record>,
    pub mindfulness_history: Vec<Record>,
    pub total_mindful_minutes_today: u64,
    pub profile: Payload,
    pub assessment: Payload,
    pub subscription: Option<Payload>,
}
