use chrono::NaiveDate;

use haven_shared::wellness::default_payload;
use haven_shared::{Kind, Payload, UserId};

use crate::database::Database;
use crate::error::Result;
use crate::models::Snapshot;

impl Database {
    /// Singleton payload, or the kind's default when never written.
    pub fn singleton_payload_or_default(&self, user: &UserId, kind: Kind) -> Result<Payload> {
        Ok(self
            .get_singleton(user, kind)?
            .map(|record| record.payload)
            .unwrap_or_else(|| default_payload(kind)))
    }

    /// Everything stored for `user`, for hydrating a fresh client.
    pub fn snapshot(&self, user: &UserId, today: NaiveDate) -> Result<Snapshot> {
        Ok(Snapshot {
            mood_check_ins: self.list_records(user, Kind::Mood)?,
            journal_entries: self.list_records(user, Kind::Journal)?,
            stress_kit: self.singleton_payload_or_default(user, Kind::StressKit)?,
            stress_history: self.list_records(user, Kind::StressHistory)?,
            sleep_entries: self.list_records(user, Kind::Sleep)?,
            mindfulness_history: self.list_records(user, Kind::Mindfulness)?,
            total_mindful_minutes_today: self.mindful_minutes_on(user, today)?,
            profile: self.singleton_payload_or_default(user, Kind::Profile)?,
            assessment: self.singleton_payload_or_default(user, Kind::Assessment)?,
            subscription: self
                .get_singleton(user, Kind::Subscription)?
                .map(|record| record.payload),
        })
    }
}
