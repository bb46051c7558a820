//! Per-user CRUD for list kinds (mood, journal, stress history, sleep,
//! mindfulness).
//!
//! Every statement binds the owner's [`UserId`] alongside the kind, and the
//! primary key is `(user_id, kind, id)`, so a row owned by someone else is
//! indistinguishable from one that does not exist.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use uuid::Uuid;

use haven_shared::types::{format_timestamp, now_utc, parse_timestamp, stamp_after};
use haven_shared::wellness::{minutes_of, order_key};
use haven_shared::{Kind, Payload, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Record;

impl Database {
    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// All records of `kind` owned by `user`, in the kind's canonical order
    /// (newest first). Empty when the user has none.
    pub fn list_records(&self, user: &UserId, kind: Kind) -> Result<Vec<Record>> {
        ensure_list_kind(kind, "list")?;

        let mut stmt = self.conn().prepare(
            "SELECT id, payload, created_at, updated_at
             FROM records
             WHERE user_id = ?1 AND kind = ?2
             ORDER BY sort_key DESC, rowid DESC",
        )?;

        let rows = stmt.query_map(params![user.as_str(), kind.as_str()], |row| {
            row_to_record(row, user, kind)
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Fetch one record by id within the caller's partition.
    pub fn get_record(&self, user: &UserId, kind: Kind, id: &str) -> Result<Record> {
        ensure_list_kind(kind, "get")?;

        self.conn()
            .query_row(
                "SELECT id, payload, created_at, updated_at
                 FROM records
                 WHERE user_id = ?1 AND kind = ?2 AND id = ?3",
                params![user.as_str(), kind.as_str(), id],
                |row| row_to_record(row, user, kind),
            )
            .map_err(StoreError::from)
    }

    // ------------------------------------------------------------------
    // Create / upsert
    // ------------------------------------------------------------------

    /// Persist a new record under a freshly generated id.
    pub fn create_record(&self, user: &UserId, kind: Kind, payload: Payload) -> Result<Record> {
        ensure_list_kind(kind, "create")?;
        insert_record(self.conn(), user, kind, Uuid::new_v4().to_string(), payload)
    }

    /// Replace the payload of `(user, kind, id)` if it exists, refreshing
    /// `updatedAt` to a strictly later stamp and keeping `createdAt`;
    /// otherwise create it, under the supplied id when there is one.
    pub fn upsert_record(
        &self,
        user: &UserId,
        kind: Kind,
        id: Option<String>,
        payload: Payload,
    ) -> Result<Record> {
        ensure_list_kind(kind, "upsert")?;

        let Some(id) = id else {
            return self.create_record(user, kind, payload);
        };

        let tx = self.write_txn()?;

        let existing: Option<(String, Option<String>)> = tx
            .query_row(
                "SELECT created_at, updated_at
                 FROM records
                 WHERE user_id = ?1 AND kind = ?2 AND id = ?3",
                params![user.as_str(), kind.as_str(), id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let record = match existing {
            Some((created_str, updated_str)) => {
                let created_at = parse_timestamp(&created_str)?;
                let previous = match updated_str {
                    Some(s) => parse_timestamp(&s)?,
                    None => created_at,
                };
                let updated_at = stamp_after(&previous);
                let sort_key = order_key(kind, &payload, &created_at);

                tx.execute(
                    "UPDATE records
                     SET payload = ?4, sort_key = ?5, updated_at = ?6
                     WHERE user_id = ?1 AND kind = ?2 AND id = ?3",
                    params![
                        user.as_str(),
                        kind.as_str(),
                        id,
                        Value::Object(payload.clone()).to_string(),
                        sort_key,
                        format_timestamp(&updated_at),
                    ],
                )?;

                tracing::debug!(user = %user, kind = %kind, id = %id, "record updated");

                Record {
                    id,
                    user_id: user.clone(),
                    kind,
                    created_at,
                    updated_at: Some(updated_at),
                    payload,
                }
            }
            None => insert_record(&tx, user, kind, id, payload)?,
        };

        tx.commit()?;
        Ok(record)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Hard-delete `(user, kind, id)`. [`StoreError::NotFound`] when no such
    /// row exists for this user, whoever else may own that id.
    pub fn delete_record(&self, user: &UserId, kind: Kind, id: &str) -> Result<()> {
        ensure_list_kind(kind, "delete")?;
        if !kind.supports_delete() {
            return Err(StoreError::Unsupported(format!("delete on {kind}")));
        }

        let affected = self.conn().execute(
            "DELETE FROM records WHERE user_id = ?1 AND kind = ?2 AND id = ?3",
            params![user.as_str(), kind.as_str(), id],
        )?;

        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        tracing::debug!(user = %user, kind = %kind, id = %id, "record deleted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Aggregates
    // ------------------------------------------------------------------

    /// Total mindfulness minutes whose session date falls on `day` (UTC).
    pub fn mindful_minutes_on(&self, user: &UserId, day: NaiveDate) -> Result<u64> {
        let start = day.and_hms_opt(0, 0, 0).map(|n| n.and_utc()).unwrap_or_default();
        let end = start + Duration::days(1);

        let mut stmt = self.conn().prepare(
            "SELECT payload FROM records
             WHERE user_id = ?1 AND kind = ?2 AND sort_key >= ?3 AND sort_key < ?4",
        )?;
        let rows = stmt.query_map(
            params![
                user.as_str(),
                Kind::Mindfulness.as_str(),
                format_timestamp(&start),
                format_timestamp(&end),
            ],
            |row| row.get::<_, String>(0),
        )?;

        let mut total = 0u64;
        for row in rows {
            total += minutes_of(&decode_payload(&row?)?);
        }
        Ok(total)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn ensure_list_kind(kind: Kind, op: &str) -> Result<()> {
    if kind.is_singleton() {
        return Err(StoreError::Unsupported(format!("{op} on singleton kind {kind}")));
    }
    Ok(())
}

fn insert_record(
    conn: &Connection,
    user: &UserId,
    kind: Kind,
    id: String,
    mut payload: Payload,
) -> Result<Record> {
    let created_at = now_utc();
    if kind.stamps_order_field() {
        if let Some(field) = kind.order_field() {
            payload.insert(field.to_string(), Value::String(format_timestamp(&created_at)));
        }
    }
    let updated_at = kind.tracks_updates().then_some(created_at);
    let sort_key = order_key(kind, &payload, &created_at);

    conn.execute(
        "INSERT INTO records (user_id, kind, id, payload, sort_key, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            user.as_str(),
            kind.as_str(),
            id,
            Value::Object(payload.clone()).to_string(),
            sort_key,
            format_timestamp(&created_at),
            updated_at.as_ref().map(format_timestamp),
        ],
    )?;

    tracing::debug!(user = %user, kind = %kind, id = %id, "record created");

    Ok(Record {
        id,
        user_id: user.clone(),
        kind,
        created_at,
        updated_at,
        payload,
    })
}

/// Map a `SELECT id, payload, created_at, updated_at` row to a [`Record`].
pub(crate) fn row_to_record(
    row: &rusqlite::Row<'_>,
    user: &UserId,
    kind: Kind,
) -> rusqlite::Result<Record> {
    let id: String = row.get(0)?;
    let payload_str: String = row.get(1)?;
    let created_at = timestamp_column(row, 2)?;
    let updated_str: Option<String> = row.get(3)?;

    let payload = decode_payload(&payload_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let updated_at = updated_str
        .map(|s| parse_timestamp(&s))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Record {
        id,
        user_id: user.clone(),
        kind,
        created_at,
        updated_at,
        payload,
    })
}

pub(crate) fn timestamp_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(crate) fn decode_payload(raw: &str) -> Result<Payload> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Unsupported(format!(
            "stored payload is not an object: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Payload {
        match value {
            Value::Object(map) => map,
            _ => panic!("test payload must be an object"),
        }
    }

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    #[test]
    fn list_is_empty_for_new_user() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.list_records(&user("u1"), Kind::Mood).unwrap().is_empty());
    }

    #[test]
    fn mood_list_is_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let u = user("u1");
        let first = db
            .create_record(&u, Kind::Mood, payload(json!({"mood": "Good", "energy": 3, "stress": 2})))
            .unwrap();
        let second = db
            .create_record(&u, Kind::Mood, payload(json!({"mood": "Low", "energy": 2, "stress": 6})))
            .unwrap();

        let listed = db.list_records(&u, Kind::Mood).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
        assert!(listed[0].updated_at.is_none());
    }

    #[test]
    fn records_are_isolated_between_users() {
        let db = Database::open_in_memory().unwrap();
        let alice = user("alice");
        let bob = user("bob");

        let rec = db
            .create_record(&alice, Kind::Journal, payload(json!({"content": "private"})))
            .unwrap();

        assert!(db.list_records(&bob, Kind::Journal).unwrap().is_empty());
        assert!(matches!(
            db.get_record(&bob, Kind::Journal, &rec.id),
            Err(StoreError::NotFound)
        ));

        // Bob upserting Alice's id creates Bob's own record; Alice's is untouched.
        let bobs = db
            .upsert_record(&bob, Kind::Journal, Some(rec.id.clone()), payload(json!({"content": "mine"})))
            .unwrap();
        assert_eq!(bobs.user_id, bob);
        let alices = db.get_record(&alice, Kind::Journal, &rec.id).unwrap();
        assert_eq!(alices.payload["content"], "private");
    }

    #[test]
    fn delete_of_foreign_record_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let alice = user("alice");
        let bob = user("bob");

        let rec = db
            .create_record(&alice, Kind::Sleep, payload(json!({"quality": 4, "duration": 7.5})))
            .unwrap();

        assert!(matches!(
            db.delete_record(&bob, Kind::Sleep, &rec.id),
            Err(StoreError::NotFound)
        ));

        let still_there = db.list_records(&alice, Kind::Sleep).unwrap();
        assert_eq!(still_there, vec![rec.clone()]);

        db.delete_record(&alice, Kind::Sleep, &rec.id).unwrap();
        assert!(db.list_records(&alice, Kind::Sleep).unwrap().is_empty());
        assert!(matches!(
            db.delete_record(&alice, Kind::Sleep, &rec.id),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn journal_upsert_preserves_created_at() {
        let db = Database::open_in_memory().unwrap();
        let u = user("u1");
        let input = payload(json!({"title": "Day one", "content": "hello"}));

        let created = db.create_record(&u, Kind::Journal, input.clone()).unwrap();
        let listed = db.list_records(&u, Kind::Journal).unwrap();
        assert_eq!(listed[0].payload, input);
        assert_eq!(listed[0].updated_at, Some(listed[0].created_at));

        let updated = db
            .upsert_record(&u, Kind::Journal, Some(created.id.clone()), payload(json!({"content": "edited"})))
            .unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at.unwrap() > created.updated_at.unwrap());

        let listed = db.list_records(&u, Kind::Journal).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].payload["content"], "edited");
        assert_eq!(listed[0].updated_at, updated.updated_at);
    }

    #[test]
    fn upsert_with_unknown_id_creates_under_that_id() {
        let db = Database::open_in_memory().unwrap();
        let u = user("u1");
        let rec = db
            .upsert_record(&u, Kind::Journal, Some("client-1".into()), payload(json!({"content": "x"})))
            .unwrap();
        assert_eq!(rec.id, "client-1");

        // Retrying the same id updates rather than duplicating.
        db.upsert_record(&u, Kind::Journal, Some("client-1".into()), payload(json!({"content": "x"})))
            .unwrap();
        assert_eq!(db.list_records(&u, Kind::Journal).unwrap().len(), 1);
    }

    #[test]
    fn sleep_orders_by_client_date() {
        let db = Database::open_in_memory().unwrap();
        let u = user("u1");
        let older = db
            .create_record(&u, Kind::Sleep, payload(json!({"quality": 3, "duration": 6.0, "date": "2024-01-02"})))
            .unwrap();
        let newer = db
            .create_record(&u, Kind::Sleep, payload(json!({"quality": 3, "duration": 6.0, "date": "2024-03-02"})))
            .unwrap();
        // Inserted last but dated earliest.
        let oldest = db
            .create_record(&u, Kind::Sleep, payload(json!({"quality": 3, "duration": 6.0, "date": "2023-12-31"})))
            .unwrap();

        let ids: Vec<_> = db.list_records(&u, Kind::Sleep).unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![newer.id, older.id, oldest.id]);
    }

    #[test]
    fn stress_history_is_server_dated() {
        let db = Database::open_in_memory().unwrap();
        let u = user("u1");
        let rec = db
            .create_record(&u, Kind::StressHistory, payload(json!({"exerciseId": "e1", "title": "Breathe"})))
            .unwrap();
        assert_eq!(rec.payload["date"], format_timestamp(&rec.created_at));
    }

    #[test]
    fn mindful_minutes_sum_today_only() {
        let db = Database::open_in_memory().unwrap();
        let u = user("u1");
        let today = Utc::now().date_naive();
        db.create_record(&u, Kind::Mindfulness, payload(json!({"minutes": 10}))).unwrap();
        db.create_record(&u, Kind::Mindfulness, payload(json!({"minutes": 5}))).unwrap();
        db.create_record(&u, Kind::Mindfulness, payload(json!({"minutes": 30, "date": "2020-01-01"})))
            .unwrap();
        db.create_record(&user("other"), Kind::Mindfulness, payload(json!({"minutes": 99}))).unwrap();

        assert_eq!(db.mindful_minutes_on(&u, today).unwrap(), 15);
    }

    #[test]
    fn legacy_date_iso_places_mindfulness_sessions() {
        let db = Database::open_in_memory().unwrap();
        let u = user("u1");
        let today = Utc::now().date_naive();
        db.create_record(&u, Kind::Mindfulness, payload(json!({"minutes": 20, "dateISO": "2020-01-01T09:00:00Z"})))
            .unwrap();
        db.create_record(&u, Kind::Mindfulness, payload(json!({"minutes": 7}))).unwrap();

        assert_eq!(db.mindful_minutes_on(&u, today).unwrap(), 7);

        let list = db.list_records(&u, Kind::Mindfulness).unwrap();
        assert_eq!(list[0].payload["minutes"], 7);
        assert_eq!(list[1].payload["dateISO"], "2020-01-01T09:00:00Z");
    }

    #[test]
    fn singleton_kinds_are_rejected() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.list_records(&user("u1"), Kind::Profile),
            Err(StoreError::Unsupported(_))
        ));
        assert!(matches!(
            db.delete_record(&user("u1"), Kind::Mindfulness, "x"),
            Err(StoreError::Unsupported(_))
        ));
    }
}
