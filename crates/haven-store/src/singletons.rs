//! Find-or-create storage for singleton kinds (stress kit, profile,
//! assessment, subscription).
//!
//! Uniqueness comes from the `(user_id, kind)` primary key and the write is a
//! single `INSERT … ON CONFLICT DO UPDATE`, so concurrent first writers
//! converge on one row: the first writer's id and `createdAt` survive and the
//! last writer's payload wins.

use rusqlite::{params, OptionalExtension};
use serde_json::Value;
use uuid::Uuid;

use haven_shared::types::{format_timestamp, now_utc};
use haven_shared::{Kind, Payload, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Record;
use crate::records::{decode_payload, timestamp_column};

impl Database {
    /// The user's record for a singleton kind, if one was ever written.
    pub fn get_singleton(&self, user: &UserId, kind: Kind) -> Result<Option<Record>> {
        ensure_singleton(kind)?;

        let row = self
            .conn()
            .query_row(
                "SELECT id, payload, created_at, updated_at
                 FROM singletons
                 WHERE user_id = ?1 AND kind = ?2",
                params![user.as_str(), kind.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        timestamp_column(row, 2)?,
                        timestamp_column(row, 3)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(id, payload, created_at, updated_at)| -> Result<Record> {
            Ok(Record {
                id,
                user_id: user.clone(),
                kind,
                created_at,
                updated_at: Some(updated_at),
                payload: decode_payload(&payload)?,
            })
        })
        .transpose()
    }

    /// Full-replace upsert of the user's singleton of `kind`.
    pub fn upsert_singleton(&self, user: &UserId, kind: Kind, payload: Payload) -> Result<Record> {
        ensure_singleton(kind)?;

        let now = format_timestamp(&now_utc());
        let (id, stored, created_at, updated_at) = self.conn().query_row(
            "INSERT INTO singletons (user_id, kind, id, payload, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT (user_id, kind) DO UPDATE SET
                 payload = excluded.payload,
                 updated_at = max(singletons.updated_at, excluded.updated_at)
             RETURNING id, payload, created_at, updated_at",
            params![
                user.as_str(),
                kind.as_str(),
                Uuid::new_v4().to_string(),
                Value::Object(payload).to_string(),
                now,
            ],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    timestamp_column(row, 2)?,
                    timestamp_column(row, 3)?,
                ))
            },
        )?;

        tracing::debug!(user = %user, kind = %kind, id = %id, "singleton upserted");

        Ok(Record {
            id,
            user_id: user.clone(),
            kind,
            created_at,
            updated_at: Some(updated_at),
            payload: decode_payload(&stored)?,
        })
    }
}

fn ensure_singleton(kind: Kind) -> Result<()> {
    if !kind.is_singleton() {
        return Err(StoreError::Unsupported(format!(
            "singleton access on list kind {kind}"
        )));
    }
    Ok(())
}
