use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use haven_shared::types::{format_timestamp, now_utc};
use haven_shared::UserId;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::User;
use crate::records::timestamp_column;

impl Database {
    /// Register an account. The email's uniqueness is checked by the
    /// `idx_users_email` unique index (case-insensitive), which surfaces as
    /// [`StoreError::Conflict`].
    pub fn create_user(
        &self,
        email: &str,
        name: Option<&str>,
        password_hash: &str,
    ) -> Result<User> {
        let user = User {
            id: UserId::new(Uuid::new_v4().to_string())
                .map_err(|e| StoreError::Unsupported(e.to_string()))?,
            email: email.to_string(),
            name: name.map(str::to_string),
            created_at: now_utc(),
        };

        self.conn()
            .execute(
                "INSERT INTO users (id, email, name, password_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    user.id.as_str(),
                    user.email,
                    user.name,
                    password_hash,
                    format_timestamp(&user.created_at),
                ],
            )
            .map_err(|e| match StoreError::from(e) {
                StoreError::Conflict(_) => StoreError::Conflict("email already registered".into()),
                other => other,
            })?;

        tracing::info!(user = %user.id, "user registered");
        Ok(user)
    }

    /// Look up an account and its password hash by email.
    pub fn find_credentials(&self, email: &str) -> Result<Option<(User, String)>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT id, email, name, created_at, password_hash
                 FROM users WHERE email = ?1",
                params![email],
                |row| {
                    let hash: String = row.get(4)?;
                    Ok((row_to_user(row)?, hash))
                },
            )
            .optional()?)
    }

    pub fn get_user(&self, id: &UserId) -> Result<User> {
        self.conn()
            .query_row(
                "SELECT id, email, name, created_at FROM users WHERE id = ?1",
                params![id.as_str()],
                row_to_user,
            )
            .map_err(StoreError::from)
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let id_str: String = row.get(0)?;
    let email: String = row.get(1)?;
    let name: Option<String> = row.get(2)?;
    let created_at = timestamp_column(row, 3)?;

    let id = UserId::new(id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(User {
        id,
        email,
        name,
        created_at,
    })
}
