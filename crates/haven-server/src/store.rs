//! Async handle over the synchronous SQLite [`Database`].
//!
//! rusqlite calls block, so each one is moved onto tokio's blocking pool.

use std::sync::{Arc, Mutex};

use haven_store::{Database, StoreError};

use crate::error::ApiError;

#[derive(Clone)]
pub struct Store {
    db: Arc<Mutex<Database>>,
}

impl Store {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    /// Run `f` against the database on the blocking pool.
    pub async fn call<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, StoreError> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|_| ApiError::Internal("database mutex poisoned".into()))?;
            f(&guard).map_err(ApiError::from)
        })
        .await?
    }
}
