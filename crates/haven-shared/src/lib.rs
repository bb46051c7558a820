//! # haven-shared
//!
//! Types shared by the store and the server: caller identity, record kinds,
//! chat roles, timestamp conventions, and the per-kind payload validators.

pub mod constants;
pub mod error;
pub mod types;
pub mod wellness;

pub use error::ValidationError;
pub use types::{ChatRole, Kind, UserId};
pub use wellness::Payload;
