use thiserror::Error;

/// Rejections raised while checking inbound identities and payloads.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("User id must not be empty")]
    EmptyUserId,

    #[error("Unknown record kind: {0}")]
    UnknownKind(String),

    #[error("Payload must be a JSON object")]
    NotAnObject,

    #[error("Malformed {kind} payload: {reason}")]
    Malformed { kind: &'static str, reason: String },

    #[error("Missing required field `{0}`")]
    MissingField(&'static str),

    #[error("Invalid `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl ValidationError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ValidationError::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}
