use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use haven_shared::constants::{MAX_CHAT_TEXT_LEN, MAX_TOPIC_KEY_LEN};
use haven_shared::types::parse_timestamp;
use haven_shared::{ChatRole, ValidationError};
use haven_store::{ChatMessage, NewChatMessage};

use crate::api::{ApiJson, AppState};
use crate::auth::identity::CurrentUser;
use crate::error::ApiError;

/// Inbound message. `role` is preferred; older clients send `sender`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendBody {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    sender: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
}

impl TryFrom<AppendBody> for NewChatMessage {
    type Error = ValidationError;

    fn try_from(body: AppendBody) -> Result<Self, Self::Error> {
        let text = body
            .text
            .filter(|t| !t.trim().is_empty())
            .ok_or(ValidationError::MissingField("text"))?;
        if text.len() > MAX_CHAT_TEXT_LEN {
            return Err(ValidationError::invalid(
                "text",
                format!("longer than {MAX_CHAT_TEXT_LEN} bytes"),
            ));
        }

        let role = match (body.role, body.sender) {
            (Some(role), _) => role.parse::<ChatRole>()?,
            (None, Some(sender)) => ChatRole::from_sender(&sender),
            (None, None) => return Err(ValidationError::MissingField("role")),
        };

        let created_at = body
            .created_at
            .map(|raw| {
                parse_timestamp(&raw)
                    .map_err(|e| ValidationError::invalid("createdAt", e.to_string()))
            })
            .transpose()?;

        Ok(NewChatMessage {
            id: body.id.filter(|id| !id.trim().is_empty()),
            text,
            role,
            created_at,
        })
    }
}

fn topic_key(raw: String) -> Result<String, ApiError> {
    let len = raw.chars().count();
    if raw.trim().is_empty() || len > MAX_TOPIC_KEY_LEN {
        return Err(ApiError::InvalidRequest(format!(
            "topic key must be 1-{MAX_TOPIC_KEY_LEN} characters"
        )));
    }
    Ok(raw)
}

pub async fn read(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(topic): Path<String>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    let topic = topic_key(topic)?;
    let user_id = user.0.user_id;
    let messages = state
        .store
        .call(move |db| db.read_chat(&user_id, &topic))
        .await?;
    Ok(Json(messages))
}

pub async fn append(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(topic): Path<String>,
    ApiJson(body): ApiJson<AppendBody>,
) -> Result<Json<ChatMessage>, ApiError> {
    let topic = topic_key(topic)?;
    let message = NewChatMessage::try_from(body).map_err(|e| ApiError::invalid("chat message", e))?;
    let user_id = user.0.user_id;
    let stored = state
        .store
        .call(move |db| db.append_chat(&user_id, &topic, message))
        .await?;
    Ok(Json(stored))
}

pub async fn clear(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(topic): Path<String>,
) -> Result<StatusCode, ApiError> {
    let topic = topic_key(topic)?;
    let user_id = user.0.user_id;
    let removed = state
        .store
        .call(move |db| db.clear_chat(&user_id, &topic))
        .await?;
    tracing::debug!(removed, "Transcript cleared");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(body: serde_json::Value) -> Result<NewChatMessage, ValidationError> {
        let body: AppendBody = serde_json::from_value(body).unwrap();
        NewChatMessage::try_from(body)
    }

    #[test]
    fn test_role_or_legacy_sender() {
        assert_eq!(parse(json!({"text": "hi", "role": "assistant"})).unwrap().role, ChatRole::Assistant);
        assert_eq!(parse(json!({"text": "hi", "sender": "user"})).unwrap().role, ChatRole::User);
        assert_eq!(parse(json!({"text": "hi", "sender": "bot"})).unwrap().role, ChatRole::Assistant);
        assert!(parse(json!({"text": "hi", "role": "system"})).is_err());
        assert!(parse(json!({"text": "hi"})).is_err());
    }

    #[test]
    fn test_text_required() {
        assert!(matches!(
            parse(json!({"role": "user"})),
            Err(ValidationError::MissingField("text"))
        ));
        assert!(parse(json!({"role": "user", "text": "   "})).is_err());
    }

    #[test]
    fn test_client_fields_kept() {
        let msg = parse(json!({
            "id": "m-1",
            "text": "hello",
            "role": "user",
            "createdAt": "2024-03-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(msg.id.as_deref(), Some("m-1"));
        assert!(msg.created_at.is_some());
        assert!(parse(json!({"text": "x", "role": "user", "createdAt": "yesterday"})).is_err());
    }

    #[test]
    fn test_topic_key_bounds() {
        assert!(topic_key("work".into()).is_ok());
        assert!(topic_key(" ".into()).is_err());
        assert!(topic_key("x".repeat(MAX_TOPIC_KEY_LEN)).is_ok());
        assert!(topic_key("x".repeat(MAX_TOPIC_KEY_LEN + 1)).is_err());
    }
}
