use axum::extract::State;
use axum::Json;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};

use haven_shared::constants::ASSISTANT_FALLBACK_TEXT;
use haven_shared::ChatRole;

use super::{require_key, upstream_error};
use crate::api::{ApiJson, AppState};
use crate::auth::identity::CurrentUser;
use crate::error::ApiError;

const SERVICE: &str = "assistant";

/// One prior turn forwarded to the model.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InputMessage {
    pub role: ChatRole,
    pub content: String,
}

/// A validated `/chat` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub topic: String,
    pub tags: Vec<String>,
    pub messages: Vec<InputMessage>,
}

impl Conversation {
    /// Accepts `topic`/`tags` (or the older `issueTitle`/`issueTags`) and
    /// messages shaped either `{role, content}` or `{sender, text}`.
    pub fn from_json(body: &Value) -> Result<Self, ApiError> {
        let topic = body
            .get("topic")
            .or_else(|| body.get("issueTitle"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::InvalidRequest("topic is required".into()))?
            .to_string();

        let tags = body
            .get("tags")
            .or_else(|| body.get("issueTags"))
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let raw = body
            .get("messages")
            .and_then(Value::as_array)
            .ok_or_else(|| ApiError::InvalidRequest("messages must be an array".into()))?;

        let messages = raw
            .iter()
            .enumerate()
            .map(|(i, m)| input_message(i, m))
            .collect::<Result<_, _>>()?;

        Ok(Self {
            topic,
            tags,
            messages,
        })
    }
}

fn input_message(index: usize, m: &Value) -> Result<InputMessage, ApiError> {
    let role = match m.get("role").and_then(Value::as_str) {
        Some(role) => role.parse::<ChatRole>().map_err(|e| ApiError::invalid(format!("messages[{index}]"), e))?,
        None => ChatRole::from_sender(m.get("sender").and_then(Value::as_str).unwrap_or_default()),
    };
    let content = m
        .get("content")
        .or_else(|| m.get("text"))
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::InvalidRequest(format!("messages[{index}] has no text")))?
        .to_string();
    Ok(InputMessage { role, content })
}

/// System preamble grounding the model in the user's chosen topic.
pub fn instructions(topic: &str, tags: &[String]) -> String {
    format!(
        "You are a supportive mental-health coaching assistant.\n\
         User selected: \"{topic}\".\n\
         Relevant tags: {}\n\
         \n\
         Provide practical, compassionate coping steps. Avoid diagnosis.\n\
         If self-harm intent is present, encourage immediate local emergency help / crisis resources.",
        tags.join(", ")
    )
}

/// Pull the reply text out of whichever response shape the service used.
pub fn extract_text(body: &Value) -> String {
    body.get("output_text")
        .and_then(Value::as_str)
        .or_else(|| {
            body.get("output")?
                .as_array()?
                .iter()
                .find(|item| item.get("type").and_then(Value::as_str) == Some("message"))?
                .get("content")?
                .get(0)?
                .get("text")?
                .as_str()
        })
        .or_else(|| body.pointer("/choices/0/message/content")?.as_str())
        .unwrap_or(ASSISTANT_FALLBACK_TEXT)
        .to_string()
}

#[derive(Clone)]
pub struct AssistantGateway {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

impl AssistantGateway {
    pub fn new(client: Client, base_url: &str, api_key: Option<String>, model: String) -> Self {
        Self {
            client,
            endpoint: format!("{}/responses", base_url.trim_end_matches('/')),
            api_key,
            model,
        }
    }

    pub async fn converse(&self, conversation: &Conversation) -> Result<String, ApiError> {
        let key = require_key(SERVICE, &self.api_key)?;

        let request = json!({
            "model": self.model,
            "instructions": instructions(&conversation.topic, &conversation.tags),
            "input": conversation.messages,
            "store": false,
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ApiError::upstream_transport(SERVICE, e))?;

        if !resp.status().is_success() {
            return Err(upstream_error(SERVICE, resp).await);
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| ApiError::upstream_transport(SERVICE, e))?;
        Ok(extract_text(&body))
    }
}

pub async fn chat(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(body): ApiJson<Value>,
) -> Result<Json<Value>, ApiError> {
    let conversation = Conversation::from_json(&body)?;
    tracing::debug!(
        user = %user.id(),
        topic = %conversation.topic,
        turns = conversation.messages.len(),
        "Forwarding conversation to assistant"
    );

    let text = state.assistant.converse(&conversation).await?;
    Ok(Json(json!({ "text": text })))
}
