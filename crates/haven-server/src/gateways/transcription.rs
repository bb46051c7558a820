use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::Json;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::{json, Value};

use haven_shared::constants::MAX_AUDIO_SIZE;

use super::{require_key, upstream_error};
use crate::api::AppState;
use crate::auth::identity::CurrentUser;
use crate::error::ApiError;

const SERVICE: &str = "transcription";
const DEFAULT_FILENAME: &str = "audio.m4a";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// An uploaded voice note.
#[derive(Debug, Clone)]
pub struct AudioUpload {
    pub bytes: Bytes,
    pub filename: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Clone)]
pub struct TranscriptionGateway {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

impl TranscriptionGateway {
    pub fn new(client: Client, base_url: &str, api_key: Option<String>, model: String) -> Self {
        Self {
            client,
            endpoint: format!("{}/audio/transcriptions", base_url.trim_end_matches('/')),
            api_key,
            model,
        }
    }

    pub async fn transcribe(&self, upload: AudioUpload) -> Result<String, ApiError> {
        let key = require_key(SERVICE, &self.api_key)?;

        let filename = upload
            .filename
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| DEFAULT_FILENAME.to_string());
        let content_type = upload
            .content_type
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

        let part = Part::bytes(upload.bytes.to_vec()).file_name(filename);
        let part = match part.mime_str(&content_type) {
            Ok(part) => part,
            Err(e) => {
                tracing::debug!(error = %e, content_type = %content_type, "Unusable audio content type");
                Part::bytes(upload.bytes.to_vec())
                    .file_name(DEFAULT_FILENAME)
                    .mime_str(DEFAULT_CONTENT_TYPE)
                    .map_err(|e| ApiError::Internal(e.to_string()))?
            }
        };

        let form = Form::new()
            .part("file", part)
            .text("model", self.model.clone());

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(key)
            .multipart(form)
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
        Ok(body
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }
}

pub async fn transcribe(
    State(state): State<AppState>,
    user: CurrentUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ApiError> {
    let mut multipart =
        multipart.map_err(|e| ApiError::InvalidRequest(format!("Multipart error: {e}")))?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidRequest(format!("Multipart error: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::InvalidRequest(format!("Failed to read file: {e}")))?;
        upload = Some(AudioUpload {
            bytes,
            filename,
            content_type,
        });
        break;
    }

    let upload = upload
        .filter(|u| !u.bytes.is_empty())
        .ok_or_else(|| ApiError::InvalidRequest("Missing file".into()))?;
    if upload.bytes.len() > MAX_AUDIO_SIZE {
        return Err(ApiError::InvalidRequest(format!(
            "audio exceeds {MAX_AUDIO_SIZE} bytes"
        )));
    }

    tracing::info!(user = %user.id(), size = upload.bytes.len(), "Transcribing audio");
    let text = state.transcription.transcribe(upload).await?;
    Ok(Json(json!({ "text": text })))
}
