//! Stateless translators to the external services: the completion model,
//! the payment-session API, and speech-to-text.
//!
//! None of them retry. A non-2xx answer becomes [`ApiError::Upstream`]
//! carrying the upstream status and body; a transport failure becomes the
//! same error without a status.

pub mod assistant;
pub mod commerce;
pub mod transcription;

use std::time::Duration;

use reqwest::Client;

use crate::error::ApiError;

/// Shared HTTP client for every gateway.
pub fn http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("haven-server/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Turn a non-success response into an upstream failure.
async fn upstream_error(service: &'static str, resp: reqwest::Response) -> ApiError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    ApiError::Upstream {
        service,
        status: Some(status),
        body,
    }
}

fn require_key<'a>(service: &'static str, key: &'a Option<String>) -> Result<&'a str, ApiError> {
    key.as_deref().ok_or_else(|| ApiError::Upstream {
        service,
        status: None,
        body: format!("{service} credentials are not configured"),
    })
}
