//! Email/password accounts and bearer-token identity.

pub mod identity;
pub mod jwt;
pub mod password;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use haven_shared::constants::MIN_PASSWORD_LEN;
use haven_shared::UserId;
use haven_store::User;

use crate::api::{ApiJson, AppState};
use crate::error::ApiError;
use identity::{CurrentUser, IdentitySource};

#[derive(Deserialize)]
pub struct SignUpRequest {
    email: String,
    password: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
pub struct SignInRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    token: String,
    user: User,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    user_id: UserId,
    source: IdentitySource,
}

pub async fn sign_up(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SignUpRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let email = normalize_email(&req.email)?;
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::InvalidRequest(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    let name = req
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());

    let password = req.password;
    let hash = tokio::task::spawn_blocking(move || password::hash_password(&password)).await??;

    let user = state
        .store
        .call(move |db| db.create_user(&email, name.as_deref(), &hash))
        .await?;

    let token = state.identity.tokens().issue(&user.id, Some(&user.email))?;
    tracing::info!(user = %user.id, "Account created");

    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

pub async fn sign_in(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SignInRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let email = req.email.trim().to_lowercase();
    let lookup = email.clone();
    let found = state
        .store
        .call(move |db| db.find_credentials(&lookup))
        .await?;

    let password = req.password;
    let user = tokio::task::spawn_blocking(move || match found {
        Some((user, hash)) if password::verify_password(&password, &hash) => Some(user),
        Some(_) => None,
        None => {
            password::verify_against_dummy(&password);
            None
        }
    })
    .await?;

    let Some(user) = user else {
        tracing::debug!("Sign-in rejected");
        return Err(ApiError::InvalidCredentials);
    };

    let token = state.identity.tokens().issue(&user.id, Some(&user.email))?;
    tracing::info!(user = %user.id, "Signed in");

    Ok(Json(AuthResponse { token, user }))
}

pub async fn me(user: CurrentUser) -> Json<MeResponse> {
    Json(MeResponse {
        user_id: user.0.user_id,
        source: user.0.source,
    })
}

/// Minimal shape check: one `@`, non-empty local part, dotted domain.
fn normalize_email(raw: &str) -> Result<String, ApiError> {
    let email = raw.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(email)
    } else {
        Err(ApiError::InvalidRequest("email address is not valid".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_shape() {
        assert_eq!(normalize_email(" A@X.com ").unwrap(), "a@x.com");
        assert!(normalize_email("no-at-sign").is_err());
        assert!(normalize_email("@x.com").is_err());
        assert!(normalize_email("a@localhost").is_err());
        assert!(normalize_email("a@b@x.com").is_err());
        assert!(normalize_email("a b@x.com").is_err());
    }
}
