//! Caller identity resolution.
//!
//! Every request is attributed to exactly one [`UserId`]:
//! 1. a valid `Authorization: Bearer <jwt>` yields its `sub` claim;
//! 2. otherwise the legacy `x-user-id` header, if non-blank;
//! 3. otherwise the shared anonymous user.
//!
//! Under [`IdentityPolicy::Strict`] steps 2 and 3 are disabled and a caller
//! without a valid token is rejected.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use serde::Serialize;

use haven_shared::constants::LEGACY_USER_HEADER;
use haven_shared::UserId;

use crate::api::AppState;
use crate::auth::jwt::TokenIssuer;
use crate::config::IdentityPolicy;
use crate::error::ApiError;

/// Where a resolved identity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    Token,
    LegacyHeader,
    Anonymous,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub source: IdentitySource,
}

#[derive(Clone)]
pub struct IdentityResolver {
    tokens: TokenIssuer,
    policy: IdentityPolicy,
}

impl IdentityResolver {
    pub fn new(tokens: TokenIssuer, policy: IdentityPolicy) -> Self {
        Self { tokens, policy }
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    pub fn resolve(
        &self,
        authorization: Option<&str>,
        legacy_user: Option<&str>,
    ) -> Result<Identity, ApiError> {
        if let Some(token) = authorization.and_then(bearer_token) {
            match self.tokens.verify(token) {
                Ok(claims) => match UserId::new(claims.sub) {
                    Ok(user_id) => {
                        return Ok(Identity {
                            user_id,
                            source: IdentitySource::Token,
                        })
                    }
                    Err(e) => tracing::debug!(error = %e, "Token subject rejected"),
                },
                Err(e) => tracing::debug!(error = %e, "Bearer token rejected"),
            }
        }

        if self.policy == IdentityPolicy::Strict {
            return Err(ApiError::InvalidCredentials);
        }

        if let Some(user_id) = legacy_user.and_then(|raw| UserId::new(raw).ok()) {
            return Ok(Identity {
                user_id,
                source: IdentitySource::LegacyHeader,
            });
        }

        Ok(Identity {
            user_id: UserId::anonymous(),
            source: IdentitySource::Anonymous,
        })
    }

    pub fn resolve_headers(&self, headers: &HeaderMap) -> Result<Identity, ApiError> {
        let authorization = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
        let legacy = headers
            .get(LEGACY_USER_HEADER)
            .and_then(|v| v.to_str().ok());
        self.resolve(authorization, legacy)
    }
}

fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Extractor for the caller's identity.
///
/// Reuses an identity already resolved by middleware (see
/// [`gateway_rate_limit`](crate::rate_limit::gateway_rate_limit)) when present.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Identity);

impl CurrentUser {
    pub fn id(&self) -> &UserId {
        &self.0.user_id
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(identity) = parts.extensions.get::<Identity>() {
            return Ok(CurrentUser(identity.clone()));
        }
        state.identity.resolve_headers(&parts.headers).map(CurrentUser)
    }
}
