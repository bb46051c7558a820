use axum::{
    async_trait,
    extract::{rejection::JsonRejection, DefaultBodyLimit, FromRequest, Request},
    http::Method,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use haven_shared::constants::MAX_AUDIO_SIZE;
use haven_shared::Kind;

use crate::auth::{self, identity::IdentityResolver};
use crate::error::ApiError;
use crate::gateways::assistant::{self, AssistantGateway};
use crate::gateways::commerce::{self, CommerceGateway};
use crate::gateways::transcription::{self, TranscriptionGateway};
use crate::rate_limit::{gateway_rate_limit, RateLimiter};
use crate::store::Store;
use crate::tracking;
use crate::transcripts;

/// Room for multipart boundaries and headers around the audio itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub identity: IdentityResolver,
    pub assistant: AssistantGateway,
    pub commerce: CommerceGateway,
    pub transcription: TranscriptionGateway,
    pub rate_limiter: RateLimiter,
}

/// `Json` whose rejection is reported as an `invalid_request` error body.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| ApiError::InvalidRequest(e.body_text()))?;
        Ok(ApiJson(value))
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    let gateways = Router::new()
        .route("/chat", post(assistant::chat))
        .route(
            "/create-checkout-session",
            post(commerce::create_checkout_session),
        )
        .route(
            "/transcribe",
            post(transcription::transcribe)
                .layer(DefaultBodyLimit::max(MAX_AUDIO_SIZE + MULTIPART_OVERHEAD)),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            gateway_rate_limit,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/auth/signup", post(auth::sign_up))
        .route("/auth/signin", post(auth::sign_in))
        .route("/auth/me", get(auth::me))
        .route("/mood", tracking::collection(Kind::Mood))
        .route("/mood/:id", tracking::member(Kind::Mood))
        .route("/journal", tracking::collection(Kind::Journal))
        .route("/journal/:id", tracking::member(Kind::Journal))
        .route("/stress/kit", tracking::singleton(Kind::StressKit))
        .route("/stress/history", tracking::collection(Kind::StressHistory))
        .route("/sleep", tracking::collection(Kind::Sleep))
        .route("/sleep/:id", tracking::member(Kind::Sleep))
        .route("/mindfulness", tracking::collection(Kind::Mindfulness))
        .route("/mindfulness/today", get(tracking::mindful_minutes_today))
        .route("/profile", tracking::singleton(Kind::Profile))
        .route("/assessment", tracking::singleton(Kind::Assessment))
        .route("/subscription", tracking::singleton(Kind::Subscription))
        .route("/data", get(tracking::snapshot))
        .route(
            "/chat/history/:topic",
            get(transcripts::read)
                .post(transcripts::append)
                .delete(transcripts::clear),
        )
        .merge(gateways)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{header, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use haven_store::Database;

    use crate::auth::jwt::TokenIssuer;
    use crate::config::{IdentityPolicy, ServerConfig};
    use crate::gateways::http_client;

    struct TestHarness {
        app: Router,
        _dir: tempfile::TempDir,
    }

    impl TestHarness {
        fn new() -> Self {
            Self::with_config(ServerConfig::default(), IdentityPolicy::Permissive)
        }

        fn with_config(config: ServerConfig, policy: IdentityPolicy) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let db = Database::open_at(&dir.path().join("haven.db")).unwrap();

            let client = http_client(Duration::from_secs(5)).unwrap();
            let state = AppState {
                store: Store::new(db),
                identity: IdentityResolver::new(
                    TokenIssuer::new("test-secret", Duration::from_secs(3600)),
                    policy,
                ),
                assistant: AssistantGateway::new(
                    client.clone(),
                    &config.openai_base_url,
                    config.openai_api_key.clone(),
                    config.assistant_model.clone(),
                ),
                commerce: CommerceGateway::new(
                    client.clone(),
                    &config.stripe_base_url,
                    config.stripe_secret_key.clone(),
                    config.checkout_success_url.clone(),
                    config.checkout_cancel_url.clone(),
                ),
                transcription: TranscriptionGateway::new(
                    client,
                    &config.openai_base_url,
                    config.openai_api_key.clone(),
                    config.transcription_model.clone(),
                ),
                rate_limiter: RateLimiter::new(config.gateway_rate_per_sec, config.gateway_burst),
            };

            Self {
                app: build_router(state),
                _dir: dir,
            }
        }

        async fn send(
            &self,
            method: Method,
            uri: &str,
            headers: &[(&str, &str)],
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut builder = axum::http::Request::builder().method(method).uri(uri);
            for (name, value) in headers {
                builder = builder.header(*name, *value);
            }
            let request = match body {
                Some(body) => builder
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };

            self.dispatch(request).await
        }

        async fn dispatch(&self, request: axum::http::Request<Body>) -> (StatusCode, Value) {
            let response = self.app.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, value)
        }

        async fn sign_up(&self, email: &str, password: &str) -> (StatusCode, Value) {
            self.send(
                Method::POST,
                "/auth/signup",
                &[],
                Some(json!({"email": email, "password": password, "name": "Sam"})),
            )
            .await
        }
    }

    const BOUNDARY: &str = "haven-test-boundary";

    /// A multipart body from `(field name, optional filename, content)` parts.
    fn multipart(parts: &[(&str, Option<&str>, &[u8])]) -> axum::http::Request<Body> {
        let mut body = Vec::new();
        for (name, filename, content) in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match filename {
                Some(filename) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                         Content-Type: audio/mp4\r\n\r\n"
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                ),
            }
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        axum::http::Request::builder()
            .method(Method::POST)
            .uri("/transcribe")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn bearer(token: &Value) -> String {
        format!("Bearer {}", token.as_str().unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let h = TestHarness::new();
        let (status, body) = h.send(Method::GET, "/health", &[], None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_sign_up_then_sign_in_resolves_same_user() {
        let h = TestHarness::new();

        let (status, created) = h.sign_up("sam@example.com", "long-enough").await;
        assert_eq!(status, StatusCode::CREATED);
        let user_id = created["user"]["id"].as_str().unwrap().to_string();
        assert!(created["user"].get("passwordHash").is_none());

        let (status, signed_in) = h
            .send(
                Method::POST,
                "/auth/signin",
                &[],
                Some(json!({"email": "SAM@example.com", "password": "long-enough"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(signed_in["user"]["id"], user_id.as_str());

        let auth = bearer(&signed_in["token"]);
        let (status, me) = h
            .send(Method::GET, "/auth/me", &[("authorization", auth.as_str())], None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["userId"], user_id.as_str());
        assert_eq!(me["source"], "token");
    }

    #[tokio::test]
    async fn test_duplicate_sign_up_conflicts() {
        let h = TestHarness::new();
        h.sign_up("sam@example.com", "long-enough").await;

        let (status, body) = h.sign_up("sam@example.com", "another-password").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "conflict");
    }

    #[tokio::test]
    async fn test_sign_up_validation() {
        let h = TestHarness::new();
        let (status, body) = h.sign_up("not-an-email", "long-enough").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_request");

        let (status, _) = h.sign_up("sam@example.com", "short").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_email_look_the_same() {
        let h = TestHarness::new();
        h.sign_up("sam@example.com", "long-enough").await;

        let (wrong_status, wrong_body) = h
            .send(
                Method::POST,
                "/auth/signin",
                &[],
                Some(json!({"email": "sam@example.com", "password": "not-the-one"})),
            )
            .await;
        let (unknown_status, unknown_body) = h
            .send(
                Method::POST,
                "/auth/signin",
                &[],
                Some(json!({"email": "nobody@example.com", "password": "long-enough"})),
            )
            .await;

        assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong_body["kind"], "invalid_credentials");
        assert_eq!(wrong_status, unknown_status);
        assert_eq!(wrong_body, unknown_body);
    }

    #[tokio::test]
    async fn test_records_are_isolated_per_user() {
        let h = TestHarness::new();
        let alice = [("x-user-id", "alice")];
        let bob = [("x-user-id", "bob")];

        let (status, mood) = h
            .send(
                Method::POST,
                "/mood",
                &alice,
                Some(json!({"mood": "Good", "energy": 4, "stress": 2, "tags": ["work", "work"]})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(mood["userId"], "alice");
        assert_eq!(mood["tags"], json!(["work"]));
        let id = mood["id"].as_str().unwrap().to_string();

        let (_, bobs) = h.send(Method::GET, "/mood", &bob, None).await;
        assert_eq!(bobs, json!([]));

        let (status, body) = h
            .send(Method::DELETE, &format!("/mood/{id}"), &bob, None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "not_found");

        let (_, alices) = h.send(Method::GET, "/mood", &alice, None).await;
        assert_eq!(alices.as_array().unwrap().len(), 1);

        let (status, _) = h
            .send(Method::DELETE, &format!("/mood/{id}"), &alice, None)
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_invalid_payload_names_kind_and_field() {
        let h = TestHarness::new();
        let (status, body) = h
            .send(
                Method::POST,
                "/mood",
                &[],
                Some(json!({"mood": "Good", "energy": 9, "stress": 2})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let message = body["error"].as_str().unwrap();
        assert!(message.contains("mood"));
        assert!(message.contains("energy"));
    }

    #[tokio::test]
    async fn test_journal_put_updates_in_place() {
        let h = TestHarness::new();
        let me = [("x-user-id", "writer")];

        let (status, first) = h
            .send(
                Method::PUT,
                "/journal/entry-1",
                &me,
                Some(json!({"title": "Monday", "content": "Long day"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["id"], "entry-1");

        let (_, second) = h
            .send(
                Method::PUT,
                "/journal/entry-1",
                &me,
                Some(json!({"title": "Monday", "content": "Better evening"})),
            )
            .await;
        assert_eq!(second["createdAt"], first["createdAt"]);
        assert!(second["updatedAt"].as_str().unwrap() > first["updatedAt"].as_str().unwrap());

        let (_, list) = h.send(Method::GET, "/journal", &me, None).await;
        assert_eq!(list.as_array().unwrap().len(), 1);
        assert_eq!(list[0]["content"], "Better evening");
    }

    #[tokio::test]
    async fn test_singletons_default_and_replace() {
        let h = TestHarness::new();

        let (_, kit) = h.send(Method::GET, "/stress/kit", &[], None).await;
        assert_eq!(kit, json!({"triggers": [], "helpfulActions": [], "people": [], "exercises": []}));

        let (_, sub) = h.send(Method::GET, "/subscription", &[], None).await;
        assert_eq!(sub, Value::Null);

        let (status, saved) = h
            .send(
                Method::PUT,
                "/stress/kit",
                &[],
                Some(json!({"triggers": ["noise"], "helpfulActions": [], "people": ["Ana"]})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(saved["triggers"], json!(["noise"]));

        let (_, kit) = h.send(Method::GET, "/stress/kit", &[], None).await;
        assert_eq!(kit["people"], json!(["Ana"]));

        let (status, _) = h
            .send(Method::POST, "/profile", &[], Some(json!({"displayName": "Sam"})))
            .await;
        assert_eq!(status, StatusCode::OK);
        let (_, data) = h.send(Method::GET, "/data", &[], None).await;
        assert_eq!(data["profile"]["displayName"], "Sam");
        assert_eq!(data["stressKit"]["triggers"], json!(["noise"]));
    }

    #[tokio::test]
    async fn test_chat_history_round_trip() {
        let h = TestHarness::new();
        let me = [("x-user-id", "chatter")];

        let (status, _) = h
            .send(
                Method::POST,
                "/chat/history/work",
                &me,
                Some(json!({"text": "I'm overwhelmed", "sender": "user"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        h.send(
            Method::POST,
            "/chat/history/work",
            &me,
            Some(json!({"text": "Let's slow down.", "role": "assistant"})),
        )
        .await;

        let (_, history) = h.send(Method::GET, "/chat/history/work", &me, None).await;
        assert_eq!(history[0]["role"], "user");
        assert_eq!(history[1]["text"], "Let's slow down.");

        let (status, _) = h
            .send(Method::DELETE, "/chat/history/work", &me, None)
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, history) = h.send(Method::GET, "/chat/history/work", &me, None).await;
        assert_eq!(history, json!([]));
    }

    #[tokio::test]
    async fn test_strict_policy_rejects_legacy_header() {
        let h = TestHarness::with_config(ServerConfig::default(), IdentityPolicy::Strict);
        let (status, body) = h
            .send(Method::GET, "/mood", &[("x-user-id", "alice")], None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["kind"], "invalid_credentials");
    }

    #[tokio::test]
    async fn test_assistant_failure_surfaces_upstream_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/responses"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let config = ServerConfig {
            openai_base_url: server.uri(),
            openai_api_key: Some("test-key".into()),
            ..ServerConfig::default()
        };
        let h = TestHarness::with_config(config, IdentityPolicy::Permissive);

        let (status, body) = h
            .send(
                Method::POST,
                "/chat",
                &[],
                Some(json!({"topic": "Sleep", "messages": [{"sender": "user", "text": "hi"}]})),
            )
            .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["kind"], "upstream_failure");
        assert_eq!(body["upstreamStatus"], 503);
        assert_eq!(body["upstreamBody"], "overloaded");
    }

    #[tokio::test]
    async fn test_gateway_rate_limit_per_user() {
        let config = ServerConfig {
            gateway_rate_per_sec: 0.001,
            gateway_burst: 1.0,
            ..ServerConfig::default()
        };
        let h = TestHarness::with_config(config, IdentityPolicy::Permissive);
        let body = json!({"topic": "x", "messages": "not-an-array"});

        let (first, _) = h
            .send(Method::POST, "/chat", &[("x-user-id", "a")], Some(body.clone()))
            .await;
        assert_eq!(first, StatusCode::BAD_REQUEST);

        let (second, err) = h
            .send(Method::POST, "/chat", &[("x-user-id", "a")], Some(body.clone()))
            .await;
        assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err["kind"], "rate_limited");

        let (other, _) = h
            .send(Method::POST, "/chat", &[("x-user-id", "b")], Some(body))
            .await;
        assert_eq!(other, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_anonymous_callers_limited_per_address() {
        let config = ServerConfig {
            gateway_rate_per_sec: 0.001,
            gateway_burst: 1.0,
            ..ServerConfig::default()
        };
        let h = TestHarness::with_config(config, IdentityPolicy::Permissive);
        let body = json!({"topic": "x", "messages": "not-an-array"});
        let first = [("x-forwarded-for", "198.51.100.1")];
        let second = [("x-forwarded-for", "198.51.100.2")];

        let (status, _) = h.send(Method::POST, "/chat", &first, Some(body.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // Same anonymous user id, different client: separate bucket.
        let (status, _) = h.send(Method::POST, "/chat", &second, Some(body.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, err) = h.send(Method::POST, "/chat", &first, Some(body)).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err["kind"], "rate_limited");
    }

    #[tokio::test]
    async fn test_transcribe_requires_audio_file() {
        let h = TestHarness::new();

        let (status, body) = h
            .dispatch(multipart(&[("other", None, b"not audio".as_slice())]))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_request");

        let (status, body) = h
            .dispatch(multipart(&[("file", Some("note.m4a"), b"".as_slice())]))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_request");
    }

    #[tokio::test]
    async fn test_transcribe_forwards_upload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audio/transcriptions"))
            .and(body_string_contains("filename=\"note.m4a\""))
            .and(body_string_contains("voice-bytes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "feeling calmer"})))
            .expect(1)
            .mount(&server)
            .await;

        let config = ServerConfig {
            openai_base_url: server.uri(),
            openai_api_key: Some("test-key".into()),
            ..ServerConfig::default()
        };
        let h = TestHarness::with_config(config, IdentityPolicy::Permissive);

        let (status, body) = h
            .dispatch(multipart(&[
                ("model", None, b"ignored".as_slice()),
                ("file", Some("note.m4a"), b"voice-bytes".as_slice()),
            ]))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["text"], "feeling calmer");
    }
}
