//! Routes for the wellness record kinds.
//!
//! Each kind is wired from one of three shapes: a list collection, a member
//! addressed by id, or a per-user singleton. The kind's own rules (upsert by
//! id, delete support, ordering) live in [`Kind`] and the store.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, MethodRouter};
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

use haven_shared::wellness::{self, Payload};
use haven_shared::Kind;
use haven_store::{Record, Snapshot};

use crate::api::{ApiJson, AppState};
use crate::auth::identity::CurrentUser;
use crate::error::ApiError;

/// `GET` lists newest first, `POST` creates. Kinds that upsert by id take
/// an optional `id` in the body.
pub fn collection(kind: Kind) -> MethodRouter<AppState> {
    get(move |State(state): State<AppState>, user: CurrentUser| list(state, user, kind)).post(
        move |State(state): State<AppState>, user: CurrentUser, ApiJson(body): ApiJson<Value>| {
            create(state, user, kind, body)
        },
    )
}

/// `DELETE /:id`, plus `PUT /:id` for kinds that upsert by id.
pub fn member(kind: Kind) -> MethodRouter<AppState> {
    let route = delete(
        move |State(state): State<AppState>, user: CurrentUser, Path(id): Path<String>| {
            remove(state, user, kind, id)
        },
    );
    if kind.supports_upsert_by_id() {
        route.put(
            move |State(state): State<AppState>,
                  user: CurrentUser,
                  Path(id): Path<String>,
                  ApiJson(body): ApiJson<Value>| { upsert(state, user, kind, Some(id), body) },
        )
    } else {
        route
    }
}

/// `GET` reads (default when never written), `PUT` replaces. Profile and
/// assessment also accept `POST` as a replace.
pub fn singleton(kind: Kind) -> MethodRouter<AppState> {
    let route = get(move |State(state): State<AppState>, user: CurrentUser| {
        read_singleton(state, user, kind)
    })
    .put(
        move |State(state): State<AppState>, user: CurrentUser, ApiJson(body): ApiJson<Value>| {
            write_singleton(state, user, kind, body)
        },
    );
    if matches!(kind, Kind::Profile | Kind::Assessment) {
        route.post(
            move |State(state): State<AppState>, user: CurrentUser, ApiJson(body): ApiJson<Value>| {
                write_singleton(state, user, kind, body)
            },
        )
    } else {
        route
    }
}

fn validated(kind: Kind, body: Value) -> Result<Payload, ApiError> {
    wellness::validate(kind, body).map_err(|e| ApiError::invalid(kind, e))
}

async fn list(state: AppState, user: CurrentUser, kind: Kind) -> Result<Json<Vec<Record>>, ApiError> {
    let user_id = user.0.user_id;
    let records = state
        .store
        .call(move |db| db.list_records(&user_id, kind))
        .await?;
    Ok(Json(records))
}

async fn create(
    state: AppState,
    user: CurrentUser,
    kind: Kind,
    body: Value,
) -> Result<Json<Record>, ApiError> {
    if kind.supports_upsert_by_id() {
        let id = body
            .get("id")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        return upsert(state, user, kind, id, body).await;
    }

    let payload = validated(kind, body)?;
    let user_id = user.0.user_id;
    let record = state
        .store
        .call(move |db| db.create_record(&user_id, kind, payload))
        .await?;
    tracing::info!(user = %record.user_id, kind = %kind, id = %record.id, "Record created");
    Ok(Json(record))
}

async fn upsert(
    state: AppState,
    user: CurrentUser,
    kind: Kind,
    id: Option<String>,
    body: Value,
) -> Result<Json<Record>, ApiError> {
    let payload = validated(kind, body)?;
    let user_id = user.0.user_id;
    let record = state
        .store
        .call(move |db| db.upsert_record(&user_id, kind, id, payload))
        .await?;
    tracing::info!(user = %record.user_id, kind = %kind, id = %record.id, "Record saved");
    Ok(Json(record))
}

async fn remove(
    state: AppState,
    user: CurrentUser,
    kind: Kind,
    id: String,
) -> Result<StatusCode, ApiError> {
    let user_id = user.0.user_id;
    state
        .store
        .call(move |db| db.delete_record(&user_id, kind, &id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn read_singleton(state: AppState, user: CurrentUser, kind: Kind) -> Result<Json<Value>, ApiError> {
    let user_id = user.0.user_id;
    let value = state
        .store
        .call(move |db| {
            // No subscription means none was ever bought; there is no default tier.
            if kind == Kind::Subscription {
                return Ok(db
                    .get_singleton(&user_id, kind)?
                    .map(|record| Value::Object(record.payload))
                    .unwrap_or(Value::Null));
            }
            db.singleton_payload_or_default(&user_id, kind)
                .map(Value::Object)
        })
        .await?;
    Ok(Json(value))
}

async fn write_singleton(
    state: AppState,
    user: CurrentUser,
    kind: Kind,
    body: Value,
) -> Result<Json<Payload>, ApiError> {
    let payload = validated(kind, body)?;
    let user_id = user.0.user_id;
    let record = state
        .store
        .call(move |db| db.upsert_singleton(&user_id, kind, payload))
        .await?;
    tracing::info!(user = %record.user_id, kind = %kind, "Singleton replaced");
    Ok(Json(record.payload))
}

pub async fn mindful_minutes_today(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Value>, ApiError> {
    let user_id = user.0.user_id;
    let today = Utc::now().date_naive();
    let total = state
        .store
        .call(move |db| db.mindful_minutes_on(&user_id, today))
        .await?;
    Ok(Json(json!({ "totalMinutesToday": total })))
}

pub async fn snapshot(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Snapshot>, ApiError> {
    let user_id = user.0.user_id;
    let today = Utc::now().date_naive();
    let snapshot = state
        .store
        .call(move |db| db.snapshot(&user_id, today))
        .await?;
    Ok(Json(snapshot))
}
