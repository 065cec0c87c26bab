//! Axum request handlers for all console endpoints.
//!
//! Every handler takes the raw body bytes, opens the envelope itself, and
//! answers through [`AppState::reply`], so successes and errors alike leave
//! the server sealed. Rejections raised before a handler runs are sealed by
//! [`super::middleware::seal_bare_errors`]. Only `/health` answers in
//! plaintext.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use common::protocol::{HealthResponse, LoginResponse};
use common::{EnvelopeLocation, ServiceError};
use envelope::Payload;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::records::{owned_by, required_str, Record, ID_FIELD, OWNER_FIELD};
use super::sessions::{Role, Session};
use super::state::{session_token, AppState};

use EnvelopeLocation::{NestedUnderData, TopLevel};

const BATCH_CODE: &str = "batchCode";
const BATCH_ID: &str = "batchId";
const TOPIC_NAME: &str = "topicName";
const STATUS: &str = "status";

type Outcome = Result<Value, ServiceError>;

#[derive(Deserialize)]
struct AdminCredentials {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Deserialize)]
struct TrainerCredentials {
    #[serde(default, rename = "empId")]
    emp_id: String,
    #[serde(default)]
    password: String,
}

fn parse<T: serde::de::DeserializeOwned>(payload: Payload) -> Result<T, ServiceError> {
    serde_json::from_value(Value::Object(payload))
        .map_err(|_| ServiceError::BadRequest("unexpected request fields".into()))
}

fn require_admin(session: &Session) -> Result<(), ServiceError> {
    match session.role {
        Role::Admin => Ok(()),
        Role::Trainer => Err(ServiceError::Forbidden),
    }
}

/// The trainer's record id, or 403 for any other role.
fn require_trainer(session: &Session) -> Result<&str, ServiceError> {
    match session.role {
        Role::Trainer => Ok(&session.subject),
        Role::Admin => Err(ServiceError::Forbidden),
    }
}

fn login_response(token: String, role: Role) -> Outcome {
    serde_json::to_value(LoginResponse {
        token,
        role: Some(role.as_str().into()),
    })
    .map_err(|e| ServiceError::Internal(e.to_string()))
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// `POST /adlogin`: `{ username, password }` → `{ token, role }`.
pub async fn admin_login(State(state): State<AppState>, body: Bytes) -> Response {
    let outcome: Outcome = async {
        let creds: AdminCredentials = parse(state.open(&body)?)?;
        if !state.admin.verify(&creds.username, &creds.password) {
            return Err(ServiceError::Unauthorized);
        }
        let token = state.sessions.issue(Role::Admin, state.admin.username()).await;
        info!(role = "admin", "session issued");
        login_response(token, Role::Admin)
    }
    .await;
    state.reply(StatusCode::OK, NestedUnderData, outcome)
}

/// `POST /trainer/login`: `{ empId, password }` → `{ token, role }`.
pub async fn trainer_login(State(state): State<AppState>, body: Bytes) -> Response {
    let outcome: Outcome = async {
        let creds: TrainerCredentials = parse(state.open(&body)?)?;
        let trainer = state
            .trainers
            .authenticate(&creds.emp_id, &creds.password)
            .await?;
        let id = required_str(&trainer, ID_FIELD)?;
        let token = state.sessions.issue(Role::Trainer, id).await;
        info!(role = "trainer", "session issued");
        login_response(token, Role::Trainer)
    }
    .await;
    state.reply(StatusCode::OK, NestedUnderData, outcome)
}

/// `POST /logout`: revoke the calling session.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let outcome: Outcome = async {
        state.authorize(&headers).await?;
        if let Some(token) = session_token(&headers) {
            state.sessions.revoke(token).await;
        }
        Ok(json!({ "message": "Logged out" }))
    }
    .await;
    state.reply(StatusCode::OK, NestedUnderData, outcome)
}

// ---------------------------------------------------------------------------
// Trainers (admin)
// ---------------------------------------------------------------------------

/// `GET /trainers` → `{ trainers }`.
pub async fn list_trainers(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let outcome: Outcome = async {
        require_admin(&state.authorize(&headers).await?)?;
        Ok(json!({ "trainers": state.trainers.list().await }))
    }
    .await;
    state.reply(StatusCode::OK, NestedUnderData, outcome)
}

/// `POST /trainers` → bare envelope of `{ message, trainer }`.
pub async fn create_trainer(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let outcome: Outcome = async {
        require_admin(&state.authorize(&headers).await?)?;
        let trainer = state.trainers.create(state.open(&body)?).await?;
        info!("trainer created");
        Ok(json!({ "message": "Trainer created", "trainer": trainer }))
    }
    .await;
    state.reply(StatusCode::CREATED, TopLevel, outcome)
}

/// `PUT /trainers/{id}` → `{ message, trainer }`.
pub async fn update_trainer(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let outcome: Outcome = async {
        require_admin(&state.authorize(&headers).await?)?;
        let trainer = state.trainers.update(&id, state.open(&body)?).await?;
        Ok(json!({ "message": "Trainer updated", "trainer": trainer }))
    }
    .await;
    state.reply(StatusCode::OK, NestedUnderData, outcome)
}

/// `DELETE /trainers/{id}`: also ends the trainer's sessions.
pub async fn delete_trainer(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let outcome: Outcome = async {
        require_admin(&state.authorize(&headers).await?)?;
        state.trainers.remove(&id).await?;
        let revoked = state.sessions.revoke_subject(&id).await;
        info!(revoked_sessions = revoked, "trainer deleted");
        Ok(json!({ "message": "Trainer deleted" }))
    }
    .await;
    state.reply(StatusCode::OK, NestedUnderData, outcome)
}

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// `GET /profile` → `{ profile }`.
pub async fn get_profile(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let outcome: Outcome = async {
        let session = state.authorize(&headers).await?;
        let profile = match session.role {
            Role::Admin => json!({ "username": state.admin.username(), "role": "admin" }),
            Role::Trainer => Value::Object(
                state
                    .trainers
                    .get(&session.subject)
                    .await
                    .ok_or_else(|| ServiceError::NotFound("Trainer not found".into()))?,
            ),
        };
        Ok(json!({ "profile": profile }))
    }
    .await;
    state.reply(StatusCode::OK, NestedUnderData, outcome)
}

/// `PUT /profile`: a trainer edits their own record (not its `status`).
pub async fn update_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let outcome: Outcome = async {
        let session = state.authorize(&headers).await?;
        let id = require_trainer(&session)?;
        let mut patch = state.open(&body)?;
        patch.remove(STATUS);
        let profile = state.trainers.update(id, patch).await?;
        Ok(json!({ "message": "Profile updated", "profile": profile }))
    }
    .await;
    state.reply(StatusCode::OK, NestedUnderData, outcome)
}

// ---------------------------------------------------------------------------
// Batches
// ---------------------------------------------------------------------------

/// `GET /batches` → bare envelope of `{ batches }`.
pub async fn list_batches(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let outcome: Outcome = async {
        state.authorize(&headers).await?;
        Ok(json!({ "batches": state.batches.all().await }))
    }
    .await;
    state.reply(StatusCode::OK, TopLevel, outcome)
}

/// `GET /batches/trainer/my-batches` → `{ batches }` owned by the caller.
pub async fn my_batches(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let outcome: Outcome = async {
        let session = state.authorize(&headers).await?;
        let id = require_trainer(&session)?;
        Ok(json!({ "batches": state.batches.matching(OWNER_FIELD, id).await }))
    }
    .await;
    state.reply(StatusCode::OK, NestedUnderData, outcome)
}

/// `POST /api/v1/batches` → `{ message, batch }`.
pub async fn create_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let outcome: Outcome = async {
        let session = state.authorize(&headers).await?;
        let id = require_trainer(&session)?;
        let mut fields = state.open(&body)?;
        required_str(&fields, BATCH_CODE)?;
        fields.insert(OWNER_FIELD.into(), Value::String(id.to_owned()));
        let batch = state.batches.insert(fields).await;
        Ok(json!({ "message": "Batch created", "batch": batch }))
    }
    .await;
    state.reply(StatusCode::CREATED, NestedUnderData, outcome)
}

/// `PUT /api/v1/batches/{id}` → `{ message, batch }`.
pub async fn update_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let outcome: Outcome = async {
        let session = state.authorize(&headers).await?;
        let owner = require_trainer(&session)?;
        let patch = state.open(&body)?;
        if patch.contains_key(BATCH_CODE) {
            required_str(&patch, BATCH_CODE)?;
        }
        let batch = state
            .batches
            .update(&batch_id, patch, &[OWNER_FIELD], |b| owned_by(b, owner))
            .await?;
        Ok(json!({ "message": "Batch updated", "batch": batch }))
    }
    .await;
    state.reply(StatusCode::OK, NestedUnderData, outcome)
}

/// `DELETE /api/v1/batches/{id}`: also deletes the batch's topics.
pub async fn delete_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let outcome: Outcome = async {
        let session = state.authorize(&headers).await?;
        let owner = require_trainer(&session)?;
        let _membership = state.batch_membership.lock().await;
        state
            .batches
            .remove(&batch_id, |b| owned_by(b, owner))
            .await?;
        let topics_removed = state.topics.remove_matching(BATCH_ID, &batch_id).await;
        Ok(json!({ "message": "Batch deleted", "topicsRemoved": topics_removed }))
    }
    .await;
    state.reply(StatusCode::OK, NestedUnderData, outcome)
}

// ---------------------------------------------------------------------------
// Topics
// ---------------------------------------------------------------------------

/// Require that `batch_id` names a batch owned by `owner`.
async fn owned_batch(state: &AppState, batch_id: &str, owner: &str) -> Result<Record, ServiceError> {
    let batch = state
        .batches
        .get(batch_id)
        .await
        .ok_or_else(|| ServiceError::NotFound("Batch not found".into()))?;
    owned_by(&batch, owner)?;
    Ok(batch)
}

/// `POST /topics` → `{ message, topic }`.
pub async fn create_topic(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let outcome: Outcome = async {
        let session = state.authorize(&headers).await?;
        let owner = require_trainer(&session)?;
        let mut fields = state.open(&body)?;
        required_str(&fields, TOPIC_NAME)?;
        let _membership = state.batch_membership.lock().await;
        owned_batch(&state, required_str(&fields, BATCH_ID)?, owner).await?;
        fields.insert(OWNER_FIELD.into(), Value::String(owner.to_owned()));
        let topic = state.topics.insert(fields).await;
        Ok(json!({ "message": "Topic created", "topic": topic }))
    }
    .await;
    state.reply(StatusCode::CREATED, NestedUnderData, outcome)
}

/// `PUT /topics/{id}` → `{ message, topic }`.
pub async fn update_topic(
    State(state): State<AppState>,
    Path(topic_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let outcome: Outcome = async {
        let session = state.authorize(&headers).await?;
        let owner = require_trainer(&session)?;
        let patch = state.open(&body)?;
        if patch.contains_key(TOPIC_NAME) {
            required_str(&patch, TOPIC_NAME)?;
        }
        let _membership = if patch.contains_key(BATCH_ID) {
            let guard = state.batch_membership.lock().await;
            owned_batch(&state, required_str(&patch, BATCH_ID)?, owner).await?;
            Some(guard)
        } else {
            None
        };
        let topic = state
            .topics
            .update(&topic_id, patch, &[OWNER_FIELD], |t| owned_by(t, owner))
            .await?;
        Ok(json!({ "message": "Topic updated", "topic": topic }))
    }
    .await;
    state.reply(StatusCode::OK, NestedUnderData, outcome)
}

/// `GET /topics/trainer/my-topics` → `{ topics }` owned by the caller.
pub async fn my_topics(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let outcome: Outcome = async {
        let session = state.authorize(&headers).await?;
        let id = require_trainer(&session)?;
        Ok(json!({ "topics": state.topics.matching(OWNER_FIELD, id).await }))
    }
    .await;
    state.reply(StatusCode::OK, NestedUnderData, outcome)
}

/// `GET /topics/batch/{batch_id}` → `{ topics }` of one batch.
pub async fn batch_topics(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let outcome: Outcome = async {
        state.authorize(&headers).await?;
        if state.batches.get(&batch_id).await.is_none() {
            return Err(ServiceError::NotFound("Batch not found".into()));
        }
        Ok(json!({ "topics": state.topics.matching(BATCH_ID, &batch_id).await }))
    }
    .await;
    state.reply(StatusCode::OK, NestedUnderData, outcome)
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// `GET /health`: plaintext liveness check with the live session count.
pub async fn health(State(state): State<AppState>) -> Response {
    let body = HealthResponse {
        status: "ok".into(),
        sessions: state.sessions.len().await,
    };
    (StatusCode::OK, Json(body)).into_response()
}

/// Catch-all 404, sealed like every other error.
pub async fn not_found(State(state): State<AppState>) -> Response {
    state.failure(&ServiceError::NotFound(
        "the requested resource does not exist".into(),
    ))
}
