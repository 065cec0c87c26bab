//! End-to-end flows: the real `TransportAdapter` against the real router,
//! joined by an in-process exchange instead of a socket.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{body::Body, http::Request, Router};
use backend::server::{credentials::AdminAccount, router, state::AppState};
use common::ConsoleError;
use envelope::crypto::KEY_LEN;
use envelope::transport::{ExchangeError, HttpExchange, OutboundRequest, RawResponse};
use envelope::{
    ConsoleOperation, EnvelopeCodec, KeyMaterial, KeyProvider, Payload, TokenStore,
    TransportAdapter,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

/// Sends adapter requests straight into an axum [`Router`].
struct RouterExchange {
    router: Router,
}

#[async_trait]
impl HttpExchange for RouterExchange {
    async fn exchange(&self, request: OutboundRequest) -> Result<RawResponse, ExchangeError> {
        let mut builder = Request::builder()
            .method(request.method)
            .uri(request.path)
            .header("accept", "application/json");
        if let Some(token) = request.authorization {
            builder = builder.header("authorization", token);
        }
        let body = match request.body {
            Some(bytes) => {
                builder = builder.header("content-type", "application/json");
                Body::from(bytes)
            }
            None => Body::empty(),
        };
        let req = builder
            .body(body)
            .map_err(|e| ExchangeError::InvalidRequest(e.to_string()))?;

        let resp = self
            .router
            .clone()
            .oneshot(req)
            .await
            .map_err(|e| ExchangeError::Send(e.to_string()))?;
        let status = resp.status().as_u16();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| ExchangeError::Body(e.to_string()))?
            .to_bytes();
        Ok(RawResponse { status, body })
    }
}

const SHARED_KEY: [u8; KEY_LEN] = [0x5a; KEY_LEN];

fn codec_with(id: &str, bytes: [u8; KEY_LEN]) -> EnvelopeCodec {
    EnvelopeCodec::new(KeyProvider::new(KeyMaterial::new(id, bytes).unwrap()))
}

fn backend_state(codec: EnvelopeCodec) -> AppState {
    AppState::new(
        codec,
        AdminAccount::new("admin", "changeme").unwrap(),
        Duration::from_secs(300),
    )
}

fn client(router: &Router, codec: EnvelopeCodec) -> TransportAdapter {
    TransportAdapter::new(
        codec,
        TokenStore::new(),
        Arc::new(RouterExchange {
            router: router.clone(),
        }),
    )
}

fn setup() -> (Router, AppState) {
    let state = backend_state(codec_with("primary", SHARED_KEY));
    (router::build(state.clone()), state)
}

fn payload(v: Value) -> Payload {
    match v {
        Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

async fn admin(router: &Router) -> TransportAdapter {
    let a = client(router, codec_with("primary", SHARED_KEY));
    a.login(
        ConsoleOperation::AdminLogin,
        &payload(json!({"username": "admin", "password": "changeme"})),
    )
    .await
    .unwrap();
    a
}

async fn trainer(router: &Router, emp_id: &str, password: &str) -> TransportAdapter {
    let t = client(router, codec_with("primary", SHARED_KEY));
    t.login(
        ConsoleOperation::TrainerLogin,
        &payload(json!({"empId": emp_id, "password": password})),
    )
    .await
    .unwrap();
    t
}

async fn create_trainer(admin: &TransportAdapter, emp_id: &str, password: &str) -> String {
    let created = admin
        .call(
            ConsoleOperation::CreateTrainer,
            &payload(json!({"name": "Asha", "empId": emp_id, "email": "asha@example.com", "password": password})),
        )
        .await
        .unwrap();
    created["trainer"]["_id"].as_str().unwrap().to_owned()
}

#[tokio::test]
async fn admin_login_then_trainer_management() {
    let (router, _) = setup();
    let admin = admin(&router).await;
    assert!(admin.tokens().is_authenticated());

    let id = create_trainer(&admin, "E100", "pw-100").await;

    let listed = admin.call(ConsoleOperation::ListTrainers, &Payload::new()).await.unwrap();
    let trainers = listed["trainers"].as_array().unwrap();
    assert_eq!(trainers.len(), 1);
    assert_eq!(trainers[0]["empId"], "E100");
    assert!(trainers[0].get("password").is_none());

    let updated = admin
        .call(
            ConsoleOperation::UpdateTrainer { id: id.clone() },
            &payload(json!({"status": "inactive"})),
        )
        .await
        .unwrap();
    assert_eq!(updated["trainer"]["status"], "inactive");

    let t = client(&router, codec_with("primary", SHARED_KEY));
    let err = t
        .login(
            ConsoleOperation::TrainerLogin,
            &payload(json!({"empId": "E100", "password": "pw-100"})),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ConsoleError::Rejected { status: 403, .. }), "got {err:?}");

    admin
        .call(ConsoleOperation::DeleteTrainer { id }, &Payload::new())
        .await
        .unwrap();
    let listed = admin.call(ConsoleOperation::ListTrainers, &Payload::new()).await.unwrap();
    assert!(listed["trainers"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn unauthenticated_trainer_creation_is_rejected() {
    let (router, state) = setup();
    let anonymous = client(&router, codec_with("primary", SHARED_KEY));
    assert!(anonymous.tokens().get().is_none());

    let err = anonymous
        .call(
            ConsoleOperation::CreateTrainer,
            &payload(json!({"empId": "E1", "password": "pw"})),
        )
        .await
        .unwrap_err();
    assert!(
        matches!(err, ConsoleError::Authentication(ref m) if m == "Unauthorized"),
        "got {err:?}"
    );
    assert!(state.trainers.list().await.is_empty());
}

#[tokio::test]
async fn wrong_password_is_an_authentication_error() {
    let (router, _) = setup();
    let a = client(&router, codec_with("primary", SHARED_KEY));
    let err = a
        .login(
            ConsoleOperation::AdminLogin,
            &payload(json!({"username": "admin", "password": "guess"})),
        )
        .await
        .unwrap_err();
    assert!(err.is_authentication());
    assert!(!a.tokens().is_authenticated());
}

#[tokio::test]
async fn duplicate_emp_id_is_rejected_with_conflict() {
    let (router, _) = setup();
    let admin = admin(&router).await;
    create_trainer(&admin, "E7", "pw").await;
    let err = admin
        .call(
            ConsoleOperation::CreateTrainer,
            &payload(json!({"empId": "E7", "password": "other"})),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ConsoleError::Rejected { status: 409, .. }), "got {err:?}");
}

#[tokio::test]
async fn trainer_batches_and_topics() {
    let (router, _) = setup();
    let admin = admin(&router).await;
    create_trainer(&admin, "E200", "pw-200").await;
    let t = trainer(&router, "E200", "pw-200").await;

    let profile = t.call(ConsoleOperation::GetProfile, &Payload::new()).await.unwrap();
    assert_eq!(profile["profile"]["empId"], "E200");

    let profile = t
        .call(
            ConsoleOperation::UpdateProfile,
            &payload(json!({"phone": "555-0100", "status": "active"})),
        )
        .await
        .unwrap();
    assert_eq!(profile["profile"]["phone"], "555-0100");

    let batch = t
        .call(
            ConsoleOperation::CreateBatch,
            &payload(json!({"batchCode": "RUST-01", "batchTiming": "9-11", "status": "Ongoing"})),
        )
        .await
        .unwrap();
    let batch_id = batch["batch"]["_id"].as_str().unwrap().to_owned();

    // Bare top-level envelope.
    let all = t.call(ConsoleOperation::ListBatches, &Payload::new()).await.unwrap();
    assert_eq!(all["batches"].as_array().unwrap().len(), 1);

    let mine = t.call(ConsoleOperation::MyBatches, &Payload::new()).await.unwrap();
    assert_eq!(mine["batches"][0]["batchCode"], "RUST-01");

    let topic = t
        .call(
            ConsoleOperation::CreateTopic,
            &payload(json!({"batchId": batch_id, "topicName": "Ownership", "startDate": "2026-01-05"})),
        )
        .await
        .unwrap();
    let topic_id = topic["topic"]["_id"].as_str().unwrap().to_owned();

    let updated = t
        .call(
            ConsoleOperation::UpdateTopic { id: topic_id },
            &payload(json!({"topicName": "Borrowing"})),
        )
        .await
        .unwrap();
    assert_eq!(updated["topic"]["topicName"], "Borrowing");

    let by_batch = t
        .call(
            ConsoleOperation::BatchTopics {
                batch_id: batch_id.clone(),
            },
            &Payload::new(),
        )
        .await
        .unwrap();
    assert_eq!(by_batch["topics"].as_array().unwrap().len(), 1);

    let my_topics = t.call(ConsoleOperation::MyTopics, &Payload::new()).await.unwrap();
    assert_eq!(my_topics["topics"][0]["topicName"], "Borrowing");

    let updated = t
        .call(
            ConsoleOperation::UpdateBatch {
                id: batch_id.clone(),
            },
            &payload(json!({"status": "Completed"})),
        )
        .await
        .unwrap();
    assert_eq!(updated["batch"]["status"], "Completed");

    let deleted = t
        .call(
            ConsoleOperation::DeleteBatch { id: batch_id },
            &Payload::new(),
        )
        .await
        .unwrap();
    assert_eq!(deleted["topicsRemoved"], 1);
    let my_topics = t.call(ConsoleOperation::MyTopics, &Payload::new()).await.unwrap();
    assert!(my_topics["topics"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn trainers_cannot_touch_each_others_batches() {
    let (router, _) = setup();
    let admin = admin(&router).await;
    create_trainer(&admin, "A1", "pw-a").await;
    create_trainer(&admin, "B1", "pw-b").await;
    let a = trainer(&router, "A1", "pw-a").await;
    let b = trainer(&router, "B1", "pw-b").await;

    let batch = a
        .call(ConsoleOperation::CreateBatch, &payload(json!({"batchCode": "A-01"})))
        .await
        .unwrap();
    let batch_id = batch["batch"]["_id"].as_str().unwrap().to_owned();

    let err = b
        .call(
            ConsoleOperation::DeleteBatch { id: batch_id },
            &Payload::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ConsoleError::Rejected { status: 403, ref message } if message == "Forbidden"));
}

#[tokio::test]
async fn logout_ends_the_session_on_both_sides() {
    let (router, state) = setup();
    let admin = admin(&router).await;
    assert_eq!(state.sessions.len().await, 1);

    admin.logout().await.unwrap();
    assert!(!admin.tokens().is_authenticated());
    assert_eq!(state.sessions.len().await, 0);

    let err = admin
        .call(ConsoleOperation::ListTrainers, &Payload::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ConsoleError::Authentication(ref m) if m == "Unauthorized"));
}

#[tokio::test]
async fn deleting_a_trainer_invalidates_their_token() {
    let (router, _) = setup();
    let admin = admin(&router).await;
    let id = create_trainer(&admin, "E300", "pw-300").await;
    let t = trainer(&router, "E300", "pw-300").await;

    admin
        .call(ConsoleOperation::DeleteTrainer { id }, &Payload::new())
        .await
        .unwrap();

    let err = t.call(ConsoleOperation::MyBatches, &Payload::new()).await.unwrap_err();
    assert!(err.is_authentication());
    assert!(t.tokens().get().is_none(), "rejected token should be cleared");
}

#[tokio::test]
async fn mismatched_keys_never_yield_plaintext() {
    let (router, state) = setup();
    let stranger = client(&router, codec_with("primary", [0x11; KEY_LEN]));
    let err = stranger
        .login(
            ConsoleOperation::AdminLogin,
            &payload(json!({"username": "admin", "password": "changeme"})),
        )
        .await
        .unwrap_err();
    // The backend cannot open the request and its sealed 400 cannot be
    // opened here either.
    assert!(matches!(err, ConsoleError::Transport(_)), "got {err:?}");
    assert_eq!(state.sessions.len().await, 0);
}

#[tokio::test]
async fn backend_rotation_keeps_old_envelopes_openable() {
    let old = KeyMaterial::new("k2025", SHARED_KEY).unwrap();
    let new = KeyMaterial::new("k2026", [0x6b; KEY_LEN]).unwrap();
    let backend_keys = KeyProvider::with_retired(new, vec![old]).unwrap();
    let state = backend_state(EnvelopeCodec::new(backend_keys));
    let router = router::build(state.clone());
    let creds = payload(json!({"username": "admin", "password": "changeme"}));

    // A client still on the retired key is understood, but cannot read
    // responses sealed under the new one.
    let legacy = client(&router, codec_with("k2025", SHARED_KEY));
    let err = legacy
        .login(ConsoleOperation::AdminLogin, &creds)
        .await
        .unwrap_err();
    assert!(matches!(err, ConsoleError::Decryption), "got {err:?}");
    assert_eq!(state.sessions.len().await, 1);

    // After rotating, the same client reads both.
    let client_keys = KeyProvider::new(KeyMaterial::new("k2025", SHARED_KEY).unwrap());
    client_keys
        .rotate(KeyMaterial::new("k2026", [0x6b; KEY_LEN]).unwrap())
        .unwrap();
    let rotated = client(&router, EnvelopeCodec::new(client_keys));
    rotated.login(ConsoleOperation::AdminLogin, &creds).await.unwrap();
    assert!(rotated.tokens().is_authenticated());
}

#[tokio::test]
async fn unknown_route_is_sealed_not_found() {
    let (router, _) = setup();
    let admin = admin(&router).await;
    let op = envelope::Operation::new("missing", axum::http::Method::GET, "/nope");
    let err = admin.call(op, &Payload::new()).await.unwrap_err();
    assert!(matches!(err, ConsoleError::Rejected { status: 404, .. }), "got {err:?}");
}
