//! Axum router construction.

use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer, trace::TraceLayer};

use super::middleware::{seal_bare_errors, MAX_BODY_BYTES, REQUEST_TIMEOUT};
use super::{handlers, state::AppState};

/// Build the application [`Router`] with all routes and middleware attached.
pub fn build(state: AppState) -> Router {
    Router::new()
        .route("/adlogin", post(handlers::admin_login))
        .route("/trainer/login", post(handlers::trainer_login))
        .route("/logout", post(handlers::logout))
        .route(
            "/trainers",
            get(handlers::list_trainers).post(handlers::create_trainer),
        )
        .route(
            "/trainers/:id",
            put(handlers::update_trainer).delete(handlers::delete_trainer),
        )
        .route(
            "/profile",
            get(handlers::get_profile).put(handlers::update_profile),
        )
        .route("/batches", get(handlers::list_batches))
        .route("/batches/trainer/my-batches", get(handlers::my_batches))
        .route("/api/v1/batches", post(handlers::create_batch))
        .route(
            "/api/v1/batches/:id",
            put(handlers::update_batch).delete(handlers::delete_batch),
        )
        .route("/topics", post(handlers::create_topic))
        .route("/topics/:id", put(handlers::update_topic))
        .route("/topics/trainer/my-topics", get(handlers::my_topics))
        .route("/topics/batch/:batch_id", get(handlers::batch_topics))
        .route("/health", get(handlers::health))
        .fallback(handlers::not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(from_fn_with_state(state.clone(), seal_bare_errors))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::state::test_support::{codec, state};
    use crate::server::sessions::Role;
    use axum::{
        body::Body,
        http::{header::ALLOW, Request, Response, StatusCode},
    };
    use common::protocol::SealedRequest;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn opened(resp: Response<Body>) -> Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        codec().open(body["data"].as_str().unwrap()).unwrap()
    }

    fn sealed_body(v: Value) -> Body {
        let envelope = codec().seal(&v).unwrap();
        Body::from(serde_json::to_vec(&SealedRequest { body: envelope }).unwrap())
    }

    async fn trainer_token(s: &AppState) -> String {
        let fields = match json!({"empId": "E1", "password": "pw"}) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        let trainer = s.trainers.create(fields).await.unwrap();
        let id = trainer["_id"].as_str().unwrap().to_owned();
        s.sessions.issue(Role::Trainer, &id).await
    }

    #[tokio::test]
    async fn unknown_route_returns_sealed_404() {
        let app = build(state());
        let req = Request::builder()
            .uri("/unknown")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 404);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        let opened: Value = codec().open(body["data"].as_str().unwrap()).unwrap();
        assert!(opened["error"].is_string());
    }

    #[tokio::test]
    async fn health_route_exists() {
        let app = build(state());
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 200);
    }

    #[tokio::test]
    async fn protected_route_without_token_is_401() {
        let app = build(state());
        let req = Request::builder()
            .uri("/batches/trainer/my-batches")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 401);
    }

    #[tokio::test]
    async fn wrong_method_is_sealed_405() {
        let app = build(state());
        let req = Request::builder()
            .method("DELETE")
            .uri("/topics/x")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(resp.headers()[ALLOW].to_str().unwrap().contains("PUT"));
        assert_eq!(opened(resp).await["error"], "Method Not Allowed");
    }

    #[tokio::test]
    async fn undecodable_path_is_sealed_400() {
        let app = build(state());
        let req = Request::builder()
            .method("PUT")
            .uri("/trainers/%FF")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(opened(resp).await["error"], "Bad Request");
    }

    #[tokio::test]
    async fn sealed_profile_image_over_two_megabytes_is_accepted() {
        let s = state();
        let token = trainer_token(&s).await;
        let image = format!("data:image/png;base64,{}", "A".repeat(3 * 1024 * 1024));
        let req = Request::builder()
            .method("PUT")
            .uri("/profile")
            .header("authorization", token)
            .body(sealed_body(json!({ "profileImg": &image })))
            .unwrap();
        let resp = build(s).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let profile = opened(resp).await;
        assert_eq!(profile["profile"]["profileImg"].as_str().unwrap().len(), image.len());
    }

    #[tokio::test]
    async fn oversized_body_is_sealed_413() {
        let s = state();
        let token = trainer_token(&s).await;
        let req = Request::builder()
            .method("PUT")
            .uri("/profile")
            .header("authorization", token)
            .body(Body::from(vec![b'a'; MAX_BODY_BYTES + 1]))
            .unwrap();
        let resp = build(s).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(opened(resp).await["error"], "Payload Too Large");
    }
}
