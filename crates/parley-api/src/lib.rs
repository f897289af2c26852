//! # parley-api
//!
//! REST API layer for Parley: the Call aggregate surface, voice presence
//! snapshots, and health. Real-time signaling lives in `parley-gateway`;
//! these endpoints are the durable-record side of the system.

pub mod middleware;
pub mod routes;

use axum::Router;
use parley_presence::{PresenceRegistry, VoiceChannelTracker};
use parley_store::repository::CallRepository;
use std::sync::Arc;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    /// Call aggregate repository over the document store.
    pub calls: Arc<CallRepository>,
    /// Presence registry — read-only here, for health/occupancy stats.
    pub registry: PresenceRegistry,
    /// Voice channel tracker, shared with the gateway for snapshot queries.
    pub tracker: Arc<VoiceChannelTracker>,
}

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .merge(routes::calls::router())
        .merge(routes::voice::router())
        .merge(routes::health::router());

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::compression::CompressionLayer::new())
        .with_state(Arc::new(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use parley_store::memory::{MemoryCallStore, MemoryUserDirectory};
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use uuid::Uuid;

    fn test_router() -> (Router, Arc<AppState>) {
        let _ = parley_common::config::init();
        let state = AppState {
            calls: Arc::new(CallRepository::new(MemoryCallStore::new())),
            registry: PresenceRegistry::new(),
            tracker: Arc::new(VoiceChannelTracker::new(MemoryUserDirectory::new())),
        };
        let shared = Arc::new(state.clone());
        (build_router(state), shared)
    }

    fn token(user: Uuid) -> String {
        let secret = &parley_common::config::get().auth.jwt_secret;
        parley_common::auth::issue_token(user, "tester", secret, 300).unwrap()
    }

    async fn send(
        router: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn call_routes_require_a_valid_token() {
        let (router, _) = test_router();

        let (status, _) = send(&router, "GET", "/api/v1/calls/active", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) =
            send(&router, "GET", "/api/v1/calls/active", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "INVALID_TOKEN");
    }

    #[tokio::test]
    async fn call_lifecycle_over_rest() {
        let (router, _) = test_router();
        let alice = token(Uuid::new_v4());
        let bob_id = Uuid::new_v4();
        let bob = token(bob_id);

        let (status, call) = send(
            &router,
            "POST",
            "/api/v1/calls",
            Some(&alice),
            Some(json!({ "call_type": "voice" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let call_id = call["id"].as_str().unwrap().to_string();

        let (status, _) = send(
            &router,
            "POST",
            &format!("/api/v1/calls/{call_id}/join"),
            Some(&bob),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            &router,
            "POST",
            &format!("/api/v1/calls/{call_id}/join"),
            Some(&bob),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "ALREADY_IN_CALL");

        let (status, body) = send(
            &router,
            "PATCH",
            &format!("/api/v1/calls/{call_id}/participant"),
            Some(&bob),
            Some(json!({ "microphone": false })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let bob_entry = body["participants"]
            .as_array()
            .unwrap()
            .iter()
            .find(|p| p["user_id"] == json!(bob_id))
            .unwrap();
        assert_eq!(bob_entry["media_state"]["microphone"], json!(false));

        let (status, body) = send(
            &router,
            "GET",
            "/api/v1/calls/active",
            Some(&bob),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, _) = send(
            &router,
            "POST",
            &format!("/api/v1/calls/{call_id}/leave"),
            Some(&bob),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            &router,
            "POST",
            &format!("/api/v1/calls/{call_id}/leave"),
            Some(&alice),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(!body["end_time"].is_null(), "last leave ends the call");

        let (status, body) = send(
            &router,
            "POST",
            &format!("/api/v1/calls/{call_id}/join"),
            Some(&token(Uuid::new_v4())),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::GONE);
        assert_eq!(body["error"], "CALL_ENDED");
    }

    #[tokio::test]
    async fn full_call_rejects_with_403() {
        let (router, _) = test_router();
        let alice = token(Uuid::new_v4());

        let (status, call) = send(
            &router,
            "POST",
            "/api/v1/calls",
            Some(&alice),
            Some(json!({
                "call_type": "voice",
                "settings": {
                    "max_participants": 1,
                    "require_password": false,
                    "allow_screen_share": true,
                    "allow_camera": true,
                    "recording_allowed": false,
                }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let call_id = call["id"].as_str().unwrap();

        let (status, body) = send(
            &router,
            "POST",
            &format!("/api/v1/calls/{call_id}/join"),
            Some(&token(Uuid::new_v4())),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "CALL_FULL");
    }

    #[tokio::test]
    async fn out_of_range_settings_fail_validation() {
        let (router, _) = test_router();
        let alice = token(Uuid::new_v4());

        let (status, body) = send(
            &router,
            "POST",
            "/api/v1/calls",
            Some(&alice),
            Some(json!({
                "call_type": "voice",
                "settings": {
                    "max_participants": 0,
                    "require_password": false,
                    "allow_screen_share": true,
                    "allow_camera": true,
                    "recording_allowed": false,
                }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn unknown_call_is_404() {
        let (router, _) = test_router();
        let (status, body) = send(
            &router,
            "GET",
            &format!("/api/v1/calls/{}", Uuid::now_v7()),
            Some(&token(Uuid::new_v4())),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn voice_snapshot_reflects_tracker_state() {
        let (router, state) = test_router();
        let channel = Uuid::new_v4();
        let user = Uuid::new_v4();
        state.tracker.join(channel, user, &state.registry).await;

        let (status, body) = send(
            &router,
            "GET",
            "/api/v1/voice/states",
            Some(&token(Uuid::new_v4())),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let members = &body["channels"][channel.to_string().as_str()];
        assert_eq!(members[0]["user_id"], json!(user));

        let (status, body) = send(
            &router,
            "GET",
            &format!("/api/v1/voice/channels/{channel}"),
            Some(&token(Uuid::new_v4())),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["member_count"], json!(1));
    }

    #[tokio::test]
    async fn health_needs_no_auth() {
        let (router, _) = test_router();
        let (status, body) = send(&router, "GET", "/api/v1/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }
}
