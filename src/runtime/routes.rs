//! Axum route handlers for the coordinator.
//!
//! # Routes
//!
//! - `GET /health`                   liveness probe with context state
//! - `GET /negotiate/:client_type`   per-connection client configuration
//! - `GET /state/:name`              current values of a shared state

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::experience::ServerExperience;
use super::negotiation::{negotiate, ConnectionMetadata, NegotiatedConfig, NegotiationCallback};
use crate::config::AppConfig;
use crate::plugins::RuntimeContext;
use crate::state::StateManager;

/// Shared application state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub negotiation: NegotiationCallback,
    pub states: Arc<StateManager>,
    pub context: Arc<RuntimeContext>,
    pub experience: Arc<ServerExperience>,
}

/// Build the axum router with all routes.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/negotiate/:client_type", get(negotiate_handler))
        .route("/state/:name", get(state_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": crate::VERSION,
        "service": state.config.app.name,
        "context": state.context.state(),
        "experience": state.experience.client_type(),
    }))
}

/// GET /negotiate/:client_type
///
/// A rejected negotiation fails only this request.
async fn negotiate_handler(
    State(state): State<AppState>,
    Path(client_type): Path<String>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Result<Json<NegotiatedConfig>, (StatusCode, Json<Value>)> {
    let connection = ConnectionMetadata {
        remote_addr: connect_info.map(|ConnectInfo(addr)| addr),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };

    negotiate(&state.negotiation, &client_type, &state.config, &connection)
        .map(Json)
        .map_err(|err| (StatusCode::BAD_REQUEST, Json(json!({ "error": err.to_string() }))))
}

/// GET /state/:name
async fn state_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match state.states.get(&name) {
        Some(shared) => Ok(Json(json!({
            "id": shared.id(),
            "schema": shared.schema_name(),
            "values": shared.values(),
        }))),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("State '{}' not found", name) })),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::runtime::coordinator::Coordinator;
    use crate::runtime::negotiation::{default_negotiation, fixtures};

    async fn app() -> Router {
        Coordinator::new(fixtures::app_config())
            .unwrap()
            .init(default_negotiation())
            .await
            .unwrap()
            .start()
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .uri(uri)
            .header(header::USER_AGENT, "test-agent")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (status, json) = get_json(app().await, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], crate::VERSION);
        assert_eq!(json["context"], "started");
        assert_eq!(json["experience"], "player");
    }

    #[tokio::test]
    async fn test_negotiate_player() {
        let (status, json) = get_json(app().await, "/negotiate/player").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["clientType"], "player");
        assert_eq!(json["app"]["name"], "ensemble");
        assert_eq!(json["env"]["type"], "development");

        let object = json.as_object().unwrap();
        let mut keys: Vec<&str> = object.keys().map(String::as_str).collect();
        keys.sort();
        assert_eq!(keys, vec!["app", "clientType", "env"]);
    }

    #[tokio::test]
    async fn test_negotiate_unknown_type_is_bad_request() {
        let app = app().await;
        let (status, json) = get_json(app.clone(), "/negotiate/controller").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("controller"));

        let (status, _) = get_json(app, "/negotiate/player").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_state_endpoint() {
        let app = app().await;
        let (status, json) = get_json(app.clone(), "/state/globals").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["values"]["volume"], 1.0);

        let (status, _) = get_json(app, "/state/float").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
