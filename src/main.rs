use anyhow::Result;
use axum::extract::State;
use axum::http::{self, header};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use snapmatch::code::RoomCode;
use snapmatch::config::{self, RoomPolicy};
use snapmatch::room::registry::RoomRegistry;
use snapmatch::telemetry;
use snapmatch::ws::{ws_handler, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();

    let policy = RoomPolicy::from_env();
    let state = AppState {
        rooms: RoomRegistry::new(policy),
    };

    let app = Router::new()
        .route("/healthz", get(health))
        .route("/api/room", post(create_room))
        .route("/api/room/:code/ws", get(ws_handler))
        .layer(
            CorsLayer::new()
                .allow_methods([http::Method::GET, http::Method::POST])
                .allow_headers([header::CONTENT_TYPE])
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config::server_addr();
    info!("listening on http://{}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize, Deserialize)]
struct CreateRoomResponse {
    room_code: RoomCode,
    share_url: String,
}

/// Reserve a fresh code. The room itself is only spawned on the first
/// join over the websocket, so an abandoned code costs nothing.
async fn create_room(State(state): State<AppState>) -> Json<CreateRoomResponse> {
    let room_code = state.rooms.fresh_code();
    let host =
        std::env::var("HOST_PUBLIC_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
    Json(CreateRoomResponse {
        room_code,
        share_url: format!("{}/{}", host.trim_end_matches('/'), room_code),
    })
}
