//! Sync endpoint routes.

use axum::{
    extract::{ws::WebSocketUpgrade, Path, State},
    response::Response,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::{Map, Value};
use syncdb_engine::Version;

use crate::error::{AppError, Result};
use crate::handlers::handle_websocket_connection;
use crate::AppState;

/// Authoritative copy of one record.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordResponse {
    pub store_name: String,
    pub key: String,
    pub version: Version,
    pub payload: Map<String, Value>,
}

/// Create sync routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sync", get(sync_socket))
        .route("/records/{store}/{key}", get(get_record))
}

/// GET /sync - Upgrade to a protocol WebSocket.
async fn sync_socket(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_websocket_connection(socket, state))
}

/// GET /records/{store}/{key} - Inspect the server copy of a record.
async fn get_record(
    State(state): State<AppState>,
    Path((store, key)): Path<(String, String)>,
) -> Result<Json<RecordResponse>> {
    let stored = state
        .store
        .get(&store, &key)
        .await
        .ok_or_else(|| AppError::NotFound(format!("{store}/{key}")))?;

    Ok(Json(RecordResponse {
        store_name: store,
        key,
        version: stored.version,
        payload: stored.payload,
    }))
}
