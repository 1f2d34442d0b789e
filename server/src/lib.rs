//! SyncDB Server - reference sync peer for SyncDB clients.
//!
//! Holds an in-memory authoritative store and speaks the SyncDB protocol over
//! a WebSocket at `/sync`. Clients push records with `create` and receive
//! `ok`; they pull with `get-changes` and receive `sending-changes` followed
//! by the changes themselves.

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod store;
pub mod websocket;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::store::RemoteStore;
use crate::websocket::ConnectionManager;

/// Application state shared across handlers.
#[derive(Clone, Default)]
pub struct AppState {
    pub conn_manager: Arc<ConnectionManager>,
    pub store: Arc<RemoteStore>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            conn_manager: ConnectionManager::new_shared(),
            store: Arc::new(RemoteStore::new()),
        }
    }
}

/// Build the router with tracing and CORS layers.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Serve on an already bound listener until the process stops.
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> std::io::Result<()> {
    axum::serve(listener, app(state)).await
}
