//! HTTP API handlers and routing.

mod health;
pub mod rpc;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub use rpc::{RpcRequest, RpcResponse, RPC_PATH, SERVICE_NAME};

/// Create the agent router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .merge(health::routes())
        // Guest interface RPC
        .merge(rpc::routes())
        // Middleware
        .layer(TraceLayer::new_for_http())
        // Application state
        .with_state(state)
}
