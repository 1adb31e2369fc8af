//! JSON-RPC endpoint for guest interface operations.
//!
//! Requests are `{"method": "OVS.<Method>", "params": [GuestRequest], "id": ..}`
//! and responses always carry `result`, `error` and `id`, with the unused one
//! set to null. Malformed calls are rejected with 400; failed operations are
//! reported in `error` with 200.

use std::fmt;
use std::str::FromStr;

use axum::{
    body::Bytes, extract::State, http::StatusCode, routing::get, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::guest::{GuestRequest, GuestResponse};
use crate::state::AppState;

/// Path the RPC endpoint is served on.
pub const RPC_PATH: &str = "/_mistify_RPC_";

/// Service name methods are registered under.
pub const SERVICE_NAME: &str = "OVS";

/// Incoming call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub method: String,

    #[serde(default)]
    pub params: Vec<Value>,

    #[serde(default)]
    pub id: Value,
}

/// Outgoing reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub result: Option<GuestResponse>,
    pub error: Option<String>,
    pub id: Value,
}

impl RpcResponse {
    fn ok(id: Value, result: GuestResponse) -> Self {
        Self {
            result: Some(result),
            error: None,
            id,
        }
    }

    fn err(id: Value, error: impl Into<String>) -> Self {
        Self {
            result: None,
            error: Some(error.into()),
            id,
        }
    }
}

/// The operations callable over RPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcMethod {
    AddGuestInterfaces,
    RemoveGuestInterfaces,
}

impl FromStr for RpcMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s
            .strip_prefix(SERVICE_NAME)
            .and_then(|rest| rest.strip_prefix('.'))
            .ok_or_else(|| format!("rpc: can't find service {s}"))?;

        match name {
            "AddGuestInterface" | "AddGuestInterfaces" => Ok(Self::AddGuestInterfaces),
            "RemoveGuestInterface" | "RemoveGuestInterfaces" => Ok(Self::RemoveGuestInterfaces),
            _ => Err(format!("rpc: can't find method {s}")),
        }
    }
}

impl fmt::Display for RpcMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddGuestInterfaces => write!(f, "{SERVICE_NAME}.AddGuestInterfaces"),
            Self::RemoveGuestInterfaces => write!(f, "{SERVICE_NAME}.RemoveGuestInterfaces"),
        }
    }
}

/// Create the RPC route.
pub fn routes() -> Router<AppState> {
    Router::new().route(RPC_PATH, get(handle).post(handle))
}

async fn handle(State(state): State<AppState>, body: Bytes) -> (StatusCode, Json<RpcResponse>) {
    let request: RpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Rejecting malformed RPC request");
            return (
                StatusCode::BAD_REQUEST,
                Json(RpcResponse::err(Value::Null, format!("invalid request: {e}"))),
            );
        }
    };

    let (status, response) = dispatch(&state, request).await;
    (status, Json(response))
}

/// Route a decoded call to the guest interface service.
pub async fn dispatch(state: &AppState, request: RpcRequest) -> (StatusCode, RpcResponse) {
    let RpcRequest { method, params, id } = request;

    let method: RpcMethod = match method.parse() {
        Ok(method) => method,
        Err(e) => {
            warn!(method = %method, "Unknown RPC method");
            return (StatusCode::BAD_REQUEST, RpcResponse::err(id, e));
        }
    };

    let params = match decode_params(params) {
        Ok(params) => params,
        Err(e) => {
            warn!(%method, error = %e, "Invalid RPC params");
            return (StatusCode::BAD_REQUEST, RpcResponse::err(id, e));
        }
    };

    info!(%method, id = %id, "Handling RPC call");
    let service = state.service();
    let result = match method {
        RpcMethod::AddGuestInterfaces => service.add_guest_interfaces(params).await,
        RpcMethod::RemoveGuestInterfaces => service.remove_guest_interfaces(params).await,
    };

    match result {
        Ok(response) => (StatusCode::OK, RpcResponse::ok(id, response)),
        Err(e) => {
            warn!(%method, id = %id, error = %e, "RPC call failed");
            (StatusCode::OK, RpcResponse::err(id, e.to_string()))
        }
    }
}

fn decode_params(params: Vec<Value>) -> Result<GuestRequest, String> {
    let [param]: [Value; 1] = params
        .try_into()
        .map_err(|p: Vec<Value>| format!("expected 1 parameter, got {}", p.len()))?;
    serde_json::from_value(param).map_err(|e| format!("invalid parameter: {e}"))
}
