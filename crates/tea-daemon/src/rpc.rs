//! JSON-RPC server over Unix socket.
//!
//! Listens on a Unix domain socket, accepts connections, and dispatches
//! newline-delimited JSON-RPC 2.0 calls to the command handlers.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tea_staking::{ErrorCategory, StakingError};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tracing::{debug, error, info, warn};

use crate::commands;
use crate::DaemonState;

/// JSON-RPC request.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    /// Request ID.
    pub id: serde_json::Value,
    /// Method name.
    pub method: String,
    /// Parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

/// JSON-RPC response.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    /// JSON-RPC version.
    pub jsonrpc: String,
    /// Request ID.
    pub id: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// JSON-RPC error object.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RpcError {
    pub code: i32,
    /// SCREAMING_SNAKE error name.
    pub message: String,
    /// Optional structured data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcResponse {
    /// Create a success response.
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: serde_json::Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

impl RpcError {
    /// Parse error (-32700).
    pub fn parse_error() -> Self {
        Self {
            code: -32700,
            message: "PARSE_ERROR".to_string(),
            data: None,
        }
    }

    /// Invalid request (-32600).
    pub fn invalid_request() -> Self {
        Self {
            code: -32600,
            message: "INVALID_REQUEST".to_string(),
            data: None,
        }
    }

    /// Method not found (-32601).
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: "METHOD_NOT_FOUND".to_string(),
            data: Some(serde_json::json!({"method": method})),
        }
    }

    /// Invalid params (-32602).
    pub fn invalid_params(detail: &str) -> Self {
        Self {
            code: -32602,
            message: "INVALID_PARAMS".to_string(),
            data: Some(serde_json::json!({"detail": detail})),
        }
    }

    /// Internal error (-32603).
    pub fn internal_error(detail: &str) -> Self {
        Self {
            code: -32603,
            message: "INTERNAL_ERROR".to_string(),
            data: Some(serde_json::json!({"detail": detail})),
        }
    }
}

/// Ledger errors: one code block per category, the variant name as message.
impl From<StakingError> for RpcError {
    fn from(err: StakingError) -> Self {
        let code = match err.category() {
            ErrorCategory::Configuration => -32100,
            ErrorCategory::Authorization => -32110,
            ErrorCategory::Eligibility => -32120,
            ErrorCategory::Lifecycle => -32130,
            ErrorCategory::AccountingBound => -32140,
            ErrorCategory::External => -32150,
        };
        Self {
            code,
            message: err.code_name().to_string(),
            data: Some(serde_json::json!({"detail": err.to_string()})),
        }
    }
}

/// The RPC server.
pub struct RpcServer {
    state: Arc<DaemonState>,
    socket_path: PathBuf,
}

impl RpcServer {
    /// Create a new RPC server.
    pub fn new(state: Arc<DaemonState>, socket_path: PathBuf) -> Self {
        Self { state, socket_path }
    }

    /// Run the server, accepting connections.
    pub async fn run(&self) -> anyhow::Result<()> {
        // Remove stale socket file
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        info!(path = ?self.socket_path, "IPC server listening");

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let state = self.state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(state, stream).await {
                            warn!(error = %e, "connection error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "accept error");
                }
            }
        }
    }
}

/// Handle a single client connection.
async fn handle_connection(
    state: Arc<DaemonState>,
    stream: tokio::net::UnixStream,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            break; // EOF
        }
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(request) => dispatch_request(state.clone(), request).await,
            Err(_) => RpcResponse::error(serde_json::Value::Null, RpcError::parse_error()),
        };

        let mut response_json = serde_json::to_string(&response)?;
        response_json.push('\n');
        writer.write_all(response_json.as_bytes()).await?;
        writer.flush().await?;
    }

    Ok(())
}

/// Dispatch a JSON-RPC request to the appropriate command handler.
pub async fn dispatch_request(state: Arc<DaemonState>, request: RpcRequest) -> RpcResponse {
    let id = request.id.clone();
    if request.jsonrpc != "2.0" {
        return RpcResponse::error(id, RpcError::invalid_request());
    }
    let method = request.method.as_str();
    let params = &request.params;

    debug!(method, "dispatching RPC method");

    let result = match method {
        // Staking lifecycle
        "stake" => commands::staking::stake(&state, params).await,
        "unstake" => commands::staking::unstake(&state, params).await,
        "claim" => commands::staking::claim(&state, params).await,
        "withdraw" => commands::staking::withdraw(&state, params).await,
        "forward" => commands::staking::forward(&state, params).await,

        // Reward budget and admin
        "update_reward_per_share" => commands::admin::update_reward_per_share(&state).await,
        "initialize_staking" => commands::admin::initialize_staking(&state, params).await,
        "emergency_withdraw" => commands::admin::emergency_withdraw(&state, params).await,

        // Queries
        "get_total_user_staked_tokens" => {
            commands::queries::get_total_user_staked_tokens(&state, params).await
        }
        "get_user_ids" => commands::queries::get_user_ids(&state, params).await,
        "check_token_validity" => commands::queries::check_token_validity(&state, params).await,
        "total_staked_tokens" => commands::queries::total_staked_tokens(&state).await,
        "get_pending_rewards" => commands::queries::get_pending_rewards(&state, params).await,
        "get_position" => commands::queries::get_position(&state, params).await,
        "operator_user_nonce" => commands::queries::operator_user_nonce(&state, params).await,
        "forwarder_nonce" => commands::queries::forwarder_nonce(&state, params).await,
        "get_reward_state" => commands::queries::get_reward_state(&state).await,
        "get_ledger_info" => commands::queries::get_ledger_info(&state).await,
        "attestation_digest" => commands::queries::attestation_digest(&state, params).await,

        // Dev-only commands
        "dev_mint" => commands::admin::dev_mint(&state, params).await,
        "dev_approve" => commands::admin::dev_approve(&state, params).await,
        "dev_set_entitlement" => commands::admin::dev_set_entitlement(&state, params).await,

        _ => Err(RpcError::method_not_found(method)),
    };

    match result {
        Ok(value) => RpcResponse::success(id, value),
        Err(err) => {
            debug!(method, code = err.code, message = %err.message, "RPC call failed");
            RpcResponse::error(id, err)
        }
    }
}
