use alloy::transports::{RpcError as AlloyRpcError, TransportErrorKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transport-level failure classes, trimmed to what the engine acts on.
#[derive(Debug, Error, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RpcErrorKind {
    /// Server returned a null response when a non-null response was expected.
    #[error("server returned a null response when a non-null response was expected")]
    NullResp,

    /// Transport-level failure (connectivity, timeouts, HTTP status).
    #[error("transport error: {message}")]
    Transport { message: String, retryable: bool },

    /// Response deserialization failure.
    #[error("deserialization error: {message}")]
    Serde { message: String },

    /// Anything else the transport can produce.
    #[error("{message}")]
    Other { message: String },
}

#[derive(Debug, Error, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelayError {
    /// The RPC transport failed before the chain saw the request.
    #[error("RPC error: {kind}")]
    RpcError { kind: RpcErrorKind },

    /// The chain saw the request and rejected it with a JSON-RPC error
    /// response. The raw code/message pair is preserved so callers can
    /// classify it (nonce too low, replacement underpriced, ...).
    #[error("chain rejected request (code {code}): {message}")]
    ChainError { code: i64, message: String },

    #[error("signer error: {message}")]
    SignerError { message: String },

    #[error("validation error: {message}")]
    ValidationError { message: String },

    #[error("internal error: {message}")]
    InternalError { message: String },
}

/// Convert alloy transport errors into `RelayError`, keeping JSON-RPC error
/// responses distinguishable from transport failures.
pub trait AlloyRpcErrorToRelayError {
    fn to_relay_error(&self) -> RelayError;
}

impl AlloyRpcErrorToRelayError for AlloyRpcError<TransportErrorKind> {
    fn to_relay_error(&self) -> RelayError {
        match self {
            AlloyRpcError::ErrorResp(payload) => RelayError::ChainError {
                code: payload.code,
                message: payload.message.to_string(),
            },
            AlloyRpcError::NullResp => RelayError::RpcError {
                kind: RpcErrorKind::NullResp,
            },
            AlloyRpcError::Transport(kind) => RelayError::RpcError {
                kind: RpcErrorKind::Transport {
                    message: kind.to_string(),
                    retryable: kind.is_retry_err(),
                },
            },
            AlloyRpcError::SerError(e) => RelayError::RpcError {
                kind: RpcErrorKind::Serde {
                    message: e.to_string(),
                },
            },
            AlloyRpcError::DeserError { err, .. } => RelayError::RpcError {
                kind: RpcErrorKind::Serde {
                    message: err.to_string(),
                },
            },
            other => RelayError::RpcError {
                kind: RpcErrorKind::Other {
                    message: other.to_string(),
                },
            },
        }
    }
}
