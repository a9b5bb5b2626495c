//! Error classification for the connectivity sagas

use std::error::Error as StdError;

use async_dispatch::{ErrorClassifier, ErrorCode};

use crate::chain::ChainError;

/// Ethereum JSON-RPC: query returned too many results
pub const RPC_LIMIT_EXCEEDED: i64 = -32005;
/// Ethereum JSON-RPC: invalid request, reported by nodes for malformed addresses
pub const RPC_INVALID_REQUEST: i64 = -32600;

/// Network transport failures
pub fn connectivity_code(err: &(dyn StdError + 'static)) -> Option<ErrorCode> {
    if let Some(ChainError::Transport(_)) = err.downcast_ref::<ChainError>() {
        return Some(ErrorCode::ConnectivityProblems);
    }
    err.to_string()
        .contains("Network request failed")
        .then_some(ErrorCode::ConnectivityProblems)
}

/// Error objects returned by an Ethereum node
pub fn rpc_code(err: &(dyn StdError + 'static)) -> Option<ErrorCode> {
    match err.downcast_ref::<ChainError>()? {
        ChainError::Rpc { code, .. } => match *code {
            RPC_LIMIT_EXCEEDED => Some(ErrorCode::TooManyResults),
            RPC_INVALID_REQUEST => Some(ErrorCode::InvalidAddress),
            _ => None,
        },
        ChainError::Address(_) => Some(ErrorCode::InvalidAddress),
        _ => None,
    }
}

/// The classifier shared by every saga
pub fn classifier() -> ErrorClassifier {
    ErrorClassifier::new()
        .add_extractor(connectivity_code)
        .add_extractor(rpc_code)
}
