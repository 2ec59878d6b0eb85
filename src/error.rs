//! Error taxonomy for transfer tracking and recovery
//!
//! Transient RPC/HTTP failures inside a poll loop never reach these variants
//! unless the loop itself gives up; see [`crate::polling`].

use std::time::Duration;

use alloy::primitives::U256;
use thiserror::Error;

use crate::evm::events::LogQuery;

pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum BridgeError {
    // ========================================================================
    // Classification Errors
    // ========================================================================

    #[error("Transaction {tx_hash} not found on chain {chain_id}")]
    TxNotFound { chain_id: u64, tx_hash: String },

    #[error("Transaction {tx_hash} on chain {chain_id} is not a bridge request")]
    NotABridgeRequest { chain_id: u64, tx_hash: String },

    // ========================================================================
    // Waiting Errors
    // ========================================================================

    #[error("No matching log after {max_elapsed:?}: {query}")]
    LogTimeoutExceeded {
        query: LogQuery,
        max_elapsed: Duration,
    },

    #[error("{operation} timed out after {max_elapsed:?}")]
    Timeout {
        operation: String,
        max_elapsed: Duration,
    },

    #[error("{operation} cancelled")]
    Cancelled { operation: String },

    // ========================================================================
    // Revert Errors
    // ========================================================================

    #[error("Amount {amount} does not exceed revert fee {fee}")]
    AmountLessThanFee { amount: U256, fee: U256 },

    #[error("Price quote failed: {0}")]
    PriceQuote(String),

    // ========================================================================
    // Configuration Errors
    // ========================================================================

    #[error("Chain {0} is not configured")]
    UnknownChain(u64),

    #[error("Chain {chain_id} has no {role} configured")]
    MissingContract { chain_id: u64, role: &'static str },

    #[error("Chain family {family} does not support {operation}")]
    UnsupportedFamily {
        family: crate::types::ChainFamily,
        operation: &'static str,
    },

    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    // ========================================================================
    // Transport Errors
    // ========================================================================

    #[error("RPC error on chain {chain_id}: {message}")]
    Rpc { chain_id: u64, message: String },

    #[error("All {attempts} endpoints failed, last error: {last}")]
    AllEndpointsFailed { attempts: usize, last: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Malformed response: {0}")]
    Decode(String),
}

impl BridgeError {
    /// Build an [`BridgeError::InvalidAddress`] from anything displayable
    pub fn invalid_address(address: &str, reason: impl std::fmt::Display) -> Self {
        BridgeError::InvalidAddress {
            address: address.to_string(),
            reason: reason.to_string(),
        }
    }

    /// True for caller-initiated aborts
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BridgeError::Cancelled { .. })
    }

    /// True for any variant produced by an exhausted polling window
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            BridgeError::Timeout { .. } | BridgeError::LogTimeoutExceeded { .. }
        )
    }
}
