//! Common types for transfer tracking and recovery
//!
//! Value objects shared by the waiter, the pending scanner and the revert
//! builder. None of them are persisted; all are rebuilt from chain state.

use alloy::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::tokens::Token;

// ============================================================================
// Chain Families
// ============================================================================

/// Virtual machine / ledger family of a chain
///
/// Decides how addresses are normalized, how ids are hashed and which
/// adapter can observe completions on the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    /// Ethereum-compatible chains
    Evm,
    /// Account-model alternate VM with base58 addresses and its own
    /// transaction envelope, but an EVM-compatible log API
    Tron,
    /// Cosmos-style chain with bech32 addresses and an EVM log API
    Cosmos,
    /// TON, observed by scanning the portal account's ledger
    Ton,
    /// Bitcoin, observed through the forwarder REST API
    Bitcoin,
}

impl ChainFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainFamily::Evm => "evm",
            ChainFamily::Tron => "tron",
            ChainFamily::Cosmos => "cosmos",
            ChainFamily::Ton => "ton",
            ChainFamily::Bitcoin => "bitcoin",
        }
    }

    /// Whether the chain exposes `eth_getLogs`-style RPC
    pub fn has_evm_rpc(&self) -> bool {
        matches!(
            self,
            ChainFamily::Evm | ChainFamily::Tron | ChainFamily::Cosmos
        )
    }
}

impl fmt::Display for ChainFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ChainFamily {
    type Err = eyre::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "evm" => Ok(ChainFamily::Evm),
            "tron" => Ok(ChainFamily::Tron),
            "cosmos" => Ok(ChainFamily::Cosmos),
            "ton" => Ok(ChainFamily::Ton),
            "bitcoin" | "btc" => Ok(ChainFamily::Bitcoin),
            other => Err(eyre::eyre!("Unknown chain family: {}", other)),
        }
    }
}

// ============================================================================
// Request State and Types
// ============================================================================

/// Contract-side bookkeeping state of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestState {
    Default,
    Sent,
    Reverted,
}

impl RequestState {
    /// Map the contract's `uint8` enum; unknown values read as `Default`
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => RequestState::Sent,
            2 => RequestState::Reverted,
            _ => RequestState::Default,
        }
    }
}

/// Kind of a pending (possibly stuck) transfer
///
/// V2 variants were relayed through the hub chain's meta-router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PendingRequestType {
    Synthesize,
    Burn,
    SynthesizeV2,
    BurnV2,
    BurnV2Revert,
}

impl PendingRequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PendingRequestType::Synthesize => "synthesize",
            PendingRequestType::Burn => "burn",
            PendingRequestType::SynthesizeV2 => "synthesize-v2",
            PendingRequestType::BurnV2 => "burn-v2",
            PendingRequestType::BurnV2Revert => "burn-v2-revert",
        }
    }
}

impl fmt::Display for PendingRequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of bridge log found in a single inspected transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BridgeRequestType {
    SynthesizeRequest,
    BurnRequest,
    RevertSynthesizeRequest,
    RevertSynthesizeCompleted,
    RevertBurnCompleted,
}

impl BridgeRequestType {
    /// Revert-side classifications take priority over forward ones
    pub fn is_revert(&self) -> bool {
        !matches!(
            self,
            BridgeRequestType::SynthesizeRequest | BridgeRequestType::BurnRequest
        )
    }
}

/// Completion event the destination chain emits for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionEvent {
    /// `SynthesizeCompleted` on the destination synthesis
    SynthesizeCompleted,
    /// `BurnCompleted` on the destination portal
    BurnCompleted,
    /// `RevertSynthesizeCompleted` on the origin portal
    RevertSynthesizeCompleted,
}

/// Identity of the bridge request carried by one transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeTxInfo {
    pub internal_id: B256,
    pub external_id: B256,
    pub external_chain_id: u64,
    pub request_type: BridgeRequestType,
    /// Event to wait for on `external_chain_id`
    pub awaits: CompletionEvent,
}

// ============================================================================
// Extra Steps
// ============================================================================

/// Off-protocol terminal leg discovered inside a completion transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExtraStepKind {
    ThorChain,
    BurnRequestBtc,
    BurnRequestTon,
    ChainFlip,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraStep {
    pub kind: ExtraStepKind,
    pub out_hash: String,
}

/// Final outcome of following a transfer to its last chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    /// Chain of the last bridge completion transaction
    pub chain_id: u64,
    /// Final real-world transaction hash (the extra step's out hash if any)
    pub tx_hash: String,
    /// Number of bridge hops followed
    pub hops: usize,
    pub extra_step: ExtraStep,
}

// ============================================================================
// Transfer Requests
// ============================================================================

/// Raw on-chain amount with optional token metadata attached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAmount {
    pub raw: U256,
    pub token: Option<Token>,
}

impl TokenAmount {
    pub fn new(raw: U256, token: Option<Token>) -> Self {
        Self { raw, token }
    }

    /// Render with the token's decimals, or the raw integer when unknown
    pub fn to_decimal_string(&self) -> String {
        let Some(token) = &self.token else {
            return self.raw.to_string();
        };
        let decimals = token.decimals as usize;
        if decimals == 0 {
            return self.raw.to_string();
        }
        let digits = self.raw.to_string();
        let padded = format!("{:0>width$}", digits, width = decimals + 1);
        let (int_part, frac_part) = padded.split_at(padded.len() - decimals);
        let frac_part = frac_part.trim_end_matches('0');
        if frac_part.is_empty() {
            int_part.to_string()
        } else {
            format!("{}.{}", int_part, frac_part)
        }
    }
}

/// A bridge transfer reconstructed from logs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub internal_id: B256,
    pub external_id: B256,
    pub request_type: PendingRequestType,
    pub chain_id_from: u64,
    pub chain_id_to: u64,
    /// Chain the revert transaction has to be sent on
    pub revert_chain_id: u64,
    pub from: Address,
    pub to: Address,
    pub revertable_address: Address,
    pub from_token_amount: TokenAmount,
    /// Amount of the origin request (differs from `from_token_amount` for
    /// relayed transfers whose origin was located)
    pub original_from_token_amount: TokenAmount,
    /// Token contract of the origin request on `chain_id_from`, kept even
    /// when the token registry does not know it
    pub original_token: Address,
    /// Destination state of the request at scan time
    pub state: RequestState,
    pub transaction_hash: B256,
}
