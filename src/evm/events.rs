//! EVM event selectors and log queries
//!
//! An [`EventSelector`] is built once per event from its sol! binding, so
//! topic encoding lives in one place. A [`LogQuery`] is the
//! client-independent description of an `eth_getLogs` filter; it converts to
//! an alloy [`Filter`] and can also evaluate a log locally.

use std::fmt;

use alloy::primitives::{Address, B256, U256};
use alloy::rpc::types::{Filter, Log};
use alloy::sol_types::SolEvent;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};
use crate::evm::contracts::{ChainflipVault, Portal, Synthesis, ThorRouter};

// ============================================================================
// Event Selectors
// ============================================================================

/// Topic0 of one event, with its signature for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventSelector {
    pub signature: &'static str,
    pub topic0: B256,
}

impl EventSelector {
    pub fn of<E: SolEvent>() -> Self {
        Self {
            signature: E::SIGNATURE,
            topic0: E::SIGNATURE_HASH,
        }
    }

    /// Event name without the parameter list
    pub fn name(&self) -> &'static str {
        self.signature
            .split_once('(')
            .map(|(name, _)| name)
            .unwrap_or(self.signature)
    }

    pub fn matches(&self, log: &Log) -> bool {
        log.topics().first() == Some(&self.topic0)
    }

    /// First log in `logs` carrying this selector
    pub fn find<'a>(&self, logs: &'a [Log]) -> Option<&'a Log> {
        logs.iter().find(|log| self.matches(log))
    }
}

/// Selectors of every event the waiter and scanner look at
pub mod selectors {
    use super::*;

    pub fn synthesize_request() -> EventSelector {
        EventSelector::of::<Portal::SynthesizeRequest>()
    }

    pub fn burn_request() -> EventSelector {
        EventSelector::of::<Synthesis::BurnRequest>()
    }

    pub fn synthesize_completed() -> EventSelector {
        EventSelector::of::<Synthesis::SynthesizeCompleted>()
    }

    pub fn burn_completed() -> EventSelector {
        EventSelector::of::<Portal::BurnCompleted>()
    }

    pub fn revert_synthesize_request() -> EventSelector {
        EventSelector::of::<Synthesis::RevertSynthesizeRequest>()
    }

    pub fn revert_synthesize_completed() -> EventSelector {
        EventSelector::of::<Portal::RevertSynthesizeCompleted>()
    }

    pub fn revert_burn_completed() -> EventSelector {
        EventSelector::of::<Synthesis::RevertBurnCompleted>()
    }

    pub fn burn_request_btc() -> EventSelector {
        EventSelector::of::<Synthesis::BurnRequestBTC>()
    }

    pub fn burn_request_ton() -> EventSelector {
        EventSelector::of::<Synthesis::BurnRequestTON>()
    }

    pub fn thor_deposit() -> EventSelector {
        EventSelector::of::<ThorRouter::Deposit>()
    }

    pub fn chainflip_swap_native() -> EventSelector {
        EventSelector::of::<ChainflipVault::SwapNative>()
    }

    pub fn chainflip_swap_token() -> EventSelector {
        EventSelector::of::<ChainflipVault::SwapToken>()
    }
}

/// Decode a log as event `E`, validating its topics
pub fn decode_event<E: SolEvent>(log: &Log) -> Result<E> {
    E::decode_log_data(log.data(), true)
        .map_err(|e| BridgeError::Decode(format!("{}: {}", E::SIGNATURE, e)))
}

/// Left-pad an address into a topic word
pub fn address_topic(address: &Address) -> B256 {
    address.into_word()
}

/// Encode a chain id as a topic word
pub fn chain_id_topic(chain_id: u64) -> B256 {
    B256::from(U256::from(chain_id))
}

/// Narrow a `uint256` chain id from a log to `u64`
pub fn chain_id_from_u256(value: U256) -> Result<u64> {
    u64::try_from(value).map_err(|_| BridgeError::Decode(format!("chain id {} exceeds u64", value)))
}

// ============================================================================
// Log Queries
// ============================================================================

/// Client-independent `eth_getLogs` filter for one contract and event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub chain_id: u64,
    pub address: Address,
    pub event: &'static str,
    /// topic0..topic3; `None` matches anything
    pub topics: [Option<B256>; 4],
    pub from_block: Option<u64>,
    pub to_block: Option<u64>,
}

impl LogQuery {
    pub fn new(chain_id: u64, address: Address, selector: EventSelector) -> Self {
        Self {
            chain_id,
            address,
            event: selector.name(),
            topics: [Some(selector.topic0), None, None, None],
            from_block: None,
            to_block: None,
        }
    }

    pub fn topic1(mut self, topic: B256) -> Self {
        self.topics[1] = Some(topic);
        self
    }

    pub fn topic2(mut self, topic: B256) -> Self {
        self.topics[2] = Some(topic);
        self
    }

    pub fn topic3(mut self, topic: B256) -> Self {
        self.topics[3] = Some(topic);
        self
    }

    pub fn from_block(mut self, block: u64) -> Self {
        self.from_block = Some(block);
        self
    }

    pub fn to_block(mut self, block: u64) -> Self {
        self.to_block = Some(block);
        self
    }

    /// Indexed first argument, the external id for completion events
    pub fn external_id(&self) -> Option<B256> {
        self.topics[1]
    }

    pub fn to_filter(&self) -> Filter {
        let mut filter = Filter::new().address(self.address);
        if let Some(topic) = self.topics[0] {
            filter = filter.event_signature(topic);
        }
        if let Some(topic) = self.topics[1] {
            filter = filter.topic1(topic);
        }
        if let Some(topic) = self.topics[2] {
            filter = filter.topic2(topic);
        }
        if let Some(topic) = self.topics[3] {
            filter = filter.topic3(topic);
        }
        if let Some(block) = self.from_block {
            filter = filter.from_block(block);
        }
        if let Some(block) = self.to_block {
            filter = filter.to_block(block);
        }
        filter
    }

    /// Whether `log` would be returned by this query
    pub fn matches(&self, log: &Log) -> bool {
        if log.address() != self.address {
            return false;
        }

        let topics = log.topics();
        for (i, expected) in self.topics.iter().enumerate() {
            if let Some(expected) = expected {
                if topics.get(i) != Some(expected) {
                    return false;
                }
            }
        }

        match log.block_number {
            Some(block) => {
                self.from_block.map_or(true, |from| block >= from)
                    && self.to_block.map_or(true, |to| block <= to)
            }
            None => self.from_block.is_none() && self.to_block.is_none(),
        }
    }
}

impl fmt::Display for LogQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} on chain {} at {:#x}",
            self.event, self.chain_id, self.address
        )?;
        for (i, topic) in self.topics.iter().enumerate().skip(1) {
            if let Some(topic) = topic {
                write!(f, " topic{}={}", i, topic)?;
            }
        }
        match (self.from_block, self.to_block) {
            (Some(from), Some(to)) => write!(f, " blocks {}..={}", from, to),
            (Some(from), None) => write!(f, " from block {}", from),
            (None, Some(to)) => write!(f, " to block {}", to),
            (None, None) => Ok(()),
        }
    }
}

// ============================================================================
// Typed Request Logs
// ============================================================================

/// Forward request kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestKind {
    /// `SynthesizeRequest` on a portal
    Synthesize,
    /// `BurnRequest` on a synthesis
    Burn,
}

/// Decoded `SynthesizeRequest` or `BurnRequest` log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLog {
    pub kind: RequestKind,
    pub internal_id: B256,
    pub from: Address,
    pub chain_id_to: u64,
    pub revertable_address: Address,
    pub to: Address,
    pub amount: U256,
    pub token: Address,
    /// Contract that emitted the log
    pub emitter: Address,
    pub transaction_hash: Option<B256>,
    pub block_number: Option<u64>,
}

impl RequestLog {
    /// Parse a forward request log; other events yield `None`
    pub fn parse(log: &Log) -> Result<Option<Self>> {
        let emitter = log.address();
        let transaction_hash = log.transaction_hash;
        let block_number = log.block_number;

        if selectors::synthesize_request().matches(log) {
            let event: Portal::SynthesizeRequest = decode_event(log)?;
            return Ok(Some(Self {
                kind: RequestKind::Synthesize,
                internal_id: event.id,
                from: event.from,
                chain_id_to: chain_id_from_u256(event.chainID)?,
                revertable_address: event.revertableAddress,
                to: event.to,
                amount: event.amount,
                token: event.token,
                emitter,
                transaction_hash,
                block_number,
            }));
        }

        if selectors::burn_request().matches(log) {
            let event: Synthesis::BurnRequest = decode_event(log)?;
            return Ok(Some(Self {
                kind: RequestKind::Burn,
                internal_id: event.id,
                from: event.from,
                chain_id_to: chain_id_from_u256(event.chainID)?,
                revertable_address: event.revertableAddress,
                to: event.to,
                amount: event.amount,
                token: event.token,
                emitter,
                transaction_hash,
                block_number,
            }));
        }

        Ok(None)
    }

    /// First forward request among `logs`
    pub fn find(logs: &[Log]) -> Result<Option<Self>> {
        for log in logs {
            if let Some(request) = Self::parse(log)? {
                return Ok(Some(request));
            }
        }
        Ok(None)
    }
}
