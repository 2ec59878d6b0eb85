//! Multi-hop completion waiting
//!
//! Follows a transfer from its source transaction to the last chain it
//! reaches.
//!
//! # Flow
//!
//! 1. Classify the current transaction from its receipt logs. Revert logs
//!    are checked before forward requests: a transaction that completed a
//!    revert and re-emitted a request onward is a revert.
//! 2. Derive the external id against the destination contract and wait for
//!    its completion log there.
//! 3. The completion transaction becomes the current transaction. Repeat
//!    until it carries no bridge request or `max_hops` hops were followed.
//! 4. Inspect the terminal transaction for an extra step and resolve it.
//!
//! Nothing is retried across hops. Every derivation is a pure function of
//! on-chain state, so a failed wait can be re-run from the start.

use std::sync::Arc;

use alloy::primitives::B256;
use alloy::rpc::types::Log;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::adapters::{detect_extra_step, ExtraStepWaiter};
use crate::config::{ChainRegistry, ContractRole, TimeoutConfig};
use crate::error::{BridgeError, Result};
use crate::evm::client::ChainClients;
use crate::evm::contracts::Synthesis;
use crate::evm::events::{
    chain_id_from_u256, decode_event, selectors, EventSelector, RequestKind, RequestLog,
};
use crate::evm::watcher::EvmLogWatcher;
use crate::types::{
    BridgeRequestType, BridgeTxInfo, Completion, CompletionEvent, ExtraStep, ExtraStepKind,
};

/// Hub topology allows at most one intermediate chain
pub const DEFAULT_MAX_HOPS: usize = 2;

#[derive(Debug, Clone, Copy)]
pub struct WaiterConfig {
    pub max_hops: usize,
    pub timeouts: TimeoutConfig,
}

impl Default for WaiterConfig {
    fn default() -> Self {
        Self {
            max_hops: DEFAULT_MAX_HOPS,
            timeouts: TimeoutConfig::default(),
        }
    }
}

// ============================================================================
// Classification
// ============================================================================

/// Classify the receipt logs of a transaction on `chain_id`
///
/// A `RevertSynthesizeRequest` takes precedence over everything else. A
/// revert completion only tags the request type; the forward request in the
/// same receipt still decides which completion to wait for next.
///
/// Returns `None` when no bridge request is present.
pub fn classify(
    registry: &ChainRegistry,
    chain_id: u64,
    logs: &[Log],
) -> Result<Option<BridgeTxInfo>> {
    if let Some(log) = selectors::revert_synthesize_request().find(logs) {
        let event: Synthesis::RevertSynthesizeRequest = decode_event(log)?;
        let current = registry.require(chain_id)?;
        let origin = registry.require(chain_id_from_u256(event.chainID)?)?;
        // Revert messages are keyed against the synthesis that emitted them
        let external_id = current.external_id(ContractRole::Synthesis, &event.id, &event.to)?;
        return Ok(Some(BridgeTxInfo {
            internal_id: event.id,
            external_id,
            external_chain_id: origin.chain_id,
            request_type: BridgeRequestType::RevertSynthesizeRequest,
            awaits: CompletionEvent::RevertSynthesizeCompleted,
        }));
    }

    let revert_completed = if selectors::revert_synthesize_completed().find(logs).is_some() {
        Some(BridgeRequestType::RevertSynthesizeCompleted)
    } else if selectors::revert_burn_completed().find(logs).is_some() {
        Some(BridgeRequestType::RevertBurnCompleted)
    } else {
        None
    };

    let Some(request) = RequestLog::find(logs)? else {
        return Ok(None);
    };

    let forward_type = match request.kind {
        RequestKind::Synthesize => BridgeRequestType::SynthesizeRequest,
        RequestKind::Burn => BridgeRequestType::BurnRequest,
    };
    let (role, awaits) = match request.kind {
        RequestKind::Synthesize => (ContractRole::Synthesis, CompletionEvent::SynthesizeCompleted),
        RequestKind::Burn => (ContractRole::Portal, CompletionEvent::BurnCompleted),
    };

    let destination = registry.require(request.chain_id_to)?;
    let external_id =
        destination.external_id(role, &request.internal_id, &request.revertable_address)?;

    Ok(Some(BridgeTxInfo {
        internal_id: request.internal_id,
        external_id,
        external_chain_id: destination.chain_id,
        request_type: revert_completed.unwrap_or(forward_type),
        awaits,
    }))
}

fn completion_selector(awaits: CompletionEvent) -> (ContractRole, EventSelector) {
    match awaits {
        CompletionEvent::SynthesizeCompleted => {
            (ContractRole::Synthesis, selectors::synthesize_completed())
        }
        CompletionEvent::BurnCompleted => (ContractRole::Portal, selectors::burn_completed()),
        CompletionEvent::RevertSynthesizeCompleted => (
            ContractRole::Portal,
            selectors::revert_synthesize_completed(),
        ),
    }
}

// ============================================================================
// Completion Waiter
// ============================================================================

pub struct CompletionWaiter {
    registry: Arc<ChainRegistry>,
    clients: ChainClients,
    extra_steps: Arc<dyn ExtraStepWaiter>,
    config: WaiterConfig,
}

impl CompletionWaiter {
    pub fn new(
        registry: Arc<ChainRegistry>,
        clients: ChainClients,
        extra_steps: Arc<dyn ExtraStepWaiter>,
        config: WaiterConfig,
    ) -> Self {
        Self {
            registry,
            clients,
            extra_steps,
            config,
        }
    }

    /// Classify transaction `tx_hash` on `chain_id`
    pub async fn get_transaction_info(&self, chain_id: u64, tx_hash: B256) -> Result<BridgeTxInfo> {
        let logs = self.receipt_logs(chain_id, tx_hash).await?;
        classify(&self.registry, chain_id, &logs)?.ok_or_else(|| BridgeError::NotABridgeRequest {
            chain_id,
            tx_hash: tx_hash.to_string(),
        })
    }

    /// Follow `tx_hash` on `chain_id` to its final transaction
    pub async fn wait_for_complete(
        &self,
        chain_id: u64,
        tx_hash: B256,
        cancel: &CancellationToken,
    ) -> Result<Completion> {
        info!(chain_id, tx_hash = %tx_hash, "Waiting for transfer completion");

        let mut current_chain = chain_id;
        let mut current_tx = tx_hash;
        let mut hops = 0;
        let mut terminal_logs = None;

        while hops < self.config.max_hops {
            if cancel.is_cancelled() {
                return Err(BridgeError::Cancelled {
                    operation: "completion wait".to_string(),
                });
            }

            let logs = self.receipt_logs(current_chain, current_tx).await?;
            let Some(info) = classify(&self.registry, current_chain, &logs)? else {
                if hops == 0 {
                    return Err(BridgeError::NotABridgeRequest {
                        chain_id: current_chain,
                        tx_hash: current_tx.to_string(),
                    });
                }
                terminal_logs = Some(logs);
                break;
            };

            debug!(
                chain_id = current_chain,
                request_type = ?info.request_type,
                external_id = %info.external_id,
                destination = info.external_chain_id,
                "Classified hop"
            );

            let log = self.await_hop(&info, cancel).await?;
            let completion_tx = log.transaction_hash.ok_or_else(|| {
                BridgeError::Decode("completion log without transaction hash".to_string())
            })?;

            hops += 1;
            info!(
                hop = hops,
                chain_id = info.external_chain_id,
                tx_hash = %completion_tx,
                "Hop completed"
            );

            current_chain = info.external_chain_id;
            current_tx = completion_tx;
        }

        let logs = match terminal_logs {
            Some(logs) => logs,
            None => self.receipt_logs(current_chain, current_tx).await?,
        };

        let extra_step = match detect_extra_step(&logs, current_tx)? {
            Some(step) => self.extra_steps.wait(&step, cancel).await?,
            None => ExtraStep {
                kind: ExtraStepKind::None,
                out_hash: String::new(),
            },
        };

        let final_hash = if extra_step.kind == ExtraStepKind::None {
            current_tx.to_string()
        } else {
            extra_step.out_hash.clone()
        };

        info!(
            chain_id = current_chain,
            tx_hash = %final_hash,
            hops,
            extra_step = ?extra_step.kind,
            "Transfer complete"
        );

        Ok(Completion {
            chain_id: current_chain,
            tx_hash: final_hash,
            hops,
            extra_step,
        })
    }

    async fn receipt_logs(&self, chain_id: u64, tx_hash: B256) -> Result<Vec<Log>> {
        let rpc = self.clients.get(chain_id)?;
        rpc.get_receipt_logs(tx_hash)
            .await?
            .ok_or_else(|| BridgeError::TxNotFound {
                chain_id,
                tx_hash: tx_hash.to_string(),
            })
    }

    async fn await_hop(&self, info: &BridgeTxInfo, cancel: &CancellationToken) -> Result<Log> {
        let destination = self.registry.require(info.external_chain_id)?;
        if !destination.family.has_evm_rpc() {
            return Err(BridgeError::UnsupportedFamily {
                family: destination.family,
                operation: "completion log wait",
            });
        }

        let (role, selector) = completion_selector(info.awaits);
        let address = destination.contract_address(role)?;
        let watcher = EvmLogWatcher::new(
            self.clients.get(destination.chain_id)?,
            destination.chain_id,
            destination.filter_block_offset,
            self.config.timeouts.evm_log_poll(),
        );

        watcher
            .wait_for_completion(address, selector, info.external_id, None, cancel)
            .await
    }
}

/// Id of the first `SynthesizeCompleted` among `logs`
pub fn synthesize_completed_id(logs: &[Log]) -> Result<Option<B256>> {
    match selectors::synthesize_completed().find(logs) {
        Some(log) => {
            let event: Synthesis::SynthesizeCompleted = decode_event(log)?;
            Ok(Some(event.id))
        }
        None => Ok(None),
    }
}
