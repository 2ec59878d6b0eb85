//! Non-EVM adapters and extra-step resolution
//!
//! A terminal completion transaction may carry a leg that leaves the bridge
//! protocol: a ThorChain router deposit, a Chainflip vault swap, or a burn
//! paid out on Bitcoin or TON. [`detect_extra_step`] finds the marker log;
//! an [`ExtraStepWaiter`] follows it to the final real-world transaction.
//!
//! ## Submodules
//!
//! - `bitcoin` - Forwarder REST client (deposits and unwraps)
//! - `ton` - toncenter ledger scan for burn-completed messages
//! - `thorchain` - THORNode observed-tx status
//! - `chainflip` - Chainflip swap status

pub mod bitcoin;
pub mod chainflip;
pub mod thorchain;
pub mod ton;

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{B256, U256};
use alloy::rpc::types::Log;
use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::{ChainRegistry, ServiceEndpoints, TimeoutConfig};
use crate::error::{BridgeError, Result};
use crate::evm::contracts::Synthesis;
use crate::evm::events::{chain_id_from_u256, decode_event, selectors};
use crate::types::{ExtraStep, ExtraStepKind};

pub use bitcoin::ForwarderClient;
pub use chainflip::ChainflipClient;
pub use thorchain::ThorchainClient;
pub use ton::TonClient;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Extra step found in a completion transaction, not yet resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingExtraStep {
    /// Router deposit; THORNode tracks it by the depositing transaction
    ThorChain { tx_hash: B256 },
    /// Burn paid out on Bitcoin chain `btc_chain_id` under `serial`
    BurnRequestBtc { btc_chain_id: u64, serial: U256 },
    /// Burn paid out by the TON portal of `ton_chain_id`
    BurnRequestTon { ton_chain_id: u64, external_id: B256 },
    /// Vault swap; Chainflip tracks it by the depositing transaction
    ChainFlip { tx_hash: B256 },
}

impl PendingExtraStep {
    pub fn kind(&self) -> ExtraStepKind {
        match self {
            PendingExtraStep::ThorChain { .. } => ExtraStepKind::ThorChain,
            PendingExtraStep::BurnRequestBtc { .. } => ExtraStepKind::BurnRequestBtc,
            PendingExtraStep::BurnRequestTon { .. } => ExtraStepKind::BurnRequestTon,
            PendingExtraStep::ChainFlip { .. } => ExtraStepKind::ChainFlip,
        }
    }
}

/// First extra-step marker among the logs of transaction `tx_hash`
pub fn detect_extra_step(logs: &[Log], tx_hash: B256) -> Result<Option<PendingExtraStep>> {
    for log in logs {
        if selectors::thor_deposit().matches(log) {
            return Ok(Some(PendingExtraStep::ThorChain { tx_hash }));
        }

        if selectors::burn_request_btc().matches(log) {
            let event: Synthesis::BurnRequestBTC = decode_event(log)?;
            return Ok(Some(PendingExtraStep::BurnRequestBtc {
                btc_chain_id: chain_id_from_u256(event.externalChainID)?,
                serial: event.serialNumber,
            }));
        }

        if selectors::burn_request_ton().matches(log) {
            let event: Synthesis::BurnRequestTON = decode_event(log)?;
            return Ok(Some(PendingExtraStep::BurnRequestTon {
                ton_chain_id: chain_id_from_u256(event.chainID)?,
                external_id: event.externalID,
            }));
        }

        if selectors::chainflip_swap_native().matches(log)
            || selectors::chainflip_swap_token().matches(log)
        {
            return Ok(Some(PendingExtraStep::ChainFlip { tx_hash }));
        }
    }
    Ok(None)
}

/// Resolves an extra step to its final transaction hash
#[async_trait]
pub trait ExtraStepWaiter: Send + Sync {
    async fn wait(&self, step: &PendingExtraStep, cancel: &CancellationToken) -> Result<ExtraStep>;
}

/// [`ExtraStepWaiter`] backed by the HTTP adapters of this module
pub struct HttpExtraStepWaiter {
    registry: Arc<ChainRegistry>,
    endpoints: ServiceEndpoints,
    timeouts: TimeoutConfig,
    client: Client,
}

impl HttpExtraStepWaiter {
    pub fn new(
        registry: Arc<ChainRegistry>,
        endpoints: ServiceEndpoints,
        timeouts: TimeoutConfig,
    ) -> Result<Self> {
        let client = Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self::with_client(registry, endpoints, timeouts, client))
    }

    pub fn with_client(
        registry: Arc<ChainRegistry>,
        endpoints: ServiceEndpoints,
        timeouts: TimeoutConfig,
        client: Client,
    ) -> Self {
        Self {
            registry,
            endpoints,
            timeouts,
            client,
        }
    }
}

#[async_trait]
impl ExtraStepWaiter for HttpExtraStepWaiter {
    async fn wait(&self, step: &PendingExtraStep, cancel: &CancellationToken) -> Result<ExtraStep> {
        info!(step = ?step, "Resolving extra step");

        let out_hash = match step {
            PendingExtraStep::ThorChain { tx_hash } => {
                ThorchainClient::new(self.client.clone(), &self.endpoints.thornode_url)
                    .wait_for_outbound(*tx_hash, self.timeouts.settlement_poll(), cancel)
                    .await?
            }
            PendingExtraStep::BurnRequestBtc {
                btc_chain_id,
                serial,
            } => {
                let chain = self.registry.require(*btc_chain_id)?;
                ForwarderClient::new(self.client.clone(), bitcoin::forwarder_url(chain)?)
                    .wait_for_unwrap(*serial, self.timeouts.btc_deposit_poll(), cancel)
                    .await?
            }
            PendingExtraStep::BurnRequestTon {
                ton_chain_id,
                external_id,
            } => {
                let chain = self.registry.require(*ton_chain_id)?;
                let portal =
                    chain
                        .ton_portal
                        .as_deref()
                        .ok_or(BridgeError::MissingContract {
                            chain_id: chain.chain_id,
                            role: "ton-portal",
                        })?;
                TonClient::new(self.client.clone(), &self.endpoints.toncenter_url)
                    .wait_for_burn_completed(
                        portal,
                        *external_id,
                        self.timeouts.ton_scan_poll(),
                        cancel,
                    )
                    .await?
            }
            PendingExtraStep::ChainFlip { tx_hash } => {
                ChainflipClient::new(self.client.clone(), &self.endpoints.chainflip_api_url)
                    .wait_for_egress(*tx_hash, self.timeouts.settlement_poll(), cancel)
                    .await?
            }
        };

        Ok(ExtraStep {
            kind: step.kind(),
            out_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evm::contracts::{ChainflipVault, Portal, ThorRouter};
    use alloy::primitives::{Address, Bytes};
    use alloy::sol_types::SolEvent;

    fn log_of<E: SolEvent>(event: &E) -> Log {
        Log {
            inner: alloy::primitives::Log {
                address: Address::repeat_byte(0x10),
                data: event.encode_log_data(),
            },
            ..Default::default()
        }
    }

    fn burn_completed() -> Log {
        log_of(&Portal::BurnCompleted {
            id: B256::repeat_byte(1),
            crossChainID: B256::ZERO,
            to: Address::repeat_byte(2),
            amount: U256::from(10u64),
            bridgingFee: U256::ZERO,
            token: Address::ZERO,
        })
    }

    #[test]
    fn test_no_marker_no_step() {
        let logs = vec![burn_completed()];
        assert_eq!(detect_extra_step(&logs, B256::ZERO).unwrap(), None);
    }

    #[test]
    fn test_thor_deposit_tracks_completion_tx() {
        let tx_hash = B256::repeat_byte(0x33);
        let deposit = log_of(&ThorRouter::Deposit {
            to: Address::repeat_byte(4),
            asset: Address::ZERO,
            amount: U256::from(5u64),
            memo: "=:BTC.BTC:bc1q".to_string(),
        });

        let step = detect_extra_step(&[burn_completed(), deposit], tx_hash)
            .unwrap()
            .unwrap();
        assert_eq!(step, PendingExtraStep::ThorChain { tx_hash });
        assert_eq!(step.kind(), ExtraStepKind::ThorChain);
    }

    #[test]
    fn test_btc_burn_carries_serial_and_chain() {
        let burn = log_of(&Synthesis::BurnRequestBTC {
            serialNumber: U256::from(77u64),
            externalID: B256::repeat_byte(9),
            externalChainID: U256::from(3652501241u64),
            from: Address::repeat_byte(1),
            to: Bytes::from_static(b"bc1qrecipient"),
            amount: U256::from(1u64),
            token: Address::ZERO,
        });

        assert_eq!(
            detect_extra_step(&[burn], B256::ZERO).unwrap(),
            Some(PendingExtraStep::BurnRequestBtc {
                btc_chain_id: 3652501241,
                serial: U256::from(77u64),
            })
        );
    }

    #[test]
    fn test_ton_burn_carries_external_id() {
        let external_id = B256::repeat_byte(0x5a);
        let burn = log_of(&Synthesis::BurnRequestTON {
            externalID: external_id,
            chainID: U256::from(85918u64),
            from: Address::repeat_byte(1),
            to: Bytes::from_static(b"EQrecipient"),
            amount: U256::from(1u64),
            token: Address::ZERO,
        });

        assert_eq!(
            detect_extra_step(&[burn], B256::ZERO).unwrap(),
            Some(PendingExtraStep::BurnRequestTon {
                ton_chain_id: 85918,
                external_id,
            })
        );
    }

    #[test]
    fn test_chainflip_token_swap() {
        let tx_hash = B256::repeat_byte(0x44);
        let swap = log_of(&ChainflipVault::SwapToken {
            dstChain: 3,
            dstAddress: Bytes::from_static(b"dest"),
            dstToken: 1,
            srcToken: Address::repeat_byte(6),
            amount: U256::from(1u64),
            sender: Address::repeat_byte(7),
            cfParameters: Bytes::new(),
        });

        assert_eq!(
            detect_extra_step(&[swap], tx_hash).unwrap(),
            Some(PendingExtraStep::ChainFlip { tx_hash })
        );
    }
}
