//! Revert transaction building
//!
//! Turns a stuck [`TransferRequest`] into the unsigned transaction that
//! returns the funds to its revertable address.
//!
//! # Flow
//!
//! 1. Quote every compensating leg with the [`FeeQuoter`]. Hub-relayed
//!    variants have a second leg whose internal id does not exist yet; it is
//!    precomputed with [`INTERNAL_ID_SENTINEL`].
//! 2. Refuse to build when the original amount does not exceed the fee.
//! 3. Encode the revert entry point and wrap it in the envelope of the
//!    revert chain's family.
//!
//! | Request | Revert entry point | Sent on |
//! |---------|--------------------|---------|
//! | Synthesize | `Synthesis.revertSynthesizeRequest` | destination |
//! | Burn | `Portal.revertBurnRequest` | destination |
//! | SynthesizeV2 | `Portal.metaRevertRequest` | origin |
//! | BurnV2 | `Portal.metaRevertRequest` | destination |
//! | BurnV2Revert | `Portal.revertBurnRequest` toward the hub | destination |

use std::sync::Arc;

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol_types::SolCall;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::address_codec::to_tron_base58;
use crate::config::{ChainConfig, ChainRegistry, ContractRole};
use crate::error::{BridgeError, Result};
use crate::evm::contracts::{MetaRevertTransaction, Portal, Synthesis};
use crate::hash::INTERNAL_ID_SENTINEL;
use crate::pricing::FeeQuoter;
use crate::types::{ChainFamily, PendingRequestType, TransferRequest};

/// Default energy budget of a Tron trigger, in sun
pub const DEFAULT_TRON_FEE_LIMIT: u64 = 150_000_000;

// ============================================================================
// Envelopes
// ============================================================================

/// Unsigned EVM call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvmCall {
    pub chain_id: u64,
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}

/// Unsigned Tron `TriggerSmartContract`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TronTriggerCall {
    /// Base58check caller
    pub owner_address: String,
    /// Base58check contract
    pub contract_address: String,
    /// Function signature, e.g. `revertBurn(uint256,bytes32)`
    pub function_selector: String,
    /// ABI-encoded arguments without the selector, hex
    pub parameter: String,
    pub call_value: u64,
    pub fee_limit: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TransactionEnvelope {
    Evm(EvmCall),
    Tron(TronTriggerCall),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevertTransaction {
    /// Chain the transaction must be sent on
    pub chain_id: u64,
    /// Sum of all quoted legs
    pub fee: U256,
    pub envelope: TransactionEnvelope,
}

// ============================================================================
// Builder
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct RevertConfig {
    /// Client tag recorded by the contracts for every request
    pub client_id: B256,
    pub tron_fee_limit: u64,
}

impl Default for RevertConfig {
    fn default() -> Self {
        Self {
            client_id: B256::right_padding_from(b"xchain-recovery"),
            tron_fee_limit: DEFAULT_TRON_FEE_LIMIT,
        }
    }
}

pub struct RevertBuilder {
    registry: Arc<ChainRegistry>,
    quoter: Arc<dyn FeeQuoter>,
    config: RevertConfig,
}

impl RevertBuilder {
    pub fn new(
        registry: Arc<ChainRegistry>,
        quoter: Arc<dyn FeeQuoter>,
        config: RevertConfig,
    ) -> Self {
        Self {
            registry,
            quoter,
            config,
        }
    }

    /// Build the revert of `request`
    pub async fn build(&self, request: &TransferRequest) -> Result<RevertTransaction> {
        info!(
            internal_id = %request.internal_id,
            request_type = %request.request_type,
            revert_chain_id = request.revert_chain_id,
            "Building revert"
        );

        let tx = match request.request_type {
            PendingRequestType::Synthesize => self.synthesize(request).await?,
            PendingRequestType::Burn => {
                let origin = self.registry.require(request.chain_id_from)?;
                self.burn(request, origin).await?
            }
            PendingRequestType::SynthesizeV2 => self.synthesize_v2(request).await?,
            PendingRequestType::BurnV2 => self.burn_v2(request).await?,
            PendingRequestType::BurnV2Revert => {
                let hub = self.registry.hub()?;
                self.burn(request, hub).await?
            }
        };

        info!(
            internal_id = %request.internal_id,
            chain_id = tx.chain_id,
            fee = %tx.fee,
            "Revert built"
        );
        Ok(tx)
    }

    /// Stuck synthesize: the destination synthesis asks the origin portal
    /// to release the lock
    async fn synthesize(&self, request: &TransferRequest) -> Result<RevertTransaction> {
        let origin = self.registry.require(request.chain_id_from)?;
        let revert_chain = self.registry.require(request.revert_chain_id)?;

        let fee = self
            .quote(
                origin.portal()?,
                &Portal::revertSynthesizeCall {
                    stableBridgingFee: U256::ZERO,
                    externalID: request.external_id,
                },
                revert_chain,
                origin,
            )
            .await?;
        ensure_covers_fee(request, fee)?;

        let call = Synthesis::revertSynthesizeRequestCall {
            stableBridgingFee: fee,
            internalID: request.internal_id,
            receiveSide: origin.portal()?,
            oppositeBridge: origin.bridge()?,
            chainID: U256::from(origin.chain_id),
            clientID: self.config.client_id,
        };
        self.finish(request, revert_chain, revert_chain.synthesis()?, &call, fee)
    }

    /// Stuck burn: the destination portal asks `origin`'s synthesis to
    /// re-mint the burned synthetic
    async fn burn(
        &self,
        request: &TransferRequest,
        origin: &ChainConfig,
    ) -> Result<RevertTransaction> {
        let revert_chain = self.registry.require(request.revert_chain_id)?;

        let fee = self
            .quote(
                origin.synthesis()?,
                &Synthesis::revertBurnCall {
                    stableBridgingFee: U256::ZERO,
                    externalID: request.external_id,
                },
                revert_chain,
                origin,
            )
            .await?;
        ensure_covers_fee(request, fee)?;

        let call = Portal::revertBurnRequestCall {
            stableBridgingFee: fee,
            internalID: request.internal_id,
            receiveSide: origin.synthesis()?,
            oppositeBridge: origin.bridge()?,
            chainID: U256::from(origin.chain_id),
            clientID: self.config.client_id,
        };
        self.finish(request, revert_chain, revert_chain.portal()?, &call, fee)
    }

    /// Hub-relayed synthesize: issued on the origin, relayed through the
    /// hub synthesis back to the origin portal
    async fn synthesize_v2(&self, request: &TransferRequest) -> Result<RevertTransaction> {
        let origin = self.registry.require(request.revert_chain_id)?;
        let hub = self.registry.require(request.chain_id_to)?;

        let hub_leg = Synthesis::revertSynthesizeRequestByBridgeCall {
            stableBridgingFee: U256::ZERO,
            internalID: request.internal_id,
            receiveSide: origin.portal()?,
            oppositeBridge: origin.bridge()?,
            chainID: U256::from(origin.chain_id),
            revertableAddress: request.revertable_address,
            clientID: self.config.client_id,
        };
        let hub_fee = self.quote(hub.synthesis()?, &hub_leg, origin, hub).await?;

        let return_leg = Portal::revertSynthesizeCall {
            stableBridgingFee: U256::ZERO,
            externalID: second_leg_external_id(hub, origin, request)?,
        };
        let return_fee = self.quote(origin.portal()?, &return_leg, hub, origin).await?;

        let fee = hub_fee.saturating_add(return_fee);
        ensure_covers_fee(request, fee)?;

        let call = Portal::metaRevertRequestCall {
            metaRevertTransaction: MetaRevertTransaction {
                stableBridgingFee: hub_fee,
                internalID: request.internal_id,
                receiveSide: hub.synthesis()?,
                managerChainBridge: hub.bridge()?,
                sourceChainBridge: origin.bridge()?,
                managerChainId: U256::from(hub.chain_id),
                sourceChainId: U256::from(origin.chain_id),
                router: Address::ZERO,
                swapCalldata: Bytes::new(),
                sourceChainSynthesis: Address::ZERO,
                burnToken: Address::ZERO,
                burnCalldata: Bytes::new(),
                clientID: self.config.client_id,
            },
        };
        self.finish(request, origin, origin.portal()?, &call, fee)
    }

    /// Hub-relayed burn with a located origin: the destination portal sends
    /// the revert to the hub, which burns again toward the origin portal
    async fn burn_v2(&self, request: &TransferRequest) -> Result<RevertTransaction> {
        if request.original_token == Address::ZERO {
            return Err(BridgeError::Decode(format!(
                "relayed burn {} has no origin token",
                request.internal_id
            )));
        }
        let origin = self.registry.require(request.chain_id_from)?;
        let hub = self.registry.hub()?;
        let revert_chain = self.registry.require(request.revert_chain_id)?;

        let mut hub_leg = Synthesis::revertBurnAndBurnCall {
            stableBridgingFee: U256::ZERO,
            externalID: request.external_id,
            receiveSide: origin.portal()?,
            oppositeBridge: origin.bridge()?,
            chainID: U256::from(origin.chain_id),
            revertableAddress: request.revertable_address,
            clientID: self.config.client_id,
        };
        let hub_fee = self.quote(hub.synthesis()?, &hub_leg, revert_chain, hub).await?;

        let return_leg = Portal::unsynthesizeCall {
            stableBridgingFee: U256::ZERO,
            externalID: second_leg_external_id(hub, origin, request)?,
            crossChainID: request.external_id,
            rtoken: request.original_token,
            amount: request.original_from_token_amount.raw,
            chain2address: request.revertable_address,
        };
        let return_fee = self.quote(origin.portal()?, &return_leg, hub, origin).await?;

        let fee = hub_fee.saturating_add(return_fee);
        ensure_covers_fee(request, fee)?;

        hub_leg.stableBridgingFee = return_fee;
        let call = Portal::metaRevertRequestCall {
            metaRevertTransaction: MetaRevertTransaction {
                stableBridgingFee: hub_fee,
                internalID: request.internal_id,
                receiveSide: hub.synthesis()?,
                managerChainBridge: hub.bridge()?,
                sourceChainBridge: origin.bridge()?,
                managerChainId: U256::from(hub.chain_id),
                sourceChainId: U256::from(origin.chain_id),
                router: Address::ZERO,
                swapCalldata: Bytes::new(),
                sourceChainSynthesis: hub.synthesis()?,
                burnToken: Address::ZERO,
                burnCalldata: hub_leg.abi_encode().into(),
                clientID: self.config.client_id,
            },
        };
        self.finish(request, revert_chain, revert_chain.portal()?, &call, fee)
    }

    /// Price `call` on `receive_side`, sent from `from` to `to`
    async fn quote<C: SolCall>(
        &self,
        receive_side: Address,
        call: &C,
        from: &ChainConfig,
        to: &ChainConfig,
    ) -> Result<U256> {
        let quote = self
            .quoter
            .quote_bridge_fee(receive_side, call.abi_encode().into(), from.chain_id, to.chain_id)
            .await?;
        Ok(quote.price)
    }

    fn finish<C: SolCall>(
        &self,
        request: &TransferRequest,
        chain: &ChainConfig,
        contract: Address,
        call: &C,
        fee: U256,
    ) -> Result<RevertTransaction> {
        Ok(RevertTransaction {
            chain_id: chain.chain_id,
            fee,
            envelope: envelope(
                chain,
                request.revertable_address,
                contract,
                call,
                self.config.tron_fee_limit,
            )?,
        })
    }
}

/// External id of the hub's not-yet-emitted request toward `origin`'s portal
fn second_leg_external_id(
    hub: &ChainConfig,
    origin: &ChainConfig,
    request: &TransferRequest,
) -> Result<B256> {
    let internal_id = hub.internal_id(ContractRole::Synthesis, INTERNAL_ID_SENTINEL)?;
    origin.external_id(ContractRole::Portal, &internal_id, &request.revertable_address)
}

fn ensure_covers_fee(request: &TransferRequest, fee: U256) -> Result<()> {
    let amount = request.original_from_token_amount.raw;
    if amount <= fee {
        return Err(BridgeError::AmountLessThanFee { amount, fee });
    }
    Ok(())
}

/// Wrap `call` in the native envelope of `chain`'s family
pub fn envelope<C: SolCall>(
    chain: &ChainConfig,
    from: Address,
    to: Address,
    call: &C,
    tron_fee_limit: u64,
) -> Result<TransactionEnvelope> {
    let data = call.abi_encode();
    match chain.family {
        ChainFamily::Evm | ChainFamily::Cosmos => Ok(TransactionEnvelope::Evm(EvmCall {
            chain_id: chain.chain_id,
            from,
            to,
            data: data.into(),
            value: U256::ZERO,
        })),
        ChainFamily::Tron => Ok(TransactionEnvelope::Tron(TronTriggerCall {
            owner_address: to_tron_base58(&from),
            contract_address: to_tron_base58(&to),
            function_selector: C::SIGNATURE.to_string(),
            parameter: hex::encode(data.get(4..).unwrap_or_default()),
            call_value: 0,
            fee_limit: tron_fee_limit,
        })),
        family @ (ChainFamily::Ton | ChainFamily::Bitcoin) => {
            Err(BridgeError::UnsupportedFamily {
                family,
                operation: "revert transaction",
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(family: ChainFamily) -> ChainConfig {
        ChainConfig {
            chain_id: 728126428,
            name: "tron".to_string(),
            family,
            rpc_url: "https://rpc.example".to_string(),
            ..Default::default()
        }
    }

    fn revert_burn() -> Synthesis::revertBurnCall {
        Synthesis::revertBurnCall {
            stableBridgingFee: U256::from(5u64),
            externalID: B256::repeat_byte(0x42),
        }
    }

    #[test]
    fn test_evm_envelope_carries_full_calldata() {
        let call = revert_burn();
        let env = envelope(
            &chain(ChainFamily::Evm),
            Address::repeat_byte(1),
            Address::repeat_byte(2),
            &call,
            DEFAULT_TRON_FEE_LIMIT,
        )
        .unwrap();

        let TransactionEnvelope::Evm(evm) = env else {
            panic!("expected EVM envelope");
        };
        assert_eq!(evm.data.as_ref(), call.abi_encode().as_slice());
        assert_eq!(&evm.data[..4], Synthesis::revertBurnCall::SELECTOR.as_slice());
        assert_eq!(evm.value, U256::ZERO);
    }

    #[test]
    fn test_tron_envelope_uses_native_encoding() {
        let call = revert_burn();
        let env = envelope(
            &chain(ChainFamily::Tron),
            Address::repeat_byte(1),
            Address::repeat_byte(2),
            &call,
            42,
        )
        .unwrap();

        let TransactionEnvelope::Tron(tron) = env else {
            panic!("expected Tron envelope");
        };
        assert!(tron.owner_address.starts_with('T'));
        assert!(tron.contract_address.starts_with('T'));
        assert_eq!(tron.function_selector, "revertBurn(uint256,bytes32)");
        assert_eq!(tron.parameter.len(), 128);
        assert!(tron.parameter.ends_with(&"42".repeat(32)));
        assert_eq!(tron.fee_limit, 42);
    }

    #[test]
    fn test_ton_has_no_envelope() {
        let result = envelope(
            &chain(ChainFamily::Ton),
            Address::ZERO,
            Address::ZERO,
            &revert_burn(),
            0,
        );
        assert!(matches!(result, Err(BridgeError::UnsupportedFamily { .. })));
    }

    #[test]
    fn test_envelope_serializes_with_kind_tag() {
        let env = TransactionEnvelope::Evm(EvmCall {
            chain_id: 1,
            from: Address::ZERO,
            to: Address::ZERO,
            data: Bytes::new(),
            value: U256::ZERO,
        });
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["kind"], "evm");
        assert_eq!(json["chain_id"], 1);
    }
}
