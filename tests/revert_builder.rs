//! Revert building with canned fee quotes
//!
//! Run with: cargo test --test revert_builder

mod common;

use std::sync::Arc;

use alloy::primitives::{Address, B256, U256};
use alloy::sol_types::SolCall;
use tokio_test::{assert_err, assert_ok};

use common::*;
use xchain_recovery::address_codec::to_tron_base58;
use xchain_recovery::evm::contracts::{Portal, Synthesis};
use xchain_recovery::revert::DEFAULT_TRON_FEE_LIMIT;
use xchain_recovery::{
    BridgeError, FeeQuoter, PendingRequestType, RequestState, RevertBuilder, RevertConfig,
    TokenAmount, TransactionEnvelope, TransferRequest,
};

fn user() -> Address {
    Address::repeat_byte(0xcc)
}

fn origin_token() -> Address {
    Address::repeat_byte(0x70)
}

fn request(
    request_type: PendingRequestType,
    chain_id_from: u64,
    chain_id_to: u64,
    revert_chain_id: u64,
    amount: u64,
) -> TransferRequest {
    let amount = TokenAmount::new(U256::from(amount), None);
    TransferRequest {
        internal_id: B256::repeat_byte(0xaa),
        external_id: B256::repeat_byte(0xbb),
        request_type,
        chain_id_from,
        chain_id_to,
        revert_chain_id,
        from: user(),
        to: user(),
        revertable_address: user(),
        from_token_amount: amount.clone(),
        original_from_token_amount: amount,
        original_token: origin_token(),
        state: RequestState::Default,
        transaction_hash: B256::repeat_byte(0x01),
    }
}

fn builder(quoter: Arc<dyn FeeQuoter>) -> RevertBuilder {
    RevertBuilder::new(registry(), quoter, RevertConfig::default())
}

fn evm_data(envelope: &TransactionEnvelope) -> &[u8] {
    match envelope {
        TransactionEnvelope::Evm(call) => call.data.as_ref(),
        other => panic!("expected EVM envelope, got {:?}", other),
    }
}

// ============================================================================
// Direct Requests
// ============================================================================

#[tokio::test]
async fn test_burn_revert_sent_on_destination_portal() {
    let quoter = FixedQuoter::new(1_000);
    let builder = builder(quoter.clone());
    let burn = request(PendingRequestType::Burn, ORIGIN, DESTINATION, DESTINATION, 5_000);

    let tx = assert_ok!(builder.build(&burn).await);

    assert_eq!(tx.chain_id, DESTINATION);
    assert_eq!(tx.fee, U256::from(1_000u64));
    let TransactionEnvelope::Evm(evm) = &tx.envelope else {
        panic!("expected EVM envelope");
    };
    assert_eq!(evm.to, portal(DESTINATION));
    assert_eq!(evm.from, user());

    let call = Portal::revertBurnRequestCall::abi_decode(&evm.data, true).unwrap();
    assert_eq!(call.stableBridgingFee, U256::from(1_000u64));
    assert_eq!(call.internalID, burn.internal_id);
    assert_eq!(call.receiveSide, synthesis(ORIGIN));
    assert_eq!(call.oppositeBridge, bridge(ORIGIN));
    assert_eq!(call.chainID, U256::from(ORIGIN));

    let quotes = quoter.requests.lock().unwrap();
    assert_eq!(quotes.len(), 1);
    let (receive_side, calldata, from, to) = &quotes[0];
    assert_eq!(*receive_side, synthesis(ORIGIN));
    assert_eq!(&calldata[..4], Synthesis::revertBurnCall::SELECTOR.as_slice());
    assert_eq!((*from, *to), (DESTINATION, ORIGIN));
}

#[tokio::test]
async fn test_amount_equal_to_fee_rejected() {
    let builder = builder(FixedQuoter::new(1_000));
    let burn = request(PendingRequestType::Burn, ORIGIN, DESTINATION, DESTINATION, 1_000);

    let err = assert_err!(builder.build(&burn).await);
    let BridgeError::AmountLessThanFee { amount, fee } = err else {
        panic!("expected AmountLessThanFee, got {:?}", err);
    };
    assert_eq!(amount, U256::from(1_000u64));
    assert_eq!(fee, U256::from(1_000u64));
}

#[tokio::test]
async fn test_synthesize_revert_on_tron_uses_trigger_envelope() {
    let builder = builder(FixedQuoter::new(10));
    let stuck = request(PendingRequestType::Synthesize, ORIGIN, TRON, TRON, 5_000);

    let tx = assert_ok!(builder.build(&stuck).await);

    assert_eq!(tx.chain_id, TRON);
    let TransactionEnvelope::Tron(trigger) = &tx.envelope else {
        panic!("expected Tron envelope, got {:?}", tx.envelope);
    };
    assert_eq!(trigger.owner_address, to_tron_base58(&user()));
    assert_eq!(trigger.contract_address, to_tron_base58(&synthesis(TRON)));
    assert_eq!(
        trigger.function_selector,
        Synthesis::revertSynthesizeRequestCall::SIGNATURE
    );
    assert_eq!(trigger.fee_limit, DEFAULT_TRON_FEE_LIMIT);
    assert_eq!(trigger.call_value, 0);

    // Parameter is the calldata without its selector
    let expected = Synthesis::revertSynthesizeRequestCall {
        stableBridgingFee: U256::from(10u64),
        internalID: stuck.internal_id,
        receiveSide: portal(ORIGIN),
        oppositeBridge: bridge(ORIGIN),
        chainID: U256::from(ORIGIN),
        clientID: RevertConfig::default().client_id,
    }
    .abi_encode();
    assert_eq!(trigger.parameter, hex::encode(&expected[4..]));
}

#[tokio::test]
async fn test_quote_failure_propagates() {
    let builder = builder(Arc::new(FailingQuoter("route not supported".to_string())));
    let burn = request(PendingRequestType::Burn, ORIGIN, DESTINATION, DESTINATION, 5_000);

    let err = assert_err!(builder.build(&burn).await);
    assert!(matches!(err, BridgeError::PriceQuote(ref m) if m == "route not supported"));
}

// ============================================================================
// Hub-relayed Requests
// ============================================================================

#[tokio::test]
async fn test_burn_v2_fee_covers_both_legs() {
    let quoter = FixedQuoter::new(1_000);
    let builder = builder(quoter.clone());
    let relayed = request(PendingRequestType::BurnV2, ORIGIN, DESTINATION, DESTINATION, 2_500);

    let tx = assert_ok!(builder.build(&relayed).await);
    assert_eq!(tx.fee, U256::from(2_000u64));
    assert_eq!(tx.chain_id, DESTINATION);

    let call = Portal::metaRevertRequestCall::abi_decode(evm_data(&tx.envelope), true).unwrap();
    let meta = call.metaRevertTransaction;
    assert_eq!(meta.stableBridgingFee, U256::from(1_000u64));
    assert_eq!(meta.receiveSide, synthesis(HUB));
    assert_eq!(meta.managerChainId, U256::from(HUB));
    assert_eq!(meta.sourceChainId, U256::from(ORIGIN));
    assert_eq!(meta.sourceChainSynthesis, synthesis(HUB));

    let hub_leg = Synthesis::revertBurnAndBurnCall::abi_decode(&meta.burnCalldata, true).unwrap();
    assert_eq!(hub_leg.stableBridgingFee, U256::from(1_000u64));
    assert_eq!(hub_leg.receiveSide, portal(ORIGIN));
    assert_eq!(hub_leg.revertableAddress, user());

    let quotes = quoter.requests.lock().unwrap();
    assert_eq!(quotes.len(), 2);
    assert_eq!((quotes[0].2, quotes[0].3), (DESTINATION, HUB));
    assert_eq!((quotes[1].2, quotes[1].3), (HUB, ORIGIN));
    assert_eq!(quotes[1].0, portal(ORIGIN));
}

#[tokio::test]
async fn test_burn_v2_return_leg_carries_origin_token() {
    let quoter = FixedQuoter::new(1_000);
    let builder = builder(quoter.clone());
    let relayed = request(PendingRequestType::BurnV2, ORIGIN, DESTINATION, DESTINATION, 2_500);

    assert_ok!(builder.build(&relayed).await);

    let quotes = quoter.requests.lock().unwrap();
    let return_leg = Portal::unsynthesizeCall::abi_decode(&quotes[1].1, true).unwrap();
    assert_eq!(return_leg.rtoken, origin_token());
    assert_eq!(return_leg.amount, U256::from(2_500u64));
    assert_eq!(return_leg.chain2address, user());
    assert_eq!(return_leg.crossChainID, relayed.external_id);
}

#[tokio::test]
async fn test_burn_v2_without_origin_token_rejected() {
    let quoter = FixedQuoter::new(1_000);
    let builder = builder(quoter.clone());
    let mut relayed = request(PendingRequestType::BurnV2, ORIGIN, DESTINATION, DESTINATION, 2_500);
    relayed.original_token = Address::ZERO;

    let err = assert_err!(builder.build(&relayed).await);
    assert!(matches!(err, BridgeError::Decode(ref m) if m.contains("no origin token")));
    assert!(quoter.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_burn_v2_rejected_below_combined_fee() {
    let builder = builder(FixedQuoter::new(1_000));
    // Covers one leg but not both
    let relayed = request(PendingRequestType::BurnV2, ORIGIN, DESTINATION, DESTINATION, 1_500);

    let err = assert_err!(builder.build(&relayed).await);
    assert!(matches!(
        err,
        BridgeError::AmountLessThanFee { fee, .. } if fee == U256::from(2_000u64)
    ));
}

#[tokio::test]
async fn test_synthesize_v2_reverted_from_origin() {
    let builder = builder(FixedQuoter::new(100));
    let relayed = request(PendingRequestType::SynthesizeV2, ORIGIN, HUB, ORIGIN, 5_000);

    let tx = assert_ok!(builder.build(&relayed).await);
    assert_eq!(tx.chain_id, ORIGIN);
    assert_eq!(tx.fee, U256::from(200u64));

    let TransactionEnvelope::Evm(evm) = &tx.envelope else {
        panic!("expected EVM envelope");
    };
    assert_eq!(evm.to, portal(ORIGIN));
    assert_eq!(&evm.data[..4], Portal::metaRevertRequestCall::SELECTOR.as_slice());
}

#[tokio::test]
async fn test_burn_v2_revert_targets_hub_synthesis() {
    let quoter = FixedQuoter::new(100);
    let builder = builder(quoter.clone());
    let stuck = request(PendingRequestType::BurnV2Revert, HUB, DESTINATION, DESTINATION, 5_000);

    let tx = assert_ok!(builder.build(&stuck).await);

    let call = Portal::revertBurnRequestCall::abi_decode(evm_data(&tx.envelope), true).unwrap();
    assert_eq!(call.receiveSide, synthesis(HUB));
    assert_eq!(call.chainID, U256::from(HUB));
    assert_eq!(quoter.requests.lock().unwrap()[0].0, synthesis(HUB));
}
