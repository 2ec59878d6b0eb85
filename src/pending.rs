//! Pending/stuck transfer scanning
//!
//! Reconstructs a user's unfinished transfers from on-chain logs alone.
//!
//! # Flow
//!
//! 1. Per chain, scan a few recent block windows for `SynthesizeRequest`
//!    (portal) and `BurnRequest` (synthesis) logs whose indexed revertable
//!    address is the user. On the hub, burns relayed by the meta-router are
//!    scanned as well.
//! 2. Derive the external id against the destination. Keep the request only
//!    when the source contract marked it sent and the destination has not.
//! 3. Reclassify hub-relayed transfers:
//!    - relayed burn, origin located: `BurnV2` with the origin's sender,
//!      chain and amount
//!    - relayed burn, origin unknown: `BurnV2Revert`
//!    - meta-synthesize or meta-route input: `SynthesizeV2`, reverted from
//!      the origin
//!
//! Windows share their boundary block, so requests are de-duplicated by
//! internal id.

use std::collections::HashSet;
use std::sync::Arc;

use alloy::primitives::{Address, B256, U256};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::config::{ChainConfig, ChainRegistry, ContractRole};
use crate::error::{BridgeError, Result};
use crate::evm::client::{ChainClients, ChainRpc};
use crate::evm::contracts::{MetaRouter, Portal, Synthesis};
use crate::evm::events::{
    address_topic, chain_id_topic, selectors, LogQuery, RequestKind, RequestLog,
};
use crate::tokens::TokenRegistry;
use crate::types::{PendingRequestType, RequestState, TokenAmount, TransferRequest};
use crate::waiter::synthesize_completed_id;

pub const DEFAULT_SCAN_WINDOWS: usize = 3;

#[derive(Debug, Clone, Copy)]
pub struct ScanConfig {
    /// Backward block windows scanned per chain
    pub windows: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            windows: DEFAULT_SCAN_WINDOWS,
        }
    }
}

/// `count` inclusive windows walking back from `current`, newest first
///
/// Adjacent windows share their boundary block.
pub fn block_windows(current: u64, offset: u64, count: usize) -> Vec<(u64, u64)> {
    let mut windows = Vec::with_capacity(count);
    let mut to = current;
    for _ in 0..count {
        let from = to.saturating_sub(offset);
        windows.push((from, to));
        if from == 0 {
            break;
        }
        to = from;
    }
    windows
}

/// Origin of a hub-relayed burn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOrigin {
    pub chain_id: u64,
    pub from: Address,
    pub revertable_address: Address,
    pub amount: U256,
    pub token: Address,
}

/// Locates origins the scanner cannot observe itself, such as non-EVM sources
#[async_trait]
pub trait OriginResolver: Send + Sync {
    /// `synthesize_external_id` is the id completed on the hub in
    /// `hub_tx_hash`, when one was found
    async fn resolve_origin(
        &self,
        hub_tx_hash: B256,
        synthesize_external_id: Option<B256>,
    ) -> Result<Option<ResolvedOrigin>>;
}

pub struct PendingScanner {
    registry: Arc<ChainRegistry>,
    clients: ChainClients,
    tokens: Arc<dyn TokenRegistry>,
    resolver: Option<Arc<dyn OriginResolver>>,
    config: ScanConfig,
}

impl PendingScanner {
    pub fn new(
        registry: Arc<ChainRegistry>,
        clients: ChainClients,
        tokens: Arc<dyn TokenRegistry>,
        config: ScanConfig,
    ) -> Self {
        Self {
            registry,
            clients,
            tokens,
            resolver: None,
            config,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn OriginResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Pending requests of `user` on every configured chain
    ///
    /// A chain that cannot be scanned is skipped with a warning.
    pub async fn pending_requests(&self, user: Address) -> Vec<TransferRequest> {
        let chain_ids: Vec<u64> = self.registry.rpc_chains().map(|c| c.chain_id).collect();
        let results = join_all(
            chain_ids
                .iter()
                .map(|&chain_id| self.pending_requests_on_chain(chain_id, user)),
        )
        .await;

        let mut seen = HashSet::new();
        let mut pending = Vec::new();
        for (chain_id, result) in chain_ids.into_iter().zip(results) {
            match result {
                Ok(requests) => pending.extend(
                    requests
                        .into_iter()
                        .filter(|r| seen.insert(r.internal_id)),
                ),
                Err(e) => warn!(chain_id, error = %e, "Skipping chain in pending scan"),
            }
        }

        info!(user = %user, count = pending.len(), "Pending scan finished");
        pending
    }

    /// Pending requests of `user` emitted on `chain_id`
    pub async fn pending_requests_on_chain(
        &self,
        chain_id: u64,
        user: Address,
    ) -> Result<Vec<TransferRequest>> {
        let chain = self.registry.require(chain_id)?;
        let rpc = self.clients.get(chain_id)?;
        let current = rpc.block_number().await?;

        let mut seen = HashSet::new();
        let mut pending = Vec::new();
        for query in self.queries(chain, user, current) {
            let logs = match rpc.get_logs(&query).await {
                Ok(logs) => logs,
                Err(e) => {
                    warn!(chain_id, query = %query, error = %e, "Skipping window");
                    continue;
                }
            };
            debug!(query = %query, count = logs.len(), "Scanned window");

            for log in &logs {
                let Some(request) = RequestLog::parse(log)? else {
                    continue;
                };
                if !seen.insert(request.internal_id) {
                    continue;
                }
                let internal_id = request.internal_id;
                match self.classify(chain, rpc.as_ref(), request, user).await {
                    Ok(Some(transfer)) => {
                        info!(
                            chain_id,
                            internal_id = %transfer.internal_id,
                            request_type = %transfer.request_type,
                            "Pending request"
                        );
                        pending.push(transfer);
                    }
                    Ok(None) => {}
                    Err(e) => warn!(
                        chain_id,
                        internal_id = %internal_id,
                        error = %e,
                        "Skipping request"
                    ),
                }
            }
        }

        Ok(pending)
    }

    fn queries(&self, chain: &ChainConfig, user: Address, current: u64) -> Vec<LogQuery> {
        let user_topic = address_topic(&user);
        let portal = chain.portal().ok();
        let synthesis = chain.synthesis().ok();
        let meta_router = if self.registry.is_hub(chain.chain_id) {
            chain.meta_router().ok()
        } else {
            None
        };

        let mut queries = Vec::new();
        for (from, to) in block_windows(current, chain.filter_block_offset, self.config.windows) {
            if let Some(portal) = portal {
                queries.push(
                    LogQuery::new(chain.chain_id, portal, selectors::synthesize_request())
                        .topic3(user_topic)
                        .from_block(from)
                        .to_block(to),
                );
            }
            if let Some(synthesis) = synthesis {
                queries.push(
                    LogQuery::new(chain.chain_id, synthesis, selectors::burn_request())
                        .topic3(user_topic)
                        .from_block(from)
                        .to_block(to),
                );
                if let Some(router) = meta_router {
                    queries.push(
                        LogQuery::new(chain.chain_id, synthesis, selectors::burn_request())
                            .topic1(address_topic(&router))
                            .from_block(from)
                            .to_block(to),
                    );
                }
            }
        }
        queries
    }

    async fn classify(
        &self,
        chain: &ChainConfig,
        rpc: &dyn ChainRpc,
        request: RequestLog,
        user: Address,
    ) -> Result<Option<TransferRequest>> {
        let relayed = request.kind == RequestKind::Burn && self.is_relayed_burn(chain, &request);
        if !concerns_user(&request, relayed, user) {
            return Ok(None);
        }
        let Some(destination) = self.registry.chain_config(request.chain_id_to) else {
            debug!(
                chain_id = request.chain_id_to,
                internal_id = %request.internal_id,
                "Destination not configured"
            );
            return Ok(None);
        };

        let destination_role = match request.kind {
            RequestKind::Synthesize => ContractRole::Synthesis,
            RequestKind::Burn => ContractRole::Portal,
        };
        let external_id = destination.external_id(
            destination_role,
            &request.internal_id,
            &request.revertable_address,
        )?;
        let transaction_hash = request.transaction_hash.ok_or_else(|| {
            BridgeError::Decode("request log without transaction hash".to_string())
        })?;

        if source_state(rpc, &request).await? != RequestState::Sent {
            debug!(internal_id = %request.internal_id, "Source request not sent");
            return Ok(None);
        }
        let state = self
            .destination_state(destination, request.kind, external_id)
            .await?;
        if state == RequestState::Sent {
            debug!(internal_id = %request.internal_id, "Already completed on destination");
            return Ok(None);
        }

        let amount = self.token_amount(request.amount, request.token, chain.chain_id);
        let mut transfer = TransferRequest {
            internal_id: request.internal_id,
            external_id,
            request_type: match request.kind {
                RequestKind::Synthesize => PendingRequestType::Synthesize,
                RequestKind::Burn => PendingRequestType::Burn,
            },
            chain_id_from: chain.chain_id,
            chain_id_to: destination.chain_id,
            revert_chain_id: destination.chain_id,
            from: request.from,
            to: request.to,
            revertable_address: request.revertable_address,
            from_token_amount: amount.clone(),
            original_from_token_amount: amount,
            original_token: request.token,
            state,
            transaction_hash,
        };

        match request.kind {
            RequestKind::Synthesize => {
                if is_v2_synthesize(rpc, transaction_hash).await? {
                    transfer.request_type = PendingRequestType::SynthesizeV2;
                    transfer.revert_chain_id = transfer.chain_id_from;
                }
            }
            RequestKind::Burn if relayed => {
                self.resolve_relayed_burn(chain, &mut transfer).await;
            }
            RequestKind::Burn => {}
        }

        if transfer.revertable_address != user && transfer.from != user {
            return Ok(None);
        }
        Ok(Some(transfer))
    }

    fn is_relayed_burn(&self, chain: &ChainConfig, request: &RequestLog) -> bool {
        self.registry.is_hub(chain.chain_id)
            && chain.synthesis().ok() == Some(request.emitter)
            && chain.meta_router().ok() == Some(request.from)
    }

    /// Rewrite a relayed burn to its origin, or mark the origin unknowable
    async fn resolve_relayed_burn(&self, hub: &ChainConfig, transfer: &mut TransferRequest) {
        let completed_id = match self.hub_synthesize_id(hub, transfer.transaction_hash).await {
            Ok(id) => id,
            Err(e) => {
                warn!(tx_hash = %transfer.transaction_hash, error = %e, "Hub receipt unavailable");
                None
            }
        };

        let mut origin = None;
        if let Some(completed_id) = completed_id {
            origin = self.locate_origin(hub, completed_id).await;
        }
        if origin.is_none() {
            if let Some(resolver) = &self.resolver {
                origin = resolver
                    .resolve_origin(transfer.transaction_hash, completed_id)
                    .await
                    .unwrap_or_else(|e| {
                        warn!(error = %e, "Origin resolver failed");
                        None
                    });
            }
        }

        match origin {
            Some(origin) => {
                debug!(
                    internal_id = %transfer.internal_id,
                    origin_chain_id = origin.chain_id,
                    "Relayed burn origin located"
                );
                transfer.request_type = PendingRequestType::BurnV2;
                transfer.chain_id_from = origin.chain_id;
                transfer.from = origin.from;
                transfer.original_from_token_amount =
                    self.token_amount(origin.amount, origin.token, origin.chain_id);
                transfer.original_token = origin.token;
            }
            None => {
                debug!(internal_id = %transfer.internal_id, "Relayed burn origin unknown");
                transfer.request_type = PendingRequestType::BurnV2Revert;
            }
        }
        transfer.revert_chain_id = transfer.chain_id_to;
    }

    async fn hub_synthesize_id(&self, hub: &ChainConfig, tx_hash: B256) -> Result<Option<B256>> {
        let rpc = self.clients.get(hub.chain_id)?;
        match rpc.get_receipt_logs(tx_hash).await? {
            Some(logs) => synthesize_completed_id(&logs),
            None => Ok(None),
        }
    }

    /// Search every other chain for the synthesize the hub completed as
    /// `completed_id`
    async fn locate_origin(&self, hub: &ChainConfig, completed_id: B256) -> Option<ResolvedOrigin> {
        for chain in self
            .registry
            .rpc_chains()
            .filter(|c| c.chain_id != hub.chain_id)
        {
            match self.find_origin_on_chain(chain, hub, completed_id).await {
                Ok(Some(origin)) => return Some(origin),
                Ok(None) => {}
                Err(e) => warn!(chain_id = chain.chain_id, error = %e, "Origin search failed"),
            }
        }
        None
    }

    async fn find_origin_on_chain(
        &self,
        chain: &ChainConfig,
        hub: &ChainConfig,
        completed_id: B256,
    ) -> Result<Option<ResolvedOrigin>> {
        let Ok(portal) = chain.portal() else {
            return Ok(None);
        };
        let rpc = self.clients.get(chain.chain_id)?;
        let current = rpc.block_number().await?;

        for (from, to) in block_windows(current, chain.filter_block_offset, self.config.windows) {
            let query = LogQuery::new(chain.chain_id, portal, selectors::synthesize_request())
                .topic2(chain_id_topic(hub.chain_id))
                .from_block(from)
                .to_block(to);

            let logs = match rpc.get_logs(&query).await {
                Ok(logs) => logs,
                Err(e) => {
                    warn!(
                        chain_id = chain.chain_id,
                        query = %query,
                        error = %e,
                        "Skipping window"
                    );
                    continue;
                }
            };
            for log in logs {
                let Some(request) = RequestLog::parse(&log)? else {
                    continue;
                };
                let external_id = hub.external_id(
                    ContractRole::Synthesis,
                    &request.internal_id,
                    &request.revertable_address,
                )?;
                if external_id == completed_id {
                    return Ok(Some(ResolvedOrigin {
                        chain_id: chain.chain_id,
                        from: request.from,
                        revertable_address: request.revertable_address,
                        amount: request.amount,
                        token: request.token,
                    }));
                }
            }
        }
        Ok(None)
    }

    async fn destination_state(
        &self,
        destination: &ChainConfig,
        kind: RequestKind,
        external_id: B256,
    ) -> Result<RequestState> {
        if !destination.family.has_evm_rpc() {
            return Ok(RequestState::Default);
        }
        let rpc = self.clients.get(destination.chain_id)?;
        let state = match kind {
            RequestKind::Synthesize => {
                eth_call(
                    rpc.as_ref(),
                    destination.synthesis()?,
                    Synthesis::synthesizeStatesCall {
                        externalID: external_id,
                    },
                )
                .await?
                ._0
            }
            RequestKind::Burn => {
                eth_call(
                    rpc.as_ref(),
                    destination.portal()?,
                    Portal::unsynthesizeStatesCall {
                        externalID: external_id,
                    },
                )
                .await?
                ._0
            }
        };
        Ok(RequestState::from_u8(state))
    }

    fn token_amount(&self, raw: U256, token: Address, chain_id: u64) -> TokenAmount {
        TokenAmount::new(raw, self.tokens.find_token_by_address(&token, chain_id))
    }
}

/// Whether the decoded log can belong to `user`, checked before any RPC
///
/// A relayed burn names the meta-router as sender, so its recipient stands
/// in for the origin sender until the origin is located.
fn concerns_user(request: &RequestLog, relayed: bool, user: Address) -> bool {
    let sender = if relayed { request.to } else { request.from };
    request.revertable_address == user || sender == user
}

async fn source_state(rpc: &dyn ChainRpc, request: &RequestLog) -> Result<RequestState> {
    let state = match request.kind {
        RequestKind::Synthesize => {
            eth_call(
                rpc,
                request.emitter,
                Portal::requestsCall {
                    internalID: request.internal_id,
                },
            )
            .await?
            .state
        }
        RequestKind::Burn => {
            eth_call(
                rpc,
                request.emitter,
                Synthesis::requestsCall {
                    internalID: request.internal_id,
                },
            )
            .await?
            .state
        }
    };
    Ok(RequestState::from_u8(state))
}

/// Whether the transaction entered through meta-synthesize or meta-route
async fn is_v2_synthesize(rpc: &dyn ChainRpc, tx_hash: B256) -> Result<bool> {
    let Some(input) = rpc.get_transaction_input(tx_hash).await? else {
        return Ok(false);
    };
    let Some(selector) = input.get(..4) else {
        return Ok(false);
    };
    Ok(selector == Portal::metaSynthesizeCall::SELECTOR.as_slice()
        || selector == MetaRouter::metaRouteCall::SELECTOR.as_slice())
}

async fn eth_call<C: SolCall>(rpc: &dyn ChainRpc, to: Address, call: C) -> Result<C::Return> {
    let output = rpc.call(to, call.abi_encode().into()).await?;
    C::abi_decode_returns(&output, true)
        .map_err(|e| BridgeError::Decode(format!("{}: {}", C::SIGNATURE, e)))
}
