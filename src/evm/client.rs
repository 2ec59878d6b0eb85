//! EVM RPC access
//!
//! [`ChainRpc`] is the seam every component reads chain state through. The
//! production implementation wraps an alloy HTTP provider; tests substitute
//! in-memory fakes. [`ChainClients`] is the per-process registry of clients,
//! built once and passed into the waiter and scanner.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use alloy::consensus::Transaction as _;
use alloy::primitives::{Address, Bytes, B256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::{Log, TransactionInput, TransactionRequest};
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
use eyre::WrapErr;
use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, info};

use crate::config::ChainRegistry;
use crate::error::{BridgeError, Result};
use crate::evm::events::LogQuery;

/// Read-only JSON-RPC surface needed to track and recover transfers
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn block_number(&self) -> Result<u64>;

    async fn get_logs(&self, query: &LogQuery) -> Result<Vec<Log>>;

    /// Logs of a mined transaction, `None` when no receipt exists
    async fn get_receipt_logs(&self, tx_hash: B256) -> Result<Option<Vec<Log>>>;

    /// Calldata of a transaction, `None` when unknown
    async fn get_transaction_input(&self, tx_hash: B256) -> Result<Option<Bytes>>;

    /// `eth_call` against the latest block
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes>;
}

// ============================================================================
// Alloy Implementation
// ============================================================================

/// [`ChainRpc`] over a single alloy HTTP provider
pub struct AlloyRpc {
    chain_id: u64,
    provider: RootProvider<Http<Client>>,
}

impl AlloyRpc {
    pub fn new(chain_id: u64, rpc_url: &str) -> eyre::Result<Self> {
        let parsed = rpc_url
            .parse()
            .wrap_err_with(|| format!("Invalid RPC URL: {}", rpc_url))?;
        let provider = ProviderBuilder::new().on_http(parsed);

        debug!(chain_id, "Created RPC client");

        Ok(Self { chain_id, provider })
    }

    fn rpc_error(&self, e: impl std::fmt::Display) -> BridgeError {
        BridgeError::Rpc {
            chain_id: self.chain_id,
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl ChainRpc for AlloyRpc {
    async fn block_number(&self) -> Result<u64> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| self.rpc_error(e))
    }

    async fn get_logs(&self, query: &LogQuery) -> Result<Vec<Log>> {
        self.provider
            .get_logs(&query.to_filter())
            .await
            .map_err(|e| self.rpc_error(e))
    }

    async fn get_receipt_logs(&self, tx_hash: B256) -> Result<Option<Vec<Log>>> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| self.rpc_error(e))?;
        Ok(receipt.map(|r| r.inner.logs().to_vec()))
    }

    async fn get_transaction_input(&self, tx_hash: B256) -> Result<Option<Bytes>> {
        let tx = self
            .provider
            .get_transaction_by_hash(tx_hash)
            .await
            .map_err(|e| self.rpc_error(e))?;
        Ok(tx.map(|tx| tx.input().clone()))
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let request = TransactionRequest::default()
            .to(to)
            .input(TransactionInput::new(data));
        self.provider
            .call(&request)
            .await
            .map_err(|e| self.rpc_error(e))
    }
}

// ============================================================================
// Primary / Spare Racing
// ============================================================================

/// Resolve to the first `Ok`; fail only once every future has failed
///
/// A failing endpoint never cancels one still in flight.
pub async fn first_success<T, I, F>(futures: I) -> Result<T>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T>>,
{
    let mut pending: FuturesUnordered<F> = futures.into_iter().collect();
    let attempts = pending.len();
    let mut last_error = None;

    while let Some(outcome) = pending.next().await {
        match outcome {
            Ok(value) => return Ok(value),
            Err(e) => {
                debug!(error = %e, remaining = pending.len(), "Endpoint failed");
                last_error = Some(e.to_string());
            }
        }
    }

    Err(BridgeError::AllEndpointsFailed {
        attempts,
        last: last_error.unwrap_or_else(|| "no endpoints configured".to_string()),
    })
}

/// A chain's primary endpoint plus spares
///
/// Log queries are raced across every endpoint; other calls use the primary.
pub struct RpcPool {
    chain_id: u64,
    primary: Arc<dyn ChainRpc>,
    spares: Vec<Arc<dyn ChainRpc>>,
}

impl RpcPool {
    pub fn new(chain_id: u64, primary: Arc<dyn ChainRpc>, spares: Vec<Arc<dyn ChainRpc>>) -> Self {
        Self {
            chain_id,
            primary,
            spares,
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn endpoint_count(&self) -> usize {
        1 + self.spares.len()
    }
}

#[async_trait]
impl ChainRpc for RpcPool {
    async fn block_number(&self) -> Result<u64> {
        self.primary.block_number().await
    }

    async fn get_logs(&self, query: &LogQuery) -> Result<Vec<Log>> {
        if self.spares.is_empty() {
            return self.primary.get_logs(query).await;
        }
        first_success(
            std::iter::once(&self.primary)
                .chain(self.spares.iter())
                .map(|rpc| rpc.get_logs(query)),
        )
        .await
    }

    async fn get_receipt_logs(&self, tx_hash: B256) -> Result<Option<Vec<Log>>> {
        self.primary.get_receipt_logs(tx_hash).await
    }

    async fn get_transaction_input(&self, tx_hash: B256) -> Result<Option<Bytes>> {
        self.primary.get_transaction_input(tx_hash).await
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        self.primary.call(to, data).await
    }
}

// ============================================================================
// Client Registry
// ============================================================================

/// Per-chain RPC clients, constructed once and injected into components
#[derive(Clone, Default)]
pub struct ChainClients {
    clients: HashMap<u64, Arc<dyn ChainRpc>>,
}

impl ChainClients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an [`RpcPool`] of alloy providers for every enabled RPC chain
    pub fn connect(registry: &ChainRegistry) -> eyre::Result<Self> {
        let mut clients = Self::new();
        for chain in registry.rpc_chains() {
            let mut endpoints = chain
                .rpc_urls()
                .iter()
                .map(|url| {
                    let rpc = AlloyRpc::new(chain.chain_id, url)?;
                    Ok::<_, eyre::Report>(Arc::new(rpc) as Arc<dyn ChainRpc>)
                })
                .collect::<eyre::Result<Vec<_>>>()?;
            if endpoints.is_empty() {
                return Err(eyre::eyre!("At least one RPC URL is required for {}", chain.name));
            }
            let primary = endpoints.remove(0);
            let pool = RpcPool::new(chain.chain_id, primary, endpoints);

            info!(
                chain_id = chain.chain_id,
                name = %chain.name,
                endpoints = pool.endpoint_count(),
                "Registered chain RPC"
            );
            clients.insert(chain.chain_id, Arc::new(pool));
        }
        Ok(clients)
    }

    pub fn insert(&mut self, chain_id: u64, client: Arc<dyn ChainRpc>) {
        self.clients.insert(chain_id, client);
    }

    /// Client for `chain_id`, or [`BridgeError::UnknownChain`]
    pub fn get(&self, chain_id: u64) -> Result<Arc<dyn ChainRpc>> {
        self.clients
            .get(&chain_id)
            .cloned()
            .ok_or(BridgeError::UnknownChain(chain_id))
    }

    pub fn contains(&self, chain_id: u64) -> bool {
        self.clients.contains_key(&chain_id)
    }
}

impl FromIterator<(u64, Arc<dyn ChainRpc>)> for ChainClients {
    fn from_iter<I: IntoIterator<Item = (u64, Arc<dyn ChainRpc>)>>(iter: I) -> Self {
        Self {
            clients: iter.into_iter().collect(),
        }
    }
}
