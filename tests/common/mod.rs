//! Shared fixtures for integration tests
//!
//! Chains: 1 (origin), 56 (hub), 137 (destination), 728126428 (Tron). Every
//! chain gets its own contract addresses so a query against the wrong
//! contract finds nothing.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::rpc::types::Log;
use alloy::sol_types::{SolCall, SolEvent};
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use xchain_recovery::adapters::{ExtraStepWaiter, PendingExtraStep};
use xchain_recovery::config::{ChainConfig, ChainRegistry, TimeoutConfig};
use xchain_recovery::error::{BridgeError, Result};
use xchain_recovery::evm::{ChainClients, ChainRpc, LogQuery};
use xchain_recovery::pricing::{FeeQuote, FeeQuoter};
use xchain_recovery::types::{ChainFamily, ExtraStep};

pub const ORIGIN: u64 = 1;
pub const HUB: u64 = 56;
pub const DESTINATION: u64 = 137;
pub const TRON: u64 = 728126428;

pub const HEAD: u64 = 1_000;
pub const OFFSET: u64 = 100;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Chain Fixtures
// ============================================================================

fn chain_byte(chain_id: u64) -> u8 {
    match chain_id {
        ORIGIN => 0x10,
        HUB => 0x20,
        DESTINATION => 0x30,
        _ => 0x40,
    }
}

pub fn portal(chain_id: u64) -> Address {
    Address::repeat_byte(chain_byte(chain_id) + 1)
}

pub fn synthesis(chain_id: u64) -> Address {
    Address::repeat_byte(chain_byte(chain_id) + 2)
}

pub fn bridge(chain_id: u64) -> Address {
    Address::repeat_byte(chain_byte(chain_id) + 3)
}

pub fn meta_router(chain_id: u64) -> Address {
    Address::repeat_byte(chain_byte(chain_id) + 4)
}

pub fn chain(chain_id: u64, family: ChainFamily) -> ChainConfig {
    ChainConfig {
        chain_id,
        name: format!("chain-{}", chain_id),
        family,
        rpc_url: format!("https://rpc-{}.example", chain_id),
        filter_block_offset: OFFSET,
        bridge_address: Some(format!("{:#x}", bridge(chain_id))),
        portal_address: Some(format!("{:#x}", portal(chain_id))),
        synthesis_address: Some(format!("{:#x}", synthesis(chain_id))),
        meta_router_address: (chain_id == HUB).then(|| format!("{:#x}", meta_router(chain_id))),
        ..Default::default()
    }
}

pub fn registry() -> Arc<ChainRegistry> {
    Arc::new(
        ChainRegistry::new(
            vec![
                chain(ORIGIN, ChainFamily::Evm),
                chain(HUB, ChainFamily::Evm),
                chain(DESTINATION, ChainFamily::Evm),
                chain(TRON, ChainFamily::Tron),
            ],
            HUB,
        )
        .unwrap(),
    )
}

pub fn fast_timeouts() -> TimeoutConfig {
    TimeoutConfig {
        interval: Duration::from_secs(10),
        evm_log: Duration::from_secs(60),
        btc_deposit: Duration::from_secs(60),
        btc_confirmations: Duration::from_secs(60),
        ton_scan: Duration::from_secs(60),
        settlement: Duration::from_secs(60),
    }
}

// ============================================================================
// Fake RPC
// ============================================================================

/// In-memory chain: logs indexed by transaction, canned `eth_call` results
pub struct FakeRpc {
    head: u64,
    logs: Mutex<Vec<Log>>,
    receipts: Mutex<HashMap<B256, Vec<Log>>>,
    inputs: Mutex<HashMap<B256, Bytes>>,
    calls: Mutex<HashMap<(Address, Bytes), Bytes>>,
    call_count: AtomicUsize,
    failing_windows: Mutex<Vec<u64>>,
}

impl FakeRpc {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            head: HEAD,
            logs: Mutex::new(vec![]),
            receipts: Mutex::new(HashMap::new()),
            inputs: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            call_count: AtomicUsize::new(0),
            failing_windows: Mutex::new(vec![]),
        })
    }

    /// Mine `tx_hash` at `block` emitting `logs`
    pub fn add_tx(&self, tx_hash: B256, block: u64, logs: Vec<Log>) {
        let logs: Vec<Log> = logs
            .into_iter()
            .map(|mut log| {
                log.block_number = Some(block);
                log.transaction_hash = Some(tx_hash);
                log
            })
            .collect();
        self.logs.lock().unwrap().extend(logs.iter().cloned());
        self.receipts.lock().unwrap().insert(tx_hash, logs);
    }

    pub fn set_input(&self, tx_hash: B256, input: Bytes) {
        self.inputs.lock().unwrap().insert(tx_hash, input);
    }

    /// Fail every log query starting at `from_block`
    pub fn fail_window(&self, from_block: u64) {
        self.failing_windows.lock().unwrap().push(from_block);
    }

    /// Number of `eth_call`s served so far, answered or not
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Answer `call` on `to` with the ABI words `returns`
    pub fn respond<C: SolCall>(&self, to: Address, call: C, returns: &[U256]) {
        self.calls
            .lock()
            .unwrap()
            .insert((to, call.abi_encode().into()), words(returns));
    }
}

#[async_trait]
impl ChainRpc for FakeRpc {
    async fn block_number(&self) -> Result<u64> {
        Ok(self.head)
    }

    async fn get_logs(&self, query: &LogQuery) -> Result<Vec<Log>> {
        let failing = self.failing_windows.lock().unwrap().clone();
        if query.from_block.is_some_and(|from| failing.contains(&from)) {
            return Err(BridgeError::Rpc {
                chain_id: query.chain_id,
                message: "query returned more than 10000 results".to_string(),
            });
        }
        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|log| query.matches(log))
            .cloned()
            .collect())
    }

    async fn get_receipt_logs(&self, tx_hash: B256) -> Result<Option<Vec<Log>>> {
        Ok(self.receipts.lock().unwrap().get(&tx_hash).cloned())
    }

    async fn get_transaction_input(&self, tx_hash: B256) -> Result<Option<Bytes>> {
        let known = self.receipts.lock().unwrap().contains_key(&tx_hash);
        Ok(self
            .inputs
            .lock()
            .unwrap()
            .get(&tx_hash)
            .cloned()
            .or_else(|| known.then(Bytes::new)))
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.calls
            .lock()
            .unwrap()
            .get(&(to, data))
            .cloned()
            .ok_or_else(|| BridgeError::Rpc {
                chain_id: 0,
                message: "execution reverted".to_string(),
            })
    }
}

pub fn clients(rpcs: &[(u64, &Arc<FakeRpc>)]) -> ChainClients {
    rpcs.iter()
        .map(|(chain_id, rpc)| (*chain_id, Arc::clone(rpc) as Arc<dyn ChainRpc>))
        .collect()
}

pub fn log_of<E: SolEvent>(address: Address, event: &E) -> Log {
    Log {
        inner: alloy::primitives::Log {
            address,
            data: event.encode_log_data(),
        },
        ..Default::default()
    }
}

/// Concatenated 32-byte ABI words
pub fn words(values: &[U256]) -> Bytes {
    values
        .iter()
        .flat_map(|v| v.to_be_bytes::<32>())
        .collect::<Vec<u8>>()
        .into()
}

/// `requests(id)` return words with only `state` set
pub fn request_state(state: u8) -> Vec<U256> {
    let mut returns = vec![U256::ZERO; 5];
    returns.push(U256::from(state));
    returns
}

// ============================================================================
// Fake Collaborators
// ============================================================================

/// Quotes a fixed price per leg and records every request
pub struct FixedQuoter {
    pub price: U256,
    pub requests: Mutex<Vec<(Address, Bytes, u64, u64)>>,
}

impl FixedQuoter {
    pub fn new(price: u64) -> Arc<Self> {
        Arc::new(Self {
            price: U256::from(price),
            requests: Mutex::new(vec![]),
        })
    }
}

#[async_trait]
impl FeeQuoter for FixedQuoter {
    async fn quote_bridge_fee(
        &self,
        receive_side: Address,
        calldata: Bytes,
        chain_id_from: u64,
        chain_id_to: u64,
    ) -> Result<FeeQuote> {
        self.requests
            .lock()
            .unwrap()
            .push((receive_side, calldata, chain_id_from, chain_id_to));
        Ok(FeeQuote {
            price: self.price,
            save: None,
        })
    }
}

pub struct FailingQuoter(pub String);

#[async_trait]
impl FeeQuoter for FailingQuoter {
    async fn quote_bridge_fee(
        &self,
        _receive_side: Address,
        _calldata: Bytes,
        _chain_id_from: u64,
        _chain_id_to: u64,
    ) -> Result<FeeQuote> {
        Err(BridgeError::PriceQuote(self.0.clone()))
    }
}

/// Resolves every extra step to `out_hash`
pub struct CannedExtraSteps {
    pub out_hash: String,
    pub seen: Mutex<Vec<PendingExtraStep>>,
}

impl CannedExtraSteps {
    pub fn new(out_hash: &str) -> Arc<Self> {
        Arc::new(Self {
            out_hash: out_hash.to_string(),
            seen: Mutex::new(vec![]),
        })
    }
}

#[async_trait]
impl ExtraStepWaiter for CannedExtraSteps {
    async fn wait(
        &self,
        step: &PendingExtraStep,
        _cancel: &CancellationToken,
    ) -> Result<ExtraStep> {
        self.seen.lock().unwrap().push(step.clone());
        Ok(ExtraStep {
            kind: step.kind(),
            out_hash: self.out_hash.clone(),
        })
    }
}


// ============================================================================
// Staged HTTP Server
// ============================================================================

type Routes = Arc<Mutex<HashMap<String, VecDeque<(u16, String)>>>>;
type Hits = Arc<Mutex<Vec<(String, String)>>>;

/// Local HTTP/1.1 server replaying staged responses per path
///
/// Each path answers its queued responses in order and then keeps repeating
/// the last one. Unknown paths answer 404.
pub struct StagedHttp {
    pub base_url: String,
    routes: Routes,
    hits: Hits,
}

impl StagedHttp {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let routes: Routes = Arc::new(Mutex::new(HashMap::new()));
        let hits: Hits = Arc::new(Mutex::new(vec![]));

        let (server_routes, server_hits) = (routes.clone(), hits.clone());
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, server_routes.clone(), server_hits.clone()));
            }
        });

        Self {
            base_url,
            routes,
            hits,
        }
    }

    pub fn stage(&self, path: &str, responses: &[(u16, &str)]) {
        self.routes.lock().unwrap().insert(
            path.to_string(),
            responses
                .iter()
                .map(|(status, body)| (*status, body.to_string()))
                .collect(),
        );
    }

    /// Request targets, query included, with their bodies in arrival order
    pub fn hits(&self) -> Vec<(String, String)> {
        self.hits.lock().unwrap().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.hits()
            .into_iter()
            .map(|(target, _)| {
                target
                    .split('?')
                    .next()
                    .unwrap_or_default()
                    .to_string()
            })
            .collect()
    }
}

async fn serve(mut stream: TcpStream, routes: Routes, hits: Hits) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }

    let target = head.split_whitespace().nth(1).unwrap_or("/").to_string();
    let path = target.split('?').next().unwrap_or_default().to_string();
    let body = String::from_utf8_lossy(&buf[header_end..header_end + content_length])
        .to_string();
    hits.lock().unwrap().push((target, body));

    let (status, payload) = {
        let mut routes = routes.lock().unwrap();
        match routes.get_mut(&path) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap_or((404, String::new())),
            None => (404, String::new()),
        }
    };
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        503 => "Service Unavailable",
        _ => "Status",
    };
    let response = format!(
        "HTTP/1.1 {} {}\r\ncontent-type: application/json\r\n\
         content-length: {}\r\nconnection: close\r\n\r\n{}",
        status,
        reason,
        payload.len(),
        payload
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}
