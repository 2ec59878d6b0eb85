//! Chain registry and service configuration
//!
//! Supports N chains of mixed families via indexed environment variables:
//!
//! ```bash
//! BRIDGE_CHAINS_COUNT=3
//! BRIDGE_HUB_CHAIN_ID=56
//! BRIDGE_CHAIN_1_CHAIN_ID=1
//! BRIDGE_CHAIN_1_NAME=ethereum
//! BRIDGE_CHAIN_1_FAMILY=evm
//! BRIDGE_CHAIN_1_RPC_URL=https://eth.example,https://eth-spare.example
//! BRIDGE_CHAIN_1_PORTAL_ADDRESS=0x...
//! BRIDGE_CHAIN_1_SYNTHESIS_ADDRESS=0x...
//! ...
//! ```
//!
//! The first URL in `_RPC_URL` is the primary endpoint; the rest are spares
//! raced against it when fetching logs.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

use alloy::primitives::{Address, B256, U256};
use eyre::{eyre, Result};

use crate::address_codec::{encode_evm_address, normalize_address};
use crate::error::BridgeError;
use crate::hash::{derive_external_id, derive_internal_id};
use crate::polling::PollConfig;
use crate::types::ChainFamily;

const DEFAULT_FILTER_BLOCK_OFFSET: u64 = 5_000;

const DEFAULT_THORNODE_URL: &str = "https://thornode.ninerealms.com";
const DEFAULT_CHAINFLIP_API_URL: &str = "https://chainflip-swap.chainflip.io";
const DEFAULT_TONCENTER_URL: &str = "https://toncenter.com";

/// Validate an RPC URL: must parse, use http/https, and have a host
pub fn validate_rpc_url(url_str: &str, name: &str) -> Result<()> {
    let parsed =
        url::Url::parse(url_str).map_err(|e| eyre!("{} must be a valid URL: {}", name, e))?;

    let scheme = parsed.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(eyre!(
            "{} must use http:// or https:// scheme, got {}",
            name,
            scheme
        ));
    }

    if parsed.host_str().is_none() {
        return Err(eyre!("{} must have a host component", name));
    }

    if scheme == "http" {
        tracing::warn!(
            "{} uses unencrypted http://, use https:// in production",
            name
        );
    }

    Ok(())
}

/// Parse a comma-separated RPC URL string into individual trimmed URLs.
pub fn parse_rpc_urls(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// ============================================================================
// Chain Configuration
// ============================================================================

/// On-chain contract role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContractRole {
    /// Relays oracle requests between chains
    Bridge,
    /// Locks and unlocks origin assets
    Portal,
    /// Mints and burns synthetic representations
    Synthesis,
    /// Hub-chain router that relays multi-hop transfers
    MetaRouter,
}

impl ContractRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractRole::Bridge => "bridge",
            ContractRole::Portal => "portal",
            ContractRole::Synthesis => "synthesis",
            ContractRole::MetaRouter => "meta-router",
        }
    }
}

impl fmt::Display for ContractRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration for a single chain
///
/// Contract addresses are kept in the chain's native encoding; use
/// [`ChainConfig::contract_address`] for the normalized form.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub chain_id: u64,
    /// Human-readable name (e.g., "ethereum", "tron")
    pub name: String,
    pub family: ChainFamily,
    /// Primary RPC endpoint
    pub rpc_url: String,
    /// Spare endpoints raced against the primary for log queries
    pub spare_rpc_urls: Vec<String>,
    /// Block span of one log-scan window
    pub filter_block_offset: u64,
    pub bridge_address: Option<String>,
    pub portal_address: Option<String>,
    pub synthesis_address: Option<String>,
    pub meta_router_address: Option<String>,
    /// Bitcoin forwarder REST base URL
    pub forwarder_url: Option<String>,
    /// TON portal account
    pub ton_portal: Option<String>,
    pub enabled: bool,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: 0,
            name: "unknown".to_string(),
            family: ChainFamily::Evm,
            rpc_url: String::new(),
            spare_rpc_urls: Vec::new(),
            filter_block_offset: DEFAULT_FILTER_BLOCK_OFFSET,
            bridge_address: None,
            portal_address: None,
            synthesis_address: None,
            meta_router_address: None,
            forwarder_url: None,
            ton_portal: None,
            enabled: true,
        }
    }
}

impl ChainConfig {
    /// Native-encoded contract address for `role`
    pub fn contract(&self, role: ContractRole) -> crate::error::Result<&str> {
        let value = match role {
            ContractRole::Bridge => &self.bridge_address,
            ContractRole::Portal => &self.portal_address,
            ContractRole::Synthesis => &self.synthesis_address,
            ContractRole::MetaRouter => &self.meta_router_address,
        };
        value
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(BridgeError::MissingContract {
                chain_id: self.chain_id,
                role: role.as_str(),
            })
    }

    /// Contract address for `role`, normalized to its 20-byte EVM form
    pub fn contract_address(&self, role: ContractRole) -> crate::error::Result<Address> {
        normalize_address(self.family, self.contract(role)?)
    }

    pub fn portal(&self) -> crate::error::Result<Address> {
        self.contract_address(ContractRole::Portal)
    }

    pub fn synthesis(&self) -> crate::error::Result<Address> {
        self.contract_address(ContractRole::Synthesis)
    }

    pub fn bridge(&self) -> crate::error::Result<Address> {
        self.contract_address(ContractRole::Bridge)
    }

    pub fn meta_router(&self) -> crate::error::Result<Address> {
        self.contract_address(ContractRole::MetaRouter)
    }

    /// External id of `internal_id` arriving at this chain's `role` contract
    pub fn external_id(
        &self,
        role: ContractRole,
        internal_id: &B256,
        revertable_address: &Address,
    ) -> crate::error::Result<B256> {
        derive_external_id(
            self.family,
            internal_id,
            self.contract(role)?,
            &encode_evm_address(revertable_address),
            self.chain_id,
        )
    }

    /// Internal id this chain's `role` contract assigns to request `counter`
    pub fn internal_id(&self, role: ContractRole, counter: U256) -> crate::error::Result<B256> {
        derive_internal_id(self.family, self.contract(role)?, counter, self.chain_id)
    }

    /// All RPC URLs, primary first
    pub fn rpc_urls(&self) -> Vec<String> {
        std::iter::once(self.rpc_url.clone())
            .chain(self.spare_rpc_urls.iter().cloned())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Validate the chain configuration
    pub fn validate(&self) -> Result<()> {
        if self.chain_id == 0 {
            return Err(eyre!("Chain ID is 0 for chain {}", self.name));
        }

        if self.family.has_evm_rpc() {
            if self.rpc_url.is_empty() {
                return Err(eyre!("RPC URL is empty for chain {}", self.name));
            }
            for (i, url) in self.rpc_urls().iter().enumerate() {
                validate_rpc_url(url, &format!("{} RPC URL #{}", self.name, i + 1))?;
            }
            if self.filter_block_offset == 0 {
                return Err(eyre!("Filter block offset is 0 for chain {}", self.name));
            }
        }

        for role in [
            ContractRole::Bridge,
            ContractRole::Portal,
            ContractRole::Synthesis,
            ContractRole::MetaRouter,
        ] {
            if let Ok(raw) = self.contract(role) {
                normalize_address(self.family, raw).map_err(|e| {
                    eyre!("Invalid {} address for chain {}: {}", role, self.name, e)
                })?;
            }
        }

        if let Some(forwarder) = &self.forwarder_url {
            validate_rpc_url(forwarder, &format!("{} forwarder URL", self.name))?;
        }

        Ok(())
    }
}

// ============================================================================
// Chain Registry
// ============================================================================

/// Lookup of every configured chain by id, plus the hub chain id
#[derive(Debug, Clone)]
pub struct ChainRegistry {
    chains: Vec<ChainConfig>,
    /// Index by chain ID → position in `chains`
    chain_id_map: HashMap<u64, usize>,
    hub_chain_id: u64,
}

impl ChainRegistry {
    /// Create a registry from a list of chains
    pub fn new(chains: Vec<ChainConfig>, hub_chain_id: u64) -> Result<Self> {
        let chain_id_map = chains
            .iter()
            .enumerate()
            .map(|(idx, chain)| (chain.chain_id, idx))
            .collect();

        let registry = Self {
            chains,
            chain_id_map,
            hub_chain_id,
        };

        registry.validate()?;
        Ok(registry)
    }

    /// Get chain config by chain ID (enabled or not)
    pub fn chain_config(&self, chain_id: u64) -> Option<&ChainConfig> {
        self.chain_id_map
            .get(&chain_id)
            .map(|&idx| &self.chains[idx])
    }

    /// Like [`Self::chain_config`], but a miss is an [`BridgeError::UnknownChain`]
    pub fn require(&self, chain_id: u64) -> crate::error::Result<&ChainConfig> {
        self.chain_config(chain_id)
            .ok_or(BridgeError::UnknownChain(chain_id))
    }

    /// Get chain config by name
    pub fn chain_by_name(&self, name: &str) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.name == name)
    }

    pub fn hub_chain_id(&self) -> u64 {
        self.hub_chain_id
    }

    pub fn hub(&self) -> crate::error::Result<&ChainConfig> {
        self.require(self.hub_chain_id)
    }

    pub fn is_hub(&self, chain_id: u64) -> bool {
        chain_id == self.hub_chain_id
    }

    /// Get all enabled chains
    pub fn enabled_chains(&self) -> impl Iterator<Item = &ChainConfig> {
        self.chains.iter().filter(|c| c.enabled)
    }

    /// Enabled chains that expose an EVM log API
    pub fn rpc_chains(&self) -> impl Iterator<Item = &ChainConfig> {
        self.enabled_chains().filter(|c| c.family.has_evm_rpc())
    }

    /// Get all chain IDs
    pub fn chain_ids(&self) -> Vec<u64> {
        self.chains.iter().map(|c| c.chain_id).collect()
    }

    fn validate(&self) -> Result<()> {
        if self.chains.is_empty() {
            return Err(eyre!("At least one chain must be configured"));
        }

        let mut seen = HashSet::new();
        for chain in &self.chains {
            if !seen.insert(chain.chain_id) {
                return Err(eyre!(
                    "Duplicate chain ID: {} (chain: {})",
                    chain.chain_id,
                    chain.name
                ));
            }
            chain.validate()?;
        }

        if !self.chain_id_map.contains_key(&self.hub_chain_id) {
            return Err(eyre!(
                "Hub chain {} is not among the configured chains",
                self.hub_chain_id
            ));
        }

        Ok(())
    }
}

// ============================================================================
// External Services
// ============================================================================

/// Base URLs of the off-chain services the adapters talk to
#[derive(Debug, Clone)]
pub struct ServiceEndpoints {
    pub thornode_url: String,
    pub chainflip_api_url: String,
    pub toncenter_url: String,
    /// Advisory pricing service; reverts cannot be priced without it
    pub advisor_url: Option<String>,
}

impl Default for ServiceEndpoints {
    fn default() -> Self {
        Self {
            thornode_url: DEFAULT_THORNODE_URL.to_string(),
            chainflip_api_url: DEFAULT_CHAINFLIP_API_URL.to_string(),
            toncenter_url: DEFAULT_TONCENTER_URL.to_string(),
            advisor_url: None,
        }
    }
}

impl ServiceEndpoints {
    /// Read `THORNODE_URL`, `CHAINFLIP_API_URL`, `TONCENTER_URL` and
    /// `ADVISOR_URL`, falling back to public defaults
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let endpoints = Self {
            thornode_url: std::env::var("THORNODE_URL").unwrap_or(defaults.thornode_url),
            chainflip_api_url: std::env::var("CHAINFLIP_API_URL")
                .unwrap_or(defaults.chainflip_api_url),
            toncenter_url: std::env::var("TONCENTER_URL").unwrap_or(defaults.toncenter_url),
            advisor_url: std::env::var("ADVISOR_URL").ok(),
        };

        validate_rpc_url(&endpoints.thornode_url, "THORNODE_URL")?;
        validate_rpc_url(&endpoints.chainflip_api_url, "CHAINFLIP_API_URL")?;
        validate_rpc_url(&endpoints.toncenter_url, "TONCENTER_URL")?;
        if let Some(advisor) = &endpoints.advisor_url {
            validate_rpc_url(advisor, "ADVISOR_URL")?;
        }

        Ok(endpoints)
    }
}

// ============================================================================
// Timeouts
// ============================================================================

/// Per-adapter wait budgets; chain families finalize at very different speeds
#[derive(Debug, Clone, Copy)]
pub struct TimeoutConfig {
    /// Poll interval shared by every adapter
    pub interval: Duration,
    pub evm_log: Duration,
    pub btc_deposit: Duration,
    pub btc_confirmations: Duration,
    pub ton_scan: Duration,
    /// ThorChain and Chainflip settlement
    pub settlement: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            evm_log: Duration::from_secs(10 * 60),
            btc_deposit: Duration::from_secs(2 * 60 * 60),
            btc_confirmations: Duration::from_secs(2 * 60 * 60),
            ton_scan: Duration::from_secs(20 * 60),
            settlement: Duration::from_secs(60 * 60),
        }
    }
}

impl TimeoutConfig {
    pub fn evm_log_poll(&self) -> PollConfig {
        PollConfig::new(self.interval, self.evm_log)
    }

    pub fn btc_deposit_poll(&self) -> PollConfig {
        PollConfig::new(self.interval, self.btc_deposit)
    }

    pub fn btc_confirmations_poll(&self) -> PollConfig {
        PollConfig::new(self.interval, self.btc_confirmations)
    }

    pub fn ton_scan_poll(&self) -> PollConfig {
        PollConfig::new(self.interval, self.ton_scan)
    }

    pub fn settlement_poll(&self) -> PollConfig {
        PollConfig::new(self.interval, self.settlement)
    }
}

// ============================================================================
// Environment Variable Loading
// ============================================================================

/// Load the chain registry from environment variables.
///
/// Returns `None` if `BRIDGE_CHAINS_COUNT` is not set or is 0.
///
/// Required env vars per chain:
/// - `BRIDGE_CHAIN_{N}_CHAIN_ID`: chain ID
/// - `BRIDGE_CHAIN_{N}_RPC_URL`: comma-separated endpoints, primary first
///   (required for evm, tron and cosmos families)
///
/// Optional:
/// - `BRIDGE_CHAIN_{N}_NAME`: human-readable name (default: "chain_{N}")
/// - `BRIDGE_CHAIN_{N}_FAMILY`: evm, tron, cosmos, ton, bitcoin (default: evm)
/// - `BRIDGE_CHAIN_{N}_FILTER_BLOCK_OFFSET`: log window size (default: 5000)
/// - `BRIDGE_CHAIN_{N}_BRIDGE_ADDRESS`, `_PORTAL_ADDRESS`,
///   `_SYNTHESIS_ADDRESS`, `_META_ROUTER_ADDRESS`: contract addresses
/// - `BRIDGE_CHAIN_{N}_FORWARDER_URL`: Bitcoin forwarder
/// - `BRIDGE_CHAIN_{N}_TON_PORTAL`: TON portal account
/// - `BRIDGE_CHAIN_{N}_ENABLED`: whether active (default: true)
///
/// Shared:
/// - `BRIDGE_HUB_CHAIN_ID`: chain hosting the meta-router
pub fn load_from_env() -> Result<Option<ChainRegistry>> {
    let count: usize = match std::env::var("BRIDGE_CHAINS_COUNT").ok() {
        Some(s) => s
            .parse()
            .map_err(|_| eyre!("Invalid BRIDGE_CHAINS_COUNT, must be a usize"))?,
        None => return Ok(None),
    };

    if count == 0 {
        return Ok(None);
    }

    let mut chains = Vec::with_capacity(count);

    for i in 1..=count {
        let prefix = format!("BRIDGE_CHAIN_{}", i);
        let var = |field: &str| {
            std::env::var(format!("{}_{}", prefix, field))
                .ok()
                .filter(|s| !s.trim().is_empty())
        };

        let chain_id: u64 = var("CHAIN_ID")
            .ok_or_else(|| eyre!("Missing {}_CHAIN_ID", prefix))?
            .parse()
            .map_err(|_| eyre!("Invalid {}_CHAIN_ID, must be a u64", prefix))?;

        let name = var("NAME").unwrap_or_else(|| format!("chain_{}", i));

        let family: ChainFamily = match var("FAMILY") {
            Some(s) => s
                .parse()
                .map_err(|e| eyre!("Invalid {}_FAMILY: {}", prefix, e))?,
            None => ChainFamily::Evm,
        };

        let mut urls = var("RPC_URL")
            .map(|raw| parse_rpc_urls(&raw))
            .unwrap_or_default();
        if family.has_evm_rpc() && urls.is_empty() {
            return Err(eyre!("Missing {}_RPC_URL", prefix));
        }
        let rpc_url = if urls.is_empty() {
            String::new()
        } else {
            urls.remove(0)
        };

        let filter_block_offset: u64 = match var("FILTER_BLOCK_OFFSET") {
            Some(s) => s
                .parse()
                .map_err(|_| eyre!("Invalid {}_FILTER_BLOCK_OFFSET, must be a u64", prefix))?,
            None => DEFAULT_FILTER_BLOCK_OFFSET,
        };

        let enabled: bool = var("ENABLED")
            .and_then(|s| s.parse().ok())
            .unwrap_or(true);

        chains.push(ChainConfig {
            chain_id,
            name,
            family,
            rpc_url,
            spare_rpc_urls: urls,
            filter_block_offset,
            bridge_address: var("BRIDGE_ADDRESS"),
            portal_address: var("PORTAL_ADDRESS"),
            synthesis_address: var("SYNTHESIS_ADDRESS"),
            meta_router_address: var("META_ROUTER_ADDRESS"),
            forwarder_url: var("FORWARDER_URL"),
            ton_portal: var("TON_PORTAL"),
            enabled,
        });
    }

    let hub_chain_id: u64 = std::env::var("BRIDGE_HUB_CHAIN_ID")
        .map_err(|_| eyre!("Missing BRIDGE_HUB_CHAIN_ID"))?
        .parse()
        .map_err(|_| eyre!("Invalid BRIDGE_HUB_CHAIN_ID, must be a u64"))?;

    Ok(Some(ChainRegistry::new(chains, hub_chain_id)?))
}

// ============================================================================
// Tests
// ============================================================================
