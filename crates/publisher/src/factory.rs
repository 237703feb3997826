//! Network profiles and backend construction.
//!
//! This is the only place that maps a network name to a backend.

use serde::Serialize;

use evm_rpc::{EvmBackend, EvmConfig};
use scanledger_core::{LedgerBackend, LedgerError, LedgerResult, TimeUnit};
use sui_cli::{SuiCliBackend, SuiConfig};

use crate::config::PublisherConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    EvmRpc,
    SuiCli,
}

/// Fixed defaults for one supported network.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct NetworkProfile {
    pub name: &'static str,
    pub backend: BackendKind,
    pub time_unit: TimeUnit,
    /// Environment key that overrides `default_rpc_url`.
    pub rpc_env: &'static str,
    pub default_rpc_url: &'static str,
    /// Gas limit (EVM) or gas budget (Sui) when nothing else sets one.
    pub default_gas: u64,
    pub default_gas_price_gwei: Option<f64>,
    pub fee_unit: &'static str,
}

pub const PROFILES: [NetworkProfile; 2] = [
    NetworkProfile {
        name: "zksync",
        backend: BackendKind::EvmRpc,
        time_unit: TimeUnit::Seconds,
        rpc_env: "ZKSYNC_RPC_URL",
        default_rpc_url: "https://sepolia.era.zksync.dev",
        default_gas: evm_rpc::config::DEFAULT_GAS_LIMIT,
        default_gas_price_gwei: Some(evm_rpc::config::DEFAULT_GAS_PRICE_GWEI),
        fee_unit: "ETH",
    },
    NetworkProfile {
        name: "sui",
        backend: BackendKind::SuiCli,
        time_unit: TimeUnit::Milliseconds,
        rpc_env: "SUI_RPC_URL",
        default_rpc_url: "https://fullnode.mainnet.sui.io:443",
        default_gas: sui_cli::config::DEFAULT_GAS_BUDGET,
        default_gas_price_gwei: None,
        fee_unit: "MIST",
    },
];

pub fn supported_networks() -> Vec<&'static str> {
    PROFILES.iter().map(|p| p.name).collect()
}

/// Case-insensitive profile lookup.
pub fn profile(network: &str) -> LedgerResult<&'static NetworkProfile> {
    let wanted = network.trim().to_ascii_lowercase();
    PROFILES.iter().find(|p| p.name == wanted).ok_or_else(|| LedgerError::UnsupportedNetwork {
        name: network.to_string(),
        supported: supported_networks().into_iter().map(String::from).collect(),
    })
}

fn present(v: &Option<String>) -> bool {
    v.as_deref().map_or(false, |s| !s.trim().is_empty())
}

/// Builds and validates the EVM settings. Missing fields are named by
/// their environment keys.
pub fn evm_config(profile: &NetworkProfile, config: &PublisherConfig) -> LedgerResult<EvmConfig> {
    let mut missing = Vec::new();
    if !present(&config.contract_address) {
        missing.push("CONTRACT_ADDRESS");
    }
    if !present(&config.private_key) {
        missing.push("PRIVATE_KEY");
    }
    if !missing.is_empty() {
        return Err(LedgerError::missing(missing));
    }

    let rpc_url = config.rpc_url(profile.name).unwrap_or(profile.default_rpc_url);
    let mut evm = EvmConfig::new(profile.name, rpc_url);
    evm.contract_address = config.contract_address.clone();
    evm.private_key = config.private_key.clone();
    evm.gas_limit = config.gas_limit.map_or(profile.default_gas, |g| g.value);
    evm.gas_price_gwei = config
        .gas_price_gwei
        .or(profile.default_gas_price_gwei)
        .unwrap_or(evm_rpc::config::DEFAULT_GAS_PRICE_GWEI);
    if let Some(timeout) = config.receipt_timeout {
        evm.receipt_timeout = timeout;
    }
    evm.validate()?;
    Ok(evm)
}

/// Builds the Sui settings; identifiers are only required when
/// `validate` is set.
pub fn sui_config(profile: &NetworkProfile, config: &PublisherConfig, validate: bool) -> LedgerResult<SuiConfig> {
    let rpc_url = config.rpc_url(profile.name).unwrap_or(profile.default_rpc_url);
    let mut sui = SuiConfig::new(profile.name, rpc_url);
    if let Some(binary) = &config.sui_binary {
        sui.binary = binary.clone();
    }
    sui.package_id = config.package_id.clone();
    sui.registry_id = config.registry_id.clone();
    sui.admin_cap_id = config.admin_cap_id.clone();
    match config.gas_budget {
        Some(gas) => {
            sui.gas_budget = gas.value;
            sui.gas_budget_source = gas.source;
        }
        None => sui.gas_budget = profile.default_gas,
    }
    if validate {
        sui.validate()?;
    }
    Ok(sui)
}

/// Creates the backend for `network`. Unknown names fail before any I/O,
/// and so does missing configuration.
pub async fn create(
    network: &str,
    config: &PublisherConfig,
    skip_auth_check: bool,
) -> LedgerResult<Box<dyn LedgerBackend>> {
    let profile = profile(network)?;
    tracing::debug!(network = profile.name, backend = ?profile.backend, skip_auth_check, "creating backend");
    match profile.backend {
        BackendKind::EvmRpc => {
            let evm = evm_config(profile, config)?;
            Ok(Box::new(EvmBackend::connect(evm, skip_auth_check).await?))
        }
        BackendKind::SuiCli => {
            let sui = sui_config(profile, config, !skip_auth_check)?;
            Ok(Box::new(SuiCliBackend::connect(sui, skip_auth_check).await?))
        }
    }
}
