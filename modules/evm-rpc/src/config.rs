use std::fmt;
use std::time::Duration;

use scanledger_core::{LedgerError, LedgerResult};

pub const DEFAULT_GAS_LIMIT: u64 = 10_000_000;
pub const DEFAULT_GAS_PRICE_GWEI: f64 = 0.25;

#[derive(Clone)]
pub struct EvmConfig {
    pub network: String,
    pub rpc_url: String,
    pub contract_address: Option<String>,
    pub private_key: Option<String>,
    /// Used when gas estimation fails.
    pub gas_limit: u64,
    pub gas_price_gwei: f64,
    pub receipt_timeout: Duration,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl EvmConfig {
    pub fn new(network: impl Into<String>, rpc_url: impl Into<String>) -> Self {
        EvmConfig {
            network: network.into(),
            rpc_url: rpc_url.into(),
            contract_address: None,
            private_key: None,
            gas_limit: DEFAULT_GAS_LIMIT,
            gas_price_gwei: DEFAULT_GAS_PRICE_GWEI,
            receipt_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(2),
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Names every missing setting at once.
    pub fn validate(&self) -> LedgerResult<()> {
        let mut missing = Vec::new();
        if self.rpc_url.trim().is_empty() {
            missing.push("RPC_URL");
        }
        if self.contract_address.as_deref().map_or(true, |s| s.trim().is_empty()) {
            missing.push("CONTRACT_ADDRESS");
        }
        if self.private_key.as_deref().map_or(true, |s| s.trim().is_empty()) {
            missing.push("PRIVATE_KEY");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(LedgerError::missing(missing))
        }
    }

    pub fn gas_price_wei(&self) -> u128 {
        (self.gas_price_gwei.max(0.0) * 1e9).round() as u128
    }
}

impl fmt::Debug for EvmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvmConfig")
            .field("network", &self.network)
            .field("rpc_url", &self.rpc_url)
            .field("contract_address", &self.contract_address)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("gas_limit", &self.gas_limit)
            .field("gas_price_gwei", &self.gas_price_gwei)
            .finish()
    }
}
