use std::time::Duration;

use scanledger_core::{LedgerError, LedgerResult};

pub const DEFAULT_GAS_BUDGET: u64 = 1_000_000;

#[derive(Debug, Clone)]
pub struct SuiConfig {
    pub network: String,
    /// Program name or path of the `sui` CLI.
    pub binary: String,
    pub rpc_url: String,
    pub package_id: Option<String>,
    pub registry_id: Option<String>,
    pub admin_cap_id: Option<String>,
    pub gas_budget: u64,
    /// Where `gas_budget` came from, for logs.
    pub gas_budget_source: &'static str,
    pub submit_timeout: Duration,
    pub probe_timeout: Duration,
}

/// The three on-chain objects a publish call needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identifiers<'a> {
    pub package_id: &'a str,
    pub registry_id: &'a str,
    pub admin_cap_id: &'a str,
}

impl SuiConfig {
    pub fn new(network: impl Into<String>, rpc_url: impl Into<String>) -> Self {
        SuiConfig {
            network: network.into(),
            binary: "sui".into(),
            rpc_url: rpc_url.into(),
            package_id: None,
            registry_id: None,
            admin_cap_id: None,
            gas_budget: DEFAULT_GAS_BUDGET,
            gas_budget_source: "default",
            submit_timeout: Duration::from_secs(60),
            probe_timeout: Duration::from_secs(10),
        }
    }

    pub fn identifiers(&self) -> LedgerResult<Identifiers<'_>> {
        match (present(&self.package_id), present(&self.registry_id), present(&self.admin_cap_id)) {
            (Some(package_id), Some(registry_id), Some(admin_cap_id)) => {
                Ok(Identifiers { package_id, registry_id, admin_cap_id })
            }
            (p, r, c) => {
                let missing = [(p, "DEPIN_PACKAGE_ID"), (r, "DEPIN_REGISTRY_ID"), (c, "DEPIN_ADMIN_CAP_ID")]
                    .into_iter()
                    .filter(|(v, _)| v.is_none())
                    .map(|(_, key)| key);
                Err(LedgerError::missing(missing))
            }
        }
    }

    pub fn validate(&self) -> LedgerResult<()> {
        self.identifiers().map(|_| ())
    }
}

fn present(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
