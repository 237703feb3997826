use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use scanledger_core::{LedgerError, LedgerResult};
use scanledger_reports::{ReportSettings, DEFAULT_WALRUS_URL};

use crate::factory::PROFILES;

pub const DEFAULT_CONFIG_FILE: &str = "scanledger.yaml";
pub const DEFAULT_NETWORK: &str = "zksync";

#[derive(Debug, Default, Deserialize, Clone)]
pub struct EvmFileConfig {
    pub contract_address: Option<String>,
    pub gas_limit: Option<u64>,
    pub gas_price_gwei: Option<f64>,
    pub receipt_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct SuiFileConfig {
    pub binary: Option<String>,
    pub package_id: Option<String>,
    pub registry_id: Option<String>,
    pub admin_cap_id: Option<String>,
    pub gas_budget: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct ReportsFileConfig {
    pub dir: Option<PathBuf>,
    pub walrus_api_url: Option<String>,
}

/// On-disk configuration. Secrets (signing key, Walrus key) are read from
/// the environment only.
#[derive(Debug, Default, Deserialize, Clone)]
pub struct FileConfig {
    pub network: Option<String>,
    /// RPC endpoint per network name.
    pub rpc_urls: Option<BTreeMap<String, String>>,
    pub evm: Option<EvmFileConfig>,
    pub sui: Option<SuiFileConfig>,
    pub reports: Option<ReportsFileConfig>,
}

/// Without an explicit path, `./scanledger.yaml` is used when it exists.
pub fn load_config(path: Option<&Path>) -> LedgerResult<Option<FileConfig>> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = Path::new(DEFAULT_CONFIG_FILE);
            if p.exists() { p.to_path_buf() } else { return Ok(None); }
        }
    };
    let s = fs::read_to_string(&path)
        .map_err(|e| LedgerError::Validation(format!("cannot read config {}: {}", path.display(), e)))?;
    let config = serde_yaml::from_str(&s)
        .map_err(|e| LedgerError::Validation(format!("invalid config {}: {}", path.display(), e)))?;
    tracing::debug!(path = %path.display(), "config file loaded");
    Ok(Some(config))
}

/// A gas figure and the layer that set it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasSetting {
    pub value: u64,
    pub source: &'static str,
}

impl GasSetting {
    fn new(value: u64, source: &'static str) -> Self {
        GasSetting { value, source }
    }
}

/// Everything the factory needs to build a backend. Unset fields fall back
/// to the selected network's profile.
#[derive(Clone, Default)]
pub struct PublisherConfig {
    pub network: Option<String>,
    pub rpc_urls: BTreeMap<String, String>,
    pub contract_address: Option<String>,
    pub private_key: Option<String>,
    pub gas_limit: Option<GasSetting>,
    pub gas_budget: Option<GasSetting>,
    pub gas_price_gwei: Option<f64>,
    pub receipt_timeout: Option<Duration>,
    pub sui_binary: Option<String>,
    pub package_id: Option<String>,
    pub registry_id: Option<String>,
    pub admin_cap_id: Option<String>,
    pub reports_dir: Option<PathBuf>,
    pub walrus_api_url: Option<String>,
    pub walrus_api_key: Option<String>,
}

impl PublisherConfig {
    pub fn from_file(file: &FileConfig) -> Self {
        let mut config = PublisherConfig {
            network: file.network.clone(),
            rpc_urls: file.rpc_urls.clone().unwrap_or_default(),
            ..PublisherConfig::default()
        };
        if let Some(evm) = &file.evm {
            config.contract_address = evm.contract_address.clone();
            config.gas_limit = evm.gas_limit.map(|v| GasSetting::new(v, "config file"));
            config.gas_price_gwei = evm.gas_price_gwei;
            config.receipt_timeout = evm.receipt_timeout_secs.map(Duration::from_secs);
        }
        if let Some(sui) = &file.sui {
            config.sui_binary = sui.binary.clone();
            config.package_id = sui.package_id.clone();
            config.registry_id = sui.registry_id.clone();
            config.admin_cap_id = sui.admin_cap_id.clone();
            config.gas_budget = sui.gas_budget.map(|v| GasSetting::new(v, "config file"));
        }
        if let Some(reports) = &file.reports {
            config.reports_dir = reports.dir.clone();
            config.walrus_api_url = reports.walrus_api_url.clone();
        }
        config
    }

    /// Overlays environment values. Blank values count as unset.
    pub fn apply_env<F>(&mut self, env: F) -> LedgerResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        overlay(&mut self.network, get("LEDGER_NETWORK"));
        for profile in PROFILES.iter() {
            if let Some(url) = get(profile.rpc_env) {
                self.rpc_urls.insert(profile.name.to_string(), url);
            }
        }
        overlay(&mut self.contract_address, get("CONTRACT_ADDRESS"));
        overlay(&mut self.private_key, get("PRIVATE_KEY"));

        if let Some(v) = parse_env::<u64>("GAS_LIMIT", get("GAS_LIMIT"))? {
            self.gas_limit = Some(GasSetting::new(v, "GAS_LIMIT"));
            self.gas_budget = Some(GasSetting::new(v, "GAS_LIMIT"));
        }
        if let Some(v) = parse_env::<u64>("GAS_BUDGET", get("GAS_BUDGET"))? {
            self.gas_budget = Some(GasSetting::new(v, "GAS_BUDGET"));
        }
        overlay(&mut self.gas_price_gwei, parse_env("GAS_PRICE_GWEI", get("GAS_PRICE_GWEI"))?);
        overlay(
            &mut self.receipt_timeout,
            parse_env("RECEIPT_TIMEOUT_SECS", get("RECEIPT_TIMEOUT_SECS"))?.map(Duration::from_secs),
        );

        overlay(&mut self.package_id, get("DEPIN_PACKAGE_ID"));
        overlay(&mut self.registry_id, get("DEPIN_REGISTRY_ID"));
        overlay(&mut self.admin_cap_id, get("DEPIN_ADMIN_CAP_ID"));
        overlay(&mut self.sui_binary, get("SUI_BINARY"));

        overlay(&mut self.walrus_api_url, get("WALRUS_API_URL"));
        overlay(&mut self.walrus_api_key, get("WALRUS_API_KEY"));
        overlay(&mut self.reports_dir, get("REPORTS_DIR").or_else(|| get("REPORTS_OUTPUT_DIR")).map(PathBuf::from));
        Ok(())
    }

    /// File (if any) overlaid with the process environment.
    pub fn load(file: Option<&FileConfig>) -> LedgerResult<Self> {
        let mut config = file.map(Self::from_file).unwrap_or_default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Selected network name, lowercased.
    pub fn network(&self) -> String {
        self.network.as_deref().unwrap_or(DEFAULT_NETWORK).trim().to_ascii_lowercase()
    }

    pub fn rpc_url(&self, network: &str) -> Option<&str> {
        self.rpc_urls.get(network).map(String::as_str)
    }

    pub fn report_settings(&self) -> ReportSettings {
        let defaults = ReportSettings::default();
        ReportSettings {
            reports_dir: self.reports_dir.clone().unwrap_or(defaults.reports_dir),
            walrus_api_url: self.walrus_api_url.clone().unwrap_or_else(|| DEFAULT_WALRUS_URL.to_string()),
            walrus_api_key: self.walrus_api_key.clone(),
            timeout: defaults.timeout,
        }
    }
}

impl fmt::Debug for PublisherConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublisherConfig")
            .field("network", &self.network)
            .field("rpc_urls", &self.rpc_urls)
            .field("contract_address", &self.contract_address)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("gas_limit", &self.gas_limit)
            .field("gas_budget", &self.gas_budget)
            .field("gas_price_gwei", &self.gas_price_gwei)
            .field("package_id", &self.package_id)
            .field("registry_id", &self.registry_id)
            .field("admin_cap_id", &self.admin_cap_id)
            .field("reports_dir", &self.reports_dir)
            .field("walrus_api_key", &self.walrus_api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn overlay<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

fn parse_env<T: FromStr>(key: &str, raw: Option<String>) -> LedgerResult<Option<T>> {
    match raw {
        None => Ok(None),
        Some(s) => s
            .parse()
            .map(Some)
            .map_err(|_| LedgerError::Validation(format!("{} has an invalid value: {}", key, s))),
    }
}
