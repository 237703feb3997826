use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use scanledger_core::{LedgerError, LedgerResult, SubmissionKind};
use scanledger_publisher::{self as publisher, PublisherConfig};
use scanledger_reports::ReportPublisher;

mod output;

const DEFAULT_LOG_FILTER: &str = "scanledger=info,evm_rpc=info,sui_cli=info";

#[derive(Debug, Parser)]
#[command(name = "scanledger", version, about = "Publish scan summaries to a ledger and archive full reports")]
struct Cli {
    /// Ledger network (zksync, sui). Overrides LEDGER_NETWORK.
    #[arg(long, global = true)]
    network: Option<String>,
    /// Optional config file (YAML). If omitted, loads ./scanledger.yaml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Environment file to load instead of ./.env
    #[arg(long, global = true, value_name = "FILE")]
    env_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version information
    Version,
    /// List supported networks and their defaults
    Networks,
    /// Publish a scan summary to the ledger
    Ledger {
        /// Scan record as JSON, or @FILE to read it from a file
        #[arg(long)]
        scan_data: String,
        /// Return after broadcast instead of waiting for a receipt
        #[arg(long)]
        no_wait: bool,
    },
    /// Build a full report and archive it
    Report {
        /// Scan record as JSON, or @FILE to read it from a file
        #[arg(long)]
        scan_data: String,
        /// Comma-separated destinations (walrus, local_file). Default: all.
        #[arg(long, value_delimiter = ',')]
        destinations: Vec<String>,
    },
    /// Show ledger connection and account status
    Status,
    /// Run connectivity and authorization checks
    Diagnose,
    /// Fetch an archived report from Walrus
    Retrieve {
        #[arg(long)]
        blob_id: String,
    },
    /// Print the canonical payload and content hash of a scan (offline)
    Hash {
        /// Scan record as JSON, or @FILE to read it from a file
        #[arg(long)]
        scan_data: String,
        /// Hash as a test submission
        #[arg(long)]
        test: bool,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Version => "version",
            Commands::Networks => "networks",
            Commands::Ledger { .. } => "ledger",
            Commands::Report { .. } => "report",
            Commands::Status => "status",
            Commands::Diagnose => "diagnose",
            Commands::Retrieve { .. } => "retrieve",
            Commands::Hash { .. } => "hash",
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    load_env(cli.env_file.as_deref())?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)))
        .with_writer(std::io::stderr)
        .init();

    let out = run(&cli)?;
    println!("{}", serde_json::to_string_pretty(&out)?);
    if !output::succeeded(&out) {
        std::process::exit(1);
    }
    Ok(())
}

fn load_env(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            dotenvy::from_path(p).with_context(|| format!("cannot load env file {}", p.display()))?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }
    Ok(())
}

/// File, then environment, then flags.
fn load_settings(cli: &Cli) -> LedgerResult<PublisherConfig> {
    let file = publisher::load_config(cli.config.as_deref())?;
    let mut config = PublisherConfig::load(file.as_ref())?;
    if let Some(network) = &cli.network {
        config.network = Some(network.clone());
    }
    Ok(config)
}

/// Inline JSON, or `@path` to read it from a file.
fn parse_scan(raw: &str) -> LedgerResult<Value> {
    let text = match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| LedgerError::Validation(format!("cannot read scan data from {}: {}", path, e)))?,
        None => raw.to_string(),
    };
    serde_json::from_str(&text).map_err(|e| LedgerError::Validation(format!("invalid JSON in scan data: {}", e)))
}

fn run(cli: &Cli) -> Result<Value> {
    let command = cli.command.name();
    match &cli.command {
        Commands::Version => Ok(json!({
            "success": true,
            "command": command,
            "version": env!("CARGO_PKG_VERSION"),
            "core": scanledger_core::version(),
        })),
        Commands::Networks => Ok(output::ok(command, "networks", &publisher::PROFILES)?),
        Commands::Hash { scan_data, test } => with_settings(cli, |_, network| {
            let kind = if *test { SubmissionKind::Test } else { SubmissionKind::Production };
            Ok(match parse_scan(scan_data).and_then(|scan| publisher::preview_hash(network, &scan, kind)) {
                Ok(preview) => output::ok(command, "result", &preview)?,
                Err(e) => output::ledger_error(command, Some(network), &e),
            })
        }),
        Commands::Ledger { scan_data, no_wait } => with_settings(cli, |config, network| {
            let scan = match parse_scan(scan_data) {
                Ok(scan) => scan,
                Err(e) => return Ok(output::ledger_error(command, Some(network), &e)),
            };
            let rt = tokio::runtime::Runtime::new()?;
            Ok(match rt.block_on(publisher::publish_scan(network, config, &scan, !no_wait)) {
                Ok(result) => output::ok(command, "result", &result)?,
                Err(e) => output::ledger_error(command, Some(network), &e),
            })
        }),
        Commands::Report { scan_data, destinations } => with_settings(cli, |config, _| {
            let scan = match parse_scan(scan_data) {
                Ok(scan) => scan,
                Err(e) => return Ok(output::ledger_error(command, None, &e)),
            };
            let reports = ReportPublisher::new(config.report_settings());
            let rt = tokio::runtime::Runtime::new()?;
            let summary = rt.block_on(reports.publish(&scan, destinations));
            let mut out = output::verdict(command, summary.success, "report", &summary)?;
            out["destinations"] = json!(destinations);
            Ok(out)
        }),
        Commands::Status => with_settings(cli, |config, network| {
            let rt = tokio::runtime::Runtime::new()?;
            let status = rt.block_on(publisher::status(network, config));
            Ok(output::verdict(command, status.connected, "status", &status)?)
        }),
        Commands::Diagnose => with_settings(cli, |config, network| {
            let rt = tokio::runtime::Runtime::new()?;
            let report = rt.block_on(publisher::diagnose(network, config));
            Ok(output::verdict(command, report.healthy(), "diagnostics", &report)?)
        }),
        Commands::Retrieve { blob_id } => with_settings(cli, |config, _| {
            let reports = ReportPublisher::new(config.report_settings());
            let rt = tokio::runtime::Runtime::new()?;
            Ok(match rt.block_on(reports.retrieve(blob_id)) {
                Ok(report) => {
                    let mut out = output::ok(command, "report", &report)?;
                    out["blob_id"] = json!(blob_id);
                    out
                }
                Err(e) => output::failure(command, "report", e),
            })
        }),
    }
}

/// Runs `f` with the layered settings, or reports why they could not load.
fn with_settings(cli: &Cli, f: impl FnOnce(&PublisherConfig, &str) -> Result<Value>) -> Result<Value> {
    let command = cli.command.name();
    let config = match load_settings(cli) {
        Ok(c) => c,
        Err(e) => return Ok(output::ledger_error(command, None, &e)),
    };
    let network = config.network();
    tracing::debug!(command, network = %network, "running command");
    f(&config, &network)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("scanledger").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let parsed = cli(&["ledger", "--scan-data", "{}", "--no-wait", "--network", "sui"]);
        assert_eq!(parsed.network.as_deref(), Some("sui"));
        assert!(matches!(parsed.command, Commands::Ledger { no_wait: true, .. }));

        let parsed = cli(&["report", "--scan-data", "{}", "--destinations", "walrus,local_file"]);
        match parsed.command {
            Commands::Report { destinations, .. } => assert_eq!(destinations, ["walrus", "local_file"]),
            other => panic!("parsed as {:?}", other),
        }
    }

    #[test]
    fn scan_data_can_come_from_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.json");
        std::fs::write(&path, r#"{"host_uid": "h1"}"#).unwrap();
        let scan = parse_scan(&format!("@{}", path.display())).unwrap();
        assert_eq!(scan["host_uid"], "h1");

        let err = parse_scan("{not json").unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn hash_runs_offline() {
        let out = run(&cli(&["hash", "--network", "zksync", "--scan-data", r#"{"host_uid":"h1","trust_score":5,"scan_time":1700000000,"report_pointer":"r"}"#])).unwrap();
        assert!(output::succeeded(&out));
        assert_eq!(out["result"]["fields"]["scan_time"], 1_700_000_000u64);
        assert_eq!(out["result"]["content_hash"].as_str().unwrap().len(), 66);
    }

    #[test]
    fn unknown_network_is_reported_as_json() {
        let out = run(&cli(&["hash", "--network", "polkadot", "--scan-data", "{}"])).unwrap();
        assert!(!output::succeeded(&out));
        assert_eq!(out["error_type"], "unsupported_network");
        assert_eq!(out["supported"], json!(["zksync", "sui"]));
    }

    #[test]
    fn bad_config_file_is_reported_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scanledger.yaml");
        std::fs::write(&path, "network: [unclosed").unwrap();
        let path = path.display().to_string();
        for args in [vec!["status", "--config", path.as_str()], vec!["hash", "--config", path.as_str(), "--scan-data", "{}"]] {
            let out = run(&cli(&args)).unwrap();
            assert!(!output::succeeded(&out));
            assert!(out.get("network").is_none());
            assert_eq!(out["error_type"], "validation");
        }
    }

    #[test]
    fn version_needs_no_settings() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.yaml");
        let out = run(&cli(&["version", "--config", missing.to_str().unwrap()])).unwrap();
        assert!(output::succeeded(&out));
        assert_eq!(out["version"], env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn networks_lists_profiles() {
        let out = run(&cli(&["networks"])).unwrap();
        assert_eq!(out["networks"][1]["name"], "sui");
        assert_eq!(out["networks"][1]["time_unit"], "milliseconds");
        assert_eq!(out["networks"][0]["backend"], "evm_rpc");
    }
}
