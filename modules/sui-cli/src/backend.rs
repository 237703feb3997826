use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::json;

use scanledger_core::diagnostics::detail;
use scanledger_core::summary::default_report_pointer;
use scanledger_core::{
    run_checks, CheckOutcome, ContentHash, DiagnosticCheck, DiagnosticReport, LedgerBackend, LedgerError,
    LedgerResult, StatusReport, SubmissionKind, SubmissionResult, SubmitRequest, SummaryFields, TimeUnit,
};

use crate::command::{client_args, PublishCall};
use crate::config::SuiConfig;
use crate::output::{interpret, CallOutcome};
use crate::runner::{CommandOutput, CommandRunner, ProcessRunner, RunError};

const PROBE_HOST: &str = "diagnostic_probe";

/// Publishes through the `sui` CLI of the local machine.
pub struct SuiCliBackend {
    config: SuiConfig,
    runner: Arc<dyn CommandRunner>,
}

impl SuiCliBackend {
    pub async fn connect(config: SuiConfig, skip_auth_check: bool) -> LedgerResult<Self> {
        Self::with_runner(config, Arc::new(ProcessRunner), skip_auth_check).await
    }

    /// Unless skipped, requires all identifiers and a working CLI.
    pub async fn with_runner(
        config: SuiConfig,
        runner: Arc<dyn CommandRunner>,
        skip_auth_check: bool,
    ) -> LedgerResult<Self> {
        let backend = SuiCliBackend { config, runner };
        if !skip_auth_check {
            backend.config.validate()?;
            backend.check_cli().await?;
        }
        tracing::info!(network = %backend.config.network, binary = %backend.config.binary, "sui backend ready");
        Ok(backend)
    }

    async fn client(&self, sub: &[&str]) -> Result<CommandOutput, RunError> {
        self.runner.run(&self.config.binary, &client_args(sub), self.config.probe_timeout).await
    }

    async fn check_cli(&self) -> LedgerResult<()> {
        match self.client(&["envs"]).await {
            Ok(out) if out.success() => Ok(()),
            Ok(out) => Err(LedgerError::Connection(format!("sui CLI not properly configured: {}", out.stderr.trim()))),
            Err(e) => Err(LedgerError::Connection(e.to_string())),
        }
    }

    /// Trimmed stdout of a `sui client` query that must succeed.
    async fn query(&self, sub: &[&str]) -> Result<String, String> {
        match self.client(sub).await {
            Ok(out) if out.success() && !out.stdout.trim().is_empty() => Ok(out.stdout.trim().to_string()),
            Ok(out) if out.success() => Err(format!("`sui client {}` printed nothing", sub.join(" "))),
            Ok(out) => Err(format!("`sui client {}` failed: {}", sub.join(" "), out.stderr.trim())),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn call(&self, call: &PublishCall<'_>, dry_run: bool) -> LedgerResult<CallOutcome> {
        let args = call.args(dry_run);
        let out = self
            .runner
            .run(&self.config.binary, &args, self.config.submit_timeout)
            .await
            .map_err(|e| match e {
                RunError::TimedOut { timeout, .. } => {
                    LedgerError::Submission(format!("sui transaction timed out after {}s", timeout.as_secs()))
                }
                other => LedgerError::Submission(other.to_string()),
            })?;
        interpret(out.success(), &out.stdout, &out.stderr, &call.content_hash.to_hex())
    }

    async fn publish(&self, request: SubmitRequest) -> LedgerResult<SubmissionResult> {
        let ids = self.config.identifiers()?;
        let scan_time = request.timestamp.unwrap_or_else(|| TimeUnit::Milliseconds.now());
        let report_pointer = request
            .report_pointer
            .clone()
            .unwrap_or_else(|| default_report_pointer("unknown", TimeUnit::Seconds.now()));
        tracing::debug!(
            gas_budget = self.config.gas_budget,
            source = self.config.gas_budget_source,
            "resolved gas budget"
        );
        let call = PublishCall {
            ids,
            host_id: &request.host_id,
            scan_time,
            content_hash: &request.content_hash,
            trust_score: request.trust_score,
            report_pointer: &report_pointer,
            gas_budget: self.config.gas_budget,
        };
        let outcome = self.call(&call, false).await?;
        let transaction_id = outcome.digest().unwrap_or("unknown").to_string();
        tracing::info!(network = %self.config.network, digest = %transaction_id, host = %request.host_id, "scan summary executed");

        Ok(SubmissionResult {
            success: true,
            network: self.config.network.clone(),
            transaction_id,
            content_hash: request.content_hash,
            host_id: request.host_id.clone(),
            trust_score: request.trust_score,
            scan_time,
            report_pointer,
            // the CLI call returns only after execution
            confirmed: true,
            block_or_sequence: outcome.checkpoint(),
            gas_used: None,
            error: None,
            confirmation_error: None,
        })
    }

    async fn status(&self) -> StatusReport {
        let environment = match self.query(&["active-env"]).await {
            Ok(env) => env,
            Err(e) => return StatusReport::disconnected(&self.config.network, format!("sui CLI not properly configured: {}", e)),
        };
        let address = match self.query(&["active-address"]).await {
            Ok(address) => address,
            Err(e) => return StatusReport::disconnected(&self.config.network, format!("no active sui address: {}", e)),
        };
        let details = detail([
            ("cli_binary", json!(self.config.binary)),
            ("rpc_url", json!(self.config.rpc_url)),
            ("active_environment", json!(environment)),
            ("active_address", json!(address)),
            ("package_id", json!(self.config.package_id)),
            ("registry_id", json!(self.config.registry_id)),
            ("admin_cap_id", json!(self.config.admin_cap_id)),
            ("gas_budget", json!(self.config.gas_budget)),
            ("fee_unit", json!("MIST")),
        ]);
        StatusReport::connected(&self.config.network, details)
    }

    async fn run_diagnostics(&self) -> DiagnosticReport {
        let config = detail([
            ("cli_binary", json!(self.config.binary)),
            ("rpc_url", json!(self.config.rpc_url)),
            ("package_id", json!(self.config.package_id)),
            ("registry_id", json!(self.config.registry_id)),
            ("admin_cap_id", json!(self.config.admin_cap_id)),
            ("gas_budget", json!(self.config.gas_budget)),
        ]);
        let checks = vec![
            DiagnosticCheck::new("cli_available", self.check_available().boxed()),
            DiagnosticCheck::new("configuration", self.check_configuration().boxed()),
            DiagnosticCheck::new("active_environment", self.check_query("active_environment", "active-env").boxed()),
            DiagnosticCheck::new("active_address", self.check_query("active_address", "active-address").boxed()),
            DiagnosticCheck::new("dry_run", self.check_dry_run().boxed()),
        ];
        run_checks(&self.config.network, config, checks).await
    }

    async fn check_available(&self) -> CheckOutcome {
        let version = vec!["--version".to_string()];
        match self.runner.run(&self.config.binary, &version, self.config.probe_timeout).await {
            Ok(out) if out.success() => CheckOutcome::pass(detail([
                ("binary", json!(self.config.binary)),
                ("version", json!(out.stdout.trim())),
            ])),
            Ok(out) => CheckOutcome::fail(format!("{} --version failed: {}", self.config.binary, out.stderr.trim())),
            Err(e) => CheckOutcome::fail(e),
        }
    }

    async fn check_configuration(&self) -> CheckOutcome {
        match self.config.identifiers() {
            Ok(ids) => CheckOutcome::pass(detail([
                ("package_id", json!(ids.package_id)),
                ("registry_id", json!(ids.registry_id)),
                ("admin_cap_id", json!(ids.admin_cap_id)),
            ])),
            Err(e) => CheckOutcome::fail(e),
        }
    }

    async fn check_query(&self, field: &'static str, sub: &'static str) -> CheckOutcome {
        match self.query(&[sub]).await {
            Ok(value) => CheckOutcome::pass(detail([(field, json!(value))])),
            Err(e) => CheckOutcome::fail(e),
        }
    }

    /// Simulates a publish; nothing is committed.
    async fn check_dry_run(&self) -> CheckOutcome {
        let ids = match self.config.identifiers() {
            Ok(ids) => ids,
            Err(e) => return CheckOutcome::fail(format!("cannot build probe call: {}", e)),
        };
        let fields = SummaryFields {
            host_id: PROBE_HOST.into(),
            scan_time: TimeUnit::Milliseconds.now(),
            trust_score: 0,
            report_pointer: PROBE_HOST.into(),
        };
        let hash = ContentHash::derive(&fields, SubmissionKind::Test);
        let call = PublishCall {
            ids,
            host_id: &fields.host_id,
            scan_time: fields.scan_time,
            content_hash: &hash,
            trust_score: fields.trust_score,
            report_pointer: &fields.report_pointer,
            gas_budget: self.config.gas_budget,
        };
        let probe = detail([("probe_hash", json!(hash.to_hex()))]);
        match self.call(&call, true).await {
            Ok(outcome) => {
                let mut d = probe;
                d.insert("digest".into(), json!(outcome.digest()));
                CheckOutcome::pass(d)
            }
            // the network answered, which is all this probes
            Err(e) if e.is_duplicate() => CheckOutcome::pass(probe),
            Err(e) => CheckOutcome::fail_with(probe, e),
        }
    }
}

#[async_trait]
impl LedgerBackend for SuiCliBackend {
    fn network_name(&self) -> &str {
        &self.config.network
    }

    fn time_unit(&self) -> TimeUnit {
        TimeUnit::Milliseconds
    }

    async fn submit_scan(&self, request: SubmitRequest) -> LedgerResult<SubmissionResult> {
        self.publish(request).await
    }

    async fn get_status(&self) -> StatusReport {
        self.status().await
    }

    async fn diagnose(&self) -> DiagnosticReport {
        self.run_diagnostics().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;

    type Script = Box<dyn Fn(&[String]) -> Result<CommandOutput, RunError> + Send + Sync>;

    struct StubRunner {
        script: Script,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl StubRunner {
        fn new(script: impl Fn(&[String]) -> Result<CommandOutput, RunError> + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(StubRunner { script: Box::new(script), calls: Mutex::new(Vec::new()) })
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for StubRunner {
        async fn run(&self, _program: &str, args: &[String], _timeout: Duration) -> Result<CommandOutput, RunError> {
            self.calls.lock().unwrap().push(args.to_vec());
            (self.script)(args)
        }
    }

    fn out(status: i32, stdout: &str) -> Result<CommandOutput, RunError> {
        Ok(CommandOutput { status: Some(status), stdout: stdout.into(), stderr: String::new() })
    }

    /// A configured CLI whose `call` prints `call_stdout`.
    fn cli(call_stdout: &'static str) -> Arc<StubRunner> {
        StubRunner::new(move |args| match args.get(1).map(String::as_str) {
            Some("envs") => out(0, "devnet  https://fullnode.devnet.sui.io:443  *"),
            Some("active-env") => out(0, "devnet\n"),
            Some("active-address") => out(0, "0xabc\n"),
            Some("call") => out(0, call_stdout),
            _ if args.first().map(String::as_str) == Some("--version") => out(0, "sui 1.30.1"),
            _ => out(1, ""),
        })
    }

    fn config() -> SuiConfig {
        let mut c = SuiConfig::new("sui", "https://fullnode.devnet.sui.io:443");
        c.package_id = Some("0xpkg".into());
        c.registry_id = Some("0xreg".into());
        c.admin_cap_id = Some("0xcap".into());
        c
    }

    fn request() -> SubmitRequest {
        SubmitRequest::new("validator_123", 85, ContentHash::from_bytes([2u8; 32]))
            .at(1_700_000_000_000)
            .with_report_pointer("scan_42")
    }

    const SUCCESS: &str = r#"{"digest":"D1gest","effects":{"status":{"status":"success"}}}"#;

    #[tokio::test]
    async fn submits_and_reports_confirmed() {
        let runner = cli(SUCCESS);
        let backend = SuiCliBackend::with_runner(config(), runner.clone(), false).await.ok().unwrap();
        let result = backend.submit_scan(request()).await.unwrap();
        assert!(result.success && result.confirmed);
        assert_eq!(result.transaction_id, "D1gest");
        assert_eq!(result.scan_time, 1_700_000_000_000);

        let calls = runner.calls();
        assert_eq!(calls[0], ["client", "envs"]);
        let call = &calls[1];
        assert_eq!(call[1], "call");
        assert_eq!(call[14], ContentHash::from_bytes([2u8; 32]).byte_array_literal());
        assert_eq!(call[call.len() - 2..], ["--gas-budget", "1000000"]);
    }

    #[tokio::test]
    async fn duplicate_abort_is_recognized() {
        let runner = cli("Error: aborted within function publish_scan_summary with code 4");
        let backend = SuiCliBackend::with_runner(config(), runner, false).await.ok().unwrap();
        let err = backend.submit_scan(request()).await.unwrap_err();
        assert!(err.is_duplicate());
    }

    #[tokio::test]
    async fn structured_duplicate_is_recognized() {
        let runner = cli(r#"{"effects":{"status":{"status":"failure","error":"MoveAbort(MoveLocation { .. }, 4) in command 0"}}}"#);
        let backend = SuiCliBackend::with_runner(config(), runner, false).await.ok().unwrap();
        assert!(matches!(backend.submit_scan(request()).await, Err(LedgerError::DuplicateHash(_))));
    }

    #[tokio::test]
    async fn missing_identifiers_are_all_named() {
        let runner = cli(SUCCESS);
        let err = SuiCliBackend::with_runner(SuiConfig::new("sui", ""), runner.clone(), false).await.err().unwrap();
        match err {
            LedgerError::MissingConfiguration { missing } => {
                assert_eq!(missing, ["DEPIN_PACKAGE_ID", "DEPIN_REGISTRY_ID", "DEPIN_ADMIN_CAP_ID"]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_cli_fails_construction() {
        let runner = StubRunner::new(|_| Err(RunError::NotFound { program: "sui".into() }));
        let err = SuiCliBackend::with_runner(config(), runner, false).await.err().unwrap();
        assert!(matches!(err, LedgerError::Connection(ref m) if m.contains("not found")));
    }

    #[tokio::test]
    async fn timeout_is_a_submission_error() {
        let runner = StubRunner::new(|args| match args.get(1).map(String::as_str) {
            Some("call") => Err(RunError::TimedOut { program: "sui".into(), timeout: Duration::from_secs(60) }),
            _ => out(0, "ok"),
        });
        let backend = SuiCliBackend::with_runner(config(), runner, false).await.ok().unwrap();
        let err = backend.submit_scan(request()).await.unwrap_err();
        assert!(matches!(err, LedgerError::Submission(ref m) if m.contains("timed out")));
    }

    #[tokio::test]
    async fn status_reports_environment_and_address() {
        let backend = SuiCliBackend::with_runner(config(), cli(SUCCESS), false).await.ok().unwrap();
        let status = backend.get_status().await;
        assert!(status.connected);
        assert_eq!(status.details["active_environment"], "devnet");
        assert_eq!(status.details["active_address"], "0xabc");
        assert_eq!(status.details["registry_id"], "0xreg");
    }

    #[tokio::test]
    async fn status_needs_an_active_address() {
        let runner = StubRunner::new(|args| match args.get(1).map(String::as_str) {
            Some("active-env") => out(0, "devnet\n"),
            _ => Ok(CommandOutput { status: Some(1), stdout: String::new(), stderr: "no addresses".into() }),
        });
        let backend = SuiCliBackend::with_runner(config(), runner, true).await.ok().unwrap();
        let status = backend.get_status().await;
        assert!(!status.connected);
        let error = status.error.unwrap();
        assert!(error.starts_with("no active sui address") && error.contains("no addresses"), "{error}");
    }

    #[tokio::test]
    async fn status_without_cli_is_disconnected() {
        let runner = StubRunner::new(|_| Err(RunError::NotFound { program: "sui".into() }));
        let backend = SuiCliBackend::with_runner(config(), runner, true).await.ok().unwrap();
        let status = backend.get_status().await;
        assert!(!status.connected);
        assert!(status.error.unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn diagnostics_isolate_missing_cli() {
        let runner = StubRunner::new(|_| Err(RunError::NotFound { program: "sui".into() }));
        let backend = SuiCliBackend::with_runner(config(), runner, true).await.ok().unwrap();
        let report = backend.diagnose().await;
        assert_eq!(report.overall_status.total_tests, 5);
        assert!(!report.test("cli_available").unwrap().success);
        assert!(report.test("configuration").unwrap().success);
        assert!(!report.test("dry_run").unwrap().success);
        assert!(!report.healthy());
    }

    #[tokio::test]
    async fn dry_run_counts_duplicate_as_reachable() {
        let runner = cli("aborted within function publish_scan_summary with code 4");
        let backend = SuiCliBackend::with_runner(config(), runner.clone(), true).await.ok().unwrap();
        let report = backend.diagnose().await;
        assert!(report.healthy(), "{:?}", report.tests);
        let dry = runner.calls().into_iter().find(|c| c.get(1).map(String::as_str) == Some("call")).unwrap();
        assert_eq!(dry.last().map(String::as_str), Some("--dry-run"));
    }
}
