//! The contract every ledger backend implements.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::diagnostics::DiagnosticReport;
use crate::error::LedgerResult;
use crate::hash::ContentHash;
use crate::summary::{clamp_trust_score, ScanSummary, TimeUnit};

/// One record to put on a ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    pub host_id: String,
    pub trust_score: u16,
    pub content_hash: ContentHash,
    /// Unix time in the backend's native unit; `None` means "now".
    pub timestamp: Option<u64>,
    pub report_pointer: Option<String>,
    pub wait_for_confirmation: bool,
}

impl SubmitRequest {
    pub fn new(host_id: impl Into<String>, trust_score: i64, content_hash: ContentHash) -> Self {
        SubmitRequest {
            host_id: host_id.into(),
            trust_score: clamp_trust_score(trust_score),
            content_hash,
            timestamp: None,
            report_pointer: None,
            wait_for_confirmation: true,
        }
    }

    /// Like [`SubmitRequest::new`] but validates a hex hash first, so a bad
    /// hash fails here and never reaches a transport.
    pub fn from_hex(host_id: impl Into<String>, trust_score: i64, content_hash: &str) -> LedgerResult<Self> {
        Ok(Self::new(host_id, trust_score, ContentHash::parse(content_hash)?))
    }

    pub fn at(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_report_pointer(mut self, pointer: impl Into<String>) -> Self {
        self.report_pointer = Some(pointer.into());
        self
    }

    pub fn wait(mut self, wait: bool) -> Self {
        self.wait_for_confirmation = wait;
        self
    }
}

impl From<&ScanSummary> for SubmitRequest {
    fn from(s: &ScanSummary) -> Self {
        SubmitRequest::new(s.host_id(), s.trust_score() as i64, *s.content_hash())
            .at(s.scan_time())
            .with_report_pointer(s.report_pointer())
    }
}

/// What a backend hands back after a submission. Never mutated after return.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionResult {
    pub success: bool,
    pub network: String,
    pub transaction_id: String,
    pub content_hash: ContentHash,
    pub host_id: String,
    pub trust_score: u16,
    pub scan_time: u64,
    pub report_pointer: String,
    pub confirmed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_or_sequence: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_error: Option<String>,
}

/// Connection/account status. `connected == false` carries `error`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub connected: bool,
    pub network: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl StatusReport {
    pub fn connected(network: impl Into<String>, details: Map<String, Value>) -> Self {
        StatusReport { connected: true, network: network.into(), error: None, details }
    }

    pub fn disconnected(network: impl Into<String>, error: impl ToString) -> Self {
        StatusReport { connected: false, network: network.into(), error: Some(error.to_string()), details: Map::new() }
    }
}

/// A publishing backend for one ledger technology.
///
/// A handle owns one authenticated session and is not internally
/// synchronized: callers keep at most one submission in flight per signer.
#[async_trait]
pub trait LedgerBackend: Send + Sync {
    fn network_name(&self) -> &str;

    /// Native time unit of this ledger; drives normalization.
    fn time_unit(&self) -> TimeUnit;

    async fn submit_scan(&self, request: SubmitRequest) -> LedgerResult<SubmissionResult>;

    /// Never fails; problems are reported inside the status.
    async fn get_status(&self) -> StatusReport;

    /// Never fails; each check failure is captured in the report.
    async fn diagnose(&self) -> DiagnosticReport;
}
