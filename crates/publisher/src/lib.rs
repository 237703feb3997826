//! Publishing entry points: turn a scan record into a ledger submission on
//! the configured network.

mod config;
pub mod factory;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use scanledger_core::diagnostics::detail;
use scanledger_core::{
    canonical_payload, CheckOutcome, ContentHash, DiagnosticReport, LedgerBackend, LedgerError, LedgerResult,
    Normalizer, StatusReport, SubmissionKind, SubmissionResult, SubmitRequest, SummaryFields, TimeUnit,
};

pub use config::{
    load_config, EvmFileConfig, FileConfig, GasSetting, PublisherConfig, ReportsFileConfig, SuiFileConfig,
    DEFAULT_CONFIG_FILE, DEFAULT_NETWORK,
};
pub use factory::{create, profile, supported_networks, BackendKind, NetworkProfile, PROFILES};

/// Normalizes `scan` for `network` and submits it.
pub async fn publish_scan(
    network: &str,
    config: &PublisherConfig,
    scan: &Value,
    wait: bool,
) -> LedgerResult<SubmissionResult> {
    // Bad input is rejected before a backend is opened.
    Normalizer::new(profile(network)?.time_unit).normalize(scan)?;
    let backend = create(network, config, false).await?;
    publish_with(backend.as_ref(), scan, wait).await
}

/// Submits through an already open backend.
pub async fn publish_with(backend: &dyn LedgerBackend, scan: &Value, wait: bool) -> LedgerResult<SubmissionResult> {
    let summary = Normalizer::new(backend.time_unit()).normalize(scan)?;
    tracing::info!(
        network = backend.network_name(),
        host_id = summary.host_id(),
        content_hash = %summary.content_hash(),
        "submitting scan summary"
    );
    let result = backend.submit_scan(SubmitRequest::from(&summary).wait(wait)).await;
    match &result {
        Ok(r) => tracing::info!(tx = %r.transaction_id, confirmed = r.confirmed, "scan summary submitted"),
        Err(e) if e.is_duplicate() => tracing::warn!(error = %e, "scan summary already on ledger"),
        Err(e) => tracing::error!(error = %e, "scan summary not submitted"),
    }
    result
}

/// Status without requiring publish rights.
pub async fn status(network: &str, config: &PublisherConfig) -> StatusReport {
    match create(network, config, true).await {
        Ok(backend) => backend.get_status().await,
        Err(e) => StatusReport::disconnected(network, e),
    }
}

/// Always returns a report, even when no backend can be built.
pub async fn diagnose(network: &str, config: &PublisherConfig) -> DiagnosticReport {
    match create(network, config, true).await {
        Ok(backend) => backend.diagnose().await,
        Err(e) => init_failure_report(network, &e),
    }
}

pub fn init_failure_report(network: &str, error: &LedgerError) -> DiagnosticReport {
    let mut tests = IndexMap::new();
    tests.insert(
        "backend_init".to_string(),
        CheckOutcome::fail_with(detail([("kind", Value::from(error.kind()))]), error),
    );
    DiagnosticReport::from_outcomes(network, Default::default(), tests)
}

/// What would be hashed for a scan, computed offline.
#[derive(Debug, Clone, Serialize)]
pub struct HashPreview {
    pub network: String,
    pub time_unit: TimeUnit,
    pub test: bool,
    pub fields: SummaryFields,
    pub canonical_payload: String,
    pub content_hash: ContentHash,
}

pub fn preview_hash(network: &str, scan: &Value, kind: SubmissionKind) -> LedgerResult<HashPreview> {
    let profile = profile(network)?;
    let obj = scan
        .as_object()
        .ok_or_else(|| LedgerError::Validation("scan data must be a JSON object".into()))?;
    let fields = Normalizer::new(profile.time_unit).with_kind(kind).fields(obj)?;
    Ok(HashPreview {
        network: profile.name.to_string(),
        time_unit: profile.time_unit,
        test: kind == SubmissionKind::Test,
        canonical_payload: canonical_payload(&fields, kind),
        content_hash: ContentHash::derive(&fields, kind),
        fields,
    })
}
