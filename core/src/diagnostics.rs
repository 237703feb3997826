//! Ordered, isolated diagnostic checks.
//!
//! A backend describes its checks as a list of named futures; [`run_checks`]
//! awaits them in order and folds the outcomes into a [`DiagnosticReport`].
//! A failing or panicking check only marks itself failed.

use std::panic::AssertUnwindSafe;

use futures::future::BoxFuture;
use futures::FutureExt;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckOutcome {
    pub success: bool,
    #[serde(flatten)]
    pub detail: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckOutcome {
    pub fn pass(detail: Map<String, Value>) -> Self {
        CheckOutcome { success: true, detail, error: None }
    }

    pub fn fail(error: impl ToString) -> Self {
        CheckOutcome { success: false, detail: Map::new(), error: Some(error.to_string()) }
    }

    /// Failure that still reports what was learned before it failed.
    pub fn fail_with(detail: Map<String, Value>, error: impl ToString) -> Self {
        CheckOutcome { success: false, detail, error: Some(error.to_string()) }
    }
}

/// One named check. Nothing runs until the runner awaits it.
pub struct DiagnosticCheck<'a> {
    pub name: &'static str,
    pub run: BoxFuture<'a, CheckOutcome>,
}

impl<'a> DiagnosticCheck<'a> {
    pub fn new(name: &'static str, run: BoxFuture<'a, CheckOutcome>) -> Self {
        DiagnosticCheck { name, run }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverallStatus {
    pub healthy: bool,
    pub total_tests: usize,
    pub passed_tests: usize,
    pub failed_tests: usize,
}

/// Built fresh on every run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticReport {
    pub timestamp: String,
    pub network: String,
    pub config: Map<String, Value>,
    pub tests: IndexMap<String, CheckOutcome>,
    pub overall_status: OverallStatus,
}

impl DiagnosticReport {
    pub fn from_outcomes(
        network: impl Into<String>,
        config: Map<String, Value>,
        tests: IndexMap<String, CheckOutcome>,
    ) -> Self {
        let total_tests = tests.len();
        let passed_tests = tests.values().filter(|o| o.success).count();
        DiagnosticReport {
            timestamp: OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
            network: network.into(),
            config,
            tests,
            overall_status: OverallStatus {
                // An empty battery proves nothing.
                healthy: total_tests > 0 && passed_tests == total_tests,
                total_tests,
                passed_tests,
                failed_tests: total_tests - passed_tests,
            },
        }
    }

    pub fn healthy(&self) -> bool {
        self.overall_status.healthy
    }

    pub fn test(&self, name: &str) -> Option<&CheckOutcome> {
        self.tests.get(name)
    }
}

pub async fn run_checks(
    network: &str,
    config: Map<String, Value>,
    checks: Vec<DiagnosticCheck<'_>>,
) -> DiagnosticReport {
    let mut tests = IndexMap::with_capacity(checks.len());
    for check in checks {
        let outcome = match AssertUnwindSafe(check.run).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => CheckOutcome::fail("check panicked"),
        };
        if outcome.success {
            tracing::debug!(network, check = check.name, "diagnostic check passed");
        } else {
            tracing::warn!(network, check = check.name, error = ?outcome.error, "diagnostic check failed");
        }
        tests.insert(check.name.to_string(), outcome);
    }
    DiagnosticReport::from_outcomes(network, config, tests)
}

/// Shorthand for building `detail` maps.
pub fn detail<I, K>(pairs: I) -> Map<String, Value>
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
