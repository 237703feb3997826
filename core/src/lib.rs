//! Core types for publishing scan summaries to external ledgers.

pub mod backend;
pub mod diagnostics;
pub mod error;
pub mod hash;
pub mod summary;

pub use backend::{LedgerBackend, StatusReport, SubmissionResult, SubmitRequest};
pub use diagnostics::{run_checks, CheckOutcome, DiagnosticCheck, DiagnosticReport, OverallStatus};
pub use error::{LedgerError, LedgerResult};
pub use hash::{canonical_payload, ContentHash, SubmissionKind};
pub use summary::{clamp_trust_score, Normalizer, ScanSummary, SummaryFields, TimeUnit};

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!version().is_empty());
    }
}
