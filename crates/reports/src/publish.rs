use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;
use time::OffsetDateTime;

use crate::error::ReportError;
use crate::format::build_report;
use crate::local::write_report;
use crate::models::{Destination, PublishOutcome, Report, ReportSummary};
use crate::walrus::{WalrusClient, DEFAULT_WALRUS_URL};

#[derive(Debug, Clone)]
pub struct ReportSettings {
    pub reports_dir: PathBuf,
    pub walrus_api_url: String,
    pub walrus_api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for ReportSettings {
    fn default() -> Self {
        ReportSettings {
            reports_dir: PathBuf::from("reports"),
            walrus_api_url: DEFAULT_WALRUS_URL.into(),
            walrus_api_key: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Formats scan records and archives them; each destination succeeds or
/// fails on its own.
#[derive(Debug, Clone)]
pub struct ReportPublisher {
    settings: ReportSettings,
}

impl ReportPublisher {
    pub fn new(settings: ReportSettings) -> Self {
        ReportPublisher { settings }
    }

    /// An empty `destinations` means all of them.
    pub async fn publish(&self, scan: &Value, destinations: &[String]) -> ReportSummary {
        self.publish_at(scan, destinations, OffsetDateTime::now_utc()).await
    }

    pub async fn publish_at(&self, scan: &Value, destinations: &[String], now: OffsetDateTime) -> ReportSummary {
        let report = build_report(scan, now);
        let wanted: Vec<String> = if destinations.is_empty() {
            Destination::ALL.iter().map(|d| d.to_string()).collect()
        } else {
            destinations.to_vec()
        };
        let mut results = Vec::with_capacity(wanted.len());
        for name in &wanted {
            let outcome = match name.parse::<Destination>() {
                Ok(Destination::Walrus) => self.to_walrus(&report).await,
                Ok(Destination::LocalFile) => self.to_local(&report, now),
                Err(e) => PublishOutcome::failed(name.as_str(), e),
            };
            if !outcome.success {
                tracing::warn!(destination = %outcome.destination, error = ?outcome.error, "report not stored");
            }
            results.push(outcome);
        }
        ReportSummary { success: results.iter().any(|r| r.success), report_uid: report.uid, results }
    }

    fn to_local(&self, report: &Report, now: OffsetDateTime) -> PublishOutcome {
        let dest = Destination::LocalFile.as_str();
        match write_report(&self.settings.reports_dir, report, now) {
            Ok(artifact) => PublishOutcome {
                sha256: Some(artifact.sha256),
                ..PublishOutcome::stored(dest, artifact.path.display().to_string())
            },
            Err(e) => PublishOutcome::failed(dest, e),
        }
    }

    async fn to_walrus(&self, report: &Report) -> PublishOutcome {
        let dest = Destination::Walrus.as_str();
        let stored = match self.walrus() {
            Ok(client) => client.store(report).await,
            Err(e) => Err(e),
        };
        match stored {
            Ok(blob_id) => PublishOutcome::stored(dest, blob_id),
            Err(e) => PublishOutcome::failed(dest, e),
        }
    }

    fn walrus(&self) -> Result<WalrusClient, ReportError> {
        WalrusClient::new(
            &self.settings.walrus_api_url,
            self.settings.walrus_api_key.as_deref(),
            self.settings.timeout,
        )
    }

    pub async fn retrieve(&self, blob_id: &str) -> Result<Value, ReportError> {
        self.walrus()?.retrieve(blob_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn publisher(dir: &std::path::Path) -> ReportPublisher {
        ReportPublisher::new(ReportSettings { reports_dir: dir.to_path_buf(), ..ReportSettings::default() })
    }

    #[tokio::test]
    async fn destinations_fail_independently() {
        let dir = tempfile::tempdir().unwrap();
        let summary = publisher(dir.path()).publish(&json!({"scan_id": 1, "trust_score": 90}), &[]).await;
        assert!(summary.success);
        assert_eq!(summary.results.len(), 2);

        let walrus = &summary.results[0];
        assert_eq!(walrus.destination, "walrus");
        assert!(!walrus.success);
        assert!(walrus.error.as_deref().unwrap().contains("API key"));

        let local = &summary.results[1];
        assert!(local.success);
        assert!(local.identifier.as_deref().unwrap().ends_with(".json"));
        assert_eq!(local.sha256.as_deref().map(str::len), Some(64));
    }

    #[tokio::test]
    async fn unknown_destination_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let summary = publisher(dir.path()).publish(&json!({}), &["ipfs".to_string()]).await;
        assert!(!summary.success);
        assert_eq!(summary.results[0].error.as_deref(), Some("unknown destination: ipfs"));
    }

    #[tokio::test]
    async fn retrieve_needs_a_key() {
        let dir = tempfile::tempdir().unwrap();
        let err = publisher(dir.path()).retrieve("blob").await.unwrap_err();
        assert!(matches!(err, ReportError::NotConfigured(_)));
    }
}
