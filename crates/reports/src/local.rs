use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use time::macros::format_description;
use time::OffsetDateTime;

use crate::error::ReportError;
use crate::models::Report;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalArtifact {
    pub path: PathBuf,
    /// Hex SHA-256 of the bytes written.
    pub sha256: String,
}

pub fn report_file_name(scan_id: &str, now: OffsetDateTime) -> String {
    let stamp = now
        .format(format_description!("[year][month][day]_[hour][minute][second]"))
        .unwrap_or_default();
    let safe: String = scan_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("scan_report_{}_{}.json", safe, stamp)
}

pub fn write_report(dir: &Path, report: &Report, now: OffsetDateTime) -> Result<LocalArtifact, ReportError> {
    fs::create_dir_all(dir).map_err(|source| ReportError::Io { path: dir.to_path_buf(), source })?;
    let path = dir.join(report_file_name(&report.scan_metadata.scan_id, now));
    let body = serde_json::to_vec_pretty(report)?;
    fs::write(&path, &body).map_err(|source| ReportError::Io { path: path.clone(), source })?;
    tracing::info!(path = %path.display(), bytes = body.len(), "report written");
    Ok(LocalArtifact { path, sha256: hex::encode(Sha256::digest(&body)) })
}
