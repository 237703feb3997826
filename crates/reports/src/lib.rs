//! Scan report formatting and archival.

mod error;
mod format;
mod local;
mod models;
mod publish;
mod walrus;

pub use error::ReportError;
pub use format::{build_report, recommendations, scan_id};
pub use local::{report_file_name, write_report, LocalArtifact};
pub use models::*;
pub use publish::{ReportPublisher, ReportSettings};
pub use walrus::{blob_id, WalrusClient, DEFAULT_WALRUS_URL};
