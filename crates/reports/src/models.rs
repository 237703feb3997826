use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const REPORT_TYPE: &str = "depin_validator_scan";
pub const REPORT_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_trust_score(score: i64) -> Self {
        match score {
            s if s >= 80 => RiskLevel::Low,
            s if s >= 60 => RiskLevel::Medium,
            s if s >= 40 => RiskLevel::High,
            _ => RiskLevel::Critical,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanMetadata {
    pub scan_id: String,
    pub host_uid: String,
    pub validator_id: String,
    pub scan_timestamp: Value,
    pub ip_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityAssessment {
    pub trust_score: Value,
    pub risk_level: RiskLevel,
    pub open_ports: Value,
    pub services_detected: Value,
    pub vulnerabilities: Value,
    pub ssl_assessment: Value,
    pub scan_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnicalDetails {
    pub network_scan: Value,
    pub service_banners: Value,
    pub web_technologies: Value,
    pub docker_exposure: Value,
}

/// Full archival report built from one scan record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub uid: String,
    pub report_type: String,
    pub version: String,
    pub generated_at: String,
    pub scan_metadata: ScanMetadata,
    pub security_assessment: SecurityAssessment,
    pub technical_details: TechnicalDetails,
    pub recommendations: Vec<String>,
    pub raw_scan_data: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    Walrus,
    LocalFile,
}

impl Destination {
    pub const ALL: [Destination; 2] = [Destination::Walrus, Destination::LocalFile];

    pub fn as_str(self) -> &'static str {
        match self {
            Destination::Walrus => "walrus",
            Destination::LocalFile => "local_file",
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Destination {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "walrus" => Ok(Destination::Walrus),
            "local_file" | "local" => Ok(Destination::LocalFile),
            other => Err(format!("unknown destination: {}", other)),
        }
    }
}

/// Result of sending a report to one destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishOutcome {
    pub success: bool,
    pub destination: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PublishOutcome {
    pub fn stored(destination: impl Into<String>, identifier: impl Into<String>) -> Self {
        PublishOutcome {
            success: true,
            destination: destination.into(),
            identifier: Some(identifier.into()),
            sha256: None,
            error: None,
        }
    }

    pub fn failed(destination: impl Into<String>, error: impl ToString) -> Self {
        PublishOutcome {
            success: false,
            destination: destination.into(),
            identifier: None,
            sha256: None,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    /// True when at least one destination stored the report.
    pub success: bool,
    pub report_uid: String,
    pub results: Vec<PublishOutcome>,
}
