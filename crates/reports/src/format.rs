use serde_json::{json, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::models::{
    Report, RiskLevel, ScanMetadata, SecurityAssessment, TechnicalDetails, REPORT_TYPE, REPORT_VERSION,
};

const SSH_PORT: i64 = 22;
const DOCKER_API_PORT: i64 = 2375;

pub fn build_report(scan: &Value, now: OffsetDateTime) -> Report {
    let generated_at = now.format(&Rfc3339).unwrap_or_default();
    let scan_id = scan_id(scan);
    let field = |key: &str, default: Value| scan.get(key).filter(|v| !v.is_null()).cloned().unwrap_or(default);

    Report {
        uid: format!("depin_scan_{}_{}", scan_id, now.unix_timestamp()),
        report_type: REPORT_TYPE.into(),
        version: REPORT_VERSION.into(),
        scan_metadata: ScanMetadata {
            scan_id,
            host_uid: text(scan, "host_uid"),
            validator_id: text(scan, "validator_id"),
            scan_timestamp: field("scan_time", json!(generated_at)),
            ip_address: text(scan, "ip_address"),
        },
        security_assessment: SecurityAssessment {
            trust_score: field("trust_score", json!(0)),
            risk_level: RiskLevel::from_trust_score(trust_score(scan)),
            open_ports: field("open_ports", json!([])),
            services_detected: field("services", json!([])),
            vulnerabilities: field("vulnerabilities", json!([])),
            ssl_assessment: field("ssl_info", json!({})),
            scan_type: text(scan, "scan_type"),
        },
        technical_details: TechnicalDetails {
            network_scan: field("network_scan", json!({})),
            service_banners: field("banners", json!({})),
            web_technologies: field("web_tech", json!({})),
            docker_exposure: field("docker_api", json!({})),
        },
        recommendations: recommendations(scan),
        raw_scan_data: scan.clone(),
        generated_at,
    }
}

pub fn recommendations(scan: &Value) -> Vec<String> {
    let mut out = Vec::new();
    let ports: Vec<i64> = scan
        .get("open_ports")
        .and_then(Value::as_array)
        .map(|ports| ports.iter().filter_map(as_int).collect())
        .unwrap_or_default();
    if ports.contains(&SSH_PORT) {
        out.push("Ensure SSH is properly secured with key-based authentication".to_string());
    }
    if ports.contains(&DOCKER_API_PORT) {
        out.push("CRITICAL: Docker API exposed without authentication - secure immediately".to_string());
    }
    let vulns = scan.get("vulnerabilities").and_then(Value::as_array).map_or(0, Vec::len);
    if vulns > 0 {
        out.push(format!("Address {} identified vulnerabilities", vulns));
    }
    if scan.pointer("/ssl_info/expired").and_then(Value::as_bool).unwrap_or(false) {
        out.push("Renew expired SSL certificates".to_string());
    }
    if trust_score(scan) < 70 {
        out.push("Overall security posture needs improvement".to_string());
    }
    out
}

pub fn scan_id(scan: &Value) -> String {
    ["scan_id", "id"]
        .iter()
        .find_map(|k| scan.get(*k).and_then(scalar_text))
        .unwrap_or_else(|| "unknown".into())
}

fn trust_score(scan: &Value) -> i64 {
    scan.get("trust_score").and_then(as_int).unwrap_or(0)
}

fn text(scan: &Value, key: &str) -> String {
    scan.get(key).and_then(scalar_text).unwrap_or_else(|| "unknown".into())
}

fn scalar_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_int(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
    }

    #[test]
    fn risk_levels_by_score() {
        assert_eq!(RiskLevel::from_trust_score(95), RiskLevel::Low);
        assert_eq!(RiskLevel::from_trust_score(80), RiskLevel::Low);
        assert_eq!(RiskLevel::from_trust_score(79), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_trust_score(60), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_trust_score(40), RiskLevel::High);
        assert_eq!(RiskLevel::from_trust_score(39), RiskLevel::Critical);
    }

    #[test]
    fn recommendations_follow_findings() {
        let scan = json!({
            "trust_score": 55,
            "open_ports": [22, "2375", 443],
            "vulnerabilities": [{"id": "CVE-1"}, {"id": "CVE-2"}],
            "ssl_info": {"expired": true},
        });
        let recs = recommendations(&scan);
        assert_eq!(recs.len(), 5);
        assert!(recs[0].contains("SSH"));
        assert!(recs[1].starts_with("CRITICAL: Docker API"));
        assert_eq!(recs[2], "Address 2 identified vulnerabilities");
        assert!(recommendations(&json!({"trust_score": 90, "open_ports": [443]})).is_empty());
    }

    #[test]
    fn builds_structured_report() {
        let scan = json!({"scan_id": 42, "host_uid": "validator_123", "trust_score": 85, "scan_type": "full"});
        let report = build_report(&scan, at());
        assert_eq!(report.uid, "depin_scan_42_1700000000");
        assert_eq!(report.scan_metadata.scan_id, "42");
        assert_eq!(report.scan_metadata.validator_id, "unknown");
        assert_eq!(report.security_assessment.risk_level, RiskLevel::Low);
        assert_eq!(report.generated_at, "2023-11-14T22:13:20Z");
        assert_eq!(report.scan_metadata.scan_timestamp, json!("2023-11-14T22:13:20Z"));
        let v = serde_json::to_value(&report).unwrap();
        assert_eq!(v["security_assessment"]["risk_level"], "LOW");
        assert_eq!(v["raw_scan_data"]["scan_type"], "full");
    }
}
