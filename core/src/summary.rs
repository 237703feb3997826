//! Scan record normalization.
//!
//! Turns a loosely-typed scan record into a [`ScanSummary`]: the five values
//! that end up on a ledger.

use serde::Serialize;
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::error::{LedgerError, LedgerResult};
use crate::hash::{ContentHash, SubmissionKind};

pub const FALLBACK_HOST_ID: &str = "unknown_host";
pub const MAX_TRUST_SCORE: u16 = u16::MAX;

/// Supplied scan times at or above this are taken to be milliseconds.
const MILLIS_THRESHOLD: u64 = 100_000_000_000;

/// Native time unit of a ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Seconds,
    Milliseconds,
}

impl TimeUnit {
    pub fn from_datetime(self, at: OffsetDateTime) -> u64 {
        let nanos = at.unix_timestamp_nanos().max(0) as u128;
        match self {
            TimeUnit::Seconds => (nanos / 1_000_000_000) as u64,
            TimeUnit::Milliseconds => (nanos / 1_000_000) as u64,
        }
    }

    pub fn now(self) -> u64 {
        self.from_datetime(OffsetDateTime::now_utc())
    }

    /// Convert a raw unix time of either unit into this unit.
    pub fn normalize(self, raw: u64) -> u64 {
        let raw_is_millis = raw >= MILLIS_THRESHOLD;
        match (self, raw_is_millis) {
            (TimeUnit::Seconds, true) => raw / 1000,
            (TimeUnit::Milliseconds, false) => raw.saturating_mul(1000),
            _ => raw,
        }
    }
}

/// The hashed subset of a summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryFields {
    pub host_id: String,
    pub scan_time: u64,
    pub trust_score: u16,
    pub report_pointer: String,
}

/// Canonical, immutable scan summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    #[serde(flatten)]
    fields: SummaryFields,
    content_hash: ContentHash,
}

impl ScanSummary {
    pub fn new(fields: SummaryFields, content_hash: ContentHash) -> Self {
        ScanSummary { fields, content_hash }
    }

    pub fn host_id(&self) -> &str {
        &self.fields.host_id
    }

    pub fn scan_time(&self) -> u64 {
        self.fields.scan_time
    }

    pub fn trust_score(&self) -> u16 {
        self.fields.trust_score
    }

    pub fn report_pointer(&self) -> &str {
        &self.fields.report_pointer
    }

    pub fn content_hash(&self) -> &ContentHash {
        &self.content_hash
    }

    pub fn fields(&self) -> &SummaryFields {
        &self.fields
    }
}

pub fn clamp_trust_score(score: i64) -> u16 {
    score.clamp(0, MAX_TRUST_SCORE as i64) as u16
}

pub fn default_report_pointer(scan_id: &str, unix_secs: u64) -> String {
    format!("scan_{}_{}", scan_id, unix_secs)
}

/// Builds summaries for one target ledger.
#[derive(Debug, Clone)]
pub struct Normalizer {
    unit: TimeUnit,
    kind: SubmissionKind,
    fixed_now: Option<OffsetDateTime>,
}

impl Normalizer {
    pub fn new(unit: TimeUnit) -> Self {
        Normalizer { unit, kind: SubmissionKind::Production, fixed_now: None }
    }

    pub fn with_kind(mut self, kind: SubmissionKind) -> Self {
        self.kind = kind;
        self
    }

    /// Pin "now" (tests, replays).
    pub fn with_clock(mut self, now: OffsetDateTime) -> Self {
        self.fixed_now = Some(now);
        self
    }

    fn now(&self) -> OffsetDateTime {
        self.fixed_now.unwrap_or_else(OffsetDateTime::now_utc)
    }

    pub fn normalize_str(&self, raw: &str) -> LedgerResult<ScanSummary> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| LedgerError::Validation(format!("scan data is not valid JSON: {}", e)))?;
        self.normalize(&value)
    }

    pub fn normalize(&self, record: &Value) -> LedgerResult<ScanSummary> {
        let obj = record
            .as_object()
            .ok_or_else(|| LedgerError::Validation("scan data must be a JSON object".into()))?;
        let fields = self.fields(obj)?;
        let content_hash = match supplied_hash(obj)? {
            Some(h) => ContentHash::parse(h)?,
            None => ContentHash::derive(&fields, self.kind),
        };
        Ok(ScanSummary::new(fields, content_hash))
    }

    /// Resolve the hashed fields without touching the hash.
    pub fn fields(&self, obj: &Map<String, Value>) -> LedgerResult<SummaryFields> {
        let now = self.now();
        let host_id = ["host_uid", "validator_id"]
            .iter()
            .find_map(|k| non_empty_text(obj.get(*k)))
            .unwrap_or_else(|| FALLBACK_HOST_ID.to_string());

        let trust_score = match obj.get("trust_score") {
            None | Some(Value::Null) => 0,
            Some(v) => clamp_trust_score(parse_integer(v, "trust_score")?),
        };

        let scan_time = match obj.get("scan_time") {
            None | Some(Value::Null) => self.unit.from_datetime(now),
            Some(v) => {
                let raw = parse_integer(v, "scan_time")?;
                if raw < 0 {
                    return Err(LedgerError::Validation(format!("scan_time must not be negative, got {}", raw)));
                }
                self.unit.normalize(raw as u64)
            }
        };

        let report_pointer = non_empty_text(obj.get("report_pointer")).unwrap_or_else(|| {
            let scan_id = non_empty_text(obj.get("scan_id")).unwrap_or_else(|| "unknown".into());
            default_report_pointer(&scan_id, TimeUnit::Seconds.from_datetime(now))
        });

        Ok(SummaryFields { host_id, scan_time, trust_score, report_pointer })
    }
}

fn supplied_hash(obj: &Map<String, Value>) -> LedgerResult<Option<&str>> {
    for key in ["summary_hash", "content_hash"] {
        match obj.get(key) {
            None | Some(Value::Null) => continue,
            Some(Value::String(s)) if s.trim().is_empty() => continue,
            Some(Value::String(s)) => return Ok(Some(s.as_str())),
            Some(other) => {
                return Err(LedgerError::MalformedHash {
                    value: other.to_string(),
                    reason: "hash must be a hex string".into(),
                })
            }
        }
    }
    Ok(None)
}

fn non_empty_text(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Integers, floats (truncated) and numeric strings.
fn parse_integer(v: &Value, field: &str) -> LedgerResult<i64> {
    let invalid = || LedgerError::Validation(format!("{} is not an integer: {}", field, v));
    match v {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else if n.as_u64().is_some() {
                Ok(i64::MAX)
            } else {
                n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64).ok_or_else(invalid)
            }
        }
        Value::String(s) => {
            let t = s.trim();
            t.parse::<i64>()
                .ok()
                .or_else(|| t.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
                .ok_or_else(invalid)
        }
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn at() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
    }

    fn secs() -> Normalizer {
        Normalizer::new(TimeUnit::Seconds).with_clock(at())
    }

    #[test]
    fn clamps_trust_scores() {
        assert_eq!(clamp_trust_score(-5), 0);
        assert_eq!(clamp_trust_score(70_000), 65_535);
        assert_eq!(clamp_trust_score(42), 42);
        for s in [i64::MIN, -1, 0, 1, 65_535, 65_536, i64::MAX] {
            let c = clamp_trust_score(s) as i64;
            assert!((0..=65_535).contains(&c));
        }
    }

    #[test]
    fn clamps_scores_inside_records() {
        let s = secs().normalize(&json!({"trust_score": 70000})).unwrap();
        assert_eq!(s.trust_score(), 65_535);
        let s = secs().normalize(&json!({"trust_score": "-5"})).unwrap();
        assert_eq!(s.trust_score(), 0);
        let s = secs().normalize(&json!({"trust_score": 85.9})).unwrap();
        assert_eq!(s.trust_score(), 85);
    }

    #[test]
    fn host_id_fallback_chain() {
        let s = secs().normalize(&json!({"host_uid": "h1", "validator_id": "v1"})).unwrap();
        assert_eq!(s.host_id(), "h1");
        let s = secs().normalize(&json!({"host_uid": "", "validator_id": "v1"})).unwrap();
        assert_eq!(s.host_id(), "v1");
        let s = secs().normalize(&json!({})).unwrap();
        assert_eq!(s.host_id(), FALLBACK_HOST_ID);
    }

    #[test]
    fn defaults_time_and_pointer() {
        let s = secs().normalize(&json!({"scan_id": 42})).unwrap();
        assert_eq!(s.scan_time(), 1_700_000_000);
        assert_eq!(s.report_pointer(), "scan_42_1700000000");

        let ms = Normalizer::new(TimeUnit::Milliseconds).with_clock(at());
        let s = ms.normalize(&json!({})).unwrap();
        assert_eq!(s.scan_time(), 1_700_000_000_000);
        assert_eq!(s.report_pointer(), "scan_unknown_1700000000");
    }

    #[test]
    fn converts_supplied_time_to_target_unit() {
        let s = secs().normalize(&json!({"scan_time": 1_700_000_000_123u64})).unwrap();
        assert_eq!(s.scan_time(), 1_700_000_000);
        let ms = Normalizer::new(TimeUnit::Milliseconds).with_clock(at());
        let s = ms.normalize(&json!({"scan_time": 1_700_000_000})).unwrap();
        assert_eq!(s.scan_time(), 1_700_000_000_000);
        let s = ms.normalize(&json!({"scan_time": 1_700_000_000_123u64})).unwrap();
        assert_eq!(s.scan_time(), 1_700_000_000_123);
    }

    #[test]
    fn insertion_order_does_not_change_hash() {
        let a: Value = serde_json::from_str(
            r#"{"host_uid":"h","trust_score":7,"scan_time":1700000000,"report_pointer":"p"}"#,
        )
        .unwrap();
        let b: Value = serde_json::from_str(
            r#"{"report_pointer":"p","scan_time":1700000000,"trust_score":7,"host_uid":"h"}"#,
        )
        .unwrap();
        let ha = secs().normalize(&a).unwrap();
        let hb = secs().normalize(&b).unwrap();
        assert_eq!(ha.content_hash(), hb.content_hash());
    }

    #[test]
    fn supplied_hash_is_validated_not_derived() {
        let err = secs().normalize(&json!({"summary_hash": "not-hex"})).unwrap_err();
        assert!(matches!(err, LedgerError::MalformedHash { .. }));

        let hex = format!("0x{}", "ab".repeat(32));
        let s = secs().normalize(&json!({"summary_hash": hex})).unwrap();
        assert_eq!(s.content_hash().to_hex(), hex);
    }

    #[test]
    fn rejects_non_records() {
        assert!(matches!(secs().normalize_str("[1,2]"), Err(LedgerError::Validation(_))));
        assert!(matches!(secs().normalize_str("{not json"), Err(LedgerError::Validation(_))));
        assert!(matches!(
            secs().normalize(&json!({"trust_score": "high"})),
            Err(LedgerError::Validation(_))
        ));
    }
}
