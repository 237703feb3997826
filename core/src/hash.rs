//! Content hash derivation.
//!
//! The hash binds a summary to its canonical field values: a JSON object with
//! sorted keys, no whitespace and integer-only numbers, hashed with Keccak-256.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::Value;
use sha3::{Digest, Keccak256};

use crate::error::{LedgerError, LedgerResult};
use crate::summary::SummaryFields;

pub const HASH_LEN: usize = 32;

/// Discriminates production records from test/probe records so the two can
/// never collide on the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionKind {
    Production,
    Test,
}

impl SubmissionKind {
    fn flag(self) -> bool {
        matches!(self, SubmissionKind::Test)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; HASH_LEN]);

impl ContentHash {
    pub fn from_bytes(bytes: [u8; HASH_LEN]) -> Self {
        ContentHash(bytes)
    }

    /// Derive the hash of `fields` over the canonical payload.
    pub fn derive(fields: &SummaryFields, kind: SubmissionKind) -> Self {
        let payload = canonical_payload(fields, kind);
        let digest = Keccak256::digest(payload.as_bytes());
        let mut out = [0u8; HASH_LEN];
        out.copy_from_slice(&digest);
        ContentHash(out)
    }

    /// Validate a caller-supplied hex hash (with or without `0x`).
    pub fn parse(s: &str) -> LedgerResult<Self> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")).unwrap_or(trimmed);
        let malformed = |reason: String| LedgerError::MalformedHash { value: s.to_string(), reason };
        if digits.len() != HASH_LEN * 2 {
            return Err(malformed(format!("expected {} hex digits, got {}", HASH_LEN * 2, digits.len())));
        }
        let bytes = hex::decode(digits).map_err(|e| malformed(e.to_string()))?;
        let mut out = [0u8; HASH_LEN];
        out.copy_from_slice(&bytes);
        Ok(ContentHash(out))
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// `0x`-prefixed lowercase hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Decimal byte array literal, e.g. `[1,2,255]`, as Move CLIs expect `vector<u8>`.
    pub fn byte_array_literal(&self) -> String {
        let items: Vec<String> = self.0.iter().map(|b| b.to_string()).collect();
        format!("[{}]", items.join(","))
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// The exact byte string that gets hashed.
///
/// Keys are held in a `BTreeMap` so serialization order never depends on how
/// the source record was built.
pub fn canonical_payload(fields: &SummaryFields, kind: SubmissionKind) -> String {
    let mut map: BTreeMap<&'static str, Value> = BTreeMap::new();
    map.insert("hostUid", Value::from(fields.host_id.as_str()));
    map.insert("scanTime", Value::from(fields.scan_time));
    map.insert("score", Value::from(fields.trust_score));
    map.insert("reportPointer", Value::from(fields.report_pointer.as_str()));
    map.insert("testData", Value::from(kind.flag()));
    // BTreeMap of plain JSON values cannot fail to serialize.
    serde_json::to_string(&map).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> SummaryFields {
        SummaryFields {
            host_id: "validator_123".into(),
            scan_time: 1_700_000_000,
            trust_score: 85,
            report_pointer: "scan_42_1700000000".into(),
        }
    }

    #[test]
    fn payload_is_sorted_and_compact() {
        let p = canonical_payload(&fields(), SubmissionKind::Production);
        assert_eq!(
            p,
            r#"{"hostUid":"validator_123","reportPointer":"scan_42_1700000000","scanTime":1700000000,"score":85,"testData":false}"#
        );
    }

    #[test]
    fn derive_is_deterministic() {
        let a = ContentHash::derive(&fields(), SubmissionKind::Production);
        let b = ContentHash::derive(&fields(), SubmissionKind::Production);
        assert_eq!(a, b);
        assert_eq!(a.as_bytes().len(), HASH_LEN);
    }

    #[test]
    fn test_flag_changes_hash() {
        let prod = ContentHash::derive(&fields(), SubmissionKind::Production);
        let test = ContentHash::derive(&fields(), SubmissionKind::Test);
        assert_ne!(prod, test);
    }

    #[test]
    fn parse_accepts_prefixed_and_bare_hex() {
        let h = ContentHash::derive(&fields(), SubmissionKind::Production);
        assert_eq!(ContentHash::parse(&h.to_hex()).unwrap(), h);
        assert_eq!(ContentHash::parse(&hex::encode(h.as_bytes())).unwrap(), h);
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(matches!(ContentHash::parse("not-hex"), Err(LedgerError::MalformedHash { .. })));
        assert!(matches!(ContentHash::parse("0xabcd"), Err(LedgerError::MalformedHash { .. })));
        let bad = format!("0x{}", "zz".repeat(32));
        assert!(matches!(ContentHash::parse(&bad), Err(LedgerError::MalformedHash { .. })));
    }

    #[test]
    fn byte_array_literal_lists_decimal_bytes() {
        let mut raw = [0u8; HASH_LEN];
        raw[0] = 1;
        raw[31] = 255;
        let lit = ContentHash::from_bytes(raw).byte_array_literal();
        assert!(lit.starts_with("[1,0,"));
        assert!(lit.ends_with(",0,255]"));
        assert_eq!(lit.matches(',').count(), 31);
    }
}
