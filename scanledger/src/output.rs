//! JSON envelopes written to stdout. Every command prints exactly one.

use serde::Serialize;
use serde_json::{json, Map, Value};

use scanledger_core::LedgerError;

/// `{success: true, command, <key>: payload}`
pub fn ok<T: Serialize>(command: &str, key: &str, payload: &T) -> serde_json::Result<Value> {
    Ok(json!({ "success": true, "command": command, key: serde_json::to_value(payload)? }))
}

/// Like [`ok`] but with `success` taken from the payload's own verdict.
pub fn verdict<T: Serialize>(command: &str, success: bool, key: &str, payload: &T) -> serde_json::Result<Value> {
    Ok(json!({ "success": success, "command": command, key: serde_json::to_value(payload)? }))
}

pub fn failure(command: &str, error_type: &str, message: impl ToString) -> Value {
    json!({ "success": false, "command": command, "error": message.to_string(), "error_type": error_type })
}

pub fn ledger_error(command: &str, network: Option<&str>, err: &LedgerError) -> Value {
    let mut body = Map::new();
    body.insert("success".into(), Value::Bool(false));
    body.insert("command".into(), Value::from(command));
    if let Some(network) = network {
        body.insert("network".into(), Value::from(network));
    }
    body.insert("error".into(), Value::from(err.to_string()));
    body.insert("error_type".into(), Value::from(err.kind()));
    match err {
        LedgerError::MissingConfiguration { missing } => {
            body.insert("missing".into(), json!(missing));
        }
        LedgerError::UnsupportedNetwork { supported, .. } => {
            body.insert("supported".into(), json!(supported));
        }
        LedgerError::DuplicateHash(hash) => {
            body.insert("duplicate".into(), Value::Bool(true));
            body.insert("content_hash".into(), Value::from(hash.as_str()));
        }
        LedgerError::TransactionFailed { tx, block } => {
            body.insert("transaction_id".into(), Value::from(tx.as_str()));
            body.insert("block_or_sequence".into(), json!(block));
        }
        _ => {}
    }
    Value::Object(body)
}

pub fn succeeded(out: &Value) -> bool {
    out.get("success").and_then(Value::as_bool).unwrap_or(false)
}
