//! Interpreting `sui client call` output.
//!
//! Checks run in a fixed order and the first match wins:
//! failed exit, empty stdout, abort markers, execution errors, then the
//! JSON effects, then a plain-text fallback.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use scanledger_core::{LedgerError, LedgerResult};

const VERSION_MISMATCH: &str = "version mismatch";
const ABORT_MARKER: &str = "aborted within function";
const EXECUTION_ERROR_MARKER: &str = "Error executing transaction";
/// Abort code the registry uses for an already-recorded hash.
const DUPLICATE_ABORT_CODE: u64 = 4;

#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    /// Structured JSON effects with a success status.
    Executed { digest: Option<String>, checkpoint: Option<u64>, effects: Value },
    /// Non-JSON stdout that did not look like an error.
    Text(String),
}

impl CallOutcome {
    pub fn digest(&self) -> Option<&str> {
        match self {
            CallOutcome::Executed { digest, .. } => digest.as_deref(),
            CallOutcome::Text(text) => text_digest(text),
        }
    }

    pub fn checkpoint(&self) -> Option<u64> {
        match self {
            CallOutcome::Executed { checkpoint, .. } => *checkpoint,
            CallOutcome::Text(_) => None,
        }
    }
}

fn duplicate_code() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&format!(r"\bcode {}\b", DUPLICATE_ABORT_CODE)).ok()).as_ref()
}

fn digest_line() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Transaction Digest:\s*([1-9A-HJ-NP-Za-km-z]{32,44})").ok()).as_ref()
}

fn text_digest(text: &str) -> Option<&str> {
    digest_line()?.captures(text)?.get(1).map(|m| m.as_str())
}

fn is_duplicate_text(stdout: &str) -> bool {
    duplicate_code().map_or(false, |re| re.is_match(stdout))
}

fn is_duplicate_status(error: &str) -> bool {
    error.contains("MoveAbort") && error.contains(&format!(", {})", DUPLICATE_ABORT_CODE))
}

/// `hash` only labels the duplicate error.
pub fn interpret(status_ok: bool, stdout: &str, stderr: &str, hash: &str) -> LedgerResult<CallOutcome> {
    if !status_ok && !stderr.contains(VERSION_MISMATCH) {
        return Err(LedgerError::Submission(format!("sui command failed: {}", stderr.trim())));
    }
    let stdout = stdout.trim();
    if stdout.is_empty() {
        return Err(LedgerError::Submission("no output from sui command".into()));
    }
    if stdout.contains(ABORT_MARKER) {
        if is_duplicate_text(stdout) {
            return Err(LedgerError::DuplicateHash(hash.to_string()));
        }
        return Err(LedgerError::LedgerAbort(stdout.to_string()));
    }
    if stdout.contains(EXECUTION_ERROR_MARKER) {
        return Err(LedgerError::Submission(format!("transaction execution error: {}", stdout)));
    }

    match serde_json::from_str::<Value>(stdout) {
        Ok(parsed) => {
            let status = &parsed["effects"]["status"];
            if status["status"].as_str() == Some("failure") {
                let error = match &status["error"] {
                    Value::String(s) => s.clone(),
                    Value::Null => "unknown error".to_string(),
                    other => other.to_string(),
                };
                if is_duplicate_status(&error) {
                    return Err(LedgerError::DuplicateHash(hash.to_string()));
                }
                if error.contains("MoveAbort") {
                    return Err(LedgerError::LedgerAbort(error));
                }
                return Err(LedgerError::Submission(format!("transaction failed: {}", error)));
            }
            Ok(CallOutcome::Executed {
                digest: parsed["digest"].as_str().map(str::to_string),
                checkpoint: parsed["checkpoint"]
                    .as_u64()
                    .or_else(|| parsed["checkpoint"].as_str().and_then(|s| s.parse().ok())),
                effects: parsed["effects"].clone(),
            })
        }
        // Plain text counts as executed unless it mentions an error. No
        // particular success banner is required.
        Err(_) if !stdout.to_ascii_lowercase().contains("error") => Ok(CallOutcome::Text(stdout.to_string())),
        Err(_) => Err(LedgerError::UnexpectedOutput(stdout.to_string())),
    }
}
