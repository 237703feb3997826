//! Argument vectors for `sui client`.

use scanledger_core::ContentHash;

use crate::config::Identifiers;

pub const MOVE_MODULE: &str = "validator_scanner_registry";
pub const MOVE_FUNCTION: &str = "publish_scan_summary";
/// Shared system clock object.
pub const CLOCK_OBJECT: &str = "0x6";

#[derive(Debug, Clone)]
pub struct PublishCall<'a> {
    pub ids: Identifiers<'a>,
    pub host_id: &'a str,
    pub scan_time: u64,
    pub content_hash: &'a ContentHash,
    pub trust_score: u16,
    pub report_pointer: &'a str,
    pub gas_budget: u64,
}

impl PublishCall<'_> {
    /// Positional order is fixed by the Move entry function.
    pub fn args(&self, dry_run: bool) -> Vec<String> {
        let mut args: Vec<String> = [
            "client",
            "call",
            "--json",
            "--package",
            self.ids.package_id,
            "--module",
            MOVE_MODULE,
            "--function",
            MOVE_FUNCTION,
            "--args",
            self.ids.registry_id,
            self.ids.admin_cap_id,
            self.host_id,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.push(self.scan_time.to_string());
        args.push(self.content_hash.byte_array_literal());
        args.push(self.trust_score.to_string());
        args.push(self.report_pointer.to_string());
        args.push(CLOCK_OBJECT.to_string());
        args.push("--gas-budget".into());
        args.push(self.gas_budget.to_string());
        if dry_run {
            args.push("--dry-run".into());
        }
        args
    }
}

pub fn client_args(sub: &[&str]) -> Vec<String> {
    std::iter::once("client").chain(sub.iter().copied()).map(str::to_string).collect()
}
