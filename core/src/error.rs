use thiserror::Error;

/// Every way publishing a scan summary can fail.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid scan data: {0}")]
    Validation(String),

    #[error("malformed content hash {value:?}: {reason}")]
    MalformedHash { value: String, reason: String },

    #[error("cannot reach ledger: {0}")]
    Connection(String),

    #[error("missing required configuration: {}", missing.join(", "))]
    MissingConfiguration { missing: Vec<String> },

    #[error("not authorized to publish: {0}")]
    Authorization(String),

    #[error("submission failed: {0}")]
    Submission(String),

    /// The ledger already holds this exact content hash.
    #[error("duplicate hash: scan summary {0} already exists on the ledger")]
    DuplicateHash(String),

    #[error("ledger aborted the call: {0}")]
    LedgerAbort(String),

    #[error("transaction {tx} was included but failed")]
    TransactionFailed { tx: String, block: Option<u64> },

    #[error("unexpected backend output: {0}")]
    UnexpectedOutput(String),

    #[error("unsupported network: {name} (supported: {})", supported.join(", "))]
    UnsupportedNetwork { name: String, supported: Vec<String> },
}

impl LedgerError {
    /// Stable tag used in the JSON result contract.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "validation",
            LedgerError::MalformedHash { .. } => "malformed_hash",
            LedgerError::Connection(_) => "connection",
            LedgerError::MissingConfiguration { .. } => "missing_configuration",
            LedgerError::Authorization(_) => "authorization",
            LedgerError::Submission(_) => "submission",
            LedgerError::DuplicateHash(_) => "duplicate_hash",
            LedgerError::LedgerAbort(_) => "ledger_abort",
            LedgerError::TransactionFailed { .. } => "transaction_failed",
            LedgerError::UnexpectedOutput(_) => "unexpected_output",
            LedgerError::UnsupportedNetwork { .. } => "unsupported_network",
        }
    }

    /// Callers may treat a duplicate as "already published".
    pub fn is_duplicate(&self) -> bool {
        matches!(self, LedgerError::DuplicateHash(_))
    }

    pub fn missing<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        LedgerError::MissingConfiguration { missing: fields.into_iter().map(Into::into).collect() }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_configuration_names_every_field() {
        let e = LedgerError::missing(["DEPIN_PACKAGE_ID", "DEPIN_ADMIN_CAP_ID"]);
        let msg = e.to_string();
        assert!(msg.contains("DEPIN_PACKAGE_ID"));
        assert!(msg.contains("DEPIN_ADMIN_CAP_ID"));
        assert_eq!(e.kind(), "missing_configuration");
    }

    #[test]
    fn duplicate_is_distinguishable() {
        assert!(LedgerError::DuplicateHash("0xab".into()).is_duplicate());
        assert!(!LedgerError::LedgerAbort("code 7".into()).is_duplicate());
    }
}
