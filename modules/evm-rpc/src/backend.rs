use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::{json, Map, Value};
use tokio::time::{sleep, Instant};

use scanledger_core::diagnostics::detail;
use scanledger_core::summary::default_report_pointer;
use scanledger_core::{
    run_checks, CheckOutcome, DiagnosticCheck, DiagnosticReport, LedgerBackend, LedgerError, LedgerResult,
    StatusReport, SubmissionResult, SubmitRequest, TimeUnit,
};

use crate::abi::{ContractAbi, Token};
use crate::config::EvmConfig;
use crate::rpc::{EthClient, HttpTransport, Receipt, RpcTransport};
use crate::signer::{Address, LocalSigner};
use crate::tx::{transaction_hash, LegacyTransaction};

const WEI_PER_ETH: f64 = 1e18;
const CONTRACT_INFO_FIELDS: [&str; 6] =
    ["version", "is_paused", "total_summaries", "publish_cooldown", "reputation_threshold", "active_hosts"];

#[derive(Debug)]
enum QueryError {
    /// Empty return data or a revert: the contract does not answer this function.
    NotImplemented(String),
    Failed(String),
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::NotImplemented(m) | QueryError::Failed(m) => f.write_str(m),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Authorization {
    pub is_owner: bool,
    pub is_publisher: bool,
}

/// Publishes summaries to the scan registry contract on an EVM chain.
pub struct EvmBackend {
    config: EvmConfig,
    eth: EthClient,
    signer: LocalSigner,
    contract: Address,
    abi: ContractAbi,
    chain_id: Option<u64>,
    authorization: Option<Authorization>,
}

impl EvmBackend {
    pub async fn connect(config: EvmConfig, skip_auth_check: bool) -> LedgerResult<Self> {
        config.validate()?;
        let transport = HttpTransport::new(config.rpc_url.clone(), config.request_timeout)
            .map_err(|e| LedgerError::Connection(e.to_string()))?;
        Self::with_transport(config, Arc::new(transport), skip_auth_check).await
    }

    /// With `skip_auth_check`, an unreachable node only logs a warning so
    /// diagnostics can still run against the handle.
    pub async fn with_transport(
        config: EvmConfig,
        transport: Arc<dyn RpcTransport>,
        skip_auth_check: bool,
    ) -> LedgerResult<Self> {
        config.validate()?;
        let signer = LocalSigner::from_hex(config.private_key.as_deref().unwrap_or_default())
            .map_err(LedgerError::Validation)?;
        let contract = Address::parse(config.contract_address.as_deref().unwrap_or_default())
            .map_err(LedgerError::Validation)?;
        let abi = ContractAbi::bundled().map_err(|e| LedgerError::Validation(e.to_string()))?;
        let eth = EthClient::new(transport);

        let chain_id = match eth.chain_id().await {
            Ok(id) => Some(id),
            Err(e) if skip_auth_check => {
                tracing::warn!(network = %config.network, rpc_url = %config.rpc_url, error = %e, "rpc unreachable, continuing");
                None
            }
            Err(e) => {
                return Err(LedgerError::Connection(format!("failed to connect to {}: {}", config.rpc_url, e)));
            }
        };

        let mut backend = EvmBackend { config, eth, signer, contract, abi, chain_id, authorization: None };
        if !skip_auth_check {
            backend.authorization = Some(backend.check_authorization().await?);
        }
        tracing::info!(
            network = %backend.config.network,
            account = %backend.signer.address(),
            contract = %backend.contract,
            chain_id = ?backend.chain_id,
            "evm backend ready"
        );
        Ok(backend)
    }

    pub fn account(&self) -> Address {
        self.signer.address()
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    async fn query(&self, name: &str, args: &[Token]) -> Result<Vec<Token>, QueryError> {
        let function = self.abi.function(name).map_err(|e| QueryError::Failed(e.to_string()))?;
        let data = function.encode_call(args).map_err(|e| QueryError::Failed(e.to_string()))?;
        match self.eth.call(self.contract, &data).await {
            Ok(out) if out.is_empty() => {
                Err(QueryError::NotImplemented(format!("{} returned no data", function.signature())))
            }
            Ok(out) => function
                .decode_output(&out)
                .map_err(|e| QueryError::Failed(format!("{}: {}", function.signature(), e))),
            Err(e) if e.is_revert() => {
                Err(QueryError::NotImplemented(format!("{} reverted: {}", function.signature(), e)))
            }
            Err(e) => Err(QueryError::Failed(e.to_string())),
        }
    }

    /// Reads both flags. Fails only when the contract cannot answer.
    pub async fn authorization_flags(&self) -> LedgerResult<Authorization> {
        let me = self.signer.address();
        let owner = self.query("owner", &[]).await;
        let publisher = self.query("authorizedPublishers", &[Token::Address(me)]).await;
        let (owner, publisher) = match (owner, publisher) {
            (Err(QueryError::NotImplemented(_)), Err(QueryError::NotImplemented(_))) => {
                return Err(LedgerError::Authorization(format!(
                    "contract at {} does not implement owner() or authorizedPublishers(address); check CONTRACT_ADDRESS",
                    self.contract
                )));
            }
            (Err(QueryError::Failed(e)), _) | (_, Err(QueryError::Failed(e))) => {
                return Err(LedgerError::Authorization(format!("authorization check failed: {}", e)));
            }
            (o, p) => (o.ok(), p.ok()),
        };
        Ok(Authorization {
            is_owner: matches!(owner.as_deref(), Some([Token::Address(a)]) if *a == me),
            is_publisher: matches!(publisher.as_deref(), Some([Token::Bool(true)])),
        })
    }

    /// The signer must own the contract or be an authorized publisher.
    pub async fn check_authorization(&self) -> LedgerResult<Authorization> {
        let flags = self.authorization_flags().await?;
        if !flags.is_owner && !flags.is_publisher {
            return Err(LedgerError::Authorization(format!(
                "account {} is neither the owner nor an authorized publisher of {}",
                self.signer.address(),
                self.contract
            )));
        }
        tracing::debug!(is_owner = flags.is_owner, is_publisher = flags.is_publisher, "authorization confirmed");
        Ok(flags)
    }

    pub async fn contract_info(&self) -> Result<Map<String, Value>, String> {
        let tokens = self.query("getContractInfo", &[]).await.map_err(|e| e.to_string())?;
        Ok(CONTRACT_INFO_FIELDS.iter().zip(&tokens).map(|(name, t)| (name.to_string(), t.to_json())).collect())
    }

    async fn publish(&self, request: SubmitRequest) -> LedgerResult<SubmissionResult> {
        let scan_time = request.timestamp.unwrap_or_else(|| TimeUnit::Seconds.now());
        let report_pointer = request
            .report_pointer
            .clone()
            .unwrap_or_else(|| default_report_pointer("unknown", TimeUnit::Seconds.now()));
        let call = self
            .abi
            .function("publishScanSummary")
            .and_then(|f| {
                f.encode_call(&[
                    Token::String(request.host_id.clone()),
                    Token::Uint(scan_time as u128),
                    Token::Bytes32(*request.content_hash.as_bytes()),
                    Token::Uint(request.trust_score as u128),
                    Token::String(report_pointer.clone()),
                ])
            })
            .map_err(|e| LedgerError::Submission(e.to_string()))?;

        let tx_id = self.broadcast(call).await?;
        tracing::info!(network = %self.config.network, tx = %tx_id, host = %request.host_id, "scan summary broadcast");

        let mut result = SubmissionResult {
            success: true,
            network: self.config.network.clone(),
            transaction_id: tx_id.clone(),
            content_hash: request.content_hash,
            host_id: request.host_id,
            trust_score: request.trust_score,
            scan_time,
            report_pointer,
            confirmed: false,
            block_or_sequence: None,
            gas_used: None,
            error: None,
            confirmation_error: None,
        };
        if request.wait_for_confirmation {
            match self.wait_for_receipt(&tx_id).await {
                Ok(receipt) if receipt.status == Some(0) => {
                    return Err(LedgerError::TransactionFailed { tx: tx_id, block: receipt.block_number });
                }
                Ok(receipt) => {
                    result.confirmed = true;
                    result.block_or_sequence = receipt.block_number;
                    result.gas_used = receipt.gas_used;
                    tracing::info!(tx = %tx_id, block = ?receipt.block_number, "transaction confirmed");
                }
                Err(reason) => {
                    tracing::warn!(tx = %tx_id, %reason, "confirmation not observed");
                    result.confirmation_error = Some(reason);
                }
            }
        }
        Ok(result)
    }

    async fn broadcast(&self, data: Vec<u8>) -> LedgerResult<String> {
        let from = self.signer.address();
        let chain_id = match self.chain_id {
            Some(id) => id,
            None => self
                .eth
                .chain_id()
                .await
                .map_err(|e| LedgerError::Connection(format!("failed to connect to {}: {}", self.config.rpc_url, e)))?,
        };
        let gas_limit = match self.eth.estimate_gas(from, self.contract, &data).await {
            Ok(estimate) => with_headroom(estimate),
            Err(e) => {
                tracing::warn!(error = %e, fallback = self.config.gas_limit, "gas estimation failed, using configured limit");
                self.config.gas_limit
            }
        };
        let nonce = self
            .eth
            .pending_nonce(from)
            .await
            .map_err(|e| LedgerError::Submission(format!("could not fetch nonce: {}", e)))?;
        let tx = LegacyTransaction {
            nonce,
            gas_price: self.config.gas_price_wei(),
            gas_limit,
            to: self.contract,
            value: 0,
            data,
            chain_id,
        };
        let raw = tx.sign(&self.signer).map_err(|e| LedgerError::Submission(format!("signing failed: {}", e)))?;
        let local = format!("0x{}", hex::encode(transaction_hash(&raw)));
        let tx_id = self
            .eth
            .send_raw(&raw)
            .await
            .map_err(|e| LedgerError::Submission(format!("broadcast rejected: {}", e)))?;
        if !tx_id.eq_ignore_ascii_case(&local) {
            tracing::debug!(%local, remote = %tx_id, "node reported a different transaction hash");
        }
        Ok(tx_id)
    }

    /// Polls until a receipt shows up or the deadline passes. Poll errors
    /// are retried; only the last one is kept for the message.
    async fn wait_for_receipt(&self, tx: &str) -> Result<Receipt, String> {
        let deadline = Instant::now() + self.config.receipt_timeout;
        let mut last_error = None;
        loop {
            match self.eth.receipt(tx).await {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(tx, error = %e, "receipt poll failed");
                    last_error = Some(e.to_string());
                }
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            sleep(self.config.poll_interval.min(deadline - now)).await;
        }
        let mut reason = format!(
            "transaction {} not confirmed within {}s",
            tx,
            self.config.receipt_timeout.as_secs_f64()
        );
        if let Some(e) = last_error {
            reason.push_str(&format!(" (last error: {})", e));
        }
        Err(reason)
    }

    async fn status(&self) -> StatusReport {
        let account = self.signer.address();
        let balance = match self.eth.balance(account).await {
            Ok(b) => b,
            Err(e) => return StatusReport::disconnected(&self.config.network, format!("rpc unavailable: {}", e)),
        };
        let chain_id = match self.chain_id {
            Some(id) => Some(id),
            None => self.eth.chain_id().await.ok(),
        };
        let authorization = match self.authorization {
            Some(flags) => Some(flags),
            None => self.authorization_flags().await.ok(),
        };
        let mut details = detail([
            ("rpc_url", json!(self.config.rpc_url)),
            ("chain_id", json!(chain_id)),
            ("account_address", json!(account.to_checksum())),
            ("contract_address", json!(self.contract.to_checksum())),
            ("balance_wei", json!(balance.to_string())),
            ("balance_eth", json!(balance as f64 / WEI_PER_ETH)),
            ("is_owner", json!(authorization.map(|a| a.is_owner))),
            ("is_publisher", json!(authorization.map(|a| a.is_publisher))),
        ]);
        match self.contract_info().await {
            Ok(info) => details.insert("contract_info".into(), Value::Object(info)),
            Err(e) => details.insert("contract_info_error".into(), json!(e)),
        };
        StatusReport::connected(&self.config.network, details)
    }

    async fn run_diagnostics(&self) -> DiagnosticReport {
        let config = detail([
            ("rpc_url", json!(self.config.rpc_url)),
            ("contract_address", json!(self.contract.to_checksum())),
            ("account_address", json!(self.signer.address().to_checksum())),
            ("gas_limit", json!(self.config.gas_limit)),
            ("gas_price_gwei", json!(self.config.gas_price_gwei)),
        ]);
        let checks = vec![
            DiagnosticCheck::new("rpc_connection", self.check_rpc().boxed()),
            DiagnosticCheck::new("account_balance", self.check_balance().boxed()),
            DiagnosticCheck::new("contract_code", self.check_code().boxed()),
            DiagnosticCheck::new("contract_interface", self.check_interface().boxed()),
            DiagnosticCheck::new("authorization", self.check_authorized().boxed()),
        ];
        run_checks(&self.config.network, config, checks).await
    }

    async fn check_rpc(&self) -> CheckOutcome {
        let chain_id = match self.eth.chain_id().await {
            Ok(id) => id,
            Err(e) => return CheckOutcome::fail(e),
        };
        match self.eth.block_number().await {
            Ok(block) => CheckOutcome::pass(detail([
                ("rpc_url", json!(self.config.rpc_url)),
                ("chain_id", json!(chain_id)),
                ("latest_block", json!(block)),
            ])),
            Err(e) => CheckOutcome::fail_with(detail([("chain_id", json!(chain_id))]), e),
        }
    }

    async fn check_balance(&self) -> CheckOutcome {
        let account = self.signer.address();
        match self.eth.balance(account).await {
            Ok(balance) => CheckOutcome::pass(detail([
                ("account_address", json!(account.to_checksum())),
                ("balance_wei", json!(balance.to_string())),
                ("balance_eth", json!(balance as f64 / WEI_PER_ETH)),
                ("funded", json!(balance > 0)),
            ])),
            Err(e) => CheckOutcome::fail(e),
        }
    }

    async fn check_code(&self) -> CheckOutcome {
        let at = detail([("contract_address", json!(self.contract.to_checksum()))]);
        match self.eth.code(self.contract).await {
            Ok(code) if code.is_empty() => CheckOutcome::fail_with(at, "no contract code at address"),
            Ok(code) => {
                let mut d = at;
                d.insert("code_size".into(), json!(code.len()));
                CheckOutcome::pass(d)
            }
            Err(e) => CheckOutcome::fail(e),
        }
    }

    async fn check_interface(&self) -> CheckOutcome {
        let probes = [
            ("owner", Vec::new()),
            ("authorizedPublishers", vec![Token::Address(self.signer.address())]),
            ("getContractInfo", Vec::new()),
        ];
        let mut results = Map::new();
        let mut any_answered = false;
        for (name, args) in probes {
            let entry = match self.query(name, &args).await {
                Ok(tokens) => {
                    any_answered = true;
                    json!({"success": true, "value": tokens_json(&tokens)})
                }
                Err(e) => json!({"success": false, "error": e.to_string()}),
            };
            results.insert(name.to_string(), entry);
        }
        results.insert("abi_functions".into(), json!(self.abi.function_names()));
        if any_answered {
            CheckOutcome::pass(results)
        } else {
            CheckOutcome::fail_with(results, "contract answered none of the probe functions")
        }
    }

    async fn check_authorized(&self) -> CheckOutcome {
        match self.check_authorization().await {
            Ok(a) => CheckOutcome::pass(detail([
                ("account_address", json!(self.signer.address().to_checksum())),
                ("is_owner", json!(a.is_owner)),
                ("is_publisher", json!(a.is_publisher)),
            ])),
            Err(e) => CheckOutcome::fail(e),
        }
    }
}

/// Estimate plus 20%, rounded up.
fn with_headroom(estimate: u64) -> u64 {
    estimate.saturating_mul(6).saturating_add(4) / 5
}

fn tokens_json(tokens: &[Token]) -> Value {
    match tokens {
        [single] => single.to_json(),
        many => Value::Array(many.iter().map(Token::to_json).collect()),
    }
}

#[async_trait]
impl LedgerBackend for EvmBackend {
    fn network_name(&self) -> &str {
        &self.config.network
    }

    fn time_unit(&self) -> TimeUnit {
        TimeUnit::Seconds
    }

    async fn submit_scan(&self, request: SubmitRequest) -> LedgerResult<SubmissionResult> {
        self.publish(request).await
    }

    async fn get_status(&self) -> StatusReport {
        self.status().await
    }

    async fn diagnose(&self) -> DiagnosticReport {
        self.run_diagnostics().await
    }
}
