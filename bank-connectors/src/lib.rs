pub mod example_bank;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use example_bank::{ExampleBankConnector, ExampleBankEndpoints};

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("No bank connector registered for sponsor bank code '{0}'")]
    UnknownBankCode(String),
    #[error("Invalid connector endpoint URL: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckFundsStatus {
    Available,
    NotAvailable,
    PendingCheck,
}

#[derive(Debug, Clone)]
pub struct CheckFundsResponse {
    pub status: CheckFundsStatus,
    pub error_code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockFundsStatus {
    BlockSuccess,
    BlockFailure,
}

#[derive(Debug, Clone)]
pub struct BlockFundsResponse {
    pub status: BlockFundsStatus,
    pub block_reference_no: String,
    pub error_code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct PaymentResponse {
    pub status: PaymentStatus,
    pub error_code: String,
    pub ack_reference_no: String,
}

/// One beneficiary line of a payment instruction. Amounts are minor units.
/// Beneficiary address fields are populated from mapper resolution when it
/// ran; a bank may accept instructions addressed by beneficiary ID alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentPayload {
    pub disbursement_id: String,
    pub remitting_account: String,
    pub remitting_account_currency: String,
    pub payment_amount: i64,
    pub funds_blocked_reference_number: String,

    pub beneficiary_id: String,
    pub beneficiary_name: Option<String>,

    pub beneficiary_account: Option<String>,
    pub beneficiary_account_currency: Option<String>,
    pub beneficiary_account_type: Option<String>,
    pub beneficiary_bank_code: Option<String>,
    pub beneficiary_branch_code: Option<String>,

    pub beneficiary_phone_no: Option<String>,
    pub beneficiary_mobile_wallet_provider: Option<String>,

    pub beneficiary_email: Option<String>,
    pub beneficiary_email_wallet_provider: Option<String>,

    pub narrative: Option<String>,
    pub program_mnemonic: Option<String>,
    pub cycle_code_mnemonic: Option<String>,
    pub payment_date: DateTime<Utc>,
}

/// Uniform capability surface over a sponsor bank.
///
/// The three instruction methods fold transport failures into their status
/// enums so a worker never has to unwind across the connector boundary; the
/// three retrieve methods extract reconciliation fields from MT940 statement
/// lines using whatever convention the bank follows.
#[async_trait]
pub trait BankConnector: Send + Sync {
    async fn check_funds(&self, account_number: &str, currency: &str, amount: i64) -> CheckFundsResponse;

    async fn block_funds(&self, account_number: &str, currency: &str, amount: i64) -> BlockFundsResponse;

    async fn initiate_payment(&self, payloads: &[PaymentPayload]) -> PaymentResponse;

    fn retrieve_disbursement_id(
        &self,
        bank_reference: &str,
        customer_reference: &str,
        narratives: &[String],
    ) -> Option<String>;

    fn retrieve_beneficiary_name(&self, narratives: &[String]) -> Option<String>;

    fn retrieve_reversal_reason(&self, narratives: &[String]) -> Option<String>;
}

/// Process-wide registry of connectors keyed by sponsor bank code.
/// Populated once at startup; read-only afterwards.
pub struct BankConnectorFactory {
    connectors: HashMap<String, Arc<dyn BankConnector>>,
}

impl BankConnectorFactory {
    pub fn new() -> Self {
        Self {
            connectors: HashMap::new(),
        }
    }

    pub fn register(mut self, sponsor_bank_code: &str, connector: Arc<dyn BankConnector>) -> Self {
        self.connectors.insert(sponsor_bank_code.to_string(), connector);
        self
    }

    pub fn get(&self, sponsor_bank_code: &str) -> Result<Arc<dyn BankConnector>, ConnectorError> {
        self.connectors
            .get(sponsor_bank_code)
            .cloned()
            .ok_or_else(|| ConnectorError::UnknownBankCode(sponsor_bank_code.to_string()))
    }
}

impl Default for BankConnectorFactory {
    fn default() -> Self {
        Self::new()
    }
}
