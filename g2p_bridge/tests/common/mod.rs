#![allow(dead_code)]

use async_trait::async_trait;
use bank_connectors::{
    BankConnector, BankConnectorFactory, BlockFundsResponse, BlockFundsStatus, CheckFundsResponse, CheckFundsStatus,
    PaymentPayload, PaymentResponse, PaymentStatus,
};
use chrono::NaiveDate;
use sqlx::SqlitePool;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use uuid::Uuid;

use g2p_bridge::api::disbursements::DisbursementPayload;
use g2p_bridge::api::envelopes::EnvelopePayload;
use g2p_bridge::db;
use g2p_bridge::db::disbursement::DisbursementBatchControl;
use g2p_bridge::db::program::BenefitProgramConfiguration;
use g2p_bridge::db::statement::{AccountStatement, AccountStatementLob};

pub const BANK_CODE: &str = "EXAMPLE";
pub const SPONSOR_ACCOUNT: &str = "A1";
pub const CURRENCY: &str = "USD";

pub struct TestContext {
    pub pool: SqlitePool,
    _dir: TempDir,
}

pub async fn setup() -> TestContext {
    let dir = tempfile::tempdir().expect("temp dir");
    let db_path = dir.path().join("bridge.db");
    let url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = db::init_db(&url).await.expect("database init");
    TestContext { pool, _dir: dir }
}

pub async fn seed_program(pool: &SqlitePool, mnemonic: &str, mapper_required: bool) {
    let mut conn = pool.acquire().await.unwrap();
    BenefitProgramConfiguration::create(&mut conn, mnemonic, BANK_CODE, SPONSOR_ACCOUNT, CURRENCY, mapper_required)
        .await
        .unwrap();
}

pub async fn create_envelope(
    pool: &SqlitePool,
    program: &str,
    disbursement_count: i64,
    total_amount: i64,
    schedule_date: NaiveDate,
) -> String {
    let mut payload = EnvelopePayload {
        envelope_id: None,
        program_mnemonic: program.to_string(),
        cycle_code_mnemonic: "CYCLE1".to_string(),
        frequency: "Monthly".to_string(),
        beneficiary_count: disbursement_count,
        disbursement_count,
        total_amount,
        schedule_date,
    };
    g2p_bridge::api::envelopes::create_envelope(pool, &mut payload)
        .await
        .expect("envelope creation");
    payload.envelope_id.expect("assigned envelope id")
}

/// Items are `(beneficiary_id, beneficiary_name, amount)`.
pub async fn create_disbursements(
    pool: &SqlitePool,
    envelope_id: &str,
    items: &[(&str, &str, i64)],
) -> Vec<DisbursementPayload> {
    let mut payloads: Vec<DisbursementPayload> = items
        .iter()
        .map(|(beneficiary_id, name, amount)| DisbursementPayload {
            disbursement_id: None,
            envelope_id: Some(envelope_id.to_string()),
            beneficiary_id: Some(beneficiary_id.to_string()),
            beneficiary_name: Some(name.to_string()),
            amount: Some(*amount),
            narrative: Some("CASH TRANSFER".to_string()),
            response_error_codes: None,
        })
        .collect();
    g2p_bridge::api::disbursements::create_disbursements(pool, &mut payloads)
        .await
        .expect("disbursement ingestion");
    payloads
}

/// Moves the envelope's schedule date, so pipeline stages become eligible
/// without waiting for wall-clock time.
pub async fn set_schedule_date(pool: &SqlitePool, envelope_id: &str, date: NaiveDate) {
    sqlx::query("UPDATE disbursement_envelopes SET schedule_date = ? WHERE envelope_id = ?")
        .bind(date)
        .bind(envelope_id)
        .execute(pool)
        .await
        .unwrap();
}

/// Returns `(mapper_resolution_batch_id, bank_disbursement_batch_id)`.
pub async fn batch_ids_for(pool: &SqlitePool, disbursement_id: &str) -> (String, String) {
    let mut conn = pool.acquire().await.unwrap();
    let control = DisbursementBatchControl::find_by_disbursement_id(&mut conn, disbursement_id)
        .await
        .unwrap()
        .expect("batch control row");
    (control.mapper_resolution_batch_id, control.bank_disbursement_batch_id)
}

pub async fn insert_statement(pool: &SqlitePool, content: &str) -> String {
    let statement_id = Uuid::new_v4().to_string();
    let mut tx = pool.begin().await.unwrap();
    AccountStatement::create(&mut tx, &statement_id).await.unwrap();
    AccountStatementLob::create(&mut tx, &statement_id, content).await.unwrap();
    tx.commit().await.unwrap();
    statement_id
}

pub fn single_factory(connector: Arc<dyn BankConnector>) -> Arc<BankConnectorFactory> {
    Arc::new(BankConnectorFactory::new().register(BANK_CODE, connector))
}

/// Scripted bank double. Responses are consumed in FIFO order; an empty
/// queue yields a success-shaped default so happy-path tests stay short.
/// Statement field extraction follows the example bank's conventions.
pub struct MockBank {
    check_responses: Mutex<VecDeque<CheckFundsResponse>>,
    block_responses: Mutex<VecDeque<BlockFundsResponse>>,
    payment_responses: Mutex<VecDeque<PaymentResponse>>,
    pub payment_calls: Mutex<Vec<Vec<PaymentPayload>>>,
}

impl MockBank {
    pub fn new() -> Self {
        Self {
            check_responses: Mutex::new(VecDeque::new()),
            block_responses: Mutex::new(VecDeque::new()),
            payment_responses: Mutex::new(VecDeque::new()),
            payment_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn queue_check(&self, status: CheckFundsStatus, error_code: &str) {
        self.check_responses.lock().unwrap().push_back(CheckFundsResponse {
            status,
            error_code: error_code.to_string(),
        });
    }

    pub fn queue_block(&self, status: BlockFundsStatus, block_reference_no: &str, error_code: &str) {
        self.block_responses.lock().unwrap().push_back(BlockFundsResponse {
            status,
            block_reference_no: block_reference_no.to_string(),
            error_code: error_code.to_string(),
        });
    }

    pub fn queue_payment(&self, status: PaymentStatus, error_code: &str) {
        self.payment_responses.lock().unwrap().push_back(PaymentResponse {
            status,
            error_code: error_code.to_string(),
            ack_reference_no: String::new(),
        });
    }
}

#[async_trait]
impl BankConnector for MockBank {
    async fn check_funds(&self, _account_number: &str, _currency: &str, _amount: i64) -> CheckFundsResponse {
        self.check_responses.lock().unwrap().pop_front().unwrap_or(CheckFundsResponse {
            status: CheckFundsStatus::Available,
            error_code: String::new(),
        })
    }

    async fn block_funds(&self, _account_number: &str, _currency: &str, _amount: i64) -> BlockFundsResponse {
        self.block_responses.lock().unwrap().pop_front().unwrap_or(BlockFundsResponse {
            status: BlockFundsStatus::BlockSuccess,
            block_reference_no: "BLOCK-REF".to_string(),
            error_code: String::new(),
        })
    }

    async fn initiate_payment(&self, payloads: &[PaymentPayload]) -> PaymentResponse {
        self.payment_calls.lock().unwrap().push(payloads.to_vec());
        self.payment_responses.lock().unwrap().pop_front().unwrap_or(PaymentResponse {
            status: PaymentStatus::Success,
            error_code: String::new(),
            ack_reference_no: String::new(),
        })
    }

    fn retrieve_disbursement_id(
        &self,
        _bank_reference: &str,
        customer_reference: &str,
        _narratives: &[String],
    ) -> Option<String> {
        if customer_reference.is_empty() {
            None
        } else {
            Some(customer_reference.to_string())
        }
    }

    fn retrieve_beneficiary_name(&self, narratives: &[String]) -> Option<String> {
        narratives.first().cloned()
    }

    fn retrieve_reversal_reason(&self, narratives: &[String]) -> Option<String> {
        narratives.get(1).cloned()
    }
}
