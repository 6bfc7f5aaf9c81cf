use bank_connectors::{BankConnector, BankConnectorFactory};
use log::{error, info, warn};
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tokio::time::{self, Duration};

use crate::db::ProcessStatus;
use crate::db::disbursement::DisbursementBatchControl;
use crate::db::envelope::EnvelopeBatchStatus;
use crate::db::program::BenefitProgramConfiguration;
use crate::db::statement::{
    AccountStatement, AccountStatementLob, DisbursementErrorRecon, DisbursementRecon, NewDebitRecon, NewErrorRecon,
    ReversalUpdate,
};
use crate::errors::BridgeErrorCode;
use crate::mt940::{self, Mt940Statement, Mt940Transaction};

const DEFAULT_SLEEP_SECS: u64 = 60;

pub async fn run(
    db_pool: SqlitePool,
    connectors: Arc<BankConnectorFactory>,
    max_attempts: i64,
    sleep_secs: Option<u64>,
) {
    let sleep_secs = sleep_secs.unwrap_or(DEFAULT_SLEEP_SECS);
    info!("Statement processor started. Cycle interval: {}s.", sleep_secs);

    let mut interval = time::interval(Duration::from_secs(sleep_secs));

    loop {
        interval.tick().await;
        if let Err(e) = process_cycle(&db_pool, &connectors, max_attempts).await {
            error!("Statement processor cycle error: {:?}", e);
        }
    }
}

async fn process_cycle(
    db_pool: &SqlitePool,
    connectors: &BankConnectorFactory,
    max_attempts: i64,
) -> Result<(), anyhow::Error> {
    let mut conn = db_pool.acquire().await?;
    let statements = AccountStatement::find_pending(&mut conn, max_attempts).await?;
    drop(conn);

    if !statements.is_empty() {
        info!("Found {} account statements to reconcile.", statements.len());
    }

    for statement in statements {
        if let Err(e) = process_statement(db_pool, connectors, &statement.statement_id, max_attempts).await {
            error!("Statement processing failed for {}: {:?}", statement.statement_id, e);
        }
    }

    Ok(())
}

/// Reconciles one uploaded MT940 statement. Parse failures leave the
/// statement PENDING for retry; an account the bridge does not sponsor
/// marks it ERROR terminally. Per-transaction mismatches become error recon
/// rows and never fail the statement.
pub async fn process_statement(
    db_pool: &SqlitePool,
    connectors: &BankConnectorFactory,
    statement_id: &str,
    max_attempts: i64,
) -> Result<(), anyhow::Error> {
    let mut conn = db_pool.acquire().await?;

    let Some(statement) = AccountStatement::find_by_id(&mut conn, statement_id).await? else {
        return Ok(());
    };
    if statement.process_status != ProcessStatus::Pending || statement.process_attempts >= max_attempts {
        return Ok(());
    }
    let Some(lob) = AccountStatementLob::find_by_statement_id(&mut conn, statement_id).await? else {
        return Ok(());
    };

    let parsed = match mt940::parse(&lob.statement_lob) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("MT940 parse failed for statement {}: {}", statement_id, e);
            AccountStatement::mark_retry(&mut conn, statement_id, BridgeErrorCode::StatementParseError).await?;
            return Ok(());
        },
    };

    let program = BenefitProgramConfiguration::find_by_account_number(&mut conn, &parsed.account_identification).await?;
    let Some(program) = program else {
        warn!(
            "Statement {} names account '{}' which no program sponsors.",
            statement_id, parsed.account_identification
        );
        AccountStatement::update_header(
            &mut conn,
            statement_id,
            &parsed.account_identification,
            &parsed.transaction_reference,
            &parsed.statement_number,
            &parsed.sequence_number,
        )
        .await?;
        AccountStatement::mark_error(&mut conn, statement_id, BridgeErrorCode::InvalidAccountNumber).await?;
        return Ok(());
    };
    drop(conn);

    let connector = connectors.get(&program.sponsor_bank_code)?;

    match reconcile_statement(db_pool, connector.as_ref(), statement_id, &parsed).await {
        Ok(recon_count) => {
            info!(
                target: "audit",
                "Statement {} reconciled. Statement number: {}, Entries: {}",
                statement_id, parsed.statement_number, recon_count
            );
            Ok(())
        },
        Err(e) => {
            warn!("Reconciliation failed for statement {}: {:?}", statement_id, e);
            let mut conn = db_pool.acquire().await?;
            AccountStatement::mark_retry(&mut conn, statement_id, BridgeErrorCode::StatementParseError).await?;
            Ok(())
        },
    }
}

/// Writes every recon outcome of the statement and its PROCESSED mark in a
/// single transaction.
async fn reconcile_statement(
    db_pool: &SqlitePool,
    connector: &dyn BankConnector,
    statement_id: &str,
    parsed: &Mt940Statement,
) -> Result<usize, anyhow::Error> {
    let mut tx = db_pool.begin().await?;

    AccountStatement::update_header(
        &mut tx,
        statement_id,
        &parsed.account_identification,
        &parsed.transaction_reference,
        &parsed.statement_number,
        &parsed.sequence_number,
    )
    .await?;

    let mut entry_sequence = 0i64;
    let mut recon_count = 0usize;
    for transaction in parsed
        .transactions
        .iter()
        .filter(|t| t.indicator == "D" || t.indicator == "RD")
    {
        entry_sequence += 1;
        reconcile_transaction(&mut tx, connector, parsed, transaction, entry_sequence).await?;
        recon_count += 1;
    }

    AccountStatement::mark_processed(&mut tx, statement_id).await?;
    tx.commit().await?;

    Ok(recon_count)
}

async fn reconcile_transaction(
    conn: &mut SqliteConnection,
    connector: &dyn BankConnector,
    parsed: &Mt940Statement,
    transaction: &Mt940Transaction,
    entry_sequence: i64,
) -> Result<(), anyhow::Error> {
    let disbursement_id = connector.retrieve_disbursement_id(
        &transaction.bank_reference,
        &transaction.customer_reference,
        &transaction.narratives,
    );

    let control = match &disbursement_id {
        Some(id) => DisbursementBatchControl::find_by_disbursement_id(conn, id).await?,
        None => None,
    };

    let Some(control) = control else {
        DisbursementErrorRecon::create(
            conn,
            &error_recon(parsed, transaction, entry_sequence, disbursement_id, BridgeErrorCode::InvalidDisbursementId),
        )
        .await?;
        return Ok(());
    };

    let existing = DisbursementRecon::find_by_disbursement_id(conn, &control.disbursement_id).await?;

    match (transaction.indicator.as_str(), existing) {
        ("D", Some(_)) => {
            DisbursementErrorRecon::create(
                conn,
                &error_recon(
                    parsed,
                    transaction,
                    entry_sequence,
                    disbursement_id,
                    BridgeErrorCode::DuplicateDisbursement,
                ),
            )
            .await?;
        },
        ("RD", None) => {
            DisbursementErrorRecon::create(
                conn,
                &error_recon(parsed, transaction, entry_sequence, disbursement_id, BridgeErrorCode::InvalidReversal),
            )
            .await?;
        },
        ("D", None) => {
            DisbursementRecon::insert_debit(
                conn,
                &NewDebitRecon {
                    disbursement_id: control.disbursement_id.clone(),
                    bank_disbursement_batch_id: control.bank_disbursement_batch_id.clone(),
                    beneficiary_name_from_bank: connector.retrieve_beneficiary_name(&transaction.narratives),
                    remittance_reference_number: if transaction.bank_reference.is_empty() {
                        None
                    } else {
                        Some(transaction.bank_reference.clone())
                    },
                    remittance_statement_number: parsed.statement_number.clone(),
                    remittance_statement_sequence: parsed.sequence_number.clone(),
                    remittance_entry_sequence: entry_sequence,
                    remittance_entry_date: transaction.entry_date,
                    remittance_value_date: transaction.value_date,
                },
            )
            .await?;
            EnvelopeBatchStatus::add_succeeded(conn, &control.envelope_id, 1).await?;
        },
        ("RD", Some(_)) => {
            DisbursementRecon::apply_reversal(
                conn,
                &control.disbursement_id,
                &ReversalUpdate {
                    reversal_statement_number: parsed.statement_number.clone(),
                    reversal_statement_sequence: parsed.sequence_number.clone(),
                    reversal_entry_sequence: entry_sequence,
                    reversal_entry_date: transaction.entry_date,
                    reversal_value_date: transaction.value_date,
                    reversal_reason: connector.retrieve_reversal_reason(&transaction.narratives),
                },
            )
            .await?;
            EnvelopeBatchStatus::add_failed(conn, &control.envelope_id, 1).await?;
        },
        _ => {},
    }

    Ok(())
}

fn error_recon(
    parsed: &Mt940Statement,
    transaction: &Mt940Transaction,
    entry_sequence: i64,
    disbursement_id: Option<String>,
    error_reason: BridgeErrorCode,
) -> NewErrorRecon {
    NewErrorRecon {
        disbursement_id,
        bank_reference_number: if transaction.bank_reference.is_empty() {
            None
        } else {
            Some(transaction.bank_reference.clone())
        },
        statement_number: parsed.statement_number.clone(),
        statement_sequence: parsed.sequence_number.clone(),
        entry_sequence,
        entry_date: transaction.entry_date,
        value_date: transaction.value_date,
        error_reason,
    }
}
