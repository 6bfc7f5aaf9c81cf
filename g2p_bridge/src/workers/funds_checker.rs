use bank_connectors::{BankConnectorFactory, CheckFundsStatus};
use chrono::Utc;
use log::{error, info};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::time::{self, Duration};

use crate::db::CancellationStatus;
use crate::db::envelope::{DisbursementEnvelope, EnvelopeBatchStatus, FundsAvailableStatus};
use crate::db::program::BenefitProgramConfiguration;

const DEFAULT_SLEEP_SECS: u64 = 30;

pub async fn run(
    db_pool: SqlitePool,
    connectors: Arc<BankConnectorFactory>,
    max_attempts: i64,
    sleep_secs: Option<u64>,
) {
    let sleep_secs = sleep_secs.unwrap_or(DEFAULT_SLEEP_SECS);
    info!("Fund availability checker started. Cycle interval: {}s.", sleep_secs);

    let mut interval = time::interval(Duration::from_secs(sleep_secs));

    loop {
        interval.tick().await;
        if let Err(e) = process_cycle(&db_pool, &connectors, max_attempts).await {
            error!("Fund availability checker cycle error: {:?}", e);
        }
    }
}

async fn process_cycle(
    db_pool: &SqlitePool,
    connectors: &BankConnectorFactory,
    max_attempts: i64,
) -> Result<(), anyhow::Error> {
    let mut conn = db_pool.acquire().await?;
    let today = Utc::now().date_naive();
    let envelopes = DisbursementEnvelope::find_fund_check_eligible(&mut conn, today, max_attempts).await?;
    drop(conn);

    if !envelopes.is_empty() {
        info!("Found {} envelopes due for fund availability check.", envelopes.len());
    }

    for envelope in envelopes {
        if let Err(e) = check_envelope(db_pool, connectors, &envelope.envelope_id, max_attempts).await {
            error!(
                "Fund availability check failed for envelope {}: {:?}",
                envelope.envelope_id, e
            );
        }
    }

    Ok(())
}

/// Checks fund availability for one envelope. Re-reads the envelope and its
/// batch status and re-checks the stage predicate before calling the bank,
/// so a duplicate dispatch under restart becomes a no-op.
pub async fn check_envelope(
    db_pool: &SqlitePool,
    connectors: &BankConnectorFactory,
    envelope_id: &str,
    max_attempts: i64,
) -> Result<(), anyhow::Error> {
    let mut conn = db_pool.acquire().await?;

    let Some(envelope) = DisbursementEnvelope::find_by_id(&mut conn, envelope_id).await? else {
        return Ok(());
    };
    let Some(batch_status) = EnvelopeBatchStatus::find_by_envelope_id(&mut conn, envelope_id).await? else {
        return Ok(());
    };

    let today = Utc::now().date_naive();
    if envelope.cancellation_status == CancellationStatus::Cancelled
        || envelope.schedule_date >= today
        || batch_status.received_count != envelope.disbursement_count
        || batch_status.received_amount != envelope.total_amount
        || !batch_status.fund_check_pending(max_attempts)
    {
        return Ok(());
    }

    let program = BenefitProgramConfiguration::find_by_mnemonic(&mut conn, &envelope.program_mnemonic)
        .await?
        .ok_or_else(|| anyhow::anyhow!("No program configuration for '{}'", envelope.program_mnemonic))?;
    drop(conn);

    let connector = connectors.get(&program.sponsor_bank_code)?;
    let response = connector
        .check_funds(
            &program.sponsor_bank_account_number,
            &program.sponsor_bank_account_currency,
            envelope.total_amount,
        )
        .await;

    let status = match response.status {
        CheckFundsStatus::Available => FundsAvailableStatus::Available,
        CheckFundsStatus::NotAvailable => FundsAvailableStatus::NotAvailable,
        CheckFundsStatus::PendingCheck => FundsAvailableStatus::PendingCheck,
    };
    let error_code = if response.error_code.is_empty() {
        None
    } else {
        Some(response.error_code.as_str())
    };

    let mut tx = db_pool.begin().await?;
    EnvelopeBatchStatus::record_funds_check(&mut tx, envelope_id, status, error_code).await?;
    tx.commit().await?;

    info!(
        target: "audit",
        "Fund availability recorded for envelope {}: {:?}",
        envelope_id, status
    );

    Ok(())
}
