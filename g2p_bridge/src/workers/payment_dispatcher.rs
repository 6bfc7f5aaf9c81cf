use bank_connectors::{BankConnectorFactory, PaymentPayload, PaymentStatus};
use chrono::Utc;
use log::{error, info, warn};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::time::{self, Duration};

use crate::db::envelope::{DisbursementEnvelope, EnvelopeBatchStatus, FundsBlockedStatus};
use crate::db::program::BenefitProgramConfiguration;
use crate::db::{
    CancellationStatus, ProcessStatus,
    disbursement::{BankDisbursementBatchStatus, Disbursement, DisbursementBatchControl, MapperResolutionDetails},
};
use crate::utils::log::mask_amount;

const DEFAULT_SLEEP_SECS: u64 = 30;

pub async fn run(
    db_pool: SqlitePool,
    connectors: Arc<BankConnectorFactory>,
    max_attempts: i64,
    sleep_secs: Option<u64>,
) {
    let sleep_secs = sleep_secs.unwrap_or(DEFAULT_SLEEP_SECS);
    info!("Payment dispatcher started. Cycle interval: {}s.", sleep_secs);

    let mut interval = time::interval(Duration::from_secs(sleep_secs));

    loop {
        interval.tick().await;
        if let Err(e) = process_cycle(&db_pool, &connectors, max_attempts).await {
            error!("Payment dispatcher cycle error: {:?}", e);
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
    let envelopes = DisbursementEnvelope::find_dispatch_eligible(&mut conn, today).await?;

    let mut batch_ids = Vec::new();
    for envelope in &envelopes {
        let batches =
            BankDisbursementBatchStatus::find_pending_for_envelope(&mut conn, &envelope.envelope_id, max_attempts)
                .await?;
        batch_ids.extend(batches.into_iter().map(|b| b.batch_id));
    }
    drop(conn);

    if !batch_ids.is_empty() {
        info!("Found {} bank disbursement batches to dispatch.", batch_ids.len());
    }

    for batch_id in batch_ids {
        if let Err(e) = dispatch_batch(db_pool, connectors, &batch_id, max_attempts).await {
            error!("Payment dispatch failed for batch {}: {:?}", batch_id, e);
        }
    }

    Ok(())
}

/// Dispatches one bank batch as a single indivisible payment instruction.
/// The success effect (batch PROCESSED + shipped counter) commits in one
/// transaction that re-checks the batch is still PENDING, so a duplicate
/// dispatch cannot double-count.
pub async fn dispatch_batch(
    db_pool: &SqlitePool,
    connectors: &BankConnectorFactory,
    batch_id: &str,
    max_attempts: i64,
) -> Result<(), anyhow::Error> {
    let mut conn = db_pool.acquire().await?;

    let Some(batch_status) = BankDisbursementBatchStatus::find_by_id(&mut conn, batch_id).await? else {
        return Ok(());
    };
    if batch_status.status != ProcessStatus::Pending || batch_status.attempts >= max_attempts {
        return Ok(());
    }

    let envelope_id = batch_status.envelope_id.clone();
    let Some(envelope) = DisbursementEnvelope::find_by_id(&mut conn, &envelope_id).await? else {
        return Ok(());
    };
    let Some(envelope_batch_status) = EnvelopeBatchStatus::find_by_envelope_id(&mut conn, &envelope_id).await? else {
        return Ok(());
    };

    if envelope.cancellation_status == CancellationStatus::Cancelled
        || envelope_batch_status.funds_blocked_status != FundsBlockedStatus::BlockSuccess
    {
        return Ok(());
    }

    let block_reference = envelope_batch_status.block_reference_no.clone().unwrap_or_default();

    let program = BenefitProgramConfiguration::find_by_mnemonic(&mut conn, &envelope.program_mnemonic)
        .await?
        .ok_or_else(|| anyhow::anyhow!("No program configuration for '{}'", envelope.program_mnemonic))?;

    let controls = DisbursementBatchControl::find_by_bank_batch(&mut conn, batch_id).await?;
    let disbursement_ids: Vec<String> = controls.iter().map(|c| c.disbursement_id.clone()).collect();
    let disbursements = Disbursement::find_by_ids(&mut conn, &disbursement_ids).await?;

    let mut payloads = Vec::new();
    for disbursement in disbursements
        .iter()
        .filter(|d| d.cancellation_status == CancellationStatus::NotCancelled)
    {
        let mapper_details =
            MapperResolutionDetails::find_by_disbursement_id(&mut conn, &disbursement.disbursement_id).await?;

        payloads.push(build_payment_payload(
            disbursement,
            mapper_details.as_ref(),
            &envelope,
            &program,
            &block_reference,
        ));
    }
    drop(conn);

    if payloads.is_empty() {
        return Ok(());
    }

    let shipped = payloads.len() as i64;
    let connector = connectors.get(&program.sponsor_bank_code)?;
    let response = connector.initiate_payment(&payloads).await;

    match response.status {
        PaymentStatus::Success => {
            let mut tx = db_pool.begin().await?;
            let current = BankDisbursementBatchStatus::find_by_id(&mut tx, batch_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Bank batch {} disappeared mid-dispatch", batch_id))?;
            if current.status == ProcessStatus::Pending {
                BankDisbursementBatchStatus::mark_processed(&mut tx, batch_id).await?;
                EnvelopeBatchStatus::add_shipped(&mut tx, &envelope_id, shipped).await?;
            }
            tx.commit().await?;

            info!(
                target: "audit",
                "Payment dispatched. Batch: {}, Envelope: {}, Disbursements: {}, Total: {}",
                batch_id,
                envelope_id,
                shipped,
                mask_amount(payloads.iter().map(|p| p.payment_amount).sum())
            );
        },
        PaymentStatus::Error => {
            warn!("Payment dispatch rejected for batch {}: {}", batch_id, response.error_code);
            let mut conn = db_pool.acquire().await?;
            BankDisbursementBatchStatus::record_failure(&mut conn, batch_id, &response.error_code).await?;
        },
    }

    Ok(())
}

fn build_payment_payload(
    disbursement: &Disbursement,
    mapper_details: Option<&MapperResolutionDetails>,
    envelope: &DisbursementEnvelope,
    program: &BenefitProgramConfiguration,
    block_reference: &str,
) -> PaymentPayload {
    PaymentPayload {
        disbursement_id: disbursement.disbursement_id.clone(),
        remitting_account: program.sponsor_bank_account_number.clone(),
        remitting_account_currency: program.sponsor_bank_account_currency.clone(),
        payment_amount: disbursement.amount,
        funds_blocked_reference_number: block_reference.to_string(),
        beneficiary_id: disbursement.beneficiary_id.clone(),
        beneficiary_name: Some(disbursement.beneficiary_name.clone()),
        beneficiary_account: mapper_details.and_then(|d| d.account_number.clone()),
        beneficiary_account_currency: mapper_details.map(|_| program.sponsor_bank_account_currency.clone()),
        beneficiary_account_type: mapper_details.and_then(|d| d.fa_type).map(|t| t.prefix().to_string()),
        beneficiary_bank_code: mapper_details.and_then(|d| d.bank_code.clone()),
        beneficiary_branch_code: mapper_details.and_then(|d| d.branch_code.clone()),
        beneficiary_phone_no: mapper_details.and_then(|d| d.mobile_number.clone()),
        beneficiary_mobile_wallet_provider: mapper_details.and_then(|d| d.mobile_wallet_provider.clone()),
        beneficiary_email: mapper_details.and_then(|d| d.email_address.clone()),
        beneficiary_email_wallet_provider: mapper_details.and_then(|d| d.email_wallet_provider.clone()),
        narrative: Some(disbursement.narrative.clone()),
        program_mnemonic: Some(envelope.program_mnemonic.clone()),
        cycle_code_mnemonic: Some(envelope.cycle_code_mnemonic.clone()),
        payment_date: Utc::now(),
    }
}
