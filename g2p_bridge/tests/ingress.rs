mod common;

use chrono::{Duration, Utc};
use common::*;
use g2p_bridge::api::ServiceError;
use g2p_bridge::api::disbursements::{self, DisbursementPayload};
use g2p_bridge::api::envelopes;
use g2p_bridge::db::envelope::{DisbursementEnvelope, EnvelopeBatchStatus, FundsAvailableStatus, FundsBlockedStatus};
use g2p_bridge::db::{CancellationStatus, disbursement::Disbursement};
use g2p_bridge::errors::BridgeErrorCode;

async fn count(pool: &sqlx::SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn envelope_creation_initializes_batch_status() {
    let ctx = setup().await;
    seed_program(&ctx.pool, "PRG1", true).await;

    let schedule = Utc::now().date_naive() + Duration::days(1);
    let envelope_id = create_envelope(&ctx.pool, "PRG1", 2, 10_000, schedule).await;

    let mut conn = ctx.pool.acquire().await.unwrap();
    let envelope = DisbursementEnvelope::find_by_id(&mut conn, &envelope_id)
        .await
        .unwrap()
        .expect("envelope row");
    assert_eq!(envelope.disbursement_count, 2);
    assert_eq!(envelope.total_amount, 10_000);
    assert_eq!(envelope.cancellation_status, CancellationStatus::NotCancelled);

    let status = EnvelopeBatchStatus::find_by_envelope_id(&mut conn, &envelope_id)
        .await
        .unwrap()
        .expect("batch status row");
    assert_eq!(status.received_count, 0);
    assert_eq!(status.received_amount, 0);
    assert_eq!(status.shipped_count, 0);
    assert_eq!(status.funds_available_status, FundsAvailableStatus::PendingCheck);
    assert_eq!(status.funds_blocked_status, FundsBlockedStatus::PendingCheck);
    assert_eq!(status.funds_available_attempts, 0);
    assert!(status.id_mapper_resolution_required);
}

#[tokio::test]
async fn envelope_creation_requires_a_configured_program() {
    let ctx = setup().await;

    let mut payload = g2p_bridge::api::envelopes::EnvelopePayload {
        envelope_id: None,
        program_mnemonic: "UNKNOWN".to_string(),
        cycle_code_mnemonic: "CYCLE1".to_string(),
        frequency: "Monthly".to_string(),
        beneficiary_count: 1,
        disbursement_count: 1,
        total_amount: 100,
        schedule_date: Utc::now().date_naive(),
    };
    let err = envelopes::create_envelope(&ctx.pool, &mut payload).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Bridge(BridgeErrorCode::InvalidProgramMnemonic)
    ));
    assert_eq!(count(&ctx.pool, "disbursement_envelopes").await, 0);
}

#[tokio::test]
async fn disbursement_ingestion_updates_counters_and_creates_batches() {
    let ctx = setup().await;
    seed_program(&ctx.pool, "PRG1", true).await;
    let schedule = Utc::now().date_naive() + Duration::days(1);
    let envelope_id = create_envelope(&ctx.pool, "PRG1", 2, 10_000, schedule).await;

    let payloads = create_disbursements(&ctx.pool, &envelope_id, &[("B1", "Jane Doe", 6_000), ("B2", "John Doe", 4_000)]).await;
    assert!(payloads.iter().all(|p| p.disbursement_id.is_some()));

    let mut conn = ctx.pool.acquire().await.unwrap();
    let status = EnvelopeBatchStatus::find_by_envelope_id(&mut conn, &envelope_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.received_count, 2);
    assert_eq!(status.received_amount, 10_000);

    // Both rows share one mapper batch and one bank batch.
    let first = payloads[0].disbursement_id.as_deref().unwrap();
    let second = payloads[1].disbursement_id.as_deref().unwrap();
    let (mapper_a, bank_a) = batch_ids_for(&ctx.pool, first).await;
    let (mapper_b, bank_b) = batch_ids_for(&ctx.pool, second).await;
    assert_eq!(mapper_a, mapper_b);
    assert_eq!(bank_a, bank_b);

    assert_eq!(count(&ctx.pool, "bank_disbursement_batch_statuses").await, 1);
    assert_eq!(count(&ctx.pool, "mapper_resolution_batch_statuses").await, 1);
}

#[tokio::test]
async fn mapper_batch_is_skipped_when_resolution_not_required() {
    let ctx = setup().await;
    seed_program(&ctx.pool, "PRG2", false).await;
    let schedule = Utc::now().date_naive() + Duration::days(1);
    let envelope_id = create_envelope(&ctx.pool, "PRG2", 1, 100, schedule).await;

    create_disbursements(&ctx.pool, &envelope_id, &[("B1", "Jane Doe", 100)]).await;

    assert_eq!(count(&ctx.pool, "bank_disbursement_batch_statuses").await, 1);
    assert_eq!(count(&ctx.pool, "mapper_resolution_batch_statuses").await, 0);
}

#[tokio::test]
async fn count_quota_rejection_writes_nothing() {
    let ctx = setup().await;
    seed_program(&ctx.pool, "PRG1", true).await;
    let schedule = Utc::now().date_naive() + Duration::days(1);
    let envelope_id = create_envelope(&ctx.pool, "PRG1", 1, 5_000, schedule).await;

    let mut payloads = vec![
        disbursement_payload(&envelope_id, "B1", 3_000),
        disbursement_payload(&envelope_id, "B2", 3_000),
    ];
    let err = disbursements::create_disbursements(&ctx.pool, &mut payloads)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Bridge(BridgeErrorCode::NoOfDisbursementsExceedsDeclared)
    ));

    assert_eq!(count(&ctx.pool, "disbursements").await, 0);
    assert_eq!(count(&ctx.pool, "bank_disbursement_batch_statuses").await, 0);
    let mut conn = ctx.pool.acquire().await.unwrap();
    let status = EnvelopeBatchStatus::find_by_envelope_id(&mut conn, &envelope_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.received_count, 0);
    assert_eq!(status.received_amount, 0);
}

#[tokio::test]
async fn amount_quota_rejection_when_count_fits() {
    let ctx = setup().await;
    seed_program(&ctx.pool, "PRG1", true).await;
    let schedule = Utc::now().date_naive() + Duration::days(1);
    let envelope_id = create_envelope(&ctx.pool, "PRG1", 2, 5_000, schedule).await;

    let mut payloads = vec![
        disbursement_payload(&envelope_id, "B1", 3_000),
        disbursement_payload(&envelope_id, "B2", 3_000),
    ];
    let err = disbursements::create_disbursements(&ctx.pool, &mut payloads)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Bridge(BridgeErrorCode::TotalDisbursementAmountExceedsDeclared)
    ));
    assert_eq!(count(&ctx.pool, "disbursements").await, 0);
}

#[tokio::test]
async fn invalid_payloads_reject_the_whole_batch_with_per_payload_codes() {
    let ctx = setup().await;
    seed_program(&ctx.pool, "PRG1", true).await;
    let schedule = Utc::now().date_naive() + Duration::days(1);
    let envelope_id = create_envelope(&ctx.pool, "PRG1", 2, 10_000, schedule).await;

    let mut bad = disbursement_payload(&envelope_id, "B2", 0);
    bad.beneficiary_name = Some(String::new());
    let mut payloads = vec![disbursement_payload(&envelope_id, "B1", 1_000), bad];

    let err = disbursements::create_disbursements(&ctx.pool, &mut payloads)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Bridge(BridgeErrorCode::InvalidDisbursementPayload)
    ));

    assert!(payloads[0].response_error_codes.is_none());
    let codes = payloads[1].response_error_codes.as_ref().unwrap();
    assert!(codes.contains(&BridgeErrorCode::InvalidDisbursementAmount));
    assert!(codes.contains(&BridgeErrorCode::InvalidBeneficiaryName));

    assert_eq!(count(&ctx.pool, "disbursements").await, 0);
}

#[tokio::test]
async fn batches_spanning_envelopes_are_rejected() {
    let ctx = setup().await;
    seed_program(&ctx.pool, "PRG1", true).await;
    let schedule = Utc::now().date_naive() + Duration::days(1);
    let envelope_a = create_envelope(&ctx.pool, "PRG1", 1, 1_000, schedule).await;
    let envelope_b = create_envelope(&ctx.pool, "PRG1", 1, 1_000, schedule).await;

    let mut payloads = vec![
        disbursement_payload(&envelope_a, "B1", 1_000),
        disbursement_payload(&envelope_b, "B2", 1_000),
    ];
    let err = disbursements::create_disbursements(&ctx.pool, &mut payloads)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Bridge(BridgeErrorCode::MultipleEnvelopesFound)
    ));
}

#[tokio::test]
async fn cancelling_a_disbursement_restores_the_counters() {
    let ctx = setup().await;
    seed_program(&ctx.pool, "PRG1", true).await;
    let schedule = Utc::now().date_naive() + Duration::days(5);
    let envelope_id = create_envelope(&ctx.pool, "PRG1", 1, 1_000, schedule).await;
    let mut payloads = create_disbursements(&ctx.pool, &envelope_id, &[("B1", "Jane Doe", 1_000)]).await;

    disbursements::cancel_disbursements(&ctx.pool, &mut payloads)
        .await
        .unwrap();

    let mut conn = ctx.pool.acquire().await.unwrap();
    let status = EnvelopeBatchStatus::find_by_envelope_id(&mut conn, &envelope_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.received_count, 0);
    assert_eq!(status.received_amount, 0);

    let id = payloads[0].disbursement_id.clone().unwrap();
    let rows = Disbursement::find_by_ids(&mut conn, &[id]).await.unwrap();
    assert_eq!(rows[0].cancellation_status, CancellationStatus::Cancelled);
    assert!(rows[0].cancellation_ts.is_some());
}

#[tokio::test]
async fn cancelling_twice_reports_already_cancelled() {
    let ctx = setup().await;
    seed_program(&ctx.pool, "PRG1", true).await;
    let schedule = Utc::now().date_naive() + Duration::days(5);
    let envelope_id = create_envelope(&ctx.pool, "PRG1", 2, 2_000, schedule).await;
    let mut payloads = create_disbursements(&ctx.pool, &envelope_id, &[("B1", "Jane Doe", 1_000)]).await;

    disbursements::cancel_disbursements(&ctx.pool, &mut payloads)
        .await
        .unwrap();
    let err = disbursements::cancel_disbursements(&ctx.pool, &mut payloads)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Bridge(BridgeErrorCode::InvalidDisbursementPayload)
    ));
    let codes = payloads[0].response_error_codes.as_ref().unwrap();
    assert!(codes.contains(&BridgeErrorCode::DisbursementAlreadyCanceled));
}

#[tokio::test]
async fn cancellation_is_refused_once_the_schedule_date_is_reached() {
    let ctx = setup().await;
    seed_program(&ctx.pool, "PRG1", true).await;
    let schedule = Utc::now().date_naive() + Duration::days(5);
    let envelope_id = create_envelope(&ctx.pool, "PRG1", 1, 1_000, schedule).await;
    let mut payloads = create_disbursements(&ctx.pool, &envelope_id, &[("B1", "Jane Doe", 1_000)]).await;

    set_schedule_date(&ctx.pool, &envelope_id, Utc::now().date_naive()).await;

    let err = disbursements::cancel_disbursements(&ctx.pool, &mut payloads)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Bridge(BridgeErrorCode::DisbursementEnvelopeScheduleDateReached)
    ));
}

#[tokio::test]
async fn envelope_cancellation_blocks_further_ingestion() {
    let ctx = setup().await;
    seed_program(&ctx.pool, "PRG1", true).await;
    let schedule = Utc::now().date_naive() + Duration::days(1);
    let envelope_id = create_envelope(&ctx.pool, "PRG1", 1, 1_000, schedule).await;

    envelopes::cancel_envelope(&ctx.pool, &envelope_id).await.unwrap();

    let err = envelopes::cancel_envelope(&ctx.pool, &envelope_id).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Bridge(BridgeErrorCode::DisbursementEnvelopeAlreadyCanceled)
    ));

    let mut payloads = vec![disbursement_payload(&envelope_id, "B1", 1_000)];
    let err = disbursements::create_disbursements(&ctx.pool, &mut payloads)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Bridge(BridgeErrorCode::DisbursementEnvelopeAlreadyCanceled)
    ));
}

#[tokio::test]
async fn cancelling_an_unknown_envelope_reports_not_found() {
    let ctx = setup().await;
    let err = envelopes::cancel_envelope(&ctx.pool, "missing").await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Bridge(BridgeErrorCode::DisbursementEnvelopeNotFound)
    ));
}

fn disbursement_payload(envelope_id: &str, beneficiary_id: &str, amount: i64) -> DisbursementPayload {
    DisbursementPayload {
        disbursement_id: None,
        envelope_id: Some(envelope_id.to_string()),
        beneficiary_id: Some(beneficiary_id.to_string()),
        beneficiary_name: Some("Jane Doe".to_string()),
        amount: Some(amount),
        narrative: Some("CASH TRANSFER".to_string()),
        response_error_codes: None,
    }
}
