mod common;

use bank_connectors::{BlockFundsStatus, CheckFundsStatus, PaymentStatus};
use chrono::{Duration, Utc};
use common::*;
use std::sync::Arc;

use g2p_bridge::db::ProcessStatus;
use g2p_bridge::db::disbursement::{MapperResolutionBatchStatus, MapperResolutionDetails};
use g2p_bridge::db::envelope::{DisbursementEnvelope, EnvelopeBatchStatus, FundsAvailableStatus, FundsBlockedStatus};
use g2p_bridge::fa::{
    DEFAULT_BANK_FA_STRATEGY, DEFAULT_EMAIL_WALLET_FA_STRATEGY, DEFAULT_MOBILE_WALLET_FA_STRATEGY, FaDeconstructor,
    FaType,
};
use g2p_bridge::mapper::{AccountProviderInfo, ResolveResponse, ResolveResponseMessage, SingleResolveResponse};
use g2p_bridge::workers::{funds_blocker, funds_checker, mapper_resolver, payment_dispatcher};

fn deconstructor() -> FaDeconstructor {
    FaDeconstructor::new(
        DEFAULT_BANK_FA_STRATEGY,
        DEFAULT_MOBILE_WALLET_FA_STRATEGY,
        DEFAULT_EMAIL_WALLET_FA_STRATEGY,
    )
    .unwrap()
}

fn resolved(id: &str, fa: &str, name: &str) -> SingleResolveResponse {
    SingleResolveResponse {
        id: id.to_string(),
        fa: Some(fa.to_string()),
        account_provider_info: Some(AccountProviderInfo { name: name.to_string() }),
    }
}

fn unresolved(id: &str) -> SingleResolveResponse {
    SingleResolveResponse {
        id: id.to_string(),
        fa: None,
        account_provider_info: None,
    }
}

fn response_of(entries: Vec<SingleResolveResponse>) -> ResolveResponse {
    ResolveResponse {
        message: ResolveResponseMessage {
            resolve_response: entries,
        },
    }
}

/// Scenario: two disbursements travel through all four stages, ending with a
/// processed bank batch and the shipped counter at the batch size.
#[tokio::test]
async fn happy_path_through_all_four_stages() {
    let ctx = setup().await;
    seed_program(&ctx.pool, "PRG1", true).await;
    let schedule = Utc::now().date_naive() + Duration::days(1);
    let envelope_id = create_envelope(&ctx.pool, "PRG1", 2, 10_000, schedule).await;
    let payloads =
        create_disbursements(&ctx.pool, &envelope_id, &[("B1", "Jane Doe", 6_000), ("B2", "John Doe", 4_000)]).await;
    let d1 = payloads[0].disbursement_id.clone().unwrap();
    let d2 = payloads[1].disbursement_id.clone().unwrap();
    let (mapper_batch_id, bank_batch_id) = batch_ids_for(&ctx.pool, &d1).await;

    // Advance past the schedule date.
    set_schedule_date(&ctx.pool, &envelope_id, Utc::now().date_naive() - Duration::days(1)).await;

    let mock = Arc::new(MockBank::new());
    mock.queue_check(CheckFundsStatus::Available, "");
    mock.queue_block(BlockFundsStatus::BlockSuccess, "R1", "");
    mock.queue_payment(PaymentStatus::Success, "");
    let factory = single_factory(mock.clone());

    // Stage 1: fund availability
    funds_checker::check_envelope(&ctx.pool, &factory, &envelope_id, 3)
        .await
        .unwrap();
    let mut conn = ctx.pool.acquire().await.unwrap();
    let status = EnvelopeBatchStatus::find_by_envelope_id(&mut conn, &envelope_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.funds_available_status, FundsAvailableStatus::Available);
    assert_eq!(status.funds_available_attempts, 1);
    drop(conn);

    // Stage 2: fund block
    funds_blocker::block_envelope(&ctx.pool, &factory, &envelope_id, 3)
        .await
        .unwrap();
    let mut conn = ctx.pool.acquire().await.unwrap();
    let status = EnvelopeBatchStatus::find_by_envelope_id(&mut conn, &envelope_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.funds_blocked_status, FundsBlockedStatus::BlockSuccess);
    assert_eq!(status.block_reference_no.as_deref(), Some("R1"));

    // Stage 3: mapper resolution (response applied directly)
    let controls =
        g2p_bridge::db::disbursement::DisbursementBatchControl::find_by_mapper_batch(&mut conn, &mapper_batch_id)
            .await
            .unwrap();
    drop(conn);
    let response = response_of(vec![
        resolved("B1", "BANK_ACCOUNT:11111111.001@EXBK", "Jane Doe"),
        resolved("B2", "BANK_ACCOUNT:22222222.002@EXBK", "John Doe"),
    ]);
    mapper_resolver::apply_resolution(&ctx.pool, &deconstructor(), &mapper_batch_id, &controls, &response)
        .await
        .unwrap();

    let mut conn = ctx.pool.acquire().await.unwrap();
    let mapper_status = MapperResolutionBatchStatus::find_by_id(&mut conn, &mapper_batch_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(mapper_status.status, ProcessStatus::Processed);
    let details = MapperResolutionDetails::find_by_disbursement_id(&mut conn, &d1)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(details.fa_type, Some(FaType::BankAccount));
    assert_eq!(details.account_number.as_deref(), Some("11111111"));
    assert_eq!(details.bank_code.as_deref(), Some("EXBK"));
    drop(conn);

    // Stage 4: payment dispatch
    payment_dispatcher::dispatch_batch(&ctx.pool, &factory, &bank_batch_id, 3)
        .await
        .unwrap();

    let mut conn = ctx.pool.acquire().await.unwrap();
    let batch = g2p_bridge::db::disbursement::BankDisbursementBatchStatus::find_by_id(&mut conn, &bank_batch_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(batch.status, ProcessStatus::Processed);
    assert_eq!(batch.attempts, 1);
    assert!(batch.latest_error_code.is_none());

    let status = EnvelopeBatchStatus::find_by_envelope_id(&mut conn, &envelope_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.shipped_count, 2);

    // The bank saw one indivisible instruction carrying the block reference
    // and the resolved addresses.
    let calls = mock.payment_calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let instruction = &calls[0];
    assert_eq!(instruction.len(), 2);
    assert!(instruction.iter().all(|p| p.funds_blocked_reference_number == "R1"));
    assert!(instruction.iter().all(|p| p.remitting_account == SPONSOR_ACCOUNT));
    let for_d2 = instruction.iter().find(|p| p.disbursement_id == d2).unwrap();
    assert_eq!(for_d2.beneficiary_account.as_deref(), Some("22222222"));
    assert_eq!(for_d2.beneficiary_account_type.as_deref(), Some("BANK_ACCOUNT"));
}

/// Scenario: the block fails twice and succeeds on the third attempt.
#[tokio::test]
async fn fund_block_retries_until_success() {
    let ctx = setup().await;
    seed_program(&ctx.pool, "PRG1", false).await;
    let schedule = Utc::now().date_naive() + Duration::days(1);
    let envelope_id = create_envelope(&ctx.pool, "PRG1", 1, 1_000, schedule).await;
    create_disbursements(&ctx.pool, &envelope_id, &[("B1", "Jane Doe", 1_000)]).await;
    set_schedule_date(&ctx.pool, &envelope_id, Utc::now().date_naive() - Duration::days(1)).await;

    let mock = Arc::new(MockBank::new());
    mock.queue_check(CheckFundsStatus::Available, "");
    mock.queue_block(BlockFundsStatus::BlockFailure, "", "INSUFFICIENT_MARGIN");
    mock.queue_block(BlockFundsStatus::BlockFailure, "", "INSUFFICIENT_MARGIN");
    mock.queue_block(BlockFundsStatus::BlockSuccess, "R1", "");
    let factory = single_factory(mock.clone());

    funds_checker::check_envelope(&ctx.pool, &factory, &envelope_id, 3)
        .await
        .unwrap();

    for _ in 0..2 {
        funds_blocker::block_envelope(&ctx.pool, &factory, &envelope_id, 3)
            .await
            .unwrap();
    }
    let mut conn = ctx.pool.acquire().await.unwrap();
    let status = EnvelopeBatchStatus::find_by_envelope_id(&mut conn, &envelope_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.funds_blocked_status, FundsBlockedStatus::BlockFailure);
    assert_eq!(status.funds_blocked_attempts, 2);
    assert_eq!(status.funds_blocked_error_code.as_deref(), Some("INSUFFICIENT_MARGIN"));
    drop(conn);

    funds_blocker::block_envelope(&ctx.pool, &factory, &envelope_id, 3)
        .await
        .unwrap();
    let mut conn = ctx.pool.acquire().await.unwrap();
    let status = EnvelopeBatchStatus::find_by_envelope_id(&mut conn, &envelope_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.funds_blocked_status, FundsBlockedStatus::BlockSuccess);
    assert_eq!(status.funds_blocked_attempts, 3);
    assert!(status.funds_blocked_error_code.is_none());
    assert_eq!(status.block_reference_no.as_deref(), Some("R1"));
    drop(conn);

    // A successful block is terminal for the stage: further calls no-op.
    funds_blocker::block_envelope(&ctx.pool, &factory, &envelope_id, 3)
        .await
        .unwrap();
    let mut conn = ctx.pool.acquire().await.unwrap();
    let status = EnvelopeBatchStatus::find_by_envelope_id(&mut conn, &envelope_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.funds_blocked_attempts, 3);
}

/// A unit at its attempt cap stops being selected by the producer query.
#[tokio::test]
async fn exhausted_fund_checks_leave_the_producer_queue() {
    let ctx = setup().await;
    seed_program(&ctx.pool, "PRG1", false).await;
    let schedule = Utc::now().date_naive() + Duration::days(1);
    let envelope_id = create_envelope(&ctx.pool, "PRG1", 1, 1_000, schedule).await;
    create_disbursements(&ctx.pool, &envelope_id, &[("B1", "Jane Doe", 1_000)]).await;
    set_schedule_date(&ctx.pool, &envelope_id, Utc::now().date_naive() - Duration::days(1)).await;

    let mock = Arc::new(MockBank::new());
    mock.queue_check(CheckFundsStatus::NotAvailable, "");
    mock.queue_check(CheckFundsStatus::NotAvailable, "");
    let factory = single_factory(mock.clone());

    let today = Utc::now().date_naive();
    for _ in 0..2 {
        funds_checker::check_envelope(&ctx.pool, &factory, &envelope_id, 2)
            .await
            .unwrap();
    }

    let mut conn = ctx.pool.acquire().await.unwrap();
    let status = EnvelopeBatchStatus::find_by_envelope_id(&mut conn, &envelope_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.funds_available_status, FundsAvailableStatus::NotAvailable);
    assert_eq!(status.funds_available_attempts, 2);

    let eligible = DisbursementEnvelope::find_fund_check_eligible(&mut conn, today, 2)
        .await
        .unwrap();
    assert!(eligible.is_empty());

    // The worker itself also refuses once the cap is reached.
    drop(conn);
    funds_checker::check_envelope(&ctx.pool, &factory, &envelope_id, 2)
        .await
        .unwrap();
    let mut conn = ctx.pool.acquire().await.unwrap();
    let status = EnvelopeBatchStatus::find_by_envelope_id(&mut conn, &envelope_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.funds_available_attempts, 2);
}

/// Scenario: the mapper resolves two of three beneficiaries. Nothing is
/// inserted and the batch stays pending with the error noted.
#[tokio::test]
async fn partial_mapper_resolution_inserts_nothing() {
    let ctx = setup().await;
    seed_program(&ctx.pool, "PRG1", true).await;
    let schedule = Utc::now().date_naive() + Duration::days(1);
    let envelope_id = create_envelope(&ctx.pool, "PRG1", 3, 3_000, schedule).await;
    let payloads = create_disbursements(
        &ctx.pool,
        &envelope_id,
        &[("B1", "Jane Doe", 1_000), ("B2", "John Doe", 1_000), ("B3", "Mary Sue", 1_000)],
    )
    .await;
    let d1 = payloads[0].disbursement_id.clone().unwrap();
    let (mapper_batch_id, _) = batch_ids_for(&ctx.pool, &d1).await;

    let mut conn = ctx.pool.acquire().await.unwrap();
    let controls =
        g2p_bridge::db::disbursement::DisbursementBatchControl::find_by_mapper_batch(&mut conn, &mapper_batch_id)
            .await
            .unwrap();
    drop(conn);

    let response = response_of(vec![
        resolved("B1", "BANK_ACCOUNT:11111111.001@EXBK", "Jane Doe"),
        unresolved("B2"),
        resolved("B3", "MOBILE_WALLET:+256700123456@airpay", "Mary Sue"),
    ]);
    mapper_resolver::apply_resolution(&ctx.pool, &deconstructor(), &mapper_batch_id, &controls, &response)
        .await
        .unwrap();

    let mut conn = ctx.pool.acquire().await.unwrap();
    let batch = MapperResolutionBatchStatus::find_by_id(&mut conn, &mapper_batch_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(batch.status, ProcessStatus::Pending);
    assert_eq!(batch.attempts, 1);
    assert!(batch.latest_error_code.as_deref().unwrap().contains("B2"));

    let inserted = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM mapper_resolution_details")
        .fetch_one(&ctx.pool)
        .await
        .unwrap();
    assert_eq!(inserted, 0);
}

/// The shipped counter moves at most once per bank batch, even if the
/// worker fires twice.
#[tokio::test]
async fn dispatch_success_effect_is_at_most_once() {
    let ctx = setup().await;
    seed_program(&ctx.pool, "PRG1", false).await;
    let schedule = Utc::now().date_naive() + Duration::days(1);
    let envelope_id = create_envelope(&ctx.pool, "PRG1", 1, 1_000, schedule).await;
    let payloads = create_disbursements(&ctx.pool, &envelope_id, &[("B1", "Jane Doe", 1_000)]).await;
    let d1 = payloads[0].disbursement_id.clone().unwrap();
    let (_, bank_batch_id) = batch_ids_for(&ctx.pool, &d1).await;
    set_schedule_date(&ctx.pool, &envelope_id, Utc::now().date_naive() - Duration::days(1)).await;

    let mock = Arc::new(MockBank::new());
    let factory = single_factory(mock.clone());

    funds_checker::check_envelope(&ctx.pool, &factory, &envelope_id, 3)
        .await
        .unwrap();
    funds_blocker::block_envelope(&ctx.pool, &factory, &envelope_id, 3)
        .await
        .unwrap();

    for _ in 0..2 {
        payment_dispatcher::dispatch_batch(&ctx.pool, &factory, &bank_batch_id, 3)
            .await
            .unwrap();
    }

    let mut conn = ctx.pool.acquire().await.unwrap();
    let status = EnvelopeBatchStatus::find_by_envelope_id(&mut conn, &envelope_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.shipped_count, 1);
    assert_eq!(mock.payment_calls.lock().unwrap().len(), 1);
}

/// Dispatch is gated on a successful fund block.
#[tokio::test]
async fn dispatch_refuses_without_a_fund_block() {
    let ctx = setup().await;
    seed_program(&ctx.pool, "PRG1", false).await;
    let schedule = Utc::now().date_naive() + Duration::days(1);
    let envelope_id = create_envelope(&ctx.pool, "PRG1", 1, 1_000, schedule).await;
    let payloads = create_disbursements(&ctx.pool, &envelope_id, &[("B1", "Jane Doe", 1_000)]).await;
    let d1 = payloads[0].disbursement_id.clone().unwrap();
    let (_, bank_batch_id) = batch_ids_for(&ctx.pool, &d1).await;
    set_schedule_date(&ctx.pool, &envelope_id, Utc::now().date_naive() - Duration::days(1)).await;

    let mock = Arc::new(MockBank::new());
    let factory = single_factory(mock.clone());

    payment_dispatcher::dispatch_batch(&ctx.pool, &factory, &bank_batch_id, 3)
        .await
        .unwrap();

    assert!(mock.payment_calls.lock().unwrap().is_empty());
    let mut conn = ctx.pool.acquire().await.unwrap();
    let batch = g2p_bridge::db::disbursement::BankDisbursementBatchStatus::find_by_id(&mut conn, &bank_batch_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(batch.status, ProcessStatus::Pending);
    assert_eq!(batch.attempts, 0);
}

/// A rejected instruction keeps the batch pending with the bank's error.
#[tokio::test]
async fn dispatch_failure_keeps_the_batch_pending() {
    let ctx = setup().await;
    seed_program(&ctx.pool, "PRG1", false).await;
    let schedule = Utc::now().date_naive() + Duration::days(1);
    let envelope_id = create_envelope(&ctx.pool, "PRG1", 1, 1_000, schedule).await;
    let payloads = create_disbursements(&ctx.pool, &envelope_id, &[("B1", "Jane Doe", 1_000)]).await;
    let d1 = payloads[0].disbursement_id.clone().unwrap();
    let (_, bank_batch_id) = batch_ids_for(&ctx.pool, &d1).await;
    set_schedule_date(&ctx.pool, &envelope_id, Utc::now().date_naive() - Duration::days(1)).await;

    let mock = Arc::new(MockBank::new());
    mock.queue_payment(PaymentStatus::Error, "INVALID_BLOCK_REFERENCE");
    let factory = single_factory(mock.clone());

    funds_checker::check_envelope(&ctx.pool, &factory, &envelope_id, 3)
        .await
        .unwrap();
    funds_blocker::block_envelope(&ctx.pool, &factory, &envelope_id, 3)
        .await
        .unwrap();
    payment_dispatcher::dispatch_batch(&ctx.pool, &factory, &bank_batch_id, 3)
        .await
        .unwrap();

    let mut conn = ctx.pool.acquire().await.unwrap();
    let batch = g2p_bridge::db::disbursement::BankDisbursementBatchStatus::find_by_id(&mut conn, &bank_batch_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(batch.status, ProcessStatus::Pending);
    assert_eq!(batch.attempts, 1);
    assert_eq!(batch.latest_error_code.as_deref(), Some("INVALID_BLOCK_REFERENCE"));

    let status = EnvelopeBatchStatus::find_by_envelope_id(&mut conn, &envelope_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.shipped_count, 0);
}
