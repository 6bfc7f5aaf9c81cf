use log::{error, info, warn};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::{self, Duration};

use crate::db::ProcessStatus;
use crate::db::disbursement::{
    DisbursementBatchControl, MapperResolutionBatchStatus, MapperResolutionDetails, NewMapperResolutionDetails,
};
use crate::fa::FaDeconstructor;
use crate::mapper::{MapperClient, ResolveResponse};

const DEFAULT_SLEEP_SECS: u64 = 20;

pub async fn run(
    db_pool: SqlitePool,
    mapper: Arc<MapperClient>,
    fa: Arc<FaDeconstructor>,
    max_attempts: i64,
    sleep_secs: Option<u64>,
) {
    let sleep_secs = sleep_secs.unwrap_or(DEFAULT_SLEEP_SECS);
    info!("Mapper resolver started. Cycle interval: {}s.", sleep_secs);

    let mut interval = time::interval(Duration::from_secs(sleep_secs));

    loop {
        interval.tick().await;
        if let Err(e) = process_cycle(&db_pool, &mapper, &fa, max_attempts).await {
            error!("Mapper resolver cycle error: {:?}", e);
        }
    }
}

async fn process_cycle(
    db_pool: &SqlitePool,
    mapper: &MapperClient,
    fa: &FaDeconstructor,
    max_attempts: i64,
) -> Result<(), anyhow::Error> {
    let mut conn = db_pool.acquire().await?;
    let batches = MapperResolutionBatchStatus::find_pending(&mut conn, max_attempts).await?;
    drop(conn);

    if !batches.is_empty() {
        info!("Found {} mapper resolution batches to resolve.", batches.len());
    }

    for batch in batches {
        if let Err(e) = resolve_batch(db_pool, mapper, fa, &batch.batch_id, max_attempts).await {
            error!("Mapper resolution failed for batch {}: {:?}", batch.batch_id, e);
        }
    }

    Ok(())
}

/// Resolves one batch of beneficiaries against the external mapper.
pub async fn resolve_batch(
    db_pool: &SqlitePool,
    mapper: &MapperClient,
    fa: &FaDeconstructor,
    batch_id: &str,
    max_attempts: i64,
) -> Result<(), anyhow::Error> {
    let mut conn = db_pool.acquire().await?;

    let Some(batch_status) = MapperResolutionBatchStatus::find_by_id(&mut conn, batch_id).await? else {
        return Ok(());
    };
    if batch_status.status != ProcessStatus::Pending || batch_status.attempts >= max_attempts {
        return Ok(());
    }

    let controls = DisbursementBatchControl::find_by_mapper_batch(&mut conn, batch_id).await?;
    if controls.is_empty() {
        return Ok(());
    }
    drop(conn);

    let beneficiary_ids: Vec<String> = controls.iter().map(|c| c.beneficiary_id.clone()).collect();
    let request = MapperClient::build_resolve_request(&beneficiary_ids);

    match mapper.resolve(&request).await {
        Ok(response) => apply_resolution(db_pool, fa, batch_id, &controls, &response).await,
        Err(e) => {
            warn!("Mapper resolve call failed for batch {}: {}", batch_id, e);
            let mut conn = db_pool.acquire().await?;
            MapperResolutionBatchStatus::record_failure(&mut conn, batch_id, &e.to_string()).await?;
            Ok(())
        },
    }
}

/// Applies a mapper response to the batch. All-or-nothing: a single missing
/// FA leaves the batch PENDING with nothing inserted.
pub async fn apply_resolution(
    db_pool: &SqlitePool,
    fa: &FaDeconstructor,
    batch_id: &str,
    controls: &[DisbursementBatchControl],
    response: &ResolveResponse,
) -> Result<(), anyhow::Error> {
    let disbursement_by_beneficiary: HashMap<&str, &str> = controls
        .iter()
        .map(|c| (c.beneficiary_id.as_str(), c.disbursement_id.as_str()))
        .collect();

    let mut details_batch = Vec::new();
    for single in &response.message.resolve_response {
        let disbursement_id = disbursement_by_beneficiary.get(single.id.as_str());
        let resolved_fa = single.fa.as_deref().filter(|fa| !fa.is_empty());

        let (Some(disbursement_id), Some(resolved_fa)) = (disbursement_id, resolved_fa) else {
            let message = format!("Failed to resolve the request for beneficiary: {}", single.id);
            warn!("{}", message);
            let mut conn = db_pool.acquire().await?;
            MapperResolutionBatchStatus::record_failure(&mut conn, batch_id, &message).await?;
            return Ok(());
        };

        let deconstructed = fa.deconstruct(resolved_fa);
        details_batch.push(NewMapperResolutionDetails {
            disbursement_id: disbursement_id.to_string(),
            mapper_resolution_batch_id: batch_id.to_string(),
            beneficiary_id: single.id.clone(),
            resolved_fa: resolved_fa.to_string(),
            resolved_name: single.account_provider_info.as_ref().map(|info| info.name.clone()),
            fa_type: deconstructed.fa_type,
            account_number: deconstructed.account_number,
            bank_code: deconstructed.bank_code,
            branch_code: deconstructed.branch_code,
            mobile_number: deconstructed.mobile_number,
            mobile_wallet_provider: deconstructed.mobile_wallet_provider,
            email_address: deconstructed.email_address,
            email_wallet_provider: deconstructed.email_wallet_provider,
        });
    }

    let mut tx = db_pool.begin().await?;
    for details in &details_batch {
        MapperResolutionDetails::create(&mut tx, details).await?;
    }
    MapperResolutionBatchStatus::mark_processed(&mut tx, batch_id).await?;
    tx.commit().await?;

    info!(
        target: "audit",
        "Mapper resolution batch {} resolved. Beneficiaries: {}",
        batch_id,
        details_batch.len()
    );

    Ok(())
}
