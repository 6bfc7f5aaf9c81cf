use axum::{Json, extract::State};
use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    api::{AppState, ResponseStatus, error::ApiError, error::ServiceError},
    db::CancellationStatus,
    db::disbursement::{BankDisbursementBatchStatus, Disbursement, DisbursementBatchControl, MapperResolutionBatchStatus},
    db::envelope::{DisbursementEnvelope, EnvelopeBatchStatus},
    errors::BridgeErrorCode,
    utils::log::mask_string,
};

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct DisbursementPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disbursement_id: Option<String>,
    pub envelope_id: Option<String>,
    pub beneficiary_id: Option<String>,
    pub beneficiary_name: Option<String>,
    pub amount: Option<i64>,
    pub narrative: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_error_codes: Option<Vec<BridgeErrorCode>>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct DisbursementRequest {
    pub request_payload: Vec<DisbursementPayload>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DisbursementResponse {
    pub response_status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_payload: Option<Vec<DisbursementPayload>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_error_code: Option<BridgeErrorCode>,
}

impl DisbursementResponse {
    fn success(payloads: Vec<DisbursementPayload>) -> Self {
        Self {
            response_status: ResponseStatus::Success,
            response_payload: Some(payloads),
            response_error_code: None,
        }
    }

    fn failure(code: BridgeErrorCode, payloads: Vec<DisbursementPayload>) -> Self {
        Self {
            response_status: ResponseStatus::Failure,
            response_payload: Some(payloads),
            response_error_code: Some(code),
        }
    }
}

/// Validates and ingests one batch of disbursements. The rows, batch
/// controls, batch statuses and envelope counters commit in a single
/// transaction; any failure leaves no trace.
pub async fn create_disbursements(pool: &SqlitePool, payloads: &mut [DisbursementPayload]) -> Result<(), ServiceError> {
    if payloads.is_empty() {
        return Err(BridgeErrorCode::InvalidDisbursementPayload.into());
    }

    let envelope_id = payloads[0].envelope_id.clone();
    if !payloads.iter().all(|p| p.envelope_id == envelope_id) {
        return Err(BridgeErrorCode::MultipleEnvelopesFound.into());
    }
    let envelope_id = envelope_id.ok_or(BridgeErrorCode::DisbursementEnvelopeNotFound)?;

    let mut tx = pool.begin().await?;

    let envelope = DisbursementEnvelope::find_by_id(&mut tx, &envelope_id)
        .await?
        .ok_or(BridgeErrorCode::DisbursementEnvelopeNotFound)?;

    if envelope.cancellation_status == CancellationStatus::Cancelled {
        return Err(BridgeErrorCode::DisbursementEnvelopeAlreadyCanceled.into());
    }

    let batch_status = EnvelopeBatchStatus::find_by_envelope_id(&mut tx, &envelope_id)
        .await?
        .ok_or(BridgeErrorCode::DisbursementEnvelopeNotFound)?;

    let count = payloads.len() as i64;
    let amount_total: i64 = payloads.iter().map(|p| p.amount.unwrap_or(0)).sum();

    if batch_status.received_count + count > envelope.disbursement_count {
        return Err(BridgeErrorCode::NoOfDisbursementsExceedsDeclared.into());
    }
    if batch_status.received_amount + amount_total > envelope.total_amount {
        return Err(BridgeErrorCode::TotalDisbursementAmountExceedsDeclared.into());
    }

    let mut validated: Vec<(String, String, String, i64)> = Vec::with_capacity(payloads.len());
    let mut error_free = true;
    for payload in payloads.iter_mut() {
        let mut codes = Vec::new();

        let amount = payload.amount.unwrap_or(0);
        if amount <= 0 {
            codes.push(BridgeErrorCode::InvalidDisbursementAmount);
        }
        let beneficiary_id = payload.beneficiary_id.clone().unwrap_or_default();
        if beneficiary_id.is_empty() {
            codes.push(BridgeErrorCode::InvalidBeneficiaryId);
        }
        let beneficiary_name = payload.beneficiary_name.clone().unwrap_or_default();
        if beneficiary_name.is_empty() {
            codes.push(BridgeErrorCode::InvalidBeneficiaryName);
        }
        let narrative = payload.narrative.clone().unwrap_or_default();
        if narrative.is_empty() {
            codes.push(BridgeErrorCode::InvalidNarrative);
        }

        if codes.is_empty() {
            payload.response_error_codes = None;
            validated.push((beneficiary_id, beneficiary_name, narrative, amount));
        } else {
            payload.response_error_codes = Some(codes);
            error_free = false;
        }
    }

    if !error_free {
        return Err(BridgeErrorCode::InvalidDisbursementPayload.into());
    }

    let mapper_batch_id = Uuid::new_v4().to_string();
    let bank_batch_id = Uuid::new_v4().to_string();

    for (payload, (beneficiary_id, beneficiary_name, narrative, amount)) in payloads.iter_mut().zip(validated) {
        let disbursement =
            Disbursement::create(&mut tx, &envelope_id, &beneficiary_id, &beneficiary_name, &narrative, amount).await?;

        DisbursementBatchControl::create(
            &mut tx,
            &disbursement.disbursement_id,
            &envelope_id,
            &beneficiary_id,
            &mapper_batch_id,
            &bank_batch_id,
        )
        .await?;

        payload.disbursement_id = Some(disbursement.disbursement_id);
    }

    BankDisbursementBatchStatus::create(&mut tx, &bank_batch_id, &envelope_id).await?;
    if batch_status.id_mapper_resolution_required {
        MapperResolutionBatchStatus::create(&mut tx, &mapper_batch_id).await?;
    }

    EnvelopeBatchStatus::adjust_received(&mut tx, &envelope_id, count, amount_total).await?;

    tx.commit().await?;

    info!(
        target: "audit",
        "Disbursement batch ingested. Envelope: {}, Count: {}, BankBatch: {}",
        envelope_id, count, bank_batch_id
    );

    Ok(())
}

/// Cancels a batch of disbursements and restores the envelope counters,
/// in one transaction.
pub async fn cancel_disbursements(pool: &SqlitePool, payloads: &mut [DisbursementPayload]) -> Result<(), ServiceError> {
    if payloads.is_empty() {
        return Err(BridgeErrorCode::InvalidDisbursementPayload.into());
    }

    let mut error_free = true;
    for payload in payloads.iter_mut() {
        if payload.disbursement_id.as_deref().unwrap_or_default().is_empty() {
            payload.response_error_codes = Some(vec![BridgeErrorCode::InvalidDisbursementId]);
            error_free = false;
        } else {
            payload.response_error_codes = None;
        }
    }
    if !error_free {
        return Err(BridgeErrorCode::InvalidDisbursementPayload.into());
    }

    let ids: Vec<String> = payloads
        .iter()
        .filter_map(|p| p.disbursement_id.clone())
        .collect();

    let mut tx = pool.begin().await?;

    let disbursements_in_db = Disbursement::find_by_ids(&mut tx, &ids).await?;
    if disbursements_in_db.is_empty() {
        return Err(BridgeErrorCode::InvalidDisbursementId.into());
    }

    let envelope_id = disbursements_in_db[0].envelope_id.clone();
    if !disbursements_in_db.iter().all(|d| d.envelope_id == envelope_id) {
        return Err(BridgeErrorCode::MultipleEnvelopesFound.into());
    }

    let envelope = DisbursementEnvelope::find_by_id(&mut tx, &envelope_id)
        .await?
        .ok_or(BridgeErrorCode::DisbursementEnvelopeNotFound)?;

    if envelope.cancellation_status == CancellationStatus::Cancelled {
        return Err(BridgeErrorCode::DisbursementEnvelopeAlreadyCanceled.into());
    }
    if envelope.schedule_date <= Utc::now().date_naive() {
        return Err(BridgeErrorCode::DisbursementEnvelopeScheduleDateReached.into());
    }

    let mut invalid = false;
    for payload in payloads.iter_mut() {
        let id = payload.disbursement_id.as_deref().unwrap_or_default();
        let mut codes = Vec::new();
        match disbursements_in_db.iter().find(|d| d.disbursement_id == id) {
            None => codes.push(BridgeErrorCode::InvalidDisbursementId),
            Some(d) if d.cancellation_status == CancellationStatus::Cancelled => {
                codes.push(BridgeErrorCode::DisbursementAlreadyCanceled)
            },
            Some(_) => {},
        }
        if codes.is_empty() {
            payload.response_error_codes = None;
        } else {
            payload.response_error_codes = Some(codes);
            invalid = true;
        }
    }
    if invalid {
        return Err(BridgeErrorCode::InvalidDisbursementPayload.into());
    }

    let batch_status = EnvelopeBatchStatus::find_by_envelope_id(&mut tx, &envelope_id)
        .await?
        .ok_or(BridgeErrorCode::DisbursementEnvelopeNotFound)?;

    let count = disbursements_in_db.len() as i64;
    let amount_total: i64 = disbursements_in_db.iter().map(|d| d.amount).sum();

    if batch_status.received_count - count < 0 {
        return Err(BridgeErrorCode::NoOfDisbursementsLessThanZero.into());
    }
    if batch_status.received_amount - amount_total < 0 {
        return Err(BridgeErrorCode::TotalDisbursementAmountLessThanZero.into());
    }

    Disbursement::cancel_many(&mut tx, &ids).await?;
    EnvelopeBatchStatus::adjust_received(&mut tx, &envelope_id, -count, -amount_total).await?;

    tx.commit().await?;

    info!(
        target: "audit",
        "Disbursements cancelled. Envelope: {}, Count: {}",
        envelope_id, count
    );

    Ok(())
}

#[utoipa::path(
    post,
    path = "/create_disbursements",
    request_body = DisbursementRequest,
    responses(
        (status = 200, description = "Batch ingested, or a FAILURE envelope with per-payload error codes", body = DisbursementResponse),
        (status = 500, description = "Internal server error", body = ApiError)
    )
)]
pub async fn api_create_disbursements(
    State(state): State<AppState>,
    Json(request): Json<DisbursementRequest>,
) -> Result<Json<DisbursementResponse>, ApiError> {
    let mut payloads = request.request_payload;
    debug!(
        "API: Create disbursements request. Count: {}, First beneficiary: {}",
        payloads.len(),
        mask_string(payloads.first().and_then(|p| p.beneficiary_id.as_deref()).unwrap_or_default())
    );

    match create_disbursements(&state.db_pool, &mut payloads).await {
        Ok(()) => Ok(Json(DisbursementResponse::success(payloads))),
        Err(ServiceError::Bridge(code)) => {
            warn!("API: Disbursement batch rejected: {}", code);
            Ok(Json(DisbursementResponse::failure(code, payloads)))
        },
        Err(ServiceError::Db(e)) => Err(e.into()),
    }
}

#[utoipa::path(
    post,
    path = "/cancel_disbursements",
    request_body = DisbursementRequest,
    responses(
        (status = 200, description = "Batch cancelled, or a FAILURE envelope with per-payload error codes", body = DisbursementResponse),
        (status = 500, description = "Internal server error", body = ApiError)
    )
)]
pub async fn api_cancel_disbursements(
    State(state): State<AppState>,
    Json(request): Json<DisbursementRequest>,
) -> Result<Json<DisbursementResponse>, ApiError> {
    let mut payloads = request.request_payload;
    debug!("API: Cancel disbursements request. Count: {}", payloads.len());

    match cancel_disbursements(&state.db_pool, &mut payloads).await {
        Ok(()) => Ok(Json(DisbursementResponse::success(payloads))),
        Err(ServiceError::Bridge(code)) => {
            warn!("API: Disbursement cancellation rejected: {}", code);
            Ok(Json(DisbursementResponse::failure(code, payloads)))
        },
        Err(ServiceError::Db(e)) => Err(e.into()),
    }
}
