use axum::{Json, extract::State};
use chrono::{NaiveDate, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use utoipa::ToSchema;

use crate::{
    api::{AppState, ResponseStatus, error::ApiError, error::ServiceError},
    db::CancellationStatus,
    db::envelope::{DisbursementEnvelope, DisbursementFrequency, EnvelopeBatchStatus},
    db::program::BenefitProgramConfiguration,
    errors::BridgeErrorCode,
};

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct EnvelopePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub envelope_id: Option<String>,
    pub program_mnemonic: String,
    pub cycle_code_mnemonic: String,
    pub frequency: String,
    pub beneficiary_count: i64,
    pub disbursement_count: i64,
    pub total_amount: i64,
    pub schedule_date: NaiveDate,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct EnvelopeRequest {
    pub request_payload: EnvelopePayload,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct EnvelopeCancelPayload {
    pub envelope_id: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct EnvelopeCancelRequest {
    pub request_payload: EnvelopeCancelPayload,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EnvelopeResponse {
    pub response_status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_payload: Option<EnvelopePayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_error_code: Option<BridgeErrorCode>,
}

impl EnvelopeResponse {
    fn success(payload: EnvelopePayload) -> Self {
        Self {
            response_status: ResponseStatus::Success,
            response_payload: Some(payload),
            response_error_code: None,
        }
    }

    fn failure(code: BridgeErrorCode) -> Self {
        Self {
            response_status: ResponseStatus::Failure,
            response_payload: None,
            response_error_code: Some(code),
        }
    }
}

pub fn validate_envelope_payload(
    payload: &EnvelopePayload,
    today: NaiveDate,
) -> Result<DisbursementFrequency, BridgeErrorCode> {
    if payload.program_mnemonic.is_empty() {
        return Err(BridgeErrorCode::InvalidProgramMnemonic);
    }
    let frequency: DisbursementFrequency = payload
        .frequency
        .parse()
        .map_err(|_| BridgeErrorCode::InvalidDisbursementFrequency)?;
    if payload.cycle_code_mnemonic.is_empty() {
        return Err(BridgeErrorCode::InvalidCycleCodeMnemonic);
    }
    if payload.beneficiary_count < 1 {
        return Err(BridgeErrorCode::InvalidNoOfBeneficiaries);
    }
    if payload.disbursement_count < 1 {
        return Err(BridgeErrorCode::InvalidNoOfDisbursements);
    }
    if payload.total_amount < 0 {
        return Err(BridgeErrorCode::InvalidTotalDisbursementAmount);
    }
    if payload.schedule_date < today {
        return Err(BridgeErrorCode::InvalidDisbursementScheduleDate);
    }
    Ok(frequency)
}

/// Creates the envelope and its 1:1 batch status in one transaction.
pub async fn create_envelope(pool: &SqlitePool, payload: &mut EnvelopePayload) -> Result<(), ServiceError> {
    let frequency = validate_envelope_payload(payload, Utc::now().date_naive()).map_err(ServiceError::Bridge)?;

    let mut tx = pool.begin().await?;

    let program = BenefitProgramConfiguration::find_by_mnemonic(&mut tx, &payload.program_mnemonic)
        .await?
        .ok_or(BridgeErrorCode::InvalidProgramMnemonic)?;

    let envelope = DisbursementEnvelope::create(
        &mut tx,
        &payload.program_mnemonic,
        &payload.cycle_code_mnemonic,
        frequency,
        payload.beneficiary_count,
        payload.disbursement_count,
        payload.total_amount,
        payload.schedule_date,
    )
    .await?;

    EnvelopeBatchStatus::create(&mut tx, &envelope.envelope_id, program.id_mapper_resolution_required).await?;

    tx.commit().await?;

    payload.envelope_id = Some(envelope.envelope_id);
    Ok(())
}

pub async fn cancel_envelope(pool: &SqlitePool, envelope_id: &str) -> Result<(), ServiceError> {
    let mut tx = pool.begin().await?;

    let envelope = DisbursementEnvelope::find_by_id(&mut tx, envelope_id)
        .await?
        .ok_or(BridgeErrorCode::DisbursementEnvelopeNotFound)?;

    if envelope.cancellation_status == CancellationStatus::Cancelled {
        return Err(BridgeErrorCode::DisbursementEnvelopeAlreadyCanceled.into());
    }

    DisbursementEnvelope::cancel(&mut tx, envelope_id).await?;
    tx.commit().await?;
    Ok(())
}

#[utoipa::path(
    post,
    path = "/disbursement_envelope",
    request_body = EnvelopeRequest,
    responses(
        (status = 200, description = "Envelope created, or a FAILURE envelope with the error code", body = EnvelopeResponse),
        (status = 500, description = "Internal server error", body = ApiError)
    )
)]
pub async fn api_create_envelope(
    State(state): State<AppState>,
    Json(request): Json<EnvelopeRequest>,
) -> Result<Json<EnvelopeResponse>, ApiError> {
    let mut payload = request.request_payload;
    debug!(
        "API: Create envelope request. Program: {}, Cycle: {}, Disbursements: {}",
        payload.program_mnemonic, payload.cycle_code_mnemonic, payload.disbursement_count
    );

    match create_envelope(&state.db_pool, &mut payload).await {
        Ok(()) => {
            info!(
                target: "audit",
                "Envelope created. ID: {}, Program: {}",
                payload.envelope_id.as_deref().unwrap_or_default(),
                payload.program_mnemonic
            );
            Ok(Json(EnvelopeResponse::success(payload)))
        },
        Err(ServiceError::Bridge(code)) => {
            warn!("API: Envelope creation rejected: {}", code);
            Ok(Json(EnvelopeResponse::failure(code)))
        },
        Err(ServiceError::Db(e)) => Err(e.into()),
    }
}

#[utoipa::path(
    post,
    path = "/disbursement_envelope/cancel",
    request_body = EnvelopeCancelRequest,
    responses(
        (status = 200, description = "Envelope cancelled, or a FAILURE envelope with the error code", body = EnvelopeResponse),
        (status = 500, description = "Internal server error", body = ApiError)
    )
)]
pub async fn api_cancel_envelope(
    State(state): State<AppState>,
    Json(request): Json<EnvelopeCancelRequest>,
) -> Result<Json<EnvelopeResponse>, ApiError> {
    let envelope_id = request.request_payload.envelope_id;
    debug!("API: Cancel envelope request. ID: {}", envelope_id);

    match cancel_envelope(&state.db_pool, &envelope_id).await {
        Ok(()) => {
            info!(target: "audit", "Envelope cancelled. ID: {}", envelope_id);
            Ok(Json(EnvelopeResponse {
                response_status: ResponseStatus::Success,
                response_payload: None,
                response_error_code: None,
            }))
        },
        Err(ServiceError::Bridge(code)) => {
            warn!("API: Envelope cancellation rejected for {}: {}", envelope_id, code);
            Ok(Json(EnvelopeResponse::failure(code)))
        },
        Err(ServiceError::Db(e)) => Err(e.into()),
    }
}
