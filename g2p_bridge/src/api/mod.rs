use axum::{
    Router,
    extract::FromRef,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

mod error;
pub mod disbursements;
pub mod envelopes;
pub mod statements;
mod version;

pub use error::{ApiError, ServiceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    Success,
    Failure,
}

#[derive(Clone)]
pub struct AppState {
    pub db_pool: SqlitePool,
}

impl FromRef<AppState> for SqlitePool {
    fn from_ref(state: &AppState) -> Self {
        state.db_pool.clone()
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        version::api_get_version,
        envelopes::api_create_envelope,
        envelopes::api_cancel_envelope,
        disbursements::api_create_disbursements,
        disbursements::api_cancel_disbursements,
        statements::api_upload_mt940,
    ),
    components(
        schemas(
            version::ServiceVersion,
            ResponseStatus,
            crate::errors::BridgeErrorCode,
            envelopes::EnvelopePayload,
            envelopes::EnvelopeRequest,
            envelopes::EnvelopeCancelPayload,
            envelopes::EnvelopeCancelRequest,
            envelopes::EnvelopeResponse,
            disbursements::DisbursementPayload,
            disbursements::DisbursementRequest,
            disbursements::DisbursementResponse,
            statements::StatementUploadResponse,
        )
    ),
    tags(
        (name = "g2p-bridge", description = "G2P Disbursement Bridge API"),
    )
)]
pub struct ApiDoc;

pub fn create_router(db_pool: SqlitePool) -> Router {
    let app_state = AppState { db_pool };

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/openapi.json", ApiDoc::openapi()))
        .route("/health/version", get(version::api_get_version))
        .route("/disbursement_envelope", post(envelopes::api_create_envelope))
        .route("/disbursement_envelope/cancel", post(envelopes::api_cancel_envelope))
        .route("/create_disbursements", post(disbursements::api_create_disbursements))
        .route("/cancel_disbursements", post(disbursements::api_cancel_disbursements))
        .route("/upload_mt940", post(statements::api_upload_mt940))
        .with_state(app_state)
}
