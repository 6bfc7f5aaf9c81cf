use axum::{Json, extract::Multipart, extract::State};
use log::{debug, info, warn};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    api::{AppState, ResponseStatus, error::ApiError},
    db::statement::{AccountStatement, AccountStatementLob},
    errors::BridgeErrorCode,
};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StatementUploadResponse {
    pub response_status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_error_code: Option<BridgeErrorCode>,
}

impl StatementUploadResponse {
    fn success(statement_id: String) -> Self {
        Self {
            response_status: ResponseStatus::Success,
            statement_id: Some(statement_id),
            response_error_code: None,
        }
    }

    fn failure(code: BridgeErrorCode) -> Self {
        Self {
            response_status: ResponseStatus::Failure,
            statement_id: None,
            response_error_code: Some(code),
        }
    }
}

#[utoipa::path(
    post,
    path = "/upload_mt940",
    responses(
        (status = 200, description = "Statement stored for reconciliation, or a FAILURE envelope", body = StatementUploadResponse),
        (status = 500, description = "Internal server error", body = ApiError)
    )
)]
pub async fn api_upload_mt940(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<StatementUploadResponse>, ApiError> {
    debug!("API: MT940 statement upload");

    let content = match read_statement_file(&mut multipart).await {
        Ok(Some(content)) => content,
        Ok(None) => {
            warn!("API: MT940 upload without a file part");
            return Ok(Json(StatementUploadResponse::failure(BridgeErrorCode::StatementUploadError)));
        },
        Err(e) => {
            warn!("API: Failed to read MT940 upload: {}", e);
            return Ok(Json(StatementUploadResponse::failure(BridgeErrorCode::StatementUploadError)));
        },
    };

    let statement_id = Uuid::new_v4().to_string();

    let mut tx = state.db_pool.begin().await?;
    AccountStatement::create(&mut tx, &statement_id).await?;
    AccountStatementLob::create(&mut tx, &statement_id, &content).await?;
    tx.commit().await?;

    info!(target: "audit", "Account statement uploaded. ID: {}, Bytes: {}", statement_id, content.len());

    Ok(Json(StatementUploadResponse::success(statement_id)))
}

async fn read_statement_file(multipart: &mut Multipart) -> Result<Option<String>, axum::extract::multipart::MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        let bytes = field.bytes().await?;
        if !bytes.is_empty() {
            return Ok(Some(String::from_utf8_lossy(&bytes).into_owned()));
        }
    }
    Ok(None)
}
