use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use sqlx::{FromRow, SqliteConnection};

use crate::db::{CancellationStatus, ProcessStatus};
use crate::fa::FaType;
use crate::utils::ids::next_disbursement_id;

/// A single beneficiary line inside an envelope.
#[derive(Debug, Clone, FromRow)]
pub struct Disbursement {
    pub disbursement_id: String,
    pub envelope_id: String,
    pub beneficiary_id: String,
    pub beneficiary_name: String,
    pub narrative: String,
    pub amount: i64,
    pub cancellation_status: CancellationStatus,
    pub cancellation_ts: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const DISBURSEMENT_COLUMNS: &str = r#"
    disbursement_id,
    envelope_id,
    beneficiary_id,
    beneficiary_name,
    narrative,
    amount,
    cancellation_status,
    cancellation_ts,
    created_at,
    updated_at
"#;

impl Disbursement {
    pub async fn create(
        conn: &mut SqliteConnection,
        envelope_id: &str,
        beneficiary_id: &str,
        beneficiary_name: &str,
        narrative: &str,
        amount: i64,
    ) -> Result<Self, sqlx::Error> {
        let disbursement_id = next_disbursement_id();
        debug!(
            "DB: Creating Disbursement. ID: {}, Envelope: {}",
            disbursement_id, envelope_id
        );

        sqlx::query_as::<_, Disbursement>(&format!(
            r#"
            INSERT INTO disbursements
                (disbursement_id, envelope_id, beneficiary_id, beneficiary_name, narrative, amount, cancellation_status)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING {DISBURSEMENT_COLUMNS}
            "#
        ))
        .bind(&disbursement_id)
        .bind(envelope_id)
        .bind(beneficiary_id)
        .bind(beneficiary_name)
        .bind(narrative)
        .bind(amount)
        .bind(CancellationStatus::NotCancelled)
        .fetch_one(conn)
        .await
    }

    pub async fn find_by_ids(conn: &mut SqliteConnection, ids: &[String]) -> Result<Vec<Self>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let json = serde_json::to_string(ids).map_err(|e| sqlx::Error::Configuration(Box::new(e)))?;

        sqlx::query_as::<_, Disbursement>(&format!(
            r#"
            SELECT {DISBURSEMENT_COLUMNS}
            FROM disbursements
            WHERE disbursement_id IN (SELECT value FROM json_each(?))
            ORDER BY disbursement_id
            "#
        ))
        .bind(json)
        .fetch_all(conn)
        .await
    }

    pub async fn cancel_many(conn: &mut SqliteConnection, ids: &[String]) -> Result<(), sqlx::Error> {
        warn!("DB: Cancelling {} disbursements", ids.len());
        let json = serde_json::to_string(ids).map_err(|e| sqlx::Error::Configuration(Box::new(e)))?;

        sqlx::query(
            r#"
            UPDATE disbursements
            SET cancellation_status = ?, cancellation_ts = ?, updated_at = CURRENT_TIMESTAMP
            WHERE disbursement_id IN (SELECT value FROM json_each(?))
            "#,
        )
        .bind(CancellationStatus::Cancelled)
        .bind(Utc::now())
        .bind(json)
        .execute(conn)
        .await?;
        Ok(())
    }
}

/// Links one disbursement to the mapper-resolution batch and the
/// bank-dispatch batch it was ingested with.
#[derive(Debug, Clone, FromRow)]
pub struct DisbursementBatchControl {
    pub disbursement_id: String,
    pub envelope_id: String,
    pub beneficiary_id: String,
    pub mapper_resolution_batch_id: String,
    pub bank_disbursement_batch_id: String,
    pub created_at: DateTime<Utc>,
}

const BATCH_CONTROL_COLUMNS: &str = r#"
    disbursement_id,
    envelope_id,
    beneficiary_id,
    mapper_resolution_batch_id,
    bank_disbursement_batch_id,
    created_at
"#;

impl DisbursementBatchControl {
    pub async fn create(
        conn: &mut SqliteConnection,
        disbursement_id: &str,
        envelope_id: &str,
        beneficiary_id: &str,
        mapper_resolution_batch_id: &str,
        bank_disbursement_batch_id: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO disbursement_batch_controls
                (disbursement_id, envelope_id, beneficiary_id, mapper_resolution_batch_id, bank_disbursement_batch_id)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(disbursement_id)
        .bind(envelope_id)
        .bind(beneficiary_id)
        .bind(mapper_resolution_batch_id)
        .bind(bank_disbursement_batch_id)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn find_by_disbursement_id(
        conn: &mut SqliteConnection,
        disbursement_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, DisbursementBatchControl>(&format!(
            "SELECT {BATCH_CONTROL_COLUMNS} FROM disbursement_batch_controls WHERE disbursement_id = ?"
        ))
        .bind(disbursement_id)
        .fetch_optional(conn)
        .await
    }

    pub async fn find_by_mapper_batch(
        conn: &mut SqliteConnection,
        mapper_resolution_batch_id: &str,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, DisbursementBatchControl>(&format!(
            r#"
            SELECT {BATCH_CONTROL_COLUMNS}
            FROM disbursement_batch_controls
            WHERE mapper_resolution_batch_id = ?
            ORDER BY disbursement_id
            "#
        ))
        .bind(mapper_resolution_batch_id)
        .fetch_all(conn)
        .await
    }

    pub async fn find_by_bank_batch(
        conn: &mut SqliteConnection,
        bank_disbursement_batch_id: &str,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, DisbursementBatchControl>(&format!(
            r#"
            SELECT {BATCH_CONTROL_COLUMNS}
            FROM disbursement_batch_controls
            WHERE bank_disbursement_batch_id = ?
            ORDER BY disbursement_id
            "#
        ))
        .bind(bank_disbursement_batch_id)
        .fetch_all(conn)
        .await
    }
}

/// One row per bank-dispatch batch.
#[derive(Debug, Clone, FromRow)]
pub struct BankDisbursementBatchStatus {
    pub batch_id: String,
    pub envelope_id: String,
    pub status: ProcessStatus,
    pub latest_error_code: Option<String>,
    pub attempts: i64,
    pub dispatched_ts: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const BANK_BATCH_COLUMNS: &str = r#"
    batch_id,
    envelope_id,
    status,
    latest_error_code,
    attempts,
    dispatched_ts,
    created_at,
    updated_at
"#;

impl BankDisbursementBatchStatus {
    pub async fn create(conn: &mut SqliteConnection, batch_id: &str, envelope_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO bank_disbursement_batch_statuses (batch_id, envelope_id, status)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(batch_id)
        .bind(envelope_id)
        .bind(ProcessStatus::Pending)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn find_by_id(conn: &mut SqliteConnection, batch_id: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, BankDisbursementBatchStatus>(&format!(
            "SELECT {BANK_BATCH_COLUMNS} FROM bank_disbursement_batch_statuses WHERE batch_id = ?"
        ))
        .bind(batch_id)
        .fetch_optional(conn)
        .await
    }

    pub async fn find_pending_for_envelope(
        conn: &mut SqliteConnection,
        envelope_id: &str,
        max_attempts: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, BankDisbursementBatchStatus>(&format!(
            r#"
            SELECT {BANK_BATCH_COLUMNS}
            FROM bank_disbursement_batch_statuses
            WHERE envelope_id = ? AND status = ? AND attempts < ?
            ORDER BY created_at
            "#
        ))
        .bind(envelope_id)
        .bind(ProcessStatus::Pending)
        .bind(max_attempts)
        .fetch_all(conn)
        .await
    }

    /// Marks the batch shipped. The caller re-reads the row inside its
    /// transaction first so the success effect fires at most once.
    pub async fn mark_processed(conn: &mut SqliteConnection, batch_id: &str) -> Result<(), sqlx::Error> {
        info!(target: "audit", "DB: Bank disbursement batch {} PROCESSED.", batch_id);
        sqlx::query(
            r#"
            UPDATE bank_disbursement_batch_statuses
            SET status = ?,
                latest_error_code = NULL,
                dispatched_ts = ?,
                attempts = attempts + 1,
                updated_at = CURRENT_TIMESTAMP
            WHERE batch_id = ?
            "#,
        )
        .bind(ProcessStatus::Processed)
        .bind(Utc::now())
        .bind(batch_id)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn record_failure(
        conn: &mut SqliteConnection,
        batch_id: &str,
        error_code: &str,
    ) -> Result<(), sqlx::Error> {
        warn!("DB: Bank disbursement batch {} failed: {}", batch_id, error_code);
        sqlx::query(
            r#"
            UPDATE bank_disbursement_batch_statuses
            SET status = ?,
                latest_error_code = ?,
                dispatched_ts = ?,
                attempts = attempts + 1,
                updated_at = CURRENT_TIMESTAMP
            WHERE batch_id = ?
            "#,
        )
        .bind(ProcessStatus::Pending)
        .bind(error_code)
        .bind(Utc::now())
        .bind(batch_id)
        .execute(conn)
        .await?;
        Ok(())
    }
}

/// One row per mapper-resolution batch.
#[derive(Debug, Clone, FromRow)]
pub struct MapperResolutionBatchStatus {
    pub batch_id: String,
    pub status: ProcessStatus,
    pub latest_error_code: Option<String>,
    pub attempts: i64,
    pub resolution_ts: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const MAPPER_BATCH_COLUMNS: &str = r#"
    batch_id,
    status,
    latest_error_code,
    attempts,
    resolution_ts,
    created_at,
    updated_at
"#;

impl MapperResolutionBatchStatus {
    pub async fn create(conn: &mut SqliteConnection, batch_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO mapper_resolution_batch_statuses (batch_id, status)
            VALUES (?, ?)
            "#,
        )
        .bind(batch_id)
        .bind(ProcessStatus::Pending)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn find_by_id(conn: &mut SqliteConnection, batch_id: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, MapperResolutionBatchStatus>(&format!(
            "SELECT {MAPPER_BATCH_COLUMNS} FROM mapper_resolution_batch_statuses WHERE batch_id = ?"
        ))
        .bind(batch_id)
        .fetch_optional(conn)
        .await
    }

    pub async fn find_pending(conn: &mut SqliteConnection, max_attempts: i64) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, MapperResolutionBatchStatus>(&format!(
            r#"
            SELECT {MAPPER_BATCH_COLUMNS}
            FROM mapper_resolution_batch_statuses
            WHERE status = ? AND attempts < ?
            ORDER BY created_at
            "#
        ))
        .bind(ProcessStatus::Pending)
        .bind(max_attempts)
        .fetch_all(conn)
        .await
    }

    pub async fn mark_processed(conn: &mut SqliteConnection, batch_id: &str) -> Result<(), sqlx::Error> {
        info!(target: "audit", "DB: Mapper resolution batch {} PROCESSED.", batch_id);
        sqlx::query(
            r#"
            UPDATE mapper_resolution_batch_statuses
            SET status = ?,
                latest_error_code = NULL,
                resolution_ts = ?,
                attempts = attempts + 1,
                updated_at = CURRENT_TIMESTAMP
            WHERE batch_id = ?
            "#,
        )
        .bind(ProcessStatus::Processed)
        .bind(Utc::now())
        .bind(batch_id)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn record_failure(
        conn: &mut SqliteConnection,
        batch_id: &str,
        error_code: &str,
    ) -> Result<(), sqlx::Error> {
        warn!("DB: Mapper resolution batch {} failed: {}", batch_id, error_code);
        sqlx::query(
            r#"
            UPDATE mapper_resolution_batch_statuses
            SET status = ?,
                latest_error_code = ?,
                attempts = attempts + 1,
                updated_at = CURRENT_TIMESTAMP
            WHERE batch_id = ?
            "#,
        )
        .bind(ProcessStatus::Pending)
        .bind(error_code)
        .bind(batch_id)
        .execute(conn)
        .await?;
        Ok(())
    }
}

/// Resolved financial address for one disbursement.
#[derive(Debug, Clone, FromRow)]
pub struct MapperResolutionDetails {
    pub disbursement_id: String,
    pub mapper_resolution_batch_id: String,
    pub beneficiary_id: String,
    pub resolved_fa: String,
    pub resolved_name: Option<String>,
    pub fa_type: Option<FaType>,
    pub account_number: Option<String>,
    pub bank_code: Option<String>,
    pub branch_code: Option<String>,
    pub mobile_number: Option<String>,
    pub mobile_wallet_provider: Option<String>,
    pub email_address: Option<String>,
    pub email_wallet_provider: Option<String>,
    pub created_at: DateTime<Utc>,
}

const MAPPER_DETAILS_COLUMNS: &str = r#"
    disbursement_id,
    mapper_resolution_batch_id,
    beneficiary_id,
    resolved_fa,
    resolved_name,
    fa_type,
    account_number,
    bank_code,
    branch_code,
    mobile_number,
    mobile_wallet_provider,
    email_address,
    email_wallet_provider,
    created_at
"#;

/// Insert-shape for [`MapperResolutionDetails`]; the resolution worker builds
/// the whole batch before writing anything.
#[derive(Debug, Clone)]
pub struct NewMapperResolutionDetails {
    pub disbursement_id: String,
    pub mapper_resolution_batch_id: String,
    pub beneficiary_id: String,
    pub resolved_fa: String,
    pub resolved_name: Option<String>,
    pub fa_type: Option<FaType>,
    pub account_number: Option<String>,
    pub bank_code: Option<String>,
    pub branch_code: Option<String>,
    pub mobile_number: Option<String>,
    pub mobile_wallet_provider: Option<String>,
    pub email_address: Option<String>,
    pub email_wallet_provider: Option<String>,
}

impl MapperResolutionDetails {
    pub async fn create(conn: &mut SqliteConnection, details: &NewMapperResolutionDetails) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO mapper_resolution_details
                (disbursement_id, mapper_resolution_batch_id, beneficiary_id, resolved_fa, resolved_name,
                 fa_type, account_number, bank_code, branch_code, mobile_number, mobile_wallet_provider,
                 email_address, email_wallet_provider)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&details.disbursement_id)
        .bind(&details.mapper_resolution_batch_id)
        .bind(&details.beneficiary_id)
        .bind(&details.resolved_fa)
        .bind(&details.resolved_name)
        .bind(details.fa_type)
        .bind(&details.account_number)
        .bind(&details.bank_code)
        .bind(&details.branch_code)
        .bind(&details.mobile_number)
        .bind(&details.mobile_wallet_provider)
        .bind(&details.email_address)
        .bind(&details.email_wallet_provider)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn find_by_disbursement_id(
        conn: &mut SqliteConnection,
        disbursement_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, MapperResolutionDetails>(&format!(
            "SELECT {MAPPER_DETAILS_COLUMNS} FROM mapper_resolution_details WHERE disbursement_id = ?"
        ))
        .bind(disbursement_id)
        .fetch_optional(conn)
        .await
    }
}
