use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::CancellationStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
pub enum DisbursementFrequency {
    Daily,
    Weekly,
    Fortnightly,
    Monthly,
    BiMonthly,
    Quarterly,
    SemiAnnually,
    Annually,
    OnDemand,
}

impl FromStr for DisbursementFrequency {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Daily" => Ok(DisbursementFrequency::Daily),
            "Weekly" => Ok(DisbursementFrequency::Weekly),
            "Fortnightly" => Ok(DisbursementFrequency::Fortnightly),
            "Monthly" => Ok(DisbursementFrequency::Monthly),
            "BiMonthly" => Ok(DisbursementFrequency::BiMonthly),
            "Quarterly" => Ok(DisbursementFrequency::Quarterly),
            "SemiAnnually" => Ok(DisbursementFrequency::SemiAnnually),
            "Annually" => Ok(DisbursementFrequency::Annually),
            "OnDemand" => Ok(DisbursementFrequency::OnDemand),
            _ => Err(()),
        }
    }
}

impl fmt::Display for DisbursementFrequency {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            DisbursementFrequency::Daily => "Daily",
            DisbursementFrequency::Weekly => "Weekly",
            DisbursementFrequency::Fortnightly => "Fortnightly",
            DisbursementFrequency::Monthly => "Monthly",
            DisbursementFrequency::BiMonthly => "BiMonthly",
            DisbursementFrequency::Quarterly => "Quarterly",
            DisbursementFrequency::SemiAnnually => "SemiAnnually",
            DisbursementFrequency::Annually => "Annually",
            DisbursementFrequency::OnDemand => "OnDemand",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FundsAvailableStatus {
    PendingCheck,
    Available,
    NotAvailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FundsBlockedStatus {
    PendingCheck,
    BlockSuccess,
    BlockFailure,
}

/// Immutable declaration of a payment campaign. Only the cancellation columns
/// ever change after insert.
#[derive(Debug, Clone, FromRow)]
pub struct DisbursementEnvelope {
    pub envelope_id: String,
    pub program_mnemonic: String,
    pub cycle_code_mnemonic: String,
    pub frequency: DisbursementFrequency,
    pub beneficiary_count: i64,
    pub disbursement_count: i64,
    pub total_amount: i64,
    pub schedule_date: NaiveDate,
    pub cancellation_status: CancellationStatus,
    pub cancellation_ts: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const ENVELOPE_COLUMNS: &str = r#"
    envelope_id,
    program_mnemonic,
    cycle_code_mnemonic,
    frequency,
    beneficiary_count,
    disbursement_count,
    total_amount,
    schedule_date,
    cancellation_status,
    cancellation_ts,
    created_at,
    updated_at
"#;

impl DisbursementEnvelope {
    /// Inserts a new envelope. The caller owns the surrounding transaction.
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        conn: &mut SqliteConnection,
        program_mnemonic: &str,
        cycle_code_mnemonic: &str,
        frequency: DisbursementFrequency,
        beneficiary_count: i64,
        disbursement_count: i64,
        total_amount: i64,
        schedule_date: NaiveDate,
    ) -> Result<Self, sqlx::Error> {
        let envelope_id = Uuid::new_v4().to_string();
        debug!(
            "DB: Creating DisbursementEnvelope. ID: {}, Program: {}, Disbursements: {}",
            envelope_id, program_mnemonic, disbursement_count
        );

        let envelope = sqlx::query_as::<_, DisbursementEnvelope>(&format!(
            r#"
            INSERT INTO disbursement_envelopes
                (envelope_id, program_mnemonic, cycle_code_mnemonic, frequency,
                 beneficiary_count, disbursement_count, total_amount, schedule_date, cancellation_status)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {ENVELOPE_COLUMNS}
            "#
        ))
        .bind(&envelope_id)
        .bind(program_mnemonic)
        .bind(cycle_code_mnemonic)
        .bind(frequency)
        .bind(beneficiary_count)
        .bind(disbursement_count)
        .bind(total_amount)
        .bind(schedule_date)
        .bind(CancellationStatus::NotCancelled)
        .fetch_one(conn)
        .await?;

        info!(
            target: "audit",
            "DB: DisbursementEnvelope Created. ID: {}, Program: {}, Cycle: {}",
            envelope.envelope_id, envelope.program_mnemonic, envelope.cycle_code_mnemonic
        );

        Ok(envelope)
    }

    pub async fn find_by_id(conn: &mut SqliteConnection, envelope_id: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, DisbursementEnvelope>(&format!(
            "SELECT {ENVELOPE_COLUMNS} FROM disbursement_envelopes WHERE envelope_id = ?"
        ))
        .bind(envelope_id)
        .fetch_optional(conn)
        .await
    }

    pub async fn cancel(conn: &mut SqliteConnection, envelope_id: &str) -> Result<(), sqlx::Error> {
        info!(target: "audit", "DB: DisbursementEnvelope {} CANCELLED.", envelope_id);
        sqlx::query(
            r#"
            UPDATE disbursement_envelopes
            SET cancellation_status = ?, cancellation_ts = ?, updated_at = CURRENT_TIMESTAMP
            WHERE envelope_id = ?
            "#,
        )
        .bind(CancellationStatus::Cancelled)
        .bind(Utc::now())
        .bind(envelope_id)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Envelopes due for the fund-availability check: past their schedule
    /// date, fully received, and still pending or failed under the retry cap.
    pub async fn find_fund_check_eligible(
        conn: &mut SqliteConnection,
        today: NaiveDate,
        max_attempts: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, DisbursementEnvelope>(
            r#"
            SELECT
                e.envelope_id,
                e.program_mnemonic,
                e.cycle_code_mnemonic,
                e.frequency,
                e.beneficiary_count,
                e.disbursement_count,
                e.total_amount,
                e.schedule_date,
                e.cancellation_status,
                e.cancellation_ts,
                e.created_at,
                e.updated_at
            FROM disbursement_envelopes e
            JOIN disbursement_envelope_batch_statuses b ON b.envelope_id = e.envelope_id
            WHERE e.cancellation_status = ?
              AND e.schedule_date < ?
              AND b.received_count = e.disbursement_count
              AND b.received_amount = e.total_amount
              AND b.funds_available_status IN (?, ?)
              AND b.funds_available_attempts < ?
            ORDER BY e.created_at
            "#,
        )
        .bind(CancellationStatus::NotCancelled)
        .bind(today)
        .bind(FundsAvailableStatus::PendingCheck)
        .bind(FundsAvailableStatus::NotAvailable)
        .bind(max_attempts)
        .fetch_all(conn)
        .await
    }

    /// Envelopes whose funds are confirmed available and still need a block.
    pub async fn find_fund_block_eligible(
        conn: &mut SqliteConnection,
        today: NaiveDate,
        max_attempts: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, DisbursementEnvelope>(
            r#"
            SELECT
                e.envelope_id,
                e.program_mnemonic,
                e.cycle_code_mnemonic,
                e.frequency,
                e.beneficiary_count,
                e.disbursement_count,
                e.total_amount,
                e.schedule_date,
                e.cancellation_status,
                e.cancellation_ts,
                e.created_at,
                e.updated_at
            FROM disbursement_envelopes e
            JOIN disbursement_envelope_batch_statuses b ON b.envelope_id = e.envelope_id
            WHERE e.cancellation_status = ?
              AND e.schedule_date <= ?
              AND b.received_count = e.disbursement_count
              AND b.funds_available_status = ?
              AND b.funds_blocked_status IN (?, ?)
              AND b.funds_blocked_attempts < ?
            ORDER BY e.created_at
            "#,
        )
        .bind(CancellationStatus::NotCancelled)
        .bind(today)
        .bind(FundsAvailableStatus::Available)
        .bind(FundsBlockedStatus::PendingCheck)
        .bind(FundsBlockedStatus::BlockFailure)
        .bind(max_attempts)
        .fetch_all(conn)
        .await
    }

    /// Envelopes with a successful fund block whose batches may be dispatched.
    pub async fn find_dispatch_eligible(
        conn: &mut SqliteConnection,
        today: NaiveDate,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, DisbursementEnvelope>(
            r#"
            SELECT
                e.envelope_id,
                e.program_mnemonic,
                e.cycle_code_mnemonic,
                e.frequency,
                e.beneficiary_count,
                e.disbursement_count,
                e.total_amount,
                e.schedule_date,
                e.cancellation_status,
                e.cancellation_ts,
                e.created_at,
                e.updated_at
            FROM disbursement_envelopes e
            JOIN disbursement_envelope_batch_statuses b ON b.envelope_id = e.envelope_id
            WHERE e.cancellation_status = ?
              AND e.schedule_date <= ?
              AND b.received_count = e.disbursement_count
              AND b.funds_blocked_status = ?
            ORDER BY e.created_at
            "#,
        )
        .bind(CancellationStatus::NotCancelled)
        .bind(today)
        .bind(FundsBlockedStatus::BlockSuccess)
        .fetch_all(conn)
        .await
    }
}

/// Mutable running totals and per-stage state for one envelope (1:1).
#[derive(Debug, Clone, FromRow)]
pub struct EnvelopeBatchStatus {
    pub envelope_id: String,
    pub received_count: i64,
    pub received_amount: i64,
    pub shipped_count: i64,
    pub succeeded_count: i64,
    pub failed_count: i64,
    pub funds_available_status: FundsAvailableStatus,
    pub funds_available_ts: Option<DateTime<Utc>>,
    pub funds_available_error_code: Option<String>,
    pub funds_available_attempts: i64,
    pub funds_blocked_status: FundsBlockedStatus,
    pub funds_blocked_ts: Option<DateTime<Utc>>,
    pub funds_blocked_error_code: Option<String>,
    pub funds_blocked_attempts: i64,
    pub block_reference_no: Option<String>,
    pub id_mapper_resolution_required: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const BATCH_STATUS_COLUMNS: &str = r#"
    envelope_id,
    received_count,
    received_amount,
    shipped_count,
    succeeded_count,
    failed_count,
    funds_available_status,
    funds_available_ts,
    funds_available_error_code,
    funds_available_attempts,
    funds_blocked_status,
    funds_blocked_ts,
    funds_blocked_error_code,
    funds_blocked_attempts,
    block_reference_no,
    id_mapper_resolution_required,
    created_at,
    updated_at
"#;

impl EnvelopeBatchStatus {
    pub async fn create(
        conn: &mut SqliteConnection,
        envelope_id: &str,
        id_mapper_resolution_required: bool,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, EnvelopeBatchStatus>(&format!(
            r#"
            INSERT INTO disbursement_envelope_batch_statuses
                (envelope_id, funds_available_status, funds_blocked_status, id_mapper_resolution_required)
            VALUES (?, ?, ?, ?)
            RETURNING {BATCH_STATUS_COLUMNS}
            "#
        ))
        .bind(envelope_id)
        .bind(FundsAvailableStatus::PendingCheck)
        .bind(FundsBlockedStatus::PendingCheck)
        .bind(id_mapper_resolution_required)
        .fetch_one(conn)
        .await
    }

    pub async fn find_by_envelope_id(
        conn: &mut SqliteConnection,
        envelope_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, EnvelopeBatchStatus>(&format!(
            "SELECT {BATCH_STATUS_COLUMNS} FROM disbursement_envelope_batch_statuses WHERE envelope_id = ?"
        ))
        .bind(envelope_id)
        .fetch_optional(conn)
        .await
    }

    /// Adjusts the received counters. Deltas are signed; cancellation paths
    /// pass negatives and must have verified non-negativity beforehand.
    pub async fn adjust_received(
        conn: &mut SqliteConnection,
        envelope_id: &str,
        count_delta: i64,
        amount_delta: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE disbursement_envelope_batch_statuses
            SET received_count = received_count + ?,
                received_amount = received_amount + ?,
                updated_at = CURRENT_TIMESTAMP
            WHERE envelope_id = ?
            "#,
        )
        .bind(count_delta)
        .bind(amount_delta)
        .bind(envelope_id)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn record_funds_check(
        conn: &mut SqliteConnection,
        envelope_id: &str,
        status: FundsAvailableStatus,
        error_code: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE disbursement_envelope_batch_statuses
            SET funds_available_status = ?,
                funds_available_error_code = ?,
                funds_available_ts = ?,
                funds_available_attempts = funds_available_attempts + 1,
                updated_at = CURRENT_TIMESTAMP
            WHERE envelope_id = ?
            "#,
        )
        .bind(status)
        .bind(error_code)
        .bind(Utc::now())
        .bind(envelope_id)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn record_funds_block(
        conn: &mut SqliteConnection,
        envelope_id: &str,
        status: FundsBlockedStatus,
        block_reference_no: Option<&str>,
        error_code: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE disbursement_envelope_batch_statuses
            SET funds_blocked_status = ?,
                block_reference_no = ?,
                funds_blocked_error_code = ?,
                funds_blocked_ts = ?,
                funds_blocked_attempts = funds_blocked_attempts + 1,
                updated_at = CURRENT_TIMESTAMP
            WHERE envelope_id = ?
            "#,
        )
        .bind(status)
        .bind(block_reference_no)
        .bind(error_code)
        .bind(Utc::now())
        .bind(envelope_id)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn add_shipped(conn: &mut SqliteConnection, envelope_id: &str, delta: i64) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE disbursement_envelope_batch_statuses
            SET shipped_count = shipped_count + ?, updated_at = CURRENT_TIMESTAMP
            WHERE envelope_id = ?
            "#,
        )
        .bind(delta)
        .bind(envelope_id)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn add_succeeded(conn: &mut SqliteConnection, envelope_id: &str, delta: i64) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE disbursement_envelope_batch_statuses
            SET succeeded_count = succeeded_count + ?, updated_at = CURRENT_TIMESTAMP
            WHERE envelope_id = ?
            "#,
        )
        .bind(delta)
        .bind(envelope_id)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn add_failed(conn: &mut SqliteConnection, envelope_id: &str, delta: i64) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE disbursement_envelope_batch_statuses
            SET failed_count = failed_count + ?, updated_at = CURRENT_TIMESTAMP
            WHERE envelope_id = ?
            "#,
        )
        .bind(delta)
        .bind(envelope_id)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Stage-1 predicate on the status row alone.
    pub fn fund_check_pending(&self, max_attempts: i64) -> bool {
        matches!(
            self.funds_available_status,
            FundsAvailableStatus::PendingCheck | FundsAvailableStatus::NotAvailable
        ) && self.funds_available_attempts < max_attempts
    }

    /// Stage-2 predicate on the status row alone.
    pub fn fund_block_pending(&self, max_attempts: i64) -> bool {
        self.funds_available_status == FundsAvailableStatus::Available
            && matches!(
                self.funds_blocked_status,
                FundsBlockedStatus::PendingCheck | FundsBlockedStatus::BlockFailure
            )
            && self.funds_blocked_attempts < max_attempts
    }
}
