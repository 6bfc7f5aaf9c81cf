use chrono::{DateTime, NaiveDate, Utc};
use log::{info, warn};
use sqlx::{FromRow, SqliteConnection};

use crate::db::ProcessStatus;
use crate::errors::BridgeErrorCode;

/// Metadata of one uploaded MT940 file; header fields are filled in by the
/// statement processor after the first successful parse.
#[derive(Debug, Clone, FromRow)]
pub struct AccountStatement {
    pub statement_id: String,
    pub account_number: Option<String>,
    pub reference_number: Option<String>,
    pub statement_number: Option<String>,
    pub sequence_number: Option<String>,
    pub statement_date: DateTime<Utc>,
    pub process_status: ProcessStatus,
    pub process_error_code: Option<String>,
    pub process_attempts: i64,
    pub process_ts: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const STATEMENT_COLUMNS: &str = r#"
    statement_id,
    account_number,
    reference_number,
    statement_number,
    sequence_number,
    statement_date,
    process_status,
    process_error_code,
    process_attempts,
    process_ts,
    created_at,
    updated_at
"#;

impl AccountStatement {
    pub async fn create(conn: &mut SqliteConnection, statement_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO account_statements (statement_id, statement_date, process_status)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(statement_id)
        .bind(Utc::now())
        .bind(ProcessStatus::Pending)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn find_by_id(conn: &mut SqliteConnection, statement_id: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, AccountStatement>(&format!(
            "SELECT {STATEMENT_COLUMNS} FROM account_statements WHERE statement_id = ?"
        ))
        .bind(statement_id)
        .fetch_optional(conn)
        .await
    }

    pub async fn find_pending(conn: &mut SqliteConnection, max_attempts: i64) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, AccountStatement>(&format!(
            r#"
            SELECT {STATEMENT_COLUMNS}
            FROM account_statements
            WHERE process_status = ? AND process_attempts < ?
            ORDER BY created_at
            "#
        ))
        .bind(ProcessStatus::Pending)
        .bind(max_attempts)
        .fetch_all(conn)
        .await
    }

    pub async fn update_header(
        conn: &mut SqliteConnection,
        statement_id: &str,
        account_number: &str,
        reference_number: &str,
        statement_number: &str,
        sequence_number: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE account_statements
            SET account_number = ?,
                reference_number = ?,
                statement_number = ?,
                sequence_number = ?,
                updated_at = CURRENT_TIMESTAMP
            WHERE statement_id = ?
            "#,
        )
        .bind(account_number)
        .bind(reference_number)
        .bind(statement_number)
        .bind(sequence_number)
        .bind(statement_id)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn mark_processed(conn: &mut SqliteConnection, statement_id: &str) -> Result<(), sqlx::Error> {
        info!(target: "audit", "DB: Account statement {} PROCESSED.", statement_id);
        Self::record_outcome(conn, statement_id, ProcessStatus::Processed, None).await
    }

    /// Terminal statement-level failure (e.g. the account is not ours).
    pub async fn mark_error(
        conn: &mut SqliteConnection,
        statement_id: &str,
        error_code: BridgeErrorCode,
    ) -> Result<(), sqlx::Error> {
        warn!("DB: Account statement {} marked ERROR: {}", statement_id, error_code);
        Self::record_outcome(conn, statement_id, ProcessStatus::Error, Some(error_code)).await
    }

    /// Retryable failure; the statement stays PENDING for the next cycle.
    pub async fn mark_retry(
        conn: &mut SqliteConnection,
        statement_id: &str,
        error_code: BridgeErrorCode,
    ) -> Result<(), sqlx::Error> {
        warn!("DB: Account statement {} left PENDING: {}", statement_id, error_code);
        Self::record_outcome(conn, statement_id, ProcessStatus::Pending, Some(error_code)).await
    }

    async fn record_outcome(
        conn: &mut SqliteConnection,
        statement_id: &str,
        status: ProcessStatus,
        error_code: Option<BridgeErrorCode>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE account_statements
            SET process_status = ?,
                process_error_code = ?,
                process_ts = ?,
                process_attempts = process_attempts + 1,
                updated_at = CURRENT_TIMESTAMP
            WHERE statement_id = ?
            "#,
        )
        .bind(status)
        .bind(error_code.map(|c| c.as_str()))
        .bind(Utc::now())
        .bind(statement_id)
        .execute(conn)
        .await?;
        Ok(())
    }
}

/// Raw content of one uploaded statement.
#[derive(Debug, Clone, FromRow)]
pub struct AccountStatementLob {
    pub statement_id: String,
    pub statement_lob: String,
    pub created_at: DateTime<Utc>,
}

impl AccountStatementLob {
    pub async fn create(conn: &mut SqliteConnection, statement_id: &str, content: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO account_statement_lobs (statement_id, statement_lob)
            VALUES (?, ?)
            "#,
        )
        .bind(statement_id)
        .bind(content)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn find_by_statement_id(
        conn: &mut SqliteConnection,
        statement_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, AccountStatementLob>(
            "SELECT statement_id, statement_lob, created_at FROM account_statement_lobs WHERE statement_id = ?",
        )
        .bind(statement_id)
        .fetch_optional(conn)
        .await
    }
}

/// Reconciliation outcome for one disbursement: the debit half is written
/// when the statement shows the payment leaving the sponsor account, the
/// reversal half when a later statement returns it.
#[derive(Debug, Clone, FromRow)]
pub struct DisbursementRecon {
    pub disbursement_id: String,
    pub bank_disbursement_batch_id: String,
    pub beneficiary_name_from_bank: Option<String>,
    pub remittance_reference_number: Option<String>,
    pub remittance_statement_id: Option<String>,
    pub remittance_statement_number: Option<String>,
    pub remittance_statement_sequence: Option<String>,
    pub remittance_entry_sequence: Option<i64>,
    pub remittance_entry_date: Option<NaiveDate>,
    pub remittance_value_date: Option<NaiveDate>,
    pub reversal_found: bool,
    pub reversal_statement_id: Option<String>,
    pub reversal_statement_number: Option<String>,
    pub reversal_statement_sequence: Option<String>,
    pub reversal_entry_sequence: Option<i64>,
    pub reversal_entry_date: Option<NaiveDate>,
    pub reversal_value_date: Option<NaiveDate>,
    pub reversal_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const RECON_COLUMNS: &str = r#"
    disbursement_id,
    bank_disbursement_batch_id,
    beneficiary_name_from_bank,
    remittance_reference_number,
    remittance_statement_id,
    remittance_statement_number,
    remittance_statement_sequence,
    remittance_entry_sequence,
    remittance_entry_date,
    remittance_value_date,
    reversal_found,
    reversal_statement_id,
    reversal_statement_number,
    reversal_statement_sequence,
    reversal_entry_sequence,
    reversal_entry_date,
    reversal_value_date,
    reversal_reason,
    created_at,
    updated_at
"#;

/// Remittance-side fields of a new debit recon row.
#[derive(Debug, Clone)]
pub struct NewDebitRecon {
    pub disbursement_id: String,
    pub bank_disbursement_batch_id: String,
    pub beneficiary_name_from_bank: Option<String>,
    pub remittance_reference_number: Option<String>,
    pub remittance_statement_number: String,
    pub remittance_statement_sequence: String,
    pub remittance_entry_sequence: i64,
    pub remittance_entry_date: Option<NaiveDate>,
    pub remittance_value_date: NaiveDate,
}

/// Reversal-side fields applied to an existing recon row.
#[derive(Debug, Clone)]
pub struct ReversalUpdate {
    pub reversal_statement_number: String,
    pub reversal_statement_sequence: String,
    pub reversal_entry_sequence: i64,
    pub reversal_entry_date: Option<NaiveDate>,
    pub reversal_value_date: NaiveDate,
    pub reversal_reason: Option<String>,
}

impl DisbursementRecon {
    pub async fn find_by_disbursement_id(
        conn: &mut SqliteConnection,
        disbursement_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, DisbursementRecon>(&format!(
            "SELECT {RECON_COLUMNS} FROM disbursement_recons WHERE disbursement_id = ?"
        ))
        .bind(disbursement_id)
        .fetch_optional(conn)
        .await
    }

    pub async fn insert_debit(conn: &mut SqliteConnection, recon: &NewDebitRecon) -> Result<(), sqlx::Error> {
        info!(
            target: "audit",
            "DB: Disbursement {} reconciled against statement {}.",
            recon.disbursement_id, recon.remittance_statement_number
        );
        sqlx::query(
            r#"
            INSERT INTO disbursement_recons
                (disbursement_id, bank_disbursement_batch_id, beneficiary_name_from_bank,
                 remittance_reference_number, remittance_statement_id, remittance_statement_number,
                 remittance_statement_sequence, remittance_entry_sequence, remittance_entry_date,
                 remittance_value_date, reversal_found)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
            "#,
        )
        .bind(&recon.disbursement_id)
        .bind(&recon.bank_disbursement_batch_id)
        .bind(&recon.beneficiary_name_from_bank)
        .bind(&recon.remittance_reference_number)
        .bind(&recon.remittance_statement_number)
        .bind(&recon.remittance_statement_number)
        .bind(&recon.remittance_statement_sequence)
        .bind(recon.remittance_entry_sequence)
        .bind(recon.remittance_entry_date)
        .bind(recon.remittance_value_date)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn apply_reversal(
        conn: &mut SqliteConnection,
        disbursement_id: &str,
        update: &ReversalUpdate,
    ) -> Result<(), sqlx::Error> {
        info!(
            target: "audit",
            "DB: Reversal recorded for disbursement {} from statement {}.",
            disbursement_id, update.reversal_statement_number
        );
        sqlx::query(
            r#"
            UPDATE disbursement_recons
            SET reversal_found = 1,
                reversal_statement_id = ?,
                reversal_statement_number = ?,
                reversal_statement_sequence = ?,
                reversal_entry_sequence = ?,
                reversal_entry_date = ?,
                reversal_value_date = ?,
                reversal_reason = ?,
                updated_at = CURRENT_TIMESTAMP
            WHERE disbursement_id = ?
            "#,
        )
        .bind(&update.reversal_statement_number)
        .bind(&update.reversal_statement_number)
        .bind(&update.reversal_statement_sequence)
        .bind(update.reversal_entry_sequence)
        .bind(update.reversal_entry_date)
        .bind(update.reversal_value_date)
        .bind(&update.reversal_reason)
        .bind(disbursement_id)
        .execute(conn)
        .await?;
        Ok(())
    }
}

/// Statement line that could not be attributed to a disbursement.
#[derive(Debug, Clone, FromRow)]
pub struct DisbursementErrorRecon {
    pub id: i64,
    pub disbursement_id: Option<String>,
    pub bank_reference_number: Option<String>,
    pub statement_id: Option<String>,
    pub statement_number: Option<String>,
    pub statement_sequence: Option<String>,
    pub entry_sequence: Option<i64>,
    pub entry_date: Option<NaiveDate>,
    pub value_date: Option<NaiveDate>,
    pub error_reason: String,
    pub created_at: DateTime<Utc>,
}

/// Insert-shape for [`DisbursementErrorRecon`].
#[derive(Debug, Clone)]
pub struct NewErrorRecon {
    pub disbursement_id: Option<String>,
    pub bank_reference_number: Option<String>,
    pub statement_number: String,
    pub statement_sequence: String,
    pub entry_sequence: i64,
    pub entry_date: Option<NaiveDate>,
    pub value_date: NaiveDate,
    pub error_reason: BridgeErrorCode,
}

impl DisbursementErrorRecon {
    pub async fn create(conn: &mut SqliteConnection, recon: &NewErrorRecon) -> Result<(), sqlx::Error> {
        warn!(
            "DB: Error recon ({}) for statement {} entry {}.",
            recon.error_reason, recon.statement_number, recon.entry_sequence
        );
        sqlx::query(
            r#"
            INSERT INTO disbursement_error_recons
                (disbursement_id, bank_reference_number, statement_id, statement_number,
                 statement_sequence, entry_sequence, entry_date, value_date, error_reason)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&recon.disbursement_id)
        .bind(&recon.bank_reference_number)
        .bind(&recon.statement_number)
        .bind(&recon.statement_number)
        .bind(&recon.statement_sequence)
        .bind(recon.entry_sequence)
        .bind(recon.entry_date)
        .bind(recon.value_date)
        .bind(recon.error_reason.as_str())
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn find_by_statement_number(
        conn: &mut SqliteConnection,
        statement_number: &str,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, DisbursementErrorRecon>(
            r#"
            SELECT id, disbursement_id, bank_reference_number, statement_id, statement_number,
                   statement_sequence, entry_sequence, entry_date, value_date, error_reason, created_at
            FROM disbursement_error_recons
            WHERE statement_number = ?
            ORDER BY entry_sequence
            "#,
        )
        .bind(statement_number)
        .fetch_all(conn)
        .await
    }
}
