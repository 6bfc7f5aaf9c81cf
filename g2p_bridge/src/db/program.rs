use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection};

/// Program-to-sponsor-bank routing. Seeded operationally; read-only to the
/// pipeline.
#[derive(Debug, Clone, FromRow)]
pub struct BenefitProgramConfiguration {
    pub program_mnemonic: String,
    pub sponsor_bank_code: String,
    pub sponsor_bank_account_number: String,
    pub sponsor_bank_account_currency: String,
    pub id_mapper_resolution_required: bool,
    pub created_at: DateTime<Utc>,
}

const PROGRAM_COLUMNS: &str = r#"
    program_mnemonic,
    sponsor_bank_code,
    sponsor_bank_account_number,
    sponsor_bank_account_currency,
    id_mapper_resolution_required,
    created_at
"#;

impl BenefitProgramConfiguration {
    pub async fn create(
        conn: &mut SqliteConnection,
        program_mnemonic: &str,
        sponsor_bank_code: &str,
        sponsor_bank_account_number: &str,
        sponsor_bank_account_currency: &str,
        id_mapper_resolution_required: bool,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, BenefitProgramConfiguration>(&format!(
            r#"
            INSERT INTO benefit_program_configurations
                (program_mnemonic, sponsor_bank_code, sponsor_bank_account_number,
                 sponsor_bank_account_currency, id_mapper_resolution_required)
            VALUES (?, ?, ?, ?, ?)
            RETURNING {PROGRAM_COLUMNS}
            "#
        ))
        .bind(program_mnemonic)
        .bind(sponsor_bank_code)
        .bind(sponsor_bank_account_number)
        .bind(sponsor_bank_account_currency)
        .bind(id_mapper_resolution_required)
        .fetch_one(conn)
        .await
    }

    pub async fn find_by_mnemonic(
        conn: &mut SqliteConnection,
        program_mnemonic: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, BenefitProgramConfiguration>(&format!(
            "SELECT {PROGRAM_COLUMNS} FROM benefit_program_configurations WHERE program_mnemonic = ?"
        ))
        .bind(program_mnemonic)
        .fetch_optional(conn)
        .await
    }

    /// Matches an uploaded statement's account identification against the
    /// sponsor accounts the bridge knows about.
    pub async fn find_by_account_number(
        conn: &mut SqliteConnection,
        sponsor_bank_account_number: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, BenefitProgramConfiguration>(&format!(
            "SELECT {PROGRAM_COLUMNS} FROM benefit_program_configurations WHERE sponsor_bank_account_number = ?"
        ))
        .bind(sponsor_bank_account_number)
        .fetch_optional(conn)
        .await
    }
}
