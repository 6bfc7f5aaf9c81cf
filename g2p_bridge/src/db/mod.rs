pub mod disbursement;
pub mod envelope;
pub mod program;
pub mod statement;

use serde::{Deserialize, Serialize};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::fmt;

pub async fn init_db(db_url: &str) -> Result<SqlitePool, anyhow::Error> {
    let pool = SqlitePoolOptions::new().max_connections(5).connect(db_url).await?;

    // Run migrations
    sqlx::migrate!("../migrations").run(&pool).await?;
    Ok(pool)
}

/// Processing state shared by batch statuses and account statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessStatus {
    Pending,
    Processed,
    Error,
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProcessStatus::Pending => write!(f, "PENDING"),
            ProcessStatus::Processed => write!(f, "PROCESSED"),
            ProcessStatus::Error => write!(f, "ERROR"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancellationStatus {
    NotCancelled,
    Cancelled,
}

impl fmt::Display for CancellationStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CancellationStatus::NotCancelled => write!(f, "NOT_CANCELLED"),
            CancellationStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}
