use anyhow::Context;
use config::{Config, Environment};
use serde::Deserialize;

use crate::fa::{DEFAULT_BANK_FA_STRATEGY, DEFAULT_EMAIL_WALLET_FA_STRATEGY, DEFAULT_MOBILE_WALLET_FA_STRATEGY};

/// Process-wide settings, read from environment variables. Everything except
/// `database_url` has a default so a local bridge starts with just a DB path.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeEnv {
    pub database_url: String,

    #[serde(default = "default_ip")]
    pub listen_ip: String,
    #[serde(default = "default_port")]
    pub listen_port: u16,

    #[serde(default = "default_attempts")]
    pub funds_available_check_attempts: i64,
    #[serde(default = "default_attempts")]
    pub funds_blocked_attempts: i64,
    #[serde(default = "default_attempts")]
    pub funds_disbursement_attempts: i64,
    #[serde(default = "default_attempts")]
    pub mapper_resolve_attempts: i64,
    #[serde(default = "default_attempts")]
    pub statement_process_attempts: i64,

    pub funds_check_sleep_secs: Option<u64>,
    pub funds_block_sleep_secs: Option<u64>,
    pub mapper_resolution_sleep_secs: Option<u64>,
    pub payment_dispatch_sleep_secs: Option<u64>,
    pub statement_process_sleep_secs: Option<u64>,

    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_mapper_resolve_api_url")]
    pub mapper_resolve_api_url: String,

    #[serde(default = "default_example_bank_code")]
    pub example_bank_code: String,
    #[serde(default = "default_check_funds_url")]
    pub bank_check_funds_url: String,
    #[serde(default = "default_block_funds_url")]
    pub bank_block_funds_url: String,
    #[serde(default = "default_initiate_payment_url")]
    pub bank_initiate_payment_url: String,

    #[serde(default = "default_bank_fa_strategy")]
    pub bank_fa_deconstruct_strategy: String,
    #[serde(default = "default_mobile_wallet_fa_strategy")]
    pub mobile_wallet_fa_deconstruct_strategy: String,
    #[serde(default = "default_email_wallet_fa_strategy")]
    pub email_wallet_fa_deconstruct_strategy: String,
}

fn default_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8040
}
fn default_attempts() -> i64 {
    3
}
fn default_http_timeout_secs() -> u64 {
    10
}
fn default_mapper_resolve_api_url() -> String {
    "http://localhost:8766/mapper/resolve".to_string()
}
fn default_example_bank_code() -> String {
    "EXAMPLE".to_string()
}
fn default_check_funds_url() -> String {
    "http://localhost:8123/check_funds".to_string()
}
fn default_block_funds_url() -> String {
    "http://localhost:8123/block_funds".to_string()
}
fn default_initiate_payment_url() -> String {
    "http://localhost:8123/initiate_payment".to_string()
}
fn default_bank_fa_strategy() -> String {
    DEFAULT_BANK_FA_STRATEGY.to_string()
}
fn default_mobile_wallet_fa_strategy() -> String {
    DEFAULT_MOBILE_WALLET_FA_STRATEGY.to_string()
}
fn default_email_wallet_fa_strategy() -> String {
    DEFAULT_EMAIL_WALLET_FA_STRATEGY.to_string()
}

impl BridgeEnv {
    pub fn load() -> anyhow::Result<Self> {
        let s = Config::builder()
            .add_source(Environment::default().separator("__"))
            .build()?;

        s.try_deserialize()
            .context("Failed to read configuration from environment variables")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_everything_but_the_database_url() {
        let env: BridgeEnv = serde_json::from_str(r#"{"database_url": "sqlite://bridge.db"}"#).unwrap();
        assert_eq!(env.listen_port, 8040);
        assert_eq!(env.funds_available_check_attempts, 3);
        assert_eq!(env.statement_process_attempts, 3);
        assert_eq!(env.example_bank_code, "EXAMPLE");
        assert!(env.funds_check_sleep_secs.is_none());
        assert_eq!(env.bank_fa_deconstruct_strategy, DEFAULT_BANK_FA_STRATEGY);
    }
}
