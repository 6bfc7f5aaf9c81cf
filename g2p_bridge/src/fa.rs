use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

use crate::config::BridgeEnv;

/// Financial address types as they prefix the mapper's FA strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FaType {
    BankAccount,
    MobileWallet,
    EmailWallet,
}

impl FaType {
    pub fn prefix(&self) -> &'static str {
        match self {
            FaType::BankAccount => "BANK_ACCOUNT",
            FaType::MobileWallet => "MOBILE_WALLET",
            FaType::EmailWallet => "EMAIL_WALLET",
        }
    }
}

impl fmt::Display for FaType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

pub const DEFAULT_BANK_FA_STRATEGY: &str =
    r"^BANK_ACCOUNT:(?P<account_number>[0-9A-Za-z]+)\.(?P<branch_code>[0-9A-Za-z]+)@(?P<bank_code>[0-9A-Za-z]+)$";
pub const DEFAULT_MOBILE_WALLET_FA_STRATEGY: &str =
    r"^MOBILE_WALLET:(?P<mobile_number>\+?[0-9]+)@(?P<mobile_wallet_provider>[0-9A-Za-z._-]+)$";
pub const DEFAULT_EMAIL_WALLET_FA_STRATEGY: &str =
    r"^EMAIL_WALLET:(?P<email_address>.+@.+)@(?P<email_wallet_provider>[^@]+)$";

/// Fields extracted from an FA string. Only the fields of the matched type
/// are populated; an unrecognized prefix leaves everything empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeconstructedFa {
    pub fa_type: Option<FaType>,
    pub account_number: Option<String>,
    pub bank_code: Option<String>,
    pub branch_code: Option<String>,
    pub mobile_number: Option<String>,
    pub mobile_wallet_provider: Option<String>,
    pub email_address: Option<String>,
    pub email_wallet_provider: Option<String>,
}

/// Regex-driven FA deconstruction; the per-type strategies come from
/// configuration and are compiled once at startup.
pub struct FaDeconstructor {
    bank: Regex,
    mobile: Regex,
    email: Regex,
}

impl FaDeconstructor {
    pub fn new(bank_strategy: &str, mobile_strategy: &str, email_strategy: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            bank: Regex::new(bank_strategy)?,
            mobile: Regex::new(mobile_strategy)?,
            email: Regex::new(email_strategy)?,
        })
    }

    pub fn from_env(env: &BridgeEnv) -> Result<Self, regex::Error> {
        Self::new(
            &env.bank_fa_deconstruct_strategy,
            &env.mobile_wallet_fa_deconstruct_strategy,
            &env.email_wallet_fa_deconstruct_strategy,
        )
    }

    pub fn deconstruct(&self, fa: &str) -> DeconstructedFa {
        let (fa_type, strategy) = if fa.starts_with(FaType::BankAccount.prefix()) {
            (FaType::BankAccount, &self.bank)
        } else if fa.starts_with(FaType::MobileWallet.prefix()) {
            (FaType::MobileWallet, &self.mobile)
        } else if fa.starts_with(FaType::EmailWallet.prefix()) {
            (FaType::EmailWallet, &self.email)
        } else {
            return DeconstructedFa::default();
        };

        let captures = match strategy.captures(fa) {
            Some(captures) => captures,
            None => return DeconstructedFa::default(),
        };
        let group = |name: &str| captures.name(name).map(|m| m.as_str().to_string());

        DeconstructedFa {
            fa_type: Some(fa_type),
            account_number: group("account_number"),
            bank_code: group("bank_code"),
            branch_code: group("branch_code"),
            mobile_number: group("mobile_number"),
            mobile_wallet_provider: group("mobile_wallet_provider"),
            email_address: group("email_address"),
            email_wallet_provider: group("email_wallet_provider"),
        }
    }
}
