use chrono::{Datelike, NaiveDate};
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Mt940Error {
    #[error("Malformed :61: line at entry {entry}: {line}")]
    MalformedStatementLine { entry: usize, line: String },
    #[error("Invalid date '{0}' in statement line")]
    InvalidDate(String),
    #[error("Invalid amount '{0}' in statement line")]
    InvalidAmount(String),
}

/// The subset of an MT940 customer statement the reconciler reads.
#[derive(Debug, Clone, Default)]
pub struct Mt940Statement {
    /// `:20:` transaction reference number.
    pub transaction_reference: String,
    /// `:25:` account identification.
    pub account_identification: String,
    /// `:28C:` statement number (before the `/`).
    pub statement_number: String,
    /// `:28C:` sequence number (after the `/`), empty when absent.
    pub sequence_number: String,
    pub transactions: Vec<Mt940Transaction>,
}

/// One `:61:` line with the narratives of its `:86:` block.
#[derive(Debug, Clone)]
pub struct Mt940Transaction {
    pub value_date: NaiveDate,
    pub entry_date: Option<NaiveDate>,
    /// Debit/credit mark: `C`, `D`, `RC` or `RD`.
    pub indicator: String,
    /// Amount in minor units.
    pub amount: i64,
    pub transaction_type: String,
    pub customer_reference: String,
    pub bank_reference: String,
    pub narratives: Vec<String>,
}

static LINE_61: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<value_date>\d{6})(?P<entry_date>\d{4})?(?P<indicator>RC|RD|C|D)(?P<funds_code>[A-Z])?(?P<amount>\d+(?:,\d*)?)(?P<txn_type>[A-Z][A-Z0-9]{3})(?P<customer_ref>[^/]{0,16}?)(?://(?P<bank_ref>.*))?$",
    )
    .expect("statement line pattern is valid")
});

/// Parses an MT940 statement. Tags other than the ones the reconciler needs
/// are skipped; SWIFT block wrappers and the terminating `-` are tolerated.
pub fn parse(input: &str) -> Result<Mt940Statement, Mt940Error> {
    let mut statement = Mt940Statement::default();
    let mut in_narrative = false;

    for raw_line in input.lines() {
        let line = raw_line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with('{') || line.starts_with('-') {
            in_narrative = false;
            continue;
        }

        if let Some(value) = line.strip_prefix(":20:") {
            statement.transaction_reference = value.trim().to_string();
            in_narrative = false;
        } else if let Some(value) = line.strip_prefix(":25:") {
            statement.account_identification = value.trim().to_string();
            in_narrative = false;
        } else if let Some(value) = line.strip_prefix(":28C:") {
            let mut parts = value.trim().splitn(2, '/');
            statement.statement_number = parts.next().unwrap_or_default().to_string();
            statement.sequence_number = parts.next().unwrap_or_default().to_string();
            in_narrative = false;
        } else if let Some(value) = line.strip_prefix(":61:") {
            statement.transactions.push(parse_statement_line(value, statement.transactions.len() + 1)?);
            in_narrative = false;
        } else if let Some(value) = line.strip_prefix(":86:") {
            if let Some(transaction) = statement.transactions.last_mut() {
                transaction.narratives.push(value.trim().to_string());
                in_narrative = true;
            }
        } else if line.starts_with(':') {
            // A tag the reconciler does not read (:60F:, :62F:, ...).
            in_narrative = false;
        } else if in_narrative {
            if let Some(transaction) = statement.transactions.last_mut() {
                transaction.narratives.push(line.trim().to_string());
            }
        }
    }

    Ok(statement)
}

fn parse_statement_line(line: &str, entry: usize) -> Result<Mt940Transaction, Mt940Error> {
    let captures = LINE_61.captures(line).ok_or_else(|| Mt940Error::MalformedStatementLine {
        entry,
        line: line.to_string(),
    })?;

    let value_date_str = &captures["value_date"];
    let value_date = NaiveDate::parse_from_str(value_date_str, "%y%m%d")
        .map_err(|_| Mt940Error::InvalidDate(value_date_str.to_string()))?;

    let entry_date = match captures.name("entry_date") {
        Some(m) => Some(parse_entry_date(m.as_str(), value_date)?),
        None => None,
    };

    Ok(Mt940Transaction {
        value_date,
        entry_date,
        indicator: captures["indicator"].to_string(),
        amount: parse_amount(&captures["amount"])?,
        transaction_type: captures["txn_type"].to_string(),
        customer_reference: captures["customer_ref"].trim().to_string(),
        bank_reference: captures
            .name("bank_ref")
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default(),
        narratives: Vec::new(),
    })
}

/// Entry dates carry month and day only; the year comes from the value date.
fn parse_entry_date(mmdd: &str, value_date: NaiveDate) -> Result<NaiveDate, Mt940Error> {
    let month: u32 = mmdd[..2].parse().map_err(|_| Mt940Error::InvalidDate(mmdd.to_string()))?;
    let day: u32 = mmdd[2..].parse().map_err(|_| Mt940Error::InvalidDate(mmdd.to_string()))?;
    NaiveDate::from_ymd_opt(value_date.year(), month, day).ok_or_else(|| Mt940Error::InvalidDate(mmdd.to_string()))
}

/// Converts a comma-decimal amount to minor units, e.g. `"60,5"` → `6050`.
fn parse_amount(raw: &str) -> Result<i64, Mt940Error> {
    let invalid = || Mt940Error::InvalidAmount(raw.to_string());

    let (whole, fraction) = match raw.split_once(',') {
        Some((whole, fraction)) => (whole, fraction),
        None => (raw, ""),
    };
    if fraction.len() > 2 {
        return Err(invalid());
    }

    let whole: i64 = whole.parse().map_err(|_| invalid())?;
    let fraction: i64 = match fraction {
        "" => 0,
        f if f.len() == 1 => f.parse::<i64>().map_err(|_| invalid())? * 10,
        f => f.parse().map_err(|_| invalid())?,
    };

    Ok(whole * 100 + fraction)
}
