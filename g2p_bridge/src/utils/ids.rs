use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Server-assigned disbursement ID: millisecond timestamp plus a three-digit
/// process-local sequence. Sixteen characters, so it fits the MT940 customer
/// reference field it travels in for reconciliation. Uniqueness is enforced
/// by the primary key on top of this.
pub fn next_disbursement_id() -> String {
    let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed) % 1000;
    format!("{}{:03}", Utc::now().timestamp_millis(), sequence)
}
