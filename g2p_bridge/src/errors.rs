use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Stable wire codes surfaced to API clients and recorded on pipeline rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BridgeErrorCode {
    // Envelope validation
    InvalidProgramMnemonic,
    InvalidDisbursementFrequency,
    InvalidCycleCodeMnemonic,
    InvalidNoOfBeneficiaries,
    InvalidNoOfDisbursements,
    InvalidTotalDisbursementAmount,
    InvalidDisbursementScheduleDate,

    // Envelope state
    DisbursementEnvelopeNotFound,
    DisbursementEnvelopeAlreadyCanceled,
    DisbursementEnvelopeScheduleDateReached,

    // Disbursement validation
    InvalidDisbursementPayload,
    InvalidDisbursementEnvelopeId,
    InvalidDisbursementAmount,
    InvalidBeneficiaryId,
    InvalidBeneficiaryName,
    InvalidNarrative,
    InvalidDisbursementId,
    DisbursementAlreadyCanceled,

    // Quota
    MultipleEnvelopesFound,
    NoOfDisbursementsExceedsDeclared,
    TotalDisbursementAmountExceedsDeclared,
    NoOfDisbursementsLessThanZero,
    TotalDisbursementAmountLessThanZero,

    // Statement
    StatementUploadError,
    InvalidAccountNumber,
    StatementParseError,

    // Recon
    DuplicateDisbursement,
    InvalidReversal,
}

impl BridgeErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeErrorCode::InvalidProgramMnemonic => "INVALID_PROGRAM_MNEMONIC",
            BridgeErrorCode::InvalidDisbursementFrequency => "INVALID_DISBURSEMENT_FREQUENCY",
            BridgeErrorCode::InvalidCycleCodeMnemonic => "INVALID_CYCLE_CODE_MNEMONIC",
            BridgeErrorCode::InvalidNoOfBeneficiaries => "INVALID_NO_OF_BENEFICIARIES",
            BridgeErrorCode::InvalidNoOfDisbursements => "INVALID_NO_OF_DISBURSEMENTS",
            BridgeErrorCode::InvalidTotalDisbursementAmount => "INVALID_TOTAL_DISBURSEMENT_AMOUNT",
            BridgeErrorCode::InvalidDisbursementScheduleDate => "INVALID_DISBURSEMENT_SCHEDULE_DATE",
            BridgeErrorCode::DisbursementEnvelopeNotFound => "DISBURSEMENT_ENVELOPE_NOT_FOUND",
            BridgeErrorCode::DisbursementEnvelopeAlreadyCanceled => "DISBURSEMENT_ENVELOPE_ALREADY_CANCELED",
            BridgeErrorCode::DisbursementEnvelopeScheduleDateReached => "DISBURSEMENT_ENVELOPE_SCHEDULE_DATE_REACHED",
            BridgeErrorCode::InvalidDisbursementPayload => "INVALID_DISBURSEMENT_PAYLOAD",
            BridgeErrorCode::InvalidDisbursementEnvelopeId => "INVALID_DISBURSEMENT_ENVELOPE_ID",
            BridgeErrorCode::InvalidDisbursementAmount => "INVALID_DISBURSEMENT_AMOUNT",
            BridgeErrorCode::InvalidBeneficiaryId => "INVALID_BENEFICIARY_ID",
            BridgeErrorCode::InvalidBeneficiaryName => "INVALID_BENEFICIARY_NAME",
            BridgeErrorCode::InvalidNarrative => "INVALID_NARRATIVE",
            BridgeErrorCode::InvalidDisbursementId => "INVALID_DISBURSEMENT_ID",
            BridgeErrorCode::DisbursementAlreadyCanceled => "DISBURSEMENT_ALREADY_CANCELED",
            BridgeErrorCode::MultipleEnvelopesFound => "MULTIPLE_ENVELOPES_FOUND",
            BridgeErrorCode::NoOfDisbursementsExceedsDeclared => "NO_OF_DISBURSEMENTS_EXCEEDS_DECLARED",
            BridgeErrorCode::TotalDisbursementAmountExceedsDeclared => "TOTAL_DISBURSEMENT_AMOUNT_EXCEEDS_DECLARED",
            BridgeErrorCode::NoOfDisbursementsLessThanZero => "NO_OF_DISBURSEMENTS_LESS_THAN_ZERO",
            BridgeErrorCode::TotalDisbursementAmountLessThanZero => "TOTAL_DISBURSEMENT_AMOUNT_LESS_THAN_ZERO",
            BridgeErrorCode::StatementUploadError => "STATEMENT_UPLOAD_ERROR",
            BridgeErrorCode::InvalidAccountNumber => "INVALID_ACCOUNT_NUMBER",
            BridgeErrorCode::StatementParseError => "STATEMENT_PARSE_ERROR",
            BridgeErrorCode::DuplicateDisbursement => "DUPLICATE_DISBURSEMENT",
            BridgeErrorCode::InvalidReversal => "INVALID_REVERSAL",
        }
    }
}

impl fmt::Display for BridgeErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
