use std::time::Duration;

use async_trait::async_trait;
use log::warn;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    BankConnector, BlockFundsResponse, BlockFundsStatus, CheckFundsResponse, CheckFundsStatus, ConnectorError,
    PaymentPayload, PaymentResponse, PaymentStatus,
};

#[derive(Debug, Clone)]
pub struct ExampleBankEndpoints {
    pub check_funds_url: String,
    pub block_funds_url: String,
    pub initiate_payment_url: String,
}

#[derive(Serialize)]
struct CheckFundsRequest<'a> {
    account_number: &'a str,
    account_currency: &'a str,
    total_funds_needed: i64,
}

#[derive(Deserialize)]
struct CheckFundsReply {
    status: String,
}

#[derive(Serialize)]
struct BlockFundsRequest<'a> {
    account_number: &'a str,
    currency: &'a str,
    amount: i64,
}

#[derive(Deserialize)]
struct BlockFundsReply {
    status: String,
    #[serde(default)]
    block_reference_no: String,
    #[serde(default)]
    error_code: String,
}

/// Wire shape of one payment line as the example bank expects it.
#[derive(Serialize)]
struct BankPaymentPayload {
    payment_reference_number: String,
    remitting_account: String,
    remitting_account_currency: String,
    payment_amount: i64,
    funds_blocked_reference_number: String,
    beneficiary_name: Option<String>,

    beneficiary_account: Option<String>,
    beneficiary_account_currency: Option<String>,
    beneficiary_account_type: Option<String>,
    beneficiary_bank_code: Option<String>,
    beneficiary_branch_code: Option<String>,

    beneficiary_mobile_wallet_provider: Option<String>,
    beneficiary_phone_no: Option<String>,

    beneficiary_email: Option<String>,
    beneficiary_email_wallet_provider: Option<String>,

    narrative_1: Option<String>,
    narrative_2: Option<String>,
    narrative_3: Option<String>,
    narrative_4: Option<String>,

    payment_date: String,
}

#[derive(Serialize)]
struct InitiatePaymentRequest {
    initiate_payment_payloads: Vec<BankPaymentPayload>,
}

#[derive(Deserialize)]
struct InitiatePaymentReply {
    status: String,
    #[serde(default)]
    error_message: String,
    #[serde(default)]
    ack_reference_no: String,
}

/// Reference connector speaking the example bank's JSON API.
///
/// Statement conventions: the customer reference of a `:61:` line carries the
/// disbursement ID, the first `:86:` narrative line the beneficiary name as
/// known to the bank, and the second narrative line the reversal reason.
pub struct ExampleBankConnector {
    client: reqwest::Client,
    check_funds_url: Url,
    block_funds_url: Url,
    initiate_payment_url: Url,
}

impl ExampleBankConnector {
    pub fn new(endpoints: &ExampleBankEndpoints, timeout: Duration) -> Result<Self, ConnectorError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            check_funds_url: Url::parse(&endpoints.check_funds_url)?,
            block_funds_url: Url::parse(&endpoints.block_funds_url)?,
            initiate_payment_url: Url::parse(&endpoints.initiate_payment_url)?,
        })
    }
}

#[async_trait]
impl BankConnector for ExampleBankConnector {
    async fn check_funds(&self, account_number: &str, currency: &str, amount: i64) -> CheckFundsResponse {
        let request = CheckFundsRequest {
            account_number,
            account_currency: currency,
            total_funds_needed: amount,
        };

        let reply: Result<CheckFundsReply, reqwest::Error> = async {
            self.client
                .post(self.check_funds_url.clone())
                .json(&request)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await
        }
        .await;

        match reply {
            Ok(reply) if reply.status == "success" => CheckFundsResponse {
                status: CheckFundsStatus::Available,
                error_code: String::new(),
            },
            Ok(_) => CheckFundsResponse {
                status: CheckFundsStatus::NotAvailable,
                error_code: String::new(),
            },
            Err(e) => {
                warn!("Example bank check_funds call failed: {}", e);
                CheckFundsResponse {
                    status: CheckFundsStatus::PendingCheck,
                    error_code: e.to_string(),
                }
            },
        }
    }

    async fn block_funds(&self, account_number: &str, currency: &str, amount: i64) -> BlockFundsResponse {
        let request = BlockFundsRequest {
            account_number,
            currency,
            amount,
        };

        let reply: Result<BlockFundsReply, reqwest::Error> = async {
            self.client
                .post(self.block_funds_url.clone())
                .json(&request)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await
        }
        .await;

        match reply {
            Ok(reply) if reply.status == "success" => BlockFundsResponse {
                status: BlockFundsStatus::BlockSuccess,
                block_reference_no: reply.block_reference_no,
                error_code: String::new(),
            },
            Ok(reply) => BlockFundsResponse {
                status: BlockFundsStatus::BlockFailure,
                block_reference_no: String::new(),
                error_code: reply.error_code,
            },
            Err(e) => {
                warn!("Example bank block_funds call failed: {}", e);
                BlockFundsResponse {
                    status: BlockFundsStatus::BlockFailure,
                    block_reference_no: String::new(),
                    error_code: e.to_string(),
                }
            },
        }
    }

    async fn initiate_payment(&self, payloads: &[PaymentPayload]) -> PaymentResponse {
        let bank_payloads: Vec<BankPaymentPayload> = payloads
            .iter()
            .map(|p| BankPaymentPayload {
                payment_reference_number: p.disbursement_id.clone(),
                remitting_account: p.remitting_account.clone(),
                remitting_account_currency: p.remitting_account_currency.clone(),
                payment_amount: p.payment_amount,
                funds_blocked_reference_number: p.funds_blocked_reference_number.clone(),
                beneficiary_name: p.beneficiary_name.clone(),
                beneficiary_account: p.beneficiary_account.clone(),
                beneficiary_account_currency: p.beneficiary_account_currency.clone(),
                beneficiary_account_type: p.beneficiary_account_type.clone(),
                beneficiary_bank_code: p.beneficiary_bank_code.clone(),
                beneficiary_branch_code: p.beneficiary_branch_code.clone(),
                beneficiary_mobile_wallet_provider: p.beneficiary_mobile_wallet_provider.clone(),
                beneficiary_phone_no: p.beneficiary_phone_no.clone(),
                beneficiary_email: p.beneficiary_email.clone(),
                beneficiary_email_wallet_provider: p.beneficiary_email_wallet_provider.clone(),
                narrative_1: p.narrative.clone(),
                narrative_2: p.program_mnemonic.clone(),
                narrative_3: p.cycle_code_mnemonic.clone(),
                narrative_4: Some(p.beneficiary_id.clone()),
                payment_date: p.payment_date.to_rfc3339(),
            })
            .collect();

        let request = InitiatePaymentRequest {
            initiate_payment_payloads: bank_payloads,
        };

        let reply: Result<InitiatePaymentReply, reqwest::Error> = async {
            self.client
                .post(self.initiate_payment_url.clone())
                .json(&request)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await
        }
        .await;

        match reply {
            Ok(reply) if reply.status == "success" => PaymentResponse {
                status: PaymentStatus::Success,
                error_code: String::new(),
                ack_reference_no: reply.ack_reference_no,
            },
            Ok(reply) => PaymentResponse {
                status: PaymentStatus::Error,
                error_code: reply.error_message,
                ack_reference_no: String::new(),
            },
            Err(e) => {
                warn!("Example bank initiate_payment call failed: {}", e);
                PaymentResponse {
                    status: PaymentStatus::Error,
                    error_code: e.to_string(),
                    ack_reference_no: String::new(),
                }
            },
        }
    }

    fn retrieve_disbursement_id(
        &self,
        _bank_reference: &str,
        customer_reference: &str,
        _narratives: &[String],
    ) -> Option<String> {
        if customer_reference.is_empty() {
            None
        } else {
            Some(customer_reference.to_string())
        }
    }

    fn retrieve_beneficiary_name(&self, narratives: &[String]) -> Option<String> {
        narratives.first().cloned()
    }

    fn retrieve_reversal_reason(&self, narratives: &[String]) -> Option<String> {
        narratives.get(1).cloned()
    }
}
