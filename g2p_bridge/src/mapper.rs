use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum MapperError {
    #[error("Mapper resolve call failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Invalid mapper resolve URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestHeader {
    pub message_id: String,
    pub message_ts: DateTime<Utc>,
    pub action: String,
    pub sender_id: String,
    pub sender_uri: String,
    pub total_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SingleResolveRequest {
    pub reference_id: String,
    pub timestamp: DateTime<Utc>,
    pub id: String,
    pub scope: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolveRequestMessage {
    pub transaction_id: String,
    pub resolve_request: Vec<SingleResolveRequest>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolveRequest {
    pub signature: String,
    pub header: RequestHeader,
    pub message: ResolveRequestMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountProviderInfo {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SingleResolveResponse {
    pub id: String,
    #[serde(default)]
    pub fa: Option<String>,
    #[serde(default)]
    pub account_provider_info: Option<AccountProviderInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolveResponseMessage {
    pub resolve_response: Vec<SingleResolveResponse>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolveResponse {
    pub message: ResolveResponseMessage,
}

/// Client for the external ID-mapper resolution service.
pub struct MapperClient {
    client: reqwest::Client,
    resolve_url: Url,
}

impl MapperClient {
    pub fn new(resolve_url: &str, timeout: Duration) -> Result<Self, MapperError> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            resolve_url: Url::parse(resolve_url)?,
        })
    }

    /// One resolve entry per beneficiary, wrapped in a fresh transaction.
    pub fn build_resolve_request(beneficiary_ids: &[String]) -> ResolveRequest {
        let now = Utc::now();
        let resolve_request: Vec<SingleResolveRequest> = beneficiary_ids
            .iter()
            .map(|id| SingleResolveRequest {
                reference_id: Uuid::new_v4().to_string(),
                timestamp: now,
                id: id.clone(),
                scope: "details".to_string(),
            })
            .collect();

        ResolveRequest {
            signature: String::new(),
            header: RequestHeader {
                message_id: Uuid::new_v4().to_string(),
                message_ts: now,
                action: "resolve".to_string(),
                sender_id: String::new(),
                sender_uri: String::new(),
                total_count: resolve_request.len(),
            },
            message: ResolveRequestMessage {
                transaction_id: Uuid::new_v4().to_string(),
                resolve_request,
            },
        }
    }

    pub async fn resolve(&self, request: &ResolveRequest) -> Result<ResolveResponse, MapperError> {
        let response = self
            .client
            .post(self.resolve_url.clone())
            .json(request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_request_carries_one_entry_per_beneficiary() {
        let ids = vec!["B1".to_string(), "B2".to_string(), "B3".to_string()];
        let request = MapperClient::build_resolve_request(&ids);
        assert_eq!(request.header.total_count, 3);
        assert_eq!(request.header.action, "resolve");
        assert_eq!(request.message.resolve_request.len(), 3);
        assert_eq!(request.message.resolve_request[1].id, "B2");
        assert_eq!(request.message.resolve_request[1].scope, "details");
    }

    #[test]
    fn resolve_response_decodes_missing_fa() {
        let body = r#"{"message": {"resolve_response": [
            {"id": "B1", "fa": "BANK_ACCOUNT:1.2@X", "account_provider_info": {"name": "Jane"}},
            {"id": "B2"}
        ]}}"#;
        let response: ResolveResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.message.resolve_response[0].fa.as_deref(), Some("BANK_ACCOUNT:1.2@X"));
        assert!(response.message.resolve_response[1].fa.is_none());
        assert!(response.message.resolve_response[1].account_provider_info.is_none());
    }
}
