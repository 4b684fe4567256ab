use serde::{Deserialize, Serialize};

use crate::config::KhaltiConfig;
use crate::error::{AppError, AppResult};
use crate::gateways::ensure_success;

#[derive(Clone)]
pub struct KhaltiClient {
    http: reqwest::Client,
    config: KhaltiConfig,
}

#[derive(Debug, Serialize)]
pub struct CustomerInfo {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct InitiateRequest {
    pub return_url: String,
    pub website_url: String,
    /// In paisa
    pub amount: i64,
    pub purchase_order_id: String,
    pub purchase_order_name: String,
    pub customer_info: CustomerInfo,
}

#[derive(Debug, Deserialize)]
pub struct InitiateResponse {
    pub pidx: String,
    pub payment_url: String,
    pub expires_at: Option<String>,
    pub expires_in: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum LookupStatus {
    Completed,
    Pending,
    Initiated,
    Refunded,
    Expired,
    #[serde(rename = "User canceled")]
    UserCanceled,
    #[serde(rename = "Partially Refunded")]
    PartiallyRefunded,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub struct LookupResponse {
    pub pidx: String,
    /// In paisa
    pub total_amount: i64,
    pub status: LookupStatus,
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub fee: i64,
    #[serde(default)]
    pub refunded: bool,
}

/// NPR to paisa
pub fn to_paisa(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

impl KhaltiClient {
    pub fn new(http: reqwest::Client, config: KhaltiConfig) -> Self {
        Self { http, config }
    }

    fn authorization(&self) -> AppResult<String> {
        if self.config.secret_key.is_empty() {
            return Err(AppError::Gateway("Khalti is not configured".to_string()));
        }
        Ok(format!("Key {}", self.config.secret_key))
    }

    pub async fn initiate(&self, request: &InitiateRequest) -> AppResult<InitiateResponse> {
        let response = self
            .http
            .post(format!("{}/epayment/initiate/", self.config.base_url))
            .header(reqwest::header::AUTHORIZATION, self.authorization()?)
            .json(request)
            .send()
            .await?;

        let body = ensure_success("Khalti", response).await?.json().await?;
        Ok(body)
    }

    pub async fn lookup(&self, pidx: &str) -> AppResult<LookupResponse> {
        let response = self
            .http
            .post(format!("{}/epayment/lookup/", self.config.base_url))
            .header(reqwest::header::AUTHORIZATION, self.authorization()?)
            .json(&serde_json::json!({ "pidx": pidx }))
            .send()
            .await?;

        let body = ensure_success("Khalti", response).await?.json().await?;
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_paisa() {
        assert_eq!(to_paisa(1500.0), 150_000);
        assert_eq!(to_paisa(1234.56), 123_456);
    }

    #[test]
    fn test_lookup_statuses() {
        let completed: LookupResponse = serde_json::from_str(
            r#"{"pidx":"HT6o6PEZRWFJ5ygavzHWd5","total_amount":150000,"status":"Completed",
                "transaction_id":"GFq9PFS7b2iYvL8Lir9oXe","fee":0,"refunded":false}"#,
        )
        .unwrap();
        assert_eq!(completed.status, LookupStatus::Completed);
        assert_eq!(completed.transaction_id.as_deref(), Some("GFq9PFS7b2iYvL8Lir9oXe"));

        let canceled: LookupResponse = serde_json::from_str(
            r#"{"pidx":"x","total_amount":1000,"status":"User canceled","transaction_id":null}"#,
        )
        .unwrap();
        assert_eq!(canceled.status, LookupStatus::UserCanceled);
        assert!(!canceled.refunded);

        let odd: LookupResponse =
            serde_json::from_str(r#"{"pidx":"x","total_amount":1000,"status":"Something new"}"#)
                .unwrap();
        assert_eq!(odd.status, LookupStatus::Unknown);
    }

    #[test]
    fn test_initiate_response() {
        let body: InitiateResponse = serde_json::from_str(
            r#"{"pidx":"bZQLD9wRVWo4CdESSfuSsB","payment_url":"https://test-pay.khalti.com/?pidx=bZQLD9wRVWo4CdESSfuSsB",
                "expires_at":"2023-05-25T16:26:16.471649+05:45","expires_in":1800}"#,
        )
        .unwrap();
        assert_eq!(body.pidx, "bZQLD9wRVWo4CdESSfuSsB");
        assert_eq!(body.expires_in, Some(1800));
    }

    #[tokio::test]
    async fn test_unconfigured_client_fails_fast() {
        let client = KhaltiClient::new(
            reqwest::Client::new(),
            KhaltiConfig {
                base_url: "http://127.0.0.1:9".to_string(),
                secret_key: String::new(),
            },
        );

        let err = client.lookup("abc").await.unwrap_err();
        assert!(matches!(err, AppError::Gateway(_)));
    }
}
