use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::Config;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    Signup,
    Signin,
    PasswordReset,
}

/// Delivers one-time passwords to users
#[async_trait]
pub trait OtpNotifier: Send + Sync {
    async fn send(&self, email: &str, code: &str, purpose: OtpPurpose) -> AppResult<()>;
}

/// Writes codes to the log; used when no webhook is configured
pub struct LogNotifier;

#[async_trait]
impl OtpNotifier for LogNotifier {
    async fn send(&self, email: &str, code: &str, purpose: OtpPurpose) -> AppResult<()> {
        tracing::info!(email = %email, purpose = ?purpose, code = %code, "OTP issued");
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    email: &'a str,
    code: &'a str,
    purpose: OtpPurpose,
}

/// POSTs `{email, code, purpose}` to a mail/SMS relay
pub struct WebhookNotifier {
    http: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(http: reqwest::Client, url: String) -> Self {
        Self { http, url }
    }
}

#[async_trait]
impl OtpNotifier for WebhookNotifier {
    async fn send(&self, email: &str, code: &str, purpose: OtpPurpose) -> AppResult<()> {
        let response = self
            .http
            .post(&self.url)
            .json(&WebhookPayload {
                email,
                code,
                purpose,
            })
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("OTP delivery failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Internal(format!(
                "OTP relay answered {}",
                response.status()
            )));
        }

        tracing::debug!(email = %email, purpose = ?purpose, "OTP delivered via webhook");
        Ok(())
    }
}

pub fn from_config(config: &Config, http: reqwest::Client) -> Arc<dyn OtpNotifier> {
    match &config.otp_webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(http, url.clone())),
        None => {
            tracing::warn!("OTP_WEBHOOK_URL not set, OTP codes will only be logged");
            Arc::new(LogNotifier)
        }
    }
}
