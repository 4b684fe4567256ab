use serde::{Deserialize, Serialize};

use crate::config::PayPalConfig;
use crate::error::{AppError, AppResult};
use crate::gateways::ensure_success;
use crate::utils::pricing::round2;

#[derive(Clone)]
pub struct PayPalClient {
    http: reqwest::Client,
    config: PayPalConfig,
}

#[derive(Debug, Deserialize)]
struct AccessToken {
    access_token: String,
}

#[derive(Debug, Serialize)]
struct Amount {
    currency_code: String,
    value: String,
}

#[derive(Debug, Serialize)]
struct PurchaseUnitRequest {
    reference_id: String,
    description: String,
    amount: Amount,
}

#[derive(Debug, Serialize)]
struct ApplicationContext {
    return_url: String,
    cancel_url: String,
    user_action: &'static str,
    shipping_preference: &'static str,
}

#[derive(Debug, Serialize)]
struct CreateOrderRequest {
    intent: &'static str,
    purchase_units: Vec<PurchaseUnitRequest>,
    application_context: ApplicationContext,
}

#[derive(Debug, Deserialize)]
pub struct Link {
    pub href: String,
    pub rel: String,
}

#[derive(Debug, Deserialize)]
pub struct Capture {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CapturePayments {
    #[serde(default)]
    pub captures: Vec<Capture>,
}

#[derive(Debug, Deserialize)]
pub struct PurchaseUnit {
    pub reference_id: Option<String>,
    #[serde(default)]
    pub payments: CapturePayments,
}

#[derive(Debug, Deserialize)]
pub struct Order {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub purchase_units: Vec<PurchaseUnit>,
}

impl Order {
    pub fn is_completed(&self) -> bool {
        self.status == "COMPLETED"
    }

    /// Where the payer approves the order
    pub fn approve_url(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|l| l.rel == "approve" || l.rel == "payer-action")
            .map(|l| l.href.as_str())
    }

    pub fn capture_id(&self) -> Option<&str> {
        self.purchase_units
            .iter()
            .flat_map(|u| u.payments.captures.iter())
            .next()
            .map(|c| c.id.as_str())
    }
}

/// Convert an NPR amount into the configured PayPal currency
pub fn convert_from_npr(amount_npr: f64, npr_per_unit: f64) -> f64 {
    round2(amount_npr / npr_per_unit)
}

impl PayPalClient {
    pub fn new(http: reqwest::Client, config: PayPalConfig) -> Self {
        Self { http, config }
    }

    pub fn currency(&self) -> &str {
        &self.config.currency
    }

    pub fn convert(&self, amount_npr: f64) -> f64 {
        convert_from_npr(amount_npr, self.config.npr_per_unit)
    }

    async fn access_token(&self) -> AppResult<String> {
        if self.config.client_id.is_empty() || self.config.client_secret.is_empty() {
            return Err(AppError::Gateway("PayPal is not configured".to_string()));
        }

        let response = self
            .http
            .post(format!("{}/v1/oauth2/token", self.config.base_url))
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let token: AccessToken = ensure_success("PayPal", response).await?.json().await?;
        Ok(token.access_token)
    }

    pub async fn create_order(
        &self,
        reference_id: &str,
        description: &str,
        amount: f64,
        return_url: String,
        cancel_url: String,
    ) -> AppResult<Order> {
        let token = self.access_token().await?;
        let request = CreateOrderRequest {
            intent: "CAPTURE",
            purchase_units: vec![PurchaseUnitRequest {
                reference_id: reference_id.to_string(),
                description: description.to_string(),
                amount: Amount {
                    currency_code: self.config.currency.clone(),
                    value: format!("{:.2}", amount),
                },
            }],
            application_context: ApplicationContext {
                return_url,
                cancel_url,
                user_action: "PAY_NOW",
                shipping_preference: "NO_SHIPPING",
            },
        };

        let response = self
            .http
            .post(format!("{}/v2/checkout/orders", self.config.base_url))
            .bearer_auth(token)
            .json(&request)
            .send()
            .await?;

        let order = ensure_success("PayPal", response).await?.json().await?;
        Ok(order)
    }

    pub async fn capture_order(&self, order_id: &str) -> AppResult<Order> {
        let token = self.access_token().await?;

        let response = self
            .http
            .post(format!(
                "{}/v2/checkout/orders/{}/capture",
                self.config.base_url, order_id
            ))
            .bearer_auth(token)
            .json(&serde_json::json!({}))
            .send()
            .await?;

        let order = ensure_success("PayPal", response).await?.json().await?;
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_from_npr() {
        assert_eq!(convert_from_npr(1330.0, 133.0), 10.0);
        assert_eq!(convert_from_npr(1000.0, 133.0), 7.52);
    }

    #[test]
    fn test_created_order_approve_link() {
        let order: Order = serde_json::from_str(
            r#"{"id":"5O190127TN364715T","status":"CREATED","links":[
                {"href":"https://api-m.paypal.com/v2/checkout/orders/5O190127TN364715T","rel":"self","method":"GET"},
                {"href":"https://www.paypal.com/checkoutnow?token=5O190127TN364715T","rel":"approve","method":"GET"}]}"#,
        )
        .unwrap();

        assert!(!order.is_completed());
        assert_eq!(
            order.approve_url(),
            Some("https://www.paypal.com/checkoutnow?token=5O190127TN364715T")
        );
        assert_eq!(order.capture_id(), None);
    }

    #[test]
    fn test_captured_order() {
        let order: Order = serde_json::from_str(
            r#"{"id":"5O190127TN364715T","status":"COMPLETED","purchase_units":[
                {"reference_id":"booking-1","payments":{"captures":[
                    {"id":"3C679366HH908993F","status":"COMPLETED","amount":{"currency_code":"USD","value":"10.00"}}]}}]}"#,
        )
        .unwrap();

        assert!(order.is_completed());
        assert_eq!(order.capture_id(), Some("3C679366HH908993F"));
    }
}
