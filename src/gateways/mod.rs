//! Thin HTTP wrappers around the payment gateways. No retries: a failed call
//! surfaces as `AppError::Gateway` and the payment stays pending.

pub mod khalti;
pub mod paypal;

use crate::error::{AppError, AppResult};

/// Turn a non-2xx gateway response into `AppError::Gateway` with its body
pub(crate) async fn ensure_success(
    gateway: &str,
    response: reqwest::Response,
) -> AppResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::warn!(gateway, status = %status, body = %body, "Gateway rejected request");
    Err(AppError::Gateway(format!("{} answered {}", gateway, status)))
}
