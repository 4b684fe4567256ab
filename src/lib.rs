pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod gateways;
pub mod handlers;
pub mod middleware;
pub mod notifier;
pub mod routes;
pub mod utils;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

pub use config::Config;
pub use error::{AppError, AppResult};

use gateways::{khalti::KhaltiClient, paypal::PayPalClient};
use notifier::OtpNotifier;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Config,
    pub khalti: KhaltiClient,
    pub paypal: PayPalClient,
    pub notifier: Arc<dyn OtpNotifier>,
}

impl AppState {
    /// Build the state with gateway clients and the OTP notifier derived from `config`
    pub fn new(db: DatabaseConnection, config: Config) -> Self {
        let http = reqwest::Client::new();
        let notifier = notifier::from_config(&config, http.clone());

        Self {
            khalti: KhaltiClient::new(http.clone(), config.khalti.clone()),
            paypal: PayPalClient::new(http, config.paypal.clone()),
            notifier,
            db,
            config,
        }
    }
}
