#![allow(dead_code)]

use chrono::{Duration, FixedOffset};
use sea_orm::DatabaseConnection;
use uuid::Uuid;

use futsal_booking::{
    config::{KhaltiConfig, PayPalConfig},
    entities::user::UserRole,
    utils::jwt::{create_token, Claims},
    AppState, Config,
};

pub const ACCESS_SECRET: &str = "test-access-secret";
pub const REFRESH_SECRET: &str = "test-refresh-secret";

pub fn config(upload_dir: &str) -> Config {
    Config {
        database_url: "postgres://unused".to_string(),
        jwt_secret: ACCESS_SECRET.to_string(),
        jwt_expiration_hours: 1,
        refresh_token_secret: REFRESH_SECRET.to_string(),
        refresh_token_expiration_days: 7,
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        public_base_url: "http://localhost:3000".to_string(),
        upload_dir: upload_dir.to_string(),
        max_upload_bytes: 1024 * 1024,
        otp_ttl_minutes: 10,
        otp_webhook_url: None,
        local_offset: FixedOffset::east_opt(345 * 60).unwrap(),
        // Unconfigured gateways fail before any network call
        khalti: KhaltiConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            secret_key: String::new(),
        },
        paypal: PayPalConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            currency: "USD".to_string(),
            npr_per_unit: 133.0,
        },
    }
}

/// A fresh directory under the system temp dir
pub fn temp_upload_dir() -> String {
    std::env::temp_dir()
        .join(format!("futsal-test-{}", Uuid::new_v4()))
        .to_string_lossy()
        .into_owned()
}

pub fn state(db: DatabaseConnection) -> AppState {
    AppState::new(db, config(&temp_upload_dir()))
}

pub fn token(user_id: Uuid, role: UserRole) -> String {
    create_token(user_id, "player@futsal.com", role, ACCESS_SECRET, Duration::hours(1)).unwrap()
}

pub fn claims(user_id: Uuid, role: UserRole) -> Claims {
    let now = chrono::Utc::now().timestamp();
    Claims {
        sub: user_id,
        email: "player@futsal.com".to_string(),
        role,
        exp: now + 3600,
        iat: now,
    }
}
