use std::env;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration_hours: i64,
    pub refresh_token_secret: String,
    pub refresh_token_expiration_days: i64,
    pub server_host: String,
    pub server_port: u16,
    /// Base URL gateways redirect back to, e.g. `https://api.example.com`
    pub public_base_url: String,
    pub upload_dir: String,
    pub max_upload_bytes: usize,
    pub otp_ttl_minutes: i64,
    pub otp_webhook_url: Option<String>,
    /// Offset of the venues' local time; "today" and "now" for bookings use it
    pub local_offset: FixedOffset,
    pub khalti: KhaltiConfig,
    pub paypal: PayPalConfig,
}

#[derive(Clone)]
pub struct KhaltiConfig {
    pub base_url: String,
    pub secret_key: String,
}

#[derive(Clone)]
pub struct PayPalConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub currency: String,
    /// Booking prices are in NPR; PayPal does not settle NPR
    pub npr_per_unit: f64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let server_port: u16 = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .expect("SERVER_PORT must be a number");

        Self {
            database_url: env::var("DATABASE_URL")
                .expect("DATABASE_URL must be set"),
            jwt_secret: env::var("JWT_SECRET")
                .expect("JWT_SECRET must be set"),
            jwt_expiration_hours: env::var("JWT_EXPIRATION_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .expect("JWT_EXPIRATION_HOURS must be a number"),
            refresh_token_secret: env::var("REFRESH_TOKEN_SECRET")
                .expect("REFRESH_TOKEN_SECRET must be set"),
            refresh_token_expiration_days: env::var("REFRESH_TOKEN_EXPIRATION_DAYS")
                .unwrap_or_else(|_| "7".to_string())
                .parse()
                .expect("REFRESH_TOKEN_EXPIRATION_DAYS must be a number"),
            server_host: env::var("SERVER_HOST")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port,
            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| format!("http://localhost:{}", server_port)),
            upload_dir: env::var("UPLOAD_DIR")
                .unwrap_or_else(|_| "uploads".to_string()),
            max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                .unwrap_or_else(|_| (5 * 1024 * 1024).to_string())
                .parse()
                .expect("MAX_UPLOAD_BYTES must be a number"),
            otp_ttl_minutes: env::var("OTP_TTL_MINUTES")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .expect("OTP_TTL_MINUTES must be a number"),
            otp_webhook_url: env::var("OTP_WEBHOOK_URL").ok().filter(|u| !u.is_empty()),
            local_offset: env::var("LOCAL_UTC_OFFSET_MINUTES")
                .unwrap_or_else(|_| "345".to_string())
                .parse::<i32>()
                .ok()
                .and_then(|minutes| minutes.checked_mul(60))
                .and_then(FixedOffset::east_opt)
                .expect("LOCAL_UTC_OFFSET_MINUTES must be minutes within +/- 24h"),
            khalti: KhaltiConfig {
                base_url: env::var("KHALTI_BASE_URL")
                    .unwrap_or_else(|_| "https://dev.khalti.com/api/v2".to_string()),
                secret_key: env::var("KHALTI_SECRET_KEY").unwrap_or_default(),
            },
            paypal: PayPalConfig {
                base_url: env::var("PAYPAL_BASE_URL")
                    .unwrap_or_else(|_| "https://api-m.sandbox.paypal.com".to_string()),
                client_id: env::var("PAYPAL_CLIENT_ID").unwrap_or_default(),
                client_secret: env::var("PAYPAL_CLIENT_SECRET").unwrap_or_default(),
                currency: env::var("PAYPAL_CURRENCY")
                    .unwrap_or_else(|_| "USD".to_string()),
                npr_per_unit: env::var("NPR_PER_USD")
                    .unwrap_or_else(|_| "133.0".to_string())
                    .parse()
                    .expect("NPR_PER_USD must be a number"),
            },
        }
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn to_local(&self, at: DateTime<Utc>) -> NaiveDateTime {
        at.with_timezone(&self.local_offset).naive_local()
    }

    pub fn local_now(&self) -> NaiveDateTime {
        self.to_local(Utc::now())
    }

    pub fn local_today(&self) -> NaiveDate {
        self.local_now().date()
    }
}
