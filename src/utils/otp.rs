use chrono::{DateTime, Duration, FixedOffset, Utc};
use rand::Rng;

use crate::error::{AppError, AppResult};
use crate::utils::password::{hash_secret, verify_secret};

pub const OTP_LENGTH: usize = 6;

/// Wrong guesses allowed per issued code
pub const MAX_ATTEMPTS: i32 = 5;

/// A freshly issued code together with what gets persisted on the user row
pub struct IssuedOtp {
    pub code: String,
    pub hash: String,
    pub expires_at: DateTime<FixedOffset>,
}

pub fn generate_code() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{:06}", n)
}

pub fn issue(ttl_minutes: i64) -> AppResult<IssuedOtp> {
    let code = generate_code();
    let hash = hash_secret(&code)?;
    let expires_at = (Utc::now() + Duration::minutes(ttl_minutes)).into();

    Ok(IssuedOtp {
        code,
        hash,
        expires_at,
    })
}

/// Check a submitted code against the stored hash and expiry
pub fn check(
    submitted: &str,
    stored_hash: Option<&str>,
    expires_at: Option<DateTime<FixedOffset>>,
) -> AppResult<()> {
    let (Some(hash), Some(expires_at)) = (stored_hash, expires_at) else {
        return Err(AppError::BadRequest("No pending OTP for this account".to_string()));
    };

    if expires_at.with_timezone(&Utc) < Utc::now() {
        return Err(AppError::BadRequest("OTP has expired".to_string()));
    }

    if submitted.len() != OTP_LENGTH || !verify_secret(submitted, hash)? {
        return Err(AppError::BadRequest("Invalid OTP".to_string()));
    }

    Ok(())
}
