use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::entities::user::{self, UserRole};
use crate::error::{AppError, AppResult};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,       // user id
    pub email: String,
    pub role: UserRole,
    pub exp: i64,        // expiration timestamp
    pub iat: i64,        // issued at timestamp
}

#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

pub fn create_token(
    user_id: Uuid,
    email: &str,
    role: UserRole,
    secret: &str,
    expires_in: Duration,
) -> AppResult<String> {
    let now = Utc::now();
    let exp = now + expires_in;

    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        role,
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
}

pub fn verify_token(token: &str, secret: &str) -> AppResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))
}

/// Access token signed with `JWT_SECRET`, refresh token with `REFRESH_TOKEN_SECRET`
pub fn issue_token_pair(user: &user::Model, config: &Config) -> AppResult<TokenPair> {
    let access_token = create_token(
        user.id,
        &user.email,
        user.role,
        &config.jwt_secret,
        Duration::hours(config.jwt_expiration_hours),
    )?;
    let refresh_token = create_token(
        user.id,
        &user.email,
        user.role,
        &config.refresh_token_secret,
        Duration::days(config.refresh_token_expiration_days),
    )?;

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip() {
        let id = Uuid::new_v4();
        let token = create_token(id, "a@b.com", UserRole::Vendor, "secret", Duration::hours(1)).unwrap();

        let claims = verify_token(&token, "secret").unwrap();
        assert_eq!(claims.sub, id);
        assert_eq!(claims.email, "a@b.com");
        assert_eq!(claims.role, UserRole::Vendor);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = create_token(Uuid::new_v4(), "a@b.com", UserRole::Customer, "one", Duration::hours(1)).unwrap();

        let err = verify_token(&token, "two").unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = create_token(Uuid::new_v4(), "a@b.com", UserRole::Customer, "secret", Duration::hours(-2)).unwrap();

        assert!(verify_token(&token, "secret").is_err());
    }
}
