use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::user::{self, UserRole};
use crate::error::{AppError, AppResult};
use crate::notifier::OtpPurpose;
use crate::utils::jwt::{issue_token_pair, verify_token, Claims};
use crate::utils::password::{hash_secret, verify_secret};
use crate::utils::validation::{normalize_email, require_text, validate_email, validate_password};
use crate::utils::{otp, upload};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: UserRole,
}

#[derive(Debug, Deserialize)]
pub struct SigninRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub otp: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub profile_image: Option<String>,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl From<user::Model> for UserInfo {
    fn from(u: user::Model) -> Self {
        Self {
            id: u.id,
            name: u.name,
            email: u.email,
            role: u.role,
            profile_image: u.profile_image,
            is_verified: u.is_verified,
            created_at: u.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserInfo,
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub message: String,
    pub user: UserInfo,
}

fn message(text: &str) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": text }))
}

async fn find_by_email(state: &AppState, email: &str) -> AppResult<Option<user::Model>> {
    Ok(user::Entity::find()
        .filter(user::Column::Email.eq(email))
        .one(&state.db)
        .await?)
}

async fn find_by_id(state: &AppState, id: Uuid) -> AppResult<user::Model> {
    user::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

/// Store a fresh OTP on the user and hand it to the notifier
async fn send_otp(state: &AppState, user: user::Model, purpose: OtpPurpose) -> AppResult<()> {
    let issued = otp::issue(state.config.otp_ttl_minutes)?;
    let email = user.email.clone();

    let mut active: user::ActiveModel = user.into();
    active.otp_hash = Set(Some(issued.hash));
    active.otp_expires_at = Set(Some(issued.expires_at));
    active.otp_attempts = Set(0);
    active.update(&state.db).await?;

    state.notifier.send(&email, &issued.code, purpose).await
}

/// Validate the submitted code and clear it so it cannot be reused.
/// Wrong guesses are counted; after `otp::MAX_ATTEMPTS` a new code must be requested.
async fn consume_otp(
    state: &AppState,
    user: &user::Model,
    submitted: &str,
) -> AppResult<user::ActiveModel> {
    if user.otp_attempts >= otp::MAX_ATTEMPTS {
        return Err(AppError::BadRequest(
            "Too many incorrect codes, request a new one".to_string(),
        ));
    }

    let mut active: user::ActiveModel = user.clone().into();

    if let Err(e) = otp::check(submitted.trim(), user.otp_hash.as_deref(), user.otp_expires_at) {
        if user.otp_hash.is_some() {
            active.otp_attempts = Set(user.otp_attempts + 1);
            active.update(&state.db).await?;
            tracing::warn!(user_id = %user.id, attempts = user.otp_attempts + 1, "Incorrect OTP");
        }
        return Err(e);
    }

    active.otp_hash = Set(None);
    active.otp_expires_at = Set(None);
    active.otp_attempts = Set(0);
    Ok(active)
}

/// Register a customer or vendor; the account is verified through the emailed OTP
pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> AppResult<(StatusCode, Json<SignupResponse>)> {
    let name = require_text("Name", &payload.name, 100)?;
    let email = normalize_email(&payload.email);
    validate_email(&email)?;
    validate_password(&payload.password)?;

    if find_by_email(&state, &email).await?.is_some() {
        return Err(AppError::Conflict("Email already registered".to_string()));
    }

    let new_user = user::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name),
        email: Set(email),
        password_hash: Set(hash_secret(&payload.password)?),
        role: Set(payload.role),
        is_verified: Set(false),
        ..Default::default()
    };

    let user = new_user.insert(&state.db).await?;
    tracing::info!(user_id = %user.id, role = ?user.role, "User signed up");

    // The account exists either way; the user can ask for another code
    let notice = match send_otp(&state, user.clone(), OtpPurpose::Signup).await {
        Ok(()) => "Account created, check your email for the verification code",
        Err(e) => {
            tracing::error!(user_id = %user.id, error = %e, "Failed to deliver signup OTP");
            "Account created, but the verification code could not be sent; request a new one"
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            message: notice.to_string(),
            user: user.into(),
        }),
    ))
}

/// Check credentials and send a sign-in OTP; tokens are issued by `verify_otp`
pub async fn signin(
    State(state): State<AppState>,
    Json(payload): Json<SigninRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let email = normalize_email(&payload.email);
    let user = find_by_email(&state, &email)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid email or password".to_string()))?;

    if !verify_secret(&payload.password, &user.password_hash)? {
        return Err(AppError::Unauthorized("Invalid email or password".to_string()));
    }

    let purpose = if user.is_verified {
        OtpPurpose::Signin
    } else {
        OtpPurpose::Signup
    };
    send_otp(&state, user, purpose).await?;

    Ok(message("OTP sent to your email"))
}

/// Exchange a valid OTP for an access/refresh token pair
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(payload): Json<VerifyOtpRequest>,
) -> AppResult<Json<AuthResponse>> {
    let email = normalize_email(&payload.email);
    let user = find_by_email(&state, &email)
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid OTP".to_string()))?;

    let mut active = consume_otp(&state, &user, &payload.otp).await?;

    let tokens = issue_token_pair(&user, &state.config)?;
    active.is_verified = Set(true);
    active.refresh_token = Set(Some(tokens.refresh_token.clone()));
    let user = active.update(&state.db).await?;

    tracing::info!(user_id = %user.id, "OTP verified");

    Ok(Json(AuthResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        user: user.into(),
    }))
}

pub async fn resend_otp(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let user = find_by_email(&state, &normalize_email(&payload.email))
        .await?
        .ok_or_else(|| AppError::NotFound("No account with that email".to_string()))?;

    let purpose = if user.is_verified {
        OtpPurpose::Signin
    } else {
        OtpPurpose::Signup
    };
    send_otp(&state, user, purpose).await?;

    Ok(message("OTP sent to your email"))
}

/// Rotate the refresh token; the presented token must match the stored one
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> AppResult<Json<AuthResponse>> {
    let claims = verify_token(&payload.refresh_token, &state.config.refresh_token_secret)?;

    let user = user::Entity::find_by_id(claims.sub)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid refresh token".to_string()))?;

    if user.refresh_token.as_deref() != Some(payload.refresh_token.as_str()) {
        return Err(AppError::Unauthorized("Refresh token has been revoked".to_string()));
    }

    let tokens = issue_token_pair(&user, &state.config)?;

    let mut active: user::ActiveModel = user.into();
    active.refresh_token = Set(Some(tokens.refresh_token.clone()));
    let user = active.update(&state.db).await?;

    Ok(Json(AuthResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        user: user.into(),
    }))
}

pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let user = find_by_email(&state, &normalize_email(&payload.email))
        .await?
        .ok_or_else(|| AppError::NotFound("No account with that email".to_string()))?;

    send_otp(&state, user, OtpPurpose::PasswordReset).await?;

    Ok(message("Password reset code sent to your email"))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> AppResult<Json<serde_json::Value>> {
    validate_password(&payload.new_password)?;

    let user = find_by_email(&state, &normalize_email(&payload.email))
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid OTP".to_string()))?;

    let mut active = consume_otp(&state, &user, &payload.otp).await?;
    active.password_hash = Set(hash_secret(&payload.new_password)?);
    // Sign out other sessions
    active.refresh_token = Set(None);
    active.update(&state.db).await?;

    tracing::info!(user_id = %user.id, "Password reset");
    Ok(message("Password has been reset"))
}

/// Current user's profile
pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<UserInfo>> {
    Ok(Json(find_by_id(&state, claims.sub).await?.into()))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<UpdateProfileRequest>,
) -> AppResult<Json<UserInfo>> {
    let name = require_text("Name", &payload.name, 100)?;
    let user = find_by_id(&state, claims.sub).await?;

    let mut active: user::ActiveModel = user.into();
    active.name = Set(name);
    let user = active.update(&state.db).await?;

    Ok(Json(user.into()))
}

/// Replace the profile image (multipart field `image`)
pub async fn upload_avatar(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    mut multipart: Multipart,
) -> AppResult<Json<UserInfo>> {
    let user = find_by_id(&state, claims.sub).await?;

    let form = upload::read_form(&mut multipart, &state.config.upload_dir, "image").await?;
    let image = form
        .image
        .ok_or_else(|| AppError::BadRequest("Missing image file".to_string()))?;

    let previous = user.profile_image.clone();
    let mut active: user::ActiveModel = user.into();
    active.profile_image = Set(Some(image.clone()));
    let user = match active.update(&state.db).await {
        Ok(u) => u,
        Err(e) => {
            upload::remove_file(&state.config.upload_dir, &image).await;
            return Err(e.into());
        }
    };

    if let Some(old) = previous {
        upload::remove_file(&state.config.upload_dir, &old).await;
    }

    Ok(Json(user.into()))
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<ChangePasswordRequest>,
) -> AppResult<Json<serde_json::Value>> {
    validate_password(&payload.new_password)?;
    let user = find_by_id(&state, claims.sub).await?;

    if !verify_secret(&payload.current_password, &user.password_hash)? {
        return Err(AppError::Unauthorized("Current password is incorrect".to_string()));
    }

    let mut active: user::ActiveModel = user.into();
    active.password_hash = Set(hash_secret(&payload.new_password)?);
    active.update(&state.db).await?;

    Ok(message("Password updated"))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<serde_json::Value>> {
    let user = find_by_id(&state, claims.sub).await?;

    let mut active: user::ActiveModel = user.into();
    active.refresh_token = Set(None);
    active.update(&state.db).await?;

    Ok(message("Logged out"))
}
