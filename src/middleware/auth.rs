use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

use crate::entities::user::UserRole;
use crate::error::{AppError, AppResult};
use crate::utils::jwt::{verify_token, Claims};
use crate::AppState;

/// Extract and validate JWT token from Authorization header
pub async fn auth_middleware(
    State(state): State<AppState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request,
    next: Next,
) -> AppResult<Response> {
    let TypedHeader(auth) = auth
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;

    let claims = verify_token(auth.token(), &state.config.jwt_secret)?;
    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

fn ensure_role(request: &Request, role: UserRole, message: &str) -> AppResult<()> {
    let claims = request
        .extensions()
        .get::<Claims>()
        .ok_or_else(|| AppError::Unauthorized("No authentication found".to_string()))?;

    if claims.role != role {
        return Err(AppError::Forbidden(message.to_string()));
    }

    Ok(())
}

/// Require customer role
pub async fn require_customer(
    request: Request,
    next: Next,
) -> AppResult<Response> {
    ensure_role(&request, UserRole::Customer, "Customer access required")?;
    Ok(next.run(request).await)
}

/// Require vendor role
pub async fn require_vendor(
    request: Request,
    next: Next,
) -> AppResult<Response> {
    ensure_role(&request, UserRole::Vendor, "Vendor access required")?;
    Ok(next.run(request).await)
}
