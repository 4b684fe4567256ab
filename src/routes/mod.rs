use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, patch, post, put},
    Router,
};
use tower_http::services::ServeDir;

use crate::handlers::{booking, dashboard, payment, review, user, venue};
use crate::middleware::auth::{auth_middleware, require_customer, require_vendor};
use crate::middleware::rate_limit::create_public_governor;
use crate::middleware::role_rate_limit::{create_role_governor, RateLimitedRole};
use crate::utils::upload::PUBLIC_PREFIX;
use crate::AppState;

pub fn create_router(state: AppState) -> Router {
    // IP-based governor for unauthenticated routes
    let public_governor = create_public_governor();

    // ---- /api/user ----
    let user_public = Router::new()
        .route("/signup", post(user::signup))
        .route("/signin", post(user::signin))
        .route("/verify-otp", post(user::verify_otp))
        .route("/resend-otp", post(user::resend_otp))
        .route("/refresh-token", post(user::refresh_token))
        .route("/forgot-password", post(user::forgot_password))
        .route("/reset-password", post(user::reset_password))
        .layer(public_governor.clone());

    // Any signed-in user
    let user_account = Router::new()
        .route("/me", get(user::me))
        .route("/me", put(user::update_me))
        .route("/me/avatar", patch(user::upload_avatar))
        .route("/me/password", put(user::change_password))
        .route("/logout", post(user::logout))
        .layer(create_role_governor(RateLimitedRole::Account))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // ---- /api/venue ----
    let venue_public = Router::new()
        .route("/", get(venue::list_venues))
        .route("/nearby", get(venue::nearby_venues))
        .route("/{id}", get(venue::get_venue))
        .route("/{id}/availability", get(venue::availability))
        .layer(public_governor.clone());

    let venue_vendor = Router::new()
        .route("/", post(venue::create_venue))
        .route("/mine", get(venue::my_venues))
        .route("/{id}", put(venue::update_venue))
        .route("/{id}", delete(venue::delete_venue))
        .route("/{id}/status", patch(venue::update_status))
        .route("/{id}/image", patch(venue::update_image))
        .route("/{id}/discount", put(venue::set_discount))
        .route("/{id}/discount", delete(venue::remove_discount))
        .layer(create_role_governor(RateLimitedRole::Vendor))
        .layer(middleware::from_fn(require_vendor))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // ---- /api/bookings ----
    let booking_customer = Router::new()
        .route("/", post(booking::create_booking))
        .route("/", get(booking::my_bookings))
        .route("/{id}/cancel", patch(booking::cancel_booking))
        .layer(create_role_governor(RateLimitedRole::Customer))
        .layer(middleware::from_fn(require_customer))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let booking_vendor = Router::new()
        .route("/vendor", get(booking::vendor_bookings))
        .route("/{id}/status", patch(booking::update_booking_status))
        .layer(create_role_governor(RateLimitedRole::Vendor))
        .layer(middleware::from_fn(require_vendor))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Customer who booked or vendor who owns the venue
    let booking_shared = Router::new()
        .route("/{id}", get(booking::get_booking))
        .layer(create_role_governor(RateLimitedRole::Account))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // ---- /api/payment ----
    let payment_customer = Router::new()
        .route("/khalti/initiate", post(payment::khalti_initiate))
        .route("/khalti/verify", post(payment::khalti_verify))
        .route("/paypal/create-order", post(payment::paypal_create_order))
        .route("/paypal/capture", post(payment::paypal_capture))
        .route("/history", get(payment::payment_history))
        .route("/{id}", get(payment::get_payment))
        .layer(create_role_governor(RateLimitedRole::Customer))
        .layer(middleware::from_fn(require_customer))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Gateway redirects carry no bearer token
    let payment_callbacks = Router::new()
        .route("/khalti/callback", get(payment::khalti_callback))
        .route("/paypal/success", get(payment::paypal_success))
        .route("/paypal/cancel", get(payment::paypal_cancel))
        .layer(public_governor.clone());

    // ---- /api/review ----
    let review_public = Router::new()
        .route("/venue/{id}", get(review::venue_reviews))
        .layer(public_governor);

    let review_customer = Router::new()
        .route("/venue/{id}", post(review::create_review))
        .route("/{id}", put(review::update_review))
        .route("/{id}", delete(review::delete_review))
        .layer(create_role_governor(RateLimitedRole::Customer))
        .layer(middleware::from_fn(require_customer))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // ---- /api/dashboard ----
    let dashboard_routes = Router::new()
        .route("/summary", get(dashboard::summary))
        .route("/revenue/monthly", get(dashboard::monthly_revenue))
        .route("/venues/performance", get(dashboard::venue_performance))
        .route("/bookings/recent", get(dashboard::recent_bookings))
        .layer(create_role_governor(RateLimitedRole::Vendor))
        .layer(middleware::from_fn(require_vendor))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let upload_limit = DefaultBodyLimit::max(state.config.max_upload_bytes);
    let uploads = ServeDir::new(&state.config.upload_dir);

    // Combine all routes
    Router::new()
        .nest("/api/user", user_public.merge(user_account))
        .nest("/api/venue", venue_public.merge(venue_vendor))
        .nest(
            "/api/bookings",
            booking_customer.merge(booking_vendor).merge(booking_shared),
        )
        .nest("/api/payment", payment_customer.merge(payment_callbacks))
        .nest("/api/review", review_public.merge(review_customer))
        .nest("/api/dashboard", dashboard_routes)
        .nest_service(&format!("/{}", PUBLIC_PREFIX), uploads)
        .layer(upload_limit)
        .with_state(state)
}
