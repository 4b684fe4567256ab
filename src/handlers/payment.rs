use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::booking::{self, BookingStatus};
use crate::entities::payment::{self, PaymentMethod, PaymentStatus};
use crate::entities::{user, venue};
use crate::error::{AppError, AppResult};
use crate::gateways::khalti::{to_paisa, CustomerInfo, InitiateRequest, LookupStatus};
use crate::utils::jwt::Claims;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct BookingPaymentRequest {
    pub booking_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct KhaltiInitiateResponse {
    pub payment_id: Uuid,
    pub pidx: String,
    pub payment_url: String,
    pub expires_at: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PayPalOrderResponse {
    pub payment_id: Uuid,
    pub order_id: String,
    pub approve_url: String,
    pub amount: f64,
    pub currency: String,
}

/// A booking the caller may pay for, with its venue
async fn payable_booking(
    state: &AppState,
    booking_id: Uuid,
    user_id: Uuid,
) -> AppResult<(booking::Model, venue::Model)> {
    let (booking, venue) = booking::Entity::find_by_id(booking_id)
        .find_also_related(venue::Entity)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;

    if booking.user_id != user_id {
        return Err(AppError::Forbidden("You can only pay for your own bookings".to_string()));
    }

    if booking.status == BookingStatus::Cancelled {
        return Err(AppError::BadRequest("Booking has been cancelled".to_string()));
    }

    if booking.payment_status == PaymentStatus::Paid {
        return Err(AppError::Conflict("Booking is already paid".to_string()));
    }

    let venue = venue.ok_or_else(|| AppError::Internal("Booking venue missing".to_string()))?;
    Ok((booking, venue))
}

fn order_name(booking: &booking::Model, venue: &venue::Model) -> String {
    format!(
        "{} {} {}-{}",
        venue.name, booking.date, booking.start_time, booking.end_time
    )
}

async fn find_payment(
    state: &AppState,
    reference: &str,
    method: PaymentMethod,
) -> AppResult<payment::Model> {
    payment::Entity::find()
        .filter(payment::Column::GatewayReference.eq(reference))
        .filter(payment::Column::Method.eq(method))
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))
}

fn ensure_owner(payment: &payment::Model, claims: &Claims) -> AppResult<()> {
    if payment.user_id != claims.sub {
        return Err(AppError::Forbidden("This payment belongs to another user".to_string()));
    }
    Ok(())
}

/// Record a settled payment and confirm its booking
async fn mark_paid(
    state: &AppState,
    payment: payment::Model,
    transaction_id: Option<String>,
) -> AppResult<payment::Model> {
    let txn = state.db.begin().await?;
    let now = Utc::now();

    let booking_id = payment.booking_id;
    let mut active: payment::ActiveModel = payment.into();
    active.status = Set(PaymentStatus::Paid);
    active.transaction_id = Set(transaction_id);
    active.paid_at = Set(Some(now.into()));
    active.updated_at = Set(now.into());
    let payment = active.update(&txn).await?;

    if let Some(booking) = booking::Entity::find_by_id(booking_id).one(&txn).await? {
        let status = booking.status;
        let mut active: booking::ActiveModel = booking.into();
        active.payment_status = Set(PaymentStatus::Paid);
        if status == BookingStatus::Pending {
            active.status = Set(BookingStatus::Confirmed);
        }
        active.update(&txn).await?;
    }

    txn.commit().await?;

    tracing::info!(
        payment_id = %payment.id,
        booking_id = %payment.booking_id,
        method = ?payment.method,
        amount = payment.amount,
        currency = %payment.currency,
        "Payment completed"
    );
    Ok(payment)
}

/// A later failed attempt must not undo an earlier successful one
fn failure_overrides(booking_payment: PaymentStatus) -> bool {
    booking_payment != PaymentStatus::Paid
}

async fn mark_failed(state: &AppState, payment: payment::Model, reason: &str) -> AppResult<payment::Model> {
    let txn = state.db.begin().await?;

    let booking_id = payment.booking_id;
    let mut active: payment::ActiveModel = payment.into();
    active.status = Set(PaymentStatus::Failed);
    active.updated_at = Set(Utc::now().into());
    let payment = active.update(&txn).await?;

    if let Some(booking) = booking::Entity::find_by_id(booking_id).one(&txn).await? {
        if failure_overrides(booking.payment_status) {
            let mut active: booking::ActiveModel = booking.into();
            active.payment_status = Set(PaymentStatus::Failed);
            active.update(&txn).await?;
        }
    }

    txn.commit().await?;

    tracing::warn!(payment_id = %payment.id, reason, "Payment failed");
    Ok(payment)
}

// ============ Khalti ============

/// Start a Khalti ePayment for a booking
pub async fn khalti_initiate(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<BookingPaymentRequest>,
) -> AppResult<(StatusCode, Json<KhaltiInitiateResponse>)> {
    let (booking, venue) = payable_booking(&state, payload.booking_id, claims.sub).await?;
    let customer = user::Entity::find_by_id(claims.sub)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let base = state.config.public_base_url.trim_end_matches('/');
    let request = InitiateRequest {
        return_url: format!("{}/api/payment/khalti/callback", base),
        website_url: base.to_string(),
        amount: to_paisa(booking.total_price),
        purchase_order_id: booking.id.to_string(),
        purchase_order_name: order_name(&booking, &venue),
        customer_info: CustomerInfo {
            name: customer.name,
            email: customer.email,
        },
    };

    let initiated = state.khalti.initiate(&request).await?;

    let new_payment = payment::ActiveModel {
        id: Set(Uuid::new_v4()),
        booking_id: Set(booking.id),
        user_id: Set(claims.sub),
        method: Set(PaymentMethod::Khalti),
        gateway_reference: Set(initiated.pidx.clone()),
        transaction_id: Set(None),
        amount: Set(booking.total_price),
        currency: Set("NPR".to_string()),
        status: Set(PaymentStatus::Pending),
        paid_at: Set(None),
        ..Default::default()
    };
    let payment = new_payment.insert(&state.db).await?;

    tracing::info!(payment_id = %payment.id, pidx = %initiated.pidx, "Khalti payment initiated");

    Ok((
        StatusCode::CREATED,
        Json(KhaltiInitiateResponse {
            payment_id: payment.id,
            pidx: initiated.pidx,
            payment_url: initiated.payment_url,
            expires_at: initiated.expires_at,
        }),
    ))
}

#[derive(Debug, PartialEq, Eq)]
enum KhaltiOutcome {
    Paid,
    Pending,
    Failed(&'static str),
}

/// What a lookup result means for a payment of `expected` paisa
fn khalti_outcome(status: LookupStatus, total_amount: i64, expected: i64) -> KhaltiOutcome {
    match status {
        LookupStatus::Completed if total_amount == expected => KhaltiOutcome::Paid,
        LookupStatus::Completed => KhaltiOutcome::Failed("amount mismatch"),
        LookupStatus::Pending | LookupStatus::Initiated => KhaltiOutcome::Pending,
        _ => KhaltiOutcome::Failed("gateway reported unsuccessful payment"),
    }
}

/// Settle a Khalti payment from the gateway's lookup result
async fn finalize_khalti(state: &AppState, payment: payment::Model) -> AppResult<payment::Model> {
    if payment.status == PaymentStatus::Paid {
        return Ok(payment);
    }

    let lookup = state.khalti.lookup(&payment.gateway_reference).await?;

    match khalti_outcome(lookup.status, lookup.total_amount, to_paisa(payment.amount)) {
        KhaltiOutcome::Paid => mark_paid(state, payment, lookup.transaction_id).await,
        KhaltiOutcome::Pending => Err(AppError::BadRequest(
            "Payment is still pending".to_string(),
        )),
        KhaltiOutcome::Failed(reason) => mark_failed(state, payment, reason).await,
    }
}

#[derive(Debug, Deserialize)]
pub struct KhaltiVerifyRequest {
    pub pidx: String,
}

pub async fn khalti_verify(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<KhaltiVerifyRequest>,
) -> AppResult<Json<payment::Model>> {
    let payment = find_payment(&state, &payload.pidx, PaymentMethod::Khalti).await?;
    ensure_owner(&payment, &claims)?;

    Ok(Json(finalize_khalti(&state, payment).await?))
}

#[derive(Debug, Deserialize)]
pub struct KhaltiCallbackQuery {
    pub pidx: String,
}

/// Return URL Khalti redirects the payer to
pub async fn khalti_callback(
    State(state): State<AppState>,
    Query(query): Query<KhaltiCallbackQuery>,
) -> AppResult<Json<payment::Model>> {
    let payment = find_payment(&state, &query.pidx, PaymentMethod::Khalti).await?;
    Ok(Json(finalize_khalti(&state, payment).await?))
}

// ============ PayPal ============

/// Create a PayPal order for a booking
pub async fn paypal_create_order(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<BookingPaymentRequest>,
) -> AppResult<(StatusCode, Json<PayPalOrderResponse>)> {
    let (booking, venue) = payable_booking(&state, payload.booking_id, claims.sub).await?;

    let amount = state.paypal.convert(booking.total_price);
    if amount <= 0.0 {
        return Err(AppError::BadRequest("Booking amount is too small for PayPal".to_string()));
    }

    let base = state.config.public_base_url.trim_end_matches('/');
    let order = state
        .paypal
        .create_order(
            &booking.id.to_string(),
            &order_name(&booking, &venue),
            amount,
            format!("{}/api/payment/paypal/success", base),
            format!("{}/api/payment/paypal/cancel", base),
        )
        .await?;

    let approve_url = order
        .approve_url()
        .ok_or_else(|| AppError::Gateway("PayPal order has no approval link".to_string()))?
        .to_string();

    let new_payment = payment::ActiveModel {
        id: Set(Uuid::new_v4()),
        booking_id: Set(booking.id),
        user_id: Set(claims.sub),
        method: Set(PaymentMethod::Paypal),
        gateway_reference: Set(order.id.clone()),
        transaction_id: Set(None),
        amount: Set(amount),
        currency: Set(state.paypal.currency().to_string()),
        status: Set(PaymentStatus::Pending),
        paid_at: Set(None),
        ..Default::default()
    };
    let payment = new_payment.insert(&state.db).await?;

    tracing::info!(payment_id = %payment.id, order_id = %order.id, "PayPal order created");

    Ok((
        StatusCode::CREATED,
        Json(PayPalOrderResponse {
            payment_id: payment.id,
            order_id: order.id,
            approve_url,
            amount: payment.amount,
            currency: payment.currency,
        }),
    ))
}

async fn finalize_paypal(state: &AppState, payment: payment::Model) -> AppResult<payment::Model> {
    if payment.status == PaymentStatus::Paid {
        return Ok(payment);
    }

    let order = state.paypal.capture_order(&payment.gateway_reference).await?;

    if order.is_completed() {
        let capture_id = order.capture_id().map(str::to_string);
        mark_paid(state, payment, capture_id).await
    } else {
        mark_failed(state, payment, "order not completed after capture").await
    }
}

#[derive(Debug, Deserialize)]
pub struct PayPalCaptureRequest {
    pub order_id: String,
}

pub async fn paypal_capture(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<PayPalCaptureRequest>,
) -> AppResult<Json<payment::Model>> {
    let payment = find_payment(&state, &payload.order_id, PaymentMethod::Paypal).await?;
    ensure_owner(&payment, &claims)?;

    Ok(Json(finalize_paypal(&state, payment).await?))
}

/// PayPal appends the order id as `token` to return and cancel URLs
#[derive(Debug, Deserialize)]
pub struct PayPalReturnQuery {
    pub token: String,
}

pub async fn paypal_success(
    State(state): State<AppState>,
    Query(query): Query<PayPalReturnQuery>,
) -> AppResult<Json<payment::Model>> {
    let payment = find_payment(&state, &query.token, PaymentMethod::Paypal).await?;
    Ok(Json(finalize_paypal(&state, payment).await?))
}

pub async fn paypal_cancel(
    State(state): State<AppState>,
    Query(query): Query<PayPalReturnQuery>,
) -> AppResult<Json<payment::Model>> {
    let payment = find_payment(&state, &query.token, PaymentMethod::Paypal).await?;

    if payment.status != PaymentStatus::Pending {
        return Ok(Json(payment));
    }

    Ok(Json(mark_failed(&state, payment, "payer cancelled").await?))
}

// ============ History ============

pub async fn payment_history(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<payment::Model>>> {
    let payments = payment::Entity::find()
        .filter(payment::Column::UserId.eq(claims.sub))
        .order_by_desc(payment::Column::CreatedAt)
        .all(&state.db)
        .await?;

    Ok(Json(payments))
}

pub async fn get_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<payment::Model>> {
    let payment = payment::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;

    ensure_owner(&payment, &claims)?;
    Ok(Json(payment))
}
