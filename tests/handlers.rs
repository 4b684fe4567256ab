//! Handler tests against sea-orm's mock connection. Each mock result answers
//! one query in the order the handler issues them; a handler that issues an
//! extra query runs out of results and fails.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{FromRequest, Multipart, Path, Query, Request, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{Duration, NaiveDate, Utc};
use sea_orm::{DatabaseBackend, DbErr, MockDatabase};
use uuid::Uuid;

use futsal_booking::{
    entities::{
        booking::{self, BookingStatus},
        payment::{self, PaymentMethod, PaymentStatus},
        review,
        user::{self, UserRole},
        venue::{self, VenueStatus},
    },
    handlers::{
        booking::{create_booking, CreateBookingRequest},
        payment::{khalti_verify, paypal_cancel, KhaltiVerifyRequest, PayPalReturnQuery},
        review::{create_review, ReviewRequest},
        user::{refresh_token, signup, verify_otp, RefreshRequest, SignupRequest, VerifyOtpRequest},
        venue::create_venue,
    },
    notifier::{OtpNotifier, OtpPurpose},
    utils::{jwt::create_token, otp},
    AppError, AppResult, AppState,
};

mod common;

const EMAIL: &str = "player@futsal.com";

fn mock() -> MockDatabase {
    MockDatabase::new(DatabaseBackend::Postgres)
}

fn play_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2099, 6, 1).unwrap()
}

fn venue_model(vendor_id: Uuid) -> venue::Model {
    venue::Model {
        id: Uuid::new_v4(),
        vendor_id,
        name: "Dhuku Futsal".to_string(),
        location_name: "Kupondole".to_string(),
        latitude: 27.69,
        longitude: 85.31,
        price_per_hour: 1500.0,
        opening_time: "06:00".to_string(),
        closing_time: "22:00".to_string(),
        venue_type: "indoor".to_string(),
        status: VenueStatus::Active,
        image: None,
        discount_percentage: None,
        discount_valid_from: None,
        discount_valid_until: None,
        avg_rating: 0.0,
        review_count: 0,
        created_at: Utc::now().into(),
    }
}

fn booking_model(venue: &venue::Model, user_id: Uuid, start: &str, end: &str) -> booking::Model {
    booking::Model {
        id: Uuid::new_v4(),
        user_id,
        venue_id: venue.id,
        date: play_date(),
        start_time: start.to_string(),
        end_time: end.to_string(),
        total_price: 1500.0,
        status: BookingStatus::Pending,
        payment_status: PaymentStatus::Pending,
        created_at: Utc::now().into(),
    }
}

fn payment_model(user_id: Uuid, booking_id: Uuid, method: PaymentMethod, status: PaymentStatus) -> payment::Model {
    payment::Model {
        id: Uuid::new_v4(),
        booking_id,
        user_id,
        method,
        gateway_reference: format!("ref-{}", Uuid::new_v4()),
        transaction_id: None,
        amount: 1500.0,
        currency: "NPR".to_string(),
        status,
        created_at: Utc::now().into(),
        updated_at: Utc::now().into(),
        paid_at: None,
    }
}

fn user_model(role: UserRole) -> user::Model {
    user::Model {
        id: Uuid::new_v4(),
        name: "Sujan".to_string(),
        email: EMAIL.to_string(),
        password_hash: "not-used".to_string(),
        role,
        profile_image: None,
        refresh_token: None,
        is_verified: false,
        otp_hash: None,
        otp_expires_at: None,
        otp_attempts: 0,
        created_at: Utc::now().into(),
    }
}

fn booking_request(venue_id: Uuid, start: &str, end: &str) -> Json<CreateBookingRequest> {
    Json(CreateBookingRequest {
        venue_id,
        date: play_date(),
        start_time: start.to_string(),
        end_time: end.to_string(),
    })
}

// ============ Bookings ============

#[tokio::test]
async fn overlapping_booking_conflicts() {
    let venue = venue_model(Uuid::new_v4());
    let existing = booking_model(&venue, Uuid::new_v4(), "18:00", "19:00");

    let db = mock()
        .append_query_results([vec![venue.clone()]])
        .append_query_results([vec![existing]])
        .into_connection();

    let result = create_booking(
        State(common::state(db)),
        Extension(common::claims(Uuid::new_v4(), UserRole::Customer)),
        booking_request(venue.id, "18:30", "19:30"),
    )
    .await;

    assert!(matches!(result, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn free_slot_is_booked_pending() {
    let customer = Uuid::new_v4();
    let venue = venue_model(Uuid::new_v4());
    let inserted = booking_model(&venue, customer, "19:00", "20:00");

    let db = mock()
        .append_query_results([vec![venue.clone()]])
        .append_query_results([Vec::<booking::Model>::new()])
        .append_query_results([vec![inserted]])
        .into_connection();

    let (status, Json(created)) = create_booking(
        State(common::state(db)),
        Extension(common::claims(customer, UserRole::Customer)),
        booking_request(venue.id, "19:00", "20:00"),
    )
    .await
    .unwrap();

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created.venue_name, venue.name);
    assert_eq!(created.status, BookingStatus::Pending);
}

#[tokio::test]
async fn unknown_venue_is_not_found() {
    let db = mock()
        .append_query_results([Vec::<venue::Model>::new()])
        .into_connection();

    let result = create_booking(
        State(common::state(db)),
        Extension(common::claims(Uuid::new_v4(), UserRole::Customer)),
        booking_request(Uuid::new_v4(), "10:00", "11:00"),
    )
    .await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
}

// ============ Payments ============

#[tokio::test]
async fn verifying_a_paid_payment_is_a_no_op() {
    let customer = Uuid::new_v4();
    let paid = payment_model(customer, Uuid::new_v4(), PaymentMethod::Khalti, PaymentStatus::Paid);

    // No Khalti key is configured, so reaching the gateway would fail
    let db = mock().append_query_results([vec![paid.clone()]]).into_connection();

    let Json(settled) = khalti_verify(
        State(common::state(db)),
        Extension(common::claims(customer, UserRole::Customer)),
        Json(KhaltiVerifyRequest {
            pidx: paid.gateway_reference.clone(),
        }),
    )
    .await
    .unwrap();

    assert_eq!(settled, paid);
}

#[tokio::test]
async fn payment_of_another_user_is_forbidden() {
    let payment = payment_model(Uuid::new_v4(), Uuid::new_v4(), PaymentMethod::Khalti, PaymentStatus::Pending);
    let db = mock().append_query_results([vec![payment.clone()]]).into_connection();

    let result = khalti_verify(
        State(common::state(db)),
        Extension(common::claims(Uuid::new_v4(), UserRole::Customer)),
        Json(KhaltiVerifyRequest {
            pidx: payment.gateway_reference.clone(),
        }),
    )
    .await;

    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn cancelled_attempt_leaves_paid_booking_alone() {
    let customer = Uuid::new_v4();
    let venue = venue_model(Uuid::new_v4());
    let booking = booking::Model {
        status: BookingStatus::Confirmed,
        payment_status: PaymentStatus::Paid,
        ..booking_model(&venue, customer, "18:00", "19:00")
    };
    let pending = payment_model(customer, booking.id, PaymentMethod::Paypal, PaymentStatus::Pending);
    let failed = payment::Model {
        status: PaymentStatus::Failed,
        ..pending.clone()
    };

    // No result is queued for a booking update
    let db = mock()
        .append_query_results([vec![pending.clone()]])
        .append_query_results([vec![failed]])
        .append_query_results([vec![booking]])
        .into_connection();

    let Json(payment) = paypal_cancel(
        State(common::state(db)),
        Query(PayPalReturnQuery {
            token: pending.gateway_reference.clone(),
        }),
    )
    .await
    .unwrap();

    assert_eq!(payment.status, PaymentStatus::Failed);
}

#[tokio::test]
async fn cancelled_attempt_marks_unpaid_booking_failed() {
    let customer = Uuid::new_v4();
    let venue = venue_model(Uuid::new_v4());
    let booking = booking_model(&venue, customer, "18:00", "19:00");
    let pending = payment_model(customer, booking.id, PaymentMethod::Paypal, PaymentStatus::Pending);
    let failed = payment::Model {
        status: PaymentStatus::Failed,
        ..pending.clone()
    };
    let failed_booking = booking::Model {
        payment_status: PaymentStatus::Failed,
        ..booking.clone()
    };

    let db = mock()
        .append_query_results([vec![pending.clone()]])
        .append_query_results([vec![failed]])
        .append_query_results([vec![booking]])
        .append_query_results([vec![failed_booking]])
        .into_connection();

    let result = paypal_cancel(
        State(common::state(db)),
        Query(PayPalReturnQuery {
            token: pending.gateway_reference.clone(),
        }),
    )
    .await;

    assert!(result.is_ok());
}

// ============ Accounts ============

#[tokio::test]
async fn otp_is_single_use() {
    let issued = otp::issue(10).unwrap();
    let armed = user::Model {
        otp_hash: Some(issued.hash.clone()),
        otp_expires_at: Some(issued.expires_at),
        ..user_model(UserRole::Customer)
    };
    let verified = user::Model {
        otp_hash: None,
        otp_expires_at: None,
        is_verified: true,
        refresh_token: Some("stored".to_string()),
        ..armed.clone()
    };

    let db = mock()
        .append_query_results([vec![armed]])
        .append_query_results([vec![verified.clone()]])
        .append_query_results([vec![verified]])
        .into_connection();
    let state = common::state(db);

    let submit = || {
        Json(VerifyOtpRequest {
            email: EMAIL.to_string(),
            otp: issued.code.clone(),
        })
    };

    let Json(auth) = verify_otp(State(state.clone()), submit()).await.unwrap();
    assert!(!auth.access_token.is_empty());
    assert!(auth.user.is_verified);

    let replay = verify_otp(State(state), submit()).await;
    assert!(matches!(replay, Err(AppError::BadRequest(_))));
}

#[tokio::test]
async fn wrong_otp_counts_an_attempt() {
    let issued = otp::issue(10).unwrap();
    let armed = user::Model {
        otp_hash: Some(issued.hash.clone()),
        otp_expires_at: Some(issued.expires_at),
        ..user_model(UserRole::Customer)
    };
    let counted = user::Model {
        otp_attempts: 1,
        ..armed.clone()
    };

    let db = mock()
        .append_query_results([vec![armed]])
        .append_query_results([vec![counted]])
        .into_connection();

    let wrong = if issued.code == "000000" { "111111" } else { "000000" };
    let result = verify_otp(
        State(common::state(db)),
        Json(VerifyOtpRequest {
            email: EMAIL.to_string(),
            otp: wrong.to_string(),
        }),
    )
    .await;

    assert!(matches!(result, Err(AppError::BadRequest(_))));
}

#[tokio::test]
async fn exhausted_otp_rejects_even_the_right_code() {
    let issued = otp::issue(10).unwrap();
    let locked = user::Model {
        otp_hash: Some(issued.hash.clone()),
        otp_expires_at: Some(issued.expires_at),
        otp_attempts: otp::MAX_ATTEMPTS,
        ..user_model(UserRole::Customer)
    };

    let db = mock().append_query_results([vec![locked]]).into_connection();

    let result = verify_otp(
        State(common::state(db)),
        Json(VerifyOtpRequest {
            email: EMAIL.to_string(),
            otp: issued.code.clone(),
        }),
    )
    .await;

    match result {
        Err(AppError::BadRequest(msg)) => assert!(msg.contains("request a new one")),
        _ => panic!("locked code must be rejected"),
    }
}

#[tokio::test]
async fn superseded_refresh_token_is_rejected() {
    let stored = user::Model {
        refresh_token: Some("a-newer-token".to_string()),
        ..user_model(UserRole::Vendor)
    };
    let presented = create_token(
        stored.id,
        EMAIL,
        UserRole::Vendor,
        common::REFRESH_SECRET,
        Duration::days(1),
    )
    .unwrap();

    let db = mock().append_query_results([vec![stored]]).into_connection();

    let result = refresh_token(
        State(common::state(db)),
        Json(RefreshRequest {
            refresh_token: presented,
        }),
    )
    .await;

    assert!(matches!(result, Err(AppError::Unauthorized(_))));
}

#[tokio::test]
async fn current_refresh_token_rotates() {
    let mut stored = user_model(UserRole::Vendor);
    let presented = create_token(
        stored.id,
        EMAIL,
        UserRole::Vendor,
        common::REFRESH_SECRET,
        Duration::days(1),
    )
    .unwrap();
    stored.refresh_token = Some(presented.clone());

    let db = mock()
        .append_query_results([vec![stored.clone()]])
        .append_query_results([vec![stored]])
        .into_connection();

    let Json(auth) = refresh_token(
        State(common::state(db)),
        Json(RefreshRequest {
            refresh_token: presented,
        }),
    )
    .await
    .unwrap();

    assert!(!auth.refresh_token.is_empty());
}

struct UnreachableNotifier;

#[async_trait]
impl OtpNotifier for UnreachableNotifier {
    async fn send(&self, _email: &str, _code: &str, _purpose: OtpPurpose) -> AppResult<()> {
        Err(AppError::Gateway("notifier unreachable".to_string()))
    }
}

#[tokio::test]
async fn signup_succeeds_when_code_delivery_fails() {
    let created = user_model(UserRole::Customer);

    let db = mock()
        .append_query_results([Vec::<user::Model>::new()])
        .append_query_results([vec![created.clone()]])
        .append_query_results([vec![created]])
        .into_connection();

    let state = AppState {
        notifier: Arc::new(UnreachableNotifier),
        ..common::state(db)
    };

    let (status, Json(response)) = signup(
        State(state),
        Json(SignupRequest {
            name: "Sujan".to_string(),
            email: EMAIL.to_string(),
            password: "longenough".to_string(),
            role: UserRole::Customer,
        }),
    )
    .await
    .unwrap();

    assert_eq!(status, StatusCode::CREATED);
    assert!(response.message.contains("request a new one"));
}

// ============ Reviews ============

#[tokio::test]
async fn second_review_of_a_venue_conflicts() {
    let customer = Uuid::new_v4();
    let venue = venue_model(Uuid::new_v4());
    let existing = review::Model {
        id: Uuid::new_v4(),
        user_id: customer,
        venue_id: venue.id,
        rating: 4,
        comment: "Good turf".to_string(),
        created_at: Utc::now().into(),
    };

    let db = mock()
        .append_query_results([vec![venue.clone()]])
        .append_query_results([vec![existing]])
        .into_connection();

    let result = create_review(
        State(common::state(db)),
        Extension(common::claims(customer, UserRole::Customer)),
        Path(venue.id),
        Json(ReviewRequest {
            rating: 5,
            comment: "Even better now".to_string(),
        }),
    )
    .await;

    assert!(matches!(result, Err(AppError::Conflict(_))));
}

// ============ Venues ============

async fn venue_form() -> Multipart {
    let body = [
        ("name", "Dhuku Futsal"),
        ("location_name", "Kupondole"),
        ("venue_type", "indoor"),
        ("latitude", "27.69"),
        ("longitude", "85.31"),
        ("price_per_hour", "1500"),
        ("opening_time", "06:00"),
        ("closing_time", "22:00"),
    ]
    .iter()
    .map(|(name, value)| {
        format!("--XBOUNDARY\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
    })
    .collect::<String>()
        + "--XBOUNDARY\r\nContent-Disposition: form-data; name=\"image\"; filename=\"court.png\"\r\n"
        + "Content-Type: image/png\r\n\r\nPNGDATA\r\n--XBOUNDARY--\r\n";

    let request = Request::builder()
        .header("content-type", "multipart/form-data; boundary=XBOUNDARY")
        .body(Body::from(body))
        .unwrap();
    Multipart::from_request(request, &()).await.unwrap()
}

#[tokio::test]
async fn failed_venue_insert_removes_uploaded_image() {
    let dir = common::temp_upload_dir();
    let db = mock()
        .append_query_errors([DbErr::Custom("insert failed".to_string())])
        .into_connection();
    let state = AppState::new(db, common::config(&dir));

    let result = create_venue(
        State(state),
        Extension(common::claims(Uuid::new_v4(), UserRole::Vendor)),
        venue_form().await,
    )
    .await;

    assert!(matches!(result, Err(AppError::Database(_))));
    let remaining = std::fs::read_dir(&dir).map(|entries| entries.count()).unwrap_or(0);
    assert_eq!(remaining, 0);
}

// ============ Config ============

#[test]
fn local_time_uses_configured_offset() {
    let config = common::config("uploads");
    let utc = NaiveDate::from_ymd_opt(2025, 3, 10)
        .unwrap()
        .and_hms_opt(19, 0, 0)
        .unwrap()
        .and_utc();

    let local = config.to_local(utc);
    assert_eq!(local.date(), NaiveDate::from_ymd_opt(2025, 3, 11).unwrap());
    assert_eq!(local.format("%H:%M").to_string(), "00:45");
}
