use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::booking::{self, BookingStatus};
use crate::entities::payment::PaymentStatus;
use crate::entities::venue::{self, VenueStatus};
use crate::entities::user;
use crate::error::{AppError, AppResult};
use crate::utils::jwt::Claims;
use crate::utils::pricing::booking_total;
use crate::utils::slot::{format_time, TimeSlot};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub venue_id: Uuid,
    pub date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub id: Uuid,
    pub venue_id: Uuid,
    pub venue_name: String,
    pub user_id: Uuid,
    pub customer_name: Option<String>,
    pub date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub total_price: f64,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

impl BookingResponse {
    pub fn new(b: booking::Model, venue_name: String, customer_name: Option<String>) -> Self {
        Self {
            id: b.id,
            venue_id: b.venue_id,
            venue_name,
            user_id: b.user_id,
            customer_name,
            date: b.date,
            start_time: b.start_time,
            end_time: b.end_time,
            total_price: b.total_price,
            status: b.status,
            payment_status: b.payment_status,
            created_at: b.created_at.with_timezone(&Utc),
        }
    }
}

/// Reject slots that cannot be booked regardless of other bookings
fn check_bookable(
    venue: &venue::Model,
    date: NaiveDate,
    slot: &TimeSlot,
    now: NaiveDateTime,
) -> AppResult<()> {
    if venue.status != VenueStatus::Active {
        return Err(AppError::BadRequest("Venue is not accepting bookings".to_string()));
    }

    let opening = TimeSlot::parse(&venue.opening_time, &venue.closing_time)?;
    if !slot.within(&opening) {
        return Err(AppError::BadRequest(format!(
            "Booking must be within opening hours {} - {}",
            venue.opening_time, venue.closing_time
        )));
    }

    // `now` is venue-local wall-clock time
    let today = now.date();
    if date < today || (date == today && slot.start <= now.time()) {
        return Err(AppError::BadRequest("Cannot book a slot in the past".to_string()));
    }

    Ok(())
}

/// Create a booking
pub async fn create_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateBookingRequest>,
) -> AppResult<(StatusCode, Json<BookingResponse>)> {
    let slot = TimeSlot::parse(&payload.start_time, &payload.end_time)?;
    let start_time = format_time(slot.start);
    let end_time = format_time(slot.end);

    let txn = state.db.begin().await?;

    // Row lock serializes concurrent bookings for the same venue
    let venue = venue::Entity::find_by_id(payload.venue_id)
        .lock_exclusive()
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Venue not found".to_string()))?;

    check_bookable(&venue, payload.date, &slot, state.config.local_now())?;

    // Stored times are zero-padded HH:MM, so string comparison is time comparison
    let conflict = booking::Entity::find()
        .filter(booking::Column::VenueId.eq(venue.id))
        .filter(booking::Column::Date.eq(payload.date))
        .filter(booking::Column::Status.ne(BookingStatus::Cancelled))
        .filter(booking::Column::StartTime.lt(end_time.as_str()))
        .filter(booking::Column::EndTime.gt(start_time.as_str()))
        .one(&txn)
        .await?;

    if let Some(existing) = conflict {
        return Err(AppError::Conflict(format!(
            "Slot overlaps an existing booking ({} - {})",
            existing.start_time, existing.end_time
        )));
    }

    let total_price = booking_total(
        venue.price_per_hour,
        &slot,
        venue.discount().as_ref(),
        payload.date,
    );

    let new_booking = booking::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(claims.sub),
        venue_id: Set(venue.id),
        date: Set(payload.date),
        start_time: Set(start_time),
        end_time: Set(end_time),
        total_price: Set(total_price),
        status: Set(BookingStatus::Pending),
        payment_status: Set(PaymentStatus::Pending),
        ..Default::default()
    };

    let booking = new_booking.insert(&txn).await?;
    txn.commit().await?;

    tracing::info!(
        booking_id = %booking.id,
        venue_id = %venue.id,
        date = %booking.date,
        start = %booking.start_time,
        end = %booking.end_time,
        total_price,
        "Booking created"
    );

    Ok((StatusCode::CREATED, Json(BookingResponse::new(booking, venue.name, None))))
}

/// List the caller's bookings, newest first
pub async fn my_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<BookingResponse>>> {
    let rows = booking::Entity::find()
        .filter(booking::Column::UserId.eq(claims.sub))
        .order_by_desc(booking::Column::Date)
        .order_by_desc(booking::Column::StartTime)
        .find_also_related(venue::Entity)
        .all(&state.db)
        .await?;

    let responses = rows
        .into_iter()
        .map(|(b, v)| {
            let venue_name = v.map(|v| v.name).unwrap_or_default();
            BookingResponse::new(b, venue_name, None)
        })
        .collect();

    Ok(Json(responses))
}

/// Get one booking; visible to the customer who made it and the venue's vendor
pub async fn get_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BookingResponse>> {
    let (booking, venue) = booking::Entity::find_by_id(id)
        .find_also_related(venue::Entity)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;

    let venue = venue.ok_or_else(|| AppError::Internal("Booking venue missing".to_string()))?;

    if booking.user_id != claims.sub && venue.vendor_id != claims.sub {
        return Err(AppError::Forbidden("You cannot view this booking".to_string()));
    }

    let customer = user::Entity::find_by_id(booking.user_id).one(&state.db).await?;

    Ok(Json(BookingResponse::new(
        booking,
        venue.name,
        customer.map(|c| c.name),
    )))
}

/// Cancel one of the caller's bookings
pub async fn cancel_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BookingResponse>> {
    let (booking, venue) = booking::Entity::find_by_id(id)
        .find_also_related(venue::Entity)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;

    // Verify ownership
    if booking.user_id != claims.sub {
        return Err(AppError::Forbidden(
            "You can only cancel your own bookings".to_string(),
        ));
    }

    if matches!(booking.status, BookingStatus::Cancelled | BookingStatus::Completed) {
        return Err(AppError::BadRequest(format!(
            "Booking is already {}",
            status_label(booking.status)
        )));
    }

    let mut active: booking::ActiveModel = booking.into();
    active.status = Set(BookingStatus::Cancelled);
    let booking = active.update(&state.db).await?;

    tracing::info!(booking_id = %booking.id, "Booking cancelled by customer");
    Ok(Json(BookingResponse::new(
        booking,
        venue.map(|v| v.name).unwrap_or_default(),
        None,
    )))
}

fn status_label(status: BookingStatus) -> &'static str {
    match status {
        BookingStatus::Pending => "pending",
        BookingStatus::Confirmed => "confirmed",
        BookingStatus::Cancelled => "cancelled",
        BookingStatus::Completed => "completed",
    }
}

// ============ Vendor ============

#[derive(Debug, Deserialize)]
pub struct VendorBookingFilter {
    pub status: Option<BookingStatus>,
    pub date: Option<NaiveDate>,
}

/// Bookings on the vendor's venues
pub async fn vendor_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(filter): Query<VendorBookingFilter>,
) -> AppResult<Json<Vec<BookingResponse>>> {
    let venues = venue::Entity::find()
        .filter(venue::Column::VendorId.eq(claims.sub))
        .all(&state.db)
        .await?;

    if venues.is_empty() {
        return Ok(Json(Vec::new()));
    }

    let mut query = booking::Entity::find()
        .filter(booking::Column::VenueId.is_in(venues.iter().map(|v| v.id)));

    if let Some(status) = filter.status {
        query = query.filter(booking::Column::Status.eq(status));
    }
    if let Some(date) = filter.date {
        query = query.filter(booking::Column::Date.eq(date));
    }

    let rows = query
        .order_by_desc(booking::Column::Date)
        .order_by_asc(booking::Column::StartTime)
        .find_also_related(user::Entity)
        .all(&state.db)
        .await?;

    let responses = rows
        .into_iter()
        .map(|(b, customer)| {
            let venue_name = venues
                .iter()
                .find(|v| v.id == b.venue_id)
                .map(|v| v.name.clone())
                .unwrap_or_default();
            BookingResponse::new(b, venue_name, customer.map(|c| c.name))
        })
        .collect();

    Ok(Json(responses))
}

#[derive(Debug, Deserialize)]
pub struct UpdateBookingStatusRequest {
    pub status: BookingStatus,
}

/// Confirm, complete or cancel a booking on one of the vendor's venues
pub async fn update_booking_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateBookingStatusRequest>,
) -> AppResult<Json<BookingResponse>> {
    let (booking, venue) = booking::Entity::find_by_id(id)
        .find_also_related(venue::Entity)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;

    let venue = venue.ok_or_else(|| AppError::Internal("Booking venue missing".to_string()))?;
    if venue.vendor_id != claims.sub {
        return Err(AppError::Forbidden(
            "You can only manage bookings on your own venues".to_string(),
        ));
    }

    if !booking.status.can_transition_to(payload.status) {
        return Err(AppError::BadRequest(format!(
            "Cannot change booking from {} to {}",
            status_label(booking.status),
            status_label(payload.status)
        )));
    }

    let mut active: booking::ActiveModel = booking.into();
    active.status = Set(payload.status);
    let booking = active.update(&state.db).await?;

    tracing::info!(booking_id = %booking.id, status = status_label(booking.status), "Booking status updated");
    Ok(Json(BookingResponse::new(booking, venue.name, None)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn venue(status: VenueStatus) -> venue::Model {
        venue::Model {
            id: Uuid::new_v4(),
            vendor_id: Uuid::new_v4(),
            name: "Kick Off Arena".to_string(),
            location_name: "Lalitpur".to_string(),
            latitude: 27.67,
            longitude: 85.32,
            price_per_hour: 1200.0,
            opening_time: "06:00".to_string(),
            closing_time: "21:00".to_string(),
            venue_type: "indoor".to_string(),
            status,
            image: None,
            discount_percentage: None,
            discount_valid_from: None,
            discount_valid_until: None,
            avg_rating: 0.0,
            review_count: 0,
            created_at: Utc::now().into(),
        }
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn now() -> NaiveDateTime {
        date("2025-03-10").and_hms_opt(12, 0, 0).unwrap()
    }

    #[test]
    fn test_bookable_future_slot() {
        let slot = TimeSlot::parse("18:00", "19:00").unwrap();
        assert!(check_bookable(&venue(VenueStatus::Active), date("2025-03-11"), &slot, now()).is_ok());
        assert!(check_bookable(&venue(VenueStatus::Active), date("2025-03-10"), &slot, now()).is_ok());
    }

    #[test]
    fn test_inactive_venue_rejected() {
        let slot = TimeSlot::parse("18:00", "19:00").unwrap();
        assert!(check_bookable(&venue(VenueStatus::Maintenance), date("2025-03-11"), &slot, now()).is_err());
    }

    #[test]
    fn test_outside_opening_hours_rejected() {
        let slot = TimeSlot::parse("20:30", "21:30").unwrap();
        assert!(check_bookable(&venue(VenueStatus::Active), date("2025-03-11"), &slot, now()).is_err());
    }

    #[test]
    fn test_past_slots_rejected() {
        let slot = TimeSlot::parse("18:00", "19:00").unwrap();
        assert!(check_bookable(&venue(VenueStatus::Active), date("2025-03-09"), &slot, now()).is_err());

        let earlier_today = TimeSlot::parse("11:00", "12:30").unwrap();
        assert!(check_bookable(&venue(VenueStatus::Active), date("2025-03-10"), &earlier_today, now()).is_err());
    }

    #[test]
    fn test_past_check_uses_local_time() {
        // 19:00 UTC on the 10th is 00:45 on the 11th at UTC+05:45
        let utc = date("2025-03-10").and_hms_opt(19, 0, 0).unwrap().and_utc();
        let offset = FixedOffset::east_opt(345 * 60).unwrap();
        let local = utc.with_timezone(&offset).naive_local();
        assert_eq!(local, date("2025-03-11").and_hms_opt(0, 45, 0).unwrap());

        let evening = TimeSlot::parse("20:00", "21:00").unwrap();
        assert!(check_bookable(&venue(VenueStatus::Active), date("2025-03-10"), &evening, local).is_err());

        let morning = TimeSlot::parse("06:00", "07:00").unwrap();
        assert!(check_bookable(&venue(VenueStatus::Active), date("2025-03-11"), &morning, local).is_ok());
    }
}
