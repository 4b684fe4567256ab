use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{
    sea_query::{Expr, Func},
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::booking::{self, BookingStatus};
use crate::entities::venue::{self, VenueStatus};
use crate::error::{AppError, AppResult};
use crate::utils::geo::{haversine_distance, validate_coordinates};
use crate::utils::jwt::Claims;
use crate::utils::pricing::{effective_hourly_rate, Discount};
use crate::utils::slot::{format_time, TimeSlot};
use crate::utils::upload::{self, FormData};
use crate::utils::validation::require_text;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct VenueResponse {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub name: String,
    pub location_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub price_per_hour: f64,
    /// Hourly price today, after any active discount
    pub effective_price: f64,
    pub opening_time: String,
    pub closing_time: String,
    pub venue_type: String,
    pub status: VenueStatus,
    pub image: Option<String>,
    pub discount: Option<Discount>,
    pub discount_active: bool,
    pub avg_rating: f64,
    pub review_count: i32,
    pub created_at: DateTime<Utc>,
}

impl VenueResponse {
    pub fn new(v: venue::Model, today: NaiveDate) -> Self {
        let discount = v.discount();
        Self {
            id: v.id,
            vendor_id: v.vendor_id,
            effective_price: effective_hourly_rate(v.price_per_hour, discount.as_ref(), today),
            discount_active: discount.is_some_and(|d| d.is_active_on(today)),
            discount,
            name: v.name,
            location_name: v.location_name,
            latitude: v.latitude,
            longitude: v.longitude,
            price_per_hour: v.price_per_hour,
            opening_time: v.opening_time,
            closing_time: v.closing_time,
            venue_type: v.venue_type,
            status: v.status,
            image: v.image,
            avg_rating: v.avg_rating,
            review_count: v.review_count,
            created_at: v.created_at.with_timezone(&Utc),
        }
    }
}

/// Load a venue and check that `vendor_id` owns it
pub async fn owned_venue(state: &AppState, venue_id: Uuid, vendor_id: Uuid) -> AppResult<venue::Model> {
    let venue = venue::Entity::find_by_id(venue_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Venue not found".to_string()))?;

    if venue.vendor_id != vendor_id {
        return Err(AppError::Forbidden("You can only manage your own venues".to_string()));
    }

    Ok(venue)
}

fn validate_price(price: f64) -> AppResult<()> {
    if !price.is_finite() || price <= 0.0 {
        return Err(AppError::BadRequest("Price per hour must be positive".to_string()));
    }
    Ok(())
}

/// Parse opening hours into normalized `HH:MM` strings
fn opening_hours(opening: &str, closing: &str) -> AppResult<(String, String)> {
    let hours = TimeSlot::parse(opening, closing)
        .map_err(|_| AppError::BadRequest("Opening hours must be HH:MM with closing after opening".to_string()))?;
    Ok((format_time(hours.start), format_time(hours.end)))
}

// ============ Public ============

#[derive(Debug, Deserialize)]
pub struct VenueFilter {
    pub search: Option<String>,
    pub venue_type: Option<String>,
    pub status: Option<VenueStatus>,
}

/// List venues, active ones by default
pub async fn list_venues(
    State(state): State<AppState>,
    Query(filter): Query<VenueFilter>,
) -> AppResult<Json<Vec<VenueResponse>>> {
    let mut query = venue::Entity::find()
        .filter(venue::Column::Status.eq(filter.status.unwrap_or(VenueStatus::Active)));

    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search.to_lowercase());
        query = query.filter(
            Condition::any()
                .add(Expr::expr(Func::lower(Expr::col((venue::Entity, venue::Column::Name)))).like(pattern.clone()))
                .add(Expr::expr(Func::lower(Expr::col((venue::Entity, venue::Column::LocationName)))).like(pattern)),
        );
    }

    if let Some(venue_type) = filter.venue_type.as_deref().filter(|t| !t.is_empty()) {
        query = query.filter(venue::Column::VenueType.eq(venue_type));
    }

    let venues = query
        .order_by_desc(venue::Column::AvgRating)
        .order_by_asc(venue::Column::Name)
        .all(&state.db)
        .await?;

    let today = state.config.local_today();
    Ok(Json(venues.into_iter().map(|v| VenueResponse::new(v, today)).collect()))
}

#[derive(Debug, Deserialize)]
pub struct NearbyQuery {
    pub lat: f64,
    pub lng: f64,
    pub radius_km: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct NearbyVenue {
    #[serde(flatten)]
    pub venue: VenueResponse,
    pub distance_km: f64,
}

/// Active venues within `radius_km` (default 5) of a point, nearest first
pub async fn nearby_venues(
    State(state): State<AppState>,
    Query(query): Query<NearbyQuery>,
) -> AppResult<Json<Vec<NearbyVenue>>> {
    validate_coordinates(query.lat, query.lng)?;
    let radius = query.radius_km.unwrap_or(5.0);
    if !(radius > 0.0) {
        return Err(AppError::BadRequest("radius_km must be positive".to_string()));
    }

    let venues = venue::Entity::find()
        .filter(venue::Column::Status.eq(VenueStatus::Active))
        .all(&state.db)
        .await?;

    let today = state.config.local_today();
    let mut nearby: Vec<NearbyVenue> = venues
        .into_iter()
        .filter_map(|v| {
            let distance = haversine_distance(query.lat, query.lng, v.latitude, v.longitude);
            (distance <= radius).then(|| NearbyVenue {
                distance_km: (distance * 100.0).round() / 100.0,
                venue: VenueResponse::new(v, today),
            })
        })
        .collect();

    nearby.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    Ok(Json(nearby))
}

/// Get venue details
pub async fn get_venue(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<VenueResponse>> {
    let venue = venue::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Venue not found".to_string()))?;

    Ok(Json(VenueResponse::new(venue, state.config.local_today())))
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub date: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct BookedSlot {
    pub start_time: String,
    pub end_time: String,
    pub status: BookingStatus,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub venue_id: Uuid,
    pub date: NaiveDate,
    pub opening_time: String,
    pub closing_time: String,
    pub price_per_hour: f64,
    pub booked: Vec<BookedSlot>,
}

/// Opening hours and taken slots of a venue on a date
pub async fn availability(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<AvailabilityQuery>,
) -> AppResult<Json<AvailabilityResponse>> {
    let venue = venue::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Venue not found".to_string()))?;

    let booked = booking::Entity::find()
        .filter(booking::Column::VenueId.eq(venue.id))
        .filter(booking::Column::Date.eq(query.date))
        .filter(booking::Column::Status.ne(BookingStatus::Cancelled))
        .order_by_asc(booking::Column::StartTime)
        .all(&state.db)
        .await?
        .into_iter()
        .map(|b| BookedSlot {
            start_time: b.start_time,
            end_time: b.end_time,
            status: b.status,
        })
        .collect();

    Ok(Json(AvailabilityResponse {
        venue_id: venue.id,
        date: query.date,
        price_per_hour: effective_hourly_rate(venue.price_per_hour, venue.discount().as_ref(), query.date),
        opening_time: venue.opening_time,
        closing_time: venue.closing_time,
        booked,
    }))
}

// ============ Vendor Management ============

fn new_venue_from_form(form: &FormData, vendor_id: Uuid) -> AppResult<venue::ActiveModel> {
    let name = require_text("Name", form.text("name")?, 150)?;
    let location_name = require_text("Location name", form.text("location_name")?, 255)?;
    let venue_type = require_text("Venue type", form.text("venue_type")?, 50)?;

    let latitude: f64 = form.parse("latitude")?;
    let longitude: f64 = form.parse("longitude")?;
    validate_coordinates(latitude, longitude)?;

    let price_per_hour: f64 = form.parse("price_per_hour")?;
    validate_price(price_per_hour)?;

    let (opening_time, closing_time) =
        opening_hours(form.text("opening_time")?, form.text("closing_time")?)?;

    Ok(venue::ActiveModel {
        id: Set(Uuid::new_v4()),
        vendor_id: Set(vendor_id),
        name: Set(name),
        location_name: Set(location_name),
        latitude: Set(latitude),
        longitude: Set(longitude),
        price_per_hour: Set(price_per_hour),
        opening_time: Set(opening_time),
        closing_time: Set(closing_time),
        venue_type: Set(venue_type),
        status: Set(VenueStatus::Active),
        image: Set(form.image.clone()),
        discount_percentage: Set(None),
        discount_valid_from: Set(None),
        discount_valid_until: Set(None),
        avg_rating: Set(0.0),
        review_count: Set(0),
        ..Default::default()
    })
}

/// Create a venue from a multipart form (optional `image` file)
pub async fn create_venue(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<VenueResponse>)> {
    let form = upload::read_form(&mut multipart, &state.config.upload_dir, "image").await?;

    let new_venue = match new_venue_from_form(&form, claims.sub) {
        Ok(v) => v,
        Err(e) => {
            if let Some(image) = &form.image {
                upload::remove_file(&state.config.upload_dir, image).await;
            }
            return Err(e);
        }
    };

    let venue = match new_venue.insert(&state.db).await {
        Ok(v) => v,
        Err(e) => {
            if let Some(image) = &form.image {
                upload::remove_file(&state.config.upload_dir, image).await;
            }
            return Err(e.into());
        }
    };
    tracing::info!(venue_id = %venue.id, vendor_id = %claims.sub, "Venue created");

    Ok((StatusCode::CREATED, Json(VenueResponse::new(venue, state.config.local_today()))))
}

/// Venues owned by the calling vendor
pub async fn my_venues(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<VenueResponse>>> {
    let venues = venue::Entity::find()
        .filter(venue::Column::VendorId.eq(claims.sub))
        .order_by_desc(venue::Column::CreatedAt)
        .all(&state.db)
        .await?;

    let today = state.config.local_today();
    Ok(Json(venues.into_iter().map(|v| VenueResponse::new(v, today)).collect()))
}

#[derive(Debug, Deserialize)]
pub struct UpdateVenueRequest {
    pub name: Option<String>,
    pub location_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub price_per_hour: Option<f64>,
    pub opening_time: Option<String>,
    pub closing_time: Option<String>,
    pub venue_type: Option<String>,
}

pub async fn update_venue(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateVenueRequest>,
) -> AppResult<Json<VenueResponse>> {
    let venue = owned_venue(&state, id, claims.sub).await?;

    let latitude = payload.latitude.unwrap_or(venue.latitude);
    let longitude = payload.longitude.unwrap_or(venue.longitude);
    validate_coordinates(latitude, longitude)?;

    let (opening_time, closing_time) = opening_hours(
        payload.opening_time.as_deref().unwrap_or(&venue.opening_time),
        payload.closing_time.as_deref().unwrap_or(&venue.closing_time),
    )?;

    let mut active: venue::ActiveModel = venue.into();

    if let Some(name) = payload.name {
        active.name = Set(require_text("Name", &name, 150)?);
    }

    if let Some(location_name) = payload.location_name {
        active.location_name = Set(require_text("Location name", &location_name, 255)?);
    }

    if let Some(venue_type) = payload.venue_type {
        active.venue_type = Set(require_text("Venue type", &venue_type, 50)?);
    }

    if let Some(price) = payload.price_per_hour {
        validate_price(price)?;
        active.price_per_hour = Set(price);
    }

    active.latitude = Set(latitude);
    active.longitude = Set(longitude);
    active.opening_time = Set(opening_time);
    active.closing_time = Set(closing_time);

    let venue = active.update(&state.db).await?;
    Ok(Json(VenueResponse::new(venue, state.config.local_today())))
}

/// Delete a venue with its bookings and reviews
pub async fn delete_venue(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let venue = owned_venue(&state, id, claims.sub).await?;

    venue::Entity::delete_by_id(venue.id).exec(&state.db).await?;

    if let Some(image) = &venue.image {
        upload::remove_file(&state.config.upload_dir, image).await;
    }

    tracing::info!(venue_id = %venue.id, "Venue deleted");
    Ok(Json(serde_json::json!({ "message": "Venue deleted" })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: VenueStatus,
}

pub async fn update_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> AppResult<Json<VenueResponse>> {
    let venue = owned_venue(&state, id, claims.sub).await?;

    let mut active: venue::ActiveModel = venue.into();
    active.status = Set(payload.status);
    let venue = active.update(&state.db).await?;

    Ok(Json(VenueResponse::new(venue, state.config.local_today())))
}

/// Replace the venue image (multipart field `image`)
pub async fn update_image(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> AppResult<Json<VenueResponse>> {
    let venue = owned_venue(&state, id, claims.sub).await?;

    let form = upload::read_form(&mut multipart, &state.config.upload_dir, "image").await?;
    let image = form
        .image
        .ok_or_else(|| AppError::BadRequest("Missing image file".to_string()))?;

    let previous = venue.image.clone();
    let mut active: venue::ActiveModel = venue.into();
    active.image = Set(Some(image.clone()));
    let venue = match active.update(&state.db).await {
        Ok(v) => v,
        Err(e) => {
            upload::remove_file(&state.config.upload_dir, &image).await;
            return Err(e.into());
        }
    };

    if let Some(old) = previous {
        upload::remove_file(&state.config.upload_dir, &old).await;
    }

    Ok(Json(VenueResponse::new(venue, state.config.local_today())))
}

#[derive(Debug, Deserialize)]
pub struct DiscountRequest {
    pub percentage: f64,
    pub valid_from: NaiveDate,
    pub valid_until: NaiveDate,
}

impl DiscountRequest {
    fn validate(&self) -> AppResult<()> {
        if !(self.percentage > 0.0 && self.percentage <= 100.0) {
            return Err(AppError::BadRequest(
                "Discount percentage must be greater than 0 and at most 100".to_string(),
            ));
        }
        if self.valid_until < self.valid_from {
            return Err(AppError::BadRequest(
                "Discount end date must not be before its start date".to_string(),
            ));
        }
        Ok(())
    }
}

/// Set or replace the venue's single discount
pub async fn set_discount(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DiscountRequest>,
) -> AppResult<Json<VenueResponse>> {
    payload.validate()?;
    let venue = owned_venue(&state, id, claims.sub).await?;

    let mut active: venue::ActiveModel = venue.into();
    active.discount_percentage = Set(Some(payload.percentage));
    active.discount_valid_from = Set(Some(payload.valid_from));
    active.discount_valid_until = Set(Some(payload.valid_until));
    let venue = active.update(&state.db).await?;

    Ok(Json(VenueResponse::new(venue, state.config.local_today())))
}

pub async fn remove_discount(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<VenueResponse>> {
    let venue = owned_venue(&state, id, claims.sub).await?;

    let mut active: venue::ActiveModel = venue.into();
    active.discount_percentage = Set(None);
    active.discount_valid_from = Set(None);
    active.discount_valid_until = Set(None);
    let venue = active.update(&state.db).await?;

    Ok(Json(VenueResponse::new(venue, state.config.local_today())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_opening_hours_normalized() {
        assert_eq!(
            opening_hours("6:00", "21:30").unwrap(),
            ("06:00".to_string(), "21:30".to_string())
        );
        assert!(opening_hours("21:00", "06:00").is_err());
    }

    #[test]
    fn test_discount_request_validation() {
        let ok = DiscountRequest {
            percentage: 15.0,
            valid_from: date("2025-03-01"),
            valid_until: date("2025-03-01"),
        };
        assert!(ok.validate().is_ok());

        let zero = DiscountRequest { percentage: 0.0, ..ok };
        assert!(zero.validate().is_err());

        let reversed = DiscountRequest {
            percentage: 10.0,
            valid_from: date("2025-03-10"),
            valid_until: date("2025-03-01"),
        };
        assert!(reversed.validate().is_err());
    }

    #[test]
    fn test_form_requires_all_fields() {
        let mut form = FormData::default();
        for (k, v) in [
            ("name", "Dhuku Futsal"),
            ("location_name", "Baneshwor, Kathmandu"),
            ("venue_type", "indoor"),
            ("latitude", "27.6915"),
            ("longitude", "85.3420"),
            ("price_per_hour", "1500"),
            ("opening_time", "06:00"),
        ] {
            form.fields.insert(k.to_string(), v.to_string());
        }
        assert!(new_venue_from_form(&form, Uuid::new_v4()).is_err());

        form.fields.insert("closing_time".into(), "21:00".into());
        assert!(new_venue_from_form(&form, Uuid::new_v4()).is_ok());

        form.fields.insert("price_per_hour".into(), "-5".into());
        assert!(new_venue_from_form(&form, Uuid::new_v4()).is_err());
    }
}
