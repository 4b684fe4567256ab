use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::{Datelike, NaiveDate};
use sea_orm::{
    sea_query::Expr, ColumnTrait, EntityTrait, FromQueryResult, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, RelationTrait,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::booking::{self, BookingStatus};
use crate::entities::payment::PaymentStatus;
use crate::entities::{user, venue};
use crate::error::{AppError, AppResult};
use crate::handlers::booking::BookingResponse;
use crate::utils::jwt::Claims;
use crate::utils::pricing::round2;
use crate::AppState;

const MONTH_OF_DATE: &str = r#"CAST(EXTRACT(MONTH FROM "booking"."date") AS INTEGER)"#;
const PAID_REVENUE: &str =
    r#"SUM(CASE WHEN "booking"."payment_status" = 'paid' THEN "booking"."total_price" ELSE 0 END)"#;

/// Bookings on venues owned by `vendor_id`
fn vendor_bookings(vendor_id: Uuid) -> sea_orm::Select<booking::Entity> {
    booking::Entity::find()
        .join(sea_orm::JoinType::InnerJoin, booking::Relation::Venue.def())
        .filter(venue::Column::VendorId.eq(vendor_id))
}

#[derive(Debug, Default, Serialize)]
pub struct StatusBreakdown {
    pub pending: i64,
    pub confirmed: i64,
    pub cancelled: i64,
    pub completed: i64,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub total_venues: u64,
    pub total_bookings: i64,
    pub bookings_by_status: StatusBreakdown,
    pub total_revenue: f64,
    pub avg_rating: f64,
    pub total_reviews: i64,
}

#[derive(Debug, FromQueryResult)]
struct StatusCount {
    status: BookingStatus,
    count: i64,
}

/// Weighted by review count so venues without reviews do not drag the mean down
fn overall_rating(venues: &[venue::Model]) -> (f64, i64) {
    let reviews: i64 = venues.iter().map(|v| v.review_count as i64).sum();
    if reviews == 0 {
        return (0.0, 0);
    }
    let weighted: f64 = venues
        .iter()
        .map(|v| v.avg_rating * v.review_count as f64)
        .sum();
    (((weighted / reviews as f64) * 10.0).round() / 10.0, reviews)
}

pub async fn summary(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<SummaryResponse>> {
    let venues = venue::Entity::find()
        .filter(venue::Column::VendorId.eq(claims.sub))
        .all(&state.db)
        .await?;
    let total_venues = venue::Entity::find()
        .filter(venue::Column::VendorId.eq(claims.sub))
        .count(&state.db)
        .await?;

    let counts = vendor_bookings(claims.sub)
        .select_only()
        .column(booking::Column::Status)
        .column_as(booking::Column::Id.count(), "count")
        .group_by(booking::Column::Status)
        .into_model::<StatusCount>()
        .all(&state.db)
        .await?;

    let mut breakdown = StatusBreakdown::default();
    for row in &counts {
        match row.status {
            BookingStatus::Pending => breakdown.pending = row.count,
            BookingStatus::Confirmed => breakdown.confirmed = row.count,
            BookingStatus::Cancelled => breakdown.cancelled = row.count,
            BookingStatus::Completed => breakdown.completed = row.count,
        }
    }

    let revenue: Option<Option<f64>> = vendor_bookings(claims.sub)
        .filter(booking::Column::PaymentStatus.eq(PaymentStatus::Paid))
        .select_only()
        .column_as(booking::Column::TotalPrice.sum(), "revenue")
        .into_tuple()
        .one(&state.db)
        .await?;

    let (avg_rating, total_reviews) = overall_rating(&venues);

    Ok(Json(SummaryResponse {
        total_venues,
        total_bookings: counts.iter().map(|c| c.count).sum(),
        bookings_by_status: breakdown,
        total_revenue: round2(revenue.flatten().unwrap_or(0.0)),
        avg_rating,
        total_reviews,
    }))
}

#[derive(Debug, Deserialize)]
pub struct MonthlyQuery {
    pub year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromQueryResult)]
pub struct MonthlyRevenue {
    pub month: i32,
    pub revenue: Option<f64>,
    pub bookings: i64,
}

/// Twelve entries, months without paid bookings filled with zeroes
pub fn fill_months(rows: Vec<MonthlyRevenue>) -> Vec<MonthlyRevenue> {
    (1..=12)
        .map(|month| {
            rows.iter()
                .find(|r| r.month == month)
                .map(|r| MonthlyRevenue {
                    month,
                    revenue: Some(round2(r.revenue.unwrap_or(0.0))),
                    bookings: r.bookings,
                })
                .unwrap_or(MonthlyRevenue {
                    month,
                    revenue: Some(0.0),
                    bookings: 0,
                })
        })
        .collect()
}

/// `[Jan 1 of year, Jan 1 of year + 1)`
fn year_bounds(year: i32) -> AppResult<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, 1, 1);
    let end = year
        .checked_add(1)
        .and_then(|next| NaiveDate::from_ymd_opt(next, 1, 1));

    match (start, end) {
        (Some(start), Some(end)) => Ok((start, end)),
        _ => Err(AppError::BadRequest("Invalid year".to_string())),
    }
}

/// Paid revenue per month of `year` (default current year)
pub async fn monthly_revenue(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<MonthlyQuery>,
) -> AppResult<Json<Vec<MonthlyRevenue>>> {
    let year = query.year.unwrap_or_else(|| state.config.local_today().year());
    let (start, end) = year_bounds(year)?;

    let rows = vendor_bookings(claims.sub)
        .filter(booking::Column::PaymentStatus.eq(PaymentStatus::Paid))
        .filter(booking::Column::Date.gte(start))
        .filter(booking::Column::Date.lt(end))
        .select_only()
        .column_as(Expr::cust(MONTH_OF_DATE), "month")
        .column_as(booking::Column::TotalPrice.sum(), "revenue")
        .column_as(booking::Column::Id.count(), "bookings")
        .group_by(Expr::cust(MONTH_OF_DATE))
        .into_model::<MonthlyRevenue>()
        .all(&state.db)
        .await?;

    Ok(Json(fill_months(rows)))
}

#[derive(Debug, FromQueryResult)]
struct VenueAggregate {
    venue_id: Uuid,
    bookings: i64,
    revenue: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct VenuePerformance {
    pub venue_id: Uuid,
    pub name: String,
    pub bookings: i64,
    pub revenue: f64,
    pub avg_rating: f64,
    pub review_count: i32,
}

/// Bookings (excluding cancelled) and paid revenue per venue, highest revenue first
pub async fn venue_performance(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<VenuePerformance>>> {
    let venues = venue::Entity::find()
        .filter(venue::Column::VendorId.eq(claims.sub))
        .all(&state.db)
        .await?;

    let aggregates = vendor_bookings(claims.sub)
        .filter(booking::Column::Status.ne(BookingStatus::Cancelled))
        .select_only()
        .column(booking::Column::VenueId)
        .column_as(booking::Column::Id.count(), "bookings")
        .column_as(Expr::cust(PAID_REVENUE), "revenue")
        .group_by(booking::Column::VenueId)
        .into_model::<VenueAggregate>()
        .all(&state.db)
        .await?;

    let mut performance: Vec<VenuePerformance> = venues
        .into_iter()
        .map(|v| {
            let agg = aggregates.iter().find(|a| a.venue_id == v.id);
            VenuePerformance {
                venue_id: v.id,
                name: v.name,
                bookings: agg.map(|a| a.bookings).unwrap_or(0),
                revenue: round2(agg.and_then(|a| a.revenue).unwrap_or(0.0)),
                avg_rating: v.avg_rating,
                review_count: v.review_count,
            }
        })
        .collect();

    performance.sort_by(|a, b| b.revenue.total_cmp(&a.revenue));
    Ok(Json(performance))
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<u64>,
}

/// Latest bookings across the vendor's venues
pub async fn recent_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<RecentQuery>,
) -> AppResult<Json<Vec<BookingResponse>>> {
    let limit = query.limit.unwrap_or(5).clamp(1, 50);

    let venues = venue::Entity::find()
        .filter(venue::Column::VendorId.eq(claims.sub))
        .all(&state.db)
        .await?;

    let rows = vendor_bookings(claims.sub)
        .order_by_desc(booking::Column::CreatedAt)
        .limit(limit)
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
