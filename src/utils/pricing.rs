use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::utils::slot::TimeSlot;

/// A single percentage discount valid on `[valid_from, valid_until]`, both inclusive
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Discount {
    pub percentage: f64,
    pub valid_from: NaiveDate,
    pub valid_until: NaiveDate,
}

impl Discount {
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.valid_from <= date && date <= self.valid_until
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Hourly rate after applying the discount, if it is active on `date`
pub fn effective_hourly_rate(price_per_hour: f64, discount: Option<&Discount>, date: NaiveDate) -> f64 {
    match discount {
        Some(d) if d.is_active_on(date) => round2(price_per_hour * (1.0 - d.percentage / 100.0)),
        _ => price_per_hour,
    }
}

/// Total price for booking `slot` on `date`
pub fn booking_total(
    price_per_hour: f64,
    slot: &TimeSlot,
    discount: Option<&Discount>,
    date: NaiveDate,
) -> f64 {
    let hours = slot.minutes() as f64 / 60.0;
    let base = hours * price_per_hour;

    match discount {
        Some(d) if d.is_active_on(date) => round2(base * (1.0 - d.percentage / 100.0)),
        _ => round2(base),
    }
}
