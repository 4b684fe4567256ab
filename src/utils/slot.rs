use chrono::NaiveTime;

use crate::error::{AppError, AppResult};

/// Parse `HH:MM` (or `H:MM`) into a time of day
pub fn parse_time(value: &str) -> AppResult<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| AppError::BadRequest(format!("Invalid time '{}', expected HH:MM", value)))
}

/// Zero-padded `HH:MM`, the stored form; lexicographic order matches time order
pub fn format_time(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

/// Half-open interval `[start, end)` within a single day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSlot {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeSlot {
    pub fn parse(start: &str, end: &str) -> AppResult<Self> {
        let start = parse_time(start)?;
        let end = parse_time(end)?;

        if end <= start {
            return Err(AppError::BadRequest(
                "End time must be after start time".to_string(),
            ));
        }

        Ok(Self { start, end })
    }

    pub fn minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn within(&self, opening: &TimeSlot) -> bool {
        self.start >= opening.start && self.end <= opening.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(start: &str, end: &str) -> TimeSlot {
        TimeSlot::parse(start, end).unwrap()
    }

    #[test]
    fn test_parse_and_normalize() {
        let t = parse_time("7:05").unwrap();
        assert_eq!(format_time(t), "07:05");
        assert!(parse_time("25:00").is_err());
        assert!(parse_time("noon").is_err());
    }

    #[test]
    fn test_end_must_follow_start() {
        assert!(TimeSlot::parse("10:00", "10:00").is_err());
        assert!(TimeSlot::parse("11:00", "10:00").is_err());
        assert_eq!(slot("10:00", "11:30").minutes(), 90);
    }

    #[test]
    fn test_overlap_is_half_open() {
        let a = slot("10:00", "11:00");
        assert!(a.overlaps(&slot("10:30", "11:30")));
        assert!(a.overlaps(&slot("09:00", "12:00")));
        assert!(!a.overlaps(&slot("11:00", "12:00")));
        assert!(!a.overlaps(&slot("08:00", "10:00")));
    }

    #[test]
    fn test_within_opening_hours() {
        let hours = slot("06:00", "21:00");
        assert!(slot("06:00", "07:00").within(&hours));
        assert!(slot("20:00", "21:00").within(&hours));
        assert!(!slot("05:30", "06:30").within(&hours));
        assert!(!slot("20:30", "21:30").within(&hours));
    }

    #[test]
    fn test_stored_form_orders_like_time() {
        // Booking conflicts are found by comparing stored strings in SQL
        let times: Vec<NaiveTime> = ["0:00", "6:30", "9:05", "09:30", "10:00", "13:15", "23:59"]
            .iter()
            .map(|t| parse_time(t).unwrap())
            .collect();

        for a in &times {
            for b in &times {
                assert_eq!(format_time(*a).cmp(&format_time(*b)), a.cmp(b));
            }
        }
    }
}
