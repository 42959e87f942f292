use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, TimeZone, Timelike, Utc};

use crate::model::{Ms, MINUTES_PER_DAY};

pub fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

/// Projects absolute instants into the shop's wall clock and back.
///
/// The business timezone is a fixed UTC offset (no DST). Every weekday,
/// business-hours, and day-off comparison in the engine goes through this
/// type — swapping in a real timezone database only touches this file.
#[derive(Debug, Clone, Copy)]
pub struct BusinessClock {
    offset: FixedOffset,
}

impl BusinessClock {
    /// `offset_minutes` is east-positive, e.g. -300 for UTC-5.
    pub fn from_offset_minutes(offset_minutes: i32) -> Option<Self> {
        FixedOffset::east_opt(offset_minutes * 60).map(|offset| Self { offset })
    }

    fn wall(&self, instant: Ms) -> DateTime<FixedOffset> {
        // Instants are range-checked at the engine boundary (see limits).
        DateTime::<Utc>::from_timestamp_millis(instant)
            .expect("instant within validated range")
            .with_timezone(&self.offset)
    }

    /// Weekday index in business time, 0 = Sunday.
    pub fn weekday_index(&self, instant: Ms) -> u8 {
        self.wall(instant).weekday().num_days_from_sunday() as u8
    }

    /// Minutes from midnight in business time.
    pub fn minute_of_day(&self, instant: Ms) -> u16 {
        let wall = self.wall(instant);
        (wall.hour() * 60 + wall.minute()) as u16
    }

    /// The calendar day the instant falls on, in business time.
    pub fn business_date(&self, instant: Ms) -> NaiveDate {
        self.wall(instant).date_naive()
    }

    pub fn date_str(&self, instant: Ms) -> String {
        self.business_date(instant).format("%Y-%m-%d").to_string()
    }

    /// Absolute instant for a business-timezone wall-clock minute of `date`.
    pub fn instant(&self, date: NaiveDate, minute: u16) -> Ms {
        let naive = date
            .and_hms_opt(u32::from(minute / 60), u32::from(minute % 60), 0)
            .expect("minute of day below 1440");
        self.offset
            .from_local_datetime(&naive)
            .single()
            .expect("fixed offset is unambiguous")
            .timestamp_millis()
    }

    /// Midnight of `date` in business time, as an absolute instant.
    pub fn day_start(&self, date: NaiveDate) -> Ms {
        self.instant(date, 0)
    }
}

/// Weekday index of a business-calendar date, 0 = Sunday.
pub fn weekday_of_date(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// Parse "HH:MM" into minutes from midnight. Rejects out-of-range values.
pub fn parse_hhmm(s: &str) -> Option<u16> {
    let (h, m) = s.split_once(':')?;
    let h: u16 = h.parse().ok()?;
    let m: u16 = m.parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}

/// Format minutes from midnight as "HH:MM". `MINUTES_PER_DAY` renders as "24:00"
/// (exclusive end of an all-day range).
pub fn format_hhmm(minute: u16) -> String {
    debug_assert!(minute <= MINUTES_PER_DAY);
    format!("{:02}:{:02}", minute / 60, minute % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bogota() -> BusinessClock {
        BusinessClock::from_offset_minutes(-300).unwrap()
    }

    #[test]
    fn instant_roundtrip() {
        let clock = bogota();
        let date = NaiveDate::from_ymd_opt(2026, 2, 15).unwrap();
        let t = clock.instant(date, 9 * 60 + 30);
        assert_eq!(clock.business_date(t), date);
        assert_eq!(clock.minute_of_day(t), 9 * 60 + 30);
    }

    #[test]
    fn weekday_is_business_local_not_utc() {
        let clock = bogota();
        // 2026-02-15 is a Sunday. 23:30 Bogota is already 04:30 Monday UTC.
        let date = NaiveDate::from_ymd_opt(2026, 2, 15).unwrap();
        let t = clock.instant(date, 23 * 60 + 30);
        assert_eq!(clock.weekday_index(t), 0);
        assert_eq!(clock.date_str(t), "2026-02-15");
    }

    #[test]
    fn day_start_is_midnight() {
        let clock = bogota();
        let date = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
        let t = clock.day_start(date);
        assert_eq!(clock.minute_of_day(t), 0);
        assert_eq!(clock.business_date(t), date);
    }

    #[test]
    fn positive_offset() {
        let clock = BusinessClock::from_offset_minutes(120).unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 2, 16).unwrap();
        // 00:30 local at UTC+2 is 22:30 the previous day in UTC.
        let t = clock.instant(date, 30);
        assert_eq!(clock.business_date(t), date);
        assert_eq!(clock.minute_of_day(t), 30);
    }

    #[test]
    fn invalid_offset_rejected() {
        assert!(BusinessClock::from_offset_minutes(24 * 60).is_none());
    }

    #[test]
    fn parse_hhmm_bounds() {
        assert_eq!(parse_hhmm("09:00"), Some(540));
        assert_eq!(parse_hhmm("23:59"), Some(1439));
        assert_eq!(parse_hhmm("24:00"), None);
        assert_eq!(parse_hhmm("09:60"), None);
        assert_eq!(parse_hhmm("0900"), None);
        assert_eq!(parse_hhmm(""), None);
    }

    #[test]
    fn format_hhmm_pads() {
        assert_eq!(format_hhmm(540), "09:00");
        assert_eq!(format_hhmm(1110), "18:30");
        assert_eq!(format_hhmm(0), "00:00");
    }

    #[test]
    fn weekday_of_date_sunday_zero() {
        let sunday = NaiveDate::from_ymd_opt(2026, 2, 15).unwrap();
        let monday = NaiveDate::from_ymd_opt(2026, 2, 16).unwrap();
        assert_eq!(weekday_of_date(sunday), 0);
        assert_eq!(weekday_of_date(monday), 1);
    }
}
