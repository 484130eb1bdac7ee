//! Weekly expiry calendar used when the engine offers no expiry lists

use chrono::{Datelike, Duration, NaiveDate};

pub const EXPIRY_WEEKS: i64 = 35;
pub const EXPIRY_FORMAT: &str = "%d%b%Y";

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 9, 1).unwrap_or(NaiveDate::MIN)
}

/// Thursday on or after `date`
pub fn next_thursday(date: NaiveDate) -> NaiveDate {
    let weekday = date.weekday().num_days_from_monday() as i64;
    let days_until = (3 - weekday).rem_euclid(7);
    date + Duration::days(days_until)
}

/// Weekly Thursday expiries, formatted like `07Sep2023`
pub fn weekly_expiries() -> Vec<String> {
    let base = base_date();
    (0..EXPIRY_WEEKS)
        .map(|week| next_thursday(base + Duration::weeks(week)))
        .map(|date| date.format(EXPIRY_FORMAT).to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    #[test]
    fn test_calendar_shape() {
        let expiries = weekly_expiries();
        assert_eq!(expiries.len(), 35);
        assert_eq!(expiries[0], "07Sep2023");
        assert_eq!(expiries[1], "14Sep2023");
        assert!(expiries.contains(&"30Nov2023".to_string()));
    }

    #[test]
    fn test_all_thursdays() {
        for expiry in weekly_expiries() {
            let date = NaiveDate::parse_from_str(&expiry, EXPIRY_FORMAT).unwrap();
            assert_eq!(date.weekday(), Weekday::Thu);
        }
    }

    #[test]
    fn test_thursday_maps_to_itself() {
        let thursday = NaiveDate::from_ymd_opt(2023, 11, 30).unwrap();
        assert_eq!(next_thursday(thursday), thursday);
        let friday = NaiveDate::from_ymd_opt(2023, 12, 1).unwrap();
        assert_eq!(
            next_thursday(friday),
            NaiveDate::from_ymd_opt(2023, 12, 7).unwrap()
        );
    }
}
