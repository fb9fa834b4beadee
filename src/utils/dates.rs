use crate::error::{ApiError, ApiResult};
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};

/// Parses a day into midnight UTC. Accepts `2024-01-31`, `2024/01/31` and
/// RFC 3339 timestamps (whose time of day is dropped).
pub fn parse_day(raw: &str) -> ApiResult<DateTime<Utc>> {
    let raw = raw.trim();
    let day = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y/%m/%d"))
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.with_timezone(&Utc).date_naive())
        })
        .ok_or_else(|| ApiError::bad_request(format!("Invalid date: {raw}")))?;
    Ok(midnight(day))
}

pub fn midnight(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}

pub fn current_year() -> i32 {
    Utc::now().year()
}

/// Inclusive date window of a listing: explicit bounds win, otherwise the
/// whole calendar year.
pub fn date_range(
    year: i32,
    start_date: Option<&str>,
    end_date: Option<&str>,
) -> ApiResult<(DateTime<Utc>, DateTime<Utc>)> {
    let year_start = NaiveDate::from_ymd_opt(year, 1, 1)
        .ok_or_else(|| ApiError::bad_request(format!("Invalid year: {year}")))?;
    let year_end = NaiveDate::from_ymd_opt(year, 12, 31)
        .ok_or_else(|| ApiError::bad_request(format!("Invalid year: {year}")))?;

    let start = match start_date {
        Some(raw) => parse_day(raw)?,
        None => midnight(year_start),
    };
    let end = match end_date {
        Some(raw) => parse_day(raw)?,
        None => midnight(year_end),
    };
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("2024-01-01")]
    #[case("2024/01/01")]
    #[case("2024-01-01T15:30:00Z")]
    #[case(" 2024-01-01 ")]
    fn days_normalise_to_midnight_utc(#[case] raw: &str) {
        assert_eq!(
            parse_day(raw).unwrap().to_rfc3339(),
            "2024-01-01T00:00:00+00:00"
        );
    }

    #[test]
    fn garbage_is_a_bad_request() {
        assert!(matches!(parse_day("next tuesday"), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn range_defaults_to_calendar_year() {
        let (start, end) = date_range(2023, None, None).unwrap();
        assert_eq!(start.to_rfc3339(), "2023-01-01T00:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2023-12-31T00:00:00+00:00");
    }

    #[test]
    fn explicit_bounds_override_year() {
        let (start, end) = date_range(2023, Some("2024-04-01"), Some("2024-04-30")).unwrap();
        assert_eq!(start.to_rfc3339(), "2024-04-01T00:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2024-04-30T00:00:00+00:00");
    }
}
