use chrono::TimeDelta;
use regex::Regex;

const INVALID_TIME_WINDOW: &str =
    "time window must be a sequence of <number><unit> with unit d, h, m or s. e.g. 1d, 12h, 1d6h";
const ZERO_TIME_WINDOW: &str = "time window must be greater than zero";

const TIME_WINDOW_PATTERN: &str = r"^(\s*\d+\s*[dhms])+\s*$";
const TIME_WINDOW_COMPONENT_PATTERN: &str = r"(\d+)\s*([dhms])";

pub fn parse_time_window(value: &str) -> Result<TimeDelta, String> {
    let whole = Regex::new(TIME_WINDOW_PATTERN).map_err(|e| e.to_string())?;
    if !whole.is_match(value) {
        return Err(INVALID_TIME_WINDOW.to_string());
    }

    let component = Regex::new(TIME_WINDOW_COMPONENT_PATTERN).map_err(|e| e.to_string())?;
    let mut total = TimeDelta::zero();
    for captures in component.captures_iter(value) {
        let amount: i64 = captures[1]
            .parse()
            .map_err(|_| INVALID_TIME_WINDOW.to_string())?;
        let delta = match &captures[2] {
            "d" => TimeDelta::try_days(amount),
            "h" => TimeDelta::try_hours(amount),
            "m" => TimeDelta::try_minutes(amount),
            _ => TimeDelta::try_seconds(amount),
        }
        .ok_or_else(|| INVALID_TIME_WINDOW.to_string())?;

        total = total
            .checked_add(&delta)
            .ok_or_else(|| INVALID_TIME_WINDOW.to_string())?;
    }

    if total.is_zero() {
        return Err(ZERO_TIME_WINDOW.to_string());
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_time_window() {
        init_dummy_tracing_subscriber();

        assert_eq!(parse_time_window("1d").unwrap(), TimeDelta::days(1));
        assert_eq!(parse_time_window("12h").unwrap(), TimeDelta::hours(12));
        assert_eq!(parse_time_window("30m").unwrap(), TimeDelta::minutes(30));
        assert_eq!(parse_time_window("45s").unwrap(), TimeDelta::seconds(45));
        assert_eq!(
            parse_time_window("1d6h").unwrap(),
            TimeDelta::days(1) + TimeDelta::hours(6)
        );
        assert_eq!(
            parse_time_window("1d 6h 30m").unwrap(),
            TimeDelta::days(1) + TimeDelta::hours(6) + TimeDelta::minutes(30)
        );
    }

    #[test]
    fn parse_invalid_time_window() {
        init_dummy_tracing_subscriber();

        assert_eq!(parse_time_window("1y").unwrap_err(), INVALID_TIME_WINDOW);
        assert_eq!(parse_time_window("").unwrap_err(), INVALID_TIME_WINDOW);
        assert_eq!(parse_time_window("d").unwrap_err(), INVALID_TIME_WINDOW);
        assert_eq!(parse_time_window("1d x").unwrap_err(), INVALID_TIME_WINDOW);
        assert_eq!(parse_time_window("-1d").unwrap_err(), INVALID_TIME_WINDOW);
        assert_eq!(
            parse_time_window("99999999999999999999d").unwrap_err(),
            INVALID_TIME_WINDOW
        );
        assert_eq!(parse_time_window("0h").unwrap_err(), ZERO_TIME_WINDOW);
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}
