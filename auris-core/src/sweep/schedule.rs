use std::str::FromStr;

use cron::Schedule;

use crate::error::{IngestError, Result};

/// Parse a standard five-field crontab expression.
///
/// The `cron` crate wants a seconds field and numbers Sunday as 1, so
/// five-field expressions are rewritten: a zero seconds field is
/// prepended and numeric day-of-week values shift from 0-6 (0 = Sunday)
/// to 1-7.
pub fn parse_crontab(expression: &str) -> Result<Schedule> {
    let fields: Vec<&str> = expression.split_whitespace().collect();

    let normalised = if fields.len() == 5 {
        let dow = shift_day_of_week(fields[4]);
        format!(
            "0 {} {} {} {} {}",
            fields[0], fields[1], fields[2], fields[3], dow
        )
    } else {
        expression.to_string()
    };

    Schedule::from_str(&normalised).map_err(|err| {
        IngestError::Internal(format!("invalid cron expression '{expression}': {err}"))
    })
}

fn shift_day_of_week(field: &str) -> String {
    // Step suffixes (`*/2`) keep their step value untouched.
    if let Some((range, step)) = field.split_once('/') {
        return format!("{}/{}", shift_day_of_week(range), step);
    }

    let mut result = String::new();
    let mut digits = String::new();

    let mut flush = |digits: &mut String, result: &mut String| {
        if digits.is_empty() {
            return;
        }
        match digits.parse::<u8>() {
            // crontab: 0 and 7 are both Sunday; the cron crate wants 1.
            Ok(n) if n <= 6 => result.push_str(&(n + 1).to_string()),
            Ok(7) => result.push('1'),
            _ => result.push_str(digits),
        }
        digits.clear();
    };

    for c in field.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else {
            flush(&mut digits, &mut result);
            result.push(c);
        }
    }
    flush(&mut digits, &mut result);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike, Utc, Weekday};

    #[test]
    fn test_weekly_sunday_midnight() {
        let schedule = parse_crontab("0 0 * * 0").unwrap();
        let next = schedule.upcoming(Utc).next().unwrap();
        assert_eq!(next.weekday(), Weekday::Sun);
        assert_eq!(next.hour(), 0);
        assert_eq!(next.minute(), 0);
    }

    #[test]
    fn test_weekly_sunday_one_am() {
        let schedule = parse_crontab("0 1 * * 0").unwrap();
        let next = schedule.upcoming(Utc).next().unwrap();
        assert_eq!(next.weekday(), Weekday::Sun);
        assert_eq!(next.hour(), 1);
    }

    #[test]
    fn test_day_of_week_ranges_shift() {
        assert_eq!(shift_day_of_week("0"), "1");
        assert_eq!(shift_day_of_week("7"), "1");
        assert_eq!(shift_day_of_week("1-5"), "2-6");
        assert_eq!(shift_day_of_week("0,3"), "1,4");
        assert_eq!(shift_day_of_week("*"), "*");
    }

    #[test]
    fn test_six_field_expressions_pass_through() {
        assert!(parse_crontab("0 30 2 * * Mon").is_ok());
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(parse_crontab("not a schedule").is_err());
    }
}
