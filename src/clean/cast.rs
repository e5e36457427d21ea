// src/clean/cast.rs

use chrono::NaiveDate;

/// Text → i32, or `None` when the text is not a number.
///
/// Decimal text is truncated toward zero (`"85.7"` → 85), matching a SQL
/// `CAST(.. AS INT)` on a string column. Exponents, `inf` and `NaN` are not
/// numbers here.
pub fn cast_int(raw: &str) -> Option<i32> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(v) = s.parse::<i32>() {
        return Some(v);
    }

    let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
    let mut dots = 0;
    for c in digits.chars() {
        match c {
            '0'..='9' => {}
            '.' => dots += 1,
            _ => return None,
        }
    }
    if dots != 1 || digits == "." {
        return None;
    }

    let truncated = s.parse::<f64>().ok()?.trunc();
    if truncated < i32::MIN as f64 || truncated > i32::MAX as f64 {
        return None;
    }
    Some(truncated as i32)
}

/// Parse `raw` with the chrono `format` (e.g. `%m/%d/%Y`), `None` on failure.
pub fn parse_date(raw: &str, format: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(s, format).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MDY: &str = "%m/%d/%Y";

    #[test]
    fn integers_and_decimals() {
        assert_eq!(cast_int("85"), Some(85));
        assert_eq!(cast_int(" 120 "), Some(120));
        assert_eq!(cast_int("-3"), Some(-3));
        assert_eq!(cast_int("85.7"), Some(85));
        assert_eq!(cast_int("-2.9"), Some(-2));
        assert_eq!(cast_int(".5"), Some(0));
    }

    #[test]
    fn non_numbers_become_none() {
        let samples = [
            "N/A",
            "",
            "   ",
            "Not Available",
            "1e3",
            "inf",
            "NaN",
            ".",
            "1.2.3",
            "99999999999",
        ];
        for s in samples {
            assert_eq!(cast_int(s), None, "{s:?}");
        }
    }

    #[test]
    fn cast_is_idempotent() {
        for s in ["85", "85.7", "-0.2", "N/A", "2147483647"] {
            let once = cast_int(s);
            let twice = once.and_then(|v| cast_int(&v.to_string()));
            assert_eq!(once, twice, "{s:?}");
        }
    }

    #[test]
    fn dates_use_month_day_year() {
        assert_eq!(
            parse_date("01/31/2023", MDY),
            NaiveDate::from_ymd_opt(2023, 1, 31)
        );
        assert_eq!(
            parse_date(" 12/01/2022 ", MDY),
            NaiveDate::from_ymd_opt(2022, 12, 1)
        );
        assert_eq!(parse_date("2023-01-31", MDY), None);
        assert_eq!(parse_date("02/30/2023", MDY), None);
        assert_eq!(parse_date("", MDY), None);
    }

    #[test]
    fn date_parse_is_idempotent() {
        let d = parse_date("07/04/2021", MDY).unwrap();
        let again = parse_date(&d.format(MDY).to_string(), MDY);
        assert_eq!(again, Some(d));
    }
}
