use crate::models::CleanedValue;
use chrono::NaiveDate;
use tracing::warn;

// ── Sentinels ─────────────────────────────────────────────────────────────────

/// Raw placeholders the site prints where a value is absent.
const SENTINELS: &[&str] = &["", "--", "N/A", "NA", "n/a", "—"];

const UNCONFIRMED_PREFIX: &str = "(Unconfirmed) ";

const DATE_FORMATS: &[&str] = &[
    "%m/%d/%Y",
    "%m/%d/%y",
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m-%d-%Y",
    "%d-%b-%Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%b %d %Y",
];

pub fn is_sentinel(s: &str) -> bool {
    SENTINELS.contains(&s.trim())
}

// ── Token cleaner ─────────────────────────────────────────────────────────────

/// Clean one raw token. Never fails: anything unparseable is `Missing`.
///
/// "(1,234.5)" → -1234.5 | "12.3%" → 0.123 | "$5.00" → 5.0 | "3K" → 3000.0
/// "10/28/2021" → date | "--" → Missing
pub fn clean(raw: &str) -> CleanedValue {
    clean_token(raw, false)
}

/// As [`clean`], logging tokens that fail to parse when `show_errors` is set.
pub fn clean_token(raw: &str, show_errors: bool) -> CleanedValue {
    let raw = raw.trim();
    let date_shaped = looks_like_date(raw);

    let mut x = raw.replace(',', "");
    let mut multiple = 1.0;

    if x.len() >= 2 && x.starts_with('(') && x.ends_with(')') {
        x = format!("-{}", &x[1..x.len() - 1]);
    }

    if let Some(rest) = x.strip_suffix('%') {
        x = rest.trim_end().to_string();
        multiple *= 0.01;
    } else if let Some(rest) = x.strip_suffix('x') {
        if rest == "--" {
            return CleanedValue::Missing;
        }
        x = rest.to_string();
    }

    if let Some(rest) = x.strip_suffix(|c: char| c == 'k' || c == 'K') {
        x = rest.to_string();
        multiple *= 1000.0;
    }

    if x.starts_with('$') || x.starts_with("-$") {
        x = x.replacen('$', "", 1);
    } else if date_shaped && x.parse::<f64>().is_err() {
        return match parse_date(raw) {
            Some(d) => CleanedValue::Date(d),
            None => {
                if show_errors {
                    warn!("Unparseable date token {:?}", raw);
                }
                CleanedValue::Missing
            }
        };
    }

    if is_sentinel(&x) {
        return CleanedValue::Missing;
    }

    match x.trim().parse::<f64>() {
        Ok(n) => CleanedValue::number(n * multiple),
        Err(_) => {
            if show_errors {
                warn!("Unparseable token {:?}", raw);
            }
            CleanedValue::Missing
        }
    }
}

/// Parse as a calendar date or return `Missing`.
pub fn clean_date(raw: &str) -> CleanedValue {
    if is_sentinel(raw) {
        return CleanedValue::Missing;
    }
    parse_date(raw).map(CleanedValue::Date).unwrap_or_default()
}

/// Ratings are integers where the site uses a score, words otherwise.
pub fn clean_rating(raw: &str) -> CleanedValue {
    let raw = raw.trim();
    if is_sentinel(raw) {
        return CleanedValue::Missing;
    }
    match raw.parse::<i64>() {
        Ok(n) => CleanedValue::Number(n as f64),
        Err(_) => CleanedValue::Text(raw.to_string()),
    }
}

/// Trimmed text, or `Missing` for a placeholder.
pub fn clean_text(raw: &str) -> CleanedValue {
    let raw = raw.trim();
    if is_sentinel(raw) {
        CleanedValue::Missing
    } else {
        CleanedValue::Text(raw.to_string())
    }
}

/// "10/28/2021", "2021-10-28", "Oct 28, 2021", with an optional
/// "(Unconfirmed) " prefix.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let s = s.strip_prefix(UNCONFIRMED_PREFIX).unwrap_or(s).trim();

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Split on '/', '-' and ", "; date-shaped when there are several parts and
/// the last one is all digits.
fn looks_like_date(s: &str) -> bool {
    let parts: Vec<&str> = s
        .split(['/', '-'])
        .flat_map(|p| p.split(", "))
        .collect();

    parts.len() > 1
        && parts
            .last()
            .map(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
            .unwrap_or(false)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn num(raw: &str) -> f64 {
        clean(raw).as_number().unwrap_or(f64::NAN)
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_decorated_numbers() {
        assert!(close(num("(1,234.5)"), -1234.5));
        assert!(close(num("12.3%"), 0.123));
        assert!(close(num("$5.00"), 5.0));
        assert!(close(num("3K"), 3000.0));
        assert!(close(num("2.5k"), 2500.0));
        assert!(close(num("14.2x"), 14.2));
        assert!(close(num("  1,000,000 "), 1_000_000.0));
    }

    #[test]
    fn test_only_thousands_suffix_scales() {
        assert!(clean("16.4B").is_missing());
        assert!(clean("3M").is_missing());
        assert!(clean("1.5KM").is_missing());
    }

    #[test]
    fn test_signs_and_combinations() {
        assert!(close(num("-$5.25"), -5.25));
        assert!(close(num("($5.25)"), -5.25));
        assert!(close(num("(2.4%)"), -0.024));
        assert!(close(num("-5"), -5.0));
    }

    #[test]
    fn test_placeholders_are_missing() {
        assert!(clean("--").is_missing());
        assert!(clean("--x").is_missing());
        assert!(clean("").is_missing());
        assert!(clean("N/A").is_missing());
        assert!(clean("Outperform").is_missing());
        assert!(clean("$1.10 - $1.40").is_missing());
    }

    #[test]
    fn test_dates() {
        let d = NaiveDate::from_ymd_opt(2021, 10, 28).unwrap();
        assert_eq!(clean("10/28/2021"), CleanedValue::Date(d));
        assert_eq!(clean("(Unconfirmed) 10/28/2021"), CleanedValue::Date(d));
        assert_eq!(clean("Oct 28, 2021"), CleanedValue::Date(d));
        assert_eq!(clean("2021-10-28"), CleanedValue::Date(d));
        assert!(clean("99/99/2021").is_missing());
    }

    #[test]
    fn test_clean_rating() {
        assert_eq!(clean_rating("4"), CleanedValue::Number(4.0));
        assert_eq!(clean_rating("buy"), CleanedValue::Text("buy".into()));
        assert!(clean_rating("--").is_missing());
    }

    #[test]
    fn test_clean_date_rejects_numbers() {
        assert!(clean_date("12.5").is_missing());
        assert!(clean_date("--").is_missing());
    }
}
