use super::parse_year;
use crate::metrics::{self, CONSENSUS_RAW, EARNINGS_RESULT, ESTIMATE_RANGE};
use crate::models::{CleanedValue, RawEarnings, Section, SectionTable, YearlySeries};
use crate::normalize::{clean, fields};
use tracing::debug;

pub const NEXT_ANNOUNCEMENT: &str = "Next Earnings Announcement";
pub const GROWTH_ANALYSTS: &str = "Growth Analysts";
const NEUTRAL: &str = "Neutral";

#[derive(Debug, Clone, PartialEq)]
pub struct EarningsTables {
    pub summary: SectionTable,
    pub yearly: YearlySeries,
}

impl EarningsTables {
    pub fn placeholder() -> Self {
        Self {
            summary: SectionTable::placeholder(Section::Earnings),
            yearly: YearlySeries::new(),
        }
    }
}

pub fn assemble_earnings(raw: &RawEarnings) -> EarningsTables {
    let mut summary = SectionTable::new(Section::Earnings);

    let (name, value) = fields::normalize(
        Section::Earnings,
        NEXT_ANNOUNCEMENT,
        raw.next_announcement.as_deref().unwrap_or(""),
    );
    summary.values.insert(name, value);
    summary.values.insert(
        GROWTH_ANALYSTS,
        CleanedValue::from_option(raw.analyst_label.as_deref().and_then(analyst_count)),
    );

    let mut yearly = YearlySeries::new();
    for tooltip in &raw.tooltips {
        read_tooltip(&mut yearly, tooltip);
    }

    let windows = metrics::derive_earnings(&mut yearly);
    for (name, value) in windows.iter() {
        summary.values.insert(name, value.clone());
    }

    EarningsTables { summary, yearly }
}

/// The analyst label reads like "Based on 12 analysts"; the count is its only
/// numeric word.
fn analyst_count(label: &str) -> Option<f64> {
    label.split_whitespace().find_map(|w| w.parse::<f64>().ok())
}

/// A range or consensus label whose value was split into the next segment.
fn is_bare_label(segment: &str) -> bool {
    let t = segment.trim();
    let label = t.strip_suffix(':').unwrap_or(t);
    if label.contains(':') {
        return false;
    }
    let lower = label.to_ascii_lowercase();
    lower.ends_with("range") || lower == CONSENSUS_RAW.to_ascii_lowercase()
}

fn merge_bare_labels(segments: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(segments.len());
    let mut iter = segments.iter().map(|s| s.trim()).filter(|s| !s.is_empty());
    while let Some(seg) = iter.next() {
        if is_bare_label(seg) {
            if let Some(value) = iter.next() {
                out.push(format!("{}: {}", seg.trim_end_matches(':'), value));
                continue;
            }
        }
        out.push(seg.to_string());
    }
    out
}

fn canonical_key(key: &str) -> String {
    let key = key.trim().trim_matches('"').trim().trim_end_matches(':').trim();
    let lower = key.to_ascii_lowercase();
    if lower.contains("range") {
        ESTIMATE_RANGE.to_string()
    } else if lower == CONSENSUS_RAW.to_ascii_lowercase() {
        CONSENSUS_RAW.to_string()
    } else {
        key.to_string()
    }
}

/// One chart bar. Surprise shape: year, result, key, value, "range: text".
/// Plain shape: year, key, value, "range: text".
fn read_tooltip(yearly: &mut YearlySeries, segments: &[String]) {
    let segs = merge_bare_labels(segments);
    let (year, result, key, value, range) = match segs.as_slice() {
        [year, result, key, value, range, ..] => (year, result.as_str(), key, value, range),
        [year, key, value, range] => (year, NEUTRAL, key, value, range),
        _ => {
            debug!("earnings: unrecognised tooltip {:?}", segments);
            return;
        }
    };
    let Some(year) = parse_year(year) else {
        debug!("earnings: tooltip without a year {:?}", segments);
        return;
    };

    let row = yearly.row_mut(year);
    row.set(EARNINGS_RESULT, CleanedValue::Text(result.trim().to_string()));
    row.set(canonical_key(key), clean(value));
    if let Some((range_key, range_text)) = range.split_once(':') {
        let range_text = range_text.trim();
        let cell = if range_text.is_empty() {
            CleanedValue::Missing
        } else {
            CleanedValue::Text(range_text.to_string())
        };
        row.set(canonical_key(range_key), cell);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{ACTUAL, CONSENSUS_ESTIMATE, ESTIMATE, GROWTH, LOW_ESTIMATE};

    fn segs(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    fn approx(v: &CleanedValue, expected: f64) -> bool {
        v.as_number().map(|x| (x - expected).abs() < 1e-9).unwrap_or(false)
    }

    #[test]
    fn test_surprise_and_plain_tooltips() {
        let raw = RawEarnings {
            next_announcement: Some("01/27/2022".into()),
            analyst_label: Some("Based on 12 analysts".into()),
            tooltips: vec![
                segs(&["2020", "Beat", "Actual:", "$1.00", "Estimate range: $0.90 - $1.10"]),
                segs(&["2021", "Missed", "\"Actual:\"", "$1.20", "Estimate range: $1.25 - $1.35"]),
                segs(&["2022", "Estimate:", "$1.35", "Estimate range:", "$1.30 - $1.40"]),
            ],
        };
        let t = assemble_earnings(&raw);

        assert!(t.summary.values.value(NEXT_ANNOUNCEMENT).as_date().is_some());
        assert_eq!(t.summary.values.value(GROWTH_ANALYSTS), CleanedValue::Number(12.0));

        let y = &t.yearly;
        assert_eq!(y.years(), vec![2020, 2021, 2022]);
        assert_eq!(
            y.column(EARNINGS_RESULT),
            vec![
                CleanedValue::Text("Beat".into()),
                CleanedValue::Text("Missed".into()),
                CleanedValue::Text("Neutral".into()),
            ]
        );
        assert!(approx(&y.column(ACTUAL)[1], 1.2));
        assert!(approx(&y.column(ESTIMATE)[2], 1.35));
        assert!(approx(&y.column(LOW_ESTIMATE)[2], 1.30));
        assert!(approx(&y.column(CONSENSUS_ESTIMATE)[2], 1.35));
        assert!(y.column(GROWTH)[0].is_missing());
        assert!(approx(&y.column(GROWTH)[1], 0.2));
        assert!(!y.has_field(ESTIMATE_RANGE));
        assert!(t.summary.values.contains("Growth 5yr Consensus Est"));
    }

    #[test]
    fn test_consensus_fills_missing_range() {
        let raw = RawEarnings {
            tooltips: vec![segs(&["2023", "Estimate:", "--", "Consensus estimate: $2.10"])],
            ..Default::default()
        };
        let t = assemble_earnings(&raw);
        assert!(approx(&t.yearly.column(CONSENSUS_ESTIMATE)[0], 2.10));
        assert!(t.summary.values.value(NEXT_ANNOUNCEMENT).is_missing());
        assert!(t.summary.values.value(GROWTH_ANALYSTS).is_missing());
    }

    #[test]
    fn test_malformed_tooltip_is_skipped() {
        let raw = RawEarnings {
            tooltips: vec![segs(&["2020", "Actual:"])],
            ..Default::default()
        };
        assert!(assemble_earnings(&raw).yearly.is_empty());
    }
}
