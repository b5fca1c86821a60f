//! Cross-field derived values: growth rates, estimate reconciliation,
//! multi-year windows, free cash flow.
//!
//! `Missing` never takes part in arithmetic. A binary operation with a
//! missing operand is `Missing`; means skip missing entries and are
//! `Missing` only when nothing is left.

use crate::models::{CleanedValue, FieldRecord, YearlySeries};
use crate::normalize::clean;
use tracing::debug;

// ── Earnings column names ─────────────────────────────────────────────────────

pub const ACTUAL: &str = "Actual";
pub const ESTIMATE: &str = "Estimate";
pub const ESTIMATE_RANGE: &str = "Estimate range";
pub const CONSENSUS_RAW: &str = "Consensus estimate";
pub const EARNINGS_RESULT: &str = "Earnings Result";
pub const GROWTH: &str = "Growth";
pub const LOW_ESTIMATE: &str = "Low Estimate";
pub const HIGH_ESTIMATE: &str = "High Estimate";
pub const LOW_GROWTH: &str = "Low Growth Est";
pub const HIGH_GROWTH: &str = "High Growth Est";
pub const CONSENSUS_ESTIMATE: &str = "Consensus Estimate";
pub const CONSENSUS_GROWTH: &str = "Consensus Growth Est";
pub const ACTUAL_ESTIMATE: &str = "Actual/Estimate";
pub const AE_GROWTH: &str = "A/E Growth";

// ── Fundamentals column names ─────────────────────────────────────────────────

pub const OPERATING_CASH: &str = "Total Cash from Operations";
pub const CAPEX: &str = "Capital Expenditures";
pub const FREE_CASH_FLOW: &str = "Free Cash Flow";
pub const FCF_GROWTH: &str = "FCF Growth";
pub const FCF_GROWTH_5YR: &str = "FCF Growth 5yr";

/// Five-year growth figures the site prints in percentage points.
pub const HISTORIC_GROWTH_FIELDS: [&str; 3] =
    ["EPS Growth 5yr", "Revenue Growth 5yr", "Dividend Growth 5yr"];

// ── Primitives ────────────────────────────────────────────────────────────────

pub fn add(a: &CleanedValue, b: &CleanedValue) -> CleanedValue {
    match (a.as_number(), b.as_number()) {
        (Some(a), Some(b)) => CleanedValue::number(a + b),
        _ => CleanedValue::Missing,
    }
}

/// `a / b`; a zero divisor gives `Missing`.
pub fn ratio(a: &CleanedValue, b: &CleanedValue) -> CleanedValue {
    match (a.as_number(), b.as_number()) {
        (Some(a), Some(b)) if b != 0.0 => CleanedValue::number(a / b),
        _ => CleanedValue::Missing,
    }
}

pub fn midpoint(a: &CleanedValue, b: &CleanedValue) -> CleanedValue {
    match (a.as_number(), b.as_number()) {
        (Some(a), Some(b)) => CleanedValue::number((a + b) / 2.0),
        _ => CleanedValue::Missing,
    }
}

/// Year-over-year change: `v[i] / v[i-1] - 1`. The first entry has no
/// baseline and is always `Missing`.
pub fn pct_change(values: &[CleanedValue]) -> Vec<CleanedValue> {
    let mut out = Vec::with_capacity(values.len());
    for (i, v) in values.iter().enumerate() {
        let change = match i.checked_sub(1).map(|p| &values[p]) {
            Some(prev) => match ratio(v, prev).as_number() {
                Some(r) => CleanedValue::number(r - 1.0),
                None => CleanedValue::Missing,
            },
            None => CleanedValue::Missing,
        };
        out.push(change);
    }
    out
}

pub fn mean(values: &[CleanedValue]) -> CleanedValue {
    let nums: Vec<f64> = values.iter().filter_map(CleanedValue::as_number).collect();
    if nums.is_empty() {
        return CleanedValue::Missing;
    }
    CleanedValue::number(nums.iter().sum::<f64>() / nums.len() as f64)
}

// ── Windows ───────────────────────────────────────────────────────────────────

/// The second-to-last row (the last is the furthest-out estimate year).
pub fn window_1yr(values: &[CleanedValue]) -> CleanedValue {
    match values.len() {
        n if n >= 2 => match &values[n - 2] {
            CleanedValue::Number(v) => CleanedValue::Number(*v),
            _ => CleanedValue::Missing,
        },
        _ => CleanedValue::Missing,
    }
}

pub fn window_2yr(values: &[CleanedValue]) -> CleanedValue {
    let start = values.len().saturating_sub(2);
    mean(&values[start..])
}

pub fn window_5yr(values: &[CleanedValue]) -> CleanedValue {
    mean(values)
}

// ── Earnings ──────────────────────────────────────────────────────────────────

/// "$1.10 - $1.40" → (1.10, 1.40)
pub fn parse_estimate_range(text: &str) -> Option<(f64, f64)> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    match tokens.as_slice() {
        [low, _, high, ..] => Some((clean(low).as_number()?, clean(high).as_number()?)),
        [single] => {
            let (low, high) = single.split_once('-')?;
            Some((clean(low).as_number()?, clean(high).as_number()?))
        }
        _ => None,
    }
}

/// Consensus estimate per year: midpoint of the range, replaced by a point
/// estimate where the year has one, and finally filled from a standalone
/// consensus figure where neither was available.
pub fn reconcile_estimates(series: &mut YearlySeries) {
    let low = series.column(LOW_ESTIMATE);
    let high = series.column(HIGH_ESTIMATE);
    let point = series.column(ESTIMATE);
    let standalone = series.column(CONSENSUS_RAW);

    let consensus: Vec<CleanedValue> = (0..series.len())
        .map(|i| {
            if point[i].as_number().is_some() {
                return point[i].clone();
            }
            let mid = midpoint(&low[i], &high[i]);
            if mid.is_missing() {
                // Standalone figures are kept as raw text until here.
                match &standalone[i] {
                    CleanedValue::Text(t) => clean(t),
                    other => other.clone(),
                }
            } else {
                mid
            }
        })
        .collect();

    let actual = series.column(ACTUAL);
    let actual_or_estimate: Vec<CleanedValue> = actual
        .iter()
        .zip(&consensus)
        .map(|(a, c)| if a.is_missing() { c.clone() } else { a.clone() })
        .collect();

    series.set_column(CONSENSUS_ESTIMATE, consensus);
    series.set_column(ACTUAL_ESTIMATE, actual_or_estimate);
}

/// Fill every derived earnings column and return the summary windows.
pub fn derive_earnings(series: &mut YearlySeries) -> FieldRecord {
    let growth = pct_change(&series.column(ACTUAL));
    series.set_column(GROWTH, growth);

    let ranges: Vec<Option<(f64, f64)>> = series
        .column(ESTIMATE_RANGE)
        .iter()
        .map(|v| v.as_text().and_then(parse_estimate_range))
        .collect();
    series.set_column(
        LOW_ESTIMATE,
        ranges.iter().map(|r| CleanedValue::from_option(r.map(|r| r.0))).collect(),
    );
    series.set_column(
        HIGH_ESTIMATE,
        ranges.iter().map(|r| CleanedValue::from_option(r.map(|r| r.1))).collect(),
    );

    let low_growth = pct_change(&series.column(LOW_ESTIMATE));
    let high_growth = pct_change(&series.column(HIGH_ESTIMATE));
    series.set_column(LOW_GROWTH, low_growth.clone());
    series.set_column(HIGH_GROWTH, high_growth.clone());

    reconcile_estimates(series);

    let ae_growth = pct_change(&series.column(ACTUAL_ESTIMATE));
    series.set_column(AE_GROWTH, ae_growth.clone());

    let consensus_growth: Vec<CleanedValue> = low_growth
        .iter()
        .zip(&high_growth)
        .map(|(l, h)| midpoint(h, l))
        .collect();
    series.set_column(CONSENSUS_GROWTH, consensus_growth.clone());

    for year in series.years() {
        let row = series.row_mut(year);
        row.remove(ESTIMATE_RANGE);
        row.remove(CONSENSUS_RAW);
    }

    let low_2yr = window_2yr(&low_growth);
    let high_2yr = window_2yr(&high_growth);

    let mut summary = FieldRecord::new();
    summary.insert("Growth 1yr Low Est", window_1yr(&low_growth));
    summary.insert("Growth 1yr High Est", window_1yr(&high_growth));
    summary.insert("Growth 1yr Consensus Est", window_1yr(&consensus_growth));
    summary.insert("Growth 2yr Low Est", low_2yr.clone());
    summary.insert("Growth 2yr High Est", high_2yr.clone());
    summary.insert("Growth 2yr Consensus Est", midpoint(&low_2yr, &high_2yr));
    summary.insert("Growth 5yr Low Est", window_5yr(&low_growth));
    summary.insert("Growth 5yr High Est", window_5yr(&high_growth));
    summary.insert("Growth 5yr Consensus Est", window_5yr(&consensus_growth));
    summary.insert("Growth 5yr Actual/Est", window_5yr(&ae_growth));
    summary.insert("Growth 3yr Historic", window_5yr(&series.column(GROWTH)));
    summary
}

// ── Fundamentals ──────────────────────────────────────────────────────────────

/// Add "Free Cash Flow" and "FCF Growth" to every year and return the mean
/// growth. Without both source rows every derived value is `Missing`.
pub fn free_cash_flow(series: &mut YearlySeries) -> CleanedValue {
    let n = series.len();
    if !series.has_field(OPERATING_CASH) || !series.has_field(CAPEX) {
        debug!("Cash flow rows absent, free cash flow not derived");
        series.set_column(FREE_CASH_FLOW, vec![CleanedValue::Missing; n]);
        series.set_column(FCF_GROWTH, vec![CleanedValue::Missing; n]);
        return CleanedValue::Missing;
    }

    let fcf: Vec<CleanedValue> = series
        .column(OPERATING_CASH)
        .iter()
        .zip(series.column(CAPEX).iter())
        .map(|(op, capex)| add(op, capex))
        .collect();
    let growth = pct_change(&fcf);
    let avg = mean(&growth);

    series.set_column(FREE_CASH_FLOW, fcf);
    series.set_column(FCF_GROWTH, growth);
    avg
}

/// Values of the "Historic Growth" share-detail box, cleaned but not yet
/// scaled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoricGrowthBlock {
    pub values: FieldRecord,
}

/// Copy the historic block into `record`, converting the five-year growth
/// percentages to fractions. Without a block those fields are `Missing`.
pub fn apply_historic_growth(record: &mut FieldRecord, block: Option<&HistoricGrowthBlock>) {
    match block {
        Some(block) => {
            for (name, value) in block.values.iter() {
                let value = if HISTORIC_GROWTH_FIELDS.contains(&name) {
                    match value.as_number() {
                        Some(v) => CleanedValue::number(v / 100.0),
                        None => CleanedValue::Missing,
                    }
                } else {
                    value.clone()
                };
                record.set(name, value);
            }
            for name in HISTORIC_GROWTH_FIELDS {
                if !record.contains(name) {
                    record.set(name, CleanedValue::Missing);
                }
            }
        }
        None => {
            for name in HISTORIC_GROWTH_FIELDS {
                record.set(name, CleanedValue::Missing);
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn n(v: f64) -> CleanedValue {
        CleanedValue::Number(v)
    }

    fn approx(v: &CleanedValue, expected: f64) -> bool {
        v.as_number().map(|x| (x - expected).abs() < 1e-9).unwrap_or(false)
    }

    #[test]
    fn test_pct_change_first_is_missing() {
        let g = pct_change(&[n(1.0), n(1.5), CleanedValue::Missing, n(3.0)]);
        assert!(g[0].is_missing());
        assert!(approx(&g[1], 0.5));
        assert!(g[2].is_missing());
        assert!(g[3].is_missing());
    }

    #[test]
    fn test_missing_never_becomes_zero() {
        assert!(add(&n(1.0), &CleanedValue::Missing).is_missing());
        assert!(ratio(&n(1.0), &n(0.0)).is_missing());
        assert!(mean(&[CleanedValue::Missing, CleanedValue::Missing]).is_missing());
        assert!(approx(&mean(&[CleanedValue::Missing, n(2.0), n(4.0)]), 3.0));
    }

    #[test]
    fn test_windows() {
        let v = [CleanedValue::Missing, n(0.1), n(0.2), n(0.3)];
        assert!(approx(&window_1yr(&v), 0.2));
        assert!(approx(&window_2yr(&v), 0.25));
        assert!(approx(&window_5yr(&v), 0.2));
        assert!(window_1yr(&[n(0.1)]).is_missing());
    }

    #[test]
    fn test_estimate_range() {
        assert_eq!(parse_estimate_range("$1.10 - $1.40"), Some((1.10, 1.40)));
        assert_eq!(parse_estimate_range("$1.10-$1.40"), Some((1.10, 1.40)));
        assert_eq!(parse_estimate_range("--"), None);
    }

    #[test]
    fn test_point_estimate_supersedes_midpoint() {
        let mut s = YearlySeries::new();
        s.row_mut(2021).insert(ACTUAL, n(1.0));
        s.row_mut(2021).insert(ESTIMATE_RANGE, CleanedValue::Text("$0.90 - $1.10".into()));
        s.row_mut(2022).insert(ESTIMATE, n(1.25));
        s.row_mut(2022).insert(ESTIMATE_RANGE, CleanedValue::Text("$1.00 - $1.40".into()));
        s.row_mut(2023).insert(CONSENSUS_RAW, CleanedValue::Text("$1.60".into()));

        let windows = derive_earnings(&mut s);

        let consensus = s.column(CONSENSUS_ESTIMATE);
        assert!(approx(&consensus[0], 1.0));
        assert!(approx(&consensus[1], 1.25));
        assert!(approx(&consensus[2], 1.60));

        let ae = s.column(ACTUAL_ESTIMATE);
        assert!(approx(&ae[0], 1.0));
        assert!(approx(&ae[1], 1.25));

        assert!(s.column(GROWTH)[0].is_missing());
        assert!(!s.has_field(ESTIMATE_RANGE));
        assert!(approx(&windows.value("Growth 1yr Low Est"), 1.0 / 0.9 - 1.0));
    }

    #[test]
    fn test_free_cash_flow() {
        let mut s = YearlySeries::new();
        for (year, op, capex) in [(2019, 100.0, -40.0), (2020, 120.0, -30.0)] {
            let row = s.row_mut(year);
            row.insert(OPERATING_CASH, n(op));
            row.insert(CAPEX, n(capex));
        }
        let avg = free_cash_flow(&mut s);
        assert_eq!(s.column(FREE_CASH_FLOW), vec![n(60.0), n(90.0)]);
        assert!(approx(&avg, 0.5));
    }

    #[test]
    fn test_free_cash_flow_without_rows() {
        let mut s = YearlySeries::new();
        s.row_mut(2020).insert(OPERATING_CASH, n(100.0));
        assert!(free_cash_flow(&mut s).is_missing());
        assert!(s.column(FREE_CASH_FLOW)[0].is_missing());
    }

    #[test]
    fn test_historic_growth_scaling() {
        let mut block = HistoricGrowthBlock::default();
        block.values.insert("EPS Growth 5yr", n(12.0));
        block.values.insert("Revenue Growth 5yr", CleanedValue::Missing);

        let mut rec = FieldRecord::new();
        apply_historic_growth(&mut rec, Some(&block));
        assert!(approx(&rec.value("EPS Growth 5yr"), 0.12));
        assert!(rec.value("Revenue Growth 5yr").is_missing());
        assert!(rec.get("Dividend Growth 5yr").is_some());

        let mut rec = FieldRecord::new();
        apply_historic_growth(&mut rec, None);
        assert!(HISTORIC_GROWTH_FIELDS.iter().all(|f| rec.value(f).is_missing()));
    }
}
