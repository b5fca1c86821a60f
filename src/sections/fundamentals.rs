use super::parse_year;
use crate::metrics::{self, FCF_GROWTH_5YR, HistoricGrowthBlock};
use crate::models::{
    CleanedValue, RawBoxValue, RawFundamentals, RawFundamentalsOverview, RawReport, RawShareBox,
    Section, SectionTable, YearlySeries,
};
use crate::normalize::{clean, fields};
use tracing::{debug, warn};

/// Raw value the site uses for "no data" in numeric attributes.
pub const RAW_SENTINEL: f64 = -99999.99;

pub const HISTORIC_GROWTH_BOX: &str = "Historic Growth";
const HISTORIC_SUFFIX: &str = " Growth 5yr";

pub const FIVE_YEAR_LOW: &str = "5yr Low";
pub const FIVE_YEAR_HIGH: &str = "5yr High";
pub const FIVE_YEAR_AVG_RETURN: &str = "5yr Avg Return";
pub const PRICE_LOW: &str = "Price Low";
pub const PRICE_HIGH: &str = "Price High";
pub const PRICE_CHANGE: &str = "Price Change";
pub const PRICE_HISTORY: &str = "Price History";
pub const DATE: &str = "Date";

pub const REPORT_NAMES: [&str; 3] = ["Balance Sheet", "Income Statement", "Cash Flow"];

#[derive(Debug, Clone, PartialEq)]
pub struct FundamentalsTables {
    pub summary: SectionTable,
    pub yearly: YearlySeries,
}

impl FundamentalsTables {
    pub fn placeholder() -> Self {
        Self {
            summary: SectionTable::placeholder(Section::Fundamentals),
            yearly: YearlySeries::new(),
        }
    }
}

pub fn assemble_fundamentals(raw: &RawFundamentals) -> FundamentalsTables {
    let mut summary = SectionTable::new(Section::Fundamentals);
    let mut yearly = YearlySeries::new();

    read_overview(&mut summary, &mut yearly, &raw.overview);
    let historic = read_share_boxes(&mut summary, &raw.overview.share_boxes);

    for report in &raw.reports {
        read_report(&mut yearly, report);
    }

    let fcf_growth = metrics::free_cash_flow(&mut yearly);
    summary.values.set(FCF_GROWTH_5YR, fcf_growth);
    metrics::apply_historic_growth(&mut summary.values, historic.as_ref());

    FundamentalsTables { summary, yearly }
}

/// Numeric attribute, with the raw sentinel mapped to `Missing`.
fn raw_number(attr: &str) -> Option<CleanedValue> {
    let v = attr.trim().parse::<f64>().ok()?;
    if v == RAW_SENTINEL {
        Some(CleanedValue::Missing)
    } else {
        Some(CleanedValue::number(v))
    }
}

fn box_value(v: &RawBoxValue) -> CleanedValue {
    if let Some(n) = v.attr.as_deref().and_then(raw_number) {
        return n;
    }
    v.text.as_deref().map(clean).unwrap_or_default()
}

fn read_overview(summary: &mut SectionTable, yearly: &mut YearlySeries, raw: &RawFundamentalsOverview) {
    for (label, value) in &raw.ratios {
        let cleaned = raw_number(value).unwrap_or_else(|| clean(value));
        summary.values.insert(label.trim(), cleaned);
    }

    // "Low 95.20" / "High 180.10"
    let marker = |i: usize| {
        raw.five_year_markers
            .get(i)
            .and_then(|m| m.split_whitespace().nth(1))
            .map(clean)
            .unwrap_or_default()
    };
    summary.values.insert(FIVE_YEAR_LOW, marker(0));
    summary.values.insert(FIVE_YEAR_HIGH, marker(1));

    // Segments: "52-wk Low: 95.20", "52-wk High: 130.00", "+12.5% return in 2019"
    let mut changes = Vec::new();
    for segs in &raw.periods {
        let word = |seg: usize, idx: usize| segs.get(seg).and_then(|s| s.split_whitespace().nth(idx));
        let Some(year) = word(2, 3).and_then(parse_year) else {
            debug!("fundamentals: price period without a year {:?}", segs);
            continue;
        };
        let change = word(2, 0).map(clean).unwrap_or_default();
        changes.push(change.clone());

        let row = yearly.row_mut(year);
        row.set(PRICE_LOW, word(0, 2).map(clean).unwrap_or_default());
        row.set(PRICE_HIGH, word(1, 2).map(clean).unwrap_or_default());
        row.set(PRICE_CHANGE, change);
    }
    if !changes.is_empty() {
        for name in [PRICE_LOW, PRICE_HIGH, PRICE_CHANGE] {
            yearly.tag_report(name, PRICE_HISTORY);
        }
    }
    summary.values.insert(FIVE_YEAR_AVG_RETURN, metrics::mean(&changes));
}

/// Plain boxes go straight into the summary; the historic box is returned
/// for scaling, or `None` when the page had no historic figures.
fn read_share_boxes(summary: &mut SectionTable, boxes: &[RawShareBox]) -> Option<HistoricGrowthBlock> {
    let mut historic = None;
    for b in boxes {
        let pairs = b.labels.iter().zip(&b.values);
        if b.title.trim() == HISTORIC_GROWTH_BOX {
            if b.labels.is_empty() {
                continue;
            }
            let mut block = HistoricGrowthBlock::default();
            for (label, value) in pairs {
                block
                    .values
                    .insert(format!("{}{}", label.trim(), HISTORIC_SUFFIX), box_value(value));
            }
            historic = Some(block);
        } else {
            for (label, value) in pairs {
                let name = fields::canonical_name(Section::Fundamentals, label);
                let cleaned = match fields::rule_for(Section::Fundamentals, label) {
                    fields::Rule::Percent => fields::scale(box_value(value), 0.01),
                    _ => box_value(value),
                };
                summary.values.insert(name, cleaned);
            }
        }
    }
    if historic.is_none() {
        warn!("Historic Growth not available");
    }
    historic
}

fn read_report(yearly: &mut YearlySeries, report: &RawReport) {
    let years: Vec<Option<i32>> = report.headers.iter().map(|(y, _)| parse_year(y)).collect();

    for ((_, date), year) in report.headers.iter().zip(&years) {
        if let Some(year) = year {
            yearly.row_mut(*year).set(DATE, clean(date));
        }
    }
    yearly.tag_report(DATE, &report.name);

    for (label, cells) in &report.rows {
        let label = label.trim();
        if label.is_empty() {
            continue;
        }
        for (cell, year) in cells.iter().zip(&years) {
            if let Some(year) = year {
                yearly.row_mut(*year).set(label, clean(cell));
            }
        }
        yearly.tag_report(label, &report.name);
    }
    debug!("fundamentals: read {} rows from {}", report.rows.len(), report.name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{CAPEX, FREE_CASH_FLOW, OPERATING_CASH};

    fn s(v: &str) -> String {
        v.to_string()
    }

    fn approx(v: &CleanedValue, expected: f64) -> bool {
        v.as_number().map(|x| (x - expected).abs() < 1e-9).unwrap_or(false)
    }

    fn raw_value(attr: Option<&str>, text: Option<&str>) -> RawBoxValue {
        RawBoxValue {
            attr: attr.map(s),
            text: text.map(s),
        }
    }

    fn page() -> RawFundamentals {
        RawFundamentals {
            overview: RawFundamentalsOverview {
                ratios: vec![(s("P/E Ratio"), s("24.5")), (s("PEG Ratio"), s("-99999.99"))],
                five_year_markers: vec![s("Low 95.20"), s("High 180.10")],
                periods: vec![
                    vec![s("52-wk Low: 95.20"), s("52-wk High: 130.00"), s("+10.0% return in 2019")],
                    vec![s("52-wk Low: 110.00"), s("52-wk High: 150.00"), s("-2.0% return in 2020")],
                ],
                share_boxes: vec![
                    RawShareBox {
                        title: s("Historic Growth"),
                        labels: vec![s("EPS"), s("Revenue")],
                        values: vec![raw_value(Some("12.0"), None), raw_value(Some("-99999.99"), None)],
                    },
                    RawShareBox {
                        title: s("Short Interest"),
                        labels: vec![s("Current Month"), s("Percent of Float")],
                        values: vec![raw_value(Some("1500000"), None), raw_value(None, Some("2.0"))],
                    },
                ],
            },
            reports: vec![RawReport {
                name: s("Cash Flow"),
                headers: vec![(s("2019"), s("12/31/2019")), (s("2020"), s("12/31/2020"))],
                rows: vec![
                    (s(OPERATING_CASH), vec![s("100.0"), s("120.0")]),
                    (s(CAPEX), vec![s("(40.0)"), s("(30.0)")]),
                ],
            }],
        }
    }

    #[test]
    fn test_overview_and_boxes() {
        let t = assemble_fundamentals(&page());
        let v = &t.summary.values;
        assert_eq!(v.value("P/E Ratio"), CleanedValue::Number(24.5));
        assert!(v.value("PEG Ratio").is_missing());
        assert_eq!(v.value(FIVE_YEAR_LOW), CleanedValue::Number(95.2));
        assert_eq!(v.value(FIVE_YEAR_HIGH), CleanedValue::Number(180.1));
        assert!(approx(&v.value(FIVE_YEAR_AVG_RETURN), 0.04));
        assert_eq!(v.value("Short Int Current Month"), CleanedValue::Number(1_500_000.0));
        assert!(approx(&v.value("Short Int Pct of Float"), 0.02));
        assert!(approx(&v.value("EPS Growth 5yr"), 0.12));
        assert!(v.value("Revenue Growth 5yr").is_missing());
        assert!(v.value("Dividend Growth 5yr").is_missing());
    }

    #[test]
    fn test_reports_and_free_cash_flow() {
        let t = assemble_fundamentals(&page());
        let y = &t.yearly;
        assert_eq!(y.years(), vec![2019, 2020]);
        assert_eq!(y.report_of(CAPEX), Some("Cash Flow"));
        assert_eq!(y.report_of(PRICE_CHANGE), Some(PRICE_HISTORY));
        assert!(y.column(DATE)[0].as_date().is_some());
        assert_eq!(y.column(FREE_CASH_FLOW), vec![CleanedValue::Number(60.0), CleanedValue::Number(90.0)]);
        assert!(approx(&t.summary.values.value(FCF_GROWTH_5YR), 0.5));
        assert!(approx(&y.column(PRICE_CHANGE)[1], -0.02));
    }

    #[test]
    fn test_missing_historic_box() {
        let mut raw = page();
        raw.overview.share_boxes.remove(0);
        raw.reports.clear();
        let t = assemble_fundamentals(&raw);
        assert!(t.summary.values.value("EPS Growth 5yr").is_missing());
        assert!(t.summary.values.value(FCF_GROWTH_5YR).is_missing());
    }
}
