use crate::metrics;
use crate::models::{CleanedValue, RawComparison, RawValuationTab, Section, SectionTable};
use crate::normalize::clean;
use tracing::debug;

pub const VALUATION_TABS: [&str; 6] = [
    "Valuation",
    "Profitability",
    "Dividend",
    "Growth rates",
    "Effectiveness",
    "Financial strength",
];

pub const INDUSTRY: &str = "Industry";
pub const RATIO_TO_INDUSTRY: &str = "Ratio to Industry";
pub const TYPE: &str = "Type";

/// Stack every tab's "ticker vs industry" rows into one table. Each metric
/// gets the ticker value, the industry value, their ratio and the tab name.
pub fn assemble_valuation(ticker: &str, tabs: &[RawValuationTab]) -> SectionTable {
    let mut table = SectionTable::new(Section::Valuation);

    for tab in tabs {
        if tab.rows.is_empty() {
            debug!("valuation: {} tab has no data for {}", tab.name, ticker);
            continue;
        }
        for row in &tab.rows {
            let metric = row.metric.trim();
            if metric.is_empty() {
                continue;
            }
            let own = clean(column(row, ticker, 0));
            let industry = clean(column(row, INDUSTRY, 1));
            let ratio = metrics::ratio(&own, &industry);

            if !table.values.insert(metric, own) {
                debug!("valuation: {:?} already read from an earlier tab", metric);
                continue;
            }
            table.extra_mut(INDUSTRY).insert(metric, industry);
            table.extra_mut(RATIO_TO_INDUSTRY).insert(metric, ratio);
            table
                .extra_mut(TYPE)
                .insert(metric, CleanedValue::Text(tab.name.clone()));
        }
    }
    table
}

/// Value of the column labelled `label`, falling back to position `idx`.
fn column<'a>(row: &'a RawComparison, label: &str, idx: usize) -> &'a str {
    row.columns
        .iter()
        .find(|(l, _)| l.trim().eq_ignore_ascii_case(label))
        .or_else(|| row.columns.get(idx))
        .map(|(_, v)| v.as_str())
        .unwrap_or("")
}
