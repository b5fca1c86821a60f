//! Per-ticker union of section tables and the watchlist-wide table built from
//! those unions.

use crate::models::{CleanedValue, CombinedRecord, Section, SectionTable};
use crate::sections::analysts::RATING_SINCE;
use std::collections::BTreeSet;
use tracing::debug;

/// Printed as free text by the site and never comparable across tickers.
pub const EXCLUDED_FIELDS: [&str; 1] = ["Shares Outstanding"];

/// Merge the section tables of one ticker. Sections are visited in
/// [`Section::PRECEDENCE`] order whatever order they are passed in, and the
/// first value seen for a name wins.
pub fn combine(ticker: &str, tables: &[&SectionTable]) -> CombinedRecord {
    let mut record = CombinedRecord::new(ticker);

    for section in Section::PRECEDENCE {
        for table in tables.iter().filter(|t| t.section == section) {
            for (name, value) in table.values.iter() {
                if EXCLUDED_FIELDS.contains(&name) {
                    continue;
                }
                if !record.fields.insert(name, value.clone()) {
                    debug!("{}: {} {:?} shadowed by an earlier section", ticker, section, name);
                }
            }

            if section == Section::Analyst {
                if let Some(since) = table.extra(RATING_SINCE) {
                    for (provider, date) in since.iter() {
                        record.fields.set(format!("{} since", provider), date.clone());
                    }
                }
            }
        }
    }
    record
}

// ── Watchlist table ───────────────────────────────────────────────────────────

/// Tickers as rows, canonical names as columns (sorted union of every
/// record's fields).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WatchlistTable {
    rows: Vec<CombinedRecord>,
    columns: BTreeSet<String>,
}

impl WatchlistTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = CombinedRecord>) -> Self {
        let mut table = Self::new();
        for record in records {
            table.append(record);
        }
        table
    }

    /// Add a ticker row. A ticker appended twice keeps its latest record.
    pub fn append(&mut self, record: CombinedRecord) {
        self.columns
            .extend(record.fields.names().map(str::to_string));
        match self.rows.iter_mut().find(|r| r.ticker == record.ticker) {
            Some(existing) => *existing = record,
            None => self.rows.push(record),
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(String::as_str)
    }

    pub fn rows(&self) -> &[CombinedRecord] {
        &self.rows
    }

    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|r| r.ticker.as_str())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, ticker: &str, column: &str) -> CleanedValue {
        self.rows
            .iter()
            .find(|r| r.ticker == ticker)
            .map(|r| r.fields.value(column))
            .unwrap_or_default()
    }

    /// Row values aligned to [`WatchlistTable::columns`].
    pub fn row_values(&self, record: &CombinedRecord) -> Vec<CleanedValue> {
        self.columns.iter().map(|c| record.fields.value(c)).collect()
    }
}
