//! Persisted tables. Every in-memory table converts to a [`Tabular`], which a
//! [`RecordStore`] writes per ticker and reads back.

pub mod csv_store;
pub mod duck;

use crate::aggregate::WatchlistTable;
use crate::models::{CleanedValue, CombinedRecord, FieldRecord, Section, SectionTable, YearlySeries};
use crate::sections::parse_year;
use std::fmt;
use thiserror::Error;

pub use self::csv_store::CsvRecordStore;
pub use self::duck::DuckDbRecordStore;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),
    #[error("no {table} table stored for {ticker}")]
    NotFound { ticker: String, table: TableName },
    #[error("malformed table: {0}")]
    Malformed(String),
}

// ── Table names ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableName {
    Summary,
    Earnings,
    EarningsYearly,
    Fundamentals,
    FundamentalsYearly,
    Valuation,
    Analysts,
    Combined,
}

impl TableName {
    pub const ALL: [TableName; 8] = [
        TableName::Combined,
        TableName::Summary,
        TableName::Earnings,
        TableName::EarningsYearly,
        TableName::Fundamentals,
        TableName::FundamentalsYearly,
        TableName::Valuation,
        TableName::Analysts,
    ];

    pub fn file_stem(&self) -> &'static str {
        match self {
            TableName::Summary => "summary",
            TableName::Earnings => "earnings",
            TableName::EarningsYearly => "earnings_yearly",
            TableName::Fundamentals => "fundies",
            TableName::FundamentalsYearly => "fundies_yearly",
            TableName::Valuation => "valuation",
            TableName::Analysts => "analysts",
            TableName::Combined => "combined",
        }
    }

    pub fn from_stem(stem: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.file_stem() == stem)
    }

    /// Table holding a section's per-ticker values.
    pub fn for_section(section: Section) -> Self {
        match section {
            Section::Summary => TableName::Summary,
            Section::Earnings => TableName::Earnings,
            Section::Fundamentals => TableName::Fundamentals,
            Section::Valuation => TableName::Valuation,
            Section::Analyst => TableName::Analysts,
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_stem())
    }
}

/// Header of the index column in every stored table.
pub const INDEX_COLUMN: &str = "";
pub const REPORT_COLUMN: &str = "Report";
pub const AGGREGATE_NAME: &str = "big_df";

// ── Tabular ───────────────────────────────────────────────────────────────────

/// Header plus rows of (index, cells). `columns` excludes the index column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tabular {
    pub columns: Vec<String>,
    pub rows: Vec<(String, Vec<CleanedValue>)>,
}

impl Tabular {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, index: impl Into<String>, cells: Vec<CleanedValue>) {
        self.rows.push((index.into(), cells));
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell at `(row index, column)`, `Missing` when either is absent.
    pub fn cell(&self, index: &str, column: &str) -> CleanedValue {
        let Some(col) = self.column_index(column) else {
            return CleanedValue::Missing;
        };
        self.rows
            .iter()
            .find(|(i, _)| i == index)
            .and_then(|(_, cells)| cells.get(col).cloned())
            .unwrap_or_default()
    }

    /// Fields as rows; the ticker column first, then each extra column.
    pub fn from_section(ticker: &str, table: &SectionTable) -> Self {
        let mut columns = vec![ticker.to_string()];
        columns.extend(table.extras.iter().map(|e| e.name.clone()));

        let mut out = Self::new(columns);
        for (name, value) in table.values.iter() {
            let mut cells = vec![value.clone()];
            cells.extend(table.extras.iter().map(|e| e.values.value(name)));
            out.push(name, cells);
        }
        out
    }

    pub fn into_section(self, section: Section) -> Result<SectionTable, StoreError> {
        if self.columns.is_empty() {
            return Err(StoreError::Malformed(format!("{} table has no value column", section)));
        }
        let mut table = SectionTable::new(section);
        for (name, cells) in &self.rows {
            let mut cells = cells.iter();
            table.values.insert(name.as_str(), cells.next().cloned().unwrap_or_default());
            for (extra, value) in self.columns[1..].iter().zip(cells) {
                table.extra_mut(extra).insert(name.as_str(), value.clone());
            }
        }
        Ok(table)
    }

    /// Fields as rows, years as columns, plus a `Report` column when the
    /// series carries report labels.
    pub fn from_yearly(series: &YearlySeries) -> Self {
        let years = series.years();
        let mut columns: Vec<String> = years.iter().map(|y| y.to_string()).collect();
        if series.has_reports() {
            columns.push(REPORT_COLUMN.to_string());
        }

        let mut out = Self::new(columns);
        for field in series.field_names() {
            let mut cells = series.column(&field);
            if series.has_reports() {
                cells.push(
                    series
                        .report_of(&field)
                        .map(|r| CleanedValue::Text(r.to_string()))
                        .unwrap_or_default(),
                );
            }
            out.push(field, cells);
        }
        out
    }

    pub fn into_yearly(self) -> Result<YearlySeries, StoreError> {
        let report_col = self.column_index(REPORT_COLUMN);
        let mut years = Vec::with_capacity(self.columns.len());
        for (i, c) in self.columns.iter().enumerate() {
            if Some(i) == report_col {
                years.push(None);
                continue;
            }
            let year = parse_year(c).ok_or_else(|| StoreError::Malformed(format!("year column {:?}", c)))?;
            years.push(Some(year));
        }

        let mut series = YearlySeries::new();
        for &year in years.iter().flatten() {
            series.row_mut(year);
        }
        for (field, cells) in &self.rows {
            for (year, cell) in years.iter().zip(cells) {
                match year {
                    Some(year) => {
                        series.row_mut(*year).set(field.as_str(), cell.clone());
                    }
                    None => {
                        if let CleanedValue::Text(report) = cell {
                            series.tag_report(field, report);
                        }
                    }
                }
            }
        }
        Ok(series)
    }

    pub fn from_combined(record: &CombinedRecord) -> Self {
        let mut out = Self::new(vec![record.ticker.clone()]);
        for (name, value) in record.fields.iter() {
            out.push(name, vec![value.clone()]);
        }
        out
    }

    pub fn into_combined(self) -> Result<CombinedRecord, StoreError> {
        let ticker = self
            .columns
            .first()
            .cloned()
            .ok_or_else(|| StoreError::Malformed("combined table has no ticker column".into()))?;
        let fields: FieldRecord = self
            .rows
            .into_iter()
            .map(|(name, cells)| (name, cells.into_iter().next().unwrap_or_default()))
            .collect();
        Ok(CombinedRecord { ticker, fields })
    }

    /// Tickers as rows.
    pub fn from_watchlist(table: &WatchlistTable) -> Self {
        let mut out = Self::new(table.columns().map(str::to_string).collect());
        for record in table.rows() {
            out.push(record.ticker.as_str(), table.row_values(record));
        }
        out
    }
}

// ── Store trait ───────────────────────────────────────────────────────────────

pub trait RecordStore {
    fn write_table(&self, ticker: &str, table: TableName, data: &Tabular) -> Result<(), StoreError>;

    fn read_table(&self, ticker: &str, table: TableName) -> Result<Tabular, StoreError>;

    /// Whether anything has been stored for `ticker` in this database.
    fn exists(&self, ticker: &str) -> Result<bool, StoreError>;

    fn write_aggregate(&self, data: &Tabular) -> Result<(), StoreError>;

    /// Every ticker with stored tables, sorted.
    fn tickers(&self) -> Result<Vec<String>, StoreError>;
}
