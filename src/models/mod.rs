pub mod raw;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use self::raw::*;

// ── Cleaned value ─────────────────────────────────────────────────────────────

/// One normalized cell. Placeholders always land on `Missing`, never on zero.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum CleanedValue {
    Number(f64),
    Date(NaiveDate),
    Text(String),
    #[default]
    Missing,
}

/// Storage format for dates in persisted tables.
pub const CELL_DATE_FORMAT: &str = "%Y-%m-%d";

/// Leading marker on a persisted text cell that would otherwise parse as a
/// number, a date or a missing value.
pub const TEXT_ESCAPE: char = '\'';

impl CleanedValue {
    /// Wrap a float; NaN and infinities become `Missing`.
    pub fn number(v: f64) -> Self {
        if v.is_finite() {
            CleanedValue::Number(v)
        } else {
            CleanedValue::Missing
        }
    }

    pub fn from_option(v: Option<f64>) -> Self {
        v.map(CleanedValue::number).unwrap_or_default()
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CleanedValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            CleanedValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CleanedValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, CleanedValue::Missing)
    }

    /// Render for a persisted table. `Missing` is the empty cell.
    pub fn to_cell(&self) -> String {
        match self {
            CleanedValue::Number(n) => n.to_string(),
            CleanedValue::Date(d) => d.format(CELL_DATE_FORMAT).to_string(),
            CleanedValue::Text(s) if Self::text_needs_escape(s) => format!("{}{}", TEXT_ESCAPE, s),
            CleanedValue::Text(s) => s.clone(),
            CleanedValue::Missing => String::new(),
        }
    }

    /// Text that would read back as another kind (or lose whitespace) is
    /// written behind [`TEXT_ESCAPE`].
    fn text_needs_escape(s: &str) -> bool {
        s.starts_with(TEXT_ESCAPE)
            || s.trim() != s
            || !matches!(Self::from_cell(s), CleanedValue::Text(_))
    }

    /// Inverse of [`CleanedValue::to_cell`].
    pub fn from_cell(cell: &str) -> Self {
        if let Some(text) = cell.strip_prefix(TEXT_ESCAPE) {
            return CleanedValue::Text(text.to_string());
        }
        let cell = cell.trim();
        if cell.is_empty() {
            return CleanedValue::Missing;
        }
        if let Ok(n) = cell.parse::<f64>() {
            return CleanedValue::number(n);
        }
        if let Ok(d) = NaiveDate::parse_from_str(cell, CELL_DATE_FORMAT) {
            return CleanedValue::Date(d);
        }
        CleanedValue::Text(cell.to_string())
    }
}

impl fmt::Display for CleanedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CleanedValue::Missing => write!(f, "<missing>"),
            CleanedValue::Text(t) => f.write_str(t),
            other => write!(f, "{}", other.to_cell()),
        }
    }
}

// ── Field record ──────────────────────────────────────────────────────────────

/// Ordered canonical-name → value mapping. Names are unique.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldRecord {
    entries: Vec<(String, CleanedValue)>,
}

impl FieldRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless the name is already present; the first value wins.
    /// Returns `false` when the incoming value was dropped.
    pub fn insert(&mut self, name: impl Into<String>, value: CleanedValue) -> bool {
        let name = name.into();
        if self.contains(&name) {
            return false;
        }
        self.entries.push((name, value));
        true
    }

    /// Insert or replace.
    pub fn set(&mut self, name: impl Into<String>, value: CleanedValue) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&CleanedValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Value for `name`, `Missing` when absent.
    pub fn value(&self, name: &str) -> CleanedValue {
        self.get(name).cloned().unwrap_or_default()
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(CleanedValue::as_number)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub fn remove(&mut self, name: &str) -> Option<CleanedValue> {
        let idx = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CleanedValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reorder alphabetically by name.
    pub fn sort_by_name(&mut self) {
        self.entries.sort_by(|a, b| a.0.cmp(&b.0));
    }
}

impl FromIterator<(String, CleanedValue)> for FieldRecord {
    fn from_iter<I: IntoIterator<Item = (String, CleanedValue)>>(iter: I) -> Self {
        let mut record = FieldRecord::new();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}

// ── Sections ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Section {
    Summary,
    Earnings,
    Fundamentals,
    Valuation,
    Analyst,
}

impl Section {
    /// Collision priority when sections are combined: earlier wins.
    pub const PRECEDENCE: [Section; 5] = [
        Section::Summary,
        Section::Earnings,
        Section::Fundamentals,
        Section::Valuation,
        Section::Analyst,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Section::Summary => "summary",
            Section::Earnings => "earnings",
            Section::Fundamentals => "fundamentals",
            Section::Valuation => "valuation",
            Section::Analyst => "analysts",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Named side column of a section table (industry value, rating date, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct ExtraColumn {
    pub name: String,
    pub values: FieldRecord,
}

/// One normalized page section for one ticker.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionTable {
    pub section: Section,
    pub values: FieldRecord,
    pub extras: Vec<ExtraColumn>,
}

impl SectionTable {
    pub fn new(section: Section) -> Self {
        Self {
            section,
            values: FieldRecord::new(),
            extras: Vec::new(),
        }
    }

    /// The all-empty stand-in used when a section could not be scraped.
    pub fn placeholder(section: Section) -> Self {
        Self::new(section)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn extra(&self, name: &str) -> Option<&FieldRecord> {
        self.extras.iter().find(|c| c.name == name).map(|c| &c.values)
    }

    /// Side column by name, created on first use.
    pub fn extra_mut(&mut self, name: &str) -> &mut FieldRecord {
        let idx = match self.extras.iter().position(|c| c.name == name) {
            Some(idx) => idx,
            None => {
                self.extras.push(ExtraColumn {
                    name: name.to_string(),
                    values: FieldRecord::new(),
                });
                self.extras.len() - 1
            }
        };
        &mut self.extras[idx].values
    }
}

// ── Yearly series ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct YearRow {
    pub year: i32,
    pub fields: FieldRecord,
}

/// Year-indexed records, always kept in ascending year order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct YearlySeries {
    rows: Vec<YearRow>,
    reports: Vec<(String, String)>,
}

impl YearlySeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record for `year`, inserted in order if new.
    pub fn row_mut(&mut self, year: i32) -> &mut FieldRecord {
        let idx = match self.rows.binary_search_by_key(&year, |r| r.year) {
            Ok(idx) => idx,
            Err(idx) => {
                self.rows.insert(
                    idx,
                    YearRow {
                        year,
                        fields: FieldRecord::new(),
                    },
                );
                idx
            }
        };
        &mut self.rows[idx].fields
    }

    pub fn rows(&self) -> &[YearRow] {
        &self.rows
    }

    pub fn years(&self) -> Vec<i32> {
        self.rows.iter().map(|r| r.year).collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.rows.iter().any(|r| r.fields.contains(name))
    }

    /// One value per year, `Missing` where the year lacks the field.
    pub fn column(&self, name: &str) -> Vec<CleanedValue> {
        self.rows.iter().map(|r| r.fields.value(name)).collect()
    }

    /// Overwrite a column. Extra values are ignored, short input leaves
    /// the remaining years untouched.
    pub fn set_column(&mut self, name: &str, values: Vec<CleanedValue>) {
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.fields.set(name, value);
        }
    }

    pub fn tag_report(&mut self, field: &str, report: &str) {
        if self.report_of(field).is_none() {
            self.reports.push((field.to_string(), report.to_string()));
        }
    }

    pub fn report_of(&self, field: &str) -> Option<&str> {
        self.reports
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, r)| r.as_str())
    }

    pub fn has_reports(&self) -> bool {
        !self.reports.is_empty()
    }

    /// Union of field names in first-seen order.
    pub fn field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for row in &self.rows {
            for name in row.fields.names() {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }
        names
    }
}

// ── Combined record ───────────────────────────────────────────────────────────

/// Per-ticker union of all section values after precedence deduplication.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedRecord {
    pub ticker: String,
    pub fields: FieldRecord,
}

impl CombinedRecord {
    pub fn new(ticker: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            fields: FieldRecord::new(),
        }
    }
}
