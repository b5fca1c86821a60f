//! Raw text pulled out of rendered markup, before any cleaning.

/// A label/value pair from one page section. `aux` holds the label's
/// trailing text nodes (e.g. the past-day figure printed under "Volume").
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFragment {
    pub label: String,
    pub value: String,
    pub aux: Vec<String>,
}

impl RawFragment {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
            aux: Vec::new(),
        }
    }

    pub fn with_aux(mut self, aux: Vec<String>) -> Self {
        self.aux = aux;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct RawSummary {
    pub fragments: Vec<RawFragment>,
}

/// Earnings Analysis header plus one segment list per chart tooltip.
#[derive(Debug, Clone, Default)]
pub struct RawEarnings {
    pub next_announcement: Option<String>,
    pub analyst_label: Option<String>,
    pub tooltips: Vec<Vec<String>>,
}

/// Value cell of a share-detail box. `attr` is the numeric attribute when
/// the markup carried one, `text` the visible text otherwise.
#[derive(Debug, Clone, Default)]
pub struct RawBoxValue {
    pub attr: Option<String>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RawShareBox {
    pub title: String,
    pub labels: Vec<String>,
    pub values: Vec<RawBoxValue>,
}

/// One financial statement laid out as label × year.
#[derive(Debug, Clone, Default)]
pub struct RawReport {
    pub name: String,
    /// (year heading, period-end date) per column
    pub headers: Vec<(String, String)>,
    pub rows: Vec<(String, Vec<String>)>,
}

/// Overview page of the fundamentals tab.
#[derive(Debug, Clone, Default)]
pub struct RawFundamentalsOverview {
    pub ratios: Vec<(String, String)>,
    pub five_year_markers: Vec<String>,
    pub periods: Vec<Vec<String>>,
    pub share_boxes: Vec<RawShareBox>,
}

#[derive(Debug, Clone, Default)]
pub struct RawFundamentals {
    pub overview: RawFundamentalsOverview,
    pub reports: Vec<RawReport>,
}

/// One "ticker vs industry" comparison row.
#[derive(Debug, Clone, Default)]
pub struct RawComparison {
    pub metric: String,
    pub columns: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default)]
pub struct RawValuationTab {
    pub name: String,
    pub rows: Vec<RawComparison>,
}

/// A provider row of the analyst table: the class list of every `div` in
/// the row (index 0 names the provider) and the "Rating Since" text.
#[derive(Debug, Clone, Default)]
pub struct RawAnalystRow {
    pub div_classes: Vec<Vec<String>>,
    pub rating_since: Option<String>,
}

impl RawAnalystRow {
    pub fn provider(&self) -> Option<&str> {
        self.div_classes
            .first()
            .and_then(|c| c.get(1))
            .map(|s| s.trim())
    }

    /// Class token `token` of div `div`, if both exist.
    pub fn class_token(&self, div: usize, token: usize) -> Option<&str> {
        self.div_classes
            .get(div)
            .and_then(|c| c.get(token))
            .map(|s| s.as_str())
    }
}
