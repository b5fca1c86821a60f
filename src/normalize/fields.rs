//! Static field dictionary: raw page label → canonical name + cleaning rule,
//! plus the parsers for values that pack several quantities into one string.

use super::cleaner::{clean, clean_date, clean_rating, clean_text, is_sentinel};
use crate::models::{CleanedValue, Section};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compound {
    /// "3.2x1.1" → bid size, ask size, ratio
    BidAsk,
    /// "10.50-11.25" → day low, day high
    DayRange,
    /// "+0.25 (+2.40%)" → day change $, day change %
    DayChange,
    /// "$0.88/1.85%" → annual dividend $, annual dividend %
    Dividend,
    /// "120.00 - 180.00" → 52-week low, 52-week high
    YearRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Clean,
    /// Clean, then divide by 100.
    Percent,
    Date,
    Text,
    Rating,
    Compound(Compound),
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub raw: &'static str,
    pub canonical: &'static str,
    pub rule: Rule,
    /// Dropped from the stored table unless full tables are requested.
    pub source_only: bool,
}

const fn spec(raw: &'static str, canonical: &'static str, rule: Rule) -> FieldSpec {
    FieldSpec {
        raw,
        canonical,
        rule,
        source_only: false,
    }
}

const fn source(raw: &'static str, rule: Rule) -> FieldSpec {
    source_as(raw, raw, rule)
}

const fn source_as(raw: &'static str, canonical: &'static str, rule: Rule) -> FieldSpec {
    FieldSpec {
        raw,
        canonical,
        rule,
        source_only: true,
    }
}

// Order matters: when two raw labels map to one canonical name, the entry
// listed first wins.
const SUMMARY_FIELDS: &[FieldSpec] = &[
    spec("Volume:", "Volume 10-day Avg", Rule::Clean),
    spec("Volume", "Volume Past Day", Rule::Clean),
    spec("10-day average volume:", "Volume", Rule::Clean),
    source_as("Score:", NEW_CONSTRUCTS_SCORE, Rule::Text),
    spec("B/A Size", "B/A Size", Rule::Compound(Compound::BidAsk)),
    source("Day's Range", Rule::Compound(Compound::DayRange)),
    source("Day's Change", Rule::Compound(Compound::DayChange)),
    source("Day's High", Rule::Text),
    source("Day's Low", Rule::Text),
    source("Avg Vol (10-day)", Rule::Text),
    source("Annual Dividend/Yield", Rule::Compound(Compound::Dividend)),
    spec("52-Wk Range", "52-Wk Range", Rule::Compound(Compound::YearRange)),
    spec("% Below High", "% Below High", Rule::Clean),
    spec("% Above Low", "% Above Low", Rule::Clean),
    spec("% Held by Institutions", "% Held by Institutions", Rule::Percent),
    spec("Short Interest", "Short Interest", Rule::Percent),
    spec("Prev Close", "Prev Close", Rule::Clean),
    spec("Ask close", "Ask close", Rule::Clean),
    spec("Bid close", "Bid close", Rule::Clean),
    spec("Beta", "Beta", Rule::Clean),
    spec("Ask", "Ask", Rule::Clean),
    spec("Bid", "Bid", Rule::Clean),
    spec("EPS (TTM, GAAP)", "EPS (TTM, GAAP)", Rule::Clean),
    spec("Last Trade", "Last Trade", Rule::Clean),
    spec("Last (size)", "Last (size)", Rule::Clean),
    spec("Closing Price", "Closing Price", Rule::Clean),
    spec("Price", "Price", Rule::Clean),
    spec("Historical Volatility", "Historical Volatility", Rule::Clean),
    spec("P/E Ratio (TTM, GAAP)", "P/E Ratio (TTM, GAAP)", Rule::Clean),
    spec("Today's Open", "Today's Open", Rule::Clean),
    spec("Ex-dividend Date", "Ex-dividend", Rule::Date),
    spec("Ex-dividend", "Ex-dividend", Rule::Date),
    spec("Dividend Pay Date", "Dividend Pay Date", Rule::Date),
    spec("Shares Outstanding", "Shares Outstanding", Rule::Text),
];

const EARNINGS_FIELDS: &[FieldSpec] = &[
    spec("Next Earnings Announcement", "Next Earnings Announcement", Rule::Date),
    spec("Growth Analysts", "Growth Analysts", Rule::Clean),
];

const FUNDAMENTALS_FIELDS: &[FieldSpec] = &[
    spec("Current Month", "Short Int Current Month", Rule::Clean),
    spec("Previous Month", "Short Int Prev Month", Rule::Clean),
    spec("Percent of Float", "Short Int Pct of Float", Rule::Percent),
    spec("% Held by Institutions", "% Held by Institutions", Rule::Percent),
];

fn table(section: Section) -> &'static [FieldSpec] {
    match section {
        Section::Summary => SUMMARY_FIELDS,
        Section::Earnings => EARNINGS_FIELDS,
        Section::Fundamentals => FUNDAMENTALS_FIELDS,
        Section::Valuation | Section::Analyst => &[],
    }
}

/// Rule for labels the dictionary does not list.
fn default_rule(section: Section) -> Rule {
    match section {
        Section::Summary => Rule::Text,
        Section::Analyst => Rule::Rating,
        Section::Earnings | Section::Fundamentals | Section::Valuation => Rule::Clean,
    }
}

pub fn lookup(section: Section, raw_label: &str) -> Option<&'static FieldSpec> {
    let label = raw_label.trim();
    table(section).iter().find(|f| f.raw == label)
}

/// Position in the dictionary; unlisted labels rank last.
pub fn precedence(section: Section, raw_label: &str) -> usize {
    let label = raw_label.trim();
    table(section)
        .iter()
        .position(|f| f.raw == label)
        .unwrap_or(usize::MAX)
}

pub fn canonical_name(section: Section, raw_label: &str) -> String {
    lookup(section, raw_label)
        .map(|f| f.canonical.to_string())
        .unwrap_or_else(|| raw_label.trim().to_string())
}

pub fn rule_for(section: Section, raw_label: &str) -> Rule {
    lookup(section, raw_label)
        .map(|f| f.rule)
        .unwrap_or_else(|| default_rule(section))
}

/// Rename a raw field and clean its value. Compound fields keep their raw
/// text here; their sub-fields come from [`expand`].
pub fn normalize(section: Section, raw_label: &str, raw_value: &str) -> (String, CleanedValue) {
    let name = canonical_name(section, raw_label);
    let value = apply_rule(rule_for(section, raw_label), raw_value);
    (name, value)
}

pub fn apply_rule(rule: Rule, raw: &str) -> CleanedValue {
    match rule {
        Rule::Clean => clean(raw),
        Rule::Percent => scale(clean(raw), 0.01),
        Rule::Date => clean_date(raw),
        Rule::Text | Rule::Compound(_) => clean_text(raw),
        Rule::Rating => clean_rating(raw),
    }
}

pub fn scale(v: CleanedValue, factor: f64) -> CleanedValue {
    match v {
        CleanedValue::Number(n) => CleanedValue::number(n * factor),
        other => other,
    }
}

// ── Compound parsers ──────────────────────────────────────────────────────────

pub const NEW_CONSTRUCTS_SCORE: &str = "New Constructs Score";
pub const BID_SIZE: &str = "Bid Size";
pub const ASK_SIZE: &str = "Ask Size";
pub const BA_RATIO: &str = "B/A Ratio";
pub const DAY_LOW: &str = "Day Low";
pub const DAY_HIGH: &str = "Day High";
pub const DAY_CHANGE_USD: &str = "Day Change $";
pub const DAY_CHANGE_PCT: &str = "Day Change %";
pub const DIVIDEND_USD: &str = "Annual Dividend $";
pub const DIVIDEND_PCT: &str = "Annual Dividend %";
pub const YEAR_LOW: &str = "52-Wk Low";
pub const YEAR_HIGH: &str = "52-Wk High";

pub const NO_DIVIDEND: &str = "No dividend";

/// Derived sub-fields of a compound value. Either every sub-field parses or
/// every one is `Missing`.
pub fn expand(kind: Compound, raw: &str) -> Vec<(String, CleanedValue)> {
    let values = match kind {
        Compound::BidAsk => bid_ask(raw),
        Compound::DayRange | Compound::YearRange => range(raw).map(|(l, h)| vec![l, h]),
        Compound::DayChange => day_change(raw),
        Compound::Dividend => dividend(raw),
    };

    match values {
        Some(values) if values.iter().all(|v| v.is_finite()) => sub_fields(kind)
            .iter()
            .zip(values)
            .map(|(n, v)| (n.to_string(), CleanedValue::Number(v)))
            .collect(),
        _ => missing(kind),
    }
}

/// Every sub-field of `kind` as `Missing`.
pub fn missing(kind: Compound) -> Vec<(String, CleanedValue)> {
    sub_fields(kind)
        .iter()
        .map(|n| (n.to_string(), CleanedValue::Missing))
        .collect()
}

fn sub_fields(kind: Compound) -> &'static [&'static str] {
    match kind {
        Compound::BidAsk => &[BID_SIZE, ASK_SIZE, BA_RATIO],
        Compound::DayRange => &[DAY_LOW, DAY_HIGH],
        Compound::DayChange => &[DAY_CHANGE_USD, DAY_CHANGE_PCT],
        Compound::Dividend => &[DIVIDEND_USD, DIVIDEND_PCT],
        Compound::YearRange => &[YEAR_LOW, YEAR_HIGH],
    }
}

fn bid_ask(raw: &str) -> Option<Vec<f64>> {
    if is_sentinel(raw) {
        return None;
    }
    let (bid, ask) = raw.trim().split_once(['x', 'X'])?;
    let bid = clean(bid).as_number()?;
    let ask = clean(ask).as_number()?;
    Some(vec![bid, ask, bid / ask])
}

/// "10.50-11.25" or "1,010.50 - 1,025.25".
fn range(raw: &str) -> Option<(f64, f64)> {
    if is_sentinel(raw) {
        return None;
    }
    let (low, high) = raw.trim().split_once('-')?;
    Some((clean(low).as_number()?, clean(high).as_number()?))
}

fn day_change(raw: &str) -> Option<Vec<f64>> {
    if is_sentinel(raw) {
        return None;
    }
    let mut tokens = raw
        .split(|c: char| c.is_whitespace() || c == '(' || c == ')' || c == '|')
        .filter(|t| !t.is_empty());
    let dollars = clean(tokens.next()?).as_number()?;
    let pct = clean(tokens.find(|t| t.ends_with('%'))?).as_number()?;
    Some(vec![dollars, pct])
}

fn dividend(raw: &str) -> Option<Vec<f64>> {
    if is_sentinel(raw) || raw.trim() == NO_DIVIDEND {
        return None;
    }
    let (amount, yield_pct) = raw.trim().split_once('/')?;
    Some(vec![clean(amount).as_number()?, clean(yield_pct).as_number()?])
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn get(fields: &[(String, CleanedValue)], name: &str) -> CleanedValue {
        fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    }

    #[test]
    fn test_summary_renames() {
        assert_eq!(canonical_name(Section::Summary, "Volume:"), "Volume 10-day Avg");
        assert_eq!(canonical_name(Section::Summary, "Volume"), "Volume Past Day");
        assert_eq!(canonical_name(Section::Summary, "10-day average volume:"), "Volume");
        assert_eq!(canonical_name(Section::Summary, "Some New Label"), "Some New Label");
        assert!(precedence(Section::Summary, "Ex-dividend Date") < precedence(Section::Summary, "Ex-dividend"));
    }

    #[test]
    fn test_normalize_rules() {
        let (name, v) = normalize(Section::Summary, "% Held by Institutions", "45.5");
        assert_eq!(name, "% Held by Institutions");
        assert!((v.as_number().unwrap() - 0.455).abs() < 1e-12);

        let (name, v) = normalize(Section::Fundamentals, "Percent of Float", "2.0");
        assert_eq!(name, "Short Int Pct of Float");
        assert_eq!(v, CleanedValue::Number(0.02));

        let (_, v) = normalize(Section::Summary, "Exchange", "NASDAQ");
        assert_eq!(v, CleanedValue::Text("NASDAQ".into()));

        let (_, v) = normalize(Section::Analyst, "ford", "3");
        assert_eq!(v, CleanedValue::Number(3.0));
    }

    #[test]
    fn test_bid_ask_split() {
        let out = expand(Compound::BidAsk, "3.2x1.1");
        assert_eq!(get(&out, BID_SIZE), CleanedValue::Number(3.2));
        assert_eq!(get(&out, ASK_SIZE), CleanedValue::Number(1.1));
        let ratio = get(&out, BA_RATIO).as_number().unwrap();
        assert!((ratio - 2.909_090_909).abs() < 1e-6);
    }

    #[test]
    fn test_compound_placeholder_is_all_missing() {
        let out = expand(Compound::BidAsk, "--");
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|(_, v)| v.is_missing()));

        // Zero ask size cannot produce a ratio, so nothing is derived.
        let out = expand(Compound::BidAsk, "3x0");
        assert!(out.iter().all(|(_, v)| v.is_missing()));

        let out = expand(Compound::Dividend, NO_DIVIDEND);
        assert!(out.iter().all(|(_, v)| v.is_missing()));
    }

    #[test]
    fn test_ranges_and_changes() {
        let out = expand(Compound::DayRange, "1,010.50 - 1,025.25");
        assert_eq!(get(&out, DAY_LOW), CleanedValue::Number(1010.5));
        assert_eq!(get(&out, DAY_HIGH), CleanedValue::Number(1025.25));

        let out = expand(Compound::DayChange, "-0.25 (-2.40%)");
        assert_eq!(get(&out, DAY_CHANGE_USD), CleanedValue::Number(-0.25));
        assert!((get(&out, DAY_CHANGE_PCT).as_number().unwrap() + 0.024).abs() < 1e-12);

        let out = expand(Compound::Dividend, "$0.88/1.85%");
        assert_eq!(get(&out, DIVIDEND_USD), CleanedValue::Number(0.88));
        assert!((get(&out, DIVIDEND_PCT).as_number().unwrap() - 0.0185).abs() < 1e-12);
    }
}
