use crate::models::{CleanedValue, RawSummary, Section, SectionTable};
use crate::normalize::fields::{self, Compound, NO_DIVIDEND};
use crate::normalize::is_sentinel;
use tracing::debug;

const VOLUME: &str = "Volume";
const BID_ASK: &str = "B/A Size";
const DAY_RANGE: &str = "Day's Range";
const DAY_CHANGE: &str = "Day's Change";
const DIVIDEND: &str = "Annual Dividend/Yield";
const YEAR_RANGE: &str = "52-Wk Range";
const DIVIDEND_DATES: [&str; 2] = ["Ex-dividend", "Dividend Pay Date"];

/// Column holding the label's auxiliary text when full tables are kept.
pub const DESCRIPTION: &str = "Description";

struct Entry<'a> {
    raw_label: &'a str,
    value: String,
    description: String,
}

/// Build the summary table from the page's `dt`/`dd` pairs.
///
/// With `full_tables`, the compound source rows (day range, dividend/yield,
/// ...) and the description column are kept; otherwise only the derived
/// fields remain.
pub fn assemble_summary(raw: &RawSummary, full_tables: bool) -> SectionTable {
    let mut entries: Vec<Entry> = raw
        .fragments
        .iter()
        .map(|f| {
            let raw_label = f.label.trim();
            // "Volume" prints its past-day figure under the label; the 52-week
            // range is spread over the label's trailing text nodes.
            let value = match raw_label {
                VOLUME => f.aux.first().cloned().unwrap_or_else(|| f.value.clone()),
                YEAR_RANGE if !f.aux.is_empty() => f.aux.join(" "),
                _ => f.value.clone(),
            };
            Entry {
                raw_label,
                value,
                description: f.aux.join(" "),
            }
        })
        .collect();

    entries.sort_by_key(|e| fields::precedence(Section::Summary, e.raw_label));

    let mut table = SectionTable::new(Section::Summary);
    for e in &entries {
        let (name, value) = fields::normalize(Section::Summary, e.raw_label, &e.value);
        if table.values.insert(name.clone(), value) {
            if full_tables {
                table
                    .extra_mut(DESCRIPTION)
                    .insert(name, CleanedValue::Text(e.description.clone()));
            }
        } else {
            debug!("summary: {:?} collides with an earlier label for {:?}", e.raw_label, name);
        }
    }

    let raw_of = |label: &str| {
        entries
            .iter()
            .find(|e| e.raw_label == label)
            .map(|e| e.value.as_str())
    };

    let mut derived = Vec::new();

    derived.extend(match raw_of(BID_ASK) {
        Some(v) => fields::expand(Compound::BidAsk, v),
        None => fields::missing(Compound::BidAsk),
    });

    match raw_of(DAY_RANGE) {
        Some(range) if !is_sentinel(range) => {
            derived.extend(fields::expand(Compound::DayChange, raw_of(DAY_CHANGE).unwrap_or("")));
            derived.extend(fields::expand(Compound::DayRange, range));
        }
        _ => {
            derived.extend(fields::missing(Compound::DayChange));
            derived.extend(fields::missing(Compound::DayRange));
        }
    }

    let dividend_given = raw_of(DIVIDEND)
        .map(|v| v.trim() != NO_DIVIDEND && !is_sentinel(v))
        .unwrap_or(false);
    derived.extend(match raw_of(DIVIDEND) {
        Some(v) if dividend_given => fields::expand(Compound::Dividend, v),
        _ => fields::missing(Compound::Dividend),
    });

    if let Some(v) = raw_of(YEAR_RANGE) {
        derived.extend(fields::expand(Compound::YearRange, v));
    }

    for (name, value) in derived {
        table.values.set(name, value);
    }

    if !dividend_given {
        for name in DIVIDEND_DATES {
            if table.values.contains(name) {
                table.values.set(name, CleanedValue::Missing);
            }
        }
    }

    if !full_tables {
        for e in &entries {
            if let Some(f) = fields::lookup(Section::Summary, e.raw_label).filter(|f| f.source_only) {
                table.values.remove(f.canonical);
            }
        }
    }

    table.values.sort_by_name();
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawFragment;
    use crate::normalize::fields::{
        ASK_SIZE, BA_RATIO, BID_SIZE, DAY_HIGH, DAY_LOW, DIVIDEND_USD, NEW_CONSTRUCTS_SCORE,
    };

    fn summary(fragments: Vec<RawFragment>) -> RawSummary {
        RawSummary { fragments }
    }

    fn page() -> Vec<RawFragment> {
        vec![
            RawFragment::new("Closing Price", "$150.25"),
            RawFragment::new("Volume", "").with_aux(vec!["12,345,678".into()]),
            RawFragment::new("Volume:", "9.8K"),
            RawFragment::new("B/A Size", "3.2x1.1"),
            RawFragment::new("Day's Range", "148.10-151.00"),
            RawFragment::new("Day's Change", "+1.25 (+0.84%)"),
            RawFragment::new("Annual Dividend/Yield", "$0.88/0.59%"),
            RawFragment::new("Ex-dividend Date", "11/05/2021"),
            RawFragment::new("% Held by Institutions", "58.3"),
            RawFragment::new("Shares Outstanding", "16.4B"),
            RawFragment::new("Score:", "Attractive"),
        ]
    }

    #[test]
    fn test_summary_fields() {
        let t = assemble_summary(&summary(page()), false);
        let v = &t.values;
        assert_eq!(v.value("Closing Price"), CleanedValue::Number(150.25));
        assert_eq!(v.value("Volume Past Day"), CleanedValue::Number(12_345_678.0));
        assert_eq!(v.value("Volume 10-day Avg"), CleanedValue::Number(9800.0));
        assert_eq!(v.value(BID_SIZE), CleanedValue::Number(3.2));
        assert_eq!(v.value(ASK_SIZE), CleanedValue::Number(1.1));
        assert!((v.number(BA_RATIO).unwrap() - 2.909_09).abs() < 1e-4);
        assert_eq!(v.value(DAY_LOW), CleanedValue::Number(148.1));
        assert_eq!(v.value(DAY_HIGH), CleanedValue::Number(151.0));
        assert_eq!(v.value(DIVIDEND_USD), CleanedValue::Number(0.88));
        assert!(v.value("Ex-dividend").as_date().is_some());
        assert_eq!(v.value("Shares Outstanding"), CleanedValue::Text("16.4B".into()));

        // compound sources are dropped outside full-table mode
        assert!(!v.contains("Day's Range"));
        assert!(!v.contains("Annual Dividend/Yield"));
        assert!(!v.contains(NEW_CONSTRUCTS_SCORE));
        assert!(!v.contains("Score:"));
        assert!(t.extra(DESCRIPTION).is_none());
    }

    #[test]
    fn test_placeholder_bid_ask_and_range() {
        let t = assemble_summary(
            &summary(vec![
                RawFragment::new("B/A Size", "--"),
                RawFragment::new("Day's Range", "--"),
                RawFragment::new("Day's Change", "+1.25 (+0.84%)"),
            ]),
            false,
        );
        for name in [BID_SIZE, ASK_SIZE, BA_RATIO, DAY_LOW, DAY_HIGH, "Day Change $"] {
            assert!(t.values.value(name).is_missing(), "{name} should be missing");
            assert!(t.values.contains(name));
        }
    }

    #[test]
    fn test_no_dividend_blanks_dates() {
        let t = assemble_summary(
            &summary(vec![
                RawFragment::new("Annual Dividend/Yield", "No dividend"),
                RawFragment::new("Ex-dividend Date", "11/05/2021"),
            ]),
            false,
        );
        assert!(t.values.value(DIVIDEND_USD).is_missing());
        assert!(t.values.value("Ex-dividend").is_missing());
    }

    #[test]
    fn test_rename_precedence_is_fixed() {
        let frags = vec![
            RawFragment::new("Ex-dividend", "01/01/2020"),
            RawFragment::new("Ex-dividend Date", "11/05/2021"),
            RawFragment::new("Annual Dividend/Yield", "$0.88/0.59%"),
        ];
        let t = assemble_summary(&summary(frags), false);
        let d = t.values.value("Ex-dividend").as_date().unwrap();
        assert_eq!(d.to_string(), "2021-11-05");
    }

    #[test]
    fn test_full_tables_keep_sources() {
        let t = assemble_summary(&summary(page()), true);
        assert!(t.values.contains("Day's Range"));
        assert_eq!(t.values.value(NEW_CONSTRUCTS_SCORE), CleanedValue::Text("Attractive".into()));
        assert!(!t.values.contains("Score:"));
        assert!(t.extra(DESCRIPTION).is_some());
    }
}
