//! Analyst ratings. Every research provider encodes its rating in the CSS
//! classes of the row's `div`s, each in its own way, so the decoding is a
//! strategy chosen by provider identifier.

use crate::models::{CleanedValue, RawAnalystRow, Section, SectionTable};
use crate::normalize::{clean_date, clean_rating};
use tracing::{debug, warn};

pub const RATING_SINCE: &str = "Rating Since";
const RATING_SINCE_PREFIX: &str = "Rating Since ";

pub const MARKET_EDGE: &str = "marketEdge";
pub const CFRA: &str = "cfra";
pub const VICKERS: &str = "vickers";

/// A decoded provider row: (row name, rating).
pub type Rating = (String, CleanedValue);

pub trait RatingStrategy: Send + Sync {
    /// Rows to emit for this provider, in order. Empty means skip.
    fn ratings(&self, provider: &str, row: &RawAnalystRow) -> Vec<Rating>;
}

/// Rating is the second class of the third div, as an integer when it is one.
struct StandardRating;

impl RatingStrategy for StandardRating {
    fn ratings(&self, provider: &str, row: &RawAnalystRow) -> Vec<Rating> {
        let rating = row
            .class_token(2, 1)
            .map(clean_rating)
            .unwrap_or_default();
        vec![(provider.to_string(), rating)]
    }
}

/// Only an integer rating in the last character of the class token is kept.
struct CfraRating;

impl RatingStrategy for CfraRating {
    fn ratings(&self, provider: &str, row: &RawAnalystRow) -> Vec<Rating> {
        let rating = row
            .class_token(2, 1)
            .and_then(|c| c.trim().chars().last())
            .and_then(|c| c.to_digit(10))
            .map(|d| CleanedValue::Number(d as f64))
            .unwrap_or_default();
        vec![(provider.to_string(), rating)]
    }
}

/// An opinion row from the third div, then a score scanned out of the
/// fourth div's class token.
struct MarketEdgeRating;

impl MarketEdgeRating {
    /// Scans right to left for the first digit. The value is negated unless
    /// that digit is the token's last character.
    // FIXME: "3x" decodes to -3 while "neg3" decodes to 3. Existing databases
    // were built with this rule, so it stays until they are rebuilt.
    fn scan(token: &str) -> CleanedValue {
        let token = token.trim();
        token
            .chars()
            .rev()
            .enumerate()
            .find_map(|(i, c)| c.to_digit(10).map(|d| (i, d as f64)))
            .map(|(i, d)| CleanedValue::Number(if i == 0 { d } else { -d }))
            .unwrap_or_default()
    }
}

impl RatingStrategy for MarketEdgeRating {
    fn ratings(&self, provider: &str, row: &RawAnalystRow) -> Vec<Rating> {
        let opinion = row
            .class_token(2, 2)
            .map(clean_rating)
            .unwrap_or_default();
        let score = row.class_token(3, 1).map(Self::scan).unwrap_or_default();
        vec![(format!("{} opinion", provider), opinion), (provider.to_string(), score)]
    }
}

struct Skip;

impl RatingStrategy for Skip {
    fn ratings(&self, _provider: &str, _row: &RawAnalystRow) -> Vec<Rating> {
        Vec::new()
    }
}

pub fn strategy_for(provider: &str) -> &'static dyn RatingStrategy {
    match provider {
        VICKERS => &Skip,
        MARKET_EDGE => &MarketEdgeRating,
        CFRA => &CfraRating,
        _ => &StandardRating,
    }
}

/// One row per provider, with the rating date in the `Rating Since` column.
pub fn assemble_analysts(rows: &[RawAnalystRow]) -> SectionTable {
    let mut table = SectionTable::new(Section::Analyst);

    for row in rows {
        let Some(provider) = row.provider() else {
            warn!("analysts: row without a provider class, skipped");
            continue;
        };
        let since = row
            .rating_since
            .as_deref()
            .map(|t| clean_date(t.trim().trim_start_matches(RATING_SINCE_PREFIX)))
            .unwrap_or_default();

        // A provider listed twice keeps its last row.
        for (name, rating) in strategy_for(provider).ratings(provider, row) {
            if table.values.contains(&name) {
                debug!("analysts: duplicate provider row {:?}, later row kept", name);
            }
            table.values.set(name.clone(), rating);
            table.extra_mut(RATING_SINCE).set(name, since.clone());
        }
    }
    table
}
