//! Section assemblers: raw fragments of one page section → normalized table.

pub mod analysts;
pub mod earnings;
pub mod fundamentals;
pub mod summary;
pub mod valuation;

pub use self::analysts::assemble_analysts;
pub use self::earnings::{assemble_earnings, EarningsTables};
pub use self::fundamentals::{assemble_fundamentals, FundamentalsTables};
pub use self::summary::assemble_summary;
pub use self::valuation::{assemble_valuation, VALUATION_TABS};

/// First run of four digits: "2021" → 2021, "FY 2021" → 2021.
pub fn parse_year(s: &str) -> Option<i32> {
    let bytes = s.as_bytes();
    (0..bytes.len().saturating_sub(3))
        .find(|&i| {
            bytes[i..i + 4].iter().all(u8::is_ascii_digit)
                && (i == 0 || !bytes[i - 1].is_ascii_digit())
                && bytes.get(i + 4).is_none_or(|b| !b.is_ascii_digit())
        })
        .and_then(|i| s[i..i + 4].parse().ok())
}
