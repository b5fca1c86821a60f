pub mod cleaner;
pub mod fields;

pub use self::cleaner::{clean, clean_date, clean_rating, clean_text, clean_token, is_sentinel};
pub use self::fields::{normalize, Compound, Rule};
