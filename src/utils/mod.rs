use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::info;

/// A simple wall-clock timer for logging elapsed time.
pub struct Timer {
    label: String,
    start: Instant,
}

impl Timer {
    pub fn start(label: impl Into<String>) -> Self {
        let label = label.into();
        info!("⏱  Starting: {}", label);
        Self {
            label,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        info!(
            "⏱  Finished: {} (took {:.2?})",
            self.label,
            self.start.elapsed()
        );
    }
}

/// Directory name of one watchlist database, e.g. `tech_10-28-2021`.
pub fn run_dir_name(name: &str, date: NaiveDate) -> String {
    format!("{}_{}", name, date.format("%m-%d-%Y"))
}

/// Tickers from a comma or whitespace separated list, uppercased, first
/// occurrence kept.
pub fn parse_ticker_list(list: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for t in list.split(|c: char| c == ',' || c.is_whitespace()) {
        let t = t.trim().to_uppercase();
        if !t.is_empty() && !out.contains(&t) {
            out.push(t);
        }
    }
    out
}

/// One ticker list per file; `#` starts a comment.
pub fn read_tickers_file(path: &Path) -> Result<Vec<String>> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("Could not read ticker file {:?}", path))?;
    let stripped: Vec<&str> = body
        .lines()
        .map(|l| l.split('#').next().unwrap_or_default())
        .collect();
    Ok(parse_ticker_list(&stripped.join("\n")))
}
