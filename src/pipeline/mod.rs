//! Watchlist orchestration: scrape → assemble → persist → combine.
//!
//! ## Run modes
//!
//! `WatchlistBuilder::build()`: walks a ticker list through one logged-in
//!   session. Each section runs under the retry policy; an exhausted section
//!   becomes an empty placeholder unless the error policy is `raise`.
//!   Tickers already in the store are skipped when `skip_finished` is set,
//!   which makes an interrupted run resumable.
//!
//! `rebuild()`: reads the stored `combined` tables back into a watchlist
//!   table without touching any page.

pub mod retry;

use crate::aggregate::{combine, WatchlistTable};
use crate::config::{ErrorPolicy, WatchlistConfig};
use crate::models::{CombinedRecord, RawFundamentals, Section, SectionTable};
use crate::scraper::{FragmentExtractor, PageNavigator, PageSection, SectionError, Session};
use crate::sections::fundamentals::REPORT_NAMES;
use crate::sections::{
    assemble_analysts, assemble_earnings, assemble_fundamentals, assemble_summary,
    assemble_valuation, EarningsTables, FundamentalsTables, VALUATION_TABS,
};
use crate::storage::{RecordStore, StoreError, TableName, Tabular};
use crate::utils::Timer;
use thiserror::Error;
use tracing::{error, info, warn};

pub use self::retry::{with_retries, RetryPolicy, SectionOutcome};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{ticker}: {section} section failed after every attempt: {last_error}")]
    SectionFailed {
        ticker: String,
        section: Section,
        last_error: String,
    },
    #[error("{0}: every section failed")]
    TickerFailed(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Everything scraped for one ticker.
#[derive(Debug, Clone)]
pub struct TickerTables {
    pub summary: SectionTable,
    pub earnings: EarningsTables,
    pub fundamentals: FundamentalsTables,
    pub valuation: SectionTable,
    pub analysts: SectionTable,
}

impl TickerTables {
    pub fn combined(&self, ticker: &str) -> CombinedRecord {
        combine(
            ticker,
            &[
                &self.summary,
                &self.earnings.summary,
                &self.fundamentals.summary,
                &self.valuation,
                &self.analysts,
            ],
        )
    }

    /// Every table of the ticker's directory, combined record last.
    pub fn tabulate(&self, ticker: &str, combined: &CombinedRecord) -> Vec<(TableName, Tabular)> {
        vec![
            (TableName::Summary, Tabular::from_section(ticker, &self.summary)),
            (TableName::Earnings, Tabular::from_section(ticker, &self.earnings.summary)),
            (TableName::EarningsYearly, Tabular::from_yearly(&self.earnings.yearly)),
            (TableName::Fundamentals, Tabular::from_section(ticker, &self.fundamentals.summary)),
            (TableName::FundamentalsYearly, Tabular::from_yearly(&self.fundamentals.yearly)),
            (TableName::Valuation, Tabular::from_section(ticker, &self.valuation)),
            (TableName::Analysts, Tabular::from_section(ticker, &self.analysts)),
            (TableName::Combined, Tabular::from_combined(combined)),
        ]
    }
}

#[derive(Debug, Default)]
pub struct BuildReport {
    pub table: WatchlistTable,
    /// Tickers whose every section failed; filled when `return_skipped` is set.
    pub skipped: Vec<String>,
    /// Tickers already in the store and not scraped again.
    pub finished: usize,
}

pub struct WatchlistBuilder<'a> {
    navigator: &'a dyn PageNavigator,
    extractor: &'a dyn FragmentExtractor,
    store: &'a dyn RecordStore,
    config: WatchlistConfig,
    policy: RetryPolicy,
}

impl<'a> WatchlistBuilder<'a> {
    pub fn new(
        navigator: &'a dyn PageNavigator,
        extractor: &'a dyn FragmentExtractor,
        store: &'a dyn RecordStore,
        config: WatchlistConfig,
    ) -> Self {
        let policy = RetryPolicy::from_config(&config);
        Self {
            navigator,
            extractor,
            store,
            config,
            policy,
        }
    }

    pub async fn build(&self, session: &Session, tickers: &[String]) -> Result<BuildReport, PipelineError> {
        let _t = Timer::start(format!("watchlist of {} tickers", tickers.len()));
        let mut report = BuildReport::default();

        for (i, ticker) in tickers.iter().enumerate() {
            let done = i + 1;

            if self.config.skip_finished && self.store.exists(ticker)? {
                info!("{}: already stored, skipping", ticker);
                report.finished += 1;
                continue;
            }

            let tables = match self.scrape_ticker(session, ticker).await {
                Ok(tables) => tables,
                Err(PipelineError::TickerFailed(t)) if self.config.error_policy == ErrorPolicy::Ignore => {
                    error!("Did not successfully scrape {}", t);
                    if self.config.return_skipped {
                        report.skipped.push(t);
                    }
                    continue;
                }
                Err(e) => return Err(e),
            };

            let combined = tables.combined(ticker);
            self.persist(ticker, &tables, &combined);
            report.table.append(combined);

            if done % 10 == 0 {
                info!("{} tickers scraped", done);
            }
        }

        if self.config.save_aggregate {
            self.store.write_aggregate(&Tabular::from_watchlist(&report.table))?;
        }

        info!(
            "=== Done: {} scraped | {} already stored | {} skipped ===",
            report.table.len(),
            report.finished,
            report.skipped.len()
        );
        Ok(report)
    }

    /// All five sections of one ticker, each under the retry policy.
    pub async fn scrape_ticker(&self, session: &Session, ticker: &str) -> Result<TickerTables, PipelineError> {
        let mut exhausted = 0usize;

        let outcome = with_retries(
            &self.policy,
            &format!("{} summary", ticker),
            || SectionTable::placeholder(Section::Summary),
            || self.summary(session, ticker),
        )
        .await;
        let summary = self.settle(ticker, Section::Summary, outcome, &mut exhausted)?;

        let outcome = with_retries(
            &self.policy,
            &format!("{} earnings", ticker),
            EarningsTables::placeholder,
            || self.earnings(session, ticker),
        )
        .await;
        let earnings = self.settle(ticker, Section::Earnings, outcome, &mut exhausted)?;

        let outcome = with_retries(
            &self.policy,
            &format!("{} fundamentals", ticker),
            FundamentalsTables::placeholder,
            || self.fundamentals(session, ticker),
        )
        .await;
        let fundamentals = self.settle(ticker, Section::Fundamentals, outcome, &mut exhausted)?;

        let outcome = with_retries(
            &self.policy,
            &format!("{} valuation", ticker),
            || SectionTable::placeholder(Section::Valuation),
            || self.valuation(session, ticker),
        )
        .await;
        let valuation = self.settle(ticker, Section::Valuation, outcome, &mut exhausted)?;

        let outcome = with_retries(
            &self.policy,
            &format!("{} analysts", ticker),
            || SectionTable::placeholder(Section::Analyst),
            || self.analysts(session, ticker),
        )
        .await;
        let analysts = self.settle(ticker, Section::Analyst, outcome, &mut exhausted)?;

        if exhausted == Section::PRECEDENCE.len() {
            return Err(PipelineError::TickerFailed(ticker.to_string()));
        }

        Ok(TickerTables {
            summary,
            earnings,
            fundamentals,
            valuation,
            analysts,
        })
    }

    fn settle<T>(
        &self,
        ticker: &str,
        section: Section,
        outcome: SectionOutcome<T>,
        exhausted: &mut usize,
    ) -> Result<T, PipelineError> {
        match outcome {
            SectionOutcome::Success(v) => Ok(v),
            SectionOutcome::Exhausted { placeholder, last_error } => {
                if self.config.error_policy == ErrorPolicy::Raise {
                    return Err(PipelineError::SectionFailed {
                        ticker: ticker.to_string(),
                        section,
                        last_error,
                    });
                }
                warn!("{}: {} section left empty ({})", ticker, section, last_error);
                *exhausted += 1;
                Ok(placeholder)
            }
        }
    }

    fn persist(&self, ticker: &str, tables: &TickerTables, combined: &CombinedRecord) {
        for (name, data) in tables.tabulate(ticker, combined) {
            if let Err(e) = self.store.write_table(ticker, name, &data) {
                warn!("No {} table for {}: {}", name, ticker, e);
            }
        }
    }

    // ── One attempt per section ───────────────────────────────────────────────

    async fn load(&self, session: &Session, ticker: &str, section: PageSection) -> Result<String, SectionError> {
        self.navigator.goto_section(session, ticker, section).await?;
        Ok(self.navigator.current_markup(session).await?)
    }

    async fn summary(&self, session: &Session, ticker: &str) -> Result<SectionTable, SectionError> {
        let markup = self.load(session, ticker, PageSection::Summary).await?;
        let raw = self.extractor.summary(&markup)?;
        Ok(assemble_summary(&raw, self.config.full_tables))
    }

    async fn earnings(&self, session: &Session, ticker: &str) -> Result<EarningsTables, SectionError> {
        let markup = self.load(session, ticker, PageSection::Earnings).await?;
        let raw = self.extractor.earnings(&markup)?;
        Ok(assemble_earnings(&raw))
    }

    async fn fundamentals(&self, session: &Session, ticker: &str) -> Result<FundamentalsTables, SectionError> {
        let markup = self.load(session, ticker, PageSection::FundamentalsOverview).await?;
        let overview = self.extractor.fundamentals_overview(&markup)?;

        let mut reports = Vec::with_capacity(REPORT_NAMES.len());
        for name in REPORT_NAMES {
            let page = PageSection::report(name)
                .ok_or_else(|| SectionError::Markup(format!("no page for report {:?}", name)))?;
            let markup = self.load(session, ticker, page).await?;
            reports.push(self.extractor.financial_report(&markup, name)?);
        }

        Ok(assemble_fundamentals(&RawFundamentals { overview, reports }))
    }

    async fn valuation(&self, session: &Session, ticker: &str) -> Result<SectionTable, SectionError> {
        let mut tabs = Vec::with_capacity(VALUATION_TABS.len());
        for tab in VALUATION_TABS {
            let markup = self
                .load(session, ticker, PageSection::Valuation(tab.to_string()))
                .await?;
            tabs.push(self.extractor.valuation_tab(&markup, tab)?);
        }
        Ok(assemble_valuation(ticker, &tabs))
    }

    async fn analysts(&self, session: &Session, ticker: &str) -> Result<SectionTable, SectionError> {
        let markup = self.load(session, ticker, PageSection::AnalystReports).await?;
        let rows = self.extractor.analysts(&markup)?;
        Ok(assemble_analysts(&rows))
    }
}

/// Watchlist table from previously stored `combined` tables. With no ticker
/// list, every ticker in the store is read.
pub fn rebuild(store: &dyn RecordStore, tickers: Option<&[String]>) -> Result<WatchlistTable, PipelineError> {
    let _t = Timer::start("watchlist rebuild");
    let tickers = match tickers {
        Some(t) => t.to_vec(),
        None => store.tickers()?,
    };

    let mut table = WatchlistTable::new();
    for ticker in &tickers {
        let record = store.read_table(ticker, TableName::Combined)?.into_combined()?;
        table.append(record);
    }
    info!("Rebuilt {} tickers × {} columns", table.len(), table.columns().count());
    Ok(table)
}
