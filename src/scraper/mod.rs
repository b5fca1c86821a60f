pub mod extract;
pub mod http_client;
pub mod snapshot;

use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tokio::sync::Mutex;

pub use self::extract::{FragmentExtractor, HtmlExtractor};
pub use self::http_client::HttpNavigator;
pub use self::snapshot::SnapshotNavigator;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum NavigationError {
    #[error("timed out waiting for {0}")]
    Timeout(String),
    #[error("element not found: {0}")]
    ElementNotFound(String),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("login failed: {0}")]
    Login(String),
}

/// Anything that makes one attempt at a section fail. Always retryable.
#[derive(Debug, Error)]
pub enum SectionError {
    #[error(transparent)]
    Navigation(#[from] NavigationError),
    #[error("unexpected markup: {0}")]
    Markup(String),
}

// ── Credentials & session ─────────────────────────────────────────────────────

/// Keys file: `{ "user": "...", "pass": "..." }`.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub user: String,
    pub pass: String,
}

impl Credentials {
    pub fn from_json(text: &str) -> Result<Self, NavigationError> {
        serde_json::from_str(text).map_err(|e| NavigationError::Login(format!("bad keys file: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self, NavigationError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("pass", &"***")
            .finish()
    }
}

/// One logged-in browsing session. Holds the markup of the page the
/// navigator last moved to.
#[derive(Debug, Default)]
pub struct Session {
    pub user: String,
    page: Mutex<Option<String>>,
}

impl Session {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            page: Mutex::new(None),
        }
    }

    pub async fn set_page(&self, markup: String) {
        *self.page.lock().await = Some(markup);
    }

    pub async fn page(&self) -> Option<String> {
        self.page.lock().await.clone()
    }
}

// ── Page sections ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSection {
    Summary,
    Earnings,
    FundamentalsOverview,
    BalanceSheet,
    IncomeStatement,
    CashFlow,
    Valuation(String),
    AnalystReports,
}

impl PageSection {
    /// Report sub-page by its display name.
    pub fn report(name: &str) -> Option<Self> {
        match name {
            "Balance Sheet" => Some(PageSection::BalanceSheet),
            "Income Statement" => Some(PageSection::IncomeStatement),
            "Cash Flow" => Some(PageSection::CashFlow),
            _ => None,
        }
    }

    /// Lower-case, underscore-separated name, used for file names and URL paths.
    pub fn slug(&self) -> String {
        match self {
            PageSection::Summary => "summary".into(),
            PageSection::Earnings => "earnings".into(),
            PageSection::FundamentalsOverview => "fundamentals".into(),
            PageSection::BalanceSheet => "balance_sheet".into(),
            PageSection::IncomeStatement => "income_statement".into(),
            PageSection::CashFlow => "cash_flow".into(),
            PageSection::Valuation(tab) => format!(
                "valuation_{}",
                tab.trim().to_lowercase().replace(' ', "_")
            ),
            PageSection::AnalystReports => "analysts".into(),
        }
    }
}

impl fmt::Display for PageSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.slug())
    }
}

// ── Navigator trait ───────────────────────────────────────────────────────────

/// Moves a logged-in session between the research pages of one ticker.
#[async_trait]
pub trait PageNavigator: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<Session, NavigationError>;

    async fn goto_section(
        &self,
        session: &Session,
        ticker: &str,
        section: PageSection,
    ) -> Result<(), NavigationError>;

    async fn current_markup(&self, session: &Session) -> Result<String, NavigationError> {
        session
            .page()
            .await
            .ok_or_else(|| NavigationError::ElementNotFound("no page loaded".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_json() {
        let c = Credentials::from_json(r#"{"user": "me", "pass": "secret"}"#).unwrap();
        assert_eq!(c.user, "me");
        assert!(!format!("{:?}", c).contains("secret"));
        assert!(Credentials::from_json("{}").is_err());
    }

    #[test]
    fn test_section_slugs() {
        assert_eq!(PageSection::Valuation("Growth rates".into()).slug(), "valuation_growth_rates");
        assert_eq!(PageSection::report("Cash Flow"), Some(PageSection::CashFlow));
        assert_eq!(PageSection::report("Other"), None);
    }

    #[tokio::test]
    async fn test_session_without_page() {
        let nav = SnapshotNavigator::new("does-not-exist");
        let session = Session::new("me");
        assert!(nav.current_markup(&session).await.is_err());
        session.set_page("<html></html>".into()).await;
        assert_eq!(nav.current_markup(&session).await.unwrap(), "<html></html>");
    }
}
