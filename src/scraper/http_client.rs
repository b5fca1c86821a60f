use super::{Credentials, NavigationError, PageNavigator, PageSection, Session};
use crate::config::{NavigatorConfig, PageSpeed};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;

/// Navigates the live research site. The session cookie lives in the
/// client's cookie store, so one navigator serves one login.
pub struct HttpNavigator {
    inner: reqwest::Client,
    base_url: Url,
    login_path: String,
    jitter_ms: u64,
    settle: Duration,
}

impl HttpNavigator {
    pub fn new(config: &NavigatorConfig, speed: PageSpeed) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .with_context(|| format!("Invalid navigator base URL {:?}", config.base_url))?;

        Ok(Self {
            inner,
            base_url,
            login_path: config.login_path.clone(),
            jitter_ms: config.jitter_ms,
            settle: speed.delay(),
        })
    }

    /// e.g. AAPL + Valuation("Growth rates") → `<base>/valuation?symbol=AAPL&tab=Growth+rates`
    pub fn section_url(&self, ticker: &str, section: &PageSection) -> Result<Url, NavigationError> {
        let path = match section {
            PageSection::Valuation(_) => "valuation".to_string(),
            other => other.slug().replace('_', "-"),
        };
        let mut url = self
            .base_url
            .join(&path)
            .map_err(|e| NavigationError::ElementNotFound(format!("{}: {}", path, e)))?;
        url.query_pairs_mut()
            .append_pair("symbol", &ticker.to_uppercase());
        if let PageSection::Valuation(tab) = section {
            url.query_pairs_mut().append_pair("tab", tab);
        }
        Ok(url)
    }

    /// Sleep for the page-speed settle time + random jitter.
    async fn polite_delay(&self) {
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::random::<u64>() % (self.jitter_ms + 1)
        };
        sleep(self.settle + Duration::from_millis(jitter)).await;
    }

    async fn fetch(&self, url: Url) -> Result<String, NavigationError> {
        debug!("GET {}", url);
        let resp = self
            .inner
            .get(url.clone())
            .send()
            .await
            .map_err(|e| request_error(e, &url))?;

        let status = resp.status();
        if !status.is_success() {
            warn!("HTTP {} for {}", status, url);
            return Err(NavigationError::ElementNotFound(format!("HTTP {} for {}", status, url)));
        }
        resp.text().await.map_err(|e| request_error(e, &url))
    }
}

fn request_error(e: reqwest::Error, url: &Url) -> NavigationError {
    if e.is_timeout() {
        NavigationError::Timeout(url.to_string())
    } else {
        NavigationError::Http(e)
    }
}

#[async_trait]
impl PageNavigator for HttpNavigator {
    async fn login(&self, credentials: &Credentials) -> Result<Session, NavigationError> {
        let url = self
            .base_url
            .join(&self.login_path)
            .map_err(|e| NavigationError::Login(format!("login URL: {}", e)))?;

        info!("Logging in as {}", credentials.user);
        let resp = self
            .inner
            .post(url.clone())
            .form(&[("user", credentials.user.as_str()), ("pass", credentials.pass.as_str())])
            .send()
            .await
            .map_err(|e| request_error(e, &url))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(NavigationError::Login(format!("HTTP {} from {}", status, url)));
        }
        Ok(Session::new(credentials.user.clone()))
    }

    async fn goto_section(
        &self,
        session: &Session,
        ticker: &str,
        section: PageSection,
    ) -> Result<(), NavigationError> {
        self.polite_delay().await;
        let url = self.section_url(ticker, &section)?;
        let markup = self.fetch(url).await?;
        session.set_page(markup).await;
        Ok(())
    }
}
