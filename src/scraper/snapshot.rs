use super::{Credentials, NavigationError, PageNavigator, PageSection, Session};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

/// Replays saved pages from `<dir>/<TICKER>/<section>.html`.
pub struct SnapshotNavigator {
    dir: PathBuf,
}

impl SnapshotNavigator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn page_path(&self, ticker: &str, section: &PageSection) -> PathBuf {
        self.dir
            .join(ticker.to_uppercase())
            .join(format!("{}.html", section.slug()))
    }
}

#[async_trait]
impl PageNavigator for SnapshotNavigator {
    async fn login(&self, credentials: &Credentials) -> Result<Session, NavigationError> {
        if !self.dir.is_dir() {
            return Err(NavigationError::Login(format!(
                "snapshot directory {} not found",
                self.dir.display()
            )));
        }
        Ok(Session::new(credentials.user.clone()))
    }

    async fn goto_section(
        &self,
        session: &Session,
        ticker: &str,
        section: PageSection,
    ) -> Result<(), NavigationError> {
        let path = self.page_path(ticker, &section);
        debug!("Loading snapshot {}", path.display());
        if !path.is_file() {
            return Err(NavigationError::ElementNotFound(path.display().to_string()));
        }
        let markup = tokio::fs::read_to_string(&path).await?;
        session.set_page(markup).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials {
            user: "me".into(),
            pass: "x".into(),
        }
    }

    #[tokio::test]
    async fn test_replays_saved_page() {
        let dir = std::env::temp_dir().join(format!("tds_snapshot_{}", std::process::id()));
        std::fs::create_dir_all(dir.join("AAPL")).unwrap();
        std::fs::write(dir.join("AAPL").join("summary.html"), "<dl></dl>").unwrap();

        let nav = SnapshotNavigator::new(&dir);
        let session = nav.login(&creds()).await.unwrap();
        nav.goto_section(&session, "aapl", PageSection::Summary).await.unwrap();
        assert_eq!(nav.current_markup(&session).await.unwrap(), "<dl></dl>");

        let missing = nav.goto_section(&session, "AAPL", PageSection::Earnings).await;
        assert!(matches!(missing, Err(NavigationError::ElementNotFound(_))));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_login_needs_directory() {
        let nav = SnapshotNavigator::new("/definitely/not/here");
        assert!(matches!(nav.login(&creds()).await, Err(NavigationError::Login(_))));
    }
}
