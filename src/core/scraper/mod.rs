//! Obtains a fresh session token by logging in through a real browser.
//!
//! The browser is driven over the DevTools protocol: log in with the
//! configured account, then scan the page heap for a string carrying the
//! session token prefix.

pub mod browser;
pub mod cdp;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::models::Credential;
use crate::error::{RelayError, Result};

use self::browser::{BrowserProcess, find_executable};
use self::cdp::CdpSession;

pub const DEFAULT_LOGIN_URL: &str = "https://labs.openai.com/auth/login";
pub const DEFAULT_TOKEN_PREFIX: &str = "sess-";

const USERNAME_SELECTOR: &str = "#username";
const PASSWORD_SELECTOR: &str = "#password";
const SUBMIT_SELECTOR: &str = r#"button[type="submit"]"#;
const SUBMIT_PAUSE: Duration = Duration::from_secs(1);

/// Source of fresh credentials.
#[async_trait]
pub trait SessionScraper: Send + Sync {
    /// Produce a newly issued credential.
    async fn scrape(&self) -> Result<Credential>;
}

/// Tunables for [`BrowserScraper`].
#[derive(Debug, Clone)]
pub struct ScraperSettings {
    pub login_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Explicit browser executable; discovered on `PATH` when unset.
    pub browser_path: Option<PathBuf>,
    pub debugging_port: u16,
    pub headless: bool,
    pub token_prefix: String,
    /// Delay between heap scans.
    pub poll_interval: Duration,
    /// Budget for the whole scrape, login included.
    pub timeout: Duration,
}

impl Default for ScraperSettings {
    fn default() -> Self {
        Self {
            login_url: DEFAULT_LOGIN_URL.to_string(),
            username: None,
            password: None,
            browser_path: None,
            debugging_port: 9222,
            headless: true,
            token_prefix: DEFAULT_TOKEN_PREFIX.to_string(),
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(120),
        }
    }
}

/// [`SessionScraper`] backed by a local Chrome/Chromium.
pub struct BrowserScraper {
    settings: ScraperSettings,
}

impl BrowserScraper {
    #[must_use]
    pub const fn new(settings: ScraperSettings) -> Self {
        Self { settings }
    }

    fn account(&self) -> Result<(&str, &str)> {
        let username = self
            .settings
            .username
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| RelayError::Config("scraper username is not configured".to_string()))?;
        let password = self
            .settings
            .password
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| RelayError::Config("scraper password is not configured".to_string()))?;
        Ok((username, password))
    }

    async fn run(&self, username: &str, password: &str) -> Result<String> {
        let executable = find_executable(self.settings.browser_path.as_deref()).ok_or_else(|| {
            RelayError::Automation("no Chrome/Chromium executable found".to_string())
        })?;
        let browser =
            BrowserProcess::launch(&executable, self.settings.debugging_port, self.settings.headless)
                .await?;
        let ws_url = browser.open_page().await?;
        let mut page = CdpSession::connect(&ws_url).await?;

        page.call("Page.enable", serde_json::json!({})).await?;
        page.navigate("about:blank").await?;
        page.navigate(&self.settings.login_url).await?;

        submit_field(&mut page, USERNAME_SELECTOR, username).await?;
        submit_field(&mut page, PASSWORD_SELECTOR, password).await?;
        tracing::debug!("Login submitted, scanning for session token");

        loop {
            let found = page.harvest_strings(&self.settings.token_prefix).await?;
            if let Some(token) = found.into_iter().next() {
                return Ok(token);
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }
}

/// Fill one login step and press submit.
async fn submit_field(page: &mut CdpSession, selector: &str, value: &str) -> Result<()> {
    page.wait_for_selector(selector).await?;
    page.type_into(selector, value).await?;
    page.wait_for_selector(SUBMIT_SELECTOR).await?;
    tokio::time::sleep(SUBMIT_PAUSE).await;
    page.click(SUBMIT_SELECTOR).await
}

#[async_trait]
impl SessionScraper for BrowserScraper {
    async fn scrape(&self) -> Result<Credential> {
        let (username, password) = self.account()?;
        tracing::info!(login_url = %self.settings.login_url, "Scraping a fresh session token");

        let token = tokio::time::timeout(self.settings.timeout, self.run(username, password))
            .await
            .map_err(|_| RelayError::ScrapeTimeout {
                seconds: self.settings.timeout.as_secs(),
            })??;

        let credential = Credential::new(token);
        tracing::info!(fingerprint = %credential.fingerprint(), "Session token harvested");
        Ok(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_account_is_config_error() {
        let scraper = BrowserScraper::new(ScraperSettings::default());
        let err = scraper.scrape().await.unwrap_err();
        assert!(matches!(err, RelayError::Config(_)), "{err:?}");
    }

    #[tokio::test]
    async fn empty_password_is_config_error() {
        let scraper = BrowserScraper::new(ScraperSettings {
            username: Some("user@example.com".to_string()),
            password: Some(String::new()),
            ..ScraperSettings::default()
        });
        assert!(matches!(scraper.scrape().await, Err(RelayError::Config(_))));
    }

    #[tokio::test]
    async fn missing_browser_is_automation_error() {
        let scraper = BrowserScraper::new(ScraperSettings {
            username: Some("user".to_string()),
            password: Some("pass".to_string()),
            browser_path: Some(PathBuf::from("/nonexistent/chromium")),
            ..ScraperSettings::default()
        });
        assert!(matches!(
            scraper.scrape().await,
            Err(RelayError::Automation(_))
        ));
    }
}
