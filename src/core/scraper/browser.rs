//! Chrome/Chromium process management for the session scraper.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::{Child, Command};

use crate::error::{RelayError, Result};

const PROBE_ATTEMPTS: u32 = 50;
const PROBE_DELAY: Duration = Duration::from_millis(200);

/// `/json/version` and `/json/new` response subset.
#[derive(Debug, Deserialize)]
pub struct DebuggerTarget {
    #[serde(rename = "webSocketDebuggerUrl")]
    pub web_socket_debugger_url: String,
    #[serde(rename = "Browser", default)]
    pub browser: Option<String>,
}

/// Locate a Chromium-family browser.
///
/// A configured path is used only if it exists. Without one, well-known
/// executable names are resolved on `PATH`.
#[must_use]
pub fn find_executable(configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured {
        return path.exists().then(|| path.to_path_buf());
    }

    let candidates: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
    } else {
        &[
            "google-chrome-stable",
            "google-chrome",
            "chromium-browser",
            "chromium",
            "/snap/bin/chromium",
        ]
    };

    candidates.iter().find_map(|candidate| {
        if candidate.starts_with('/') {
            let path = Path::new(candidate);
            path.exists().then(|| path.to_path_buf())
        } else {
            which::which(candidate).ok()
        }
    })
}

/// A launched browser with remote debugging enabled.
///
/// Dropping the handle kills the process and removes its profile directory.
pub struct BrowserProcess {
    child: Child,
    port: u16,
    profile_dir: PathBuf,
    http: reqwest::Client,
}

impl BrowserProcess {
    /// Launch `executable` and wait until its debugging endpoint answers.
    ///
    /// # Errors
    /// [`RelayError::Automation`] if the process cannot start, exits early,
    /// or never exposes the endpoint.
    pub async fn launch(executable: &Path, port: u16, headless: bool) -> Result<Self> {
        let profile_dir =
            std::env::temp_dir().join(format!("imgrelay-profile-{}", uuid::Uuid::new_v4().simple()));
        std::fs::create_dir_all(&profile_dir)
            .map_err(|e| RelayError::Automation(format!("create browser profile: {e}")))?;

        let mut args = vec![
            format!("--remote-debugging-port={port}"),
            format!("--user-data-dir={}", profile_dir.display()),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
        ];
        if headless {
            args.push("--headless=new".to_string());
        }

        tracing::debug!(executable = %executable.display(), port, headless, "Launching browser");
        let child = Command::new(executable)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                let _ = std::fs::remove_dir_all(&profile_dir);
                RelayError::Automation(format!(
                    "failed to launch browser at {}: {e}",
                    executable.display()
                ))
            })?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(500))
            .build()
            .map_err(|e| RelayError::Automation(format!("failed to create HTTP client: {e}")))?;

        let mut process = Self {
            child,
            port,
            profile_dir,
            http,
        };
        process.wait_until_ready().await?;
        Ok(process)
    }

    async fn wait_until_ready(&mut self) -> Result<()> {
        let mut last_error = "endpoint not reachable".to_string();
        for _ in 0..PROBE_ATTEMPTS {
            tokio::time::sleep(PROBE_DELAY).await;

            if let Ok(Some(status)) = self.child.try_wait() {
                return Err(RelayError::Automation(format!(
                    "browser exited before the debugging endpoint came up ({status})"
                )));
            }

            match self.version().await {
                Ok(info) => {
                    tracing::debug!(
                        browser = info.browser.as_deref().unwrap_or("unknown"),
                        port = self.port,
                        "Browser debugging endpoint ready"
                    );
                    return Ok(());
                }
                Err(e) => last_error = e.to_string(),
            }
        }

        Err(RelayError::Automation(format!(
            "debugging endpoint not available on port {}: {last_error}",
            self.port
        )))
    }

    async fn version(&self) -> Result<DebuggerTarget> {
        let url = format!("http://127.0.0.1:{}/json/version", self.port);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| RelayError::Automation(e.to_string()))?;
        if !response.status().is_success() {
            return Err(RelayError::Automation(format!(
                "unexpected status {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| RelayError::Automation(format!("invalid /json/version response: {e}")))
    }

    /// Open a blank page target and return its websocket URL.
    ///
    /// # Errors
    /// [`RelayError::Automation`] if the browser refuses or answers garbage.
    pub async fn open_page(&self) -> Result<String> {
        let url = format!("http://127.0.0.1:{}/json/new?about:blank", self.port);
        let response = self
            .http
            .put(&url)
            .send()
            .await
            .map_err(|e| RelayError::Automation(format!("open page target: {e}")))?;
        if !response.status().is_success() {
            return Err(RelayError::Automation(format!(
                "open page target: unexpected status {}",
                response.status()
            )));
        }
        let target: DebuggerTarget = response
            .json()
            .await
            .map_err(|e| RelayError::Automation(format!("invalid /json/new response: {e}")))?;
        Ok(target.web_socket_debugger_url)
    }
}

impl Drop for BrowserProcess {
    fn drop(&mut self) {
        if let Err(e) = self.child.start_kill() {
            tracing::debug!(error = %e, "Browser already gone");
        }
        let _ = std::fs::remove_dir_all(&self.profile_dir);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_path_must_exist() {
        assert!(find_executable(Some(Path::new("/nonexistent/chrome"))).is_none());

        let dir = tempfile::TempDir::new().unwrap();
        let fake = dir.path().join("chrome");
        std::fs::write(&fake, b"").unwrap();
        assert_eq!(find_executable(Some(&fake)), Some(fake));
    }

    #[test]
    fn debugger_target_parses_version_payload() {
        let raw = r#"{"Browser":"Chrome/126.0","webSocketDebuggerUrl":"ws://127.0.0.1:9222/devtools/browser/x"}"#;
        let target: DebuggerTarget = serde_json::from_str(raw).unwrap();
        assert_eq!(target.browser.as_deref(), Some("Chrome/126.0"));
        assert!(target.web_socket_debugger_url.starts_with("ws://"));
    }

    #[tokio::test]
    async fn launching_missing_binary_is_automation_error() {
        let result = BrowserProcess::launch(Path::new("/nonexistent/chrome"), 9, true).await;
        assert!(matches!(result, Err(RelayError::Automation(_))));
    }
}
