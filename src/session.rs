//! Remote browser session handle.
//!
//! Wraps a CDP connection to an already-provisioned cloud browser (see
//! [`crate::steel`] for provisioning). One session is exclusively owned by
//! one login attempt; teardown is best-effort and swallows errors so it can
//! run on every exit path.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::network::{
    Cookie, CookieParam, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, CaptureScreenshotFormat,
};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use rand::seq::SliceRandom;

/// Script injected before any page JS runs, hiding the usual automation
/// signals (navigator.webdriver, headless hints) from the login pages.
const INIT_SCRIPT: &str = r#"
    Object.defineProperty(navigator, 'webdriver', {get: () => undefined});
    Object.defineProperty(navigator, 'plugins', {get: () => [1, 2, 3, 4, 5]});
    Object.defineProperty(navigator, 'languages', {get: () => ['zh-CN', 'zh', 'en']});
    window.chrome = {runtime: {}};

    Object.defineProperty(navigator, 'maxTouchPoints', {get: () => 1});
    Object.defineProperty(navigator, 'platform', {get: () => 'Win32'});
    Object.defineProperty(navigator, 'vendor', {get: () => 'Google Inc.'});
    Object.defineProperty(navigator, 'hardwareConcurrency', {get: () => 8});
    Object.defineProperty(navigator, 'deviceMemory', {get: () => 8});

    const originalQuery = window.navigator.permissions.query;
    window.navigator.permissions.query = (parameters) => (
        parameters.name === 'notifications' ?
            Promise.resolve({state: Notification.permission}) :
            originalQuery(parameters)
    );
"#;

/// Handle on a remote browser endpoint and its active page.
pub struct RemoteSession {
    browser: Browser,
    handler_task: tokio::task::JoinHandle<()>,
    page: Page,
    timeout: Duration,
    user_agent: String,
}

impl RemoteSession {
    /// Attach to a remote browser over CDP, adopt (or create) a page, apply
    /// the user-agent override and the anti-fingerprint init script.
    pub async fn connect(
        cdp_url: &str,
        user_agent: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let (mut browser, mut handler) = Browser::connect(cdp_url)
            .await
            .context("Failed to connect to remote browser over CDP")?;

        let handler_task = tokio::spawn(async move { while (handler.next().await).is_some() {} });

        // Pick up targets the remote browser already has open.
        let _ = browser.fetch_targets().await;
        let page = match browser.pages().await.ok().and_then(|p| p.into_iter().next()) {
            Some(page) => page,
            None => browser
                .new_page("about:blank")
                .await
                .context("Failed to open a page on the remote browser")?,
        };

        let user_agent = user_agent.unwrap_or_else(random_user_agent);
        page.set_user_agent(SetUserAgentOverrideParams::new(user_agent.clone()))
            .await
            .context("Failed to override user agent")?;

        // Register for future navigations, and run once in the current
        // context in case a document is already loaded.
        let _ = page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(INIT_SCRIPT))
            .await;
        let _ = page.evaluate(INIT_SCRIPT.to_string()).await;

        Ok(Self {
            browser,
            handler_task,
            page,
            timeout,
            user_agent,
        })
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Navigate and fail on timeout.
    pub async fn goto(&self, url: &str) -> Result<()> {
        tokio::time::timeout(self.timeout, self.page.goto(url))
            .await
            .with_context(|| format!("Navigation to {url} timed out"))?
            .with_context(|| format!("Navigation to {url} failed"))?;
        Ok(())
    }

    /// Navigate, tolerating a timeout. The destination may already be
    /// reachable even when the load event never fires.
    pub async fn goto_tolerant(&self, url: &str) -> Result<()> {
        match tokio::time::timeout(self.timeout, self.page.goto(url)).await {
            Ok(result) => {
                result.with_context(|| format!("Navigation to {url} failed"))?;
            }
            Err(_) => {
                tracing::warn!(%url, "page load timeout, continuing anyway");
            }
        }
        Ok(())
    }

    /// Current page URL, empty if the browser reports none.
    pub async fn current_url(&self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .context("Failed to read current URL")?;
        Ok(url.unwrap_or_default())
    }

    /// Reload the current page.
    pub async fn reload(&self) -> Result<()> {
        tokio::time::timeout(self.timeout, self.page.reload())
            .await
            .context("Page reload timed out")?
            .context("Page reload failed")?;
        Ok(())
    }

    /// Read the full cookie jar of the browsing context.
    pub async fn cookies(&self) -> Result<Vec<Cookie>> {
        self.page
            .get_cookies()
            .await
            .context("Failed to read cookies")
    }

    /// Install cookies on the browsing context.
    pub async fn set_cookies(&self, cookies: Vec<CookieParam>) -> Result<()> {
        self.page
            .set_cookies(cookies)
            .await
            .context("Failed to set cookies")?;
        Ok(())
    }

    /// Persist a diagnostic screenshot as `<dir>/<name>_<unix-ts>.png`.
    /// Best-effort: failures are logged, never propagated.
    pub async fn save_screenshot(&self, dir: &Path, name: &str) {
        if let Err(err) = self.try_save_screenshot(dir, name).await {
            tracing::warn!(name, error = %err, "failed to save diagnostic screenshot");
        }
    }

    async fn try_save_screenshot(&self, dir: &Path, name: &str) -> Result<()> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create screenshot dir: {}", dir.display()))?;

        let bytes = self
            .page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(false)
                    .build(),
            )
            .await
            .context("Screenshot capture failed")?;

        let path = dir.join(screenshot_file_name(name, chrono::Utc::now().timestamp()));
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write screenshot: {}", path.display()))?;
        Ok(())
    }

    /// Tear the session down. Errors are swallowed: this runs after the flow
    /// completes, fails, or is cancelled, and must never mask the outcome.
    pub async fn close(mut self) {
        let _ = self.browser.close().await;
        let _ = self.browser.wait().await;
        self.handler_task.abort();
    }
}

/// File name for a diagnostic screenshot derived from the failure reason.
pub(crate) fn screenshot_file_name(reason: &str, unix_ts: i64) -> String {
    format!("{reason}_{unix_ts}.png")
}

/// Synthetic desktop Chrome user agent with a randomized release.
fn random_user_agent() -> String {
    let versions = ["120.0.0.0", "121.0.0.0", "122.0.0.0"];
    let v = versions
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("120.0.0.0");
    format!(
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/{v} Safari/537.36"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screenshot_names_carry_reason_and_timestamp() {
        assert_eq!(
            screenshot_file_name("code_input_missing", 1735689600),
            "code_input_missing_1735689600.png"
        );
    }

    #[test]
    fn user_agent_override_uses_the_network_domain_params() {
        // Page::set_user_agent takes the network-domain params type; pin the
        // import so the emulation-domain type cannot sneak back in.
        let params: chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams =
            SetUserAgentOverrideParams::new("agent");
        assert_eq!(params.user_agent, "agent");
    }

    #[test]
    fn random_user_agent_is_desktop_chrome() {
        let ua = random_user_agent();
        assert!(ua.starts_with("Mozilla/5.0 (Windows NT 10.0; Win64; x64)"));
        assert!(ua.contains("Chrome/12"));
    }
}
