//! The login flow state machine.
//!
//! Drives one email-code login attempt end to end against a remote browser:
//! landing page, auth cookies, send-code, mail polling with a single resend,
//! code submission, agreement and display-name interstitials, and finally
//! credential extraction. Expected failures become a [`LoginOutcome`] with a
//! stable reason string and a diagnostic screenshot; only cancellation
//! escapes as an error. Session teardown runs on every exit path.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::Element;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;

use crate::clock::Clock;
use crate::config::FlowConfig;
use crate::credentials::{self, SessionCredential};
use crate::input;
use crate::locator::{self, Strategy};
use crate::logging::{Cancelled, FlowLogger, LogLevel};
use crate::mail::{poll_with_single_resend, CodeOutcome, MailPoller};
use crate::poll::poll_until;
use crate::session::RemoteSession;

/// Labels the send-code button carries across the English and Chinese
/// renderings of the login page.
const SEND_CODE_KEYWORDS: &[&str] = &[
    "通过电子邮件发送验证码",
    "通过电子邮件发送",
    "email",
    "Email",
    "Send code",
    "Send verification",
    "Verification code",
    "Send",
    "发送",
];

const RESEND_KEYWORDS: &[&str] = &["重新", "resend"];

const CONFIRM_KEYWORDS: &[&str] = &[
    "确认",
    "提交",
    "继续",
    "submit",
    "continue",
    "confirm",
    "save",
    "保存",
    "下一步",
    "next",
];

/// Code input selectors, most specific first.
const CODE_INPUT_SELECTORS: &[&str] = &[
    "input[jsname='ovqh0b']",
    "input[type='tel']",
    "input[name='pinInput']",
    "input[autocomplete='one-time-code']",
];

/// Visibility wait for the send-code button and the agreement button.
const BUTTON_TIMEOUT: Duration = Duration::from_secs(5);
/// Visibility wait when checking whether the code input is already showing.
const CODE_PAGE_CHECK_TIMEOUT: Duration = Duration::from_secs(2);
/// Visibility wait for the display-name input.
const USERNAME_INPUT_TIMEOUT: Duration = Duration::from_secs(2);

const USERNAME_SELECTORS: &[&str] = &[
    "input[type='text']",
    "input[name='displayName']",
    "input[aria-label*='用户名' i]",
    "input[aria-label*='display name' i]",
];

/// Expected ways the flow can fail short of an unexpected error. Each carries
/// a stable reason string and the screenshot slug recorded at that point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlowFailure {
    SendCodeButtonMissing,
    CodeInputMissing,
    CodeTimeout,
    CodeTimeoutAfterResend,
    VerificationSubmitFailed,
    ParamsMissing,
}

impl FlowFailure {
    fn reason(self) -> &'static str {
        match self {
            FlowFailure::SendCodeButtonMissing => "send code button not found",
            FlowFailure::CodeInputMissing => "code input not found",
            FlowFailure::CodeTimeout => "verification code timeout",
            FlowFailure::CodeTimeoutAfterResend => "verification code timeout after resend",
            FlowFailure::VerificationSubmitFailed => "verification code submission failed",
            FlowFailure::ParamsMissing => "URL parameters not found",
        }
    }

    fn screenshot_slug(self) -> &'static str {
        match self {
            FlowFailure::SendCodeButtonMissing => "send_code_button_missing",
            FlowFailure::CodeInputMissing => "code_input_missing",
            FlowFailure::CodeTimeout => "code_timeout",
            FlowFailure::CodeTimeoutAfterResend => "code_timeout_after_resend",
            FlowFailure::VerificationSubmitFailed => "verification_submit_failed",
            FlowFailure::ParamsMissing => "params_missing",
        }
    }
}

/// Terminal result of one login attempt.
#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub success: bool,
    pub config: Option<SessionCredential>,
    pub error: Option<String>,
}

impl LoginOutcome {
    fn ok(credential: SessionCredential) -> Self {
        Self {
            success: true,
            config: Some(credential),
            error: None,
        }
    }

    fn err(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            config: None,
            error: Some(reason.into()),
        }
    }
}

/// One login attempt bound to one remote session.
pub struct LoginFlow {
    session: RemoteSession,
    config: FlowConfig,
    logger: Arc<dyn FlowLogger>,
    clock: Arc<dyn Clock>,
}

impl LoginFlow {
    pub fn new(
        session: RemoteSession,
        config: FlowConfig,
        logger: Arc<dyn FlowLogger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            session,
            config,
            logger,
            clock,
        }
    }

    /// Run the full flow and tear the session down.
    ///
    /// Expected failures come back as an unsuccessful [`LoginOutcome`];
    /// unexpected errors are folded into the outcome's error string.
    /// Cancellation raised by the logger is the one condition that
    /// propagates as `Err`, after teardown.
    pub async fn login_and_extract(
        self,
        email: &str,
        mail: &dyn MailPoller,
    ) -> Result<LoginOutcome> {
        let result = self.run(email, mail).await;
        self.session.close().await;
        finish(result, self.logger.as_ref())
    }

    async fn run(&self, email: &str, mail: &dyn MailPoller) -> Result<LoginOutcome> {
        let cfg = &self.config;
        let page = self.session.page();

        // Floor timestamp for mail filtering, recorded before anything that
        // could trigger a code email.
        let send_time = self.clock.now();

        self.log(LogLevel::Info, &format!("opening login page: {email}"))?;
        self.session.goto_tolerant(&cfg.auth_home_url).await?;
        sleep_secs(2).await;

        self.install_auth_cookies().await?;

        self.log(LogLevel::Info, "navigating to login URL")?;
        self.session.goto_tolerant(&cfg.login_url(email)).await?;
        sleep_secs(5).await;

        let current_url = self.session.current_url().await?;
        self.log(LogLevel::Info, &format!("current URL: {current_url}"))?;
        if cfg.has_business_params(&current_url) {
            self.log(LogLevel::Info, "already logged in, extracting directly")?;
            let credential = self.extract(email).await?;
            return Ok(LoginOutcome::ok(credential));
        }

        self.log(LogLevel::Info, "finding and clicking send code button")?;
        if !self.click_send_code().await? {
            return self.fail(FlowFailure::SendCodeButtonMissing).await;
        }

        self.log(LogLevel::Info, "waiting for code input field")?;
        let code_strategies: Vec<Strategy> = CODE_INPUT_SELECTORS
            .iter()
            .map(|s| Strategy::css(*s))
            .collect();
        let Some(code_input) = poll_until(cfg.code_input_timeout, cfg.code_input_interval, || {
            locator::find_once(page, &code_strategies)
        })
        .await
        else {
            return self.fail(FlowFailure::CodeInputMissing).await;
        };

        self.log(LogLevel::Info, "polling email for verification code")?;
        let outcome = poll_with_single_resend(
            mail,
            cfg.code_poll_timeout,
            cfg.code_poll_interval,
            self.clock.as_ref(),
            send_time,
            || Box::pin(async move { self.click_resend_code().await }),
        )
        .await?;

        let code = match outcome {
            CodeOutcome::Code { value, .. } => value,
            CodeOutcome::TimedOut => return self.fail(FlowFailure::CodeTimeout).await,
            CodeOutcome::TimedOutAfterResend => {
                return self.fail(FlowFailure::CodeTimeoutAfterResend).await
            }
        };
        self.log(LogLevel::Info, &format!("received verification code: {code}"))?;

        // The page may have re-rendered while polling; re-resolve the input.
        let code_input = match locator::find_once(page, &code_strategies).await {
            Some(element) => element,
            None => code_input,
        };

        self.log(LogLevel::Info, "entering verification code")?;
        if !input::type_like_human(&code_input, &code).await {
            self.log(
                LogLevel::Warning,
                "simulated input failed, falling back to direct input",
            )?;
            input::fill(&code_input, &code).await?;
            sleep_millis(500).await;
        }

        self.log(LogLevel::Info, "pressing Enter to submit code")?;
        input::press_enter(&code_input).await?;

        self.log(LogLevel::Info, "waiting for automatic redirect after verification")?;
        tokio::time::sleep(cfg.redirect_settle).await;

        let current_url = self.session.current_url().await?;
        self.log(LogLevel::Info, &format!("URL after verification: {current_url}"))?;
        if current_url.contains("verify-oob-code") {
            return self.fail(FlowFailure::VerificationSubmitFailed).await;
        }

        self.handle_agreement(&current_url).await?;

        let mut current_url = self.session.current_url().await?;
        if cfg.has_business_params(&current_url) {
            self.log(LogLevel::Info, "already on business page with parameters")?;
            let credential = self.extract(email).await?;
            return Ok(LoginOutcome::ok(credential));
        }

        if !current_url.contains("business.gemini.google") {
            self.log(LogLevel::Info, "navigating to business page")?;
            self.session.goto_tolerant(&cfg.business_root_url).await?;
            sleep_secs(5).await;
            current_url = self.session.current_url().await?;
            self.log(LogLevel::Info, &format!("URL after navigation: {current_url}"))?;
        }

        if !current_url.contains("cid") && self.setup_username(&current_url).await? {
            sleep_secs(5).await;
        }

        self.log(LogLevel::Info, "waiting for URL parameters")?;
        if !self.wait_for_business_params().await {
            self.log(LogLevel::Warning, "URL parameters not generated, refreshing")?;
            self.session.reload().await?;
            sleep_secs(5).await;
            if !self.wait_for_business_params().await {
                return self.fail(FlowFailure::ParamsMissing).await;
            }
        }

        self.log(LogLevel::Info, "login flow complete, extracting credentials")?;
        let credential = self.extract(email).await?;
        Ok(LoginOutcome::ok(credential))
    }

    /// Install the pre-login cookies. Failure is logged but non-fatal.
    async fn install_auth_cookies(&self) -> Result<()> {
        if self.config.auth_cookies.is_empty() {
            return Ok(());
        }
        self.log(LogLevel::Info, "setting authentication cookies")?;

        let params = self
            .config
            .auth_cookies
            .iter()
            .map(|cookie| {
                let mut param = CookieParam::new(cookie.name.clone(), cookie.value.clone());
                param.domain = Some(cookie.domain.clone());
                param.path = Some("/".to_string());
                param.secure = Some(true);
                param
            })
            .collect();

        match self.session.set_cookies(params).await {
            Ok(()) => self.log(LogLevel::Info, "cookies set successfully")?,
            Err(err) => self.log(LogLevel::Warning, &format!("failed to set cookies: {err:#}"))?,
        }
        Ok(())
    }

    /// Click the send-code button via id then label keywords. As a last
    /// resort, treat an already-visible code input as success.
    async fn click_send_code(&self) -> Result<bool> {
        let page = self.session.page();
        sleep_secs(2).await;

        let strategies = [
            Strategy::css("#sign-in-with-email"),
            Strategy::button_text(SEND_CODE_KEYWORDS.iter().copied()),
        ];
        if let Some(button) = locator::find(page, &strategies, BUTTON_TIMEOUT).await {
            if button.click().await.is_ok() {
                self.log(LogLevel::Info, "clicked send code button")?;
                sleep_secs(3).await;
                return Ok(true);
            }
            self.log(LogLevel::Warning, "send code button click failed")?;
        }

        let already_on_code_page = [
            Strategy::css("input[jsname='ovqh0b']"),
            Strategy::css("input[name='pinInput']"),
        ];
        if locator::find(page, &already_on_code_page, CODE_PAGE_CHECK_TIMEOUT)
            .await
            .is_some()
        {
            self.log(LogLevel::Info, "already on code input page, no button needed")?;
            return Ok(true);
        }

        Ok(false)
    }

    /// Click the resend button if one is present. Returns whether it was
    /// found and clicked.
    async fn click_resend_code(&self) -> Result<bool> {
        sleep_secs(2).await;

        let keywords: Vec<String> = RESEND_KEYWORDS.iter().map(|s| s.to_string()).collect();
        match locator::find_button_by_text(self.session.page(), &keywords).await {
            Some(button) => {
                if button.click().await.is_err() {
                    return Ok(false);
                }
                self.log(LogLevel::Info, "resend button clicked, waiting for new code")?;
                sleep_secs(2).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Accept the service agreement when the flow lands on the create page.
    async fn handle_agreement(&self, url: &str) -> Result<()> {
        if !url.contains("/admin/create") {
            return Ok(());
        }
        self.log(LogLevel::Info, "handling service agreement page")?;

        let strategies = [Strategy::css("button.agree-button")];
        if let Some(button) = locator::find(self.session.page(), &strategies, BUTTON_TIMEOUT).await
        {
            if button.click().await.is_ok() {
                sleep_secs(2).await;
            }
        }
        Ok(())
    }

    /// Fill the display-name interstitial if it is showing. Returns whether
    /// a name was submitted; failures here never abort the flow.
    async fn setup_username(&self, current_url: &str) -> Result<bool> {
        // Still on the login host means this is not the display-name page.
        if current_url.contains("auth.business.gemini.google/login") {
            return Ok(false);
        }

        let strategies: Vec<Strategy> = USERNAME_SELECTORS
            .iter()
            .map(|s| Strategy::css(*s))
            .collect();
        let Some(element) =
            locator::find(self.session.page(), &strategies, USERNAME_INPUT_TIMEOUT).await
        else {
            return Ok(false);
        };

        let username = generate_username();
        self.log(LogLevel::Info, &format!("setting display name: {username}"))?;

        match self.try_fill_username(&element, &username).await {
            Ok(()) => Ok(true),
            Err(err) if err.is::<Cancelled>() => Err(err),
            Err(err) => {
                self.log(LogLevel::Warning, &format!("display name setup failed: {err:#}"))?;
                Ok(false)
            }
        }
    }

    async fn try_fill_username(&self, element: &Element, username: &str) -> Result<()> {
        element
            .click()
            .await
            .context("Failed to focus display name input")?;
        sleep_millis(200).await;
        input::clear(element).await?;
        sleep_millis(100).await;

        if !input::type_like_human(element, username).await {
            self.log(
                LogLevel::Warning,
                "simulated display name input failed, falling back to direct input",
            )?;
            input::fill(element, username).await?;
            sleep_millis(300).await;
        }

        let keywords: Vec<String> = CONFIRM_KEYWORDS.iter().map(|s| s.to_string()).collect();
        match locator::find_button_by_text(self.session.page(), &keywords).await {
            Some(button) => {
                button
                    .click()
                    .await
                    .context("Failed to click confirm button")?;
            }
            None => input::press_enter(element).await?,
        }

        sleep_secs(5).await;
        Ok(())
    }

    /// Poll the current URL until both session markers appear.
    async fn wait_for_business_params(&self) -> bool {
        let cfg = &self.config;
        poll_until(cfg.params_timeout, cfg.params_interval, || async move {
            let url = self.session.current_url().await.unwrap_or_default();
            (url.contains("csesidx=") && url.contains("/cid/")).then_some(())
        })
        .await
        .is_some()
    }

    async fn extract(&self, email: &str) -> Result<SessionCredential> {
        credentials::extract(&self.session, &self.config, self.clock.as_ref(), email).await
    }

    async fn fail(&self, failure: FlowFailure) -> Result<LoginOutcome> {
        self.log(LogLevel::Error, failure.reason())?;
        self.session
            .save_screenshot(&self.config.screenshot_dir, failure.screenshot_slug())
            .await;
        Ok(LoginOutcome::err(failure.reason()))
    }

    fn log(&self, level: LogLevel, message: &str) -> Result<(), Cancelled> {
        self.logger.log(level, message)
    }
}

/// Terminal conversion: unexpected faults are reported through the logging
/// collaborator and folded into the outcome; cancellation passes through
/// untouched. The error-level log is best-effort since the flow is already
/// over.
fn finish(result: Result<LoginOutcome>, logger: &dyn FlowLogger) -> Result<LoginOutcome> {
    match result {
        Ok(outcome) => Ok(outcome),
        Err(err) if err.is::<Cancelled>() => Err(err),
        Err(err) => {
            let _ = logger.log(LogLevel::Error, &format!("automation error: {err:#}"));
            Ok(LoginOutcome::err(format!("{err:#}")))
        }
    }
}

/// Display name for a fresh account: fixed prefix plus three random
/// alphanumeric characters.
fn generate_username() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(3)
        .map(char::from)
        .collect();
    format!("Test{suffix}")
}

async fn sleep_secs(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

async fn sleep_millis(millis: u64) {
    tokio::time::sleep(Duration::from_millis(millis)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingLogger {
        lines: Mutex<Vec<(LogLevel, String)>>,
    }

    impl RecordingLogger {
        fn new() -> Self {
            Self {
                lines: Mutex::new(Vec::new()),
            }
        }
    }

    impl FlowLogger for RecordingLogger {
        fn log(&self, level: LogLevel, message: &str) -> Result<(), Cancelled> {
            self.lines
                .lock()
                .unwrap()
                .push((level, message.to_string()));
            Ok(())
        }
    }

    struct CancellingLogger;

    impl FlowLogger for CancellingLogger {
        fn log(&self, _level: LogLevel, _message: &str) -> Result<(), Cancelled> {
            Err(Cancelled)
        }
    }

    #[test]
    fn unexpected_faults_are_logged_and_folded_into_the_outcome() {
        let logger = RecordingLogger::new();
        let outcome = finish(Err(anyhow::anyhow!("connection reset")), &logger).unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("connection reset"));

        let lines = logger.lines.lock().unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].0, LogLevel::Error);
        assert_eq!(lines[0].1, "automation error: connection reset");
    }

    #[test]
    fn cancellation_bypasses_the_failure_conversion() {
        let logger = RecordingLogger::new();
        let err = finish(Err(anyhow::Error::new(Cancelled)), &logger).unwrap_err();

        assert!(err.is::<Cancelled>());
        assert!(logger.lines.lock().unwrap().is_empty());
    }

    #[test]
    fn error_logging_is_best_effort_during_conversion() {
        // A logger that cancels while the flow is already winding down must
        // not mask the outcome.
        let outcome = finish(Err(anyhow::anyhow!("boom")), &CancellingLogger).unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("boom"));
    }

    #[test]
    fn generated_username_has_fixed_prefix_and_random_suffix() {
        let name = generate_username();
        assert_eq!(name.len(), 7);
        assert!(name.starts_with("Test"));
        assert!(name[4..].chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn failure_reasons_and_screenshot_slugs_are_stable() {
        assert_eq!(
            FlowFailure::SendCodeButtonMissing.reason(),
            "send code button not found"
        );
        assert_eq!(
            FlowFailure::CodeTimeoutAfterResend.screenshot_slug(),
            "code_timeout_after_resend"
        );
        assert_eq!(FlowFailure::ParamsMissing.reason(), "URL parameters not found");
    }

    #[test]
    fn outcome_serializes_with_stable_keys() {
        let outcome = LoginOutcome::err("verification code timeout");
        let json = serde_json::to_value(&outcome).unwrap();

        assert_eq!(json["success"], false);
        assert_eq!(json["config"], serde_json::Value::Null);
        assert_eq!(json["error"], "verification code timeout");
    }
}
