//! Flow configuration.
//!
//! Every protocol constant the login handshake depends on lives here as
//! injected data rather than free-standing process state, so tests can
//! substitute fixtures. The defaults reproduce the exact literals the target
//! service requires (landing URL, XSRF token, cookie names and domains).

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::{deserialize_duration, serialize_duration};

pub const AUTH_HOME_URL: &str = "https://auth.business.gemini.google/";
pub const BUSINESS_ROOT_URL: &str = "https://business.gemini.google/";
pub const DEFAULT_XSRF_TOKEN: &str = "KdLRzKwwBTD5wo8nUollAbY6cW0";

/// A cookie installed on the session before the login navigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
}

impl AuthCookie {
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
        }
    }
}

/// Immutable configuration for one login flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Auth landing URL opened first.
    pub auth_home_url: String,

    /// Business console root; also the continuation URL after login.
    pub business_root_url: String,

    /// XSRF token embedded both as a cookie and as a login-URL parameter.
    pub xsrf_token: String,

    /// Cookies installed before navigating to the login URL. Failure to set
    /// them is logged but non-fatal.
    pub auth_cookies: Vec<AuthCookie>,

    /// Default timeout for navigations and other page operations.
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub navigation_timeout: Duration,

    /// Outer bound for the code-input field to become visible.
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub code_input_timeout: Duration,

    /// Probe interval while waiting for the code input.
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub code_input_interval: Duration,

    /// Bound for one mail-poll round (passed to the poller).
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub code_poll_timeout: Duration,

    /// Retry interval for the mail poller.
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub code_poll_interval: Duration,

    /// Settle time after submitting the code, while the page redirects.
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub redirect_settle: Duration,

    /// Outer bound for the business URL params to appear.
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub params_timeout: Duration,

    /// Probe interval while waiting for the business URL params.
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub params_interval: Duration,

    /// Directory for diagnostic screenshots taken at named failure points.
    pub screenshot_dir: PathBuf,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            auth_home_url: AUTH_HOME_URL.to_string(),
            business_root_url: BUSINESS_ROOT_URL.to_string(),
            xsrf_token: DEFAULT_XSRF_TOKEN.to_string(),
            auth_cookies: vec![
                AuthCookie::new(
                    "__Host-AP_SignInXsrf",
                    DEFAULT_XSRF_TOKEN,
                    "auth.business.gemini.google",
                ),
                AuthCookie::new("_GRECAPTCHA", "09ABCL...", ".google.com"),
            ],
            navigation_timeout: Duration::from_secs(60),
            code_input_timeout: Duration::from_secs(30),
            code_input_interval: Duration::from_secs(2),
            code_poll_timeout: Duration::from_secs(40),
            code_poll_interval: Duration::from_secs(4),
            redirect_settle: Duration::from_secs(12),
            params_timeout: Duration::from_secs(30),
            params_interval: Duration::from_secs(1),
            screenshot_dir: PathBuf::from("data").join("automation"),
        }
    }
}

impl FlowConfig {
    /// Build the login URL for an email, with the address percent-encoded as
    /// the login hint and the XSRF token carried as a query parameter.
    pub fn login_url(&self, email: &str) -> String {
        let continue_url = urlencoding::encode(&self.business_root_url);
        let login_hint = urlencoding::encode(email);
        format!(
            "{}login/email?continueUrl={}&loginHint={}&xsrfToken={}",
            self.auth_home_url, continue_url, login_hint, self.xsrf_token
        )
    }

    /// True when `url` carries both markers of a fully initialized,
    /// authenticated console session.
    pub fn has_business_params(&self, url: &str) -> bool {
        url.contains("business.gemini.google") && url.contains("csesidx=") && url.contains("/cid/")
    }
}
