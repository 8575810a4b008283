//! Session credential extraction.
//!
//! After a successful login the console URL carries a session index and a
//! config id, and the cookie jar carries the two session cookies. This module
//! turns those into one portable [`SessionCredential`] record.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::config::FlowConfig;
use crate::session::RemoteSession;

/// Primary session cookie captured from the authenticated console.
pub const SES_COOKIE: &str = "__Secure-C_SES";
/// Secondary session cookie captured from the authenticated console.
pub const OSES_COOKIE: &str = "__Host-C_OSES";

/// Hours the captured session is assumed to stay valid when the cookie
/// carries no usable expiry.
const FALLBACK_VALIDITY_HOURS: i64 = 12;

/// Portable record of one authenticated console session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionCredential {
    /// Account identity the session was established for.
    pub id: String,
    /// Session index extracted from the console URL.
    pub csesidx: String,
    /// Config id extracted from the console URL path.
    pub config_id: String,
    /// Primary session cookie value, when present in the jar.
    pub secure_c_ses: Option<String>,
    /// Secondary session cookie value, when present in the jar.
    pub host_c_oses: Option<String>,
    /// Expiry in UTC+8 local time, `YYYY-MM-DD HH:MM:SS`.
    pub expires_at: String,
}

/// Config id: the path segment following `cid/`, terminated by `?` or `/`.
pub fn parse_config_id(url: &str) -> Option<String> {
    let (_, rest) = url.split_once("cid/")?;
    let id: String = rest
        .chars()
        .take_while(|&c| c != '?' && c != '/')
        .collect();
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

/// Session index: the value of the `csesidx` query parameter, empty string
/// when the parameter is absent.
pub fn parse_csesidx(url: &str) -> String {
    url.split_once("csesidx=")
        .map(|(_, rest)| rest.split('&').next().unwrap_or_default().to_string())
        .unwrap_or_default()
}

/// Expiry string for a captured session cookie.
///
/// When the cookie carries a positive expiry, the record expires 12 hours
/// before the cookie does, rendered in UTC+8 local time. Without a usable
/// cookie expiry the session is assumed valid for 12 hours from now.
pub fn expires_at(cookie_expiry: Option<f64>, clock: &dyn Clock) -> String {
    let utc8 = FixedOffset::east_opt(8 * 3600).expect("UTC+8 is a valid offset");

    let local: DateTime<FixedOffset> = match cookie_expiry {
        Some(ts) if ts > 0.0 => {
            let at = Utc
                .timestamp_opt(ts as i64, 0)
                .single()
                .unwrap_or_else(|| clock.now());
            (at - chrono::Duration::hours(FALLBACK_VALIDITY_HOURS)).with_timezone(&utc8)
        }
        _ => (clock.now() + chrono::Duration::hours(FALLBACK_VALIDITY_HOURS)).with_timezone(&utc8),
    };

    local.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Read the session cookies and URL parameters off an authenticated session.
///
/// When the current URL is missing the config id, one navigation to the
/// console root is attempted before giving up.
pub async fn extract(
    session: &RemoteSession,
    config: &FlowConfig,
    clock: &dyn Clock,
    email: &str,
) -> Result<SessionCredential> {
    let mut url = session.current_url().await?;

    if parse_config_id(&url).is_none() {
        tracing::warn!(%url, "config id missing from current URL, re-navigating");
        session.goto_tolerant(&config.business_root_url).await?;
        url = session.current_url().await?;
    }

    let config_id = match parse_config_id(&url) {
        Some(id) => id,
        None => {
            tracing::error!(%url, "config id still missing after re-navigation");
            bail!("cid not found");
        }
    };
    let csesidx = parse_csesidx(&url);

    let cookies = session
        .cookies()
        .await
        .context("Failed to read session cookies")?;

    let mut secure_c_ses = None;
    let mut host_c_oses = None;
    let mut cookie_expiry = None;
    for cookie in cookies {
        match cookie.name.as_str() {
            SES_COOKIE => {
                cookie_expiry = Some(cookie.expires);
                secure_c_ses = Some(cookie.value);
            }
            OSES_COOKIE => host_c_oses = Some(cookie.value),
            _ => {}
        }
    }

    if secure_c_ses.is_none() {
        tracing::warn!(cookie = SES_COOKIE, "session cookie missing from jar");
    }

    Ok(SessionCredential {
        id: email.to_string(),
        csesidx,
        config_id,
        secure_c_ses,
        host_c_oses,
        expires_at: expires_at(cookie_expiry, clock),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::TimeZone;

    #[test]
    fn config_id_stops_at_query_or_slash() {
        assert_eq!(
            parse_config_id("https://business.gemini.google/cid/abc123?csesidx=x"),
            Some("abc123".to_string())
        );
        assert_eq!(
            parse_config_id("https://business.gemini.google/cid/abc123/settings"),
            Some("abc123".to_string())
        );
        assert_eq!(parse_config_id("https://business.gemini.google/"), None);
        assert_eq!(parse_config_id("https://business.gemini.google/cid/"), None);
    }

    #[test]
    fn csesidx_is_empty_when_absent() {
        assert_eq!(
            parse_csesidx("https://business.gemini.google/cid/a?csesidx=42&x=1"),
            "42"
        );
        assert_eq!(parse_csesidx("https://business.gemini.google/cid/a"), "");
    }

    #[test]
    fn expiry_backs_off_twelve_hours_in_utc8() {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap());
        // Cookie expires 2025-01-02T00:00:00+08:00.
        let cookie_ts = Utc.with_ymd_and_hms(2025, 1, 1, 16, 0, 0).unwrap().timestamp() as f64;

        assert_eq!(expires_at(Some(cookie_ts), &clock), "2025-01-01 12:00:00");
    }

    #[test]
    fn expiry_defaults_to_twelve_hours_from_now() {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap());

        // 2025-06-01T12:00:00Z is 20:00 in UTC+8.
        assert_eq!(expires_at(None, &clock), "2025-06-01 20:00:00");
        assert_eq!(expires_at(Some(-1.0), &clock), "2025-06-01 20:00:00");
        assert_eq!(expires_at(Some(0.0), &clock), "2025-06-01 20:00:00");
    }

    #[test]
    fn expiry_is_deterministic_for_a_fixed_instant() {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap());
        let ts = Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap().timestamp() as f64;

        assert_eq!(expires_at(Some(ts), &clock), expires_at(Some(ts), &clock));
    }
}
