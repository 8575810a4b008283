//! Steel cloud-browser provisioning client.
//!
//! Thin REST client for creating and releasing remote browser sessions. The
//! returned CDP URL is what [`crate::session::RemoteSession::connect`]
//! attaches to.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.steel.dev/v1";
const CONNECT_HOST: &str = "wss://connect.steel.dev";
const API_KEY_PREFIX: &str = "ste-";

/// A provisioned remote browser session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SteelSession {
    pub id: String,
    /// Websocket endpoint to attach to over CDP.
    pub cdp_url: String,
    /// Live-view URL, empty when the service omits it.
    pub session_viewer_url: String,
}

/// Options for a new session. All fields are optional; unset fields are
/// omitted from the request body.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_ads: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    id: String,
    #[serde(default)]
    session_viewer_url: String,
}

/// Session details as reported by the service, passed through untyped since
/// callers only inspect a few status fields.
pub type SessionDetails = serde_json::Value;

pub struct SteelClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl SteelClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Client against a non-default endpoint, used by tests.
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if !api_key.starts_with(API_KEY_PREFIX) {
            bail!("Invalid Steel API key format, expected a key starting with {API_KEY_PREFIX:?}");
        }

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Provision a new remote browser session.
    pub async fn create_session(&self, options: &CreateSessionOptions) -> Result<SteelSession> {
        let response = self
            .http
            .post(format!("{}/sessions", self.base_url))
            .header("Steel-API-Key", &self.api_key)
            .json(options)
            .send()
            .await
            .context("Steel session creation request failed")?
            .error_for_status()
            .context("Steel session creation was rejected")?;

        let body: SessionResponse = response
            .json()
            .await
            .context("Failed to parse Steel session response")?;

        let cdp_url = format!(
            "{CONNECT_HOST}?apiKey={}&sessionId={}",
            self.api_key, body.id
        );

        Ok(SteelSession {
            id: body.id,
            cdp_url,
            session_viewer_url: body.session_viewer_url,
        })
    }

    /// Release a session so it stops billing.
    pub async fn release_session(&self, session_id: &str) -> Result<()> {
        self.http
            .delete(format!("{}/sessions/{session_id}", self.base_url))
            .header("Steel-API-Key", &self.api_key)
            .send()
            .await
            .context("Steel session release request failed")?
            .error_for_status()
            .context("Steel session release was rejected")?;
        Ok(())
    }

    /// Fetch current details for a session.
    pub async fn get_session(&self, session_id: &str) -> Result<SessionDetails> {
        let details = self
            .http
            .get(format!("{}/sessions/{session_id}", self.base_url))
            .header("Steel-API-Key", &self.api_key)
            .send()
            .await
            .context("Steel session lookup request failed")?
            .error_for_status()
            .context("Steel session lookup was rejected")?
            .json()
            .await
            .context("Failed to parse Steel session details")?;
        Ok(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_must_carry_service_prefix() {
        assert!(SteelClient::new("ste-abc123").is_ok());
        assert!(SteelClient::new("sk-abc123").is_err());
        assert!(SteelClient::new("").is_err());
    }

    #[test]
    fn unset_options_are_omitted_from_the_body() {
        let body = serde_json::to_value(CreateSessionOptions::default()).unwrap();
        assert_eq!(body, serde_json::json!({}));

        let body = serde_json::to_value(CreateSessionOptions {
            dimensions: Some(Dimensions {
                width: 1920,
                height: 1080,
            }),
            block_ads: Some(true),
            proxy: None,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "dimensions": {"width": 1920, "height": 1080},
                "blockAds": true,
            })
        );
    }
}
