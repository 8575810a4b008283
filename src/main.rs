use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::Parser;

use gemini_session::clock::SystemClock;
use gemini_session::config::FlowConfig;
use gemini_session::flow::LoginFlow;
use gemini_session::logging::TracingLogger;
use gemini_session::mail::MailPoller;
use gemini_session::session::RemoteSession;
use gemini_session::steel::{CreateSessionOptions, Dimensions, SteelClient};

#[derive(Parser)]
#[command(name = "gemini-session")]
#[command(about = "Automated email-code login and session-credential capture")]
struct Cli {
    /// Email address to log in with
    #[arg(short, long)]
    email: String,

    /// Attach to an existing browser over this CDP websocket URL instead of
    /// provisioning one
    #[arg(long, conflicts_with = "steel_api_key")]
    cdp_url: Option<String>,

    /// Steel API key for provisioning a cloud browser
    /// (falls back to the STEEL_API_KEY environment variable)
    #[arg(long)]
    steel_api_key: Option<String>,

    /// Override the randomized browser user agent
    #[arg(long)]
    user_agent: Option<String>,
}

/// Interactive poller: prompts on stderr and reads the verification code
/// from stdin, so the JSON outcome on stdout stays machine-readable.
struct PromptMailPoller;

#[async_trait]
impl MailPoller for PromptMailPoller {
    async fn poll_for_code(
        &self,
        timeout: Duration,
        _interval: Duration,
        _since: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let read = tokio::task::spawn_blocking(|| {
            eprint!("verification code (blank to skip): ");
            std::io::stderr().flush().ok();

            let mut line = String::new();
            std::io::stdin().read_line(&mut line).ok()?;
            let code = line.trim().to_string();
            (!code.is_empty()).then_some(code)
        });

        match tokio::time::timeout(timeout, read).await {
            Ok(joined) => Ok(joined.context("Code prompt task failed")?),
            Err(_) => Ok(None),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Either attach to a caller-supplied browser or provision one.
    let (cdp_url, provisioned) = match cli.cdp_url {
        Some(url) => (url, None),
        None => {
            let api_key = cli
                .steel_api_key
                .or_else(|| std::env::var("STEEL_API_KEY").ok())
                .context("either --cdp-url or --steel-api-key (or STEEL_API_KEY) is required")?;
            let client = SteelClient::new(api_key)?;

            let session = client
                .create_session(&CreateSessionOptions {
                    dimensions: Some(Dimensions {
                        width: 1920,
                        height: 1080,
                    }),
                    block_ads: Some(true),
                    proxy: None,
                })
                .await?;
            tracing::info!(id = %session.id, "provisioned remote browser");

            (session.cdp_url, Some((client, session.id)))
        }
    };

    let config = FlowConfig::default();
    let session =
        RemoteSession::connect(&cdp_url, cli.user_agent, config.navigation_timeout).await?;
    let flow = LoginFlow::new(
        session,
        config,
        Arc::new(TracingLogger),
        Arc::new(SystemClock),
    );

    let result = flow.login_and_extract(&cli.email, &PromptMailPoller).await;

    // Release the provisioned browser even when the flow failed.
    if let Some((client, session_id)) = provisioned {
        if let Err(err) = client.release_session(&session_id).await {
            tracing::warn!(error = %err, "failed to release remote browser session");
        }
    }

    let outcome = result?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if !outcome.success {
        std::process::exit(1);
    }
    Ok(())
}
