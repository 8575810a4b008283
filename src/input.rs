//! Human-like text entry.
//!
//! Verification pages watch input cadence, so the code and display name are
//! typed character by character with randomized delays. The caller falls back
//! to [`fill`] when simulation fails; neither path propagates a panic into
//! the flow.

use std::time::Duration;

use anyhow::{Context, Result};
use chromiumoxide::Element;
use rand::Rng;

/// Per-character delay range, milliseconds.
const CHAR_DELAY_MS: std::ops::RangeInclusive<u64> = 50..=150;
/// Settle delay after acquiring focus, milliseconds.
const FOCUS_SETTLE_MS: std::ops::RangeInclusive<u64> = 100..=300;
/// Settle delay after the last character, milliseconds.
const FINISH_SETTLE_MS: std::ops::RangeInclusive<u64> = 200..=500;

/// Type `text` into `element` one character at a time with randomized
/// delays. Returns false on any failure; never raises.
pub async fn type_like_human(element: &Element, text: &str) -> bool {
    match try_type(element, text).await {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(error = %err, "simulated input failed");
            false
        }
    }
}

async fn try_type(element: &Element, text: &str) -> Result<()> {
    element.click().await.context("Failed to focus input")?;
    sleep_range(FOCUS_SETTLE_MS).await;

    for ch in text.chars() {
        element
            .type_str(ch.to_string())
            .await
            .with_context(|| format!("Failed to type character {ch:?}"))?;
        sleep_range(CHAR_DELAY_MS).await;
    }

    sleep_range(FINISH_SETTLE_MS).await;
    Ok(())
}

/// Bulk fill: set the value in one shot and dispatch the events a real
/// keystroke sequence would have fired.
pub async fn fill(element: &Element, text: &str) -> Result<()> {
    let script = format!(
        "function() {{
            this.value = {value};
            this.dispatchEvent(new Event('input', {{ bubbles: true }}));
            this.dispatchEvent(new Event('change', {{ bubbles: true }}));
        }}",
        value = serde_json::to_string(text).unwrap_or_default()
    );
    element
        .call_js_fn(script, false)
        .await
        .context("Bulk fill failed")?;
    Ok(())
}

/// Clear an input's current value.
pub async fn clear(element: &Element) -> Result<()> {
    fill(element, "").await
}

/// Submit the focused form by dispatching an Enter keypress to the element.
pub async fn press_enter(element: &Element) -> Result<()> {
    element
        .press_key("Enter")
        .await
        .context("Failed to press Enter")?;
    Ok(())
}

async fn sleep_range(range: std::ops::RangeInclusive<u64>) {
    let millis = rand::thread_rng().gen_range(range);
    tokio::time::sleep(Duration::from_millis(millis)).await;
}
