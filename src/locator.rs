//! Element discovery with ordered fallback strategies.
//!
//! Production selectors drift, so every UI action is located through an
//! ordered list of strategies evaluated left to right with early return.
//! Each probe is cheap; the list is retried in an outer polling loop until
//! the overall timeout elapses. Transport faults during probing are expected
//! (the page may be mid-render) and are treated the same as "not present".

use std::time::Duration;

use chromiumoxide::{Element, Page};

use crate::poll::poll_until;

/// Interval between passes over the strategy list.
const PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// One way of locating an interactive element.
#[derive(Debug, Clone)]
pub enum Strategy {
    /// CSS selector; matches when the first hit is visible.
    Css(String),
    /// Enumerate all buttons and match visible text against keywords
    /// (case-insensitive substring, bilingual keyword sets).
    ButtonText(Vec<String>),
}

impl Strategy {
    pub fn css(selector: impl Into<String>) -> Self {
        Strategy::Css(selector.into())
    }

    pub fn button_text<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Strategy::ButtonText(keywords.into_iter().map(Into::into).collect())
    }
}

/// Find the first visible element matched by any strategy, retrying the whole
/// list until `timeout` elapses. Returns `None` when nothing matched in time.
pub async fn find(page: &Page, strategies: &[Strategy], timeout: Duration) -> Option<Element> {
    poll_until(timeout, PROBE_INTERVAL, || async move {
        first_match(strategies, |strategy| async move { probe(page, strategy).await }).await
    })
    .await
}

/// Single pass over the strategy list without the outer polling loop.
pub async fn find_once(page: &Page, strategies: &[Strategy]) -> Option<Element> {
    first_match(strategies, |strategy| async move { probe(page, strategy).await }).await
}

/// Evaluate strategies in order, returning on the first hit. Strategies after
/// the first match are never probed.
pub(crate) async fn first_match<T, P, Fut>(strategies: &[Strategy], mut probe: P) -> Option<T>
where
    P: FnMut(Strategy) -> Fut,
    Fut: std::future::Future<Output = Option<T>>,
{
    for strategy in strategies {
        if let Some(found) = probe(strategy.clone()).await {
            return Some(found);
        }
    }
    None
}

async fn probe(page: &Page, strategy: Strategy) -> Option<Element> {
    match strategy {
        Strategy::Css(selector) => match page.find_element(selector.as_str()).await {
            Ok(element) if is_visible(&element).await => Some(element),
            _ => None,
        },
        Strategy::ButtonText(keywords) => find_button_by_text(page, &keywords).await,
    }
}

/// Enumerate all buttons and return the first whose visible text contains any
/// keyword. Text matching is case-insensitive and substring-based because
/// production labels carry surrounding whitespace and icon glyphs.
pub async fn find_button_by_text(page: &Page, keywords: &[String]) -> Option<Element> {
    let buttons = page.find_elements("button").await.ok()?;
    for button in buttons {
        let text = match button.inner_text().await {
            Ok(Some(text)) => text,
            _ => continue,
        };
        if text_matches(&text, keywords) {
            return Some(button);
        }
    }
    None
}

/// Case-insensitive substring match against any keyword.
pub(crate) fn text_matches(text: &str, keywords: &[String]) -> bool {
    let text = text.trim().to_lowercase();
    if text.is_empty() {
        return false;
    }
    keywords
        .iter()
        .any(|keyword| text.contains(&keyword.to_lowercase()))
}

/// Visibility probe run in the page: rendered box and not display:none or
/// visibility:hidden. Any JS/transport fault counts as not visible.
async fn is_visible(element: &Element) -> bool {
    let result = element
        .call_js_fn(
            "function() {
                const rect = this.getBoundingClientRect();
                const style = window.getComputedStyle(this);
                return rect.width > 0 && rect.height > 0
                    && style.visibility !== 'hidden'
                    && style.display !== 'none';
            }",
            false,
        )
        .await;

    match result {
        Ok(ret) => ret.result.value == Some(serde_json::Value::Bool(true)),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn keywords(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn keyword_match_is_case_insensitive_substring() {
        let set = keywords(&["Send code", "发送"]);

        assert!(text_matches("  SEND CODE to my email  ", &set));
        assert!(text_matches("通过电子邮件发送验证码", &set));
        assert!(!text_matches("Cancel", &set));
        assert!(!text_matches("", &set));
        assert!(!text_matches("   ", &set));
    }

    #[tokio::test]
    async fn fallback_order_is_deterministic() {
        let strategies = vec![
            Strategy::css("#first"),
            Strategy::css("#second"),
            Strategy::css("#third"),
        ];
        let probes = AtomicUsize::new(0);

        // Only the second strategy matches; the third must never be probed.
        let found = first_match(&strategies, |strategy| {
            probes.fetch_add(1, Ordering::SeqCst);
            let hit = matches!(strategy, Strategy::Css(s) if s == "#second");
            async move { hit.then_some("match") }
        })
        .await;

        assert_eq!(found, Some("match"));
        assert_eq!(probes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn strategy_list_is_retried_until_a_late_element_appears() {
        let strategies = vec![Strategy::css("#late")];
        let passes = AtomicUsize::new(0);

        // Element "renders" on the third pass over the list; the outer
        // polling loop must keep retrying until then.
        let found = poll_until(Duration::from_secs(1), Duration::from_millis(1), || {
            let pass = passes.fetch_add(1, Ordering::SeqCst);
            first_match(&strategies, move |_| async move {
                (pass >= 2).then_some("late")
            })
        })
        .await;

        assert_eq!(found, Some("late"));
        assert_eq!(passes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn no_strategy_matching_yields_none() {
        let strategies = vec![Strategy::css("#a"), Strategy::button_text(["resend"])];
        let found: Option<()> = first_match(&strategies, |_| async { None }).await;
        assert!(found.is_none());
    }
}
