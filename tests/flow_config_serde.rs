use std::time::Duration;

use gemini_session::config::FlowConfig;

#[test]
fn defaults_round_trip_through_json() {
    let config = FlowConfig::default();
    let json = serde_json::to_string(&config).unwrap();
    let parsed: FlowConfig = serde_json::from_str(&json).unwrap();

    assert_eq!(parsed.auth_home_url, config.auth_home_url);
    assert_eq!(parsed.xsrf_token, config.xsrf_token);
    assert_eq!(parsed.auth_cookies.len(), config.auth_cookies.len());
    assert_eq!(parsed.code_poll_timeout, config.code_poll_timeout);
    assert_eq!(parsed.screenshot_dir, config.screenshot_dir);
}

#[test]
fn partial_config_falls_back_to_defaults() {
    let parsed: FlowConfig = serde_json::from_str(
        r#"{
            "xsrf_token": "override-token",
            "code_poll_timeout": "90s",
            "redirect_settle": "5s"
        }"#,
    )
    .unwrap();

    assert_eq!(parsed.xsrf_token, "override-token");
    assert_eq!(parsed.code_poll_timeout, Duration::from_secs(90));
    assert_eq!(parsed.redirect_settle, Duration::from_secs(5));
    // Untouched fields keep their defaults.
    assert_eq!(parsed.auth_home_url, "https://auth.business.gemini.google/");
    assert_eq!(parsed.params_interval, Duration::from_secs(1));
}
