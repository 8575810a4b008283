use chrono::{TimeZone, Utc};
use gemini_session::clock::FixedClock;
use gemini_session::credentials::{
    expires_at, parse_config_id, parse_csesidx, SessionCredential,
};

#[test]
fn record_built_from_console_url_serializes_with_stable_keys() {
    let url = "https://business.gemini.google/cid/a1b2c3?csesidx=idx-9&hl=en";
    let clock = FixedClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap());

    let credential = SessionCredential {
        id: "user@example.com".to_string(),
        csesidx: parse_csesidx(url),
        config_id: parse_config_id(url).unwrap(),
        secure_c_ses: Some("ses-value".to_string()),
        host_c_oses: None,
        expires_at: expires_at(None, &clock),
    };

    let json = serde_json::to_value(&credential).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "id": "user@example.com",
            "csesidx": "idx-9",
            "config_id": "a1b2c3",
            "secure_c_ses": "ses-value",
            "host_c_oses": null,
            "expires_at": "2025-06-01 20:00:00",
        })
    );
}

#[test]
fn record_round_trips_through_json() {
    let credential = SessionCredential {
        id: "user@example.com".to_string(),
        csesidx: String::new(),
        config_id: "cfg".to_string(),
        secure_c_ses: None,
        host_c_oses: Some("oses-value".to_string()),
        expires_at: "2025-01-01 12:00:00".to_string(),
    };

    let json = serde_json::to_string(&credential).unwrap();
    let parsed: SessionCredential = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, credential);
}
