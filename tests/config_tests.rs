// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use tempfile::TempDir;

use chatrelay::config::Settings;
use chatrelay::RelayError;

#[test]
fn test_load_missing_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let settings = Settings::load_from(&dir.path().join("settings.json")).unwrap();

    assert_eq!(settings.pipeline, Settings::default().pipeline);
    assert_eq!(settings.providers, Settings::default().providers);
}

#[test]
fn test_save_then_load_preserves_changes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("settings.json");

    let mut settings = Settings::default();
    settings.pipeline.segment_cap = 4;
    settings.pipeline.stall_timeout_secs = 10;
    settings.providers.default_provider = "Ollama".to_string();
    settings.save_to(&path).unwrap();

    let loaded = Settings::load_from(&path).unwrap();
    assert_eq!(loaded.pipeline.segment_cap, 4);
    assert_eq!(loaded.pipeline.stall_timeout_secs, 10);
    assert_eq!(loaded.providers.default_provider, "Ollama");
    assert!(loaded.validate().is_ok());
}

#[test]
fn test_partial_file_fills_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, r#"{"pipeline": {"max_context_files": 8}}"#).unwrap();

    let settings = Settings::load_from(&path).unwrap();
    assert_eq!(settings.pipeline.max_context_files, 8);
    assert_eq!(settings.pipeline.segment_cap, 2);
    assert_eq!(settings.server.client_header, "x-client-id");
}

#[test]
fn test_invalid_json_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert!(matches!(
        Settings::load_from(&path),
        Err(RelayError::Json(_))
    ));
}

#[test]
fn test_validate_rejects_zero_limits() {
    let mut settings = Settings::default();
    settings.pipeline.segment_cap = 0;
    settings.pipeline.tool_timeout_secs = 0;

    let Err(RelayError::Config(message)) = settings.validate() else {
        panic!("expected a config error");
    };
    assert!(message.contains("pipeline.segment_cap"));
    assert!(message.contains("pipeline.tool_timeout_secs"));
}

#[test]
fn test_validate_rejects_unknown_default_provider() {
    let mut settings = Settings::default();
    settings.providers.default_provider = "Nowhere".to_string();
    assert!(settings.validate().is_err());

    settings.providers.default_provider = "ollama".to_string();
    assert!(settings.validate().is_ok());
}

#[test]
fn test_env_override_for_bind() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.json");

    std::env::set_var("CHATRELAY_BIND", "0.0.0.0:9000");
    let settings = Settings::load_from(&path);
    std::env::remove_var("CHATRELAY_BIND");

    assert_eq!(settings.unwrap().server.bind, "0.0.0.0:9000");
}

#[test]
fn test_api_key_prefers_env_var() {
    let mut settings = Settings::default();
    let entry = settings.providers.entries.get_mut("Deepseek").unwrap();
    entry.api_key = Some("from-file".to_string());
    entry.api_key_env = Some("CHATRELAY_TEST_DEEPSEEK_KEY".to_string());

    assert_eq!(settings.api_key_for("deepseek").as_deref(), Some("from-file"));

    std::env::set_var("CHATRELAY_TEST_DEEPSEEK_KEY", "from-env");
    let key = settings.api_key_for("Deepseek");
    std::env::remove_var("CHATRELAY_TEST_DEEPSEEK_KEY");

    assert_eq!(key.as_deref(), Some("from-env"));
}
