use crate::db;
use crate::grid::AutosaveSettings;
use rusqlite::Connection;
use serde_json::json;
use std::env;

pub const AUTOSAVE_SETTINGS_KEY: &str = "attendance.autosave";

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|v| match v.as_str() {
            "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
            "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct Config {
    pub autosave: AutosaveSettings,
    pub log_filter: String,
    pub log_json: bool,
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = AutosaveSettings::default();
        let log_filter = env::var("ATTENDANCED_LOG")
            .or_else(|_| env::var("RUST_LOG"))
            .unwrap_or_else(|_| "info".to_string());
        Self {
            autosave: AutosaveSettings::from_millis(
                env_u64("ATTENDANCED_AUTOSAVE_DEBOUNCE_MS", defaults.debounce_ms()),
                env_u64("ATTENDANCED_SAVED_DISPLAY_MS", defaults.saved_display_ms()),
            ),
            log_filter,
            log_json: env_bool("ATTENDANCED_LOG_JSON", false),
        }
    }
}

fn apply_override(base: AutosaveSettings, stored: &serde_json::Value) -> AutosaveSettings {
    let ms = |key: &str| stored.get(key).and_then(|v| v.as_u64());
    AutosaveSettings::from_millis(
        ms("debounceMs").unwrap_or(base.debounce_ms()),
        ms("savedDisplayMs").unwrap_or(base.saved_display_ms()),
    )
}

/// Process defaults with the workspace's stored override, if any.
pub fn workspace_autosave(conn: &Connection, base: AutosaveSettings) -> anyhow::Result<AutosaveSettings> {
    Ok(match db::settings_get_json(conn, AUTOSAVE_SETTINGS_KEY)? {
        Some(stored) => apply_override(base, &stored),
        None => base,
    })
}

pub fn autosave_json(settings: AutosaveSettings) -> serde_json::Value {
    json!({
        "debounceMs": settings.debounce_ms(),
        "savedDisplayMs": settings.saved_display_ms(),
    })
}
