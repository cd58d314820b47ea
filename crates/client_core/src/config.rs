use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use shared::domain::PersonaId;
use tracing::warn;

use crate::phase::PhaseTiming;

pub const DEFAULT_SETTINGS_FILE: &str = "search_client.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    pub api_base_url: String,
    pub api_key: Option<String>,
    pub persona_id: PersonaId,
    pub narration_enabled: bool,
    pub reading_delay_ms: u64,
    pub analyzing_delay_ms: u64,
    pub generating_interval_ms: u64,
    pub connect_timeout_secs: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8080".into(),
            api_key: None,
            persona_id: PersonaId(0),
            narration_enabled: false,
            reading_delay_ms: 1500,
            analyzing_delay_ms: 4500,
            generating_interval_ms: 1500,
            connect_timeout_secs: 30,
        }
    }
}

impl ClientSettings {
    pub fn phase_timing(&self) -> PhaseTiming {
        PhaseTiming {
            reading_delay: Duration::from_millis(self.reading_delay_ms),
            analyzing_delay: Duration::from_millis(self.analyzing_delay_ms),
            generating_interval: Duration::from_millis(self.generating_interval_ms.max(1)),
        }
    }

    /// Bounds connecting only. Streamed answers may run for minutes, so no
    /// total request timeout is set.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    api_base_url: Option<String>,
    api_key: Option<String>,
    persona_id: Option<i64>,
    narration_enabled: Option<bool>,
    reading_delay_ms: Option<u64>,
    analyzing_delay_ms: Option<u64>,
    generating_interval_ms: Option<u64>,
    connect_timeout_secs: Option<u64>,
}

/// Defaults, then `search_client.toml` in the working directory, then the
/// process environment.
pub fn load_settings() -> ClientSettings {
    let mut settings = load_settings_from(Path::new(DEFAULT_SETTINGS_FILE));
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    settings
}

pub fn load_settings_from(path: &Path) -> ClientSettings {
    let mut settings = ClientSettings::default();

    let Ok(raw) = fs::read_to_string(path) else {
        return settings;
    };
    match toml::from_str::<FileSettings>(&raw) {
        Ok(file_cfg) => apply_file_settings(&mut settings, file_cfg),
        Err(err) => warn!(path = %path.display(), "config: ignoring unreadable settings file: {err}"),
    }

    settings
}

fn apply_file_settings(settings: &mut ClientSettings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.api_base_url {
        settings.api_base_url = v;
    }
    if let Some(v) = file_cfg.api_key {
        settings.api_key = Some(v);
    }
    if let Some(v) = file_cfg.persona_id {
        settings.persona_id = PersonaId(v);
    }
    if let Some(v) = file_cfg.narration_enabled {
        settings.narration_enabled = v;
    }
    if let Some(v) = file_cfg.reading_delay_ms {
        settings.reading_delay_ms = v;
    }
    if let Some(v) = file_cfg.analyzing_delay_ms {
        settings.analyzing_delay_ms = v;
    }
    if let Some(v) = file_cfg.generating_interval_ms {
        settings.generating_interval_ms = v;
    }
    if let Some(v) = file_cfg.connect_timeout_secs {
        settings.connect_timeout_secs = v;
    }
}

/// `SEARCH_*` names win over their `APP__*` aliases.
pub fn apply_env_overrides(settings: &mut ClientSettings, lookup: impl Fn(&str) -> Option<String>) {
    let get = |primary: &str, alias: &str| lookup(primary).or_else(|| lookup(alias));

    if let Some(v) = get("SEARCH_API_BASE_URL", "APP__API_BASE_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = get("SEARCH_API_KEY", "APP__API_KEY") {
        settings.api_key = Some(v);
    }
    if let Some(v) = get("SEARCH_PERSONA_ID", "APP__PERSONA_ID") {
        if let Ok(parsed) = v.parse::<i64>() {
            settings.persona_id = PersonaId(parsed);
        }
    }
    if let Some(v) = get("SEARCH_NARRATION", "APP__NARRATION") {
        if let Some(parsed) = parse_flag(&v) {
            settings.narration_enabled = parsed;
        }
    }
    if let Some(v) = get("SEARCH_READING_DELAY_MS", "APP__READING_DELAY_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.reading_delay_ms = parsed;
        }
    }
    if let Some(v) = get("SEARCH_ANALYZING_DELAY_MS", "APP__ANALYZING_DELAY_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.analyzing_delay_ms = parsed;
        }
    }
    if let Some(v) = get("SEARCH_GENERATING_INTERVAL_MS", "APP__GENERATING_INTERVAL_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.generating_interval_ms = parsed;
        }
    }
    if let Some(v) = get("SEARCH_CONNECT_TIMEOUT_SECS", "APP__CONNECT_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.connect_timeout_secs = parsed;
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
