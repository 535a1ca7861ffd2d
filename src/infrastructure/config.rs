use crate::application::studio::StudioSettings;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudioConfig {
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub studio: SessionSettings,
    #[serde(default)]
    pub organization: OrgSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(default = "default_autosave_interval_secs")]
    pub autosave_interval_secs: u64,
    #[serde(default = "default_text_debounce_ms")]
    pub text_debounce_ms: u64,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Where the multi-source wizard keeps created sources between runs
    #[serde(default)]
    pub source_cache_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrgSettings {
    #[serde(default)]
    pub id: Option<String>,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_autosave_interval_secs() -> u64 {
    30
}

fn default_text_debounce_ms() -> u64 {
    500
}

fn default_history_limit() -> usize {
    50
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            autosave_interval_secs: default_autosave_interval_secs(),
            text_debounce_ms: default_text_debounce_ms(),
            history_limit: default_history_limit(),
            source_cache_path: None,
        }
    }
}

impl StudioConfig {
    pub fn to_studio_settings(&self) -> StudioSettings {
        StudioSettings {
            autosave_interval: Duration::from_secs(self.studio.autosave_interval_secs.max(1)),
            text_debounce: Duration::from_millis(self.studio.text_debounce_ms),
            history_limit: self.studio.history_limit,
        }
    }
}

/// Load `path` (any format the config crate knows, optional) and overlay
/// `STUDIO__SECTION__KEY` environment variables.
pub fn load_config(path: &str) -> anyhow::Result<StudioConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name(path).required(false))
        .add_source(
            config::Environment::with_prefix("STUDIO")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}
