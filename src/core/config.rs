use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use super::AppCore;
use crate::state::RING_WINDOW_MS;

const DEFAULT_APP_ORIGIN: &str = "https://app.aerosonix.io";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct AppConfig {
    pub(crate) disable_network: Option<bool>,
    pub(crate) app_origin: Option<String>,
    pub(crate) api_base_url: Option<String>,
    pub(crate) api_key: Option<String>,
    /// The local user's cloned voice; required before translation can be
    /// enabled.
    pub(crate) my_voice_id: Option<String>,
    pub(crate) default_voice_id: Option<String>,
    pub(crate) participant_voices: Option<HashMap<String, String>>,
    pub(crate) target_language: Option<String>,
    /// Dev/test knob; production leaves this unset and rings for 15s.
    pub(crate) ring_window_ms: Option<i64>,
}

pub(crate) fn load_app_config(data_dir: &str) -> AppConfig {
    let path = Path::new(data_dir).join("aerosonix_config.json");
    let Ok(bytes) = std::fs::read(&path) else {
        return AppConfig::default();
    };
    serde_json::from_slice::<AppConfig>(&bytes).unwrap_or_default()
}

impl AppCore {
    pub(super) fn network_enabled(&self) -> bool {
        // Used to keep Rust tests deterministic and offline.
        if let Some(disable) = self.config.disable_network {
            return !disable;
        }
        std::env::var("AEROSONIX_DISABLE_NETWORK").ok().as_deref() != Some("1")
    }

    pub(super) fn app_origin(&self) -> String {
        self.config
            .app_origin
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_APP_ORIGIN)
            .trim_end_matches('/')
            .to_string()
    }

    pub(super) fn ring_window_ms(&self) -> i64 {
        self.config
            .ring_window_ms
            .filter(|ms| *ms > 0)
            .unwrap_or(RING_WINDOW_MS)
    }
}
