use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Server used when nothing else is configured (a local `livekit-server --dev`).
pub const DEFAULT_SERVER_URL: &str = "ws://localhost:7880";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Settings {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub mic_enabled_on_join: bool,
    #[serde(default)]
    pub camera_enabled_on_join: bool,
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            token: String::new(),
            mic_enabled_on_join: false,
            camera_enabled_on_join: false,
        }
    }
}

impl Settings {
    /// Apply `LIVEKIT_URL` / `LIVEKIT_TOKEN` overrides.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("LIVEKIT_URL").filter(|v| !v.trim().is_empty()) {
            self.server_url = url;
        }
        if let Some(token) = lookup("LIVEKIT_TOKEN").filter(|v| !v.trim().is_empty()) {
            self.token = token;
        }
    }
}

/// JSON-file backed settings, rewritten on every change.
pub struct SettingsStore {
    settings: Mutex<Settings>,
    file_path: PathBuf,
}

impl SettingsStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let file_path = data_dir.as_ref().join("settings.json");
        let settings = Self::load(&file_path);
        Self {
            settings: Mutex::new(settings),
            file_path,
        }
    }

    pub fn get(&self) -> Settings {
        self.settings.lock().expect("settings lock poisoned").clone()
    }

    /// Override values for this session without persisting them.
    pub fn override_with(&self, f: impl FnOnce(&mut Settings)) {
        f(&mut self.settings.lock().expect("settings lock poisoned"));
    }

    /// Remember the last successful connection.
    pub fn set_connection(&self, server_url: &str, token: &str) {
        self.update(|s| {
            s.server_url = server_url.to_string();
            s.token = token.to_string();
        });
    }

    pub fn set_mic_enabled_on_join(&self, enabled: bool) {
        self.update(|s| s.mic_enabled_on_join = enabled);
    }

    pub fn set_camera_enabled_on_join(&self, enabled: bool) {
        self.update(|s| s.camera_enabled_on_join = enabled);
    }

    fn update(&self, f: impl FnOnce(&mut Settings)) {
        let settings = {
            let mut settings = self.settings.lock().expect("settings lock poisoned");
            f(&mut settings);
            settings.clone()
        };
        self.save(&settings);
    }

    fn save(&self, settings: &Settings) {
        if let Some(parent) = self.file_path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!("cannot create settings directory {}: {e}", parent.display());
                return;
            }
        }
        match serde_json::to_string_pretty(settings) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.file_path, json) {
                    tracing::warn!("cannot write {}: {e}", self.file_path.display());
                }
            }
            Err(e) => tracing::warn!("cannot serialize settings: {e}"),
        }
    }

    fn load(path: &Path) -> Settings {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("ignoring corrupt settings file {}: {e}", path.display());
                Settings::default()
            }),
            Err(_) => Settings::default(),
        }
    }
}
