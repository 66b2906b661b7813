use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::audio::AutoplayPolicy;
use crate::RaagaApp;

/// Returns the path to the settings file: `~/.config/raaga-drone/settings.json`
fn settings_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("raaga-drone");
    path.push("settings.json");
    path
}

/// Persisted application settings.
///
/// Serialized as JSON to the platform config directory.
/// Fields use `#[serde(default)]` so that adding new settings
/// won't break existing config files.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Last selected raaga
    pub raaga_id: Option<String>,
    pub volume: f32,

    /// Whether the drone may start before the first click
    pub autoplay: AutoplayPolicy,

    // Display
    pub show_scope: bool,
    pub show_timer: bool,
    pub scope_gain: f32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            raaga_id: None,
            volume: 0.5,
            autoplay: AutoplayPolicy::RequireGesture,
            show_scope: true,
            show_timer: true,
            scope_gain: 4.0,
        }
    }
}

impl AppSettings {
    /// Load settings from disk, falling back to defaults on any error.
    pub fn load() -> Self {
        Self::load_from(&settings_path())
    }

    fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Self>(&contents) {
                Ok(settings) => {
                    log::info!("Loaded settings from {}", path.display());
                    settings.sanitized()
                }
                Err(e) => {
                    log::warn!("Failed to parse settings ({}), using defaults", e);
                    Self::default()
                }
            },
            Err(e) => {
                log::info!("No settings file found ({}), using defaults", e);
                Self::default()
            }
        }
    }

    /// Save settings to disk as pretty JSON.
    pub fn save(&self) {
        self.save_to(&settings_path());
    }

    fn save_to(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::warn!("Failed to create config directory: {}", e);
                return;
            }
        }
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    log::warn!("Failed to write settings: {}", e);
                }
            }
            Err(e) => {
                log::warn!("Failed to serialize settings: {}", e);
            }
        }
    }

    /// Pull hand-edited values back into range
    fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if !self.volume.is_finite() {
            self.volume = defaults.volume;
        }
        self.volume = self.volume.clamp(0.0, 1.0);
        if !self.scope_gain.is_finite() || self.scope_gain <= 0.0 {
            self.scope_gain = defaults.scope_gain;
        }
        self
    }

    /// Extract current settings from the running application.
    pub fn from_app(app: &RaagaApp) -> Self {
        Self {
            raaga_id: app.engine.current_raaga().map(|r| r.id.clone()),
            volume: app.engine.volume(),
            autoplay: app.autoplay,
            show_scope: app.show_scope,
            show_timer: app.show_timer,
            scope_gain: app.scope.settings.gain,
        }
    }

    /// Apply loaded settings to the running application.
    ///
    /// Restores the raaga selection without starting playback.
    pub fn apply(&self, app: &mut RaagaApp) {
        app.engine.set_volume(self.volume);
        if let Some(raaga) = self.raaga_id.as_deref().and_then(crate::raaga::find) {
            app.engine.load_raaga(raaga);
        }
        app.autoplay = self.autoplay;
        app.show_scope = self.show_scope;
        app.show_timer = self.show_timer;
        app.scope.settings.gain = self.scope_gain;
    }
}
