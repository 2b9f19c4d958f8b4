//! Settings for the scheduling core.

use crate::checkpoint::Codec;
use crate::store::FileStore;
use crate::window::{CookingWindow, WindowBounds};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Errors that can occur while reading or writing settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Settings I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings could not be parsed: {0}")]
    Parse(String),

    #[error("Settings could not be serialized: {0}")]
    Serialize(String),
}

/// Top-level settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Allowed completion interval.
    pub window: WindowSettings,
    /// Period of the driving tick in milliseconds.
    pub tick_interval_ms: u64,
    /// Where persisted state lives.
    pub storage: StorageSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            window: WindowSettings::default(),
            tick_interval_ms: 1_000,
            storage: StorageSettings::default(),
        }
    }
}

/// Cooking window bounds in minutes from local midnight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSettings {
    pub earliest_minute: u16,
    /// 1440 leaves the window open until midnight.
    pub latest_minute: u16,
    /// Local offset from UTC used for minute-of-day.
    pub utc_offset_minutes: i32,
}

impl Default for WindowSettings {
    fn default() -> Self {
        let bounds = WindowBounds::default();
        Self {
            earliest_minute: bounds.earliest_minute,
            latest_minute: bounds.latest_minute,
            utc_offset_minutes: 0,
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory for the file store; `None` keeps state in memory.
    pub dir: Option<PathBuf>,
    pub format: Codec,
}

impl Settings {
    /// Load settings from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Save settings to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the settings cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// The configured window, corrected if its bounds are inverted.
    pub fn cooking_window(&self) -> CookingWindow {
        let window =
            CookingWindow::new(self.window.earliest_minute, self.window.latest_minute);
        match FixedOffset::east_opt(self.window.utc_offset_minutes.saturating_mul(60)) {
            Some(offset) => window.with_offset(offset),
            None => {
                warn!(
                    offset = self.window.utc_offset_minutes,
                    "utc offset out of range, using UTC"
                );
                window
            }
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    /// File store for the configured directory, if any.
    pub fn file_store(&self) -> Option<FileStore> {
        self.storage.dir.as_ref().map(FileStore::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_six_to_ten_at_one_hertz() {
        let settings = Settings::default();
        let window = settings.cooking_window();

        assert_eq!(window.earliest_minute(), 360);
        assert_eq!(window.latest_minute(), 1320);
        assert_eq!(settings.tick_interval(), Duration::from_secs(1));
        assert!(settings.file_store().is_none());
        assert_eq!(settings.storage.format, Codec::Json);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let settings = Settings::from_toml(
            r#"
            [window]
            earliest_minute = 420

            [storage]
            format = "binary"
            "#,
        )
        .unwrap();

        assert_eq!(settings.window.earliest_minute, 420);
        assert_eq!(settings.window.latest_minute, 1320);
        assert_eq!(settings.storage.format, Codec::Binary);
        assert_eq!(settings.tick_interval_ms, 1_000);
    }

    #[test]
    fn inverted_window_is_corrected() {
        let mut settings = Settings::default();
        settings.window.earliest_minute = 900;
        settings.window.latest_minute = 600;

        assert_eq!(settings.cooking_window().latest_minute(), 901);
    }

    #[test]
    fn offset_is_applied() {
        let mut settings = Settings::default();
        settings.window.utc_offset_minutes = -300;

        assert_eq!(
            settings.cooking_window().offset(),
            FixedOffset::west_opt(5 * 3600).unwrap()
        );
    }

    #[test]
    fn invalid_toml_is_reported() {
        let result = Settings::from_toml("window = 3");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("leaven.toml");

        let mut settings = Settings::default();
        settings.window.latest_minute = 1440;
        settings.storage.dir = Some(dir.path().join("state"));
        settings.save_to_file(&path).unwrap();

        let loaded = Settings::from_file(&path).unwrap();
        assert_eq!(loaded, settings);
        assert!(loaded.cooking_window().is_open_ended());
        assert!(loaded.file_store().is_some());
    }
}
