// slicekit/src/config.rs
use crate::core::{OutputFormat, ProcessConfig, Quality, ResizeAlgorithm, Result, SliceKitError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "slicekit.json";

/// User preferences persisted between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub quality: String,
    pub save_as_png: bool,
    pub optimize_png: bool,
    pub last_input_dir: String,
    pub last_output_dir: String,
    pub resize_width: u32,
    pub resize_filter: String,
    pub slice_digits: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            quality: Quality::default().to_string(),
            save_as_png: false,
            optimize_png: false,
            last_input_dir: String::new(),
            last_output_dir: String::new(),
            resize_width: 800,
            resize_filter: ResizeAlgorithm::Lanczos3.to_string(),
            slice_digits: 3,
        }
    }
}

impl Settings {
    /// Reads settings, keeping defaults for a missing file, unknown keys or invalid values.
    pub fn load(path: &Path) -> Settings {
        if !path.exists() {
            return Settings::default();
        }

        let parsed = std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|text| serde_json::from_str::<Value>(&text).map_err(|e| e.to_string()));

        match parsed {
            Ok(value) => Self::from_value(&value),
            Err(e) => {
                log::warn!("Failed to load settings from {}: {}", path.display(), e);
                Settings::default()
            }
        }
    }

    /// Field-by-field validation so one bad value does not discard the rest.
    pub fn from_value(value: &Value) -> Settings {
        let mut settings = Settings::default();
        let Some(map) = value.as_object() else {
            log::warn!("Settings file is not a JSON object, using defaults");
            return settings;
        };

        for (key, value) in map {
            let accepted = match key.as_str() {
                "quality" => value
                    .as_str()
                    .filter(|q| q.parse::<Quality>().is_ok())
                    .map(|q| settings.quality = q.to_string())
                    .is_some(),
                "save_as_png" => value.as_bool().map(|b| settings.save_as_png = b).is_some(),
                "optimize_png" => value.as_bool().map(|b| settings.optimize_png = b).is_some(),
                "last_input_dir" => value
                    .as_str()
                    .map(|s| settings.last_input_dir = s.to_string())
                    .is_some(),
                "last_output_dir" => value
                    .as_str()
                    .map(|s| settings.last_output_dir = s.to_string())
                    .is_some(),
                "resize_width" => value
                    .as_u64()
                    .filter(|w| (1..=100_000).contains(w))
                    .map(|w| settings.resize_width = w as u32)
                    .is_some(),
                "resize_filter" => value
                    .as_str()
                    .filter(|f| f.parse::<ResizeAlgorithm>().is_ok())
                    .map(|f| settings.resize_filter = f.to_string())
                    .is_some(),
                "slice_digits" => value
                    .as_u64()
                    .filter(|d| (1..=9).contains(d))
                    .map(|d| settings.slice_digits = d as usize)
                    .is_some(),
                _ => {
                    log::debug!("Ignoring unknown setting: {}", key);
                    true
                }
            };

            if !accepted {
                log::warn!("Ignoring invalid value for setting {}: {}", key, value);
            }
        }

        settings
    }

    /// Writes through a temporary file, keeping the previous file as `.bak` until the
    /// write succeeds.
    pub fn save(&self, path: &Path) -> Result<()> {
        let backup = with_suffix(path, "bak");
        let temp = with_suffix(path, "tmp");

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| SliceKitError::Config(format!("Failed to serialize settings: {}", e)))?;

        if path.exists() {
            std::fs::rename(path, &backup)?;
        }

        let written = std::fs::write(&temp, json).and_then(|_| std::fs::rename(&temp, path));

        if let Err(e) = written {
            log::warn!("Failed to save settings to {}: {}", path.display(), e);
            if backup.exists() {
                if let Err(restore) = std::fs::rename(&backup, path) {
                    log::warn!("Could not restore {}: {}", backup.display(), restore);
                }
            }
            return Err(SliceKitError::Config(format!(
                "Failed to save settings to {}: {}",
                path.display(),
                e
            )));
        }

        log::debug!("Saved settings to {}", path.display());
        Ok(())
    }

    pub fn quality(&self) -> Quality {
        self.quality.parse().unwrap_or_default()
    }

    pub fn resize_filter(&self) -> ResizeAlgorithm {
        self.resize_filter
            .parse()
            .unwrap_or(ResizeAlgorithm::Lanczos3)
    }

    pub fn output_format(&self) -> OutputFormat {
        if self.save_as_png {
            OutputFormat::Png
        } else {
            OutputFormat::Jpeg
        }
    }

    /// Runtime configuration seeded from these settings.
    pub fn process_config(&self) -> ProcessConfig {
        ProcessConfig {
            quality: self.quality(),
            format: self.output_format(),
            optimize_png: self.optimize_png,
            ..Default::default()
        }
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let settings = Settings::from_value(&json!({
            "quality": "ultra",
            "save_as_png": true,
            "resize_width": 0,
            "slice_digits": 4,
            "window_geometry": "800x600"
        }));

        assert_eq!(settings.quality, "medium");
        assert!(settings.save_as_png);
        assert_eq!(settings.resize_width, 800);
        assert_eq!(settings.slice_digits, 4);
    }

    #[test]
    fn save_then_load_round_trips_and_keeps_backup() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(DEFAULT_CONFIG_FILE);

        let first = Settings::default();
        first.save(&path).unwrap();

        let second = Settings {
            quality: "high".to_string(),
            resize_width: 690,
            ..Default::default()
        };
        second.save(&path).unwrap();

        assert_eq!(Settings::load(&path), second);
        assert!(tmp.path().join("slicekit.json.bak").exists());
        assert!(!tmp.path().join("slicekit.json.tmp").exists());
    }

    #[test]
    fn unreadable_file_yields_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(Settings::load(&path), Settings::default());
    }

    #[test]
    fn settings_seed_process_config() {
        let settings = Settings {
            quality: "low".to_string(),
            save_as_png: true,
            ..Default::default()
        };
        let config = settings.process_config();
        assert_eq!(config.quality, Quality::Low);
        assert_eq!(config.format, OutputFormat::Png);
    }
}
