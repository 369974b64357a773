/// Application configuration: load, save, and sanitize.
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Environment variable that overrides the data directory.
pub const DATA_DIR_ENV: &str = "JERSEY_STUDIO_DATA_DIR";

/// Largest history capacity accepted from a config file.
const MAX_HISTORY_CAPACITY: usize = 1000;

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
    /// Max canvas snapshots kept per document.
    pub history_capacity: usize,
    /// Points granted to a freshly created account.
    pub trial_grant: u64,
    /// Lifetime purchased points above which an account counts as premium.
    pub premium_threshold: u64,
    /// Root directory for the embedded databases. Empty = default location.
    pub data_dir: String,
    /// `tracing` filter used when `RUST_LOG` is not set.
    pub log_filter: String,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            history_capacity: 50,
            trial_grant: 5,
            premium_threshold: 100,
            data_dir: String::new(),
            log_filter: "info".to_string(),
        }
    }
}

impl StudioConfig {
    /// Returns the config file path: exe directory + `jersey-studio.json`.
    pub fn config_path() -> PathBuf {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|d| d.join("jersey-studio.json")))
            .unwrap_or_else(|| PathBuf::from("jersey-studio.json"))
    }

    /// Loads config from `path`, creating a default file if it doesn't exist.
    /// Returns defaults on any error (missing file, parse error, etc.).
    pub fn load_or_create(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(contents) => match serde_json::from_str::<StudioConfig>(&contents) {
                    Ok(mut config) => {
                        config.sanitize();
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {}: {e}", path.display());
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {}: {e}", path.display());
                }
            }
            // Keep the broken file on disk so the user can fix it
            Self::default()
        } else {
            let config = Self::default();
            if let Err(e) = config.save(path) {
                tracing::warn!("Failed to create default config at {}: {e}", path.display());
            }
            config
        }
    }

    /// Saves config to `path` as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Clamps values to valid ranges and resets invalid fields.
    pub fn sanitize(&mut self) {
        self.history_capacity = self.history_capacity.clamp(1, MAX_HISTORY_CAPACITY);
        if self.log_filter.trim().is_empty() {
            self.log_filter = "info".to_string();
        }
    }

    /// Resolves the directory holding the embedded databases.
    ///
    /// Resolution order:
    /// 1. `JERSEY_STUDIO_DATA_DIR` environment variable
    /// 2. `data_dir` from the config file (if non-empty)
    /// 3. `.data/` directory next to the executable
    /// 4. the platform local data directory
    pub fn resolve_data_dir(&self) -> PathBuf {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            return PathBuf::from(dir);
        }
        if !self.data_dir.is_empty() {
            return PathBuf::from(&self.data_dir);
        }
        match std::env::current_exe() {
            Ok(exe) => exe.parent().unwrap_or(Path::new(".")).join(".data"),
            Err(_) => dirs::data_local_dir()
                .map(|d| d.join("jersey-studio"))
                .unwrap_or_else(|| PathBuf::from(".data")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StudioConfig::default();
        assert_eq!(config.history_capacity, 50);
        assert_eq!(config.trial_grant, 5);
        assert_eq!(config.premium_threshold, 100);
        assert!(config.data_dir.is_empty());
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn test_sanitize_clamps_history_capacity() {
        let mut config = StudioConfig::default();
        config.history_capacity = 0;
        config.sanitize();
        assert_eq!(config.history_capacity, 1);

        config.history_capacity = 50_000;
        config.sanitize();
        assert_eq!(config.history_capacity, 1000);

        config.history_capacity = 75;
        config.sanitize();
        assert_eq!(config.history_capacity, 75);
    }

    #[test]
    fn test_saved_config_has_only_known_keys() {
        let json = serde_json::to_value(StudioConfig::default()).unwrap();
        let mut keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec!["data_dir", "history_capacity", "log_filter", "premium_threshold", "trial_grant"]
        );
    }

    #[test]
    fn test_sanitize_restores_empty_log_filter() {
        let mut config = StudioConfig::default();
        config.log_filter = "   ".to_string();
        config.sanitize();
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn test_serde_round_trip() {
        let mut config = StudioConfig::default();
        config.trial_grant = 10;
        config.data_dir = "/var/lib/studio".to_string();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: StudioConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.trial_grant, 10);
        assert_eq!(parsed.data_dir, "/var/lib/studio");
        assert_eq!(parsed.history_capacity, config.history_capacity);
    }

    #[test]
    fn test_missing_fields_get_defaults() {
        let json = r#"{"trial_grant": 3}"#;
        let parsed: StudioConfig = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.trial_grant, 3);
        assert_eq!(parsed.history_capacity, 50);
        assert_eq!(parsed.log_filter, "info");
    }

    #[test]
    fn test_resolve_data_dir_prefers_env_then_config() {
        // Save and restore env var
        let original = std::env::var(DATA_DIR_ENV).ok();

        std::env::set_var(DATA_DIR_ENV, "/custom/path");
        let mut config = StudioConfig::default();
        config.data_dir = "/from/config".to_string();
        assert_eq!(config.resolve_data_dir(), PathBuf::from("/custom/path"));

        std::env::remove_var(DATA_DIR_ENV);
        assert_eq!(config.resolve_data_dir(), PathBuf::from("/from/config"));

        config.data_dir.clear();
        assert!(config.resolve_data_dir().ends_with(".data"));

        match original {
            Some(val) => std::env::set_var(DATA_DIR_ENV, val),
            None => std::env::remove_var(DATA_DIR_ENV),
        }
    }
}
