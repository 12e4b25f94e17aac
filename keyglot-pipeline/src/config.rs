//! Configuration: thresholds, timings, and punctuation sets loaded once
//! at startup from a layered TOML document, the same default-embedded /
//! user-override-merged shape the teacher uses for `config::settings`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const DEFAULT_CONFIG_TOML: &str = include_str!("../config/default.toml");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub excluded_app_ids: Vec<String>,
    pub detection: DetectionThresholds,
    pub validation: ValidationThresholds,
    pub scoring: ScoringThresholds,
    pub heuristic: HeuristicThresholds,
    pub timing: TimingSettings,
    pub correction: CorrectionConstants,
    pub punctuation: PunctuationSets,
    pub short_word_map: Vec<ShortWordMapping>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionThresholds {
    pub auto_threshold: f32,
    pub defer_threshold: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationThresholds {
    pub length_ratio_min: f32,
    pub length_ratio_max: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringThresholds {
    pub short_word_min_confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeuristicThresholds {
    pub script_dominant_fraction: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingSettings {
    pub buffer_timeout_ms: u64,
    pub cycling_retention_ms: u64,
    pub recent_correction_window_ms: u64,
    pub cycling_min_duration_ms: u64,
    pub clipboard_delay_ms: u64,
    pub paste_delay_ms: u64,
    pub type_chunk_chars: usize,
    pub delete_chunk_delay_ms: u64,
    pub accessibility_poll_ms: u64,
    pub pending_word_timeout_ms: u64,
    pub phrase_buffer_idle_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionConstants {
    pub context_boost: f32,
    pub history_cap: usize,
    pub round1_visible: usize,
    pub round2_visible: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PunctuationSets {
    pub word_boundary_chars: String,
}

impl PunctuationSets {
    pub fn is_boundary(&self, c: char) -> bool {
        self.word_boundary_chars.contains(c)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortWordMapping {
    pub from_key: char,
    pub to_ru: char,
}

impl Default for Configuration {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG_TOML).expect("embedded default.toml must be valid")
    }
}

fn merge_toml(base: &mut toml::Value, overlay: &toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                if let Some(base_value) = base_table.get_mut(key) {
                    merge_toml(base_value, value);
                } else {
                    base_table.insert(key.clone(), value.clone());
                }
            }
        }
        (base, _) => {
            *base = overlay.clone();
        }
    }
}

fn parse_with_defaults(user_content: &str) -> Result<Configuration> {
    let mut base: toml::Value = toml::from_str(DEFAULT_CONFIG_TOML)?;
    let user: toml::Value = toml::from_str(user_content)?;
    merge_toml(&mut base, &user);
    let config: Configuration = base.try_into()?;
    Ok(config)
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "keyglot", "keyglot")
}

impl Configuration {
    pub fn data_dir() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.data_dir().to_path_buf())
    }

    pub fn config_dir() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
    }

    pub fn config_file() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Default location of the user dictionary's persistence file:
    /// `~/.local/share/keyglot/user_dictionary.tsv`.
    pub fn user_dictionary_file() -> Option<PathBuf> {
        Self::data_dir().map(|dir| dir.join("user_dictionary.tsv"))
    }

    /// Load from the default config file location, falling back to
    /// embedded defaults if it does not exist. Never hard-fails:
    /// missing config directory or missing file both fall back.
    pub fn load() -> Self {
        let Some(config_file) = Self::config_file() else {
            warn!("could not determine config directory, using defaults");
            return Self::default();
        };
        if !config_file.exists() {
            debug!("config file not found, using defaults");
            return Self::default();
        }
        debug!(path = ?config_file, "loading configuration");
        match fs::read_to_string(&config_file).map_err(anyhow::Error::from).and_then(|content| parse_with_defaults(&content)) {
            Ok(config) => config,
            Err(err) => {
                warn!(error = %err, "configuration load failed, using defaults");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        parse_with_defaults(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn default_configuration_matches_spec_constants() {
        let config = Configuration::default();
        assert_eq!(config.correction.context_boost, 0.20);
        assert_eq!(config.correction.history_cap, 50);
        assert_eq!(config.timing.buffer_timeout_ms, 2000);
        assert_eq!(config.timing.cycling_retention_ms, 60000);
        assert_eq!(config.short_word_map.len(), 7);
    }

    #[test]
    fn partial_override_falls_back_to_defaults_for_unspecified() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[detection]
auto_threshold = 0.9
"#
        )
        .unwrap();
        let config = Configuration::load_from(file.path()).unwrap();
        assert_eq!(config.detection.auto_threshold, 0.9);
        assert_eq!(config.detection.defer_threshold, 0.45);
    }

    #[test]
    fn boundary_chars_include_spec_set() {
        let config = Configuration::default();
        for c in [' ', '\t', '\n', '.', '!', '?', ':', ')', ']', '}', '"'] {
            assert!(config.punctuation.is_boundary(c), "missing boundary char {c:?}");
        }
    }

    #[test]
    fn missing_config_file_uses_defaults() {
        let config = Configuration::load_from(Path::new("/nonexistent/keyglot/config.toml"));
        assert!(config.is_err());
    }
}
