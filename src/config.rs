/// Comparison configuration
///
/// Describes how the table columns are named and which pairs of columns get
/// a computed difference. Configurations are JSON files, looked up by path
/// or by name in the user's config directory, with a built-in default.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{ImcompError, Result};

/// Name of the built-in configuration
pub const DEFAULT_CONFIG_NAME: &str = "default";

/// Column naming and derived-column settings
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ComparisonConfig {
    /// Configuration name, stored in the run parameters as `config_name`
    pub config_name: String,

    /// Name of the primary input column
    /// - Filled only when `guess_input` is set
    pub input: String,

    /// Prefix of the per-set output columns
    /// - One column per (prefix, image set)
    pub outputs: Vec<String>,

    /// Pairs of columns to compare, `[left, right]`
    pub diff: Vec<[String; 2]>,

    /// Look for the original input image next to the set outputs
    pub guess_input: bool,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            config_name: DEFAULT_CONFIG_NAME.to_string(),
            input: "input".to_string(),
            outputs: vec!["out".to_string()],
            diff: vec![["out_set0".to_string(), "out_set1".to_string()]],
            guess_input: false,
        }
    }
}

impl ComparisonConfig {
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Resolve `name_or_path`: an existing file, else `<config dir>/imcomp/<name>.json`,
    /// else the built-in default when the name is `default`.
    pub fn load(name_or_path: &str) -> Result<Self> {
        let direct = Path::new(name_or_path);
        if direct.is_file() {
            return Self::read(direct);
        }

        if let Some(path) = Self::user_config_path(name_or_path) {
            if path.is_file() {
                return Self::read(&path);
            }
            debug!("no configuration at {}", path.display());
        }

        if name_or_path == DEFAULT_CONFIG_NAME || name_or_path.is_empty() {
            return Ok(Self::default());
        }

        Err(ImcompError::Config(format!(
            "configuration '{}' not found",
            name_or_path
        )))
    }

    fn read(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        let config = Self::from_json(&json).map_err(|e| {
            ImcompError::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;
        info!("configuration '{}' read from {}", config.config_name, path.display());
        Ok(config)
    }

    /// Where named configurations live:
    /// - Linux: ~/.config/imcomp/<name>.json
    /// - macOS: ~/Library/Application Support/imcomp/<name>.json
    /// - Windows: %APPDATA%\imcomp\<name>.json
    fn user_config_path(name: &str) -> Option<PathBuf> {
        let mut path = dirs::config_dir().or_else(dirs::home_dir)?;
        path.push("imcomp");
        path.push(format!("{}.json", name));
        Some(path)
    }
}
