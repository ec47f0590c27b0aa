//! Configuration loader with tier-based merging.
//!
//! Tiers, lowest to highest: embedded defaults, project `reqtrace.yaml`,
//! user `~/.reqtrace/reqtrace.yaml`, environment variables. Later tiers
//! override earlier ones field by field.

use super::Config;
use anyhow::Result;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Config file name looked up in each tier directory.
const CONFIG_FILE: &str = "reqtrace.yaml";

/// Paths for each configuration tier.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    /// Project-level config directory (usually the working directory).
    pub project_dir: Option<PathBuf>,
    /// User-level config directory (~/.reqtrace).
    pub user_dir: Option<PathBuf>,
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self::discover()
    }
}

impl ConfigPaths {
    /// Discover configuration paths from environment and defaults.
    pub fn discover() -> Self {
        let user_dir = std::env::var("REQTRACE_USER_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".reqtrace")));

        let project_dir = std::env::var("REQTRACE_PROJECT_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| Some(PathBuf::from(".")));

        Self {
            project_dir,
            user_dir,
        }
    }

    /// Create paths with explicit directories.
    pub fn with_dirs(project_dir: Option<PathBuf>, user_dir: Option<PathBuf>) -> Self {
        Self {
            project_dir,
            user_dir,
        }
    }
}

/// Configuration loader that handles tier-based merging.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    pub paths: ConfigPaths,
    config: Config,
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Load configuration from all tiers with proper merging.
    pub fn load() -> Result<Self> {
        Self::load_with_paths(ConfigPaths::discover())
    }

    /// Load configuration with explicit paths.
    pub fn load_with_paths(paths: ConfigPaths) -> Result<Self> {
        // Explicit config path overrides the tier search entirely
        if let Ok(explicit_path) = std::env::var("REQTRACE_CONFIG_PATH") {
            let path = PathBuf::from(&explicit_path);
            let content = std::fs::read_to_string(&path)?;
            let mut config: Config = serde_yaml::from_str(&content)?;
            Self::apply_env_overrides(&mut config);
            return Ok(Self {
                paths,
                config,
                config_path: Some(path),
            });
        }

        let mut layers: Vec<Value> = Vec::new();
        layers.push(serde_json::to_value(Config::default())?);

        let mut config_path = None;
        if let Some(ref project_dir) = paths.project_dir
            && let Some(value) = read_config_file(&project_dir.join(CONFIG_FILE))
        {
            config_path = Some(project_dir.join(CONFIG_FILE));
            layers.push(value);
        }

        if let Some(ref user_dir) = paths.user_dir
            && let Some(value) = read_config_file(&user_dir.join(CONFIG_FILE))
        {
            layers.push(value);
        }

        let merged = deep_merge_all(layers);
        let mut config: Config = serde_json::from_value(merged)?;
        Self::apply_env_overrides(&mut config);

        Ok(Self {
            paths,
            config,
            config_path,
        })
    }

    /// Apply environment variable overrides to config.
    fn apply_env_overrides(config: &mut Config) {
        if let Ok(db_path) = std::env::var("REQTRACE_DB_PATH") {
            config.database.db_path = PathBuf::from(db_path);
        }

        if let Ok(schema_dir) = std::env::var("REQTRACE_SCHEMA_DIR") {
            config.validation.schema_dir_path = PathBuf::from(schema_dir);
        }
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get mutable access to the configuration.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Get the config file path that was used.
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}

fn read_config_file(path: &Path) -> Option<Value> {
    if !path.exists() {
        return None;
    }
    let content = std::fs::read_to_string(path).ok()?;
    match serde_yaml::from_str::<Value>(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Skipping unparseable config file");
            None
        }
    }
}

/// Deep-merge JSON values in order; later layers win. Objects merge
/// key-by-key, everything else replaces wholesale.
fn deep_merge_all(layers: Vec<Value>) -> Value {
    let mut merged = Value::Null;
    for layer in layers {
        merged = deep_merge(merged, layer);
    }
    merged
}

fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged_value = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged_value);
            }
            Value::Object(base_map)
        }
        (base, Value::Null) => base,
        (_, overlay) => overlay,
    }
}
