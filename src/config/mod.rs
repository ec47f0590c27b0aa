//! Configuration types with serde defaults.
//!
//! The loader in [`loader`] merges tiers (defaults, project file, user file,
//! environment) into one [`Config`]; `main.rs` applies CLI overrides last.

pub mod loader;

pub use loader::{ConfigLoader, ConfigPaths};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub validation: ValidationConfig,
    pub database: DatabaseConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            validation: ValidationConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

/// Where structural schemas live and which loader handles which project version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ValidationConfig {
    /// Directory holding `<version>/<schema file>` trees.
    pub schema_dir_path: PathBuf,
    /// Schema file name for project documents.
    pub project_schema_file: String,
    /// Schema file name for template documents.
    pub template_schema_file: String,
    /// Project-version to loader mappings; a version without a mapping is fatal.
    pub validator_mappings: Vec<ValidatorMapping>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            schema_dir_path: PathBuf::from("schemas"),
            project_schema_file: "project.schema.json".to_string(),
            template_schema_file: "template.schema.json".to_string(),
            validator_mappings: vec![ValidatorMapping {
                version: "1.0".to_string(),
                loader: ProjectLoaderKind::ItemGroup,
            }],
        }
    }
}

/// One supported project version and the loader strategy for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorMapping {
    pub version: String,
    pub loader: ProjectLoaderKind,
}

/// Known project-file loader strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectLoaderKind {
    /// The original `itemGroup`-based project layout.
    ItemGroup,
}

/// Relational store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// SQLite database path; `:memory:` keeps the store in memory.
    pub db_path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("reqtrace.db"),
        }
    }
}

impl Config {
    /// Find the validator mapping for a project version.
    pub fn mapping_for_version(&self, version: &str) -> Option<&ValidatorMapping> {
        self.validation
            .validator_mappings
            .iter()
            .find(|m| m.version == version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_maps_version_1_0() {
        let config = Config::default();
        let mapping = config.mapping_for_version("1.0").expect("1.0 mapping");
        assert_eq!(mapping.loader, ProjectLoaderKind::ItemGroup);
        assert!(config.mapping_for_version("9.9").is_none());
    }

    #[test]
    fn default_schema_files() {
        let config = Config::default();
        assert_eq!(config.validation.project_schema_file, "project.schema.json");
        assert_eq!(
            config.validation.template_schema_file,
            "template.schema.json"
        );
    }
}
