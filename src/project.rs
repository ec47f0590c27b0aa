//! Project file loading: version mapping, structural validation, and
//! resolution of the template/requirement file lists.

use crate::config::{Config, ProjectLoaderKind};
use crate::error::{Error, Result, ValidationFailure};
use crate::template::RawTemplate;
use crate::{paths, schema};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// The project document shape (`version` + `itemGroup`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFile {
    pub version: String,
    pub item_group: ItemGroup,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemGroup {
    #[serde(default)]
    pub templates: Option<Vec<ItemRef>>,
    #[serde(default)]
    pub requirements: Option<Vec<ItemRef>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRef {
    pub file_path: String,
}

/// A validated project with its file lists resolved to absolute paths.
#[derive(Debug, Clone)]
pub struct LoadedProject {
    pub project_path: PathBuf,
    pub version: String,
    pub template_files: Vec<PathBuf>,
    pub requirement_files: Vec<PathBuf>,
}

/// Load and validate the project file.
///
/// Fatal when the version field is missing, no validator mapping covers the
/// version, the version's project schema cannot be read, or the project
/// fails structural validation.
pub async fn load_project(config: &Config, project_file: &Path) -> Result<LoadedProject> {
    let project_path = paths::resolve_project_path(project_file);
    let content = tokio::fs::read_to_string(&project_path).await?;
    let project_json: Value = serde_json::from_str(&content)?;

    let version = project_json
        .get("version")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::MissingVersion(project_path.clone()))?;
    info!(version = %version, path = %project_path.display(), "Project file detected version");

    let mapping = config
        .mapping_for_version(&version)
        .ok_or_else(|| Error::UnsupportedVersion(version.clone()))?;

    let schema_file = paths::schema_path(
        &config.validation.schema_dir_path,
        &version,
        &config.validation.project_schema_file,
    );
    debug!(schema = %schema_file.display(), "Validating project file against schema");
    let schema_json: Value = serde_json::from_str(&tokio::fs::read_to_string(&schema_file).await?)?;

    let outcome = schema::validate(&project_json, &schema_json)?;
    if !outcome.success {
        return Err(Error::ProjectInvalid(outcome.description()));
    }

    let project: ProjectFile = serde_json::from_value(project_json)?;
    match mapping.loader {
        ProjectLoaderKind::ItemGroup => resolve_item_group(&project_path, version, &project),
    }
}

/// Resolve the item-group file lists relative to the project file's
/// directory. A project naming neither templates nor requirements is fatal.
fn resolve_item_group(
    project_path: &Path,
    version: String,
    project: &ProjectFile,
) -> Result<LoadedProject> {
    let base_dir = paths::project_dir(project_path);

    let resolve_group = |group: &Option<Vec<ItemRef>>| -> Vec<PathBuf> {
        group
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|item| paths::resolve_relative(&base_dir, &item.file_path))
            .collect()
    };

    let template_files = resolve_group(&project.item_group.templates);
    let requirement_files = resolve_group(&project.item_group.requirements);

    if template_files.is_empty() && requirement_files.is_empty() {
        return Err(Error::EmptyProject);
    }

    Ok(LoadedProject {
        project_path: project_path.to_path_buf(),
        version,
        template_files,
        requirement_files,
    })
}

/// Raw templates that passed structural validation, plus the failures for
/// those that did not.
pub struct TemplateLoadResult {
    pub raw: Vec<RawTemplate>,
    pub failures: Vec<ValidationFailure>,
}

/// Load every template file and validate it against the version's template
/// schema. Invalid templates are reported and excluded; the run continues.
pub async fn load_templates(config: &Config, project: &LoadedProject) -> Result<TemplateLoadResult> {
    let schema_file = paths::schema_path(
        &config.validation.schema_dir_path,
        &project.version,
        &config.validation.template_schema_file,
    );
    debug!(schema = %schema_file.display(), "Loading template schema");
    let template_schema: Value =
        serde_json::from_str(&tokio::fs::read_to_string(&schema_file).await?)?;

    let mut raw = Vec::new();
    let mut failures = Vec::new();

    for file in &project.template_files {
        info!(path = %file.display(), "Loading template file");
        let content = tokio::fs::read_to_string(file).await?;
        let template_json: Value = serde_json::from_str(&content)?;

        let outcome = schema::validate(&template_json, &template_schema)?;
        if outcome.success {
            raw.push(serde_json::from_value::<RawTemplate>(template_json)?);
        } else {
            failures.push(ValidationFailure::schema_invalid(
                &outcome.description(),
                &file.to_string_lossy(),
            ));
        }
    }

    Ok(TemplateLoadResult { raw, failures })
}
