//! Requirement processing pipeline and the run's entry point.
//!
//! [`Processor::process_project`] drives the whole run: project load,
//! template validation and resolution, template persistence, per-requirement
//! pipelines, artifact/link persistence, and semantic rule validation.
//! Validation failures accumulate into one list instead of aborting; only
//! the fatal class of errors stops the run.

use crate::config::Config;
use crate::db::{self, Database};
use crate::error::{Error, Result, ValidationFailure};
use crate::template::{ConversionRule, TemplateSet, build_templates};
use crate::types::{
    ConvertedRequirement, NewArtifact, NewLink, ParsedRequirement, ProcessedRequirement,
};
use crate::{markdown, project, query, schema};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Result surfaced to the caller: whether any failures accumulated, and the
/// JSON-serialized failure list.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub has_data: bool,
    pub data: String,
}

/// Drives one project through the full pipeline against one store.
pub struct Processor {
    config: Config,
    db: Database,
}

impl Processor {
    pub fn new(config: Config, db: Database) -> Self {
        Self { config, db }
    }

    /// Process a project file end to end.
    ///
    /// Returns the accumulated failure list on success; fatal errors (see
    /// [`Error`]) abort the run and in-flight requirement pipelines are
    /// discarded.
    pub async fn process_project(&self, project_file: &Path) -> Result<ProcessOutcome> {
        let mut failures: Vec<ValidationFailure> = Vec::new();

        let loaded = project::load_project(&self.config, project_file).await?;
        info!(
            templates = loaded.template_files.len(),
            requirements = loaded.requirement_files.len(),
            "Project loaded"
        );

        let template_load = project::load_templates(&self.config, &loaded).await?;
        failures.extend(template_load.failures);

        let set = Arc::new(build_templates(template_load.raw)?);

        // Root-first, strictly serialized template writes, then the logical
        // id -> surrogate id mapping for the requirement stage.
        db::templates::store_templates(&self.db, &set)?;
        let template_ids = db::templates::template_id_map(&self.db, &set)?;

        let processed = self
            .run_requirement_pipelines(&loaded.requirement_files, &set, &mut failures)
            .await?;

        self.persist_requirements(&template_ids, &processed)?;
        self.validate_requirements(&set, &processed, &mut failures)?;

        Ok(ProcessOutcome {
            has_data: !failures.is_empty(),
            data: serde_json::to_string(&failures)?,
        })
    }

    /// Fan the per-requirement pipelines out as concurrent tasks.
    ///
    /// Tasks complete in any order, so the failure list's cross-requirement
    /// ordering is unspecified; failures for one requirement stay in stage
    /// order because each task returns its own ordered list.
    async fn run_requirement_pipelines(
        &self,
        requirement_files: &[PathBuf],
        set: &Arc<TemplateSet>,
        failures: &mut Vec<ValidationFailure>,
    ) -> Result<Vec<ProcessedRequirement>> {
        let mut tasks = JoinSet::new();
        for path in requirement_files {
            let path = path.clone();
            let set = Arc::clone(set);
            tasks.spawn(async move { process_requirement(path, set).await });
        }

        let mut processed = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let (requirement, requirement_failures) = joined??;
            failures.extend(requirement_failures);
            if let Some(requirement) = requirement {
                processed.push(requirement);
            }
        }
        Ok(processed)
    }

    /// Store artifacts, map them back to surrogate ids, and store resolved
    /// trace links. Runs only after every requirement pipeline finished, so
    /// link resolution sees the complete artifact set.
    fn persist_requirements(
        &self,
        template_ids: &HashMap<usize, i64>,
        processed: &[ProcessedRequirement],
    ) -> Result<()> {
        if processed.is_empty() {
            return Ok(());
        }

        let artifacts: Vec<NewArtifact> = processed
            .iter()
            .map(|req| {
                // every bound template_idx came out of the resolved set, so
                // the id map covers it; a miss is internal inconsistency
                template_ids
                    .get(&req.template_idx)
                    .copied()
                    .map(|template_id| NewArtifact {
                        template_id,
                        artifact_id: req.artefact_id_path.clone(),
                    })
                    .ok_or_else(|| Error::TemplateLookup(req.converted.artefact_type()))
            })
            .collect::<Result<_>>()?;
        self.db.store_artifacts(&artifacts)?;

        let surrogates = self.artifact_surrogates(processed)?;
        let links = resolve_links(processed, &surrogates)?;
        self.db.store_links(&links)?;
        Ok(())
    }

    /// Map each processed requirement's logical artifact id to the surrogate
    /// id the store assigned. A miss here is an internal consistency
    /// violation and fatal.
    fn artifact_surrogates(
        &self,
        processed: &[ProcessedRequirement],
    ) -> Result<HashMap<String, i64>> {
        let pairs = self.db.all_artifacts()?;
        let mut by_logical_id: HashMap<String, i64> = HashMap::new();
        for (surrogate, artifact_id) in pairs {
            by_logical_id.entry(artifact_id).or_insert(surrogate);
        }

        for req in processed {
            if !by_logical_id.contains_key(&req.artefact_id_path) {
                return Err(Error::ArtifactLookup(req.artefact_id_path.clone()));
            }
        }
        Ok(by_logical_id)
    }

    /// Run every bound template's own validation rules against the store.
    fn validate_requirements(
        &self,
        set: &TemplateSet,
        processed: &[ProcessedRequirement],
        failures: &mut Vec<ValidationFailure>,
    ) -> Result<()> {
        for req in processed {
            let model = set.arena.get(req.template_idx);
            let Some(rules) = &model.raw.validation_rules else {
                continue;
            };
            for rule in rules {
                info!(
                    artifact = %req.artefact_id_path,
                    rule = %rule.name,
                    "Attempt to validate requirement"
                );
                if let Some(0) = self
                    .db
                    .count_rule_matches(&rule.query, &req.artefact_id_path)?
                {
                    failures.push(ValidationFailure::rule_failed(
                        &rule.name,
                        &req.artefact_id_path,
                    ));
                }
            }
        }
        Ok(())
    }

    /// Dump the store content (`--show-database`).
    pub fn database_content(&self) -> Result<Value> {
        self.db.dump_all()
    }
}

/// One requirement's pipeline: load, parse, link, template-bind, convert,
/// verify. Stage order is strict; failures accumulate into the returned
/// list. Returns `None` for the requirement when it cannot be bound to a
/// template (downstream stages are skipped for it, per the failure already
/// recorded).
async fn process_requirement(
    path: PathBuf,
    set: Arc<TemplateSet>,
) -> Result<(Option<ProcessedRequirement>, Vec<ValidationFailure>)> {
    let path_str = path.to_string_lossy().to_string();
    let mut failures = Vec::new();

    info!(path = %path_str, "Parsing document");
    let content = tokio::fs::read_to_string(&path).await?;
    let parsed = parse_requirement(&path_str, &content, &mut failures);

    let (Some(template_path), Some(artefact_id_path)) =
        (parsed.template_path, parsed.artefact_id_path)
    else {
        // degraded: not enough links to even name a template and an artifact
        return Ok((None, failures));
    };

    if template_path.trim().len() < 2 {
        failures.push(ValidationFailure::link_too_short(&path_str));
        return Ok((None, failures));
    }

    let Some(template_idx) = set.lookup(&template_path)? else {
        failures.push(ValidationFailure::template_not_found(
            &template_path,
            &path_str,
        ));
        return Ok((None, failures));
    };

    info!(path = %path_str, "Converting document");
    let tree_json = serde_json::to_value(&parsed.document_tree)?;
    let mut converted = ConvertedRequirement::new(&template_path, &artefact_id_path);
    for rule in set.arena.effective_conversion_rules(template_idx) {
        match convert_field(&tree_json, &rule) {
            Ok(value) => converted.set_field(&rule.field, value),
            Err(reason) => {
                failures.push(ValidationFailure::conversion_failed(
                    &rule.field,
                    &reason,
                    &path_str,
                ));
            }
        }
    }

    info!(path = %path_str, "Verifying document");
    let verification_schema = set.arena.effective_verification_schema(template_idx);
    let outcome = schema::validate(&converted.as_value(), &verification_schema)?;
    let verification_succeeded = outcome.success;
    if !verification_succeeded {
        failures.push(ValidationFailure::verification_failed(
            &outcome.description(),
            &path_str,
        ));
    }

    Ok((
        Some(ProcessedRequirement {
            requirement_path: path_str,
            artefact_id_path,
            template_idx,
            converted,
            effective_links: parsed.effective_links,
            verification_succeeded,
        }),
        failures,
    ))
}

/// Parse a requirement document and pull the link header apart: first link
/// names the template, second the artifact id, the rest are trace
/// candidates. Fewer than two links is a recorded failure, not a fatal
/// error.
fn parse_requirement(
    path_str: &str,
    content: &str,
    failures: &mut Vec<ValidationFailure>,
) -> ParsedRequirement {
    let tree = markdown::parse_document(content);
    let mut links = markdown::extract_links(&tree);
    if links.len() < 2 {
        failures.push(ValidationFailure::too_few_links(path_str));
    }

    let effective_links = if links.len() > 2 {
        links.split_off(2)
    } else {
        Vec::new()
    };
    let mut header = links.into_iter();

    ParsedRequirement {
        requirement_path: path_str.to_string(),
        template_path: header.next().map(|l| l.destination),
        artefact_id_path: header.next().map(|l| l.destination),
        document_tree: tree,
        effective_links,
    }
}

/// Evaluate one conversion rule against the document tree; the first match
/// wins. Evaluator errors and empty results both read as "value not found".
fn convert_field(tree_json: &Value, rule: &ConversionRule) -> std::result::Result<Value, String> {
    match query::query_first(tree_json, &rule.path) {
        Ok(Some(value)) => Ok(value),
        Ok(None) => Err("value not found".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

/// Resolve trace-link destinations against the persisted requirement set.
///
/// Only links whose destination names another persisted requirement become
/// rows; everything else is silently dropped. Labels are truncated to 255
/// characters, empty labels stored as NULL.
fn resolve_links(
    processed: &[ProcessedRequirement],
    surrogates: &HashMap<String, i64>,
) -> Result<Vec<NewLink>> {
    let mut links = Vec::new();
    for req in processed {
        let source = *surrogates
            .get(&req.artefact_id_path)
            .ok_or_else(|| Error::ArtifactLookup(req.artefact_id_path.clone()))?;

        for link in &req.effective_links {
            let Some(&destination) = surrogates.get(&link.destination) else {
                debug!(
                    source = %req.artefact_id_path,
                    destination = %link.destination,
                    "Dropping link to unknown artifact"
                );
                continue;
            };
            links.push(NewLink {
                source_artifact_id: source,
                destination_artifact_id: destination,
                field_name: trim_link_label(&link.label),
            });
        }
    }
    Ok(links)
}

fn trim_link_label(label: &str) -> Option<String> {
    if label.is_empty() {
        None
    } else {
        Some(label.chars().take(255).collect())
    }
}
