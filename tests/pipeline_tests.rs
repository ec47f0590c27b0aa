//! End-to-end pipeline tests.
//!
//! Each test builds a project on disk with tempfile, runs it through a
//! [`Processor`] backed by an in-memory store, and inspects the outcome and
//! the persisted rows.

use reqtrace::config::Config;
use reqtrace::db::Database;
use reqtrace::pipeline::Processor;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Fixture {
    temp: TempDir,
    db: Database,
}

impl Fixture {
    fn new() -> Self {
        let temp = TempDir::new().expect("temp dir");
        let schema_dir = temp.path().join("schemas/1.0");
        std::fs::create_dir_all(&schema_dir).unwrap();
        std::fs::copy(
            Path::new(env!("CARGO_MANIFEST_DIR")).join("schemas/1.0/project.schema.json"),
            schema_dir.join("project.schema.json"),
        )
        .unwrap();
        std::fs::copy(
            Path::new(env!("CARGO_MANIFEST_DIR")).join("schemas/1.0/template.schema.json"),
            schema_dir.join("template.schema.json"),
        )
        .unwrap();

        Self {
            temp,
            db: Database::open_in_memory().expect("in-memory database"),
        }
    }

    fn config(&self) -> Config {
        let mut config = Config::default();
        config.validation.schema_dir_path = self.temp.path().join("schemas");
        config
    }

    fn processor(&self) -> Processor {
        Processor::new(self.config(), self.db.clone())
    }

    fn write_template(&self, name: &str, content: Value) -> String {
        let dir = self.temp.path().join("templates");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(name), serde_json::to_string_pretty(&content).unwrap()).unwrap();
        format!("templates/{name}")
    }

    fn write_requirement(&self, name: &str, content: &str) -> String {
        let dir = self.temp.path().join("reqs");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(name), content).unwrap();
        format!("reqs/{name}")
    }

    fn write_project(&self, templates: &[String], requirements: &[String]) -> PathBuf {
        let project = json!({
            "version": "1.0",
            "itemGroup": {
                "templates": templates.iter().map(|p| json!({"filePath": p})).collect::<Vec<_>>(),
                "requirements": requirements.iter().map(|p| json!({"filePath": p})).collect::<Vec<_>>(),
            }
        });
        let path = self.temp.path().join("project.json");
        std::fs::write(&path, serde_json::to_string_pretty(&project).unwrap()).unwrap();
        path
    }

    fn failures(data: &str) -> Vec<Value> {
        serde_json::from_str::<Vec<Value>>(data).expect("failure list parses")
    }
}

fn base_template() -> Value {
    json!({
        "id": "/templates/req",
        "conversionRules": [
            {"field": "title", "path": "$.children[?(@.type == 'heading')].children[0].literal"}
        ],
        "verificationRules": {
            "type": "object",
            "required": ["artefactType", "artefactId", "title"],
            "properties": {
                "artefactType": {"type": "string"},
                "artefactId": {"type": "string"},
                "title": {"type": "string"}
            }
        }
    })
}

fn requirement_doc(title: &str, template: &str, artifact: &str, traces: &[(&str, &str)]) -> String {
    let mut doc = format!("# {title}\n\n[template]({template})\n\n[id]({artifact})\n");
    for (dest, label) in traces {
        doc.push_str(&format!("\n[{label}]({dest})\n"));
    }
    doc
}

mod round_trip_tests {
    use super::*;

    #[tokio::test]
    async fn requirement_converts_persists_and_links() {
        let fx = Fixture::new();
        let template = fx.write_template("req.json", base_template());
        let one = fx.write_requirement(
            "one.md",
            &requirement_doc("Widget", "/templates/req", "ART-1", &[("ART-2", "depends")]),
        );
        let two = fx.write_requirement(
            "two.md",
            &requirement_doc("Gadget", "/templates/req", "ART-2", &[]),
        );
        let project = fx.write_project(&[template], &[one, two]);

        let outcome = fx
            .processor()
            .process_project(&project)
            .await
            .expect("run succeeds");
        assert!(!outcome.has_data, "unexpected failures: {}", outcome.data);

        let dump = fx.db.dump_all().unwrap();
        let artifacts = dump["Artifacts"].as_array().unwrap();
        assert_eq!(artifacts.len(), 2);

        let surrogate = |artifact: &str| -> i64 {
            artifacts
                .iter()
                .find(|a| a["artifact_id"] == artifact)
                .expect("artifact row")["id"]
                .as_i64()
                .unwrap()
        };

        let links = dump["ArtifactLinks"].as_array().unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0]["source_artifact_id"].as_i64(), Some(surrogate("ART-1")));
        assert_eq!(
            links[0]["destination_artifact_id"].as_i64(),
            Some(surrogate("ART-2"))
        );
        assert_eq!(links[0]["field_name"], "depends");
    }

    #[tokio::test]
    async fn unresolved_trace_destination_creates_no_row_and_no_failure() {
        let fx = Fixture::new();
        let template = fx.write_template("req.json", base_template());
        let one = fx.write_requirement(
            "one.md",
            &requirement_doc("Widget", "/templates/req", "ART-1", &[("GHOST-9", "depends")]),
        );
        let project = fx.write_project(&[template], &[one]);

        let outcome = fx.processor().process_project(&project).await.unwrap();
        assert!(!outcome.has_data, "unexpected failures: {}", outcome.data);

        let dump = fx.db.dump_all().unwrap();
        assert_eq!(dump["Artifacts"].as_array().unwrap().len(), 1);
        assert!(dump["ArtifactLinks"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn inherited_template_chain_persists_base_first() {
        let fx = Fixture::new();
        let base = fx.write_template(
            "base.json",
            json!({
                "id": "/templates/base",
                "isAbstract": true,
                "conversionRules": [
                    {"field": "title", "path": "$.children[?(@.type == 'heading')].children[0].literal"}
                ],
                "verificationRules": {
                    "type": "object",
                    "required": ["title"],
                    "properties": {"title": {"type": "string"}}
                }
            }),
        );
        let child = fx.write_template(
            "child.json",
            json!({"id": "/templates/child", "base": "/templates/base"}),
        );
        let one = fx.write_requirement(
            "one.md",
            &requirement_doc("Widget", "/templates/child", "ART-1", &[]),
        );
        // child declared before base in the project
        let project = fx.write_project(&[child, base], &[one]);

        let outcome = fx.processor().process_project(&project).await.unwrap();
        assert!(!outcome.has_data, "unexpected failures: {}", outcome.data);

        let dump = fx.db.dump_all().unwrap();
        let templates = dump["ArtifactTemplates"].as_array().unwrap();
        assert_eq!(templates.len(), 2);

        let base_row = templates
            .iter()
            .find(|t| t["template_id"] == "/templates/base")
            .unwrap();
        let child_row = templates
            .iter()
            .find(|t| t["template_id"] == "/templates/child")
            .unwrap();
        assert!(base_row["base_id"].is_null());
        assert_eq!(base_row["is_abstract"], true);
        assert_eq!(child_row["base_id"], base_row["id"]);
        // base inserted before child
        assert!(base_row["id"].as_i64() < child_row["id"].as_i64());
    }
}

mod failure_tests {
    use super::*;

    #[tokio::test]
    async fn requirement_with_one_link_is_reported_others_still_persist() {
        let fx = Fixture::new();
        let template = fx.write_template("req.json", base_template());
        let one = fx.write_requirement(
            "one.md",
            &requirement_doc("Widget", "/templates/req", "ART-1", &[]),
        );
        let two = fx.write_requirement("two.md", "# Broken\n\n[template](/templates/req)\n");
        let three = fx.write_requirement(
            "three.md",
            &requirement_doc("Gizmo", "/templates/req", "ART-3", &[]),
        );
        let project = fx.write_project(&[template], &[one, two, three]);

        let outcome = fx.processor().process_project(&project).await.unwrap();
        assert!(outcome.has_data);

        let failures = Fixture::failures(&outcome.data);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0]["errorCode"], "TOO_FEW_LINKS");
        assert!(
            failures[0]["filePath"]
                .as_str()
                .unwrap()
                .ends_with("two.md")
        );

        let dump = fx.db.dump_all().unwrap();
        assert_eq!(dump["Artifacts"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unknown_template_is_reported_and_requirement_skipped() {
        let fx = Fixture::new();
        let template = fx.write_template("req.json", base_template());
        let good = fx.write_requirement(
            "good.md",
            &requirement_doc("Widget", "/templates/req", "ART-1", &[]),
        );
        let bad = fx.write_requirement(
            "bad.md",
            &requirement_doc("Stray", "/templates/unknown", "ART-2", &[]),
        );
        let project = fx.write_project(&[template], &[good, bad]);

        let outcome = fx.processor().process_project(&project).await.unwrap();
        assert!(outcome.has_data);

        let failures = Fixture::failures(&outcome.data);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0]["errorCode"], "TEMPLATE_NOT_FOUND");

        // the unbound requirement was not persisted
        let dump = fx.db.dump_all().unwrap();
        let artifacts = dump["Artifacts"].as_array().unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0]["artifact_id"], "ART-1");
    }

    #[tokio::test]
    async fn failed_field_conversion_reports_both_failures_but_persists() {
        let fx = Fixture::new();
        // the title path will match nothing in a heading-less document
        let template = fx.write_template("req.json", base_template());
        let one = fx.write_requirement(
            "one.md",
            "[template](/templates/req)\n\n[id](ART-1)\n",
        );
        let project = fx.write_project(&[template], &[one]);

        let outcome = fx.processor().process_project(&project).await.unwrap();
        assert!(outcome.has_data);

        let failures = Fixture::failures(&outcome.data);
        let codes: Vec<&str> = failures
            .iter()
            .map(|f| f["errorCode"].as_str().unwrap())
            .collect();
        // stage order within one requirement: conversion before verification
        assert_eq!(codes, vec!["FIELD_CONVERSION_FAILED", "VERIFICATION_FAILED"]);

        // still persisted despite failing verification
        let dump = fx.db.dump_all().unwrap();
        assert_eq!(dump["Artifacts"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_template_file_is_reported_and_excluded() {
        let fx = Fixture::new();
        let good = fx.write_template("req.json", base_template());
        // missing required "id"
        let bad = fx.write_template("bad.json", json!({"base": "/templates/req"}));
        let one = fx.write_requirement(
            "one.md",
            &requirement_doc("Widget", "/templates/req", "ART-1", &[]),
        );
        let project = fx.write_project(&[good, bad], &[one]);

        let outcome = fx.processor().process_project(&project).await.unwrap();
        assert!(outcome.has_data);

        let failures = Fixture::failures(&outcome.data);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0]["errorCode"], "SCHEMA_VALIDATION_FAILED");

        // the valid template still processed the requirement
        let dump = fx.db.dump_all().unwrap();
        assert_eq!(dump["Artifacts"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn base_cycle_aborts_the_run() {
        let fx = Fixture::new();
        let a = fx.write_template(
            "a.json",
            json!({"id": "/templates/a", "base": "/templates/b"}),
        );
        let b = fx.write_template(
            "b.json",
            json!({"id": "/templates/b", "base": "/templates/a"}),
        );
        let project = fx.write_project(&[a, b], &[]);

        let err = fx
            .processor()
            .process_project(&project)
            .await
            .expect_err("cycle must be fatal");
        assert!(err.to_string().contains("loop detected"));
    }
}

mod semantic_rule_tests {
    use super::*;

    fn template_with_rule() -> Value {
        let mut template = base_template();
        template["validationRules"] = json!([{
            "name": "artifact must have an outgoing link",
            "query": {
                "tables": [
                    {"alias": "l", "table": "ArtifactLinks"},
                    {"alias": "a", "table": "Artifacts"}
                ],
                "where": {
                    "clause": "l.SourceArtifactId = a.Id AND a.ArtifactId = ?",
                    "parameters": ["@artifactId"]
                }
            }
        }]);
        template
    }

    #[tokio::test]
    async fn rule_failure_is_reported_per_artifact() {
        let fx = Fixture::new();
        let template = fx.write_template("req.json", template_with_rule());
        let one = fx.write_requirement(
            "one.md",
            &requirement_doc("Widget", "/templates/req", "ART-1", &[("ART-2", "depends")]),
        );
        // ART-2 has no outgoing links, so the rule fails for it
        let two = fx.write_requirement(
            "two.md",
            &requirement_doc("Gadget", "/templates/req", "ART-2", &[]),
        );
        let project = fx.write_project(&[template], &[one, two]);

        let outcome = fx.processor().process_project(&project).await.unwrap();
        assert!(outcome.has_data);

        let failures = Fixture::failures(&outcome.data);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0]["errorCode"], "RULE_FAILED");
        assert_eq!(failures[0]["filePath"], "ART-2");
        assert_eq!(
            failures[0]["errorDescription"],
            "artifact must have an outgoing link"
        );
    }

    #[tokio::test]
    async fn ill_formed_rule_passes_trivially() {
        let fx = Fixture::new();
        let mut template = base_template();
        template["validationRules"] = json!([{
            "name": "query against unknown table",
            "query": {
                "tables": [{"alias": "x", "table": "NotATable"}],
                "where": {"clause": "x.Id = ?", "parameters": ["@artifactId"]}
            }
        }]);
        let template = fx.write_template("req.json", template);
        let one = fx.write_requirement(
            "one.md",
            &requirement_doc("Widget", "/templates/req", "ART-1", &[]),
        );
        let project = fx.write_project(&[template], &[one]);

        let outcome = fx.processor().process_project(&project).await.unwrap();
        assert!(!outcome.has_data, "unexpected failures: {}", outcome.data);
    }
}
