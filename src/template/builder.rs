//! Template build engine: base-reference validation, cycle detection, and
//! resolution of raw documents into an arena of models.

use super::cache::TemplateCache;
use super::{RawTemplate, TemplateArena, TemplateModel};
use crate::error::{Error, Result};
use tracing::debug;

/// The resolved output of a build: the arena plus an id-keyed cache of
/// arena indices.
#[derive(Debug)]
pub struct TemplateSet {
    pub arena: TemplateArena,
    cache: TemplateCache<usize>,
}

impl TemplateSet {
    /// Resolve a logical template id to its arena index.
    pub fn lookup(&self, path: &str) -> Result<Option<usize>> {
        Ok(self.cache.get(path)?.copied())
    }

    /// All normalized template ids, in resolution order.
    pub fn all_keys(&self) -> Vec<&str> {
        self.cache.all_keys()
    }

    /// Iterate resolved arena indices in resolution order.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.cache.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

/// Outcome of the base-chain cycle check.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopCheck {
    pub result: bool,
    /// Id of the document at the pointer meeting point.
    pub source: Option<String>,
    /// Id of that document's base.
    pub destination: Option<String>,
}

impl LoopCheck {
    fn none() -> Self {
        Self {
            result: false,
            source: None,
            destination: None,
        }
    }
}

/// Build resolved template models from raw, individually schema-validated
/// documents.
///
/// Every step runs in order and fails with its own specific error: load
/// into an id-keyed cache, base-existence check, cycle check, then model
/// construction (no-base documents first, the rest recursively).
pub fn build_templates(raw_docs: Vec<RawTemplate>) -> Result<TemplateSet> {
    let mut vtc: TemplateCache<RawTemplate> = TemplateCache::new();
    for doc in raw_docs {
        let id = doc.id.clone();
        vtc.add(&id, doc)?;
    }

    let (with_base, without_base) = check_bases_and_split(&vtc)?;

    let loop_check = check_for_loop_in_base_chain(&vtc)?;
    if loop_check.result {
        return Err(Error::TemplateBaseCycle {
            from: loop_check.source.unwrap_or_default(),
            destination: loop_check.destination.unwrap_or_default(),
        });
    }

    let mut arena = TemplateArena::new();
    let mut rtc: TemplateCache<usize> = TemplateCache::new();

    for doc in without_base {
        let id = doc.id.clone();
        let idx = arena.push(TemplateModel {
            raw: doc,
            base: None,
        });
        rtc.add(&id, idx)?;
    }

    for doc in with_base {
        build_with_base(&doc, &vtc, &mut arena, &mut rtc)?;
    }

    debug!(templates = arena.len(), "Resolved template set");
    Ok(TemplateSet { arena, cache: rtc })
}

/// Verify that every declared base exists; split documents into with/without
/// base.
fn check_bases_and_split(
    vtc: &TemplateCache<RawTemplate>,
) -> Result<(Vec<RawTemplate>, Vec<RawTemplate>)> {
    let mut with_base = Vec::new();
    let mut without_base = Vec::new();

    for doc in vtc.iter() {
        match doc.base_id() {
            Some(base_id) => {
                if vtc.get(base_id)?.is_none() {
                    return Err(Error::BaseTemplateNotFound(doc.id.clone()));
                }
                with_base.push(doc.clone());
            }
            None => without_base.push(doc.clone()),
        }
    }

    Ok((with_base, without_base))
}

fn next_base<'a>(
    vtc: &'a TemplateCache<RawTemplate>,
    doc: &RawTemplate,
) -> Result<Option<&'a RawTemplate>> {
    match doc.base_id() {
        Some(base_id) => vtc.get(base_id),
        None => Ok(None),
    }
}

/// Floyd's tortoise-and-hare over the base chain reachable from the cache's
/// first-inserted document.
///
/// Known limitation: a cycle in a part of the forest not reachable from the
/// first-inserted document is not detected here.
pub fn check_for_loop_in_base_chain(vtc: &TemplateCache<RawTemplate>) -> Result<LoopCheck> {
    let mut tortoise = vtc.first();
    let mut hare = vtc.first();

    loop {
        let hare_next = match hare {
            Some(doc) => next_base(vtc, doc)?,
            None => None,
        };
        let Some(hare_next) = hare_next else {
            return Ok(LoopCheck::none());
        };

        tortoise = match tortoise {
            Some(doc) => next_base(vtc, doc)?,
            None => None,
        };
        hare = next_base(vtc, hare_next)?;

        if let (Some(t), Some(h)) = (tortoise, hare)
            && t.id == h.id
        {
            let destination = next_base(vtc, t)?.map(|d| d.id.clone());
            return Ok(LoopCheck {
                result: true,
                source: Some(t.id.clone()),
                destination,
            });
        }
    }
}

/// Build the model for one with-base document, resolving its ancestry first.
/// Already-resolved models are reused from the output cache.
fn build_with_base(
    doc: &RawTemplate,
    vtc: &TemplateCache<RawTemplate>,
    arena: &mut TemplateArena,
    rtc: &mut TemplateCache<usize>,
) -> Result<usize> {
    if let Some(&idx) = rtc.get(&doc.id)? {
        return Ok(idx);
    }

    // base_id is guaranteed by the split; resolve the base model first
    let base_id = doc
        .base_id()
        .ok_or_else(|| Error::BaseTemplateNotFound(doc.id.clone()))?;
    let base_idx = match rtc.get(base_id)? {
        Some(&idx) => idx,
        None => {
            let base_doc = vtc
                .get(base_id)?
                .ok_or_else(|| Error::BaseTemplateNotFound(doc.id.clone()))?
                .clone();
            build_with_base(&base_doc, vtc, arena, rtc)?
        }
    };

    let idx = arena.push(TemplateModel {
        raw: doc.clone(),
        base: Some(base_idx),
    });
    rtc.add(&doc.id, idx)?;
    Ok(idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(id: &str, base: Option<&str>) -> RawTemplate {
        RawTemplate {
            id: id.to_string(),
            base: base.map(String::from),
            is_abstract: None,
            verification_rules: None,
            conversion_rules: None,
            validation_rules: None,
        }
    }

    fn cache_of(docs: Vec<RawTemplate>) -> TemplateCache<RawTemplate> {
        let mut vtc = TemplateCache::new();
        for doc in docs {
            let id = doc.id.clone();
            vtc.add(&id, doc).unwrap();
        }
        vtc
    }

    #[test]
    fn build_resolves_bases_in_any_declaration_order() {
        // leaf first: resolution must recurse to the root before linking
        let set = build_templates(vec![
            raw("/a", Some("/b")),
            raw("/b", Some("/c")),
            raw("/c", None),
        ])
        .expect("build");

        assert_eq!(set.len(), 3);
        let a = set.lookup("/a").unwrap().expect("a resolved");
        let b = set.arena.get(a).base.expect("a has base");
        assert_eq!(set.arena.get(b).raw.id, "/b");
        let c = set.arena.get(b).base.expect("b has base");
        assert_eq!(set.arena.get(c).raw.id, "/c");
        assert!(set.arena.get(c).base.is_none());
    }

    #[test]
    fn missing_base_is_fatal_and_names_the_offender() {
        let err = build_templates(vec![raw("/a", Some("/nowhere")), raw("/b", None)])
            .expect_err("must fail");
        match err {
            Error::BaseTemplateNotFound(id) => assert_eq!(id, "/a"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn two_node_cycle_detected_with_both_ids() {
        let vtc = cache_of(vec![raw("/a", Some("/b")), raw("/b", Some("/a"))]);
        let check = check_for_loop_in_base_chain(&vtc).unwrap();
        assert!(check.result);
        let mut named = vec![check.source.unwrap(), check.destination.unwrap()];
        named.sort();
        assert_eq!(named, vec!["/a".to_string(), "/b".to_string()]);
    }

    #[test]
    fn acyclic_chain_reports_no_loop() {
        let vtc = cache_of(vec![raw("/a", Some("/b")), raw("/b", None)]);
        let check = check_for_loop_in_base_chain(&vtc).unwrap();
        assert_eq!(check, LoopCheck::none());
    }

    #[test]
    fn self_cycle_detected() {
        let vtc = cache_of(vec![raw("/a", Some("/a"))]);
        let check = check_for_loop_in_base_chain(&vtc).unwrap();
        assert!(check.result);
        assert_eq!(check.source.as_deref(), Some("/a"));
        assert_eq!(check.destination.as_deref(), Some("/a"));
    }

    #[test]
    fn cycle_aborts_build() {
        let err = build_templates(vec![raw("/a", Some("/b")), raw("/b", Some("/a"))])
            .expect_err("must fail");
        assert!(matches!(err, Error::TemplateBaseCycle { .. }));
    }

    #[test]
    fn cycle_unreachable_from_first_document_is_not_detected() {
        // documented limitation: detection walks only the chain reachable
        // from the first-inserted document
        let vtc = cache_of(vec![
            raw("/solo", None),
            raw("/x", Some("/y")),
            raw("/y", Some("/x")),
        ]);
        let check = check_for_loop_in_base_chain(&vtc).unwrap();
        assert!(!check.result);
    }

    #[test]
    fn duplicate_template_id_is_fatal() {
        let err =
            build_templates(vec![raw("/a", None), raw("/A", None)]).expect_err("must fail");
        assert!(matches!(err, Error::DuplicateTemplatePath(_)));
    }
}
