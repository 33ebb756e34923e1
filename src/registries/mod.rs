//! Consumed external interfaces (spec §6 "Consumed interfaces").
//!
//! The core never implements model lookup, wildcard storage, or preset
//! storage itself -- those are owned by the surrounding service. This module
//! only defines the narrow traits the interpreter drives, plus small
//! in-memory reference implementations used by this crate's own tests (and
//! suitable as a starting point for a caller that hasn't wired up the real
//! registries yet).

pub mod memory;

use crate::input::Input;

/// Case-insensitive, path-separator-normalized fuzzy match shared by the
/// in-memory reference registries and the tag handlers that need to
/// fuzzy-resolve a name without going through a specific registry impl
/// (spec §6 "fuzzy match honoring path separators normalized to `/`").
pub(crate) fn normalize(name: &str) -> String {
    name.to_lowercase().replace('\\', "/")
}

pub(crate) fn fuzzy_match<'a>(
    query: &str,
    candidates: impl Iterator<Item = &'a String>,
) -> Option<String> {
    let q = normalize(query);
    let q_leaf = q.rsplit('/').next().unwrap_or(&q).to_string();
    let mut best: Option<(&'a String, usize)> = None;
    for candidate in candidates {
        let c = normalize(candidate);
        let c_leaf = c.rsplit('/').next().unwrap_or(&c).to_string();
        let score = if c == q || c_leaf == q_leaf {
            0
        } else if c.contains(&q) || c_leaf.contains(&q_leaf) {
            1
        } else {
            continue;
        };
        if best.map(|(_, s)| score < s).unwrap_or(true) {
            best = Some((candidate, score));
        }
    }
    best.map(|(c, _)| c.clone())
}

/// Fuzzy name resolution over a model-like asset (LoRA, embedding, checkpoint).
///
/// `best_match` is expected to normalize path separators to `/` and compare
/// case-insensitively (spec §6).
pub trait ModelRegistry {
    fn best_match(&self, query: &str, candidates: &[String]) -> Option<String>;

    /// All canonical names this registry knows about, for fuzzy matching
    /// against when the caller doesn't narrow the candidate set itself.
    fn list_names(&self) -> Vec<String>;

    /// Trigger phrase associated with a canonical name, if any.
    fn trigger_phrase(&self, canonical: &str) -> Option<String>;
}

/// External store of wildcard option lists.
pub trait WildcardStore {
    fn list_files(&self) -> Vec<String>;
    fn get(&self, name: &str) -> Option<WildcardFile>;
}

#[derive(Debug, Clone)]
pub struct WildcardFile {
    pub options: Vec<String>,
}

/// A named bundle of parameter assignments, optionally carrying a prompt
/// template containing `{value}` (spec §4.G.5, §4.F preset-splice protocol).
pub struct Preset {
    /// id -> textual value, applied verbatim through `Input::set_raw`.
    pub param_map: std::collections::HashMap<String, String>,
    /// Template spliced around the `preset` tag's own parameter, if the
    /// current parameter id is a key of `param_map`.
    pub template: Option<String>,
}

impl Preset {
    /// Mutates `input` by applying every entry in `param_map` through the
    /// descriptor lookup the caller supplies. `resolve` maps an id to its
    /// `ParamDescriptor`; ids with no known descriptor are skipped (a
    /// warning the caller should surface, not a hard failure -- presets are
    /// user data and routinely reference parameters a given build doesn't
    /// have). `registry` is forwarded to `Input::set_raw` so a preset that
    /// sets a `Model`-typed parameter (e.g. `model`) still resolves.
    pub fn apply_to(
        &self,
        input: &mut Input,
        resolve: impl Fn(&str) -> Option<crate::types::ParamDescriptor>,
        registry: Option<&dyn ModelRegistry>,
    ) {
        for (id, text) in &self.param_map {
            if let Some(descriptor) = resolve(id) {
                let _ = input.set_raw(&descriptor, text, registry);
            }
        }
    }
}

pub trait PresetStore {
    /// Fuzzy-resolve `query` to a canonical preset name.
    fn resolve(&self, query: &str) -> Option<String>;
    fn get_preset(&self, name: &str) -> Option<&Preset>;
    fn list_names(&self) -> Vec<String>;
}

/// Bundles every external collaborator the interpreter dispatch pipeline
/// needs for one parse, plus a descriptor-resolution callback so handlers
/// that write arbitrary parameter ids (`preset`, early-preset extraction in
/// `special_logic`) don't need their own copy of the caller's descriptor
/// table (spec §4.F, §9 "ParseContext").
pub struct Collaborators<'a> {
    pub models: &'a dyn ModelRegistry,
    pub embeddings: &'a dyn ModelRegistry,
    pub wildcards: &'a dyn WildcardStore,
    pub presets: &'a dyn PresetStore,
    pub resolve_descriptor: &'a dyn Fn(&str) -> Option<crate::types::ParamDescriptor>,
}
