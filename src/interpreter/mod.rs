//! Prompt interpreter (spec §4.F).
//!
//! Runs the tag handler registry over a prompt-like string with a per-parse
//! [`ParseContext`], supporting recursive expansion, a depth cap, the
//! preset-splice accumulator, and trigger-phrase substitution.

pub mod handlers;
pub(crate) mod scanner;

use std::collections::HashMap;

use crate::errors::ParamResult;
use crate::input::Input;
use crate::registries::Collaborators;
use crate::sequence_store::SequenceStore;

/// Maximum parse recursion depth (spec §4.F "Depth cap").
pub const MAX_DEPTH: u32 = 1000;

/// A handler's result: either the literal text that replaces the tag, or a
/// preset-style splice that prepends/appends to the *overall* result of the
/// enclosing top-level parse while the tag itself contributes nothing here
/// (spec §4.F "Preset-value splice protocol"; see spec §9 design note on
/// replacing the in-band `\0preset:` sentinel with an explicit variant).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerResult {
    Literal(String),
    SpliceAround { before: String, after: String },
}

impl HandlerResult {
    pub fn erase() -> Self {
        HandlerResult::Literal(String::new())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Phase {
    Basic,
    Main,
    Post,
}

/// Sentinel appended by the `trigger` tag; replaced with the accumulated
/// trigger phrase once the top-level parse of a prompt finishes (spec §4.F
/// "Trigger-phrase protocol").
pub const TRIGGER_SENTINEL: &str = "\u{0}triggerextra";

/// Per-parse state threaded through every tag handler invocation (spec
/// §4.F "ParseContext").
pub struct ParseContext<'a> {
    input: &'a mut Input,
    param: String,
    collaborators: &'a Collaborators<'a>,
    sequence_store: &'a SequenceStore,
    variables: HashMap<String, String>,
    section_id: u32,
    depth: u32,
    max_depth: u32,
    pre_data: Option<String>,
    raw_current_tag: String,
    current_prefix: String,
    trigger_phrase_extra: String,
    preset_splices: Vec<(String, String)>,
    warned_depth_cap: bool,
}

impl<'a> ParseContext<'a> {
    pub fn new(
        input: &'a mut Input,
        param: impl Into<String>,
        collaborators: &'a Collaborators<'a>,
        sequence_store: &'a SequenceStore,
    ) -> Self {
        Self {
            input,
            param: param.into(),
            collaborators,
            sequence_store,
            variables: HashMap::new(),
            section_id: 0,
            depth: 0,
            max_depth: MAX_DEPTH,
            pre_data: None,
            raw_current_tag: String::new(),
            current_prefix: String::new(),
            trigger_phrase_extra: String::new(),
            preset_splices: Vec::new(),
            warned_depth_cap: false,
        }
    }

    /// Overrides the depth cap; intended for tests that want to exercise it
    /// cheaply rather than nesting 1000 real tags.
    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn param(&self) -> &str {
        &self.param
    }

    pub fn pre_data(&self) -> Option<&str> {
        self.pre_data.as_deref()
    }

    pub fn raw_current_tag(&self) -> &str {
        &self.raw_current_tag
    }

    /// Pushes a warning tagged with the current parameter id and the prefix
    /// of the tag currently being handled (spec §7.1, SPEC_FULL §B). Call
    /// from inside a handler, where `current_prefix` is meaningful; the
    /// depth-cap site sets its own prefix directly since it fires between
    /// tags rather than inside one.
    pub fn warn(&mut self, message: impl Into<String>) {
        let param = self.param.clone();
        let prefix = self.current_prefix.clone();
        self.input.push_tag_warning(&param, &prefix, message);
    }

    pub fn section_id(&self) -> u32 {
        self.section_id
    }

    pub fn next_section_id(&mut self) -> u32 {
        self.section_id += 1;
        self.section_id
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(name.into(), value.into());
    }

    pub fn get_variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    pub fn push_trigger_phrase(&mut self, phrase: &str) {
        self.trigger_phrase_extra.push_str(phrase);
        self.trigger_phrase_extra.push_str(", ");
    }

    pub fn input(&self) -> &Input {
        self.input
    }

    pub fn input_mut(&mut self) -> &mut Input {
        self.input
    }

    /// Decoupled from `&self`'s borrow (the field is itself a shared
    /// reference with lifetime `'a`), so handlers can hold this alongside a
    /// separate `input_mut()` call without the borrow checker treating them
    /// as overlapping.
    pub fn collaborators(&self) -> &'a Collaborators<'a> {
        self.collaborators
    }

    pub fn sequence_store(&self) -> &'a SequenceStore {
        self.sequence_store
    }

    fn run_phase(&mut self, text: &str, phase: Phase) -> String {
        // Split the borrow: look up the handler fn pointer (a plain copy,
        // no borrow of `self`) before touching `self` again inside the
        // scanner closure.
        scanner::scan(text, |tag| {
            let handler = handlers::lookup(phase, &tag.prefix)?;
            if phase != Phase::Basic && tag.data.is_none() {
                return None;
            }
            self.pre_data = tag.predata.clone();
            self.raw_current_tag = tag.raw.to_string();
            self.current_prefix = tag.prefix.clone();
            let data = tag.data.unwrap_or("");
            match handler(data, self) {
                Some(HandlerResult::Literal(s)) => Some(s),
                Some(HandlerResult::SpliceAround { before, after }) => {
                    self.preset_splices.push((before, after));
                    Some(String::new())
                }
                None => None,
            }
        })
    }

    /// Recursively expands `text`: runs the basic, main, then post handler
    /// passes in order. Any handler whose contract says "recurse into data"
    /// MUST call this so the depth cap applies uniformly (spec §4.F).
    pub fn parse(&mut self, text: &str) -> String {
        if self.depth >= self.max_depth {
            if !self.warned_depth_cap {
                self.input.push_tag_warning(
                    &self.param,
                    &self.current_prefix,
                    format!(
                        "recursive prompt tags in parameter '{}' exceeded the recursion depth cap",
                        self.param
                    ),
                );
                self.warned_depth_cap = true;
            }
            return text.to_string();
        }
        self.depth += 1;
        let mut result = text.to_string();
        result = self.run_phase(&result, Phase::Basic);
        result = self.run_phase(&result, Phase::Main);
        result = self.run_phase(&result, Phase::Post);
        self.depth -= 1;
        result
    }
}

/// Runs the full pipeline for one parameter's value: recursive tag
/// expansion, then the preset-splice application and trigger-phrase
/// substitution that only ever happen once, at the outermost call (spec
/// §4.F).
fn run_top_level(ctx: &mut ParseContext<'_>, text: &str) -> String {
    let expanded = ctx.parse(text);
    let mut result = expanded;
    if result.contains(TRIGGER_SENTINEL) {
        let joined = ctx.trigger_phrase_extra.trim_end_matches(", ").to_string();
        result = result.replace(TRIGGER_SENTINEL, &joined);
    }
    if !ctx.preset_splices.is_empty() {
        let mut before = String::new();
        let mut after = String::new();
        for (b, a) in &ctx.preset_splices {
            before.push_str(b);
            after.push_str(a);
        }
        result = format!("{before}{result}{after}");
    }
    result
}

impl Input {
    /// Expands a single prompt-like string for `param`, driving the full
    /// handler pipeline (spec §4.F). Does not touch `SequenceStore`
    /// staleness bookkeeping -- that's `preparse_prompts`'s job.
    pub fn process_prompt_like(
        &mut self,
        param: impl Into<String>,
        text: &str,
        collaborators: &Collaborators<'_>,
        sequence_store: &SequenceStore,
    ) -> String {
        let mut ctx = ParseContext::new(self, param, collaborators, sequence_store);
        run_top_level(&mut ctx, text)
    }

    /// Side-effect-free length estimate for `text` (spec §4.F "Length
    /// estimation"). Never advances a sequence cursor, never calls the RNG,
    /// never mutates `self`.
    pub fn process_prompt_like_for_length(
        &self,
        text: &str,
        wildcards: &dyn crate::registries::WildcardStore,
        sequence_store: &SequenceStore,
    ) -> String {
        handlers::length::estimate(text, wildcards, sequence_store, 0)
    }

    /// Runs the prompt then the negative prompt through
    /// [`process_prompt_like`], bracketed by `SequenceStore` staleness
    /// bookkeeping (spec §2 data flow, §5 ordering guarantees).
    pub fn preparse_prompts(
        &mut self,
        collaborators: &Collaborators<'_>,
        sequence_store: &SequenceStore,
    ) -> ParamResult<()> {
        sequence_store.clear_ran_flags();

        if let Some(prompt) = self.try_get(&crate::well_known::PROMPT) {
            let text = prompt.as_text();
            let expanded =
                self.process_prompt_like("prompt", &text, collaborators, sequence_store);
            self.set_typed(&crate::well_known::PROMPT, crate::types::TypedValue::Text(expanded), None)?;
        }
        if let Some(negative) = self.try_get(&crate::well_known::NEGATIVE_PROMPT) {
            let text = negative.as_text();
            let expanded = self.process_prompt_like(
                "negativeprompt",
                &text,
                collaborators,
                sequence_store,
            );
            self.set_typed(
                &crate::well_known::NEGATIVE_PROMPT,
                crate::types::TypedValue::Text(expanded),
                None,
            )?;
        }

        sequence_store.gc_stale();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Session;
    use crate::registries::memory::{InMemoryModelRegistry, InMemoryPresetStore, InMemoryWildcardStore};
    use crate::types::TypedValue;
    use std::sync::Arc;

    fn collaborators<'a>(
        models: &'a InMemoryModelRegistry,
        embeddings: &'a InMemoryModelRegistry,
        wildcards: &'a InMemoryWildcardStore,
        presets: &'a InMemoryPresetStore,
    ) -> Collaborators<'a> {
        Collaborators {
            models,
            embeddings,
            wildcards,
            presets,
            resolve_descriptor: &|_id: &str| None,
        }
    }

    #[test]
    fn plain_text_round_trips_unchanged() {
        let session = Arc::new(Session::new("u"));
        let mut input = Input::new(session);
        let store = SequenceStore::new();
        let models = InMemoryModelRegistry::new();
        let embeddings = InMemoryModelRegistry::new();
        let wildcards = InMemoryWildcardStore::new();
        let presets = InMemoryPresetStore::new();
        let collab = collaborators(&models, &embeddings, &wildcards, &presets);

        let out = input.process_prompt_like("prompt", "a plain prompt, no tags", &collab, &store);
        assert_eq!(out, "a plain prompt, no tags");
    }

    #[test]
    fn unknown_tag_passes_through() {
        let session = Arc::new(Session::new("u"));
        let mut input = Input::new(session);
        let store = SequenceStore::new();
        let models = InMemoryModelRegistry::new();
        let embeddings = InMemoryModelRegistry::new();
        let wildcards = InMemoryWildcardStore::new();
        let presets = InMemoryPresetStore::new();
        let collab = collaborators(&models, &embeddings, &wildcards, &presets);

        let out = input.process_prompt_like("prompt", "<totally_unknown:x>", &collab, &store);
        assert_eq!(out, "<totally_unknown:x>");
    }

    #[test]
    fn depth_cap_returns_input_unchanged_and_warns_once() {
        let session = Arc::new(Session::new("u"));
        let mut input = Input::new(session);
        let store = SequenceStore::new();
        let models = InMemoryModelRegistry::new();
        let embeddings = InMemoryModelRegistry::new();
        let wildcards = InMemoryWildcardStore::new();
        let presets = InMemoryPresetStore::new();
        let collab = collaborators(&models, &embeddings, &wildcards, &presets);

        let mut ctx = ParseContext::new(&mut input, "prompt", &collab, &store).with_max_depth(2);
        // setvar recurses into ctx.parse for its body; chain three deep to
        // blow a depth cap of 2.
        let text = "<setvar[a]:<setvar[b]:<setvar[c]:leaf>>>";
        let out = ctx.parse(text);
        assert!(out.contains("leaf") || out.contains("setvar"));
        drop(ctx);
        let value = input.extra_meta.get("parser_warnings");
        assert!(value.is_some());
    }

    #[test]
    fn preset_splice_scenario() {
        use crate::registries::Preset;
        let session = Arc::new(Session::new("u"));
        let mut input = Input::new(session);
        input
            .set_typed(&crate::well_known::PROMPT, TypedValue::Text(String::new()), None)
            .unwrap();
        let store = SequenceStore::new();
        let models = InMemoryModelRegistry::new();
        let embeddings = InMemoryModelRegistry::new();
        let wildcards = InMemoryWildcardStore::new();
        let mut param_map = std::collections::HashMap::new();
        param_map.insert("prompt".to_string(), String::new());
        let presets = InMemoryPresetStore::new().with_preset(
            "stylize",
            Preset {
                param_map,
                template: Some("ultra {value} hires".to_string()),
            },
        );
        let collab = Collaborators {
            models: &models,
            embeddings: &embeddings,
            wildcards: &wildcards,
            presets: &presets,
            resolve_descriptor: &|id: &str| {
                if id == "prompt" {
                    Some(crate::well_known::PROMPT)
                } else {
                    None
                }
            },
        };

        let out = input.process_prompt_like("prompt", "<preset:stylize>", &collab, &store);
        assert_eq!(out, "ultra  hires");
    }

    #[test]
    fn no_tags_for_length_pass_never_advances_sequence() {
        let session = Arc::new(Session::new("u"));
        let input = Input::new(session);
        let store = SequenceStore::new();
        let wildcards = InMemoryWildcardStore::new();
        let out = input.process_prompt_like_for_length("<seq:a|b|c> text", &wildcards, &store);
        assert!(out.contains("text"));
        // peek should not have advanced the cursor: advancing afresh still
        // returns "a" first.
        let key = crate::sequence_store::SequenceKey::seq("a|b|c");
        let values = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(store.advance(&key, &values), Some("a".to_string()));
    }
}
