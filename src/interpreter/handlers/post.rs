//! Post-phase (side-effecting) tag handlers (spec §4.F "Tag semantics").

use crate::interpreter::{HandlerResult, ParseContext};
use crate::types::TypedValue;
use crate::well_known;

/// `<lora:name[:strength]>`.
pub fn lora(data: &str, ctx: &mut ParseContext) -> Option<HandlerResult> {
    let (name, strength) = match data.split_once(':') {
        Some((n, s)) => (n.trim(), s.trim()),
        None => (data.trim(), "1"),
    };

    let collaborators = ctx.collaborators();
    let candidates = collaborators.models.list_names();
    let canonical = match collaborators.models.best_match(name, &candidates) {
        Some(c) => c,
        None => {
            ctx.warn(format!("unresolved lora '{name}' in parameter '{}'", ctx.param()));
            return None;
        }
    };
    let section_id = ctx.section_id();
    let trigger = collaborators.models.trigger_phrase(&canonical);

    let input = ctx.input_mut();
    let mut loras = input
        .try_get(&well_known::LORAS)
        .and_then(|v| v.as_list().map(<[String]>::to_vec))
        .unwrap_or_default();
    let mut weights = input
        .try_get(&well_known::LORA_WEIGHTS)
        .and_then(|v| v.as_list().map(<[String]>::to_vec))
        .unwrap_or_default();
    let mut confinement = input
        .try_get(&well_known::LORA_SECTION_CONFINEMENT)
        .and_then(|v| v.as_list().map(<[String]>::to_vec))
        .unwrap_or_default();

    if confinement.is_empty() && !loras.is_empty() {
        confinement = vec!["-1".to_string(); loras.len()];
    }

    loras.push(canonical);
    weights.push(strength.to_string());
    confinement.push(section_id.to_string());

    let _ = input.set_typed(&well_known::LORAS, TypedValue::List(loras), None);
    let _ = input.set_typed(&well_known::LORA_WEIGHTS, TypedValue::List(weights), None);
    let _ = input.set_typed(&well_known::LORA_SECTION_CONFINEMENT, TypedValue::List(confinement), None);

    if let Some(phrase) = trigger {
        ctx.push_trigger_phrase(&phrase);
    }

    Some(HandlerResult::erase())
}

/// `<segment|object|region[...]:...>` -- increments `section_id` and rewrites
/// the tag's own `//cid=` suffix; the core never interprets the marker
/// itself (spec §4.F).
pub fn segment(_data: &str, ctx: &mut ParseContext) -> Option<HandlerResult> {
    let section_id = ctx.next_section_id();
    let raw = ctx.raw_current_tag();
    let interior = &raw[1..raw.len() - 1];
    let base = match interior.find("//cid=") {
        Some(idx) => &interior[..idx],
        None => interior,
    };
    Some(HandlerResult::Literal(format!("<{base}//cid={section_id}>")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{Input, Session};
    use crate::registries::memory::{InMemoryModelRegistry, InMemoryPresetStore, InMemoryWildcardStore};
    use crate::registries::Collaborators;
    use crate::sequence_store::SequenceStore;
    use std::sync::Arc;

    #[test]
    fn lora_hit_erases_tag_and_populates_parallel_arrays() {
        let mut input = Input::new(Arc::new(Session::new("u")));
        let store = SequenceStore::new();
        let models = InMemoryModelRegistry::new().with_model("detail-canonical", Some("dtl trigger"));
        let wildcards = InMemoryWildcardStore::new();
        let presets = InMemoryPresetStore::new();
        let collab = Collaborators {
            models: &models,
            embeddings: &models,
            wildcards: &wildcards,
            presets: &presets,
            resolve_descriptor: &|_: &str| None,
        };

        let out = input.process_prompt_like("prompt", "portrait <lora:detail:0.8> shot", &collab, &store);
        assert_eq!(out, "portrait  shot");
        assert_eq!(
            input.try_get(&well_known::LORAS).unwrap().as_list().unwrap(),
            &["detail-canonical".to_string()]
        );
        assert_eq!(
            input.try_get(&well_known::LORA_WEIGHTS).unwrap().as_list().unwrap(),
            &["0.8".to_string()]
        );
        assert_eq!(
            input
                .try_get(&well_known::LORA_SECTION_CONFINEMENT)
                .unwrap()
                .as_list()
                .unwrap(),
            &["0".to_string()]
        );
    }

    #[test]
    fn lora_miss_keeps_tag_and_warns() {
        let mut input = Input::new(Arc::new(Session::new("u")));
        let store = SequenceStore::new();
        let models = InMemoryModelRegistry::new();
        let wildcards = InMemoryWildcardStore::new();
        let presets = InMemoryPresetStore::new();
        let collab = Collaborators {
            models: &models,
            embeddings: &models,
            wildcards: &wildcards,
            presets: &presets,
            resolve_descriptor: &|_: &str| None,
        };
        let out = input.process_prompt_like("prompt", "<lora:nope:1>", &collab, &store);
        assert_eq!(out, "<lora:nope:1>");
        assert!(input.extra_meta.contains_key("parser_warnings"));
    }

    #[test]
    fn segment_rewrites_cid_suffix() {
        let mut input = Input::new(Arc::new(Session::new("u")));
        let store = SequenceStore::new();
        let models = InMemoryModelRegistry::new();
        let wildcards = InMemoryWildcardStore::new();
        let presets = InMemoryPresetStore::new();
        let collab = Collaborators {
            models: &models,
            embeddings: &models,
            wildcards: &wildcards,
            presets: &presets,
            resolve_descriptor: &|_: &str| None,
        };
        let out = input.process_prompt_like("prompt", "<segment[face]:eyes>", &collab, &store);
        assert_eq!(out, "<segment[face]:eyes//cid=1>");
    }
}
