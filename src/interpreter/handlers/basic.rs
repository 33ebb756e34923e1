//! Basic-phase handlers: pure replacements that need no data-after-colon
//! (spec §4.E, §4.F "Tag semantics").

use crate::interpreter::{HandlerResult, ParseContext, TRIGGER_SENTINEL};
use crate::well_known;

/// `<break>` emits its own literal text; it is not itself recursable.
pub fn break_tag(_data: &str, _ctx: &mut ParseContext) -> Option<HandlerResult> {
    Some(HandlerResult::Literal("<break>".to_string()))
}

/// `<trigger>` emits the joined trigger phrases of the current model and any
/// LoRAs already present in `loras` at the time this tag is reached, then
/// the `\0triggerextra` sentinel. Anything added to the accumulator by a
/// `preset`/`lora` tag processed later in the same parse (they run in later
/// phases) is folded in when the sentinel is substituted at the very end of
/// the top-level parse.
pub fn trigger(_data: &str, ctx: &mut ParseContext) -> Option<HandlerResult> {
    let collaborators = ctx.collaborators();
    let mut phrases = Vec::new();

    if let Some(model) = ctx.input().try_get(&well_known::MODEL).and_then(|v| v.as_model().cloned()) {
        if let Some(phrase) = collaborators.models.trigger_phrase(&model.canonical_name) {
            phrases.push(phrase);
        }
    }
    if let Some(loras) = ctx
        .input()
        .try_get(&well_known::LORAS)
        .and_then(|v| v.as_list().map(<[String]>::to_vec))
    {
        for name in &loras {
            if let Some(phrase) = collaborators.models.trigger_phrase(name) {
                phrases.push(phrase);
            }
        }
    }

    let mut text = phrases.join(", ");
    text.push_str(TRIGGER_SENTINEL);
    Some(HandlerResult::Literal(text))
}
