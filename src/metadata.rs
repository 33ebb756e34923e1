//! Metadata serializer (spec §4.H).

use serde_json::{Map, Value};

use crate::input::Input;
use crate::types::{ParamDescriptor, TypedValue};

const EMBED_OPEN: &str = "\u{0}swarmembed:";
const EMBED_CLOSE: &str = "\u{0}end";

fn substitute_embed_sentinel(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        let Some(idx) = rest.find(EMBED_OPEN) else {
            result.push_str(rest);
            break;
        };
        result.push_str(&rest[..idx]);
        let after = &rest[idx + EMBED_OPEN.len()..];
        match after.find(EMBED_CLOSE) {
            Some(end) => {
                result.push_str(&format!("<embed:{}>", &after[..end]));
                rest = &after[end + EMBED_CLOSE.len()..];
            }
            None => {
                result.push_str(&rest[idx..]);
                break;
            }
        }
    }
    result
}

fn value_to_json(value: &TypedValue) -> Option<Value> {
    match value {
        TypedValue::Int64(v) => Some(Value::from(*v)),
        TypedValue::Int32(v) => Some(Value::from(*v)),
        TypedValue::Double(v) => serde_json::Number::from_f64(*v).map(Value::Number),
        TypedValue::Float(v) => serde_json::Number::from_f64(*v as f64).map(Value::Number),
        TypedValue::Bool(v) => Some(Value::Bool(*v)),
        TypedValue::Text(v) => Some(Value::String(substitute_embed_sentinel(v))),
        TypedValue::Image(_) | TypedValue::ImageList(_) => None,
        TypedValue::Model(m) => Some(Value::String(m.canonical_name.clone())),
        TypedValue::List(v) => Some(Value::Array(v.iter().cloned().map(Value::String).collect())),
        TypedValue::ModelList(v) => Some(Value::Array(
            v.iter().map(|m| Value::String(m.canonical_name.clone())).collect(),
        )),
    }
}

/// Escapes every non-ASCII character in an already-serialized JSON string as
/// `\uXXXX` (spec §6 "Wire/disk formats"). Safe to run over the whole
/// output since every JSON structural character is ASCII.
fn escape_non_ascii(serialized: &str) -> String {
    let mut out = String::with_capacity(serialized.len());
    for ch in serialized.chars() {
        if ch.is_ascii() {
            out.push(ch);
        } else {
            let mut buf = [0u16; 2];
            for unit in ch.encode_utf16(&mut buf) {
                out.push_str(&format!("\\u{unit:04x}"));
            }
        }
    }
    out
}

impl Input {
    /// Raw dump of every stored value's textual form, keyed by id. Intended
    /// for the `to_json -> set_raw -> to_json` round trip (spec §8), not for
    /// the formatted metadata envelope -- see [`Input::gen_metadata_object`].
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (id, value) in self.iter_values() {
            map.insert(id.to_string(), Value::String(value.as_text()));
        }
        Value::Object(map)
    }

    /// Builds the `values ∪ extra_meta` object the metadata envelope wraps:
    /// skips null/image/hidden entries, substitutes the embed sentinel,
    /// applies each descriptor's `metadata_format`, and collapses
    /// `original_prompt`/`original_negativeprompt` when equal to the
    /// current value (spec §4.H).
    pub fn gen_metadata_object(
        &self,
        resolve_descriptor: &dyn Fn(&str) -> Option<ParamDescriptor>,
    ) -> Value {
        let mut map = Map::new();

        for (id, value) in self.iter_values() {
            let descriptor = resolve_descriptor(id);
            if descriptor.as_ref().is_some_and(|d| d.hide_from_metadata) {
                continue;
            }
            let Some(mut json_value) = value_to_json(value) else {
                continue;
            };
            if let (Some(descriptor), Value::String(text)) = (&descriptor, &json_value) {
                if let Some(format) = descriptor.metadata_format {
                    json_value = Value::String(format(text));
                }
            }
            map.insert(id.to_string(), json_value);
        }

        for (key, value) in &self.extra_meta {
            if !value.is_null() {
                map.insert(key.clone(), value.clone());
            }
        }

        collapse_if_equal(&mut map, "original_prompt", "prompt");
        collapse_if_equal(&mut map, "original_negativeprompt", "negativeprompt");

        Value::Object(map)
    }

    /// Serializes [`Input::gen_metadata_object`] inside the
    /// `{"sui_image_params": {...}}` envelope: 2-space indentation,
    /// non-ASCII escaped, LF line endings (spec §4.H, §6).
    pub fn gen_raw_metadata(&self, resolve_descriptor: &dyn Fn(&str) -> Option<ParamDescriptor>) -> String {
        let object = self.gen_metadata_object(resolve_descriptor);
        let envelope = serde_json::json!({ "sui_image_params": object });
        let pretty =
            serde_json::to_string_pretty(&envelope).expect("metadata envelope always serializes");
        escape_non_ascii(&pretty).replace("\r\n", "\n")
    }
}

fn collapse_if_equal(map: &mut Map<String, Value>, original_key: &str, current_key: &str) {
    let equal = match (map.get(original_key), map.get(current_key)) {
        (Some(original), Some(current)) => original == current,
        _ => false,
    };
    if equal {
        map.remove(original_key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Session;
    use crate::well_known;
    use std::sync::Arc;

    fn fresh_input() -> Input {
        Input::new(Arc::new(Session::new("u")))
    }

    #[test]
    fn hidden_descriptor_is_skipped() {
        let mut input = fresh_input();
        let hidden = ParamDescriptor::text("secret").hidden();
        input.set_raw(&hidden, "shh", None).unwrap();
        let object = input.gen_metadata_object(&|id| if id == "secret" { Some(hidden) } else { None });
        assert!(object.get("secret").is_none());
    }

    #[test]
    fn embed_sentinel_is_rewritten_to_embed_tag() {
        let mut input = fresh_input();
        input
            .set_typed(
                &well_known::PROMPT,
                TypedValue::Text("a \u{0}swarmembed:bad-hands\u{0}end b".to_string()),
                None,
            )
            .unwrap();
        let object = input.gen_metadata_object(&|_| None);
        assert_eq!(object["prompt"], Value::String("a <embed:bad-hands> b".to_string()));
    }

    #[test]
    fn original_prompt_collapses_when_equal_to_prompt() {
        let mut input = fresh_input();
        input
            .set_typed(&well_known::PROMPT, TypedValue::Text("a cat".to_string()), None)
            .unwrap();
        input
            .set_typed(
                &well_known::ORIGINAL_PROMPT,
                TypedValue::Text("a cat".to_string()),
                None,
            )
            .unwrap();
        let object = input.gen_metadata_object(&|_| None);
        assert!(object.get("original_prompt").is_none());
        assert_eq!(object["prompt"], Value::String("a cat".to_string()));
    }

    #[test]
    fn raw_metadata_is_wrapped_in_envelope_with_lf_endings() {
        let mut input = fresh_input();
        input
            .set_typed(&well_known::PROMPT, TypedValue::Text("hello".to_string()), None)
            .unwrap();
        let raw = input.gen_raw_metadata(&|_| None);
        assert!(raw.starts_with("{\n  \"sui_image_params\": {"));
        assert!(!raw.contains('\r'));
    }

    #[test]
    fn non_ascii_text_is_escaped() {
        let mut input = fresh_input();
        input
            .set_typed(&well_known::PROMPT, TypedValue::Text("caf\u{e9}".to_string()), None)
            .unwrap();
        let raw = input.gen_raw_metadata(&|_| None);
        assert!(raw.contains("caf\\u00e9"));
        assert!(!raw.contains('\u{e9}'));
    }
}
