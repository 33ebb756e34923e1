//! Special parameter handlers (spec §4.G): ordered normalization passes run
//! once per request, before the interpreter dispatch pipeline sees anything.

use std::collections::HashMap;

use rand::Rng;

use crate::input::Input;
use crate::interpreter::scanner;
use crate::registries::{Collaborators, Preset};
use crate::types::TypedValue;
use crate::well_known;

const SEED_CEILING: i64 = 1 << 31;

fn fresh_seed() -> i64 {
    rand::rng().random_range(0..SEED_CEILING)
}

/// Pass 1: snapshot the pre-randomization seed, then materialize a fresh
/// one if missing or `-1` (spec §4.G.1, §3 invariant 5).
fn materialize_seed(input: &mut Input) {
    if input.raw_original_seed().is_none() {
        let current = input.try_get(&well_known::SEED).and_then(|v| v.as_i64()).unwrap_or(-1);
        input.set_raw_original_seed(current);
    }
    let seed = input.try_get(&well_known::SEED).and_then(|v| v.as_i64());
    if seed.is_none() || seed == Some(-1) {
        let _ = input.set_typed(&well_known::SEED, TypedValue::Int64(fresh_seed()), None);
    }
}

/// Pass 2: materialize `variation_seed` if present and `-1` (spec §4.G.2).
fn materialize_variation_seed(input: &mut Input) {
    if let Some(-1) = input.try_get(&well_known::VARIATION_SEED).and_then(|v| v.as_i64()) {
        let _ = input.set_typed(&well_known::VARIATION_SEED, TypedValue::Int64(fresh_seed()), None);
    }
}

/// Pass 3: split `raw_resolution` ("WxH") into `width`/`height`, dropping
/// `alt_resolution_height_mult` (spec §4.G.3).
fn split_raw_resolution(input: &mut Input) {
    let Some(raw) = input
        .try_get(&well_known::RAW_RESOLUTION)
        .and_then(|v| v.as_str().map(str::to_string))
    else {
        return;
    };
    let Some((w, h)) = raw.split_once('x') else {
        input.push_warning(format!("raw_resolution '{raw}' is not of the form WxH"));
        return;
    };
    match (w.trim().parse::<i32>(), h.trim().parse::<i32>()) {
        (Ok(width), Ok(height)) => {
            let _ = input.set_typed(&well_known::WIDTH, TypedValue::Int32(width), None);
            let _ = input.set_typed(&well_known::HEIGHT, TypedValue::Int32(height), None);
            input.remove(&well_known::ALT_RESOLUTION_HEIGHT_MULT);
        }
        _ => input.push_warning(format!("raw_resolution '{raw}' is not of the form WxH")),
    }
}

/// Pass 4: align `lora_weights` to `loras` (truncate/pad, warn on
/// mismatch); discard a `lora_section_confinement` whose length doesn't
/// match `loras` (spec §4.G.4, §3 invariant 3).
fn align_lora_weights(input: &mut Input) {
    let Some(loras) = input
        .try_get(&well_known::LORAS)
        .and_then(|v| v.as_list().map(<[String]>::to_vec))
    else {
        return;
    };
    let mut weights = input
        .try_get(&well_known::LORA_WEIGHTS)
        .and_then(|v| v.as_list().map(<[String]>::to_vec))
        .unwrap_or_default();
    if weights.len() != loras.len() {
        input.push_warning(format!(
            "lora/lora_weights length mismatch: {} loras, {} weights",
            loras.len(),
            weights.len()
        ));
        weights.resize(loras.len(), "1".to_string());
    }
    let _ = input.set_typed(&well_known::LORA_WEIGHTS, TypedValue::List(weights), None);

    if let Some(confinement) = input
        .try_get(&well_known::LORA_SECTION_CONFINEMENT)
        .and_then(|v| v.as_list().map(<[String]>::to_vec))
    {
        if confinement.len() != loras.len() {
            input.remove(&well_known::LORA_SECTION_CONFINEMENT);
        }
    }
}

/// Pass 5: scan the prompt for `<preset:name>` tags and apply only the
/// must-load-early subset of each resolved preset's `param_map` (spec
/// §4.G.5).
fn extract_early_presets(input: &mut Input, collaborators: &Collaborators<'_>) {
    let Some(prompt) = input.try_get(&well_known::PROMPT) else {
        return;
    };
    let text = prompt.as_text();
    let _ = scanner::scan(&text, |tag| {
        if (tag.prefix == "preset" || tag.prefix == "p") && tag.data.is_some() {
            let name = tag.data.unwrap().trim();
            if let Some(canonical) = collaborators.presets.resolve(name) {
                if let Some(preset) = collaborators.presets.get_preset(&canonical) {
                    let early_only: HashMap<String, String> = preset
                        .param_map
                        .iter()
                        .filter(|(id, _)| well_known::MUST_LOAD_EARLY.contains(&id.as_str()))
                        .map(|(id, value)| (id.clone(), value.clone()))
                        .collect();
                    let restricted = Preset {
                        param_map: early_only,
                        template: None,
                    };
                    restricted.apply_to(input, collaborators.resolve_descriptor, Some(collaborators.models));
                }
            }
        }
        None
    });
}

/// Pass 6 (final): stamp `extra_meta["date"]`/`extra_meta["version"]` so
/// every generated image carries when and by which build it was produced
/// (spec §3 `extra_meta`).
fn stamp_generation_metadata(input: &mut Input) {
    input.extra_meta.insert(
        "date".to_string(),
        serde_json::Value::String(chrono::Utc::now().to_rfc3339()),
    );
    input.extra_meta.insert(
        "version".to_string(),
        serde_json::Value::String(env!("CARGO_PKG_VERSION").to_string()),
    );
}

impl Input {
    /// Runs every special-parameter normalization pass, in order, once per
    /// request (spec §4.G).
    pub fn apply_special_logic(&mut self, collaborators: &Collaborators<'_>) {
        materialize_seed(self);
        materialize_variation_seed(self);
        split_raw_resolution(self);
        align_lora_weights(self);
        extract_early_presets(self, collaborators);
        stamp_generation_metadata(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Session;
    use crate::registries::memory::{InMemoryModelRegistry, InMemoryPresetStore, InMemoryWildcardStore};
    use crate::types::DataType;
    use std::sync::Arc;

    fn fresh_input() -> Input {
        Input::new(Arc::new(Session::new("u")))
    }

    fn empty_collaborators<'a>(
        models: &'a InMemoryModelRegistry,
        wildcards: &'a InMemoryWildcardStore,
        presets: &'a InMemoryPresetStore,
    ) -> Collaborators<'a> {
        Collaborators {
            models,
            embeddings: models,
            wildcards,
            presets,
            resolve_descriptor: &|_: &str| None,
        }
    }

    #[test]
    fn seed_is_materialized_and_original_snapshotted() {
        let mut input = fresh_input();
        let models = InMemoryModelRegistry::new();
        let wildcards = InMemoryWildcardStore::new();
        let presets = InMemoryPresetStore::new();
        let collab = empty_collaborators(&models, &wildcards, &presets);

        input.apply_special_logic(&collab);
        assert_eq!(input.raw_original_seed(), Some(-1));
        let seed = input.try_get(&well_known::SEED).unwrap().as_i64().unwrap();
        assert!((0..SEED_CEILING).contains(&seed));
    }

    #[test]
    fn generation_metadata_is_stamped() {
        let mut input = fresh_input();
        let models = InMemoryModelRegistry::new();
        let wildcards = InMemoryWildcardStore::new();
        let presets = InMemoryPresetStore::new();
        let collab = empty_collaborators(&models, &wildcards, &presets);

        input.apply_special_logic(&collab);
        assert!(input.extra_meta.get("date").and_then(|v| v.as_str()).is_some());
        assert_eq!(
            input.extra_meta.get("version").and_then(|v| v.as_str()),
            Some(env!("CARGO_PKG_VERSION"))
        );
    }

    #[test]
    fn explicit_seed_is_preserved_and_snapshotted() {
        let mut input = fresh_input();
        input.set_raw(&well_known::SEED, "42", None).unwrap();
        let models = InMemoryModelRegistry::new();
        let wildcards = InMemoryWildcardStore::new();
        let presets = InMemoryPresetStore::new();
        let collab = empty_collaborators(&models, &wildcards, &presets);

        input.apply_special_logic(&collab);
        assert_eq!(input.raw_original_seed(), Some(42));
        assert_eq!(input.try_get(&well_known::SEED).unwrap().as_i64(), Some(42));
    }

    #[test]
    fn raw_resolution_splits_into_width_and_height() {
        let mut input = fresh_input();
        input.set_raw(&well_known::RAW_RESOLUTION, "768x1024", None).unwrap();
        let models = InMemoryModelRegistry::new();
        let wildcards = InMemoryWildcardStore::new();
        let presets = InMemoryPresetStore::new();
        let collab = empty_collaborators(&models, &wildcards, &presets);

        input.apply_special_logic(&collab);
        assert_eq!(input.get_image_width(), 768);
        assert_eq!(input.get_image_height(), 1024);
    }

    #[test]
    fn lora_weights_are_padded_to_match_loras_with_a_warning() {
        let mut input = fresh_input();
        input.set_raw(&well_known::LORAS, "a,b,c", None).unwrap();
        let models = InMemoryModelRegistry::new();
        let wildcards = InMemoryWildcardStore::new();
        let presets = InMemoryPresetStore::new();
        let collab = empty_collaborators(&models, &wildcards, &presets);

        input.apply_special_logic(&collab);
        assert_eq!(
            input.try_get(&well_known::LORA_WEIGHTS).unwrap().as_list().unwrap().len(),
            3
        );
        assert!(input.extra_meta.contains_key("parser_warnings"));
    }

    #[test]
    fn early_preset_only_applies_must_load_early_params() {
        let mut input = fresh_input();
        input
            .set_typed(&well_known::PROMPT, TypedValue::Text("<preset:fast>".to_string()), None)
            .unwrap();
        let models = InMemoryModelRegistry::new().with_model("anime-v2", None);
        let wildcards = InMemoryWildcardStore::new();
        let mut param_map = HashMap::new();
        param_map.insert("model".to_string(), "anime-v2".to_string());
        param_map.insert("steps".to_string(), "20".to_string());
        let presets = InMemoryPresetStore::new().with_preset(
            "fast",
            Preset {
                param_map,
                template: None,
            },
        );
        let collab = Collaborators {
            models: &models,
            embeddings: &models,
            wildcards: &wildcards,
            presets: &presets,
            resolve_descriptor: &|id: &str| {
                if id == "model" {
                    Some(well_known::MODEL)
                } else if id == "steps" {
                    Some(
                        crate::types::ParamDescriptor::text("steps")
                            .with_data_type(DataType::Integer)
                            .with_numeric_width(crate::types::NumericWidth::W64),
                    )
                } else {
                    None
                }
            },
        };

        input.apply_special_logic(&collab);
        assert!(input.contains(&well_known::MODEL));
        assert!(!input.contains(
            &crate::types::ParamDescriptor::text("steps")
                .with_data_type(DataType::Integer)
                .with_numeric_width(crate::types::NumericWidth::W64)
        ));
    }
}
