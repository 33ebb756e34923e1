//! The typed parameter map (spec §3 "Parameter map", §4.C).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::errors::{ParamError, ParamResult};
use crate::registries::ModelRegistry;
use crate::types::{DataType, ImageRef, ModelHandle, NumericWidth, ParamDescriptor, TypedValue};

/// Cooperative cancellation flag carried from the owning session (spec §5).
#[derive(Debug, Clone, Default)]
pub struct InterruptToken(Arc<AtomicBool>);

impl InterruptToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Opaque session handle (spec §3 "source_session").
#[derive(Debug, Clone)]
pub struct Session {
    pub user: String,
    pub interrupt_token: InterruptToken,
}

impl Session {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            interrupt_token: InterruptToken::new(),
        }
    }
}

/// The per-request typed parameter map.
#[derive(Debug)]
pub struct Input {
    values: HashMap<String, TypedValue>,
    pub extra_meta: HashMap<String, serde_json::Value>,
    required_flags: HashSet<String>,
    pub refusal_reasons: HashSet<String>,
    raw_original_seed: Option<i64>,
    wildcard_random: Option<StdRng>,
    source_session: Arc<Session>,
}

impl Input {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            values: HashMap::new(),
            extra_meta: HashMap::new(),
            required_flags: HashSet::new(),
            refusal_reasons: HashSet::new(),
            raw_original_seed: None,
            wildcard_random: None,
            source_session: session,
        }
    }

    pub fn session(&self) -> &Session {
        &self.source_session
    }

    pub fn required_flags(&self) -> &HashSet<String> {
        &self.required_flags
    }

    pub fn raw_original_seed(&self) -> Option<i64> {
        self.raw_original_seed
    }

    pub fn set_raw_original_seed(&mut self, seed: i64) {
        self.raw_original_seed = Some(seed);
    }

    /// Push a warning into `extra_meta["parser_warnings"]` and log it,
    /// per spec §7.1. Every soft tag-level failure funnels through here.
    pub fn push_warning(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(warning = %message, "prompt interpreter warning");
        self.record_warning(message);
    }

    /// Like [`push_warning`](Self::push_warning), but carries the parameter
    /// id and offending tag prefix as structured `tracing` fields (spec §7.1,
    /// SPEC_FULL §B). Used at the soft-failure sites that are tied to one
    /// specific tag: unresolved wildcard/preset/embedding/lora, malformed
    /// predata, depth cap hit.
    pub fn push_tag_warning(&mut self, param: &str, tag_prefix: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(param = %param, tag_prefix = %tag_prefix, warning = %message, "prompt interpreter warning");
        self.record_warning(message);
    }

    fn record_warning(&mut self, message: String) {
        let entry = self
            .extra_meta
            .entry("parser_warnings".to_string())
            .or_insert_with(|| serde_json::Value::Array(Vec::new()));
        if let serde_json::Value::Array(arr) = entry {
            arr.push(serde_json::Value::String(message));
        }
    }

    /// Records `name` in `extra_meta["used_wildcards"]`, deduplicated
    /// (spec §8 scenario 3, SPEC_FULL F.2).
    pub fn record_used_wildcard(&mut self, name: &str) {
        self.record_unique_in_extra_meta_list("used_wildcards", name);
    }

    /// Records `name` in `extra_meta["used_embeddings"]`, deduplicated.
    pub fn record_used_embedding(&mut self, name: &str) {
        self.record_unique_in_extra_meta_list("used_embeddings", name);
    }

    fn record_unique_in_extra_meta_list(&mut self, key: &str, value: &str) {
        let entry = self
            .extra_meta
            .entry(key.to_string())
            .or_insert_with(|| serde_json::Value::Array(Vec::new()));
        if let serde_json::Value::Array(arr) = entry {
            if !arr.iter().any(|v| v.as_str() == Some(value)) {
                arr.push(serde_json::Value::String(value.to_string()));
            }
        }
    }

    /// Deterministic per-request RNG (spec §3 invariant 6). Lazily
    /// initialized on first use and stable afterwards.
    pub fn wildcard_rng(&mut self) -> &mut StdRng {
        if self.wildcard_random.is_none() {
            let wildcard_seed = self
                .try_get(&crate::well_known::WILDCARD_SEED)
                .and_then(|v| v.as_i64());
            let seed = match wildcard_seed {
                Some(s) if s >= 0 => s,
                _ => {
                    let seed = self.try_get(&crate::well_known::SEED).and_then(|v| v.as_i64()).unwrap_or(0);
                    let variation = self
                        .try_get(&crate::well_known::VARIATION_SEED)
                        .and_then(|v| v.as_i64())
                        .unwrap_or(0);
                    (seed + variation + 17).rem_euclid(1 << 31)
                }
            };
            self.wildcard_random = Some(StdRng::seed_from_u64(seed as u64));
        }
        self.wildcard_random.as_mut().unwrap()
    }

    fn apply_ignore_if(descriptor: &ParamDescriptor, text: &str) -> bool {
        descriptor.ignore_if == Some(text)
    }

    fn parse_value(
        descriptor: &ParamDescriptor,
        text: &str,
        registry: Option<&dyn ModelRegistry>,
    ) -> ParamResult<TypedValue> {
        let id = descriptor.id.to_string();
        match descriptor.data_type {
            DataType::Integer => match descriptor.numeric_width {
                NumericWidth::W64 => text
                    .parse::<i64>()
                    .map(TypedValue::Int64)
                    .map_err(|_| ParamError::InvalidInteger {
                        id,
                        text: text.to_string(),
                    }),
                NumericWidth::W32 => text
                    .parse::<i32>()
                    .map(TypedValue::Int32)
                    .map_err(|_| ParamError::InvalidInteger {
                        id,
                        text: text.to_string(),
                    }),
            },
            DataType::Decimal => match descriptor.numeric_width {
                NumericWidth::W64 => text
                    .parse::<f64>()
                    .map(TypedValue::Double)
                    .map_err(|_| ParamError::InvalidDecimal {
                        id,
                        text: text.to_string(),
                    }),
                NumericWidth::W32 => text
                    .parse::<f32>()
                    .map(TypedValue::Float)
                    .map_err(|_| ParamError::InvalidDecimal {
                        id,
                        text: text.to_string(),
                    }),
            },
            DataType::Boolean => text
                .parse::<bool>()
                .map(TypedValue::Bool)
                .map_err(|_| ParamError::InvalidBoolean {
                    id,
                    text: text.to_string(),
                }),
            DataType::Text | DataType::Dropdown => Ok(TypedValue::Text(text.to_string())),
            DataType::Image => Ok(TypedValue::Image(ImageRef(text.to_string()))),
            DataType::ImageList => Ok(TypedValue::ImageList(
                text.split('|').map(|s| ImageRef(s.to_string())).collect(),
            )),
            DataType::List => Ok(TypedValue::List(
                text.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            )),
            DataType::Model => {
                let registry = registry.ok_or_else(|| ParamError::ModelNotResolved {
                    id: id.clone(),
                    text: text.to_string(),
                })?;
                let candidates = registry.list_names();
                let canonical = registry
                    .best_match(text, &candidates)
                    .ok_or_else(|| ParamError::ModelNotResolved {
                        id: id.clone(),
                        text: text.to_string(),
                    })?;
                Ok(TypedValue::Model(ModelHandle::new(canonical)))
            }
        }
    }

    /// Runs `clean`, checks `ignore_if` against the cleaned text, and on a
    /// miss parses and stores the value per the descriptor's `data_type`
    /// (spec §4.C).
    pub fn set_raw(
        &mut self,
        descriptor: &ParamDescriptor,
        text: &str,
        registry: Option<&dyn ModelRegistry>,
    ) -> ParamResult<()> {
        let prev_text = self.values.get(descriptor.id).map(TypedValue::as_text);
        let cleaned = match descriptor.clean {
            Some(clean) => clean(prev_text.as_deref(), text),
            None => text.to_string(),
        };

        if Self::apply_ignore_if(descriptor, &cleaned) {
            self.values.remove(descriptor.id);
            return Ok(());
        }

        let value = Self::parse_value(descriptor, &cleaned, registry)?;
        self.values.insert(descriptor.id.to_string(), value);
        if let Some(flag) = descriptor.feature_flag {
            self.required_flags.insert(flag.to_string());
        }
        Ok(())
    }

    /// Stores `value` directly unless the descriptor has a `clean` hook, in
    /// which case it is routed through `set_raw` with the stringified value
    /// (spec §4.C).
    pub fn set_typed(
        &mut self,
        descriptor: &ParamDescriptor,
        value: TypedValue,
        registry: Option<&dyn ModelRegistry>,
    ) -> ParamResult<()> {
        if descriptor.clean.is_some() {
            return self.set_raw(descriptor, &value.as_text(), registry);
        }
        self.values.insert(descriptor.id.to_string(), value);
        if let Some(flag) = descriptor.feature_flag {
            self.required_flags.insert(flag.to_string());
        }
        Ok(())
    }

    /// Read-only lookup with narrowing coercion applied; no default
    /// resolution, no mutation.
    pub fn try_get(&self, descriptor: &ParamDescriptor) -> Option<TypedValue> {
        self.values.get(descriptor.id).map(|v| Self::coerce(descriptor, v))
    }

    fn coerce(descriptor: &ParamDescriptor, value: &TypedValue) -> TypedValue {
        match (descriptor.data_type, descriptor.numeric_width) {
            (DataType::Integer, NumericWidth::W32) => {
                value.as_i32().map(TypedValue::Int32).unwrap_or_else(|| value.clone())
            }
            (DataType::Decimal, NumericWidth::W32) => {
                value.as_f32().map(TypedValue::Float).unwrap_or_else(|| value.clone())
            }
            _ => value.clone(),
        }
    }

    /// Full `get` with default-fallback (spec §4.C): if the value is
    /// missing and an effective default (the `default` argument, falling
    /// back to the descriptor's own default) is non-empty, materializes it
    /// through `set_raw`, reads it back, and removes the key again so the
    /// materialized default never persists.
    pub fn get(
        &mut self,
        descriptor: &ParamDescriptor,
        default: Option<&str>,
        registry: Option<&dyn ModelRegistry>,
    ) -> ParamResult<Option<TypedValue>> {
        if let Some(existing) = self.try_get(descriptor) {
            return Ok(Some(existing));
        }
        let effective_default = default.or(descriptor.default);
        match effective_default {
            Some(d) if !d.is_empty() => {
                self.set_raw(descriptor, d, registry)?;
                let value = self.try_get(descriptor);
                self.values.remove(descriptor.id);
                Ok(value)
            }
            _ => Ok(None),
        }
    }

    pub fn remove(&mut self, descriptor: &ParamDescriptor) {
        self.values.remove(descriptor.id);
    }

    pub fn contains(&self, descriptor: &ParamDescriptor) -> bool {
        self.values.contains_key(descriptor.id)
    }

    /// Iterates every stored `(id, value)` pair, for the metadata serializer
    /// and other whole-map consumers.
    pub fn iter_values(&self) -> impl Iterator<Item = (&str, &TypedValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Deep-copies list-valued entries and `extra_meta`; shares the session
    /// handle (spec §3 Lifecycle).
    pub fn clone_input(&self) -> Self {
        Self {
            values: self
                .values
                .iter()
                .map(|(k, v)| (k.clone(), v.deep_clone()))
                .collect(),
            extra_meta: self.extra_meta.clone(),
            required_flags: self.required_flags.clone(),
            refusal_reasons: self.refusal_reasons.clone(),
            raw_original_seed: self.raw_original_seed,
            wildcard_random: None,
            source_session: Arc::clone(&self.source_session),
        }
    }

    /// Decodes `raw_resolution` ("WxH") or falls back to `width`, defaulting
    /// to 512 (spec §6 "get_image_width").
    pub fn get_image_width(&self) -> i32 {
        if let Some(text) = self
            .try_get(&crate::well_known::RAW_RESOLUTION)
            .and_then(|v| v.as_str().map(str::to_string))
        {
            if let Some((w, _)) = text.split_once('x') {
                if let Ok(w) = w.trim().parse::<i32>() {
                    return w;
                }
            }
        }
        self.try_get(&crate::well_known::WIDTH)
            .and_then(|v| v.as_i32())
            .unwrap_or(512)
    }

    /// Decodes `raw_resolution` ("WxH") or falls back to `height` /
    /// `alt_resolution_height_mult`, defaulting to 512.
    pub fn get_image_height(&self) -> i32 {
        if let Some(text) = self
            .try_get(&crate::well_known::RAW_RESOLUTION)
            .and_then(|v| v.as_str().map(str::to_string))
        {
            if let Some((_, h)) = text.split_once('x') {
                if let Ok(h) = h.trim().parse::<i32>() {
                    return h;
                }
            }
        }
        if let Some(height) = self.try_get(&crate::well_known::HEIGHT).and_then(|v| v.as_i32()) {
            return height;
        }
        if let Some(mult) = self
            .try_get(&crate::well_known::ALT_RESOLUTION_HEIGHT_MULT)
            .and_then(|v| v.as_f64())
        {
            let base = self.try_get(&crate::well_known::WIDTH).and_then(|v| v.as_i32()).unwrap_or(512);
            return (base as f64 * mult).round() as i32;
        }
        512
    }
}
