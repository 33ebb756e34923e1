//! In-memory reference implementations of the consumed registries, used by
//! this crate's own tests and as a minimal starting point for callers.

use std::collections::HashMap;

use super::{fuzzy_match, ModelRegistry, Preset, PresetStore, WildcardFile, WildcardStore};

#[derive(Debug, Default)]
pub struct InMemoryModelRegistry {
    /// canonical name -> trigger phrase
    models: HashMap<String, Option<String>>,
}

impl InMemoryModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, canonical: impl Into<String>, trigger: Option<&str>) -> Self {
        self.models
            .insert(canonical.into(), trigger.map(str::to_string));
        self
    }
}

impl ModelRegistry for InMemoryModelRegistry {
    fn best_match(&self, query: &str, candidates: &[String]) -> Option<String> {
        if candidates.is_empty() {
            fuzzy_match(query, self.models.keys())
        } else {
            fuzzy_match(query, candidates.iter())
        }
    }

    fn list_names(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }

    fn trigger_phrase(&self, canonical: &str) -> Option<String> {
        self.models.get(canonical).and_then(|t| t.clone())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryWildcardStore {
    files: HashMap<String, WildcardFile>,
}

impl InMemoryWildcardStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, name: impl Into<String>, options: Vec<&str>) -> Self {
        self.files.insert(
            name.into(),
            WildcardFile {
                options: options.into_iter().map(str::to_string).collect(),
            },
        );
        self
    }

    pub fn resolve(&self, query: &str) -> Option<String> {
        fuzzy_match(query, self.files.keys())
    }
}

impl WildcardStore for InMemoryWildcardStore {
    fn list_files(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    fn get(&self, name: &str) -> Option<WildcardFile> {
        self.files.get(name).cloned()
    }
}

#[derive(Default)]
pub struct InMemoryPresetStore {
    presets: HashMap<String, Preset>,
}

impl InMemoryPresetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_preset(mut self, name: impl Into<String>, preset: Preset) -> Self {
        self.presets.insert(name.into(), preset);
        self
    }

}

impl PresetStore for InMemoryPresetStore {
    fn resolve(&self, query: &str) -> Option<String> {
        fuzzy_match(query, self.presets.keys())
    }

    fn get_preset(&self, name: &str) -> Option<&Preset> {
        self.presets.get(name)
    }

    fn list_names(&self) -> Vec<String> {
        self.presets.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fuzzy_match_is_case_and_path_insensitive() {
        let registry = InMemoryModelRegistry::new().with_model("Styles/Detail-XL", Some("dtl"));
        let candidates: Vec<String> = registry.list_names();
        assert_eq!(
            registry.best_match("detail-xl", &candidates),
            Some("Styles/Detail-XL".to_string())
        );
        assert_eq!(
            registry.best_match("styles\\detail-xl", &candidates),
            Some("Styles/Detail-XL".to_string())
        );
    }
}
