//! Length-estimation pass (spec §4.F "Length estimation", SPEC_FULL F.4).
//!
//! A separate, side-effect-free tag map over the same syntax: no RNG, no
//! `ModelRegistry`, no mutation. Only `WildcardStore` (to size wildcard
//! candidates) and `SequenceStore::peek` (to size `seq`/`wcs` without
//! advancing) are needed.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::interpreter::scanner::{self, ParsedTag};
use crate::registries::WildcardStore;
use crate::sequence_store::{SequenceKey, SequenceStore};
use crate::splitter::split_smart_non_empty;

pub(crate) fn stable_hash(options: &[String]) -> u64 {
    let mut hasher = DefaultHasher::new();
    options.hash(&mut hasher);
    hasher.finish()
}

fn longest_candidate(
    tag: &ParsedTag<'_>,
    wildcards: &dyn WildcardStore,
    sequence_store: &SequenceStore,
    depth: u32,
) -> Option<String> {
    let options: Vec<String> = match tag.prefix.as_str() {
        "random" => split_smart_non_empty(tag.data.unwrap_or("")),
        "wildcard" | "wc" => {
            let name = tag.data.unwrap_or("").trim();
            let canonical = crate::registries::fuzzy_match(name, wildcards.list_files().iter())?;
            wildcards.get(&canonical)?.options
        }
        _ => return None,
    };
    options
        .iter()
        .map(|o| estimate(o, wildcards, sequence_store, depth + 1))
        .max_by_key(|s| s.chars().count())
}

/// Entry point used by `Input::process_prompt_like_for_length`.
pub(crate) fn estimate(
    text: &str,
    wildcards: &dyn WildcardStore,
    sequence_store: &SequenceStore,
    depth: u32,
) -> String {
    if depth >= crate::interpreter::MAX_DEPTH {
        return text.to_string();
    }
    scanner::scan(text, |tag| {
        let result = match tag.prefix.as_str() {
            "break" => "<break>".to_string(),
            "trigger" | "var" | "embed" | "embedding" | "preset" | "p" | "lora" => String::new(),
            "random" | "wildcard" | "wc" => {
                longest_candidate(&tag, wildcards, sequence_store, depth)?
            }
            "alternate" | "alt" => {
                let parts: Vec<String> = split_smart_non_empty(tag.data.unwrap_or(""))
                    .iter()
                    .map(|p| estimate(p, wildcards, sequence_store, depth + 1))
                    .collect();
                format!("[{}]", parts.join("|"))
            }
            "fromto" => {
                let parts = split_smart_non_empty(tag.data.unwrap_or(""));
                if parts.len() != 2 {
                    return None;
                }
                let step = tag.predata.clone().unwrap_or_default();
                let a = estimate(&parts[0], wildcards, sequence_store, depth + 1);
                let b = estimate(&parts[1], wildcards, sequence_store, depth + 1);
                format!("[{a}:{b}:{step}]")
            }
            "repeat" => {
                let (count_str, body) = tag.data.unwrap_or("").split_once(',')?;
                let count = count_str.trim().parse::<f64>().map(|v| v.trunc() as i64).unwrap_or(0).max(0);
                let one = estimate(body, wildcards, sequence_store, depth + 1);
                std::iter::repeat(one).take(count as usize).collect::<Vec<_>>().join(" ")
            }
            "setvar" => estimate(tag.data.unwrap_or(""), wildcards, sequence_store, depth + 1),
            "seq" => {
                let data = tag.data.unwrap_or("");
                let key = SequenceKey::seq(data);
                let values = split_smart_non_empty(data);
                sequence_store.peek(&key, &values).unwrap_or_default()
            }
            "wildcardseq" | "wcs" => {
                let name = tag.data.unwrap_or("").trim();
                let canonical = crate::registries::fuzzy_match(name, wildcards.list_files().iter())?;
                let options = wildcards.get(&canonical)?.options;
                let hash = stable_hash(&options);
                let key = SequenceKey::wildcard(&canonical, hash);
                sequence_store.peek(&key, &options).unwrap_or_default()
            }
            _ => return None,
        };
        Some(result)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registries::memory::InMemoryWildcardStore;

    #[test]
    fn random_picks_the_longest_option() {
        let wildcards = InMemoryWildcardStore::new();
        let store = SequenceStore::new();
        let out = estimate("<random:a|bbb|cc>", &wildcards, &store, 0);
        assert_eq!(out, "bbb");
    }

    #[test]
    fn repeat_multiplies_the_body_length() {
        let wildcards = InMemoryWildcardStore::new();
        let store = SequenceStore::new();
        let out = estimate("<repeat:3,x>", &wildcards, &store, 0);
        assert_eq!(out, "x x x");
    }

    #[test]
    fn never_advances_a_sequence_cursor() {
        let wildcards = InMemoryWildcardStore::new();
        let store = SequenceStore::new();
        let first = estimate("<seq:a|b|c>", &wildcards, &store, 0);
        let second = estimate("<seq:a|b|c>", &wildcards, &store, 0);
        assert_eq!(first, second);
    }

    #[test]
    fn lora_and_trigger_estimate_empty() {
        let wildcards = InMemoryWildcardStore::new();
        let store = SequenceStore::new();
        assert_eq!(estimate("<lora:detail:0.8>", &wildcards, &store, 0), "");
        assert_eq!(estimate("<trigger>", &wildcards, &store, 0), "");
    }
}
