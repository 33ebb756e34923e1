//! Main-phase (value-producing) tag handlers (spec §4.F "Tag semantics").

use rand::Rng;

use crate::interpreter::{HandlerResult, ParseContext};
use crate::sequence_store::SequenceKey;
use crate::splitter::split_smart_non_empty;
use crate::well_known;

/// Parses a `random`/`wildcard` predata blob (`"N,"` or `"N"`) into a count
/// and the inter-part join separator. A trailing comma selects `", "`; its
/// absence selects `" "` (spec §4.F).
fn parse_count_and_sep(predata: Option<&str>) -> (usize, &'static str) {
    match predata {
        None => (1, " "),
        Some(raw) => {
            let trailing_comma = raw.trim_end().ends_with(',');
            let n: usize = raw
                .trim()
                .trim_end_matches(',')
                .trim()
                .parse()
                .unwrap_or(1)
                .max(1);
            if trailing_comma {
                (n, ", ")
            } else {
                (n, " ")
            }
        }
    }
}

/// Draws `n` entries from `options` without replacement; once the pool is
/// exhausted, refills and keeps drawing (spec §4.F "Draw without
/// replacement until exhausted, then refill").
fn draw_n(rng: &mut impl Rng, options: &[String], n: usize) -> Vec<String> {
    if options.is_empty() || n == 0 {
        return Vec::new();
    }
    let mut remaining: Vec<usize> = (0..options.len()).collect();
    let mut out = Vec::with_capacity(n);
    while out.len() < n {
        if remaining.is_empty() {
            remaining = (0..options.len()).collect();
        }
        let idx = rng.random_range(0..remaining.len());
        out.push(options[remaining.remove(idx)].clone());
    }
    out
}

/// If `text` is a numeric range `lo-hi`, samples a value in `[lo, hi]`
/// (integers first, decimals as fallback). `None` if `text` isn't a range.
fn maybe_numeric_range(text: &str, rng: &mut impl Rng) -> Option<String> {
    let text = text.trim();
    let rest = text.strip_prefix('-').unwrap_or(text);
    let offset = text.len() - rest.len();
    let dash = rest.find('-')? + offset;
    let (lo_str, hi_str) = (text[..dash].trim(), text[dash + 1..].trim());
    if lo_str.is_empty() || hi_str.is_empty() {
        return None;
    }
    if let (Ok(lo), Ok(hi)) = (lo_str.parse::<i64>(), hi_str.parse::<i64>()) {
        if lo > hi {
            return None;
        }
        return Some(rng.random_range(lo..=hi).to_string());
    }
    if let (Ok(lo), Ok(hi)) = (lo_str.parse::<f64>(), hi_str.parse::<f64>()) {
        if lo > hi {
            return None;
        }
        return Some(rng.random_range(lo..=hi).to_string());
    }
    None
}

/// `<random[N,]:a|b|...>` (spec §4.F).
pub fn random(data: &str, ctx: &mut ParseContext) -> Option<HandlerResult> {
    let (n, sep) = parse_count_and_sep(ctx.pre_data());
    let options = split_smart_non_empty(data);
    if options.is_empty() {
        ctx.warn(format!("random tag in '{}' has no options", ctx.param()));
        return None;
    }

    let chosen = draw_n(ctx.input_mut().wildcard_rng(), &options, n);
    let parts: Vec<String> = chosen
        .into_iter()
        .map(|opt| match maybe_numeric_range(&opt, ctx.input_mut().wildcard_rng()) {
            Some(range_value) => range_value,
            None => ctx.parse(&opt),
        })
        .collect();
    Some(HandlerResult::Literal(parts.join(sep)))
}

/// `<alternate:a|b|...>` / `<alt:...>` (spec §4.F).
pub fn alternate(data: &str, ctx: &mut ParseContext) -> Option<HandlerResult> {
    let parsed: Vec<String> = split_smart_non_empty(data).iter().map(|p| ctx.parse(p)).collect();
    Some(HandlerResult::Literal(format!("[{}]", parsed.join("|"))))
}

/// `<fromto[step]:a|b>` (spec §4.F).
pub fn fromto(data: &str, ctx: &mut ParseContext) -> Option<HandlerResult> {
    let step = match ctx.pre_data() {
        Some(s) => s.trim().to_string(),
        None => {
            ctx.warn(format!("fromto tag in '{}' is missing its [step] predata", ctx.param()));
            return None;
        }
    };
    if step.parse::<f64>().is_err() {
        ctx.warn(format!("fromto tag in '{}' has non-numeric step '{step}'", ctx.param()));
        return None;
    }
    let parts = split_smart_non_empty(data);
    if parts.len() != 2 {
        ctx.warn(format!("fromto tag in '{}' requires exactly two parts", ctx.param()));
        return None;
    }
    let a = ctx.parse(&parts[0]);
    let b = ctx.parse(&parts[1]);
    Some(HandlerResult::Literal(format!("[{a}:{b}:{step}]")))
}

/// `<wildcard[N,]:name>` / `<wc:name>` (spec §4.F).
pub fn wildcard(data: &str, ctx: &mut ParseContext) -> Option<HandlerResult> {
    let name = data.trim();
    let collaborators = ctx.collaborators();
    let files = collaborators.wildcards.list_files();
    let canonical = match crate::registries::fuzzy_match(name, files.iter()) {
        Some(c) => c,
        None => {
            ctx.warn(format!("unresolved wildcard '{name}' in parameter '{}'", ctx.param()));
            return None;
        }
    };
    let options = match collaborators.wildcards.get(&canonical) {
        Some(file) => file.options,
        None => {
            ctx.warn(format!("wildcard file '{canonical}' has no options"));
            return None;
        }
    };
    if options.is_empty() {
        ctx.warn(format!("wildcard file '{canonical}' is empty"));
        return Some(HandlerResult::erase());
    }

    let (n, sep) = parse_count_and_sep(ctx.pre_data());
    let chosen = draw_n(ctx.input_mut().wildcard_rng(), &options, n);
    ctx.input_mut().record_used_wildcard(&canonical);
    let parts: Vec<String> = chosen.into_iter().map(|opt| ctx.parse(&opt)).collect();
    Some(HandlerResult::Literal(parts.join(sep)))
}

/// `<repeat:N,text>` (spec §4.F, SPEC_FULL F.1: truncate the count toward
/// zero; a non-positive count yields the empty string with a warning).
pub fn repeat(data: &str, ctx: &mut ParseContext) -> Option<HandlerResult> {
    let (count_str, text) = data.split_once(',')?;
    let count = match count_str.trim().parse::<f64>() {
        Ok(v) => v.trunc() as i64,
        Err(_) => {
            ctx.warn(format!("repeat tag in '{}' has non-numeric count '{count_str}'", ctx.param()));
            return None;
        }
    };
    if count <= 0 {
        ctx.warn(format!("repeat tag in '{}' has non-positive count {count}", ctx.param()));
        return Some(HandlerResult::erase());
    }
    let parts: Vec<String> = (0..count).map(|_| ctx.parse(text)).collect();
    Some(HandlerResult::Literal(parts.join(" ").trim().to_string()))
}

/// `<preset:name>` / `<p:name>` (spec §4.F preset-value splice protocol).
pub fn preset(data: &str, ctx: &mut ParseContext) -> Option<HandlerResult> {
    let name = data.trim();
    let collaborators = ctx.collaborators();
    let canonical = match collaborators.presets.resolve(name) {
        Some(c) => c,
        None => {
            ctx.warn(format!("unresolved preset '{name}' in parameter '{}'", ctx.param()));
            return None;
        }
    };
    let preset = collaborators.presets.get_preset(&canonical)?;
    let template = preset.template.clone();
    let applies_to_current_param = preset.param_map.contains_key(ctx.param());

    let (input, collaborators) = (ctx.input_mut(), collaborators);
    preset.apply_to(input, collaborators.resolve_descriptor, Some(collaborators.models));

    if applies_to_current_param {
        if let Some(template) = template {
            let (before, after) = match template.split_once("{value}") {
                Some((b, a)) => (b.to_string(), a.to_string()),
                None => (template, String::new()),
            };
            return Some(HandlerResult::SpliceAround { before, after });
        }
    }
    Some(HandlerResult::erase())
}

/// `<embed:name>` / `<embedding:name>` (spec §4.F).
pub fn embed(data: &str, ctx: &mut ParseContext) -> Option<HandlerResult> {
    let name = data.trim();
    let collaborators = ctx.collaborators();
    let candidates = collaborators.embeddings.list_names();
    let canonical = match collaborators.embeddings.best_match(name, &candidates) {
        Some(c) => c,
        None => {
            ctx.warn(format!("unresolved embedding '{name}' in parameter '{}'", ctx.param()));
            return Some(HandlerResult::erase());
        }
    };
    if canonical.contains(' ') {
        ctx.warn(format!("embedding name '{canonical}' contains a space"));
    }
    ctx.input_mut().record_used_embedding(&canonical);
    Some(HandlerResult::Literal(format!("\u{0}swarmembed:{canonical}\u{0}end")))
}

/// `<setvar[name]:text>` (spec §4.F).
pub fn setvar(data: &str, ctx: &mut ParseContext) -> Option<HandlerResult> {
    let name = match ctx.pre_data() {
        Some(n) if !n.trim().is_empty() => n.trim().to_string(),
        _ => {
            ctx.warn(format!("setvar tag in '{}' is missing a variable name", ctx.param()));
            return None;
        }
    };
    let parsed = ctx.parse(data);
    ctx.set_variable(name, parsed.clone());
    Some(HandlerResult::Literal(parsed))
}

/// `<var:name>` (spec §4.F).
pub fn var(data: &str, ctx: &mut ParseContext) -> Option<HandlerResult> {
    let name = data.trim();
    match ctx.get_variable(name) {
        Some(value) => Some(HandlerResult::Literal(value.to_string())),
        None => {
            ctx.warn(format!("variable '{name}' is not set in parameter '{}'", ctx.param()));
            Some(HandlerResult::erase())
        }
    }
}

/// `<seq:a|b|...>` (spec §4.D, §4.F).
pub fn seq(data: &str, ctx: &mut ParseContext) -> Option<HandlerResult> {
    let key = SequenceKey::seq(data);
    let values = split_smart_non_empty(data);
    let value = ctx.sequence_store().advance(&key, &values)?;
    Some(HandlerResult::Literal(value))
}

/// `<wildcardseq:name>` / `<wcs:name>` (spec §4.D, §4.F). Unlike `wildcard`,
/// there's no per-call draw count -- each evaluation advances the cursor by
/// exactly one (SPEC_FULL F.2: also records `used_wildcards`, uniformly with
/// `wildcard`).
pub fn wildcardseq(data: &str, ctx: &mut ParseContext) -> Option<HandlerResult> {
    let name = data.trim();
    let collaborators = ctx.collaborators();
    let files = collaborators.wildcards.list_files();
    let canonical = match crate::registries::fuzzy_match(name, files.iter()) {
        Some(c) => c,
        None => {
            ctx.warn(format!("unresolved wildcard '{name}' in parameter '{}'", ctx.param()));
            return None;
        }
    };
    let options = collaborators.wildcards.get(&canonical)?.options;
    if options.is_empty() {
        ctx.warn(format!("wildcard file '{canonical}' is empty"));
        return Some(HandlerResult::erase());
    }
    let options_hash = crate::interpreter::handlers::length::stable_hash(&options);
    let key = SequenceKey::wildcard(&canonical, options_hash);
    let value = ctx.sequence_store().advance(&key, &options)?;
    ctx.input_mut().record_used_wildcard(&canonical);
    Some(HandlerResult::Literal(ctx.parse(&value)))
}
