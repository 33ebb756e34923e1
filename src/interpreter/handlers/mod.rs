//! Tag handler registry (spec §4.E): three disjoint maps, keyed by lowercase
//! prefix, built once via `once_cell::sync::Lazy` since the registry is
//! read-only after startup (spec §5).

pub mod basic;
pub mod length;
pub mod main_tags;
pub mod post;

use std::collections::HashMap;

use once_cell::sync::Lazy;

use super::{HandlerResult, ParseContext, Phase};

pub(crate) type HandlerFn = for<'a> fn(&str, &mut ParseContext<'a>) -> Option<HandlerResult>;

static BASIC: Lazy<HashMap<&'static str, HandlerFn>> = Lazy::new(|| {
    let mut m: HashMap<&'static str, HandlerFn> = HashMap::new();
    m.insert("break", basic::break_tag);
    m.insert("trigger", basic::trigger);
    m
});

static MAIN: Lazy<HashMap<&'static str, HandlerFn>> = Lazy::new(|| {
    let mut m: HashMap<&'static str, HandlerFn> = HashMap::new();
    m.insert("random", main_tags::random);
    m.insert("alternate", main_tags::alternate);
    m.insert("alt", main_tags::alternate);
    m.insert("fromto", main_tags::fromto);
    m.insert("wildcard", main_tags::wildcard);
    m.insert("wc", main_tags::wildcard);
    m.insert("repeat", main_tags::repeat);
    m.insert("preset", main_tags::preset);
    m.insert("p", main_tags::preset);
    m.insert("embed", main_tags::embed);
    m.insert("embedding", main_tags::embed);
    m.insert("setvar", main_tags::setvar);
    m.insert("var", main_tags::var);
    m.insert("seq", main_tags::seq);
    m.insert("wildcardseq", main_tags::wildcardseq);
    m.insert("wcs", main_tags::wildcardseq);
    m
});

static POST: Lazy<HashMap<&'static str, HandlerFn>> = Lazy::new(|| {
    let mut m: HashMap<&'static str, HandlerFn> = HashMap::new();
    m.insert("lora", post::lora);
    m.insert("segment", post::segment);
    m.insert("object", post::segment);
    m.insert("region", post::segment);
    m
});

pub(crate) fn lookup(phase: Phase, prefix: &str) -> Option<HandlerFn> {
    let map = match phase {
        Phase::Basic => &*BASIC,
        Phase::Main => &*MAIN,
        Phase::Post => &*POST,
    };
    map.get(prefix).copied()
}
