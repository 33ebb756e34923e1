//! Descriptors for the handful of parameter ids the core algorithms touch by
//! name: seed materialization, resolution splitting, LoRA alignment, and the
//! must-load-early allowlist all name specific ids directly (spec §4.G).
//! Everything else is genuinely external and arrives as a caller-supplied
//! [`ParamDescriptor`](crate::types::ParamDescriptor).

use crate::types::{DataType, NumericWidth, ParamDescriptor};

pub const SEED: ParamDescriptor = ParamDescriptor::text("seed")
    .with_data_type(DataType::Integer)
    .with_numeric_width(NumericWidth::W64)
    .with_default("-1");

pub const VARIATION_SEED: ParamDescriptor = ParamDescriptor::text("variationseed")
    .with_data_type(DataType::Integer)
    .with_numeric_width(NumericWidth::W64)
    .with_default("-1");

pub const WILDCARD_SEED: ParamDescriptor = ParamDescriptor::text("wildcardseed")
    .with_data_type(DataType::Integer)
    .with_numeric_width(NumericWidth::W64);

pub const RAW_RESOLUTION: ParamDescriptor =
    ParamDescriptor::text("rawresolution").with_data_type(DataType::Text);

pub const WIDTH: ParamDescriptor = ParamDescriptor::text("width")
    .with_data_type(DataType::Integer)
    .with_numeric_width(NumericWidth::W32)
    .with_default("512");

pub const HEIGHT: ParamDescriptor = ParamDescriptor::text("height")
    .with_data_type(DataType::Integer)
    .with_numeric_width(NumericWidth::W32)
    .with_default("512");

pub const ALT_RESOLUTION_HEIGHT_MULT: ParamDescriptor =
    ParamDescriptor::text("altresolutionheightmult")
        .with_data_type(DataType::Decimal)
        .with_numeric_width(NumericWidth::W64);

pub const LORAS: ParamDescriptor = ParamDescriptor::text("loras").with_data_type(DataType::List);

pub const LORA_WEIGHTS: ParamDescriptor =
    ParamDescriptor::text("loraweights").with_data_type(DataType::List);

pub const LORA_SECTION_CONFINEMENT: ParamDescriptor =
    ParamDescriptor::text("lorasectionconfinement").with_data_type(DataType::List);

pub const PROMPT: ParamDescriptor = ParamDescriptor::text("prompt").with_default("");

pub const NEGATIVE_PROMPT: ParamDescriptor =
    ParamDescriptor::text("negativeprompt").with_default("");

pub const ORIGINAL_PROMPT: ParamDescriptor = ParamDescriptor::text("original_prompt");

pub const ORIGINAL_NEGATIVE_PROMPT: ParamDescriptor =
    ParamDescriptor::text("original_negativeprompt");

pub const MODEL: ParamDescriptor =
    ParamDescriptor::text("model").with_data_type(DataType::Model);

/// Parameter ids a preset's `param_map` is allowed to apply before the main
/// dispatch pipeline runs (spec §4.G.5).
pub const MUST_LOAD_EARLY: &[&str] = &["model", "images", "internalbackendtype", "exactbackendid"];
