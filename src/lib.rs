//! Typed parameter map and prompt-template interpreter for a text-to-image
//! generation request (spec §1 "Purpose & scope").
//!
//! An [`Input`](input::Input) owns the coerced, typed value of every
//! parameter a request carries. [`interpreter`] recursively expands the
//! angle-bracket tag language embedded in prompt-like string parameters
//! (`<random:...>`, `<wildcard:...>`, `<lora:...>`, ...), driven by the
//! external [`registries`] the host service supplies. [`special_logic`]
//! normalizes the handful of parameters the core treats as privileged
//! (`seed`, `raw_resolution`, `loras`) before the interpreter ever runs.
//! [`metadata`] serializes the final map back out as generation metadata.

pub mod errors;
pub mod input;
pub mod interpreter;
pub mod metadata;
pub mod registries;
pub mod sequence_store;
pub mod special_logic;
pub mod splitter;
pub mod types;
pub mod well_known;

pub use errors::{InterpError, ParamError, ParamResult};
pub use input::{InterruptToken, Input, Session};
pub use interpreter::{HandlerResult, ParseContext, MAX_DEPTH};
pub use registries::{Collaborators, ModelRegistry, Preset, PresetStore, WildcardFile, WildcardStore};
pub use sequence_store::{SequenceKey, SequenceStore};
pub use types::{DataType, ImageRef, ModelHandle, NumericWidth, ParamDescriptor, TypedValue};
