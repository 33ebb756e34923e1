//! Error types for the parameter map and the interpreter.
//!
//! Tag-level problems are never represented here — per spec §7.1 they are
//! downgraded to warnings recorded in `extra_meta["parser_warnings"]`. These
//! enums only cover parse failures and programmer errors at the `Input`
//! boundary (§7.2–§7.3) plus interpreter-internal invariant checks.

use thiserror::Error;

pub type ParamResult<T> = Result<T, ParamError>;

#[derive(Debug, Error)]
pub enum ParamError {
    #[error("parameter '{id}': invalid integer literal '{text}'")]
    InvalidInteger { id: String, text: String },

    #[error("parameter '{id}': invalid decimal literal '{text}'")]
    InvalidDecimal { id: String, text: String },

    #[error("parameter '{id}': invalid boolean literal '{text}'")]
    InvalidBoolean { id: String, text: String },

    #[error("parameter '{id}': no model registry match for '{text}'")]
    ModelNotResolved { id: String, text: String },

    #[error("unknown parameter descriptor '{id}'")]
    UnknownParameter { id: String },
}

#[derive(Debug, Error)]
pub enum InterpError {
    #[error("recursion budget exhausted while parsing tag in parameter '{param}'")]
    RecursionBudgetExhausted { param: String },
}
