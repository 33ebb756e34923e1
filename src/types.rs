//! Parameter descriptors and the typed value union stored in an [`Input`](crate::input::Input).

use std::fmt;

/// Declared wire type of a parameter. Drives how `set_raw` parses raw text
/// and which [`TypedValue`] variant a descriptor's slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Integer,
    Decimal,
    Boolean,
    Text,
    Dropdown,
    Image,
    ImageList,
    Model,
    List,
}

/// Distinguishes the two integer and two decimal widths a descriptor can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericWidth {
    W32,
    W64,
}

/// A resolved, canonical model handle (LoRA, embedding, checkpoint, ...).
///
/// Resolution happens through [`crate::registries::ModelRegistry::best_match`];
/// the handle only ever carries the canonical name the registry returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelHandle {
    pub canonical_name: String,
}

impl ModelHandle {
    pub fn new(canonical_name: impl Into<String>) -> Self {
        Self {
            canonical_name: canonical_name.into(),
        }
    }
}

impl fmt::Display for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_name)
    }
}

/// Opaque reference to image bytes. The core never decodes pixels; it only
/// carries whatever textual blob reference the caller handed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef(pub String);

/// Tagged union over every concrete value an [`Input`](crate::input::Input) slot can hold.
///
/// See spec §3 "TypedValue". Narrowing coercions (`i64 -> i32`, `f64 -> f32`)
/// happen on read in [`crate::input::Input::get`], not here.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Int64(i64),
    Int32(i32),
    Double(f64),
    Float(f32),
    Bool(bool),
    Text(String),
    Image(ImageRef),
    ImageList(Vec<ImageRef>),
    Model(ModelHandle),
    List(Vec<String>),
    ModelList(Vec<ModelHandle>),
}

impl TypedValue {
    /// Textual form used for `ignore_if` comparison and metadata emission of
    /// scalar values. List/model-list values join with the interpreter's
    /// canonical separators so the comparison stays deterministic.
    pub fn as_text(&self) -> String {
        match self {
            TypedValue::Int64(v) => v.to_string(),
            TypedValue::Int32(v) => v.to_string(),
            TypedValue::Double(v) => v.to_string(),
            TypedValue::Float(v) => v.to_string(),
            TypedValue::Bool(v) => v.to_string(),
            TypedValue::Text(v) => v.clone(),
            TypedValue::Image(v) => v.0.clone(),
            TypedValue::ImageList(v) => v
                .iter()
                .map(|i| i.0.as_str())
                .collect::<Vec<_>>()
                .join("|"),
            TypedValue::Model(v) => v.canonical_name.clone(),
            TypedValue::List(v) => v.join(","),
            TypedValue::ModelList(v) => v
                .iter()
                .map(|m| m.canonical_name.as_str())
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            TypedValue::Int64(v) => Some(*v),
            TypedValue::Int32(v) => Some(*v as i64),
            _ => None,
        }
    }

    /// Narrowing read: `i64 -> i32`. Truncates silently, matching spec §4.C.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            TypedValue::Int32(v) => Some(*v),
            TypedValue::Int64(v) => Some(*v as i32),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TypedValue::Double(v) => Some(*v),
            TypedValue::Float(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Narrowing read: `f64 -> f32`.
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            TypedValue::Float(v) => Some(*v),
            TypedValue::Double(v) => Some(*v as f32),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TypedValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TypedValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            TypedValue::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_model(&self) -> Option<&ModelHandle> {
        match self {
            TypedValue::Model(v) => Some(v),
            _ => None,
        }
    }

    /// Deep-copies list-valued variants; scalars are shared by value (they're
    /// already owned, so a plain `Clone` is a deep copy for everything here --
    /// kept as a named method so `Input::clone` reads as intentional rather
    /// than relying on the derive matching spec semantics by accident).
    pub fn deep_clone(&self) -> Self {
        self.clone()
    }
}

type CleanFn = fn(prev: Option<&str>, new: &str) -> String;
type FormatFn = fn(&str) -> String;

/// Static descriptor for one parameter id. Owned by the caller (the external
/// "parameter type registry", spec §2.B); the core only ever borrows one of
/// these when calling `Input::set_raw` / `get` / `remove`.
#[derive(Clone, Copy)]
pub struct ParamDescriptor {
    pub id: &'static str,
    pub data_type: DataType,
    pub numeric_width: NumericWidth,
    pub default: Option<&'static str>,
    pub clean: Option<CleanFn>,
    pub ignore_if: Option<&'static str>,
    pub feature_flag: Option<&'static str>,
    pub subtype: Option<&'static str>,
    pub hide_from_metadata: bool,
    pub metadata_format: Option<FormatFn>,
}

impl fmt::Debug for ParamDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamDescriptor")
            .field("id", &self.id)
            .field("data_type", &self.data_type)
            .field("numeric_width", &self.numeric_width)
            .finish_non_exhaustive()
    }
}

impl ParamDescriptor {
    /// Minimal descriptor for ad hoc / test use: text-typed, no clean hook,
    /// no default, nothing hidden.
    pub const fn text(id: &'static str) -> Self {
        ParamDescriptor {
            id,
            data_type: DataType::Text,
            numeric_width: NumericWidth::W64,
            default: None,
            clean: None,
            ignore_if: None,
            feature_flag: None,
            subtype: None,
            hide_from_metadata: false,
            metadata_format: None,
        }
    }

    pub const fn with_default(mut self, default: &'static str) -> Self {
        self.default = Some(default);
        self
    }

    pub const fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    pub const fn with_numeric_width(mut self, width: NumericWidth) -> Self {
        self.numeric_width = width;
        self
    }

    pub const fn with_ignore_if(mut self, sentinel: &'static str) -> Self {
        self.ignore_if = Some(sentinel);
        self
    }

    pub const fn with_feature_flag(mut self, flag: &'static str) -> Self {
        self.feature_flag = Some(flag);
        self
    }

    pub const fn with_subtype(mut self, subtype: &'static str) -> Self {
        self.subtype = Some(subtype);
        self
    }

    pub const fn hidden(mut self) -> Self {
        self.hide_from_metadata = true;
        self
    }

    pub const fn with_clean(mut self, clean: CleanFn) -> Self {
        self.clean = Some(clean);
        self
    }

    pub const fn with_metadata_format(mut self, format: FormatFn) -> Self {
        self.metadata_format = Some(format);
        self
    }
}
