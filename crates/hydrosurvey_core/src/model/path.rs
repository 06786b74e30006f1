//! Typed addressing of values inside one entity.
//!
//! Replaces ad-hoc node chasing with a single `FieldPath -> FieldValue`
//! accessor pair on `Entity`; defaults for absent nodes live in `schema`.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Address of one editable value inside an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "node", content = "name", rename_all = "snake_case")]
pub enum FieldPath {
    /// The entity display name.
    Name,
    /// One scalar child node.
    Scalar(String),
    /// `Enabled` attribute of a mask.
    MaskEnabled(String),
    /// `Min` child of a range mask.
    MaskMin(String),
    /// `Max` child of a range mask.
    MaskMax(String),
    /// `Target` child of a single-bound mask.
    MaskTarget(String),
    /// All references held under one slot.
    Reference(String),
}

impl FieldPath {
    pub fn scalar(name: impl Into<String>) -> Self {
        Self::Scalar(name.into())
    }

    pub fn reference(slot: impl Into<String>) -> Self {
        Self::Reference(slot.into())
    }

    /// Empty value of the shape this path carries.
    pub fn empty_value(&self) -> FieldValue {
        match self {
            Self::MaskEnabled(_) => FieldValue::Flag(false),
            Self::Reference(_) => FieldValue::Selection(Vec::new()),
            _ => FieldValue::Text(String::new()),
        }
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Name => write!(f, "Name"),
            Self::Scalar(name) => write!(f, "{name}"),
            Self::MaskEnabled(mask) => write!(f, "{mask}.Enabled"),
            Self::MaskMin(mask) => write!(f, "{mask}.Min"),
            Self::MaskMax(mask) => write!(f, "{mask}.Max"),
            Self::MaskTarget(mask) => write!(f, "{mask}.Target"),
            Self::Reference(slot) => write!(f, "{slot}"),
        }
    }
}

/// Value held by one bound field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    /// Text box content, stored verbatim.
    Text(String),
    /// Checkbox state.
    Flag(bool),
    /// Selected entity ids, in selection order.
    Selection(Vec<String>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(flag) => Some(*flag),
            _ => None,
        }
    }

    pub fn as_selection(&self) -> Option<&[String]> {
        match self {
            Self::Selection(ids) => Some(ids.as_slice()),
            _ => None,
        }
    }

    /// Returns whether both values are the same variant.
    pub fn same_shape(&self, other: &FieldValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// Flat string form used by request snapshots.
    pub fn to_flat_string(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Flag(flag) => flag.to_string(),
            Self::Selection(ids) => ids.join(","),
        }
    }
}

/// Failure to address or write one path on an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// The node the path points at is structurally absent.
    Missing(FieldPath),
    /// The value shape does not fit the node.
    TypeMismatch(FieldPath),
}

impl Display for PathError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing(path) => write!(f, "node `{path}` is missing"),
            Self::TypeMismatch(path) => write!(f, "value does not fit node `{path}`"),
        }
    }
}

impl Error for PathError {}
