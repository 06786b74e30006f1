//! Commit-gating validator over bound editor values.
//!
//! # Responsibility
//! - Check field bindings before anything is written back to an entity.
//! - Produce one specific, user-facing reason on the first failure.
//!
//! # Invariants
//! - Check categories run in a fixed order and stop at the first failure:
//!   required fields, then file existence, then selections, then numeric and
//!   format checks.
//! - Validation only reads; it never mutates the document or the bindings.
//! - Relative file paths resolve against the context base directory.

use crate::model::entity::{EntityKey, EntityKind};
use crate::model::mask::{parse_number, TargetChoice};
use crate::model::path::{FieldPath, FieldValue};
use crate::resolve::resolve;
use crate::session::binding::FieldBinding;
use crate::store::document::Document;
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

static HEX_COLOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("valid hex color regex"));

/// Rule attached to one field binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    /// Text must be non-blank.
    Required,
    /// Non-blank text must name an existing file.
    ExistingFile,
    /// Selection must hold at least one id, each resolving to `kind`.
    RequiredSelection(EntityKind),
    /// Selection may hold at most one id.
    SingleSelection,
    /// Text must parse as a finite number.
    ///
    /// With `gate`, the check only applies while that mask is enabled.
    Number {
        gate: Option<String>,
        allow_empty: bool,
    },
    /// Text must be the `Mean` keyword or a number while `gate` is enabled.
    Target { gate: String },
    /// Text must be a `#RRGGBB` color.
    HexColor { allow_empty: bool },
}

impl Check {
    pub fn number() -> Self {
        Self::Number {
            gate: None,
            allow_empty: false,
        }
    }

    /// Numeric bound of `mask`, checked only while the mask is enabled.
    pub fn bound_of(mask: &str) -> Self {
        Self::Number {
            gate: Some(mask.to_string()),
            allow_empty: false,
        }
    }

    /// Like `bound_of`, but an empty bound means "automatic".
    pub fn optional_bound_of(mask: &str) -> Self {
        Self::Number {
            gate: Some(mask.to_string()),
            allow_empty: true,
        }
    }

    fn category(&self) -> Category {
        match self {
            Self::Required => Category::Required,
            Self::ExistingFile => Category::Files,
            Self::RequiredSelection(_) | Self::SingleSelection => Category::Selections,
            Self::Number { .. } | Self::Target { .. } | Self::HexColor { .. } => Category::Format,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Category {
    Required,
    Files,
    Selections,
    Format,
}

const CATEGORY_ORDER: [Category; 4] = [
    Category::Required,
    Category::Files,
    Category::Selections,
    Category::Format,
];

/// First reason a set of bindings cannot be committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationFailure {
    MissingField {
        label: String,
    },
    FileNotFound {
        label: String,
        path: PathBuf,
    },
    MissingSelection {
        label: String,
    },
    /// Selected id no longer exists in the document.
    UnresolvedSelection {
        label: String,
        target: EntityKey,
    },
    /// Single-target slot holds several ids.
    TooManySelections {
        label: String,
        count: usize,
    },
    NotANumber {
        label: String,
        value: String,
    },
    InvalidFormat {
        label: String,
        value: String,
        expected: &'static str,
    },
}

impl ValidationFailure {
    /// Label of the field that failed.
    pub fn label(&self) -> &str {
        match self {
            Self::MissingField { label }
            | Self::FileNotFound { label, .. }
            | Self::MissingSelection { label }
            | Self::UnresolvedSelection { label, .. }
            | Self::TooManySelections { label, .. }
            | Self::NotANumber { label, .. }
            | Self::InvalidFormat { label, .. } => label,
        }
    }
}

impl Display for ValidationFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField { label } => write!(f, "{label} is required"),
            Self::FileNotFound { label, path } => {
                write!(f, "{label}: file not found `{}`", path.display())
            }
            Self::MissingSelection { label } => write!(f, "please select a {label}"),
            Self::UnresolvedSelection { label, target } => {
                write!(f, "selected {label} no longer exists ({target})")
            }
            Self::TooManySelections { label, count } => {
                write!(f, "select only one {label}, {count} are selected")
            }
            Self::NotANumber { label, value } => {
                write!(f, "{label} must be a number, got `{value}`")
            }
            Self::InvalidFormat {
                label,
                value,
                expected,
            } => write!(f, "{label} must be {expected}, got `{value}`"),
        }
    }
}

impl Error for ValidationFailure {}

/// Read-only inputs a validation run needs besides the bindings.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    pub document: &'a Document,
    pub base_dir: &'a Path,
}

impl<'a> ValidationContext<'a> {
    pub fn new(document: &'a Document, base_dir: &'a Path) -> Self {
        Self { document, base_dir }
    }

    /// Resolves a user-entered path against the base directory.
    pub fn resolve_path(&self, raw: &str) -> PathBuf {
        let path = Path::new(raw.trim());
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

/// Runs every check of `bindings`, category by category.
pub fn validate(
    bindings: &[FieldBinding],
    ctx: &ValidationContext<'_>,
) -> Result<(), ValidationFailure> {
    for category in CATEGORY_ORDER {
        for binding in bindings {
            for check in binding.checks.iter().filter(|c| c.category() == category) {
                run_check(binding, check, bindings, ctx)?;
            }
        }
    }
    Ok(())
}

fn run_check(
    binding: &FieldBinding,
    check: &Check,
    bindings: &[FieldBinding],
    ctx: &ValidationContext<'_>,
) -> Result<(), ValidationFailure> {
    let label = || binding.label.to_string();
    let text = binding.value.as_text().unwrap_or_default();

    match check {
        Check::Required => {
            let missing = match &binding.value {
                FieldValue::Text(text) => text.trim().is_empty(),
                FieldValue::Selection(ids) => ids.is_empty(),
                FieldValue::Flag(_) => false,
            };
            if missing {
                return Err(ValidationFailure::MissingField { label: label() });
            }
        }
        Check::ExistingFile => {
            if text.trim().is_empty() {
                return Ok(());
            }
            let path = ctx.resolve_path(text);
            if !path.is_file() {
                return Err(ValidationFailure::FileNotFound {
                    label: label(),
                    path,
                });
            }
        }
        Check::RequiredSelection(kind) => {
            let ids = binding.value.as_selection().unwrap_or_default();
            if ids.iter().all(|id| id.trim().is_empty()) {
                return Err(ValidationFailure::MissingSelection { label: label() });
            }
            for id in ids.iter().filter(|id| !id.trim().is_empty()) {
                let target = EntityKey::new(*kind, id.clone());
                if !resolve(ctx.document, &target).is_resolved() {
                    return Err(ValidationFailure::UnresolvedSelection {
                        label: label(),
                        target,
                    });
                }
            }
        }
        Check::SingleSelection => {
            let count = binding
                .value
                .as_selection()
                .unwrap_or_default()
                .iter()
                .filter(|id| !id.trim().is_empty())
                .count();
            if count > 1 {
                return Err(ValidationFailure::TooManySelections {
                    label: label(),
                    count,
                });
            }
        }
        Check::Number { gate, allow_empty } => {
            if !gate_open(gate.as_deref(), bindings) {
                return Ok(());
            }
            if text.trim().is_empty() && *allow_empty {
                return Ok(());
            }
            if parse_number(text).is_none() {
                return Err(ValidationFailure::NotANumber {
                    label: label(),
                    value: text.to_string(),
                });
            }
        }
        Check::Target { gate } => {
            if !gate_open(Some(gate), bindings) {
                return Ok(());
            }
            if let TargetChoice::Unrecognized(value) = TargetChoice::parse(text) {
                return Err(ValidationFailure::InvalidFormat {
                    label: label(),
                    value,
                    expected: "`Mean` or a bin number",
                });
            }
        }
        Check::HexColor { allow_empty } => {
            if text.trim().is_empty() && *allow_empty {
                return Ok(());
            }
            if !HEX_COLOR_RE.is_match(text.trim()) {
                return Err(ValidationFailure::InvalidFormat {
                    label: label(),
                    value: text.to_string(),
                    expected: "a #RRGGBB color",
                });
            }
        }
    }
    Ok(())
}

/// Whether the bound enabled-flag of `mask` is set; unbound gates count as open.
fn gate_open(mask: Option<&str>, bindings: &[FieldBinding]) -> bool {
    let Some(mask) = mask else {
        return true;
    };
    let flag_path = FieldPath::MaskEnabled(mask.to_string());
    bindings
        .iter()
        .find(|binding| binding.path == flag_path)
        .and_then(|binding| binding.value.as_flag())
        .unwrap_or(true)
}
