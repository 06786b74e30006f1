//! One editable control bound to one entity path.

use crate::model::path::{FieldPath, FieldValue};
use crate::validate::Check;

/// Bound value plus the rules gating its commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldBinding {
    pub path: FieldPath,
    /// User-facing name used in validation messages.
    pub label: &'static str,
    pub checks: Vec<Check>,
    /// Current, not yet committed value.
    pub value: FieldValue,
}

impl FieldBinding {
    /// Creates a binding holding the empty value of `path`'s shape.
    pub fn new(label: &'static str, path: FieldPath) -> Self {
        let value = path.empty_value();
        Self {
            path,
            label,
            checks: Vec::new(),
            value,
        }
    }

    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    pub fn with_value(mut self, value: FieldValue) -> Self {
        self.value = value;
        self
    }

    pub fn required(self) -> Self {
        self.check(Check::Required)
    }

    pub fn existing_file(self) -> Self {
        self.check(Check::ExistingFile)
    }

    pub fn number(self) -> Self {
        self.check(Check::number())
    }
}
