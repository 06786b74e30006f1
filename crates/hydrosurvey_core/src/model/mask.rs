//! Reusable masking range shared by instruments, models and map presets.
//!
//! # Responsibility
//! - Hold the "enabled + bound(s)" setting exactly as the user typed it.
//! - Interpret bounds for downstream computation only when enabled.
//!
//! # Invariants
//! - Disabling a mask never clears its bound text.
//! - Bound text is stored verbatim; parsing happens on read, never on write.

use serde::{Deserialize, Serialize};

/// Keyword stored in place of a numeric target when aggregating by mean.
pub const MEAN_KEYWORD: &str = "Mean";

/// Enabled flag plus either a min/max pair or a single target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskRange {
    pub enabled: bool,
    pub bounds: MaskBounds,
}

/// Bound layout of a mask.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskBounds {
    /// Lower/upper pair, e.g. echo intensity `0..255`.
    Range {
        min: Option<String>,
        max: Option<String>,
    },
    /// Single-bound variant: `Mean` keyword or an explicit numeric target.
    Target(String),
}

impl MaskRange {
    /// Creates a min/max mask.
    pub fn range(enabled: bool, min: impl Into<String>, max: impl Into<String>) -> Self {
        Self {
            enabled,
            bounds: MaskBounds::Range {
                min: Some(min.into()),
                max: Some(max.into()),
            },
        }
    }

    /// Creates a single-bound mask.
    pub fn target(enabled: bool, target: impl Into<String>) -> Self {
        Self {
            enabled,
            bounds: MaskBounds::Target(target.into()),
        }
    }

    pub fn is_target(&self) -> bool {
        matches!(self.bounds, MaskBounds::Target(_))
    }

    /// Raw lower bound text, `None` for target masks or an absent bound.
    pub fn min_text(&self) -> Option<&str> {
        match &self.bounds {
            MaskBounds::Range { min, .. } => min.as_deref(),
            MaskBounds::Target(_) => None,
        }
    }

    /// Raw upper bound text, `None` for target masks or an absent bound.
    pub fn max_text(&self) -> Option<&str> {
        match &self.bounds {
            MaskBounds::Range { max, .. } => max.as_deref(),
            MaskBounds::Target(_) => None,
        }
    }

    /// Raw target text, `None` for range masks.
    pub fn target_text(&self) -> Option<&str> {
        match &self.bounds {
            MaskBounds::Target(target) => Some(target.as_str()),
            MaskBounds::Range { .. } => None,
        }
    }

    /// Numeric bounds the consuming computation should apply.
    ///
    /// Returns `None` when the mask is disabled or is a target mask. Bounds
    /// that are absent or do not parse are reported as `None` individually.
    pub fn effective_range(&self) -> Option<(Option<f64>, Option<f64>)> {
        if !self.enabled {
            return None;
        }
        match &self.bounds {
            MaskBounds::Range { min, max } => Some((
                min.as_deref().and_then(parse_number),
                max.as_deref().and_then(parse_number),
            )),
            MaskBounds::Target(_) => None,
        }
    }

    /// Target the consuming computation should apply, `None` when disabled.
    pub fn effective_target(&self) -> Option<TargetChoice> {
        if !self.enabled {
            return None;
        }
        self.target_text().map(TargetChoice::parse)
    }
}

/// UI representation chosen for a stored target value.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetChoice {
    /// "Mean" box checked, spinner disabled.
    Mean,
    /// Spinner enabled with an explicit numeric target.
    Bin(f64),
    /// Stored text is neither the keyword nor a number.
    Unrecognized(String),
}

impl TargetChoice {
    /// Classifies stored target text purely by its content.
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.eq_ignore_ascii_case(MEAN_KEYWORD) {
            return Self::Mean;
        }
        match parse_number(trimmed) {
            Some(value) => Self::Bin(value),
            None => Self::Unrecognized(text.to_string()),
        }
    }

    /// Text written back into the document for this choice.
    pub fn to_text(&self) -> String {
        match self {
            Self::Mean => MEAN_KEYWORD.to_string(),
            Self::Bin(value) => value.to_string(),
            Self::Unrecognized(text) => text.clone(),
        }
    }
}

/// Parses user-entered numeric text, rejecting non-finite values.
pub fn parse_number(text: &str) -> Option<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}
