//! Per-mode binding lists for the editor dialogs.
//!
//! # Responsibility
//! - Describe, for each dialog mode, which entity paths are bound, in display
//!   order, and which checks gate their commit.
//!
//! # Invariants
//! - Every form binds exactly one entity kind.
//! - Bindings are built fresh per call; no binding is shared across modes.

use crate::model::entity::{Entity, EntityKind};
use crate::model::path::FieldPath;
use crate::model::schema::{
    schema, Cardinality, BEAM_ANGLE, COLORMAP, COLOR_SCALE, DATA_FILE, FILL_COLOR, FREQUENCY, GRID_LINE_COUNT,
    INSTRUMENT_TYPE, INTERCEPT, LINE_COLOR, LINE_WIDTH, MAGNETIC_DECLINATION, MASK_BINS,
    MASK_CORRELATION, MASK_ECHO_INTENSITY, MASK_ERROR_VELOCITY, MASK_PERCENT_GOOD, MESH_FILE,
    MODEL_TYPE, OPACITY, PADDING, PLOT_TYPE, POSITION_COLUMN_X, POSITION_COLUMN_Y, POSITION_FILE,
    RESULT_FILE, SCALE_BAR, SHAPEFILE_PATH, SLOPE, SLOT_INSTRUMENT, SLOT_MODEL, SLOT_SHAPEFILE,
    SLOT_SURVEY, SURVEY_DATE, SURVEY_DESCRIPTION, SURVEY_VESSEL, TICK_FONT_SIZE, TITLE,
    TRANSDUCER_DEPTH, UTC_OFFSET, VERTICAL_AGGREGATION,
};
use crate::session::binding::FieldBinding;
use crate::validate::Check;

/// Map preset dialog layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlotMode {
    /// Plain map with overlays.
    Map,
    /// Measured ADCP data against a model.
    AdcpComparison,
    /// Model output only.
    ModelResult,
}

impl PlotMode {
    pub const ALL: [PlotMode; 3] = [Self::Map, Self::AdcpComparison, Self::ModelResult];

    /// Value persisted in the `PlotType` field.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Map => "Map",
            Self::AdcpComparison => "AdcpComparison",
            Self::ModelResult => "ModelResult",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(trimmed))
    }
}

/// Dialog mode: one variant per editable layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditorForm {
    Survey,
    Instrument,
    Model,
    ShapefileOverlay,
    MapPreset(PlotMode),
}

impl EditorForm {
    /// Kind of entity this form edits.
    pub fn kind(self) -> EntityKind {
        match self {
            Self::Survey => EntityKind::Survey,
            Self::Instrument => EntityKind::Instrument,
            Self::Model => EntityKind::Model,
            Self::ShapefileOverlay => EntityKind::ShapefileOverlay,
            Self::MapPreset(_) => EntityKind::MapPreset,
        }
    }

    /// Form a dialog opens with for `entity`.
    ///
    /// Map presets pick their layout from the stored `PlotType`, falling back
    /// to the plain map when it is absent or unknown.
    pub fn default_for(entity: &Entity) -> Self {
        match entity.kind {
            EntityKind::Survey => Self::Survey,
            EntityKind::Instrument => Self::Instrument,
            EntityKind::Model => Self::Model,
            EntityKind::ShapefileOverlay => Self::ShapefileOverlay,
            EntityKind::MapPreset => Self::MapPreset(
                entity
                    .field(PLOT_TYPE)
                    .and_then(PlotMode::parse)
                    .unwrap_or(PlotMode::Map),
            ),
        }
    }

    pub fn plot_mode(self) -> Option<PlotMode> {
        match self {
            Self::MapPreset(mode) => Some(mode),
            _ => None,
        }
    }

    /// Ordered bindings of this form, holding empty values.
    pub fn bindings(self) -> Vec<FieldBinding> {
        let mut bindings = vec![FieldBinding::new("Name", FieldPath::Name).required()];
        match self {
            Self::Survey => bindings.extend(survey()),
            Self::Instrument => bindings.extend(instrument()),
            Self::Model => bindings.extend(model()),
            Self::ShapefileOverlay => bindings.extend(shapefile_overlay()),
            Self::MapPreset(mode) => bindings.extend(map_preset(mode)),
        }
        bindings
    }
}

fn scalar(label: &'static str, name: &str) -> FieldBinding {
    FieldBinding::new(label, FieldPath::scalar(name))
}

/// Selection bound to `slot` of `owner`; single-target slots get a
/// one-id limit.
fn selection(owner: EntityKind, label: &'static str, slot: &str) -> FieldBinding {
    let binding = FieldBinding::new(label, FieldPath::reference(slot));
    match schema(owner).slot(slot) {
        Some(declared) if declared.cardinality == Cardinality::One => {
            binding.check(Check::SingleSelection)
        }
        _ => binding,
    }
}

/// Enabled flag plus both bounds of a range mask.
fn range_mask(
    labels: [&'static str; 3],
    mask: &str,
    bound_check: fn(&str) -> Check,
) -> [FieldBinding; 3] {
    let [enabled, min, max] = labels;
    [
        FieldBinding::new(enabled, FieldPath::MaskEnabled(mask.to_string())),
        FieldBinding::new(min, FieldPath::MaskMin(mask.to_string())).check(bound_check(mask)),
        FieldBinding::new(max, FieldPath::MaskMax(mask.to_string())).check(bound_check(mask)),
    ]
}

fn survey() -> Vec<FieldBinding> {
    vec![
        scalar("Date", SURVEY_DATE),
        scalar("Vessel", SURVEY_VESSEL),
        scalar("Description", SURVEY_DESCRIPTION),
    ]
}

fn instrument() -> Vec<FieldBinding> {
    let mut bindings = vec![
        scalar("Instrument type", INSTRUMENT_TYPE).required(),
        scalar("Data file", DATA_FILE).required().existing_file(),
        scalar("Position file", POSITION_FILE).existing_file(),
        scalar("Easting column", POSITION_COLUMN_X),
        scalar("Northing column", POSITION_COLUMN_Y),
        scalar("Beam angle", BEAM_ANGLE).number(),
        scalar("Frequency", FREQUENCY).number(),
        scalar("Transducer depth", TRANSDUCER_DEPTH).number(),
        scalar("Magnetic declination", MAGNETIC_DECLINATION).number(),
        scalar("UTC offset", UTC_OFFSET).number(),
        selection(EntityKind::Instrument, "Survey", SLOT_SURVEY),
    ];
    let masks = [
        (
            ["Mask echo intensity", "Minimum echo intensity", "Maximum echo intensity"],
            MASK_ECHO_INTENSITY,
        ),
        (
            ["Mask correlation", "Minimum correlation", "Maximum correlation"],
            MASK_CORRELATION,
        ),
        (
            ["Mask percent good", "Minimum percent good", "Maximum percent good"],
            MASK_PERCENT_GOOD,
        ),
        (
            ["Mask error velocity", "Minimum error velocity", "Maximum error velocity"],
            MASK_ERROR_VELOCITY,
        ),
        (["Mask bins", "First bin", "Last bin"], MASK_BINS),
    ];
    for (labels, mask) in masks {
        bindings.extend(range_mask(labels, mask, Check::bound_of));
    }
    bindings
}

fn model() -> Vec<FieldBinding> {
    vec![
        scalar("Model type", MODEL_TYPE).required(),
        scalar("Mesh file", MESH_FILE).existing_file(),
        scalar("Result file", RESULT_FILE).existing_file(),
        scalar("Slope", SLOPE).number(),
        scalar("Intercept", INTERCEPT).number(),
        selection(EntityKind::Model, "Calibration instrument", SLOT_INSTRUMENT),
    ]
}

fn shapefile_overlay() -> Vec<FieldBinding> {
    vec![
        scalar("Shapefile", SHAPEFILE_PATH).required().existing_file(),
        scalar("Line color", LINE_COLOR).check(Check::HexColor { allow_empty: false }),
        scalar("Line width", LINE_WIDTH).number(),
        scalar("Fill color", FILL_COLOR).check(Check::HexColor { allow_empty: true }),
        scalar("Opacity", OPACITY).number(),
    ]
}

fn map_preset(mode: PlotMode) -> Vec<FieldBinding> {
    let mut bindings = vec![
        scalar("Plot type", PLOT_TYPE),
        scalar("Title", TITLE),
        scalar("Colormap", COLORMAP).required(),
        scalar("Grid lines", GRID_LINE_COUNT).number(),
        scalar("Tick font size", TICK_FONT_SIZE).number(),
        scalar("Padding", PADDING).number(),
        scalar("Scale bar", SCALE_BAR),
    ];
    match mode {
        PlotMode::Map => {}
        PlotMode::AdcpComparison => {
            bindings.push(
                selection(EntityKind::MapPreset, "Instrument", SLOT_INSTRUMENT)
                    .check(Check::RequiredSelection(EntityKind::Instrument)),
            );
            bindings.push(
                selection(EntityKind::MapPreset, "Model", SLOT_MODEL)
                    .check(Check::RequiredSelection(EntityKind::Model)),
            );
            bindings.push(FieldBinding::new(
                "Average over depth",
                FieldPath::MaskEnabled(VERTICAL_AGGREGATION.to_string()),
            ));
            bindings.push(
                FieldBinding::new(
                    "Target bin",
                    FieldPath::MaskTarget(VERTICAL_AGGREGATION.to_string()),
                )
                .check(Check::Target {
                    gate: VERTICAL_AGGREGATION.to_string(),
                }),
            );
        }
        PlotMode::ModelResult => {
            bindings.push(
                selection(EntityKind::MapPreset, "Model", SLOT_MODEL)
                    .check(Check::RequiredSelection(EntityKind::Model)),
            );
        }
    }
    if mode != PlotMode::AdcpComparison {
        bindings.extend(range_mask(
            ["Fixed color scale", "Color scale minimum", "Color scale maximum"],
            COLOR_SCALE,
            Check::optional_bound_of,
        ));
    }
    bindings.push(selection(
        EntityKind::MapPreset,
        "Shapefile overlays",
        SLOT_SHAPEFILE,
    ));
    bindings
}

#[cfg(test)]
mod tests {
    use super::{EditorForm, PlotMode};
    use crate::model::entity::{Entity, EntityKind};
    use crate::model::path::FieldPath;
    use crate::model::schema::{schema, PLOT_TYPE};
    use crate::validate::Check;

    #[test]
    fn default_form_follows_stored_plot_type() {
        let mut preset = Entity::new(EntityKind::MapPreset, "1", "cmp");
        assert_eq!(
            EditorForm::default_for(&preset),
            EditorForm::MapPreset(PlotMode::Map)
        );
        preset.set_field(PLOT_TYPE, "ModelResult");
        assert_eq!(
            EditorForm::default_for(&preset),
            EditorForm::MapPreset(PlotMode::ModelResult)
        );
        preset.set_field(PLOT_TYPE, "Contour");
        assert_eq!(
            EditorForm::default_for(&preset),
            EditorForm::MapPreset(PlotMode::Map)
        );
    }

    #[test]
    fn comparison_mode_requires_instrument_and_model() {
        let required = |form: EditorForm| -> Vec<EntityKind> {
            form.bindings()
                .into_iter()
                .flat_map(|binding| binding.checks)
                .filter_map(|check| match check {
                    Check::RequiredSelection(kind) => Some(kind),
                    _ => None,
                })
                .collect()
        };
        assert_eq!(
            required(EditorForm::MapPreset(PlotMode::AdcpComparison)),
            vec![EntityKind::Instrument, EntityKind::Model]
        );
        assert_eq!(
            required(EditorForm::MapPreset(PlotMode::ModelResult)),
            vec![EntityKind::Model]
        );
        assert!(required(EditorForm::MapPreset(PlotMode::Map)).is_empty());
    }

    #[test]
    fn every_bound_path_is_a_recognized_option() {
        let forms = [
            EditorForm::Survey,
            EditorForm::Instrument,
            EditorForm::Model,
            EditorForm::ShapefileOverlay,
            EditorForm::MapPreset(PlotMode::Map),
            EditorForm::MapPreset(PlotMode::AdcpComparison),
            EditorForm::MapPreset(PlotMode::ModelResult),
        ];
        for form in forms {
            let declared = schema(form.kind());
            for binding in form.bindings() {
                assert!(
                    declared.default_value(&binding.path).is_some(),
                    "{form:?} binds unknown path {}",
                    binding.path
                );
                assert!(binding.path != FieldPath::Name || !binding.checks.is_empty());
            }
        }
    }
}
