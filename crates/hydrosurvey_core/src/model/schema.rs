//! Recognized options and defaults per entity kind.
//!
//! # Responsibility
//! - Enumerate, per kind, the scalar fields, masks and reference slots the
//!   application understands, with the value used when a node is absent.
//! - Keep defaulting in one table instead of at every read site.
//!
//! # Invariants
//! - The default for a field never depends on sibling values.
//! - Applying defaults never overwrites a present node.

use crate::model::entity::{Entity, EntityKind};
use crate::model::mask::{MaskBounds, MaskRange, MEAN_KEYWORD};
use crate::model::path::{FieldPath, FieldValue};

pub const INSTRUMENT_TYPE: &str = "InstrumentType";
pub const DATA_FILE: &str = "DataFile";
pub const POSITION_FILE: &str = "PositionFile";
pub const POSITION_COLUMN_X: &str = "PositionColumnX";
pub const POSITION_COLUMN_Y: &str = "PositionColumnY";
pub const BEAM_ANGLE: &str = "BeamAngle";
pub const FREQUENCY: &str = "Frequency";
pub const TRANSDUCER_DEPTH: &str = "TransducerDepth";
pub const MAGNETIC_DECLINATION: &str = "MagneticDeclination";
pub const UTC_OFFSET: &str = "UtcOffset";
pub const MASK_ECHO_INTENSITY: &str = "MaskEchoIntensity";
pub const MASK_CORRELATION: &str = "MaskCorrelation";
pub const MASK_PERCENT_GOOD: &str = "MaskPercentGood";
pub const MASK_ERROR_VELOCITY: &str = "MaskErrorVelocity";
pub const MASK_BINS: &str = "MaskBins";

pub const MODEL_TYPE: &str = "ModelType";
pub const MESH_FILE: &str = "MeshFile";
pub const RESULT_FILE: &str = "ResultFile";
pub const SLOPE: &str = "Slope";
pub const INTERCEPT: &str = "Intercept";

pub const SURVEY_DATE: &str = "Date";
pub const SURVEY_VESSEL: &str = "Vessel";
pub const SURVEY_DESCRIPTION: &str = "Description";

pub const PLOT_TYPE: &str = "PlotType";
pub const TITLE: &str = "Title";
pub const COLORMAP: &str = "Colormap";
pub const GRID_LINE_COUNT: &str = "GridLineCount";
pub const TICK_FONT_SIZE: &str = "TickFontSize";
pub const PADDING: &str = "Padding";
pub const SCALE_BAR: &str = "ScaleBar";
pub const VERTICAL_AGGREGATION: &str = "VerticalAggregation";
pub const COLOR_SCALE: &str = "ColorScale";

pub const SHAPEFILE_PATH: &str = "ShapefilePath";
pub const LINE_COLOR: &str = "LineColor";
pub const LINE_WIDTH: &str = "LineWidth";
pub const FILL_COLOR: &str = "FillColor";
pub const OPACITY: &str = "Opacity";

pub const SLOT_SURVEY: &str = "Survey";
pub const SLOT_INSTRUMENT: &str = "Instrument";
pub const SLOT_MODEL: &str = "Model";
pub const SLOT_SHAPEFILE: &str = "Shapefile";

/// Scalar field with its value when absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDefault {
    pub name: &'static str,
    pub default: &'static str,
}

/// Bound layout default. Empty strings mean "no bound".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultBounds {
    Range(&'static str, &'static str),
    Target(&'static str),
}

/// Mask with its state when absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskDefault {
    pub name: &'static str,
    pub enabled: bool,
    pub bounds: DefaultBounds,
}

impl MaskDefault {
    pub fn to_mask(&self) -> MaskRange {
        let bounds = match self.bounds {
            DefaultBounds::Range(min, max) => MaskBounds::Range {
                min: non_empty(min),
                max: non_empty(max),
            },
            DefaultBounds::Target(target) => MaskBounds::Target(target.to_string()),
        };
        MaskRange {
            enabled: self.enabled,
            bounds,
        }
    }
}

/// How many targets one reference slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// Named reference slot and the kind it points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceSlot {
    pub name: &'static str,
    pub target: EntityKind,
    pub cardinality: Cardinality,
}

/// Recognized options of one entity kind.
#[derive(Debug)]
pub struct EntitySchema {
    pub kind: EntityKind,
    pub fields: &'static [FieldDefault],
    pub masks: &'static [MaskDefault],
    pub slots: &'static [ReferenceSlot],
}

impl EntitySchema {
    pub fn field(&self, name: &str) -> Option<&FieldDefault> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn mask(&self, name: &str) -> Option<&MaskDefault> {
        self.masks.iter().find(|mask| mask.name == name)
    }

    pub fn slot(&self, name: &str) -> Option<&ReferenceSlot> {
        self.slots.iter().find(|slot| slot.name == name)
    }

    /// Synthesizes every absent recognized field and mask.
    ///
    /// Returns the number of nodes that were added.
    pub fn apply_defaults(&self, entity: &mut Entity) -> usize {
        let mut applied = 0;
        for field in self.fields {
            if !entity.fields.contains_key(field.name) {
                entity.set_field(field.name, field.default);
                applied += 1;
            }
        }
        for mask in self.masks {
            if !entity.masks.contains_key(mask.name) {
                entity.set_mask(mask.name, mask.to_mask());
                applied += 1;
            }
        }
        applied
    }

    /// Default value for `path`, used when populating an absent node.
    pub fn default_value(&self, path: &FieldPath) -> Option<FieldValue> {
        match path {
            FieldPath::Name => Some(FieldValue::Text(String::new())),
            FieldPath::Scalar(name) => self
                .field(name)
                .map(|field| FieldValue::Text(field.default.to_string())),
            FieldPath::MaskEnabled(name) => {
                self.mask(name).map(|mask| FieldValue::Flag(mask.enabled))
            }
            FieldPath::MaskMin(name) => match self.mask(name)?.bounds {
                DefaultBounds::Range(min, _) => Some(FieldValue::Text(min.to_string())),
                DefaultBounds::Target(_) => None,
            },
            FieldPath::MaskMax(name) => match self.mask(name)?.bounds {
                DefaultBounds::Range(_, max) => Some(FieldValue::Text(max.to_string())),
                DefaultBounds::Target(_) => None,
            },
            FieldPath::MaskTarget(name) => match self.mask(name)?.bounds {
                DefaultBounds::Target(target) => Some(FieldValue::Text(target.to_string())),
                DefaultBounds::Range(..) => None,
            },
            FieldPath::Reference(slot) => self
                .slot(slot)
                .map(|_| FieldValue::Selection(Vec::new())),
        }
    }
}

const fn field(name: &'static str, default: &'static str) -> FieldDefault {
    FieldDefault { name, default }
}

const fn range(name: &'static str, min: &'static str, max: &'static str) -> MaskDefault {
    MaskDefault {
        name,
        enabled: false,
        bounds: DefaultBounds::Range(min, max),
    }
}

const fn slot(name: &'static str, target: EntityKind, cardinality: Cardinality) -> ReferenceSlot {
    ReferenceSlot {
        name,
        target,
        cardinality,
    }
}

static SURVEY: EntitySchema = EntitySchema {
    kind: EntityKind::Survey,
    fields: &[
        field(SURVEY_DATE, ""),
        field(SURVEY_VESSEL, ""),
        field(SURVEY_DESCRIPTION, ""),
    ],
    masks: &[],
    slots: &[],
};

static INSTRUMENT: EntitySchema = EntitySchema {
    kind: EntityKind::Instrument,
    fields: &[
        field(INSTRUMENT_TYPE, "VesselMountedADCP"),
        field(DATA_FILE, ""),
        field(POSITION_FILE, ""),
        field(POSITION_COLUMN_X, ""),
        field(POSITION_COLUMN_Y, ""),
        field(BEAM_ANGLE, "20"),
        field(FREQUENCY, "600"),
        field(TRANSDUCER_DEPTH, "0"),
        field(MAGNETIC_DECLINATION, "0"),
        field(UTC_OFFSET, "0"),
    ],
    masks: &[
        range(MASK_ECHO_INTENSITY, "0", "255"),
        range(MASK_CORRELATION, "0", "255"),
        range(MASK_PERCENT_GOOD, "0", "100"),
        range(MASK_ERROR_VELOCITY, "-1", "1"),
        range(MASK_BINS, "1", "100"),
    ],
    slots: &[slot(SLOT_SURVEY, EntityKind::Survey, Cardinality::Many)],
};

static MODEL: EntitySchema = EntitySchema {
    kind: EntityKind::Model,
    fields: &[
        field(MODEL_TYPE, "SSCRegression"),
        field(MESH_FILE, ""),
        field(RESULT_FILE, ""),
        field(SLOPE, "1"),
        field(INTERCEPT, "0"),
    ],
    masks: &[],
    slots: &[slot(SLOT_INSTRUMENT, EntityKind::Instrument, Cardinality::Many)],
};

static SHAPEFILE_OVERLAY: EntitySchema = EntitySchema {
    kind: EntityKind::ShapefileOverlay,
    fields: &[
        field(SHAPEFILE_PATH, ""),
        field(LINE_COLOR, "#000000"),
        field(LINE_WIDTH, "1"),
        field(FILL_COLOR, ""),
        field(OPACITY, "1"),
    ],
    masks: &[],
    slots: &[],
};

static MAP_PRESET: EntitySchema = EntitySchema {
    kind: EntityKind::MapPreset,
    fields: &[
        field(PLOT_TYPE, "Map"),
        field(TITLE, ""),
        field(COLORMAP, "jet"),
        field(GRID_LINE_COUNT, "10"),
        field(TICK_FONT_SIZE, "10"),
        field(PADDING, "0.1"),
        field(SCALE_BAR, "true"),
    ],
    masks: &[
        MaskDefault {
            name: VERTICAL_AGGREGATION,
            enabled: false,
            bounds: DefaultBounds::Target(MEAN_KEYWORD),
        },
        range(COLOR_SCALE, "", ""),
    ],
    slots: &[
        slot(SLOT_INSTRUMENT, EntityKind::Instrument, Cardinality::One),
        slot(SLOT_MODEL, EntityKind::Model, Cardinality::One),
        slot(SLOT_SHAPEFILE, EntityKind::ShapefileOverlay, Cardinality::Many),
    ],
};

/// Returns the recognized options of `kind`.
pub fn schema(kind: EntityKind) -> &'static EntitySchema {
    match kind {
        EntityKind::Survey => &SURVEY,
        EntityKind::Instrument => &INSTRUMENT,
        EntityKind::Model => &MODEL,
        EntityKind::ShapefileOverlay => &SHAPEFILE_OVERLAY,
        EntityKind::MapPreset => &MAP_PRESET,
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
