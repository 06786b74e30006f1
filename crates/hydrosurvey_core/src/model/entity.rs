//! Entity domain model.
//!
//! # Responsibility
//! - Define the typed, identified record shared by every configuration dialog.
//! - Provide the typed path accessor used by editor sessions.
//!
//! # Invariants
//! - `(kind, id)` identifies an entity; `name` is display-only and may repeat.
//! - References hold target ids, never live pointers or display names.
//! - Scalar and bound text is stored verbatim.

use crate::model::mask::{MaskBounds, MaskRange};
use crate::model::path::{FieldPath, FieldValue, PathError};
use crate::model::schema::schema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// Entity identifier, unique within its kind.
pub type EntityId = String;

/// Category of configuration record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Field campaign grouping instrument deployments.
    Survey,
    /// Vessel-mounted ADCP or OBS profiler.
    Instrument,
    /// Sediment regression or hydrodynamic/transport model.
    Model,
    /// Shapefile drawn over map plots.
    ShapefileOverlay,
    /// Map rendering preset.
    MapPreset,
}

impl EntityKind {
    /// Every kind, in persisted section order.
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Survey,
        EntityKind::Instrument,
        EntityKind::Model,
        EntityKind::ShapefileOverlay,
        EntityKind::MapPreset,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Survey => "survey",
            Self::Instrument => "instrument",
            Self::Model => "model",
            Self::ShapefileOverlay => "shapefile",
            Self::MapPreset => "map_preset",
        }
    }

    /// Element name of the section holding all entities of this kind.
    pub fn list_element(self) -> &'static str {
        match self {
            Self::Survey => "Surveys",
            Self::Instrument => "Instruments",
            Self::Model => "Models",
            Self::ShapefileOverlay => "Shapefiles",
            Self::MapPreset => "MapPresets",
        }
    }

    /// Element name of one entity of this kind.
    pub fn item_element(self) -> &'static str {
        match self {
            Self::Survey => "Survey",
            Self::Instrument => "Instrument",
            Self::Model => "Model",
            Self::ShapefileOverlay => "Shapefile",
            Self::MapPreset => "MapPreset",
        }
    }

    pub fn from_list_element(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.list_element() == name)
    }

    /// Parses user input such as `instrument`, `Instrument` or `map-preset`.
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL.into_iter().find(|kind| {
            kind.as_str() == normalized
                || kind.item_element().to_ascii_lowercase() == normalized
                || kind.list_element().to_ascii_lowercase() == normalized
        })
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document-wide identity of one entity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub id: EntityId,
}

impl EntityKey {
    pub fn new(kind: EntityKind, id: impl Into<EntityId>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl Display for EntityKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Directional id-based link held under a named slot of the owning entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Slot name, persisted as the child element name.
    pub slot: String,
    /// Target identity; may dangle.
    pub target: EntityKey,
}

/// Typed, identified configuration record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub kind: EntityKind,
    pub id: EntityId,
    pub name: String,
    pub fields: BTreeMap<String, String>,
    pub masks: BTreeMap<String, MaskRange>,
    pub refs: Vec<Reference>,
}

impl Entity {
    /// Creates an entity with no fields, masks or references.
    ///
    /// Schema defaults are not applied; see `EntitySchema::apply_defaults`.
    pub fn new(kind: EntityKind, id: impl Into<EntityId>, name: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            name: name.into(),
            fields: BTreeMap::new(),
            masks: BTreeMap::new(),
            refs: Vec::new(),
        }
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.kind, self.id.clone())
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn mask(&self, name: &str) -> Option<&MaskRange> {
        self.masks.get(name)
    }

    pub fn set_mask(&mut self, name: impl Into<String>, mask: MaskRange) {
        self.masks.insert(name.into(), mask);
    }

    /// References held under one slot, in persisted order.
    pub fn references<'a>(&'a self, slot: &'a str) -> impl Iterator<Item = &'a Reference> + 'a {
        self.refs.iter().filter(move |reference| reference.slot == slot)
    }

    /// Target ids held under one slot.
    pub fn reference_ids(&self, slot: &str) -> Vec<EntityId> {
        self.references(slot)
            .map(|reference| reference.target.id.clone())
            .collect()
    }

    pub fn add_reference(&mut self, slot: impl Into<String>, target: EntityKey) {
        self.refs.push(Reference {
            slot: slot.into(),
            target,
        });
    }

    /// Replaces every reference in `slot` with links to `ids` of `kind`.
    ///
    /// References in other slots keep their relative order.
    pub fn set_references(&mut self, slot: &str, kind: EntityKind, ids: &[EntityId]) {
        self.refs.retain(|reference| reference.slot != slot);
        for id in ids {
            self.add_reference(slot, EntityKey::new(kind, id.clone()));
        }
    }

    /// Returns whether any slot of this entity links to `target`.
    pub fn refers_to(&self, target: &EntityKey) -> bool {
        self.refs.iter().any(|reference| &reference.target == target)
    }

    /// Reads the value at `path`, or `None` when the node is absent.
    pub fn read(&self, path: &FieldPath) -> Option<FieldValue> {
        match path {
            FieldPath::Name => Some(FieldValue::Text(self.name.clone())),
            FieldPath::Scalar(name) => self.field(name).map(|v| FieldValue::Text(v.to_string())),
            FieldPath::MaskEnabled(mask) => self.mask(mask).map(|m| FieldValue::Flag(m.enabled)),
            FieldPath::MaskMin(mask) => match &self.mask(mask)?.bounds {
                MaskBounds::Range { min, .. } => {
                    Some(FieldValue::Text(min.clone().unwrap_or_default()))
                }
                MaskBounds::Target(_) => None,
            },
            FieldPath::MaskMax(mask) => match &self.mask(mask)?.bounds {
                MaskBounds::Range { max, .. } => {
                    Some(FieldValue::Text(max.clone().unwrap_or_default()))
                }
                MaskBounds::Target(_) => None,
            },
            FieldPath::MaskTarget(mask) => self
                .mask(mask)?
                .target_text()
                .map(|target| FieldValue::Text(target.to_string())),
            FieldPath::Reference(slot) => {
                if self.reference_slot_kind(slot).is_some() {
                    Some(FieldValue::Selection(self.reference_ids(slot)))
                } else {
                    None
                }
            }
        }
    }

    /// Writes `value` at `path`.
    ///
    /// Fails without touching the entity when the node is structurally absent
    /// or the value shape does not fit. Writing never creates new nodes.
    pub fn write(&mut self, path: &FieldPath, value: &FieldValue) -> Result<(), PathError> {
        let mismatch = || PathError::TypeMismatch(path.clone());
        let missing = || PathError::Missing(path.clone());
        match path {
            FieldPath::Name => {
                self.name = value.as_text().ok_or_else(mismatch)?.to_string();
            }
            FieldPath::Scalar(name) => {
                let text = value.as_text().ok_or_else(mismatch)?;
                let slot = self.fields.get_mut(name).ok_or_else(missing)?;
                *slot = text.to_string();
            }
            FieldPath::MaskEnabled(mask) => {
                let flag = value.as_flag().ok_or_else(mismatch)?;
                self.masks.get_mut(mask).ok_or_else(missing)?.enabled = flag;
            }
            FieldPath::MaskMin(mask) | FieldPath::MaskMax(mask) => {
                let text = value.as_text().ok_or_else(mismatch)?;
                let range = self.masks.get_mut(mask).ok_or_else(missing)?;
                let MaskBounds::Range { min, max } = &mut range.bounds else {
                    return Err(missing());
                };
                let bound = if matches!(path, FieldPath::MaskMin(_)) {
                    min
                } else {
                    max
                };
                // An untouched absent bound stays absent.
                if !(text.is_empty() && bound.is_none()) {
                    *bound = Some(text.to_string());
                }
            }
            FieldPath::MaskTarget(mask) => {
                let text = value.as_text().ok_or_else(mismatch)?;
                let range = self.masks.get_mut(mask).ok_or_else(missing)?;
                let MaskBounds::Target(target) = &mut range.bounds else {
                    return Err(missing());
                };
                *target = text.to_string();
            }
            FieldPath::Reference(slot) => {
                let ids = value.as_selection().ok_or_else(mismatch)?;
                let kind = self.reference_slot_kind(slot).ok_or_else(missing)?;
                self.set_references(slot, kind, ids);
            }
        }
        Ok(())
    }

    /// Target kind of `slot`, from the schema or from existing references.
    fn reference_slot_kind(&self, slot: &str) -> Option<EntityKind> {
        schema(self.kind)
            .slot(slot)
            .map(|declared| declared.target)
            .or_else(|| self.references(slot).next().map(|r| r.target.kind))
    }
}
