//! Lazy, id-based reference resolution and selection lists.
//!
//! # Responsibility
//! - Resolve `(kind, id)` links against the current document on demand.
//! - Build `(display name, id)` lists for selection controls.
//!
//! # Invariants
//! - A dangling reference resolves to `Unset`; it is never an error here.
//! - Selection controls pick by display name but entities store ids.

use crate::model::entity::{Entity, EntityId, EntityKey, EntityKind};
use crate::store::document::Document;

/// Outcome of resolving one reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<'a> {
    Resolved(&'a Entity),
    /// Target is absent from the document.
    Unset,
}

impl<'a> Resolution<'a> {
    pub fn entity(self) -> Option<&'a Entity> {
        match self {
            Self::Resolved(entity) => Some(entity),
            Self::Unset => None,
        }
    }

    pub fn is_resolved(self) -> bool {
        matches!(self, Self::Resolved(_))
    }
}

/// Looks up `target` in the current document.
pub fn resolve<'a>(document: &'a Document, target: &EntityKey) -> Resolution<'a> {
    match document.get(target) {
        Some(entity) => Resolution::Resolved(entity),
        None => Resolution::Unset,
    }
}

/// Resolves every reference `entity` holds under `slot`, in order.
pub fn resolve_slot<'a>(
    document: &'a Document,
    entity: &Entity,
    slot: &str,
) -> Vec<Resolution<'a>> {
    entity
        .references(slot)
        .map(|reference| resolve(document, &reference.target))
        .collect()
}

/// First resolvable target under `slot`, for single-selection slots.
pub fn first_resolved<'a>(
    document: &'a Document,
    entity: &Entity,
    slot: &str,
) -> Option<&'a Entity> {
    resolve_slot(document, entity, slot)
        .into_iter()
        .find_map(Resolution::entity)
}

/// One choice offered by a selection control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionItem {
    pub display_name: String,
    pub id: EntityId,
}

/// Choices for a selection control over one entity kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionList {
    kind: EntityKind,
    items: Vec<SelectionItem>,
}

impl SelectionList {
    /// Enumerates all entities of `kind` in document order.
    pub fn build(document: &Document, kind: EntityKind) -> Self {
        let items = document
            .entities(kind)
            .iter()
            .map(|entity| SelectionItem {
                display_name: entity.name.clone(),
                id: entity.id.clone(),
            })
            .collect();
        Self { kind, items }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn items(&self) -> &[SelectionItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn display_names(&self) -> Vec<&str> {
        self.items
            .iter()
            .map(|item| item.display_name.as_str())
            .collect()
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.id == id)
    }

    /// Index a combo box should show for the stored `selected` id.
    ///
    /// Unset or dangling ids fall back to the first item when there is one.
    pub fn display_index(&self, selected: Option<&str>) -> Option<usize> {
        selected
            .and_then(|id| self.index_of(id))
            .or_else(|| (!self.items.is_empty()).then_some(0))
    }

    /// Id behind a chosen display name; the first match wins on duplicates.
    pub fn id_for_display_name(&self, display_name: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|item| item.display_name == display_name)
            .map(|item| item.id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::{first_resolved, resolve, Resolution, SelectionList};
    use crate::model::entity::{Entity, EntityKey, EntityKind};
    use crate::store::document::Document;

    fn document() -> Document {
        let mut document = Document::new();
        document
            .insert(Entity::new(EntityKind::Instrument, "1", "Bow ADCP"))
            .unwrap();
        document
            .insert(Entity::new(EntityKind::Instrument, "5", "OBS cast"))
            .unwrap();
        document
    }

    #[test]
    fn dangling_reference_resolves_to_unset() {
        let document = document();
        let missing = EntityKey::new(EntityKind::Instrument, "9");
        assert_eq!(resolve(&document, &missing), Resolution::Unset);
        assert!(resolve(&document, &EntityKey::new(EntityKind::Instrument, "5")).is_resolved());
    }

    #[test]
    fn first_resolved_skips_dangling_targets() {
        let document = document();
        let mut preset = Entity::new(EntityKind::MapPreset, "1", "cmp");
        preset.add_reference("Instrument", EntityKey::new(EntityKind::Instrument, "9"));
        preset.add_reference("Instrument", EntityKey::new(EntityKind::Instrument, "5"));
        let found = first_resolved(&document, &preset, "Instrument").unwrap();
        assert_eq!(found.name, "OBS cast");
    }

    #[test]
    fn selection_list_maps_names_to_ids_and_falls_back_to_first() {
        let list = SelectionList::build(&document(), EntityKind::Instrument);
        assert_eq!(list.display_names(), vec!["Bow ADCP", "OBS cast"]);
        assert_eq!(list.id_for_display_name("OBS cast"), Some("5"));
        assert_eq!(list.display_index(Some("5")), Some(1));
        assert_eq!(list.display_index(Some("42")), Some(0));
        assert_eq!(list.display_index(None), Some(0));

        let empty = SelectionList::build(&Document::new(), EntityKind::Model);
        assert_eq!(empty.display_index(Some("1")), None);
    }
}
