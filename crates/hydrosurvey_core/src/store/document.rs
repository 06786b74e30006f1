//! In-memory project document.
//!
//! # Invariants
//! - No two entities share `(kind, id)`.
//! - Entities of one kind keep insertion order.
//! - Mutation is crate-private; callers go through `DocumentStore`.

use crate::model::entity::{Entity, EntityKey, EntityKind};
use crate::store::{StoreError, StoreResult};
use std::collections::BTreeMap;

/// All entities of one project plus its flat settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    entities: BTreeMap<EntityKind, Vec<Entity>>,
    settings: BTreeMap<String, String>,
}

impl Document {
    /// Creates an empty document ("new project").
    pub fn new() -> Self {
        Self::default()
    }

    /// Entities of `kind` in insertion order.
    pub fn entities(&self, kind: EntityKind) -> &[Entity] {
        self.entities.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every entity, grouped by kind in persisted section order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        EntityKind::ALL
            .into_iter()
            .flat_map(move |kind| self.entities(kind).iter())
    }

    pub fn get(&self, key: &EntityKey) -> Option<&Entity> {
        self.entities(key.kind).iter().find(|entity| entity.id == key.id)
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entities.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn setting(&self, name: &str) -> Option<&str> {
        self.settings.get(name).map(String::as_str)
    }

    pub fn settings(&self) -> impl Iterator<Item = (&str, &str)> {
        self.settings
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Every `(referrer, slot)` pair linking to `target`, excluding `target`
    /// itself.
    pub fn references_to(&self, target: &EntityKey) -> Vec<(EntityKey, String)> {
        self.iter()
            .filter(|entity| entity.key() != *target)
            .flat_map(|entity| {
                entity
                    .refs
                    .iter()
                    .filter(move |reference| &reference.target == target)
                    .map(move |reference| (entity.key(), reference.slot.clone()))
            })
            .collect()
    }

    pub(crate) fn get_mut(&mut self, key: &EntityKey) -> Option<&mut Entity> {
        self.entities
            .get_mut(&key.kind)?
            .iter_mut()
            .find(|entity| entity.id == key.id)
    }

    /// Appends `entity`, refusing a duplicate `(kind, id)`.
    pub(crate) fn insert(&mut self, entity: Entity) -> StoreResult<()> {
        let key = entity.key();
        if self.contains(&key) {
            return Err(StoreError::DuplicateEntity(key));
        }
        self.entities.entry(key.kind).or_default().push(entity);
        Ok(())
    }

    /// Appends an entity whose identity the caller knows to be unused.
    pub(crate) fn push_fresh(&mut self, entity: Entity) -> &Entity {
        debug_assert!(!self.contains(&entity.key()));
        let list = self.entities.entry(entity.kind).or_default();
        list.push(entity);
        &list[list.len() - 1]
    }

    pub(crate) fn remove(&mut self, key: &EntityKey) -> Option<Entity> {
        let list = self.entities.get_mut(&key.kind)?;
        let index = list.iter().position(|entity| entity.id == key.id)?;
        let removed = list.remove(index);
        if list.is_empty() {
            self.entities.remove(&key.kind);
        }
        Some(removed)
    }

    pub(crate) fn set_setting(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.settings.insert(name.into(), value.into());
    }
}
