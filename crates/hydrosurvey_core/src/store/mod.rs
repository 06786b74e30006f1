//! Project document store.
//!
//! # Responsibility
//! - Own the in-memory entity graph of the open project.
//! - Provide typed lookup, creation, deletion and enumeration.
//! - Load from and atomically save to the persisted XML document.
//!
//! # Invariants
//! - `save` always writes the entire document.
//! - A failed `load` or `save` leaves the in-memory document unchanged.
//! - Ids are never reissued within one store's lifetime.
//! - An entity still referenced by another entity cannot be deleted.

pub mod codec;
pub mod document;

use crate::model::entity::{Entity, EntityId, EntityKey, EntityKind};
use crate::model::schema::schema;
use crate::resolve::SelectionList;
use document::Document;
use log::{error, info, warn};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use uuid::Uuid;

/// Setting naming the directory relative data paths resolve against.
pub const SETTING_BASE_DIRECTORY: &str = "BaseDirectory";
/// Setting holding the user-facing project name.
pub const SETTING_PROJECT_NAME: &str = "ProjectName";

pub type StoreResult<T> = Result<T, StoreError>;

/// Document store errors.
#[derive(Debug)]
pub enum StoreError {
    /// Requested `(kind, id)` has no entity.
    NotFound(EntityKey),
    /// Persisted document is unreadable or structurally invalid.
    MalformedDocument(String),
    /// File-system operation failed.
    Io {
        operation: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    /// Document could not be rendered.
    Encode(String),
    /// An entity with the same `(kind, id)` already exists.
    DuplicateEntity(EntityKey),
    /// Entity is still the target of other entities' references.
    StillReferenced {
        target: EntityKey,
        referrers: Vec<EntityKey>,
    },
    /// Field name cannot be stored as a scalar child element.
    InvalidFieldName { kind: EntityKind, name: String },
    /// In-place save requested before the project was ever saved.
    NoProjectPath,
    /// `SaveMode::CreateNew` target already exists.
    TargetExists(PathBuf),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(key) => write!(f, "entity not found: {key}"),
            Self::MalformedDocument(message) => {
                write!(f, "project document is malformed: {message}")
            }
            Self::Io {
                operation,
                path,
                source,
            } => write!(f, "failed to {operation} `{}`: {source}", path.display()),
            Self::Encode(message) => write!(f, "failed to render project document: {message}"),
            Self::DuplicateEntity(key) => write!(f, "entity already exists: {key}"),
            Self::StillReferenced { target, referrers } => {
                let names = referrers
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{target} is still referenced by {names}")
            }
            Self::InvalidFieldName { kind, name } => {
                write!(f, "`{name}` cannot be used as a {kind} field name")
            }
            Self::NoProjectPath => write!(f, "project has not been saved to a file yet"),
            Self::TargetExists(path) => {
                write!(f, "refusing to overwrite existing `{}`", path.display())
            }
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// How `save` treats an existing target file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// Replace the target if it exists.
    Overwrite,
    /// Fail with `TargetExists` if the target exists.
    CreateNew,
}

/// Owner of the open project's document.
#[derive(Debug)]
pub struct DocumentStore {
    document: Document,
    project_path: Option<PathBuf>,
    generation: u64,
    /// Next decimal id per kind; `None` once the decimal range is used up.
    next_ids: BTreeMap<EntityKind, Option<u64>>,
    modified: bool,
}

impl DocumentStore {
    /// Creates a store holding an empty, never-saved project.
    pub fn new_project() -> Self {
        Self {
            document: Document::new(),
            project_path: None,
            generation: 0,
            next_ids: BTreeMap::new(),
            modified: false,
        }
    }

    /// Creates a store and loads `path` into it.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let mut store = Self::new_project();
        store.load(path)?;
        Ok(store)
    }

    /// Replaces the whole document with the one persisted at `path`.
    ///
    /// Bumps `generation`, invalidating editor sessions populated from the
    /// previous document. On error nothing changes.
    pub fn load(&mut self, path: impl AsRef<Path>) -> StoreResult<&Document> {
        let path = path.as_ref();
        let started_at = Instant::now();
        info!("event=document_load module=store status=start");

        let document = match read_document(path) {
            Ok(document) => document,
            Err(err) => {
                error!(
                    "event=document_load module=store status=error duration_ms={} path={} error={}",
                    started_at.elapsed().as_millis(),
                    path.display(),
                    err
                );
                return Err(err);
            }
        };

        self.next_ids = seed_next_ids(&document);
        self.document = document;
        self.project_path = Some(path.to_path_buf());
        self.generation += 1;
        self.modified = false;
        info!(
            "event=document_load module=store status=ok duration_ms={} path={} entities={} generation={}",
            started_at.elapsed().as_millis(),
            path.display(),
            self.document.len(),
            self.generation
        );
        Ok(&self.document)
    }

    /// Writes the entire document to `path`.
    ///
    /// Content goes to a temporary file in the target directory which is
    /// synced and renamed over the target, so readers never observe a partial
    /// write. On success `path` becomes the project path.
    pub fn save(&mut self, path: impl AsRef<Path>, mode: SaveMode) -> StoreResult<()> {
        let path = path.as_ref();
        let started_at = Instant::now();
        info!("event=document_save module=store status=start mode={mode:?}");

        let result = codec::render_document(&self.document)
            .and_then(|xml| write_atomically(path, xml.as_bytes(), mode));
        match result {
            Ok(()) => {
                self.project_path = Some(path.to_path_buf());
                self.modified = false;
                info!(
                    "event=document_save module=store status=ok duration_ms={} path={} entities={}",
                    started_at.elapsed().as_millis(),
                    path.display(),
                    self.document.len()
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=document_save module=store status=error duration_ms={} path={} error={}",
                    started_at.elapsed().as_millis(),
                    path.display(),
                    err
                );
                Err(err)
            }
        }
    }

    /// Saves to the current project path.
    pub fn save_in_place(&mut self) -> StoreResult<()> {
        let path = self.project_path.clone().ok_or(StoreError::NoProjectPath)?;
        self.save(path, SaveMode::Overwrite)
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn project_path(&self) -> Option<&Path> {
        self.project_path.as_deref()
    }

    /// Counter bumped by every successful `load`.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns whether the document changed since the last load or save.
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn get_entity(&self, kind: EntityKind, id: &str) -> StoreResult<&Entity> {
        let key = EntityKey::new(kind, id);
        self.document.get(&key).ok_or(StoreError::NotFound(key))
    }

    /// Lookup that treats absence as "unset" rather than an error.
    pub fn find_entity(&self, key: &EntityKey) -> Option<&Entity> {
        self.document.get(key)
    }

    /// Entities of `kind` in stable insertion order.
    pub fn get_entities(&self, kind: EntityKind) -> &[Entity] {
        self.document.entities(kind)
    }

    /// `(display name, id)` pairs for a selection control.
    pub fn selection_list(&self, kind: EntityKind) -> SelectionList {
        SelectionList::build(&self.document, kind)
    }

    /// Appends a new entity with a fresh id.
    ///
    /// Recognized options absent from `initial_fields` take their schema
    /// defaults. Field names must be valid element names and must not clash
    /// with `Name`, a mask or a reference slot of `kind`; nothing is created
    /// otherwise.
    pub fn create_entity<I, K, V>(
        &mut self,
        kind: EntityKind,
        name: impl Into<String>,
        initial_fields: I,
    ) -> StoreResult<&Entity>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let declared = schema(kind);
        let mut fields = Vec::new();
        for (field, value) in initial_fields {
            let field = field.into();
            if !codec::is_element_name(&field)
                || field == codec::NAME_ELEMENT
                || declared.mask(&field).is_some()
                || declared.slot(&field).is_some()
            {
                return Err(StoreError::InvalidFieldName { kind, name: field });
            }
            fields.push((field, value.into()));
        }

        let id = self.allocate_id(kind);
        let mut entity = Entity::new(kind, id, name);
        for (field, value) in fields {
            entity.set_field(field, value);
        }
        declared.apply_defaults(&mut entity);

        self.modified = true;
        info!("event=entity_create module=store status=ok entity={}", entity.key());
        // `allocate_id` skips every id present in the document.
        Ok(self.document.push_fresh(entity))
    }

    pub fn rename_entity(&mut self, key: &EntityKey, name: impl Into<String>) -> StoreResult<()> {
        let entity = self
            .document
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        entity.name = name.into();
        self.modified = true;
        Ok(())
    }

    /// Removes an entity no other entity references.
    ///
    /// Deletion is blocked, not cascaded: callers must first clear the
    /// references listed in `StillReferenced`.
    pub fn delete_entity(&mut self, key: &EntityKey) -> StoreResult<Entity> {
        if !self.document.contains(key) {
            return Err(StoreError::NotFound(key.clone()));
        }
        let mut referrers: Vec<EntityKey> = self
            .document
            .references_to(key)
            .into_iter()
            .map(|(referrer, _)| referrer)
            .collect();
        if !referrers.is_empty() {
            referrers.dedup();
            info!(
                "event=entity_delete module=store status=blocked entity={key} referrers={}",
                referrers.len()
            );
            return Err(StoreError::StillReferenced {
                target: key.clone(),
                referrers,
            });
        }

        let removed = self
            .document
            .remove(key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        self.modified = true;
        info!("event=entity_delete module=store status=ok entity={key}");
        Ok(removed)
    }

    /// Every `(referrer, slot)` pair linking to `key`.
    pub fn references_to(&self, key: &EntityKey) -> Vec<(EntityKey, String)> {
        self.document.references_to(key)
    }

    pub fn get_setting(&self, name: &str) -> Option<&str> {
        self.document.setting(name)
    }

    pub fn set_setting(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.document.set_setting(name, value);
        self.modified = true;
    }

    /// Directory relative data paths resolve against.
    ///
    /// `BaseDirectory` when set, else the project file's directory, else the
    /// process working directory.
    pub fn base_directory(&self) -> PathBuf {
        if let Some(base) = self
            .get_setting(SETTING_BASE_DIRECTORY)
            .map(str::trim)
            .filter(|base| !base.is_empty())
        {
            return PathBuf::from(base);
        }
        self.project_path
            .as_deref()
            .and_then(Path::parent)
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Swaps in a committed entity and saves in place.
    ///
    /// On save failure the previous entity is restored, so the document is
    /// unchanged.
    pub(crate) fn commit_entity(&mut self, entity: Entity) -> StoreResult<()> {
        let path = self.project_path.clone().ok_or(StoreError::NoProjectPath)?;
        let key = entity.key();
        let slot = self
            .document
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        let previous = std::mem::replace(slot, entity);
        let was_modified = self.modified;
        self.modified = true;

        if let Err(err) = self.save(path, SaveMode::Overwrite) {
            if let Some(slot) = self.document.get_mut(&key) {
                *slot = previous;
            }
            self.modified = was_modified;
            return Err(err);
        }
        Ok(())
    }

    fn allocate_id(&mut self, kind: EntityKind) -> EntityId {
        let next = self.next_ids.entry(kind).or_insert(Some(1));
        while let Some(value) = *next {
            *next = value.checked_add(1);
            let candidate = value.to_string();
            if !self.document.contains(&EntityKey::new(kind, candidate.clone())) {
                return candidate;
            }
        }
        let fallback = Uuid::new_v4().simple().to_string();
        warn!(
            "event=entity_id_allocate module=store status=fallback kind={} id={}",
            kind, fallback
        );
        fallback
    }
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new_project()
    }
}

fn read_document(path: &Path) -> StoreResult<Document> {
    let bytes = std::fs::read(path).map_err(|source| StoreError::Io {
        operation: "read",
        path: path.to_path_buf(),
        source,
    })?;
    let xml = String::from_utf8(bytes)
        .map_err(|err| StoreError::MalformedDocument(format!("not valid UTF-8: {err}")))?;
    codec::parse_document(&xml)
}

fn seed_next_ids(document: &Document) -> BTreeMap<EntityKind, Option<u64>> {
    EntityKind::ALL
        .into_iter()
        .map(|kind| {
            let highest = document
                .entities(kind)
                .iter()
                .filter_map(|entity| entity.id.parse::<u64>().ok())
                .max()
                .unwrap_or(0);
            (kind, highest.checked_add(1))
        })
        .collect()
}

fn write_atomically(path: &Path, bytes: &[u8], mode: SaveMode) -> StoreResult<()> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(io_error("create directory", parent))?;

    if mode == SaveMode::CreateNew && path.exists() {
        return Err(StoreError::TargetExists(path.to_path_buf()));
    }

    let mut temp = tempfile::NamedTempFile::new_in(parent)
        .map_err(io_error("create temporary file in", parent))?;
    temp.write_all(bytes)
        .map_err(io_error("write temporary file for", path))?;
    temp.as_file()
        .sync_all()
        .map_err(io_error("sync temporary file for", path))?;

    let persisted = match mode {
        SaveMode::Overwrite => temp.persist(path),
        SaveMode::CreateNew => temp.persist_noclobber(path),
    };
    persisted.map_err(|err| StoreError::Io {
        operation: "rename temporary file onto",
        path: path.to_path_buf(),
        source: err.error,
    })?;
    Ok(())
}

fn io_error(operation: &'static str, path: &Path) -> impl FnOnce(std::io::Error) -> StoreError {
    let path = path.to_path_buf();
    move |source| StoreError::Io {
        operation,
        path,
        source,
    }
}
