//! Editor session lifecycle.
//!
//! # Responsibility
//! - Bind one dialog's fields to one entity and track dirty state.
//! - Gate commits behind validation and write back all-or-nothing.
//! - Drive the close prompt (save, discard or cancel).
//!
//! # Invariants
//! - A session starts `Clean`; any field change makes it `Dirty`.
//! - Field change handlers post `MarkDirty`; only the session writes its state.
//! - A failed save (validation or I/O) leaves the document untouched and the
//!   session dirty.
//! - Sessions hold no borrow of the document. Every store-facing call checks
//!   the store generation so a session never outlives a `load`.

pub mod binding;
pub mod forms;

use crate::model::entity::{Entity, EntityKey, EntityKind};
use crate::model::path::{FieldPath, FieldValue, PathError};
use crate::model::schema::{schema, PLOT_TYPE};
use crate::store::{DocumentStore, StoreError};
use crate::validate::{validate, ValidationContext, ValidationFailure};
use binding::FieldBinding;
use forms::EditorForm;
use log::{debug, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Instant;
use uuid::Uuid;

pub type SessionResult<T> = Result<T, SessionError>;

/// Lifecycle state of one editor session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Values match the entity as last populated or committed.
    Clean,
    /// At least one field changed since then.
    Dirty,
    /// Save in progress: running the validator.
    Validating,
    /// Save succeeded; about to return to `Clean`.
    Committed,
    /// Validation failed; about to return to `Dirty`.
    Rejected,
    /// Dirty session awaiting the close prompt answer.
    Closing,
    /// Session is finished and accepts no further calls.
    Closed,
}

/// Message posted by field change handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionMessage {
    MarkDirty(FieldPath),
}

/// Cloneable handle field change handlers use to post messages.
#[derive(Debug, Clone)]
pub struct DirtyNotifier {
    sender: Sender<SessionMessage>,
}

impl DirtyNotifier {
    /// Posts `MarkDirty` for `path`; a closed session ignores it.
    pub fn mark_dirty(&self, path: FieldPath) {
        let _ = self.sender.send(SessionMessage::MarkDirty(path));
    }
}

/// Answer to the close prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptChoice {
    /// Save, then close if the save succeeds.
    Save,
    /// Drop in-memory edits and close.
    Discard,
    /// Abort the close.
    Cancel,
}

/// Result of asking a session to close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseRequest {
    /// Session was clean and is now closed.
    Closed,
    /// Session is dirty; answer with `resolve_close`.
    PromptRequired,
}

/// Result of answering the close prompt.
#[derive(Debug)]
pub enum CloseOutcome {
    Closed,
    Cancelled,
    /// Save was chosen but failed; the session stays open and dirty.
    KeptOpen(SessionError),
}

/// Write-back failure. The entity is left untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitError {
    /// A bound node is structurally absent from the entity.
    MissingNode { key: EntityKey, path: FieldPath },
    /// A bound value does not fit its node.
    TypeMismatch { key: EntityKey, path: FieldPath },
}

impl CommitError {
    fn from_path(key: &EntityKey, err: PathError) -> Self {
        match err {
            PathError::Missing(path) => Self::MissingNode {
                key: key.clone(),
                path,
            },
            PathError::TypeMismatch(path) => Self::TypeMismatch {
                key: key.clone(),
                path,
            },
        }
    }
}

impl Display for CommitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingNode { key, path } => {
                write!(f, "{key} has no `{path}` node; nothing was written")
            }
            Self::TypeMismatch { key, path } => {
                write!(f, "value for `{path}` does not fit {key}; nothing was written")
            }
        }
    }
}

impl Error for CommitError {}

/// Editor session errors.
#[derive(Debug)]
pub enum SessionError {
    /// The store loaded another document since this session was populated.
    Stale { opened: u64, current: u64 },
    /// Session is already closed.
    Closed,
    /// Form edits another entity kind than the target.
    FormMismatch {
        form: EntityKind,
        entity: EntityKind,
    },
    /// Path is not bound by the current form.
    UnknownField(FieldPath),
    /// Value shape does not fit the bound path.
    ValueShape(FieldPath),
    /// No entity with this display name can be selected for `slot`.
    UnknownChoice { slot: String, name: String },
    Validation(ValidationFailure),
    Commit(CommitError),
    Store(StoreError),
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stale { opened, current } => write!(
                f,
                "project was reloaded (generation {opened} -> {current}); reopen the editor"
            ),
            Self::Closed => write!(f, "editor session is closed"),
            Self::FormMismatch { form, entity } => {
                write!(f, "{form} form cannot edit a {entity} entity")
            }
            Self::UnknownField(path) => write!(f, "field `{path}` is not bound by this form"),
            Self::ValueShape(path) => write!(f, "value does not fit field `{path}`"),
            Self::UnknownChoice { slot, name } => {
                write!(f, "`{name}` is not a valid choice for {slot}")
            }
            Self::Validation(err) => write!(f, "{err}"),
            Self::Commit(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Commit(err) => Some(err),
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationFailure> for SessionError {
    fn from(value: ValidationFailure) -> Self {
        Self::Validation(value)
    }
}

impl From<CommitError> for SessionError {
    fn from(value: CommitError) -> Self {
        Self::Commit(value)
    }
}

impl From<StoreError> for SessionError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Bound lifecycle of one dialog against one entity.
#[derive(Debug)]
pub struct EditorSession {
    id: Uuid,
    target: EntityKey,
    form: EditorForm,
    bindings: Vec<FieldBinding>,
    state: SessionState,
    generation: u64,
    mailbox: Receiver<SessionMessage>,
    notifier: Sender<SessionMessage>,
    last_failure: Option<String>,
}

impl EditorSession {
    /// Populates `form` from the entity at `target`.
    ///
    /// Absent nodes show their schema default.
    pub fn open(
        store: &DocumentStore,
        target: EntityKey,
        form: EditorForm,
    ) -> SessionResult<Self> {
        if form.kind() != target.kind {
            return Err(SessionError::FormMismatch {
                form: form.kind(),
                entity: target.kind,
            });
        }
        let entity = store.get_entity(target.kind, &target.id)?;
        let mut bindings = form.bindings();
        for binding in &mut bindings {
            binding.value = populate(entity, form, &binding.path);
        }

        let (notifier, mailbox) = mpsc::channel();
        let session = Self {
            id: Uuid::new_v4(),
            target,
            form,
            bindings,
            state: SessionState::Clean,
            generation: store.generation(),
            mailbox,
            notifier,
            last_failure: None,
        };
        info!(
            "event=session_open module=session status=ok session={} entity={} form={:?} fields={}",
            session.id,
            session.target,
            session.form,
            session.bindings.len()
        );
        Ok(session)
    }

    /// Opens the form `EditorForm::default_for` picks for the entity.
    pub fn open_default(store: &DocumentStore, target: EntityKey) -> SessionResult<Self> {
        let entity = store.get_entity(target.kind, &target.id)?;
        let form = EditorForm::default_for(entity);
        Self::open(store, target, form)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn target(&self) -> &EntityKey {
        &self.target
    }

    pub fn form(&self) -> EditorForm {
        self.form
    }

    /// Current state after applying pending messages.
    pub fn state(&mut self) -> SessionState {
        self.pump();
        self.state
    }

    pub fn is_dirty(&mut self) -> bool {
        matches!(self.state(), SessionState::Dirty | SessionState::Closing)
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    pub fn bindings(&self) -> &[FieldBinding] {
        &self.bindings
    }

    pub fn value(&self, path: &FieldPath) -> Option<&FieldValue> {
        self.binding(path).map(|binding| &binding.value)
    }

    /// Reason the last save attempt failed, if it did.
    pub fn last_failure(&self) -> Option<&str> {
        self.last_failure.as_deref()
    }

    /// Handle for change handlers outside the session.
    pub fn notifier(&self) -> DirtyNotifier {
        DirtyNotifier {
            sender: self.notifier.clone(),
        }
    }

    /// Updates one bound value and posts `MarkDirty`.
    pub fn set_value(&mut self, path: &FieldPath, value: FieldValue) -> SessionResult<()> {
        self.ensure_open()?;
        let binding = self
            .bindings
            .iter_mut()
            .find(|binding| &binding.path == path)
            .ok_or_else(|| SessionError::UnknownField(path.clone()))?;
        if !binding.value.same_shape(&value) {
            return Err(SessionError::ValueShape(path.clone()));
        }
        binding.value = value;
        self.notifier().mark_dirty(path.clone());
        self.pump();
        Ok(())
    }

    pub fn set_text(&mut self, path: &FieldPath, text: impl Into<String>) -> SessionResult<()> {
        self.set_value(path, FieldValue::Text(text.into()))
    }

    pub fn set_flag(&mut self, path: &FieldPath, flag: bool) -> SessionResult<()> {
        self.set_value(path, FieldValue::Flag(flag))
    }

    pub fn select(&mut self, slot: &str, ids: Vec<String>) -> SessionResult<()> {
        self.set_value(&FieldPath::reference(slot), FieldValue::Selection(ids))
    }

    /// Selects the entity shown as `display_name` in `slot`'s selection list.
    ///
    /// The stored value is the entity id, never the name.
    pub fn select_by_name(
        &mut self,
        store: &DocumentStore,
        slot: &str,
        display_name: &str,
    ) -> SessionResult<()> {
        self.ensure_current(store)?;
        let unknown = || SessionError::UnknownChoice {
            slot: slot.to_string(),
            name: display_name.to_string(),
        };
        let declared = schema(self.target.kind).slot(slot).ok_or_else(unknown)?;
        let id = store
            .selection_list(declared.target)
            .id_for_display_name(display_name)
            .map(str::to_string)
            .ok_or_else(unknown)?;
        self.select(slot, vec![id])
    }

    /// Applies pending `MarkDirty` messages.
    pub fn pump(&mut self) {
        while let Ok(message) = self.mailbox.try_recv() {
            match message {
                SessionMessage::MarkDirty(path) => {
                    if self.state == SessionState::Clean {
                        debug!(
                            "event=session_dirty module=session status=ok session={} field={}",
                            self.id, path
                        );
                        self.state = SessionState::Dirty;
                    }
                }
            }
        }
    }

    /// Rebinds the dialog for another mode of the same entity kind.
    ///
    /// Values of paths bound by both forms are kept; new paths are populated
    /// from the entity. Switching marks the session dirty.
    pub fn switch_form(&mut self, store: &DocumentStore, form: EditorForm) -> SessionResult<()> {
        self.ensure_current(store)?;
        if form.kind() != self.target.kind {
            return Err(SessionError::FormMismatch {
                form: form.kind(),
                entity: self.target.kind,
            });
        }
        let entity = store.get_entity(self.target.kind, &self.target.id)?;
        let mut bindings = form.bindings();
        for binding in &mut bindings {
            binding.value = match self.binding(&binding.path) {
                Some(previous) if binding.path != FieldPath::scalar(PLOT_TYPE) => {
                    previous.value.clone()
                }
                _ => populate(entity, form, &binding.path),
            };
        }
        debug!(
            "event=session_switch_form module=session status=ok session={} from={:?} to={:?}",
            self.id, self.form, form
        );
        self.bindings = bindings;
        self.form = form;
        self.notifier().mark_dirty(FieldPath::scalar(PLOT_TYPE));
        self.pump();
        Ok(())
    }

    /// Repopulates every binding from the entity and returns to `Clean`.
    pub fn revert(&mut self, store: &DocumentStore) -> SessionResult<()> {
        self.ensure_current(store)?;
        let entity = store.get_entity(self.target.kind, &self.target.id)?;
        let form = self.form;
        for binding in &mut self.bindings {
            binding.value = populate(entity, form, &binding.path);
        }
        self.drain();
        self.state = SessionState::Clean;
        self.last_failure = None;
        info!(
            "event=session_revert module=session status=ok session={}",
            self.id
        );
        Ok(())
    }

    /// Validates, writes every binding back and saves the whole document.
    ///
    /// Nothing is written unless validation passes and every bound node
    /// exists. On any failure the session keeps its prior dirty state and
    /// `last_failure` holds the reason.
    pub fn save(&mut self, store: &mut DocumentStore) -> SessionResult<()> {
        self.ensure_current(store)?;
        self.pump();
        let prior = match self.state {
            SessionState::Closing => SessionState::Dirty,
            other => other,
        };
        let started_at = Instant::now();
        info!(
            "event=session_save module=session status=start session={} entity={}",
            self.id, self.target
        );

        match self.try_commit(store) {
            Ok(()) => {
                self.state = SessionState::Committed;
                self.drain();
                self.state = SessionState::Clean;
                self.last_failure = None;
                info!(
                    "event=session_save module=session status=ok duration_ms={} session={} entity={}",
                    started_at.elapsed().as_millis(),
                    self.id,
                    self.target
                );
                Ok(())
            }
            Err(err) => {
                self.state = prior;
                self.last_failure = Some(err.to_string());
                warn!(
                    "event=session_save module=session status=error duration_ms={} session={} entity={} error={}",
                    started_at.elapsed().as_millis(),
                    self.id,
                    self.target,
                    err
                );
                Err(err)
            }
        }
    }

    /// Starts closing the session.
    pub fn request_close(&mut self) -> SessionResult<CloseRequest> {
        self.ensure_open()?;
        self.pump();
        match self.state {
            SessionState::Clean => {
                self.close();
                Ok(CloseRequest::Closed)
            }
            _ => {
                self.state = SessionState::Closing;
                Ok(CloseRequest::PromptRequired)
            }
        }
    }

    /// Applies the user's answer to the close prompt.
    pub fn resolve_close(
        &mut self,
        store: &mut DocumentStore,
        choice: PromptChoice,
    ) -> SessionResult<CloseOutcome> {
        self.ensure_open()?;
        if self.state != SessionState::Closing {
            self.pump();
            if self.state == SessionState::Clean {
                self.close();
                return Ok(CloseOutcome::Closed);
            }
        }
        match choice {
            PromptChoice::Save => match self.save(store) {
                Ok(()) => {
                    self.close();
                    Ok(CloseOutcome::Closed)
                }
                Err(err) => {
                    self.state = SessionState::Dirty;
                    Ok(CloseOutcome::KeptOpen(err))
                }
            },
            PromptChoice::Discard => {
                info!(
                    "event=session_discard module=session status=ok session={}",
                    self.id
                );
                self.close();
                Ok(CloseOutcome::Closed)
            }
            PromptChoice::Cancel => {
                self.state = SessionState::Dirty;
                Ok(CloseOutcome::Cancelled)
            }
        }
    }

    fn try_commit(&mut self, store: &mut DocumentStore) -> SessionResult<()> {
        self.state = SessionState::Validating;
        let base_dir = store.base_directory();
        let ctx = ValidationContext::new(store.document(), &base_dir);
        if let Err(failure) = validate(&self.bindings, &ctx) {
            self.state = SessionState::Rejected;
            return Err(failure.into());
        }

        let mut staged = store
            .get_entity(self.target.kind, &self.target.id)?
            .clone();
        for binding in &self.bindings {
            staged
                .write(&binding.path, &binding.value)
                .map_err(|err| CommitError::from_path(&self.target, err))?;
        }
        store.commit_entity(staged)?;
        Ok(())
    }

    fn binding(&self, path: &FieldPath) -> Option<&FieldBinding> {
        self.bindings.iter().find(|binding| &binding.path == path)
    }

    fn ensure_open(&self) -> SessionResult<()> {
        if self.state == SessionState::Closed {
            return Err(SessionError::Closed);
        }
        Ok(())
    }

    fn ensure_current(&self, store: &DocumentStore) -> SessionResult<()> {
        self.ensure_open()?;
        if store.generation() != self.generation {
            return Err(SessionError::Stale {
                opened: self.generation,
                current: store.generation(),
            });
        }
        Ok(())
    }

    fn drain(&mut self) {
        while self.mailbox.try_recv().is_ok() {}
    }

    fn close(&mut self) {
        self.drain();
        self.state = SessionState::Closed;
        info!(
            "event=session_close module=session status=ok session={}",
            self.id
        );
    }
}

/// Value a freshly bound control shows for `path`.
fn populate(entity: &Entity, form: EditorForm, path: &FieldPath) -> FieldValue {
    if let (Some(mode), FieldPath::Scalar(name)) = (form.plot_mode(), path) {
        if name == PLOT_TYPE {
            return FieldValue::Text(mode.as_str().to_string());
        }
    }
    entity
        .read(path)
        .or_else(|| schema(entity.kind).default_value(path))
        .unwrap_or_else(|| path.empty_value())
}
