//! Application-level project session.
//!
//! # Responsibility
//! - Own the single open project's store and its open editor sessions.
//! - Route close and exit requests through each dirty editor's prompt.
//!
//! # Invariants
//! - At most one editor is open per entity.
//! - A project is never replaced while editors are open.
//! - Exit prompts editors in the order they were opened and proceeds only
//!   when every editor closed; any cancel or failed save vetoes it.

use crate::model::entity::EntityKey;
use crate::session::forms::EditorForm;
use crate::session::{
    CloseOutcome, CloseRequest, EditorSession, PromptChoice, SessionError, SessionResult,
};
use crate::store::{DocumentStore, StoreError};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use uuid::Uuid;

pub type AppResult<T> = Result<T, AppError>;

/// Project session errors.
#[derive(Debug)]
pub enum AppError {
    /// Operation needs every editor closed first.
    EditorsOpen(usize),
    EditorNotFound(Uuid),
    /// Another editor already edits this entity.
    EditorAlreadyOpen { key: EntityKey, editor: Uuid },
    Session(SessionError),
    Store(StoreError),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EditorsOpen(count) => {
                write!(f, "{count} editor(s) still open; close them first")
            }
            Self::EditorNotFound(id) => write!(f, "editor not found: {id}"),
            Self::EditorAlreadyOpen { key, editor } => {
                write!(f, "{key} is already being edited by editor {editor}")
            }
            Self::Session(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Session(err) => Some(err),
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SessionError> for AppError {
    fn from(value: SessionError) -> Self {
        Self::Session(value)
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Whether a main-window exit may proceed.
#[derive(Debug)]
pub enum ExitDecision {
    Exit,
    /// Exit vetoed; `editor` is still open.
    Vetoed {
        editor: Uuid,
        reason: Option<SessionError>,
    },
}

/// The open project plus its editors.
#[derive(Debug, Default)]
pub struct ProjectSession {
    store: DocumentStore,
    /// Open editors, oldest first.
    editors: Vec<EditorSession>,
}

impl ProjectSession {
    /// Starts with an empty, never-saved project.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(store: DocumentStore) -> Self {
        Self {
            store,
            editors: Vec::new(),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        Ok(Self::with_store(DocumentStore::open(path)?))
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// Direct store access for entity creation, deletion and settings.
    ///
    /// Loading through this handle makes open editors stale.
    pub fn store_mut(&mut self) -> &mut DocumentStore {
        &mut self.store
    }

    /// Replaces the project with the document at `path`.
    pub fn open_project(&mut self, path: impl AsRef<Path>) -> AppResult<()> {
        self.ensure_no_editors()?;
        self.store.load(path)?;
        Ok(())
    }

    /// Replaces the project with an empty one.
    pub fn new_project(&mut self) -> AppResult<()> {
        self.ensure_no_editors()?;
        self.store = DocumentStore::new_project();
        info!("event=project_new module=app status=ok");
        Ok(())
    }

    /// Opens an editor on `key`, using `form` or the entity's default form.
    pub fn open_editor(&mut self, key: EntityKey, form: Option<EditorForm>) -> AppResult<Uuid> {
        if let Some(existing) = self.editors.iter().find(|editor| editor.target() == &key) {
            return Err(AppError::EditorAlreadyOpen {
                key,
                editor: existing.id(),
            });
        }
        let editor = match form {
            Some(form) => EditorSession::open(&self.store, key, form)?,
            None => EditorSession::open_default(&self.store, key)?,
        };
        let id = editor.id();
        self.editors.push(editor);
        Ok(id)
    }

    pub fn editor(&self, id: Uuid) -> Option<&EditorSession> {
        self.editors.iter().find(|editor| editor.id() == id)
    }

    pub fn editor_mut(&mut self, id: Uuid) -> Option<&mut EditorSession> {
        self.editors.iter_mut().find(|editor| editor.id() == id)
    }

    /// Ids of the open editors in the order they were opened.
    pub fn editor_ids(&self) -> Vec<Uuid> {
        self.editors.iter().map(EditorSession::id).collect()
    }

    pub fn open_editor_count(&self) -> usize {
        self.editors.len()
    }

    /// Saves one editor; the editor stays open.
    pub fn save_editor(&mut self, id: Uuid) -> AppResult<()> {
        let editor = self
            .editors
            .iter_mut()
            .find(|editor| editor.id() == id)
            .ok_or(AppError::EditorNotFound(id))?;
        editor.save(&mut self.store)?;
        Ok(())
    }

    /// Closes one editor, asking `prompt` when it is dirty.
    ///
    /// The editor is dropped only when the outcome is `Closed`.
    pub fn close_editor<F>(&mut self, id: Uuid, prompt: F) -> AppResult<CloseOutcome>
    where
        F: FnOnce(&EditorSession) -> PromptChoice,
    {
        let index = self
            .editors
            .iter()
            .position(|editor| editor.id() == id)
            .ok_or(AppError::EditorNotFound(id))?;
        let outcome = close_one(&mut self.editors[index], &mut self.store, prompt)?;
        if matches!(outcome, CloseOutcome::Closed) {
            self.editors.remove(index);
        }
        Ok(outcome)
    }

    /// Closes every editor for a main-window exit.
    ///
    /// Editors closed before a veto stay closed.
    pub fn request_exit<F>(&mut self, mut prompt: F) -> AppResult<ExitDecision>
    where
        F: FnMut(&EditorSession) -> PromptChoice,
    {
        for id in self.editor_ids() {
            match self.close_editor(id, &mut prompt)? {
                CloseOutcome::Closed => {}
                CloseOutcome::Cancelled => {
                    info!("event=app_exit module=app status=vetoed editor={id} reason=cancel");
                    return Ok(ExitDecision::Vetoed {
                        editor: id,
                        reason: None,
                    });
                }
                CloseOutcome::KeptOpen(err) => {
                    info!("event=app_exit module=app status=vetoed editor={id} reason=save_failed");
                    return Ok(ExitDecision::Vetoed {
                        editor: id,
                        reason: Some(err),
                    });
                }
            }
        }
        info!("event=app_exit module=app status=ok");
        Ok(ExitDecision::Exit)
    }

    fn ensure_no_editors(&self) -> AppResult<()> {
        if self.editors.is_empty() {
            Ok(())
        } else {
            Err(AppError::EditorsOpen(self.editors.len()))
        }
    }
}

fn close_one<F>(
    editor: &mut EditorSession,
    store: &mut DocumentStore,
    prompt: F,
) -> SessionResult<CloseOutcome>
where
    F: FnOnce(&EditorSession) -> PromptChoice,
{
    match editor.request_close()? {
        CloseRequest::Closed => Ok(CloseOutcome::Closed),
        CloseRequest::PromptRequired => {
            let choice = prompt(editor);
            editor.resolve_close(store, choice)
        }
    }
}
