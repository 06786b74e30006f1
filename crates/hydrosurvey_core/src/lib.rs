//! Core of the hydrographic survey configuration tool.
//! This crate owns the project document and every rule that gates edits to it.

pub mod app;
pub mod engine;
pub mod logging;
pub mod model;
pub mod probe;
pub mod resolve;
pub mod session;
pub mod store;
pub mod validate;

pub use app::{AppError, AppResult, ExitDecision, ProjectSession};
pub use engine::{
    dispatch, ComputationError, ComputeEngine, ComputeError, ComputeRequest, ComputeResponse,
    EngineError, ProcessEngine,
};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::entity::{Entity, EntityId, EntityKey, EntityKind, Reference};
pub use model::mask::{MaskBounds, MaskRange, TargetChoice};
pub use model::path::{FieldPath, FieldValue};
pub use probe::{probe_columns, Delimiter, FileProbe, ProbeError};
pub use resolve::{resolve, Resolution, SelectionItem, SelectionList};
pub use session::forms::{EditorForm, PlotMode};
pub use session::{
    CloseOutcome, CloseRequest, CommitError, DirtyNotifier, EditorSession, PromptChoice,
    SessionError, SessionResult, SessionState,
};
pub use store::document::Document;
pub use store::{DocumentStore, SaveMode, StoreError, StoreResult};
pub use validate::{ValidationContext, ValidationFailure};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
