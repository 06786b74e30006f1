//! Configuration entity model.
//!
//! # Responsibility
//! - Define the typed records held by a project document.
//! - Keep the recognized-options defaulting contract in one place.
//!
//! # Invariants
//! - Every entity is identified by `(kind, id)`.
//! - Cross-entity links are id-based `Reference`s, resolved lazily.

pub mod entity;
pub mod mask;
pub mod path;
pub mod schema;
