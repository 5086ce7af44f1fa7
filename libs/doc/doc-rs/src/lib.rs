//! The library that underlies the scribe document editor.
//!
//! Scribe clients rely on this library to track every mutation applied to a
//! rich, nested document (paragraphs, tables, fields, comments, tracked
//! revisions), to reverse and replay those mutations precisely, and to
//! serialize them into position-addressed operations for collaborative
//! synchronization.
//!
//! - The [model] module contains the document tree, formats, positions and
//!   the contracts between components.
//! - The [history] module contains the undo/redo entries and stacks.
//! - The [sync] module contains the wire operation records exchanged with
//!   the synchronization layer.
//! - [editor::DocumentEditor] ties the collaborators together and is what
//!   most integrators drive.

#[macro_use]
extern crate tracing;

pub mod editor;
pub mod history;
pub mod model;
pub mod sync;

pub use editor::DocumentEditor;
pub use history::action::ActionKind;
pub use history::stack::{Direction, EditorHistory};
pub use model::errors::{DocError, DocErrorKind, DocResult};
pub use sync::operation::{MarkerInfo, Operation, OperationKind};
