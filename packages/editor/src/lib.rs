//! # Plasma Editor
//!
//! Document editing engine: a reflected object tree with undoable commands.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ reflection: types, properties, accessors    │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ object_manager: object tree + legality      │
//! │  - structure / property / object events     │
//! │ node_manager: pins and connections on top   │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ commands + history: undoable edits grouped  │
//! │ into transactions                           │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Check, then mutate**: every structural edit has a `can_*` query
//!    that the mutating call repeats
//! 2. **Events after the fact**: observers see a consistent tree
//! 3. **Commands own their undo state**: captured on first execution,
//!    replayed on redo
//!
//! ## Usage
//!
//! ```rust,ignore
//! use plasma_editor::{AddObjectCommand, CommandHistory, ObjectDocument, CHILDREN_PROPERTY};
//! use plasma_reflection::PropertyIndex;
//!
//! let mut doc = ObjectDocument::new(registry);
//! let mut history = CommandHistory::new();
//!
//! history.start_transaction("Add Shape");
//! history.add_command(&mut doc, Box::new(AddObjectCommand::new("Shape", None, CHILDREN_PROPERTY, PropertyIndex::End)))?;
//! history.finish_transaction(&mut doc)?;
//!
//! history.undo(&mut doc)?;
//! ```

mod command;
mod document;
mod errors;
mod events;
mod history;
mod metadata;
mod node_commands;
mod node_manager;
mod object;
mod object_graph;
mod object_manager;
mod selection;
mod tree_commands;

pub use command::{Command, CommandContext, CommandEntry, CommandState, TransactionCommand};
pub use document::{
    copy_objects, paste_into_children, Document, NodeDocument, ObjectDocument, PasteInfo, NODES_MIME, NOT_ALL_PASTED,
    OBJECTS_MIME, PREFAB_MIME,
};
pub use errors::{DocumentError, DocumentResult, Status};
pub use events::*;
pub use history::{CommandHistory, HistoryEvent, HistoryEventType, HistoryHandler, DEFAULT_MAX_UNDO_LEVELS};
pub use metadata::*;
pub use node_commands::*;
pub use node_manager::*;
pub use object::DocumentObject;
pub use object_graph::*;
pub use object_manager::*;
pub use selection::SelectionManager;
pub use tree_commands::*;
