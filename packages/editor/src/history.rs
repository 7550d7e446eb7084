//! # Command History
//!
//! Transaction-based undo/redo over [`Command`]s.
//!
//! ## Design
//!
//! - Commands are only accepted inside a transaction. A finished outermost
//!   transaction becomes one undo step; nested transactions merge into
//!   their parent.
//! - Finishing an empty transaction discards it.
//! - Committing a new step clears the redo stack; dropped steps are cleaned
//!   up with the state they were left in.
//! - Temporary commands (interactive drags and the like) live in an inner
//!   transaction that can be rewound repeatedly before the final result is
//!   committed or cancelled.
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut history = CommandHistory::new();
//! history.start_transaction("Add Shape");
//! history.add_command(&mut doc, Box::new(AddObjectCommand::new("Shape", None, "Children", PropertyIndex::End)))?;
//! history.finish_transaction(&mut doc)?;
//!
//! history.undo(&mut doc)?;
//! history.redo(&mut doc)?;
//! ```

use crate::command::{Command, CommandEntry, CommandState, TransactionCommand};
use crate::document::Document;
use crate::errors::{DocumentError, DocumentResult, Status};
use plasma_common::{EventSource, SubscriptionId};
use std::rc::Rc;
use tracing::{debug, warn};

pub const DEFAULT_MAX_UNDO_LEVELS: usize = 100;
const TEMPORARY_TRANSACTION: &str = "[Temporary]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryEventType {
    TransactionStarted,
    TransactionEnded,
    TransactionCanceled,
    UndoEnded,
    RedoEnded,
    HistoryChanged,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEvent {
    pub event_type: HistoryEventType,
    pub name: String,
}

pub type HistoryHandler = Rc<dyn Fn(&HistoryEvent)>;

#[derive(Debug, Clone, Copy)]
struct TemporaryMode {
    /// Depth of the temporary transaction on the transaction stack.
    depth: usize,
    fire_events: bool,
}

#[derive(Debug)]
pub struct CommandHistory {
    undo_stack: Vec<CommandEntry>,
    redo_stack: Vec<CommandEntry>,
    transactions: Vec<CommandEntry>,
    temporary: Option<TemporaryMode>,
    /// Maximum number of undo steps (0 = unlimited).
    max_levels: usize,
    events: EventSource<HistoryHandler>,
}

impl Default for CommandHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandHistory {
    pub fn new() -> Self {
        Self::with_max_levels(DEFAULT_MAX_UNDO_LEVELS)
    }

    pub fn with_max_levels(max_levels: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            transactions: Vec::new(),
            temporary: None,
            max_levels,
            events: EventSource::new(),
        }
    }

    pub fn subscribe(&mut self, handler: HistoryHandler) -> SubscriptionId {
        self.events.subscribe(handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    fn broadcast(&self, event_type: HistoryEventType, name: &str) {
        let event = HistoryEvent {
            event_type,
            name: name.to_string(),
        };
        for handler in self.events.snapshot() {
            handler(&event);
        }
    }

    // ---------------------------------------------------------------------
    // Transactions
    // ---------------------------------------------------------------------

    pub fn start_transaction(&mut self, name: &str) {
        self.transactions
            .push(CommandEntry::new(Box::new(TransactionCommand::new(name))));
        self.broadcast(HistoryEventType::TransactionStarted, name);
    }

    pub fn is_in_transaction(&self) -> bool {
        !self.transactions.is_empty()
    }

    pub fn transaction_depth(&self) -> usize {
        self.transactions.len()
    }

    /// Execute `command` inside the innermost open transaction.
    pub fn add_command(&mut self, document: &mut dyn Document, command: Box<dyn Command>) -> Status {
        let transaction = self
            .transactions
            .last_mut()
            .ok_or_else(|| DocumentError::Transaction("Cannot add a command outside of a transaction".to_string()))?;
        transaction.add_child(document, command)
    }

    /// Close the innermost transaction. The outermost one becomes an undo
    /// step unless it is empty.
    pub fn finish_transaction(&mut self, document: &mut dyn Document) -> Status {
        self.end_transaction(document, false)
    }

    /// Undo and discard the innermost transaction.
    pub fn cancel_transaction(&mut self, document: &mut dyn Document) -> Status {
        self.end_transaction(document, true)
    }

    fn end_transaction(&mut self, document: &mut dyn Document, cancel: bool) -> Status {
        if let Some(temporary) = self.temporary {
            if self.transactions.len() <= temporary.depth + 1 {
                return Err(DocumentError::Transaction(
                    "Temporary commands must be finished or cancelled first".to_string(),
                ));
            }
        }
        let mut transaction = self
            .transactions
            .pop()
            .ok_or_else(|| DocumentError::Transaction("No transaction is open".to_string()))?;
        let name = transaction.display_name().to_string();

        if cancel {
            if let Err(e) = transaction.undo(document, true) {
                warn!(transaction = %name, error = %e, "failed to undo cancelled transaction");
            }
            transaction.cleanup(document, CommandState::WasUndone);
            debug!(transaction = %name, "cancelled transaction");
            self.broadcast(HistoryEventType::TransactionCanceled, &name);
            return Ok(());
        }

        if !transaction.has_children() {
            debug!(transaction = %name, "discarding empty transaction");
            self.broadcast(HistoryEventType::TransactionCanceled, &name);
            return Ok(());
        }

        match self.transactions.last_mut() {
            Some(parent) => parent.push_child(transaction),
            None => self.commit(document, transaction),
        }
        self.broadcast(HistoryEventType::TransactionEnded, &name);
        Ok(())
    }

    fn commit(&mut self, document: &mut dyn Document, transaction: CommandEntry) {
        debug!(transaction = %transaction.display_name(), "committed undo step");
        self.undo_stack.push(transaction);
        self.clear_redo(document);

        if self.max_levels > 0 && self.undo_stack.len() > self.max_levels {
            let mut oldest = self.undo_stack.remove(0);
            oldest.cleanup(document, CommandState::WasDone);
        }
        self.broadcast(HistoryEventType::HistoryChanged, "");
    }

    // ---------------------------------------------------------------------
    // Temporary commands
    // ---------------------------------------------------------------------

    /// Open a transaction named `name` with an inner temporary transaction.
    /// When rewinding, commands undo with `fire_events`. Temporary mode
    /// does not nest.
    pub fn begin_temporary_commands(&mut self, name: &str, fire_events: bool) -> Status {
        if self.temporary.is_some() {
            return Err(DocumentError::Transaction("Already in temporary mode".to_string()));
        }
        self.start_transaction(name);
        self.temporary = Some(TemporaryMode {
            depth: self.transactions.len(),
            fire_events,
        });
        self.start_transaction(TEMPORARY_TRANSACTION);
        Ok(())
    }

    pub fn is_in_temporary_mode(&self) -> bool {
        self.temporary.is_some()
    }

    /// Undo everything added since the temporary commands began, keeping
    /// the temporary transaction open.
    pub fn rewind_temporary_commands(&mut self, document: &mut dyn Document) -> Status {
        let temporary = self
            .temporary
            .ok_or_else(|| DocumentError::Transaction("Not in temporary mode".to_string()))?;
        let transaction = self
            .transactions
            .get_mut(temporary.depth)
            .ok_or_else(|| DocumentError::Transaction("Temporary transaction is missing".to_string()))?;
        transaction.rewind_children(document, temporary.fire_events)
    }

    /// Keep the temporary edits and commit the surrounding transaction.
    pub fn finish_temporary_commands(&mut self, document: &mut dyn Document) -> Status {
        self.close_temporary(document)?;
        self.finish_transaction(document)
    }

    /// Undo the temporary edits and drop the surrounding transaction.
    pub fn cancel_temporary_commands(&mut self, document: &mut dyn Document) -> Status {
        self.rewind_temporary_commands(document)?;
        self.close_temporary(document)?;
        self.cancel_transaction(document)
    }

    fn close_temporary(&mut self, document: &mut dyn Document) -> Status {
        let temporary = self
            .temporary
            .take()
            .ok_or_else(|| DocumentError::Transaction("Not in temporary mode".to_string()))?;
        while self.transactions.len() > temporary.depth + 1 {
            self.finish_transaction(document)?;
        }
        self.finish_transaction(document)
    }

    // ---------------------------------------------------------------------
    // Undo / redo
    // ---------------------------------------------------------------------

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty() && self.transactions.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty() && self.transactions.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    /// Name of the step `steps_back` levels down the undo stack.
    pub fn undo_name(&self, steps_back: usize) -> Option<&str> {
        let index = self.undo_stack.len().checked_sub(steps_back + 1)?;
        Some(self.undo_stack[index].display_name())
    }

    pub fn redo_name(&self, steps_back: usize) -> Option<&str> {
        let index = self.redo_stack.len().checked_sub(steps_back + 1)?;
        Some(self.redo_stack[index].display_name())
    }

    /// Undo the latest step. Returns false if there was nothing to undo.
    pub fn undo(&mut self, document: &mut dyn Document) -> DocumentResult<bool> {
        if self.is_in_transaction() {
            return Err(DocumentError::Transaction(
                "Cannot undo while a transaction is open".to_string(),
            ));
        }
        let Some(mut step) = self.undo_stack.pop() else {
            return Ok(false);
        };
        if let Err(e) = step.undo(document, true) {
            self.undo_stack.push(step);
            return Err(e);
        }
        let name = step.display_name().to_string();
        self.redo_stack.push(step);
        self.broadcast(HistoryEventType::UndoEnded, &name);
        Ok(true)
    }

    /// Redo the latest undone step. Returns false if there was nothing to redo.
    pub fn redo(&mut self, document: &mut dyn Document) -> DocumentResult<bool> {
        if self.is_in_transaction() {
            return Err(DocumentError::Transaction(
                "Cannot redo while a transaction is open".to_string(),
            ));
        }
        let Some(mut step) = self.redo_stack.pop() else {
            return Ok(false);
        };
        if let Err(e) = step.execute(document, true) {
            self.redo_stack.push(step);
            return Err(e);
        }
        let name = step.display_name().to_string();
        self.undo_stack.push(step);
        self.broadcast(HistoryEventType::RedoEnded, &name);
        Ok(true)
    }

    fn clear_redo(&mut self, document: &mut dyn Document) {
        while let Some(mut step) = self.redo_stack.pop() {
            step.cleanup(document, CommandState::WasUndone);
        }
    }

    /// Drop all history, cleaning up every step.
    pub fn clear(&mut self, document: &mut dyn Document) {
        while let Some(mut step) = self.undo_stack.pop() {
            step.cleanup(document, CommandState::WasDone);
        }
        self.clear_redo(document);
        self.broadcast(HistoryEventType::HistoryChanged, "");
    }
}
