//! # Commands
//!
//! Undoable edits. A command is executed once, then undone and redone any
//! number of times, and finally cleaned up when it drops out of history.
//!
//! A command may spawn sub-commands while it executes. Sub-commands run
//! immediately, are recorded under their parent, and are undone (in reverse)
//! before the parent and redone (in order) after it.

use crate::document::Document;
use crate::errors::Status;
use crate::object_manager::DocumentObjectManager;
use std::fmt;
use tracing::warn;

/// Final state of a command when it is cleaned up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    WasDone,
    WasUndone,
}

pub trait Command: fmt::Debug {
    /// Apply the command. `redo` is false on the first execution; only then
    /// may the command capture state or spawn sub-commands.
    fn do_internal(&mut self, ctx: &mut CommandContext<'_>, redo: bool) -> Status;

    /// Revert the command. Without `fire_events` the command may restore
    /// state silently (used when rewinding temporary edits).
    fn undo_internal(&mut self, document: &mut dyn Document, fire_events: bool) -> Status;

    /// Release resources once the command leaves history.
    fn cleanup_internal(&mut self, _document: &mut dyn Document, _state: CommandState) {}

    fn display_name(&self) -> &str {
        ""
    }
}

/// Access to the document and the sub-command list during execution.
pub struct CommandContext<'a> {
    document: &'a mut dyn Document,
    children: &'a mut Vec<CommandEntry>,
}

impl<'a> CommandContext<'a> {
    pub fn document(&mut self) -> &mut dyn Document {
        &mut *self.document
    }

    pub fn objects(&mut self) -> &mut DocumentObjectManager {
        self.document.object_manager_mut()
    }

    /// Execute `command` as a child of the running command. On failure the
    /// child is cleaned up and the error returned; the parent decides
    /// whether to fail as well.
    pub fn add_sub_command(&mut self, command: Box<dyn Command>) -> Status {
        let mut entry = CommandEntry::new(command);
        match entry.execute(&mut *self.document, false) {
            Ok(()) => {
                self.children.push(entry);
                Ok(())
            }
            Err(e) => {
                entry.cleanup(&mut *self.document, CommandState::WasUndone);
                Err(e)
            }
        }
    }

    pub fn sub_command_count(&self) -> usize {
        self.children.len()
    }
}

/// A command together with the sub-commands it spawned.
#[derive(Debug)]
pub struct CommandEntry {
    command: Box<dyn Command>,
    children: Vec<CommandEntry>,
}

impl CommandEntry {
    pub fn new(command: Box<dyn Command>) -> Self {
        Self {
            command,
            children: Vec::new(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.command.display_name()
    }

    pub fn children(&self) -> &[CommandEntry] {
        &self.children
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub(crate) fn execute(&mut self, document: &mut dyn Document, redo: bool) -> Status {
        let result = {
            let mut ctx = CommandContext {
                document: &mut *document,
                children: &mut self.children,
            };
            self.command.do_internal(&mut ctx, redo)
        };

        if !redo {
            if let Err(e) = result {
                self.rollback_children(document);
                return Err(e);
            }
            return Ok(());
        }

        result?;
        for i in 0..self.children.len() {
            if let Err(e) = self.children[i].execute(document, true) {
                for child in self.children[..i].iter_mut().rev() {
                    if let Err(undo_error) = child.undo(document, true) {
                        warn!(error = %undo_error, "failed to roll back sub-command after a failed redo");
                    }
                }
                if let Err(undo_error) = self.command.undo_internal(document, true) {
                    warn!(error = %undo_error, "failed to roll back command after a failed redo");
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Undo sub-commands in reverse, then the command itself. A failure
    /// re-applies what was already undone.
    pub(crate) fn undo(&mut self, document: &mut dyn Document, fire_events: bool) -> Status {
        let count = self.children.len();
        for i in (0..count).rev() {
            if let Err(e) = self.children[i].undo(document, fire_events) {
                self.redo_children_from(document, i + 1);
                return Err(e);
            }
        }
        if let Err(e) = self.command.undo_internal(document, fire_events) {
            self.redo_children_from(document, 0);
            return Err(e);
        }
        Ok(())
    }

    pub(crate) fn cleanup(&mut self, document: &mut dyn Document, state: CommandState) {
        for child in &mut self.children {
            child.cleanup(document, state);
        }
        self.command.cleanup_internal(document, state);
    }

    /// Execute an already constructed child and record it (used by
    /// transactions, which collect commands one at a time).
    pub(crate) fn add_child(&mut self, document: &mut dyn Document, command: Box<dyn Command>) -> Status {
        let mut ctx = CommandContext {
            document,
            children: &mut self.children,
        };
        ctx.add_sub_command(command)
    }

    pub(crate) fn push_child(&mut self, child: CommandEntry) {
        self.children.push(child);
    }

    /// Undo and clean up all children, leaving the entry empty.
    pub(crate) fn rewind_children(&mut self, document: &mut dyn Document, fire_events: bool) -> Status {
        while let Some(mut child) = self.children.pop() {
            if let Err(e) = child.undo(document, fire_events) {
                self.children.push(child);
                return Err(e);
            }
            child.cleanup(document, CommandState::WasUndone);
        }
        Ok(())
    }

    fn rollback_children(&mut self, document: &mut dyn Document) {
        while let Some(mut child) = self.children.pop() {
            if let Err(e) = child.undo(document, true) {
                warn!(error = %e, "failed to roll back sub-command of a failed command");
            }
            child.cleanup(document, CommandState::WasUndone);
        }
    }

    fn redo_children_from(&mut self, document: &mut dyn Document, start: usize) {
        for child in &mut self.children[start..] {
            if let Err(e) = child.execute(document, true) {
                warn!(error = %e, "failed to re-apply sub-command after a failed undo");
            }
        }
    }
}

/// Groups the commands of one undo step.
#[derive(Debug)]
pub struct TransactionCommand {
    name: String,
}

impl TransactionCommand {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Command for TransactionCommand {
    fn do_internal(&mut self, _ctx: &mut CommandContext<'_>, _redo: bool) -> Status {
        Ok(())
    }

    fn undo_internal(&mut self, _document: &mut dyn Document, _fire_events: bool) -> Status {
        Ok(())
    }

    fn display_name(&self) -> &str {
        &self.name
    }
}
