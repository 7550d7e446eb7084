//! Commands editing the node graph layer of a node document.

use crate::command::{Command, CommandContext};
use crate::document::Document;
use crate::errors::{DocumentError, DocumentResult, Status};
use crate::node_manager::{CanConnectResult, DocumentNodeManager, PinKey};
use crate::object_manager::CHILDREN_PROPERTY;
use crate::tree_commands::{AddObjectCommand, RemoveObjectCommand};
use glam::Vec2;
use plasma_reflection::PropertyIndex;
use uuid::Uuid;

fn nodes(document: &mut dyn Document) -> DocumentResult<&mut DocumentNodeManager> {
    document.node_manager_mut().ok_or(DocumentError::NotANodeDocument)
}

#[derive(Debug)]
pub struct MoveNodeCommand {
    object: Uuid,
    new_position: Vec2,
    old_position: Vec2,
}

impl MoveNodeCommand {
    pub fn new(object: Uuid, new_position: Vec2) -> Self {
        Self {
            object,
            new_position,
            old_position: Vec2::ZERO,
        }
    }
}

impl Command for MoveNodeCommand {
    fn do_internal(&mut self, ctx: &mut CommandContext<'_>, redo: bool) -> Status {
        let nodes = nodes(ctx.document())?;
        nodes.can_move_node(self.object)?;
        if !redo {
            self.old_position = nodes.get_node_pos(self.object).unwrap_or_default();
        }
        nodes.move_node(self.object, self.new_position)
    }

    fn undo_internal(&mut self, document: &mut dyn Document, _fire_events: bool) -> Status {
        nodes(document)?.move_node(self.object, self.old_position)
    }
}

/// Connect two pins through an existing, unconnected connection object.
#[derive(Debug)]
pub struct ConnectNodePinsCommand {
    connection_object: Uuid,
    source: PinKey,
    target: PinKey,
}

impl ConnectNodePinsCommand {
    pub fn new(connection_object: Uuid, source: PinKey, target: PinKey) -> Self {
        Self {
            connection_object,
            source,
            target,
        }
    }
}

impl Command for ConnectNodePinsCommand {
    fn do_internal(&mut self, ctx: &mut CommandContext<'_>, redo: bool) -> Status {
        let nodes = nodes(ctx.document())?;
        if !redo {
            let connection_type = nodes
                .objects()
                .live_object(self.connection_object)
                .ok_or(DocumentError::ObjectNotFound(self.connection_object))?
                .type_name()
                .to_string();
            if nodes.can_connect(&connection_type, &self.source, &self.target)? == CanConnectResult::ConnectNever {
                return Err(DocumentError::not_allowed("These pins cannot be connected."));
            }
        }
        nodes.connect(self.connection_object, &self.source, &self.target)
    }

    fn undo_internal(&mut self, document: &mut dyn Document, _fire_events: bool) -> Status {
        nodes(document)?.disconnect(self.connection_object)
    }
}

#[derive(Debug)]
pub struct DisconnectNodePinsCommand {
    connection_object: Uuid,
    source: Option<PinKey>,
    target: Option<PinKey>,
}

impl DisconnectNodePinsCommand {
    pub fn new(connection_object: Uuid) -> Self {
        Self {
            connection_object,
            source: None,
            target: None,
        }
    }
}

impl Command for DisconnectNodePinsCommand {
    fn do_internal(&mut self, ctx: &mut CommandContext<'_>, redo: bool) -> Status {
        let nodes = nodes(ctx.document())?;
        nodes.can_disconnect(self.connection_object)?;
        if !redo {
            let connection = nodes
                .get_connection(self.connection_object)
                .ok_or_else(|| DocumentError::not_allowed("Connection object is not connected"))?;
            self.source = Some(connection.source);
            self.target = Some(connection.target);
        }
        nodes.disconnect(self.connection_object)
    }

    fn undo_internal(&mut self, document: &mut dyn Document, _fire_events: bool) -> Status {
        let (Some(source), Some(target)) = (&self.source, &self.target) else {
            return Err(DocumentError::Command(
                "Disconnect Pins: nothing to restore".to_string(),
            ));
        };
        nodes(document)?.connect(self.connection_object, source, target)
    }
}

/// Disconnect every connection of a node, remove those connections, then
/// remove the node.
#[derive(Debug)]
pub struct RemoveNodeCommand {
    object: Uuid,
}

impl RemoveNodeCommand {
    pub fn new(object: Uuid) -> Self {
        Self { object }
    }
}

impl Command for RemoveNodeCommand {
    fn do_internal(&mut self, ctx: &mut CommandContext<'_>, redo: bool) -> Status {
        if redo {
            return Ok(());
        }
        let connections = nodes(ctx.document())?.get_node_connections(self.object);
        for connection in connections {
            disconnect_and_remove(ctx, connection.object)?;
        }
        ctx.add_sub_command(Box::new(RemoveObjectCommand::new(self.object)))
    }

    fn undo_internal(&mut self, _document: &mut dyn Document, _fire_events: bool) -> Status {
        Ok(())
    }
}

/// Create a connection object and connect two pins through it, replacing
/// connections the pins may not keep.
#[derive(Debug)]
pub struct AddConnectionCommand {
    connection_type: String,
    source: PinKey,
    target: PinKey,
}

impl AddConnectionCommand {
    pub fn new(connection_type: &str, source: PinKey, target: PinKey) -> Self {
        Self {
            connection_type: connection_type.to_string(),
            source,
            target,
        }
    }
}

impl Command for AddConnectionCommand {
    fn do_internal(&mut self, ctx: &mut CommandContext<'_>, redo: bool) -> Status {
        if redo {
            return Ok(());
        }
        connect_pins(ctx, &self.connection_type, &self.source, &self.target)
    }

    fn undo_internal(&mut self, _document: &mut dyn Document, _fire_events: bool) -> Status {
        Ok(())
    }
}

/// Add a connection object under the root and connect it, as sub-commands.
pub fn add_and_connect(ctx: &mut CommandContext<'_>, connection_type: &str, source: &PinKey, target: &PinKey) -> Status {
    let add = AddObjectCommand::new(connection_type, None, CHILDREN_PROPERTY, PropertyIndex::End);
    let connection_object = add.guid();
    ctx.add_sub_command(Box::new(add))?;
    ctx.add_sub_command(Box::new(ConnectNodePinsCommand::new(
        connection_object,
        source.clone(),
        target.clone(),
    )))
}

/// Disconnect a connection object and remove it, as sub-commands.
pub fn disconnect_and_remove(ctx: &mut CommandContext<'_>, connection_object: Uuid) -> Status {
    ctx.add_sub_command(Box::new(DisconnectNodePinsCommand::new(connection_object)))?;
    ctx.add_sub_command(Box::new(RemoveObjectCommand::new(connection_object)))
}

/// Connect `source` to `target` honoring the allowed multiplicity: pins
/// limited to a single connection lose their existing ones first.
pub fn connect_pins(ctx: &mut CommandContext<'_>, connection_type: &str, source: &PinKey, target: &PinKey) -> Status {
    let nodes = nodes(ctx.document())?;
    let result = nodes.can_connect(connection_type, source, target)?;
    let mut replaced = Vec::new();
    match result {
        CanConnectResult::ConnectNever => {
            return Err(DocumentError::not_allowed("These pins cannot be connected."));
        }
        CanConnectResult::Connect1to1 => {
            replaced.extend(nodes.get_connections(source));
            replaced.extend(nodes.get_connections(target));
        }
        CanConnectResult::Connect1toN => replaced.extend(nodes.get_connections(target)),
        CanConnectResult::ConnectNto1 => replaced.extend(nodes.get_connections(source)),
        CanConnectResult::ConnectNtoN => {}
    }
    replaced.sort_by_key(|c| c.object);
    replaced.dedup_by_key(|c| c.object);

    for connection in replaced {
        disconnect_and_remove(ctx, connection.object)?;
    }
    add_and_connect(ctx, connection_type, source, target)
}
