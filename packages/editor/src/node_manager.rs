//! # Document Node Manager
//!
//! Adds a node graph on top of the object tree: objects classified as nodes
//! get a position and typed input/output pins, objects classified as
//! connections link one output pin to one input pin.
//!
//! ## Design
//!
//! - Node and connection bookkeeping follows object lifetime through the
//!   object manager's events, so undo/redo of tree commands keeps it intact.
//! - Pin connection state is only changed through `connect`/`disconnect`,
//!   which the node commands wrap for undo.
//! - Which objects are nodes, which pins they have and which connections are
//!   legal is decided by a [`NodeGraphPolicy`].

use crate::command::Command;
use crate::document::PasteInfo;
use crate::errors::{DocumentError, DocumentResult, Status};
use crate::events::*;
use crate::node_commands::{AddConnectionCommand, ConnectNodePinsCommand, MoveNodeCommand};
use crate::object_graph::{add_object_to_graph, AbstractObjectGraph, ORDER_PROPERTY, ROOT_NODE_NAME};
use crate::object_manager::{DocumentObjectManager, ObjectManagerPolicy, CHILDREN_PROPERTY};
use glam::Vec2;
use plasma_common::{EventSource, SubscriptionId};
use plasma_reflection::{PropertyIndex, TypeDescriptor, TypeRegistry, Variant};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Connection type used when none is configured.
pub const DEFAULT_CONNECTION_TYPE: &str = "DocumentNodeManager_DefaultConnection";

pub const META_NODE_POS: &str = "Node::Pos";
pub const META_NODE_SOURCE: &str = "Node::Source";
pub const META_NODE_TARGET: &str = "Node::Target";
pub const META_NODE_SOURCE_PIN: &str = "Node::SourcePin";
pub const META_NODE_TARGET_PIN: &str = "Node::TargetPin";
/// Older files stored connections on the source node instead of as objects.
pub const META_LEGACY_CONNECTIONS: &str = "Node::Connections";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PinDirection {
    Input,
    Output,
}

/// Identifies a pin: owning node, direction and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PinKey {
    pub node: Uuid,
    pub direction: PinDirection,
    pub name: String,
}

impl PinKey {
    pub fn input(node: Uuid, name: &str) -> Self {
        Self {
            node,
            direction: PinDirection::Input,
            name: name.to_string(),
        }
    }

    pub fn output(node: Uuid, name: &str) -> Self {
        Self {
            node,
            direction: PinDirection::Output,
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pin {
    pub node: Uuid,
    pub direction: PinDirection,
    pub name: String,
    /// Free-form type tag interpreted by the policy.
    pub data_type: String,
}

impl Pin {
    pub fn new(node: Uuid, direction: PinDirection, name: &str, data_type: &str) -> Self {
        Self {
            node,
            direction,
            name: name.to_string(),
            data_type: data_type.to_string(),
        }
    }

    pub fn key(&self) -> PinKey {
        PinKey {
            node: self.node,
            direction: self.direction,
            name: self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub object: Uuid,
    pub source: PinKey,
    pub target: PinKey,
}

/// How many connections the two pins of a proposed connection may have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanConnectResult {
    ConnectNever,
    /// Both pins keep at most this one connection.
    Connect1to1,
    /// The source may fan out; the target keeps a single connection.
    Connect1toN,
    /// The target may gather many; the source keeps a single connection.
    ConnectNto1,
    ConnectNtoN,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    NodeMoved { node: Uuid, position: Vec2 },
    AfterPinsConnected { connection: Connection },
    BeforePinsDisconnected { connection: Connection },
    BeforePinsChanged { node: Uuid },
    AfterPinsChanged { node: Uuid },
    AfterNodeAdded { node: Uuid },
    BeforeNodeRemoved { node: Uuid },
}

pub type NodeEventHandler = Rc<dyn Fn(&NodeEvent)>;

/// Node-graph rules of a document type.
pub trait NodeGraphPolicy {
    /// Refines which non-root, non-connection objects are nodes.
    fn is_node(&self, _objects: &DocumentObjectManager, _object: Uuid) -> bool {
        true
    }

    fn connection_type(&self) -> &str {
        DEFAULT_CONNECTION_TYPE
    }

    /// Input and output pins of a node.
    fn create_pins(&self, _objects: &DocumentObjectManager, _node: Uuid) -> (Vec<Pin>, Vec<Pin>) {
        (Vec::new(), Vec::new())
    }

    fn can_connect(
        &self,
        _objects: &DocumentObjectManager,
        _connection_type: &str,
        _source: &Pin,
        _target: &Pin,
    ) -> DocumentResult<CanConnectResult> {
        Ok(CanConnectResult::ConnectNtoN)
    }

    fn can_disconnect(&self, _objects: &DocumentObjectManager, _connection: &Connection) -> Status {
        Ok(())
    }

    /// Properties whose changes alter the pin layout of a node.
    fn is_dynamic_pin_property(&self, _objects: &DocumentObjectManager, _node: Uuid, _property: &str) -> bool {
        false
    }
}

pub struct DefaultNodeGraphPolicy;

impl NodeGraphPolicy for DefaultNodeGraphPolicy {}

#[derive(Debug)]
struct NodeInternal {
    position: Vec2,
    inputs: Vec<Pin>,
    outputs: Vec<Pin>,
}

#[derive(Default)]
struct NodeGraph {
    nodes: HashMap<Uuid, NodeInternal>,
    /// Every live connection object; `None` while it is not connected.
    connections: HashMap<Uuid, Option<Connection>>,
    pin_connections: HashMap<PinKey, Vec<Uuid>>,
    events: EventSource<NodeEventHandler>,
}

impl NodeGraph {
    fn pin(&self, key: &PinKey) -> Option<&Pin> {
        let node = self.nodes.get(&key.node)?;
        let pins = match key.direction {
            PinDirection::Input => &node.inputs,
            PinDirection::Output => &node.outputs,
        };
        pins.iter().find(|pin| pin.name == key.name)
    }

    fn has_connections(&self, key: &PinKey) -> bool {
        self.pin_connections.get(key).map(|c| !c.is_empty()).unwrap_or(false)
    }

    fn node_has_connections(&self, node: Uuid) -> bool {
        self.nodes
            .get(&node)
            .map(|n| n.inputs.iter().chain(&n.outputs).any(|pin| self.has_connections(&pin.key())))
            .unwrap_or(false)
    }
}

fn emit(graph: &RefCell<NodeGraph>, event: NodeEvent) {
    let handlers = graph.borrow().events.snapshot();
    for handler in handlers {
        handler(&event);
    }
}

fn classify_is_connection(objects: &DocumentObjectManager, policy: &dyn NodeGraphPolicy, object: Uuid) -> bool {
    objects
        .live_object(object)
        .map(|o| objects.registry().is_derived_from(o.type_name(), policy.connection_type()))
        .unwrap_or(false)
}

fn classify_is_node(objects: &DocumentObjectManager, policy: &dyn NodeGraphPolicy, object: Uuid) -> bool {
    object != objects.root()
        && objects.live_object(object).is_some()
        && !classify_is_connection(objects, policy, object)
        && policy.is_node(objects, object)
}

fn create_node_internal(
    objects: &DocumentObjectManager,
    policy: &dyn NodeGraphPolicy,
    graph: &RefCell<NodeGraph>,
    node: Uuid,
) {
    let (inputs, outputs) = policy.create_pins(objects, node);
    graph.borrow_mut().nodes.insert(
        node,
        NodeInternal {
            position: Vec2::ZERO,
            inputs,
            outputs,
        },
    );
}

/// Recreate the pins of `node` unless one of its current pins is connected.
fn recreate_pins(
    objects: &DocumentObjectManager,
    policy: &dyn NodeGraphPolicy,
    graph: &RefCell<NodeGraph>,
    node: Uuid,
) -> bool {
    {
        let g = graph.borrow();
        if !g.nodes.contains_key(&node) || g.node_has_connections(node) {
            return false;
        }
    }
    emit(graph, NodeEvent::BeforePinsChanged { node });
    let (inputs, outputs) = policy.create_pins(objects, node);
    if let Some(internal) = graph.borrow_mut().nodes.get_mut(&node) {
        internal.inputs = inputs;
        internal.outputs = outputs;
    }
    emit(graph, NodeEvent::AfterPinsChanged { node });
    true
}

/// Object-manager policy refusing removal of connected nodes and connections.
struct NodeObjectPolicy {
    graph: Rc<RefCell<NodeGraph>>,
}

impl ObjectManagerPolicy for NodeObjectPolicy {
    fn can_remove(&self, _manager: &DocumentObjectManager, object: Uuid) -> Status {
        let graph = self.graph.borrow();
        if graph.nodes.contains_key(&object) && graph.node_has_connections(object) {
            return Err(DocumentError::not_allowed(
                "Node still has connections. Disconnect all pins before removing it.",
            ));
        }
        if let Some(Some(_)) = graph.connections.get(&object) {
            return Err(DocumentError::not_allowed(
                "Connection is still connected. Disconnect it before removing it.",
            ));
        }
        Ok(())
    }
}

pub struct DocumentNodeManager {
    objects: DocumentObjectManager,
    graph: Rc<RefCell<NodeGraph>>,
    policy: Rc<dyn NodeGraphPolicy>,
}

impl fmt::Debug for DocumentNodeManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let graph = self.graph.borrow();
        f.debug_struct("DocumentNodeManager")
            .field("objects", &self.objects)
            .field("nodes", &graph.nodes.len())
            .field("connections", &graph.connections.len())
            .finish()
    }
}

/// Register the default connection type.
pub fn register_connection_type(registry: &TypeRegistry) -> Arc<TypeDescriptor> {
    registry.register_if_missing(TypeDescriptor::new(DEFAULT_CONNECTION_TYPE))
}

impl DocumentNodeManager {
    pub fn new(registry: Arc<TypeRegistry>, policy: Rc<dyn NodeGraphPolicy>) -> Self {
        register_connection_type(&registry);
        let graph = Rc::new(RefCell::new(NodeGraph::default()));
        let mut objects = DocumentObjectManager::with_policy(
            registry,
            Rc::new(NodeObjectPolicy { graph: graph.clone() }),
        );

        {
            let graph = graph.clone();
            let policy = policy.clone();
            objects.subscribe_object_events(Rc::new(move |objects: &mut DocumentObjectManager, e: &ObjectEvent| {
                match e.event_type {
                    ObjectEventType::AfterObjectCreated => {
                        if classify_is_node(objects, policy.as_ref(), e.object) {
                            create_node_internal(objects, policy.as_ref(), &graph, e.object);
                        } else if classify_is_connection(objects, policy.as_ref(), e.object) {
                            graph.borrow_mut().connections.insert(e.object, None);
                        }
                    }
                    ObjectEventType::BeforeObjectDestroyed => {
                        let mut g = graph.borrow_mut();
                        debug_assert!(
                            !g.node_has_connections(e.object),
                            "destroying a node that still has connections"
                        );
                        g.nodes.remove(&e.object);
                        g.connections.remove(&e.object);
                    }
                }
            }));
        }
        {
            let graph = graph.clone();
            let policy = policy.clone();
            objects.subscribe_structure_events(Rc::new(
                move |objects: &mut DocumentObjectManager, e: &StructureEvent| match e.event_type {
                    StructureEventType::BeforeObjectAdded => {
                        let known = graph.borrow().nodes.contains_key(&e.object);
                        if !known && classify_is_node(objects, policy.as_ref(), e.object) {
                            create_node_internal(objects, policy.as_ref(), &graph, e.object);
                        }
                    }
                    StructureEventType::AfterObjectAdded => {
                        if graph.borrow().nodes.contains_key(&e.object) {
                            emit(&graph, NodeEvent::AfterNodeAdded { node: e.object });
                        }
                    }
                    StructureEventType::BeforeObjectRemoved => {
                        if graph.borrow().nodes.contains_key(&e.object) {
                            emit(&graph, NodeEvent::BeforeNodeRemoved { node: e.object });
                        }
                    }
                    _ => {}
                },
            ));
        }
        {
            let graph = graph.clone();
            let policy = policy.clone();
            objects.subscribe_property_events(Rc::new(move |objects: &mut DocumentObjectManager, e: &PropertyEvent| {
                let is_node = graph.borrow().nodes.contains_key(&e.object);
                if is_node && policy.is_dynamic_pin_property(objects, e.object, &e.property) {
                    recreate_pins(objects, policy.as_ref(), &graph, e.object);
                }
            }));
        }

        Self { objects, graph, policy }
    }

    pub fn objects(&self) -> &DocumentObjectManager {
        &self.objects
    }

    pub fn objects_mut(&mut self) -> &mut DocumentObjectManager {
        &mut self.objects
    }

    pub fn policy(&self) -> &Rc<dyn NodeGraphPolicy> {
        &self.policy
    }

    pub fn subscribe(&mut self, handler: NodeEventHandler) -> SubscriptionId {
        self.graph.borrow_mut().events.subscribe(handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.graph.borrow_mut().events.unsubscribe(id)
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub fn is_node(&self, object: Uuid) -> bool {
        self.graph.borrow().nodes.contains_key(&object)
    }

    pub fn is_connection(&self, object: Uuid) -> bool {
        self.graph.borrow().connections.contains_key(&object)
    }

    pub fn get_node_pos(&self, node: Uuid) -> Option<Vec2> {
        self.graph.borrow().nodes.get(&node).map(|n| n.position)
    }

    pub fn get_input_pins(&self, node: Uuid) -> Vec<Pin> {
        self.graph
            .borrow()
            .nodes
            .get(&node)
            .map(|n| n.inputs.clone())
            .unwrap_or_default()
    }

    pub fn get_output_pins(&self, node: Uuid) -> Vec<Pin> {
        self.graph
            .borrow()
            .nodes
            .get(&node)
            .map(|n| n.outputs.clone())
            .unwrap_or_default()
    }

    pub fn get_input_pin_by_name(&self, node: Uuid, name: &str) -> Option<Pin> {
        self.get_pin(&PinKey::input(node, name))
    }

    pub fn get_output_pin_by_name(&self, node: Uuid, name: &str) -> Option<Pin> {
        self.get_pin(&PinKey::output(node, name))
    }

    pub fn get_pin(&self, key: &PinKey) -> Option<Pin> {
        self.graph.borrow().pin(key).cloned()
    }

    /// Connections attached to a pin, in connection order.
    pub fn get_connections(&self, pin: &PinKey) -> Vec<Connection> {
        let graph = self.graph.borrow();
        graph
            .pin_connections
            .get(pin)
            .map(|objects| {
                objects
                    .iter()
                    .filter_map(|object| graph.connections.get(object).cloned().flatten())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn has_connections(&self, pin: &PinKey) -> bool {
        self.graph.borrow().has_connections(pin)
    }

    pub fn node_has_connections(&self, node: Uuid) -> bool {
        self.graph.borrow().node_has_connections(node)
    }

    pub fn is_connected(&self, source: &PinKey, target: &PinKey) -> bool {
        self.get_connections(source).iter().any(|c| c.target == *target)
    }

    /// Pins linked by a connection object, if it is connected.
    pub fn get_connection(&self, object: Uuid) -> Option<Connection> {
        self.graph.borrow().connections.get(&object).cloned().flatten()
    }

    /// All connections touching any pin of `node`.
    pub fn get_node_connections(&self, node: Uuid) -> Vec<Connection> {
        let pins: Vec<PinKey> = self
            .get_input_pins(node)
            .iter()
            .chain(self.get_output_pins(node).iter())
            .map(Pin::key)
            .collect();
        let mut seen = HashSet::new();
        pins.iter()
            .flat_map(|pin| self.get_connections(pin))
            .filter(|c| seen.insert(c.object))
            .collect()
    }

    // ---------------------------------------------------------------------
    // Connections
    // ---------------------------------------------------------------------

    pub fn can_connect(&self, connection_type: &str, source: &PinKey, target: &PinKey) -> DocumentResult<CanConnectResult> {
        if !self
            .objects
            .registry()
            .is_derived_from(connection_type, self.policy.connection_type())
        {
            return Err(DocumentError::not_allowed("Invalid connection object type"));
        }
        if source.direction != PinDirection::Output {
            return Err(DocumentError::not_allowed("Source pin is not an output pin."));
        }
        if target.direction != PinDirection::Input {
            return Err(DocumentError::not_allowed("Target pin is not an input pin."));
        }
        if source.node == target.node {
            return Err(DocumentError::not_allowed("Nodes cannot be connect with themselves."));
        }
        if self.is_connected(source, target) {
            return Err(DocumentError::not_allowed("Pins already connected."));
        }
        let source_pin = self
            .get_pin(source)
            .ok_or_else(|| DocumentError::not_allowed(format!("Source pin '{}' does not exist", source.name)))?;
        let target_pin = self
            .get_pin(target)
            .ok_or_else(|| DocumentError::not_allowed(format!("Target pin '{}' does not exist", target.name)))?;

        self.policy
            .can_connect(&self.objects, connection_type, &source_pin, &target_pin)
    }

    /// Link the pins through `connection_object`.
    pub fn connect(&mut self, connection_object: Uuid, source: &PinKey, target: &PinKey) -> Status {
        let connection = Connection {
            object: connection_object,
            source: source.clone(),
            target: target.clone(),
        };
        {
            let mut graph = self.graph.borrow_mut();
            match graph.connections.get(&connection_object) {
                Some(None) => {}
                Some(Some(_)) => return Err(DocumentError::not_allowed("Connection object is already connected")),
                None => return Err(DocumentError::not_allowed("The given object is not a connection!")),
            }
            if graph.pin(source).is_none() || graph.pin(target).is_none() {
                return Err(DocumentError::not_allowed("Cannot connect pins that do not exist"));
            }
            graph.connections.insert(connection_object, Some(connection.clone()));
            graph
                .pin_connections
                .entry(source.clone())
                .or_default()
                .push(connection_object);
            graph
                .pin_connections
                .entry(target.clone())
                .or_default()
                .push(connection_object);
        }
        debug!(connection = %connection_object, source = %source.node, target = %target.node, "connected pins");
        emit(&self.graph, NodeEvent::AfterPinsConnected { connection });
        Ok(())
    }

    pub fn can_disconnect(&self, connection_object: Uuid) -> Status {
        let connection = self
            .get_connection(connection_object)
            .ok_or_else(|| DocumentError::not_allowed("Connection object is not connected"))?;
        self.policy.can_disconnect(&self.objects, &connection)
    }

    pub fn disconnect(&mut self, connection_object: Uuid) -> Status {
        let connection = self
            .get_connection(connection_object)
            .ok_or_else(|| DocumentError::not_allowed("Connection object is not connected"))?;
        emit(
            &self.graph,
            NodeEvent::BeforePinsDisconnected {
                connection: connection.clone(),
            },
        );

        let mut graph = self.graph.borrow_mut();
        for pin in [&connection.source, &connection.target] {
            if let Some(list) = graph.pin_connections.get_mut(pin) {
                list.retain(|object| *object != connection_object);
                if list.is_empty() {
                    graph.pin_connections.remove(pin);
                }
            }
        }
        graph.connections.insert(connection_object, None);
        debug!(connection = %connection_object, "disconnected pins");
        Ok(())
    }

    /// Whether connecting `source` to `target` closes a cycle.
    pub fn would_connection_create_circle(&self, source: &PinKey, target: &PinKey) -> bool {
        let mut visited = HashSet::new();
        self.can_reach_node(target.node, source.node, &mut visited)
    }

    /// Depth-first search along output connections.
    pub fn can_reach_node(&self, from: Uuid, to: Uuid, visited: &mut HashSet<Uuid>) -> bool {
        if from == to {
            return true;
        }
        if !visited.insert(from) {
            return false;
        }
        for pin in self.get_output_pins(from) {
            for connection in self.get_connections(&pin.key()) {
                if self.can_reach_node(connection.target.node, to, visited) {
                    return true;
                }
            }
        }
        false
    }

    // ---------------------------------------------------------------------
    // Nodes
    // ---------------------------------------------------------------------

    pub fn can_move_node(&self, node: Uuid) -> Status {
        if !self.is_node(node) {
            return Err(DocumentError::not_allowed("The given object is not a node!"));
        }
        Ok(())
    }

    pub fn move_node(&mut self, node: Uuid, position: Vec2) -> Status {
        self.can_move_node(node)?;
        if let Some(internal) = self.graph.borrow_mut().nodes.get_mut(&node) {
            internal.position = position;
        }
        emit(&self.graph, NodeEvent::NodeMoved { node, position });
        Ok(())
    }

    /// Rebuild the pins of `node`. Refused (returns false) while any of
    /// its pins is connected.
    pub fn try_recreate_pins(&mut self, node: Uuid) -> bool {
        recreate_pins(&self.objects, self.policy.as_ref(), &self.graph, node)
    }

    // ---------------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------------

    /// Write node positions and connection endpoints into `graph`.
    pub fn attach_meta_data_before_saving(&self, graph: &mut AbstractObjectGraph) {
        let state = self.graph.borrow();
        for node in graph.nodes_mut() {
            if let Some(internal) = state.nodes.get(&node.guid) {
                node.add_property(META_NODE_POS, Variant::Vec2(internal.position));
            }
            if let Some(Some(connection)) = state.connections.get(&node.guid) {
                node.add_property(META_NODE_SOURCE, Variant::Uuid(connection.source.node));
                node.add_property(META_NODE_TARGET, Variant::Uuid(connection.target.node));
                node.add_property(META_NODE_SOURCE_PIN, Variant::String(connection.source.name.clone()));
                node.add_property(META_NODE_TARGET_PIN, Variant::String(connection.target.name.clone()));
            }
        }
    }

    /// Apply positions and connections stored in `graph`. Undoable restores
    /// return commands for the caller to execute; otherwise the state is
    /// applied directly and the returned list is empty.
    pub fn restore_meta_data_after_loading(
        &mut self,
        graph: &AbstractObjectGraph,
        undoable: bool,
    ) -> DocumentResult<Vec<Box<dyn Command>>> {
        self.restore_with_offset(graph, undoable, Vec2::ZERO, None)
    }

    fn restore_with_offset(
        &mut self,
        graph: &AbstractObjectGraph,
        undoable: bool,
        offset: Vec2,
        only: Option<&HashSet<Uuid>>,
    ) -> DocumentResult<Vec<Box<dyn Command>>> {
        let mut commands: Vec<Box<dyn Command>> = Vec::new();
        let included = |guid: &Uuid| only.map(|set| set.contains(guid)).unwrap_or(true);

        for node in graph.nodes().filter(|n| included(&n.guid)) {
            if !self.is_node(node.guid) {
                continue;
            }
            if let Some(position) = node.find_property(META_NODE_POS).and_then(|p| p.value.as_vec2()) {
                let position = position + offset;
                if undoable {
                    commands.push(Box::new(MoveNodeCommand::new(node.guid, position)));
                } else {
                    self.move_node(node.guid, position)?;
                }
            }
        }

        for node in graph.nodes().filter(|n| included(&n.guid)) {
            if !self.is_connection(node.guid) {
                continue;
            }
            let uuid = |name: &str| node.find_property(name).and_then(|p| p.value.as_uuid());
            let text = |name: &str| node.find_property(name).and_then(|p| p.value.as_str().map(str::to_string));
            let (Some(source), Some(target), Some(source_pin), Some(target_pin)) = (
                uuid(META_NODE_SOURCE),
                uuid(META_NODE_TARGET),
                text(META_NODE_SOURCE_PIN),
                text(META_NODE_TARGET_PIN),
            ) else {
                warn!(connection = %node.guid, "connection has no stored endpoints");
                continue;
            };
            let source = PinKey::output(source, &source_pin);
            let target = PinKey::input(target, &target_pin);
            if undoable {
                commands.push(Box::new(ConnectNodePinsCommand::new(node.guid, source, target)));
                continue;
            }
            let connection_type = self
                .objects
                .live_object(node.guid)
                .map(|o| o.type_name().to_string())
                .unwrap_or_default();
            match self.can_connect(&connection_type, &source, &target) {
                Ok(CanConnectResult::ConnectNever) => {
                    warn!(connection = %node.guid, "stored connection is no longer allowed")
                }
                Ok(_) => self.connect(node.guid, &source, &target)?,
                Err(e) => warn!(connection = %node.guid, error = %e, "failed to restore connection"),
            }
        }

        for node in graph.nodes().filter(|n| included(&n.guid)) {
            let Some(legacy) = node
                .find_property(META_LEGACY_CONNECTIONS)
                .and_then(|p| p.value.as_array())
            else {
                continue;
            };
            for entry in legacy {
                let Some(fields) = entry.as_dictionary() else { continue };
                let (Some(target), Some(source_pin), Some(target_pin)) = (
                    fields.get("t").and_then(Variant::as_uuid),
                    fields.get("sp").and_then(Variant::as_str),
                    fields.get("tp").and_then(Variant::as_str),
                ) else {
                    continue;
                };
                let source = PinKey::output(node.guid, source_pin);
                let target = PinKey::input(target, target_pin);
                if undoable {
                    let connection_type = self.policy.connection_type().to_string();
                    commands.push(Box::new(AddConnectionCommand::new(&connection_type, source, target)));
                } else {
                    self.add_legacy_connection(&source, &target)?;
                }
            }
        }

        Ok(commands)
    }

    fn add_legacy_connection(&mut self, source: &PinKey, target: &PinKey) -> Status {
        let connection_type = self.policy.connection_type().to_string();
        if let Err(e) = self.can_connect(&connection_type, source, target) {
            warn!(error = %e, "skipping legacy connection");
            return Ok(());
        }
        let object = self.objects.create_object(&connection_type, None)?;
        self.objects
            .can_add(&connection_type, None, CHILDREN_PROPERTY, &PropertyIndex::End)?;
        self.objects
            .add_object(object, None, CHILDREN_PROPERTY, PropertyIndex::End)?;
        self.connect(object, source, target)
    }

    /// Hash over node positions and connections of `object`, for change
    /// detection alongside the object hash.
    pub fn get_meta_data_hash(&self, object: Uuid) -> u64 {
        let mut hasher = blake3::Hasher::new();
        if let Some(position) = self.get_node_pos(object) {
            hasher.update(&position.x.to_le_bytes());
            hasher.update(&position.y.to_le_bytes());
        }
        if let Some(connection) = self.get_connection(object) {
            hasher.update(connection.source.node.as_bytes());
            hasher.update(connection.source.name.as_bytes());
            hasher.update(connection.target.node.as_bytes());
            hasher.update(connection.target.name.as_bytes());
        }
        let mut first = [0u8; 8];
        first.copy_from_slice(&hasher.finalize().as_bytes()[..8]);
        u64::from_le_bytes(first)
    }

    // ---------------------------------------------------------------------
    // Clipboard
    // ---------------------------------------------------------------------

    /// Copy nodes together with the connections running between them.
    pub fn copy_selected_objects(&self, selection: &[Uuid]) -> DocumentResult<Option<AbstractObjectGraph>> {
        let nodes: Vec<Uuid> = selection.iter().copied().filter(|o| self.is_node(*o)).collect();
        if nodes.is_empty() {
            return Ok(None);
        }
        let copied: HashSet<Uuid> = nodes.iter().copied().collect();
        let mut connections: Vec<Connection> = nodes
            .iter()
            .flat_map(|node| self.get_node_connections(*node))
            .filter(|c| copied.contains(&c.source.node) && copied.contains(&c.target.node))
            .collect();
        connections.sort_by_key(|c| c.object);
        connections.dedup_by_key(|c| c.object);

        let mut graph = AbstractObjectGraph::new();
        let roots = nodes.iter().copied().chain(connections.iter().map(|c| c.object));
        for (order, object) in roots.enumerate() {
            add_object_to_graph(&self.objects, &mut graph, object, ROOT_NODE_NAME)?;
            if let Some(node) = graph.get_node_mut(object) {
                node.add_property(ORDER_PROPERTY, Variant::Int(order as i64));
            }
        }
        self.attach_meta_data_before_saving(&mut graph);
        Ok(Some(graph))
    }

    /// Commands placing pasted nodes and reconnecting pasted connections.
    /// With a picked position, the pasted nodes are shifted so that their
    /// average position lands there.
    pub fn paste_objects(
        &mut self,
        infos: &[PasteInfo],
        graph: &AbstractObjectGraph,
        picked_position: Option<Vec2>,
    ) -> DocumentResult<Vec<Box<dyn Command>>> {
        let pasted: HashSet<Uuid> = infos
            .iter()
            .map(|info| info.object)
            .filter(|object| self.objects.contains(*object))
            .collect();

        let offset = match picked_position {
            Some(picked) => {
                let positions: Vec<Vec2> = graph
                    .nodes()
                    .filter(|n| pasted.contains(&n.guid) && self.is_node(n.guid))
                    .filter_map(|n| n.find_property(META_NODE_POS).and_then(|p| p.value.as_vec2()))
                    .collect();
                if positions.is_empty() {
                    Vec2::ZERO
                } else {
                    let mean = positions.iter().copied().sum::<Vec2>() / positions.len() as f32;
                    picked - mean
                }
            }
            None => Vec2::ZERO,
        };

        self.restore_with_offset(graph, true, offset, Some(&pasted))
    }
}

/// Pin names generated from a property: an integer count yields
/// `pin[0]..pin[n-1]`, an array yields one pin per element, named by the
/// element if it is a non-empty string.
pub fn get_dynamic_pin_names(
    objects: &DocumentObjectManager,
    object: Uuid,
    property: &str,
    pin_name: &str,
) -> DocumentResult<Vec<String>> {
    let value = objects.get_value(object, property, &PropertyIndex::None)?;
    Ok(match value {
        Variant::Int(count) => (0..count.max(0)).map(|i| format!("{pin_name}[{i}]")).collect(),
        Variant::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| match item.as_str() {
                Some(name) if !name.is_empty() => name.to_string(),
                _ => format!("{pin_name}[{i}]"),
            })
            .collect(),
        _ => Vec::new(),
    })
}
