//! # Documents
//!
//! A document bundles an object manager with its selection and meta data,
//! and decides how pasted objects are placed. Commands only see documents
//! through the [`Document`] trait.

use crate::command::Command;
use crate::errors::DocumentResult;
use crate::metadata::ObjectMetaDataStore;
use crate::node_manager::{DocumentNodeManager, NodeGraphPolicy};
use crate::object_graph::{add_object_to_graph, AbstractObjectGraph, ORDER_PROPERTY, ROOT_NODE_NAME};
use crate::object_manager::{DocumentObjectManager, ObjectManagerPolicy, CHILDREN_PROPERTY, PREFAB_ROOT_TYPE};
use crate::selection::SelectionManager;
use glam::Vec2;
use plasma_reflection::{PropertyIndex, TypeRegistry, Variant};
use std::rc::Rc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub const OBJECTS_MIME: &str = "application/plasma.objects";
pub const NODES_MIME: &str = "application/plasma.nodes";
pub const PREFAB_MIME: &str = "application/plasma.prefab";

/// Status shown when some pasted objects could not be placed.
pub const NOT_ALL_PASTED: &str = "Not all objects could be pasted.";

/// One object to be placed by [`Document::paste`].
#[derive(Debug, Clone, PartialEq)]
pub struct PasteInfo {
    pub object: Uuid,
    /// Target parent, the root when `None`.
    pub parent: Option<Uuid>,
    pub index: PropertyIndex,
}

pub trait Document {
    fn object_manager(&self) -> &DocumentObjectManager;
    fn object_manager_mut(&mut self) -> &mut DocumentObjectManager;

    fn node_manager(&self) -> Option<&DocumentNodeManager> {
        None
    }

    fn node_manager_mut(&mut self) -> Option<&mut DocumentNodeManager> {
        None
    }

    fn selection(&self) -> &SelectionManager;
    fn selection_mut(&mut self) -> &mut SelectionManager;

    fn meta_data(&self) -> &ObjectMetaDataStore;
    fn meta_data_mut(&mut self) -> &mut ObjectMetaDataStore;

    /// Whether instantiated prefabs stay linked to their template.
    fn allows_prefabs(&self) -> bool {
        true
    }

    fn prefab_root_type(&self) -> &str {
        PREFAB_ROOT_TYPE
    }

    fn show_document_status(&mut self, message: &str) {
        info!(message, "document status");
    }

    /// Graph of the top-level selected objects, with its clipboard mime type.
    fn copy_selected_objects(&self) -> DocumentResult<Option<(AbstractObjectGraph, String)>> {
        let objects = self.object_manager();
        let selection = self.selection().top_level_selection(objects);
        Ok(copy_objects(objects, &selection)?.map(|mut graph| {
            self.meta_data().attach_meta_data(&mut graph);
            (graph, OBJECTS_MIME.to_string())
        }))
    }

    /// Place freshly created (detached) objects into the tree. Objects that
    /// cannot be placed are left detached. Returns follow-up commands the
    /// caller executes as sub-commands.
    fn paste(
        &mut self,
        infos: &mut [PasteInfo],
        graph: &AbstractObjectGraph,
        allow_picked_position: bool,
        mime: &str,
    ) -> DocumentResult<Vec<Box<dyn Command>>>;
}

/// Write `objects` as root nodes of a new graph, recording their order.
pub fn copy_objects(manager: &DocumentObjectManager, objects: &[Uuid]) -> DocumentResult<Option<AbstractObjectGraph>> {
    if objects.is_empty() {
        return Ok(None);
    }
    let mut graph = AbstractObjectGraph::new();
    for (order, object) in objects.iter().enumerate() {
        add_object_to_graph(manager, &mut graph, *object, ROOT_NODE_NAME)?;
        if let Some(node) = graph.get_node_mut(*object) {
            node.add_property(ORDER_PROPERTY, Variant::Int(order as i64));
        }
    }
    Ok(Some(graph))
}

/// Add each pasted object under its parent's `Children` property where
/// allowed. Returns how many were placed.
pub fn paste_into_children(manager: &mut DocumentObjectManager, infos: &[PasteInfo]) -> usize {
    let mut placed = 0;
    for info in infos {
        let Some(object) = manager.live_object(info.object) else {
            continue;
        };
        let type_name = object.type_name().to_string();
        match manager.can_add(&type_name, info.parent, CHILDREN_PROPERTY, &info.index) {
            Ok(()) => match manager.add_object(info.object, info.parent, CHILDREN_PROPERTY, info.index.clone()) {
                Ok(()) => placed += 1,
                Err(e) => warn!(object = %info.object, error = %e, "failed to paste object"),
            },
            Err(e) => warn!(object = %info.object, error = %e, "object cannot be pasted here"),
        }
    }
    placed
}

// -------------------------------------------------------------------------
// Object document
// -------------------------------------------------------------------------

/// Plain object-tree document.
#[derive(Debug)]
pub struct ObjectDocument {
    objects: DocumentObjectManager,
    selection: SelectionManager,
    meta_data: ObjectMetaDataStore,
    allows_prefabs: bool,
    last_status: Option<String>,
}

impl ObjectDocument {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self::from_manager(DocumentObjectManager::new(registry))
    }

    pub fn with_policy(registry: Arc<TypeRegistry>, policy: Rc<dyn ObjectManagerPolicy>) -> Self {
        Self::from_manager(DocumentObjectManager::with_policy(registry, policy))
    }

    fn from_manager(mut objects: DocumentObjectManager) -> Self {
        let selection = SelectionManager::new(&mut objects);
        Self {
            objects,
            selection,
            meta_data: ObjectMetaDataStore::new(),
            allows_prefabs: true,
            last_status: None,
        }
    }

    pub fn set_allows_prefabs(&mut self, allows: bool) {
        self.allows_prefabs = allows;
    }

    pub fn last_status(&self) -> Option<&str> {
        self.last_status.as_deref()
    }
}

impl Document for ObjectDocument {
    fn object_manager(&self) -> &DocumentObjectManager {
        &self.objects
    }

    fn object_manager_mut(&mut self) -> &mut DocumentObjectManager {
        &mut self.objects
    }

    fn selection(&self) -> &SelectionManager {
        &self.selection
    }

    fn selection_mut(&mut self) -> &mut SelectionManager {
        &mut self.selection
    }

    fn meta_data(&self) -> &ObjectMetaDataStore {
        &self.meta_data
    }

    fn meta_data_mut(&mut self) -> &mut ObjectMetaDataStore {
        &mut self.meta_data
    }

    fn allows_prefabs(&self) -> bool {
        self.allows_prefabs
    }

    fn show_document_status(&mut self, message: &str) {
        info!(message, "document status");
        self.last_status = Some(message.to_string());
    }

    fn paste(
        &mut self,
        infos: &mut [PasteInfo],
        _graph: &AbstractObjectGraph,
        _allow_picked_position: bool,
        _mime: &str,
    ) -> DocumentResult<Vec<Box<dyn Command>>> {
        let placed = paste_into_children(&mut self.objects, infos);
        if placed > 0 && placed < infos.len() {
            self.show_document_status(NOT_ALL_PASTED);
        }
        Ok(Vec::new())
    }
}

// -------------------------------------------------------------------------
// Node document
// -------------------------------------------------------------------------

/// Document whose objects form a node graph.
#[derive(Debug)]
pub struct NodeDocument {
    nodes: DocumentNodeManager,
    selection: SelectionManager,
    meta_data: ObjectMetaDataStore,
    picked_position: Option<Vec2>,
    last_status: Option<String>,
}

impl NodeDocument {
    pub fn new(registry: Arc<TypeRegistry>, policy: Rc<dyn NodeGraphPolicy>) -> Self {
        let mut nodes = DocumentNodeManager::new(registry, policy);
        let selection = SelectionManager::new(nodes.objects_mut());
        Self {
            nodes,
            selection,
            meta_data: ObjectMetaDataStore::new(),
            picked_position: None,
            last_status: None,
        }
    }

    /// Canvas position pasted nodes are moved to, when pasting allows it.
    pub fn set_picked_position(&mut self, position: Option<Vec2>) {
        self.picked_position = position;
    }

    pub fn nodes(&self) -> &DocumentNodeManager {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> &mut DocumentNodeManager {
        &mut self.nodes
    }

    pub fn last_status(&self) -> Option<&str> {
        self.last_status.as_deref()
    }
}

impl Document for NodeDocument {
    fn object_manager(&self) -> &DocumentObjectManager {
        self.nodes.objects()
    }

    fn object_manager_mut(&mut self) -> &mut DocumentObjectManager {
        self.nodes.objects_mut()
    }

    fn node_manager(&self) -> Option<&DocumentNodeManager> {
        Some(&self.nodes)
    }

    fn node_manager_mut(&mut self) -> Option<&mut DocumentNodeManager> {
        Some(&mut self.nodes)
    }

    fn selection(&self) -> &SelectionManager {
        &self.selection
    }

    fn selection_mut(&mut self) -> &mut SelectionManager {
        &mut self.selection
    }

    fn meta_data(&self) -> &ObjectMetaDataStore {
        &self.meta_data
    }

    fn meta_data_mut(&mut self) -> &mut ObjectMetaDataStore {
        &mut self.meta_data
    }

    /// Node graphs cannot nest prefabs.
    fn allows_prefabs(&self) -> bool {
        false
    }

    fn show_document_status(&mut self, message: &str) {
        info!(message, "document status");
        self.last_status = Some(message.to_string());
    }

    fn copy_selected_objects(&self) -> DocumentResult<Option<(AbstractObjectGraph, String)>> {
        let selection = self.selection.top_level_selection(self.nodes.objects());
        Ok(self.nodes.copy_selected_objects(&selection)?.map(|mut graph| {
            self.meta_data.attach_meta_data(&mut graph);
            (graph, NODES_MIME.to_string())
        }))
    }

    fn paste(
        &mut self,
        infos: &mut [PasteInfo],
        graph: &AbstractObjectGraph,
        allow_picked_position: bool,
        _mime: &str,
    ) -> DocumentResult<Vec<Box<dyn Command>>> {
        let placed = paste_into_children(self.nodes.objects_mut(), infos);
        if placed > 0 && placed < infos.len() {
            self.show_document_status(NOT_ALL_PASTED);
        }
        let picked = if allow_picked_position { self.picked_position } else { None };
        let commands = self.nodes.paste_objects(infos, graph, picked)?;

        let pasted_nodes: Vec<Uuid> = infos
            .iter()
            .map(|info| info.object)
            .filter(|object| self.nodes.objects().get_object(*object).is_some() && self.nodes.is_node(*object))
            .collect();
        if !pasted_nodes.is_empty() {
            if let Err(e) = self.selection.set_selection(self.nodes.objects(), &pasted_nodes) {
                warn!(error = %e, "pasted nodes could not all be selected");
            }
        }
        Ok(commands)
    }
}
