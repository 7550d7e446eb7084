//! # Abstract Object Graph
//!
//! Type-agnostic snapshot of a set of objects: one node per object with its
//! type, a name and its property values. Used for copy/paste, prefab
//! templates and saving.
//!
//! Object references inside property values are plain GUIDs. Remapping a
//! graph rewrites node GUIDs and every reference to a node inside the graph,
//! so a pasted copy gets fresh identities while keeping its internal links.

use crate::errors::{DocumentError, DocumentResult, Status};
use crate::object_manager::DocumentObjectManager;
use plasma_common::{combine_with_seed, revert_combination_with_seed};
use plasma_reflection::{PropertyCategory, PropertyDescriptor, PropertyIndex, Variant};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;
use uuid::Uuid;

/// Node name marking the top-level objects of a copied selection.
pub const ROOT_NODE_NAME: &str = "root";
/// Property recording the original order of top-level nodes.
pub const ORDER_PROPERTY: &str = "__Order";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbstractProperty {
    pub name: String,
    pub value: Variant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbstractObjectNode {
    pub guid: Uuid,
    pub type_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node_name: String,
    #[serde(default)]
    pub properties: Vec<AbstractProperty>,
}

impl AbstractObjectNode {
    pub fn find_property(&self, name: &str) -> Option<&AbstractProperty> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Add a property, replacing an existing one of the same name.
    pub fn add_property(&mut self, name: &str, value: Variant) {
        match self.properties.iter_mut().find(|p| p.name == name) {
            Some(property) => property.value = value,
            None => self.properties.push(AbstractProperty {
                name: name.to_string(),
                value,
            }),
        }
    }

    pub fn remove_property(&mut self, name: &str) -> Option<Variant> {
        let position = self.properties.iter().position(|p| p.name == name)?;
        Some(self.properties.remove(position).value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AbstractObjectGraph {
    nodes: BTreeMap<Uuid, AbstractObjectNode>,
}

impl AbstractObjectGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, guid: Uuid, type_name: &str, node_name: &str) -> &mut AbstractObjectNode {
        self.nodes.entry(guid).or_insert_with(|| AbstractObjectNode {
            guid,
            type_name: type_name.to_string(),
            node_name: node_name.to_string(),
            properties: Vec::new(),
        })
    }

    pub fn get_node(&self, guid: Uuid) -> Option<&AbstractObjectNode> {
        self.nodes.get(&guid)
    }

    pub fn get_node_mut(&mut self, guid: Uuid) -> Option<&mut AbstractObjectNode> {
        self.nodes.get_mut(&guid)
    }

    pub fn remove_node(&mut self, guid: Uuid) -> Option<AbstractObjectNode> {
        self.nodes.remove(&guid)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &AbstractObjectNode> {
        self.nodes.values()
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut AbstractObjectNode> {
        self.nodes.values_mut()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Top-level nodes (named [`ROOT_NODE_NAME`]) ordered by their
    /// [`ORDER_PROPERTY`], falling back to graph order.
    pub fn root_nodes(&self) -> Vec<&AbstractObjectNode> {
        let mut roots: Vec<_> = self
            .nodes
            .values()
            .filter(|node| node.node_name == ROOT_NODE_NAME)
            .enumerate()
            .map(|(position, node)| {
                let order = node
                    .find_property(ORDER_PROPERTY)
                    .and_then(|p| p.value.as_int())
                    .unwrap_or(position as i64);
                (order, node)
            })
            .collect();
        roots.sort_by_key(|(order, _)| *order);
        roots.into_iter().map(|(_, node)| node).collect()
    }

    /// Give every node a new GUID derived from `seed`, rewriting references
    /// between nodes. With `revert`, undoes an earlier remap with the same seed.
    pub fn remap_node_guids(&mut self, seed: Uuid, revert: bool) {
        let remap = |guid: Uuid| {
            if revert {
                revert_combination_with_seed(guid, seed)
            } else {
                combine_with_seed(guid, seed)
            }
        };

        let old_nodes = std::mem::take(&mut self.nodes);
        let known: std::collections::HashSet<Uuid> = old_nodes.keys().copied().collect();
        for (guid, mut node) in old_nodes {
            node.guid = remap(guid);
            for property in &mut node.properties {
                property.value.for_each_uuid_mut(&mut |reference: &mut Uuid| {
                    if !reference.is_nil() && known.contains(reference) {
                        *reference = remap(*reference);
                    }
                });
            }
            self.nodes.insert(node.guid, node);
        }
    }

    pub fn to_text(&self) -> DocumentResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_text(text: &str) -> DocumentResult<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

// -------------------------------------------------------------------------
// Writing
// -------------------------------------------------------------------------

/// Write `object` and its owned sub-tree into `graph`. Only the first node
/// gets `node_name`. Temporary properties and their children are skipped.
pub fn add_object_to_graph(
    manager: &DocumentObjectManager,
    graph: &mut AbstractObjectGraph,
    object: Uuid,
    node_name: &str,
) -> Status {
    let source = manager
        .live_object(object)
        .ok_or(DocumentError::ObjectNotFound(object))?;
    let descriptor = source.type_descriptor().clone();

    let mut children = Vec::new();
    let node = graph.add_node(object, source.type_name(), node_name);
    for property in descriptor.all_properties() {
        if property.flags.temporary {
            continue;
        }
        let value = source.accessor().get_value(&property.name, &PropertyIndex::None)?;
        if property.flags.holds_objects() {
            collect_object_references(&value, &mut children);
        }
        node.add_property(&property.name, value);
    }

    for child in children {
        add_object_to_graph(manager, graph, child, "")?;
    }
    Ok(())
}

fn collect_object_references(value: &Variant, out: &mut Vec<Uuid>) {
    match value {
        Variant::Uuid(guid) if !guid.is_nil() => out.push(*guid),
        Variant::Array(items) => items.iter().for_each(|item| collect_object_references(item, out)),
        Variant::Dictionary(items) => items.values().for_each(|item| collect_object_references(item, out)),
        _ => {}
    }
}

// -------------------------------------------------------------------------
// Reading
// -------------------------------------------------------------------------

/// Create a detached object (and its owned sub-tree) from a graph node. The
/// object keeps the node's GUID.
pub fn create_object_from_node(
    manager: &mut DocumentObjectManager,
    graph: &AbstractObjectGraph,
    node: Uuid,
) -> DocumentResult<Uuid> {
    let source = graph
        .get_node(node)
        .ok_or_else(|| DocumentError::Graph(format!("Node {node} is not part of the graph")))?;
    if !manager.registry().contains(&source.type_name) {
        warn!(node = %node, type_name = %source.type_name, "graph node has an unknown type");
        return Err(DocumentError::TypeNotFound(source.type_name.clone()));
    }
    let object = manager.create_object(&source.type_name, Some(node))?;
    apply_properties_to_object(manager, graph, source, object)?;
    Ok(object)
}

/// Apply the values of `node` onto an existing object without events.
/// Embedded members are applied onto the object's existing sub-objects,
/// owned children are created from their nodes.
pub fn apply_properties_to_object(
    manager: &mut DocumentObjectManager,
    graph: &AbstractObjectGraph,
    node: &AbstractObjectNode,
    object: Uuid,
) -> Status {
    let descriptor = manager
        .live_object(object)
        .ok_or(DocumentError::ObjectNotFound(object))?
        .type_descriptor()
        .clone();

    for property in &node.properties {
        let Some(target) = descriptor.find_property(&property.name) else {
            if property.name != ORDER_PROPERTY && !property.name.starts_with("Meta") && !property.name.contains("::") {
                warn!(property = %property.name, type_name = %descriptor.name, "graph property does not exist on type");
            }
            continue;
        };
        if target.flags.temporary {
            continue;
        }

        if target.flags.is_value_type() {
            write_whole_value(manager, object, target, &property.value)?;
        } else if target.flags.is_embedded_class() {
            let existing = manager.get_value(object, &target.name, &PropertyIndex::None)?.as_uuid();
            let sub_node = property.value.as_uuid().and_then(|guid| graph.get_node(guid));
            if let (Some(existing), Some(sub_node)) = (existing, sub_node) {
                if !existing.is_nil() {
                    apply_properties_to_object(manager, graph, sub_node, existing)?;
                }
            }
        } else {
            for (index, child_node) in owned_references(target, &property.value) {
                if graph.get_node(child_node).is_none() {
                    warn!(node = %child_node, property = %target.name, "referenced child node is missing");
                    continue;
                }
                let child = create_object_from_node(manager, graph, child_node)?;
                manager.attach_sub_object(object, child, &target.name, &index)?;
            }
        }
    }
    Ok(())
}

fn owned_references(property: &PropertyDescriptor, value: &Variant) -> Vec<(PropertyIndex, Uuid)> {
    let valid = |guid: Option<Uuid>| guid.filter(|g| !g.is_nil());
    match property.category {
        PropertyCategory::Member => valid(value.as_uuid())
            .map(|guid| vec![(PropertyIndex::None, guid)])
            .unwrap_or_default(),
        PropertyCategory::Array | PropertyCategory::Set => value
            .as_array()
            .unwrap_or_default()
            .iter()
            .filter_map(|item| valid(item.as_uuid()))
            .map(|guid| (PropertyIndex::End, guid))
            .collect(),
        PropertyCategory::Map => value
            .as_dictionary()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|(key, item)| valid(item.as_uuid()).map(|guid| (PropertyIndex::Key(key.clone()), guid)))
                    .collect()
            })
            .unwrap_or_default(),
    }
}

fn write_whole_value(
    manager: &mut DocumentObjectManager,
    object: Uuid,
    property: &PropertyDescriptor,
    value: &Variant,
) -> Status {
    let accessor = manager.accessor_mut(object)?;
    match property.category {
        PropertyCategory::Member => accessor.set_value(&property.name, value.clone(), &PropertyIndex::None)?,
        PropertyCategory::Array | PropertyCategory::Set => {
            for item in value.as_array().unwrap_or_default() {
                accessor.insert_value(&property.name, &PropertyIndex::End, item.clone())?;
            }
        }
        PropertyCategory::Map => {
            if let Some(items) = value.as_dictionary() {
                for (key, item) in items {
                    let index = PropertyIndex::Key(key.clone());
                    if accessor.get_value(&property.name, &index).is_ok() {
                        accessor.set_value(&property.name, item.clone(), &index)?;
                    } else {
                        accessor.insert_value(&property.name, &index, item.clone())?;
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_manager::CHILDREN_PROPERTY;
    use plasma_reflection::{TypeDescriptor, TypeRegistry, VariantType};
    use std::sync::Arc;

    fn manager() -> DocumentObjectManager {
        let registry = Arc::new(TypeRegistry::new());
        registry.register(TypeDescriptor::new("Offset").with_property(PropertyDescriptor::member("X", VariantType::Float)));
        registry.register(
            TypeDescriptor::new("Item")
                .with_property(PropertyDescriptor::member("Name", VariantType::String))
                .with_property(PropertyDescriptor::values("Tags", PropertyCategory::Array, VariantType::String))
                .with_property(PropertyDescriptor::member("Scratch", VariantType::Int).temporary())
                .with_property(PropertyDescriptor::embedded("Offset", "Offset"))
                .with_property(PropertyDescriptor::owned_objects("Items", PropertyCategory::Array, None)),
        );
        DocumentObjectManager::new(registry)
    }

    fn build_item(m: &mut DocumentObjectManager, name: &str) -> Uuid {
        let item = m.create_object("Item", None).unwrap();
        m.add_object(item, None, CHILDREN_PROPERTY, PropertyIndex::End).unwrap();
        m.set_value(item, "Name", name.into(), PropertyIndex::None).unwrap();
        m.insert_value(item, "Tags", "a".into(), PropertyIndex::End).unwrap();
        m.set_value(item, "Scratch", Variant::Int(9), PropertyIndex::None).unwrap();
        let offset = m.get_value(item, "Offset", &PropertyIndex::None).unwrap().as_uuid().unwrap();
        m.set_value(offset, "X", Variant::Float(2.5), PropertyIndex::None).unwrap();
        item
    }

    #[test]
    fn test_writer_includes_subtree_without_temporaries() {
        let mut m = manager();
        let item = build_item(&mut m, "outer");
        let child = m.create_object("Item", None).unwrap();
        m.add_object(child, Some(item), "Items", PropertyIndex::End).unwrap();

        let mut graph = AbstractObjectGraph::new();
        add_object_to_graph(&m, &mut graph, item, ROOT_NODE_NAME).unwrap();

        // item, its offset, child, child's offset
        assert_eq!(graph.len(), 4);
        let node = graph.get_node(item).unwrap();
        assert_eq!(node.node_name, ROOT_NODE_NAME);
        assert!(node.find_property("Scratch").is_none());
        assert_eq!(graph.get_node(child).unwrap().node_name, "");
    }

    #[test]
    fn test_remap_keeps_internal_references() {
        let mut m = manager();
        let item = build_item(&mut m, "outer");
        let mut graph = AbstractObjectGraph::new();
        add_object_to_graph(&m, &mut graph, item, ROOT_NODE_NAME).unwrap();
        graph
            .get_node_mut(item)
            .unwrap()
            .add_property("External", Variant::Uuid(Uuid::from_u128(77)));

        let seed = Uuid::new_v4();
        graph.remap_node_guids(seed, false);
        let new_item = combine_with_seed(item, seed);
        let node = graph.get_node(new_item).unwrap();
        let offset = node.find_property("Offset").unwrap().value.as_uuid().unwrap();
        assert!(graph.get_node(offset).is_some());
        assert_eq!(node.find_property("External").unwrap().value, Variant::Uuid(Uuid::from_u128(77)));

        graph.remap_node_guids(seed, true);
        assert!(graph.get_node(item).is_some());
    }

    #[test]
    fn test_reader_recreates_values() {
        let mut m = manager();
        let item = build_item(&mut m, "outer");
        let child = m.create_object("Item", None).unwrap();
        m.add_object(child, Some(item), "Items", PropertyIndex::End).unwrap();
        let mut graph = AbstractObjectGraph::new();
        add_object_to_graph(&m, &mut graph, item, ROOT_NODE_NAME).unwrap();
        let text = graph.to_text().unwrap();

        let mut graph = AbstractObjectGraph::from_text(&text).unwrap();
        graph.remap_node_guids(Uuid::new_v4(), false);
        let root = graph.root_nodes()[0].guid;
        let copy = create_object_from_node(&mut m, &graph, root).unwrap();

        assert_eq!(m.get_value(copy, "Name", &PropertyIndex::None).unwrap(), "outer".into());
        assert_eq!(m.count(copy, "Tags").unwrap(), 1);
        let offset = m.get_value(copy, "Offset", &PropertyIndex::None).unwrap().as_uuid().unwrap();
        assert_eq!(m.get_value(offset, "X", &PropertyIndex::None).unwrap(), Variant::Float(2.5));
        assert_eq!(m.children_in(copy, "Items").unwrap().len(), 1);
        assert!(!m.contains(copy));
    }

    #[test]
    fn test_root_nodes_follow_order_property() {
        let mut graph = AbstractObjectGraph::new();
        let first = Uuid::from_u128(2);
        let second = Uuid::from_u128(1);
        graph.add_node(first, "Item", ROOT_NODE_NAME).add_property(ORDER_PROPERTY, Variant::Int(0));
        graph.add_node(second, "Item", ROOT_NODE_NAME).add_property(ORDER_PROPERTY, Variant::Int(1));
        graph.add_node(Uuid::from_u128(3), "Item", "");

        let roots: Vec<_> = graph.root_nodes().iter().map(|n| n.guid).collect();
        assert_eq!(roots, vec![first, second]);
    }

    #[test]
    fn test_unknown_type_is_reported() {
        let mut m = manager();
        let mut graph = AbstractObjectGraph::new();
        graph.add_node(Uuid::from_u128(5), "Missing", ROOT_NODE_NAME);
        let result = create_object_from_node(&mut m, &graph, Uuid::from_u128(5));
        assert!(matches!(result, Err(DocumentError::TypeNotFound(_))));
    }
}
