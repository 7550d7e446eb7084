//! Commands editing the object tree and property values.

use crate::command::{Command, CommandContext, CommandState};
use crate::document::{Document, PasteInfo, PREFAB_MIME};
use crate::errors::{DocumentError, Status};
use crate::object_graph::{create_object_from_node, AbstractObjectGraph};
use crate::object_manager::{DocumentObjectManager, CHILDREN_PROPERTY};
use plasma_common::make_uuid;
use plasma_reflection::{PropertyIndex, Variant};
use tracing::warn;
use uuid::Uuid;

fn resolve_index(manager: &DocumentObjectManager, object: Uuid, property: &str, index: &PropertyIndex) -> PropertyIndex {
    let ordered = manager
        .live_object(object)
        .and_then(|o| o.accessor().find_property(property))
        .map(|p| p.category.is_ordered())
        .unwrap_or(false);
    match (ordered, manager.count(object, property)) {
        (true, Ok(count)) => index.resolve_end(count),
        _ => index.clone(),
    }
}

fn destroy_detached(manager: &mut DocumentObjectManager, object: Uuid) {
    if manager.live_object(object).is_some() && !manager.contains(object) {
        if let Err(e) = manager.destroy_object(object) {
            warn!(object = %object, error = %e, "failed to destroy object during cleanup");
        }
    }
}

// -------------------------------------------------------------------------
// Structure
// -------------------------------------------------------------------------

/// Create an object and add it to the tree.
#[derive(Debug)]
pub struct AddObjectCommand {
    type_name: String,
    parent: Option<Uuid>,
    property: String,
    index: PropertyIndex,
    guid: Uuid,
}

impl AddObjectCommand {
    pub fn new(type_name: &str, parent: Option<Uuid>, property: &str, index: PropertyIndex) -> Self {
        Self {
            type_name: type_name.to_string(),
            parent,
            property: property.to_string(),
            index,
            guid: make_uuid(),
        }
    }

    /// Use a fixed GUID for the new object.
    pub fn with_guid(mut self, guid: Uuid) -> Self {
        self.guid = guid;
        self
    }

    /// GUID the object is (or will be) created with.
    pub fn guid(&self) -> Uuid {
        self.guid
    }
}

impl Command for AddObjectCommand {
    fn do_internal(&mut self, ctx: &mut CommandContext<'_>, redo: bool) -> Status {
        let objects = ctx.objects();
        if !redo {
            objects.can_add(&self.type_name, self.parent, &self.property, &self.index)?;
            let parent = self.parent.unwrap_or(objects.root());
            self.index = resolve_index(objects, parent, &self.property, &self.index);
            objects.create_object(&self.type_name, Some(self.guid))?;
        }
        objects.add_object(self.guid, self.parent, &self.property, self.index.clone())
    }

    fn undo_internal(&mut self, document: &mut dyn Document, fire_events: bool) -> Status {
        debug_assert!(fire_events, "Adding objects cannot be rewound without events");
        let objects = document.object_manager_mut();
        objects.can_remove(self.guid)?;
        objects.remove_object(self.guid)
    }

    fn cleanup_internal(&mut self, document: &mut dyn Document, state: CommandState) {
        if state == CommandState::WasUndone {
            destroy_detached(document.object_manager_mut(), self.guid);
        }
    }
}

/// Remove an object (and its sub-tree) from the tree.
#[derive(Debug)]
pub struct RemoveObjectCommand {
    object: Uuid,
    parent: Option<Uuid>,
    property: String,
    index: PropertyIndex,
}

impl RemoveObjectCommand {
    pub fn new(object: Uuid) -> Self {
        Self {
            object,
            parent: None,
            property: String::new(),
            index: PropertyIndex::None,
        }
    }
}

impl Command for RemoveObjectCommand {
    fn do_internal(&mut self, ctx: &mut CommandContext<'_>, redo: bool) -> Status {
        let objects = ctx.objects();
        objects.can_remove(self.object)?;
        if !redo {
            let object = objects
                .get_object(self.object)
                .ok_or(DocumentError::ObjectNotFound(self.object))?;
            self.parent = object.parent();
            self.property = object.parent_property().to_string();
            self.index = objects.property_index(self.object).unwrap_or_default();
        }
        objects.remove_object(self.object)
    }

    fn undo_internal(&mut self, document: &mut dyn Document, fire_events: bool) -> Status {
        debug_assert!(fire_events, "Removing objects cannot be rewound without events");
        let objects = document.object_manager_mut();
        let type_name = objects
            .live_object(self.object)
            .ok_or(DocumentError::ObjectNotFound(self.object))?
            .type_name()
            .to_string();
        objects.can_add(&type_name, self.parent, &self.property, &self.index)?;
        objects.add_object(self.object, self.parent, &self.property, self.index.clone())
    }

    fn cleanup_internal(&mut self, document: &mut dyn Document, state: CommandState) {
        if state == CommandState::WasDone {
            destroy_detached(document.object_manager_mut(), self.object);
        }
    }
}

/// Move an object to another parent or position.
#[derive(Debug)]
pub struct MoveObjectCommand {
    object: Uuid,
    new_parent: Option<Uuid>,
    property: String,
    index: PropertyIndex,
    old_parent: Option<Uuid>,
    old_property: String,
    old_index: PropertyIndex,
}

impl MoveObjectCommand {
    pub fn new(object: Uuid, new_parent: Option<Uuid>, property: &str, index: PropertyIndex) -> Self {
        Self {
            object,
            new_parent,
            property: property.to_string(),
            index,
            old_parent: None,
            old_property: String::new(),
            old_index: PropertyIndex::None,
        }
    }
}

impl Command for MoveObjectCommand {
    fn do_internal(&mut self, ctx: &mut CommandContext<'_>, redo: bool) -> Status {
        let objects = ctx.objects();
        if !redo {
            objects.can_move(self.object, self.new_parent, &self.property, &self.index)?;
            let object = objects
                .get_object(self.object)
                .ok_or(DocumentError::ObjectNotFound(self.object))?;
            self.old_parent = object.parent();
            self.old_property = object.parent_property().to_string();
            self.old_index = objects.property_index(self.object).unwrap_or_default();
            let parent = self.new_parent.unwrap_or(objects.root());
            self.new_parent = Some(parent);
            self.index = resolve_index(objects, parent, &self.property, &self.index);
        } else {
            objects.can_move(self.object, self.new_parent, &self.property, &self.index)?;
        }
        objects.move_object(self.object, self.new_parent, &self.property, self.index.clone())
    }

    fn undo_internal(&mut self, document: &mut dyn Document, _fire_events: bool) -> Status {
        let objects = document.object_manager_mut();
        let mut target = self.old_index.clone();
        let same_container = self.old_parent == self.new_parent && self.old_property == self.property;
        if same_container {
            // The object now sits in front of its old slot; account for it
            // being taken out before re-insertion.
            if let (Some(old), Some(new)) = (self.old_index.position(), self.index.position()) {
                if new < old {
                    target = PropertyIndex::Position(old + 1);
                }
            }
        }
        objects.can_move(self.object, self.old_parent, &self.old_property, &target)?;
        objects.move_object(self.object, self.old_parent, &self.old_property, target)
    }
}

// -------------------------------------------------------------------------
// Properties
// -------------------------------------------------------------------------

#[derive(Debug)]
pub struct SetObjectPropertyCommand {
    object: Uuid,
    property: String,
    value: Variant,
    index: PropertyIndex,
    old_value: Variant,
}

impl SetObjectPropertyCommand {
    pub fn new(object: Uuid, property: &str, value: Variant, index: PropertyIndex) -> Self {
        Self {
            object,
            property: property.to_string(),
            value,
            index,
            old_value: Variant::Invalid,
        }
    }
}

impl Command for SetObjectPropertyCommand {
    fn do_internal(&mut self, ctx: &mut CommandContext<'_>, redo: bool) -> Status {
        let objects = ctx.objects();
        if !redo {
            let object = objects
                .live_object(self.object)
                .ok_or(DocumentError::ObjectNotFound(self.object))?;
            let descriptor =
                object
                    .accessor()
                    .find_property(&self.property)
                    .ok_or_else(|| DocumentError::PropertyNotFound {
                        property: self.property.clone(),
                        type_name: object.type_name().to_string(),
                    })?;
            if descriptor.flags.pointer_owner {
                return Err(DocumentError::Command(format!(
                    "Set Property: Property '{}' owns its objects, use AddObjectCommand instead",
                    self.property
                )));
            }
            if descriptor.flags.temporary {
                return Err(DocumentError::Command(format!(
                    "Set Property: Property '{}' is temporary and cannot be changed through commands",
                    self.property
                )));
            }
            self.old_value = objects.get_value(self.object, &self.property, &self.index)?;
        }
        objects.set_value(self.object, &self.property, self.value.clone(), self.index.clone())
    }

    fn undo_internal(&mut self, document: &mut dyn Document, fire_events: bool) -> Status {
        let objects = document.object_manager_mut();
        if fire_events {
            objects.set_value(self.object, &self.property, self.old_value.clone(), self.index.clone())
        } else {
            objects
                .accessor_mut(self.object)?
                .set_value(&self.property, self.old_value.clone(), &self.index)?;
            Ok(())
        }
    }
}

#[derive(Debug)]
pub struct InsertObjectPropertyCommand {
    object: Uuid,
    property: String,
    value: Variant,
    index: PropertyIndex,
}

impl InsertObjectPropertyCommand {
    pub fn new(object: Uuid, property: &str, value: Variant, index: PropertyIndex) -> Self {
        Self {
            object,
            property: property.to_string(),
            value,
            index,
        }
    }
}

impl Command for InsertObjectPropertyCommand {
    fn do_internal(&mut self, ctx: &mut CommandContext<'_>, redo: bool) -> Status {
        let objects = ctx.objects();
        if !redo {
            self.index = resolve_index(objects, self.object, &self.property, &self.index);
        }
        objects.insert_value(self.object, &self.property, self.value.clone(), self.index.clone())
    }

    fn undo_internal(&mut self, document: &mut dyn Document, _fire_events: bool) -> Status {
        document
            .object_manager_mut()
            .remove_value(self.object, &self.property, self.index.clone())
    }
}

#[derive(Debug)]
pub struct RemoveObjectPropertyCommand {
    object: Uuid,
    property: String,
    index: PropertyIndex,
    old_value: Variant,
}

impl RemoveObjectPropertyCommand {
    pub fn new(object: Uuid, property: &str, index: PropertyIndex) -> Self {
        Self {
            object,
            property: property.to_string(),
            index,
            old_value: Variant::Invalid,
        }
    }
}

impl Command for RemoveObjectPropertyCommand {
    fn do_internal(&mut self, ctx: &mut CommandContext<'_>, redo: bool) -> Status {
        let objects = ctx.objects();
        if !redo {
            self.old_value = objects.get_value(self.object, &self.property, &self.index)?;
        }
        objects.remove_value(self.object, &self.property, self.index.clone())
    }

    fn undo_internal(&mut self, document: &mut dyn Document, _fire_events: bool) -> Status {
        document.object_manager_mut().insert_value(
            self.object,
            &self.property,
            self.old_value.clone(),
            self.index.clone(),
        )
    }
}

/// Move a value inside an array or set property.
#[derive(Debug)]
pub struct MoveObjectPropertyCommand {
    object: Uuid,
    property: String,
    old_index: PropertyIndex,
    new_index: PropertyIndex,
}

impl MoveObjectPropertyCommand {
    pub fn new(object: Uuid, property: &str, old_index: PropertyIndex, new_index: PropertyIndex) -> Self {
        Self {
            object,
            property: property.to_string(),
            old_index,
            new_index,
        }
    }
}

impl Command for MoveObjectPropertyCommand {
    fn do_internal(&mut self, ctx: &mut CommandContext<'_>, redo: bool) -> Status {
        let objects = ctx.objects();
        if !redo {
            self.new_index = resolve_index(objects, self.object, &self.property, &self.new_index);
        }
        objects.move_value(
            self.object,
            &self.property,
            self.old_index.clone(),
            self.new_index.clone(),
        )
    }

    fn undo_internal(&mut self, document: &mut dyn Document, _fire_events: bool) -> Status {
        let (Some(old), Some(new)) = (self.old_index.position(), self.new_index.position()) else {
            return Err(DocumentError::Command(
                "Move Property: only positional indices can be moved".to_string(),
            ));
        };
        let (from, to) = if new > old { (new - 1, old) } else { (new, old + 1) };
        document.object_manager_mut().move_value(
            self.object,
            &self.property,
            PropertyIndex::Position(from),
            PropertyIndex::Position(to),
        )
    }
}

/// Set an array element, growing the array with default values as needed.
#[derive(Debug)]
pub struct ResizeAndSetObjectPropertyCommand {
    object: Uuid,
    property: String,
    index: usize,
    value: Variant,
}

impl ResizeAndSetObjectPropertyCommand {
    pub fn new(object: Uuid, property: &str, index: usize, value: Variant) -> Self {
        Self {
            object,
            property: property.to_string(),
            index,
            value,
        }
    }
}

impl Command for ResizeAndSetObjectPropertyCommand {
    fn do_internal(&mut self, ctx: &mut CommandContext<'_>, redo: bool) -> Status {
        if redo {
            return Ok(());
        }
        let count = ctx.objects().count(self.object, &self.property)?;
        let filler = Variant::default_of(self.value.variant_type());
        for position in count..=self.index {
            ctx.add_sub_command(Box::new(InsertObjectPropertyCommand::new(
                self.object,
                &self.property,
                filler.clone(),
                PropertyIndex::Position(position),
            )))?;
        }
        ctx.add_sub_command(Box::new(SetObjectPropertyCommand::new(
            self.object,
            &self.property,
            self.value.clone(),
            PropertyIndex::Position(self.index),
        )))
    }

    fn undo_internal(&mut self, _document: &mut dyn Document, _fire_events: bool) -> Status {
        Ok(())
    }
}

// -------------------------------------------------------------------------
// Paste and prefabs
// -------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct PastedObject {
    object: Uuid,
    parent: Option<Uuid>,
    property: String,
    index: PropertyIndex,
}

fn record_pasted(manager: &mut DocumentObjectManager, objects: &[Uuid]) -> Vec<PastedObject> {
    let mut pasted = Vec::new();
    for object in objects {
        match manager.get_object(*object) {
            Some(attached) if attached.parent().is_some() => pasted.push(PastedObject {
                object: *object,
                parent: attached.parent(),
                property: attached.parent_property().to_string(),
                index: manager.property_index(*object).unwrap_or_default(),
            }),
            _ => destroy_detached(manager, *object),
        }
    }
    pasted.sort_by_key(|p| p.index.position().unwrap_or(usize::MAX));
    pasted
}

fn readd_pasted(manager: &mut DocumentObjectManager, pasted: &[PastedObject]) -> Status {
    for p in pasted {
        let type_name = manager
            .live_object(p.object)
            .ok_or(DocumentError::ObjectNotFound(p.object))?
            .type_name()
            .to_string();
        manager.can_add(&type_name, p.parent, &p.property, &p.index)?;
        manager.add_object(p.object, p.parent, &p.property, p.index.clone())?;
    }
    Ok(())
}

fn remove_pasted(manager: &mut DocumentObjectManager, pasted: &[PastedObject]) -> Status {
    for p in pasted.iter().rev() {
        manager.can_remove(p.object)?;
        manager.remove_object(p.object)?;
    }
    Ok(())
}

/// Paste a copied object graph under `parent`.
#[derive(Debug)]
pub struct PasteObjectsCommand {
    parent: Option<Uuid>,
    graph_text: String,
    mime: String,
    allow_picked_position: bool,
    pasted: Vec<PastedObject>,
}

impl PasteObjectsCommand {
    pub fn new(parent: Option<Uuid>, graph_text: impl Into<String>, mime: &str) -> Self {
        Self {
            parent,
            graph_text: graph_text.into(),
            mime: mime.to_string(),
            allow_picked_position: true,
            pasted: Vec::new(),
        }
    }

    pub fn with_picked_position(mut self, allow: bool) -> Self {
        self.allow_picked_position = allow;
        self
    }

    /// Objects that ended up in the tree, in index order.
    pub fn pasted_objects(&self) -> Vec<Uuid> {
        self.pasted.iter().map(|p| p.object).collect()
    }
}

impl Command for PasteObjectsCommand {
    fn do_internal(&mut self, ctx: &mut CommandContext<'_>, redo: bool) -> Status {
        if redo {
            return readd_pasted(ctx.objects(), &self.pasted);
        }

        let mut graph = AbstractObjectGraph::from_text(&self.graph_text)?;
        graph.remap_node_guids(make_uuid(), false);

        let roots: Vec<Uuid> = graph.root_nodes().iter().map(|node| node.guid).collect();
        let mut infos = Vec::with_capacity(roots.len());
        for root in roots {
            match create_object_from_node(ctx.objects(), &graph, root) {
                Ok(object) => infos.push(PasteInfo {
                    object,
                    parent: self.parent,
                    index: PropertyIndex::End,
                }),
                Err(e) => warn!(node = %root, error = %e, "skipping node that cannot be pasted"),
            }
        }
        ctx.document().meta_data_mut().restore_meta_data(&graph);

        let follow_ups = ctx
            .document()
            .paste(&mut infos, &graph, self.allow_picked_position, &self.mime)?;
        let created: Vec<Uuid> = infos.iter().map(|info| info.object).collect();
        self.pasted = record_pasted(ctx.objects(), &created);
        if self.pasted.is_empty() {
            return Err(DocumentError::Command("Paste Objects: nothing was pasted!".to_string()));
        }

        for command in follow_ups {
            ctx.add_sub_command(command)?;
        }
        Ok(())
    }

    fn undo_internal(&mut self, document: &mut dyn Document, _fire_events: bool) -> Status {
        remove_pasted(document.object_manager_mut(), &self.pasted)
    }

    fn cleanup_internal(&mut self, document: &mut dyn Document, state: CommandState) {
        if state == CommandState::WasUndone {
            for p in &self.pasted {
                destroy_detached(document.object_manager_mut(), p.object);
            }
        }
    }
}

/// Instantiate a prefab template under `parent`, wrapped in a prefab root
/// object that remembers where it came from.
#[derive(Debug)]
pub struct InstantiatePrefabCommand {
    parent: Option<Uuid>,
    index: PropertyIndex,
    create_from_prefab: Uuid,
    base_prefab_graph: String,
    remap_guid: Uuid,
    allow_picked_position: bool,
    pasted: Vec<PastedObject>,
}

impl InstantiatePrefabCommand {
    pub fn new(parent: Option<Uuid>, create_from_prefab: Uuid, base_prefab_graph: impl Into<String>) -> Self {
        Self {
            parent,
            index: PropertyIndex::End,
            create_from_prefab,
            base_prefab_graph: base_prefab_graph.into(),
            remap_guid: make_uuid(),
            allow_picked_position: true,
            pasted: Vec::new(),
        }
    }

    /// Seed for the template's GUIDs; also the GUID of the created root.
    /// A nil seed is replaced by a fresh one.
    pub fn with_remap_guid(mut self, remap_guid: Uuid) -> Self {
        self.remap_guid = if remap_guid.is_nil() { make_uuid() } else { remap_guid };
        self
    }

    pub fn with_index(mut self, index: PropertyIndex) -> Self {
        self.index = index;
        self
    }

    pub fn with_picked_position(mut self, allow: bool) -> Self {
        self.allow_picked_position = allow;
        self
    }

    pub fn created_root_object(&self) -> Uuid {
        self.remap_guid
    }
}

impl Command for InstantiatePrefabCommand {
    fn do_internal(&mut self, ctx: &mut CommandContext<'_>, redo: bool) -> Status {
        if redo {
            return readd_pasted(ctx.objects(), &self.pasted);
        }
        if self.create_from_prefab.is_nil() {
            return Err(DocumentError::Command(
                "Instantiate Prefab: no prefab template given".to_string(),
            ));
        }

        let mut graph = AbstractObjectGraph::from_text(&self.base_prefab_graph)?;
        graph.remap_node_guids(self.remap_guid, false);

        let root_type = ctx.document().prefab_root_type().to_string();
        let objects = ctx.objects();
        let root = objects.create_object(&root_type, Some(self.remap_guid))?;
        let nodes: Vec<Uuid> = graph.root_nodes().iter().map(|node| node.guid).collect();
        for node in nodes {
            match create_object_from_node(objects, &graph, node) {
                Ok(child) => objects.attach_sub_object(root, child, CHILDREN_PROPERTY, &PropertyIndex::End)?,
                Err(e) => warn!(node = %node, error = %e, "skipping prefab node"),
            }
        }

        let mut infos = vec![PasteInfo {
            object: root,
            parent: self.parent,
            index: self.index.clone(),
        }];
        let follow_ups = ctx
            .document()
            .paste(&mut infos, &graph, self.allow_picked_position, PREFAB_MIME)?;
        self.pasted = record_pasted(ctx.objects(), &[root]);
        if self.pasted.is_empty() {
            return Err(DocumentError::Command(
                "Instantiate Prefab: the prefab could not be placed here".to_string(),
            ));
        }

        let document = ctx.document();
        if document.allows_prefabs() {
            let (from_prefab, seed, base) = (
                self.create_from_prefab,
                self.remap_guid,
                self.base_prefab_graph.clone(),
            );
            document.meta_data_mut().modify(root, |meta| {
                meta.create_from_prefab = from_prefab;
                meta.prefab_seed_guid = seed;
                meta.base_prefab = base;
            });
        } else {
            document.show_document_status(
                "Nested prefabs are not allowed. Instantiated object will not be linked to prefab template.",
            );
        }

        for command in follow_ups {
            ctx.add_sub_command(command)?;
        }
        Ok(())
    }

    fn undo_internal(&mut self, document: &mut dyn Document, _fire_events: bool) -> Status {
        remove_pasted(document.object_manager_mut(), &self.pasted)
    }

    fn cleanup_internal(&mut self, document: &mut dyn Document, state: CommandState) {
        if state == CommandState::WasUndone {
            for p in &self.pasted {
                destroy_detached(document.object_manager_mut(), p.object);
                document.meta_data_mut().clear(p.object);
            }
        }
    }
}

/// Drop the prefab link of an instantiated object.
#[derive(Debug)]
pub struct UnlinkPrefabCommand {
    object: Uuid,
    old: crate::metadata::PrefabMetaData,
}

impl UnlinkPrefabCommand {
    pub fn new(object: Uuid) -> Self {
        Self {
            object,
            old: Default::default(),
        }
    }
}

impl Command for UnlinkPrefabCommand {
    fn do_internal(&mut self, ctx: &mut CommandContext<'_>, redo: bool) -> Status {
        let document = ctx.document();
        if !redo {
            self.old = document.meta_data().get(self.object);
            if !self.old.is_linked() {
                return Err(DocumentError::Command(
                    "Unlink Prefab: object is not linked to a prefab".to_string(),
                ));
            }
        }
        document
            .meta_data_mut()
            .modify(self.object, |meta| *meta = Default::default());
        Ok(())
    }

    fn undo_internal(&mut self, document: &mut dyn Document, _fire_events: bool) -> Status {
        let old = self.old.clone();
        document.meta_data_mut().modify(self.object, |meta| *meta = old);
        Ok(())
    }
}
