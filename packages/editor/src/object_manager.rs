//! # Document Object Manager
//!
//! Owns the object tree of a document and is the only place that mutates it.
//!
//! ## Design
//!
//! - Objects live in an arena keyed by GUID. Objects removed from the tree
//!   stay in the arena (so undo can re-add them) until destroyed.
//! - The GUID lookup (`get_object`) only sees objects attached to the root.
//! - Every structural and property change is wrapped in before/after events.
//!   Handlers get `&mut DocumentObjectManager` and may re-enter it.
//! - Legality is checked by the `can_*` family. Mutators assume the matching
//!   check succeeded (asserted in debug builds) and only fail on missing
//!   objects or accessor errors.
//! - Documents refine legality through an [`ObjectManagerPolicy`].

use crate::errors::{DocumentError, DocumentResult, Status};
use crate::events::*;
use crate::object::DocumentObject;
use plasma_common::{embedded_object_guid, make_uuid, EventSource, SubscriptionId};
use plasma_reflection::{
    PropertyCategory, PropertyDescriptor, PropertyIndex, ReflectedTypeStorage, TypeDescriptor, TypeRegistry,
    Variant,
};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Type of the root object unless a document chooses another.
pub const ROOT_TYPE: &str = "DocumentRoot";
/// Root property holding the document's top-level objects.
pub const CHILDREN_PROPERTY: &str = "Children";
/// Root property holding scratch objects excluded from undo.
pub const TEMP_OBJECTS_PROPERTY: &str = "TempObjects";
/// Nested `set_value` calls allowed from inside property handlers.
pub const MAX_SET_VALUE_RECURSION: usize = 2;

/// Object type wrapping an instantiated prefab.
pub const PREFAB_ROOT_TYPE: &str = "PrefabRoot";

/// Register the default root type (`Children` and `TempObjects` arrays) and
/// the prefab root type.
pub fn register_root_type(registry: &TypeRegistry) -> Arc<TypeDescriptor> {
    registry.register_if_missing(TypeDescriptor::new(PREFAB_ROOT_TYPE).with_property(
        PropertyDescriptor::owned_objects(CHILDREN_PROPERTY, PropertyCategory::Array, None),
    ));
    registry.register_if_missing(
        TypeDescriptor::new(ROOT_TYPE)
            .with_property(PropertyDescriptor::owned_objects(
                CHILDREN_PROPERTY,
                PropertyCategory::Array,
                None,
            ))
            .with_property(
                PropertyDescriptor::owned_objects(TEMP_OBJECTS_PROPERTY, PropertyCategory::Array, None).temporary(),
            ),
    )
}

/// Document-specific legality refinements, consulted after the built-in checks.
pub trait ObjectManagerPolicy {
    fn can_add(
        &self,
        _manager: &DocumentObjectManager,
        _type_name: &str,
        _parent: Uuid,
        _property: &str,
        _index: &PropertyIndex,
    ) -> Status {
        Ok(())
    }

    fn can_remove(&self, _manager: &DocumentObjectManager, _object: Uuid) -> Status {
        Ok(())
    }

    fn can_move(
        &self,
        _manager: &DocumentObjectManager,
        _object: Uuid,
        _new_parent: Uuid,
        _property: &str,
        _index: &PropertyIndex,
    ) -> Status {
        Ok(())
    }

    fn can_select(&self, _manager: &DocumentObjectManager, _object: Uuid) -> Status {
        Ok(())
    }
}

/// Policy that adds no restrictions.
pub struct DefaultObjectPolicy;

impl ObjectManagerPolicy for DefaultObjectPolicy {}

/// Backing store of a manager: the root, every live object, the set of
/// objects attached to the tree, and the event subscribers.
pub struct Storage {
    root: Uuid,
    objects: HashMap<Uuid, DocumentObject>,
    registered: HashSet<Uuid>,
    structure_events: EventSource<StructureHandler>,
    property_events: EventSource<PropertyHandler>,
    object_events: EventSource<ObjectHandler>,
}

impl Storage {
    pub fn new(root_type: Arc<TypeDescriptor>) -> Self {
        let root = make_uuid();
        let mut objects = HashMap::new();
        objects.insert(
            root,
            DocumentObject::new(root, Box::new(ReflectedTypeStorage::new(root_type))),
        );
        Self {
            root,
            objects,
            registered: HashSet::from([root]),
            structure_events: EventSource::new(),
            property_events: EventSource::new(),
            object_events: EventSource::new(),
        }
    }

    pub fn root(&self) -> Uuid {
        self.root
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("root", &self.root)
            .field("objects", &self.objects.len())
            .field("registered", &self.registered.len())
            .finish()
    }
}

pub struct DocumentObjectManager {
    registry: Arc<TypeRegistry>,
    root_type: Arc<TypeDescriptor>,
    storage: Storage,
    policy: Rc<dyn ObjectManagerPolicy>,
    broadcast_depth: usize,
    set_value_depth: usize,
}

impl fmt::Debug for DocumentObjectManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentObjectManager")
            .field("root_type", &self.root_type.name)
            .field("storage", &self.storage)
            .finish()
    }
}

fn normalize_index(category: PropertyCategory, index: &PropertyIndex, count: usize) -> PropertyIndex {
    match category {
        PropertyCategory::Member => PropertyIndex::None,
        PropertyCategory::Array | PropertyCategory::Set => index.resolve_end(count),
        PropertyCategory::Map => index.clone(),
    }
}

impl DocumentObjectManager {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self::with_policy(registry, Rc::new(DefaultObjectPolicy))
    }

    pub fn with_policy(registry: Arc<TypeRegistry>, policy: Rc<dyn ObjectManagerPolicy>) -> Self {
        let root_type = register_root_type(&registry);
        Self::from_parts(registry, root_type, policy)
    }

    /// Manager whose root object is of a registered custom type.
    pub fn with_root_type(
        registry: Arc<TypeRegistry>,
        root_type: &str,
        policy: Rc<dyn ObjectManagerPolicy>,
    ) -> DocumentResult<Self> {
        let root_type = registry
            .get(root_type)
            .ok_or_else(|| DocumentError::TypeNotFound(root_type.to_string()))?;
        Ok(Self::from_parts(registry, root_type, policy))
    }

    fn from_parts(
        registry: Arc<TypeRegistry>,
        root_type: Arc<TypeDescriptor>,
        policy: Rc<dyn ObjectManagerPolicy>,
    ) -> Self {
        Self {
            storage: Storage::new(root_type.clone()),
            registry,
            root_type,
            policy,
            broadcast_depth: 0,
            set_value_depth: 0,
        }
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn set_policy(&mut self, policy: Rc<dyn ObjectManagerPolicy>) {
        self.policy = policy;
    }

    // ---------------------------------------------------------------------
    // Storage
    // ---------------------------------------------------------------------

    /// Fresh, empty storage with this manager's root type.
    pub fn new_storage(&self) -> Storage {
        Storage::new(self.root_type.clone())
    }

    /// Replace the backing storage, returning the previous one. Event
    /// subscribers travel with their storage. Refused while an event is
    /// being delivered.
    pub fn swap_storage(&mut self, storage: Storage) -> DocumentResult<Storage> {
        if self.broadcast_depth > 0 {
            return Err(DocumentError::StorageBusy);
        }
        Ok(std::mem::replace(&mut self.storage, storage))
    }

    // ---------------------------------------------------------------------
    // Lookup
    // ---------------------------------------------------------------------

    pub fn root(&self) -> Uuid {
        self.storage.root
    }

    /// Object attached to the tree (or the root).
    pub fn get_object(&self, guid: Uuid) -> Option<&DocumentObject> {
        if self.storage.registered.contains(&guid) {
            self.storage.objects.get(&guid)
        } else {
            None
        }
    }

    /// Any live object, attached or not.
    pub fn live_object(&self, guid: Uuid) -> Option<&DocumentObject> {
        self.storage.objects.get(&guid)
    }

    pub fn contains(&self, guid: Uuid) -> bool {
        self.storage.registered.contains(&guid)
    }

    /// Number of attached objects, including the root.
    pub fn object_count(&self) -> usize {
        self.storage.registered.len()
    }

    pub fn registered_guids(&self) -> Vec<Uuid> {
        self.storage.registered.iter().copied().collect()
    }

    pub fn live_object_count(&self) -> usize {
        self.storage.objects.len()
    }

    fn live(&self, guid: Uuid) -> DocumentResult<&DocumentObject> {
        self.storage
            .objects
            .get(&guid)
            .ok_or(DocumentError::ObjectNotFound(guid))
    }

    fn live_mut(&mut self, guid: Uuid) -> DocumentResult<&mut DocumentObject> {
        self.storage
            .objects
            .get_mut(&guid)
            .ok_or(DocumentError::ObjectNotFound(guid))
    }

    fn property_of(&self, object: Uuid, property: &str) -> DocumentResult<PropertyDescriptor> {
        let object = self.live(object)?;
        object
            .accessor()
            .find_property(property)
            .cloned()
            .ok_or_else(|| DocumentError::PropertyNotFound {
                property: property.to_string(),
                type_name: object.type_name().to_string(),
            })
    }

    /// Index of `object` inside its parent property.
    pub fn property_index(&self, object: Uuid) -> Option<PropertyIndex> {
        let object = self.storage.objects.get(&object)?;
        let parent = self.storage.objects.get(&object.parent?)?;
        parent.child_index(&object.parent_property, object.guid())
    }

    pub fn get_value(&self, object: Uuid, property: &str, index: &PropertyIndex) -> DocumentResult<Variant> {
        Ok(self.live(object)?.accessor().get_value(property, index)?)
    }

    pub fn count(&self, object: Uuid, property: &str) -> DocumentResult<usize> {
        Ok(self.live(object)?.accessor().count(property)?)
    }

    /// Child GUIDs stored in an ordered property, in order.
    pub fn children_in(&self, object: Uuid, property: &str) -> DocumentResult<Vec<Uuid>> {
        Ok(self
            .live(object)?
            .accessor()
            .indexed_values(property)?
            .into_iter()
            .filter_map(|(_, value)| value.as_uuid())
            .filter(|guid| !guid.is_nil())
            .collect())
    }

    /// Whether `object` is `ancestor` or lies below it.
    pub fn is_under(&self, object: Uuid, ancestor: Uuid) -> bool {
        let mut current = Some(object);
        while let Some(guid) = current {
            if guid == ancestor {
                return true;
            }
            current = self.storage.objects.get(&guid).and_then(|o| o.parent);
        }
        false
    }

    /// Whether `object` hangs below a property flagged temporary.
    pub fn is_temporary(&self, object: Uuid) -> bool {
        let mut current = self.storage.objects.get(&object);
        while let Some(child) = current {
            let Some(parent) = child.parent.and_then(|p| self.storage.objects.get(&p)) else {
                return false;
            };
            if parent
                .accessor()
                .find_property(&child.parent_property)
                .map(|p| p.flags.temporary)
                .unwrap_or(false)
            {
                return true;
            }
            current = Some(parent);
        }
        false
    }

    /// Stable content hash over type, property values and owned children.
    pub fn compute_object_hash(&self, object: Uuid) -> DocumentResult<u64> {
        let mut hasher = blake3::Hasher::new();
        self.hash_object_into(object, &mut hasher)?;
        let bytes = hasher.finalize();
        let mut first = [0u8; 8];
        first.copy_from_slice(&bytes.as_bytes()[..8]);
        Ok(u64::from_le_bytes(first))
    }

    fn hash_object_into(&self, object: Uuid, hasher: &mut blake3::Hasher) -> Status {
        let object = self.live(object)?;
        hasher.update(object.type_name().as_bytes());
        for property in object.type_descriptor().all_properties() {
            let value = object.accessor().get_value(&property.name, &PropertyIndex::None)?;
            hasher.update(property.name.as_bytes());
            hasher.update(serde_json::to_string(&value)?.as_bytes());
        }
        let mut children = object.children.clone();
        children.sort();
        for child in children {
            self.hash_object_into(child, hasher)?;
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Events
    // ---------------------------------------------------------------------

    pub fn subscribe_structure_events(&mut self, handler: StructureHandler) -> SubscriptionId {
        self.storage.structure_events.subscribe(handler)
    }

    pub fn unsubscribe_structure_events(&mut self, id: SubscriptionId) -> bool {
        self.storage.structure_events.unsubscribe(id)
    }

    pub fn subscribe_property_events(&mut self, handler: PropertyHandler) -> SubscriptionId {
        self.storage.property_events.subscribe(handler)
    }

    pub fn unsubscribe_property_events(&mut self, id: SubscriptionId) -> bool {
        self.storage.property_events.unsubscribe(id)
    }

    pub fn subscribe_object_events(&mut self, handler: ObjectHandler) -> SubscriptionId {
        self.storage.object_events.subscribe(handler)
    }

    pub fn unsubscribe_object_events(&mut self, id: SubscriptionId) -> bool {
        self.storage.object_events.unsubscribe(id)
    }

    fn broadcast_structure(&mut self, event: &StructureEvent) {
        let handlers = self.storage.structure_events.snapshot();
        self.broadcast_depth += 1;
        for handler in handlers {
            handler(self, event);
        }
        self.broadcast_depth -= 1;
    }

    fn broadcast_property(&mut self, event: &PropertyEvent) {
        let handlers = self.storage.property_events.snapshot();
        self.broadcast_depth += 1;
        for handler in handlers {
            handler(self, event);
        }
        self.broadcast_depth -= 1;
    }

    fn broadcast_object(&mut self, event: &ObjectEvent) {
        let handlers = self.storage.object_events.snapshot();
        self.broadcast_depth += 1;
        for handler in handlers {
            handler(self, event);
        }
        self.broadcast_depth -= 1;
    }

    // ---------------------------------------------------------------------
    // Lifetime
    // ---------------------------------------------------------------------

    /// Create a detached object of `type_name`. Embedded class members are
    /// created alongside with GUIDs derived from this object's GUID.
    pub fn create_object(&mut self, type_name: &str, guid: Option<Uuid>) -> DocumentResult<Uuid> {
        let descriptor = self
            .registry
            .get(type_name)
            .ok_or_else(|| DocumentError::TypeNotFound(type_name.to_string()))?;
        let guid = guid.unwrap_or_else(make_uuid);
        if self.storage.objects.contains_key(&guid) {
            return Err(DocumentError::not_allowed(format!(
                "An object with GUID {guid} already exists"
            )));
        }

        self.storage.objects.insert(
            guid,
            DocumentObject::new(guid, Box::new(ReflectedTypeStorage::new(descriptor))),
        );
        self.patch_embedded_class_objects_internal(guid, false)?;

        debug!(object = %guid, type_name, "created object");
        self.broadcast_object(&ObjectEvent {
            event_type: ObjectEventType::AfterObjectCreated,
            object: guid,
        });
        Ok(guid)
    }

    /// Destroy a detached object and everything below it, children first.
    pub fn destroy_object(&mut self, object: Uuid) -> Status {
        debug_assert!(
            !self.storage.registered.contains(&object),
            "object must be removed from the tree before it is destroyed"
        );
        if self.storage.registered.contains(&object) {
            return Err(DocumentError::not_allowed(
                "Object must be removed from the tree before it is destroyed",
            ));
        }
        let children = self.live(object)?.children.clone();
        for child in children {
            self.destroy_object(child)?;
        }

        self.broadcast_object(&ObjectEvent {
            event_type: ObjectEventType::BeforeObjectDestroyed,
            object,
        });
        self.storage.objects.remove(&object);
        debug!(object = %object, "destroyed object");
        Ok(())
    }

    /// Detach and destroy every object below the root.
    pub fn destroy_all_objects(&mut self) -> Status {
        let root = self.root();
        let children = self.live(root)?.children.clone();
        for child in children {
            self.remove_child_reference(child)?;
            self.unregister_recursive(child);
            self.destroy_object(child)?;
        }
        Ok(())
    }

    /// Create missing embedded class members of `object`. Attached objects
    /// get them through [`Self::add_object`] with events; detached ones
    /// silently.
    pub fn patch_embedded_class_objects(&mut self, object: Uuid) -> Status {
        let add_to_doc = self.contains(object);
        self.patch_embedded_class_objects_internal(object, add_to_doc)
    }

    fn patch_embedded_class_objects_internal(&mut self, object: Uuid, add_to_doc: bool) -> Status {
        let descriptor = self.live(object)?.type_descriptor().clone();
        for property in descriptor.all_properties() {
            if property.category != PropertyCategory::Member || !property.flags.is_embedded_class() {
                continue;
            }
            let Some(type_name) = property.specific_type.as_deref() else {
                continue;
            };
            let current = self.get_value(object, &property.name, &PropertyIndex::None)?;
            if current.as_uuid().map(|guid| !guid.is_nil()).unwrap_or(false) {
                continue;
            }

            let child = self.create_object(type_name, Some(embedded_object_guid(object, &property.name)))?;
            if add_to_doc {
                self.add_object(child, Some(object), &property.name, PropertyIndex::None)?;
            } else {
                self.attach_sub_object(object, child, &property.name, &PropertyIndex::None)?;
            }
        }
        Ok(())
    }

    /// Link a detached child under a detached parent without events or
    /// registration. Used while building sub-trees before they are added.
    pub(crate) fn attach_sub_object(
        &mut self,
        parent: Uuid,
        child: Uuid,
        property: &str,
        index: &PropertyIndex,
    ) -> Status {
        let descriptor = self.property_of(parent, property)?;
        let count = match descriptor.category {
            PropertyCategory::Array | PropertyCategory::Set => self.count(parent, property)?,
            _ => 0,
        };
        let index = normalize_index(descriptor.category, index, count);
        self.insert_child_reference(parent, child, property, &index)
    }

    fn register_recursive(&mut self, object: Uuid) {
        let mut stack = vec![object];
        while let Some(guid) = stack.pop() {
            self.storage.registered.insert(guid);
            if let Some(object) = self.storage.objects.get(&guid) {
                stack.extend(object.children.iter().copied());
            }
        }
    }

    fn unregister_recursive(&mut self, object: Uuid) {
        let mut stack = vec![object];
        while let Some(guid) = stack.pop() {
            self.storage.registered.remove(&guid);
            if let Some(object) = self.storage.objects.get(&guid) {
                stack.extend(object.children.iter().copied());
            }
        }
    }

    fn insert_child_reference(
        &mut self,
        parent: Uuid,
        child: Uuid,
        property: &str,
        index: &PropertyIndex,
    ) -> Status {
        let descriptor = self.property_of(parent, property)?;
        self.live(child)?;

        let parent_object = self.live_mut(parent)?;
        let accessor = parent_object.accessor_mut();
        match descriptor.category {
            PropertyCategory::Member => accessor.set_value(property, Variant::Uuid(child), &PropertyIndex::None)?,
            PropertyCategory::Array | PropertyCategory::Set => {
                accessor.insert_value(property, index, Variant::Uuid(child))?
            }
            PropertyCategory::Map => {
                if accessor.get_value(property, index).is_ok() {
                    accessor.set_value(property, Variant::Uuid(child), index)?
                } else {
                    accessor.insert_value(property, index, Variant::Uuid(child))?
                }
            }
        }
        parent_object.children.push(child);

        let child_object = self.live_mut(child)?;
        child_object.parent = Some(parent);
        child_object.parent_property = property.to_string();
        Ok(())
    }

    /// Unlink `child` from its parent. Returns the parent, property and the
    /// index the child occupied.
    fn remove_child_reference(&mut self, child: Uuid) -> DocumentResult<(Uuid, String, PropertyIndex)> {
        let child_object = self.live(child)?;
        let parent = child_object
            .parent
            .ok_or_else(|| DocumentError::not_allowed("Object has no parent"))?;
        let property = child_object.parent_property.clone();
        let descriptor = self.property_of(parent, &property)?;

        let parent_object = self.live_mut(parent)?;
        let index = parent_object
            .child_index(&property, child)
            .ok_or_else(|| DocumentError::not_allowed("Object is not referenced by its parent"))?;
        let accessor = parent_object.accessor_mut();
        match descriptor.category {
            PropertyCategory::Member => {
                accessor.set_value(&property, Variant::Uuid(Uuid::nil()), &PropertyIndex::None)?
            }
            _ => accessor.remove_value(&property, &index)?,
        }
        parent_object.children.retain(|c| *c != child);

        let child_object = self.live_mut(child)?;
        child_object.parent = None;
        child_object.parent_property.clear();
        Ok((parent, property, index))
    }

    // ---------------------------------------------------------------------
    // Structure
    // ---------------------------------------------------------------------

    /// Attach a detached object (and its sub-tree) under `parent`, or the
    /// root when `None`.
    pub fn add_object(
        &mut self,
        object: Uuid,
        parent: Option<Uuid>,
        property: &str,
        index: PropertyIndex,
    ) -> Status {
        let type_name = self.live(object)?.type_name().to_string();
        debug_assert!(
            self.can_add(&type_name, parent, property, &index).is_ok(),
            "add_object called without a successful can_add"
        );
        if self.contains(object) {
            return Err(DocumentError::not_allowed("Object is already part of the tree"));
        }

        let parent = parent.unwrap_or(self.root());
        let descriptor = self.property_of(parent, property)?;
        let count = match descriptor.category {
            PropertyCategory::Array | PropertyCategory::Set => self.count(parent, property)?,
            _ => 0,
        };
        let index = normalize_index(descriptor.category, &index, count);

        let mut event = StructureEvent::new(StructureEventType::BeforeObjectAdded, object);
        event.new_parent = Some(parent);
        event.parent_property = property.to_string();
        event.new_index = index.clone();
        self.broadcast_structure(&event);

        self.insert_child_reference(parent, object, property, &index)?;
        self.register_recursive(object);
        debug!(object = %object, parent = %parent, property, index = %index, "added object");

        event.event_type = StructureEventType::AfterObjectAdded;
        self.broadcast_structure(&event);
        Ok(())
    }

    /// Detach an object from the tree. It stays alive for a later re-add.
    pub fn remove_object(&mut self, object: Uuid) -> Status {
        debug_assert!(
            self.can_remove(object).is_ok(),
            "remove_object called without a successful can_remove"
        );
        if !self.contains(object) {
            return Err(DocumentError::ObjectNotFound(object));
        }
        let object_ref = self.live(object)?;
        let mut event = StructureEvent::new(StructureEventType::BeforeObjectRemoved, object);
        event.previous_parent = object_ref.parent;
        event.parent_property = object_ref.parent_property.clone();
        event.old_index = self.property_index(object).unwrap_or_default();
        self.broadcast_structure(&event);

        self.remove_child_reference(object)?;
        self.unregister_recursive(object);
        debug!(object = %object, "removed object");

        event.event_type = StructureEventType::AfterObjectRemoved;
        self.broadcast_structure(&event);
        Ok(())
    }

    /// Move an attached object. `index` addresses the target container as it
    /// is before the object is taken out.
    pub fn move_object(
        &mut self,
        object: Uuid,
        new_parent: Option<Uuid>,
        property: &str,
        index: PropertyIndex,
    ) -> Status {
        debug_assert!(
            self.can_move(object, new_parent, property, &index).is_ok(),
            "move_object called without a successful can_move"
        );
        if !self.contains(object) {
            return Err(DocumentError::ObjectNotFound(object));
        }
        let new_parent = new_parent.unwrap_or(self.root());
        let object_ref = self.live(object)?;
        let previous_parent = object_ref
            .parent
            .ok_or_else(|| DocumentError::not_allowed("Object that is moved must have a parent"))?;
        let previous_property = object_ref.parent_property.clone();

        let descriptor = self.property_of(new_parent, property)?;
        let count = match descriptor.category {
            PropertyCategory::Array | PropertyCategory::Set => self.count(new_parent, property)?,
            _ => 0,
        };

        let mut event = StructureEvent::new(StructureEventType::BeforeObjectMoved, object);
        event.previous_parent = Some(previous_parent);
        event.new_parent = Some(new_parent);
        event.parent_property = property.to_string();
        event.old_index = self.property_index(object).unwrap_or_default();
        event.new_index = normalize_index(descriptor.category, &index, count);
        event.same_container =
            previous_parent == new_parent && previous_property == property && descriptor.category.is_ordered();
        self.broadcast_structure(&event);

        self.remove_child_reference(object)?;
        self.insert_child_reference(new_parent, object, property, &event.insert_index())?;
        debug!(object = %object, parent = %new_parent, property, index = %event.insert_index(), "moved object");

        event.event_type = StructureEventType::AfterObjectMoved;
        self.broadcast_structure(&event);
        event.event_type = StructureEventType::AfterObjectMoved2;
        self.broadcast_structure(&event);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Properties
    // ---------------------------------------------------------------------

    pub fn set_value(&mut self, object: Uuid, property: &str, value: Variant, index: PropertyIndex) -> Status {
        if self.set_value_depth > MAX_SET_VALUE_RECURSION {
            return Err(DocumentError::RecursionLimit(property.to_string()));
        }
        let accessor = self.live_mut(object)?.accessor_mut();
        let old_value = accessor.get_value(property, &index)?;
        accessor.set_value(property, value, &index)?;
        let new_value = accessor.get_value(property, &index)?;

        let event = PropertyEvent {
            event_type: PropertyEventType::PropertySet,
            object,
            property: property.to_string(),
            old_value,
            new_value,
            old_index: PropertyIndex::None,
            new_index: index,
        };
        self.set_value_depth += 1;
        self.broadcast_property(&event);
        self.set_value_depth -= 1;
        Ok(())
    }

    pub fn insert_value(&mut self, object: Uuid, property: &str, value: Variant, index: PropertyIndex) -> Status {
        let descriptor = self.property_of(object, property)?;
        let index = if descriptor.category.is_ordered() {
            index.resolve_end(self.count(object, property)?)
        } else {
            index
        };
        let accessor = self.live_mut(object)?.accessor_mut();
        accessor.insert_value(property, &index, value)?;
        let new_value = accessor.get_value(property, &index)?;

        self.broadcast_property(&PropertyEvent {
            event_type: PropertyEventType::PropertyInserted,
            object,
            property: property.to_string(),
            old_value: Variant::Invalid,
            new_value,
            old_index: PropertyIndex::None,
            new_index: index,
        });
        Ok(())
    }

    pub fn remove_value(&mut self, object: Uuid, property: &str, index: PropertyIndex) -> Status {
        let accessor = self.live_mut(object)?.accessor_mut();
        let old_value = accessor.get_value(property, &index)?;
        accessor.remove_value(property, &index)?;

        self.broadcast_property(&PropertyEvent {
            event_type: PropertyEventType::PropertyRemoved,
            object,
            property: property.to_string(),
            old_value,
            new_value: Variant::Invalid,
            old_index: index,
            new_index: PropertyIndex::None,
        });
        Ok(())
    }

    pub fn move_value(
        &mut self,
        object: Uuid,
        property: &str,
        old_index: PropertyIndex,
        new_index: PropertyIndex,
    ) -> Status {
        let accessor = self.live_mut(object)?.accessor_mut();
        let value = accessor.get_value(property, &old_index)?;
        accessor.move_value(property, &old_index, &new_index)?;

        self.broadcast_property(&PropertyEvent {
            event_type: PropertyEventType::PropertyMoved,
            object,
            property: property.to_string(),
            old_value: value.clone(),
            new_value: value,
            old_index,
            new_index,
        });
        Ok(())
    }

    /// Write a value without events. Used by temporary commands rewinding
    /// their scratch edits.
    pub(crate) fn accessor_mut(&mut self, object: Uuid) -> DocumentResult<&mut dyn plasma_reflection::TypeAccessor> {
        Ok(self.live_mut(object)?.accessor_mut())
    }

    // ---------------------------------------------------------------------
    // Legality
    // ---------------------------------------------------------------------

    pub fn can_add(&self, type_name: &str, parent: Option<Uuid>, property: &str, index: &PropertyIndex) -> Status {
        if !self.registry.contains(type_name) {
            return Err(DocumentError::TypeNotFound(type_name.to_string()));
        }
        let parent = parent.unwrap_or(self.root());
        let parent_object = self.get_object(parent).ok_or(DocumentError::ParentNotFound(parent))?;
        let descriptor = parent_object
            .accessor()
            .find_property(property)
            .ok_or_else(|| DocumentError::PropertyNotFound {
                property: property.to_string(),
                type_name: parent_object.type_name().to_string(),
            })?;

        if descriptor.flags.is_value_type() || descriptor.flags.is_enum || descriptor.flags.bitflags {
            return Err(DocumentError::not_allowed("Need to use 'InsertValue' action instead."));
        }
        if descriptor.flags.is_embedded_class() {
            if let Some(specific) = descriptor.specific_type.as_deref() {
                if specific != type_name {
                    return Err(DocumentError::not_allowed("Embedded classes cannot be changed manually."));
                }
            }
        } else {
            if !descriptor.flags.pointer_owner {
                return Err(DocumentError::not_allowed(format!(
                    "Cannot add object to the pointer property '{property}' as it does not own its objects!"
                )));
            }
            if let Some(base) = descriptor.specific_type.as_deref() {
                if !self.registry.is_derived_from(type_name, base) {
                    return Err(DocumentError::not_allowed(format!(
                        "Cannot add object to the pointer property '{property}' as its type '{type_name}' is not derived from the property type '{base}'!"
                    )));
                }
            }
        }

        let accessor = parent_object.accessor();
        match descriptor.category {
            PropertyCategory::Array | PropertyCategory::Set => {
                let count = accessor.count(property)?;
                match index {
                    PropertyIndex::End => {}
                    PropertyIndex::Position(position) if *position <= count => {}
                    PropertyIndex::Position(position) => {
                        return Err(DocumentError::not_allowed(format!(
                            "Cannot add object to its new location '{position}' as it is out of the bounds of the parent's property range '{count}'!"
                        )))
                    }
                    _ => {
                        return Err(DocumentError::not_allowed(format!(
                            "Cannot add object to the property '{property}' as the index '{index}' is not a position!"
                        )))
                    }
                }
            }
            PropertyCategory::Map => {
                let Some(key) = index.key() else {
                    return Err(DocumentError::not_allowed(format!(
                        "Cannot add object to the map property '{property}' as its index type is not a string!"
                    )));
                };
                if let Ok(Variant::Uuid(existing)) = accessor.get_value(property, index) {
                    if !existing.is_nil() {
                        return Err(DocumentError::not_allowed(format!(
                            "Cannot add object to the map property '{property}' at key '{key}'. Delete old value first."
                        )));
                    }
                }
            }
            PropertyCategory::Member => {
                if let Ok(Variant::Uuid(existing)) = accessor.get_value(property, &PropertyIndex::None) {
                    if !existing.is_nil() {
                        return Err(DocumentError::not_allowed(format!(
                            "Cannot add object to the member property '{property}' as it already holds an object. Delete old value first."
                        )));
                    }
                }
            }
        }

        let policy = self.policy.clone();
        policy.can_add(self, type_name, parent, property, index)
    }

    pub fn can_remove(&self, object: Uuid) -> Status {
        let object_ref = self
            .get_object(object)
            .ok_or_else(|| DocumentError::not_allowed("Object is not part of the object manager!"))?;
        if object == self.root() {
            return Err(DocumentError::not_allowed("The root object cannot be removed"));
        }
        if self.is_embedded(object_ref) {
            return Err(DocumentError::not_allowed("Embedded classes cannot be removed"));
        }
        let policy = self.policy.clone();
        policy.can_remove(self, object)
    }

    pub fn can_move(&self, object: Uuid, new_parent: Option<Uuid>, property: &str, index: &PropertyIndex) -> Status {
        let object_ref = self
            .get_object(object)
            .ok_or_else(|| DocumentError::not_allowed("Object is not part of the object manager!"))?;
        if object == self.root() {
            return Err(DocumentError::not_allowed("The root object cannot be moved"));
        }
        if self.is_embedded(object_ref) {
            return Err(DocumentError::not_allowed("Embedded classes cannot be moved"));
        }
        let new_parent = new_parent.unwrap_or(self.root());
        if object == new_parent {
            return Err(DocumentError::not_allowed("Can't move object onto itself!"));
        }

        if object_ref.parent == Some(new_parent) && object_ref.parent_property == property {
            let current = self.property_index(object).unwrap_or_default();
            let descriptor = self.property_of(new_parent, property)?;
            let onto_itself = if descriptor.category.is_ordered() {
                let count = self.count(new_parent, property)?;
                match (index.resolve_end(count).position(), current.position()) {
                    (Some(target), Some(current)) => target == current || target == current + 1,
                    _ => false,
                }
            } else {
                current == *index || descriptor.category == PropertyCategory::Member
            };
            if onto_itself {
                return Err(DocumentError::not_allowed("Can't move object onto itself!"));
            }
            if descriptor.category.is_ordered() {
                // The object's own slot does not count against the bounds here.
                self.check_type_for_move(object_ref, new_parent, property, index)?;
            } else {
                self.can_add(object_ref.type_name(), Some(new_parent), property, index)?;
            }
        } else {
            self.can_add(object_ref.type_name(), Some(new_parent), property, index)?;
        }

        if new_parent != self.root() && self.is_under(new_parent, object) {
            return Err(DocumentError::not_allowed("Can't move object to one of its own children!"));
        }

        let policy = self.policy.clone();
        policy.can_move(self, object, new_parent, property, index)
    }

    fn check_type_for_move(
        &self,
        object: &DocumentObject,
        parent: Uuid,
        property: &str,
        index: &PropertyIndex,
    ) -> Status {
        let count = self.count(parent, property)?;
        match index {
            PropertyIndex::End => Ok(()),
            PropertyIndex::Position(position) if *position <= count => Ok(()),
            _ => Err(DocumentError::not_allowed(format!(
                "Cannot move object '{}' to index '{index}' of property '{property}'",
                object.guid()
            ))),
        }
    }

    pub fn can_select(&self, object: Uuid) -> Status {
        if !self.contains(object) {
            return Err(DocumentError::ObjectNotFound(object));
        }
        let policy = self.policy.clone();
        policy.can_select(self, object)
    }

    fn is_embedded(&self, object: &DocumentObject) -> bool {
        object
            .parent
            .and_then(|parent| self.storage.objects.get(&parent))
            .and_then(|parent| parent.accessor().find_property(&object.parent_property))
            .map(|descriptor| descriptor.flags.is_embedded_class())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plasma_reflection::VariantType;
    use std::cell::RefCell;

    fn registry() -> Arc<TypeRegistry> {
        let registry = Arc::new(TypeRegistry::new());
        registry.register(
            TypeDescriptor::new("Transform")
                .with_property(PropertyDescriptor::member("X", VariantType::Float))
                .with_property(PropertyDescriptor::member("Y", VariantType::Float)),
        );
        let base = registry.register(
            TypeDescriptor::new("Shape")
                .with_property(PropertyDescriptor::member("Name", VariantType::String))
                .with_property(PropertyDescriptor::member("Size", VariantType::Int))
                .with_property(PropertyDescriptor::values("Points", PropertyCategory::Array, VariantType::Int))
                .with_property(PropertyDescriptor::embedded("Transform", "Transform"))
                .with_property(PropertyDescriptor::owned_objects(
                    "Parts",
                    PropertyCategory::Array,
                    Some("Shape"),
                ))
                .with_property(PropertyDescriptor::owned_objects("Named", PropertyCategory::Map, None)),
        );
        registry.register(TypeDescriptor::new("Circle").with_parent(base));
        registry.register(TypeDescriptor::new("Other"));
        registry
    }

    fn manager() -> DocumentObjectManager {
        DocumentObjectManager::new(registry())
    }

    fn add(manager: &mut DocumentObjectManager, type_name: &str, parent: Option<Uuid>, property: &str) -> Uuid {
        let object = manager.create_object(type_name, None).unwrap();
        manager.can_add(type_name, parent, property, &PropertyIndex::End).unwrap();
        manager.add_object(object, parent, property, PropertyIndex::End).unwrap();
        object
    }

    #[test]
    fn test_create_object_builds_embedded_members() {
        let mut m = manager();
        let shape = m.create_object("Shape", None).unwrap();
        let transform = m.get_value(shape, "Transform", &PropertyIndex::None).unwrap().as_uuid().unwrap();

        assert_eq!(transform, embedded_object_guid(shape, "Transform"));
        assert_eq!(m.live_object(transform).unwrap().parent(), Some(shape));
        assert!(!m.contains(shape));
        assert!(!m.contains(transform));
    }

    #[test]
    fn test_add_registers_subtree() {
        let mut m = manager();
        let shape = add(&mut m, "Shape", None, CHILDREN_PROPERTY);
        let transform = embedded_object_guid(shape, "Transform");

        assert!(m.contains(shape));
        assert!(m.contains(transform));
        assert_eq!(m.object_count(), 3);
        assert_eq!(m.property_index(shape), Some(PropertyIndex::Position(0)));
    }

    #[test]
    fn test_remove_keeps_object_alive() {
        let mut m = manager();
        let shape = add(&mut m, "Shape", None, CHILDREN_PROPERTY);
        m.can_remove(shape).unwrap();
        m.remove_object(shape).unwrap();

        assert!(m.get_object(shape).is_none());
        assert!(m.live_object(shape).is_some());
        assert_eq!(m.object_count(), 1);

        m.add_object(shape, None, CHILDREN_PROPERTY, PropertyIndex::End).unwrap();
        assert!(m.contains(embedded_object_guid(shape, "Transform")));
    }

    #[test]
    fn test_destroy_removes_children_first() {
        let mut m = manager();
        let order = Rc::new(RefCell::new(Vec::new()));
        let log = order.clone();
        m.subscribe_object_events(Rc::new(move |_, e: &ObjectEvent| {
            if e.event_type == ObjectEventType::BeforeObjectDestroyed {
                log.borrow_mut().push(e.object);
            }
        }));
        let shape = m.create_object("Shape", None).unwrap();
        let transform = embedded_object_guid(shape, "Transform");
        m.destroy_object(shape).unwrap();

        assert_eq!(*order.borrow(), vec![transform, shape]);
        assert_eq!(m.live_object_count(), 1);
    }

    #[test]
    fn test_can_add_rules() {
        let mut m = manager();
        let shape = add(&mut m, "Shape", None, CHILDREN_PROPERTY);

        let value_prop = m.can_add("Shape", Some(shape), "Size", &PropertyIndex::None);
        assert!(matches!(value_prop, Err(DocumentError::NotAllowed(_))));

        let embedded = m.can_add("Other", Some(shape), "Transform", &PropertyIndex::None);
        assert!(matches!(embedded, Err(DocumentError::NotAllowed(_))));

        assert!(m.can_add("Circle", Some(shape), "Parts", &PropertyIndex::End).is_ok());
        assert!(m.can_add("Other", Some(shape), "Parts", &PropertyIndex::End).is_err());
        assert!(m.can_add("Circle", Some(shape), "Parts", &PropertyIndex::Position(1)).is_err());

        let missing = m.can_add("Shape", Some(Uuid::new_v4()), "Parts", &PropertyIndex::End);
        assert!(matches!(missing, Err(DocumentError::ParentNotFound(_))));

        let unknown = m.can_add("Shape", Some(shape), "Nope", &PropertyIndex::End);
        assert!(matches!(unknown, Err(DocumentError::PropertyNotFound { .. })));
    }

    #[test]
    fn test_map_slot_refuses_overwrite() {
        let mut m = manager();
        let shape = add(&mut m, "Shape", None, CHILDREN_PROPERTY);
        let child = m.create_object("Other", None).unwrap();
        let key = PropertyIndex::Key("a".into());

        assert!(m.can_add("Other", Some(shape), "Named", &PropertyIndex::End).is_err());
        m.can_add("Other", Some(shape), "Named", &key).unwrap();
        m.add_object(child, Some(shape), "Named", key.clone()).unwrap();
        assert_eq!(m.property_index(child), Some(key.clone()));
        assert!(m.can_add("Other", Some(shape), "Named", &key).is_err());
    }

    #[test]
    fn test_move_within_array_adjusts_index() {
        let mut m = manager();
        let a = add(&mut m, "Shape", None, CHILDREN_PROPERTY);
        let b = add(&mut m, "Shape", None, CHILDREN_PROPERTY);
        let c = add(&mut m, "Shape", None, CHILDREN_PROPERTY);
        let root = m.root();

        m.can_move(a, None, CHILDREN_PROPERTY, &PropertyIndex::Position(3)).unwrap();
        m.move_object(a, None, CHILDREN_PROPERTY, PropertyIndex::Position(3)).unwrap();
        assert_eq!(m.children_in(root, CHILDREN_PROPERTY).unwrap(), vec![b, c, a]);

        assert!(m.can_move(c, None, CHILDREN_PROPERTY, &PropertyIndex::Position(1)).is_err());
        assert!(m.can_move(c, None, CHILDREN_PROPERTY, &PropertyIndex::Position(2)).is_err());
    }

    #[test]
    fn test_move_into_own_child_is_refused() {
        let mut m = manager();
        let outer = add(&mut m, "Shape", None, CHILDREN_PROPERTY);
        let inner = add(&mut m, "Shape", Some(outer), "Parts");
        let result = m.can_move(outer, Some(inner), "Parts", &PropertyIndex::End);
        assert!(matches!(result, Err(DocumentError::NotAllowed(msg)) if msg.contains("own children")));
    }

    #[test]
    fn test_embedded_objects_cannot_be_removed() {
        let mut m = manager();
        let shape = add(&mut m, "Shape", None, CHILDREN_PROPERTY);
        assert!(m.can_remove(embedded_object_guid(shape, "Transform")).is_err());
        assert!(m.can_remove(m.root()).is_err());
    }

    #[test]
    fn test_property_events() {
        let mut m = manager();
        let shape = add(&mut m, "Shape", None, CHILDREN_PROPERTY);
        let events = Rc::new(RefCell::new(Vec::new()));
        let log = events.clone();
        m.subscribe_property_events(Rc::new(move |_, e: &PropertyEvent| log.borrow_mut().push(e.clone())));

        m.set_value(shape, "Size", Variant::Int(4), PropertyIndex::None).unwrap();
        m.insert_value(shape, "Points", Variant::Int(1), PropertyIndex::End).unwrap();
        m.insert_value(shape, "Points", Variant::Int(2), PropertyIndex::End).unwrap();
        m.move_value(shape, "Points", PropertyIndex::Position(0), PropertyIndex::Position(2)).unwrap();
        m.remove_value(shape, "Points", PropertyIndex::Position(0)).unwrap();

        let events = events.borrow();
        assert_eq!(events.len(), 5);
        assert_eq!(events[0].old_value, Variant::Int(0));
        assert_eq!(events[0].new_value, Variant::Int(4));
        assert_eq!(events[2].new_index, PropertyIndex::Position(1));
        assert_eq!(events[3].event_type, PropertyEventType::PropertyMoved);
        assert_eq!(events[4].old_value, Variant::Int(2));
    }

    #[test]
    fn test_set_value_with_unknown_property_fails() {
        let mut m = manager();
        let shape = add(&mut m, "Shape", None, CHILDREN_PROPERTY);
        let result = m.set_value(shape, "Nope", Variant::Int(1), PropertyIndex::None);
        assert!(matches!(result, Err(DocumentError::Property(_))));
    }

    #[test]
    fn test_set_value_recursion_is_bounded() {
        let mut m = manager();
        let shape = add(&mut m, "Shape", None, CHILDREN_PROPERTY);
        let failures = Rc::new(RefCell::new(Vec::new()));
        let log = failures.clone();
        m.subscribe_property_events(Rc::new(move |m: &mut DocumentObjectManager, e: &PropertyEvent| {
            let next = e.new_value.as_int().unwrap_or(0) + 1;
            if let Err(err) = m.set_value(e.object, "Size", Variant::Int(next), PropertyIndex::None) {
                log.borrow_mut().push(err);
            }
        }));

        m.set_value(shape, "Size", Variant::Int(1), PropertyIndex::None).unwrap();

        // Outer set plus two nested levels succeed, the third nested one is refused.
        assert_eq!(m.get_value(shape, "Size", &PropertyIndex::None).unwrap(), Variant::Int(3));
        assert_eq!(failures.borrow().len(), 1);
        assert!(matches!(failures.borrow()[0], DocumentError::RecursionLimit(_)));
    }

    #[test]
    fn test_swap_storage() {
        let mut m = manager();
        let shape = add(&mut m, "Shape", None, CHILDREN_PROPERTY);
        let fresh = m.new_storage();
        let old = m.swap_storage(fresh).unwrap();

        assert!(!m.contains(shape));
        assert_eq!(m.object_count(), 1);

        m.swap_storage(old).unwrap();
        assert!(m.contains(shape));
    }

    #[test]
    fn test_swap_storage_refused_during_broadcast() {
        let mut m = manager();
        let result = Rc::new(RefCell::new(None));
        let slot = result.clone();
        m.subscribe_structure_events(Rc::new(move |m: &mut DocumentObjectManager, e: &StructureEvent| {
            if e.event_type == StructureEventType::AfterObjectAdded {
                let storage = m.new_storage();
                *slot.borrow_mut() = Some(m.swap_storage(storage).is_err());
            }
        }));
        add(&mut m, "Other", None, CHILDREN_PROPERTY);
        assert_eq!(*result.borrow(), Some(true));
    }

    #[test]
    fn test_is_temporary() {
        let mut m = manager();
        let temp = add(&mut m, "Shape", None, TEMP_OBJECTS_PROPERTY);
        let nested = add(&mut m, "Shape", Some(temp), "Parts");
        let normal = add(&mut m, "Shape", None, CHILDREN_PROPERTY);

        assert!(m.is_temporary(temp));
        assert!(m.is_temporary(nested));
        assert!(!m.is_temporary(normal));
    }

    #[test]
    fn test_object_hash_tracks_content() {
        let mut m = manager();
        let shape = add(&mut m, "Shape", None, CHILDREN_PROPERTY);
        let before = m.compute_object_hash(shape).unwrap();
        assert_eq!(before, m.compute_object_hash(shape).unwrap());

        m.set_value(shape, "Name", "box".into(), PropertyIndex::None).unwrap();
        assert_ne!(before, m.compute_object_hash(shape).unwrap());
    }

    #[test]
    fn test_destroy_all_objects() {
        let mut m = manager();
        add(&mut m, "Shape", None, CHILDREN_PROPERTY);
        add(&mut m, "Other", None, CHILDREN_PROPERTY);
        m.destroy_all_objects().unwrap();
        assert_eq!(m.object_count(), 1);
        assert_eq!(m.live_object_count(), 1);
        assert_eq!(m.count(m.root(), CHILDREN_PROPERTY).unwrap(), 0);
    }
}
