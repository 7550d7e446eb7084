use plasma_reflection::{PropertyIndex, TypeAccessor, TypeDescriptor};
use std::sync::Arc;
use uuid::Uuid;

/// A node in the document tree: a GUID, its property values, and its place
/// in the hierarchy.
///
/// Children are listed in attach order. The position of a child inside its
/// parent property is owned by the parent's accessor, which stores the child
/// GUID in that property.
#[derive(Debug)]
pub struct DocumentObject {
    guid: Uuid,
    accessor: Box<dyn TypeAccessor>,
    pub(crate) parent: Option<Uuid>,
    pub(crate) children: Vec<Uuid>,
    pub(crate) parent_property: String,
}

impl DocumentObject {
    pub(crate) fn new(guid: Uuid, accessor: Box<dyn TypeAccessor>) -> Self {
        Self {
            guid,
            accessor,
            parent: None,
            children: Vec::new(),
            parent_property: String::new(),
        }
    }

    pub fn guid(&self) -> Uuid {
        self.guid
    }

    pub fn type_name(&self) -> &str {
        self.accessor.type_name()
    }

    pub fn type_descriptor(&self) -> &Arc<TypeDescriptor> {
        self.accessor.type_descriptor()
    }

    pub fn accessor(&self) -> &dyn TypeAccessor {
        self.accessor.as_ref()
    }

    pub(crate) fn accessor_mut(&mut self) -> &mut dyn TypeAccessor {
        self.accessor.as_mut()
    }

    pub fn parent(&self) -> Option<Uuid> {
        self.parent
    }

    pub fn children(&self) -> &[Uuid] {
        &self.children
    }

    /// Name of the parent property this object is stored in.
    pub fn parent_property(&self) -> &str {
        &self.parent_property
    }

    /// Index of `child` inside `property` of this object.
    pub fn child_index(&self, property: &str, child: Uuid) -> Option<PropertyIndex> {
        self.accessor.property_child_index(property, child)
    }
}
