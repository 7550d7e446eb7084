//! Events broadcast by the [`DocumentObjectManager`].
//!
//! Events carry GUIDs rather than references. Handlers receive the manager
//! mutably, so they can inspect the objects named in the event or react with
//! further edits.

use crate::DocumentObjectManager;
use plasma_reflection::{PropertyIndex, Variant};
use std::rc::Rc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureEventType {
    BeforeObjectAdded,
    AfterObjectAdded,
    BeforeObjectRemoved,
    AfterObjectRemoved,
    BeforeObjectMoved,
    AfterObjectMoved,
    /// Late hook for listeners that must run after every `AfterObjectMoved` handler.
    AfterObjectMoved2,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructureEvent {
    pub event_type: StructureEventType,
    pub object: Uuid,
    pub previous_parent: Option<Uuid>,
    pub new_parent: Option<Uuid>,
    pub parent_property: String,
    pub old_index: PropertyIndex,
    pub new_index: PropertyIndex,
    /// Set for moves inside the same ordered container.
    pub(crate) same_container: bool,
}

impl StructureEvent {
    pub(crate) fn new(event_type: StructureEventType, object: Uuid) -> Self {
        Self {
            event_type,
            object,
            previous_parent: None,
            new_parent: None,
            parent_property: String::new(),
            old_index: PropertyIndex::None,
            new_index: PropertyIndex::None,
            same_container: false,
        }
    }

    /// Index the object ends up at after a move. Within one array or set,
    /// moving behind the current position shifts the target down by one,
    /// since the object is taken out first.
    pub fn insert_index(&self) -> PropertyIndex {
        let is_move = matches!(
            self.event_type,
            StructureEventType::BeforeObjectMoved
                | StructureEventType::AfterObjectMoved
                | StructureEventType::AfterObjectMoved2
        );
        if is_move && self.same_container {
            if let (Some(old), Some(new)) = (self.old_index.position(), self.new_index.position()) {
                if new > old {
                    return PropertyIndex::Position(new - 1);
                }
            }
        }
        self.new_index.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyEventType {
    PropertySet,
    PropertyInserted,
    PropertyRemoved,
    PropertyMoved,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyEvent {
    pub event_type: PropertyEventType,
    pub object: Uuid,
    pub property: String,
    pub old_value: Variant,
    pub new_value: Variant,
    pub old_index: PropertyIndex,
    pub new_index: PropertyIndex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectEventType {
    AfterObjectCreated,
    BeforeObjectDestroyed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectEvent {
    pub event_type: ObjectEventType,
    pub object: Uuid,
}

pub type StructureHandler = Rc<dyn Fn(&mut DocumentObjectManager, &StructureEvent)>;
pub type PropertyHandler = Rc<dyn Fn(&mut DocumentObjectManager, &PropertyEvent)>;
pub type ObjectHandler = Rc<dyn Fn(&mut DocumentObjectManager, &ObjectEvent)>;
