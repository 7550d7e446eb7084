use crate::errors::{DocumentError, Status};
use crate::events::{StructureEvent, StructureEventType};
use crate::object_manager::DocumentObjectManager;
use plasma_common::SubscriptionId;
use std::cell::RefCell;
use std::rc::Rc;
use uuid::Uuid;

/// Ordered set of selected objects.
///
/// Objects leaving the tree are dropped from the selection together with
/// any selected descendants.
#[derive(Debug)]
pub struct SelectionManager {
    selection: Rc<RefCell<Vec<Uuid>>>,
    subscription: SubscriptionId,
}

impl SelectionManager {
    pub fn new(manager: &mut DocumentObjectManager) -> Self {
        let selection = Rc::new(RefCell::new(Vec::new()));
        let tracked = selection.clone();
        let subscription = manager.subscribe_structure_events(Rc::new(
            move |manager: &mut DocumentObjectManager, event: &StructureEvent| {
                if event.event_type == StructureEventType::BeforeObjectRemoved {
                    tracked
                        .borrow_mut()
                        .retain(|selected| !manager.is_under(*selected, event.object));
                }
            },
        ));
        Self {
            selection,
            subscription,
        }
    }

    /// Stop tracking `manager`. Call before dropping the manager's storage.
    pub fn detach(&self, manager: &mut DocumentObjectManager) {
        manager.unsubscribe_structure_events(self.subscription);
    }

    pub fn selection(&self) -> Vec<Uuid> {
        self.selection.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.selection.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.selection.borrow().is_empty()
    }

    pub fn contains(&self, object: Uuid) -> bool {
        self.selection.borrow().contains(&object)
    }

    pub fn clear(&mut self) {
        self.selection.borrow_mut().clear();
    }

    /// Replace the selection. Objects that may not be selected are skipped
    /// and the first refusal is returned.
    pub fn set_selection(&mut self, manager: &DocumentObjectManager, objects: &[Uuid]) -> Status {
        let mut first_error = None;
        let mut selection = Vec::with_capacity(objects.len());
        for object in objects {
            match manager.can_select(*object) {
                Ok(()) if !selection.contains(object) => selection.push(*object),
                Ok(()) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        *self.selection.borrow_mut() = selection;
        first_error.map_or(Ok(()), Err)
    }

    pub fn add_object(&mut self, manager: &DocumentObjectManager, object: Uuid) -> Status {
        manager.can_select(object)?;
        let mut selection = self.selection.borrow_mut();
        if !selection.contains(&object) {
            selection.push(object);
        }
        Ok(())
    }

    pub fn remove_object(&mut self, object: Uuid) -> bool {
        let mut selection = self.selection.borrow_mut();
        let before = selection.len();
        selection.retain(|selected| *selected != object);
        selection.len() != before
    }

    /// Selected objects without a selected ancestor, in selection order.
    pub fn top_level_selection(&self, manager: &DocumentObjectManager) -> Vec<Uuid> {
        let selection = self.selection.borrow();
        selection
            .iter()
            .copied()
            .filter(|object| {
                !selection
                    .iter()
                    .any(|other| other != object && manager.is_under(*object, *other))
            })
            .collect()
    }

    pub fn first(&self) -> Result<Uuid, DocumentError> {
        self.selection
            .borrow()
            .first()
            .copied()
            .ok_or_else(|| DocumentError::not_allowed("Nothing is selected"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_manager::CHILDREN_PROPERTY;
    use plasma_reflection::{PropertyCategory, PropertyDescriptor, PropertyIndex, TypeDescriptor, TypeRegistry};
    use std::sync::Arc;

    fn manager() -> DocumentObjectManager {
        let registry = Arc::new(TypeRegistry::new());
        registry.register(
            TypeDescriptor::new("Group").with_property(PropertyDescriptor::owned_objects(
                "Children",
                PropertyCategory::Array,
                None,
            )),
        );
        DocumentObjectManager::new(registry)
    }

    fn add(m: &mut DocumentObjectManager, parent: Option<Uuid>) -> Uuid {
        let object = m.create_object("Group", None).unwrap();
        m.add_object(object, parent, CHILDREN_PROPERTY, PropertyIndex::End).unwrap();
        object
    }

    #[test]
    fn test_removal_drops_selected_descendants() {
        let mut m = manager();
        let mut selection = SelectionManager::new(&mut m);
        let outer = add(&mut m, None);
        let inner = add(&mut m, Some(outer));
        let other = add(&mut m, None);

        selection.set_selection(&m, &[inner, other]).unwrap();
        m.remove_object(outer).unwrap();

        assert_eq!(selection.selection(), vec![other]);
    }

    #[test]
    fn test_detached_objects_cannot_be_selected() {
        let mut m = manager();
        let mut selection = SelectionManager::new(&mut m);
        let loose = m.create_object("Group", None).unwrap();
        assert!(selection.add_object(&m, loose).is_err());
        assert!(selection.is_empty());
    }

    #[test]
    fn test_top_level_selection() {
        let mut m = manager();
        let mut selection = SelectionManager::new(&mut m);
        let outer = add(&mut m, None);
        let inner = add(&mut m, Some(outer));
        selection.set_selection(&m, &[inner, outer]).unwrap();
        assert_eq!(selection.top_level_selection(&m), vec![outer]);
    }
}
