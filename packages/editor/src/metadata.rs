//! Per-object meta data kept beside the object tree.
//!
//! Prefab links live here rather than in reflected properties so that they
//! survive copy/paste and are written to graphs under fixed property names.

use crate::object_graph::AbstractObjectGraph;
use plasma_common::{EventSource, SubscriptionId};
use plasma_reflection::Variant;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::rc::Rc;
use uuid::Uuid;

pub const META_FROM_PREFAB: &str = "MetaFromPrefab";
pub const META_PREFAB_SEED: &str = "MetaPrefabSeed";
pub const META_BASE_PREFAB: &str = "MetaBasePrefab";

/// Link of an object to the prefab template it was instantiated from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrefabMetaData {
    /// Asset GUID of the prefab template.
    pub create_from_prefab: Uuid,
    /// Seed the template's GUIDs were remapped with.
    pub prefab_seed_guid: Uuid,
    /// Graph text of the template at instantiation time.
    pub base_prefab: String,
}

impl PrefabMetaData {
    pub fn is_linked(&self) -> bool {
        !self.create_from_prefab.is_nil()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetaDataEvent {
    pub object: Uuid,
    pub data: PrefabMetaData,
}

pub type MetaDataHandler = Rc<dyn Fn(&MetaDataEvent)>;

#[derive(Debug, Default)]
pub struct ObjectMetaDataStore {
    data: HashMap<Uuid, PrefabMetaData>,
    events: EventSource<MetaDataHandler>,
}

impl ObjectMetaDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Meta data of `object`, default if none was ever set.
    pub fn get(&self, object: Uuid) -> PrefabMetaData {
        self.data.get(&object).cloned().unwrap_or_default()
    }

    pub fn modify(&mut self, object: Uuid, f: impl FnOnce(&mut PrefabMetaData)) {
        let entry = self.data.entry(object).or_default();
        f(entry);
        let data = entry.clone();
        if data == PrefabMetaData::default() {
            self.data.remove(&object);
        }
        let event = MetaDataEvent { object, data };
        for handler in self.events.snapshot() {
            handler(&event);
        }
    }

    pub fn clear(&mut self, object: Uuid) {
        self.data.remove(&object);
    }

    pub fn subscribe(&mut self, handler: MetaDataHandler) -> SubscriptionId {
        self.events.subscribe(handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Write the meta data of every node in `graph` as extra node properties.
    pub fn attach_meta_data(&self, graph: &mut AbstractObjectGraph) {
        for node in graph.nodes_mut() {
            let Some(data) = self.data.get(&node.guid) else {
                continue;
            };
            node.add_property(META_FROM_PREFAB, Variant::Uuid(data.create_from_prefab));
            node.add_property(META_PREFAB_SEED, Variant::Uuid(data.prefab_seed_guid));
            node.add_property(META_BASE_PREFAB, Variant::String(data.base_prefab.clone()));
        }
    }

    /// Read meta data written by [`Self::attach_meta_data`] back into the store.
    pub fn restore_meta_data(&mut self, graph: &AbstractObjectGraph) {
        for node in graph.nodes() {
            let Some(from_prefab) = node.find_property(META_FROM_PREFAB).and_then(|p| p.value.as_uuid()) else {
                continue;
            };
            let data = PrefabMetaData {
                create_from_prefab: from_prefab,
                prefab_seed_guid: node
                    .find_property(META_PREFAB_SEED)
                    .and_then(|p| p.value.as_uuid())
                    .unwrap_or_default(),
                base_prefab: node
                    .find_property(META_BASE_PREFAB)
                    .and_then(|p| p.value.as_str())
                    .unwrap_or_default()
                    .to_string(),
            };
            if data.is_linked() {
                self.data.insert(node.guid, data);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_modify_broadcasts_and_clears_defaults() {
        let mut store = ObjectMetaDataStore::new();
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        store.subscribe(Rc::new(move |_| counter.set(counter.get() + 1)));

        let object = Uuid::from_u128(1);
        store.modify(object, |m| m.create_from_prefab = Uuid::from_u128(9));
        assert!(store.get(object).is_linked());

        store.modify(object, |m| *m = PrefabMetaData::default());
        assert!(!store.get(object).is_linked());
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_graph_round_trip() {
        let object = Uuid::from_u128(1);
        let mut store = ObjectMetaDataStore::new();
        store.modify(object, |m| {
            m.create_from_prefab = Uuid::from_u128(9);
            m.prefab_seed_guid = Uuid::from_u128(3);
            m.base_prefab = "{}".into();
        });

        let mut graph = AbstractObjectGraph::new();
        graph.add_node(object, "Item", "root");
        graph.add_node(Uuid::from_u128(2), "Item", "");
        store.attach_meta_data(&mut graph);

        let mut restored = ObjectMetaDataStore::new();
        restored.restore_meta_data(&graph);
        assert_eq!(restored.get(object), store.get(object));
        assert!(!restored.get(Uuid::from_u128(2)).is_linked());
    }
}
