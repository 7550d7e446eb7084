//! Clipboard paste and prefab instantiation through the command history.

use glam::Vec2;
use plasma_editor::{
    copy_objects, AddObjectCommand, Command, CommandHistory, DefaultNodeGraphPolicy, Document, DocumentError,
    DocumentObjectManager, InstantiatePrefabCommand, MoveNodeCommand, NodeDocument, ObjectDocument,
    ObjectManagerPolicy, PasteObjectsCommand, SetObjectPropertyCommand, Status, UnlinkPrefabCommand, CHILDREN_PROPERTY,
    NODES_MIME, NOT_ALL_PASTED, OBJECTS_MIME, PREFAB_ROOT_TYPE,
};
use plasma_reflection::{PropertyCategory, PropertyDescriptor, PropertyIndex, TypeDescriptor, TypeRegistry, Variant, VariantType};
use std::rc::Rc;
use std::sync::Arc;
use uuid::Uuid;

fn registry() -> Arc<TypeRegistry> {
    let registry = Arc::new(TypeRegistry::new());
    registry.register(
        TypeDescriptor::new("Shape")
            .with_property(PropertyDescriptor::member("Name", VariantType::String))
            .with_property(PropertyDescriptor::owned_objects("Parts", PropertyCategory::Array, None)),
    );
    registry
}

fn run(history: &mut CommandHistory, doc: &mut ObjectDocument, command: Box<dyn Command>) -> Result<(), DocumentError> {
    history.start_transaction("Edit");
    let result = history.add_command(doc, command);
    history.finish_transaction(doc).unwrap();
    result
}

fn add_named(history: &mut CommandHistory, doc: &mut ObjectDocument, parent: Option<Uuid>, property: &str, name: &str) -> Uuid {
    let add = AddObjectCommand::new("Shape", parent, property, PropertyIndex::End);
    let guid = add.guid();
    run(history, doc, Box::new(add)).unwrap();
    run(
        history,
        doc,
        Box::new(SetObjectPropertyCommand::new(guid, "Name", Variant::String(name.into()), PropertyIndex::None)),
    )
    .unwrap();
    guid
}

fn children(doc: &ObjectDocument, parent: Option<Uuid>) -> Vec<Uuid> {
    let objects = doc.object_manager();
    objects
        .children_in(parent.unwrap_or(objects.root()), CHILDREN_PROPERTY)
        .unwrap()
}

fn name(doc: &ObjectDocument, object: Uuid) -> String {
    doc.object_manager()
        .get_value(object, "Name", &PropertyIndex::None)
        .unwrap()
        .as_str()
        .unwrap()
        .to_string()
}

fn template_text() -> String {
    let mut template = ObjectDocument::new(registry());
    let mut history = CommandHistory::new();
    let body = add_named(&mut history, &mut template, None, CHILDREN_PROPERTY, "body");
    add_named(&mut history, &mut template, Some(body), "Parts", "wheel");
    copy_objects(template.object_manager(), &[body])
        .unwrap()
        .unwrap()
        .to_text()
        .unwrap()
}

#[test]
fn test_paste_copies_with_new_guids() {
    let mut doc = ObjectDocument::new(registry());
    let mut history = CommandHistory::new();
    let a = add_named(&mut history, &mut doc, None, CHILDREN_PROPERTY, "a");
    add_named(&mut history, &mut doc, Some(a), "Parts", "a.part");
    let b = add_named(&mut history, &mut doc, None, CHILDREN_PROPERTY, "b");

    let text = copy_objects(doc.object_manager(), &[a, b]).unwrap().unwrap().to_text().unwrap();
    run(&mut history, &mut doc, Box::new(PasteObjectsCommand::new(None, text, OBJECTS_MIME))).unwrap();

    let all = children(&doc, None);
    assert_eq!(all.len(), 4);
    let (copy_a, copy_b) = (all[2], all[3]);
    assert!(copy_a != a && copy_b != b);
    assert_eq!(name(&doc, copy_a), "a");
    assert_eq!(name(&doc, copy_b), "b");

    let parts = doc.object_manager().children_in(copy_a, "Parts").unwrap();
    assert_eq!(parts.len(), 1);
    assert_eq!(name(&doc, parts[0]), "a.part");
    assert!(doc.object_manager().contains(parts[0]));

    history.undo(&mut doc).unwrap();
    assert_eq!(children(&doc, None), vec![a, b]);
    history.redo(&mut doc).unwrap();
    assert_eq!(children(&doc, None), all);
}

#[test]
fn test_paste_into_refusing_parent_fails() {
    let mut doc = ObjectDocument::new(registry());
    let mut history = CommandHistory::new();
    let a = add_named(&mut history, &mut doc, None, CHILDREN_PROPERTY, "a");
    let text = copy_objects(doc.object_manager(), &[a]).unwrap().unwrap().to_text().unwrap();
    let live = doc.object_manager().live_object_count();
    let steps = history.undo_depth();

    // Shapes have no `Children` property to paste into.
    let result = run(&mut history, &mut doc, Box::new(PasteObjectsCommand::new(Some(a), text, OBJECTS_MIME)));
    match result {
        Err(DocumentError::Command(message)) => assert_eq!(message, "Paste Objects: nothing was pasted!"),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(doc.object_manager().live_object_count(), live);
    assert_eq!(history.undo_depth(), steps);
}

/// Keeps `Locked` objects out of the document root.
struct NoLockedAtRoot;

impl ObjectManagerPolicy for NoLockedAtRoot {
    fn can_add(
        &self,
        manager: &DocumentObjectManager,
        type_name: &str,
        parent: Uuid,
        _property: &str,
        _index: &PropertyIndex,
    ) -> Status {
        if type_name == "Locked" && parent == manager.root() {
            return Err(DocumentError::NotAllowed("Locked objects stay nested.".to_string()));
        }
        Ok(())
    }
}

#[test]
fn test_partial_paste_reports_status() {
    let registry = registry();
    registry.register(TypeDescriptor::new("Locked"));
    let mut source = ObjectDocument::new(registry.clone());
    let mut history = CommandHistory::new();
    let shape = add_named(&mut history, &mut source, None, CHILDREN_PROPERTY, "shape");
    let add = AddObjectCommand::new("Locked", None, CHILDREN_PROPERTY, PropertyIndex::End);
    let locked = add.guid();
    run(&mut history, &mut source, Box::new(add)).unwrap();
    let text = copy_objects(source.object_manager(), &[shape, locked])
        .unwrap()
        .unwrap()
        .to_text()
        .unwrap();

    let mut doc = ObjectDocument::with_policy(registry, Rc::new(NoLockedAtRoot));
    let mut history = CommandHistory::new();
    assert_eq!(doc.last_status(), None);
    run(&mut history, &mut doc, Box::new(PasteObjectsCommand::new(None, text, OBJECTS_MIME))).unwrap();

    let pasted = children(&doc, None);
    assert_eq!(pasted.len(), 1);
    assert_eq!(name(&doc, pasted[0]), "shape");
    assert_eq!(doc.last_status(), Some(NOT_ALL_PASTED));
}

fn node_document() -> NodeDocument {
    let registry = Arc::new(TypeRegistry::new());
    registry.register(TypeDescriptor::new("Node"));
    NodeDocument::new(registry, Rc::new(DefaultNodeGraphPolicy))
}

fn run_on_nodes(history: &mut CommandHistory, doc: &mut NodeDocument, command: Box<dyn Command>) {
    history.start_transaction("Edit");
    history.add_command(doc, command).unwrap();
    history.finish_transaction(doc).unwrap();
}

#[test]
fn test_paste_nodes_centers_on_picked_position() {
    let mut doc = node_document();
    let mut history = CommandHistory::new();
    let mut originals = Vec::new();
    for x in [0.0, 10.0] {
        let add = AddObjectCommand::new("Node", None, CHILDREN_PROPERTY, PropertyIndex::End);
        let guid = add.guid();
        run_on_nodes(&mut history, &mut doc, Box::new(add));
        run_on_nodes(&mut history, &mut doc, Box::new(MoveNodeCommand::new(guid, Vec2::new(x, 0.0))));
        originals.push(guid);
    }

    let text = doc.nodes().copy_selected_objects(&originals).unwrap().unwrap().to_text().unwrap();
    doc.set_picked_position(Some(Vec2::new(100.0, 100.0)));
    run_on_nodes(&mut history, &mut doc, Box::new(PasteObjectsCommand::new(None, text, NODES_MIME)));

    let selected = doc.selection().selection();
    assert_eq!(selected.len(), 2);
    assert!(selected.iter().all(|node| !originals.contains(node)));
    let mut positions: Vec<Vec2> = selected.iter().filter_map(|node| doc.nodes().get_node_pos(*node)).collect();
    positions.sort_by(|a, b| a.x.total_cmp(&b.x));
    assert_eq!(positions, vec![Vec2::new(95.0, 100.0), Vec2::new(105.0, 100.0)]);
    assert_eq!(doc.last_status(), None);

    history.undo(&mut doc).unwrap();
    assert!(doc.selection().is_empty());
    assert_eq!(doc.nodes().get_node_pos(originals[1]), Some(Vec2::new(10.0, 0.0)));
}

#[test]
fn test_paste_rejects_malformed_graph() {
    let mut doc = ObjectDocument::new(registry());
    let mut history = CommandHistory::new();
    let result = run(&mut history, &mut doc, Box::new(PasteObjectsCommand::new(None, "not a graph", OBJECTS_MIME)));
    assert!(result.is_err());
    assert!(children(&doc, None).is_empty());
}

#[test]
fn test_instantiate_prefab_links_root() {
    let mut doc = ObjectDocument::new(registry());
    let mut history = CommandHistory::new();
    let prefab_asset = Uuid::new_v4();
    let seed = Uuid::new_v4();

    let command = InstantiatePrefabCommand::new(None, prefab_asset, template_text()).with_remap_guid(seed);
    let root = command.created_root_object();
    assert_eq!(root, seed);
    run(&mut history, &mut doc, Box::new(command)).unwrap();

    assert_eq!(children(&doc, None), vec![root]);
    assert_eq!(doc.object_manager().get_object(root).unwrap().type_name(), PREFAB_ROOT_TYPE);
    let bodies = children(&doc, Some(root));
    assert_eq!(bodies.len(), 1);
    assert_eq!(name(&doc, bodies[0]), "body");
    let wheels = doc.object_manager().children_in(bodies[0], "Parts").unwrap();
    assert_eq!(name(&doc, wheels[0]), "wheel");

    let meta = doc.meta_data().get(root);
    assert!(meta.is_linked());
    assert_eq!(meta.create_from_prefab, prefab_asset);
    assert_eq!(meta.prefab_seed_guid, seed);

    history.undo(&mut doc).unwrap();
    assert!(children(&doc, None).is_empty());
    history.redo(&mut doc).unwrap();
    assert_eq!(children(&doc, None), vec![root]);
}

#[test]
fn test_instantiating_twice_gives_distinct_objects() {
    let mut doc = ObjectDocument::new(registry());
    let mut history = CommandHistory::new();
    let text = template_text();
    let asset = Uuid::new_v4();

    run(&mut history, &mut doc, Box::new(InstantiatePrefabCommand::new(None, asset, text.clone()))).unwrap();
    run(&mut history, &mut doc, Box::new(InstantiatePrefabCommand::new(None, asset, text))).unwrap();

    let roots = children(&doc, None);
    assert_eq!(roots.len(), 2);
    let first = children(&doc, Some(roots[0]));
    let second = children(&doc, Some(roots[1]));
    assert_ne!(first, second);
}

#[test]
fn test_prefab_without_template_guid_fails() {
    let mut doc = ObjectDocument::new(registry());
    let mut history = CommandHistory::new();
    let result = run(
        &mut history,
        &mut doc,
        Box::new(InstantiatePrefabCommand::new(None, Uuid::nil(), template_text())),
    );
    assert!(matches!(result, Err(DocumentError::Command(_))));
}

#[test]
fn test_prefab_is_not_linked_when_document_disallows_it() {
    let mut doc = ObjectDocument::new(registry());
    doc.set_allows_prefabs(false);
    let mut history = CommandHistory::new();
    let command = InstantiatePrefabCommand::new(None, Uuid::new_v4(), template_text());
    let root = command.created_root_object();
    run(&mut history, &mut doc, Box::new(command)).unwrap();

    assert!(doc.object_manager().contains(root));
    assert!(!doc.meta_data().get(root).is_linked());
    assert_eq!(
        doc.last_status(),
        Some("Nested prefabs are not allowed. Instantiated object will not be linked to prefab template.")
    );
}

#[test]
fn test_unlink_prefab_is_undoable() {
    let mut doc = ObjectDocument::new(registry());
    let mut history = CommandHistory::new();
    let command = InstantiatePrefabCommand::new(None, Uuid::new_v4(), template_text());
    let root = command.created_root_object();
    run(&mut history, &mut doc, Box::new(command)).unwrap();

    run(&mut history, &mut doc, Box::new(UnlinkPrefabCommand::new(root))).unwrap();
    assert!(!doc.meta_data().get(root).is_linked());
    history.undo(&mut doc).unwrap();
    assert!(doc.meta_data().get(root).is_linked());

    let plain = children(&doc, Some(root))[0];
    assert!(run(&mut history, &mut doc, Box::new(UnlinkPrefabCommand::new(plain))).is_err());
}
