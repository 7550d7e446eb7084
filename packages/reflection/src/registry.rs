use crate::TypeDescriptor;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Registry of all reflected types, shared between documents.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: RwLock<HashMap<String, Arc<TypeDescriptor>>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type, replacing any previous type of the same name.
    pub fn register(&self, descriptor: TypeDescriptor) -> Arc<TypeDescriptor> {
        let descriptor = Arc::new(descriptor);
        self.types
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(descriptor.name.clone(), descriptor.clone());
        descriptor
    }

    /// Register a type only if no type of that name exists yet.
    pub fn register_if_missing(&self, descriptor: TypeDescriptor) -> Arc<TypeDescriptor> {
        let mut types = self.types.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        types
            .entry(descriptor.name.clone())
            .or_insert_with(|| Arc::new(descriptor))
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<TypeDescriptor>> {
        self.types
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Whether `type_name` is `base` or derives from it. Unknown types never match.
    pub fn is_derived_from(&self, type_name: &str, base: &str) -> bool {
        self.get(type_name)
            .map(|descriptor| descriptor.is_derived_from(base))
            .unwrap_or(false)
    }

    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .types
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let registry = TypeRegistry::new();
        let base = registry.register(TypeDescriptor::new("Base"));
        registry.register(TypeDescriptor::new("Derived").with_parent(base));

        assert!(registry.contains("Base"));
        assert!(registry.is_derived_from("Derived", "Base"));
        assert!(!registry.is_derived_from("Base", "Derived"));
        assert!(!registry.is_derived_from("Unknown", "Base"));
        assert_eq!(registry.type_names(), vec!["Base", "Derived"]);
    }

    #[test]
    fn test_register_if_missing_keeps_existing() {
        let registry = TypeRegistry::new();
        let first = registry.register(TypeDescriptor::new("T"));
        let second = registry.register_if_missing(TypeDescriptor::new("T").with_parent(first.clone()));
        assert!(Arc::ptr_eq(&first, &second));
    }
}
