//! # Type accessors
//!
//! [`TypeAccessor`] is the capability interface through which the document
//! layer reads and writes the properties of one object. It never interprets
//! values beyond the structure given by the [`TypeDescriptor`].
//!
//! Index rules:
//!
//! - Member properties use [`PropertyIndex::None`]
//! - Array and Set properties use positions; `End` appends on insert
//! - Map properties use string keys
//! - `None` on a container addresses the whole container (read only)

use crate::{
    AccessorError, AccessorResult, PropertyCategory, PropertyDescriptor, PropertyIndex, TypeDescriptor, Variant,
    VariantType,
};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

pub trait TypeAccessor: fmt::Debug {
    fn type_descriptor(&self) -> &Arc<TypeDescriptor>;

    fn get_value(&self, property: &str, index: &PropertyIndex) -> AccessorResult<Variant>;

    fn set_value(&mut self, property: &str, value: Variant, index: &PropertyIndex) -> AccessorResult<()>;

    fn insert_value(&mut self, property: &str, index: &PropertyIndex, value: Variant) -> AccessorResult<()>;

    fn remove_value(&mut self, property: &str, index: &PropertyIndex) -> AccessorResult<()>;

    /// Move an element within an array or set. `new_index` is interpreted
    /// before the element is taken out, so moving behind oneself lands one
    /// slot earlier.
    fn move_value(&mut self, property: &str, old_index: &PropertyIndex, new_index: &PropertyIndex) -> AccessorResult<()>;

    /// Number of elements in a container property.
    fn count(&self, property: &str) -> AccessorResult<usize>;

    /// Keys of a map property, sorted.
    fn keys(&self, property: &str) -> AccessorResult<Vec<String>>;

    /// Every stored value with its index. Members yield one entry.
    fn indexed_values(&self, property: &str) -> AccessorResult<Vec<(PropertyIndex, Variant)>>;

    /// Where `child` is referenced inside `property`, if anywhere.
    fn property_child_index(&self, property: &str, child: Uuid) -> Option<PropertyIndex>;

    fn type_name(&self) -> &str {
        &self.type_descriptor().name
    }

    fn find_property(&self, property: &str) -> Option<&PropertyDescriptor> {
        self.type_descriptor().find_property(property)
    }
}

/// Default [`TypeAccessor`] that stores values by property name.
#[derive(Debug, Clone)]
pub struct ReflectedTypeStorage {
    descriptor: Arc<TypeDescriptor>,
    values: HashMap<String, Variant>,
}

impl ReflectedTypeStorage {
    /// Storage with every property at its initial value.
    pub fn new(descriptor: Arc<TypeDescriptor>) -> Self {
        let values = descriptor
            .all_properties()
            .into_iter()
            .map(|property| (property.name.clone(), property.initial_value()))
            .collect();
        Self { descriptor, values }
    }

    fn property(&self, property: &str) -> AccessorResult<PropertyDescriptor> {
        self.descriptor
            .find_property(property)
            .cloned()
            .ok_or_else(|| AccessorError::UnknownProperty {
                property: property.to_string(),
                type_name: self.descriptor.name.clone(),
            })
    }

    fn coerce(descriptor: &PropertyDescriptor, value: Variant) -> AccessorResult<Variant> {
        let expected = descriptor.value_type;
        let actual = value.variant_type();
        if expected == VariantType::Invalid || expected == actual {
            return Ok(value);
        }
        match (expected, &value) {
            (VariantType::Float, Variant::Int(v)) => Ok(Variant::Float(*v as f64)),
            _ => Err(AccessorError::TypeMismatch {
                property: descriptor.name.clone(),
                expected,
                actual,
            }),
        }
    }

    fn invalid_index(property: &str, index: &PropertyIndex) -> AccessorError {
        AccessorError::InvalidIndex {
            property: property.to_string(),
            index: index.clone(),
        }
    }

    fn array_mut(&mut self, property: &str) -> &mut Vec<Variant> {
        let slot = self
            .values
            .entry(property.to_string())
            .or_insert_with(|| Variant::Array(Vec::new()));
        if !matches!(slot, Variant::Array(_)) {
            *slot = Variant::Array(Vec::new());
        }
        match slot {
            Variant::Array(values) => values,
            _ => unreachable!("slot was just normalized to an array"),
        }
    }

    fn map_mut(&mut self, property: &str) -> &mut BTreeMap<String, Variant> {
        let slot = self
            .values
            .entry(property.to_string())
            .or_insert_with(|| Variant::Dictionary(BTreeMap::new()));
        if !matches!(slot, Variant::Dictionary(_)) {
            *slot = Variant::Dictionary(BTreeMap::new());
        }
        match slot {
            Variant::Dictionary(values) => values,
            _ => unreachable!("slot was just normalized to a dictionary"),
        }
    }

    fn array(&self, property: &str) -> &[Variant] {
        self.values
            .get(property)
            .and_then(Variant::as_array)
            .unwrap_or(&[])
    }

    fn map(&self, property: &str) -> Option<&BTreeMap<String, Variant>> {
        self.values.get(property).and_then(Variant::as_dictionary)
    }
}

impl TypeAccessor for ReflectedTypeStorage {
    fn type_descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.descriptor
    }

    fn get_value(&self, property: &str, index: &PropertyIndex) -> AccessorResult<Variant> {
        let descriptor = self.property(property)?;
        match (descriptor.category, index) {
            (_, PropertyIndex::None) => Ok(self
                .values
                .get(property)
                .cloned()
                .unwrap_or_else(|| descriptor.initial_value())),
            (PropertyCategory::Array | PropertyCategory::Set, PropertyIndex::Position(position)) => self
                .array(property)
                .get(*position)
                .cloned()
                .ok_or_else(|| Self::invalid_index(property, index)),
            (PropertyCategory::Map, PropertyIndex::Key(key)) => self
                .map(property)
                .and_then(|map| map.get(key))
                .cloned()
                .ok_or_else(|| Self::invalid_index(property, index)),
            _ => Err(Self::invalid_index(property, index)),
        }
    }

    fn set_value(&mut self, property: &str, value: Variant, index: &PropertyIndex) -> AccessorResult<()> {
        let descriptor = self.property(property)?;
        let value = Self::coerce(&descriptor, value)?;
        match (descriptor.category, index) {
            (PropertyCategory::Member, PropertyIndex::None) => {
                self.values.insert(property.to_string(), value);
                Ok(())
            }
            (category @ (PropertyCategory::Array | PropertyCategory::Set), PropertyIndex::Position(position)) => {
                let position = *position;
                let values = self.array_mut(property);
                if position >= values.len() {
                    return Err(Self::invalid_index(property, index));
                }
                if category == PropertyCategory::Set
                    && values.iter().enumerate().any(|(i, v)| i != position && *v == value)
                {
                    return Err(AccessorError::DuplicateValue {
                        property: property.to_string(),
                    });
                }
                values[position] = value;
                Ok(())
            }
            (PropertyCategory::Map, PropertyIndex::Key(key)) => {
                let map = self.map_mut(property);
                match map.get_mut(key) {
                    Some(slot) => {
                        *slot = value;
                        Ok(())
                    }
                    None => Err(Self::invalid_index(property, index)),
                }
            }
            _ => Err(Self::invalid_index(property, index)),
        }
    }

    fn insert_value(&mut self, property: &str, index: &PropertyIndex, value: Variant) -> AccessorResult<()> {
        let descriptor = self.property(property)?;
        let value = Self::coerce(&descriptor, value)?;
        match descriptor.category {
            PropertyCategory::Member => Err(AccessorError::NotAContainer(property.to_string())),
            category @ (PropertyCategory::Array | PropertyCategory::Set) => {
                let values = self.array_mut(property);
                let position = match index {
                    PropertyIndex::End => values.len(),
                    PropertyIndex::Position(position) if *position <= values.len() => *position,
                    _ => return Err(Self::invalid_index(property, index)),
                };
                if category == PropertyCategory::Set && values.contains(&value) {
                    return Err(AccessorError::DuplicateValue {
                        property: property.to_string(),
                    });
                }
                values.insert(position, value);
                Ok(())
            }
            PropertyCategory::Map => {
                let key = index
                    .key()
                    .ok_or_else(|| Self::invalid_index(property, index))?
                    .to_string();
                let map = self.map_mut(property);
                if map.contains_key(&key) {
                    return Err(AccessorError::DuplicateKey {
                        property: property.to_string(),
                        key,
                    });
                }
                map.insert(key, value);
                Ok(())
            }
        }
    }

    fn remove_value(&mut self, property: &str, index: &PropertyIndex) -> AccessorResult<()> {
        let descriptor = self.property(property)?;
        match (descriptor.category, index) {
            (PropertyCategory::Member, _) => Err(AccessorError::NotAContainer(property.to_string())),
            (PropertyCategory::Array | PropertyCategory::Set, PropertyIndex::Position(position)) => {
                let values = self.array_mut(property);
                if *position >= values.len() {
                    return Err(Self::invalid_index(property, index));
                }
                values.remove(*position);
                Ok(())
            }
            (PropertyCategory::Map, PropertyIndex::Key(key)) => match self.map_mut(property).remove(key) {
                Some(_) => Ok(()),
                None => Err(Self::invalid_index(property, index)),
            },
            _ => Err(Self::invalid_index(property, index)),
        }
    }

    fn move_value(&mut self, property: &str, old_index: &PropertyIndex, new_index: &PropertyIndex) -> AccessorResult<()> {
        let descriptor = self.property(property)?;
        if !descriptor.category.is_ordered() {
            return Err(AccessorError::NotAContainer(property.to_string()));
        }
        let values = self.array_mut(property);
        let count = values.len();
        let old = old_index
            .position()
            .filter(|old| *old < count)
            .ok_or_else(|| Self::invalid_index(property, old_index))?;
        let mut new = match new_index {
            PropertyIndex::End => count,
            PropertyIndex::Position(position) if *position <= count => *position,
            _ => return Err(Self::invalid_index(property, new_index)),
        };
        let value = values.remove(old);
        if new > old {
            new -= 1;
        }
        values.insert(new, value);
        Ok(())
    }

    fn count(&self, property: &str) -> AccessorResult<usize> {
        let descriptor = self.property(property)?;
        match descriptor.category {
            PropertyCategory::Member => Err(AccessorError::NotAContainer(property.to_string())),
            PropertyCategory::Array | PropertyCategory::Set => Ok(self.array(property).len()),
            PropertyCategory::Map => Ok(self.map(property).map(BTreeMap::len).unwrap_or(0)),
        }
    }

    fn keys(&self, property: &str) -> AccessorResult<Vec<String>> {
        let descriptor = self.property(property)?;
        match descriptor.category {
            PropertyCategory::Map => Ok(self
                .map(property)
                .map(|map| map.keys().cloned().collect())
                .unwrap_or_default()),
            _ => Err(AccessorError::NotAContainer(property.to_string())),
        }
    }

    fn indexed_values(&self, property: &str) -> AccessorResult<Vec<(PropertyIndex, Variant)>> {
        let descriptor = self.property(property)?;
        Ok(match descriptor.category {
            PropertyCategory::Member => vec![(PropertyIndex::None, self.get_value(property, &PropertyIndex::None)?)],
            PropertyCategory::Array | PropertyCategory::Set => self
                .array(property)
                .iter()
                .enumerate()
                .map(|(i, value)| (PropertyIndex::Position(i), value.clone()))
                .collect(),
            PropertyCategory::Map => self
                .map(property)
                .map(|map| {
                    map.iter()
                        .map(|(key, value)| (PropertyIndex::Key(key.clone()), value.clone()))
                        .collect()
                })
                .unwrap_or_default(),
        })
    }

    fn property_child_index(&self, property: &str, child: Uuid) -> Option<PropertyIndex> {
        let descriptor = self.descriptor.find_property(property)?;
        let target = Variant::Uuid(child);
        match descriptor.category {
            PropertyCategory::Member => (self.values.get(property) == Some(&target)).then_some(PropertyIndex::None),
            PropertyCategory::Array | PropertyCategory::Set => self
                .array(property)
                .iter()
                .position(|value| *value == target)
                .map(PropertyIndex::Position),
            PropertyCategory::Map => self
                .map(property)?
                .iter()
                .find(|(_, value)| **value == target)
                .map(|(key, _)| PropertyIndex::Key(key.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> ReflectedTypeStorage {
        let descriptor = TypeDescriptor::new("Test")
            .with_property(PropertyDescriptor::member("Name", VariantType::String).with_default("unnamed"))
            .with_property(PropertyDescriptor::member("Weight", VariantType::Float))
            .with_property(PropertyDescriptor::values("Items", PropertyCategory::Array, VariantType::Int))
            .with_property(PropertyDescriptor::values("Tags", PropertyCategory::Set, VariantType::String))
            .with_property(PropertyDescriptor::values("Lookup", PropertyCategory::Map, VariantType::Int));
        ReflectedTypeStorage::new(Arc::new(descriptor))
    }

    fn items(storage: &ReflectedTypeStorage) -> Vec<i64> {
        storage
            .indexed_values("Items")
            .unwrap()
            .into_iter()
            .map(|(_, v)| v.as_int().unwrap())
            .collect()
    }

    #[test]
    fn test_member_defaults_and_set() {
        let mut s = storage();
        assert_eq!(s.get_value("Name", &PropertyIndex::None).unwrap(), Variant::from("unnamed"));
        s.set_value("Name", "box".into(), &PropertyIndex::None).unwrap();
        assert_eq!(s.get_value("Name", &PropertyIndex::None).unwrap(), Variant::from("box"));
    }

    #[test]
    fn test_type_mismatch_and_int_to_float() {
        let mut s = storage();
        let err = s.set_value("Name", Variant::Int(3), &PropertyIndex::None).unwrap_err();
        assert!(matches!(err, AccessorError::TypeMismatch { .. }));

        s.set_value("Weight", Variant::Int(3), &PropertyIndex::None).unwrap();
        assert_eq!(s.get_value("Weight", &PropertyIndex::None).unwrap(), Variant::Float(3.0));
    }

    #[test]
    fn test_unknown_property() {
        let s = storage();
        let err = s.get_value("Nope", &PropertyIndex::None).unwrap_err();
        assert!(matches!(err, AccessorError::UnknownProperty { .. }));
    }

    #[test]
    fn test_array_insert_remove() {
        let mut s = storage();
        s.insert_value("Items", &PropertyIndex::End, Variant::Int(1)).unwrap();
        s.insert_value("Items", &PropertyIndex::End, Variant::Int(3)).unwrap();
        s.insert_value("Items", &PropertyIndex::Position(1), Variant::Int(2)).unwrap();
        assert_eq!(items(&s), vec![1, 2, 3]);
        assert_eq!(s.count("Items").unwrap(), 3);

        assert!(s.insert_value("Items", &PropertyIndex::Position(5), Variant::Int(9)).is_err());

        s.remove_value("Items", &PropertyIndex::Position(0)).unwrap();
        assert_eq!(items(&s), vec![2, 3]);
        assert!(s.remove_value("Items", &PropertyIndex::Position(2)).is_err());
    }

    #[test]
    fn test_move_value_index_semantics() {
        let mut s = storage();
        for v in 0..4 {
            s.insert_value("Items", &PropertyIndex::End, Variant::Int(v)).unwrap();
        }
        // Moving to 3 from 0 lands at 2 because the element is taken out first.
        s.move_value("Items", &PropertyIndex::Position(0), &PropertyIndex::Position(3)).unwrap();
        assert_eq!(items(&s), vec![1, 2, 0, 3]);

        s.move_value("Items", &PropertyIndex::Position(3), &PropertyIndex::Position(0)).unwrap();
        assert_eq!(items(&s), vec![3, 1, 2, 0]);

        s.move_value("Items", &PropertyIndex::Position(0), &PropertyIndex::End).unwrap();
        assert_eq!(items(&s), vec![1, 2, 0, 3]);
    }

    #[test]
    fn test_set_rejects_duplicates() {
        let mut s = storage();
        s.insert_value("Tags", &PropertyIndex::End, "a".into()).unwrap();
        let err = s.insert_value("Tags", &PropertyIndex::End, "a".into()).unwrap_err();
        assert!(matches!(err, AccessorError::DuplicateValue { .. }));
    }

    #[test]
    fn test_map_keys() {
        let mut s = storage();
        s.insert_value("Lookup", &"b".into(), Variant::Int(2)).unwrap();
        s.insert_value("Lookup", &"a".into(), Variant::Int(1)).unwrap();
        assert_eq!(s.keys("Lookup").unwrap(), vec!["a", "b"]);

        let err = s.insert_value("Lookup", &"a".into(), Variant::Int(5)).unwrap_err();
        assert!(matches!(err, AccessorError::DuplicateKey { .. }));

        s.set_value("Lookup", Variant::Int(7), &"a".into()).unwrap();
        assert_eq!(s.get_value("Lookup", &"a".into()).unwrap(), Variant::Int(7));
        assert!(s.set_value("Lookup", Variant::Int(7), &"zz".into()).is_err());

        s.remove_value("Lookup", &"a".into()).unwrap();
        assert_eq!(s.count("Lookup").unwrap(), 1);
        assert!(s.move_value("Lookup", &"b".into(), &"c".into()).is_err());
    }

    #[test]
    fn test_property_child_index() {
        let descriptor = TypeDescriptor::new("Holder")
            .with_property(PropertyDescriptor::owned_objects("Children", PropertyCategory::Array, None))
            .with_property(PropertyDescriptor::owned_objects("Named", PropertyCategory::Map, None));
        let mut s = ReflectedTypeStorage::new(Arc::new(descriptor));
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        s.insert_value("Children", &PropertyIndex::End, a.into()).unwrap();
        s.insert_value("Named", &"key".into(), b.into()).unwrap();

        assert_eq!(s.property_child_index("Children", a), Some(PropertyIndex::Position(0)));
        assert_eq!(s.property_child_index("Named", b), Some(PropertyIndex::Key("key".into())));
        assert_eq!(s.property_child_index("Children", b), None);
    }
}
