use crate::{Variant, VariantType};
use std::sync::Arc;

/// How a property stores its values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyCategory {
    Member,
    Array,
    Set,
    Map,
}

impl PropertyCategory {
    /// Array and set values are addressed by position.
    pub fn is_ordered(self) -> bool {
        matches!(self, PropertyCategory::Array | PropertyCategory::Set)
    }
}

/// Structural markers on a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PropertyFlags {
    /// The value is an object of a reflected class.
    pub class: bool,
    /// The value refers to an object by GUID.
    pub pointer: bool,
    /// The pointed-to object is owned by (is a child of) the holder.
    pub pointer_owner: bool,
    pub is_enum: bool,
    pub bitflags: bool,
    /// Scratch data that does not take part in undo/redo.
    pub temporary: bool,
}

impl PropertyFlags {
    pub fn value() -> Self {
        Self::default()
    }

    pub fn embedded_class() -> Self {
        Self {
            class: true,
            ..Self::default()
        }
    }

    pub fn owned_pointer() -> Self {
        Self {
            class: true,
            pointer: true,
            pointer_owner: true,
            ..Self::default()
        }
    }

    /// Plain value property (not an object reference).
    pub fn is_value_type(&self) -> bool {
        !self.class && !self.pointer
    }

    /// Embedded class member, created together with its holder.
    pub fn is_embedded_class(&self) -> bool {
        self.class && !self.pointer
    }

    /// Holds child objects (embedded or owned).
    pub fn holds_objects(&self) -> bool {
        self.is_embedded_class() || (self.pointer && self.pointer_owner)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    pub name: String,
    pub category: PropertyCategory,
    pub flags: PropertyFlags,
    /// Element type; object references are stored as [`VariantType::Uuid`].
    pub value_type: VariantType,
    /// Class type for class and pointer properties. `None` accepts any type.
    pub specific_type: Option<String>,
    /// Default for members and for newly inserted container elements.
    pub default_value: Variant,
}

impl PropertyDescriptor {
    fn new(name: &str, category: PropertyCategory, flags: PropertyFlags, value_type: VariantType) -> Self {
        Self {
            name: name.to_string(),
            category,
            flags,
            value_type,
            specific_type: None,
            default_value: Variant::default_of(value_type),
        }
    }

    /// Value member such as a number or string.
    pub fn member(name: &str, value_type: VariantType) -> Self {
        Self::new(name, PropertyCategory::Member, PropertyFlags::value(), value_type)
    }

    /// Container of plain values.
    pub fn values(name: &str, category: PropertyCategory, value_type: VariantType) -> Self {
        Self::new(name, category, PropertyFlags::value(), value_type)
    }

    /// Member holding an embedded object of exactly `type_name`.
    pub fn embedded(name: &str, type_name: &str) -> Self {
        let mut property = Self::new(
            name,
            PropertyCategory::Member,
            PropertyFlags::embedded_class(),
            VariantType::Uuid,
        );
        property.specific_type = Some(type_name.to_string());
        property
    }

    /// Property owning child objects derived from `base_type` (any type if `None`).
    pub fn owned_objects(name: &str, category: PropertyCategory, base_type: Option<&str>) -> Self {
        let mut property = Self::new(name, category, PropertyFlags::owned_pointer(), VariantType::Uuid);
        property.specific_type = base_type.map(str::to_string);
        property
    }

    pub fn with_default(mut self, value: impl Into<Variant>) -> Self {
        self.default_value = value.into();
        self
    }

    pub fn with_flags(mut self, flags: PropertyFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn temporary(mut self) -> Self {
        self.flags.temporary = true;
        self
    }

    /// Empty value of this property for a freshly created object.
    pub fn initial_value(&self) -> Variant {
        match self.category {
            PropertyCategory::Member => self.default_value.clone(),
            PropertyCategory::Array | PropertyCategory::Set => Variant::Array(Vec::new()),
            PropertyCategory::Map => Variant::default_of(VariantType::Dictionary),
        }
    }
}

/// A reflected type: a name, an optional parent type, and its own properties.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
    pub name: String,
    pub parent: Option<Arc<TypeDescriptor>>,
    pub properties: Vec<PropertyDescriptor>,
}

impl TypeDescriptor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            parent: None,
            properties: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent: Arc<TypeDescriptor>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_property(mut self, property: PropertyDescriptor) -> Self {
        self.properties.push(property);
        self
    }

    /// Find a property on this type or any parent type.
    pub fn find_property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties
            .iter()
            .find(|property| property.name == name)
            .or_else(|| self.parent.as_ref().and_then(|parent| parent.find_property(name)))
    }

    /// All properties, parent properties first.
    pub fn all_properties(&self) -> Vec<&PropertyDescriptor> {
        let mut properties = self
            .parent
            .as_ref()
            .map(|parent| parent.all_properties())
            .unwrap_or_default();
        properties.extend(self.properties.iter());
        properties
    }

    pub fn is_derived_from(&self, base: &str) -> bool {
        self.name == base
            || self
                .parent
                .as_ref()
                .map(|parent| parent.is_derived_from(base))
                .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Arc<TypeDescriptor> {
        Arc::new(
            TypeDescriptor::new("Base").with_property(PropertyDescriptor::member("Name", VariantType::String)),
        )
    }

    #[test]
    fn test_find_property_walks_parents() {
        let derived = TypeDescriptor::new("Derived")
            .with_parent(base())
            .with_property(PropertyDescriptor::member("Value", VariantType::Int));

        assert!(derived.find_property("Value").is_some());
        assert!(derived.find_property("Name").is_some());
        assert!(derived.find_property("Missing").is_none());

        let names: Vec<_> = derived.all_properties().iter().map(|p| p.name.clone()).collect();
        assert_eq!(names, vec!["Name", "Value"]);
    }

    #[test]
    fn test_is_derived_from() {
        let derived = TypeDescriptor::new("Derived").with_parent(base());
        assert!(derived.is_derived_from("Derived"));
        assert!(derived.is_derived_from("Base"));
        assert!(!derived.is_derived_from("Other"));
    }

    #[test]
    fn test_flag_helpers() {
        assert!(PropertyFlags::value().is_value_type());
        assert!(PropertyFlags::embedded_class().is_embedded_class());
        assert!(PropertyFlags::owned_pointer().holds_objects());
        assert!(!PropertyFlags::owned_pointer().is_embedded_class());
    }
}
