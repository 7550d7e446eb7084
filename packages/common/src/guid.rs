//! # GUID helpers
//!
//! Object identity across the editor is a [`Uuid`]. Three derivations matter:
//!
//! - random GUIDs for freshly created objects and paste seeds
//! - stable GUIDs derived from a string, used for embedded sub-objects
//!   (`"<parentGuid>/<propertyName>"`), so the same parent always yields the
//!   same child identity
//! - seed combination, used to remap a whole object graph on paste or prefab
//!   instantiation, which is reversible with the same seed

use uuid::Uuid;

/// Namespace for [`stable_uuid_from_string`]. Part of the persisted format:
/// changing it changes every embedded object GUID.
pub const STABLE_UUID_NAMESPACE: Uuid = Uuid::from_u128(0x8c1f_54a2_3b7e_4d09_9a61_0f2e_c4d8_7b35);

/// Create a new random GUID.
pub fn make_uuid() -> Uuid {
    Uuid::new_v4()
}

/// Derive a GUID deterministically from a string (UUID v5 in
/// [`STABLE_UUID_NAMESPACE`]).
pub fn stable_uuid_from_string(value: &str) -> Uuid {
    Uuid::new_v5(&STABLE_UUID_NAMESPACE, value.as_bytes())
}

/// GUID of the embedded sub-object stored in `property` of `parent`.
pub fn embedded_object_guid(parent: Uuid, property: &str) -> Uuid {
    stable_uuid_from_string(&format!("{}/{}", parent.hyphenated(), property))
}

/// Combine a GUID with a seed. Both 64-bit halves are added with wrapping
/// arithmetic, so [`revert_combination_with_seed`] restores the input.
pub fn combine_with_seed(guid: Uuid, seed: Uuid) -> Uuid {
    let (high, low) = guid.as_u64_pair();
    let (seed_high, seed_low) = seed.as_u64_pair();
    Uuid::from_u64_pair(high.wrapping_add(seed_high), low.wrapping_add(seed_low))
}

/// Inverse of [`combine_with_seed`].
pub fn revert_combination_with_seed(guid: Uuid, seed: Uuid) -> Uuid {
    let (high, low) = guid.as_u64_pair();
    let (seed_high, seed_low) = seed.as_u64_pair();
    Uuid::from_u64_pair(high.wrapping_sub(seed_high), low.wrapping_sub(seed_low))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_uuid_is_deterministic() {
        let a = stable_uuid_from_string("parent/Transform");
        let b = stable_uuid_from_string("parent/Transform");
        let c = stable_uuid_from_string("parent/Material");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_embedded_guid_depends_on_parent_and_property() {
        let parent = make_uuid();
        let other = make_uuid();
        assert_eq!(embedded_object_guid(parent, "Body"), embedded_object_guid(parent, "Body"));
        assert_ne!(embedded_object_guid(parent, "Body"), embedded_object_guid(other, "Body"));
    }

    #[test]
    fn test_seed_combination_reverts() {
        let guid = make_uuid();
        let seed = make_uuid();
        let combined = combine_with_seed(guid, seed);
        assert_ne!(combined, guid);
        assert_eq!(revert_combination_with_seed(combined, seed), guid);
    }

    #[test]
    fn test_seed_combination_wraps() {
        let guid = Uuid::from_u64_pair(u64::MAX, u64::MAX);
        let seed = Uuid::from_u64_pair(2, 3);
        let combined = combine_with_seed(guid, seed);
        assert_eq!(combined.as_u64_pair(), (1, 2));
        assert_eq!(revert_combination_with_seed(combined, seed), guid);
    }
}
