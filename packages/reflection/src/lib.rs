//! # Reflection
//!
//! Runtime type descriptions for document objects. The editor never knows
//! the concrete meaning of a property; it only sees the structure described
//! here:
//!
//! - [`TypeDescriptor`]: named type with an optional parent and a list of
//!   [`PropertyDescriptor`]s
//! - [`PropertyCategory`]: Member, Array, Set or Map
//! - [`PropertyFlags`]: class/pointer/ownership/enum markers
//! - [`TypeAccessor`]: per-object property storage addressed by name
//!   and [`PropertyIndex`]

pub mod accessor;
pub mod errors;
pub mod registry;
pub mod types;
pub mod variant;

pub use accessor::*;
pub use errors::*;
pub use registry::*;
pub use types::*;
pub use variant::*;
