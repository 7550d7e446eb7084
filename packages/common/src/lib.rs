//! Shared building blocks for the plasma crates: GUID helpers, the
//! copy-on-broadcast [`EventSource`], and the [`FileSystem`] abstraction.

pub mod event;
pub mod filesystem;
pub mod guid;

pub use event::*;
pub use filesystem::*;
pub use guid::*;
