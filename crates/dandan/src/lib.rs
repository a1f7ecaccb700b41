//! Dandan-protocol facade over the danmaku search core.
//!
//! Translates the external protocol's Match/Comment/Search/Bangumi calls into
//! orchestrated platform searches and fetches, and virtualizes platform-native
//! identifiers into the stable 64-bit id space the protocol demands.
//!
//! - [`IdStore`] - Persistent bidirectional (platform, season, episode) ↔ i64
//!   mapping
//! - [`DandanFacade`] - The protocol operations
//! - [`model`] - Serde wire shapes

pub mod error;
pub mod facade;
pub mod model;
pub mod store;

pub use error::DandanError;
pub use facade::DandanFacade;
pub use store::IdStore;
