//! Hierarchical entity store.
//!
//! An [`EntityStore`] holds one [`EntityLevel`] per entity kind (policy,
//! driver, vehicle, ...). Each level is keyed by an ordered identifier tuple
//! extending its parent's key by one column, and every attribute belongs to
//! exactly one level.
//!
//! Attribute requests spanning levels on one ancestor chain are answered by
//! a broadcast join: the result has one row per key of the deepest level and
//! ancestor values are repeated across their descendants. Requests spanning
//! sibling levels are rejected.
//!
//! # Key Types
//!
//! - [`Frame`]: Columns aligned to the keys of one level
//! - [`EntityLevel`]: One level's keys and attributes
//! - [`EntityStore`]: The batch of levels, with [`JoinMode`] for dangling keys
//! - [`Aggregate`]: Child-to-ancestor rollups on frames

mod entity_store;
mod frame;
pub(crate) mod join;
mod level;

pub use entity_store::{EntityStore, JoinMode};
pub use frame::{Aggregate, Frame, RowRef};
pub use level::{EntityLevel, EntityLevelBuilder};
