//! Disk-resident linear hash index for embedded and flash-backed
//! key-value storage. See `LinearHashIndex` for the entry point.

mod cache;
mod cursor;
mod error;
mod hash;
mod index;
mod overflow;
mod record;

pub use cursor::{Cursor, KeyCompare, Predicate};
pub use error::{LinHashError, Result};
pub use hash::{HashFn, KeyKind};
pub use index::{IndexParams, InsertOutcome, LinearHashIndex, PersistedState, WriteConcern};
pub use record::{Layout, Status};
