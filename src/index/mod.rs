pub mod snapshot;
pub mod types;
pub mod walker;

pub use snapshot::SnapshotIndex;
pub use types::*;
pub use walker::{walk, Visit, Visitor};
