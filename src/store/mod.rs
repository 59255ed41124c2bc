pub mod memory;
pub mod ports;
pub mod snapshot;

pub use memory::{InMemoryStore, StoreContents};
pub use ports::EntitlementStore;
pub use snapshot::SnapshotStore;
