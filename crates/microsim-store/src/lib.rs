pub mod fs;
pub mod memory;
pub mod store;
pub mod types;

pub use fs::FsStatusStore;
pub use memory::MemoryStatusStore;
pub use store::{StatusStore, StatusStoreError, StatusStoreResult};
pub use types::{ResultEntry, ResultHash, RoundDelta, RunId, RunStatus, content_hash};
