pub mod engine;
pub mod executor;
pub mod file;
pub mod folder;
pub mod summary;

pub use engine::{decide, Operation, SkipReason, SyncConfig, SyncEngine};
pub use executor::RequestExecutor;
pub use file::{File, FileMetadata, RemoteHandle};
pub use folder::Folder;
pub use summary::{BinaryUnit, Summary, SyncReport};
