//! Persistence for saved recordings
//!
//! - `kv`: JSON key-value files, the persistence substrate
//! - `models`: `StoredRecording` and its location reference
//! - `registry`: the newest-first recordings list with drive mirroring
//! - `resolver`: destination policy plus local/drive writes

mod kv;
mod models;
mod registry;
mod resolver;

pub use kv::KvStore;
pub use models::{Location, StorageType, StoredRecording};
pub use registry::{RecordingsRegistry, REGISTRY_KEY};
pub use resolver::{resolve_destination, IdClock, StorageResolver};
