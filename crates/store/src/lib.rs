//! Configuration stores implementing [`rad_core::ConfigurationService`].
//!
//! [`MemoryStore`] keeps everything in process; [`FileStore`] persists the same
//! document as a single JSON file.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::{MemoryStore, StoreDocument, TrainingRequest};
