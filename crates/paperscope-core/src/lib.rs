pub mod config;
pub mod error;
pub mod models;
pub mod storage;

pub use config::StoreConfig;
pub use error::{PaperscopeError, Result};
pub use models::*;

pub use storage::record_store::{LoadOutcome, RecordStore, StoredRecord};
