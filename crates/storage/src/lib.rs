pub mod conformance;
mod error;
mod memory;
mod record;
mod traits;

pub use error::StorageError;
pub use memory::{MemorySnapshot, MemoryState, MemoryStorage};
pub use record::{
    AttachmentRecord, NfaFilter, NfaRecord, UserRecord, WorkflowDecision, WorkflowRecord,
};
pub use traits::NfaStorage;
