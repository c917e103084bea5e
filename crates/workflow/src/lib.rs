//! NFA (Note For Approval) workflow -- two-section approval lifecycle.
//!
//! A requestor drafts an NFA, submits section 1 to its approvers, the
//! coordinator completes section 2 once section 1 is approved, section 2
//! goes to its own approvers, and a fully approved NFA gets a yearly
//! sequential number and a generated document.
//!
//! [`NfaManager`] owns the NFA record and its transitions. [`ApprovalEngine`]
//! owns the per-approver workflow entries and advances the NFA as decisions
//! arrive. Side effects (notices, document generation) leave the engine as
//! [`OutboundEvent`]s through a [`Dispatcher`].

pub mod approval;
pub mod clock;
pub mod config;
pub mod directory;
pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod numbering;
pub mod status;

pub use approval::{ApprovalEngine, CompletionOutcome};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigError, WorkflowConfig};
pub use directory::{DirectoryEntry, StorageDirectory, UserDirectory};
pub use dispatch::{
    ChannelDispatcher, DispatchWorker, Dispatcher, DocumentGenerator, JsonDocumentGenerator,
    LogNotifier, NotificationSink, OutboundEvent, RecordingDispatcher,
};
pub use error::{DispatchError, EntityKind, WorkflowError};
pub use lifecycle::{NewAttachment, NfaManager, NfaManagerBuilder, NfaQuery, Submission};
pub use model::{
    ApproverEntry, ApproverStats, Currency, Nfa, NfaSummary, PendingApproval, Section1Data,
    Section2Data, TaxStatus, WorkflowEntry,
};
pub use status::{ApprovalAction, ApprovalStatus, NfaStatus, Role, Section};
