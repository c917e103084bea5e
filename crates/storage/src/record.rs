use serde::{Deserialize, Serialize};

/// A user as stored in the Users collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub name: String,
    pub email: String,
    pub designation: Option<String>,
    pub department: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub created_at: String,
}

/// An NFA request document as stored in the NFARequests collection.
///
/// Section payloads are stored as opaque JSON documents; their shape is
/// owned by the workflow layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NfaRecord {
    pub id: String,
    pub nfa_number: Option<String>,
    pub requestor_id: String,
    pub requestor_name: String,
    pub status: String,
    pub section1_data: serde_json::Value,
    pub section2_data: serde_json::Value,
    pub document_path: Option<String>,
    pub revision_of: Option<String>,
    /// Incremented on every write; used for optimistic concurrency control.
    pub version: i64,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub created_at: String,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub updated_at: String,
}

/// One approver's assignment within a section of an NFA.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub id: String,
    pub nfa_id: String,
    pub section: u8,
    pub sequence: u32,
    pub approver_id: String,
    pub approver_name: String,
    pub approver_designation: String,
    pub status: String,
    pub action: Option<String>,
    pub comments: Option<String>,
    /// ISO 8601 / RFC 3339 timestamp string. None while pending.
    pub action_timestamp: Option<String>,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub created_at: String,
}

/// The fields written when an approver acts on a workflow entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDecision {
    pub status: String,
    pub action: String,
    pub comments: Option<String>,
    pub action_timestamp: String,
}

/// Attachment metadata. The file bytes live outside the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRecord {
    pub id: String,
    pub nfa_id: String,
    pub filename: String,
    pub file_path: String,
    pub file_size: u64,
    pub uploaded_by: String,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub created_at: String,
}

/// Filter for NFA listing queries. `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NfaFilter {
    pub requestor_id: Option<String>,
    pub status: Option<String>,
}
