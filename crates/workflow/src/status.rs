//! Status vocabulary shared by the lifecycle manager and the approval engine.
//!
//! `NfaStatus` is the single source of truth for where an NFA is in its
//! lifecycle. The descriptive stage label shown to users is derived from it
//! by [`NfaStatus::stage_label`] and never stored.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;

// ──────────────────────────────────────────────
// NFA status
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NfaStatus {
    Draft,
    Section1Pending,
    Section1Approved,
    Section2Pending,
    /// Every section-2 approver approved. The NFA stays here until finalize
    /// assigns its number and document.
    Section2Approved,
    Approved,
    Rejected,
    SentBack,
}

impl NfaStatus {
    pub const ALL: [NfaStatus; 8] = [
        NfaStatus::Draft,
        NfaStatus::Section1Pending,
        NfaStatus::Section1Approved,
        NfaStatus::Section2Pending,
        NfaStatus::Section2Approved,
        NfaStatus::Approved,
        NfaStatus::Rejected,
        NfaStatus::SentBack,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NfaStatus::Draft => "draft",
            NfaStatus::Section1Pending => "section1_pending",
            NfaStatus::Section1Approved => "section1_approved",
            NfaStatus::Section2Pending => "section2_pending",
            NfaStatus::Section2Approved => "section2_approved",
            NfaStatus::Approved => "approved",
            NfaStatus::Rejected => "rejected",
            NfaStatus::SentBack => "sent_back",
        }
    }

    /// Display label for the lifecycle stage.
    pub fn stage_label(self) -> &'static str {
        match self {
            NfaStatus::Draft => "draft",
            NfaStatus::Section1Pending => "section1_approval",
            NfaStatus::Section1Approved => "coordinator_processing",
            NfaStatus::Section2Pending => "section2_approval",
            NfaStatus::Section2Approved => "document_generation",
            NfaStatus::Approved => "completed",
            NfaStatus::Rejected => "rejected",
            NfaStatus::SentBack => "sent_back",
        }
    }

    /// No further transitions are possible.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NfaStatus::Approved | NfaStatus::Rejected | NfaStatus::SentBack
        )
    }

    /// Whether `self -> next` is an edge of the lifecycle graph.
    pub fn can_transition_to(self, next: NfaStatus) -> bool {
        use NfaStatus::*;
        matches!(
            (self, next),
            (Draft, Section1Pending)
                | (Section1Pending, Section1Approved)
                | (Section1Approved, Section2Pending)
                | (Section2Pending, Section2Approved)
                | (Section2Approved, Approved)
                | (Section1Pending, Rejected)
                | (Section2Pending, Rejected)
                | (Section1Pending, SentBack)
                | (Section2Pending, SentBack)
        )
    }

    /// The status an NFA holds while `section` is awaiting approvals.
    pub fn pending_for(section: Section) -> NfaStatus {
        match section {
            Section::One => NfaStatus::Section1Pending,
            Section::Two => NfaStatus::Section2Pending,
        }
    }

    /// The status an NFA moves to once every approver of `section` approved.
    pub fn approved_for(section: Section) -> NfaStatus {
        match section {
            Section::One => NfaStatus::Section1Approved,
            Section::Two => NfaStatus::Section2Approved,
        }
    }
}

impl fmt::Display for NfaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NfaStatus {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NfaStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| WorkflowError::InvalidPayload(format!("unknown NFA status '{s}'")))
    }
}

// ──────────────────────────────────────────────
// Approval entries
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    SentBack,
}

impl ApprovalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
            ApprovalStatus::SentBack => "sent_back",
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApprovalStatus {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ApprovalStatus::Pending),
            "approved" => Ok(ApprovalStatus::Approved),
            "rejected" => Ok(ApprovalStatus::Rejected),
            "sent_back" => Ok(ApprovalStatus::SentBack),
            other => Err(WorkflowError::InvalidPayload(format!(
                "unknown approval status '{other}'"
            ))),
        }
    }
}

/// What an approver does with their entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    Approve,
    Reject,
    SendBack,
}

impl ApprovalAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalAction::Approve => "approve",
            ApprovalAction::Reject => "reject",
            ApprovalAction::SendBack => "send_back",
        }
    }

    /// Status the workflow entry takes after this action.
    pub fn resulting_status(self) -> ApprovalStatus {
        match self {
            ApprovalAction::Approve => ApprovalStatus::Approved,
            ApprovalAction::Reject => ApprovalStatus::Rejected,
            ApprovalAction::SendBack => ApprovalStatus::SentBack,
        }
    }

    /// Status the parent NFA short-circuits to, or `None` for approve.
    pub fn failure_status(self) -> Option<NfaStatus> {
        match self {
            ApprovalAction::Approve => None,
            ApprovalAction::Reject => Some(NfaStatus::Rejected),
            ApprovalAction::SendBack => Some(NfaStatus::SentBack),
        }
    }
}

impl fmt::Display for ApprovalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApprovalAction {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(ApprovalAction::Approve),
            "reject" => Ok(ApprovalAction::Reject),
            "send_back" | "send-back" => Ok(ApprovalAction::SendBack),
            other => Err(WorkflowError::InvalidPayload(format!(
                "unknown approval action '{other}' (expected approve, reject or send_back)"
            ))),
        }
    }
}

// ──────────────────────────────────────────────
// Sections
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    One,
    Two,
}

impl Section {
    pub fn number(self) -> u8 {
        match self {
            Section::One => 1,
            Section::Two => 2,
        }
    }
}

impl TryFrom<u8> for Section {
    type Error = WorkflowError;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        match n {
            1 => Ok(Section::One),
            2 => Ok(Section::Two),
            other => Err(WorkflowError::InvalidPayload(format!(
                "section must be 1 or 2, got {other}"
            ))),
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "section {}", self.number())
    }
}

// ──────────────────────────────────────────────
// Roles
// ──────────────────────────────────────────────

/// Directory roles that gate lifecycle operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Requestor,
    Approver,
    Coordinator,
    Superadmin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Requestor => "requestor",
            Role::Approver => "approver",
            Role::Coordinator => "coordinator",
            Role::Superadmin => "superadmin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
