//! Typed section payloads and read views over storage records.
//!
//! Section payloads are validated here, at the boundary, so the engine only
//! ever sees well-formed approver lists. Storage keeps them as JSON values.

use nfa_storage::{NfaRecord, WorkflowRecord};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::status::{ApprovalAction, ApprovalStatus, NfaStatus, Section};

// ──────────────────────────────────────────────
// Section payloads
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Inr,
    Usd,
    Yen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxStatus {
    Included,
    Excluded,
}

/// One approver configured for a section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproverEntry {
    pub user_id: String,
    pub name: String,
    /// Advisory ordering; approvals within a section may arrive in any order.
    #[serde(default)]
    pub sequence: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub designation: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Section1Data {
    pub function_division: Option<String>,
    pub department: Option<String>,
    pub location: Option<String>,
    pub requestor_name: Option<String>,
    pub cost_code: Option<String>,
    pub subject_item: Option<String>,
    pub background_purpose: Option<String>,

    pub work_approval_required: Option<bool>,
    pub proposal_description: Option<String>,
    pub activity_approved: Option<bool>,
    pub proposed_work_schedule: Option<String>,
    pub vendor_selection_required: Option<bool>,
    pub num_vendors_evaluated: Option<u32>,
    pub vendor_name_proposed: Option<String>,

    pub budget_status: Option<String>,
    pub budget_available_with_user: Option<bool>,
    pub department_with_budget: Option<String>,
    pub currency: Currency,
    pub amount_of_approval: Option<Decimal>,
    pub tax_status: Option<TaxStatus>,
    pub more_than_budget_amount: Option<Decimal>,
    pub advance_payment_required: Option<bool>,
    pub advance_amount: Option<Decimal>,
    pub security_for_advance: Option<String>,

    pub route_to: Option<String>,
    /// User id (or address) of the coordinator who completes section 2.
    pub coordinator: Option<String>,
    pub approver_list: Vec<ApproverEntry>,

    pub comments: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Section2Data {
    pub vendor_selection: Option<bool>,
    pub num_vendors_evaluated: Option<u32>,
    pub vendor_name_proposed: Option<String>,
    pub vendor_id: Option<String>,
    pub comments: Option<String>,
    pub amount_of_approval: Option<Decimal>,
    pub advance_to_be_paid: Option<bool>,
    pub advance_amount: Option<Decimal>,
    pub security_for_advance: Option<String>,
    pub tax_status: Option<TaxStatus>,

    pub proposal_status: Option<String>,
    pub approval_reference_number: Option<String>,
    pub approval_date: Option<String>,

    pub approver_list: Vec<ApproverEntry>,
}

fn validate_approvers(section: Section, approvers: &[ApproverEntry]) -> Result<(), WorkflowError> {
    for (i, approver) in approvers.iter().enumerate() {
        if approver.user_id.trim().is_empty() {
            return Err(WorkflowError::InvalidPayload(format!(
                "{section} approver #{} has an empty user_id",
                i + 1
            )));
        }
        if approver.name.trim().is_empty() {
            return Err(WorkflowError::InvalidPayload(format!(
                "{section} approver '{}' has an empty name",
                approver.user_id
            )));
        }
    }
    Ok(())
}

impl Section1Data {
    pub fn validate(&self) -> Result<(), WorkflowError> {
        validate_approvers(Section::One, &self.approver_list)
    }

    /// Parse and validate a JSON payload.
    pub fn from_json(value: serde_json::Value) -> Result<Self, WorkflowError> {
        let data: Section1Data = serde_json::from_value(value)?;
        data.validate()?;
        Ok(data)
    }
}

impl Section2Data {
    pub fn validate(&self) -> Result<(), WorkflowError> {
        validate_approvers(Section::Two, &self.approver_list)
    }

    pub fn from_json(value: serde_json::Value) -> Result<Self, WorkflowError> {
        let data: Section2Data = serde_json::from_value(value)?;
        data.validate()?;
        Ok(data)
    }
}

// ──────────────────────────────────────────────
// Views
// ──────────────────────────────────────────────

/// An NFA request with typed status and sections.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Nfa {
    pub id: String,
    pub nfa_number: Option<String>,
    pub requestor_id: String,
    pub requestor_name: String,
    pub status: NfaStatus,
    pub current_stage: &'static str,
    #[serde(rename = "section1_data")]
    pub section1: Section1Data,
    #[serde(rename = "section2_data")]
    pub section2: Section2Data,
    pub document_path: Option<String>,
    pub revision_of: Option<String>,
    pub version: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl Nfa {
    pub fn approvers(&self, section: Section) -> &[ApproverEntry] {
        match section {
            Section::One => &self.section1.approver_list,
            Section::Two => &self.section2.approver_list,
        }
    }

    /// The details an approver notice carries. The amount comes from the
    /// section being approved.
    pub fn summary(&self, section: Section) -> NfaSummary {
        let amount = match section {
            Section::One => self.section1.amount_of_approval,
            Section::Two => self.section2.amount_of_approval,
        };
        NfaSummary {
            subject: self.section1.subject_item.clone(),
            requestor_name: self.requestor_name.clone(),
            department: self.section1.department.clone(),
            amount,
            currency: self.section1.currency,
        }
    }
}

impl TryFrom<NfaRecord> for Nfa {
    type Error = WorkflowError;

    fn try_from(rec: NfaRecord) -> Result<Self, Self::Error> {
        let status: NfaStatus = rec.status.parse()?;
        let section1: Section1Data = serde_json::from_value(rec.section1_data)?;
        let section2: Section2Data = serde_json::from_value(rec.section2_data)?;
        Ok(Nfa {
            id: rec.id,
            nfa_number: rec.nfa_number,
            requestor_id: rec.requestor_id,
            requestor_name: rec.requestor_name,
            status,
            current_stage: status.stage_label(),
            section1,
            section2,
            document_path: rec.document_path,
            revision_of: rec.revision_of,
            version: rec.version,
            created_at: rec.created_at,
            updated_at: rec.updated_at,
        })
    }
}

/// Approver notice payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NfaSummary {
    pub subject: Option<String>,
    pub requestor_name: String,
    pub department: Option<String>,
    pub amount: Option<Decimal>,
    pub currency: Currency,
}

/// One approver's assignment within a section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowEntry {
    pub id: String,
    pub nfa_id: String,
    pub section: u8,
    pub sequence: u32,
    pub approver_id: String,
    pub approver_name: String,
    pub approver_designation: String,
    pub status: ApprovalStatus,
    pub action: Option<ApprovalAction>,
    pub comments: Option<String>,
    pub action_timestamp: Option<String>,
    pub created_at: String,
}

impl TryFrom<WorkflowRecord> for WorkflowEntry {
    type Error = WorkflowError;

    fn try_from(rec: WorkflowRecord) -> Result<Self, Self::Error> {
        let action = rec
            .action
            .as_deref()
            .map(str::parse::<ApprovalAction>)
            .transpose()?;
        Ok(WorkflowEntry {
            status: rec.status.parse()?,
            action,
            id: rec.id,
            nfa_id: rec.nfa_id,
            section: rec.section,
            sequence: rec.sequence,
            approver_id: rec.approver_id,
            approver_name: rec.approver_name,
            approver_designation: rec.approver_designation,
            comments: rec.comments,
            action_timestamp: rec.action_timestamp,
            created_at: rec.created_at,
        })
    }
}

/// A pending entry together with the NFA it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingApproval {
    #[serde(flatten)]
    pub entry: WorkflowEntry,
    pub nfa: Option<Nfa>,
}

/// Per-approver workload counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApproverStats {
    pub total: u64,
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn section1_defaults_currency_and_empty_approvers() {
        let data = Section1Data::from_json(json!({"subject_item": "Laptops"})).unwrap();
        assert_eq!(data.currency, Currency::Inr);
        assert!(data.approver_list.is_empty());
        assert_eq!(data.subject_item.as_deref(), Some("Laptops"));
    }

    #[test]
    fn amounts_accept_numbers_and_strings() {
        let data = Section1Data::from_json(json!({
            "amount_of_approval": "150000.50",
            "advance_amount": 2500,
            "currency": "USD",
            "tax_status": "excluded"
        }))
        .unwrap();
        assert_eq!(data.amount_of_approval, Some(Decimal::new(15000050, 2)));
        assert_eq!(data.advance_amount, Some(Decimal::new(2500, 0)));
        assert_eq!(data.currency, Currency::Usd);
        assert_eq!(data.tax_status, Some(TaxStatus::Excluded));
    }

    #[test]
    fn approver_without_user_id_rejected() {
        let err = Section1Data::from_json(json!({
            "approver_list": [{"user_id": " ", "name": "Carol", "sequence": 1}]
        }))
        .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidPayload(ref m) if m.contains("user_id")));
    }

    #[test]
    fn approver_without_name_rejected() {
        let err = Section2Data::from_json(json!({
            "approver_list": [{"user_id": "carol", "name": "", "sequence": 1}]
        }))
        .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidPayload(ref m) if m.contains("name")));
    }

    #[test]
    fn malformed_payload_is_invalid_payload() {
        let err = Section1Data::from_json(json!({"currency": "GBP"})).unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidPayload(_)));
    }

    #[test]
    fn view_derives_stage_from_status() {
        let rec = NfaRecord {
            id: "nfa-1".into(),
            nfa_number: None,
            requestor_id: "alice".into(),
            requestor_name: "Alice".into(),
            status: "section1_approved".into(),
            section1_data: json!({"subject_item": "Chairs", "amount_of_approval": 10}),
            section2_data: json!({"amount_of_approval": 12}),
            document_path: None,
            revision_of: None,
            version: 3,
            created_at: "2025-01-01T00:00:00Z".into(),
            updated_at: "2025-01-01T00:00:00Z".into(),
        };
        let nfa = Nfa::try_from(rec).unwrap();
        assert_eq!(nfa.status, NfaStatus::Section1Approved);
        assert_eq!(nfa.current_stage, "coordinator_processing");
        assert_eq!(nfa.summary(Section::One).amount, Some(Decimal::new(10, 0)));
        assert_eq!(nfa.summary(Section::Two).amount, Some(Decimal::new(12, 0)));
        assert_eq!(nfa.summary(Section::Two).subject.as_deref(), Some("Chairs"));
    }

    #[test]
    fn serialized_view_uses_record_field_names() {
        let nfa = Nfa::try_from(NfaRecord {
            id: "nfa-1".into(),
            nfa_number: None,
            requestor_id: "alice".into(),
            requestor_name: "Alice".into(),
            status: "draft".into(),
            section1_data: json!({}),
            section2_data: json!({}),
            document_path: None,
            revision_of: None,
            version: 0,
            created_at: "t".into(),
            updated_at: "t".into(),
        })
        .unwrap();
        let value = serde_json::to_value(&nfa).unwrap();
        assert_eq!(value["status"], "draft");
        assert_eq!(value["current_stage"], "draft");
        assert!(value.get("section1_data").is_some());
        assert!(value.get("section2_data").is_some());
    }
}
