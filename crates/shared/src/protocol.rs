use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    EmployeeId, FarmerId, KycDocuments, KycStatus, RegistrationId, RegistrationStatus,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkAssignRequest {
    pub farmer_ids: Vec<FarmerId>,
    pub employee_id: EmployeeId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignFarmerRequest {
    pub employee_id: EmployeeId,
}

/// One allocation produced by an assign call. Not persisted client-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentRecord {
    #[serde(alias = "farmer_id")]
    pub farmer_id: FarmerId,
    #[serde(alias = "employee_id")]
    pub employee_id: EmployeeId,
    #[serde(default, alias = "employee_name")]
    pub employee_name: String,
    #[serde(default, alias = "farmer_name")]
    pub farmer_name: String,
    #[serde(default = "Utc::now", alias = "assigned_at")]
    pub assigned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KycUpdateRequest {
    pub status: KycStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aadhaar_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pan_number: Option<String>,
    pub reviewed_by: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationStatusRequest {
    pub status: RegistrationStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Farmer,
    Employee,
    Registration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeTopic {
    KycUpdated,
    AssignmentUpdated,
    RegistrationUpdated,
}

impl ChangeTopic {
    pub const ALL: [ChangeTopic; 3] = [
        ChangeTopic::KycUpdated,
        ChangeTopic::AssignmentUpdated,
        ChangeTopic::RegistrationUpdated,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::KycUpdated => "kyc-updated",
            Self::AssignmentUpdated => "assignment-updated",
            Self::RegistrationUpdated => "registration-updated",
        }
    }
}

impl fmt::Display for ChangeTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Change {
    KycUpdated {
        new_status: KycStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        documents: Option<KycDocuments>,
    },
    Assigned {
        employee_id: EmployeeId,
        assigned_at: DateTime<Utc>,
    },
    RegistrationReviewed {
        status: RegistrationStatus,
    },
}

/// "Entity changed elsewhere" signal carried on the notification bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub entity: EntityKind,
    pub id: i64,
    pub change: Change,
}

impl ChangeEvent {
    pub fn kyc_updated(
        farmer_id: FarmerId,
        new_status: KycStatus,
        reason: Option<String>,
        documents: Option<KycDocuments>,
    ) -> Self {
        Self {
            entity: EntityKind::Farmer,
            id: farmer_id.0,
            change: Change::KycUpdated {
                new_status,
                reason,
                documents,
            },
        }
    }

    pub fn assigned(
        farmer_id: FarmerId,
        employee_id: EmployeeId,
        assigned_at: DateTime<Utc>,
    ) -> Self {
        Self {
            entity: EntityKind::Farmer,
            id: farmer_id.0,
            change: Change::Assigned {
                employee_id,
                assigned_at,
            },
        }
    }

    pub fn registration_reviewed(id: RegistrationId, status: RegistrationStatus) -> Self {
        Self {
            entity: EntityKind::Registration,
            id: id.0,
            change: Change::RegistrationReviewed { status },
        }
    }

    pub fn topic(&self) -> ChangeTopic {
        match self.change {
            Change::KycUpdated { .. } => ChangeTopic::KycUpdated,
            Change::Assigned { .. } => ChangeTopic::AssignmentUpdated,
            Change::RegistrationReviewed { .. } => ChangeTopic::RegistrationUpdated,
        }
    }
}
