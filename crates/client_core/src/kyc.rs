//! KYC status transitions.
//!
//! [`KycStateMachine`] is pure: it decides whether a reviewer may move a case
//! to a new status and normalizes the supporting data. [`KycService`] runs
//! that decision, persists it through the backend and announces it on the
//! notification bus.

use std::sync::{Arc, LazyLock};

use chrono::Utc;
use regex::Regex;
use shared::{
    domain::{Farmer, FarmerId, KycDocuments, KycStatus, Reviewer, ReviewerRole},
    protocol::{ChangeEvent, KycUpdateRequest},
};
use tracing::info;

use crate::{
    api::ConsoleApi,
    error::{CoreError, CoreResult},
    notifications::NotificationBus,
};

static AADHAAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{12}$").expect("aadhaar pattern compiles"));
static PAN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9]{10}$").expect("pan pattern compiles"));

/// A requested status change for one farmer's KYC case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KycUpdate {
    pub farmer_id: FarmerId,
    pub new_status: KycStatus,
    pub reason: Option<String>,
    pub documents: Option<KycDocuments>,
}

impl KycUpdate {
    pub fn approve(farmer_id: FarmerId, documents: Option<KycDocuments>) -> Self {
        Self {
            farmer_id,
            new_status: KycStatus::Approved,
            reason: None,
            documents,
        }
    }

    pub fn reject(farmer_id: FarmerId, reason: impl Into<String>) -> Self {
        Self {
            farmer_id,
            new_status: KycStatus::Rejected,
            reason: Some(reason.into()),
            documents: None,
        }
    }

    pub fn refer_back(farmer_id: FarmerId, reason: impl Into<String>) -> Self {
        Self {
            farmer_id,
            new_status: KycStatus::ReferBack,
            reason: Some(reason.into()),
            documents: None,
        }
    }
}

/// Validated outcome of a transition, ready to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KycTransition {
    pub from: KycStatus,
    pub to: KycStatus,
    pub reason: Option<String>,
    pub documents: Option<KycDocuments>,
}

pub struct KycStateMachine;

impl KycStateMachine {
    /// `stored` are the documents already on the farmer record; requested
    /// documents take precedence field by field.
    pub fn transition(
        current: KycStatus,
        update: &KycUpdate,
        stored: &KycDocuments,
        reviewer: &Reviewer,
    ) -> CoreResult<KycTransition> {
        let target = update.new_status;

        if current.is_closed() && current != target && reviewer.role != ReviewerRole::Admin {
            return Err(CoreError::Forbidden(format!(
                "only an admin may re-open a {current} case (reviewer {})",
                reviewer.name
            )));
        }

        match target {
            KycStatus::Approved => {
                let documents = Self::validate_documents(update.documents.as_ref(), stored)?;
                Ok(KycTransition {
                    from: current,
                    to: target,
                    reason: None,
                    documents: Some(documents),
                })
            }
            KycStatus::ReferBack => {
                let open = matches!(
                    current,
                    KycStatus::NotStarted | KycStatus::Pending | KycStatus::ReferBack
                );
                if !open && reviewer.role != ReviewerRole::Admin {
                    return Err(CoreError::Forbidden(format!(
                        "only an admin may refer back a {current} case (reviewer {})",
                        reviewer.name
                    )));
                }
                let reason = require_reason(update.reason.as_deref(), target)?;
                Ok(KycTransition {
                    from: current,
                    to: target,
                    reason: Some(reason),
                    documents: None,
                })
            }
            KycStatus::Rejected => {
                let reason = require_reason(update.reason.as_deref(), target)?;
                Ok(KycTransition {
                    from: current,
                    to: target,
                    reason: Some(reason),
                    documents: None,
                })
            }
            KycStatus::NotStarted | KycStatus::Pending => Err(CoreError::validation(format!(
                "{target} is set when the farmer resubmits documents, not by a reviewer"
            ))),
        }
    }

    pub fn validate_documents(
        requested: Option<&KycDocuments>,
        stored: &KycDocuments,
    ) -> CoreResult<KycDocuments> {
        let aadhaar = requested
            .and_then(|docs| docs.aadhaar_number.as_deref())
            .or(stored.aadhaar_number.as_deref())
            .map(str::trim)
            .unwrap_or_default();
        if aadhaar.is_empty() {
            return Err(CoreError::validation("aadhaar number is required for approval"));
        }
        if !AADHAAR_PATTERN.is_match(aadhaar) {
            return Err(CoreError::validation("aadhaar number must be exactly 12 digits"));
        }

        let pan = requested
            .and_then(|docs| docs.pan_number.as_deref())
            .or(stored.pan_number.as_deref())
            .map(|pan| pan.trim().to_ascii_uppercase())
            .unwrap_or_default();
        if pan.is_empty() {
            return Err(CoreError::validation("PAN number is required for approval"));
        }
        if !PAN_PATTERN.is_match(&pan) {
            return Err(CoreError::validation(
                "PAN number must be exactly 10 letters or digits",
            ));
        }

        Ok(KycDocuments::new(aadhaar, pan))
    }
}

fn require_reason(reason: Option<&str>, target: KycStatus) -> CoreResult<String> {
    match reason.map(str::trim) {
        Some(reason) if !reason.is_empty() => Ok(reason.to_string()),
        _ => Err(CoreError::validation(format!(
            "a reason is required to move a case to {target}"
        ))),
    }
}

pub struct KycService {
    api: Arc<dyn ConsoleApi>,
    bus: NotificationBus,
}

impl KycService {
    pub fn new(api: Arc<dyn ConsoleApi>, bus: NotificationBus) -> Self {
        Self { api, bus }
    }

    /// Validates, persists and applies `update` to `farmer`, then emits
    /// `kyc-updated`. Nothing is sent to the backend if validation fails.
    pub async fn update_kyc_status(
        &self,
        farmer: &mut Farmer,
        update: KycUpdate,
        reviewer: &Reviewer,
    ) -> CoreResult<KycTransition> {
        if update.farmer_id != farmer.id {
            return Err(CoreError::validation(format!(
                "update targets farmer {} but record is farmer {}",
                update.farmer_id, farmer.id
            )));
        }

        let transition =
            KycStateMachine::transition(farmer.kyc_status, &update, &farmer.documents(), reviewer)?;

        let request = KycUpdateRequest {
            status: transition.to,
            reason: transition.reason.clone(),
            aadhaar_number: transition
                .documents
                .as_ref()
                .and_then(|docs| docs.aadhaar_number.clone()),
            pan_number: transition
                .documents
                .as_ref()
                .and_then(|docs| docs.pan_number.clone()),
            reviewed_by: reviewer.name.clone(),
        };
        self.api.update_kyc_status(farmer.id, &request).await?;

        farmer.kyc_status = transition.to;
        farmer.kyc_reason = transition.reason.clone();
        if let Some(documents) = &transition.documents {
            farmer.aadhaar_number = documents.aadhaar_number.clone();
            farmer.pan_number = documents.pan_number.clone();
        }
        farmer.reviewed_by = Some(reviewer.name.clone());
        farmer.reviewed_at = Some(Utc::now());

        info!(
            farmer_id = %farmer.id,
            from = %transition.from,
            to = %transition.to,
            reviewer = %reviewer.name,
            "kyc status updated"
        );
        self.bus.emit(ChangeEvent::kyc_updated(
            farmer.id,
            transition.to,
            transition.reason.clone(),
            transition.documents.clone(),
        ));

        Ok(transition)
    }
}

#[cfg(test)]
#[path = "tests/kyc_tests.rs"]
mod tests;
