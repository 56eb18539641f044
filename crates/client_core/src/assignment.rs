//! Allocation of farmer cases to employees.

use std::{collections::BTreeSet, sync::Arc};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use shared::{
    domain::{EmployeeId, Farmer, FarmerId},
    protocol::{AssignmentRecord, BulkAssignRequest, ChangeEvent},
};
use tracing::{info, warn};

use crate::{
    api::ConsoleApi,
    error::{CoreError, CoreResult},
    executor::{ExecuteOptions, RequestExecutor},
    notifications::NotificationBus,
};

/// Placeholder some endpoints store instead of a null assignee.
pub const NOT_ASSIGNED: &str = "Not Assigned";

/// The one eligibility rule for assignment; everything else calls this.
pub fn is_eligible(farmer: &Farmer) -> bool {
    matches!(
        farmer.assigned_employee_ref.as_deref(),
        None | Some("") | Some(NOT_ASSIGNED)
    )
}

pub fn eligible_farmers(farmers: &[Farmer]) -> Vec<&Farmer> {
    farmers.iter().filter(|farmer| is_eligible(farmer)).collect()
}

/// Result of a bulk assignment. A non-empty `failed` set is a normal outcome;
/// callers retry just those ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkAssignOutcome {
    pub employee_id: EmployeeId,
    pub succeeded: BTreeSet<FarmerId>,
    pub failed: BTreeSet<FarmerId>,
    pub records: Vec<AssignmentRecord>,
    pub used_fallback: bool,
    pub completed_at: DateTime<Utc>,
}

impl BulkAssignOutcome {
    fn new(employee_id: EmployeeId) -> Self {
        Self {
            employee_id,
            succeeded: BTreeSet::new(),
            failed: BTreeSet::new(),
            records: Vec::new(),
            used_fallback: false,
            completed_at: Utc::now(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    fn assigned_at(&self, farmer_id: FarmerId) -> DateTime<Utc> {
        self.records
            .iter()
            .find(|record| record.farmer_id == farmer_id)
            .map(|record| record.assigned_at)
            .unwrap_or(self.completed_at)
    }

    /// Writes succeeded assignments onto the in-memory farmers. Failed ids
    /// are left as they were. Returns the number of records touched.
    pub fn reconcile(&self, farmers: &mut [Farmer]) -> usize {
        let mut updated = 0;
        for farmer in farmers
            .iter_mut()
            .filter(|farmer| self.succeeded.contains(&farmer.id))
        {
            farmer.assigned_employee_ref = Some(self.employee_id.to_string());
            farmer.assignment_date = Some(self.assigned_at(farmer.id));
            updated += 1;
        }
        updated
    }
}

pub struct AssignmentCoordinator {
    api: Arc<dyn ConsoleApi>,
    bus: NotificationBus,
    bulk: RequestExecutor<Vec<AssignmentRecord>>,
}

impl AssignmentCoordinator {
    pub fn new(api: Arc<dyn ConsoleApi>, bus: NotificationBus) -> Self {
        Self {
            api,
            bus,
            bulk: RequestExecutor::new("bulk-assign"),
        }
    }

    /// Assigns every id to `employee_id`, degrading to one call per farmer if
    /// the atomic bulk call fails. `Ok(None)` means the bulk call was
    /// superseded or cancelled and nothing should be reconciled.
    pub async fn bulk_assign(
        &self,
        farmer_ids: &BTreeSet<FarmerId>,
        employee_id: EmployeeId,
    ) -> CoreResult<Option<BulkAssignOutcome>> {
        if farmer_ids.is_empty() {
            return Err(CoreError::validation("select at least one farmer to assign"));
        }

        let request = BulkAssignRequest {
            farmer_ids: farmer_ids.iter().copied().collect(),
            employee_id,
        };
        let api = Arc::clone(&self.api);
        let bulk = self
            .bulk
            .execute(
                move |_cancel| async move { api.bulk_assign(&request).await },
                ExecuteOptions::default(),
            )
            .await;

        let mut outcome = BulkAssignOutcome::new(employee_id);
        match bulk {
            Ok(None) => {
                info!(employee_id = %employee_id, "bulk assignment superseded");
                return Ok(None);
            }
            Ok(Some(records)) => {
                outcome.succeeded = farmer_ids.clone();
                outcome.records = records;
            }
            Err(err) => {
                warn!(
                    employee_id = %employee_id,
                    count = farmer_ids.len(),
                    error = %err,
                    "bulk assignment failed; falling back to individual assignments"
                );
                outcome.used_fallback = true;
                self.assign_individually(farmer_ids, employee_id, &mut outcome)
                    .await;
            }
        }
        outcome.completed_at = Utc::now();

        for farmer_id in &outcome.succeeded {
            self.bus.emit(ChangeEvent::assigned(
                *farmer_id,
                employee_id,
                outcome.assigned_at(*farmer_id),
            ));
        }
        info!(
            employee_id = %employee_id,
            succeeded = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            fallback = outcome.used_fallback,
            "bulk assignment finished"
        );
        Ok(Some(outcome))
    }

    async fn assign_individually(
        &self,
        farmer_ids: &BTreeSet<FarmerId>,
        employee_id: EmployeeId,
        outcome: &mut BulkAssignOutcome,
    ) {
        let api = &self.api;
        let attempts = farmer_ids.iter().map(|&farmer_id| async move {
            (farmer_id, api.assign_farmer(farmer_id, employee_id).await)
        });

        for (farmer_id, result) in join_all(attempts).await {
            match result {
                Ok(record) => {
                    outcome.succeeded.insert(farmer_id);
                    outcome.records.push(record);
                }
                Err(err) => {
                    warn!(farmer_id = %farmer_id, error = %err, "individual assignment failed");
                    outcome.failed.insert(farmer_id);
                }
            }
        }
    }

    pub async fn cancel(&self) {
        self.bulk.cancel().await;
    }
}

#[cfg(test)]
#[path = "tests/assignment_tests.rs"]
mod tests;
