use std::{collections::HashSet, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use shared::{
    domain::{
        Employee, EmployeeId, Farmer, FarmerId, KycStatus, Registration, RegistrationId,
        RegistrationRole, RegistrationStatus, Reviewer, ReviewerRole,
    },
    protocol::{AssignmentRecord, BulkAssignRequest, KycUpdateRequest, RegistrationStatusRequest},
};
use tokio::{sync::Mutex, time::sleep};

use crate::{
    api::ConsoleApi,
    error::{CoreError, CoreResult},
};

/// In-memory backend that records every call it receives.
#[derive(Default)]
pub(crate) struct FakeConsoleApi {
    pub farmers: Mutex<Vec<Farmer>>,
    pub employees: Mutex<Vec<Employee>>,
    pub registrations: Mutex<Vec<Registration>>,
    pub fail_bulk: bool,
    pub failing_assignments: HashSet<FarmerId>,
    pub fail_kyc: bool,
    /// Artificial latency so tests can overlap calls.
    pub list_delay: Option<Duration>,
    pub bulk_delay: Option<Duration>,
    pub kyc_delay: Option<Duration>,
    pub list_calls: Mutex<u32>,
    pub bulk_calls: Mutex<Vec<BulkAssignRequest>>,
    pub assign_calls: Mutex<Vec<FarmerId>>,
    pub kyc_calls: Mutex<Vec<(FarmerId, KycUpdateRequest)>>,
    pub registration_calls: Mutex<Vec<(RegistrationId, RegistrationStatus)>>,
}

impl FakeConsoleApi {
    pub fn with_farmers(farmers: Vec<Farmer>) -> Self {
        Self {
            farmers: Mutex::new(farmers),
            ..Self::default()
        }
    }

    async fn record(&self, farmer_id: FarmerId, employee_id: EmployeeId) -> AssignmentRecord {
        if let Some(stored) = self
            .farmers
            .lock()
            .await
            .iter_mut()
            .find(|stored| stored.id == farmer_id)
        {
            stored.assigned_employee_ref = Some(employee_id.to_string());
        }
        AssignmentRecord {
            farmer_id,
            employee_id,
            employee_name: format!("employee-{employee_id}"),
            farmer_name: format!("farmer-{farmer_id}"),
            assigned_at: Utc::now(),
        }
    }
}

#[async_trait]
impl ConsoleApi for FakeConsoleApi {
    async fn list_farmers(&self) -> CoreResult<Vec<Farmer>> {
        *self.list_calls.lock().await += 1;
        pause(self.list_delay).await;
        Ok(self.farmers.lock().await.clone())
    }

    async fn list_employees(&self) -> CoreResult<Vec<Employee>> {
        Ok(self.employees.lock().await.clone())
    }

    async fn list_registrations(&self) -> CoreResult<Vec<Registration>> {
        Ok(self.registrations.lock().await.clone())
    }

    async fn bulk_assign(&self, request: &BulkAssignRequest) -> CoreResult<Vec<AssignmentRecord>> {
        self.bulk_calls.lock().await.push(request.clone());
        pause(self.bulk_delay).await;
        if self.fail_bulk {
            return Err(CoreError::Network {
                message: "bulk endpoint unavailable".into(),
                status: Some(503),
            });
        }
        let mut records = Vec::with_capacity(request.farmer_ids.len());
        for farmer_id in &request.farmer_ids {
            records.push(self.record(*farmer_id, request.employee_id).await);
        }
        Ok(records)
    }

    async fn assign_farmer(
        &self,
        farmer_id: FarmerId,
        employee_id: EmployeeId,
    ) -> CoreResult<AssignmentRecord> {
        self.assign_calls.lock().await.push(farmer_id);
        if self.failing_assignments.contains(&farmer_id) {
            return Err(CoreError::network(format!("farmer {farmer_id} is locked")));
        }
        Ok(self.record(farmer_id, employee_id).await)
    }

    async fn update_kyc_status(
        &self,
        farmer_id: FarmerId,
        request: &KycUpdateRequest,
    ) -> CoreResult<()> {
        self.kyc_calls.lock().await.push((farmer_id, request.clone()));
        pause(self.kyc_delay).await;
        if self.fail_kyc {
            return Err(CoreError::network("kyc endpoint returned 500"));
        }
        Ok(())
    }

    async fn update_registration_status(
        &self,
        registration_id: RegistrationId,
        request: &RegistrationStatusRequest,
    ) -> CoreResult<()> {
        self.registration_calls
            .lock()
            .await
            .push((registration_id, request.status));
        Ok(())
    }
}

async fn pause(delay: Option<Duration>) {
    if let Some(delay) = delay {
        sleep(delay).await;
    }
}

pub(crate) fn farmer(id: i64, status: KycStatus, assigned: Option<&str>) -> Farmer {
    Farmer {
        id: FarmerId(id),
        name: format!("farmer-{id}"),
        kyc_status: status,
        assigned_employee_ref: assigned.map(str::to_string),
        ..Farmer::default()
    }
}

pub(crate) fn employee(id: i64, name: &str, contact: Option<&str>) -> Employee {
    Employee {
        id: EmployeeId(id),
        name: name.to_string(),
        contact: contact.map(str::to_string),
        ..Employee::default()
    }
}

pub(crate) fn registration(id: i64, status: RegistrationStatus) -> Registration {
    Registration {
        id: RegistrationId(id),
        name: format!("applicant-{id}"),
        role: RegistrationRole::Farmer,
        status,
        submitted_at: None,
    }
}

pub(crate) fn admin() -> Reviewer {
    Reviewer {
        id: "admin-1".into(),
        name: "Admin One".into(),
        role: ReviewerRole::Admin,
    }
}

pub(crate) fn field_reviewer() -> Reviewer {
    Reviewer {
        id: "emp-9".into(),
        name: "Field Nine".into(),
        role: ReviewerRole::Employee,
    }
}
