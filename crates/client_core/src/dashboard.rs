//! One open dashboard: its own executors, its own copy of the collections.
//!
//! Views never share state. Two views loading the same collection fetch and
//! cache it twice; they converge through notification-driven refetches.

use std::{
    collections::BTreeSet,
    sync::{Arc, Weak},
    time::Duration,
};

use shared::{
    domain::{
        Employee, EmployeeId, Farmer, FarmerId, Registration, RegistrationId, RegistrationStatus,
        Reviewer,
    },
    protocol::ChangeTopic,
};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::{
    api::ConsoleApi,
    assignment::{eligible_farmers, AssignmentCoordinator, BulkAssignOutcome},
    error::{CoreError, CoreResult},
    executor::{ExecuteOptions, RequestExecutor},
    kyc::{KycService, KycTransition, KycUpdate},
    notifications::{NotificationBus, RefreshWatcher},
    registrations::RegistrationReview,
    stats::{
        get_employee_caseload, get_registration_stats, get_stats, Caseload, DashboardStats,
        RegistrationStats,
    },
};

const FARMERS_CACHE_KEY: &str = "farmers";
const EMPLOYEES_CACHE_KEY: &str = "employees";
const REGISTRATIONS_CACHE_KEY: &str = "registrations";

#[derive(Debug, Clone, Default)]
pub struct DashboardState {
    pub farmers: Vec<Farmer>,
    pub employees: Vec<Employee>,
    pub registrations: Vec<Registration>,
}

pub struct DashboardView {
    label: String,
    api: Arc<dyn ConsoleApi>,
    cache_ttl: Duration,
    farmers: RequestExecutor<Vec<Farmer>>,
    employees: RequestExecutor<Vec<Employee>>,
    registrations: RequestExecutor<Vec<Registration>>,
    state: RwLock<DashboardState>,
    watcher: Mutex<Option<RefreshWatcher>>,
}

impl DashboardView {
    pub fn new(label: impl Into<String>, api: Arc<dyn ConsoleApi>, cache_ttl: Duration) -> Arc<Self> {
        let label = label.into();
        Arc::new(Self {
            farmers: RequestExecutor::new(format!("{label}/farmers")),
            employees: RequestExecutor::new(format!("{label}/employees")),
            registrations: RequestExecutor::new(format!("{label}/registrations")),
            label,
            api,
            cache_ttl,
            state: RwLock::new(DashboardState::default()),
            watcher: Mutex::new(None),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Loads all three collections. `force` bypasses the cache. A load that
    /// gets superseded leaves the current collection alone; the first error
    /// is returned after the successful loads have been applied.
    pub async fn refresh(&self, force: bool) -> CoreResult<()> {
        let (farmers, employees, registrations) = tokio::join!(
            self.load_farmers(force),
            self.load_employees(force),
            self.load_registrations(force)
        );

        let mut first_error = None;
        let mut state = self.state.write().await;
        match farmers {
            Ok(Some(farmers)) => state.farmers = farmers,
            Ok(None) => {}
            Err(err) => first_error = first_error.or(Some(err)),
        }
        match employees {
            Ok(Some(employees)) => state.employees = employees,
            Ok(None) => {}
            Err(err) => first_error = first_error.or(Some(err)),
        }
        match registrations {
            Ok(Some(registrations)) => state.registrations = registrations,
            Ok(None) => {}
            Err(err) => first_error = first_error.or(Some(err)),
        }
        debug!(
            view = %self.label,
            farmers = state.farmers.len(),
            employees = state.employees.len(),
            registrations = state.registrations.len(),
            "view refreshed"
        );

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn load_farmers(&self, force: bool) -> CoreResult<Option<Vec<Farmer>>> {
        let api = Arc::clone(&self.api);
        self.farmers
            .execute(
                move |_cancel| async move { api.list_farmers().await },
                ExecuteOptions::cached(FARMERS_CACHE_KEY)
                    .with_ttl(self.cache_ttl)
                    .skip_cache(force),
            )
            .await
    }

    async fn load_employees(&self, force: bool) -> CoreResult<Option<Vec<Employee>>> {
        let api = Arc::clone(&self.api);
        self.employees
            .execute(
                move |_cancel| async move { api.list_employees().await },
                ExecuteOptions::cached(EMPLOYEES_CACHE_KEY)
                    .with_ttl(self.cache_ttl)
                    .skip_cache(force),
            )
            .await
    }

    async fn load_registrations(&self, force: bool) -> CoreResult<Option<Vec<Registration>>> {
        let api = Arc::clone(&self.api);
        self.registrations
            .execute(
                move |_cancel| async move { api.list_registrations().await },
                ExecuteOptions::cached(REGISTRATIONS_CACHE_KEY)
                    .with_ttl(self.cache_ttl)
                    .skip_cache(force),
            )
            .await
    }

    pub async fn snapshot(&self) -> DashboardState {
        self.state.read().await.clone()
    }

    pub async fn stats(&self) -> DashboardStats {
        let state = self.state.read().await;
        get_stats(&state.farmers, &state.employees)
    }

    pub async fn registration_stats(&self) -> RegistrationStats {
        get_registration_stats(&self.state.read().await.registrations)
    }

    pub async fn caseload(&self, employee_id: EmployeeId) -> Option<(Employee, Caseload)> {
        let state = self.state.read().await;
        let employee = state.employees.iter().find(|employee| employee.id == employee_id)?;
        Some((employee.clone(), get_employee_caseload(employee, &state.farmers)))
    }

    pub async fn eligible_farmers(&self) -> Vec<Farmer> {
        let state = self.state.read().await;
        eligible_farmers(&state.farmers).into_iter().cloned().collect()
    }

    pub async fn farmer(&self, farmer_id: FarmerId) -> Option<Farmer> {
        let state = self.state.read().await;
        state.farmers.iter().find(|farmer| farmer.id == farmer_id).cloned()
    }

    /// Runs a KYC update against this view's copy of the farmer and commits
    /// the result locally once the backend accepts it.
    pub async fn update_kyc(
        &self,
        service: &KycService,
        update: KycUpdate,
        reviewer: &Reviewer,
    ) -> CoreResult<KycTransition> {
        let farmer_id = update.farmer_id;
        let mut farmer = self.farmer(farmer_id).await.ok_or_else(|| {
            CoreError::validation(format!("farmer {farmer_id} is not loaded in this view"))
        })?;

        let transition = service.update_kyc_status(&mut farmer, update, reviewer).await?;

        let mut state = self.state.write().await;
        if let Some(slot) = state.farmers.iter_mut().find(|slot| slot.id == farmer_id) {
            commit_kyc(slot, farmer);
        }
        Ok(transition)
    }

    pub async fn bulk_assign(
        &self,
        coordinator: &AssignmentCoordinator,
        farmer_ids: &BTreeSet<FarmerId>,
        employee_id: EmployeeId,
    ) -> CoreResult<Option<BulkAssignOutcome>> {
        let outcome = coordinator.bulk_assign(farmer_ids, employee_id).await?;
        if let Some(outcome) = &outcome {
            let mut state = self.state.write().await;
            let updated = outcome.reconcile(&mut state.farmers);
            debug!(view = %self.label, updated, "reconciled assignments");
        }
        Ok(outcome)
    }

    pub async fn review_registration(
        &self,
        review: &RegistrationReview,
        registration_id: RegistrationId,
        decision: RegistrationStatus,
    ) -> CoreResult<()> {
        let mut registration = {
            let state = self.state.read().await;
            state
                .registrations
                .iter()
                .find(|registration| registration.id == registration_id)
                .cloned()
        }
        .ok_or_else(|| {
            CoreError::validation(format!(
                "registration {registration_id} is not loaded in this view"
            ))
        })?;

        review.review(&mut registration, decision).await?;

        let mut state = self.state.write().await;
        if let Some(slot) = state
            .registrations
            .iter_mut()
            .find(|slot| slot.id == registration_id)
        {
            *slot = registration;
        }
        Ok(())
    }

    /// Refetches this view `grace_period` after any change elsewhere.
    pub async fn watch(self: &Arc<Self>, bus: &NotificationBus, grace_period: Duration) {
        let view: Weak<Self> = Arc::downgrade(self);
        let watcher = RefreshWatcher::spawn(bus, &ChangeTopic::ALL, grace_period, move || {
            let view = view.clone();
            async move {
                let Some(view) = view.upgrade() else {
                    return;
                };
                if let Err(err) = view.refresh(true).await {
                    warn!(view = %view.label, error = %err, "refresh after change failed");
                }
            }
        });

        if let Some(previous) = self.watcher.lock().await.replace(watcher) {
            previous.stop();
        }
        info!(view = %self.label, grace_ms = grace_period.as_millis() as u64, "watching for changes");
    }

    pub async fn invalidate(&self) {
        self.farmers.clear_cache(None).await;
        self.employees.clear_cache(None).await;
        self.registrations.clear_cache(None).await;
    }

    /// View teardown: stop watching, abandon in-flight loads, drop caches.
    pub async fn close(&self) {
        if let Some(watcher) = self.watcher.lock().await.take() {
            watcher.stop();
        }
        self.farmers.cancel().await;
        self.employees.cancel().await;
        self.registrations.cancel().await;
        self.invalidate().await;
        debug!(view = %self.label, "view closed");
    }
}

/// Copies only the KYC fields, so a refresh that landed while the update was
/// in flight keeps its assignment and profile data.
fn commit_kyc(slot: &mut Farmer, reviewed: Farmer) {
    slot.kyc_status = reviewed.kyc_status;
    slot.kyc_reason = reviewed.kyc_reason;
    slot.aadhaar_number = reviewed.aadhaar_number;
    slot.pan_number = reviewed.pan_number;
    slot.reviewed_by = reviewed.reviewed_by;
    slot.reviewed_at = reviewed.reviewed_at;
}

#[cfg(test)]
#[path = "tests/dashboard_tests.rs"]
mod tests;
