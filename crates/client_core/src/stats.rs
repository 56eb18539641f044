//! Dashboard counters derived from whatever collections a view holds.

use serde::Serialize;
use shared::domain::{Employee, Farmer, KycStatus, Registration, RegistrationStatus};
use tracing::warn;

use crate::assignment::is_eligible;

pub fn normalize_status(raw: &str) -> KycStatus {
    KycStatus::normalize(raw)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_farmers: usize,
    pub total_employees: usize,
    pub unassigned_farmers: usize,
    #[serde(rename = "pendingKYC")]
    pub pending_kyc: usize,
    #[serde(rename = "approvedKYC")]
    pub approved_kyc: usize,
    #[serde(rename = "referBackKYC")]
    pub refer_back_kyc: usize,
    #[serde(rename = "rejectedKYC")]
    pub rejected_kyc: usize,
}

pub fn get_stats(farmers: &[Farmer], employees: &[Employee]) -> DashboardStats {
    let mut stats = DashboardStats {
        total_farmers: farmers.len(),
        total_employees: employees.len(),
        ..DashboardStats::default()
    };

    for farmer in farmers {
        if is_eligible(farmer) {
            stats.unassigned_farmers += 1;
        }
        match farmer.kyc_status {
            KycStatus::NotStarted | KycStatus::Pending => stats.pending_kyc += 1,
            KycStatus::Approved => stats.approved_kyc += 1,
            KycStatus::ReferBack => stats.refer_back_kyc += 1,
            KycStatus::Rejected => stats.rejected_kyc += 1,
        }
    }
    stats
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Caseload {
    pub total: usize,
    pub approved: usize,
    pub pending: usize,
    pub refer_back: usize,
    pub rejected: usize,
    /// Farmers matched by name or contact rather than by id.
    pub legacy_matches: usize,
}

impl Caseload {
    fn record(&mut self, status: KycStatus) {
        self.total += 1;
        match status {
            KycStatus::NotStarted | KycStatus::Pending => self.pending += 1,
            KycStatus::Approved => self.approved += 1,
            KycStatus::ReferBack => self.refer_back += 1,
            KycStatus::Rejected => self.rejected += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EmployeeMatch {
    Id,
    Name,
    Contact,
}

fn match_employee(employee: &Employee, farmer: &Farmer) -> Option<EmployeeMatch> {
    if is_eligible(farmer) {
        return None;
    }
    let reference = farmer.assigned_employee_ref.as_deref()?.trim();

    if reference.parse::<i64>().ok() == Some(employee.id.0) {
        return Some(EmployeeMatch::Id);
    }
    if !employee.name.trim().is_empty() && reference.eq_ignore_ascii_case(employee.name.trim()) {
        return Some(EmployeeMatch::Name);
    }
    match employee.contact.as_deref().map(str::trim) {
        Some(contact) if !contact.is_empty() && reference.eq_ignore_ascii_case(contact) => {
            Some(EmployeeMatch::Contact)
        }
        _ => None,
    }
}

/// Caseload for one employee. Farmers are matched by id; legacy rows that
/// hold the employee's name or contact still count but are reported in
/// `legacy_matches` and logged.
pub fn get_employee_caseload(employee: &Employee, farmers: &[Farmer]) -> Caseload {
    let mut caseload = Caseload::default();
    for farmer in farmers {
        let Some(matched) = match_employee(employee, farmer) else {
            continue;
        };
        if matched != EmployeeMatch::Id {
            warn!(
                farmer_id = %farmer.id,
                employee_id = %employee.id,
                via = ?matched,
                "farmer assignment matched by legacy reference; needs id migration"
            );
            caseload.legacy_matches += 1;
        }
        caseload.record(farmer.kyc_status);
    }
    caseload
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistrationStats {
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
}

pub fn get_registration_stats(registrations: &[Registration]) -> RegistrationStats {
    registrations
        .iter()
        .fold(RegistrationStats::default(), |mut stats, registration| {
            stats.total += 1;
            match registration.status {
                RegistrationStatus::Pending => stats.pending += 1,
                RegistrationStatus::Approved => stats.approved += 1,
                RegistrationStatus::Rejected => stats.rejected += 1,
            }
            stats
        })
}

#[cfg(test)]
#[path = "tests/stats_tests.rs"]
mod tests;
