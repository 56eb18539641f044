use std::sync::Arc;

use shared::{
    domain::{Registration, RegistrationStatus},
    protocol::{ChangeEvent, RegistrationStatusRequest},
};
use tracing::info;

use crate::{
    api::ConsoleApi,
    error::{CoreError, CoreResult},
    notifications::NotificationBus,
};

pub fn pending_registrations(registrations: &[Registration]) -> Vec<&Registration> {
    registrations
        .iter()
        .filter(|registration| registration.status == RegistrationStatus::Pending)
        .collect()
}

pub struct RegistrationReview {
    api: Arc<dyn ConsoleApi>,
    bus: NotificationBus,
}

impl RegistrationReview {
    pub fn new(api: Arc<dyn ConsoleApi>, bus: NotificationBus) -> Self {
        Self { api, bus }
    }

    pub async fn review(
        &self,
        registration: &mut Registration,
        decision: RegistrationStatus,
    ) -> CoreResult<()> {
        if decision == RegistrationStatus::Pending {
            return Err(CoreError::validation(
                "a registration review must approve or reject",
            ));
        }

        self.api
            .update_registration_status(
                registration.id,
                &RegistrationStatusRequest { status: decision },
            )
            .await?;

        let previous = registration.status;
        registration.status = decision;
        info!(
            registration_id = %registration.id,
            role = ?registration.role,
            from = %previous,
            to = %decision,
            "registration reviewed"
        );
        self.bus
            .emit(ChangeEvent::registration_reviewed(registration.id, decision));
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/registrations_tests.rs"]
mod tests;
