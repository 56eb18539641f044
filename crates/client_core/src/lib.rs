//! Client-side core of the KYC operations console.
//!
//! Each open dashboard owns a [`DashboardView`] with its own request
//! executors. Mutations go through [`KycService`], [`AssignmentCoordinator`]
//! and [`RegistrationReview`], which publish change events on a shared
//! [`NotificationBus`] so other views can refetch.

pub mod api;
pub mod assignment;
pub mod dashboard;
pub mod error;
pub mod executor;
pub mod kyc;
pub mod notifications;
pub mod registrations;
pub mod stats;

pub use api::{ConsoleApi, HttpConsoleApi, MissingConsoleApi};
pub use assignment::{AssignmentCoordinator, BulkAssignOutcome};
pub use dashboard::{DashboardState, DashboardView};
pub use error::{CoreError, CoreResult};
pub use executor::{ExecuteOptions, RequestExecutor, DEFAULT_CACHE_TTL};
pub use kyc::{KycService, KycStateMachine, KycTransition, KycUpdate};
pub use notifications::{
    NotificationBus, RefreshWatcher, Subscription, SubscriptionHandle,
    EVENTUAL_CONSISTENCY_GRACE_PERIOD,
};
pub use registrations::RegistrationReview;
pub use stats::{Caseload, DashboardStats, RegistrationStats};

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod api_tests;
