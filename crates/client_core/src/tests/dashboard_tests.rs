use super::*;
use crate::{
    assignment::NOT_ASSIGNED,
    notifications::EVENTUAL_CONSISTENCY_GRACE_PERIOD,
    test_support::{admin, employee, farmer, registration, FakeConsoleApi},
};
use shared::domain::{KycStatus, RegistrationStatus};
use tokio::time::sleep;

fn seeded_api() -> Arc<FakeConsoleApi> {
    Arc::new(seeded_fake())
}

fn seeded_fake() -> FakeConsoleApi {
    let mut api = FakeConsoleApi::with_farmers(vec![
        farmer(1, KycStatus::Pending, None),
        farmer(2, KycStatus::Approved, Some("9")),
        farmer(3, KycStatus::NotStarted, Some(NOT_ASSIGNED)),
    ]);
    *api.employees.get_mut() = vec![employee(9, "Meena", None)];
    *api.registrations.get_mut() = vec![
        registration(20, RegistrationStatus::Pending),
        registration(21, RegistrationStatus::Approved),
    ];
    api
}

#[tokio::test(start_paused = true)]
async fn refresh_loads_collections_and_reuses_cache() {
    let api = seeded_api();
    let view = DashboardView::new("overview", api.clone(), Duration::from_secs(300));

    view.refresh(false).await.expect("refresh");
    let stats = view.stats().await;
    assert_eq!(stats.total_farmers, 3);
    assert_eq!(stats.total_employees, 1);
    assert_eq!(stats.unassigned_farmers, 2);
    assert_eq!(stats.pending_kyc, 2);
    assert_eq!(view.registration_stats().await.pending, 1);

    view.refresh(false).await.expect("cached refresh");
    assert_eq!(*api.list_calls.lock().await, 1);

    view.refresh(true).await.expect("forced refresh");
    assert_eq!(*api.list_calls.lock().await, 2);

    view.invalidate().await;
    view.refresh(false).await.expect("refresh after invalidate");
    assert_eq!(*api.list_calls.lock().await, 3);
}

#[tokio::test]
async fn caseload_and_eligibility_use_view_state() {
    let view = DashboardView::new("caseload", seeded_api(), Duration::from_secs(300));
    view.refresh(false).await.expect("refresh");

    let (meena, caseload) = view.caseload(EmployeeId(9)).await.expect("employee loaded");
    assert_eq!(meena.name, "Meena");
    assert_eq!(caseload.total, 1);
    assert_eq!(caseload.approved, 1);
    assert!(view.caseload(EmployeeId(404)).await.is_none());

    let eligible: Vec<_> = view
        .eligible_farmers()
        .await
        .into_iter()
        .map(|farmer| farmer.id)
        .collect();
    assert_eq!(eligible, vec![FarmerId(1), FarmerId(3)]);
}

#[tokio::test]
async fn bulk_assign_reconciles_view_farmers() {
    let api = seeded_api();
    let bus = NotificationBus::new();
    let view = DashboardView::new("assign", api.clone(), Duration::from_secs(300));
    view.refresh(false).await.expect("refresh");
    let coordinator = AssignmentCoordinator::new(api.clone(), bus);

    let ids: BTreeSet<FarmerId> = [FarmerId(1), FarmerId(3)].into_iter().collect();
    let outcome = view
        .bulk_assign(&coordinator, &ids, EmployeeId(9))
        .await
        .expect("assign")
        .expect("not superseded");

    assert!(outcome.is_complete());
    assert!(view.eligible_farmers().await.is_empty());
    assert_eq!(
        view.farmer(FarmerId(3))
            .await
            .and_then(|farmer| farmer.assigned_employee_ref),
        Some("9".to_string())
    );
}

#[tokio::test]
async fn kyc_update_commits_to_view_after_backend_accepts() {
    let api = seeded_api();
    let view = DashboardView::new("kyc", api.clone(), Duration::from_secs(300));
    view.refresh(false).await.expect("refresh");
    let service = KycService::new(api.clone(), NotificationBus::new());

    view.update_kyc(
        &service,
        KycUpdate::refer_back(FarmerId(1), "Aadhaar photo unreadable"),
        &admin(),
    )
    .await
    .expect("refer back");
    let updated = view.farmer(FarmerId(1)).await.expect("farmer");
    assert_eq!(updated.kyc_status, KycStatus::ReferBack);
    assert_eq!(updated.kyc_reason.as_deref(), Some("Aadhaar photo unreadable"));

    let err = view
        .update_kyc(&service, KycUpdate::reject(FarmerId(99), "missing"), &admin())
        .await
        .expect_err("unknown farmer");
    assert!(err.is_validation());
}

#[tokio::test]
async fn registration_review_updates_view() {
    let api = seeded_api();
    let view = DashboardView::new("registrations", api.clone(), Duration::from_secs(300));
    view.refresh(false).await.expect("refresh");
    let review = RegistrationReview::new(api.clone(), NotificationBus::new());

    view.review_registration(&review, RegistrationId(20), RegistrationStatus::Rejected)
        .await
        .expect("reject");
    let stats = view.registration_stats().await;
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.rejected, 1);
}

#[tokio::test(start_paused = true)]
async fn other_view_refetches_after_grace_period() {
    let api = seeded_api();
    let bus = NotificationBus::new();
    let editor = DashboardView::new("editor", api.clone(), Duration::from_secs(300));
    let observer = DashboardView::new("observer", api.clone(), Duration::from_secs(300));
    editor.refresh(false).await.expect("editor refresh");
    observer.refresh(false).await.expect("observer refresh");
    observer.watch(&bus, EVENTUAL_CONSISTENCY_GRACE_PERIOD).await;

    let coordinator = AssignmentCoordinator::new(api.clone(), bus.clone());
    let ids: BTreeSet<FarmerId> = [FarmerId(1)].into_iter().collect();
    editor
        .bulk_assign(&coordinator, &ids, EmployeeId(9))
        .await
        .expect("assign");

    sleep(Duration::from_millis(1000)).await;
    assert_eq!(observer.stats().await.unassigned_farmers, 2);

    sleep(Duration::from_millis(1500)).await;
    assert_eq!(observer.stats().await.unassigned_farmers, 1);
    assert_eq!(*api.list_calls.lock().await, 3);

    observer.close().await;
    let ids: BTreeSet<FarmerId> = [FarmerId(3)].into_iter().collect();
    editor
        .bulk_assign(&coordinator, &ids, EmployeeId(9))
        .await
        .expect("assign");
    sleep(Duration::from_millis(5000)).await;
    assert_eq!(*api.list_calls.lock().await, 3);
}

#[tokio::test(start_paused = true)]
async fn superseded_refresh_leaves_view_for_the_latest_load() {
    let api = Arc::new(FakeConsoleApi {
        list_delay: Some(Duration::from_millis(100)),
        ..seeded_fake()
    });
    let view = DashboardView::new("reload", api.clone(), Duration::from_secs(300));
    view.refresh(false).await.expect("initial refresh");
    api.farmers.lock().await[0].assigned_employee_ref = Some("9".into());

    let first = tokio::spawn({
        let view = Arc::clone(&view);
        async move { view.refresh(true).await }
    });
    sleep(Duration::from_millis(50)).await;
    let second = tokio::spawn({
        let view = Arc::clone(&view);
        async move { view.refresh(true).await }
    });

    first.await.expect("join").expect("superseded refresh is not an error");
    let farmer_one = view.farmer(FarmerId(1)).await.expect("farmer");
    assert_eq!(farmer_one.assigned_employee_ref, None);

    second.await.expect("join").expect("latest refresh");
    let farmer_one = view.farmer(FarmerId(1)).await.expect("farmer");
    assert_eq!(farmer_one.assigned_employee_ref.as_deref(), Some("9"));
    assert_eq!(*api.list_calls.lock().await, 3);
}

#[tokio::test(start_paused = true)]
async fn kyc_commit_keeps_fields_refreshed_while_it_was_in_flight() {
    let api = Arc::new(FakeConsoleApi {
        list_delay: Some(Duration::from_millis(100)),
        kyc_delay: Some(Duration::from_millis(300)),
        ..seeded_fake()
    });
    let view = DashboardView::new("kyc-race", api.clone(), Duration::from_secs(300));
    view.refresh(false).await.expect("refresh");
    let service = KycService::new(api.clone(), NotificationBus::new());
    let actor = admin();

    let (transition, refreshed) = tokio::join!(
        view.update_kyc(
            &service,
            KycUpdate::reject(FarmerId(1), "Land record mismatch"),
            &actor,
        ),
        async {
            sleep(Duration::from_millis(50)).await;
            api.farmers.lock().await[0].assigned_employee_ref = Some("9".into());
            view.refresh(true).await
        }
    );
    refreshed.expect("refresh during update");
    assert_eq!(transition.expect("reject").to, KycStatus::Rejected);

    let farmer_one = view.farmer(FarmerId(1)).await.expect("farmer");
    assert_eq!(farmer_one.kyc_status, KycStatus::Rejected);
    assert_eq!(farmer_one.kyc_reason.as_deref(), Some("Land record mismatch"));
    assert_eq!(farmer_one.assigned_employee_ref.as_deref(), Some("9"));
}
