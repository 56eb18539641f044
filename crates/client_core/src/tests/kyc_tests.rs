use super::*;
use crate::test_support::{admin, farmer, field_reviewer, FakeConsoleApi};
use shared::protocol::{Change, ChangeTopic};

fn service(api: &Arc<FakeConsoleApi>, bus: &NotificationBus) -> KycService {
    KycService::new(Arc::clone(api) as Arc<dyn ConsoleApi>, bus.clone())
}

fn valid_documents() -> KycDocuments {
    KycDocuments::new("123456789012", "ABCDE1234F")
}

#[tokio::test]
async fn approval_with_valid_documents_is_idempotent() {
    let api = Arc::new(FakeConsoleApi::default());
    let bus = NotificationBus::new();
    let mut events = bus.subscribe(ChangeTopic::KycUpdated);
    let service = service(&api, &bus);
    let mut record = farmer(1, KycStatus::Pending, None);

    let update = KycUpdate::approve(FarmerId(1), Some(valid_documents()));
    let first = service
        .update_kyc_status(&mut record, update.clone(), &field_reviewer())
        .await
        .expect("approve");
    assert_eq!(first.from, KycStatus::Pending);
    assert_eq!(record.kyc_status, KycStatus::Approved);
    assert_eq!(record.aadhaar_number.as_deref(), Some("123456789012"));
    assert_eq!(record.reviewed_by.as_deref(), Some("Field Nine"));

    service
        .update_kyc_status(&mut record, update, &field_reviewer())
        .await
        .expect("repeat approve");
    assert_eq!(record.kyc_status, KycStatus::Approved);

    assert_eq!(api.kyc_calls.lock().await.len(), 2);
    for _ in 0..2 {
        let event = events.recv().await.expect("event");
        assert_eq!(event.id, 1);
        assert!(matches!(
            event.change,
            Change::KycUpdated {
                new_status: KycStatus::Approved,
                ..
            }
        ));
    }
}

#[tokio::test]
async fn approval_with_empty_aadhaar_fails_before_network() {
    let api = Arc::new(FakeConsoleApi::default());
    let bus = NotificationBus::new();
    let service = service(&api, &bus);
    let mut record = farmer(1, KycStatus::Pending, None);
    record.aadhaar_number = Some("123456789012".into());

    let err = service
        .update_kyc_status(
            &mut record,
            KycUpdate::approve(FarmerId(1), Some(KycDocuments::new("", "ABCDE1234F"))),
            &admin(),
        )
        .await
        .expect_err("must fail");

    assert!(err.is_validation(), "unexpected error: {err}");
    assert!(api.kyc_calls.lock().await.is_empty());
    assert_eq!(record.kyc_status, KycStatus::Pending);
}

#[tokio::test]
async fn rejection_requires_reason_and_emits_it() {
    let api = Arc::new(FakeConsoleApi::default());
    let bus = NotificationBus::new();
    let mut events = bus.subscribe(ChangeTopic::KycUpdated);
    let service = service(&api, &bus);
    let mut record = farmer(4, KycStatus::Pending, None);

    let err = service
        .update_kyc_status(&mut record, KycUpdate::reject(FarmerId(4), "  "), &admin())
        .await
        .expect_err("blank reason");
    assert!(err.is_validation());
    assert!(api.kyc_calls.lock().await.is_empty());

    service
        .update_kyc_status(
            &mut record,
            KycUpdate::reject(FarmerId(4), "Incomplete documents"),
            &admin(),
        )
        .await
        .expect("reject");
    assert_eq!(record.kyc_status, KycStatus::Rejected);
    assert_eq!(record.kyc_reason.as_deref(), Some("Incomplete documents"));

    let event = events.recv().await.expect("event");
    assert_eq!(
        event.change,
        Change::KycUpdated {
            new_status: KycStatus::Rejected,
            reason: Some("Incomplete documents".into()),
            documents: None,
        }
    );
}

#[tokio::test]
async fn network_failure_leaves_record_untouched() {
    let api = Arc::new(FakeConsoleApi {
        fail_kyc: true,
        ..FakeConsoleApi::default()
    });
    let bus = NotificationBus::new();
    let mut events = bus.subscribe(ChangeTopic::KycUpdated);
    let service = service(&api, &bus);
    let mut record = farmer(2, KycStatus::Pending, None);

    let err = service
        .update_kyc_status(
            &mut record,
            KycUpdate::refer_back(FarmerId(2), "Blurry PAN scan"),
            &field_reviewer(),
        )
        .await
        .expect_err("network failure");

    assert!(matches!(err, CoreError::Network { .. }));
    assert_eq!(record.kyc_status, KycStatus::Pending);
    assert!(events.try_recv().is_none());
}

#[test]
fn non_admin_cannot_reopen_closed_case() {
    let err = KycStateMachine::transition(
        KycStatus::Approved,
        &KycUpdate::reject(FarmerId(1), "Fraud suspected"),
        &KycDocuments::default(),
        &field_reviewer(),
    )
    .expect_err("forbidden");
    assert!(matches!(err, CoreError::Forbidden(_)));

    let reopened = KycStateMachine::transition(
        KycStatus::Approved,
        &KycUpdate::reject(FarmerId(1), "Fraud suspected"),
        &KycDocuments::default(),
        &admin(),
    )
    .expect("admin may re-open");
    assert_eq!(reopened.to, KycStatus::Rejected);
}

#[tokio::test]
async fn forbidden_transition_makes_no_network_call() {
    let api = Arc::new(FakeConsoleApi::default());
    let service = service(&api, &NotificationBus::new());
    let mut record = farmer(1, KycStatus::Rejected, None);

    let err = service
        .update_kyc_status(
            &mut record,
            KycUpdate::approve(FarmerId(1), Some(valid_documents())),
            &field_reviewer(),
        )
        .await
        .expect_err("forbidden");
    assert!(matches!(err, CoreError::Forbidden(_)));
    assert!(api.kyc_calls.lock().await.is_empty());
}

#[test]
fn refer_back_from_pending_needs_reason() {
    let err = KycStateMachine::transition(
        KycStatus::Pending,
        &KycUpdate {
            farmer_id: FarmerId(1),
            new_status: KycStatus::ReferBack,
            reason: None,
            documents: None,
        },
        &KycDocuments::default(),
        &field_reviewer(),
    )
    .expect_err("missing reason");
    assert!(err.is_validation());

    let ok = KycStateMachine::transition(
        KycStatus::NotStarted,
        &KycUpdate::refer_back(FarmerId(1), "Upload clearer Aadhaar"),
        &KycDocuments::default(),
        &field_reviewer(),
    )
    .expect("refer back");
    assert_eq!(ok.to, KycStatus::ReferBack);
    assert_eq!(ok.reason.as_deref(), Some("Upload clearer Aadhaar"));
}

#[test]
fn refer_back_is_limited_to_open_cases_for_non_admins() {
    let reissued = KycStateMachine::transition(
        KycStatus::ReferBack,
        &KycUpdate::refer_back(FarmerId(1), "PAN card still blurred"),
        &KycDocuments::default(),
        &field_reviewer(),
    )
    .expect("refer back again");
    assert_eq!(reissued.from, KycStatus::ReferBack);
    assert_eq!(reissued.reason.as_deref(), Some("PAN card still blurred"));

    for closed in [KycStatus::Approved, KycStatus::Rejected] {
        let err = KycStateMachine::transition(
            closed,
            &KycUpdate::refer_back(FarmerId(1), "Recheck address"),
            &KycDocuments::default(),
            &field_reviewer(),
        )
        .expect_err("closed case");
        assert!(matches!(err, CoreError::Forbidden(_)), "{closed}");

        let reopened = KycStateMachine::transition(
            closed,
            &KycUpdate::refer_back(FarmerId(1), "Recheck address"),
            &KycDocuments::default(),
            &admin(),
        )
        .expect("admin may refer back");
        assert_eq!(reopened.to, KycStatus::ReferBack);
    }
}

#[test]
fn reviewers_cannot_set_pending_directly() {
    let err = KycStateMachine::transition(
        KycStatus::ReferBack,
        &KycUpdate {
            farmer_id: FarmerId(1),
            new_status: KycStatus::Pending,
            reason: None,
            documents: None,
        },
        &KycDocuments::default(),
        &admin(),
    )
    .expect_err("pending is external");
    assert!(err.is_validation());
}

#[test]
fn approval_falls_back_to_stored_documents_and_normalizes_pan() {
    let stored = KycDocuments::new(" 123456789012 ", "abcde1234f");
    let transition = KycStateMachine::transition(
        KycStatus::ReferBack,
        &KycUpdate::approve(FarmerId(1), None),
        &stored,
        &field_reviewer(),
    )
    .expect("approve from stored documents");
    assert_eq!(
        transition.documents,
        Some(KycDocuments::new("123456789012", "ABCDE1234F"))
    );
}

#[test]
fn malformed_documents_are_rejected() {
    for (aadhaar, pan) in [
        ("12345678901", "ABCDE1234F"),
        ("12345678901a", "ABCDE1234F"),
        ("123456789012", "ABCDE1234"),
        ("123456789012", "ABCDE-234F"),
    ] {
        let err =
            KycStateMachine::validate_documents(Some(&KycDocuments::new(aadhaar, pan)), &KycDocuments::default())
                .expect_err("malformed");
        assert!(err.is_validation(), "{aadhaar}/{pan}: {err}");
    }

    let missing_pan = KycStateMachine::validate_documents(
        Some(&KycDocuments {
            aadhaar_number: Some("123456789012".into()),
            pan_number: None,
        }),
        &KycDocuments::default(),
    )
    .expect_err("missing pan");
    assert_eq!(
        missing_pan,
        CoreError::validation("PAN number is required for approval")
    );
}
