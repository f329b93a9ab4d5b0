use std::sync::{Arc, Mutex};

use offerdesk_core::backend::SendAck;
use offerdesk_core::columns::{ColumnKey, ColumnProjection};
use offerdesk_core::fixtures::{demo_catalog, demo_offer, second_demo_offer, ScriptedBackend};
use offerdesk_core::{
    BackendError, FallbackCycle, FeedOutcome, InMemoryAuditSink, LineId, OfferId, OfferStore,
    ReviewWorkspace, SelectionState, StatusBoard, StatusEntryRecord, StatusPoller,
    SubmissionCoordinator, SubmissionError,
};
use rust_decimal::Decimal;

struct Desk {
    backend: Arc<ScriptedBackend>,
    store: Arc<OfferStore>,
    fallback: Arc<FallbackCycle>,
    workspace: Arc<Mutex<ReviewWorkspace>>,
    poller: Arc<StatusPoller>,
    coordinator: SubmissionCoordinator,
    audit: InMemoryAuditSink,
}

fn desk() -> Desk {
    let backend = Arc::new(ScriptedBackend::default());
    let store = Arc::new(OfferStore::new());
    let fallback = Arc::new(FallbackCycle::default());
    let workspace = Arc::new(Mutex::new(ReviewWorkspace::new(
        Arc::clone(&store),
        Arc::new(demo_catalog()),
        Arc::clone(&fallback),
    )));
    let poller = Arc::new(StatusPoller::new(
        backend.clone(),
        Arc::clone(&store),
        Arc::new(StatusBoard::new()),
    ));
    let audit = InMemoryAuditSink::default();
    let coordinator = SubmissionCoordinator::new(
        backend.clone(),
        Arc::clone(&store),
        &workspace,
        Arc::new(audit.clone()),
    );
    Desk { backend, store, fallback, workspace, poller, coordinator, audit }
}

fn demo_id() -> OfferId {
    OfferId::from("DEMO-1")
}

#[tokio::test]
async fn deselecting_a_line_changes_selected_total_but_not_face_value() {
    let desk = desk();
    desk.backend.push_offers(Ok(vec![demo_offer()]));
    desk.poller.refresh_now().await;

    let mut workspace = desk.workspace.lock().expect("workspace");
    let editor = workspace.focus(&demo_id()).expect("demo offer polled");
    assert_eq!(editor.face_value().amount(), Decimal::new(48460, 2));

    editor.deselect_line(&LineId::from("L4")).expect("line 4");

    assert_eq!(editor.selected_total().amount(), Decimal::new(34960, 2));
    assert_eq!(editor.face_value().amount(), Decimal::new(48460, 2));
    assert_eq!(editor.selection_state(), SelectionState::SomeSelected);
    assert_eq!(editor.selected_total().to_string(), "349.60");
}

#[tokio::test]
async fn repeated_unknown_code_yields_distinct_fallback_products() {
    let desk = desk();
    desk.backend.push_offers(Ok(vec![demo_offer()]));
    desk.poller.refresh_now().await;
    desk.fallback.reset();

    let mut workspace = desk.workspace.lock().expect("workspace");
    let editor = workspace.focus(&demo_id()).expect("demo offer polled");
    let line_id = LineId::from("L1");

    editor.set_product_code(&line_id, "ZZZ-999").expect("line 1");
    let first = editor.offer().line(&line_id).expect("line 1").clone();
    editor.set_product_code(&line_id, "ZZZ-999").expect("line 1");
    let second = editor.offer().line(&line_id).expect("line 1").clone();

    assert_ne!(
        (first.product_name(), first.unit_price()),
        (second.product_name(), second.unit_price())
    );
    for line in [&first, &second] {
        assert_eq!(line.product_code(), "ZZZ-999");
        assert_eq!(line.confidence(), 100);
        assert_eq!(line.reasoning(), "Manually selected by user");
        assert_eq!(line.total_price(), line.unit_price() * Decimal::from(line.quantity()));
    }
}

#[tokio::test]
async fn submitted_offer_is_not_resurrected_by_an_in_flight_poll() {
    let desk = desk();
    desk.backend.push_offers(Ok(vec![demo_offer(), second_demo_offer()]));
    desk.poller.refresh_now().await;

    let statuses = desk.backend.defer_statuses();
    let offers = desk.backend.defer_offers();
    let calls_before = desk.backend.total_calls();

    let poll = desk.poller.refresh_now();
    let driver = async {
        desk.backend.wait_for_calls(calls_before + 2).await;
        let receipt = desk
            .coordinator
            .submit(&demo_id(), &[LineId::from("L1")], "req-flow-1")
            .await
            .expect("submit accepted");
        let _ = statuses.send(Ok(vec![StatusEntryRecord::new("DEMO-1", "pending_review")]));
        let _ = offers.send(Ok(vec![demo_offer(), second_demo_offer()]));
        receipt
    };
    let (outcome, receipt) = tokio::join!(poll, driver);

    assert_eq!(outcome.offers, FeedOutcome::Applied { count: 1 });
    assert_eq!(receipt.next_focus, None, "nothing was focused before the submit");
    assert!(!desk.store.contains(&demo_id()));
    assert!(desk.store.contains(&OfferId::from("DEMO-2")));
}

#[tokio::test]
async fn failed_submission_keeps_everything_and_retry_succeeds() {
    let desk = desk();
    desk.backend.push_offers(Ok(vec![demo_offer(), second_demo_offer()]));
    desk.poller.refresh_now().await;
    desk.backend.push_send(Err(BackendError::Rejected {
        status: 502,
        code: Some("erp_unavailable".to_owned()),
        message: Some("ERP did not answer".to_owned()),
    }));
    desk.backend.push_send(Ok(SendAck {
        message: None,
        erp_reference: Some("ERP-1".to_owned()),
    }));
    let working_before = {
        let mut workspace = desk.workspace.lock().expect("workspace");
        let editor = workspace.focus(&demo_id()).expect("demo offer");
        editor.deselect_line(&LineId::from("L4")).expect("line 4");
        editor.set_quantity_input(&LineId::from("L2"), "15").expect("line 2");
        editor.offer().clone()
    };
    let stored_before = desk.store.get(&demo_id()).expect("stored offer");

    let error =
        desk.coordinator.submit_selected(&demo_id(), "req-flow-2").await.expect_err("502");
    assert!(matches!(error, SubmissionError::Remote(_)));
    {
        let workspace = desk.workspace.lock().expect("workspace");
        let editor = workspace.editor().expect("still focused");
        assert_eq!(editor.offer(), &working_before);
        assert_eq!(editor.selected_total().amount(), Decimal::new(37900, 2));
    }
    assert_eq!(desk.store.get(&demo_id()), Some(stored_before));

    let receipt = desk.coordinator.submit_selected(&demo_id(), "req-flow-3").await.expect("ok");
    assert_eq!(receipt.line_ids.len(), 3);
    assert_eq!(receipt.next_focus, Some(OfferId::from("DEMO-2")));
    assert_eq!(desk.audit.events().len(), 2);
}

#[test]
fn projection_renders_visible_columns_in_declared_order() {
    let mut projection = ColumnProjection::default();
    let offer = demo_offer();
    let line = offer.line(&LineId::from("L4")).expect("line 4");

    assert!(!projection.toggle_visibility(ColumnKey::TotalPrice), "required column");
    assert!(projection.toggle_visibility(ColumnKey::OriginalTerm));

    let keys: Vec<ColumnKey> =
        projection.visible_columns().iter().map(|column| column.key).collect();
    assert!(!keys.contains(&ColumnKey::OriginalTerm));
    assert_eq!(keys.first(), Some(&ColumnKey::Select));

    let cells = projection.render(line);
    assert_eq!(cells.len(), keys.len());
    let total_position =
        keys.iter().position(|key| *key == ColumnKey::TotalPrice).expect("total is visible");
    assert_eq!(cells[total_position], "135.00");
}
