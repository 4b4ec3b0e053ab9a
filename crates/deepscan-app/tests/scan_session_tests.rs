//! Scan session state machine tests: validation, resolution, timers, and
//! post-scan actions.

mod common;

use std::time::Duration;

use common::{
    MIB, MockGateway, gan_detector, harness, harness_with_store, pdf, png, wait_for_status,
};
use deepscan_app::{ScanError, ScanEvent, UploadEvent};
use deepscan_core::{HistoryEntry, ProviderResult, ScanStatus, SessionMode, ValidationError};
use deepscan_store::{HISTORY_KEY, HistoryStore, KeyValueStore, MemoryStore};
use deepscan_ui::{
    FINALIZING_TEXT, GaugeView, SCAN_COMPLETE_TEXT, SCAN_FAILED_TEXT, SCAN_PHASES,
};
use deepscan_upload::GatewayError;

const SEEDED_HISTORY: &str = r#"[{"image":"older.png","results":[{"provider":"X","score":"10"}],"time":"2024-01-01T00:00:00Z"}]"#;

#[tokio::test(start_paused = true)]
async fn scan_session_png_completes_with_mean_score_and_gauge() {
    let h = harness(SessionMode::Guest, MockGateway::succeeding(gan_detector()));

    let scan = h
        .controller
        .submit(png(2 * MIB))
        .await
        .expect("scan completes");
    assert_eq!(scan.mean_score, 85);
    assert_eq!(scan.results, gan_detector());
    assert_eq!(h.controller.status(), ScanStatus::Completed);

    tokio::time::sleep(Duration::from_secs(2)).await;
    let ui = h.controller.snapshot();
    assert_eq!(ui.gauge.displayed, 85);
    assert_eq!(ui.gauge.target, 85);
    assert_eq!(ui.status.text, SCAN_COMPLETE_TEXT);
    assert_eq!(ui.results.len(), 1);
    assert!(ui.scan_actions_visible);
    assert!(ui.upload_enabled);
    assert!(!ui.scanning);

    let session = h.controller.session().expect("session stays open");
    assert_eq!(session.mean_score, Some(85));
    assert_eq!(session.status, ScanStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn scan_session_pdf_is_rejected_without_gateway_call() {
    let h = harness(SessionMode::Guest, MockGateway::succeeding(gan_detector()));

    let error = h.controller.submit(pdf()).await.expect_err("pdf is rejected");
    assert!(matches!(
        error,
        ScanError::Rejected(ValidationError::UnsupportedType { .. })
    ));
    assert_eq!(h.controller.status(), ScanStatus::Idle);
    assert!(h.controller.session().is_none());
    assert_eq!(h.gateway.calls(), 0);
    assert_eq!(h.controller.snapshot().status.text, "Unsupported file type");
}

#[tokio::test(start_paused = true)]
async fn scan_session_size_ceiling_is_inclusive() {
    let h = harness(SessionMode::Guest, MockGateway::succeeding(gan_detector()));

    let error = h
        .controller
        .submit(png(8 * MIB + 1))
        .await
        .expect_err("oversized file is rejected");
    assert!(matches!(error, ScanError::Rejected(ValidationError::TooLarge { .. })));
    assert_eq!(h.controller.snapshot().status.text, "File too large (max 8MB)");
    assert_eq!(h.gateway.calls(), 0);

    h.controller
        .submit(png(8 * MIB))
        .await
        .expect("exactly 8 MiB is accepted");
    assert_eq!(h.gateway.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn scan_session_rejection_keeps_finished_scan() {
    let h = harness(SessionMode::Guest, MockGateway::succeeding(gan_detector()));
    h.controller.submit(png(MIB)).await.expect("scan completes");

    h.controller.submit(pdf()).await.expect_err("pdf is rejected");
    assert_eq!(h.controller.status(), ScanStatus::Completed);
    assert_eq!(h.controller.snapshot().results, gan_detector());
}

#[tokio::test(start_paused = true)]
async fn scan_session_gateway_failure_allows_retry() {
    let gateway = MockGateway::succeeding(gan_detector()).first(Err(500));
    let h = harness(SessionMode::Guest, gateway);

    let error = h.controller.submit(png(MIB)).await.expect_err("first call fails");
    assert!(matches!(error, ScanError::Gateway(GatewayError::Status(500))));
    assert_eq!(h.controller.status(), ScanStatus::Failed);

    let ui = h.controller.snapshot();
    assert_eq!(ui.status.text, SCAN_FAILED_TEXT);
    assert!(ui.preview.is_some(), "preview stays for retry");
    assert!(ui.upload_enabled);
    assert!(!ui.scan_actions_visible);

    let scan = h.controller.submit(png(MIB)).await.expect("retry completes");
    assert_eq!(scan.mean_score, 85);
    assert_eq!(scan.session_id, 2);
    assert_eq!(h.gateway.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn scan_session_timeline_runs_while_awaiting_and_stops_on_result() {
    let (gateway, release) = MockGateway::succeeding(gan_detector()).gated();
    let h = harness(SessionMode::Guest, gateway);

    let controller = h.controller.clone();
    let task = tokio::spawn(async move { controller.submit(png(MIB)).await });
    wait_for_status(&h.controller, ScanStatus::AwaitingResult).await;

    let ui = h.controller.snapshot();
    assert_eq!(ui.status.text, SCAN_PHASES[0]);
    assert_eq!(ui.timeline.active, Some(0));
    assert!(ui.scanning);
    assert!(!ui.upload_enabled);
    assert_eq!(ui.gauge.displayed, 0);
    assert_eq!(h.controller.session().and_then(|s| s.phase_index), Some(0));

    tokio::time::sleep(Duration::from_millis(950)).await;
    assert_eq!(h.controller.snapshot().timeline.active, Some(1));

    release.notify_one();
    task.await.expect("task joins").expect("scan completes");

    tokio::time::sleep(Duration::from_secs(5)).await;
    let ui = h.controller.snapshot();
    assert_eq!(ui.status.text, SCAN_COMPLETE_TEXT, "timeline must not overwrite the outcome");
    assert_eq!(ui.timeline.active, Some(1));
}

#[tokio::test(start_paused = true)]
async fn scan_session_deadline_finalizes_without_failing() {
    let (gateway, release) = MockGateway::succeeding(gan_detector()).gated();
    let h = harness(SessionMode::Guest, gateway);

    let controller = h.controller.clone();
    let task = tokio::spawn(async move { controller.submit(png(MIB)).await });
    wait_for_status(&h.controller, ScanStatus::AwaitingResult).await;

    tokio::time::sleep(Duration::from_secs(6)).await;
    let ui = h.controller.snapshot();
    assert_eq!(ui.status.text, FINALIZING_TEXT);
    assert_eq!(ui.timeline.active, Some(SCAN_PHASES.len() - 1));
    assert_eq!(h.controller.status(), ScanStatus::AwaitingResult);

    release.notify_one();
    task.await.expect("task joins").expect("scan completes");
    assert_eq!(h.controller.status(), ScanStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn scan_session_second_submit_while_in_flight_is_ignored() {
    let (gateway, release) = MockGateway::succeeding(gan_detector()).gated();
    let h = harness(SessionMode::Guest, gateway);

    let controller = h.controller.clone();
    let task = tokio::spawn(async move { controller.submit(png(MIB)).await });
    wait_for_status(&h.controller, ScanStatus::AwaitingResult).await;

    let error = h
        .controller
        .submit(png(2 * MIB))
        .await
        .expect_err("second submit is ignored");
    assert!(matches!(error, ScanError::Busy));
    assert_eq!(h.gateway.calls(), 1);
    assert_eq!(h.controller.session().map(|s| s.size), Some(MIB as u64));

    release.notify_one();
    let scan = task.await.expect("task joins").expect("first scan completes");
    assert_eq!(scan.session_id, 1);
}

#[tokio::test(start_paused = true)]
async fn scan_session_dropped_submit_leaves_controller_retryable() {
    let (gateway, release) = MockGateway::succeeding(gan_detector()).gated();
    let h = harness(SessionMode::Guest, gateway);

    let timed_out = tokio::time::timeout(Duration::from_secs(1), h.controller.submit(png(MIB))).await;
    assert!(timed_out.is_err(), "gated call never resolves on its own");
    assert_eq!(h.controller.status(), ScanStatus::Failed);
    assert_eq!(h.controller.snapshot().status.text, SCAN_FAILED_TEXT);

    release.notify_one();
    let scan = h.controller.submit(png(MIB)).await.expect("retry completes");
    assert_eq!(scan.mean_score, 85);
}

#[tokio::test(start_paused = true)]
async fn scan_session_back_returns_to_idle_immediately() {
    let h = harness(SessionMode::Guest, MockGateway::succeeding(gan_detector()));
    h.controller.submit(png(MIB)).await.expect("scan completes");

    h.controller.back().expect("back is available");
    assert_eq!(h.controller.status(), ScanStatus::Idle);
    assert!(h.controller.session().is_none());

    let ui = h.controller.snapshot();
    assert_eq!(ui.status.text, "Guest Mode Active");
    assert!(ui.results.is_empty());
    assert!(ui.preview.is_none());
    assert!(!ui.timeline.visible);
    assert_eq!(ui.gauge.displayed, 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.controller.snapshot().gauge.displayed, 0, "stale gauge ticks are dropped");
}

#[tokio::test(start_paused = true)]
async fn scan_session_confirm_resets_after_delay() {
    let h = harness(SessionMode::Guest, MockGateway::succeeding(gan_detector()));
    h.controller.submit(png(MIB)).await.expect("scan completes");

    h.controller.confirm().expect("confirm is available");
    tokio::time::sleep(Duration::from_millis(599)).await;
    assert_eq!(h.controller.status(), ScanStatus::Completed);

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(h.controller.status(), ScanStatus::Idle);
    assert_eq!(h.controller.snapshot().status.text, "Guest Mode Active");
}

#[tokio::test(start_paused = true)]
async fn scan_session_back_cancels_pending_confirm() {
    let h = harness(SessionMode::Guest, MockGateway::succeeding(gan_detector()));
    h.controller.submit(png(MIB)).await.expect("scan completes");

    h.controller.confirm().expect("confirm is available");
    h.controller.back().expect("back is available");
    h.controller.submit(png(MIB)).await.expect("next scan completes");

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.controller.status(), ScanStatus::Completed);
    assert_eq!(h.controller.session().map(|s| s.id), Some(2));
}

#[tokio::test(start_paused = true)]
async fn scan_session_new_file_discards_finished_scan() {
    let gateway = MockGateway::succeeding(vec![ProviderResult::new("A", "40")])
        .first(Ok(vec![ProviderResult::new("A", "80"), ProviderResult::new("B", "60")]));
    let h = harness(SessionMode::Guest, gateway);

    let first = h.controller.submit(png(MIB)).await.expect("first scan");
    assert_eq!(first.mean_score, 70);

    let second = h.controller.submit(png(MIB)).await.expect("second scan");
    assert_eq!(second.mean_score, 40);
    assert_eq!(second.session_id, 2);

    tokio::time::sleep(Duration::from_secs(2)).await;
    let ui = h.controller.snapshot();
    assert_eq!(ui.results.len(), 1);
    assert_eq!(ui.gauge.displayed, 40);
}

#[tokio::test(start_paused = true)]
async fn scan_session_gauge_is_zeroed_before_next_analysis_call() {
    let h = harness(SessionMode::Guest, MockGateway::succeeding(gan_detector()));

    h.controller.submit(png(MIB)).await.expect("first scan");
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.controller.snapshot().gauge.displayed, 85, "gauge settled");

    h.controller.submit(png(MIB)).await.expect("second scan");

    let seen = h.gateway.gauges_at_call();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1], GaugeView { displayed: 0, target: 0 });
}

#[tokio::test(start_paused = true)]
async fn scan_session_guest_save_changes_nothing() {
    let h = harness(SessionMode::Guest, MockGateway::succeeding(gan_detector()));
    h.controller.submit(png(MIB)).await.expect("scan completes");
    let before = h.controller.session();

    let error = h.controller.save().expect_err("guest cannot save");
    assert!(matches!(error, ScanError::PersistenceRefused));
    assert_eq!(h.controller.status(), ScanStatus::Completed);
    assert_eq!(h.controller.session(), before);
    assert_eq!(h.store.get(HISTORY_KEY).expect("store readable"), None);

    let ui = h.controller.snapshot();
    assert_eq!(ui.status.text, SCAN_COMPLETE_TEXT);
    assert_eq!(ui.notice.as_deref(), Some("Login required to save results"));
    assert!(ui.history_locked);
}

#[tokio::test(start_paused = true)]
async fn scan_session_secure_save_prepends_one_entry() {
    let older = HistoryEntry {
        image: "older.png".to_string(),
        results: vec![ProviderResult::new("X", "10")],
        timestamp: "2024-01-01T00:00:00Z".to_string(),
    };
    let store = MemoryStore::with_values([(HISTORY_KEY, SEEDED_HISTORY)]);
    let h = harness_with_store(
        SessionMode::Secure,
        MockGateway::succeeding(gan_detector()),
        store,
    );
    assert_eq!(h.controller.snapshot().history, vec![older.clone()]);

    h.controller.submit(png(MIB)).await.expect("scan completes");
    let entry = h.controller.save().expect("secure save");
    assert_eq!(entry.image, "scan.png");
    assert_eq!(entry.results, gan_detector());

    let entries = HistoryStore::new(h.store.clone()).entries().expect("history readable");
    assert_eq!(entries, vec![entry.clone(), older]);
    assert_eq!(h.controller.status(), ScanStatus::Completed);

    let ui = h.controller.snapshot();
    assert_eq!(ui.status.text, "Result Saved");
    assert_eq!(ui.history.first(), Some(&entry));
}

#[tokio::test(start_paused = true)]
async fn scan_session_in_flight_scan_is_resolved_only_by_its_submit() {
    let (gateway, release) = MockGateway::succeeding(gan_detector()).gated();
    let h = harness(SessionMode::Secure, gateway);

    let controller = h.controller.clone();
    let task = tokio::spawn(async move { controller.submit(png(MIB)).await });
    wait_for_status(&h.controller, ScanStatus::AwaitingResult).await;

    assert!(matches!(
        h.controller.reset(),
        Err(ScanError::InvalidAction { action: "reset", .. })
    ));
    assert!(matches!(h.controller.back(), Err(ScanError::InvalidAction { .. })));
    assert!(matches!(h.controller.confirm(), Err(ScanError::InvalidAction { .. })));
    assert!(matches!(h.controller.save(), Err(ScanError::InvalidAction { .. })));
    assert!(matches!(h.controller.submit(png(MIB)).await, Err(ScanError::Busy)));
    assert_eq!(h.controller.status(), ScanStatus::AwaitingResult);

    release.notify_one();
    let scan = task.await.expect("task joins").expect("scan completes");
    assert_eq!(scan.session_id, 1);
    assert_eq!(scan.mean_score, 85);
    assert_eq!(h.controller.status(), ScanStatus::Completed);
    assert_eq!(h.gateway.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn scan_session_actions_require_completed_status() {
    let h = harness(SessionMode::Secure, MockGateway::failing(502));

    assert!(matches!(h.controller.back(), Err(ScanError::InvalidAction { action: "back", .. })));
    assert!(matches!(h.controller.confirm(), Err(ScanError::InvalidAction { .. })));
    assert!(matches!(h.controller.save(), Err(ScanError::InvalidAction { .. })));
    h.controller.reset().expect("reset while idle is a no-op");

    h.controller.submit(png(MIB)).await.expect_err("gateway fails");
    assert!(matches!(h.controller.save(), Err(ScanError::InvalidAction { .. })));
    h.controller.reset().expect("failed scan can be reset");
    assert_eq!(h.controller.status(), ScanStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn scan_session_upload_events_use_first_file_only() {
    let h = harness(SessionMode::Guest, MockGateway::succeeding(gan_detector()));

    let error = h
        .controller
        .handle_upload(UploadEvent::Picked(None))
        .await
        .expect_err("empty picker result");
    assert!(matches!(error, ScanError::NoFile));

    let error = h
        .controller
        .handle_upload(UploadEvent::Dropped(vec![pdf(), png(MIB)]))
        .await
        .expect_err("first dropped file decides");
    assert!(matches!(error, ScanError::Rejected(_)));
    assert_eq!(h.gateway.calls(), 0);

    h.controller
        .handle_upload(UploadEvent::Dropped(vec![png(MIB), pdf()]))
        .await
        .expect("png first is scanned");
}

#[tokio::test(start_paused = true)]
async fn scan_session_events_report_transitions_in_order() {
    let h = harness(SessionMode::Guest, MockGateway::succeeding(gan_detector()));
    let mut events = h.controller.subscribe();

    h.controller.submit(png(MIB)).await.expect("scan completes");
    h.controller.back().expect("back is available");

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    let transition = |from, to| ScanEvent::StatusChanged {
        session: Some(1),
        from,
        to,
    };
    assert_eq!(
        seen,
        vec![
            transition(ScanStatus::Idle, ScanStatus::Validating),
            transition(ScanStatus::Validating, ScanStatus::AwaitingResult),
            transition(ScanStatus::AwaitingResult, ScanStatus::Completed),
            transition(ScanStatus::Completed, ScanStatus::Idle),
        ]
    );
}
