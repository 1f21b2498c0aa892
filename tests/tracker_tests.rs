mod common;

use common::Harness;
use std::sync::Arc;
use std::time::Duration;
use subscription_checkout::application::tracker::{SessionTracker, TrackingOutcome};
use subscription_checkout::config::TrackerConfig;
use subscription_checkout::domain::clock::Clock;
use subscription_checkout::domain::payment::{PaymentMethod, PaymentStatus};
use subscription_checkout::domain::ports::CouponStore;
use subscription_checkout::infrastructure::simulated_processor::{SimulatedBehavior, SimulatedProcessor};

fn settled(outcome: TrackingOutcome) -> PaymentStatus {
    match outcome {
        TrackingOutcome::Settled(session) => session.status,
        TrackingOutcome::Detached => panic!("tracker detached before settlement"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_pix_expires_when_never_paid() {
    let h = Harness::paused(SimulatedBehavior::default());
    let session = h
        .orchestrator
        .create_checkout(common::checkout(PaymentMethod::Pix))
        .await
        .unwrap();
    let expires_at = session.pix.as_ref().unwrap().expires_at;

    let handle = h.tracker.track(session.id).await.unwrap();
    let outcome = handle.finished().await.unwrap();

    assert_eq!(settled(outcome), PaymentStatus::Expired);
    assert!(h.clock.now() >= expires_at);
    assert!(h.clock.now() < expires_at + chrono::Duration::seconds(2));
}

#[tokio::test(start_paused = true)]
async fn test_pix_settles_through_polling() {
    let h = Harness::paused(SimulatedBehavior {
        settle_after_polls: Some(3),
        ..SimulatedBehavior::default()
    });
    let session = h
        .orchestrator
        .create_checkout(common::checkout(PaymentMethod::Pix))
        .await
        .unwrap();

    let handle = h.tracker.track(session.id).await.unwrap();
    let outcome = handle.finished().await.unwrap();

    assert_eq!(settled(outcome), PaymentStatus::Approved);
    assert_eq!(h.processor.polls(session.id).await, 3);
    // Polls at 0 s, 5 s and 10 s.
    let elapsed = h.clock.now() - session.created_at;
    assert_eq!(elapsed.num_seconds(), 10);
}

#[tokio::test(start_paused = true)]
async fn test_transport_errors_do_not_change_state() {
    let h = Harness::paused(SimulatedBehavior {
        settle_after_polls: Some(1),
        ..SimulatedBehavior::default()
    });
    let session = h
        .orchestrator
        .create_checkout(common::checkout(PaymentMethod::Pix))
        .await
        .unwrap();
    h.processor.fail_next_polls(4);

    let handle = h.tracker.track(session.id).await.unwrap();
    let mut progress = handle.progress();

    tokio::time::sleep(Duration::from_secs(12)).await;
    assert_eq!(progress.borrow_and_update().status, PaymentStatus::Pending);
    assert_eq!(
        h.machine.get(session.id).await.unwrap().status,
        PaymentStatus::Pending
    );

    let outcome = handle.finished().await.unwrap();
    assert_eq!(settled(outcome), PaymentStatus::Approved);
    assert_eq!(h.processor.polls(session.id).await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_processor_side_failures_keep_polling_until_expiry() {
    let h = Harness::paused(SimulatedBehavior::default());
    let session = h
        .orchestrator
        .create_checkout(common::checkout(PaymentMethod::Pix))
        .await
        .unwrap();

    // This processor never saw the charge, so every poll fails with NotFound.
    let stranger = SimulatedProcessor::default();
    let tracker = SessionTracker::new(
        h.machine.clone(),
        Arc::new(stranger),
        TrackerConfig::default(),
    );
    let handle = tracker.track(session.id).await.unwrap();

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(!handle.is_finished());
    assert_eq!(
        h.machine.get(session.id).await.unwrap().status,
        PaymentStatus::Pending
    );

    let outcome = handle.finished().await.unwrap();
    assert_eq!(settled(outcome), PaymentStatus::Expired);
}

#[tokio::test(start_paused = true)]
async fn test_countdown_reports_remaining_time() {
    let h = Harness::paused(SimulatedBehavior::default());
    let session = h
        .orchestrator
        .create_checkout(common::checkout(PaymentMethod::Pix))
        .await
        .unwrap();

    let handle = h.tracker.track(session.id).await.unwrap();
    let progress = handle.progress();
    assert_eq!(progress.borrow().remaining_seconds, Some(3600));

    tokio::time::sleep(Duration::from_millis(90_500)).await;
    let snapshot = *progress.borrow();
    assert_eq!(snapshot.status, PaymentStatus::Pending);
    assert_eq!(snapshot.remaining_seconds, Some(3600 - 90));

    handle.detach().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_both_timers() {
    let h = Harness::paused(SimulatedBehavior::default());
    let session = h
        .orchestrator
        .create_checkout(common::checkout(PaymentMethod::Pix))
        .await
        .unwrap();

    let handle = h.tracker.track(session.id).await.unwrap();
    tokio::time::sleep(Duration::from_secs(7)).await;
    let cancelled = handle.cancel().await.unwrap();
    assert_eq!(cancelled.status, PaymentStatus::Cancelled);

    let polls = h.processor.polls(session.id).await;
    let updated_at = h.machine.get(session.id).await.unwrap().updated_at;
    tokio::time::sleep(Duration::from_secs(3 * 3600)).await;

    assert_eq!(h.processor.polls(session.id).await, polls);
    let stored = h.machine.get(session.id).await.unwrap();
    assert_eq!(stored.status, PaymentStatus::Cancelled);
    assert_eq!(stored.updated_at, updated_at);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_handle_stops_tracking_without_state_change() {
    let h = Harness::paused(SimulatedBehavior::default());
    let session = h
        .orchestrator
        .create_checkout(common::checkout(PaymentMethod::Pix))
        .await
        .unwrap();

    let handle = h.tracker.track(session.id).await.unwrap();
    tokio::time::sleep(Duration::from_secs(6)).await;
    drop(handle);
    tokio::time::sleep(Duration::from_secs(1)).await;

    let polls = h.processor.polls(session.id).await;
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.processor.polls(session.id).await, polls);
    assert_eq!(
        h.machine.get(session.id).await.unwrap().status,
        PaymentStatus::Pending
    );
}

#[tokio::test(start_paused = true)]
async fn test_card_session_settles_on_callback_only() {
    let h = Harness::paused(SimulatedBehavior::default());
    let session = h
        .orchestrator
        .create_checkout(common::checkout(PaymentMethod::CreditCard))
        .await
        .unwrap();
    assert_eq!(session.status, PaymentStatus::Processing);

    let handle = h.tracker.track(session.id).await.unwrap();
    assert_eq!(handle.progress().borrow().remaining_seconds, None);

    // No client-side timeout for cards.
    tokio::time::sleep(Duration::from_secs(4 * 3600)).await;
    assert!(!handle.is_finished());
    assert_eq!(h.processor.polls(session.id).await, 0);

    h.machine
        .notify(session.id, PaymentStatus::Approved)
        .await
        .unwrap();
    let outcome = handle.finished().await.unwrap();
    assert_eq!(settled(outcome), PaymentStatus::Approved);
}

#[tokio::test(start_paused = true)]
async fn test_callback_and_poll_racing_apply_once() {
    let h = Harness::paused(SimulatedBehavior::default());
    h.coupons
        .store(common::fixed_coupon("BIG", rust_decimal_macros::dec!(40), Some(5)))
        .await
        .unwrap();
    let mut request = common::checkout(PaymentMethod::Pix);
    request.coupon_code = Some("BIG".to_string());
    let session = h.orchestrator.create_checkout(request).await.unwrap();
    assert_eq!(session.coupon_code.as_deref(), Some("BIG"));

    let handle = h.tracker.track(session.id).await.unwrap();
    h.processor.settle(session.id, PaymentStatus::Approved).await;
    h.machine
        .notify(session.id, PaymentStatus::Approved)
        .await
        .unwrap();

    let outcome = handle.finished().await.unwrap();
    assert_eq!(settled(outcome), PaymentStatus::Approved);
    let coupon = h.coupons.get("BIG").await.unwrap().unwrap();
    assert_eq!(coupon.current_uses, 1);
}
