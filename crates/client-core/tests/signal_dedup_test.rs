//! Socket and push signals racing for the same call

mod common;

use std::sync::Arc;
use std::time::Duration;

use callsync_client_core::error::{NotificationError, PlatformError};
use callsync_client_core::mock::MockNativeBackend;
use callsync_client_core::notification::{NotificationResponse, ANSWER_ACTION_ID};
use callsync_client_core::{
    CallCoreConfig, CallEvent, CallState, EndReason, IngestOutcome, ResponseOutcome, RingConfig,
    SignalSource, TransitionOutcome,
};
use common::{call_push, eventually, socket_call, HarnessBuilder};
use parking_lot::Mutex;
use serde_json::json;

#[tokio::test]
async fn test_socket_then_push_presents_once_natively() {
    let h = HarnessBuilder::new().native(MockNativeBackend::new()).start().await;

    h.core
        .handle_wire_event("incomingCall", socket_call("call_abc"))
        .await
        .unwrap();
    let push = h
        .core
        .handle_push_payload(&call_push("call_abc"), SignalSource::Push)
        .await
        .unwrap()
        .unwrap();

    assert!(matches!(push, IngestOutcome::Duplicate(_)));
    assert_eq!(h.native().displayed().len(), 1);
    assert!(h.presenter.presented_notifications().is_empty());
    assert_eq!(h.vibrator.pattern_starts(), 0);
}

#[tokio::test]
async fn test_push_then_voip_push_rings_once_on_fallback() {
    let h = HarnessBuilder::new().start().await;

    let first = h
        .core
        .handle_push_payload(&call_push("call_abc"), SignalSource::Push)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(first, IngestOutcome::FallbackPresented { .. }));

    let voip = json!({ "callerPhone": "+491234", "channel": "call_abc" });
    let second = h
        .core
        .handle_push_payload(&voip, SignalSource::VoipPush)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(second, IngestOutcome::Duplicate(_)));

    assert_eq!(h.presenter.presented_notifications().len(), 1);
    assert_eq!(h.vibrator.pattern_starts(), 1);
    assert!(h.core.notifications().is_ringing());
}

#[tokio::test]
async fn test_native_failure_falls_back_to_notification() {
    let native = MockNativeBackend::new().with_display_error(PlatformError::api("display", "denied"));
    let h = HarnessBuilder::new().native(native).start().await;

    let outcome = h
        .core
        .handle_push_payload(&call_push("call_abc"), SignalSource::VoipPush)
        .await
        .unwrap()
        .unwrap();

    let IngestOutcome::FallbackPresented { session, .. } = outcome else {
        panic!("expected fallback presentation, got {:?}", outcome);
    };
    assert_eq!(session.call_state, CallState::Incoming);
    assert_eq!(session.caller_name.as_deref(), Some("Anna"));
    assert!(h.vibrator.is_vibrating());

    let notification = &h.presenter.presented_notifications()[0];
    assert_eq!(notification.title, "Anna");
    assert!(notification.sticky);

    assert!(h.core.answer_call().await.is_transitioned());
    assert!(!h.vibrator.is_vibrating());
    assert!(h.presenter.on_screen().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_hanging_native_display_times_out_into_fallback() {
    let native = MockNativeBackend::new().with_display_delay(Duration::from_secs(60));
    let h = HarnessBuilder::new().native(native).start().await;

    let outcome = h
        .core
        .handle_push_payload(&call_push("call_abc"), SignalSource::VoipPush)
        .await
        .unwrap()
        .unwrap();

    let IngestOutcome::FallbackPresented { session, .. } = outcome else {
        panic!("expected fallback presentation, got {:?}", outcome);
    };
    assert!(h.native().displayed().is_empty());
    assert_eq!(h.native().ended(), vec![session.call_id]);
    assert!(h.vibrator.is_vibrating());
}

#[tokio::test(start_paused = true)]
async fn test_call_ended_during_native_display_is_retracted() {
    let native = MockNativeBackend::new().with_display_delay(Duration::from_secs(1));
    let h = HarnessBuilder::new().native(native).start().await;

    let payload = call_push("call_abc");
    let (outcome, _) = tokio::join!(
        h.core
            .handle_push_payload(&payload, SignalSource::VoipPush),
        async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            h.core
                .handle_wire_event("callEnded", json!({ "channel": "call_abc" }))
                .await
                .unwrap();
        }
    );

    let IngestOutcome::PresentedNatively(session) = outcome.unwrap().unwrap() else {
        panic!("expected native presentation");
    };
    assert!(!h.core.has_active_call());
    assert_eq!(h.native().displayed().len(), 1);
    // Once from the end transition, once more after the display landed
    assert_eq!(
        h.native().ended(),
        vec![session.call_id.clone(), session.call_id]
    );
    assert!(!h.vibrator.is_vibrating());
}

#[tokio::test]
async fn test_total_presentation_failure_still_admits_and_rings() {
    let h = HarnessBuilder::new().start().await;
    h.presenter
        .set_present_error(Some(NotificationError::delivery("present", "blocked")));

    let outcome = h
        .core
        .handle_push_payload(&call_push("call_abc"), SignalSource::Push)
        .await
        .unwrap()
        .unwrap();

    assert!(matches!(outcome, IngestOutcome::PresentationDegraded(_)));
    assert!(h.core.has_active_call());
    assert!(h.vibrator.is_vibrating());
}

#[tokio::test]
async fn test_busy_slot_rejects_second_caller_without_side_effects() {
    let h = HarnessBuilder::new().start().await;

    h.core
        .handle_push_payload(&call_push("call_a"), SignalSource::Push)
        .await
        .unwrap();
    let second = h
        .core
        .handle_push_payload(&call_push("call_b"), SignalSource::Push)
        .await
        .unwrap()
        .unwrap();

    assert!(matches!(second, IngestOutcome::Rejected(_)));
    assert_eq!(h.presenter.presented_notifications().len(), 1);
    assert_eq!(h.vibrator.pattern_starts(), 1);
    assert_eq!(h.core.active_call().unwrap().channel.as_str(), "call_a");
}

#[tokio::test]
async fn test_late_push_after_decline_is_ignored() {
    let h = HarnessBuilder::new().start().await;

    h.core
        .handle_push_payload(&call_push("call_abc"), SignalSource::Push)
        .await
        .unwrap();
    assert!(h.core.decline_call().await.is_transitioned());

    let late = h
        .core
        .handle_push_payload(&call_push("call_abc"), SignalSource::VoipPush)
        .await
        .unwrap()
        .unwrap();

    assert!(matches!(late, IngestOutcome::Rejected(_)));
    assert!(!h.core.has_active_call());
    assert!(!h.vibrator.is_vibrating());
}

#[tokio::test]
async fn test_remote_cancel_stops_ringing_and_clears_notification() {
    let h = HarnessBuilder::new().start().await;

    h.core
        .handle_wire_event("incomingCall", socket_call("call_abc"))
        .await
        .unwrap();
    assert!(h.vibrator.is_vibrating());

    h.core
        .handle_wire_event("incomingCall", json!({ "from": "+491234", "channel": "call_abc", "action": "end" }))
        .await
        .unwrap();

    assert!(!h.core.has_active_call());
    assert!(!h.vibrator.is_vibrating());
    assert!(eventually(|| h.presenter.on_screen().is_empty()).await);
}

#[tokio::test]
async fn test_answer_via_notification_targets_the_presented_call() {
    let h = HarnessBuilder::new().start().await;

    h.core
        .handle_push_payload(&call_push("call_old"), SignalSource::Push)
        .await
        .unwrap();
    let stale = h.presenter.on_screen()[0].data.clone();
    h.core.end_call();
    h.core
        .handle_push_payload(&call_push("call_new"), SignalSource::Push)
        .await
        .unwrap();

    let response = NotificationResponse {
        action_identifier: Some(ANSWER_ACTION_ID.to_string()),
        data: stale,
    };
    let outcome = h.core.handle_notification_response(&response).await;

    assert!(matches!(
        outcome,
        ResponseOutcome::Answered(TransitionOutcome::InvalidState { .. })
    ));
    assert_eq!(
        h.core.active_call().unwrap().call_state,
        CallState::Incoming
    );
}

#[tokio::test(start_paused = true)]
async fn test_ring_timeout_ends_unanswered_call() {
    let config = CallCoreConfig::default()
        .with_ring(RingConfig::default().with_ring_timeout(Duration::from_secs(30)));
    let h = HarnessBuilder::new().config(config).start().await;

    let reasons = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reasons);
    h.core.state_manager().subscribe(move |event| {
        if let CallEvent::Ended { reason, .. } = event {
            sink.lock().push(*reason);
        }
    });

    h.core
        .handle_push_payload(&call_push("call_abc"), SignalSource::Push)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(31)).await;
    tokio::task::yield_now().await;

    assert!(!h.core.has_active_call());
    assert!(!h.vibrator.is_vibrating());
    assert_eq!(*reasons.lock(), vec![EndReason::TimedOut]);
}

#[tokio::test(start_paused = true)]
async fn test_ring_timeout_does_not_end_answered_call() {
    let config = CallCoreConfig::default()
        .with_ring(RingConfig::default().with_ring_timeout(Duration::from_secs(30)));
    let h = HarnessBuilder::new().config(config).start().await;

    h.core
        .handle_push_payload(&call_push("call_abc"), SignalSource::Push)
        .await
        .unwrap();
    h.core.answer_call().await;

    tokio::time::sleep(Duration::from_secs(31)).await;
    tokio::task::yield_now().await;

    assert_eq!(h.core.active_call().unwrap().call_state, CallState::Active);
}
