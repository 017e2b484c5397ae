//! ---
//! iot_section: "04-cascade"
//! iot_subsection: "tests"
//! iot_type: "test"
//! iot_scope: "code"
//! iot_description: "Cascade ordering, failure memory and status behaviour."
//! iot_version: "v0.0.0-prealpha"
//! iot_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use iot_link_cascade::prelude::*;
use iot_link_cascade::{
    AttemptVerdict, CascadeError, CascadeMetrics, NotificationKind, SkipReason,
};
use iot_link_common::config::{CascadeConfig, CooldownConfig};
use iot_link_metrics::{new_registry, render_text};
use iot_link_testharness::{CountingRecordStore, RecordingNotifier, ScriptedTransport, Step};
use parking_lot::Mutex;
use serde_json::json;

struct Fixture {
    dispatcher: Dispatcher,
    peer: Arc<ScriptedTransport>,
    poll: Arc<ScriptedTransport>,
    relay: Arc<ScriptedTransport>,
    store: Arc<CountingRecordStore>,
    notifier: Arc<RecordingNotifier>,
}

fn fixture_with(config: CascadeConfig) -> Fixture {
    let peer = ScriptedTransport::new(TransportKind::PeerLink);
    let poll = ScriptedTransport::new(TransportKind::LongPoll);
    let relay = ScriptedTransport::new(TransportKind::SocketStream);
    let store = CountingRecordStore::with_box(1, "127.0.0.1", "box-123");
    store.insert(2, "127.0.0.2", "box-456");
    let notifier = RecordingNotifier::new();
    let dispatcher = Dispatcher::builder(store.clone())
        .transport(peer.clone())
        .transport(poll.clone())
        .transport(relay.clone())
        .cascade_config(config)
        .notifier(notifier.clone())
        .build();
    Fixture {
        dispatcher,
        peer,
        poll,
        relay,
        store,
        notifier,
    }
}

fn fixture() -> Fixture {
    fixture_with(CascadeConfig::default())
}

/// Outcome captured from the callbacks: `Ok` for success, `Err` for failure.
async fn run_action(dispatcher: &Dispatcher, box_ref: impl Into<BoxRef>) -> Result<Outcome, Outcome> {
    let calls = Mutex::new(Vec::new());
    dispatcher
        .action(
            box_ref,
            "printer-1",
            json!({"print": "receipt"}),
            |outcome| calls.lock().push(Ok(outcome)),
            |outcome| calls.lock().push(Err(outcome)),
        )
        .await;
    let mut calls = calls.into_inner();
    assert_eq!(calls.len(), 1, "exactly one callback per action");
    calls.remove(0)
}

#[tokio::test]
async fn peer_link_success_is_local() {
    let fx = fixture();
    let outcome = run_action(&fx.dispatcher, 1).await.unwrap();
    assert!(outcome.is_success());
    assert_eq!(fx.dispatcher.connection_status(), ConnectionStatus::Local);
    assert_eq!(fx.peer.send_count(), 1);
    assert_eq!(fx.poll.send_count(), 0);
    assert_eq!(fx.relay.send_count(), 0);
}

#[tokio::test]
async fn long_poll_success_after_peer_error_is_still_local() {
    let fx = fixture();
    fx.peer.set_default(Step::FailSend);
    let outcome = run_action(&fx.dispatcher, 1).await.unwrap();
    assert_eq!(outcome.result, Some(json!({"via": "long_poll"})));
    assert_eq!(fx.dispatcher.connection_status(), ConnectionStatus::Local);
    assert!(fx
        .dispatcher
        .last_failure(1, TransportKind::PeerLink)
        .is_some());
}

#[tokio::test]
async fn socket_stream_success_after_local_errors_is_online() {
    let fx = fixture();
    fx.peer.set_default(Step::FailSend);
    fx.poll.set_default(Step::FailAwait);
    let outcome = run_action(&fx.dispatcher, 1).await.unwrap();
    assert_eq!(outcome.result, Some(json!({"via": "socket_stream"})));
    assert_eq!(fx.dispatcher.connection_status(), ConnectionStatus::Online);

    let warnings = fx.notifier.of_kind(NotificationKind::Warning);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message.contains("box-123"));
}

#[tokio::test]
async fn every_transport_failing_goes_offline() {
    let fx = fixture();
    fx.peer.set_default(Step::FailSend);
    fx.poll.set_default(Step::Disconnect);
    fx.relay.set_default(Step::FailAwait);

    let outcome = run_action(&fx.dispatcher, 1).await.unwrap_err();
    assert!(!outcome.is_success());
    assert_eq!(outcome.device_identifier, "printer-1");
    assert_eq!(fx.dispatcher.connection_status(), ConnectionStatus::Offline);
    assert_eq!(fx.notifier.of_kind(NotificationKind::Danger).len(), 1);
    for kind in TransportKind::ALL {
        assert!(fx.dispatcher.last_failure(1, kind).is_some(), "{kind} stamped");
    }
}

#[tokio::test]
async fn exhausted_report_names_the_terminal_error() {
    let fx = fixture();
    fx.peer.set_default(Step::Disconnect);
    fx.poll.set_default(Step::Disconnect);
    fx.relay.set_default(Step::Disconnect);
    let report = fx
        .dispatcher
        .execute(ActionRequest::new(1, "printer-1", json!({})))
        .await;
    assert!(matches!(
        report.error(),
        Some(CascadeError::AllTransportsExhausted { attempted: 3 })
    ));
    assert_eq!(report.status, Some(ConnectionStatus::Offline));
}

#[tokio::test]
async fn fresh_long_poll_failure_skips_straight_to_socket_stream() {
    let fx = fixture_with(CascadeConfig {
        cooldown: CooldownConfig {
            peer_link: Duration::ZERO,
            ..CooldownConfig::default()
        },
        ..CascadeConfig::default()
    });
    fx.peer.set_default(Step::FailSend);
    fx.poll.push(Step::FailSend);
    run_action(&fx.dispatcher, 1).await.unwrap();
    assert_eq!(fx.poll.send_count(), 1);

    let report = fx
        .dispatcher
        .execute(ActionRequest::new(1, "printer-1", json!({})))
        .await;
    assert!(report.attempted(TransportKind::PeerLink));
    assert_eq!(
        report.verdict(TransportKind::LongPoll),
        Some(&AttemptVerdict::Skipped {
            reason: SkipReason::Cooldown
        })
    );
    assert_eq!(report.winner(), Some(TransportKind::SocketStream));
    assert_eq!(fx.poll.send_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn cooldown_skip_does_not_restart_the_window() {
    let fx = fixture_with(CascadeConfig {
        cooldown: CooldownConfig {
            peer_link: Duration::ZERO,
            long_poll: Duration::from_secs(60),
            socket_stream: Duration::ZERO,
        },
        ..CascadeConfig::default()
    });
    fx.peer.set_default(Step::FailSend);
    fx.poll.push(Step::FailSend);
    run_action(&fx.dispatcher, 1).await.unwrap();
    let stamped = fx
        .dispatcher
        .last_failure(1, TransportKind::LongPoll)
        .unwrap();

    tokio::time::advance(Duration::from_secs(40)).await;
    run_action(&fx.dispatcher, 1).await.unwrap();
    assert_eq!(
        fx.dispatcher.last_failure(1, TransportKind::LongPoll),
        Some(stamped)
    );
    assert_eq!(fx.poll.send_count(), 1);

    tokio::time::advance(Duration::from_secs(20)).await;
    let outcome = run_action(&fx.dispatcher, 1).await.unwrap();
    assert_eq!(outcome.result, Some(json!({"via": "long_poll"})));
    assert_eq!(fx.poll.send_count(), 2);
}

#[tokio::test]
async fn failure_memory_is_per_box() {
    let fx = fixture();
    fx.poll.push(Step::FailSend);
    fx.peer.set_default(Step::FailSend);
    run_action(&fx.dispatcher, 1).await.unwrap();
    assert!(fx.dispatcher.is_recently_failed(1, TransportKind::LongPoll));

    let outcome = run_action(&fx.dispatcher, 2).await.unwrap();
    assert_eq!(outcome.result, Some(json!({"via": "long_poll"})));
    assert!(!fx.dispatcher.is_recently_failed(2, TransportKind::LongPoll));
}

#[tokio::test]
async fn toggle_after_relay_fallback_returns_to_local_tier() {
    let fx = fixture();
    fx.peer.set_default(Step::FailSend);
    fx.poll.push(Step::FailSend);
    run_action(&fx.dispatcher, 1).await.unwrap();
    assert_eq!(fx.dispatcher.connection_status(), ConnectionStatus::Online);
    assert!(fx.dispatcher.last_failure(1, TransportKind::LongPoll).is_some());

    assert_eq!(fx.dispatcher.toggle_mode("127.0.0.1"), ModePreference::Local);
    assert!(fx.dispatcher.last_failure(1, TransportKind::LongPoll).is_none());
    assert!(fx.dispatcher.last_failure(1, TransportKind::PeerLink).is_none());
    assert_eq!(fx.dispatcher.connection_status(), ConnectionStatus::Local);

    let relay_sends = fx.relay.send_count();
    let outcome = run_action(&fx.dispatcher, 1).await.unwrap();
    assert_eq!(outcome.result, Some(json!({"via": "long_poll"})));
    assert_eq!(fx.dispatcher.connection_status(), ConnectionStatus::Local);
    assert_eq!(fx.relay.send_count(), relay_sends);

    assert_eq!(fx.dispatcher.toggle_mode("127.0.0.1"), ModePreference::Remote);
    let outcome = run_action(&fx.dispatcher, 1).await.unwrap();
    assert_eq!(outcome.result, Some(json!({"via": "socket_stream"})));
    assert_eq!(fx.dispatcher.connection_status(), ConnectionStatus::Online);
    assert_eq!(fx.notifier.of_kind(NotificationKind::Info).len(), 2);
}

#[tokio::test]
async fn toggle_while_local_moves_to_the_relay() {
    let fx = fixture();
    run_action(&fx.dispatcher, 1).await.unwrap();
    assert_eq!(fx.dispatcher.connection_status(), ConnectionStatus::Local);

    assert_eq!(fx.dispatcher.toggle_mode("127.0.0.1"), ModePreference::Remote);
    assert_eq!(fx.dispatcher.connection_status(), ConnectionStatus::Online);
    let report = fx
        .dispatcher
        .execute(ActionRequest::new(1, "printer-1", json!({})))
        .await;
    assert_eq!(report.winner(), Some(TransportKind::SocketStream));
    assert_eq!(fx.peer.send_count(), 1);
}

#[tokio::test]
async fn remote_preference_starts_with_socket_stream() {
    let fx = fixture_with(CascadeConfig {
        prefer: ModePreference::Remote,
        ..CascadeConfig::default()
    });
    let report = fx
        .dispatcher
        .execute(ActionRequest::new(1, "printer-1", json!({})))
        .await;
    assert_eq!(report.winner(), Some(TransportKind::SocketStream));
    assert_eq!(fx.peer.send_count(), 0);
    assert_eq!(fx.dispatcher.connection_status(), ConnectionStatus::Online);

    fx.relay.set_default(Step::FailSend);
    let report = fx
        .dispatcher
        .execute(ActionRequest::new(1, "printer-1", json!({})))
        .await;
    assert_eq!(report.winner(), Some(TransportKind::PeerLink));
}

#[tokio::test]
async fn disabled_local_tier_only_uses_the_relay() {
    let fx = fixture_with(CascadeConfig {
        local_tier_enabled: false,
        ..CascadeConfig::default()
    });
    let report = fx
        .dispatcher
        .execute(ActionRequest::new(1, "printer-1", json!({})))
        .await;
    assert_eq!(report.winner(), Some(TransportKind::SocketStream));
    assert_eq!(fx.peer.send_count() + fx.poll.send_count(), 0);
    assert!(fx.dispatcher.last_failure(1, TransportKind::PeerLink).is_none());
}

#[tokio::test]
async fn wrapped_box_id_is_unwrapped_before_transport_calls() {
    let fx = fixture();
    let outcome = run_action(&fx.dispatcher, [1]).await.unwrap();
    assert!(outcome.is_success());
    assert_eq!(fx.peer.targets()[0].box_id, 1);
    assert_eq!(fx.peer.targets()[0].identifier, "box-123");
}

#[tokio::test]
async fn invalid_box_reference_fails_without_status_change() {
    let fx = fixture();
    run_action(&fx.dispatcher, 1).await.unwrap();

    let outcome = run_action(&fx.dispatcher, vec![1, 2]).await.unwrap_err();
    assert!(!outcome.is_success());
    let outcome = run_action(&fx.dispatcher, Vec::<u64>::new()).await.unwrap_err();
    assert!(!outcome.is_success());
    assert_eq!(fx.dispatcher.connection_status(), ConnectionStatus::Local);
    assert_eq!(fx.peer.send_count(), 1);
}

#[tokio::test]
async fn reported_disconnect_falls_back_to_long_poll() {
    let fx = fixture();
    fx.peer.set_default(Step::Disconnect);
    let outcome = run_action(&fx.dispatcher, [1]).await.unwrap();
    assert_eq!(outcome.result, Some(json!({"via": "long_poll"})));
    assert_eq!(fx.dispatcher.connection_status(), ConnectionStatus::Local);
    assert_eq!(fx.peer.await_count(), 1);
    assert!(fx.dispatcher.last_failure(1, TransportKind::PeerLink).is_some());
}

#[tokio::test]
async fn one_action_id_across_fallbacks_and_fresh_ids_across_calls() {
    let fx = fixture();
    fx.peer.set_default(Step::FailSend);
    fx.poll.set_default(Step::Disconnect);
    run_action(&fx.dispatcher, 1).await.unwrap();
    let first = fx.relay.action_ids()[0];
    assert_eq!(fx.peer.action_ids()[0], first);
    assert_eq!(fx.poll.action_ids()[0], first);

    assert_eq!(fx.dispatcher.toggle_mode("127.0.0.1"), ModePreference::Local);
    run_action(&fx.dispatcher, 1).await.unwrap();
    assert_ne!(fx.peer.action_ids()[1], first);
}

#[tokio::test]
async fn concurrent_actions_share_one_lookup() {
    let fx = fixture();
    fx.store.set_delay(Duration::from_millis(20));
    let (a, b, c) = tokio::join!(
        run_action(&fx.dispatcher, 1),
        run_action(&fx.dispatcher, [1]),
        run_action(&fx.dispatcher, 1),
    );
    assert!(a.is_ok() && b.is_ok() && c.is_ok());
    assert_eq!(fx.store.lookups(1), 1);
    assert_eq!(fx.peer.send_count(), 3);
    assert!(fx.dispatcher.cached_target(1).is_some());
}

#[tokio::test]
async fn slow_failure_does_not_clobber_concurrent_success() {
    let peer = ScriptedTransport::with_default(TransportKind::PeerLink, Step::Disconnect);
    peer.set_delay(Duration::from_millis(50));
    let relay = ScriptedTransport::with_default(TransportKind::SocketStream, Step::FailSend);
    relay.push(Step::FailSend);
    relay.push(Step::Deliver);
    let store = CountingRecordStore::with_box(1, "127.0.0.1", "box-123");
    store.insert(2, "127.0.0.2", "box-456");
    let dispatcher = Dispatcher::builder(store)
        .transport(peer.clone())
        .transport(relay.clone())
        .cascade_config(CascadeConfig {
            prefer: ModePreference::Remote,
            ..CascadeConfig::default()
        })
        .notifier(RecordingNotifier::new())
        .build();

    // Box 1 starts first and exhausts slowly; box 2 wins on the relay meanwhile.
    let slow = dispatcher.execute(ActionRequest::new(1, "scale", json!({})));
    let fast = async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        dispatcher
            .execute(ActionRequest::new(2, "scale", json!({})))
            .await
    };
    let (slow, fast) = tokio::join!(slow, fast);
    assert!(!slow.is_success());
    assert_eq!(fast.winner(), Some(TransportKind::SocketStream));
    assert_eq!(slow.status, None);
    assert_eq!(dispatcher.connection_status(), ConnectionStatus::Online);
}

#[tokio::test]
async fn status_subscribers_see_transitions() {
    let fx = fixture();
    let mut rx = fx.dispatcher.subscribe_status();
    assert_eq!(rx.borrow().status, ConnectionStatus::Offline);

    run_action(&fx.dispatcher, 1).await.unwrap();
    rx.changed().await.unwrap();
    assert_eq!(rx.borrow_and_update().status, ConnectionStatus::Local);
}

#[tokio::test]
async fn metrics_follow_cascade_runs() {
    let registry = new_registry();
    let metrics = CascadeMetrics::new(registry.clone()).unwrap();
    let peer = ScriptedTransport::with_default(TransportKind::PeerLink, Step::FailSend);
    let poll = ScriptedTransport::new(TransportKind::LongPoll);
    let dispatcher = Dispatcher::builder(CountingRecordStore::with_box(1, "127.0.0.1", "box-1"))
        .transport(peer)
        .transport(poll)
        .metrics(Some(metrics))
        .notifier(RecordingNotifier::new())
        .build();

    dispatcher
        .execute(ActionRequest::new(1, "printer", json!({})))
        .await;
    dispatcher.toggle_mode("127.0.0.1");

    let body = render_text(&registry).unwrap();
    assert!(body.contains(
        "iot_link_cascade_attempts_total{transport=\"peer_link\",verdict=\"send_failed\"} 1"
    ));
    assert!(body.contains(
        "iot_link_cascade_attempts_total{transport=\"long_poll\",verdict=\"delivered\"} 1"
    ));
    assert!(body.contains("iot_link_cascade_resolutions_total{status=\"local\"} 1"));
    assert!(body.contains("iot_link_mode_toggles_total{preference=\"remote\"} 1"));
}
