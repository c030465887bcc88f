//! Reconnection behavior after unexpected connection loss
//!
//! The helper configuration uses a 10ms delay and three attempts so these
//! tests run on the real clock.

mod test_helpers;

use amps_console::config::ServerConfig;
use amps_console::protocol::{CommandKind, QueryOptions};
use amps_console::session::{ControllerEvent, Notification};
use amps_console::transport::websocket::health_monitor::ReconnectionDecision;
use amps_console::transport::ReconnectOutcome;
use std::time::Duration;
use test_helpers::{connected_controller, next_event};

#[tokio::test]
async fn test_unexpected_close_schedules_reconnect_and_ends_live_session() {
    let (mut controller, broker) = connected_controller().await;
    let mut notifications = controller.take_notifications().unwrap();
    controller
        .execute_command(CommandKind::Subscribe, "market_data", QueryOptions::new(), None)
        .await
        .unwrap();
    let old_sink = broker.sink().unwrap();

    broker.drop_connection("reset by peer");
    assert_eq!(
        next_event(&mut controller).await,
        ControllerEvent::ConnectionLost(ReconnectionDecision::Proceed {
            attempt: 1,
            delay_ms: 10
        })
    );

    let execution = controller.execution_state();
    assert!(!execution.is_executing);
    assert_eq!(execution.error.as_deref(), Some("Connection lost: reset by peer"));
    assert!(controller.current_session().is_none());
    assert!(controller.is_reconnect_scheduled());
    let connection = controller.connection_state();
    assert!(!connection.is_connected);
    assert!(connection.is_connecting);

    assert_eq!(
        next_event(&mut controller).await,
        ControllerEvent::Reconnect(ReconnectOutcome::Reconnected { attempt: 1 })
    );
    assert!(controller.connection_state().is_connected);
    assert!(!controller.is_reconnect_scheduled());
    assert_eq!(broker.connect_urls().len(), 2);

    // the subscription is not replayed
    assert_eq!(broker.executed_commands().len(), 1);
    assert!(!controller.is_locked());

    assert_eq!(
        notifications.try_recv().unwrap(),
        Notification::ConnectionLost {
            reason: "reset by peer".to_string()
        }
    );
    assert_eq!(
        notifications.try_recv().unwrap(),
        Notification::Reconnected {
            server: "Local AMPS".to_string()
        }
    );

    // a late closure of the replaced connection changes nothing
    old_sink.closed("late close");
    assert_eq!(next_event(&mut controller).await, ControllerEvent::Stale);
    assert!(controller.connection_state().is_connected);
}

#[tokio::test]
async fn test_reconnection_gives_up_after_max_attempts() {
    let (mut controller, broker) = connected_controller().await;
    let mut notifications = controller.take_notifications().unwrap();
    broker.fail_all_connects(true);

    broker.drop_connection("broker restarted");
    assert!(matches!(
        next_event(&mut controller).await,
        ControllerEvent::ConnectionLost(ReconnectionDecision::Proceed { attempt: 1, .. })
    ));
    assert_eq!(
        next_event(&mut controller).await,
        ControllerEvent::Reconnect(ReconnectOutcome::RetryScheduled { attempt: 2 })
    );
    assert_eq!(
        next_event(&mut controller).await,
        ControllerEvent::Reconnect(ReconnectOutcome::RetryScheduled { attempt: 3 })
    );
    assert_eq!(
        next_event(&mut controller).await,
        ControllerEvent::Reconnect(ReconnectOutcome::Abandoned { attempts: 3 })
    );

    assert_eq!(broker.connect_urls().len(), 4);
    assert!(!controller.is_reconnect_scheduled());
    let connection = controller.connection_state();
    assert!(!connection.is_connected);
    assert!(!connection.is_connecting);
    assert!(connection
        .error
        .unwrap()
        .starts_with("Max reconnection attempts (3) exceeded"));

    let last = std::iter::from_fn(|| notifications.try_recv().ok()).last();
    assert_eq!(last, Some(Notification::ReconnectAbandoned { attempts: 3 }));

    // nothing further is scheduled
    let quiet = tokio::time::timeout(Duration::from_millis(100), controller.next_event()).await;
    assert!(quiet.is_err());
    assert_eq!(broker.connect_urls().len(), 4);
}

#[tokio::test]
async fn test_user_disconnect_never_reconnects() {
    let (mut controller, broker) = connected_controller().await;
    let sink = broker.sink().unwrap();

    controller.disconnect().await;
    sink.closed("socket closed");

    assert_eq!(next_event(&mut controller).await, ControllerEvent::Stale);
    assert!(!controller.is_reconnect_scheduled());
    assert!(!controller.connection_state().is_connecting);
    assert_eq!(broker.connect_urls().len(), 1);
}

#[tokio::test]
async fn test_silent_drop_detected_by_sync_tick() {
    let (mut controller, broker) = connected_controller().await;
    controller
        .execute_command(CommandKind::Subscribe, "market_data", QueryOptions::new(), None)
        .await
        .unwrap();

    broker.simulate_silent_drop();
    assert!(controller.sync_tick());

    assert_eq!(
        controller.execution_state().error.as_deref(),
        Some("Connection lost: Connection dropped")
    );
    assert!(controller.is_reconnect_scheduled());
    assert!(matches!(
        next_event(&mut controller).await,
        ControllerEvent::Reconnect(ReconnectOutcome::Reconnected { .. })
    ));
}

#[tokio::test]
async fn test_connecting_elsewhere_cancels_pending_reconnect() {
    let (mut controller, broker) = connected_controller().await;
    broker.drop_connection("reset");
    next_event(&mut controller).await;
    assert!(controller.is_reconnect_scheduled());

    let other = ServerConfig::new("Other AMPS", "127.0.0.2");
    controller.connect(&other).await.unwrap();

    assert!(!controller.is_reconnect_scheduled());
    let connection = controller.connection_state();
    assert!(connection.is_connected);
    assert_eq!(connection.server.as_deref(), Some("Other AMPS"));
    assert!(broker.connect_urls().last().unwrap().contains("127.0.0.2"));
}
