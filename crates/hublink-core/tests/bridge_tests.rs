//! Connection bridge tests against a scripted transport
//!
//! Covers discovery and matching, the connection state machine, handle
//! resolution, notification routing and the write drain loop.


use std::time::Duration;

use hublink_core::{
    request_channel, response_channel, ConnectionBridge, ConnectionState, DriverConfig,
    HublinkError, MatchTarget, NotificationEvent, DEFAULT_CHARACTERISTIC_UUID, DEFAULT_KEEPALIVE,
};
use test_utils::{device, init_tracing, Call, FakeTransport};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const HUB_MAC: &str = "AA:BB:CC:DD:EE:FF";
const OTHER_MAC: &str = "11:22:33:44:55:66";

fn quiet_config() -> DriverConfig {
    DriverConfig::testing().with_keepalive(None)
}

fn bridge(transport: FakeTransport, config: DriverConfig) -> ConnectionBridge<FakeTransport> {
    let (responses, _rx) = response_channel();
    ConnectionBridge::new(transport, config, responses)
}

async fn connected_bridge(transport: FakeTransport) -> ConnectionBridge<FakeTransport> {
    let mut bridge = bridge(transport, quiet_config());
    bridge
        .connect(&MatchTarget::by_mac(HUB_MAC), Duration::from_millis(10), 3)
        .await
        .expect("bridge should connect");
    bridge
}

// ----------------------------------------------------------------------------
// Discovery and Connect
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_connect_succeeds_on_second_scan() {
    init_tracing();
    let transport = FakeTransport::new().with_scans(vec![
        vec![device(OTHER_MAC, None)],
        vec![device(HUB_MAC, None)],
    ]);
    let mut bridge = bridge(transport.clone(), quiet_config());

    let found = bridge
        .connect(&MatchTarget::by_mac(HUB_MAC), Duration::from_millis(10), 30)
        .await
        .unwrap();

    assert_eq!(found.address, HUB_MAC);
    assert_eq!(bridge.state(), ConnectionState::Connected);
    assert!(bridge.is_alive());
    assert_eq!(transport.count(&Call::Discover), 2);
    assert_eq!(transport.connects(), vec![HUB_MAC.to_string()]);
}

#[tokio::test]
async fn test_device_not_found_returns_to_idle() {
    let transport = FakeTransport::new().with_scans(vec![vec![device(OTHER_MAC, None)]]);
    let mut bridge = bridge(transport.clone(), quiet_config());

    let err = bridge
        .connect(&MatchTarget::by_mac(HUB_MAC), Duration::from_millis(10), 3)
        .await
        .unwrap_err();

    assert!(matches!(err, HublinkError::DeviceNotFound { attempts: 3 }));
    assert_eq!(bridge.state(), ConnectionState::Idle);
    assert!(!bridge.is_alive());
    assert_eq!(transport.count(&Call::Discover), 3);
    assert!(transport.connects().is_empty());
}

#[tokio::test]
async fn test_failed_scan_is_retried() {
    let transport = FakeTransport::with_hub(HUB_MAC);
    transport.fail_next_scans(1);
    let mut bridge = bridge(transport.clone(), quiet_config());

    let found = bridge
        .connect(&MatchTarget::by_mac(HUB_MAC), Duration::from_millis(10), 3)
        .await
        .unwrap();

    assert_eq!(found.address, HUB_MAC);
    assert_eq!(transport.count(&Call::Discover), 2);
    assert_eq!(bridge.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_stuck_scan_is_cut_off_at_scan_timeout() {
    let transport = FakeTransport::with_hub(HUB_MAC);
    transport.set_scan_delay(Duration::from_secs(60));
    let mut bridge = bridge(transport.clone(), quiet_config());

    let err = timeout(
        Duration::from_secs(1),
        bridge.connect(&MatchTarget::any(), Duration::from_millis(10), 2),
    )
    .await
    .expect("each scan should be bounded by the scan timeout")
    .unwrap_err();

    assert!(matches!(err, HublinkError::DeviceNotFound { attempts: 2 }));
    assert_eq!(transport.count(&Call::Discover), 2);
    assert_eq!(bridge.state(), ConnectionState::Idle);
    assert!(transport.connects().is_empty());
}

#[tokio::test]
async fn test_connection_failure_returns_to_idle() {
    let transport = FakeTransport::with_hub(HUB_MAC);
    transport.fail_connect();
    let mut bridge = bridge(transport.clone(), quiet_config());

    let err = bridge
        .connect(&MatchTarget::by_mac(HUB_MAC), Duration::from_millis(10), 3)
        .await
        .unwrap_err();

    match err {
        HublinkError::ConnectionFailed { address, .. } => assert_eq!(address, HUB_MAC),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(bridge.state(), ConnectionState::Idle);
    assert_eq!(transport.count(&Call::Subscribe(DEFAULT_CHARACTERISTIC_UUID)), 0);
}

#[tokio::test]
async fn test_mac_target_never_falls_back_to_name() {
    let transport = FakeTransport::new().with_scans(vec![vec![
        device(OTHER_MAC, Some("LEGO Move Hub")),
        device(HUB_MAC, Some("Unnamed")),
    ]]);
    let mut bridge = bridge(transport.clone(), quiet_config());
    let target = MatchTarget {
        mac: Some(HUB_MAC.to_lowercase()),
        name: Some("Move Hub".into()),
    };

    let found = bridge
        .connect(&target, Duration::from_millis(10), 1)
        .await
        .unwrap();

    assert_eq!(found.address, HUB_MAC);
    assert_eq!(transport.connects(), vec![HUB_MAC.to_string()]);
}

#[tokio::test]
async fn test_first_matching_device_wins() {
    let transport = FakeTransport::new().with_scans(vec![vec![
        device("00:00:00:00:00:01", Some("Smart Hub")),
        device("00:00:00:00:00:02", Some("LEGO Move Hub")),
        device("00:00:00:00:00:03", Some("Move Hub")),
    ]]);
    let mut bridge = bridge(transport.clone(), quiet_config());

    let found = bridge
        .connect(&MatchTarget::by_name("Move Hub"), Duration::from_millis(10), 1)
        .await
        .unwrap();

    assert_eq!(found.address, "00:00:00:00:00:02");
    assert_eq!(bridge.device(), Some(&found));
}

#[tokio::test]
async fn test_connect_subscribes_then_sends_keepalive() {
    let transport = FakeTransport::with_hub(HUB_MAC);
    let mut bridge = bridge(transport.clone(), DriverConfig::testing());

    bridge
        .connect(&MatchTarget::any(), Duration::from_millis(10), 1)
        .await
        .unwrap();

    assert_eq!(
        transport.calls(),
        vec![
            Call::Discover,
            Call::Connect(HUB_MAC.to_string()),
            Call::Subscribe(DEFAULT_CHARACTERISTIC_UUID),
            Call::Write(DEFAULT_CHARACTERISTIC_UUID, DEFAULT_KEEPALIVE.to_vec()),
        ]
    );
}

#[tokio::test]
async fn test_failed_keepalive_does_not_fail_connect() {
    let transport = FakeTransport::with_hub(HUB_MAC);
    transport.fail_next_writes(1);
    let mut bridge = bridge(transport.clone(), DriverConfig::testing());

    let result = bridge
        .connect(&MatchTarget::by_mac(HUB_MAC), Duration::from_millis(10), 1)
        .await;

    assert!(result.is_ok());
    assert_eq!(bridge.state(), ConnectionState::Connected);
}

// ----------------------------------------------------------------------------
// Writes
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_unregistered_handle_uses_default_characteristic() {
    let transport = FakeTransport::with_hub(HUB_MAC);
    let mut bridge = connected_bridge(transport.clone()).await;

    bridge
        .write(0x0e, &[0x05, 0x00, 0x01, 0x01, 0x05])
        .await
        .unwrap();

    assert_eq!(
        transport.writes(),
        vec![(
            DEFAULT_CHARACTERISTIC_UUID,
            vec![0x05, 0x00, 0x01, 0x01, 0x05]
        )]
    );
}

#[tokio::test]
async fn test_registered_handle_uses_its_descriptor() {
    let custom = Uuid::from_u128(0x0000_2a19_0000_1000_8000_0080_5f9b_34fb);
    let transport = FakeTransport::with_hub(HUB_MAC);
    transport.register_descriptor(0x20, custom);
    let mut bridge = connected_bridge(transport.clone()).await;

    assert_eq!(bridge.resolve_characteristic(0x20), custom);
    assert_eq!(bridge.resolve_characteristic(0x0e), DEFAULT_CHARACTERISTIC_UUID);

    bridge.write(0x20, &[1, 2, 3]).await.unwrap();
    assert_eq!(transport.writes(), vec![(custom, vec![1, 2, 3])]);
}

#[tokio::test]
async fn test_write_requires_connected_state() {
    let transport = FakeTransport::with_hub(HUB_MAC);
    let mut bridge = bridge(transport.clone(), quiet_config());

    let err = bridge.write(0x0e, &[1]).await.unwrap_err();
    assert!(matches!(
        err,
        HublinkError::InvalidState {
            operation: "write",
            state: ConnectionState::Idle
        }
    ));
    assert!(transport.writes().is_empty());
}

#[tokio::test]
async fn test_write_surfaces_transport_error() {
    let transport = FakeTransport::with_hub(HUB_MAC);
    let mut bridge = connected_bridge(transport.clone()).await;
    transport.fail_next_writes(1);

    let err = bridge.write(0x0e, &[1]).await.unwrap_err();
    assert!(matches!(err, HublinkError::Transport(_)));
    assert_eq!(bridge.state(), ConnectionState::Connected);
}

// ----------------------------------------------------------------------------
// Disconnect
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_disconnect_is_terminal() {
    let transport = FakeTransport::with_hub(HUB_MAC);
    let mut bridge = connected_bridge(transport.clone()).await;

    bridge.disconnect().await.unwrap();
    assert_eq!(bridge.state(), ConnectionState::Closed);
    assert!(!bridge.is_alive());
    assert_eq!(transport.count(&Call::Disconnect), 1);

    // Closed has no way out
    assert!(bridge.write(0x0e, &[1]).await.is_err());
    let err = bridge
        .connect(&MatchTarget::any(), Duration::from_millis(10), 1)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        HublinkError::InvalidState {
            state: ConnectionState::Closed,
            ..
        }
    ));

    bridge.disconnect().await.unwrap();
    assert_eq!(transport.count(&Call::Disconnect), 1);
}

#[tokio::test]
async fn test_disconnect_from_idle_is_rejected() {
    let mut bridge = bridge(FakeTransport::new(), quiet_config());
    assert!(bridge.disconnect().await.is_err());
    assert_eq!(bridge.state(), ConnectionState::Idle);
}

#[tokio::test]
async fn test_disconnect_does_not_hang_on_stuck_transport() {
    let transport = FakeTransport::with_hub(HUB_MAC);
    let mut bridge = connected_bridge(transport.clone()).await;
    transport.set_disconnect_delay(Duration::from_secs(30));

    timeout(Duration::from_secs(2), bridge.disconnect())
        .await
        .expect("disconnect should be bounded")
        .unwrap();
    assert_eq!(bridge.state(), ConnectionState::Closed);
}

// ----------------------------------------------------------------------------
// Notifications and the Drain Loop
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_notifications_are_queued_in_order() {
    let transport = FakeTransport::with_hub(HUB_MAC);
    let (responses, mut rx) = response_channel();
    let mut bridge = ConnectionBridge::new(transport.clone(), quiet_config(), responses);
    bridge
        .connect(&MatchTarget::any(), Duration::from_millis(10), 1)
        .await
        .unwrap();

    for i in 0..20u8 {
        assert!(transport.emit(0x0e, vec![i, 0x01]));
    }

    for i in 0..20u8 {
        assert_eq!(rx.recv().await, Some(NotificationEvent::new(0x0e, vec![i, 0x01])));
    }
}

#[tokio::test]
async fn test_serve_drains_in_order_until_shutdown() {
    let transport = FakeTransport::with_hub(HUB_MAC);
    let mut bridge = connected_bridge(transport.clone()).await;
    let (requests, rx) = request_channel();
    let shutdown = CancellationToken::new();

    for i in 0..10u8 {
        requests.send(0x0e, vec![i]).unwrap();
    }

    let stopper = shutdown.clone();
    let watcher = transport.clone();
    tokio::spawn(async move {
        while watcher.writes().len() < 10 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        stopper.cancel();
    });

    timeout(Duration::from_secs(2), bridge.serve(rx, shutdown))
        .await
        .expect("serve should stop after shutdown");

    let payloads: Vec<Vec<u8>> = transport.writes().into_iter().map(|(_, data)| data).collect();
    let expected: Vec<Vec<u8>> = (0..10u8).map(|i| vec![i]).collect();
    assert_eq!(payloads, expected);
    assert_eq!(bridge.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_single_write_failure_keeps_serving() {
    let transport = FakeTransport::with_hub(HUB_MAC);
    let mut bridge = connected_bridge(transport.clone()).await;
    let (requests, rx) = request_channel();
    transport.fail_next_writes(1);

    requests.send(0x0e, vec![1]).unwrap();
    requests.send(0x0e, vec![2]).unwrap();
    drop(requests);

    timeout(Duration::from_secs(2), bridge.serve(rx, CancellationToken::new()))
        .await
        .expect("serve should stop once the queue closes");

    assert_eq!(transport.writes().len(), 2);
    assert_eq!(transport.writes()[1].1, vec![2]);
}

#[tokio::test]
async fn test_persistent_write_failure_ends_serving() {
    let transport = FakeTransport::with_hub(HUB_MAC);
    let config = quiet_config().with_max_consecutive_write_failures(3);
    let (responses, _rx) = response_channel();
    let mut bridge = ConnectionBridge::new(transport.clone(), config, responses);
    bridge
        .connect(&MatchTarget::any(), Duration::from_millis(10), 1)
        .await
        .unwrap();

    let (requests, rx) = request_channel();
    transport.fail_next_writes(100);
    for i in 0..10u8 {
        requests.send(0x0e, vec![i]).unwrap();
    }

    timeout(Duration::from_secs(2), bridge.serve(rx, CancellationToken::new()))
        .await
        .expect("serve should give up");

    assert_eq!(transport.writes().len(), 3);
    assert!(!bridge.is_alive());
    assert_eq!(bridge.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_link_loss_ends_serving() {
    let transport = FakeTransport::with_hub(HUB_MAC);
    let mut bridge = connected_bridge(transport.clone()).await;
    let status = bridge.status();
    let (_requests, rx) = request_channel();

    transport.drop_link();
    timeout(Duration::from_secs(2), bridge.serve(rx, CancellationToken::new()))
        .await
        .expect("serve should notice the dropped link");

    assert!(!status.is_alive());
    assert_eq!(status.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_unresponsive_link_check_ends_serving() {
    let transport = FakeTransport::with_hub(HUB_MAC);
    let mut bridge = connected_bridge(transport.clone()).await;
    let status = bridge.status();
    let (_requests, rx) = request_channel();
    let shutdown = CancellationToken::new();

    transport.set_link_check_delay(Duration::from_secs(60));
    let stopper = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        stopper.cancel();
    });

    timeout(Duration::from_secs(2), bridge.serve(rx, shutdown))
        .await
        .expect("a hanging link check must not block shutdown");

    assert!(!status.is_alive());
    assert_eq!(status.state(), ConnectionState::Closed);
    assert_eq!(transport.count(&Call::Disconnect), 1);
}

#[tokio::test]
async fn test_slow_link_check_counts_as_link_down() {
    let transport = FakeTransport::with_hub(HUB_MAC);
    let mut bridge = connected_bridge(transport.clone()).await;

    transport.set_link_check_delay(Duration::from_secs(60));
    let up = timeout(Duration::from_secs(1), bridge.refresh_link())
        .await
        .expect("link check should be bounded");

    assert!(!up);
    assert!(!bridge.is_alive());
}
