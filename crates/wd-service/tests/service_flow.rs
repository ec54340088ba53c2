//! End-to-end service flows against the scripted fake vendor.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

use wd_core::command::{CreateGroupParams, DiscoveryState, P2pStateKind, ScanType};
use wd_core::config::ServiceConfig;
use wd_core::error::P2pError;
use wd_core::event::{
    ConnectionOutcome, DecisionPrompt, GroupStartedEvent, P2pNotification, SupplicantEvent,
};
use wd_core::group::{GroupConfig, GroupOwnerIntent, PersistPolicy, WpsMethod};
use wd_core::peer::{wps_config, PeerDevice, PeerStatus};
use wd_core::MacAddress;
use wd_hal::testkit::FakeVendor;
use wd_hal::{CallError, VendorNetworkInfo, VendorP2pIface};
use wd_service::ports::{NoStationController, UnattendedDecisionPort};
use wd_service::{ClientPermissions, P2pService, P2pServiceHandle};

const DEVICE_MAC: [u8; 6] = [0x02, 0x1a, 0x11, 0xf0, 0x45, 0x9b];

async fn start() -> (Arc<FakeVendor>, P2pService, P2pServiceHandle) {
    let fake = Arc::new(FakeVendor::new());
    fake.set_device_address(DEVICE_MAC);
    let service = P2pService::spawn(
        ServiceConfig::default(),
        Arc::clone(&fake) as Arc<dyn VendorP2pIface>,
        Arc::new(UnattendedDecisionPort),
        Arc::new(NoStationController),
    );
    let handle = service.register_client(ClientPermissions::default()).await;
    (fake, service, handle)
}

async fn wait_for<F>(
    rx: &mut UnboundedReceiver<P2pNotification>,
    mut pred: F,
) -> P2pNotification
where
    F: FnMut(&P2pNotification) -> bool,
{
    timeout(Duration::from_secs(2), async {
        loop {
            let notification = rx.recv().await.expect("notification stream closed");
            if pred(&notification) {
                return notification;
            }
        }
    })
    .await
    .expect("timed out waiting for notification")
}

fn peer(addr: &str, name: &str) -> PeerDevice {
    PeerDevice {
        address: addr.parse().unwrap(),
        name: name.to_string(),
        primary_type: "10-0050F204-5".to_string(),
        secondary_type: None,
        wps_config_methods: wps_config::PUSHBUTTON | wps_config::DISPLAY,
        device_capabilities: 0x25,
        group_capabilities: 0,
        status: PeerStatus::Available,
        discovered_at: Utc::now(),
        last_seen: Utc::now(),
    }
}

fn pbc_config(peer: &str) -> GroupConfig {
    GroupConfig {
        peer_address: peer.parse().unwrap(),
        wps: WpsMethod::Pbc,
        pin: None,
        persist: PersistPolicy::Temporary,
        group_owner_intent: GroupOwnerIntent::Auto,
        join_existing: false,
    }
}

fn group_started(owner: &str, persistent: Option<i32>, is_go: bool) -> SupplicantEvent {
    SupplicantEvent::GroupStarted(GroupStartedEvent {
        interface: "p2p-p2p0-0".to_string(),
        is_group_owner: is_go,
        ssid: b"DIRECT-ab-test".to_vec(),
        frequency_mhz: 2437,
        passphrase: Some("secret-pass".to_string()),
        owner: owner.parse().unwrap(),
        persistent_network_id: persistent,
    })
}

#[tokio::test]
async fn enable_discover_and_find_peer() {
    let (fake, _service, handle) = start().await;
    let mut events = handle.subscribe().await.unwrap();

    handle.enable().await.unwrap();
    wait_for(&mut events, |n| {
        matches!(n, P2pNotification::P2pStateChanged { enabled: true })
    })
    .await;

    handle.discover_peers(ScanType::Social).await.unwrap();
    assert_eq!(handle.discovery_state().await.unwrap(), DiscoveryState::Started);

    fake.emit(SupplicantEvent::DeviceFound(peer("aa:bb:cc:dd:ee:ff", "tv")));
    wait_for(&mut events, |n| matches!(n, P2pNotification::PeersChanged)).await;

    let peers = handle.peers().await.unwrap();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].name, "tv");

    handle.stop_discovery().await.unwrap();
    assert_eq!(handle.discovery_state().await.unwrap(), DiscoveryState::Stopped);
}

#[tokio::test]
async fn pbc_connect_completes_on_group_started() {
    let (fake, _service, handle) = start().await;
    let mut events = handle.subscribe().await.unwrap();
    handle.enable().await.unwrap();

    let (id, pin) = handle.connect(pbc_config("aa:bb:cc:dd:ee:ff")).await.unwrap();
    assert!(pin.is_none());
    assert_eq!(fake.call_count("connect"), 1);

    fake.emit(group_started("aa:bb:cc:dd:ee:ff", None, false));
    let result = wait_for(&mut events, |n| {
        matches!(n, P2pNotification::ConnectionResult { .. })
    })
    .await;
    assert_eq!(
        result,
        P2pNotification::ConnectionResult { id, outcome: ConnectionOutcome::Connected }
    );

    let info = handle.connection_info().await.unwrap();
    assert!(info.group_formed);
    assert!(!info.is_group_owner);
    assert_eq!(
        info.group_owner_address,
        Some("aa:bb:cc:dd:ee:ff".parse().unwrap())
    );
    assert!(handle.group_info().await.unwrap().is_some());

    fake.emit(SupplicantEvent::GroupRemoved {
        interface: "p2p-p2p0-0".to_string(),
        is_group_owner: false,
    });
    wait_for(&mut events, |n| {
        matches!(n, P2pNotification::ConnectionChanged { connected: false, .. })
    })
    .await;
    assert!(handle.group_info().await.unwrap().is_none());
}

#[tokio::test]
async fn display_connect_returns_hal_generated_pin() {
    let (fake, _service, handle) = start().await;
    fake.set_generated_pin("98765432");
    handle.enable().await.unwrap();

    let mut config = pbc_config("aa:bb:cc:dd:ee:ff");
    config.wps = WpsMethod::Display;
    let (_id, pin) = handle.connect(config).await.unwrap();
    assert_eq!(pin.as_deref(), Some("98765432"));
}

#[tokio::test]
async fn invalid_wps_pin_combinations_never_reach_the_hal() {
    let (fake, _service, handle) = start().await;
    handle.enable().await.unwrap();

    let mut pbc_with_pin = pbc_config("aa:bb:cc:dd:ee:ff");
    pbc_with_pin.pin = Some("12345670".to_string());
    let err = handle.connect(pbc_with_pin).await.unwrap_err();
    assert!(matches!(err, P2pError::InvalidArgument(_)));

    let mut keypad_without_pin = pbc_config("aa:bb:cc:dd:ee:ff");
    keypad_without_pin.wps = WpsMethod::Keypad;
    let err = handle.connect(keypad_without_pin).await.unwrap_err();
    assert!(matches!(err, P2pError::InvalidArgument(_)));

    assert_eq!(fake.call_count("connect"), 0);
}

#[tokio::test]
async fn transport_fault_disables_until_reenabled() {
    let (fake, _service, handle) = start().await;
    let mut events = handle.subscribe().await.unwrap();
    handle.enable().await.unwrap();

    fake.fail_next("find", CallError::Transport("binder died".to_string()));
    let err = handle.discover_peers(ScanType::Full).await.unwrap_err();
    assert!(matches!(err, P2pError::Disconnected));

    wait_for(&mut events, |n| {
        matches!(n, P2pNotification::P2pStateChanged { enabled: false })
    })
    .await;
    assert_eq!(handle.p2p_state().await.unwrap(), P2pStateKind::Disabled);

    // Still down: ordinary commands are refused without any vendor call.
    let before = fake.call_count("find");
    assert!(handle.discover_peers(ScanType::Full).await.is_err());
    assert_eq!(fake.call_count("find"), before);

    // Explicit enable recovers through a fresh initialize.
    handle.enable().await.unwrap();
    assert_eq!(handle.p2p_state().await.unwrap(), P2pStateKind::Enabled);
    handle.discover_peers(ScanType::Full).await.unwrap();
}

#[tokio::test]
async fn vendor_death_notification_disables_the_service() {
    let (fake, _service, handle) = start().await;
    let mut events = handle.subscribe().await.unwrap();
    handle.enable().await.unwrap();

    fake.die();
    wait_for(&mut events, |n| {
        matches!(n, P2pNotification::P2pStateChanged { enabled: false })
    })
    .await;
    assert_eq!(handle.p2p_state().await.unwrap(), P2pStateKind::Disabled);

    fake.revive();
    handle.enable().await.unwrap();
    assert_eq!(handle.p2p_state().await.unwrap(), P2pStateKind::Enabled);
}

#[tokio::test]
async fn device_info_is_anonymized_without_permission() {
    let (_fake, service, handle) = start().await;
    handle.enable().await.unwrap();

    let info = handle.device_info().await.unwrap();
    assert_eq!(info.address, MacAddress::ANONYMIZED);

    let privileged = service
        .register_client(ClientPermissions { can_read_device_address: true })
        .await;
    let info = privileged.device_info().await.unwrap();
    assert_eq!(info.address, MacAddress::new(DEVICE_MAC));
}

#[tokio::test]
async fn service_request_ids_are_unique_and_removable() {
    let (fake, _service, handle) = start().await;
    handle.enable().await.unwrap();

    let query = wd_core::service_discovery::ServiceQuery::generic(vec![0x02, 0x00, 0x01]).unwrap();
    let a = handle.add_service_request(query.clone()).await.unwrap();
    let b = handle.add_service_request(query.clone()).await.unwrap();
    let c = handle.add_service_request(query).await.unwrap();
    assert!(a >= 1 && b >= 1 && c >= 1);
    assert_ne!(a, b);
    assert_ne!(b, c);

    handle.remove_service_request(b).await.unwrap();
    handle.discover_services().await.unwrap();
    assert_eq!(fake.call_count("request_service_discovery"), 2);
}

#[tokio::test]
async fn local_services_are_validated_locally() {
    let (fake, _service, handle) = start().await;
    handle.enable().await.unwrap();

    handle.add_local_service("upnp 10 uuid:1234").await.unwrap();
    let err = handle.add_local_service("mdns whatever").await.unwrap_err();
    assert!(matches!(err, P2pError::InvalidArgument(_)));
    assert_eq!(fake.call_count("add_upnp_service"), 1);
    assert_eq!(fake.call_count("add_bonjour_service"), 0);

    handle.remove_local_service("upnp 10 uuid:1234").await.unwrap();
    assert_eq!(fake.call_count("remove_upnp_service"), 1);
}

#[tokio::test]
async fn incoming_negotiation_can_be_declined() {
    let (fake, _service, handle) = start().await;
    let mut events = handle.subscribe().await.unwrap();
    handle.enable().await.unwrap();

    fake.emit(SupplicantEvent::GoNegotiationRequest {
        peer: "11:22:33:44:55:66".parse().unwrap(),
        wps: WpsMethod::Pbc,
    });
    let prompt = wait_for(&mut events, |n| {
        matches!(n, P2pNotification::DecisionNeeded(_))
    })
    .await;
    let id = match prompt {
        P2pNotification::DecisionNeeded(DecisionPrompt::IncomingNegotiation { id, .. }) => id,
        other => panic!("unexpected prompt {other:?}"),
    };

    handle.decide(id, false, None).await.unwrap();
    wait_for(&mut events, |n| {
        matches!(
            n,
            P2pNotification::ConnectionResult { outcome: ConnectionOutcome::UserRejected, .. }
        )
    })
    .await;
    assert_eq!(fake.call_count("reject"), 1);
}

#[tokio::test]
async fn incoming_negotiation_accept_drives_connect() {
    let (fake, _service, handle) = start().await;
    let mut events = handle.subscribe().await.unwrap();
    handle.enable().await.unwrap();

    fake.emit(SupplicantEvent::GoNegotiationRequest {
        peer: "11:22:33:44:55:66".parse().unwrap(),
        wps: WpsMethod::Pbc,
    });
    let prompt = wait_for(&mut events, |n| {
        matches!(n, P2pNotification::DecisionNeeded(_))
    })
    .await;
    let id = prompt_id(&prompt);

    handle.decide(id, true, None).await.unwrap();

    fake.emit(group_started("11:22:33:44:55:66", None, false));
    wait_for(&mut events, |n| {
        matches!(
            n,
            P2pNotification::ConnectionResult { outcome: ConnectionOutcome::Connected, .. }
        )
    })
    .await;
    assert_eq!(fake.call_count("connect"), 1);
}

#[tokio::test]
async fn persistent_groups_exclude_the_current_entry() {
    let (fake, _service, handle) = start().await;
    fake.set_networks(vec![
        VendorNetworkInfo {
            network_id: 0,
            ssid: b"DIRECT-live".to_vec(),
            bssid: [0x02, 0, 0, 0, 0, 1],
            is_current: true,
            is_group_owner: true,
        },
        VendorNetworkInfo {
            network_id: 1,
            ssid: b"DIRECT-saved".to_vec(),
            bssid: [0x02, 0, 0, 0, 0, 2],
            is_current: false,
            is_group_owner: false,
        },
    ]);
    handle.enable().await.unwrap();

    let groups = handle.persistent_groups().await.unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].network_name, "DIRECT-saved");

    handle.command(wd_core::command::ClientCommand::DeletePersistentGroup { network_id: 1 })
        .await
        .unwrap();
    assert_eq!(fake.call_count("remove_network"), 1);
    let groups = handle.persistent_groups().await.unwrap();
    assert!(groups.is_empty());
}

#[tokio::test]
async fn autonomous_group_creation_becomes_group_owner() {
    let (fake, _service, handle) = start().await;
    let mut events = handle.subscribe().await.unwrap();
    handle.enable().await.unwrap();

    handle
        .create_group(CreateGroupParams::Autonomous { persist: PersistPolicy::Temporary })
        .await
        .unwrap();
    assert_eq!(fake.call_count("group_add"), 1);

    fake.emit(group_started(
        "02:1a:11:f0:45:9b",
        None,
        true,
    ));
    wait_for(&mut events, |n| {
        matches!(n, P2pNotification::ConnectionChanged { connected: true, .. })
    })
    .await;

    let info = handle.connection_info().await.unwrap();
    assert!(info.group_formed);
    assert!(info.is_group_owner);
}

#[tokio::test]
async fn commands_are_busy_while_disabled() {
    let (_fake, _service, handle) = start().await;
    let err = handle.discover_peers(ScanType::Full).await.unwrap_err();
    assert!(matches!(err, P2pError::Busy(_)));
    let err = handle.connect(pbc_config("aa:bb:cc:dd:ee:ff")).await.unwrap_err();
    assert!(matches!(err, P2pError::Busy(_)));
    // Queries still answer.
    assert_eq!(handle.p2p_state().await.unwrap(), P2pStateKind::Disabled);
    assert!(handle.peers().await.unwrap().is_empty());
}

fn prompt_id(notification: &P2pNotification) -> uuid::Uuid {
    match notification {
        P2pNotification::DecisionNeeded(prompt) => prompt.id(),
        other => panic!("unexpected notification {other:?}"),
    }
}
