//! The single-consumer orchestration loop.
//!
//! Client commands, supplicant events, timer firings and user decisions are
//! all serialized into one queue and processed one at a time, so the peer
//! table, group store and service registry need no locks. The pure state
//! machine decides; this loop executes its actions against the HAL adapter
//! and feeds results straight back in, preserving total ordering.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use wd_core::address::MacAddress;
use wd_core::command::{
    ClientCommand, CommandReply, ConnectionInfo, CreateGroupParams, DiscoveryState, P2pStateKind,
};
use wd_core::config::ServiceConfig;
use wd_core::error::{P2pError, P2pResult};
use wd_core::event::{P2pNotification, SupplicantEvent};
use wd_core::group::{GroupOwnerIntent, P2pGroup, PersistPolicy};
use wd_core::intent::select_group_owner_intent;
use wd_core::machine::{
    Action, ConnectionStateMachine, HalRequest, MachineCommand, MachineInput, MachineTimeouts,
    P2pState, TimerKind,
};
use wd_core::peer::{wps_config, PeerDevice, PeerList, PeerStatus};
use wd_core::ports::{DecisionPort, StationController};
use wd_hal::{EventSink, P2pEventMonitor, SupplicantP2pHal, VendorP2pIface};

use crate::groups::GroupStore;
use crate::registry::ServiceRegistry;

const COMMAND_QUEUE_DEPTH: usize = 64;

/// Extended-listen window used by start-listen, matching the supplicant's
/// conventional 500ms-in-5s duty cycle.
const EXT_LISTEN_PERIOD_MS: u32 = 500;
const EXT_LISTEN_INTERVAL_MS: u32 = 5000;

/// Primary device type advertised for this device (category 10, WFA OUI).
const DEFAULT_PRIMARY_TYPE: &str = "10-0050F204-5";

/// What a registered client is allowed to see.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientPermissions {
    /// Without this, device-info queries get the anonymized placeholder
    /// address instead of the real MAC.
    pub can_read_device_address: bool,
}

enum ServiceMessage {
    Command {
        client: u64,
        cmd: ClientCommand,
        reply: oneshot::Sender<P2pResult<CommandReply>>,
    },
    Supplicant(SupplicantEvent),
    Timer(TimerKind),
    Decision { id: Uuid, accept: bool, pin: Option<String> },
    Subscribe { reply: oneshot::Sender<mpsc::UnboundedReceiver<P2pNotification>> },
    ClientAttached { client: u64, permissions: ClientPermissions },
    ClientDetached { client: u64 },
}

/// Owning handle to a running service loop. Clients attach through
/// [`P2pService::register_client`].
pub struct P2pService {
    tx: mpsc::Sender<ServiceMessage>,
    next_client: AtomicU64,
}

impl P2pService {
    /// Builds the full stack around a vendor interface and spawns the loop.
    pub fn spawn(
        config: ServiceConfig,
        vendor: Arc<dyn VendorP2pIface>,
        decisions: Arc<dyn DecisionPort>,
        station: Arc<dyn StationController>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let timeouts = MachineTimeouts::from(&config);
        let runtime = ServiceRuntime {
            device_name: config.device_name.clone(),
            config,
            hal: Arc::new(SupplicantP2pHal::new(vendor)),
            monitor: Arc::new(P2pEventMonitor::new()),
            decisions,
            station,
            machine: ConnectionStateMachine::new(timeouts),
            peers: PeerList::new(),
            groups: GroupStore::new(),
            registry: ServiceRegistry::new(),
            timers: HashMap::new(),
            subscribers: Vec::new(),
            clients: HashMap::new(),
            discovery_active: false,
            device_address: None,
            pending_reply: None,
            msg_tx: tx.clone(),
            rx,
        };
        tokio::spawn(runtime.run());
        P2pService { tx, next_client: AtomicU64::new(1) }
    }

    /// Attaches a client and returns its command handle.
    pub async fn register_client(&self, permissions: ClientPermissions) -> P2pServiceHandle {
        let client = self.next_client.fetch_add(1, Ordering::Relaxed);
        let _ = self
            .tx
            .send(ServiceMessage::ClientAttached { client, permissions })
            .await;
        P2pServiceHandle { tx: self.tx.clone(), client }
    }
}

/// Per-client command surface. Cloning shares the client identity; call
/// [`P2pServiceHandle::detach`] when the client goes away so the idle
/// shutdown timer can run.
#[derive(Clone)]
pub struct P2pServiceHandle {
    tx: mpsc::Sender<ServiceMessage>,
    client: u64,
}

impl P2pServiceHandle {
    pub async fn command(&self, cmd: ClientCommand) -> P2pResult<CommandReply> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ServiceMessage::Command { client: self.client, cmd, reply: reply_tx })
            .await
            .map_err(|_| P2pError::Disconnected)?;
        reply_rx.await.map_err(|_| P2pError::Disconnected)?
    }

    async fn expect_ack(&self, cmd: ClientCommand) -> P2pResult<()> {
        match self.command(cmd).await? {
            CommandReply::Ack => Ok(()),
            other => Err(P2pError::Rejected(format!("unexpected reply {other:?}"))),
        }
    }

    pub async fn enable(&self) -> P2pResult<()> {
        self.expect_ack(ClientCommand::Enable).await
    }

    pub async fn disable(&self) -> P2pResult<()> {
        self.expect_ack(ClientCommand::Disable).await
    }

    pub async fn discover_peers(&self, scan: wd_core::command::ScanType) -> P2pResult<()> {
        self.expect_ack(ClientCommand::DiscoverPeers { scan }).await
    }

    pub async fn stop_discovery(&self) -> P2pResult<()> {
        self.expect_ack(ClientCommand::StopDiscovery).await
    }

    /// Starts a connection. Returns the connection-event id and, for Display
    /// provisioning without a caller pin, the HAL-generated pin.
    pub async fn connect(
        &self,
        config: wd_core::group::GroupConfig,
    ) -> P2pResult<(Uuid, Option<String>)> {
        match self.command(ClientCommand::Connect { config }).await? {
            CommandReply::ConnectStarted { id, generated_pin } => Ok((id, generated_pin)),
            other => Err(P2pError::Rejected(format!("unexpected reply {other:?}"))),
        }
    }

    pub async fn cancel_connect(&self) -> P2pResult<()> {
        self.expect_ack(ClientCommand::CancelConnect).await
    }

    pub async fn create_group(&self, params: CreateGroupParams) -> P2pResult<()> {
        self.expect_ack(ClientCommand::CreateGroup { params }).await
    }

    pub async fn remove_group(&self) -> P2pResult<()> {
        self.expect_ack(ClientCommand::RemoveGroup).await
    }

    pub async fn add_local_service(&self, info: &str) -> P2pResult<()> {
        self.expect_ack(ClientCommand::AddLocalService { info: info.to_string() }).await
    }

    pub async fn remove_local_service(&self, info: &str) -> P2pResult<()> {
        self.expect_ack(ClientCommand::RemoveLocalService { info: info.to_string() }).await
    }

    pub async fn add_service_request(
        &self,
        query: wd_core::service_discovery::ServiceQuery,
    ) -> P2pResult<u8> {
        match self.command(ClientCommand::AddServiceRequest { query }).await? {
            CommandReply::ServiceRequestId(id) => Ok(id),
            other => Err(P2pError::Rejected(format!("unexpected reply {other:?}"))),
        }
    }

    pub async fn remove_service_request(&self, id: u8) -> P2pResult<()> {
        self.expect_ack(ClientCommand::RemoveServiceRequest { id }).await
    }

    pub async fn discover_services(&self) -> P2pResult<()> {
        self.expect_ack(ClientCommand::DiscoverServices).await
    }

    pub async fn peers(&self) -> P2pResult<Vec<PeerDevice>> {
        match self.command(ClientCommand::RequestPeers).await? {
            CommandReply::Peers(peers) => Ok(peers),
            other => Err(P2pError::Rejected(format!("unexpected reply {other:?}"))),
        }
    }

    pub async fn group_info(&self) -> P2pResult<Option<P2pGroup>> {
        match self.command(ClientCommand::RequestGroupInfo).await? {
            CommandReply::GroupInfo(group) => Ok(group),
            other => Err(P2pError::Rejected(format!("unexpected reply {other:?}"))),
        }
    }

    pub async fn device_info(&self) -> P2pResult<PeerDevice> {
        match self.command(ClientCommand::RequestDeviceInfo).await? {
            CommandReply::DeviceInfo(device) => Ok(device),
            other => Err(P2pError::Rejected(format!("unexpected reply {other:?}"))),
        }
    }

    pub async fn connection_info(&self) -> P2pResult<ConnectionInfo> {
        match self.command(ClientCommand::RequestConnectionInfo).await? {
            CommandReply::ConnectionInfo(info) => Ok(info),
            other => Err(P2pError::Rejected(format!("unexpected reply {other:?}"))),
        }
    }

    pub async fn persistent_groups(&self) -> P2pResult<Vec<P2pGroup>> {
        match self.command(ClientCommand::RequestPersistentGroups).await? {
            CommandReply::PersistentGroups(groups) => Ok(groups),
            other => Err(P2pError::Rejected(format!("unexpected reply {other:?}"))),
        }
    }

    pub async fn p2p_state(&self) -> P2pResult<P2pStateKind> {
        match self.command(ClientCommand::RequestP2pState).await? {
            CommandReply::P2pState(state) => Ok(state),
            other => Err(P2pError::Rejected(format!("unexpected reply {other:?}"))),
        }
    }

    pub async fn discovery_state(&self) -> P2pResult<DiscoveryState> {
        match self.command(ClientCommand::RequestDiscoveryState).await? {
            CommandReply::DiscoveryState(state) => Ok(state),
            other => Err(P2pError::Rejected(format!("unexpected reply {other:?}"))),
        }
    }

    /// Streams service notifications. Each call gets an independent feed.
    pub async fn subscribe(&self) -> P2pResult<mpsc::UnboundedReceiver<P2pNotification>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ServiceMessage::Subscribe { reply: reply_tx })
            .await
            .map_err(|_| P2pError::Disconnected)?;
        reply_rx.await.map_err(|_| P2pError::Disconnected)
    }

    /// Answers a pending decision prompt.
    pub async fn decide(&self, id: Uuid, accept: bool, pin: Option<String>) -> P2pResult<()> {
        self.tx
            .send(ServiceMessage::Decision { id, accept, pin })
            .await
            .map_err(|_| P2pError::Disconnected)
    }

    /// Detaches this client, releasing its hold on the idle-shutdown timer.
    pub async fn detach(&self) {
        let _ = self.tx.send(ServiceMessage::ClientDetached { client: self.client }).await;
    }
}

struct ServiceRuntime {
    config: ServiceConfig,
    hal: Arc<SupplicantP2pHal>,
    monitor: Arc<P2pEventMonitor>,
    decisions: Arc<dyn DecisionPort>,
    station: Arc<dyn StationController>,
    machine: ConnectionStateMachine,
    peers: PeerList,
    groups: GroupStore,
    registry: ServiceRegistry,
    timers: HashMap<TimerKind, AbortHandle>,
    subscribers: Vec<mpsc::UnboundedSender<P2pNotification>>,
    clients: HashMap<u64, ClientPermissions>,
    discovery_active: bool,
    device_name: String,
    device_address: Option<MacAddress>,
    pending_reply: Option<oneshot::Sender<P2pResult<CommandReply>>>,
    msg_tx: mpsc::Sender<ServiceMessage>,
    rx: mpsc::Receiver<ServiceMessage>,
}

impl ServiceRuntime {
    async fn run(mut self) {
        info!("p2p service loop started");
        while let Some(msg) = self.rx.recv().await {
            match msg {
                ServiceMessage::Command { client, cmd, reply } => {
                    self.handle_command(client, cmd, reply).await;
                }
                ServiceMessage::Supplicant(event) => self.handle_supplicant(event).await,
                ServiceMessage::Timer(kind) => {
                    self.timers.remove(&kind);
                    self.drive_machine(MachineInput::TimerFired(kind)).await;
                }
                ServiceMessage::Decision { id, accept, pin } => {
                    self.drive_machine(MachineInput::Decision { id, accept, pin }).await;
                }
                ServiceMessage::Subscribe { reply } => {
                    let (tx, rx) = mpsc::unbounded_channel();
                    self.subscribers.push(tx);
                    let _ = reply.send(rx);
                }
                ServiceMessage::ClientAttached { client, permissions } => {
                    self.clients.insert(client, permissions);
                    self.cancel_timer(TimerKind::IdleShutdown);
                }
                ServiceMessage::ClientDetached { client } => {
                    self.clients.remove(&client);
                    if self.clients.is_empty() && matches!(self.machine.state(), P2pState::Idle) {
                        self.start_timer(TimerKind::IdleShutdown, self.config.idle_shutdown_timeout);
                    }
                }
            }
        }
        info!("p2p service loop stopped");
    }

    // ---------------- commands ----------------

    async fn handle_command(
        &mut self,
        client: u64,
        cmd: ClientCommand,
        reply: oneshot::Sender<P2pResult<CommandReply>>,
    ) {
        let span = info_span!("p2p.command", client, cmd = command_name(&cmd));
        async move {
            self.touch_idle_timer();

            match machine_command(&cmd) {
                Some(machine_cmd) => {
                    self.pending_reply = Some(reply);
                    self.drive_machine(MachineInput::Command(machine_cmd)).await;
                    if let Some(tx) = self.pending_reply.take() {
                        let _ = tx.send(Err(P2pError::busy("command produced no reply")));
                    }
                }
                None => {
                    let result = self.handle_direct(client, cmd).await;
                    let disconnected = matches!(result, Err(P2pError::Disconnected));
                    let _ = reply.send(result);
                    if disconnected {
                        self.drive_machine(MachineInput::Event(
                            SupplicantEvent::SupplicantDisconnected,
                        ))
                        .await;
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn handle_direct(&mut self, client: u64, cmd: ClientCommand) -> P2pResult<CommandReply> {
        // Queries answer from local state in any machine state.
        match &cmd {
            ClientCommand::RequestPeers => {
                return Ok(CommandReply::Peers(self.peers.snapshot()));
            }
            ClientCommand::RequestGroupInfo => {
                let group = match self.machine.state() {
                    P2pState::GroupCreated { group } => Some(group.clone()),
                    _ => None,
                };
                return Ok(CommandReply::GroupInfo(group));
            }
            ClientCommand::RequestDeviceInfo => {
                return Ok(CommandReply::DeviceInfo(self.this_device(client)));
            }
            ClientCommand::RequestConnectionInfo => {
                let info = match self.machine.state() {
                    P2pState::GroupCreated { group } => ConnectionInfo {
                        group_formed: true,
                        is_group_owner: group.is_group_owner,
                        group_owner_address: group.owner,
                    },
                    _ => ConnectionInfo {
                        group_formed: false,
                        is_group_owner: false,
                        group_owner_address: None,
                    },
                };
                return Ok(CommandReply::ConnectionInfo(info));
            }
            ClientCommand::RequestP2pState => {
                let state = if self.machine.state().is_enabled() {
                    P2pStateKind::Enabled
                } else {
                    P2pStateKind::Disabled
                };
                return Ok(CommandReply::P2pState(state));
            }
            ClientCommand::RequestDiscoveryState => {
                let state = if self.discovery_active {
                    DiscoveryState::Started
                } else {
                    DiscoveryState::Stopped
                };
                return Ok(CommandReply::DiscoveryState(state));
            }
            ClientCommand::RequestPersistentGroups => {
                if self.machine.state().is_enabled() {
                    self.groups.ensure_loaded(&self.hal)?;
                }
                return Ok(CommandReply::PersistentGroups(self.groups.list()));
            }
            _ => {}
        }

        // Everything below drives the interface and needs an enabled stack.
        if !self.machine.state().is_enabled() {
            return Err(P2pError::busy("p2p is disabled"));
        }

        match cmd {
            ClientCommand::DiscoverPeers { scan } => {
                self.hal
                    .find(scan, self.config.discovery_timeout)
                    .map_err(P2pError::from)?;
                self.set_discovery_active(true);
                Ok(CommandReply::Ack)
            }
            ClientCommand::StopDiscovery => {
                self.hal.stop_find().map_err(P2pError::from)?;
                self.set_discovery_active(false);
                Ok(CommandReply::Ack)
            }
            ClientCommand::AddLocalService { info } => {
                self.registry.add_local(&self.hal, &info)?;
                Ok(CommandReply::Ack)
            }
            ClientCommand::RemoveLocalService { info } => {
                self.registry.remove_local(&self.hal, &info)?;
                Ok(CommandReply::Ack)
            }
            ClientCommand::AddServiceRequest { query } => {
                let id = self.registry.add_request(query)?;
                Ok(CommandReply::ServiceRequestId(id))
            }
            ClientCommand::RemoveServiceRequest { id } => {
                self.registry.remove_request(&self.hal, id)?;
                Ok(CommandReply::Ack)
            }
            ClientCommand::DiscoverServices => {
                self.registry.dispatch_outstanding(&self.hal);
                self.hal
                    .find(wd_core::command::ScanType::Full, self.config.discovery_timeout)
                    .map_err(P2pError::from)?;
                self.set_discovery_active(true);
                Ok(CommandReply::Ack)
            }
            ClientCommand::DeletePersistentGroup { network_id } => {
                self.groups.remove(&self.hal, network_id)?;
                self.broadcast(P2pNotification::PersistentGroupsChanged);
                Ok(CommandReply::Ack)
            }
            ClientCommand::SetChannels { listen, operating } => {
                if let Some(channel) = listen {
                    self.hal.set_listen_channel(channel).map_err(P2pError::from)?;
                }
                if let Some(channel) = operating {
                    self.hal.set_operating_channel(channel).map_err(P2pError::from)?;
                }
                Ok(CommandReply::Ack)
            }
            ClientCommand::SetDeviceName { name } => {
                self.hal.set_device_name(&name).map_err(P2pError::from)?;
                self.hal
                    .set_ssid_postfix(&format!("-{name}"))
                    .map_err(P2pError::from)?;
                self.device_name = name.clone();
                self.broadcast(P2pNotification::ThisDeviceChanged { name });
                Ok(CommandReply::Ack)
            }
            ClientCommand::SetWfdInfo { info } => {
                self.hal.enable_wfd(info.enabled).map_err(P2pError::from)?;
                if info.enabled {
                    self.hal
                        .set_wfd_device_info(&info.to_bytes())
                        .map_err(P2pError::from)?;
                }
                Ok(CommandReply::Ack)
            }
            ClientCommand::SetVendorElements { elements } => {
                self.hal.set_vendor_elements(&elements).map_err(P2pError::from)?;
                Ok(CommandReply::Ack)
            }
            ClientCommand::SetMiracastMode { mode } => {
                self.hal.set_miracast_mode(mode).map_err(P2pError::from)?;
                Ok(CommandReply::Ack)
            }
            ClientCommand::StartListen => {
                self.hal
                    .configure_ext_listen(EXT_LISTEN_PERIOD_MS, EXT_LISTEN_INTERVAL_MS)
                    .map_err(P2pError::from)?;
                Ok(CommandReply::Ack)
            }
            ClientCommand::StopListen => {
                self.hal.configure_ext_listen(0, 0).map_err(P2pError::from)?;
                Ok(CommandReply::Ack)
            }
            ClientCommand::RemoveClient { address } => {
                match self.machine.state() {
                    P2pState::GroupCreated { group } if group.is_group_owner => {}
                    _ => return Err(P2pError::busy("not owning a group")),
                }
                self.hal.remove_client(address).map_err(P2pError::from)?;
                Ok(CommandReply::Ack)
            }
            ClientCommand::FactoryReset => {
                self.registry.remove_all(&self.hal);
                self.groups.remove_all(&self.hal)?;
                self.hal
                    .set_device_name(&self.config.device_name)
                    .map_err(P2pError::from)?;
                self.device_name = self.config.device_name.clone();
                self.broadcast(P2pNotification::PersistentGroupsChanged);
                self.broadcast(P2pNotification::ThisDeviceChanged {
                    name: self.device_name.clone(),
                });
                Ok(CommandReply::Ack)
            }
            // Machine commands and queries were dispatched earlier.
            other => {
                warn!("unroutable command {other:?}");
                Err(P2pError::busy("command not routable"))
            }
        }
    }

    fn this_device(&self, client: u64) -> PeerDevice {
        let can_read = self
            .clients
            .get(&client)
            .map(|perm| perm.can_read_device_address)
            .unwrap_or(false);
        let address = if can_read {
            self.device_address.unwrap_or(MacAddress::ANONYMIZED)
        } else {
            MacAddress::ANONYMIZED
        };
        let now = Utc::now();
        PeerDevice {
            address,
            name: self.device_name.clone(),
            primary_type: DEFAULT_PRIMARY_TYPE.to_string(),
            secondary_type: None,
            wps_config_methods: wps_config::PUSHBUTTON | wps_config::DISPLAY | wps_config::KEYPAD,
            device_capabilities: 0,
            group_capabilities: 0,
            status: PeerStatus::Available,
            discovered_at: now,
            last_seen: now,
        }
    }

    // ---------------- supplicant events ----------------

    async fn handle_supplicant(&mut self, event: SupplicantEvent) {
        match event {
            SupplicantEvent::DeviceFound(peer) => {
                self.peers.upsert(peer);
                self.broadcast(P2pNotification::PeersChanged);
            }
            SupplicantEvent::DeviceLost { address } => {
                if self.peers.remove(&address).is_some() {
                    self.broadcast(P2pNotification::PeersChanged);
                }
            }
            SupplicantEvent::FindStopped => self.set_discovery_active(false),
            SupplicantEvent::ServiceDiscoveryResponse { peer, update_indicator, tlvs } => {
                self.broadcast(P2pNotification::ServiceDiscoveryResponse {
                    peer,
                    update_indicator,
                    tlvs,
                });
            }
            SupplicantEvent::SupplicantConnected => {}
            SupplicantEvent::ClientJoined { interface, address } => {
                self.peers.set_status(&address, PeerStatus::Connected);
                self.broadcast(P2pNotification::PeersChanged);
                self.drive_machine(MachineInput::Event(SupplicantEvent::ClientJoined {
                    interface,
                    address,
                }))
                .await;
            }
            SupplicantEvent::ClientLeft { interface, address } => {
                self.peers.set_status(&address, PeerStatus::Available);
                self.broadcast(P2pNotification::PeersChanged);
                self.drive_machine(MachineInput::Event(SupplicantEvent::ClientLeft {
                    interface,
                    address,
                }))
                .await;
            }
            other => self.drive_machine(MachineInput::Event(other)).await,
        }
    }

    // ---------------- machine driving ----------------

    async fn drive_machine(&mut self, input: MachineInput) {
        let mut queue = VecDeque::new();
        queue.push_back(input);
        while let Some(input) = queue.pop_front() {
            let (_state, actions) = self.machine.handle(input);
            for action in actions {
                if let Some(follow_up) = self.execute_action(action).await {
                    queue.push_back(follow_up);
                }
            }
        }
    }

    async fn execute_action(&mut self, action: Action) -> Option<MachineInput> {
        match action {
            Action::Hal(request) => {
                let result = self.perform_hal(request.clone()).await;
                Some(MachineInput::HalCompleted { request, result })
            }
            Action::Reply(reply) => {
                if let Some(tx) = self.pending_reply.take() {
                    let _ = tx.send(reply);
                }
                None
            }
            Action::StartTimer { kind, duration } => {
                self.start_timer(kind, duration);
                None
            }
            Action::CancelTimer(kind) => {
                self.cancel_timer(kind);
                None
            }
            Action::Notify(notification) => {
                self.broadcast(notification);
                None
            }
            Action::PromptDecision(prompt) => {
                self.decisions.request_decision(prompt.clone()).await;
                self.broadcast(P2pNotification::DecisionNeeded(prompt));
                None
            }
            Action::RecordGroup(group) => {
                if self.groups.add(group) {
                    if let Err(err) = self.hal.save_config() {
                        debug!("save_config after group record: {err}");
                    }
                    self.broadcast(P2pNotification::PersistentGroupsChanged);
                }
                None
            }
            Action::PurgePeers => {
                self.peers.clear();
                self.broadcast(P2pNotification::PeersChanged);
                None
            }
            Action::ResetGroups => {
                self.groups.clear_cache();
                None
            }
            Action::RequestStaDisconnect => {
                self.station.request_disconnect().await;
                None
            }
        }
    }

    async fn perform_hal(&mut self, request: HalRequest) -> P2pResult<Option<String>> {
        match request {
            HalRequest::SetupInterface => self.setup_interface().await,
            HalRequest::TeardownInterface => {
                let iface = self.config.interface_name.clone();
                self.monitor.set_monitoring(&iface, false);
                self.monitor.unregister_interface(&iface);
                self.hal.teardown_interface(&iface);
                self.discovery_active = false;
                Ok(None)
            }
            HalRequest::Connect { config } => {
                let intent = match config.group_owner_intent {
                    GroupOwnerIntent::Value(value) => value,
                    GroupOwnerIntent::Auto => {
                        let link = self.station.link_info().await;
                        select_group_owner_intent(link.band, link.dbs)
                    }
                };
                self.hal.connect(&config, intent).map_err(P2pError::from)
            }
            HalRequest::CancelConnect => {
                self.hal.cancel_connect().map_err(P2pError::from)?;
                Ok(None)
            }
            HalRequest::ProvisionDiscovery { peer, wps } => {
                self.hal.provision_discovery(peer, wps).map_err(P2pError::from)?;
                Ok(None)
            }
            HalRequest::Reject { peer } => {
                self.hal.reject(peer).map_err(P2pError::from)?;
                Ok(None)
            }
            HalRequest::GroupAdd { params } => {
                match params {
                    CreateGroupParams::Autonomous { persist } => self
                        .hal
                        .group_add(persist == PersistPolicy::Persistent, None),
                    CreateGroupParams::Persistent { network_id } => {
                        self.hal.group_add(true, Some(network_id))
                    }
                    CreateGroupParams::WithParams {
                        network_name,
                        passphrase,
                        persist,
                        frequency_mhz,
                    } => self.hal.group_add_with_config(
                        network_name.as_bytes(),
                        &passphrase,
                        persist == PersistPolicy::Persistent,
                        frequency_mhz,
                        None,
                        false,
                    ),
                }
                .map_err(P2pError::from)?;
                Ok(None)
            }
            HalRequest::GroupRemove { interface } => {
                self.hal.group_remove(&interface).map_err(P2pError::from)?;
                Ok(None)
            }
            HalRequest::Invite { interface, peer } => {
                let owner = self
                    .device_address
                    .or_else(|| self.hal.get_device_address())
                    .ok_or_else(|| P2pError::Rejected("device address unavailable".to_string()))?;
                self.hal.invite(&interface, owner, peer).map_err(P2pError::from)?;
                Ok(None)
            }
        }
    }

    async fn setup_interface(&mut self) -> P2pResult<Option<String>> {
        if !self.hal.is_initialization_complete() {
            let tx = self.msg_tx.clone();
            self.hal
                .initialize(move || {
                    // A single Disconnected message enters the queue; nothing
                    // mutates shared state from the death-callback context.
                    let _ = tx.try_send(ServiceMessage::Supplicant(
                        SupplicantEvent::SupplicantDisconnected,
                    ));
                })
                .map_err(P2pError::from)?;
        }

        let iface = self.config.interface_name.clone();
        // Clear anything left over from a previous session (e.g. after a HAL
        // death that never went through an orderly teardown).
        self.monitor.unregister_interface(&iface);
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        self.monitor.register_all_kinds(&iface, event_tx);
        let msg_tx = self.msg_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                if msg_tx.send(ServiceMessage::Supplicant(event)).await.is_err() {
                    break;
                }
            }
        });

        let monitor = Arc::clone(&self.monitor);
        let sink_iface = iface.clone();
        let sink: EventSink = Arc::new(move |event| monitor.broadcast(&sink_iface, event));
        if let Err(err) = self.hal.setup_interface(&iface, sink) {
            self.monitor.unregister_interface(&iface);
            return Err(P2pError::from(err));
        }
        self.monitor.set_monitoring(&iface, true);

        // Interface-up housekeeping; none of these failing is fatal to the
        // enable itself.
        if let Err(err) = self.hal.set_device_name(&self.device_name) {
            debug!("set_device_name on setup: {err}");
        }
        if let Err(err) = self.hal.set_ssid_postfix(&format!("-{}", self.device_name)) {
            debug!("set_ssid_postfix on setup: {err}");
        }
        if self.config.mac_randomization {
            if let Err(err) = self.hal.set_mac_randomization(true) {
                debug!("set_mac_randomization on setup: {err}");
            }
        }
        if let Some(channel) = self.config.listen_channel {
            if let Err(err) = self.hal.set_listen_channel(channel) {
                debug!("set_listen_channel on setup: {err}");
            }
        }
        self.device_address = self.hal.get_device_address();
        Ok(None)
    }

    // ---------------- plumbing ----------------

    fn set_discovery_active(&mut self, active: bool) {
        if self.discovery_active != active {
            self.discovery_active = active;
            self.broadcast(P2pNotification::DiscoveryStateChanged { active });
        }
    }

    fn broadcast(&mut self, notification: P2pNotification) {
        self.subscribers
            .retain(|subscriber| subscriber.send(notification.clone()).is_ok());
    }

    fn start_timer(&mut self, kind: TimerKind, duration: std::time::Duration) {
        // The idle-shutdown timer only runs while no clients are attached.
        if kind == TimerKind::IdleShutdown && !self.clients.is_empty() {
            self.cancel_timer(kind);
            return;
        }
        self.cancel_timer(kind);
        let tx = self.msg_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = tx.send(ServiceMessage::Timer(kind)).await;
        });
        self.timers.insert(kind, handle.abort_handle());
    }

    fn cancel_timer(&mut self, kind: TimerKind) {
        if let Some(handle) = self.timers.remove(&kind) {
            handle.abort();
        }
    }

    /// Any client command reschedules a running idle-shutdown timer.
    fn touch_idle_timer(&mut self) {
        if self.timers.contains_key(&TimerKind::IdleShutdown) {
            self.start_timer(TimerKind::IdleShutdown, self.config.idle_shutdown_timeout);
        }
    }
}

fn machine_command(cmd: &ClientCommand) -> Option<MachineCommand> {
    match cmd {
        ClientCommand::Enable => Some(MachineCommand::Enable),
        ClientCommand::Disable => Some(MachineCommand::Disable),
        ClientCommand::Connect { config } => Some(MachineCommand::Connect(config.clone())),
        ClientCommand::CancelConnect => Some(MachineCommand::CancelConnect),
        ClientCommand::CreateGroup { params } => {
            Some(MachineCommand::CreateGroup(params.clone()))
        }
        ClientCommand::RemoveGroup => Some(MachineCommand::RemoveGroup),
        _ => None,
    }
}

fn command_name(cmd: &ClientCommand) -> &'static str {
    match cmd {
        ClientCommand::Enable => "enable",
        ClientCommand::Disable => "disable",
        ClientCommand::DiscoverPeers { .. } => "discover_peers",
        ClientCommand::StopDiscovery => "stop_discovery",
        ClientCommand::Connect { .. } => "connect",
        ClientCommand::CancelConnect => "cancel_connect",
        ClientCommand::CreateGroup { .. } => "create_group",
        ClientCommand::RemoveGroup => "remove_group",
        ClientCommand::AddLocalService { .. } => "add_local_service",
        ClientCommand::RemoveLocalService { .. } => "remove_local_service",
        ClientCommand::AddServiceRequest { .. } => "add_service_request",
        ClientCommand::RemoveServiceRequest { .. } => "remove_service_request",
        ClientCommand::DiscoverServices => "discover_services",
        ClientCommand::RequestPeers => "request_peers",
        ClientCommand::RequestGroupInfo => "request_group_info",
        ClientCommand::RequestDeviceInfo => "request_device_info",
        ClientCommand::RequestConnectionInfo => "request_connection_info",
        ClientCommand::RequestPersistentGroups => "request_persistent_groups",
        ClientCommand::RequestP2pState => "request_p2p_state",
        ClientCommand::RequestDiscoveryState => "request_discovery_state",
        ClientCommand::DeletePersistentGroup { .. } => "delete_persistent_group",
        ClientCommand::SetChannels { .. } => "set_channels",
        ClientCommand::SetDeviceName { .. } => "set_device_name",
        ClientCommand::SetWfdInfo { .. } => "set_wfd_info",
        ClientCommand::SetVendorElements { .. } => "set_vendor_elements",
        ClientCommand::SetMiracastMode { .. } => "set_miracast_mode",
        ClientCommand::StartListen => "start_listen",
        ClientCommand::StopListen => "stop_listen",
        ClientCommand::RemoveClient { .. } => "remove_client",
        ClientCommand::FactoryReset => "factory_reset",
    }
}
