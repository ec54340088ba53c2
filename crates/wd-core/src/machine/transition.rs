use std::time::Duration;

use uuid::Uuid;

use crate::address::{decode_ssid, MacAddress};
use crate::command::{CommandReply, CreateGroupParams};
use crate::config::ServiceConfig;
use crate::error::{P2pError, P2pResult};
use crate::event::{
    ConnectionOutcome, DecisionPrompt, GroupStartedEvent, InvitationStatus, NegotiationStatus,
    P2pNotification, SupplicantEvent,
};
use crate::group::{GroupConfig, NetworkId, P2pGroup, WpsMethod};
use crate::machine::state::{IncomingNegotiation, P2pState, PendingConnect};

/// Timers scheduled against the service queue. Firing is just another input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    GroupNegotiation,
    IdleShutdown,
    UserAuthorization,
}

/// HAL calls the machine wants performed. The driver executes each one and
/// feeds the result back as [`MachineInput::HalCompleted`] within the same
/// processing turn.
#[derive(Debug, Clone, PartialEq)]
pub enum HalRequest {
    SetupInterface,
    TeardownInterface,
    Connect { config: GroupConfig },
    CancelConnect,
    ProvisionDiscovery { peer: MacAddress, wps: WpsMethod },
    Reject { peer: MacAddress },
    GroupAdd { params: CreateGroupParams },
    GroupRemove { interface: String },
    Invite { interface: String, peer: MacAddress },
}

/// Side effects produced by a transition, executed by the service loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Hal(HalRequest),
    StartTimer { kind: TimerKind, duration: Duration },
    CancelTimer(TimerKind),
    /// Resolve the reply of the command currently being processed. Dropped
    /// by the driver when no command is in flight.
    Reply(P2pResult<CommandReply>),
    Notify(P2pNotification),
    /// Hand an accept/decline choice to the decision collaborator.
    PromptDecision(DecisionPrompt),
    /// Record a freshly started persistent group in the store.
    RecordGroup(P2pGroup),
    /// Drop all discovered peers.
    PurgePeers,
    /// Invalidate the cached persistent group list.
    ResetGroups,
    /// Ask the station-mode owner to disconnect (frequency conflict accepted).
    RequestStaDisconnect,
}

/// Lifecycle commands routed through the machine. Pass-through commands
/// (discovery, services, queries, setters) are handled by the service loop
/// directly after consulting the machine state.
#[derive(Debug, Clone, PartialEq)]
pub enum MachineCommand {
    Enable,
    Disable,
    Connect(GroupConfig),
    CancelConnect,
    CreateGroup(CreateGroupParams),
    RemoveGroup,
}

/// The closed input union the machine consumes.
#[derive(Debug, Clone, PartialEq)]
pub enum MachineInput {
    Command(MachineCommand),
    Event(SupplicantEvent),
    TimerFired(TimerKind),
    HalCompleted { request: HalRequest, result: P2pResult<Option<String>> },
    Decision { id: Uuid, accept: bool, pin: Option<String> },
}

/// Timeout knobs, projected from [`ServiceConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineTimeouts {
    pub group_negotiation: Duration,
    pub idle_shutdown: Duration,
    pub user_authorization: Duration,
}

impl From<&ServiceConfig> for MachineTimeouts {
    fn from(config: &ServiceConfig) -> Self {
        MachineTimeouts {
            group_negotiation: config.group_negotiation_timeout,
            idle_shutdown: config.idle_shutdown_timeout,
            user_authorization: config.user_authorization_timeout,
        }
    }
}

/// The connection state machine.
///
/// 纯状态机:不执行副作用,只产生动作列表。
#[derive(Debug, Clone)]
pub struct ConnectionStateMachine {
    state: P2pState,
    timeouts: MachineTimeouts,
}

impl ConnectionStateMachine {
    pub fn new(timeouts: MachineTimeouts) -> Self {
        ConnectionStateMachine { state: P2pState::Disabled, timeouts }
    }

    pub fn state(&self) -> &P2pState {
        &self.state
    }

    /// Core entry point: applies one input and returns the new state along
    /// with the actions the driver must execute, in order.
    pub fn handle(&mut self, input: MachineInput) -> (P2pState, Vec<Action>) {
        #[cfg(feature = "tracing")]
        let old_state = self.state.name();

        let (next, actions) = self.transition(input);

        #[cfg(feature = "tracing")]
        if old_state != next.name() {
            tracing::debug!(from = old_state, to = next.name(), "p2p state transition");
        }

        self.state = next.clone();
        (next, actions)
    }

    fn transition(&mut self, input: MachineInput) -> (P2pState, Vec<Action>) {
        // Cross-cutting rules first: HAL death and enable/disable behave the
        // same way everywhere.
        match &input {
            MachineInput::Event(SupplicantEvent::SupplicantDisconnected) => {
                return self.on_hal_lost();
            }
            MachineInput::HalCompleted { result: Err(P2pError::Disconnected), .. } => {
                return self.on_hal_lost();
            }
            MachineInput::Command(MachineCommand::Disable) => {
                return self.on_disable();
            }
            MachineInput::Command(MachineCommand::Enable) => {
                return if self.state.is_enabled() {
                    (self.state.clone(), vec![Action::Reply(Ok(CommandReply::Ack))])
                } else {
                    (P2pState::Disabled, vec![Action::Hal(HalRequest::SetupInterface)])
                };
            }
            _ => {}
        }

        match (self.state.clone(), input) {
            // ---------------- Disabled ----------------
            (
                P2pState::Disabled,
                MachineInput::HalCompleted { request: HalRequest::SetupInterface, result },
            ) => match result {
                Ok(_) => (
                    P2pState::Idle,
                    vec![
                        Action::Reply(Ok(CommandReply::Ack)),
                        Action::Notify(P2pNotification::P2pStateChanged { enabled: true }),
                        self.start_idle_timer(),
                    ],
                ),
                Err(err) => (P2pState::Disabled, vec![Action::Reply(Err(err))]),
            },
            (P2pState::Disabled, MachineInput::Command(_)) => (
                P2pState::Disabled,
                vec![Action::Reply(Err(P2pError::busy("p2p is disabled")))],
            ),
            (P2pState::Disabled, _) => (P2pState::Disabled, Vec::new()),

            // ---------------- group started, from any enabled state --------
            (state, MachineInput::Event(SupplicantEvent::GroupStarted(event)))
                if state.is_enabled() =>
            {
                self.on_group_started(state, event)
            }

            // ---------------- Idle ----------------
            (P2pState::Idle, MachineInput::Command(MachineCommand::Connect(config))) => {
                if let Err(err) = config.validate() {
                    return (P2pState::Idle, vec![Action::Reply(Err(err))]);
                }
                let pending = PendingConnect::new(config.clone());
                if config.join_existing {
                    (
                        P2pState::ProvisionDiscovery { pending },
                        vec![
                            Action::CancelTimer(TimerKind::IdleShutdown),
                            Action::Hal(HalRequest::ProvisionDiscovery {
                                peer: config.peer_address,
                                wps: config.wps,
                            }),
                            self.start_negotiation_timer(),
                        ],
                    )
                } else {
                    (
                        P2pState::GroupNegotiation { pending },
                        vec![
                            Action::CancelTimer(TimerKind::IdleShutdown),
                            Action::Hal(HalRequest::Connect { config }),
                            self.start_negotiation_timer(),
                        ],
                    )
                }
            }
            (P2pState::Idle, MachineInput::Command(MachineCommand::CancelConnect)) => (
                P2pState::Idle,
                vec![Action::Reply(Err(P2pError::busy("no pending connection")))],
            ),
            (P2pState::Idle, MachineInput::Command(MachineCommand::CreateGroup(params))) => {
                (P2pState::Idle, vec![Action::Hal(HalRequest::GroupAdd { params })])
            }
            (P2pState::Idle, MachineInput::Command(MachineCommand::RemoveGroup)) => (
                P2pState::Idle,
                vec![Action::Reply(Err(P2pError::busy("no active group")))],
            ),
            (
                P2pState::Idle,
                MachineInput::HalCompleted { request: HalRequest::GroupAdd { .. }, result },
            ) => {
                let reply = result.map(|_| CommandReply::Ack);
                (P2pState::Idle, vec![Action::Reply(reply)])
            }
            (
                P2pState::Idle,
                MachineInput::Event(SupplicantEvent::GoNegotiationRequest { peer, wps }),
            ) => {
                let request = IncomingNegotiation { id: Uuid::new_v4(), peer, wps };
                let prompt = DecisionPrompt::IncomingNegotiation {
                    id: request.id,
                    peer: request.peer,
                    wps: request.wps,
                };
                (
                    P2pState::UserAuthorizingNegotiationRequest { request },
                    vec![
                        Action::CancelTimer(TimerKind::IdleShutdown),
                        Action::PromptDecision(prompt),
                        self.start_authorization_timer(),
                    ],
                )
            }
            (P2pState::Idle, MachineInput::TimerFired(TimerKind::IdleShutdown)) => (
                P2pState::Disabled,
                vec![
                    Action::Hal(HalRequest::TeardownInterface),
                    Action::Notify(P2pNotification::P2pStateChanged { enabled: false }),
                    Action::PurgePeers,
                    Action::ResetGroups,
                ],
            ),
            (P2pState::Idle, _) => (P2pState::Idle, Vec::new()),

            // ---------------- ProvisionDiscovery ----------------
            (
                P2pState::ProvisionDiscovery { mut pending },
                MachineInput::HalCompleted { request: HalRequest::ProvisionDiscovery { .. }, result },
            ) => match result {
                Ok(_) => {
                    let reply = CommandReply::ConnectStarted { id: pending.id, generated_pin: None };
                    pending.replied = true;
                    (
                        P2pState::ProvisionDiscovery { pending },
                        vec![Action::Reply(Ok(reply))],
                    )
                }
                Err(err) => {
                    let mut actions = vec![Action::Reply(Err(err))];
                    actions.extend(self.back_to_idle_actions());
                    (P2pState::Idle, actions)
                }
            },
            (
                P2pState::ProvisionDiscovery { pending },
                MachineInput::Event(SupplicantEvent::ProvisionDiscoverySuccess { peer }),
            ) if peer == pending.config.peer_address => {
                let config = pending.config.clone();
                (
                    P2pState::GroupNegotiation { pending },
                    vec![
                        Action::Hal(HalRequest::Connect { config }),
                        Action::CancelTimer(TimerKind::GroupNegotiation),
                        self.start_negotiation_timer(),
                    ],
                )
            }
            (
                P2pState::ProvisionDiscovery { pending },
                MachineInput::Event(SupplicantEvent::ProvisionDiscoveryFailure { peer, .. }),
            ) if peer == pending.config.peer_address => {
                self.fail_pending(&pending, ConnectionOutcome::ProvisionDiscoveryFailed)
            }
            (
                P2pState::ProvisionDiscovery { pending },
                MachineInput::Event(SupplicantEvent::ProvisionDiscoveryShowPin { pin, .. }),
            ) => {
                let id = pending.id;
                (
                    P2pState::ProvisionDiscovery { pending },
                    vec![Action::Notify(P2pNotification::DisplayPin { id, pin })],
                )
            }
            (P2pState::ProvisionDiscovery { pending }, input) => self.on_pending_common(
                pending,
                |pending| P2pState::ProvisionDiscovery { pending },
                input,
            ),

            // ---------------- GroupNegotiation ----------------
            (
                P2pState::GroupNegotiation { mut pending },
                MachineInput::HalCompleted { request: HalRequest::Connect { .. }, result },
            ) => match result {
                Ok(generated_pin) => {
                    let mut actions = Vec::new();
                    if pending.replied {
                        if let Some(pin) = generated_pin.clone() {
                            actions.push(Action::Notify(P2pNotification::DisplayPin {
                                id: pending.id,
                                pin,
                            }));
                        }
                    } else {
                        actions.push(Action::Reply(Ok(CommandReply::ConnectStarted {
                            id: pending.id,
                            generated_pin: generated_pin.clone(),
                        })));
                        pending.replied = true;
                    }
                    pending.generated_pin = generated_pin;
                    (P2pState::GroupNegotiation { pending }, actions)
                }
                Err(err) => {
                    if pending.replied {
                        self.fail_pending(&pending, ConnectionOutcome::Failed)
                    } else {
                        let mut actions = vec![Action::Reply(Err(err))];
                        actions.extend(self.back_to_idle_actions());
                        (P2pState::Idle, actions)
                    }
                }
            },
            (
                P2pState::GroupNegotiation { pending },
                MachineInput::Event(SupplicantEvent::GoNegotiationFailure { status }),
            ) => match status {
                NegotiationStatus::NoCommonChannels => {
                    let prompt = DecisionPrompt::FrequencyConflict {
                        id: pending.id,
                        peer: pending.config.peer_address,
                    };
                    (
                        P2pState::FrequencyConflict { pending },
                        vec![
                            Action::CancelTimer(TimerKind::GroupNegotiation),
                            Action::PromptDecision(prompt),
                            self.start_authorization_timer(),
                        ],
                    )
                }
                _ => self.fail_pending(&pending, ConnectionOutcome::Failed),
            },
            (
                P2pState::GroupNegotiation { pending },
                MachineInput::Event(SupplicantEvent::InvitationResult { status }),
            ) => match status {
                InvitationStatus::Accepted => (P2pState::GroupNegotiation { pending }, Vec::new()),
                _ => self.fail_pending(&pending, ConnectionOutcome::Failed),
            },
            (
                P2pState::GroupNegotiation { pending },
                MachineInput::Event(SupplicantEvent::ProvisionDiscoveryShowPin { pin, .. }),
            ) => {
                let id = pending.id;
                (
                    P2pState::GroupNegotiation { pending },
                    vec![Action::Notify(P2pNotification::DisplayPin { id, pin })],
                )
            }
            (P2pState::GroupNegotiation { pending }, input) => self.on_pending_common(
                pending,
                |pending| P2pState::GroupNegotiation { pending },
                input,
            ),

            // ---------------- UserAuthorizingNegotiationRequest ----------------
            (
                P2pState::UserAuthorizingNegotiationRequest { request },
                MachineInput::Decision { id, accept, pin },
            ) if id == request.id => {
                if !accept {
                    let actions = vec![
                        Action::CancelTimer(TimerKind::UserAuthorization),
                        Action::Hal(HalRequest::Reject { peer: request.peer }),
                        Action::Notify(P2pNotification::ConnectionResult {
                            id: request.id,
                            outcome: ConnectionOutcome::UserRejected,
                        }),
                        self.start_idle_timer(),
                    ];
                    return (P2pState::Idle, actions);
                }
                let mut config = GroupConfig::new(request.peer, request.wps);
                config.pin = pin;
                if config.validate().is_err() {
                    let actions = vec![
                        Action::CancelTimer(TimerKind::UserAuthorization),
                        Action::Hal(HalRequest::Reject { peer: request.peer }),
                        Action::Notify(P2pNotification::ConnectionResult {
                            id: request.id,
                            outcome: ConnectionOutcome::Failed,
                        }),
                        self.start_idle_timer(),
                    ];
                    return (P2pState::Idle, actions);
                }
                let pending = PendingConnect {
                    id: request.id,
                    config: config.clone(),
                    generated_pin: None,
                    replied: true,
                };
                (
                    P2pState::GroupNegotiation { pending },
                    vec![
                        Action::CancelTimer(TimerKind::UserAuthorization),
                        Action::Hal(HalRequest::Connect { config }),
                        self.start_negotiation_timer(),
                    ],
                )
            }
            (
                P2pState::UserAuthorizingNegotiationRequest { request },
                MachineInput::TimerFired(TimerKind::UserAuthorization),
            ) => (
                P2pState::Idle,
                vec![
                    Action::Hal(HalRequest::Reject { peer: request.peer }),
                    Action::Notify(P2pNotification::ConnectionResult {
                        id: request.id,
                        outcome: ConnectionOutcome::TimedOut,
                    }),
                    self.start_idle_timer(),
                ],
            ),
            (
                P2pState::UserAuthorizingNegotiationRequest { request },
                MachineInput::Command(_),
            ) => (
                P2pState::UserAuthorizingNegotiationRequest { request },
                vec![Action::Reply(Err(P2pError::busy("authorizing an incoming request")))],
            ),
            (P2pState::UserAuthorizingNegotiationRequest { request }, _) => {
                (P2pState::UserAuthorizingNegotiationRequest { request }, Vec::new())
            }

            // ---------------- FrequencyConflict ----------------
            (
                P2pState::FrequencyConflict { pending },
                MachineInput::Decision { id, accept, .. },
            ) if id == pending.id => {
                if accept {
                    let config = pending.config.clone();
                    (
                        P2pState::GroupNegotiation { pending },
                        vec![
                            Action::CancelTimer(TimerKind::UserAuthorization),
                            Action::RequestStaDisconnect,
                            Action::Hal(HalRequest::Connect { config }),
                            self.start_negotiation_timer(),
                        ],
                    )
                } else {
                    let mut actions = vec![Action::CancelTimer(TimerKind::UserAuthorization)];
                    let (state, rest) =
                        self.fail_pending(&pending, ConnectionOutcome::UserRejected);
                    actions.extend(rest);
                    (state, actions)
                }
            }
            (
                P2pState::FrequencyConflict { pending },
                MachineInput::TimerFired(TimerKind::UserAuthorization),
            ) => self.fail_pending(&pending, ConnectionOutcome::TimedOut),
            (
                P2pState::FrequencyConflict { pending },
                MachineInput::Command(MachineCommand::CancelConnect),
            ) => {
                let mut actions = vec![
                    Action::CancelTimer(TimerKind::UserAuthorization),
                    Action::Reply(Ok(CommandReply::Ack)),
                ];
                let (state, rest) = self.fail_pending(&pending, ConnectionOutcome::Cancelled);
                actions.extend(rest);
                (state, actions)
            }
            (P2pState::FrequencyConflict { pending }, MachineInput::Command(_)) => (
                P2pState::FrequencyConflict { pending },
                vec![Action::Reply(Err(P2pError::busy("connection attempt pending decision")))],
            ),
            (P2pState::FrequencyConflict { pending }, _) => {
                (P2pState::FrequencyConflict { pending }, Vec::new())
            }

            // ---------------- GroupCreated ----------------
            (
                P2pState::GroupCreated { group },
                MachineInput::Command(MachineCommand::RemoveGroup),
            ) => {
                let interface = group.interface.clone().unwrap_or_default();
                (
                    P2pState::GroupCreated { group },
                    vec![Action::Hal(HalRequest::GroupRemove { interface })],
                )
            }
            (
                P2pState::GroupCreated { group },
                MachineInput::HalCompleted { request: HalRequest::GroupRemove { .. }, result },
            ) => {
                let reply = result.map(|_| CommandReply::Ack);
                (P2pState::GroupCreated { group }, vec![Action::Reply(reply)])
            }
            (
                P2pState::GroupCreated { .. },
                MachineInput::Event(SupplicantEvent::GroupRemoved { .. }),
            ) => (
                P2pState::Idle,
                vec![
                    Action::Notify(P2pNotification::ConnectionChanged {
                        connected: false,
                        group: None,
                    }),
                    self.start_idle_timer(),
                ],
            ),
            (
                P2pState::GroupCreated { mut group },
                MachineInput::Event(SupplicantEvent::FrequencyChanged { frequency_mhz, .. }),
            ) => {
                group.frequency_mhz = Some(frequency_mhz);
                (P2pState::GroupCreated { group }, Vec::new())
            }
            (
                P2pState::GroupCreated { mut group },
                MachineInput::Event(SupplicantEvent::ClientJoined { address, .. }),
            ) => {
                if !group.clients.contains(&address) {
                    group.clients.push(address);
                }
                let notify = Action::Notify(P2pNotification::ConnectionChanged {
                    connected: true,
                    group: Some(group.clone()),
                });
                (P2pState::GroupCreated { group }, vec![notify])
            }
            (
                P2pState::GroupCreated { mut group },
                MachineInput::Event(SupplicantEvent::ClientLeft { address, .. }),
            ) => {
                group.clients.retain(|client| *client != address);
                let notify = Action::Notify(P2pNotification::ConnectionChanged {
                    connected: true,
                    group: Some(group.clone()),
                });
                (P2pState::GroupCreated { group }, vec![notify])
            }
            (
                P2pState::GroupCreated { group },
                MachineInput::Command(MachineCommand::Connect(config)),
            ) => {
                if !group.is_group_owner {
                    return (
                        P2pState::GroupCreated { group },
                        vec![Action::Reply(Err(P2pError::busy("already connected to a group")))],
                    );
                }
                if let Err(err) = config.validate() {
                    return (P2pState::GroupCreated { group }, vec![Action::Reply(Err(err))]);
                }
                let interface = group.interface.clone().unwrap_or_default();
                let peer = config.peer_address;
                (
                    P2pState::GroupCreated { group },
                    vec![Action::Hal(HalRequest::Invite { interface, peer })],
                )
            }
            (
                P2pState::GroupCreated { group },
                MachineInput::HalCompleted { request: HalRequest::Invite { .. }, result },
            ) => {
                let reply = result.map(|_| CommandReply::Ack);
                (P2pState::GroupCreated { group }, vec![Action::Reply(reply)])
            }
            (P2pState::GroupCreated { group }, MachineInput::Command(_)) => (
                P2pState::GroupCreated { group },
                vec![Action::Reply(Err(P2pError::busy("a group is active")))],
            ),
            (P2pState::GroupCreated { group }, _) => {
                (P2pState::GroupCreated { group }, Vec::new())
            }
        }
    }

    // ---------------- helpers ----------------

    fn on_group_started(
        &self,
        state: P2pState,
        event: GroupStartedEvent,
    ) -> (P2pState, Vec<Action>) {
        let group = group_from_event(&event);
        let mut actions = vec![
            Action::CancelTimer(TimerKind::IdleShutdown),
            Action::CancelTimer(TimerKind::GroupNegotiation),
            Action::CancelTimer(TimerKind::UserAuthorization),
        ];
        if let Some(pending) = state.pending_connect() {
            actions.push(Action::Notify(P2pNotification::ConnectionResult {
                id: pending.id,
                outcome: ConnectionOutcome::Connected,
            }));
        }
        actions.push(Action::Notify(P2pNotification::ConnectionChanged {
            connected: true,
            group: Some(group.clone()),
        }));
        if group.network_id.is_persistent() {
            actions.push(Action::RecordGroup(group.clone()));
        }
        (P2pState::GroupCreated { group }, actions)
    }

    /// Shared handling for the two pending-connect states.
    fn on_pending_common(
        &self,
        pending: PendingConnect,
        rebuild: fn(PendingConnect) -> P2pState,
        input: MachineInput,
    ) -> (P2pState, Vec<Action>) {
        match input {
            MachineInput::Command(MachineCommand::CancelConnect) => {
                let mut actions = vec![
                    Action::Hal(HalRequest::CancelConnect),
                    Action::Reply(Ok(CommandReply::Ack)),
                ];
                let (next, rest) = self.fail_pending(&pending, ConnectionOutcome::Cancelled);
                actions.extend(rest);
                (next, actions)
            }
            MachineInput::TimerFired(TimerKind::GroupNegotiation) => {
                let mut actions = vec![Action::Hal(HalRequest::CancelConnect)];
                let (next, rest) = self.fail_pending(&pending, ConnectionOutcome::TimedOut);
                actions.extend(rest);
                (next, actions)
            }
            MachineInput::Command(_) => (
                rebuild(pending),
                vec![Action::Reply(Err(P2pError::busy("connection already in progress")))],
            ),
            // HAL completions for fire-and-forget requests (CancelConnect,
            // Reject) and unrelated events change nothing.
            _ => (rebuild(pending), Vec::new()),
        }
    }

    /// Ends the pending connection event and returns to `Idle`.
    fn fail_pending(
        &self,
        pending: &PendingConnect,
        outcome: ConnectionOutcome,
    ) -> (P2pState, Vec<Action>) {
        let mut actions = vec![Action::CancelTimer(TimerKind::GroupNegotiation)];
        actions.push(Action::Notify(P2pNotification::ConnectionResult {
            id: pending.id,
            outcome,
        }));
        actions.push(self.start_idle_timer());
        (P2pState::Idle, actions)
    }

    fn back_to_idle_actions(&self) -> Vec<Action> {
        vec![Action::CancelTimer(TimerKind::GroupNegotiation), self.start_idle_timer()]
    }

    /// HAL transport lost: every in-flight operation fails generically and
    /// the machine lands in `Disabled` until an explicit enable.
    fn on_hal_lost(&self) -> (P2pState, Vec<Action>) {
        if !self.state.is_enabled() {
            return (
                P2pState::Disabled,
                vec![Action::Reply(Err(P2pError::Disconnected))],
            );
        }
        let mut actions = vec![
            Action::CancelTimer(TimerKind::GroupNegotiation),
            Action::CancelTimer(TimerKind::IdleShutdown),
            Action::CancelTimer(TimerKind::UserAuthorization),
            Action::Reply(Err(P2pError::Disconnected)),
        ];
        if let Some(pending) = self.state.pending_connect() {
            actions.push(Action::Notify(P2pNotification::ConnectionResult {
                id: pending.id,
                outcome: ConnectionOutcome::Failed,
            }));
        }
        if let P2pState::UserAuthorizingNegotiationRequest { request } = &self.state {
            actions.push(Action::Notify(P2pNotification::ConnectionResult {
                id: request.id,
                outcome: ConnectionOutcome::Failed,
            }));
        }
        if matches!(self.state, P2pState::GroupCreated { .. }) {
            actions.push(Action::Notify(P2pNotification::ConnectionChanged {
                connected: false,
                group: None,
            }));
        }
        actions.push(Action::Notify(P2pNotification::P2pStateChanged { enabled: false }));
        actions.push(Action::PurgePeers);
        actions.push(Action::ResetGroups);
        (P2pState::Disabled, actions)
    }

    fn on_disable(&self) -> (P2pState, Vec<Action>) {
        if !self.state.is_enabled() {
            return (P2pState::Disabled, vec![Action::Reply(Ok(CommandReply::Ack))]);
        }
        let mut actions = vec![
            Action::CancelTimer(TimerKind::GroupNegotiation),
            Action::CancelTimer(TimerKind::IdleShutdown),
            Action::CancelTimer(TimerKind::UserAuthorization),
        ];
        if let Some(pending) = self.state.pending_connect() {
            actions.push(Action::Notify(P2pNotification::ConnectionResult {
                id: pending.id,
                outcome: ConnectionOutcome::Cancelled,
            }));
        }
        actions.push(Action::Hal(HalRequest::TeardownInterface));
        actions.push(Action::Reply(Ok(CommandReply::Ack)));
        actions.push(Action::Notify(P2pNotification::P2pStateChanged { enabled: false }));
        actions.push(Action::PurgePeers);
        actions.push(Action::ResetGroups);
        (P2pState::Disabled, actions)
    }

    fn start_idle_timer(&self) -> Action {
        Action::StartTimer {
            kind: TimerKind::IdleShutdown,
            duration: self.timeouts.idle_shutdown,
        }
    }

    fn start_negotiation_timer(&self) -> Action {
        Action::StartTimer {
            kind: TimerKind::GroupNegotiation,
            duration: self.timeouts.group_negotiation,
        }
    }

    fn start_authorization_timer(&self) -> Action {
        Action::StartTimer {
            kind: TimerKind::UserAuthorization,
            duration: self.timeouts.user_authorization,
        }
    }
}

fn group_from_event(event: &GroupStartedEvent) -> P2pGroup {
    P2pGroup {
        network_id: event
            .persistent_network_id
            .map(NetworkId::Persistent)
            .unwrap_or(NetworkId::Temporary),
        network_name: decode_ssid(&event.ssid),
        passphrase: event.passphrase.clone(),
        owner: Some(event.owner),
        is_group_owner: event.is_group_owner,
        interface: Some(event.interface.clone()),
        frequency_mhz: Some(event.frequency_mhz),
        clients: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::{GroupOwnerIntent, PersistPolicy};

    fn timeouts() -> MachineTimeouts {
        MachineTimeouts {
            group_negotiation: Duration::from_secs(120),
            idle_shutdown: Duration::from_secs(150),
            user_authorization: Duration::from_secs(30),
        }
    }

    fn machine() -> ConnectionStateMachine {
        ConnectionStateMachine::new(timeouts())
    }

    fn enabled_machine() -> ConnectionStateMachine {
        let mut sm = machine();
        sm.handle(MachineInput::Command(MachineCommand::Enable));
        sm.handle(MachineInput::HalCompleted {
            request: HalRequest::SetupInterface,
            result: Ok(None),
        });
        sm
    }

    fn config(peer: &str) -> GroupConfig {
        GroupConfig {
            peer_address: peer.parse().unwrap(),
            wps: WpsMethod::Pbc,
            pin: None,
            persist: PersistPolicy::Temporary,
            group_owner_intent: GroupOwnerIntent::Auto,
            join_existing: false,
        }
    }

    fn group_started(persistent: Option<i32>) -> SupplicantEvent {
        SupplicantEvent::GroupStarted(GroupStartedEvent {
            interface: "p2p-p2p0-3".to_string(),
            is_group_owner: false,
            ssid: b"DIRECT-hh".to_vec(),
            frequency_mhz: 2437,
            passphrase: None,
            owner: "aa:bb:cc:dd:ee:ff".parse().unwrap(),
            persistent_network_id: persistent,
        })
    }

    #[test]
    fn enable_goes_through_setup_to_idle() {
        let mut sm = machine();
        let (state, actions) = sm.handle(MachineInput::Command(MachineCommand::Enable));
        assert_eq!(state, P2pState::Disabled);
        assert!(actions.contains(&Action::Hal(HalRequest::SetupInterface)));

        let (state, actions) = sm.handle(MachineInput::HalCompleted {
            request: HalRequest::SetupInterface,
            result: Ok(None),
        });
        assert_eq!(state, P2pState::Idle);
        assert!(actions.contains(&Action::Reply(Ok(CommandReply::Ack))));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::StartTimer { kind: TimerKind::IdleShutdown, .. })));
    }

    #[test]
    fn setup_failure_stays_disabled() {
        let mut sm = machine();
        sm.handle(MachineInput::Command(MachineCommand::Enable));
        let (state, actions) = sm.handle(MachineInput::HalCompleted {
            request: HalRequest::SetupInterface,
            result: Err(P2pError::Rejected("iface exists".into())),
        });
        assert_eq!(state, P2pState::Disabled);
        assert!(matches!(actions.as_slice(), [Action::Reply(Err(P2pError::Rejected(_)))]));
    }

    #[test]
    fn commands_while_disabled_are_busy() {
        let mut sm = machine();
        let (_, actions) = sm.handle(MachineInput::Command(MachineCommand::Connect(config(
            "aa:bb:cc:dd:ee:ff",
        ))));
        assert!(matches!(actions.as_slice(), [Action::Reply(Err(P2pError::Busy(_)))]));
    }

    #[test]
    fn connect_enters_negotiation_and_arms_timer() {
        let mut sm = enabled_machine();
        let (state, actions) = sm.handle(MachineInput::Command(MachineCommand::Connect(config(
            "aa:bb:cc:dd:ee:ff",
        ))));
        assert!(matches!(state, P2pState::GroupNegotiation { .. }));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::Hal(HalRequest::Connect { .. }))));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::StartTimer { kind: TimerKind::GroupNegotiation, .. })));
        assert!(actions.contains(&Action::CancelTimer(TimerKind::IdleShutdown)));
    }

    #[test]
    fn invalid_connect_is_rejected_before_any_hal_call() {
        let mut sm = enabled_machine();
        let mut bad = config("aa:bb:cc:dd:ee:ff");
        bad.pin = Some("12345670".to_string()); // pbc must not carry a pin
        let (state, actions) = sm.handle(MachineInput::Command(MachineCommand::Connect(bad)));
        assert_eq!(state, P2pState::Idle);
        assert!(matches!(
            actions.as_slice(),
            [Action::Reply(Err(P2pError::InvalidArgument(_)))]
        ));
        assert!(!actions.iter().any(|a| matches!(a, Action::Hal(_))));
    }

    #[test]
    fn connect_reply_carries_generated_pin() {
        let mut sm = enabled_machine();
        let mut display = config("aa:bb:cc:dd:ee:ff");
        display.wps = WpsMethod::Display;
        sm.handle(MachineInput::Command(MachineCommand::Connect(display)));
        let (_, actions) = sm.handle(MachineInput::HalCompleted {
            request: HalRequest::Connect { config: config("aa:bb:cc:dd:ee:ff") },
            result: Ok(Some("12345670".to_string())),
        });
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::Reply(Ok(CommandReply::ConnectStarted { generated_pin: Some(pin), .. }))
                if pin == "12345670"
        )));
    }

    #[test]
    fn join_goes_through_provision_discovery() {
        let mut sm = enabled_machine();
        let mut join = config("aa:bb:cc:dd:ee:ff");
        join.join_existing = true;
        let (state, actions) = sm.handle(MachineInput::Command(MachineCommand::Connect(join)));
        assert!(matches!(state, P2pState::ProvisionDiscovery { .. }));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::Hal(HalRequest::ProvisionDiscovery { .. }))));

        sm.handle(MachineInput::HalCompleted {
            request: HalRequest::ProvisionDiscovery {
                peer: "aa:bb:cc:dd:ee:ff".parse().unwrap(),
                wps: WpsMethod::Pbc,
            },
            result: Ok(None),
        });

        let (state, actions) = sm.handle(MachineInput::Event(
            SupplicantEvent::ProvisionDiscoverySuccess {
                peer: "aa:bb:cc:dd:ee:ff".parse().unwrap(),
            },
        ));
        assert!(matches!(state, P2pState::GroupNegotiation { .. }));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::Hal(HalRequest::Connect { .. }))));
    }

    #[test]
    fn negotiation_timeout_ends_with_timeout_outcome() {
        let mut sm = enabled_machine();
        sm.handle(MachineInput::Command(MachineCommand::Connect(config(
            "aa:bb:cc:dd:ee:ff",
        ))));
        let (state, actions) = sm.handle(MachineInput::TimerFired(TimerKind::GroupNegotiation));
        assert_eq!(state, P2pState::Idle);
        assert!(actions.contains(&Action::Hal(HalRequest::CancelConnect)));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::Notify(P2pNotification::ConnectionResult {
                outcome: ConnectionOutcome::TimedOut,
                ..
            })
        )));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::StartTimer { kind: TimerKind::IdleShutdown, .. })));
    }

    #[test]
    fn group_started_completes_the_connection() {
        let mut sm = enabled_machine();
        sm.handle(MachineInput::Command(MachineCommand::Connect(config(
            "aa:bb:cc:dd:ee:ff",
        ))));
        let (state, actions) = sm.handle(MachineInput::Event(group_started(None)));
        assert!(matches!(state, P2pState::GroupCreated { .. }));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::Notify(P2pNotification::ConnectionResult {
                outcome: ConnectionOutcome::Connected,
                ..
            })
        )));
        // Temporary group: nothing recorded in the persistent store.
        assert!(!actions.iter().any(|a| matches!(a, Action::RecordGroup(_))));
    }

    #[test]
    fn persistent_group_started_is_recorded() {
        let mut sm = enabled_machine();
        let (_, actions) = sm.handle(MachineInput::Event(group_started(Some(7))));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::RecordGroup(group) if group.network_id == NetworkId::Persistent(7)
        )));
    }

    #[test]
    fn no_common_channels_asks_the_user() {
        let mut sm = enabled_machine();
        sm.handle(MachineInput::Command(MachineCommand::Connect(config(
            "aa:bb:cc:dd:ee:ff",
        ))));
        let (state, actions) = sm.handle(MachineInput::Event(
            SupplicantEvent::GoNegotiationFailure {
                status: NegotiationStatus::NoCommonChannels,
            },
        ));
        assert!(matches!(state, P2pState::FrequencyConflict { .. }));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::PromptDecision(DecisionPrompt::FrequencyConflict { .. })
        )));
    }

    #[test]
    fn frequency_conflict_accept_disconnects_sta_and_retries() {
        let mut sm = enabled_machine();
        sm.handle(MachineInput::Command(MachineCommand::Connect(config(
            "aa:bb:cc:dd:ee:ff",
        ))));
        let (state, _) = sm.handle(MachineInput::Event(SupplicantEvent::GoNegotiationFailure {
            status: NegotiationStatus::NoCommonChannels,
        }));
        let id = state.pending_connect().unwrap().id;

        let (state, actions) =
            sm.handle(MachineInput::Decision { id, accept: true, pin: None });
        assert!(matches!(state, P2pState::GroupNegotiation { .. }));
        assert!(actions.contains(&Action::RequestStaDisconnect));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::Hal(HalRequest::Connect { .. }))));
    }

    #[test]
    fn frequency_conflict_decline_is_user_reject() {
        let mut sm = enabled_machine();
        sm.handle(MachineInput::Command(MachineCommand::Connect(config(
            "aa:bb:cc:dd:ee:ff",
        ))));
        let (state, _) = sm.handle(MachineInput::Event(SupplicantEvent::GoNegotiationFailure {
            status: NegotiationStatus::NoCommonChannels,
        }));
        let id = state.pending_connect().unwrap().id;

        let (state, actions) =
            sm.handle(MachineInput::Decision { id, accept: false, pin: None });
        assert_eq!(state, P2pState::Idle);
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::Notify(P2pNotification::ConnectionResult {
                outcome: ConnectionOutcome::UserRejected,
                ..
            })
        )));
    }

    #[test]
    fn incoming_negotiation_accept_connects() {
        let mut sm = enabled_machine();
        let (state, actions) = sm.handle(MachineInput::Event(
            SupplicantEvent::GoNegotiationRequest {
                peer: "11:22:33:44:55:66".parse().unwrap(),
                wps: WpsMethod::Pbc,
            },
        ));
        let id = match &state {
            P2pState::UserAuthorizingNegotiationRequest { request } => request.id,
            other => panic!("unexpected state {other:?}"),
        };
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::PromptDecision(DecisionPrompt::IncomingNegotiation { .. })
        )));

        let (state, actions) = sm.handle(MachineInput::Decision { id, accept: true, pin: None });
        assert!(matches!(state, P2pState::GroupNegotiation { .. }));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::Hal(HalRequest::Connect { .. }))));
    }

    #[test]
    fn incoming_negotiation_decline_rejects_peer() {
        let mut sm = enabled_machine();
        let (state, _) = sm.handle(MachineInput::Event(SupplicantEvent::GoNegotiationRequest {
            peer: "11:22:33:44:55:66".parse().unwrap(),
            wps: WpsMethod::Pbc,
        }));
        let id = match &state {
            P2pState::UserAuthorizingNegotiationRequest { request } => request.id,
            other => panic!("unexpected state {other:?}"),
        };
        let (state, actions) = sm.handle(MachineInput::Decision { id, accept: false, pin: None });
        assert_eq!(state, P2pState::Idle);
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::Hal(HalRequest::Reject { peer }) if peer.to_string() == "11:22:33:44:55:66"
        )));
    }

    #[test]
    fn group_removed_returns_to_idle() {
        let mut sm = enabled_machine();
        sm.handle(MachineInput::Event(group_started(None)));
        let (state, actions) = sm.handle(MachineInput::Event(SupplicantEvent::GroupRemoved {
            interface: "p2p-p2p0-3".to_string(),
            is_group_owner: false,
        }));
        assert_eq!(state, P2pState::Idle);
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::Notify(P2pNotification::ConnectionChanged { connected: false, .. })
        )));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::StartTimer { kind: TimerKind::IdleShutdown, .. })));
    }

    #[test]
    fn disconnect_fault_forces_disabled_from_any_state() {
        let mut sm = enabled_machine();
        sm.handle(MachineInput::Command(MachineCommand::Connect(config(
            "aa:bb:cc:dd:ee:ff",
        ))));
        let (state, actions) =
            sm.handle(MachineInput::Event(SupplicantEvent::SupplicantDisconnected));
        assert_eq!(state, P2pState::Disabled);
        assert!(actions.contains(&Action::PurgePeers));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::Notify(P2pNotification::P2pStateChanged { enabled: false })
        )));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::Notify(P2pNotification::ConnectionResult {
                outcome: ConnectionOutcome::Failed,
                ..
            })
        )));
    }

    #[test]
    fn rejected_hal_result_does_not_change_state() {
        let mut sm = enabled_machine();
        sm.handle(MachineInput::Command(MachineCommand::CreateGroup(
            CreateGroupParams::Autonomous { persist: PersistPolicy::Temporary },
        )));
        let (state, actions) = sm.handle(MachineInput::HalCompleted {
            request: HalRequest::GroupAdd {
                params: CreateGroupParams::Autonomous { persist: PersistPolicy::Temporary },
            },
            result: Err(P2pError::Rejected("busy".into())),
        });
        assert_eq!(state, P2pState::Idle);
        assert!(matches!(actions.as_slice(), [Action::Reply(Err(P2pError::Rejected(_)))]));
    }

    #[test]
    fn idle_shutdown_timer_tears_the_interface_down() {
        let mut sm = enabled_machine();
        let (state, actions) = sm.handle(MachineInput::TimerFired(TimerKind::IdleShutdown));
        assert_eq!(state, P2pState::Disabled);
        assert!(actions.contains(&Action::Hal(HalRequest::TeardownInterface)));
        assert!(actions.contains(&Action::PurgePeers));
    }
}
