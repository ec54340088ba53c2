//! Event vocabularies: unsolicited supplicant events coming up from the HAL
//! and the notifications the service broadcasts to its clients.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::address::MacAddress;
use crate::group::{P2pGroup, WpsMethod};
use crate::peer::PeerDevice;

/// Status carried by a failed group-owner negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationStatus {
    /// No channel both sides may operate on. Surfaces a user decision.
    NoCommonChannels,
    /// The peer declined the negotiation.
    RejectedByPeer,
    Other(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    Accepted,
    Rejected,
    UnknownGroup,
    Other(i32),
}

/// A group reported started by the supplicant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupStartedEvent {
    pub interface: String,
    pub is_group_owner: bool,
    /// Raw SSID bytes as reported; decoded lazily for display.
    pub ssid: Vec<u8>,
    pub frequency_mhz: u32,
    pub passphrase: Option<String>,
    pub owner: MacAddress,
    pub persistent_network_id: Option<i32>,
}

/// Unsolicited events delivered by the supplicant through the event monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupplicantEvent {
    SupplicantConnected,
    SupplicantDisconnected,
    DeviceFound(PeerDevice),
    DeviceLost { address: MacAddress },
    FindStopped,
    GroupStarted(GroupStartedEvent),
    GroupRemoved { interface: String, is_group_owner: bool },
    GoNegotiationRequest { peer: MacAddress, wps: WpsMethod },
    GoNegotiationFailure { status: NegotiationStatus },
    ProvisionDiscoverySuccess { peer: MacAddress },
    ProvisionDiscoveryFailure { peer: MacAddress, status: i32 },
    ProvisionDiscoveryShowPin { peer: MacAddress, pin: String },
    InvitationResult { status: InvitationStatus },
    FrequencyChanged { interface: String, frequency_mhz: u32 },
    ClientJoined { interface: String, address: MacAddress },
    ClientLeft { interface: String, address: MacAddress },
    ServiceDiscoveryResponse { peer: MacAddress, update_indicator: u16, tlvs: Vec<u8> },
}

/// Discriminant used for monitor handler registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    SupplicantLifecycle,
    DeviceFound,
    DeviceLost,
    FindStopped,
    GroupStarted,
    GroupRemoved,
    GoNegotiationRequest,
    GoNegotiationFailure,
    ProvisionDiscovery,
    InvitationResult,
    FrequencyChanged,
    GroupClients,
    ServiceDiscoveryResponse,
}

impl SupplicantEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SupplicantEvent::SupplicantConnected | SupplicantEvent::SupplicantDisconnected => {
                EventKind::SupplicantLifecycle
            }
            SupplicantEvent::DeviceFound(_) => EventKind::DeviceFound,
            SupplicantEvent::DeviceLost { .. } => EventKind::DeviceLost,
            SupplicantEvent::FindStopped => EventKind::FindStopped,
            SupplicantEvent::GroupStarted(_) => EventKind::GroupStarted,
            SupplicantEvent::GroupRemoved { .. } => EventKind::GroupRemoved,
            SupplicantEvent::GoNegotiationRequest { .. } => EventKind::GoNegotiationRequest,
            SupplicantEvent::GoNegotiationFailure { .. } => EventKind::GoNegotiationFailure,
            SupplicantEvent::ProvisionDiscoverySuccess { .. }
            | SupplicantEvent::ProvisionDiscoveryFailure { .. }
            | SupplicantEvent::ProvisionDiscoveryShowPin { .. } => EventKind::ProvisionDiscovery,
            SupplicantEvent::InvitationResult { .. } => EventKind::InvitationResult,
            SupplicantEvent::FrequencyChanged { .. } => EventKind::FrequencyChanged,
            SupplicantEvent::ClientJoined { .. } | SupplicantEvent::ClientLeft { .. } => {
                EventKind::GroupClients
            }
            SupplicantEvent::ServiceDiscoveryResponse { .. } => EventKind::ServiceDiscoveryResponse,
        }
    }
}

/// Outcome attached to a finished connection event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionOutcome {
    Connected,
    Failed,
    TimedOut,
    UserRejected,
    Cancelled,
    ProvisionDiscoveryFailed,
}

/// A choice the service needs from outside before an in-flight operation can
/// proceed. The answer re-enters the queue as an ordinary decision message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionPrompt {
    /// Negotiation failed for lack of a common channel. Accepting drops the
    /// station-mode connection and retries; declining ends the attempt.
    FrequencyConflict { id: Uuid, peer: MacAddress },
    /// A peer asked to form a group with us.
    IncomingNegotiation { id: Uuid, peer: MacAddress, wps: WpsMethod },
}

impl DecisionPrompt {
    pub fn id(&self) -> Uuid {
        match self {
            DecisionPrompt::FrequencyConflict { id, .. } => *id,
            DecisionPrompt::IncomingNegotiation { id, .. } => *id,
        }
    }
}

/// Notifications broadcast to subscribed clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum P2pNotification {
    P2pStateChanged { enabled: bool },
    DiscoveryStateChanged { active: bool },
    PeersChanged,
    ConnectionChanged { connected: bool, group: Option<P2pGroup> },
    PersistentGroupsChanged,
    ThisDeviceChanged { name: String },
    DecisionNeeded(DecisionPrompt),
    /// A pin the user must read off this screen and enter on the peer.
    DisplayPin { id: Uuid, pin: String },
    ConnectionResult { id: Uuid, outcome: ConnectionOutcome },
    ServiceDiscoveryResponse { peer: MacAddress, update_indicator: u16, tlvs: Vec<u8> },
}
