//! Client command vocabulary and reply payloads.
//!
//! The command surface is abstracted from any particular IPC mechanism; the
//! host wires it to whatever transport its clients use.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::address::MacAddress;
use crate::group::{GroupConfig, P2pGroup, PersistPolicy};
use crate::peer::PeerDevice;
use crate::service_discovery::ServiceQuery;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanType {
    /// Scan the full channel list.
    Full,
    /// Scan only the social channels (1, 6, 11).
    Social,
    /// Scan a single frequency.
    Frequency(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MiracastMode {
    Disabled,
    Source,
    Sink,
}

/// Wi-Fi Display information element content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WfdInfo {
    pub enabled: bool,
    pub device_info: u16,
    pub control_port: u16,
    pub max_throughput_mbps: u16,
}

impl WfdInfo {
    /// Subelement body layout: device info, control port, throughput,
    /// big-endian, two bytes each.
    pub fn to_bytes(self) -> [u8; 6] {
        let mut out = [0u8; 6];
        out[0..2].copy_from_slice(&self.device_info.to_be_bytes());
        out[2..4].copy_from_slice(&self.control_port.to_be_bytes());
        out[4..6].copy_from_slice(&self.max_throughput_mbps.to_be_bytes());
        out
    }
}

/// How a group should be created by `CreateGroup`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateGroupParams {
    /// Autonomous group on this device.
    Autonomous { persist: PersistPolicy },
    /// Reinvoke a stored persistent group.
    Persistent { network_id: i32 },
    /// Group with explicit credentials.
    WithParams {
        network_name: String,
        passphrase: String,
        persist: PersistPolicy,
        frequency_mhz: u32,
    },
}

/// Commands accepted from clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientCommand {
    Enable,
    Disable,

    DiscoverPeers { scan: ScanType },
    StopDiscovery,

    Connect { config: GroupConfig },
    CancelConnect,
    CreateGroup { params: CreateGroupParams },
    RemoveGroup,

    AddLocalService { info: String },
    RemoveLocalService { info: String },
    AddServiceRequest { query: ServiceQuery },
    RemoveServiceRequest { id: u8 },
    DiscoverServices,

    RequestPeers,
    RequestGroupInfo,
    RequestDeviceInfo,
    RequestConnectionInfo,
    RequestPersistentGroups,
    RequestP2pState,
    RequestDiscoveryState,

    DeletePersistentGroup { network_id: i32 },
    SetChannels { listen: Option<u32>, operating: Option<u32> },
    SetDeviceName { name: String },
    SetWfdInfo { info: WfdInfo },
    SetVendorElements { elements: Vec<u8> },
    SetMiracastMode { mode: MiracastMode },
    StartListen,
    StopListen,
    RemoveClient { address: MacAddress },
    FactoryReset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum P2pStateKind {
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryState {
    Started,
    Stopped,
}

/// Connection summary exposed to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub group_formed: bool,
    pub is_group_owner: bool,
    pub group_owner_address: Option<MacAddress>,
}

/// Replies produced by the service for client commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandReply {
    Ack,
    /// Connect accepted. Carries the connection-event id and, for a Display
    /// setup without a caller-supplied pin, the HAL-generated pin.
    ConnectStarted { id: Uuid, generated_pin: Option<String> },
    Peers(Vec<PeerDevice>),
    GroupInfo(Option<P2pGroup>),
    DeviceInfo(PeerDevice),
    ConnectionInfo(ConnectionInfo),
    PersistentGroups(Vec<P2pGroup>),
    P2pState(P2pStateKind),
    DiscoveryState(DiscoveryState),
    ServiceRequestId(u8),
}
