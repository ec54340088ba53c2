//! Peer device model and the in-memory peer list.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::MacAddress;

/// WSC config method bits advertised by a peer.
pub mod wps_config {
    pub const LABEL: u16 = 0x0004;
    pub const DISPLAY: u16 = 0x0008;
    pub const PUSHBUTTON: u16 = 0x0080;
    pub const KEYPAD: u16 = 0x0100;
}

/// Group capability bit set when a peer is already a group owner.
pub const GROUP_CAPAB_GROUP_OWNER: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerStatus {
    Connected,
    Invited,
    Failed,
    Available,
    Unavailable,
}

/// A nearby P2P device, created or refreshed on device-found events.
///
/// Peers live only for the duration of the interface session; they are purged
/// on teardown and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerDevice {
    pub address: MacAddress,
    pub name: String,
    /// Primary device type string, e.g. `10-0050F204-5`.
    pub primary_type: String,
    pub secondary_type: Option<String>,
    /// WSC config method bitmask, see [`wps_config`].
    pub wps_config_methods: u16,
    pub device_capabilities: u8,
    pub group_capabilities: u8,
    pub status: PeerStatus,
    pub discovered_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl PeerDevice {
    pub fn is_group_owner(&self) -> bool {
        self.group_capabilities & GROUP_CAPAB_GROUP_OWNER != 0
    }

    pub fn supports_wps_method(&self, bit: u16) -> bool {
        self.wps_config_methods & bit != 0
    }
}

/// The peer table owned by the connection state machine's processing context.
/// No interior locking: only the single-consumer loop touches it.
#[derive(Debug, Default)]
pub struct PeerList {
    peers: HashMap<MacAddress, PeerDevice>,
}

impl PeerList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or refreshes a peer, keeping the original discovery timestamp.
    pub fn upsert(&mut self, mut peer: PeerDevice) {
        if let Some(existing) = self.peers.get(&peer.address) {
            peer.discovered_at = existing.discovered_at;
        }
        self.peers.insert(peer.address, peer);
    }

    pub fn remove(&mut self, address: &MacAddress) -> Option<PeerDevice> {
        self.peers.remove(address)
    }

    pub fn get(&self, address: &MacAddress) -> Option<&PeerDevice> {
        self.peers.get(address)
    }

    pub fn set_status(&mut self, address: &MacAddress, status: PeerStatus) {
        if let Some(peer) = self.peers.get_mut(address) {
            peer.status = status;
        }
    }

    /// Drops every peer. Called on interface teardown so stale devices cannot
    /// outlive the session that discovered them.
    pub fn clear(&mut self) {
        self.peers.clear();
    }

    pub fn snapshot(&self) -> Vec<PeerDevice> {
        let mut peers: Vec<_> = self.peers.values().cloned().collect();
        peers.sort_by(|a, b| a.address.cmp(&b.address));
        peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
