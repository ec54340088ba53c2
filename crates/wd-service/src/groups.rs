//! Group/persistence store.
//!
//! Mirrors the supplicant's stored-network list. The list is rebuilt
//! wholesale on load, mutated incrementally on group lifecycle events, and
//! tracks intent optimistically: a failed HAL delete does not roll back the
//! local removal, the next load reconciles.

use tracing::{debug, warn};

use wd_core::address::{decode_ssid, MacAddress};
use wd_core::error::{P2pError, P2pResult};
use wd_core::group::{NetworkId, P2pGroup};
use wd_hal::SupplicantP2pHal;

#[derive(Default)]
pub struct GroupStore {
    groups: Vec<P2pGroup>,
    loaded: bool,
}

impl GroupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the in-memory list from the HAL's network enumeration.
    ///
    /// Entries flagged current are the live/default group, not a saved one,
    /// and are excluded. Corrupt entries (persistent id, no owner) are
    /// skipped rather than surfaced.
    pub fn load(&mut self, hal: &SupplicantP2pHal) -> P2pResult<()> {
        let networks = hal.stored_networks().map_err(P2pError::from)?;
        let mut groups = Vec::with_capacity(networks.len());
        for info in networks {
            if info.is_current {
                continue;
            }
            let owner = if info.bssid == [0u8; 6] {
                None
            } else {
                Some(MacAddress::new(info.bssid))
            };
            let group = P2pGroup {
                network_id: NetworkId::Persistent(info.network_id),
                network_name: decode_ssid(&info.ssid),
                passphrase: None,
                owner,
                is_group_owner: info.is_group_owner,
                interface: None,
                frequency_mhz: None,
                clients: hal.get_client_list(info.network_id).unwrap_or_default(),
            };
            if let Err(err) = group.validate() {
                warn!("skipping corrupt stored network {}: {err}", info.network_id);
                continue;
            }
            groups.push(group);
        }
        self.groups = groups;
        self.loaded = true;
        Ok(())
    }

    pub fn ensure_loaded(&mut self, hal: &SupplicantP2pHal) -> P2pResult<()> {
        if self.loaded {
            return Ok(());
        }
        self.load(hal)
    }

    /// Records a freshly started persistent group unless an equivalent entry
    /// already exists. Returns whether the list changed.
    pub fn add(&mut self, group: P2pGroup) -> bool {
        if !group.network_id.is_persistent() || group.validate().is_err() {
            return false;
        }
        let exists = self.groups.iter().any(|existing| {
            existing.network_id == group.network_id
                || (existing.network_name == group.network_name && existing.owner == group.owner)
        });
        if exists {
            return false;
        }
        self.groups.push(group);
        true
    }

    /// Removes a persistent group locally and issues the HAL delete.
    ///
    /// A rejected delete is not rolled back; the store marks itself stale so
    /// the next load reconciles. A dead transport still propagates.
    pub fn remove(&mut self, hal: &SupplicantP2pHal, network_id: i32) -> P2pResult<()> {
        self.groups.retain(|group| group.network_id != NetworkId::Persistent(network_id));
        match hal.remove_network(network_id) {
            Ok(()) => {
                if let Err(err) = hal.save_config() {
                    debug!("save_config after network removal: {err}");
                }
                Ok(())
            }
            Err(wd_hal::HalError::Disconnected) => Err(P2pError::Disconnected),
            Err(err) => {
                debug!("remove_network({network_id}) failed, local removal stands: {err}");
                self.loaded = false;
                Ok(())
            }
        }
    }

    /// Deletes every stored group. Used by factory reset.
    pub fn remove_all(&mut self, hal: &SupplicantP2pHal) -> P2pResult<()> {
        self.ensure_loaded(hal)?;
        let ids: Vec<i32> = self
            .groups
            .iter()
            .filter_map(|group| match group.network_id {
                NetworkId::Persistent(id) => Some(id),
                NetworkId::Temporary => None,
            })
            .collect();
        for id in ids {
            self.remove(hal, id)?;
        }
        Ok(())
    }

    /// Forgets the cached list without touching the HAL. The next query
    /// reloads from scratch.
    pub fn clear_cache(&mut self) {
        self.groups.clear();
        self.loaded = false;
    }

    pub fn list(&self) -> Vec<P2pGroup> {
        self.groups.clone()
    }
}
