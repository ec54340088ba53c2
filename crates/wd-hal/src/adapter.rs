//! Supplicant HAL adapter.
//!
//! Owns the single open session toward the vendor P2P interface and converts
//! vendor-level faults into the small error taxonomy the rest of the service
//! works with. The core contract lives in [`SupplicantP2pHal::with_iface`]:
//! a transport fault marks the session dead and surfaces as `Disconnected`
//! (terminal until a fresh `initialize`); a status failure surfaces as
//! `Rejected` and leaves the session alive.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, error, warn};
use thiserror::Error;

use wd_core::address::MacAddress;
use wd_core::channel::{channel_to_frequency_mhz, pin_frequency_ranges, OPERATING_CLASS_2_4_GHZ};
use wd_core::command::{MiracastMode, ScanType};
use wd_core::error::P2pError;
use wd_core::group::{GroupConfig, WpsMethod};

use crate::vendor::{
    CallError, EventSink, VendorHandle, VendorNetworkInfo, VendorP2pIface, VendorStatus,
};

/// Failures reported by the adapter.
#[derive(Debug, Clone, Error)]
pub enum HalError {
    /// The vendor service cannot be reached at all; no session was created.
    #[error("vendor service unavailable")]
    Unavailable,
    /// A P2P interface is already active; there is never more than one.
    #[error("p2p interface already exists")]
    AlreadyExists,
    /// No interface is set up for this session.
    #[error("no p2p interface")]
    NoInterface,
    /// The call succeeded at the transport level but returned no handle.
    #[error("vendor returned a null interface")]
    NullResult,
    /// Transport-level fault during session setup.
    #[error("vendor transport failure: {0}")]
    RemoteFailure(String),
    /// The session is dead. Only `initialize` can recover.
    #[error("supplicant session disconnected")]
    Disconnected,
    /// The vendor reported a status failure; the session stays alive.
    #[error("rejected by vendor: {0:?}")]
    Rejected(VendorStatus),
    /// Local validation failure; the vendor was never called.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<HalError> for P2pError {
    fn from(err: HalError) -> Self {
        match err {
            HalError::Disconnected | HalError::Unavailable | HalError::RemoteFailure(_) => {
                P2pError::Disconnected
            }
            HalError::Rejected(status) => P2pError::Rejected(format!("{status:?}")),
            HalError::NullResult => P2pError::Rejected("null result from vendor".to_string()),
            HalError::InvalidArgument(msg) => P2pError::InvalidArgument(msg),
            HalError::AlreadyExists => P2pError::busy("p2p interface already exists"),
            HalError::NoInterface => P2pError::busy("p2p interface is down"),
        }
    }
}

/// Session lifecycle:
/// `Uninitialized -> Initialized -> InterfaceUp -> (InterfaceDown | Disconnected)`.
/// `Disconnected` is terminal until the next `initialize`.
#[derive(Debug, Clone)]
enum SessionState {
    Uninitialized,
    Initialized,
    InterfaceUp { name: String, handle: VendorHandle },
    InterfaceDown,
    Disconnected,
}

/// The HAL adapter. All mutability is the session slot; the vendor object
/// itself is stateless from this side.
pub struct SupplicantP2pHal {
    vendor: Arc<dyn VendorP2pIface>,
    session: Arc<Mutex<SessionState>>,
}

impl SupplicantP2pHal {
    /// Wraps a vendor interface implementation. The implementation is chosen
    /// once, here; there is no runtime re-selection.
    pub fn new(vendor: Arc<dyn VendorP2pIface>) -> Self {
        SupplicantP2pHal { vendor, session: Arc::new(Mutex::new(SessionState::Uninitialized)) }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        // Poisoning cannot leave the slot in a torn state; recover the value.
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Opens the session and registers the death observer atomically with its
    /// creation. On death the session flips to `Disconnected` before the
    /// caller's callback runs, so no call can race past a dead transport.
    pub fn initialize(&self, on_death: impl Fn() + Send + Sync + 'static) -> Result<(), HalError> {
        let mut session = self.lock();
        if matches!(&*session, SessionState::Initialized | SessionState::InterfaceUp { .. } | SessionState::InterfaceDown)
        {
            return Err(HalError::AlreadyExists);
        }

        let slot = Arc::clone(&self.session);
        let death: crate::vendor::DeathCallback = Arc::new(move || {
            let mut session = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            *session = SessionState::Disconnected;
            drop(session);
            on_death();
        });

        if let Err(err) = self.vendor.register_death_callback(death) {
            warn!("failed to reach vendor service: {err}");
            *session = SessionState::Uninitialized;
            return Err(HalError::Unavailable);
        }
        *session = SessionState::Initialized;
        Ok(())
    }

    /// Whether the session is open and usable. Flips to `false` on any
    /// transport fault and stays there until `initialize` is called again.
    pub fn is_initialization_complete(&self) -> bool {
        matches!(
            &*self.lock(),
            SessionState::Initialized | SessionState::InterfaceUp { .. } | SessionState::InterfaceDown
        )
    }

    /// Brings the P2P interface up and wires unsolicited events into `sink`.
    ///
    /// Refuses with `AlreadyExists` before any vendor call when an interface
    /// is already active.
    pub fn setup_interface(&self, name: &str, sink: EventSink) -> Result<(), HalError> {
        {
            let session = self.lock();
            match &*session {
                SessionState::InterfaceUp { .. } => return Err(HalError::AlreadyExists),
                SessionState::Disconnected => return Err(HalError::Disconnected),
                SessionState::Uninitialized => return Err(HalError::NoInterface),
                SessionState::Initialized | SessionState::InterfaceDown => {}
            }
        }

        let handle = match self.vendor.add_interface(name) {
            Ok(Some(handle)) => handle,
            Ok(None) => {
                // Setup failure, not a crash: the vendor answered but gave us
                // nothing to bind.
                warn!("add_interface({name}) returned no handle");
                return Err(HalError::NullResult);
            }
            Err(CallError::Transport(msg)) => {
                *self.lock() = SessionState::Disconnected;
                return Err(HalError::RemoteFailure(msg));
            }
            Err(CallError::Status(status)) => return Err(HalError::Rejected(status)),
        };

        match self.vendor.register_event_callback(handle, sink) {
            Ok(()) => {}
            Err(CallError::Transport(msg)) => {
                *self.lock() = SessionState::Disconnected;
                return Err(HalError::RemoteFailure(msg));
            }
            Err(CallError::Status(status)) => return Err(HalError::Rejected(status)),
        }

        *self.lock() = SessionState::InterfaceUp { name: name.to_string(), handle };
        debug!("p2p interface {name} is up");
        Ok(())
    }

    /// Tears the interface down. No-op-safe: returns `false` without
    /// contacting the vendor when `name` was never set up.
    pub fn teardown_interface(&self, name: &str) -> bool {
        let handle = {
            let session = self.lock();
            match &*session {
                SessionState::InterfaceUp { name: active, handle } if active == name => *handle,
                _ => return false,
            }
        };
        match self.vendor.remove_interface(handle) {
            Ok(()) => *self.lock() = SessionState::InterfaceDown,
            Err(CallError::Transport(msg)) => {
                error!("remove_interface transport fault: {msg}");
                *self.lock() = SessionState::Disconnected;
            }
            Err(CallError::Status(status)) => {
                // The interface is gone as far as this session is concerned.
                debug!("remove_interface rejected: {status:?}");
                *self.lock() = SessionState::InterfaceDown;
            }
        }
        true
    }

    pub fn interface_name(&self) -> Option<String> {
        match &*self.lock() {
            SessionState::InterfaceUp { name, .. } => Some(name.clone()),
            _ => None,
        }
    }

    /// The invoke wrapper every operation goes through.
    fn with_iface<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&dyn VendorP2pIface, VendorHandle) -> Result<T, CallError>,
    ) -> Result<T, HalError> {
        let handle = {
            let session = self.lock();
            match &*session {
                SessionState::InterfaceUp { handle, .. } => *handle,
                SessionState::Disconnected => return Err(HalError::Disconnected),
                _ => return Err(HalError::NoInterface),
            }
        };
        match f(self.vendor.as_ref(), handle) {
            Ok(value) => Ok(value),
            Err(CallError::Transport(msg)) => {
                error!("{op}: vendor transport fault: {msg}");
                *self.lock() = SessionState::Disconnected;
                Err(HalError::Disconnected)
            }
            Err(CallError::Status(status)) => {
                debug!("{op}: rejected with {status:?}");
                Err(HalError::Rejected(status))
            }
        }
    }

    // ---------------- discovery ----------------

    pub fn find(&self, scan: ScanType, timeout: Duration) -> Result<(), HalError> {
        self.with_iface("find", |vendor, handle| match scan {
            ScanType::Full => vendor.find(handle, timeout),
            ScanType::Social => vendor.find_on_social_channels(handle, timeout),
            ScanType::Frequency(freq) => {
                vendor.find_on_specific_frequency(handle, freq, timeout)
            }
        })
    }

    pub fn stop_find(&self) -> Result<(), HalError> {
        self.with_iface("stop_find", |vendor, handle| vendor.stop_find(handle))
    }

    pub fn flush(&self) -> Result<(), HalError> {
        self.with_iface("flush", |vendor, handle| vendor.flush(handle))
    }

    // ---------------- connection ----------------

    /// Issues a connect. Returns the generated pin for a Display setup with
    /// no caller-supplied pin, `None` otherwise.
    pub fn connect(&self, config: &GroupConfig, go_intent: u8) -> Result<Option<String>, HalError> {
        config
            .validate()
            .map_err(|err| HalError::InvalidArgument(err.to_string()))?;
        let pin = config.pin.clone().unwrap_or_default();
        let persistent = matches!(config.persist, wd_core::group::PersistPolicy::Persistent);
        let peer = config.peer_address.octets();
        let wps = config.wps;
        let join = config.join_existing;
        let generated = self.with_iface("connect", move |vendor, handle| {
            vendor.connect(handle, peer, wps, &pin, join, persistent, go_intent)
        })?;
        Ok(generated.filter(|pin| !pin.is_empty()))
    }

    pub fn cancel_connect(&self) -> Result<(), HalError> {
        self.with_iface("cancel_connect", |vendor, handle| vendor.cancel_connect(handle))
    }

    pub fn provision_discovery(&self, peer: MacAddress, wps: WpsMethod) -> Result<(), HalError> {
        if wps == WpsMethod::None {
            return Err(HalError::InvalidArgument(
                "provision discovery needs a wps method".to_string(),
            ));
        }
        self.with_iface("provision_discovery", move |vendor, handle| {
            vendor.provision_discovery(handle, peer.octets(), wps)
        })
    }

    pub fn invite(
        &self,
        group_iface: &str,
        go_address: MacAddress,
        peer: MacAddress,
    ) -> Result<(), HalError> {
        if group_iface.is_empty() {
            return Err(HalError::InvalidArgument("empty group interface".to_string()));
        }
        self.with_iface("invite", move |vendor, handle| {
            vendor.invite(handle, group_iface, go_address.octets(), peer.octets())
        })
    }

    pub fn reject(&self, peer: MacAddress) -> Result<(), HalError> {
        self.with_iface("reject", move |vendor, handle| vendor.reject(handle, peer.octets()))
    }

    pub fn get_group_capability(&self, peer: MacAddress) -> Result<u32, HalError> {
        self.with_iface("get_group_capability", move |vendor, handle| {
            vendor.get_group_capability(handle, peer.octets())
        })
    }

    // ---------------- groups ----------------

    pub fn group_add(&self, persistent: bool, network_id: Option<i32>) -> Result<(), HalError> {
        self.with_iface("group_add", move |vendor, handle| {
            vendor.group_add(handle, persistent, network_id)
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn group_add_with_config(
        &self,
        ssid: &[u8],
        passphrase: &str,
        persistent: bool,
        frequency_mhz: u32,
        peer: Option<MacAddress>,
        join_existing: bool,
    ) -> Result<(), HalError> {
        if ssid.is_empty() || ssid.len() > 32 {
            return Err(HalError::InvalidArgument(format!(
                "ssid must be 1..=32 bytes, got {}",
                ssid.len()
            )));
        }
        if passphrase.len() < 8 || passphrase.len() > 63 {
            return Err(HalError::InvalidArgument(
                "passphrase must be 8..=63 characters".to_string(),
            ));
        }
        self.with_iface("group_add_with_config", move |vendor, handle| {
            vendor.group_add_with_config(
                handle,
                ssid,
                passphrase,
                persistent,
                frequency_mhz,
                peer.map(|p| p.octets()),
                join_existing,
            )
        })
    }

    pub fn group_remove(&self, group_iface: &str) -> Result<(), HalError> {
        self.with_iface("group_remove", move |vendor, handle| {
            vendor.group_remove(handle, group_iface)
        })
    }

    // ---------------- listen / channels ----------------

    pub fn configure_ext_listen(&self, period_ms: u32, interval_ms: u32) -> Result<(), HalError> {
        if period_ms > interval_ms && interval_ms != 0 {
            return Err(HalError::InvalidArgument(
                "listen period exceeds interval".to_string(),
            ));
        }
        self.with_iface("configure_ext_listen", move |vendor, handle| {
            vendor.configure_ext_listen(handle, period_ms, interval_ms)
        })
    }

    pub fn set_listen_channel(&self, channel: u32) -> Result<(), HalError> {
        // Listen channel lives on the social band.
        if !matches!(channel, 1 | 6 | 11) {
            return Err(HalError::InvalidArgument(format!(
                "listen channel must be social (1/6/11), got {channel}"
            )));
        }
        self.with_iface("set_listen_channel", move |vendor, handle| {
            vendor.set_listen_channel(handle, channel, OPERATING_CLASS_2_4_GHZ)
        })
    }

    /// Pins the operating channel by disallowing every other frequency.
    pub fn set_operating_channel(&self, channel: u32) -> Result<(), HalError> {
        let freq = channel_to_frequency_mhz(channel)
            .map_err(|err| HalError::InvalidArgument(err.to_string()))?;
        let ranges = pin_frequency_ranges(freq);
        self.with_iface("set_operating_channel", move |vendor, handle| {
            vendor.set_disallowed_frequencies(handle, &ranges)
        })
    }

    pub fn clear_disallowed_frequencies(&self) -> Result<(), HalError> {
        self.with_iface("clear_disallowed_frequencies", |vendor, handle| {
            vendor.set_disallowed_frequencies(handle, &[])
        })
    }

    // ---------------- services ----------------

    pub fn flush_services(&self) -> Result<(), HalError> {
        self.with_iface("flush_services", |vendor, handle| vendor.flush_services(handle))
    }

    pub fn add_upnp_service(&self, version: u8, service_name: &str) -> Result<(), HalError> {
        if service_name.is_empty() {
            return Err(HalError::InvalidArgument("empty upnp service name".to_string()));
        }
        self.with_iface("add_upnp_service", move |vendor, handle| {
            vendor.add_upnp_service(handle, version, service_name)
        })
    }

    pub fn remove_upnp_service(&self, version: u8, service_name: &str) -> Result<(), HalError> {
        if service_name.is_empty() {
            return Err(HalError::InvalidArgument("empty upnp service name".to_string()));
        }
        self.with_iface("remove_upnp_service", move |vendor, handle| {
            vendor.remove_upnp_service(handle, version, service_name)
        })
    }

    pub fn add_bonjour_service(&self, query: &[u8], response: &[u8]) -> Result<(), HalError> {
        if query.is_empty() || response.is_empty() {
            return Err(HalError::InvalidArgument("empty bonjour payload".to_string()));
        }
        self.with_iface("add_bonjour_service", move |vendor, handle| {
            vendor.add_bonjour_service(handle, query, response)
        })
    }

    pub fn remove_bonjour_service(&self, query: &[u8]) -> Result<(), HalError> {
        if query.is_empty() {
            return Err(HalError::InvalidArgument("empty bonjour query".to_string()));
        }
        self.with_iface("remove_bonjour_service", move |vendor, handle| {
            vendor.remove_bonjour_service(handle, query)
        })
    }

    /// Issues a remote service-discovery request. "No result" on any failure;
    /// the caller treats absence as a failed request, never a crash.
    pub fn request_service_discovery(
        &self,
        peer: Option<MacAddress>,
        query: &[u8],
    ) -> Option<u64> {
        if query.is_empty() {
            warn!("request_service_discovery: empty query");
            return None;
        }
        match self.with_iface("request_service_discovery", move |vendor, handle| {
            vendor.request_service_discovery(handle, peer.map(|p| p.octets()), query)
        }) {
            Ok(id) => id,
            Err(err) => {
                debug!("request_service_discovery failed: {err}");
                None
            }
        }
    }

    pub fn cancel_service_discovery(&self, id: u64) -> Result<(), HalError> {
        self.with_iface("cancel_service_discovery", move |vendor, handle| {
            vendor.cancel_service_discovery(handle, id)
        })
    }

    // ---------------- WPS ----------------

    pub fn start_wps_pbc(
        &self,
        group_iface: &str,
        bssid: Option<MacAddress>,
    ) -> Result<(), HalError> {
        self.with_iface("start_wps_pbc", move |vendor, handle| {
            vendor.start_wps_pbc(handle, group_iface, bssid.map(|b| b.octets()))
        })
    }

    pub fn start_wps_pin_keypad(&self, group_iface: &str, pin: &str) -> Result<(), HalError> {
        if pin.is_empty() {
            return Err(HalError::InvalidArgument("keypad wps requires a pin".to_string()));
        }
        self.with_iface("start_wps_pin_keypad", move |vendor, handle| {
            vendor.start_wps_pin_keypad(handle, group_iface, pin)
        })
    }

    /// Starts display-mode WPS. "No result" on failure.
    pub fn start_wps_pin_display(
        &self,
        group_iface: &str,
        bssid: Option<MacAddress>,
    ) -> Option<String> {
        match self.with_iface("start_wps_pin_display", move |vendor, handle| {
            vendor.start_wps_pin_display(handle, group_iface, bssid.map(|b| b.octets()))
        }) {
            Ok(pin) => pin.filter(|pin| !pin.is_empty()),
            Err(err) => {
                debug!("start_wps_pin_display failed: {err}");
                None
            }
        }
    }

    pub fn cancel_wps(&self, group_iface: &str) -> Result<(), HalError> {
        self.with_iface("cancel_wps", move |vendor, handle| {
            vendor.cancel_wps(handle, group_iface)
        })
    }

    // ---------------- device / misc ----------------

    pub fn set_device_name(&self, name: &str) -> Result<(), HalError> {
        if name.is_empty() || name.len() > 32 {
            return Err(HalError::InvalidArgument(format!(
                "device name must be 1..=32 bytes, got {}",
                name.len()
            )));
        }
        self.with_iface("set_device_name", move |vendor, handle| {
            vendor.set_device_name(handle, name)
        })
    }

    pub fn set_ssid_postfix(&self, postfix: &str) -> Result<(), HalError> {
        self.with_iface("set_ssid_postfix", move |vendor, handle| {
            vendor.set_ssid_postfix(handle, postfix)
        })
    }

    pub fn set_miracast_mode(&self, mode: MiracastMode) -> Result<(), HalError> {
        let raw = match mode {
            MiracastMode::Disabled => 0,
            MiracastMode::Source => 1,
            MiracastMode::Sink => 2,
        };
        self.with_iface("set_miracast_mode", move |vendor, handle| {
            vendor.set_miracast_mode(handle, raw)
        })
    }

    pub fn enable_wfd(&self, enable: bool) -> Result<(), HalError> {
        self.with_iface("enable_wfd", move |vendor, handle| vendor.enable_wfd(handle, enable))
    }

    pub fn set_wfd_device_info(&self, info: &[u8]) -> Result<(), HalError> {
        if info.len() != 6 {
            return Err(HalError::InvalidArgument(format!(
                "wfd device info must be 6 bytes, got {}",
                info.len()
            )));
        }
        self.with_iface("set_wfd_device_info", move |vendor, handle| {
            vendor.set_wfd_device_info(handle, info)
        })
    }

    pub fn set_vendor_elements(&self, elements: &[u8]) -> Result<(), HalError> {
        if elements.len() > 512 {
            return Err(HalError::InvalidArgument(
                "vendor elements exceed 512 bytes".to_string(),
            ));
        }
        self.with_iface("set_vendor_elements", move |vendor, handle| {
            vendor.set_vendor_elements(handle, elements)
        })
    }

    pub fn set_mac_randomization(&self, enable: bool) -> Result<(), HalError> {
        self.with_iface("set_mac_randomization", move |vendor, handle| {
            vendor.set_mac_randomization(handle, enable)
        })
    }

    /// This device's MAC. "No result" on failure.
    pub fn get_device_address(&self) -> Option<MacAddress> {
        match self.with_iface("get_device_address", |vendor, handle| {
            vendor.get_device_address(handle)
        }) {
            Ok(Some(octets)) => Some(MacAddress::new(octets)),
            Ok(None) => None,
            Err(err) => {
                debug!("get_device_address failed: {err}");
                None
            }
        }
    }

    /// SSID of the group a peer belongs to. "No result" on failure.
    pub fn get_ssid(&self, peer: MacAddress) -> Option<String> {
        match self.with_iface("get_ssid", move |vendor, handle| {
            vendor.get_ssid(handle, peer.octets())
        }) {
            Ok(Some(raw)) if !raw.is_empty() => Some(wd_core::address::decode_ssid(&raw)),
            Ok(_) => None,
            Err(err) => {
                debug!("get_ssid failed: {err}");
                None
            }
        }
    }

    // ---------------- stored networks ----------------

    /// Enumerates the vendor's stored networks, skipping entries that vanish
    /// between list and get.
    pub fn stored_networks(&self) -> Result<Vec<VendorNetworkInfo>, HalError> {
        let ids = self.with_iface("list_networks", |vendor, handle| vendor.list_networks(handle))?;
        let mut networks = Vec::with_capacity(ids.len());
        for id in ids {
            match self.with_iface("get_network", move |vendor, handle| {
                vendor.get_network(handle, id)
            }) {
                Ok(Some(info)) => networks.push(info),
                Ok(None) => debug!("network {id} disappeared during enumeration"),
                Err(HalError::Rejected(status)) => {
                    debug!("get_network({id}) rejected: {status:?}")
                }
                Err(err) => return Err(err),
            }
        }
        Ok(networks)
    }

    pub fn remove_network(&self, network_id: i32) -> Result<(), HalError> {
        self.with_iface("remove_network", move |vendor, handle| {
            vendor.remove_network(handle, network_id)
        })
    }

    pub fn remove_client(&self, peer: MacAddress) -> Result<(), HalError> {
        self.with_iface("remove_client", move |vendor, handle| {
            vendor.remove_client(handle, peer.octets())
        })
    }

    pub fn set_client_list(
        &self,
        network_id: i32,
        clients: &[MacAddress],
    ) -> Result<(), HalError> {
        let octets: Vec<[u8; 6]> = clients.iter().map(|c| c.octets()).collect();
        self.with_iface("set_client_list", move |vendor, handle| {
            vendor.set_client_list(handle, network_id, &octets)
        })
    }

    pub fn get_client_list(&self, network_id: i32) -> Option<Vec<MacAddress>> {
        match self.with_iface("get_client_list", move |vendor, handle| {
            vendor.get_client_list(handle, network_id)
        }) {
            Ok(clients) => Some(clients.into_iter().map(MacAddress::new).collect()),
            Err(err) => {
                debug!("get_client_list({network_id}) failed: {err}");
                None
            }
        }
    }

    pub fn save_config(&self) -> Result<(), HalError> {
        self.with_iface("save_config", |vendor, handle| vendor.save_config(handle))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testkit::FakeVendor;
    use wd_core::group::{GroupOwnerIntent, PersistPolicy};

    fn sink() -> EventSink {
        Arc::new(|_event| {})
    }

    fn ready_hal(fake: &Arc<FakeVendor>) -> SupplicantP2pHal {
        let hal = SupplicantP2pHal::new(Arc::clone(fake) as Arc<dyn VendorP2pIface>);
        hal.initialize(|| {}).unwrap();
        hal.setup_interface("p2p0", sink()).unwrap();
        hal
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

    #[test]
    fn setup_twice_fails_before_reaching_the_vendor() {
        let fake = Arc::new(FakeVendor::new());
        let hal = ready_hal(&fake);
        assert_eq!(fake.call_count("add_interface"), 1);

        let err = hal.setup_interface("p2p0", sink()).unwrap_err();
        assert!(matches!(err, HalError::AlreadyExists));
        // The vendor saw no second add_interface call.
        assert_eq!(fake.call_count("add_interface"), 1);
    }

    #[test]
    fn teardown_unknown_interface_is_a_silent_no_op() {
        let fake = Arc::new(FakeVendor::new());
        let hal = SupplicantP2pHal::new(Arc::clone(&fake) as Arc<dyn VendorP2pIface>);
        hal.initialize(|| {}).unwrap();
        assert!(!hal.teardown_interface("p2p0"));
        assert_eq!(fake.call_count("remove_interface"), 0);
    }

    #[test]
    fn null_interface_result_is_a_setup_failure_not_a_crash() {
        let fake = Arc::new(FakeVendor::new());
        fake.return_null_interface();
        let hal = SupplicantP2pHal::new(Arc::clone(&fake) as Arc<dyn VendorP2pIface>);
        hal.initialize(|| {}).unwrap();
        let err = hal.setup_interface("p2p0", sink()).unwrap_err();
        assert!(matches!(err, HalError::NullResult));
        // Session is still alive; setup can be retried.
        assert!(hal.is_initialization_complete());
    }

    #[test]
    fn transport_fault_marks_session_dead_and_stops_calling_the_vendor() {
        let fake = Arc::new(FakeVendor::new());
        let hal = ready_hal(&fake);

        fake.fail_next("stop_find", CallError::Transport("binder died".to_string()));
        let err = hal.stop_find().unwrap_err();
        assert!(matches!(err, HalError::Disconnected));
        assert!(!hal.is_initialization_complete());

        // Every subsequent operation short-circuits without a vendor call.
        let before = fake.call_count("find");
        assert!(matches!(
            hal.find(ScanType::Full, Duration::from_secs(120)),
            Err(HalError::Disconnected)
        ));
        assert_eq!(fake.call_count("find"), before);
        assert!(hal.get_device_address().is_none());
        assert!(hal.start_wps_pin_display("p2p0", None).is_none());
        assert!(hal.request_service_discovery(None, &[0x01]).is_none());
    }

    #[test]
    fn status_failure_is_rejected_and_keeps_the_session() {
        let fake = Arc::new(FakeVendor::new());
        let hal = ready_hal(&fake);

        fake.fail_next("find", CallError::Status(VendorStatus::FailureBusy));
        let err = hal.find(ScanType::Social, Duration::from_secs(10)).unwrap_err();
        assert!(matches!(err, HalError::Rejected(VendorStatus::FailureBusy)));
        assert!(hal.is_initialization_complete());

        // Retry goes straight through.
        hal.find(ScanType::Social, Duration::from_secs(10)).unwrap();
    }

    #[test]
    fn death_callback_kills_the_session() {
        let fake = Arc::new(FakeVendor::new());
        let hal = ready_hal(&fake);
        assert!(hal.is_initialization_complete());
        fake.die();
        assert!(!hal.is_initialization_complete());
        assert!(matches!(hal.stop_find(), Err(HalError::Disconnected)));
    }

    #[test]
    fn reinitialize_recovers_after_disconnect() {
        let fake = Arc::new(FakeVendor::new());
        let hal = ready_hal(&fake);
        fake.die();
        fake.revive();
        hal.initialize(|| {}).unwrap();
        hal.setup_interface("p2p0", sink()).unwrap();
        hal.stop_find().unwrap();
    }

    #[test]
    fn connect_returns_generated_pin_for_display() {
        let fake = Arc::new(FakeVendor::new());
        fake.set_generated_pin("71830984");
        let hal = ready_hal(&fake);

        let mut config = pbc_config("aa:bb:cc:dd:ee:ff");
        config.wps = WpsMethod::Display;
        let pin = hal.connect(&config, 6).unwrap();
        assert_eq!(pin.as_deref(), Some("71830984"));

        // Caller-supplied pin passes through, nothing is generated.
        config.pin = Some("12345670".to_string());
        let pin = hal.connect(&config, 6).unwrap();
        assert_eq!(pin, None);
    }

    #[test]
    fn connect_validates_wps_pin_rules_before_the_vendor() {
        let fake = Arc::new(FakeVendor::new());
        let hal = ready_hal(&fake);

        let mut config = pbc_config("aa:bb:cc:dd:ee:ff");
        config.pin = Some("12345670".to_string());
        assert!(matches!(hal.connect(&config, 6), Err(HalError::InvalidArgument(_))));

        let mut keypad = pbc_config("aa:bb:cc:dd:ee:ff");
        keypad.wps = WpsMethod::Keypad;
        assert!(matches!(hal.connect(&keypad, 6), Err(HalError::InvalidArgument(_))));

        assert_eq!(fake.call_count("connect"), 0);
    }

    #[test]
    fn byte_payload_setters_validate_length_locally() {
        let fake = Arc::new(FakeVendor::new());
        let hal = ready_hal(&fake);

        assert!(matches!(
            hal.set_wfd_device_info(&[0, 1, 2, 3, 4]),
            Err(HalError::InvalidArgument(_))
        ));
        assert!(matches!(
            hal.set_wfd_device_info(&[0, 1, 2, 3, 4, 5, 6]),
            Err(HalError::InvalidArgument(_))
        ));
        assert!(matches!(hal.set_wfd_device_info(&[]), Err(HalError::InvalidArgument(_))));
        assert_eq!(fake.call_count("set_wfd_device_info"), 0);

        hal.set_wfd_device_info(&[0, 1, 2, 3, 4, 5]).unwrap();
        assert_eq!(fake.call_count("set_wfd_device_info"), 1);
    }

    #[test]
    fn no_result_getters_return_values_when_alive() {
        let fake = Arc::new(FakeVendor::new());
        fake.set_device_address([0x02, 0x1a, 0x11, 0xf0, 0x45, 0x9b]);
        fake.set_ssid_for([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff], b"DIRECT-go".to_vec());
        let hal = ready_hal(&fake);

        assert_eq!(
            hal.get_device_address(),
            Some("02:1a:11:f0:45:9b".parse().unwrap())
        );
        let peer: MacAddress = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        assert_eq!(hal.get_ssid(peer).as_deref(), Some("DIRECT-go"));
        // Unknown peer: absence of a result, not an error.
        let unknown: MacAddress = "aa:bb:cc:dd:ee:00".parse().unwrap();
        assert_eq!(hal.get_ssid(unknown), None);
    }

    #[test]
    fn stored_networks_come_back_typed() {
        let fake = Arc::new(FakeVendor::new());
        fake.set_networks(vec![
            VendorNetworkInfo {
                network_id: 0,
                ssid: b"DIRECT-aa".to_vec(),
                bssid: [0x02, 0x11, 0x22, 0x33, 0x44, 0x55],
                is_current: true,
                is_group_owner: true,
            },
            VendorNetworkInfo {
                network_id: 1,
                ssid: b"DIRECT-bb".to_vec(),
                bssid: [0x02, 0x11, 0x22, 0x33, 0x44, 0x66],
                is_current: false,
                is_group_owner: false,
            },
        ]);
        let hal = ready_hal(&fake);
        let networks = hal.stored_networks().unwrap();
        assert_eq!(networks.len(), 2);
        assert_eq!(networks[1].network_id, 1);
    }
}
