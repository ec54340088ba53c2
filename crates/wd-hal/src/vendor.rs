//! The vendor/supplicant call surface.
//!
//! One trait, implemented once per vendor interface generation and selected
//! at construction time; nothing re-selects an implementation at runtime.
//! Calls are binder-style: they either return promptly or fail fast, and the
//! error type distinguishes a transport fault (the remote side is gone) from
//! a status failure (the remote side said no).

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use wd_core::event::SupplicantEvent;
use wd_core::group::WpsMethod;

/// Opaque handle to a vendor-side P2P interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VendorHandle(pub u64);

/// Status codes a vendor call can report without the transport failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendorStatus {
    FailureUnknown,
    FailureArgsInvalid,
    FailureIfaceInvalid,
    FailureBusy,
    FailureUnsupported,
}

/// Failure of a single vendor call.
#[derive(Debug, Clone, Error)]
pub enum CallError {
    /// The transport to the vendor component died mid-call.
    #[error("vendor transport fault: {0}")]
    Transport(String),
    /// The vendor answered with a failure status. The session is intact.
    #[error("vendor status failure: {0:?}")]
    Status(VendorStatus),
}

/// A stored network entry as enumerated from the vendor side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorNetworkInfo {
    pub network_id: i32,
    pub ssid: Vec<u8>,
    pub bssid: [u8; 6],
    /// Set on the live/default entry, which is not part of the saved list.
    pub is_current: bool,
    pub is_group_owner: bool,
}

/// Callback invoked when the vendor transport dies.
pub type DeathCallback = Arc<dyn Fn() + Send + Sync>;

/// Sink for unsolicited vendor events.
pub type EventSink = Arc<dyn Fn(SupplicantEvent) + Send + Sync>;

/// Raw vendor P2P interface.
///
/// Implementations wrap whatever IPC the platform provides. Every method is
/// expected to return promptly; anything long-running happens on the vendor
/// side and reports back through the event sink.
pub trait VendorP2pIface: Send + Sync {
    fn register_death_callback(&self, callback: DeathCallback) -> Result<(), CallError>;

    fn add_interface(&self, name: &str) -> Result<Option<VendorHandle>, CallError>;
    fn remove_interface(&self, handle: VendorHandle) -> Result<(), CallError>;
    fn register_event_callback(
        &self,
        handle: VendorHandle,
        sink: EventSink,
    ) -> Result<(), CallError>;

    // --- discovery ---
    fn find(&self, handle: VendorHandle, timeout: Duration) -> Result<(), CallError>;
    fn find_on_social_channels(
        &self,
        handle: VendorHandle,
        timeout: Duration,
    ) -> Result<(), CallError>;
    fn find_on_specific_frequency(
        &self,
        handle: VendorHandle,
        frequency_mhz: u32,
        timeout: Duration,
    ) -> Result<(), CallError>;
    fn stop_find(&self, handle: VendorHandle) -> Result<(), CallError>;
    fn flush(&self, handle: VendorHandle) -> Result<(), CallError>;

    // --- connection ---
    /// Returns the generated pin for a Display setup without a caller pin,
    /// empty otherwise.
    #[allow(clippy::too_many_arguments)]
    fn connect(
        &self,
        handle: VendorHandle,
        peer: [u8; 6],
        wps: WpsMethod,
        pin: &str,
        join_existing: bool,
        persistent: bool,
        go_intent: u8,
    ) -> Result<Option<String>, CallError>;
    fn cancel_connect(&self, handle: VendorHandle) -> Result<(), CallError>;
    fn provision_discovery(
        &self,
        handle: VendorHandle,
        peer: [u8; 6],
        wps: WpsMethod,
    ) -> Result<(), CallError>;
    fn invite(
        &self,
        handle: VendorHandle,
        group_iface: &str,
        go_address: [u8; 6],
        peer: [u8; 6],
    ) -> Result<(), CallError>;
    fn reject(&self, handle: VendorHandle, peer: [u8; 6]) -> Result<(), CallError>;
    fn get_group_capability(&self, handle: VendorHandle, peer: [u8; 6]) -> Result<u32, CallError>;

    // --- groups ---
    fn group_add(
        &self,
        handle: VendorHandle,
        persistent: bool,
        network_id: Option<i32>,
    ) -> Result<(), CallError>;
    #[allow(clippy::too_many_arguments)]
    fn group_add_with_config(
        &self,
        handle: VendorHandle,
        ssid: &[u8],
        passphrase: &str,
        persistent: bool,
        frequency_mhz: u32,
        peer: Option<[u8; 6]>,
        join_existing: bool,
    ) -> Result<(), CallError>;
    fn group_remove(&self, handle: VendorHandle, group_iface: &str) -> Result<(), CallError>;

    // --- listen / channels ---
    fn configure_ext_listen(
        &self,
        handle: VendorHandle,
        period_ms: u32,
        interval_ms: u32,
    ) -> Result<(), CallError>;
    fn set_listen_channel(
        &self,
        handle: VendorHandle,
        channel: u32,
        operating_class: u32,
    ) -> Result<(), CallError>;
    fn set_disallowed_frequencies(
        &self,
        handle: VendorHandle,
        ranges: &[(u32, u32)],
    ) -> Result<(), CallError>;

    // --- services ---
    fn flush_services(&self, handle: VendorHandle) -> Result<(), CallError>;
    fn add_upnp_service(
        &self,
        handle: VendorHandle,
        version: u8,
        service_name: &str,
    ) -> Result<(), CallError>;
    fn remove_upnp_service(
        &self,
        handle: VendorHandle,
        version: u8,
        service_name: &str,
    ) -> Result<(), CallError>;
    fn add_bonjour_service(
        &self,
        handle: VendorHandle,
        query: &[u8],
        response: &[u8],
    ) -> Result<(), CallError>;
    fn remove_bonjour_service(&self, handle: VendorHandle, query: &[u8]) -> Result<(), CallError>;
    fn request_service_discovery(
        &self,
        handle: VendorHandle,
        peer: Option<[u8; 6]>,
        query: &[u8],
    ) -> Result<Option<u64>, CallError>;
    fn cancel_service_discovery(&self, handle: VendorHandle, id: u64) -> Result<(), CallError>;

    // --- WPS ---
    fn start_wps_pbc(
        &self,
        handle: VendorHandle,
        group_iface: &str,
        bssid: Option<[u8; 6]>,
    ) -> Result<(), CallError>;
    fn start_wps_pin_keypad(
        &self,
        handle: VendorHandle,
        group_iface: &str,
        pin: &str,
    ) -> Result<(), CallError>;
    fn start_wps_pin_display(
        &self,
        handle: VendorHandle,
        group_iface: &str,
        bssid: Option<[u8; 6]>,
    ) -> Result<Option<String>, CallError>;
    fn cancel_wps(&self, handle: VendorHandle, group_iface: &str) -> Result<(), CallError>;

    // --- device / misc ---
    fn set_device_name(&self, handle: VendorHandle, name: &str) -> Result<(), CallError>;
    fn set_ssid_postfix(&self, handle: VendorHandle, postfix: &str) -> Result<(), CallError>;
    fn set_miracast_mode(&self, handle: VendorHandle, mode: u8) -> Result<(), CallError>;
    fn enable_wfd(&self, handle: VendorHandle, enable: bool) -> Result<(), CallError>;
    fn set_wfd_device_info(&self, handle: VendorHandle, info: &[u8]) -> Result<(), CallError>;
    fn set_vendor_elements(&self, handle: VendorHandle, elements: &[u8]) -> Result<(), CallError>;
    fn set_mac_randomization(&self, handle: VendorHandle, enable: bool) -> Result<(), CallError>;
    fn get_device_address(&self, handle: VendorHandle) -> Result<Option<[u8; 6]>, CallError>;
    fn get_ssid(&self, handle: VendorHandle, peer: [u8; 6]) -> Result<Option<Vec<u8>>, CallError>;

    // --- stored networks ---
    fn list_networks(&self, handle: VendorHandle) -> Result<Vec<i32>, CallError>;
    fn get_network(
        &self,
        handle: VendorHandle,
        network_id: i32,
    ) -> Result<Option<VendorNetworkInfo>, CallError>;
    fn remove_network(&self, handle: VendorHandle, network_id: i32) -> Result<(), CallError>;
    fn remove_client(&self, handle: VendorHandle, peer: [u8; 6]) -> Result<(), CallError>;
    fn set_client_list(
        &self,
        handle: VendorHandle,
        network_id: i32,
        clients: &[[u8; 6]],
    ) -> Result<(), CallError>;
    fn get_client_list(
        &self,
        handle: VendorHandle,
        network_id: i32,
    ) -> Result<Vec<[u8; 6]>, CallError>;
    fn save_config(&self, handle: VendorHandle) -> Result<(), CallError>;
}
