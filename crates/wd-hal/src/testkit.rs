//! Scripted fake vendor for tests.
//!
//! Records every call by name, can be told to fail the next occurrence of an
//! operation, and lets tests inject unsolicited events and transport death.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use wd_core::event::SupplicantEvent;
use wd_core::group::WpsMethod;

use crate::vendor::{
    CallError, DeathCallback, EventSink, VendorHandle, VendorNetworkInfo, VendorP2pIface,
};

#[derive(Default)]
struct FakeInner {
    calls: Vec<String>,
    fail_next: HashMap<String, CallError>,
    dead: bool,
    null_interface: bool,
    death_callback: Option<DeathCallback>,
    event_sink: Option<EventSink>,
    next_handle: u64,
    generated_pin: Option<String>,
    networks: Vec<VendorNetworkInfo>,
    client_lists: HashMap<i32, Vec<[u8; 6]>>,
    device_address: Option<[u8; 6]>,
    ssids: HashMap<[u8; 6], Vec<u8>>,
    next_discovery_id: u64,
}

/// In-memory vendor double. All knobs are interior so tests can share it with
/// the adapter through an `Arc`.
#[derive(Default)]
pub struct FakeVendor {
    inner: Mutex<FakeInner>,
}

impl FakeVendor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fail the next occurrence of `op` with `error`.
    pub fn fail_next(&self, op: &str, error: CallError) {
        self.lock().fail_next.insert(op.to_string(), error);
    }

    /// Make `add_interface` succeed but return no handle.
    pub fn return_null_interface(&self) {
        self.lock().null_interface = true;
    }

    pub fn set_generated_pin(&self, pin: &str) {
        self.lock().generated_pin = Some(pin.to_string());
    }

    pub fn set_networks(&self, networks: Vec<VendorNetworkInfo>) {
        self.lock().networks = networks;
    }

    pub fn set_client_list_for(&self, network_id: i32, clients: Vec<[u8; 6]>) {
        self.lock().client_lists.insert(network_id, clients);
    }

    pub fn set_device_address(&self, address: [u8; 6]) {
        self.lock().device_address = Some(address);
    }

    pub fn set_ssid_for(&self, peer: [u8; 6], ssid: Vec<u8>) {
        self.lock().ssids.insert(peer, ssid);
    }

    /// Kill the transport and fire the registered death callback.
    pub fn die(&self) {
        let callback = {
            let mut inner = self.lock();
            inner.dead = true;
            inner.death_callback.clone()
        };
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Bring the transport back for a fresh `initialize`.
    pub fn revive(&self) {
        self.lock().dead = false;
    }

    /// Push an unsolicited event through the registered sink.
    pub fn emit(&self, event: SupplicantEvent) {
        let sink = self.lock().event_sink.clone();
        if let Some(sink) = sink {
            sink(event);
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, op: &str) -> usize {
        self.lock().calls.iter().filter(|name| name.as_str() == op).count()
    }

    fn enter(&self, op: &str) -> Result<(), CallError> {
        let mut inner = self.lock();
        inner.calls.push(op.to_string());
        if inner.dead {
            return Err(CallError::Transport("vendor transport is dead".to_string()));
        }
        if let Some(error) = inner.fail_next.remove(op) {
            return Err(error);
        }
        Ok(())
    }
}

impl VendorP2pIface for FakeVendor {
    fn register_death_callback(&self, callback: DeathCallback) -> Result<(), CallError> {
        self.enter("register_death_callback")?;
        self.lock().death_callback = Some(callback);
        Ok(())
    }

    fn add_interface(&self, _name: &str) -> Result<Option<VendorHandle>, CallError> {
        self.enter("add_interface")?;
        let mut inner = self.lock();
        if inner.null_interface {
            return Ok(None);
        }
        inner.next_handle += 1;
        Ok(Some(VendorHandle(inner.next_handle)))
    }

    fn remove_interface(&self, _handle: VendorHandle) -> Result<(), CallError> {
        self.enter("remove_interface")
    }

    fn register_event_callback(
        &self,
        _handle: VendorHandle,
        sink: EventSink,
    ) -> Result<(), CallError> {
        self.enter("register_event_callback")?;
        self.lock().event_sink = Some(sink);
        Ok(())
    }

    fn find(&self, _handle: VendorHandle, _timeout: Duration) -> Result<(), CallError> {
        self.enter("find")
    }

    fn find_on_social_channels(
        &self,
        _handle: VendorHandle,
        _timeout: Duration,
    ) -> Result<(), CallError> {
        self.enter("find")
    }

    fn find_on_specific_frequency(
        &self,
        _handle: VendorHandle,
        _frequency_mhz: u32,
        _timeout: Duration,
    ) -> Result<(), CallError> {
        self.enter("find")
    }

    fn stop_find(&self, _handle: VendorHandle) -> Result<(), CallError> {
        self.enter("stop_find")
    }

    fn flush(&self, _handle: VendorHandle) -> Result<(), CallError> {
        self.enter("flush")
    }

    fn connect(
        &self,
        _handle: VendorHandle,
        _peer: [u8; 6],
        wps: WpsMethod,
        pin: &str,
        _join_existing: bool,
        _persistent: bool,
        _go_intent: u8,
    ) -> Result<Option<String>, CallError> {
        self.enter("connect")?;
        if wps == WpsMethod::Display && pin.is_empty() {
            let pin = self
                .lock()
                .generated_pin
                .clone()
                .unwrap_or_else(|| "12345670".to_string());
            return Ok(Some(pin));
        }
        Ok(None)
    }

    fn cancel_connect(&self, _handle: VendorHandle) -> Result<(), CallError> {
        self.enter("cancel_connect")
    }

    fn provision_discovery(
        &self,
        _handle: VendorHandle,
        _peer: [u8; 6],
        _wps: WpsMethod,
    ) -> Result<(), CallError> {
        self.enter("provision_discovery")
    }

    fn invite(
        &self,
        _handle: VendorHandle,
        _group_iface: &str,
        _go_address: [u8; 6],
        _peer: [u8; 6],
    ) -> Result<(), CallError> {
        self.enter("invite")
    }

    fn reject(&self, _handle: VendorHandle, _peer: [u8; 6]) -> Result<(), CallError> {
        self.enter("reject")
    }

    fn get_group_capability(
        &self,
        _handle: VendorHandle,
        _peer: [u8; 6],
    ) -> Result<u32, CallError> {
        self.enter("get_group_capability")?;
        Ok(0)
    }

    fn group_add(
        &self,
        _handle: VendorHandle,
        _persistent: bool,
        _network_id: Option<i32>,
    ) -> Result<(), CallError> {
        self.enter("group_add")
    }

    fn group_add_with_config(
        &self,
        _handle: VendorHandle,
        _ssid: &[u8],
        _passphrase: &str,
        _persistent: bool,
        _frequency_mhz: u32,
        _peer: Option<[u8; 6]>,
        _join_existing: bool,
    ) -> Result<(), CallError> {
        self.enter("group_add_with_config")
    }

    fn group_remove(&self, _handle: VendorHandle, _group_iface: &str) -> Result<(), CallError> {
        self.enter("group_remove")
    }

    fn configure_ext_listen(
        &self,
        _handle: VendorHandle,
        _period_ms: u32,
        _interval_ms: u32,
    ) -> Result<(), CallError> {
        self.enter("configure_ext_listen")
    }

    fn set_listen_channel(
        &self,
        _handle: VendorHandle,
        _channel: u32,
        _operating_class: u32,
    ) -> Result<(), CallError> {
        self.enter("set_listen_channel")
    }

    fn set_disallowed_frequencies(
        &self,
        _handle: VendorHandle,
        _ranges: &[(u32, u32)],
    ) -> Result<(), CallError> {
        self.enter("set_disallowed_frequencies")
    }

    fn flush_services(&self, _handle: VendorHandle) -> Result<(), CallError> {
        self.enter("flush_services")
    }

    fn add_upnp_service(
        &self,
        _handle: VendorHandle,
        _version: u8,
        _service_name: &str,
    ) -> Result<(), CallError> {
        self.enter("add_upnp_service")
    }

    fn remove_upnp_service(
        &self,
        _handle: VendorHandle,
        _version: u8,
        _service_name: &str,
    ) -> Result<(), CallError> {
        self.enter("remove_upnp_service")
    }

    fn add_bonjour_service(
        &self,
        _handle: VendorHandle,
        _query: &[u8],
        _response: &[u8],
    ) -> Result<(), CallError> {
        self.enter("add_bonjour_service")
    }

    fn remove_bonjour_service(
        &self,
        _handle: VendorHandle,
        _query: &[u8],
    ) -> Result<(), CallError> {
        self.enter("remove_bonjour_service")
    }

    fn request_service_discovery(
        &self,
        _handle: VendorHandle,
        _peer: Option<[u8; 6]>,
        _query: &[u8],
    ) -> Result<Option<u64>, CallError> {
        self.enter("request_service_discovery")?;
        let mut inner = self.lock();
        inner.next_discovery_id += 1;
        Ok(Some(inner.next_discovery_id))
    }

    fn cancel_service_discovery(&self, _handle: VendorHandle, _id: u64) -> Result<(), CallError> {
        self.enter("cancel_service_discovery")
    }

    fn start_wps_pbc(
        &self,
        _handle: VendorHandle,
        _group_iface: &str,
        _bssid: Option<[u8; 6]>,
    ) -> Result<(), CallError> {
        self.enter("start_wps_pbc")
    }

    fn start_wps_pin_keypad(
        &self,
        _handle: VendorHandle,
        _group_iface: &str,
        _pin: &str,
    ) -> Result<(), CallError> {
        self.enter("start_wps_pin_keypad")
    }

    fn start_wps_pin_display(
        &self,
        _handle: VendorHandle,
        _group_iface: &str,
        _bssid: Option<[u8; 6]>,
    ) -> Result<Option<String>, CallError> {
        self.enter("start_wps_pin_display")?;
        Ok(Some(
            self.lock().generated_pin.clone().unwrap_or_else(|| "12345670".to_string()),
        ))
    }

    fn cancel_wps(&self, _handle: VendorHandle, _group_iface: &str) -> Result<(), CallError> {
        self.enter("cancel_wps")
    }

    fn set_device_name(&self, _handle: VendorHandle, _name: &str) -> Result<(), CallError> {
        self.enter("set_device_name")
    }

    fn set_ssid_postfix(&self, _handle: VendorHandle, _postfix: &str) -> Result<(), CallError> {
        self.enter("set_ssid_postfix")
    }

    fn set_miracast_mode(&self, _handle: VendorHandle, _mode: u8) -> Result<(), CallError> {
        self.enter("set_miracast_mode")
    }

    fn enable_wfd(&self, _handle: VendorHandle, _enable: bool) -> Result<(), CallError> {
        self.enter("enable_wfd")
    }

    fn set_wfd_device_info(&self, _handle: VendorHandle, _info: &[u8]) -> Result<(), CallError> {
        self.enter("set_wfd_device_info")
    }

    fn set_vendor_elements(
        &self,
        _handle: VendorHandle,
        _elements: &[u8],
    ) -> Result<(), CallError> {
        self.enter("set_vendor_elements")
    }

    fn set_mac_randomization(&self, _handle: VendorHandle, _enable: bool) -> Result<(), CallError> {
        self.enter("set_mac_randomization")
    }

    fn get_device_address(&self, _handle: VendorHandle) -> Result<Option<[u8; 6]>, CallError> {
        self.enter("get_device_address")?;
        Ok(self.lock().device_address)
    }

    fn get_ssid(&self, _handle: VendorHandle, peer: [u8; 6]) -> Result<Option<Vec<u8>>, CallError> {
        self.enter("get_ssid")?;
        Ok(self.lock().ssids.get(&peer).cloned())
    }

    fn list_networks(&self, _handle: VendorHandle) -> Result<Vec<i32>, CallError> {
        self.enter("list_networks")?;
        Ok(self.lock().networks.iter().map(|n| n.network_id).collect())
    }

    fn get_network(
        &self,
        _handle: VendorHandle,
        network_id: i32,
    ) -> Result<Option<VendorNetworkInfo>, CallError> {
        self.enter("get_network")?;
        Ok(self
            .lock()
            .networks
            .iter()
            .find(|n| n.network_id == network_id)
            .cloned())
    }

    fn remove_network(&self, _handle: VendorHandle, network_id: i32) -> Result<(), CallError> {
        self.enter("remove_network")?;
        self.lock().networks.retain(|n| n.network_id != network_id);
        Ok(())
    }

    fn remove_client(&self, _handle: VendorHandle, _peer: [u8; 6]) -> Result<(), CallError> {
        self.enter("remove_client")
    }

    fn set_client_list(
        &self,
        _handle: VendorHandle,
        network_id: i32,
        clients: &[[u8; 6]],
    ) -> Result<(), CallError> {
        self.enter("set_client_list")?;
        self.lock().client_lists.insert(network_id, clients.to_vec());
        Ok(())
    }

    fn get_client_list(
        &self,
        _handle: VendorHandle,
        network_id: i32,
    ) -> Result<Vec<[u8; 6]>, CallError> {
        self.enter("get_client_list")?;
        Ok(self.lock().client_lists.get(&network_id).cloned().unwrap_or_default())
    }

    fn save_config(&self, _handle: VendorHandle) -> Result<(), CallError> {
        self.enter("save_config")
    }
}
