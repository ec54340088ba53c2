//! Event monitor: fans unsolicited supplicant events out to per-interface
//! listeners.
//!
//! Delivery rule: a broadcast for an interface nobody registered on, or one
//! that is not currently monitored, is silently dropped rather than queued.
//! Stale events arriving after teardown must not resurrect state.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use log::{debug, trace};
use tokio::sync::mpsc;

use wd_core::event::{EventKind, SupplicantEvent};

type ListenerKey = (String, EventKind);

#[derive(Default)]
struct MonitorInner {
    monitored: HashSet<String>,
    listeners: HashMap<ListenerKey, Vec<mpsc::UnboundedSender<SupplicantEvent>>>,
}

/// Per-interface event dispatch.
#[derive(Default)]
pub struct P2pEventMonitor {
    inner: Mutex<MonitorInner>,
}

impl P2pEventMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MonitorInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a listener for one event kind on one interface. Listeners
    /// for the same key are invoked in registration order.
    pub fn register_handler(
        &self,
        iface: &str,
        kind: EventKind,
        listener: mpsc::UnboundedSender<SupplicantEvent>,
    ) {
        self.lock()
            .listeners
            .entry((iface.to_string(), kind))
            .or_default()
            .push(listener);
    }

    /// Registers one listener for every event kind on an interface.
    pub fn register_all_kinds(
        &self,
        iface: &str,
        listener: mpsc::UnboundedSender<SupplicantEvent>,
    ) {
        for kind in ALL_KINDS {
            self.register_handler(iface, kind, listener.clone());
        }
    }

    /// Turns delivery for an interface on or off. Turning it off does not
    /// drop registrations; events are discarded until it is re-enabled.
    pub fn set_monitoring(&self, iface: &str, enabled: bool) {
        let mut inner = self.lock();
        if enabled {
            inner.monitored.insert(iface.to_string());
        } else {
            inner.monitored.remove(iface);
        }
    }

    pub fn is_monitoring(&self, iface: &str) -> bool {
        self.lock().monitored.contains(iface)
    }

    /// Drops every registration for an interface.
    pub fn unregister_interface(&self, iface: &str) {
        let mut inner = self.lock();
        inner.monitored.remove(iface);
        inner.listeners.retain(|(name, _), _| name != iface);
    }

    /// Delivers an event to every listener registered for its kind on
    /// `iface`, in registration order. A closed listener is skipped and never
    /// blocks delivery to the next one.
    pub fn broadcast(&self, iface: &str, event: SupplicantEvent) {
        let senders = {
            let inner = self.lock();
            if !inner.monitored.contains(iface) {
                trace!("dropping {:?} for unmonitored iface {iface}", event.kind());
                return;
            }
            match inner.listeners.get(&(iface.to_string(), event.kind())) {
                Some(senders) if !senders.is_empty() => senders.clone(),
                _ => {
                    trace!("dropping {:?} for {iface}: no listener", event.kind());
                    return;
                }
            }
        };
        for sender in senders {
            if sender.send(event.clone()).is_err() {
                debug!("listener for {:?} on {iface} is gone", event.kind());
            }
        }
    }
}

const ALL_KINDS: [EventKind; 13] = [
    EventKind::SupplicantLifecycle,
    EventKind::DeviceFound,
    EventKind::DeviceLost,
    EventKind::FindStopped,
    EventKind::GroupStarted,
    EventKind::GroupRemoved,
    EventKind::GoNegotiationRequest,
    EventKind::GoNegotiationFailure,
    EventKind::ProvisionDiscovery,
    EventKind::InvitationResult,
    EventKind::FrequencyChanged,
    EventKind::GroupClients,
    EventKind::ServiceDiscoveryResponse,
];
