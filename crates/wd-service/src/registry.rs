//! Service discovery registry driver.
//!
//! Wraps the pure outstanding-request table from `wd-core` with the HAL
//! calls that advertise local services and issue remote queries.

use std::collections::HashMap;

use tracing::{debug, warn};

use wd_core::error::{P2pError, P2pResult};
use wd_core::service_discovery::{
    LocalServiceSpec, ServiceQuery, ServiceRemoval, ServiceRequestTable,
};
use wd_hal::SupplicantP2pHal;

#[derive(Default)]
pub struct ServiceRegistry {
    table: ServiceRequestTable,
    local: Vec<LocalServiceSpec>,
    /// Local transaction id -> identifier the HAL handed back for the query.
    hal_ids: HashMap<u8, u64>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and registers a local service advertisement. Malformed specs
    /// fail locally and never reach the HAL.
    pub fn add_local(&mut self, hal: &SupplicantP2pHal, info: &str) -> P2pResult<()> {
        let spec = LocalServiceSpec::parse(info)?;
        match &spec {
            LocalServiceSpec::Upnp { version, service } => {
                hal.add_upnp_service(*version, service).map_err(P2pError::from)?;
            }
            LocalServiceSpec::Bonjour { query, response } => {
                hal.add_bonjour_service(query, response).map_err(P2pError::from)?;
            }
        }
        if !self.local.contains(&spec) {
            self.local.push(spec);
        }
        Ok(())
    }

    /// Unregisters a local service. Removal is keyed loosely (see
    /// [`LocalServiceSpec::parse_removal`] for the Bonjour leniency).
    pub fn remove_local(&mut self, hal: &SupplicantP2pHal, info: &str) -> P2pResult<()> {
        let removal = LocalServiceSpec::parse_removal(info)?;
        match &removal {
            ServiceRemoval::Upnp { version, service } => {
                hal.remove_upnp_service(*version, service).map_err(P2pError::from)?;
            }
            ServiceRemoval::Bonjour { query } => {
                hal.remove_bonjour_service(query).map_err(P2pError::from)?;
            }
        }
        self.local.retain(|spec| !removal_matches(spec, &removal));
        Ok(())
    }

    /// Registers a remote query and returns its transaction id. The HAL is
    /// only contacted when discovery actually runs.
    pub fn add_request(&mut self, query: ServiceQuery) -> P2pResult<u8> {
        self.table.insert(query)
    }

    /// Cancels an outstanding request. Idempotent.
    pub fn remove_request(&mut self, hal: &SupplicantP2pHal, id: u8) -> P2pResult<()> {
        if self.table.cancel(id).is_none() {
            return Ok(());
        }
        if let Some(hal_id) = self.hal_ids.remove(&id) {
            match hal.cancel_service_discovery(hal_id) {
                Ok(()) => {}
                Err(wd_hal::HalError::Disconnected) => return Err(P2pError::Disconnected),
                Err(err) => debug!("cancel_service_discovery({hal_id}): {err}"),
            }
        }
        Ok(())
    }

    /// Issues every not-yet-issued outstanding query to the HAL. A query the
    /// HAL gives no id for is treated as failed, not fatal.
    pub fn dispatch_outstanding(&mut self, hal: &SupplicantP2pHal) {
        let pending: Vec<_> = self
            .table
            .outstanding()
            .filter(|request| !self.hal_ids.contains_key(&request.id))
            .cloned()
            .collect();
        for request in pending {
            match hal.request_service_discovery(request.query.peer, &request.query.payload) {
                Some(hal_id) => {
                    self.hal_ids.insert(request.id, hal_id);
                }
                None => warn!("service discovery request {} not accepted", request.id),
            }
        }
    }

    /// Drops everything: outstanding queries, their HAL-side counterparts
    /// and local advertisements. Idempotent.
    pub fn remove_all(&mut self, hal: &SupplicantP2pHal) {
        for (_, hal_id) in self.hal_ids.drain() {
            if let Err(err) = hal.cancel_service_discovery(hal_id) {
                debug!("cancel_service_discovery({hal_id}): {err}");
            }
        }
        self.table.clear();
        if !self.local.is_empty() {
            self.local.clear();
            if let Err(err) = hal.flush_services() {
                debug!("flush_services: {err}");
            }
        }
    }

    pub fn outstanding_requests(&self) -> usize {
        self.table.len()
    }

    pub fn local_services(&self) -> &[LocalServiceSpec] {
        &self.local
    }
}

fn removal_matches(spec: &LocalServiceSpec, removal: &ServiceRemoval) -> bool {
    match (spec, removal) {
        (
            LocalServiceSpec::Upnp { version, service },
            ServiceRemoval::Upnp { version: rv, service: rs },
        ) => version == rv && service == rs,
        (LocalServiceSpec::Bonjour { query, .. }, ServiceRemoval::Bonjour { query: rq }) => {
            query == rq
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use wd_hal::testkit::FakeVendor;
    use wd_hal::{EventSink, VendorP2pIface};

    fn ready_hal() -> (Arc<FakeVendor>, SupplicantP2pHal) {
        let fake = Arc::new(FakeVendor::new());
        let hal = SupplicantP2pHal::new(Arc::clone(&fake) as Arc<dyn VendorP2pIface>);
        hal.initialize(|| {}).unwrap();
        let sink: EventSink = Arc::new(|_| {});
        hal.setup_interface("p2p0", sink).unwrap();
        (fake, hal)
    }

    #[test]
    fn malformed_local_service_never_reaches_the_hal() {
        let (fake, hal) = ready_hal();
        let mut registry = ServiceRegistry::new();
        assert!(registry.add_local(&hal, "mdns 0b5f c00c").is_err());
        assert!(registry.add_local(&hal, "upnp zz name").is_err());
        assert_eq!(fake.call_count("add_upnp_service"), 0);
        assert_eq!(fake.call_count("add_bonjour_service"), 0);
    }

    #[test]
    fn add_and_remove_local_round_trip() {
        let (fake, hal) = ready_hal();
        let mut registry = ServiceRegistry::new();
        registry.add_local(&hal, "upnp 10 uuid:1234").unwrap();
        registry.add_local(&hal, "bonjour 0b5f616670 c00c").unwrap();
        assert_eq!(registry.local_services().len(), 2);

        // Bonjour removal without the response field still matches.
        registry.remove_local(&hal, "bonjour 0b5f616670").unwrap();
        assert_eq!(registry.local_services().len(), 1);
        assert_eq!(fake.call_count("remove_bonjour_service"), 1);
    }

    #[test]
    fn dispatch_issues_each_request_once() {
        let (fake, hal) = ready_hal();
        let mut registry = ServiceRegistry::new();
        let id = registry
            .add_request(ServiceQuery::generic(vec![0x02, 0x00, 0x01]).unwrap())
            .unwrap();
        registry.dispatch_outstanding(&hal);
        registry.dispatch_outstanding(&hal);
        assert_eq!(fake.call_count("request_service_discovery"), 1);

        registry.remove_request(&hal, id).unwrap();
        assert_eq!(fake.call_count("cancel_service_discovery"), 1);
        // Idempotent.
        registry.remove_request(&hal, id).unwrap();
        assert_eq!(fake.call_count("cancel_service_discovery"), 1);
    }

    #[test]
    fn remove_all_is_idempotent() {
        let (fake, hal) = ready_hal();
        let mut registry = ServiceRegistry::new();
        registry.add_local(&hal, "upnp 10 uuid:1234").unwrap();
        registry
            .add_request(ServiceQuery::generic(vec![0x02]).unwrap())
            .unwrap();
        registry.dispatch_outstanding(&hal);

        registry.remove_all(&hal);
        registry.remove_all(&hal);
        assert_eq!(registry.outstanding_requests(), 0);
        assert!(registry.local_services().is_empty());
        assert_eq!(fake.call_count("flush_services"), 1);
    }
}
