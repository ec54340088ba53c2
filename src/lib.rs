//! # wifidirect
//!
//! Facade crate for the Wi-Fi Direct (P2P) connection service: re-exports
//! the domain vocabulary and wires core + HAL + service together behind a
//! builder. Hosts supply a vendor interface implementation and, optionally,
//! their UI decision port and station-mode controller.

use std::sync::Arc;

use anyhow::Context;

pub use wd_core::{
    address::MacAddress,
    command::{
        ClientCommand, CommandReply, ConnectionInfo, CreateGroupParams, DiscoveryState,
        MiracastMode, P2pStateKind, ScanType, WfdInfo,
    },
    config::ServiceConfig,
    error::{P2pError, P2pResult},
    event::{
        ConnectionOutcome, DecisionPrompt, GroupStartedEvent, NegotiationStatus, P2pNotification,
        SupplicantEvent,
    },
    group::{GroupConfig, GroupOwnerIntent, NetworkId, P2pGroup, PersistPolicy, WpsMethod},
    intent::{select_group_owner_intent, DbsCapability, StaBand},
    peer::{PeerDevice, PeerStatus},
    ports::{DecisionPort, StaLinkInfo, StationController},
    service_discovery::{LocalServiceSpec, ServiceKind, ServiceQuery},
};
pub use wd_hal::{SupplicantP2pHal, VendorNetworkInfo, VendorP2pIface};
pub use wd_service::ports::{NoStationController, UnattendedDecisionPort};
pub use wd_service::{ClientPermissions, P2pService, P2pServiceHandle};

/// Assembles a [`P2pService`] around a vendor interface implementation.
pub struct P2pServiceBuilder {
    config: ServiceConfig,
    vendor: Option<Arc<dyn VendorP2pIface>>,
    decisions: Arc<dyn DecisionPort>,
    station: Arc<dyn StationController>,
}

impl Default for P2pServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl P2pServiceBuilder {
    pub fn new() -> Self {
        P2pServiceBuilder {
            config: ServiceConfig::default(),
            vendor: None,
            decisions: Arc::new(UnattendedDecisionPort),
            station: Arc::new(NoStationController),
        }
    }

    pub fn with_config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    /// The vendor P2P interface this service drives. Required.
    pub fn with_vendor(mut self, vendor: Arc<dyn VendorP2pIface>) -> Self {
        self.vendor = Some(vendor);
        self
    }

    /// Collaborator that presents accept/decline prompts to the user.
    pub fn with_decision_port(mut self, decisions: Arc<dyn DecisionPort>) -> Self {
        self.decisions = decisions;
        self
    }

    /// Window onto the station-mode Wi-Fi stack, used for group-owner intent
    /// selection and frequency-conflict resolution.
    pub fn with_station_controller(mut self, station: Arc<dyn StationController>) -> Self {
        self.station = station;
        self
    }

    /// Spawns the service loop. Must run inside a tokio runtime.
    pub fn build(self) -> anyhow::Result<P2pService> {
        let vendor = self
            .vendor
            .context("a vendor P2P interface is required to build the service")?;
        Ok(P2pService::spawn(self.config, vendor, self.decisions, self.station))
    }
}
