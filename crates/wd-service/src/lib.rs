//! # wd-service
//!
//! Orchestration layer of the Wi-Fi Direct service: the single-consumer
//! message loop driving the connection state machine, the service discovery
//! registry, the group/persistence store and the client command surface.

pub mod groups;
pub mod ports;
pub mod registry;
pub mod service;

pub use groups::GroupStore;
pub use registry::ServiceRegistry;
pub use service::{ClientPermissions, P2pService, P2pServiceHandle};
