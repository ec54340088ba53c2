//! # wd-core
//!
//! Core domain models and the connection state machine for the Wi-Fi Direct
//! service. This crate contains pure logic only: no I/O, no runtime, no HAL
//! bindings.

pub mod address;
pub mod channel;
pub mod command;
pub mod config;
pub mod error;
pub mod event;
pub mod group;
pub mod intent;
pub mod machine;
pub mod peer;
pub mod ports;
pub mod service_discovery;

// Re-export commonly used types at the crate root
pub use address::MacAddress;
pub use command::{ClientCommand, CommandReply, ConnectionInfo, ScanType};
pub use config::ServiceConfig;
pub use error::{P2pError, P2pResult};
pub use event::{P2pNotification, SupplicantEvent};
pub use group::{GroupConfig, NetworkId, P2pGroup, WpsMethod};
pub use machine::{ConnectionStateMachine, P2pState};
pub use peer::{PeerDevice, PeerList};
