//! # wd-hal
//!
//! Infrastructure layer of the Wi-Fi Direct service: the vendor/supplicant
//! interface trait, the HAL adapter owning the single open session, and the
//! event monitor fanning unsolicited events out to listeners.

pub mod adapter;
pub mod monitor;
pub mod vendor;

#[cfg(any(test, feature = "test-utils"))]
pub mod testkit;

pub use adapter::{HalError, SupplicantP2pHal};
pub use monitor::P2pEventMonitor;
pub use vendor::{CallError, EventSink, VendorHandle, VendorNetworkInfo, VendorP2pIface, VendorStatus};
