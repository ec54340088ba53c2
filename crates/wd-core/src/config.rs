//! Service configuration model.
//!
//! 服务配置模型。持久化与加载由宿主负责，这里只定义结构与默认值。

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// P2P device name advertised to peers.
    #[serde(default = "defaults::device_name")]
    pub device_name: String,

    /// Name of the P2P interface requested from the HAL.
    #[serde(default = "defaults::interface_name")]
    pub interface_name: String,

    /// Listen channel, `None` leaves the supplicant default.
    #[serde(default)]
    pub listen_channel: Option<u32>,

    /// Deadline for a pending group negotiation before the connection event
    /// is ended with a timeout outcome.
    #[serde(default = "defaults::group_negotiation_timeout", with = "duration_secs")]
    pub group_negotiation_timeout: Duration,

    /// How long the service may sit in `Idle` with no registered clients
    /// before the interface is torn down.
    #[serde(default = "defaults::idle_shutdown_timeout", with = "duration_secs")]
    pub idle_shutdown_timeout: Duration,

    /// How long a decision prompt (incoming negotiation, frequency conflict)
    /// may stay unanswered.
    #[serde(default = "defaults::user_authorization_timeout", with = "duration_secs")]
    pub user_authorization_timeout: Duration,

    /// Peer discovery round length handed to the HAL's find call.
    #[serde(default = "defaults::discovery_timeout", with = "duration_secs")]
    pub discovery_timeout: Duration,

    /// Randomize the interface MAC on setup.
    #[serde(default)]
    pub mac_randomization: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            device_name: defaults::device_name(),
            interface_name: defaults::interface_name(),
            listen_channel: None,
            group_negotiation_timeout: defaults::group_negotiation_timeout(),
            idle_shutdown_timeout: defaults::idle_shutdown_timeout(),
            user_authorization_timeout: defaults::user_authorization_timeout(),
            discovery_timeout: defaults::discovery_timeout(),
            mac_randomization: false,
        }
    }
}

mod defaults {
    use std::time::Duration;

    pub fn device_name() -> String {
        "direct-device".to_string()
    }

    pub fn interface_name() -> String {
        "p2p0".to_string()
    }

    pub fn group_negotiation_timeout() -> Duration {
        Duration::from_secs(120)
    }

    pub fn idle_shutdown_timeout() -> Duration {
        Duration::from_secs(150)
    }

    pub fn user_authorization_timeout() -> Duration {
        Duration::from_secs(30)
    }

    pub fn discovery_timeout() -> Duration {
        Duration::from_secs(120)
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
