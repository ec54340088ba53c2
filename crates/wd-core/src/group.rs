//! Groups, network ids and the connect configuration.

use serde::{Deserialize, Serialize};

use crate::address::MacAddress;
use crate::error::{P2pError, P2pResult};

/// Identity of a group inside the supplicant's network store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkId {
    /// Not saved; lives only as long as the session.
    Temporary,
    /// Saved network, addressed by the supplicant's network id.
    Persistent(i32),
}

impl NetworkId {
    pub fn is_persistent(&self) -> bool {
        matches!(self, NetworkId::Persistent(_))
    }
}

/// WPS provisioning method requested for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WpsMethod {
    Pbc,
    Display,
    Keypad,
    /// No WPS exchange configured. Valid in peer advertisements, rejected on
    /// connect before any HAL call.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistPolicy {
    Temporary,
    Persistent,
}

/// Group-owner intent carried in a connect request. `Auto` defers to the
/// band/DBS table in [`crate::intent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupOwnerIntent {
    Auto,
    Value(u8),
}

/// Client-supplied configuration for forming or joining a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    pub peer_address: MacAddress,
    pub wps: WpsMethod,
    pub pin: Option<String>,
    pub persist: PersistPolicy,
    pub group_owner_intent: GroupOwnerIntent,
    /// Join a group the peer already owns instead of negotiating a new one.
    pub join_existing: bool,
}

impl GroupConfig {
    pub fn new(peer_address: MacAddress, wps: WpsMethod) -> Self {
        GroupConfig {
            peer_address,
            wps,
            pin: None,
            persist: PersistPolicy::Temporary,
            group_owner_intent: GroupOwnerIntent::Auto,
            join_existing: false,
        }
    }

    pub fn with_pin(mut self, pin: impl Into<String>) -> Self {
        self.pin = Some(pin.into());
        self
    }

    /// Validates the WPS method / pin combination before anything reaches
    /// the HAL.
    ///
    /// Pbc forbids a pin, Keypad requires one, Display without a pin means
    /// "have the HAL generate one", and `None` is not a connectable setup.
    pub fn validate(&self) -> P2pResult<()> {
        let pin = self.pin.as_deref().unwrap_or("");
        match self.wps {
            WpsMethod::Pbc if !pin.is_empty() => {
                Err(P2pError::invalid("pbc connect must not carry a pin"))
            }
            WpsMethod::Keypad if pin.is_empty() => {
                Err(P2pError::invalid("keypad connect requires a pin"))
            }
            WpsMethod::None => Err(P2pError::invalid("wps method not configured")),
            _ => {
                if let Some(intent) = self.explicit_intent() {
                    if intent > crate::intent::MAX_GROUP_OWNER_INTENT {
                        return Err(P2pError::invalid(format!(
                            "group owner intent {intent} out of range"
                        )));
                    }
                }
                Ok(())
            }
        }
    }

    /// Whether the HAL is expected to generate and return a pin for this
    /// connect request.
    pub fn expects_generated_pin(&self) -> bool {
        self.wps == WpsMethod::Display && self.pin.as_deref().unwrap_or("").is_empty()
    }

    fn explicit_intent(&self) -> Option<u8> {
        match self.group_owner_intent {
            GroupOwnerIntent::Auto => None,
            GroupOwnerIntent::Value(v) => Some(v),
        }
    }
}

/// A formed or stored P2P group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct P2pGroup {
    pub network_id: NetworkId,
    pub network_name: String,
    pub passphrase: Option<String>,
    pub owner: Option<MacAddress>,
    pub is_group_owner: bool,
    pub interface: Option<String>,
    pub frequency_mhz: Option<u32>,
    pub clients: Vec<MacAddress>,
}

impl P2pGroup {
    /// A persistent entry with no owner device is corrupt store data and must
    /// not be surfaced to clients.
    pub fn validate(&self) -> P2pResult<()> {
        if self.network_id.is_persistent() && self.owner.is_none() {
            return Err(P2pError::invalid(format!(
                "persistent group {:?} has no owner device",
                self.network_name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(wps: WpsMethod, pin: Option<&str>) -> GroupConfig {
        GroupConfig {
            peer_address: "aa:bb:cc:dd:ee:ff".parse().unwrap(),
            wps,
            pin: pin.map(str::to_string),
            persist: PersistPolicy::Temporary,
            group_owner_intent: GroupOwnerIntent::Auto,
            join_existing: false,
        }
    }

    #[test]
    fn pbc_with_pin_is_rejected() {
        assert!(config(WpsMethod::Pbc, Some("12345670")).validate().is_err());
        assert!(config(WpsMethod::Pbc, None).validate().is_ok());
        assert!(config(WpsMethod::Pbc, Some("")).validate().is_ok());
    }

    #[test]
    fn keypad_requires_nonempty_pin() {
        assert!(config(WpsMethod::Keypad, None).validate().is_err());
        assert!(config(WpsMethod::Keypad, Some("")).validate().is_err());
        assert!(config(WpsMethod::Keypad, Some("12345670")).validate().is_ok());
    }

    #[test]
    fn display_without_pin_expects_generated() {
        let cfg = config(WpsMethod::Display, None);
        assert!(cfg.validate().is_ok());
        assert!(cfg.expects_generated_pin());

        let cfg = config(WpsMethod::Display, Some("98761234"));
        assert!(cfg.validate().is_ok());
        assert!(!cfg.expects_generated_pin());
    }

    #[test]
    fn unconfigured_wps_is_not_connectable() {
        assert!(config(WpsMethod::None, None).validate().is_err());
    }

    #[test]
    fn explicit_intent_is_range_checked() {
        let mut cfg = config(WpsMethod::Pbc, None);
        cfg.group_owner_intent = GroupOwnerIntent::Value(15);
        assert!(cfg.validate().is_ok());
        cfg.group_owner_intent = GroupOwnerIntent::Value(16);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn persistent_group_without_owner_is_invalid() {
        let group = P2pGroup {
            network_id: NetworkId::Persistent(3),
            network_name: "DIRECT-ab".to_string(),
            passphrase: None,
            owner: None,
            is_group_owner: false,
            interface: None,
            frequency_mhz: None,
            clients: Vec::new(),
        };
        assert!(group.validate().is_err());

        let mut with_owner = group;
        with_owner.owner = Some("aa:bb:cc:dd:ee:ff".parse().unwrap());
        assert!(with_owner.validate().is_ok());
    }
}
