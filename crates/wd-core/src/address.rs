//! Device address codec.
//!
//! Every externally supplied address string must decode to exactly six bytes
//! before it is allowed anywhere near the HAL; all APIs accepting an address
//! share this one parser so malformed input is rejected identically.

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::P2pError;

/// A 6-byte P2P device (MAC) address.
///
/// Canonical string form is colon-separated lowercase hex,
/// e.g. `aa:bb:cc:dd:ee:ff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Placeholder returned to callers that may not see the real device MAC.
    /// Locally administered, never a real interface address.
    pub const ANONYMIZED: MacAddress = MacAddress([0x02, 0, 0, 0, 0, 0]);

    pub const BROADCAST: MacAddress = MacAddress([0xff; 6]);

    pub fn new(octets: [u8; 6]) -> Self {
        MacAddress(octets)
    }

    /// Builds an address from a byte slice, rejecting anything that is not
    /// exactly six bytes. 5- or 7-byte inputs and empty slices all fail the
    /// same way regardless of origin.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, P2pError> {
        let octets: [u8; 6] = bytes
            .try_into()
            .map_err(|_| P2pError::invalid(format!("mac address must be 6 bytes, got {}", bytes.len())))?;
        Ok(MacAddress(octets))
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 6]
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl FromStr for MacAddress {
    type Err = P2pError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut count = 0;
        for part in s.split(':') {
            if count == 6 {
                return Err(P2pError::invalid(format!("mac address has too many octets: {s:?}")));
            }
            if part.len() != 2 {
                return Err(P2pError::invalid(format!("malformed mac address octet: {s:?}")));
            }
            octets[count] = u8::from_str_radix(part, 16)
                .map_err(|_| P2pError::invalid(format!("non-hex mac address octet: {s:?}")))?;
            count += 1;
        }
        if count != 6 {
            return Err(P2pError::invalid(format!("mac address must have 6 octets: {s:?}")));
        }
        Ok(MacAddress(octets))
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Decodes a raw SSID into its display form. Supplicant SSIDs are arbitrary
/// bytes; anything that is not valid UTF-8 is replaced rather than dropped so
/// group names always render.
pub fn decode_ssid(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}
