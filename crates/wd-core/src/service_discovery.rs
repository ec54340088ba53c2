//! Service discovery vocabulary: local advertisements, remote queries and
//! the outstanding-request table with its wrapping transaction ids.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::address::MacAddress;
use crate::error::{P2pError, P2pResult};

/// Highest transaction id; the counter wraps back to 1 past this.
pub const MAX_TRANSACTION_ID: u8 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Upnp,
    Bonjour,
    Generic,
}

/// A locally advertised service, parsed from the textual form clients hand
/// over: `upnp <version> <name>` or `bonjour <query hex> <response hex>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalServiceSpec {
    Upnp { version: u8, service: String },
    Bonjour { query: Vec<u8>, response: Vec<u8> },
}

impl LocalServiceSpec {
    pub fn kind(&self) -> ServiceKind {
        match self {
            LocalServiceSpec::Upnp { .. } => ServiceKind::Upnp,
            LocalServiceSpec::Bonjour { .. } => ServiceKind::Bonjour,
        }
    }

    /// Parses a service-info string for registration. Unknown kinds, wrong
    /// arity, non-hex payloads and empty input are all local validation
    /// failures; nothing malformed is ever forwarded to the HAL.
    pub fn parse(info: &str) -> P2pResult<Self> {
        let mut parts = info.split_whitespace();
        let kind = parts
            .next()
            .ok_or_else(|| P2pError::invalid("empty service info"))?;
        match kind {
            "upnp" => {
                let version = parts
                    .next()
                    .ok_or_else(|| P2pError::invalid("upnp service info missing version"))?;
                let version = u8::from_str_radix(version, 16)
                    .map_err(|_| P2pError::invalid(format!("bad upnp version {version:?}")))?;
                let service = parts.collect::<Vec<_>>().join(" ");
                if service.is_empty() {
                    return Err(P2pError::invalid("upnp service info missing name"));
                }
                Ok(LocalServiceSpec::Upnp { version, service })
            }
            "bonjour" => {
                let query = decode_hex_field(parts.next(), "bonjour query")?;
                let response = decode_hex_field(parts.next(), "bonjour response")?;
                if parts.next().is_some() {
                    return Err(P2pError::invalid("trailing data in bonjour service info"));
                }
                Ok(LocalServiceSpec::Bonjour { query, response })
            }
            other => Err(P2pError::invalid(format!("unknown service kind {other:?}"))),
        }
    }

    /// Parses the removal form of a service-info string.
    ///
    /// Bonjour removal is keyed by the query alone; a trailing response
    /// field, present or absent, is accepted without validation.
    pub fn parse_removal(info: &str) -> P2pResult<ServiceRemoval> {
        let mut parts = info.split_whitespace();
        let kind = parts
            .next()
            .ok_or_else(|| P2pError::invalid("empty service info"))?;
        match kind {
            "upnp" => {
                let version = parts
                    .next()
                    .ok_or_else(|| P2pError::invalid("upnp service info missing version"))?;
                let version = u8::from_str_radix(version, 16)
                    .map_err(|_| P2pError::invalid(format!("bad upnp version {version:?}")))?;
                let service = parts.collect::<Vec<_>>().join(" ");
                if service.is_empty() {
                    return Err(P2pError::invalid("upnp service info missing name"));
                }
                Ok(ServiceRemoval::Upnp { version, service })
            }
            "bonjour" => {
                let query = decode_hex_field(parts.next(), "bonjour query")?;
                Ok(ServiceRemoval::Bonjour { query })
            }
            other => Err(P2pError::invalid(format!("unknown service kind {other:?}"))),
        }
    }
}

/// Key for unregistering a local service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceRemoval {
    Upnp { version: u8, service: String },
    Bonjour { query: Vec<u8> },
}

fn decode_hex_field(field: Option<&str>, what: &str) -> P2pResult<Vec<u8>> {
    let field = field.ok_or_else(|| P2pError::invalid(format!("{what} missing")))?;
    let bytes =
        hex::decode(field).map_err(|_| P2pError::invalid(format!("{what} is not valid hex")))?;
    if bytes.is_empty() {
        return Err(P2pError::invalid(format!("{what} is empty")));
    }
    Ok(bytes)
}

/// A remote service-discovery query a client wants answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceQuery {
    pub kind: ServiceKind,
    /// Target peer, broadcast when absent.
    pub peer: Option<MacAddress>,
    /// Raw query TLV payload handed to the supplicant.
    pub payload: Vec<u8>,
}

impl ServiceQuery {
    pub fn generic(payload: Vec<u8>) -> P2pResult<Self> {
        if payload.is_empty() {
            return Err(P2pError::invalid("service query payload is empty"));
        }
        Ok(ServiceQuery { kind: ServiceKind::Generic, peer: None, payload })
    }

    pub fn from_hex(kind: ServiceKind, payload_hex: &str) -> P2pResult<Self> {
        let payload = decode_hex_field(Some(payload_hex), "service query payload")?;
        Ok(ServiceQuery { kind, peer: None, payload })
    }

    pub fn for_peer(mut self, peer: MacAddress) -> Self {
        self.peer = Some(peer);
        self
    }
}

/// An outstanding remote service-discovery request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRequest {
    /// Locally generated transaction id, always `1..=255`.
    pub id: u8,
    pub query: ServiceQuery,
}

/// Table of outstanding service requests.
///
/// Ids come from a monotonically wrapping counter and are guaranteed unique
/// among currently outstanding requests: allocation searches forward past
/// ids that are still live.
#[derive(Debug, Default)]
pub struct ServiceRequestTable {
    last_id: u8,
    outstanding: BTreeMap<u8, ServiceRequest>,
}

impl ServiceRequestTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a query and returns its transaction id, or `Busy` when all
    /// 255 ids are outstanding.
    pub fn insert(&mut self, query: ServiceQuery) -> P2pResult<u8> {
        if self.outstanding.len() as u16 >= MAX_TRANSACTION_ID as u16 {
            return Err(P2pError::busy("no free service transaction ids"));
        }
        let mut candidate = self.last_id;
        loop {
            candidate = if candidate >= MAX_TRANSACTION_ID { 1 } else { candidate + 1 };
            if !self.outstanding.contains_key(&candidate) {
                break;
            }
        }
        self.last_id = candidate;
        self.outstanding
            .insert(candidate, ServiceRequest { id: candidate, query });
        Ok(candidate)
    }

    /// Removes an outstanding request. Idempotent: unknown ids are a no-op.
    pub fn cancel(&mut self, id: u8) -> Option<ServiceRequest> {
        self.outstanding.remove(&id)
    }

    /// Drops every outstanding request. Idempotent.
    pub fn clear(&mut self) {
        self.outstanding.clear();
    }

    pub fn get(&self, id: u8) -> Option<&ServiceRequest> {
        self.outstanding.get(&id)
    }

    pub fn outstanding(&self) -> impl Iterator<Item = &ServiceRequest> {
        self.outstanding.values()
    }

    pub fn len(&self) -> usize {
        self.outstanding.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outstanding.is_empty()
    }
}
