use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::address::MacAddress;
use crate::group::{GroupConfig, P2pGroup, WpsMethod};

/// A connection attempt in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingConnect {
    /// Connection-event id, used to key decision prompts and results.
    pub id: Uuid,
    pub config: GroupConfig,
    /// Pin the HAL generated for a Display setup, once known.
    pub generated_pin: Option<String>,
    /// Whether the originating client already got its command reply.
    pub replied: bool,
}

impl PendingConnect {
    pub fn new(config: GroupConfig) -> Self {
        PendingConnect { id: Uuid::new_v4(), config, generated_pin: None, replied: false }
    }
}

/// A peer-initiated negotiation waiting for local authorization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingNegotiation {
    pub id: Uuid,
    pub peer: MacAddress,
    pub wps: WpsMethod,
}

/// Connection state machine states.
///
/// `Disabled` is both the initial state and the recoverable terminal every
/// state falls back to when the HAL dies; re-entering requires an explicit
/// enable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum P2pState {
    Disabled,
    Idle,
    ProvisionDiscovery { pending: PendingConnect },
    GroupNegotiation { pending: PendingConnect },
    UserAuthorizingNegotiationRequest { request: IncomingNegotiation },
    FrequencyConflict { pending: PendingConnect },
    GroupCreated { group: P2pGroup },
}

impl P2pState {
    pub fn name(&self) -> &'static str {
        match self {
            P2pState::Disabled => "Disabled",
            P2pState::Idle => "Idle",
            P2pState::ProvisionDiscovery { .. } => "ProvisionDiscovery",
            P2pState::GroupNegotiation { .. } => "GroupNegotiation",
            P2pState::UserAuthorizingNegotiationRequest { .. } => {
                "UserAuthorizingNegotiationRequest"
            }
            P2pState::FrequencyConflict { .. } => "FrequencyConflict",
            P2pState::GroupCreated { .. } => "GroupCreated",
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, P2pState::Disabled)
    }

    /// The connection attempt currently pending, if any.
    pub fn pending_connect(&self) -> Option<&PendingConnect> {
        match self {
            P2pState::ProvisionDiscovery { pending }
            | P2pState::GroupNegotiation { pending }
            | P2pState::FrequencyConflict { pending } => Some(pending),
            _ => None,
        }
    }
}
