//! Ports to external collaborators.
//!
//! The state machine never blocks on these: prompts are fire-and-forget and
//! answers come back through the service queue as ordinary messages.

use async_trait::async_trait;

use crate::event::DecisionPrompt;
use crate::intent::{DbsCapability, StaBand};

/// Presents accept/decline choices to whoever owns the UI.
///
/// Implementations must not answer inline; the eventual decision is delivered
/// to the service handle keyed by the prompt id.
#[async_trait]
pub trait DecisionPort: Send + Sync {
    async fn request_decision(&self, prompt: DecisionPrompt);
}

/// Current station-mode link, as far as group-owner intent selection cares.
/// `StaBand::None` means no station connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaLinkInfo {
    pub band: StaBand,
    pub dbs: DbsCapability,
}

impl Default for StaLinkInfo {
    fn default() -> Self {
        StaLinkInfo { band: StaBand::None, dbs: DbsCapability::default() }
    }
}

/// Window onto the station-mode side of the Wi-Fi stack.
#[async_trait]
pub trait StationController: Send + Sync {
    /// Band and DBS capability snapshot used for intent selection.
    async fn link_info(&self) -> StaLinkInfo;

    /// Ask the station-mode owner to drop its connection, clearing a
    /// frequency conflict the user chose to resolve in P2P's favor.
    async fn request_disconnect(&self);
}
