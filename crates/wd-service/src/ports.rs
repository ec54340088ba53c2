//! Default implementations of the external-collaborator ports, for hosts
//! that have no UI or no station-mode stack to wire in.

use async_trait::async_trait;
use tracing::info;

use wd_core::event::DecisionPrompt;
use wd_core::ports::{DecisionPort, StaLinkInfo, StationController};

/// Decision port for headless hosts. Prompts are logged and left pending; an
/// unanswered prompt times out through the ordinary authorization timer, so
/// nothing is ever silently accepted.
#[derive(Debug, Default)]
pub struct UnattendedDecisionPort;

#[async_trait]
impl DecisionPort for UnattendedDecisionPort {
    async fn request_decision(&self, prompt: DecisionPrompt) {
        info!(?prompt, "decision requested with no UI attached");
    }
}

/// Station controller for devices without concurrent station mode: reports
/// no link (so intent selection uses the default) and treats disconnect
/// requests as a no-op.
#[derive(Debug, Default)]
pub struct NoStationController;

#[async_trait]
impl StationController for NoStationController {
    async fn link_info(&self) -> StaLinkInfo {
        StaLinkInfo::default()
    }

    async fn request_disconnect(&self) {}
}
