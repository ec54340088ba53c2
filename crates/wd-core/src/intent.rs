//! Group-owner intent selection.
//!
//! Peers compare intent values to break negotiation ties, so the mapping
//! below must stay stable bit-for-bit across releases.

use serde::{Deserialize, Serialize};

pub const DEFAULT_GROUP_OWNER_INTENT: u8 = 6;
pub const MAX_GROUP_OWNER_INTENT: u8 = 15;

/// Band of the device's current station-mode connection, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaBand {
    None,
    Band2Ghz,
    Band5Ghz,
    Band6Ghz,
}

/// Dual-band-simultaneous capability flags declared by the chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DbsCapability {
    pub dbs_2g4_5g: bool,
    pub dbs_5g_6g: bool,
}

/// Selects the group-owner intent for a connect request that asked for
/// automatic selection.
///
/// STA band | 2.4/5 DBS | 5/6 DBS | intent
/// ---------|-----------|---------|-------
/// none     |     x     |    x    |   6
/// 2.4 GHz  |    no     |    x    |   5
/// 2.4 GHz  |    yes    |    x    |   7
/// 5 GHz    |    no     |   no    |   3
/// 5 GHz    |    yes    |    x    |  10
/// 5 GHz    |    no     |   yes   |  10
/// 6 GHz    |     x     |   no    |   3
/// 6 GHz    |     x     |   yes   |  12
pub fn select_group_owner_intent(sta_band: StaBand, dbs: DbsCapability) -> u8 {
    match sta_band {
        StaBand::None => DEFAULT_GROUP_OWNER_INTENT,
        StaBand::Band2Ghz => {
            if dbs.dbs_2g4_5g {
                7
            } else {
                5
            }
        }
        StaBand::Band5Ghz => {
            if dbs.dbs_5g_6g || dbs.dbs_2g4_5g {
                10
            } else {
                3
            }
        }
        StaBand::Band6Ghz => {
            if dbs.dbs_5g_6g {
                12
            } else {
                3
            }
        }
    }
}
