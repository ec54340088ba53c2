//! Wi-Fi channel arithmetic used when pinning the operating channel.

use crate::error::{P2pError, P2pResult};

/// Operating class for the 2.4 GHz social channels, per the global operating
/// class table.
pub const OPERATING_CLASS_2_4_GHZ: u32 = 81;

/// Converts a channel number to its center frequency in MHz.
///
/// Covers the 2.4 GHz band (channels 1-14) and the 5 GHz band
/// (channels 36-165). Anything else is rejected locally.
pub fn channel_to_frequency_mhz(channel: u32) -> P2pResult<u32> {
    match channel {
        1..=13 => Ok(2407 + 5 * channel),
        14 => Ok(2484),
        36..=165 => Ok(5000 + 5 * channel),
        _ => Err(P2pError::invalid(format!("unknown channel {channel}"))),
    }
}

/// Frequency ranges that exclude everything except `freq_mhz`, used to pin
/// the operating channel through the HAL's disallowed-frequency interface.
pub fn pin_frequency_ranges(freq_mhz: u32) -> [(u32, u32); 2] {
    [(1000, freq_mhz - 5), (freq_mhz + 5, 6000)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn social_channels_map_to_expected_frequencies() {
        assert_eq!(channel_to_frequency_mhz(1).unwrap(), 2412);
        assert_eq!(channel_to_frequency_mhz(6).unwrap(), 2437);
        assert_eq!(channel_to_frequency_mhz(11).unwrap(), 2462);
        assert_eq!(channel_to_frequency_mhz(14).unwrap(), 2484);
    }

    #[test]
    fn five_ghz_channels() {
        assert_eq!(channel_to_frequency_mhz(36).unwrap(), 5180);
        assert_eq!(channel_to_frequency_mhz(165).unwrap(), 5825);
    }

    #[test]
    fn unknown_channels_are_rejected() {
        assert!(channel_to_frequency_mhz(0).is_err());
        assert!(channel_to_frequency_mhz(15).is_err());
        assert!(channel_to_frequency_mhz(200).is_err());
    }

    #[test]
    fn pin_ranges_bracket_the_frequency() {
        let [low, high] = pin_frequency_ranges(2437);
        assert_eq!(low, (1000, 2432));
        assert_eq!(high, (2442, 6000));
    }
}
