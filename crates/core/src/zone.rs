//! Health-factor zones driving re-scan priority.
//!
//! Every borrower row maps to exactly one zone; each zone except Green has
//! a periodic monitor re-reading its users at a zone-specific cadence.

use vigil_store::{HfBand, HF_NO_DEBT};

use crate::config::ZoneConfig;

/// Urgency bucket derived from a health factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Zone {
    /// No debt (infinite health); never re-scanned.
    Green,
    /// Comfortable margin, slowest cadence.
    Yellow,
    /// Approaching the red threshold.
    Orange,
    /// Close to liquidation.
    Red,
    /// Below 1: liquidatable now.
    Urgent,
}

impl Zone {
    /// Classify a stored health factor. Total: every f64 lands in a zone,
    /// the `-1` sentinel in Green and anything below 1 in Urgent.
    pub fn classify(hf: f64, zones: &ZoneConfig) -> Zone {
        if hf == HF_NO_DEBT {
            return Zone::Green;
        }
        if hf < 1.0 {
            return Zone::Urgent;
        }
        if hf <= zones.red_threshold {
            return Zone::Red;
        }
        if hf <= zones.orange_threshold {
            return Zone::Orange;
        }
        Zone::Yellow
    }

    /// The health-factor band the store uses to select this zone's users.
    pub fn band(self, zones: &ZoneConfig) -> HfBand {
        match self {
            Zone::Green => HfBand::NoDebt,
            Zone::Urgent => HfBand::Under(1.0),
            Zone::Red => HfBand::Closed(1.0, zones.red_threshold),
            Zone::Orange => HfBand::HalfOpen(zones.red_threshold, zones.orange_threshold),
            Zone::Yellow => HfBand::Above(zones.orange_threshold),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Zone::Green => "green",
            Zone::Yellow => "yellow",
            Zone::Orange => "orange",
            Zone::Red => "red",
            Zone::Urgent => "urgent",
        }
    }

    /// Zones that get a periodic monitor.
    pub fn monitored() -> [Zone; 4] {
        [Zone::Urgent, Zone::Red, Zone::Orange, Zone::Yellow]
    }
}

impl std::fmt::Display for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zones() -> ZoneConfig {
        ZoneConfig {
            red_threshold: 1.1,
            orange_threshold: 1.5,
        }
    }

    #[test]
    fn test_classify_is_total() {
        let z = zones();
        assert_eq!(Zone::classify(HF_NO_DEBT, &z), Zone::Green);
        assert_eq!(Zone::classify(0.0, &z), Zone::Urgent);
        assert_eq!(Zone::classify(0.99, &z), Zone::Urgent);
        assert_eq!(Zone::classify(1.0, &z), Zone::Red);
        assert_eq!(Zone::classify(1.1, &z), Zone::Red);
        assert_eq!(Zone::classify(1.11, &z), Zone::Orange);
        assert_eq!(Zone::classify(1.5, &z), Zone::Orange);
        assert_eq!(Zone::classify(1.51, &z), Zone::Yellow);
        assert_eq!(Zone::classify(f64::MAX, &z), Zone::Yellow);
        // Anything negative that is not the sentinel still classifies.
        assert_eq!(Zone::classify(-0.5, &z), Zone::Urgent);
    }

    #[test]
    fn test_band_boundaries_match_classification() {
        let z = zones();
        // A Red user selected by the Red band classifies back to Red.
        for (zone, hf) in [
            (Zone::Urgent, 0.9),
            (Zone::Red, 1.05),
            (Zone::Orange, 1.3),
            (Zone::Yellow, 2.0),
        ] {
            assert_eq!(Zone::classify(hf, &z), zone);
            match zone.band(&z) {
                HfBand::Under(max) => assert!(hf < max),
                HfBand::Closed(min, max) => assert!(hf >= min && hf <= max),
                HfBand::HalfOpen(min, max) => assert!(hf > min && hf <= max),
                HfBand::Above(min) => assert!(hf > min),
                HfBand::NoDebt => unreachable!(),
            }
        }
    }
}
