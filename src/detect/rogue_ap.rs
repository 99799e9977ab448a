//! Evil-twin access point detection.
//!
//! Compares observed beacons against a registry of known networks. An alert
//! fires only when a known SSID is broadcast from an unrecognized BSSID;
//! entirely unknown networks are recorded but never alerted on.

use crate::models::SecurityEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A spoofed known network observed on the air.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvilTwinDetection {
    /// Known SSID being spoofed
    pub ssid: String,
    /// Unrecognized BSSID broadcasting it, as seen on the air
    pub bssid: String,
    /// Channel the beacon was seen on
    pub channel: u16,
    /// Received signal strength in dBm
    pub signal_strength: i16,
}

impl EvilTwinDetection {
    /// Convert this detection into a [`SecurityEvent`] stamped with `node_id`.
    #[must_use]
    pub fn into_event(self, node_id: &str) -> SecurityEvent {
        SecurityEvent::new(self.bssid.clone(), "access_point", "evil_twin", node_id)
            .with_metadata("ssid", serde_json::json!(self.ssid))
            .with_metadata("channel", serde_json::json!(self.channel))
            .with_metadata("signal_strength", serde_json::json!(self.signal_strength))
    }
}

/// An access point sighting retained for situational awareness.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApSighting {
    /// SSID last broadcast by this BSSID
    pub ssid: String,
    /// Channel of the most recent beacon
    pub channel: u16,
    /// Signal strength of the most recent beacon in dBm
    pub signal_strength: i16,
    /// Time of the most recent beacon
    pub last_seen: DateTime<Utc>,
    /// Beacons observed from this BSSID
    pub beacon_count: u64,
}

/// Known-network registry flagging evil-twin access points.
#[derive(Debug, Default)]
pub struct RogueApDetector {
    known_ssids: HashSet<String>,
    /// Known BSSIDs, normalized to lowercase for comparison
    known_bssids: HashSet<String>,
    /// Informational cache of observed access points, keyed by normalized BSSID
    seen_aps: HashMap<String, ApSighting>,
}

impl RogueApDetector {
    /// Create a detector seeded with known SSIDs and their legitimate BSSIDs.
    #[must_use]
    pub fn new(
        known_ssids: impl IntoIterator<Item = String>,
        known_bssids: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            known_ssids: known_ssids.into_iter().collect(),
            known_bssids: known_bssids
                .into_iter()
                .map(|b| b.to_ascii_lowercase())
                .collect(),
            seen_aps: HashMap::new(),
        }
    }

    /// Register an additional known network.
    pub fn add_known_network(&mut self, ssid: &str, bssid: &str) {
        self.known_ssids.insert(ssid.to_owned());
        self.known_bssids.insert(bssid.to_ascii_lowercase());
    }

    /// Process one beacon frame.
    ///
    /// Returns a detection when `ssid` is a known network but `bssid` is not a
    /// recognized broadcaster for it. All other beacons, including entirely
    /// unknown networks, are recorded in the sighting cache and return `None`.
    pub fn process_beacon(
        &mut self,
        bssid: &str,
        ssid: &str,
        channel: u16,
        signal_strength: i16,
    ) -> Option<EvilTwinDetection> {
        if bssid.is_empty() {
            return None;
        }

        let normalized = bssid.to_ascii_lowercase();
        if self.known_ssids.contains(ssid) && !self.known_bssids.contains(&normalized) {
            tracing::warn!(
                ssid = %ssid,
                bssid = %bssid,
                channel,
                signal_strength,
                "Evil twin access point detected"
            );
            return Some(EvilTwinDetection {
                ssid: ssid.to_owned(),
                bssid: bssid.to_owned(),
                channel,
                signal_strength,
            });
        }

        let now = Utc::now();
        let sighting = self.seen_aps.entry(normalized).or_insert(ApSighting {
            ssid: ssid.to_owned(),
            channel,
            signal_strength,
            last_seen: now,
            beacon_count: 0,
        });
        sighting.ssid = ssid.to_owned();
        sighting.channel = channel;
        sighting.signal_strength = signal_strength;
        sighting.last_seen = now;
        sighting.beacon_count += 1;

        None
    }

    /// Number of distinct access points in the sighting cache.
    #[must_use]
    pub fn seen_ap_count(&self) -> usize {
        self.seen_aps.len()
    }

    /// Snapshot of the sighting cache, keyed by normalized BSSID.
    #[must_use]
    pub fn seen_aps(&self) -> HashMap<String, ApSighting> {
        self.seen_aps.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> RogueApDetector {
        RogueApDetector::new(
            vec!["MyNetwork".to_owned()],
            vec!["00:11:22:33:44:55".to_owned()],
        )
    }

    #[test]
    fn spoofed_known_ssid_fires() {
        let mut det = detector();
        let hit = det
            .process_beacon("AA:BB:CC:DD:EE:FF", "MyNetwork", 6, -50)
            .expect("evil twin expected");
        assert_eq!(hit.ssid, "MyNetwork");
        assert_eq!(hit.bssid, "AA:BB:CC:DD:EE:FF");
        assert_eq!(hit.channel, 6);
        assert_eq!(hit.signal_strength, -50);
    }

    #[test]
    fn legitimate_bssid_is_quiet() {
        let mut det = detector();
        assert!(det
            .process_beacon("00:11:22:33:44:55", "MyNetwork", 6, -50)
            .is_none());
        assert_eq!(det.seen_ap_count(), 1);
    }

    #[test]
    fn bssid_comparison_ignores_case() {
        let mut det = detector();
        assert!(det
            .process_beacon("00:11:22:33:44:55".to_uppercase().as_str(), "MyNetwork", 6, -50)
            .is_none());
    }

    #[test]
    fn unknown_network_is_recorded_not_alerted() {
        let mut det = detector();
        assert!(det
            .process_beacon("12:34:56:78:9a:bc", "CoffeeShopWifi", 11, -70)
            .is_none());
        assert!(det
            .process_beacon("12:34:56:78:9a:bc", "CoffeeShopWifi", 11, -68)
            .is_none());

        let aps = det.seen_aps();
        let sighting = aps.get("12:34:56:78:9a:bc").expect("sighting recorded");
        assert_eq!(sighting.beacon_count, 2);
        assert_eq!(sighting.signal_strength, -68);
    }

    #[test]
    fn added_network_is_protected() {
        let mut det = detector();
        det.add_known_network("GuestNet", "66:77:88:99:AA:BB");
        assert!(det
            .process_beacon("66:77:88:99:aa:bb", "GuestNet", 1, -40)
            .is_none());
        assert!(det
            .process_beacon("de:ad:be:ef:00:00", "GuestNet", 1, -40)
            .is_some());
    }

    #[test]
    fn detection_converts_to_event() {
        let hit = EvilTwinDetection {
            ssid: "MyNetwork".to_owned(),
            bssid: "AA:BB:CC:DD:EE:FF".to_owned(),
            channel: 6,
            signal_strength: -50,
        };
        let event = hit.into_event("node-1");
        assert_eq!(event.detection_type, "evil_twin");
        assert_eq!(event.source_id, "AA:BB:CC:DD:EE:FF");
        assert_eq!(event.node_id, "node-1");
        assert_eq!(event.metadata.get("ssid"), Some(&serde_json::json!("MyNetwork")));
    }
}
