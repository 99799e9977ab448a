//! Composition root for the monitoring pipeline.
//!
//! Owns the wireless detectors and one asset tracker per configured asset
//! type, exposes the start/stop lifecycle, and surfaces aggregated asset and
//! runtime statistics. Event delivery (queueing, hooks) is wired up by the
//! embedding process; the monitor only produces events.

use crate::assets::{AssetSnapshot, AssetSummary, AssetTracker};
use crate::config::MonitorConfig;
use crate::detect::{DeauthDetector, RogueApDetector};
use crate::models::SecurityEvent;
use crate::telemetry::{ComponentHealth, HealthStatus, RuntimeStats, aggregate_worst_of};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Security monitor orchestration wrapper.
pub struct SecurityMonitor {
    config: MonitorConfig,
    deauth: Mutex<DeauthDetector>,
    rogue_ap: Mutex<RogueApDetector>,
    trackers: HashMap<String, AssetTracker>,
    runtime_stats: Mutex<RuntimeStats>,
    running: AtomicBool,
}

impl SecurityMonitor {
    /// Build a monitor from configuration: detectors seeded with thresholds
    /// and known networks, one tracker per configured asset type.
    #[must_use]
    pub fn new(config: MonitorConfig) -> Self {
        let deauth = DeauthDetector::new(
            config.detectors.deauth_threshold,
            config.detectors.deauth_window_seconds,
        );
        let rogue_ap = RogueApDetector::new(
            config.detectors.known_ssids.clone(),
            config.detectors.known_bssids.clone(),
        );
        let trackers = config
            .trackers
            .iter()
            .map(|(asset_type, tracker_config)| {
                (
                    asset_type.clone(),
                    AssetTracker::new(
                        asset_type.clone(),
                        tracker_config.stale_after_seconds,
                        tracker_config.max_assets,
                    ),
                )
            })
            .collect();

        Self {
            config,
            deauth: Mutex::new(deauth),
            rogue_ap: Mutex::new(rogue_ap),
            trackers,
            runtime_stats: Mutex::new(RuntimeStats::default()),
            running: AtomicBool::new(false),
        }
    }

    /// Start the monitor.
    pub fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
        tracing::info!(node_id = %self.config.node.node_id, "Security monitor started");
    }

    /// Stop the monitor.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        tracing::info!(node_id = %self.config.node.node_id, "Security monitor stopped");
    }

    /// Whether the monitor is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Feed one deauth frame through the flood detector.
    ///
    /// Returns a `deauth_flood` event stamped with this node's id when the
    /// flood threshold was reached.
    pub fn handle_deauth_frame(&self, attacker: &str, target: &str) -> Option<SecurityEvent> {
        let fired = self
            .deauth
            .lock()
            .expect("deauth detector lock poisoned")
            .process_deauth_frame(attacker, target);
        fired.then(|| {
            SecurityEvent::new(
                attacker,
                "station",
                "deauth_flood",
                self.config.node.node_id.as_str(),
            )
            .with_metadata("target", serde_json::json!(target))
        })
    }

    /// Feed one beacon frame through the evil-twin detector.
    pub fn handle_beacon(
        &self,
        bssid: &str,
        ssid: &str,
        channel: u16,
        signal_strength: i16,
    ) -> Option<SecurityEvent> {
        let detection = self
            .rogue_ap
            .lock()
            .expect("rogue AP detector lock poisoned")
            .process_beacon(bssid, ssid, channel, signal_strength);
        detection.map(|hit| hit.into_event(&self.config.node.node_id))
    }

    /// Record an asset observation.
    ///
    /// Delegates to the matching per-type tracker only when the monitor is
    /// running and that asset type's tracking is enabled in configuration;
    /// returns `None` otherwise.
    pub fn observe_asset(
        &self,
        asset_type: &str,
        identifier: &str,
        metadata: Option<HashMap<String, serde_json::Value>>,
    ) -> Option<AssetSnapshot> {
        if !self.is_running() {
            return None;
        }
        let enabled = self
            .config
            .trackers
            .get(asset_type)
            .is_some_and(|tracker_config| tracker_config.enabled);
        if !enabled {
            return None;
        }
        self.trackers
            .get(asset_type)
            .map(|tracker| tracker.observe(identifier, metadata, None))
    }

    /// Per-type asset summaries.
    #[must_use]
    pub fn get_asset_summary(&self) -> HashMap<String, AssetSummary> {
        self.trackers
            .iter()
            .map(|(asset_type, tracker)| (asset_type.clone(), tracker.get_summary()))
            .collect()
    }

    /// Snapshot of one tracker's assets, if that type is configured.
    #[must_use]
    pub fn list_assets(&self, asset_type: &str) -> Option<Vec<AssetSnapshot>> {
        self.trackers.get(asset_type).map(AssetTracker::list_assets)
    }

    /// Replace the runtime counters supplied by the external sniffer layer.
    pub fn update_runtime_stats(&self, counters: HashMap<String, u64>) {
        let mut stats = self.runtime_stats.lock().expect("runtime stats lock poisoned");
        stats.counters = counters;
        stats.updated_at = Some(Utc::now());
    }

    /// Runtime counters, surfaced unchanged.
    #[must_use]
    pub fn get_runtime_stats(&self) -> RuntimeStats {
        self.runtime_stats
            .lock()
            .expect("runtime stats lock poisoned")
            .clone()
    }

    /// Deauth detector stats: in-window frame counts per tracked attacker.
    #[must_use]
    pub fn get_deauth_stats(&self) -> HashMap<String, usize> {
        self.deauth
            .lock()
            .expect("deauth detector lock poisoned")
            .get_stats()
    }

    /// Worst-of health across the monitor's components.
    #[must_use]
    pub fn health_summary(&self) -> (HealthStatus, Vec<ComponentHealth>) {
        let lifecycle = if self.is_running() {
            ComponentHealth::new("monitor", HealthStatus::Healthy)
        } else {
            ComponentHealth::new("monitor", HealthStatus::Unknown).with_message("not running")
        };
        let stats = self.get_runtime_stats();
        let sniffer = if stats.updated_at.is_some() {
            ComponentHealth::new("sniffer", HealthStatus::Healthy)
        } else {
            ComponentHealth::new("sniffer", HealthStatus::Unknown).with_message("no stats received")
        };

        let components = vec![lifecycle, sniffer];
        let overall = aggregate_worst_of(components.iter().map(|c| c.status));
        (overall, components)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;

    fn config() -> MonitorConfig {
        let mut config = MonitorConfig::default();
        config.detectors.known_ssids = vec!["MyNetwork".to_owned()];
        config.detectors.known_bssids = vec!["00:11:22:33:44:55".to_owned()];
        config.trackers.insert("drone".to_owned(), TrackerConfig {
            enabled: true,
            stale_after_seconds: 300,
            max_assets: 10,
        });
        config.trackers.insert("vehicle".to_owned(), TrackerConfig {
            enabled: false,
            stale_after_seconds: 300,
            max_assets: 10,
        });
        config
    }

    #[test]
    fn lifecycle_toggles_running() {
        let monitor = SecurityMonitor::new(config());
        assert!(!monitor.is_running());
        monitor.start();
        assert!(monitor.is_running());
        monitor.stop();
        assert!(!monitor.is_running());
    }

    #[test]
    fn observe_asset_requires_running_and_enabled() {
        let monitor = SecurityMonitor::new(config());

        // Not running yet.
        assert!(monitor.observe_asset("drone", "dji-001", None).is_none());

        monitor.start();
        let snapshot = monitor.observe_asset("drone", "dji-001", None);
        assert!(snapshot.is_some());

        // Disabled type and unknown type both refuse.
        assert!(monitor.observe_asset("vehicle", "plate-1", None).is_none());
        assert!(monitor.observe_asset("boat", "hull-1", None).is_none());
    }

    #[test]
    fn asset_summary_aggregates_per_type() {
        let monitor = SecurityMonitor::new(config());
        monitor.start();
        monitor.observe_asset("drone", "dji-001", None);
        monitor.observe_asset("drone", "dji-002", None);

        let summary = monitor.get_asset_summary();
        assert_eq!(summary.get("drone").map(|s| s.total), Some(2));
        assert_eq!(summary.get("vehicle").map(|s| s.total), Some(0));
    }

    #[test]
    fn deauth_glue_emits_event_on_threshold() {
        let mut cfg = config();
        cfg.detectors.deauth_threshold = 2;
        let monitor = SecurityMonitor::new(cfg);
        monitor.start();

        assert!(monitor.handle_deauth_frame("de:ad:be:ef:00:01", "victim").is_none());
        let event = monitor
            .handle_deauth_frame("de:ad:be:ef:00:01", "victim")
            .expect("flood event");
        assert_eq!(event.detection_type, "deauth_flood");
        assert_eq!(event.source_id, "de:ad:be:ef:00:01");
        assert_eq!(event.node_id, "skywarden-node");
        assert!(monitor.get_deauth_stats().is_empty());
    }

    #[test]
    fn beacon_glue_emits_evil_twin_event() {
        let monitor = SecurityMonitor::new(config());
        monitor.start();

        assert!(monitor
            .handle_beacon("00:11:22:33:44:55", "MyNetwork", 6, -50)
            .is_none());
        let event = monitor
            .handle_beacon("AA:BB:CC:DD:EE:FF", "MyNetwork", 6, -50)
            .expect("evil twin event");
        assert_eq!(event.detection_type, "evil_twin");
    }

    #[test]
    fn runtime_stats_pass_through_unchanged() {
        let monitor = SecurityMonitor::new(config());
        let mut counters = HashMap::new();
        counters.insert("frames_processed".to_owned(), 1234_u64);
        counters.insert("beacons_seen".to_owned(), 56_u64);
        monitor.update_runtime_stats(counters.clone());

        let stats = monitor.get_runtime_stats();
        assert_eq!(stats.counters, counters);
        assert!(stats.updated_at.is_some());
    }

    #[test]
    fn health_reflects_lifecycle_and_stats() {
        let monitor = SecurityMonitor::new(config());
        let (overall, _) = monitor.health_summary();
        assert_eq!(overall, HealthStatus::Unknown);

        monitor.start();
        monitor.update_runtime_stats(HashMap::new());
        let (overall, components) = monitor.health_summary();
        assert_eq!(overall, HealthStatus::Healthy);
        assert_eq!(components.len(), 2);
    }
}
