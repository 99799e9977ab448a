//! Deauthentication flood detection.
//!
//! Keeps a sliding window of deauth frame timestamps per attacker and fires
//! once the in-window count reaches the configured threshold. Firing resets
//! the attacker's window so a sustained flood produces one alert per
//! threshold's worth of frames rather than one per frame.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Per-source sliding-window counter flagging deauthentication floods.
#[derive(Debug)]
pub struct DeauthDetector {
    /// Frame timestamps per attacker, pruned to the window on each frame
    windows: HashMap<String, Vec<Instant>>,
    threshold: usize,
    window: Duration,
}

impl Default for DeauthDetector {
    fn default() -> Self {
        Self::new(10, 10)
    }
}

impl DeauthDetector {
    /// Create a detector firing after `threshold` frames within `window_seconds`.
    #[must_use]
    pub fn new(threshold: usize, window_seconds: u64) -> Self {
        Self {
            windows: HashMap::new(),
            threshold,
            window: Duration::from_secs(window_seconds),
        }
    }

    /// Record one deauth frame from `attacker` against `target`.
    ///
    /// Returns `true` when the attacker's in-window frame count reached the
    /// threshold; the attacker's window is cleared at that point so it will
    /// not appear in the next [`get_stats`](Self::get_stats) snapshot.
    pub fn process_deauth_frame(&mut self, attacker: &str, target: &str) -> bool {
        if attacker.is_empty() {
            return false;
        }

        let now = Instant::now();
        let timestamps = self.windows.entry(attacker.to_owned()).or_default();
        timestamps.push(now);

        let window = self.window;
        timestamps.retain(|seen| now.duration_since(*seen) <= window);

        if timestamps.len() >= self.threshold {
            tracing::warn!(
                attacker = %attacker,
                target = %target,
                frames = timestamps.len(),
                window_secs = self.window.as_secs(),
                "Deauthentication flood detected"
            );
            self.windows.remove(attacker);
            return true;
        }

        false
    }

    /// In-window frame counts per attacker still tracked.
    ///
    /// Attackers whose window was cleared by an alert are omitted, as are
    /// attackers whose every recorded frame has aged out.
    #[must_use]
    pub fn get_stats(&self) -> HashMap<String, usize> {
        let now = Instant::now();
        self.windows
            .iter()
            .filter_map(|(attacker, timestamps)| {
                let recent = timestamps
                    .iter()
                    .filter(|seen| now.duration_since(**seen) <= self.window)
                    .count();
                (recent > 0).then(|| (attacker.clone(), recent))
            })
            .collect()
    }

    /// Number of attackers currently tracked.
    #[must_use]
    pub fn tracked_attackers(&self) -> usize {
        self.windows.len()
    }
}
