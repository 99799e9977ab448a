//! Wireless attack detectors.
//!
//! Detectors consume pre-parsed observations from the external sniffer layer
//! and emit discrete detections. They never reject input: malformed or empty
//! fields simply have no counting effect.

pub mod deauth;
pub mod rogue_ap;

pub use deauth::DeauthDetector;
pub use rogue_ap::{EvilTwinDetection, RogueApDetector};
