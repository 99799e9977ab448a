#![forbid(unsafe_code)]

//! skywarden: wireless security monitoring and autonomous response core.
//!
//! This library provides the alert pipeline shared by all skywarden deployments:
//! - Detectors that turn raw wireless observations into discrete security events
//! - A bounded, time-aware registry of transient physical assets
//! - An event queue that deduplicates, debounces, and batches matched alerts
//! - A hook manager that routes batched alerts to automated response tasks
//!   under per-binding cooldown
//! - A composition root tying detectors, trackers, and runtime stats together
//!
//! Raw packet capture, rule matching, task execution, and durable storage are
//! external collaborators; this crate decides whether and when a bound
//! response fires and what context it carries.

pub mod assets;
pub mod config;
pub mod detect;
pub mod hooks;
pub mod models;
pub mod monitor;
pub mod queue;
pub mod telemetry;
