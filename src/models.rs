//! Core data models for skywarden.
//!
//! This module defines the primary data structures used throughout the system:
//! - SecurityEvent: a discrete detection produced by a detector or sensor
//! - AlertRule: a matching rule owned by the external rule engine
//! - TaskDefinition: an automated response task dispatched by the hook manager
//! - TaskRunOutcome: the result reported by the external task runner

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A discrete security event produced by a detector.
///
/// Events are immutable once created; detectors build them with [`SecurityEvent::new`]
/// and the `with_*` builders and never touch them again.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SecurityEvent {
    /// Identifier of the entity that triggered the event (MAC, camera id, ...)
    pub source_id: String,
    /// Event creation timestamp
    pub timestamp: DateTime<Utc>,
    /// Classification of the observed entity ("person", "drone", ...)
    pub class_name: String,
    /// Kind of detection that produced the event ("deauth_flood", "evil_twin", ...)
    pub detection_type: String,
    /// Tracker-assigned id when the event came from an object tracker
    pub track_id: Option<u64>,
    /// Identifier of the node that observed the event
    pub node_id: String,
    /// Additional context data
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl SecurityEvent {
    /// Create a new event with empty metadata, stamped with the current time.
    pub fn new(
        source_id: impl Into<String>,
        class_name: impl Into<String>,
        detection_type: impl Into<String>,
        node_id: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            timestamp: Utc::now(),
            class_name: class_name.into(),
            detection_type: detection_type.into(),
            track_id: None,
            node_id: node_id.into(),
            metadata: HashMap::new(),
        }
    }

    /// Add a metadata entry to the event.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Set the tracker-assigned id for this event.
    #[must_use]
    pub fn with_track_id(mut self, track_id: u64) -> Self {
        self.track_id = Some(track_id);
        self
    }
}

/// Alert rule definition.
///
/// Rules are owned and matched by the external rule engine; this crate only
/// reads them to key deduplication and look up response bindings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertRule {
    /// Unique rule name
    pub name: String,
    /// Event detection types this rule applies to
    pub event_types: HashSet<String>,
    /// Glob pattern matched against event source ids (`*` and `?` wildcards)
    pub source_pattern: String,
    /// Field -> expected value conditions evaluated by the rule engine
    #[serde(default)]
    pub conditions: HashMap<String, serde_json::Value>,
    /// Per-rule cooldown override; falls back to the configured default when unset
    pub cooldown_override_seconds: Option<u64>,
}

impl AlertRule {
    /// Create a rule matching any source, with no conditions.
    pub fn new(name: impl Into<String>, event_types: impl IntoIterator<Item = String>) -> Self {
        Self {
            name: name.into(),
            event_types: event_types.into_iter().collect(),
            source_pattern: "*".to_owned(),
            conditions: HashMap::new(),
            cooldown_override_seconds: None,
        }
    }

    /// Set the source glob pattern.
    #[must_use]
    pub fn with_source_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.source_pattern = pattern.into();
        self
    }

    /// Set a per-rule cooldown override in seconds.
    #[must_use]
    pub fn with_cooldown_override(mut self, seconds: u64) -> Self {
        self.cooldown_override_seconds = Some(seconds);
        self
    }

    /// Check whether a source id matches this rule's source pattern.
    ///
    /// Supports `*` (any run of characters) and `?` (any single character),
    /// the same matching the external rule engine applies.
    #[must_use]
    pub fn matches_source(&self, source_id: &str) -> bool {
        wildcard_match(&self.source_pattern, source_id)
    }
}

/// Match `text` against `pattern` where `*` matches any run of characters and
/// `?` matches exactly one.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    // Iterative matcher with single-star backtracking
    let (mut pi, mut ti) = (0_usize, 0_usize);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((star_pi, star_ti)) = star {
            pi = star_pi + 1;
            ti = star_ti + 1;
            star = Some((star_pi, star_ti + 1));
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

/// An automated response task, as stored by the external task repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskDefinition {
    /// Unique task name
    pub name: String,
    /// Prompt handed to the task runner
    pub prompt: Option<String>,
    /// Task metadata; `alert_rules` holds the rule names this task is bound to
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl TaskDefinition {
    /// Create a new task definition.
    pub fn new(name: impl Into<String>, prompt: Option<String>) -> Self {
        Self {
            name: name.into(),
            prompt,
            metadata: HashMap::new(),
        }
    }

    /// Add a metadata entry to the task.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Return a copy of this task with its prompt replaced.
    ///
    /// The original task is never mutated; the hook manager uses this to
    /// inject alert context into a dispatch-time copy.
    #[must_use]
    pub fn with_prompt(&self, prompt: impl Into<String>) -> Self {
        let mut copy = self.clone();
        copy.prompt = Some(prompt.into());
        copy
    }

    /// Rule names this task is bound to, read from the `alert_rules` metadata key.
    #[must_use]
    pub fn bound_rule_names(&self) -> Vec<String> {
        match self.metadata.get("alert_rules") {
            Some(serde_json::Value::Array(names)) => names
                .iter()
                .filter_map(|v| v.as_str().map(str::to_owned))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Result reported by the external task runner for one dispatch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskRunOutcome {
    /// Whether the task completed successfully
    pub success: bool,
    /// Runner response text
    pub response_text: String,
    /// Error detail when the run failed
    pub error: Option<String>,
}
