//! Alert-to-task response dispatch.
//!
//! The hook manager maps alert rules to automated response tasks. Bindings
//! are rebuilt from task metadata on load; each dispatch copies the bound
//! task, injects alert context into its prompt, and hands it to the external
//! task runner under a per-(task, rule) cooldown. Execution bookkeeping goes
//! through the external task repository.
//!
//! Dispatch runs inline: when wired as an [`EventQueue`](crate::queue::EventQueue)
//! flush callback, a slow task runner delays subsequent flush processing.
//! Callers wanting low-latency flushing should offload to their own task.

use crate::config::HookConfig;
use crate::models::{AlertRule, SecurityEvent, TaskDefinition, TaskRunOutcome};
use crate::queue::{FlushCallback, PendingAlert};
use async_trait::async_trait;
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// External task storage contract.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Fetch a task definition by name.
    async fn get_by_name(&self, name: &str) -> anyhow::Result<Option<TaskDefinition>>;

    /// List every stored task definition.
    async fn list_tasks(&self) -> anyhow::Result<Vec<TaskDefinition>>;

    /// Record the start of a task execution; returns an execution id.
    async fn record_execution(&self, task_name: &str, rule_name: &str) -> anyhow::Result<String>;

    /// Record the outcome of a previously started execution.
    async fn complete_execution(
        &self,
        execution_id: &str,
        success: bool,
        response: &str,
        error: Option<&str>,
    ) -> anyhow::Result<()>;
}

/// External task execution contract.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    /// Run a task to completion within `timeout`.
    async fn run(&self, task: &TaskDefinition, timeout: Duration) -> anyhow::Result<TaskRunOutcome>;
}

struct HookState {
    loaded: bool,
    /// rule name -> bound task names, built from task metadata at load time
    rule_to_tasks: HashMap<String, Vec<String>>,
    /// (task name, rule name) -> last dispatch start, monotonic
    cooldowns: HashMap<(String, String), Instant>,
}

/// Routes batched alerts to automated response tasks under cooldown.
pub struct HookManager {
    repository: Arc<dyn TaskRepository>,
    runner: Arc<dyn TaskRunner>,
    default_cooldown_seconds: u64,
    task_timeout: Duration,
    state: Mutex<HookState>,
}

impl HookManager {
    /// Create a manager over the given repository and runner.
    #[must_use]
    pub fn new(
        repository: Arc<dyn TaskRepository>,
        runner: Arc<dyn TaskRunner>,
        config: &HookConfig,
    ) -> Self {
        Self {
            repository,
            runner,
            default_cooldown_seconds: config.cooldown_seconds,
            task_timeout: Duration::from_secs(config.task_timeout_seconds),
            state: Mutex::new(HookState {
                loaded: false,
                rule_to_tasks: HashMap::new(),
                cooldowns: HashMap::new(),
            }),
        }
    }

    /// Rebuild rule bindings from the repository's task metadata.
    ///
    /// Every stored task contributes one binding per rule name in its
    /// `alert_rules` metadata. Existing cooldown history is preserved across
    /// reloads.
    pub async fn reload_bindings(&self) -> anyhow::Result<()> {
        let tasks = self.repository.list_tasks().await?;

        let mut rule_to_tasks: HashMap<String, Vec<String>> = HashMap::new();
        for task in &tasks {
            for rule_name in task.bound_rule_names() {
                rule_to_tasks.entry(rule_name).or_default().push(task.name.clone());
            }
        }

        let mut state = self.state.lock().await;
        let bindings: usize = rule_to_tasks.values().map(Vec::len).sum();
        tracing::info!(
            tasks = tasks.len(),
            rules = rule_to_tasks.len(),
            bindings,
            "Loaded alert hook bindings"
        );
        state.rule_to_tasks = rule_to_tasks;
        state.loaded = true;
        Ok(())
    }

    /// Total number of bindings across all rules (not distinct rules).
    pub async fn hook_count(&self) -> usize {
        let state = self.state.lock().await;
        state.rule_to_tasks.values().map(Vec::len).sum()
    }

    /// Whether bindings have been loaded.
    pub async fn is_loaded(&self) -> bool {
        self.state.lock().await.loaded
    }

    /// Dispatch every task bound to `rule` for one alert.
    ///
    /// No-op when bindings are not loaded or the rule has no bound tasks.
    /// Per task: repository miss and cooldown suppression skip with a log
    /// entry; dispatch and bookkeeping failures are logged and never prevent
    /// the remaining bound tasks from running. Nothing propagates to the
    /// caller.
    pub async fn on_alert(&self, message: &str, rule: &AlertRule, event: &SecurityEvent) {
        let task_names = {
            let state = self.state.lock().await;
            if !state.loaded {
                return;
            }
            match state.rule_to_tasks.get(&rule.name) {
                Some(names) if !names.is_empty() => names.clone(),
                _ => return,
            }
        };

        let cooldown_seconds = rule
            .cooldown_override_seconds
            .unwrap_or(self.default_cooldown_seconds);

        for task_name in task_names {
            let task = match self.repository.get_by_name(&task_name).await {
                Ok(Some(task)) => task,
                Ok(None) => {
                    tracing::warn!(
                        task = %task_name,
                        rule = %rule.name,
                        "Bound task not found in repository; skipping"
                    );
                    continue;
                }
                Err(error) => {
                    tracing::warn!(task = %task_name, rule = %rule.name, %error, "Task lookup failed");
                    continue;
                }
            };

            // Check-and-record under one lock so concurrent alerts for the
            // same (task, rule) pair cannot both pass.
            {
                let mut state = self.state.lock().await;
                let key = (task_name.clone(), rule.name.clone());
                if Self::is_in_cooldown(&state.cooldowns, &key, cooldown_seconds) {
                    tracing::debug!(
                        task = %task_name,
                        rule = %rule.name,
                        cooldown_seconds,
                        "Dispatch suppressed by cooldown"
                    );
                    continue;
                }
                state.cooldowns.insert(key, Instant::now());
            }

            self.dispatch(&task, rule, event, message).await;
        }
    }

    /// Wrap this manager (shared) as an [`EventQueue`](crate::queue::EventQueue)
    /// flush callback that feeds every batch entry through
    /// [`on_alert`](Self::on_alert).
    #[must_use]
    pub fn flush_callback(self: &Arc<Self>) -> FlushCallback {
        let manager = Arc::clone(self);
        Arc::new(move |batch: Vec<PendingAlert>| {
            let manager = Arc::clone(&manager);
            async move {
                for entry in batch {
                    manager
                        .on_alert(&entry.latest_message, &entry.rule, &entry.event)
                        .await;
                }
                Ok(())
            }
            .boxed()
        })
    }

    /// True iff the key dispatched within the last `cooldown_seconds`.
    /// A cooldown of zero disables suppression.
    fn is_in_cooldown(
        cooldowns: &HashMap<(String, String), Instant>,
        key: &(String, String),
        cooldown_seconds: u64,
    ) -> bool {
        if cooldown_seconds == 0 {
            return false;
        }
        match cooldowns.get(key) {
            Some(last) => last.elapsed() < Duration::from_secs(cooldown_seconds),
            None => false,
        }
    }

    /// Run one bound task: inject context, record start, dispatch, record outcome.
    async fn dispatch(
        &self,
        task: &TaskDefinition,
        rule: &AlertRule,
        event: &SecurityEvent,
        message: &str,
    ) {
        let prepared = Self::inject_alert_context(task, message, rule, event);

        let execution_id = match self
            .repository
            .record_execution(&prepared.name, &rule.name)
            .await
        {
            Ok(id) => Some(id),
            Err(error) => {
                tracing::warn!(task = %prepared.name, %error, "Failed to record execution start");
                None
            }
        };

        tracing::info!(
            task = %prepared.name,
            rule = %rule.name,
            source = %event.source_id,
            "Dispatching response task"
        );

        let outcome = self.runner.run(&prepared, self.task_timeout).await;

        let Some(execution_id) = execution_id else {
            if let Err(error) = &outcome {
                tracing::warn!(task = %prepared.name, %error, "Task run failed");
            }
            return;
        };

        let completion = match &outcome {
            Ok(result) => {
                self.repository
                    .complete_execution(
                        &execution_id,
                        result.success,
                        &result.response_text,
                        result.error.as_deref(),
                    )
                    .await
            }
            Err(error) => {
                tracing::warn!(task = %prepared.name, %error, "Task run failed");
                self.repository
                    .complete_execution(&execution_id, false, "", Some(&error.to_string()))
                    .await
            }
        };
        if let Err(error) = completion {
            tracing::warn!(task = %prepared.name, %error, "Failed to record execution outcome");
        }
    }

    /// Build the dispatch-time copy of `task` with alert context appended to
    /// its prompt. The original task is never mutated.
    fn inject_alert_context(
        task: &TaskDefinition,
        message: &str,
        rule: &AlertRule,
        event: &SecurityEvent,
    ) -> TaskDefinition {
        let mut prompt = task.prompt.clone().unwrap_or_default();
        prompt.push_str("\n\n[Alert Context]\n");
        prompt.push_str(&format!("Rule: {}\n", rule.name));
        prompt.push_str(&format!("Alert: {message}\n"));

        if !event.metadata.is_empty() {
            prompt.push_str("Event data:\n");
            let mut keys: Vec<&String> = event.metadata.keys().collect();
            keys.sort();
            for key in keys {
                prompt.push_str(&format!("- {}: {}\n", key, event.metadata[key]));
            }
        }

        task.with_prompt(prompt)
    }
}
