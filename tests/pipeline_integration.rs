//! End-to-end pipeline test: detector output flows through the event queue
//! into the hook manager, which dispatches response tasks against mock
//! repository/runner collaborators under a paused clock.

use async_trait::async_trait;
use skywarden::config::{HookConfig, MonitorConfig, QueueConfig, TrackerConfig};
use skywarden::hooks::{HookManager, TaskRepository, TaskRunner};
use skywarden::models::{AlertRule, TaskDefinition, TaskRunOutcome};
use skywarden::monitor::SecurityMonitor;
use skywarden::queue::EventQueue;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Default)]
struct InMemoryRepository {
    tasks: Vec<TaskDefinition>,
    executions: Mutex<Vec<(String, String)>>,
    completions: Mutex<Vec<(String, bool)>>,
    next_id: AtomicU64,
}

#[async_trait]
impl TaskRepository for InMemoryRepository {
    async fn get_by_name(&self, name: &str) -> anyhow::Result<Option<TaskDefinition>> {
        Ok(self.tasks.iter().find(|t| t.name == name).cloned())
    }

    async fn list_tasks(&self) -> anyhow::Result<Vec<TaskDefinition>> {
        Ok(self.tasks.clone())
    }

    async fn record_execution(&self, task_name: &str, rule_name: &str) -> anyhow::Result<String> {
        self.executions
            .lock()
            .await
            .push((task_name.to_owned(), rule_name.to_owned()));
        Ok(format!("exec-{}", self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn complete_execution(
        &self,
        execution_id: &str,
        success: bool,
        _response: &str,
        _error: Option<&str>,
    ) -> anyhow::Result<()> {
        self.completions
            .lock()
            .await
            .push((execution_id.to_owned(), success));
        Ok(())
    }
}

#[derive(Default)]
struct RecordingRunner {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl TaskRunner for RecordingRunner {
    async fn run(
        &self,
        task: &TaskDefinition,
        _timeout: Duration,
    ) -> anyhow::Result<TaskRunOutcome> {
        self.prompts
            .lock()
            .await
            .push(task.prompt.clone().unwrap_or_default());
        Ok(TaskRunOutcome {
            success: true,
            response_text: "acknowledged".to_owned(),
            error: None,
        })
    }
}

fn monitor_config() -> MonitorConfig {
    let mut config = MonitorConfig::default();
    config.detectors.deauth_threshold = 3;
    config.detectors.known_ssids = vec!["HQ-Secure".to_owned()];
    config.detectors.known_bssids = vec!["00:11:22:33:44:55".to_owned()];
    config.trackers.insert("drone".to_owned(), TrackerConfig {
        enabled: true,
        stale_after_seconds: 300,
        max_assets: 5,
    });
    config
}

fn wireless_rule(name: &str, detection_type: &str) -> AlertRule {
    AlertRule::new(name, [detection_type.to_owned()])
}

#[tokio::test(start_paused = true)]
async fn detector_to_dispatch_pipeline() {
    let monitor = SecurityMonitor::new(monitor_config());
    monitor.start();

    let repo = Arc::new(InMemoryRepository {
        tasks: vec![
            TaskDefinition::new("lockdown", Some("Engage lockdown".to_owned())).with_metadata(
                "alert_rules",
                serde_json::json!(["deauth-flood", "rogue-ap"]),
            ),
        ],
        ..InMemoryRepository::default()
    });
    let runner = Arc::new(RecordingRunner::default());
    let hooks = Arc::new(HookManager::new(
        Arc::clone(&repo) as Arc<dyn TaskRepository>,
        Arc::clone(&runner) as Arc<dyn TaskRunner>,
        &HookConfig {
            cooldown_seconds: 300,
            task_timeout_seconds: 30,
        },
    ));
    hooks.reload_bindings().await.unwrap();
    assert_eq!(hooks.hook_count().await, 2);

    let queue = EventQueue::new(&QueueConfig {
        debounce_seconds: 0.1,
        max_batch_size: 10,
        max_age_seconds: 5.0,
    });
    queue.register_callback(hooks.flush_callback()).await;

    // A deauth flood: frames 1 and 2 stay quiet, frame 3 fires.
    assert!(monitor.handle_deauth_frame("de:ad:be:ef:00:01", "victim").is_none());
    assert!(monitor.handle_deauth_frame("de:ad:be:ef:00:01", "victim").is_none());
    let flood = monitor
        .handle_deauth_frame("de:ad:be:ef:00:01", "victim")
        .expect("flood fires at threshold");

    // An evil twin beacon on a protected SSID.
    let twin = monitor
        .handle_beacon("aa:bb:cc:dd:ee:ff", "HQ-Secure", 6, -48)
        .expect("spoofed known network fires");

    // The external rule engine would match these; feed the queue as it does.
    let deauth_rule = wireless_rule("deauth-flood", "deauth_flood");
    let rogue_rule = wireless_rule("rogue-ap", "evil_twin");
    queue
        .enqueue(flood.clone(), deauth_rule.clone(), "deauth flood in progress")
        .await
        .unwrap();
    // A duplicate of the same alert collapses into the pending entry.
    queue
        .enqueue(flood, deauth_rule, "deauth flood still in progress")
        .await
        .unwrap();
    queue
        .enqueue(twin, rogue_rule, "evil twin on HQ-Secure")
        .await
        .unwrap();

    // Debounce elapses; the batch flushes and dispatch runs.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let stats = queue.stats().await;
    assert_eq!(stats.total_enqueued, 3);
    assert_eq!(stats.total_deduplicated, 1);
    assert_eq!(stats.total_flushed, 2);
    assert_eq!(stats.pending, 0);

    // One dispatch per batch entry, each with injected context.
    let prompts = runner.prompts.lock().await;
    assert_eq!(prompts.len(), 2);
    assert!(prompts.iter().all(|p| p.contains("[Alert Context]")));
    assert!(prompts.iter().any(|p| p.contains("deauth flood still in progress")));
    assert!(prompts.iter().any(|p| p.contains("evil twin on HQ-Secure")));
    drop(prompts);
    assert_eq!(repo.completions.lock().await.len(), 2);

    // A second wave for the same rule within the cooldown window is suppressed.
    let late = monitor
        .handle_beacon("aa:bb:cc:dd:ee:ff", "HQ-Secure", 6, -48)
        .expect("still spoofed");
    queue
        .enqueue(late, wireless_rule("rogue-ap", "evil_twin"), "still there")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(queue.stats().await.total_flushed, 3);
    assert_eq!(runner.prompts.lock().await.len(), 2, "cooldown suppressed dispatch");

    // Past the cooldown the binding fires again.
    tokio::time::advance(Duration::from_secs(301)).await;
    let again = monitor
        .handle_beacon("aa:bb:cc:dd:ee:ff", "HQ-Secure", 6, -48)
        .expect("still spoofed");
    queue
        .enqueue(again, wireless_rule("rogue-ap", "evil_twin"), "persistent twin")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(runner.prompts.lock().await.len(), 3);

    queue.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn asset_observations_flow_into_summaries() {
    let monitor = SecurityMonitor::new(monitor_config());
    monitor.start();

    let mut metadata = HashMap::new();
    metadata.insert("model".to_owned(), serde_json::json!("quadcopter"));
    let snapshot = monitor
        .observe_asset("drone", "dji-001", Some(metadata))
        .expect("drone tracking enabled");
    assert_eq!(snapshot.observation_count, 1);

    monitor.observe_asset("drone", "dji-002", None);
    monitor.observe_asset("drone", "dji-001", None);

    let summary = monitor.get_asset_summary();
    assert_eq!(summary.get("drone").map(|s| s.total), Some(2));

    let assets = monitor.list_assets("drone").expect("tracker exists");
    assert_eq!(assets.len(), 2);

    monitor.stop();
    assert!(monitor.observe_asset("drone", "dji-003", None).is_none());
}
