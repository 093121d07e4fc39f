use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use optcoin_bot::core::config::{AppConfig, RetryPolicy};
use optcoin_bot::core::models::{AccountCredential, AccountReport};
use optcoin_bot::infrastructure::browser::{AutomationContext, MockSurface};
use optcoin_bot::infrastructure::session::SessionStore;
use optcoin_bot::services::commands::execute_order_run;
use optcoin_bot::services::scheduler::{RunContext, Scheduler, MAX_CONCURRENT_CONTEXTS};

fn test_config(storage_dir: &std::path::Path) -> Arc<AppConfig> {
    let mut config = AppConfig::new();
    config.storage_state_dir = storage_dir.to_string_lossy().to_string();
    config.timeouts.default = Duration::from_millis(100);
    config.timeouts.session_bounce = Duration::from_millis(40);
    config.timeouts.session_marker = Duration::from_millis(20);
    config.timeouts.recognize_alert = Duration::from_millis(60);
    config.timeouts.recognize_confirm = Duration::from_millis(80);
    config.timeouts.confirm_alert = Duration::from_millis(40);
    config.timeouts.settle = Duration::from_millis(10);
    let delay = Duration::from_millis(5);
    config.retry.login = RetryPolicy::new(2, delay);
    config.retry.navigation = RetryPolicy::new(3, delay);
    config.retry.submit = RetryPolicy::new(3, delay);
    config.retry.confirm = RetryPolicy::new(3, delay);
    Arc::new(config)
}

fn accounts(count: usize) -> Vec<AccountCredential> {
    (1..=count)
        .map(|i| {
            AccountCredential::new(
                format!("acct_{}", i),
                format!("user{}@test.com", i),
                "pw",
            )
        })
        .collect()
}

fn run_context(concurrency: usize) -> RunContext {
    RunContext {
        order_number: Some("20240101".to_string()),
        dry_run: false,
        concurrency,
        performant: false,
    }
}

fn quick_report(name: &str) -> AccountReport {
    let now = Utc::now().to_rfc3339();
    AccountReport {
        account_name: name.to_string(),
        order_number: None,
        dry_run: false,
        steps: Vec::new(),
        success: true,
        error: None,
        start_time_utc: now.clone(),
        end_time_utc: now,
        duration_seconds: 0.0,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_limit_bounds_open_contexts() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let sessions = Arc::new(SessionStore::new(dir.path()));
    let surface = MockSurface::new();
    let scheduler = Scheduler::new(config, Arc::new(surface.clone()), sessions);

    let runner = |account: AccountCredential, _ctx: Arc<dyn AutomationContext>| async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        quick_report(&account.account_name)
    };
    let summary = scheduler
        .run_accounts(accounts(8), &run_context(3), runner)
        .await;

    assert_eq!(summary.reports.len(), 8);
    assert_eq!(summary.success_count, 8);
    let stats = surface.stats();
    assert_eq!(stats.opened, 8);
    assert_eq!(stats.closed, 8);
    // The semaphore keeps at most three contexts open, and the 30ms
    // runner makes at least two overlap.
    assert!(stats.peak <= 3, "peak was {}", stats.peak);
    assert!(stats.peak >= 2, "peak was {}", stats.peak);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_zero_concurrency_runs_one_at_a_time() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let sessions = Arc::new(SessionStore::new(dir.path()));
    let surface = MockSurface::new();
    let scheduler = Scheduler::new(config, Arc::new(surface.clone()), sessions);

    let runner = |account: AccountCredential, _ctx: Arc<dyn AutomationContext>| async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        quick_report(&account.account_name)
    };
    let summary = scheduler
        .run_accounts(accounts(3), &run_context(0), runner)
        .await;

    assert_eq!(summary.success_count, 3);
    assert_eq!(surface.peak_contexts(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_requested_concurrency_is_capped() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let sessions = Arc::new(SessionStore::new(dir.path()));
    let surface = MockSurface::new();
    let scheduler = Scheduler::new(config, Arc::new(surface.clone()), sessions);

    let runner = |account: AccountCredential, _ctx: Arc<dyn AutomationContext>| async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        quick_report(&account.account_name)
    };
    let summary = scheduler
        .run_accounts(accounts(12), &run_context(50), runner)
        .await;

    assert_eq!(summary.reports.len(), 12);
    assert!(
        surface.peak_contexts() <= MAX_CONCURRENT_CONTEXTS,
        "peak was {}",
        surface.peak_contexts()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_panicking_account_does_not_sink_the_others() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let sessions = Arc::new(SessionStore::new(dir.path()));
    let surface = MockSurface::new();
    let scheduler = Scheduler::new(config, Arc::new(surface.clone()), sessions);

    let runner = |account: AccountCredential, _ctx: Arc<dyn AutomationContext>| async move {
        if account.account_name == "acct_2" {
            panic!("boom");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        quick_report(&account.account_name)
    };
    let summary = scheduler
        .run_accounts(accounts(4), &run_context(4), runner)
        .await;

    assert_eq!(summary.reports.len(), 4);
    assert_eq!(summary.success_count, 3);
    assert_eq!(summary.failure_count, 1);
    let failed = summary
        .reports
        .iter()
        .find(|r| r.account_name == "acct_2")
        .unwrap();
    assert!(!failed.success);
    assert!(
        failed.error.as_deref().unwrap().contains("panicked"),
        "error: {:?}",
        failed.error
    );
    // The panicking account's context is still released.
    let stats = surface.stats();
    assert_eq!(stats.opened, 4);
    assert_eq!(stats.closed, 4);
}

#[tokio::test]
async fn test_dry_run_opens_contexts_but_drives_no_pages() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let sessions = Arc::new(SessionStore::new(dir.path()));
    let surface = MockSurface::new();

    let run = RunContext {
        order_number: Some("42".to_string()),
        dry_run: true,
        concurrency: 2,
        performant: false,
    };
    let summary = execute_order_run(
        config,
        Arc::new(surface.clone()),
        sessions,
        accounts(3),
        run,
    )
    .await;

    assert!(summary.dry_run);
    assert_eq!(summary.success_count, 3);
    assert!(summary.reports.iter().all(|r| r.dry_run && r.steps.is_empty()));
    // Contexts are opened and closed, but no page is ever driven.
    let stats = surface.stats();
    assert_eq!(stats.opened, 3);
    assert_eq!(stats.closed, 3);
    assert!(stats.actions.is_empty(), "actions: {:?}", stats.actions);
}

#[tokio::test]
async fn test_saved_session_blob_reaches_the_context() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let sessions = Arc::new(SessionStore::new(dir.path()));
    let blob = r#"[{"name":"sid","value":"abc"}]"#;
    sessions.save("acct_1", blob).unwrap();
    let surface = MockSurface::new();

    let run = RunContext {
        order_number: Some("42".to_string()),
        dry_run: true,
        concurrency: 1,
        performant: true,
    };
    execute_order_run(
        config,
        Arc::new(surface.clone()),
        sessions,
        accounts(1),
        run,
    )
    .await;

    let stats = surface.stats();
    assert_eq!(stats.open_options.len(), 1);
    assert_eq!(stats.open_options[0].session_blob.as_deref(), Some(blob));
    assert!(stats.open_options[0].performant);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_full_run_aggregates_per_account_reports() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let sessions = Arc::new(SessionStore::new(dir.path()));
    let surface = MockSurface::happy_path(&config);

    let summary = execute_order_run(
        Arc::clone(&config),
        Arc::new(surface.clone()),
        Arc::clone(&sessions),
        accounts(2),
        run_context(2),
    )
    .await;

    assert_eq!(summary.order_number.as_deref(), Some("20240101"));
    assert_eq!(summary.success_count, 2);
    assert_eq!(summary.failure_count, 0);
    assert!(summary.reports.iter().all(|r| r.steps.len() == 5));
    // Each account logged in fresh and left a session behind.
    assert!(sessions.load("acct_1").unwrap().is_some());
    assert!(sessions.load("acct_2").unwrap().is_some());
}
