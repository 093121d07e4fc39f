use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::core::config::AppConfig;
use crate::core::error::{AppError, AppResult, UnitResult};
use crate::core::models::{AccountCredential, RunSummary};
use crate::infrastructure::browser::{
    AutomationContext, AutomationSurface, MockSurface, PlaywrightSurface,
};
use crate::infrastructure::session::SessionStore;
use crate::services::accounts::resolve_required_accounts;
use crate::services::scheduler::{RunContext, Scheduler};
use crate::workflow::OrderWorkflow;

/// `login` subcommand: refresh every account's saved session.
pub async fn run_login(
    config: Arc<AppConfig>,
    accounts_file: Option<String>,
    concurrency: Option<usize>,
    backend: &str,
    mode: &str,
    dry_run: bool,
    performant: bool,
) -> UnitResult {
    let accounts = resolve_required_accounts(&config, accounts_file.as_deref()).await?;
    info!(
        "Logging in {} accounts, mode={}, dry_run={}",
        accounts.len(),
        mode,
        dry_run
    );

    let surface = build_surface(&config, backend, mode).await?;
    let sessions = Arc::new(SessionStore::new(&config.storage_state_dir));
    let run = RunContext {
        order_number: None,
        dry_run,
        concurrency: concurrency.unwrap_or(config.max_concurrent_accounts),
        performant,
    };

    let started = Utc::now();
    let summary = execute_login_run(
        Arc::clone(&config),
        Arc::clone(&surface),
        sessions,
        accounts,
        run,
    )
    .await;
    enforce_execution_floor(&config, started).await;

    println!("{}", render_summary(&summary));
    if let Err(e) = surface.shutdown().await {
        warn!("Surface shutdown failed: {}", e);
    }
    Ok(())
}

/// `submit-order` subcommand: run the full workflow on every account.
#[allow(clippy::too_many_arguments)]
pub async fn run_submit_order(
    config: Arc<AppConfig>,
    order_number: String,
    accounts_file: Option<String>,
    concurrency: Option<usize>,
    backend: &str,
    mode: &str,
    dry_run: bool,
    yes: bool,
    performant: bool,
) -> UnitResult {
    if !dry_run && !yes {
        let prompt = format!(
            "WARNING: about to submit REAL orders for order number {}. Continue?",
            order_number
        );
        if !confirm_proceed(prompt).await? {
            info!("Order submission cancelled at the prompt");
            return Ok(());
        }
    }

    let accounts = resolve_required_accounts(&config, accounts_file.as_deref()).await?;
    info!(
        "Submitting order {} across {} accounts, mode={}, dry_run={}",
        order_number,
        accounts.len(),
        mode,
        dry_run
    );

    let surface = build_surface(&config, backend, mode).await?;
    let sessions = Arc::new(SessionStore::new(&config.storage_state_dir));
    let run = RunContext {
        order_number: Some(order_number),
        dry_run,
        concurrency: concurrency.unwrap_or(config.max_concurrent_accounts),
        performant,
    };

    let started = Utc::now();
    let summary = execute_order_run(
        Arc::clone(&config),
        Arc::clone(&surface),
        sessions,
        accounts,
        run,
    )
    .await;
    enforce_execution_floor(&config, started).await;

    println!("{}", render_summary(&summary));
    if let Err(e) = surface.shutdown().await {
        warn!("Surface shutdown failed: {}", e);
    }
    Ok(())
}

/// Runs the order workflow for a batch of accounts on an already
/// built surface. Shared by the CLI and the webhook server.
pub async fn execute_order_run(
    config: Arc<AppConfig>,
    surface: Arc<dyn AutomationSurface>,
    sessions: Arc<SessionStore>,
    accounts: Vec<AccountCredential>,
    run: RunContext,
) -> RunSummary {
    let scheduler = Scheduler::new(Arc::clone(&config), surface, Arc::clone(&sessions));
    let order_number = run.order_number.clone().unwrap_or_default();
    let dry_run = run.dry_run;

    let runner = move |account: AccountCredential, ctx: Arc<dyn AutomationContext>| {
        let config = Arc::clone(&config);
        let sessions = Arc::clone(&sessions);
        let order_number = order_number.clone();
        async move {
            let workflow = OrderWorkflow::new(account, config, sessions, ctx);
            workflow.execute_submit_order(&order_number, dry_run).await
        }
    };

    scheduler.run_accounts(accounts, &run, runner).await
}

/// Login-only counterpart of [`execute_order_run`].
pub async fn execute_login_run(
    config: Arc<AppConfig>,
    surface: Arc<dyn AutomationSurface>,
    sessions: Arc<SessionStore>,
    accounts: Vec<AccountCredential>,
    run: RunContext,
) -> RunSummary {
    let scheduler = Scheduler::new(Arc::clone(&config), surface, Arc::clone(&sessions));
    let dry_run = run.dry_run;

    let runner = move |account: AccountCredential, ctx: Arc<dyn AutomationContext>| {
        let config = Arc::clone(&config);
        let sessions = Arc::clone(&sessions);
        async move {
            let workflow = OrderWorkflow::new(account, config, sessions, ctx);
            workflow.execute_login(dry_run).await
        }
    };

    scheduler.run_accounts(accounts, &run, runner).await
}

pub async fn build_surface(
    config: &AppConfig,
    backend: &str,
    mode: &str,
) -> AppResult<Arc<dyn AutomationSurface>> {
    let headless = mode != "visible";
    match backend {
        "playwright" => {
            let surface = PlaywrightSurface::launch(
                headless,
                config.low_resource_mode,
                &config.chromium_launch_args,
            )
            .await?;
            Ok(Arc::new(surface))
        }
        "mock" => Ok(Arc::new(MockSurface::happy_path(config))),
        other => Err(AppError::Config(format!("unknown backend: {}", other))),
    }
}

pub fn render_summary(summary: &RunSummary) -> String {
    let mut lines = vec!["--- Final execution summary ---".to_string()];
    for report in &summary.reports {
        if report.success {
            lines.push(format!("{}: SUCCESS", report.account_name));
        } else {
            lines.push(format!(
                "{}: FAILED - {}",
                report.account_name,
                report.error.as_deref().unwrap_or("unknown error")
            ));
        }
    }
    lines.push(format!(
        "All runs finished. {}/{} succeeded.",
        summary.success_count,
        summary.reports.len()
    ));
    lines.join("\n")
}

/// Reads the prompt answer off the runtime: stdin blocks the thread.
async fn confirm_proceed(prompt: String) -> AppResult<bool> {
    let answer = tokio::task::spawn_blocking(move || -> AppResult<String> {
        use std::io::Write;

        print!("{} [y/N]: ", prompt);
        std::io::stdout().flush()?;
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        Ok(answer)
    })
    .await
    .map_err(|e| AppError::Other(anyhow::anyhow!("confirmation prompt failed: {}", e)))??;
    Ok(is_affirmative(&answer))
}

fn is_affirmative(answer: &str) -> bool {
    let answer = answer.trim().to_lowercase();
    answer == "y" || answer == "yes"
}

async fn enforce_execution_floor(config: &AppConfig, started: DateTime<Utc>) {
    if !config.enforce_min_run_per_execution {
        return;
    }
    let elapsed = (Utc::now() - started).num_milliseconds().max(0) as f64 / 1000.0;
    let floor = config.min_run_seconds as f64;
    if elapsed < floor {
        info!(
            "Holding the process open {:.1}s to honor the minimum run time",
            floor - elapsed
        );
        tokio::time::sleep(Duration::from_secs_f64(floor - elapsed)).await;
    }
}

#[cfg(test)]
mod tests {
    use crate::core::models::AccountReport;

    use super::*;

    #[test]
    fn test_render_summary_lists_each_account() {
        let reports = vec![
            AccountReport {
                success: true,
                error: None,
                ..AccountReport::failed("acct_1", Some("1".into()), false, "")
            },
            AccountReport::failed("acct_2", Some("1".into()), false, "step 'login' failed"),
        ];
        let summary = RunSummary::from_reports(Some("1".into()), false, reports);

        let rendered = render_summary(&summary);

        assert!(rendered.starts_with("--- Final execution summary ---"));
        assert!(rendered.contains("acct_1: SUCCESS"));
        assert!(rendered.contains("acct_2: FAILED - step 'login' failed"));
        assert!(rendered.ends_with("All runs finished. 1/2 succeeded."));
    }

    #[test]
    fn test_render_summary_with_no_reports() {
        let summary = RunSummary::from_reports(None, true, Vec::new());
        let rendered = render_summary(&summary);

        assert!(rendered.contains("All runs finished. 0/0 succeeded."));
    }

    #[test]
    fn test_affirmative_prompt_answers() {
        assert!(is_affirmative("y\n"));
        assert!(is_affirmative(" YES \n"));
        assert!(is_affirmative("yes"));
        assert!(!is_affirmative("\n"));
        assert!(!is_affirmative("no\n"));
        assert!(!is_affirmative("yeah"));
    }
}
