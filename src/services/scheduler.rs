use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::join_all;
use futures::FutureExt;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::core::config::AppConfig;
use crate::core::models::{AccountCredential, AccountReport, RunSummary};
use crate::infrastructure::browser::{AutomationContext, AutomationSurface, ContextOptions};
use crate::infrastructure::session::SessionStore;

/// Hard ceiling on simultaneous automation contexts, whatever the
/// requested concurrency.
pub const MAX_CONCURRENT_CONTEXTS: usize = 10;

pub fn clamp_concurrency(requested: usize) -> usize {
    requested.clamp(1, MAX_CONCURRENT_CONTEXTS)
}

/// Parameters of one run, shared by every account task.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub order_number: Option<String>,
    pub dry_run: bool,
    pub concurrency: usize,
    pub performant: bool,
}

/// Fans accounts out over a bounded number of automation contexts.
/// One task per account; a failing account never stops the others,
/// and every account yields exactly one report.
pub struct Scheduler {
    config: Arc<AppConfig>,
    surface: Arc<dyn AutomationSurface>,
    sessions: Arc<SessionStore>,
}

impl Scheduler {
    pub fn new(
        config: Arc<AppConfig>,
        surface: Arc<dyn AutomationSurface>,
        sessions: Arc<SessionStore>,
    ) -> Self {
        Self {
            config,
            surface,
            sessions,
        }
    }

    pub async fn run_accounts<F, Fut>(
        &self,
        accounts: Vec<AccountCredential>,
        run: &RunContext,
        runner: F,
    ) -> RunSummary
    where
        F: Fn(AccountCredential, Arc<dyn AutomationContext>) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = AccountReport> + Send + 'static,
    {
        let limit = clamp_concurrency(run.concurrency);
        info!(
            "Processing {} accounts with concurrency limit {}",
            accounts.len(),
            limit
        );

        let semaphore = Arc::new(Semaphore::new(limit));
        let mut labels = Vec::with_capacity(accounts.len());
        let mut handles = Vec::with_capacity(accounts.len());

        for account in accounts {
            labels.push(account.account_name.clone());

            // Acquire before spawning so no more than `limit` account
            // tasks hold a context at once.
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    let run = run.clone();
                    handles.push(tokio::spawn(async move {
                        AccountReport::failed(
                            &account.account_name,
                            run.order_number,
                            run.dry_run,
                            format!("scheduler unavailable: {}", e),
                        )
                    }));
                    continue;
                }
            };

            let config = Arc::clone(&self.config);
            let surface = Arc::clone(&self.surface);
            let sessions = Arc::clone(&self.sessions);
            let runner = runner.clone();
            let run = run.clone();

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                Self::run_one(config, surface, sessions, run, account, runner).await
            }));
        }

        let results = join_all(handles).await;
        let mut reports = Vec::with_capacity(results.len());
        for (label, result) in labels.into_iter().zip(results) {
            match result {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!("[{}] account task panicked: {}", label, e);
                    reports.push(AccountReport::failed(
                        &label,
                        run.order_number.clone(),
                        run.dry_run,
                        format!("account task panicked: {}", e),
                    ));
                }
            }
        }

        RunSummary::from_reports(run.order_number.clone(), run.dry_run, reports)
    }

    async fn run_one<F, Fut>(
        config: Arc<AppConfig>,
        surface: Arc<dyn AutomationSurface>,
        sessions: Arc<SessionStore>,
        run: RunContext,
        account: AccountCredential,
        runner: F,
    ) -> AccountReport
    where
        F: Fn(AccountCredential, Arc<dyn AutomationContext>) -> Fut,
        Fut: Future<Output = AccountReport>,
    {
        let account_name = account.account_name.clone();

        let session_blob = if config.storage_state_enabled {
            match sessions.load(&account_name) {
                Ok(blob) => blob,
                Err(e) => {
                    warn!("[{}] could not load saved session: {}", account_name, e);
                    None
                }
            }
        } else {
            None
        };

        let options = ContextOptions {
            session_blob,
            performant: run.performant,
        };
        let ctx = match surface.open_context(options).await {
            Ok(ctx) => ctx,
            Err(e) => {
                error!(
                    "[{}] could not open automation context: {}",
                    account_name, e
                );
                return AccountReport::failed(
                    &account_name,
                    run.order_number.clone(),
                    run.dry_run,
                    format!("could not open automation context: {}", e),
                );
            }
        };

        // Catch panics here so the context still closes and the
        // account still yields a report.
        let report = match AssertUnwindSafe(runner(account, Arc::clone(&ctx)))
            .catch_unwind()
            .await
        {
            Ok(report) => report,
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!("[{}] workflow panicked: {}", account_name, reason);
                AccountReport::failed(
                    &account_name,
                    run.order_number.clone(),
                    run.dry_run,
                    format!("workflow panicked: {}", reason),
                )
            }
        };

        if let Err(e) = ctx.close().await {
            warn!("[{}] failed to close context: {}", account_name, e);
        }

        report
    }
}
