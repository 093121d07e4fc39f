use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::core::config::AppConfig;
use crate::core::models::{AccountCredential, AccountReport, StepResult};
use crate::infrastructure::browser::{AutomationContext, SurfaceError};
use crate::infrastructure::session::SessionStore;

pub mod alert;
pub mod retry;

use alert::{classify, first_alert, AlertClass};
use retry::{run_step, StepError};

pub const STEP_LOGIN: &str = "login";
pub const STEP_NAVIGATE: &str = "navigate_to_delivery";
pub const STEP_SELECT_TAB: &str = "click_invited_me";
pub const STEP_RECOGNIZE: &str = "enter_order_and_recognize";
pub const STEP_CONFIRM: &str = "confirm_order";

/// Drives the order workflow for one account on one automation
/// context. Steps run strictly in order; the first failed step ends
/// the run and later steps are skipped.
pub struct OrderWorkflow {
    account: AccountCredential,
    config: Arc<AppConfig>,
    sessions: Arc<SessionStore>,
    ctx: Arc<dyn AutomationContext>,
}

impl OrderWorkflow {
    pub fn new(
        account: AccountCredential,
        config: Arc<AppConfig>,
        sessions: Arc<SessionStore>,
        ctx: Arc<dyn AutomationContext>,
    ) -> Self {
        Self {
            account,
            config,
            sessions,
            ctx,
        }
    }

    /// Runs only the login step, refreshing the saved session.
    pub async fn execute_login(&self, dry_run: bool) -> AccountReport {
        let started = Utc::now();
        info!(
            "[{}] starting login run, dry_run={}",
            self.account.account_name, dry_run
        );

        let mut steps = Vec::new();
        let error = if dry_run {
            steps.push(StepResult::simulated(STEP_LOGIN));
            None
        } else {
            let result = run_step(STEP_LOGIN, &self.config.retry.login, || self.try_login()).await;
            Self::push_step(&mut steps, result)
        };

        self.finish_report(started, None, dry_run, steps, error).await
    }

    /// Runs the full five-step order workflow. A dry run skips every
    /// step and reports success with an empty step list.
    pub async fn execute_submit_order(&self, order_number: &str, dry_run: bool) -> AccountReport {
        let started = Utc::now();
        info!(
            "[{}] starting order submission, order_number={}, dry_run={}",
            self.account.account_name, order_number, dry_run
        );

        let mut steps = Vec::new();
        let error = if dry_run {
            info!(
                "[{}] dry run requested, skipping all automation",
                self.account.account_name
            );
            None
        } else {
            self.run_until_failure(order_number, &mut steps).await
        };

        match &error {
            Some(reason) => warn!(
                "[{}] order submission failed: {}",
                self.account.account_name, reason
            ),
            None => info!(
                "[{}] order submission finished successfully",
                self.account.account_name
            ),
        }

        self.finish_report(started, Some(order_number.to_string()), dry_run, steps, error)
            .await
    }

    async fn run_until_failure(
        &self,
        order_number: &str,
        steps: &mut Vec<StepResult>,
    ) -> Option<String> {
        let retry = &self.config.retry;

        let result = run_step(STEP_LOGIN, &retry.login, || self.try_login()).await;
        if let Some(reason) = Self::push_step(steps, result) {
            return Some(reason);
        }

        let result = run_step(STEP_NAVIGATE, &retry.navigation, || self.try_navigate()).await;
        if let Some(reason) = Self::push_step(steps, result) {
            return Some(reason);
        }

        let result =
            run_step(STEP_SELECT_TAB, &retry.navigation, || self.try_select_tab()).await;
        if let Some(reason) = Self::push_step(steps, result) {
            return Some(reason);
        }

        let result = run_step(STEP_RECOGNIZE, &retry.submit, || {
            self.try_recognize(order_number)
        })
        .await;
        if let Some(reason) = Self::push_step(steps, result) {
            return Some(reason);
        }

        let result = run_step(STEP_CONFIRM, &retry.confirm, || self.try_confirm()).await;
        if let Some(reason) = Self::push_step(steps, result) {
            return Some(reason);
        }

        None
    }

    /// Appends the result and, on failure, returns the reason that
    /// ends the whole run.
    fn push_step(steps: &mut Vec<StepResult>, result: StepResult) -> Option<String> {
        let failure = if result.success {
            None
        } else {
            Some(format!(
                "step '{}' failed: {}",
                result.step,
                result.error.as_deref().unwrap_or("unknown error")
            ))
        };
        steps.push(result);
        failure
    }

    /// One login attempt. Reuses the cached session when it still
    /// holds, deletes it when the site bounces us back to the login
    /// page, and otherwise logs in with credentials and saves a fresh
    /// session.
    async fn try_login(&self) -> Result<StepResult, StepError> {
        let selectors = &self.config.selectors;
        let timeouts = &self.config.timeouts;
        let marker = &self.config.site.login_url_marker;

        let had_session = self.config.storage_state_enabled
            && matches!(self.sessions.load(&self.account.account_name), Ok(Some(_)));

        if had_session {
            info!(
                "[{}] found saved session, validating it",
                self.account.account_name
            );
            self.ctx
                .goto(&self.config.site.section_url)
                .await
                .map_err(|e| StepError::transient(format!("session probe failed: {}", e)))?;

            match self
                .ctx
                .wait_for_url_contains(marker, timeouts.session_bounce)
                .await
            {
                // Bounced back to the login page: the session is dead.
                Ok(()) => {
                    warn!(
                        "[{}] session expired, site redirected to the login page",
                        self.account.account_name
                    );
                    self.discard_session();
                }
                Err(SurfaceError::Timeout(_)) => {
                    match self
                        .ctx
                        .wait_for_visible(&selectors.section_tab, timeouts.session_marker)
                        .await
                    {
                        Ok(()) => {
                            info!("[{}] session is still valid", self.account.account_name);
                            return Ok(StepResult::succeeded(STEP_LOGIN).with_cached());
                        }
                        Err(SurfaceError::Timeout(_)) => {
                            warn!(
                                "[{}] session marker missing, treating session as stale",
                                self.account.account_name
                            );
                            self.discard_session();
                        }
                        Err(e) => {
                            return Err(StepError::transient(format!(
                                "session validation failed: {}",
                                e
                            )))
                        }
                    }
                }
                Err(e) => {
                    return Err(StepError::transient(format!(
                        "session validation failed: {}",
                        e
                    )))
                }
            }
        }

        info!(
            "[{}] logging in at {}",
            self.account.account_name, self.config.site.login_url
        );
        self.ctx
            .goto(&self.config.site.login_url)
            .await
            .map_err(|e| StepError::transient(format!("could not open login page: {}", e)))?;
        self.ctx
            .wait_for_visible(&selectors.username_input, timeouts.default)
            .await
            .map_err(|e| StepError::transient(format!("login form not visible: {}", e)))?;
        self.ctx
            .fill(&selectors.username_input, &self.account.username)
            .await
            .map_err(|e| StepError::transient(format!("could not fill username: {}", e)))?;
        self.ctx
            .fill(&selectors.password_input, &self.account.password)
            .await
            .map_err(|e| StepError::transient(format!("could not fill password: {}", e)))?;
        self.ctx
            .click(&selectors.login_submit)
            .await
            .map_err(|e| StepError::transient(format!("could not submit login form: {}", e)))?;

        match self
            .ctx
            .wait_for_url_not_contains(marker, timeouts.default)
            .await
        {
            Ok(()) => {}
            Err(SurfaceError::Timeout(_)) => {
                // Still on the login page. A visible error message
                // means the credentials were rejected.
                if let Ok(Some(message)) = self.ctx.visible_text(&selectors.login_error).await {
                    return Err(StepError::definitive_with_alert(
                        format!("login rejected: {}", message),
                        message,
                    ));
                }
                return Err(StepError::transient(
                    "still on the login page after submitting credentials",
                ));
            }
            Err(e) => return Err(StepError::transient(format!("login failed: {}", e))),
        }

        if self.config.storage_state_enabled {
            match self.ctx.export_session().await {
                Ok(Some(blob)) => {
                    if let Err(e) = self.sessions.save(&self.account.account_name, &blob) {
                        warn!(
                            "[{}] could not save session state: {}",
                            self.account.account_name, e
                        );
                    }
                }
                Ok(None) => debug!(
                    "[{}] context produced no session state to save",
                    self.account.account_name
                ),
                Err(e) => warn!(
                    "[{}] session export failed: {}",
                    self.account.account_name, e
                ),
            }
        }

        info!("[{}] login succeeded", self.account.account_name);
        Ok(StepResult::succeeded(STEP_LOGIN))
    }

    fn discard_session(&self) {
        if let Err(e) = self.sessions.invalidate(&self.account.account_name) {
            warn!(
                "[{}] could not delete stale session file: {}",
                self.account.account_name, e
            );
        }
    }

    async fn try_navigate(&self) -> Result<StepResult, StepError> {
        self.ctx
            .goto(&self.config.site.section_url)
            .await
            .map_err(|e| StepError::transient(format!("navigation failed: {}", e)))?;
        self.ctx
            .wait_for_visible(&self.config.selectors.section_tab, self.config.timeouts.default)
            .await
            .map_err(|e| StepError::transient(format!("section tab not visible: {}", e)))?;
        Ok(StepResult::succeeded(STEP_NAVIGATE))
    }

    async fn try_select_tab(&self) -> Result<StepResult, StepError> {
        self.ctx
            .click(&self.config.selectors.section_tab)
            .await
            .map_err(|e| StepError::transient(format!("could not click section tab: {}", e)))?;
        tokio::time::sleep(self.config.timeouts.settle).await;
        Ok(StepResult::succeeded(STEP_SELECT_TAB))
    }

    /// Fills the order number and clicks recognize, then waits for
    /// whichever comes first: an alert to classify, or the confirm
    /// control appearing (implicit success).
    async fn try_recognize(&self, order_number: &str) -> Result<StepResult, StepError> {
        let selectors = &self.config.selectors;
        let timeouts = &self.config.timeouts;
        let marker = &self.config.site.login_url_marker;

        if self.on_login_page(marker).await? {
            return Err(StepError::definitive(
                "redirected to the login page, the session may have expired",
            ));
        }

        self.ctx
            .fill(&selectors.order_input, order_number)
            .await
            .map_err(|e| StepError::transient(format!("could not fill order number: {}", e)))?;
        self.ctx
            .click(&selectors.recognize_button)
            .await
            .map_err(|e| StepError::transient(format!("could not click recognize: {}", e)))?;

        tokio::select! {
            biased;
            Some(message) = first_alert(
                self.ctx.as_ref(),
                &selectors.login_error,
                timeouts.recognize_alert,
            ) => {
                self.recognize_outcome(message)
            }
            outcome = self.ctx.wait_for_visible(
                &selectors.confirm_button,
                timeouts.recognize_confirm,
            ) => {
                match outcome {
                    Ok(()) => Ok(StepResult::succeeded(STEP_RECOGNIZE)),
                    Err(SurfaceError::Timeout(_)) => {
                        if self.on_login_page(marker).await? {
                            Err(StepError::definitive(
                                "redirected to the login page after recognition, \
                                 session expired or blocked",
                            ))
                        } else {
                            Err(StepError::transient(
                                "confirm control did not appear, the order was not recognized",
                            ))
                        }
                    }
                    Err(e) => Err(StepError::transient(format!("recognition failed: {}", e))),
                }
            }
        }
    }

    fn recognize_outcome(&self, message: String) -> Result<StepResult, StepError> {
        match classify(&message) {
            AlertClass::SuccessInformational => {
                info!(
                    "[{}] recognition returned an informational message, treating as success: {}",
                    self.account.account_name, message
                );
                Ok(StepResult::succeeded(STEP_RECOGNIZE).with_alert(message))
            }
            AlertClass::DefinitiveFailure => Err(StepError::definitive_with_alert(
                format!("order identifier rejected: {}", message),
                message,
            )),
            AlertClass::GenericFailure => Err(StepError::definitive_with_alert(
                format!("recognition failed: {}", message),
                message,
            )),
        }
    }

    /// Clicks confirm and waits for whichever comes first: an alert
    /// to classify, or a quiet settle delay (implicit success).
    async fn try_confirm(&self) -> Result<StepResult, StepError> {
        let selectors = &self.config.selectors;
        let timeouts = &self.config.timeouts;

        self.ctx
            .wait_for_visible(&selectors.confirm_button, timeouts.default)
            .await
            .map_err(|e| StepError::transient(format!("confirm control not available: {}", e)))?;
        self.ctx
            .click(&selectors.confirm_button)
            .await
            .map_err(|e| StepError::transient(format!("could not click confirm: {}", e)))?;

        tokio::select! {
            biased;
            Some(message) = first_alert(
                self.ctx.as_ref(),
                &selectors.login_error,
                timeouts.confirm_alert,
            ) => {
                self.confirm_outcome(message)
            }
            _ = tokio::time::sleep(timeouts.settle) => {
                info!("[{}] order confirmed", self.account.account_name);
                Ok(StepResult::succeeded(STEP_CONFIRM))
            }
        }
    }

    fn confirm_outcome(&self, message: String) -> Result<StepResult, StepError> {
        match classify(&message) {
            AlertClass::SuccessInformational => {
                info!(
                    "[{}] confirmation returned an informational message, treating as success: {}",
                    self.account.account_name, message
                );
                Ok(StepResult::succeeded(STEP_CONFIRM).with_alert(message))
            }
            _ => {
                let reason = if message.to_lowercase().contains("invalid parameter") {
                    "invalid parameter reported on confirmation, the order number is likely \
                     expired or incorrect"
                        .to_string()
                } else {
                    format!("confirmation returned an alert: {}", message)
                };
                Err(StepError::definitive_with_alert(reason, message))
            }
        }
    }

    async fn on_login_page(&self, marker: &str) -> Result<bool, StepError> {
        let url = self
            .ctx
            .current_url()
            .await
            .map_err(|e| StepError::transient(format!("could not read current URL: {}", e)))?;
        Ok(url.to_lowercase().contains(marker))
    }

    /// Stamps the report, enforcing the per-account minimum wall
    /// clock when configured.
    async fn finish_report(
        &self,
        started: DateTime<Utc>,
        order_number: Option<String>,
        dry_run: bool,
        steps: Vec<StepResult>,
        error: Option<String>,
    ) -> AccountReport {
        let mut elapsed = elapsed_seconds(started);
        if self.config.enforce_min_run_per_account {
            let floor = self.config.min_run_seconds as f64;
            if elapsed < floor {
                tokio::time::sleep(Duration::from_secs_f64(floor - elapsed)).await;
                elapsed = elapsed_seconds(started);
            }
        }

        AccountReport {
            account_name: self.account.account_name.clone(),
            order_number,
            dry_run,
            steps,
            success: error.is_none(),
            error,
            start_time_utc: started.to_rfc3339(),
            end_time_utc: Utc::now().to_rfc3339(),
            duration_seconds: elapsed,
        }
    }
}

fn elapsed_seconds(started: DateTime<Utc>) -> f64 {
    (Utc::now() - started).num_milliseconds().max(0) as f64 / 1000.0
}
