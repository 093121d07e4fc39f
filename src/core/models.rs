use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// One set of credentials for the target web application. The `Debug`
/// impl never prints the password.
#[derive(Clone, Deserialize, PartialEq)]
pub struct AccountCredential {
    pub account_name: String,
    pub username: String,
    pub password: String,
}

impl AccountCredential {
    pub fn new(
        account_name: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            account_name: account_name.into(),
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for AccountCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountCredential")
            .field("account_name", &self.account_name)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Outcome of a single workflow step, appended in order to the
/// account's report. Optional fields are omitted from JSON when unset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepResult {
    pub step: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulated: Option<bool>,
}

impl StepResult {
    pub fn succeeded(step: &str) -> Self {
        Self {
            step: step.to_string(),
            success: true,
            error: None,
            alert_message: None,
            cached: None,
            simulated: None,
        }
    }

    pub fn simulated(step: &str) -> Self {
        let mut result = Self::succeeded(step);
        result.simulated = Some(true);
        result
    }

    pub fn failed(step: &str, error: impl Into<String>) -> Self {
        Self {
            step: step.to_string(),
            success: false,
            error: Some(error.into()),
            alert_message: None,
            cached: None,
            simulated: None,
        }
    }

    pub fn with_alert(mut self, message: impl Into<String>) -> Self {
        self.alert_message = Some(message.into());
        self
    }

    pub fn with_cached(mut self) -> Self {
        self.cached = Some(true);
        self
    }
}

/// Per-account outcome of one trigger. Produced exactly once per
/// account, whether the workflow ran, failed early, or panicked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountReport {
    pub account_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_number: Option<String>,
    pub dry_run: bool,
    pub steps: Vec<StepResult>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub start_time_utc: String,
    pub end_time_utc: String,
    pub duration_seconds: f64,
}

impl AccountReport {
    /// Placeholder report for an account whose workflow never produced
    /// one (context open failure, task panic).
    pub fn failed(
        account_name: &str,
        order_number: Option<String>,
        dry_run: bool,
        error: impl Into<String>,
    ) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            account_name: account_name.to_string(),
            order_number,
            dry_run,
            steps: Vec::new(),
            success: false,
            error: Some(error.into()),
            start_time_utc: now.clone(),
            end_time_utc: now,
            duration_seconds: 0.0,
        }
    }
}

/// Aggregate of all account reports for one trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_number: Option<String>,
    pub dry_run: bool,
    pub success_count: usize,
    pub failure_count: usize,
    pub reports: Vec<AccountReport>,
}

impl RunSummary {
    pub fn from_reports(
        order_number: Option<String>,
        dry_run: bool,
        reports: Vec<AccountReport>,
    ) -> Self {
        let success_count = reports.iter().filter(|r| r.success).count();
        let failure_count = reports.len() - success_count;
        Self {
            order_number,
            dry_run,
            success_count,
            failure_count,
            reports,
        }
    }
}

/// What a front end hands to the orchestrator: which order to process
/// and how.
#[derive(Debug, Clone, Deserialize)]
pub struct Trigger {
    pub order_number: String,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub accounts_file: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_debug_redacts_password() {
        let credential = AccountCredential::new("acct_1", "user@test.com", "hunter2");
        let rendered = format!("{:?}", credential);

        assert!(rendered.contains("acct_1"));
        assert!(rendered.contains("user@test.com"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_credential_deserialization() {
        let credential: AccountCredential = serde_json::from_str(
            r#"{"account_name": "acct_1", "username": "u", "password": "p"}"#,
        )
        .unwrap();

        assert_eq!(credential, AccountCredential::new("acct_1", "u", "p"));
    }

    #[test]
    fn test_step_result_omits_unset_fields() {
        let serialized = serde_json::to_string(&StepResult::succeeded("login")).unwrap();

        assert_eq!(serialized, r#"{"step":"login","success":true}"#);
    }

    #[test]
    fn test_step_result_keeps_alert_and_cached_flags() {
        let result = StepResult::succeeded("login").with_cached().with_alert("ok");
        let value = serde_json::to_value(&result).unwrap();

        assert_eq!(value["cached"], true);
        assert_eq!(value["alert_message"], "ok");
        assert!(value.get("simulated").is_none());
    }

    #[test]
    fn test_account_report_round_trip() {
        let report = AccountReport {
            account_name: "acct_1".to_string(),
            order_number: Some("12345".to_string()),
            dry_run: false,
            steps: vec![StepResult::succeeded("login")],
            success: true,
            error: None,
            start_time_utc: "2024-01-01T00:00:00+00:00".to_string(),
            end_time_utc: "2024-01-01T00:00:05+00:00".to_string(),
            duration_seconds: 5.0,
        };

        let serialized = serde_json::to_string(&report).unwrap();
        let deserialized: AccountReport = serde_json::from_str(&serialized).unwrap();

        assert_eq!(report, deserialized);
    }

    #[test]
    fn test_summary_counts() {
        let reports = vec![
            AccountReport::failed("a", Some("1".into()), false, "boom"),
            AccountReport {
                success: true,
                ..AccountReport::failed("b", Some("1".into()), false, "")
            },
        ];

        let summary = RunSummary::from_reports(Some("1".into()), false, reports);

        assert_eq!(summary.success_count, 1);
        assert_eq!(summary.failure_count, 1);
    }

    #[test]
    fn test_trigger_defaults() {
        let trigger: Trigger = serde_json::from_str(r#"{"order_number": "98765"}"#).unwrap();

        assert_eq!(trigger.order_number, "98765");
        assert!(!trigger.dry_run);
        assert!(trigger.concurrency.is_none());
        assert!(trigger.accounts_file.is_none());
    }
}
