use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

use crate::core::error::AppResult;

/// URLs of the target site. `section_url` is the order-recognition
/// page; `login_url_marker` is the URL fragment that identifies the
/// login page after a redirect.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub base_url: String,
    pub login_url: String,
    pub section_url: String,
    pub login_url_marker: String,
}

impl SiteConfig {
    /// Derives all site URLs from a base URL, e.g.
    /// `https://optcoin66.com/pc/`.
    pub fn for_base(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            base_url: format!("{}/", base),
            login_url: format!("{}/#/login", base),
            section_url: format!("{}/#/delivery", base),
            login_url_marker: "/login".to_string(),
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self::for_base("https://optcoin66.com/pc/")
    }
}

/// CSS selectors for every element the workflow touches.
#[derive(Debug, Clone)]
pub struct Selectors {
    pub username_input: String,
    pub password_input: String,
    pub login_submit: String,
    pub login_error: String,
    pub section_tab: String,
    pub order_input: String,
    pub recognize_button: String,
    pub confirm_button: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            username_input: r#"input[placeholder="Please enter your email"]"#.to_string(),
            password_input: r#"input[placeholder="Please enter password"]"#.to_string(),
            login_submit: r#"button:has-text("LOG IN")"#.to_string(),
            login_error: "div.wrong-msg".to_string(),
            section_tab: r#"div.tab:has-text("Invited Me")"#.to_string(),
            order_input: r#"input[placeholder^="Please enter the order"]"#.to_string(),
            recognize_button: r#"button:has-text("RECOGNIZE")"#.to_string(),
            confirm_button: r#"button:has-text("CONFIRM")"#.to_string(),
        }
    }
}

/// Wait budgets for the workflow. `default` bounds ordinary element
/// waits; the rest are windows for specific races in the flow.
#[derive(Debug, Clone)]
pub struct Timeouts {
    pub default: Duration,
    pub session_bounce: Duration,
    pub session_marker: Duration,
    pub recognize_alert: Duration,
    pub recognize_confirm: Duration,
    pub confirm_alert: Duration,
    pub settle: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            default: Duration::from_millis(30_000),
            session_bounce: Duration::from_millis(5_000),
            session_marker: Duration::from_millis(1_000),
            recognize_alert: Duration::from_millis(3_000),
            recognize_confirm: Duration::from_millis(8_000),
            confirm_alert: Duration::from_millis(800),
            settle: Duration::from_millis(1_000),
        }
    }
}

/// Attempt budget and pause between attempts for one workflow step.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

/// Per-step retry policies.
#[derive(Debug, Clone)]
pub struct RetrySettings {
    pub login: RetryPolicy,
    pub navigation: RetryPolicy,
    pub submit: RetryPolicy,
    pub confirm: RetryPolicy,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let delay = Duration::from_millis(500);
        Self {
            login: RetryPolicy::new(2, delay),
            navigation: RetryPolicy::new(3, delay),
            submit: RetryPolicy::new(3, delay),
            confirm: RetryPolicy::new(3, delay),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub site: SiteConfig,
    pub selectors: Selectors,
    pub timeouts: Timeouts,
    pub retry: RetrySettings,
    pub storage_state_enabled: bool,
    pub storage_state_dir: String,
    pub max_concurrent_accounts: usize,
    pub enforce_min_run_per_account: bool,
    pub enforce_min_run_per_execution: bool,
    pub min_run_seconds: u64,
    pub low_resource_mode: bool,
    pub chromium_launch_args: Vec<String>,
    pub webhook_host: String,
    pub webhook_port: u16,
    pub default_username: Option<String>,
    pub default_password: Option<String>,
    pub log_dir: String,
}

impl AppConfig {
    pub fn new() -> Self {
        Self {
            site: SiteConfig::default(),
            selectors: Selectors::default(),
            timeouts: Timeouts::default(),
            retry: RetrySettings::default(),
            storage_state_enabled: true,
            storage_state_dir: "storage_states".to_string(),
            max_concurrent_accounts: 2,
            enforce_min_run_per_account: false,
            enforce_min_run_per_execution: false,
            min_run_seconds: 0,
            low_resource_mode: true,
            chromium_launch_args: vec![
                "--disable-dev-shm-usage".to_string(),
                "--disable-gpu".to_string(),
                "--no-default-browser-check".to_string(),
                "--no-first-run".to_string(),
                "--no-zygote".to_string(),
                "--disable-extensions".to_string(),
                "--mute-audio".to_string(),
                "--blink-settings=imagesEnabled=false".to_string(),
            ],
            webhook_host: "0.0.0.0".to_string(),
            webhook_port: 8000,
            default_username: None,
            default_password: None,
            log_dir: "logs".to_string(),
        }
    }

    /// Builds the config from process environment (and a `.env` file
    /// if present), falling back to defaults per field.
    pub fn from_env() -> AppResult<Self> {
        dotenv::dotenv().ok();

        let mut config = Self::new();

        if let Ok(base_url) = env::var("OPTCOIN_BASE_URL") {
            config.site = SiteConfig::for_base(&base_url);
        }
        if let Ok(login_url) = env::var("OPTCOIN_LOGIN_URL") {
            config.site.login_url = login_url;
        }
        config.default_username = env::var("OPTCOIN_USERNAME").ok();
        config.default_password = env::var("OPTCOIN_PASSWORD").ok();

        if let Some(enabled) = env_var_parse::<bool>("STORAGE_STATE_ENABLED")? {
            config.storage_state_enabled = enabled;
        }
        if let Ok(dir) = env::var("STORAGE_STATE_DIR") {
            config.storage_state_dir = dir;
        }
        if let Some(limit) = env_var_parse::<usize>("MAX_CONCURRENT_ACCOUNTS")? {
            config.max_concurrent_accounts = limit;
        }
        if let Some(seconds) = env_var_parse::<u64>("MIN_RUN_SECONDS")? {
            config.min_run_seconds = seconds;
        }
        if let Some(enforce) = env_var_parse::<bool>("ENFORCE_MIN_RUN_PER_ACCOUNT")? {
            config.enforce_min_run_per_account = enforce;
        }
        if let Some(enforce) = env_var_parse::<bool>("ENFORCE_MIN_RUN_PER_EXECUTION")? {
            config.enforce_min_run_per_execution = enforce;
        }
        if let Some(low_resource) = env_var_parse::<bool>("LOW_RESOURCE_MODE")? {
            config.low_resource_mode = low_resource;
        }
        if let Ok(host) = env::var("WEBHOOK_HOST") {
            config.webhook_host = host;
        }
        if let Some(port) = env_var_parse::<u16>("WEBHOOK_PORT")? {
            config.webhook_port = port;
        }
        if let Some(millis) = env_var_parse::<u64>("DEFAULT_TIMEOUT_MS")? {
            config.timeouts.default = Duration::from_millis(millis);
        }
        if let Some(millis) = env_var_parse::<u64>("RETRY_DELAY_MS")? {
            let delay = Duration::from_millis(millis);
            config.retry.login.delay = delay;
            config.retry.navigation.delay = delay;
            config.retry.submit.delay = delay;
            config.retry.confirm.delay = delay;
        }
        if let Some(attempts) = env_var_parse::<u32>("LOGIN_MAX_ATTEMPTS")? {
            config.retry.login.max_attempts = attempts.max(1);
        }
        if let Some(attempts) = env_var_parse::<u32>("SUBMIT_MAX_ATTEMPTS")? {
            config.retry.submit.max_attempts = attempts.max(1);
        }
        if let Ok(dir) = env::var("LOG_DIR") {
            config.log_dir = dir;
        }

        Ok(config)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads and parses an optional environment variable. Unset means
/// `None`; set but unparseable is an error rather than a silent
/// fallback.
fn env_var_parse<T>(name: &str) -> AppResult<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => {
            let parsed = raw
                .parse::<T>()
                .with_context(|| format!("invalid value for {}: {:?}", name, raw))?;
            Ok(Some(parsed))
        }
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_config_derivation() {
        let site = SiteConfig::for_base("https://example.com/pc");

        assert_eq!(site.base_url, "https://example.com/pc/");
        assert_eq!(site.login_url, "https://example.com/pc/#/login");
        assert_eq!(site.section_url, "https://example.com/pc/#/delivery");
        assert_eq!(site.login_url_marker, "/login");
    }

    #[test]
    fn test_site_config_tolerates_trailing_slash() {
        let with_slash = SiteConfig::for_base("https://example.com/pc/");
        let without_slash = SiteConfig::for_base("https://example.com/pc");

        assert_eq!(with_slash.login_url, without_slash.login_url);
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::new();

        assert_eq!(config.max_concurrent_accounts, 2);
        assert_eq!(config.timeouts.default, Duration::from_millis(30_000));
        assert_eq!(config.retry.login.max_attempts, 2);
        assert_eq!(config.retry.submit.max_attempts, 3);
        assert!(config.storage_state_enabled);
        assert!(config.low_resource_mode);
        assert_eq!(config.webhook_port, 8000);
    }

    #[test]
    fn test_retry_policy_floors_attempts_at_one() {
        let policy = RetryPolicy::new(0, Duration::from_millis(1));

        assert_eq!(policy.max_attempts, 1);
    }
}
