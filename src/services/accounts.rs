use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use tracing::{info, warn};

use crate::core::config::AppConfig;
use crate::core::error::{AppError, AppResult};
use crate::core::models::AccountCredential;

#[derive(Deserialize)]
struct AccountsFile {
    accounts: Vec<AccountCredential>,
}

/// Resolves the accounts to process: a CSV or JSON file when one is
/// given and exists, otherwise the default credentials from the
/// environment, otherwise nothing.
pub async fn resolve_accounts(
    config: &AppConfig,
    accounts_file: Option<&str>,
) -> AppResult<Vec<AccountCredential>> {
    if let Some(path) = accounts_file {
        if Path::new(path).exists() {
            return read_accounts_file(path).await;
        }
        warn!("Accounts file not found at '{}', falling back", path);
    }

    if let (Some(username), Some(password)) =
        (&config.default_username, &config.default_password)
    {
        info!("Using default credentials from the environment");
        return Ok(vec![AccountCredential::new(
            "default_account",
            username,
            password,
        )]);
    }

    Ok(Vec::new())
}

/// Like [`resolve_accounts`] but an empty result is an error, for
/// commands that cannot do anything without accounts.
pub async fn resolve_required_accounts(
    config: &AppConfig,
    accounts_file: Option<&str>,
) -> AppResult<Vec<AccountCredential>> {
    let accounts = resolve_accounts(config, accounts_file).await?;
    if accounts.is_empty() {
        return Err(AppError::AccountSource(
            "no accounts configured, provide an accounts file or set \
             OPTCOIN_USERNAME and OPTCOIN_PASSWORD"
                .to_string(),
        ));
    }
    Ok(accounts)
}

async fn read_accounts_file(path: &str) -> AppResult<Vec<AccountCredential>> {
    info!("Reading accounts from {}", path);

    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read accounts file: {}", path))?;

    let accounts = if Path::new(path)
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false)
    {
        parse_csv_accounts(&content)?
    } else {
        let parsed: AccountsFile = serde_json::from_str(&content)
            .map_err(|e| AppError::AccountSource(format!("Invalid accounts JSON: {}", e)))?;
        parsed.accounts
    };

    info!("Loaded {} accounts from {}", accounts.len(), path);
    Ok(accounts)
}

fn parse_csv_accounts(content: &str) -> AppResult<Vec<AccountCredential>> {
    let mut reader = csv::Reader::from_reader(content.as_bytes());
    let headers = reader
        .headers()
        .map_err(|e| AppError::AccountSource(format!("Invalid accounts CSV: {}", e)))?
        .clone();

    let mut accounts = Vec::new();
    for (index, result) in reader.records().enumerate() {
        match result {
            Ok(record) => match record.deserialize(Some(&headers)) {
                Ok(account) => accounts.push(account),
                Err(e) => warn!("Skipping row {}: {}", index + 1, e),
            },
            Err(e) => warn!("Skipping row {}: {}", index + 1, e),
        }
    }
    Ok(accounts)
}
