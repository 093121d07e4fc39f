use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::core::config::AppConfig;
use crate::core::error::UnitResult;
use crate::core::models::{AccountCredential, Trigger};
use crate::infrastructure::browser::{AutomationSurface, PlaywrightSurface};
use crate::infrastructure::session::SessionStore;
use crate::services::accounts::resolve_accounts;
use crate::services::commands::{execute_order_run, render_summary};
use crate::services::scheduler::RunContext;

#[derive(Clone)]
pub struct ServerState {
    config: Arc<AppConfig>,
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/trigger", post(trigger_handler))
        .with_state(state)
}

async fn health_handler() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// Accepts an order trigger, validates it, and runs it in the
/// background. Responds 202 with a run id; the caller polls logs or
/// reports for the outcome.
async fn trigger_handler(
    State(state): State<ServerState>,
    Json(trigger): Json<Trigger>,
) -> (StatusCode, Json<Value>) {
    if trigger.order_number.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "order_number must not be empty"})),
        );
    }

    let accounts = match resolve_accounts(&state.config, trigger.accounts_file.as_deref()).await {
        Ok(accounts) if !accounts.is_empty() => accounts,
        Ok(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "no accounts configured"})),
            )
        }
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": e.to_string()})),
            )
        }
    };

    let run_id = Uuid::new_v4().to_string();
    info!(
        "Accepted trigger for order {} across {} accounts, run_id={}",
        trigger.order_number,
        accounts.len(),
        run_id
    );

    let config = Arc::clone(&state.config);
    let task_run_id = run_id.clone();
    tokio::spawn(async move {
        if let Err(e) = run_trigger(config, trigger, accounts).await {
            error!("[run {}] trigger execution failed: {}", task_run_id, e);
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(json!({"status": "accepted", "run_id": run_id})),
    )
}

/// Runs one accepted trigger on a fresh headless surface, the way the
/// CLI would.
async fn run_trigger(
    config: Arc<AppConfig>,
    trigger: Trigger,
    accounts: Vec<AccountCredential>,
) -> UnitResult {
    let surface: Arc<dyn AutomationSurface> = Arc::new(
        PlaywrightSurface::launch(true, config.low_resource_mode, &config.chromium_launch_args)
            .await?,
    );
    let sessions = Arc::new(SessionStore::new(&config.storage_state_dir));
    let run = RunContext {
        order_number: Some(trigger.order_number),
        dry_run: trigger.dry_run,
        concurrency: trigger.concurrency.unwrap_or(config.max_concurrent_accounts),
        performant: true,
    };

    let summary = execute_order_run(
        Arc::clone(&config),
        Arc::clone(&surface),
        sessions,
        accounts,
        run,
    )
    .await;
    info!("Triggered run finished:\n{}", render_summary(&summary));

    if let Err(e) = surface.shutdown().await {
        warn!("Surface shutdown failed: {}", e);
    }
    Ok(())
}

pub async fn serve(config: Arc<AppConfig>, host: Option<String>, port: Option<u16>) -> UnitResult {
    let host = host.unwrap_or_else(|| config.webhook_host.clone());
    let port = port.unwrap_or(config.webhook_port);
    let addr = format!("{}:{}", host, port);

    let app = router(ServerState { config });

    info!("Webhook server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_handler_reports_ok() {
        let Json(value) = health_handler().await;
        assert_eq!(value["status"], "ok");
    }

    #[test]
    fn test_router_builds() {
        let state = ServerState {
            config: Arc::new(AppConfig::new()),
        };
        let _ = router(state);
    }
}
