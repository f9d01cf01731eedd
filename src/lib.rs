pub mod adapters;
pub mod app_state;
pub mod commands;
pub mod config;
pub mod domain;
pub mod storage;

use adapters::openai::OpenAIAdapter;
use anyhow::{anyhow, Context};
use app_state::AppState;
use config::Config;
use domain::models::UserId;
use std::sync::Arc;
use std::time::Duration;
use storage::Storage;
use tracing::info;
use uuid::Uuid;

fn open_storage(config: &Config) -> anyhow::Result<Arc<Storage>> {
    let path = config.database_path();
    let storage = Storage::open(&path)
        .with_context(|| format!("Failed to open database at {}", path.display()))?;
    Ok(Arc::new(storage))
}

/// Opens the store, connects the model and serves HTTP until Ctrl-C.
pub async fn run(config: &Config) -> anyhow::Result<()> {
    let storage = open_storage(config)?;

    let api_key = config
        .api_key()
        .ok_or_else(|| anyhow!("No provider API key configured (set TRAINER_API_KEY or provider.api_key)"))?;
    let mut client = reqwest::Client::builder();
    if let Some(secs) = config.provider.timeout {
        client = client.connect_timeout(Duration::from_secs(secs));
    }
    let model = Arc::new(OpenAIAdapter::with_client(
        client.build().context("Failed to build HTTP client")?,
        api_key.to_string(),
        config.base_url(),
    ));

    let state = AppState::from_config(config, storage, model);
    let listener = tokio::net::TcpListener::bind(config.bind())
        .await
        .with_context(|| format!("Failed to bind {}", config.bind()))?;
    info!(addr = %listener.local_addr()?, model = config.model(), "AI trainer listening");

    axum::serve(listener, commands::router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;
    Ok(())
}

/// Creates a bearer token, for a fresh user unless one is given.
pub fn issue_token(config: &Config, user: Option<Uuid>) -> anyhow::Result<(UserId, String)> {
    let storage = open_storage(config)?;
    let user = UserId(user.unwrap_or_else(Uuid::new_v4));
    let token = storage.issue_token(user)?;
    info!(user_id = %user, "Issued API token");
    Ok((user, token))
}

/// Deletes a bearer token. Returns whether it existed.
pub fn revoke_token(config: &Config, token: &str) -> anyhow::Result<bool> {
    let storage = open_storage(config)?;
    let removed = storage.revoke_token(token)?;
    info!(removed, "Revoked API token");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::Authenticator;
    use tempfile::tempdir;

    #[test]
    fn test_issue_then_revoke_token() {
        let dir = tempdir().unwrap();
        let config = Config {
            database: Some(dir.path().join("trainer.db")),
            ..Default::default()
        };

        let (user, token) = issue_token(&config, None).unwrap();
        let storage = open_storage(&config).unwrap();
        assert_eq!(storage.authenticate(&token).unwrap(), Some(user));

        assert!(revoke_token(&config, &token).unwrap());
        assert!(!revoke_token(&config, &token).unwrap());
        assert_eq!(storage.authenticate(&token).unwrap(), None);
    }
}
