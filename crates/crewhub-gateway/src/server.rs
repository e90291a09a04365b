//! Stdio server - line-delimited JSON-RPC over an async reader/writer pair

use crate::rpc::{handle_line, AppContext};
use crewhub_core::{CrewhubConfig, RpcResponse};
use crewhub_llm::from_config;
use crewhub_runtime::{ExecutionGateway, TeamManager};
use crewhub_store::{EntityStore, FileSessionStore, JsonFileEntityStore};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Open the stores, load the graph and pick the provider.
///
/// A provider that cannot be built does not stop the server; graph tools
/// keep working and `run_ai_team` reports the reason.
pub async fn build_context(config: &CrewhubConfig) -> anyhow::Result<AppContext> {
    let store: Arc<dyn EntityStore> = Arc::new(JsonFileEntityStore::open(&config.data_dir).await?);
    let sessions = Arc::new(FileSessionStore::open(&config.sessions_dir, config.session_ttl_hours).await?);
    let manager = Arc::new(TeamManager::load(store).await?);

    let runner = ExecutionGateway::new(manager, sessions, config);
    let runner = match from_config(config) {
        Ok(provider) => {
            info!("LLM provider: {} (team model {})", provider.name(), config.team_model());
            runner.with_provider(provider)
        }
        Err(e) => {
            warn!("No usable LLM provider, run_ai_team is disabled: {}", e);
            runner.without_provider(e.to_string())
        }
    };
    Ok(AppContext::new(runner))
}

/// Serve requests from `reader` until EOF, writing one response per line to `writer`.
///
/// Every request runs on its own task, so responses may arrive out of order;
/// clients match them by id. Pending requests are drained before returning.
pub async fn serve<R, W>(ctx: Arc<AppContext>, reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<RpcResponse>();

    let writer_task = tokio::spawn(async move {
        while let Some(response) = rx.recv().await {
            let mut json = match serde_json::to_string(&response) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize response: {}", e);
                    continue;
                }
            };
            json.push('\n');
            writer.write_all(json.as_bytes()).await?;
            writer.flush().await?;
        }
        Ok::<_, std::io::Error>(())
    });

    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        let ctx = Arc::clone(&ctx);
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Some(response) = handle_line(&line, &ctx).await {
                let _ = tx.send(response);
            }
        });
    }
    drop(tx);

    match writer_task.await {
        Ok(result) => result,
        Err(e) => Err(std::io::Error::new(std::io::ErrorKind::Other, e)),
    }
}

/// Status table printed by `crewhub check`.
#[derive(Debug)]
pub struct CheckReport {
    pub table: String,
    /// Teams in `config_error`.
    pub degraded: usize,
}

pub async fn check_report(ctx: &AppContext) -> CheckReport {
    let teams = ctx.manager.list_teams().await;
    let mut table = format!("{:<24} {:<14} REASON\n", "TEAM", "STATUS");
    let mut degraded = 0;
    for team in &teams {
        if team.status != "active" {
            degraded += 1;
        }
        table.push_str(&format!(
            "{:<24} {:<14} {}\n",
            team.team_key,
            team.status,
            team.reason.as_deref().unwrap_or("")
        ));
    }
    table.push_str(&format!("{} teams, {} in config_error\n", teams.len(), degraded));
    table.push_str(&format!("init order: {}\n", ctx.manager.init_order().await.join(", ")));
    CheckReport { table, degraded }
}

/// Run the server on the process's stdin and stdout.
pub async fn serve_stdio(config: &CrewhubConfig) -> anyhow::Result<()> {
    let ctx = Arc::new(build_context(config).await?);
    let teams = ctx.manager.list_teams().await;
    let degraded = teams.iter().filter(|t| t.status != "active").count();
    info!(
        "crewhub ready on stdio: {} teams ({} in config_error), data dir {}",
        teams.len(),
        degraded,
        config.data_dir.display()
    );

    serve(ctx, tokio::io::stdin(), tokio::io::stdout()).await?;
    info!("stdin closed, shutting down");
    Ok(())
}
