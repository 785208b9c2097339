use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use roomslot::command::{execute, parse_command, Reply};
use roomslot::config::Config;
use roomslot::engine::Scheduler;
use roomslot::observability;
use roomslot::store::MemoryStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Replies go to stdout, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env()?;
    observability::init(config.metrics_port)?;

    if let Some(dir) = config.data_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let store = Arc::new(MemoryStore::load(&config.data_path)?);
    let scheduler = Scheduler::new(store.clone(), config.scheduler());

    info!("roomslot ready");
    info!("  data: {}", config.data_path.display());
    info!("  fetch policy: {:?}", config.fetch_policy);
    info!("  suggest attempts: {}", config.suggest_attempts);
    info!(
        "  metrics: {}",
        config.metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {}
                        _ = sigterm.recv() => {}
                    }
                }
                Err(e) => {
                    tracing::warn!("SIGTERM handler unavailable: {e}");
                    ctrl_c.await.ok();
                }
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    tokio::pin!(shutdown);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let reply = match parse_command(&line) {
            Ok(cmd) => {
                debug!(command = observability::command_label(&cmd), "executing");
                let reply = execute(&scheduler, cmd).await;
                if let Err(e) = store.save(&config.data_path) {
                    tracing::error!("snapshot save failed: {e}");
                }
                reply
            }
            Err(e) => Reply::from(e),
        };

        let mut out = serde_json::to_vec(&reply)?;
        out.push(b'\n');
        stdout.write_all(&out).await?;
        stdout.flush().await?;
    }

    store.save(&config.data_path)?;
    info!("roomslot stopped");
    Ok(())
}
