mod app;
mod msg;

use std::io;
use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};

use extcat::catalog::TracingProgress;
use extcat::host::PluginDirHost;
use extcat::model::config::AppConfig;
use extcat::registry::OpenVsxClient;
use extcat::ExtensionCatalog;

use app::App;
use msg::Msg;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging to file (never stdout)
    let log_dir = directories::ProjectDirs::from("", "", "extcat")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join("extcat"));
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "extcat.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("extcat=info"));
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(filter)
        .init();

    tracing::info!("extcat starting");

    let config = AppConfig::load()?;
    let result = run(config).await;

    if let Err(e) = &result {
        tracing::error!("extcat error: {e:?}");
    }
    result
}

async fn run(config: AppConfig) -> Result<()> {
    let registry = Arc::new(OpenVsxClient::new(&config.registry)?);
    let host = PluginDirHost::new(config.plugin_dirs());
    if let Err(err) = host.watch() {
        tracing::warn!("failed to watch plugin directories: {err}");
    }

    let catalog = ExtensionCatalog::new(
        &config.catalog,
        registry,
        host.clone(),
        Arc::new(TracingProgress),
    );
    let mut events = catalog.subscribe();
    catalog.start().await;

    let (tx, mut rx) = mpsc::unbounded_channel::<Msg>();
    let mut app = App::new(catalog, host, tx.clone());

    // Input task: one message per stdin line, Quit on EOF.
    let tx_input = tx.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let msg = match lines.next_line().await {
                Ok(Some(line)) => Msg::Input(line),
                Ok(None) => Msg::Quit,
                Err(err) => {
                    tracing::warn!("stdin read failed: {err}");
                    Msg::Quit
                }
            };
            let quit = matches!(msg, Msg::Quit);
            if tx_input.send(msg).is_err() || quit {
                break;
            }
        }
    });

    // Catalog events forwarded into the same loop.
    let tx_events = tx.clone();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if tx_events.send(Msg::Catalog(event)).is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "catalog events lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let mut stdout = io::stdout();
    app.view(&mut stdout)?;

    // ── Main event loop ──
    while let Some(first) = rx.recv().await {
        // Batch-drain all pending messages
        app.update(first)?;
        while let Ok(msg) = rx.try_recv() {
            app.update(msg)?;
        }

        app.view(&mut stdout)?;
        if app.should_quit {
            break;
        }
    }

    tracing::info!("extcat exiting");
    Ok(())
}
