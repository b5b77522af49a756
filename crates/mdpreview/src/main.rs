mod app;
mod logging;

use anyhow::{Context, Result};
use app::Args;
use clap::Parser;
use preview_config::{LoadedConfig, Renderer};
use preview_core::{Converter, GitHubConverter, LocalConverter, RenderEngine, WatchedDocument};
use preview_server::ServerOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Time given to in-flight requests once a shutdown signal arrives.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        eprintln!("error: {e:?}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let LoadedConfig {
        config,
        file_path,
        maybe_error,
    } = preview_config::load_config(args.config_file.clone());

    let log_file = args.log.clone().or_else(|| config.log.log_file.clone());
    let _guard = logging::init(log_file.as_deref(), &config.log.max_level)?;

    match (maybe_error, file_path) {
        (Some(err), _) => tracing::warn!("Ignoring config file, using the defaults: {err}"),
        (None, Some(path)) => tracing::debug!(path = %path.display(), "Config loaded"),
        (None, None) => {}
    }

    let settings = args.into_settings(config)?;

    let document = WatchedDocument::new(&settings.file)?
        .with_context(settings.context.clone().unwrap_or_default());

    let converter: Converter = match settings.renderer {
        Renderer::Github => GitHubConverter::new(settings.api_url, settings.token)?.into(),
        Renderer::Local => LocalConverter::new().into(),
    };
    tracing::info!(
        file = %settings.file.display(),
        renderer = converter.name(),
        "Starting preview"
    );

    let engine = Arc::new(
        RenderEngine::new(document, converter)
            .await
            .context("failed to watch the markdown file")?,
    );

    let listener = TcpListener::bind(&settings.addr)
        .await
        .with_context(|| format!("failed to listen on {}", settings.addr))?;
    let url = preview_server::preview_url(listener.local_addr()?);

    tracing::info!("Listening on {}", settings.addr);
    println!("Previewing {} at {url}", settings.file.display());

    if settings.open_browser {
        preview_server::open_browser(&url);
    }

    let app = preview_server::router(engine.clone(), ServerOptions { css: settings.css });

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let mut server = tokio::spawn(preview_server::serve(listener, app, async move {
        let _ = shutdown_rx.await;
    }));

    tokio::select! {
        res = &mut server => {
            engine.shutdown();
            return Ok(res??);
        }
        _ = shutdown_signal() => {}
    }

    let _ = shutdown_tx.send(());
    match tokio::time::timeout(SHUTDOWN_TIMEOUT, server).await {
        Ok(res) => res??,
        Err(_) => tracing::warn!("Server did not stop within {SHUTDOWN_TIMEOUT:?}, exiting"),
    }

    engine.shutdown();
    tracing::info!("Bye");

    Ok(())
}

/// Completes on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(?err, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(?err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("Shutting down");
}
