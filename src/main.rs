use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use positivity_tracker::{Config, OptionPicker, Server, ShutdownHandle, Tracker};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_logger(verbose: bool) {
    let default = if verbose {
        "positivity_tracker=debug,info"
    } else {
        "positivity_tracker=info"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .compact(),
        )
        .init();
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<&'static str> {
    use tokio::signal::unix::SignalKind;

    let mut terminate =
        signal::unix::signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    let mut quit =
        signal::unix::signal(SignalKind::quit()).context("installing SIGQUIT handler")?;

    tokio::select! {
        res = signal::ctrl_c() => res.map(|_| "SIGINT").context("installing Ctrl+C handler"),
        _ = terminate.recv() => Ok("SIGTERM"),
        _ = quit.recv() => Ok("SIGQUIT"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<&'static str> {
    signal::ctrl_c().await.context("installing Ctrl+C handler")?;
    Ok("Ctrl+C")
}

fn shutdown_on_signal(handle: ShutdownHandle) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building signal runtime")?;

    thread::Builder::new()
        .name("signals".into())
        .spawn(move || {
            match runtime.block_on(wait_for_signal()) {
                Ok(signal) => info!(signal, "shutting down..."),
                Err(err) => error!(error = %err, "signal handling failed, shutting down"),
            }
            handle.shutdown();
        })
        .context("spawning signal thread")?;

    Ok(())
}

fn main() -> Result<()> {
    let config = Config::parse();
    init_logger(config.verbose);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting positivity tracker server..."
    );

    let store = config.open_store();
    info!(data_dir = %store.base_path().display(), "using counter store");
    let tracker = Tracker::new(store, OptionPicker::default());

    let server = Server::builder()
        .max_threads(config.max_threads)
        .idle_timeout(config.idle_timeout())
        .drain_timeout(config.shutdown_timeout())
        .bind(&config.host)
        .with_context(|| format!("binding to {}", config.host))?;

    info!(addr = %server.local_addr()?, "listening");

    shutdown_on_signal(server.shutdown_handle()?)?;
    server.serve(tracker).context("serving http")?;

    Ok(())
}
