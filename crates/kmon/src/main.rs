use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use kmon::{
    client::{connect, KubeClient},
    config::{Cli, Command, Config},
    handle_pod_command, handle_pvc_command, Context,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal;

        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn init_tracing() {
    let logger = tracing_subscriber::fmt::layer().compact();
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    Registry::default().with(env_filter).with(logger).init();
}

async fn run(cli: &Cli, config: &Config, cancel: CancellationToken) -> anyhow::Result<()> {
    let client = connect(config.context())
        .await
        .context("could not build kube client")?;
    let client = Arc::new(KubeClient::new(client));

    let ctx = Context::new(client.clone(), client, cancel);

    match cli.command {
        Command::Pod(_) => handle_pod_command(&ctx, config).await?,
        Command::Pvc(_) => handle_pvc_command(&ctx, config).await?,
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();

    let config = match Config::load(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("failed to load configuration: {:#}", anyhow::Error::from(e));
            tokio::time::sleep(cli.fallback_exit_delay()).await;
            return ExitCode::FAILURE;
        }
    };

    if let Some(path) = &cli.config {
        info!(file = %path.display(), "using config file");
    }

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            info!("shutdown requested, cancelling");
            cancel.cancel();
        }
    });

    let result = run(&cli, &config, cancel).await;

    let code = match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("kmon failed: {e:#}");
            ExitCode::FAILURE
        }
    };

    // Give log viewers tailing this pod a chance to show the output.
    tokio::time::sleep(config.exit_delay()).await;

    code
}
