mod args;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use batch_ingest::config::Config;
use batch_ingest::server::serve;
use batch_ingest::service::IngestionService;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};

use crate::args::Args;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Logging
    if args.debug {
        tracing_subscriber::fmt()
            .with_max_level(Level::TRACE)
            .init();
    } else {
        tracing_subscriber::fmt().json().init();
    }

    let config = match args.config() {
        Ok(config) => config,
        Err(error) => {
            error!("unusable configuration: {error:#}");
            return ExitCode::from(2);
        },
    };

    let service = match IngestionService::from_config(&config) {
        Ok(service) => Arc::new(service),
        Err(error) => {
            error!(%error, "unusable configuration");
            return ExitCode::from(2);
        },
    };

    // Cancellation and termination channel.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(error) = signal::ctrl_c().await {
                warn!(%error, "something strange with ctrl-c handling!");
            };
            cancel.cancel();
        });
    }

    let (shutdown_hold, mut shutdown_wait) = mpsc::channel::<()>(1);

    service.start();

    let exit_code = if let Err(error) =
        begin(&args, &config, Arc::clone(&service), cancel, shutdown_hold)
            .await
    {
        error!("encountered runtime error: {error:#}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    };

    // Connections close first so no submission races the dispatcher stopping.
    shutdown_wait.recv().await;
    service.shutdown().await;

    exit_code
}

async fn begin(
    args: &Args,
    config: &Config,
    service: Arc<IngestionService>,
    cancel: CancellationToken,
    shutdown_hold: mpsc::Sender<()>,
) -> Result<()> {
    let listener = TcpListener::bind((args.listen, args.port)).await?;

    info!(
        batch_size = config.batch_size,
        rate_limit = ?config.rate_limit(),
        process_delay = ?config.process_delay(),
        "ingestion service configured",
    );

    serve(listener, service, config.max_line_len, cancel, shutdown_hold).await
}
