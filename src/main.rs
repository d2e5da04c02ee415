use anyhow::Context;
use drivesync_lib::cli::Cli;
use drivesync_lib::config::{default_config_path, AppConfig};
use drivesync_lib::logging::{init_logging, log_dir};
use drivesync_lib::storage::{create_storage, DriveStore, RemoteStore};
use drivesync_lib::SyncEngine;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::error;

async fn run(cli: Cli, config: AppConfig) -> anyhow::Result<()> {
    let sync_config = cli.sync_config()?;
    let sources = cli.source_locations();
    let dest = cli.dest_location();

    let source_remote = sources.iter().any(|s| s.remote());
    if source_remote && sources.iter().any(|s| !s.remote()) {
        anyhow::bail!("Sources must all be local or all be remote");
    }

    let store: Option<Arc<dyn RemoteStore>> = if source_remote || dest.remote() {
        let token = config
            .remote
            .token()
            .context("No access token: set remote.accessToken or DRIVESYNC_ACCESS_TOKEN")?;
        let drive: Arc<dyn RemoteStore> = Arc::new(DriveStore::new(
            &config.remote,
            token,
            config.retry.executor(),
        )?);
        Some(drive)
    } else {
        None
    };

    let source_backend = create_storage(&sources[0], store.clone())?;
    let dest_backend = create_storage(&dest, store)?;

    let engine = SyncEngine::from_backends(sync_config, &source_backend, &dest_backend);
    engine.sync(&sources, &dest).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::parse_ordered(std::env::args_os()) {
        Ok(cli) => cli,
        Err(e) => e.exit(),
    };

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = match AppConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration {}: {}", config_path.display(), e);
            return ExitCode::FAILURE;
        }
    };
    let _guard = init_logging(cli.verbose, &config.log, &log_dir());

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
