use crate::{
    error::CliError,
    shutdown::{ExitCode, ShutdownCoordinator},
};
use chrono::Utc;
use clap::Parser;
use commands::Commands;
use connectors::{store::s3::S3Stager, warehouse::postgres::PgConnectionSource};
use engine_config::{
    env::EnvSnapshot,
    settings::{LoaderSettings, LoaderSettingsBuilder},
};
use engine_core::observer::TracingObserver;
use engine_runtime::{
    controller::{Loader, plan_load},
    keys::KeyFactory,
    payload::Payload,
};
use model::load::{LoadMode, ManifestRef};
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod commands;
mod conn;
mod error;
mod output;
mod shutdown;

#[derive(Parser)]
#[command(name = "redload", version = "0.1.0", about = "Bulk loader for Redshift")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let code = match run(cli.command).await {
        Ok(()) => ExitCode::Success,
        Err(CliError::ShutdownRequested) => {
            info!("Load aborted on shutdown request");
            ExitCode::ShutdownRequested
        }
        Err(e) => {
            error!(error = %e, "redload failed");
            ExitCode::GeneralError
        }
    };
    code.into()
}

async fn run(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Load {
            config,
            mode,
            env_file,
            files,
        } => {
            let settings = load_settings(&config, env_file.as_deref())?;
            load(settings, mode, files).await
        }
        Commands::Plan {
            config,
            mode,
            env_file,
        } => {
            let settings = load_settings(&config, env_file.as_deref())?;
            let keys = KeyFactory::new(settings.file_prefix.clone(), Utc::now());
            let manifest = ManifestRef {
                bucket: settings.bucket.clone(),
                key: keys.manifest_key(),
                entries: 0,
            };
            let plan = plan_load(&settings, mode, &manifest, keys.stamp())?;
            output::print_plan(&plan)
        }
        Commands::TestConn { url } => conn::ping(&url).await,
    }
}

fn load_settings(config: &str, env_file: Option<&str>) -> Result<LoaderSettings, CliError> {
    let mut env = EnvSnapshot::from_process();
    if let Some(path) = env_file {
        env.load_from_file(path)?;
    }
    Ok(LoaderSettingsBuilder::from_file(config)?.build(&env)?)
}

async fn load(settings: LoaderSettings, mode: LoadMode, files: Vec<String>) -> Result<(), CliError> {
    let url = settings
        .warehouse_url
        .clone()
        .ok_or(CliError::MissingWarehouseUrl)?;
    let source = PgConnectionSource::new(&url)?;
    let stager = S3Stager::new(&settings.s3).await;

    let loader = Loader::with_observer(
        Arc::new(settings),
        Arc::new(stager),
        Arc::new(source),
        Arc::new(TracingObserver),
    );
    info!(run_id = %loader.run_id(), %mode, files = files.len(), "Staging files");

    for path in &files {
        let file = match tokio::fs::File::open(path).await {
            Ok(file) => file,
            Err(e) => {
                error!(path = %path, error = %e, "Could not open input file");
                loader.abort().await;
                return Err(e.into());
            }
        };
        loader.add_payload(Payload::stream(ReaderStream::new(file)))?;
    }

    let cancel = ShutdownCoordinator::new().listen();

    let summary = tokio::select! {
        result = loader.run(mode) => result?,
        _ = cancel.cancelled() => {
            loader.abort().await;
            return Err(CliError::ShutdownRequested);
        }
    };

    loader.join_cleanup().await;
    output::print_summary(&summary)
}
