mod api;
mod error;
mod logging;
mod settings;

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use log::{error, info, warn};
use tokio::net::TcpListener;
use uplift_core::{
    ArchiveFetcher, CommandRunner, DependencyBuilder, GitHubReleaseSource, InstallationSwapper,
    LifecycleController, SystemCommandRunner, Updater, VersionResolver,
};

use crate::error::ServiceError;
use crate::settings::Settings;

#[tokio::main]
async fn main() -> ExitCode {
    let settings = Settings::load();
    logging::init_logging(settings.debug_logging, settings.max_log_size_bytes);

    match run(&settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            error!("Uplift stopped: {failure}");
            eprintln!("uplift: {failure}");
            ExitCode::FAILURE
        }
    }
}

async fn run(settings: &Settings) -> Result<(), ServiceError> {
    let updater = Arc::new(build_updater(settings)?);
    match &settings.active_dir {
        Some(dir) => info!("Managing installation at {}", dir.display()),
        None => warn!("No active directory configured; installs will fail until one is set"),
    }

    let address = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = TcpListener::bind(address)
        .await
        .map_err(|source| ServiceError::Bind { address, source })?;
    info!("Uplift listening on {address}");

    axum::serve(listener, api::router(updater))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ServiceError::Serve)
}

fn build_updater(settings: &Settings) -> Result<Updater, ServiceError> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("uplift/", env!("CARGO_PKG_VERSION")))
        .read_timeout(settings.http_timeout())
        .connect_timeout(settings.connect_timeout())
        .build()
        .map_err(ServiceError::HttpClient)?;
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner);

    let source = GitHubReleaseSource::new(
        client.clone(),
        &settings.api_base,
        &settings.repository,
        settings.archive_format,
    )
    .with_timeout(settings.http_timeout());

    Ok(Updater::new(
        VersionResolver::new(Arc::new(source)),
        ArchiveFetcher::new(client, settings.archive_format, settings.root_prefix()),
        DependencyBuilder::new(
            Arc::clone(&runner),
            settings.toolchain(),
            settings.command_timeout(),
        ),
        LifecycleController::new(
            runner,
            settings.service_control.clone(),
            settings.command_timeout(),
        ),
        InstallationSwapper::new(settings.active_dir.clone()),
    )
    .with_scratch_dir(settings.scratch_dir.clone())
    .with_strategy(settings.strategy)
    .with_package(&settings.package))
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for shutdown signal: {error}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
