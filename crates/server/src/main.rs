use clap::Parser;
use color_eyre::eyre::WrapErr;
use rr_core::config::loader::load_config;
use rr_core::config::models::AppConfig;
use rr_core::doctor::Doctor;
use rr_core::engine::PipelineEngine;
use rr_core::state::RunManager;
use rr_server::cli::{Cli, Command};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "repo_runner=info,rr_server=info,rr_core=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let root = std::env::current_dir().wrap_err("Failed to read the current directory")?;
    let config = load_config(&root, cli.config.as_deref())?;

    match cli.command() {
        Command::Serve => serve(config).await,
        Command::Doctor => {
            let report = Doctor::native(config)
                .map_err(|e| color_eyre::eyre::eyre!(e))?
                .run()
                .await
                .map_err(|e| color_eyre::eyre::eyre!(e))?;
            if !rr_server::doctor::print_report(&report) {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

async fn serve(config: AppConfig) -> color_eyre::Result<()> {
    let server = config.provision.server.clone();
    tracing::info!(
        "Provisioned tiers will run on ports {}/{}",
        config.provision.frontend.port,
        config.provision.backend.port
    );
    tracing::info!("Work directory: {}", config.work_dir().display());

    let engine = PipelineEngine::native(config).map_err(|e| color_eyre::eyre::eyre!(e))?;
    let app = rr_server::api::create_router(RunManager::new(engine));

    let addr = format!("{}:{}", server.host, server.api_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind to {addr}"))?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .await
        .wrap_err("Server terminated unexpectedly")?;
    Ok(())
}
