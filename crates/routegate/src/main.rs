//! Routegate - route builder with Basic auth and per-route rate limits

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod config;
mod users;

use config::{Config, LoggingConfig};
use routegate_api::{ApiBuilder, AppState, routes::demo};
use routegate_auth::{PasswordHasher, SharedCredentials};
use users::UserCommand;

/// Routegate - HTTP route builder with credential store
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        global = true,
        default_value = "config/default.toml",
        env = "ROUTEGATE_CONFIG"
    )]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve(ServeArgs),
    /// Manage stored credentials
    #[command(subcommand)]
    User(UserCommand),
}

#[derive(clap::Args, Debug, Default)]
struct ServeArgs {
    /// Bind address
    #[arg(long, env = "ROUTEGATE_BIND")]
    bind: Option<String>,

    /// Port
    #[arg(short, long, env = "ROUTEGATE_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let config = Config::load(&args.config)?;

    init_logging(&config.logging);

    let hasher = PasswordHasher::new(config.auth.hashing)
        .context("Invalid auth.hashing parameters")?;
    let credentials = SharedCredentials::open(&config.auth.credentials_path, hasher)
        .with_context(|| {
            format!(
                "Failed to open credential store {}",
                config.auth.credentials_path
            )
        })?;

    match args.command.unwrap_or(Command::Serve(ServeArgs::default())) {
        Command::Serve(serve_args) => {
            serve(config, credentials, serve_args).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::User(command) => users::run(command, &credentials),
    }
}

async fn serve(config: Config, credentials: SharedCredentials, args: ServeArgs) -> Result<()> {
    info!("Starting Routegate v{}", env!("CARGO_PKG_VERSION"));

    users::apply_seed_users(&credentials, &config.auth.seed_users)?;
    info!(
        "Credential store {} holds {} user(s)",
        config.auth.credentials_path,
        credentials.len()
    );

    let mut builder = ApiBuilder::new(AppState::new(credentials));
    builder.configure_api(config.api.to_api_config()?);

    if config.metrics.enabled {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        builder.with_metrics(Arc::new(handle));
        info!("Metrics exposed at /metrics");
    }

    demo::register(&mut builder)?;
    for route in builder.routes() {
        info!(
            "Route {} {:?} auth={} rate_limit={}",
            route.path,
            route.methods,
            route.requires_auth(),
            route
                .rate_limit()
                .map(|limit| limit.to_string())
                .unwrap_or_else(|| "none".to_string())
        );
    }

    let bind_addr = args.bind.unwrap_or(config.server.bind_address);
    let port = args.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", bind_addr, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", bind_addr, port))?;

    builder.run(addr).await?;
    Ok(())
}

/// Initialize logging
fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.format.eq_ignore_ascii_case("json") {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}
