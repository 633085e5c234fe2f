//! Sim test server: accepts commit submissions over HTTP and serves results.

mod routes;
mod state;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use coordinator::io::config::{CoordinatorConfig, load_config};
use coordinator::service::TestService;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "sim-test-server")]
#[command(about = "Run the simulation test suite against submitted commits")]
struct Args {
    /// Optional TOML config file
    #[arg(long, default_value = "sim-test-server.toml")]
    config: PathBuf,

    /// Address to bind the server to
    #[arg(long, env = "BIND", default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value = "8080")]
    port: u16,

    /// Shared secret expected in the Tester-Token header
    #[arg(long, env = "TEST_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Root directory for per-job workspaces
    #[arg(long, env = "TEST_AREA")]
    test_area: Option<PathBuf>,

    /// Swap in the GPU project config before running tests
    #[arg(long, env = "IS_RUNNING_GPU", value_parser = clap::builder::BoolishValueParser::new())]
    gpu: Option<bool>,
}

impl Args {
    fn apply(&self, config: &mut CoordinatorConfig) {
        if let Some(token) = &self.token {
            config.token = token.clone();
        }
        if let Some(test_area) = &self.test_area {
            config.test_area = test_area.clone();
        }
        if let Some(gpu) = self.gpu {
            config.gpu_mode = gpu;
        }
    }
}

/// Accepts IPv4 and bare IPv6 addresses (`::1`, not `[::1]`).
fn listen_addr(bind: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let ip: IpAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address {bind:?}"))?;
    Ok(SocketAddr::new(ip, port))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    coordinator::logging::init();

    let args = Args::parse();

    let mut config = load_config(&args.config)?;
    args.apply(&mut config);
    info!(
        test_area = %config.test_area.display(),
        gpu_mode = config.gpu_mode,
        repo_url = %config.repo_url,
        "starting sim-test-server"
    );

    let service = TestService::from_config(&config).context("initialize test service")?;
    let app = routes::router(AppState::new(service)).layer(TraceLayer::new_for_http());

    let addr = listen_addr(&args.bind, args.port)?;
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}
