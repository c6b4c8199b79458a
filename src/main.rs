use clap::Parser;
use hac_node::config::{DEFAULT_PORT, NodeConfig, Role};
use hac_node::membership::NodeService;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// HAC node: peer discovery and liveness over UDP.
#[derive(Debug, Parser)]
#[command(name = "hac-node", version, about)]
struct Cli {
    /// Part this node plays in the join handshake.
    #[arg(value_enum, default_value_t = Role::P2p)]
    role: Role,

    #[arg(
        long,
        env = "HAC_BIND",
        default_value_t = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)
    )]
    bind: SocketAddrV4,

    /// Address written into packet headers; discovered when omitted.
    #[arg(long, env = "HAC_ADVERTISE")]
    advertise: Option<Ipv4Addr>,

    #[arg(long, env = "HAC_ID", default_value_t = 0)]
    id: u16,

    /// CSV of `id, address, port` lines to start from.
    #[arg(long, env = "HAC_SEEDS")]
    seeds: Option<PathBuf>,

    /// Node a client sends its INIT to.
    #[arg(long, env = "HAC_SERVER", required_if_eq("role", "client"))]
    server: Option<SocketAddrV4>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = NodeConfig {
        role: cli.role,
        bind: cli.bind,
        advertise: cli.advertise,
        local_id: cli.id,
        seed_file: cli.seeds,
        server: cli.server,
        ..NodeConfig::default()
    };

    let service = NodeService::bind(config).await?;
    tracing::info!(
        "Node {} listening on {}",
        service.local().id,
        service.local_addr()?
    );

    service.start().await;

    tracing::info!("Press Ctrl+C to shutdown");
    let token = service.shutdown_token();
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
            }
        }
        _ = token.cancelled() => {}
    }

    service.shutdown().await;
    Ok(())
}
