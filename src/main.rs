use anyhow::Context;
use clap::{Parser, Subcommand};
use gossip_membership::api;
use gossip_membership::config::Config;
use gossip_membership::membership::log::TracingLog;
use gossip_membership::membership::node::{MembershipNode, MembershipView};
use gossip_membership::membership::types::{NodeId, Tick};
use gossip_membership::runtime::NodeRunner;
use gossip_membership::simulation::{Simulation, SimulationConfig};
use gossip_membership::transport::UdpTransport;
use gossip_membership::transport::memory::NetworkStats;
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gossip-node", version, about = "Gossip-based group membership node")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single node over UDP
    Run {
        /// Address to bind and to be known by, e.g. 127.0.0.1:7001
        #[arg(long)]
        bind: SocketAddr,

        /// Introducer address (overrides the config file)
        #[arg(long)]
        introducer: Option<NodeId>,

        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Serve the HTTP status API on this address
        #[arg(long)]
        api: Option<SocketAddr>,
    },

    /// Run an in-process cluster on a simulated network and print the final views
    Simulate {
        #[arg(long, default_value_t = 5)]
        nodes: usize,

        #[arg(long, default_value_t = 60)]
        ticks: Tick,

        /// Probability that any single message is lost
        #[arg(long, default_value_t = 0.0)]
        drop_rate: f64,

        #[arg(long)]
        fanout: Option<usize>,

        /// Index of a node to crash
        #[arg(long, requires = "fail_at")]
        fail: Option<usize>,

        /// Tick at which `--fail` crashes its node
        #[arg(long, requires = "fail")]
        fail_at: Option<Tick>,

        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Command::Run {
            bind,
            introducer,
            config,
            api,
        } => run_node(bind, introducer, config, api).await,
        Command::Simulate {
            nodes,
            ticks,
            drop_rate,
            fanout,
            fail,
            fail_at,
            seed,
        } => {
            let mut sim_config = SimulationConfig {
                nodes,
                drop_rate,
                seed,
                ..Default::default()
            };
            if let Some(fanout) = fanout {
                sim_config.fanout = fanout;
            }
            let failure = fail.zip(fail_at);
            simulate(&sim_config, ticks, failure)
        }
    }
}

async fn run_node(
    bind: SocketAddr,
    introducer: Option<NodeId>,
    config_path: Option<PathBuf>,
    api_addr: Option<SocketAddr>,
) -> anyhow::Result<()> {
    let mut config = match &config_path {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(introducer) = introducer {
        config.introducer = introducer;
    }

    let id = NodeId::try_from(bind).map_err(anyhow::Error::msg)?;
    let transport = UdpTransport::bind(bind).await?;
    let node = MembershipNode::new(id, &config, Arc::new(transport), Arc::new(TracingLog))?;

    tracing::info!("Starting node {}", id);
    if id == config.introducer {
        tracing::info!("Starting as introducer (founder)");
    } else {
        tracing::info!("Introducer: {}", config.introducer);
    }

    let (runner, views) = NodeRunner::new(node, config.tick_period());

    if let Some(api_addr) = api_addr {
        let app = api::router(views);
        let listener = tokio::net::TcpListener::bind(api_addr).await?;
        tracing::info!("HTTP status API listening on {}", api_addr);
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("HTTP server stopped: {}", e);
            }
        });
    }

    tracing::info!("Press Ctrl+C to shutdown");
    let node = runner
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
            }
        })
        .await;

    tracing::info!(
        "Stopped with {} alive members at heartbeat {}",
        node.alive_members().len(),
        node.heartbeat()
    );
    Ok(())
}

#[derive(Serialize)]
struct SimulationReport {
    ticks: Tick,
    converged: bool,
    network: NetworkStats,
    events: usize,
    views: Vec<MembershipView>,
}

fn simulate(
    config: &SimulationConfig,
    ticks: Tick,
    failure: Option<(usize, Tick)>,
) -> anyhow::Result<()> {
    if let Some((index, _)) = failure {
        anyhow::ensure!(
            index < config.nodes,
            "--fail {} is out of range for {} nodes",
            index,
            config.nodes
        );
    }

    let mut sim = Simulation::new(config)?;
    sim.start_all();

    for _ in 0..ticks {
        if let Some((index, at)) = failure
            && sim.now() == at
        {
            tracing::info!("Crashing node {} at tick {}", sim.node(index).id(), at);
            sim.fail(index);
        }
        sim.step();
    }

    let report = SimulationReport {
        ticks: sim.now(),
        converged: sim.converged(),
        network: sim.network().stats(),
        events: sim.events().len(),
        views: sim.views(),
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
