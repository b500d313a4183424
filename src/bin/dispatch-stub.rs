//! Minimal dispatch server for local runs
//!
//! Serves a generated grid map and hands out a rotating set of delivery
//! tasks, one per non-HQ node.
//!
//! ## Usage
//!
//! ```bash
//! # 5x5 grid on the default agent port
//! dispatch-stub --bind 127.0.0.1:5000
//!
//! # Legacy wire format, larger map
//! dispatch-stub --generation legacy --width 10 --height 8
//!
//! # Then, in another terminal
//! courier-agent run --port 5000 --name Bolt
//! ```

use clap::Parser;
use courier_agent::map::Map;
use courier_agent::observability::init_default_logging;
use courier_agent::protocol::ProtocolGeneration;
use courier_agent::testing::FakeDispatchServer;
use std::process;
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "dispatch-stub",
    about = "Serve a grid map and rotating tasks to courier agents",
    version
)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:5000")]
    bind: String,

    /// Grid columns
    #[arg(long, default_value_t = 5)]
    width: u32,

    /// Grid rows
    #[arg(long, default_value_t = 5)]
    height: u32,

    /// Distance between neighbouring nodes
    #[arg(long, default_value_t = 1.0)]
    spacing: f64,

    /// Protocol generation: legacy or current
    #[arg(long, default_value = "current", value_parser = parse_generation)]
    generation: ProtocolGeneration,

    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_generation(value: &str) -> Result<ProtocolGeneration, String> {
    ProtocolGeneration::parse(value)
        .ok_or_else(|| format!("unknown protocol generation '{value}' (legacy or current)"))
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_default_logging(args.verbose);

    if args.width == 0 || args.height == 0 {
        error!("Grid needs at least one row and one column");
        process::exit(1);
    }

    let map = Map::grid(args.width, args.height, args.spacing);
    let hq = map.hq().graph_index;
    let destinations: Vec<u32> = map
        .nodes()
        .iter()
        .map(|node| node.graph_index)
        .filter(|&index| index != hq)
        .collect();

    let mut builder = FakeDispatchServer::builder(map)
        .bind(args.bind.clone())
        .generation(args.generation)
        .repeat_tasks(true);
    for (n, destination) in destinations.iter().enumerate() {
        builder = builder.task(format!("parcel-{}", n + 1), *destination);
    }

    let server = match builder.start().await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to bind {}: {}", args.bind, e);
            process::exit(1);
        }
    };
    info!(
        addr = %server.addr(),
        width = args.width,
        height = args.height,
        tasks = destinations.len(),
        "Dispatch stub ready"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to wait for Ctrl-C: {}", e);
    }

    info!(
        requests = server.requests().await.len(),
        agents = ?server.registered_agents().await,
        "Dispatch stub stopping"
    );
}
