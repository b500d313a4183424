//! courier-agent - Main Entry Point

use clap::{Args, Parser, Subcommand};
use courier_agent::agent::{
    shutdown_channel, AgentIdentity, AgentLifecycle, AgentState, LifecycleSettings,
    ShutdownTrigger, TokioSleeper,
};
use courier_agent::config::AgentConfig;
use courier_agent::observability::init_default_logging;
use courier_agent::protocol::{Codec, ProtocolGeneration};
use courier_agent::transport::TcpTransport;
use std::path::PathBuf;
use std::process;
use tokio::signal;
use tracing::{error, info, warn};

/// Simulated delivery agent for a central dispatch server
#[derive(Parser)]
#[command(name = "courier-agent")]
#[command(about = "Simulated delivery agent for a central dispatch server")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register with the dispatch server and work tasks until interrupted
    Run(RunArgs),
    /// Validate configuration
    Config {
        /// Show the effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[derive(Args, Default)]
struct RunArgs {
    /// Dispatch server host
    #[arg(long)]
    host: Option<String>,

    /// Dispatch server port
    #[arg(long)]
    port: Option<u16>,

    /// Preferred agent name (16 ASCII characters fit on the wire)
    #[arg(long)]
    name: Option<String>,

    /// Agent color as r,g,b with components in 0.0..=1.0
    #[arg(long, value_parser = parse_color)]
    color: Option<[f32; 3]>,

    /// Timing profile: loader, runner, or one defined in the config file
    #[arg(long)]
    profile: Option<String>,

    /// Protocol generation: legacy or current
    #[arg(long, value_parser = parse_generation)]
    generation: Option<ProtocolGeneration>,
}

impl RunArgs {
    fn apply(&self, config: &mut AgentConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(generation) = self.generation {
            config.server.generation = generation;
        }
        if let Some(name) = &self.name {
            config.agent.name = Some(name.clone());
        }
        if let Some(color) = self.color {
            config.agent.color = Some(color);
        }
        if let Some(profile) = &self.profile {
            config.agent.profile = profile.clone();
        }
    }
}

fn parse_color(value: &str) -> Result<[f32; 3], String> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(format!("expected r,g,b but got '{value}'"));
    }
    let mut color = [0.0f32; 3];
    for (slot, part) in color.iter_mut().zip(&parts) {
        *slot = part
            .parse()
            .map_err(|_| format!("'{part}' is not a number"))?;
    }
    Ok(color)
}

fn parse_generation(value: &str) -> Result<ProtocolGeneration, String> {
    ProtocolGeneration::parse(value)
        .ok_or_else(|| format!("unknown protocol generation '{value}' (legacy or current)"))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging(cli.verbose);

    info!("Starting courier-agent v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run(args) => {
            args.apply(&mut config);
            run_agent(config).await
        }
        Commands::Config { show } => handle_config_command(config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<AgentConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(AgentConfig::load_from_file(path)?)
        }
        None => {
            let default_paths = ["courier.toml", "config/courier.toml"];

            for path_str in default_paths {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(AgentConfig::load_from_file(&path)?);
                }
            }

            info!("No configuration file found, using defaults");
            Ok(AgentConfig::default())
        }
    }
}

async fn run_agent(config: AgentConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;

    let identity = AgentIdentity::from_config(&config.agent);
    if !identity.fits_on_wire() {
        warn!(name = %identity.name, "Agent name will be cut to fit the wire format");
    }
    info!(
        agent = %identity.name,
        server = %format!("{}:{}", config.server.host, config.server.port),
        profile = %config.agent.profile,
        "Agent configured"
    );

    let transport = TcpTransport::new(&config.server.host, config.server.port)
        .with_timeout(config.request_timeout());
    let settings = LifecycleSettings::from_config(&config)?;

    let (trigger, signal) = shutdown_channel();
    let signal_task = tokio::spawn(forward_signals(trigger));

    let mut lifecycle = AgentLifecycle::new(
        identity,
        transport,
        Codec::new(config.server.generation),
        TokioSleeper,
        signal,
        settings,
    );
    let final_state = lifecycle.run().await;
    signal_task.abort();

    match final_state {
        AgentState::Failed(reason) => Err(reason.into()),
        state => {
            info!(%state, "Agent finished");
            Ok(())
        }
    }
}

/// Turn SIGINT / SIGTERM into a cooperative shutdown request
async fn forward_signals(trigger: ShutdownTrigger) {
    let mut sigint = match signal::unix::signal(signal::unix::SignalKind::interrupt()) {
        Ok(stream) => stream,
        Err(e) => {
            error!("Failed to install SIGINT handler: {}", e);
            return;
        }
    };
    let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            return;
        }
    };

    tokio::select! {
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down gracefully...");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
    trigger.trigger();
}

fn handle_config_command(config: AgentConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    info!("Configuration is valid");

    if show {
        println!("{}", toml::to_string_pretty(&config)?);
    }

    Ok(())
}
