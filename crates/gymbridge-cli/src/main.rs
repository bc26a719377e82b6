//! gymbridge CLI
//!
//! Command-line agent and simulation runner for the gymbridge protocol.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use gymbridge::config::BridgeConfig;
use gymbridge::env::RemoteEnv;
use gymbridge::protocol::FrameCodec;
use gymbridge::sim::SimulationEndpoint;
use gymbridge::transport::{MemoryChannel, TcpAcceptor, TcpChannel};
use gymbridge::BridgeError;
use gymbridge_sims::run_episodes;

mod agent;

#[derive(Parser)]
#[command(name = "gymbridge")]
#[command(version, about = "gymbridge - drive RL agents from turn-based simulations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List scripted simulations
    List,

    /// Listen for a simulation and play it with a random policy
    Agent {
        /// JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Address to listen on
        #[arg(long)]
        bind: Option<String>,

        /// Port to listen on (random when omitted)
        #[arg(long)]
        port: Option<u16>,

        /// Stop after this many episodes (default: until the simulation shuts down)
        #[arg(long)]
        episodes: Option<u64>,

        /// Receive timeout in seconds (0 waits forever)
        #[arg(long)]
        timeout: Option<f64>,

        /// Random seed
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Connect a scripted simulation to a listening agent
    Simulate {
        /// Simulation name
        #[arg(default_value = "cartpole")]
        sim: String,

        /// Agent address
        #[arg(long, default_value = "127.0.0.1:5555")]
        connect: String,

        /// Number of episodes
        #[arg(long, default_value = "3")]
        episodes: u64,

        /// Base seed for episode resets
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Receive timeout in seconds (0 waits forever)
        #[arg(long)]
        timeout: Option<f64>,
    },

    /// Demo: run a simulation and a random agent in one process
    Demo {
        /// Simulation name
        #[arg(default_value = "cartpole")]
        sim: String,

        /// Number of episodes
        #[arg(long, default_value = "3")]
        episodes: u64,

        /// Random seed
        #[arg(long, default_value = "0")]
        seed: u64,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::List => {
            list_sims();
        }
        Commands::Agent {
            config,
            bind,
            port,
            episodes,
            timeout,
            seed,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(bind) = bind {
                config = config.with_bind_addr(bind);
            }
            if let Some(port) = port {
                config = config.with_port(port);
            }
            if let Some(secs) = timeout {
                config = config.with_timeout(timeout_from_secs(secs));
            }
            if let Some(seed) = seed {
                config = config.with_seed(seed);
            }
            run_agent(&config, episodes)?;
        }
        Commands::Simulate {
            sim,
            connect,
            episodes,
            seed,
            timeout,
        } => {
            let mut config = BridgeConfig::default();
            if let Some(secs) = timeout {
                config = config.with_timeout(timeout_from_secs(secs));
            }
            simulate(&sim, &connect, episodes, seed, &config)?;
        }
        Commands::Demo {
            sim,
            episodes,
            seed,
        } => {
            demo(&sim, episodes, seed)?;
        }
    }

    Ok(())
}

fn timeout_from_secs(secs: f64) -> Option<Duration> {
    (secs > 0.0).then(|| Duration::from_secs_f64(secs))
}

fn load_config(path: Option<&Path>) -> Result<BridgeConfig> {
    let config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => BridgeConfig::default(),
    };
    Ok(config)
}

fn run_agent(config: &BridgeConfig, episodes: Option<u64>) -> Result<()> {
    let acceptor = TcpAcceptor::bind(config)?;
    println!("Listening on {}", acceptor.local_addr()?);

    let env = RemoteEnv::with_connector(acceptor, config);
    let returns = agent::run_random_agent(env, episodes, config.seed)?;
    println!("Agent finished: {}", agent::summarize(&returns));
    Ok(())
}

fn simulate(name: &str, addr: &str, episodes: u64, seed: u64, config: &BridgeConfig) -> Result<()> {
    let mut sim = gymbridge_sims::make(name)?;
    tracing::info!(sim = name, addr, episodes, "Connecting to agent");

    let channel = TcpChannel::connect(addr, FrameCodec::new(config.max_frame_len))
        .with_context(|| format!("connecting to {}", addr))?;
    let mut endpoint = SimulationEndpoint::new(channel, config);

    match run_episodes(sim.as_mut(), &mut endpoint, episodes, seed) {
        Ok(summary) => {
            println!(
                "Simulation finished: {} episodes, {} steps, total reward {:.3}",
                summary.episodes,
                summary.steps,
                summary.total_reward()
            );
            Ok(())
        }
        Err(BridgeError::ChannelClosed) => {
            tracing::warn!("Agent closed the connection");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn demo(name: &str, episodes: u64, seed: u64) -> Result<()> {
    tracing::info!(sim = name, episodes, "Running demo");

    let mut sim = gymbridge_sims::make(name)?;
    let config = BridgeConfig::default().with_seed(seed);
    let (agent_end, sim_end) = MemoryChannel::pair();

    let sim_config = config.clone();
    let handle = thread::spawn(move || {
        let mut endpoint = SimulationEndpoint::new(sim_end, &sim_config);
        run_episodes(sim.as_mut(), &mut endpoint, episodes, seed)
    });

    let env = RemoteEnv::new(agent_end, &config);
    let returns = agent::run_random_agent(env, None, seed)?;
    let summary = handle
        .join()
        .map_err(|_| anyhow!("simulation thread panicked"))??;

    println!(
        "Demo complete: {} (simulation ran {} steps)",
        agent::summarize(&returns),
        summary.steps
    );
    Ok(())
}

fn list_sims() {
    println!("Available simulations:");
    println!();
    println!("  bandit     Multi-armed bandit (Box(1) observation, 4 arms)");
    println!("             Exercises: single-step episodes");
    println!();
    println!("  cartpole   CartPole classic control");
    println!("             Exercises: Box(4) observation with infinite bounds, Discrete(2) action");
    println!();
    println!("  grid-nav   Grid navigation (5x5 grid)");
    println!("             Exercises: Dict observation, Discrete(4) action");
    println!();
    println!("Run `gymbridge demo <sim>` to play one in-process.");
}
