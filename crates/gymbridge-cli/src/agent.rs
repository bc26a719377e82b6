//! Random-policy agent loop shared by the `agent` and `demo` commands.

use anyhow::{Context, Result};
use gymbridge::env::{Env, EpisodeStats, RemoteEnv};
use gymbridge::transport::Channel;
use gymbridge::BridgeError;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

/// Play random actions until the simulation shuts down or `max_episodes`
/// episodes have finished. Returns the return of every finished episode.
pub fn run_random_agent<C: Channel>(
    env: RemoteEnv<C>,
    max_episodes: Option<u64>,
    seed: u64,
) -> Result<Vec<f64>> {
    let mut env = EpisodeStats::new(env);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut returns = Vec::new();

    match env.reset() {
        Ok(_) => {}
        // The simulation shut down before its first episode
        Err(BridgeError::ChannelClosed) => return Ok(returns),
        Err(e) => return Err(e).context("reset failed"),
    }
    let action_space = env
        .action_space()
        .cloned()
        .context("no action space after handshake")?;
    info!(%action_space, "Playing random actions");

    while max_episodes.map_or(true, |max| (returns.len() as u64) < max) {
        let action = action_space.sample(&mut rng);
        let result = env.step(&action).context("step failed")?;
        if result.info.shutdown {
            info!(episodes = returns.len(), "Simulation shut down");
            break;
        }
        if let (Some(ret), Some(len)) = (result.info.episode_return, result.info.episode_length) {
            println!(
                "episode {:>4}  return {:>10.3}  length {:>5}",
                returns.len(),
                ret,
                len
            );
            returns.push(ret);
        }
    }

    env.close();
    Ok(returns)
}

/// One-line summary of a list of episode returns
pub fn summarize(returns: &[f64]) -> String {
    if returns.is_empty() {
        return "no episodes finished".to_string();
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    format!("{} episodes, mean return {:.3}", returns.len(), mean)
}
