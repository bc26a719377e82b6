//! Scripted simulations that drive a gymbridge agent.
//!
//! Provides simple simulations for testing and demos:
//! - `Bandit` - Multi-armed bandit
//! - `CartPole` - Classic control
//! - `GridNav` - Grid navigation with a Dict observation
//!
//! [`run_episodes`] plays any [`Simulation`] against an agent through a
//! [`SimulationEndpoint`].

mod bandit;
mod cartpole;
mod grid_nav;

pub use bandit::Bandit;
pub use cartpole::CartPole;
pub use grid_nav::GridNav;

use gymbridge::env::NativeValue;
use gymbridge::sim::SimulationEndpoint;
use gymbridge::spaces::DynSpace;
use gymbridge::transport::Channel;
use gymbridge::{BridgeError, Result};
use tracing::info;

/// Outcome of advancing a simulation by one action
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub observation: NativeValue,
    pub reward: f64,
    pub done: bool,
}

/// A turn-based simulation with fixed spaces
pub trait Simulation: Send {
    /// Short name used by the CLI
    fn name(&self) -> &'static str;

    fn observation_space(&self) -> DynSpace;

    fn action_space(&self) -> DynSpace;

    /// Start a new episode and return its first observation
    fn reset(&mut self, seed: Option<u64>) -> NativeValue;

    /// Apply one action
    fn advance(&mut self, action: &NativeValue) -> Result<Transition>;
}

/// Totals from [`run_episodes`]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunSummary {
    pub episodes: u64,
    pub steps: u64,
    pub returns: Vec<f64>,
}

impl RunSummary {
    pub fn total_reward(&self) -> f64 {
        self.returns.iter().sum()
    }
}

/// Names accepted by [`make`]
pub const SIMULATIONS: &[&str] = &["bandit", "cartpole", "grid-nav"];

/// Build a simulation by name
pub fn make(name: &str) -> Result<Box<dyn Simulation>> {
    let sim: Box<dyn Simulation> = match name {
        "bandit" => Box::new(Bandit::new(4)?),
        "cartpole" => Box::new(CartPole::new()?),
        "grid-nav" => Box::new(GridNav::new(5)?),
        other => {
            return Err(BridgeError::InvalidConfig(format!(
                "unknown simulation {:?} (expected one of {:?})",
                other, SIMULATIONS
            )))
        }
    };
    Ok(sim)
}

/// Handshake, play `episodes` episodes, then announce shutdown.
///
/// Episode `i` is reset with seed `seed + i`. The terminal request of every
/// episode is answered by the agent before the next episode starts.
pub fn run_episodes<S, C>(
    sim: &mut S,
    endpoint: &mut SimulationEndpoint<C>,
    episodes: u64,
    seed: u64,
) -> Result<RunSummary>
where
    S: Simulation + ?Sized,
    C: Channel,
{
    endpoint.handshake(sim.observation_space(), sim.action_space())?;

    let mut summary = RunSummary::default();
    for episode in 0..episodes {
        let mut observation = sim.reset(Some(seed.wrapping_add(episode)));
        let mut reward = 0.0;
        let mut done = false;
        let mut episode_return = 0.0;

        loop {
            let action = endpoint.step(&observation, reward, done)?;
            if done {
                break;
            }
            let transition = sim.advance(&action)?;
            observation = transition.observation;
            reward = transition.reward;
            done = transition.done;
            episode_return += reward;
            summary.steps += 1;
        }

        info!(
            sim = sim.name(),
            episode,
            episode_return,
            "Episode complete"
        );
        summary.episodes += 1;
        summary.returns.push(episode_return);
    }

    endpoint.shutdown()?;
    Ok(summary)
}

/// Extract a Discrete action index below `n`
pub(crate) fn discrete_action(action: &NativeValue, n: u64) -> Result<u64> {
    match action {
        NativeValue::Discrete(a) if *a < n => Ok(*a),
        NativeValue::Discrete(a) => Err(BridgeError::OutOfRange {
            path: "$".into(),
            value: a.to_string(),
            bound: format!("[0, {})", n),
        }),
        other => Err(BridgeError::ShapeMismatch {
            path: "$".into(),
            expected: "Discrete".into(),
            actual: other.kind().into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_known_simulations() {
        for name in SIMULATIONS {
            let sim = make(name).unwrap();
            assert_eq!(sim.name(), *name);
        }
        assert!(matches!(make("pong"), Err(BridgeError::InvalidConfig(_))));
    }

    #[test]
    fn test_discrete_action() {
        assert_eq!(discrete_action(&NativeValue::Discrete(1), 2).unwrap(), 1);
        assert!(discrete_action(&NativeValue::Discrete(2), 2).is_err());
        assert!(discrete_action(&NativeValue::vector(vec![1.0]), 2).is_err());
    }
}
