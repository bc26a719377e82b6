//! Multi-armed bandit simulation.

use crate::{discrete_action, Simulation, Transition};
use gymbridge::env::NativeValue;
use gymbridge::spaces::{Box as BoxSpace, Discrete, DynSpace};
use gymbridge::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Multi-armed bandit simulation
///
/// The agent must learn which arm gives the highest reward.
/// Rewards are determined by a fixed random seed, so all
/// instances have the same optimal arm. Every episode is one step long.
pub struct Bandit {
    /// Number of arms
    num_actions: u64,
    /// Reward scale
    reward_scale: f64,
    /// Reward noise amplitude
    reward_noise: f64,
    /// Optimal arm index
    solution_idx: u64,
    /// RNG for noise
    rng: StdRng,
    observation_space: BoxSpace,
    action_space: Discrete,
}

impl Bandit {
    /// Create a new bandit simulation
    pub fn new(num_actions: u64) -> Result<Self> {
        Self::with_config(num_actions, 1.0, 0.0, 42)
    }

    /// Create with full configuration
    pub fn with_config(
        num_actions: u64,
        reward_scale: f64,
        reward_noise: f64,
        hard_fixed_seed: u64,
    ) -> Result<Self> {
        let action_space = Discrete::new(num_actions)?;

        // Use fixed seed to determine solution
        let mut seed_rng = StdRng::seed_from_u64(hard_fixed_seed);
        let solution_idx = seed_rng.gen_range(0..num_actions);

        Ok(Self {
            num_actions,
            reward_scale,
            reward_noise,
            solution_idx,
            rng: StdRng::seed_from_u64(hard_fixed_seed),
            observation_space: BoxSpace::symmetric(&[1]),
            action_space,
        })
    }

    /// Index of the rewarding arm
    pub fn solution(&self) -> u64 {
        self.solution_idx
    }
}

impl Simulation for Bandit {
    fn name(&self) -> &'static str {
        "bandit"
    }

    fn observation_space(&self) -> DynSpace {
        self.observation_space.clone().into()
    }

    fn action_space(&self) -> DynSpace {
        self.action_space.clone().into()
    }

    fn reset(&mut self, seed: Option<u64>) -> NativeValue {
        if let Some(s) = seed {
            self.rng = StdRng::seed_from_u64(s);
        }
        NativeValue::vector(vec![1.0])
    }

    fn advance(&mut self, action: &NativeValue) -> Result<Transition> {
        let action_idx = discrete_action(action, self.num_actions)?;

        let correct = action_idx == self.solution_idx;
        let mut reward = if correct { 1.0 } else { 0.0 };

        if self.reward_noise > 0.0 {
            let noise: f64 = self.rng.gen::<f64>() * 2.0 - 1.0;
            reward += noise * self.reward_noise;
        }

        reward *= self.reward_scale;

        Ok(Transition {
            observation: NativeValue::vector(vec![1.0]),
            reward,
            done: true, // Episode ends after one step
        })
    }
}
