//! CartPole classic control simulation.

use crate::{discrete_action, Simulation, Transition};
use gymbridge::env::NativeValue;
use gymbridge::spaces::{Box as BoxSpace, Discrete, DynSpace};
use gymbridge::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;

/// CartPole simulation
///
/// A pole is attached to a cart on a frictionless track. The goal
/// is to balance the pole by applying forces to the cart.
///
/// Observation: [cart_pos, cart_vel, pole_angle, pole_vel]
/// Action: 0 = push left, 1 = push right
pub struct CartPole {
    // Physics constants
    gravity: f64,
    mass_pole: f64,
    total_mass: f64,
    length: f64, // half-pole length
    pole_mass_length: f64,
    force_mag: f64,
    tau: f64, // timestep

    // Thresholds
    theta_threshold: f64,
    x_threshold: f64,
    max_steps: u32,

    // State
    state: [f64; 4], // x, x_dot, theta, theta_dot
    steps: u32,
    rng: StdRng,

    observation_space: BoxSpace,
    action_space: Discrete,
}

impl CartPole {
    /// Create a new CartPole simulation
    pub fn new() -> Result<Self> {
        let mass_cart = 1.0;
        let mass_pole = 0.1;
        let length = 0.5;
        let theta_threshold = 12.0 * 2.0 * PI / 360.0; // 12 degrees
        let x_threshold = 2.4;

        // Twice the termination thresholds, so a terminal state is still inside.
        let observation_space = BoxSpace::from_parts(
            vec![-x_threshold * 2.0, f64::NEG_INFINITY, -theta_threshold * 2.0, f64::NEG_INFINITY],
            vec![x_threshold * 2.0, f64::INFINITY, theta_threshold * 2.0, f64::INFINITY],
            vec![4],
        )?;

        Ok(Self {
            gravity: 9.8,
            mass_pole,
            total_mass: mass_cart + mass_pole,
            length,
            pole_mass_length: mass_pole * length,
            force_mag: 10.0,
            tau: 0.02,
            theta_threshold,
            x_threshold,
            max_steps: 500,
            state: [0.0; 4],
            steps: 0,
            rng: StdRng::seed_from_u64(0),
            observation_space,
            action_space: Discrete::new(2)?,
        })
    }

    /// Limit the episode length
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    fn is_terminal(&self) -> bool {
        let x = self.state[0];
        let theta = self.state[2];

        x.abs() > self.x_threshold || theta.abs() > self.theta_threshold
    }

    fn observation(&self) -> NativeValue {
        NativeValue::vector(self.state.to_vec())
    }
}

impl Simulation for CartPole {
    fn name(&self) -> &'static str {
        "cartpole"
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

        // Initialize state randomly in [-0.05, 0.05]
        for v in self.state.iter_mut() {
            *v = self.rng.gen::<f64>() * 0.1 - 0.05;
        }
        self.steps = 0;

        self.observation()
    }

    fn advance(&mut self, action: &NativeValue) -> Result<Transition> {
        let action_idx = discrete_action(action, 2)?;

        let [x, x_dot, theta, theta_dot] = self.state;

        // Apply force
        let force = if action_idx == 1 {
            self.force_mag
        } else {
            -self.force_mag
        };

        // Physics simulation
        let cos_theta = theta.cos();
        let sin_theta = theta.sin();

        let temp = (force + self.pole_mass_length * theta_dot * theta_dot * sin_theta)
            / self.total_mass;
        let theta_acc = (self.gravity * sin_theta - cos_theta * temp)
            / (self.length * (4.0 / 3.0 - self.mass_pole * cos_theta * cos_theta / self.total_mass));
        let x_acc = temp - self.pole_mass_length * theta_acc * cos_theta / self.total_mass;

        // Euler integration
        self.state[0] = x + self.tau * x_dot;
        self.state[1] = x_dot + self.tau * x_acc;
        self.state[2] = theta + self.tau * theta_dot;
        self.state[3] = theta_dot + self.tau * theta_acc;

        self.steps += 1;

        let terminated = self.is_terminal();
        let truncated = self.steps >= self.max_steps;
        let reward = if !terminated { 1.0 } else { 0.0 };

        Ok(Transition {
            observation: self.observation(),
            reward,
            done: terminated || truncated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cartpole_reset() {
        let mut sim = CartPole::new().unwrap();
        let obs = sim.reset(Some(42));
        match &obs {
            NativeValue::Array(arr) => {
                assert_eq!(arr.shape(), &[4]);
                assert!(arr.iter().all(|v| v.abs() <= 0.05));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(sim.observation_space().contains(&obs));
    }

    #[test]
    fn test_cartpole_episode_ends() {
        let mut sim = CartPole::new().unwrap();
        sim.reset(Some(1));
        // Always pushing right tips the pole over quickly
        let mut steps = 0;
        loop {
            let t = sim.advance(&NativeValue::Discrete(1)).unwrap();
            steps += 1;
            assert!(sim.observation_space().contains(&t.observation));
            if t.done {
                break;
            }
            assert!(steps < 500);
        }
        assert!(steps < 100);
    }

    #[test]
    fn test_cartpole_truncates() {
        let mut sim = CartPole::new().unwrap().with_max_steps(3);
        sim.reset(Some(5));
        sim.advance(&NativeValue::Discrete(0)).unwrap();
        sim.advance(&NativeValue::Discrete(1)).unwrap();
        let t = sim.advance(&NativeValue::Discrete(0)).unwrap();
        assert!(t.done);
        assert_eq!(t.reward, 1.0);
    }

    #[test]
    fn test_cartpole_rejects_bad_action() {
        let mut sim = CartPole::new().unwrap();
        sim.reset(None);
        assert!(sim.advance(&NativeValue::Discrete(2)).is_err());
    }
}
