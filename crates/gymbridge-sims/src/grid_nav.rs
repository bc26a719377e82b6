//! Grid navigation simulation with a structured observation.

use crate::{discrete_action, Simulation, Transition};
use gymbridge::env::NativeValue;
use gymbridge::spaces::{Box as BoxSpace, Dict, Discrete, DynSpace, MultiBinary};
use gymbridge::Result;

/// Grid navigation simulation
///
/// The agent starts in one corner of a square grid and must reach the
/// opposite corner. Each move costs a small penalty; reaching the goal pays 1.
///
/// Observation: `{pos: Box[2], goal_reached: MultiBinary(1)}`
/// Action: 0 = north, 1 = south, 2 = west, 3 = east
pub struct GridNav {
    /// Side length of the grid
    size: u32,
    /// Maximum steps per episode
    max_ticks: u32,
    /// Agent position (x, y)
    agent_pos: (u32, u32),
    /// Current tick
    tick: u32,
    observation_space: Dict,
    action_space: Discrete,
}

// N, S, W, E
const MOVES: [(i64, i64); 4] = [(0, -1), (0, 1), (-1, 0), (1, 0)];

const STEP_PENALTY: f64 = -0.01;

impl GridNav {
    /// Create a grid with `size` cells per side
    pub fn new(size: u32) -> Result<Self> {
        let max = f64::from(size.saturating_sub(1));
        let observation_space = Dict::from_pairs(vec![
            ("pos", BoxSpace::uniform(&[2], 0.0, max)?.into()),
            ("goal_reached", MultiBinary::new(1)?.into()),
        ])?;

        Ok(Self {
            size,
            max_ticks: 4 * size * size,
            agent_pos: (0, 0),
            tick: 0,
            observation_space,
            action_space: Discrete::new(MOVES.len() as u64)?,
        })
    }

    fn goal(&self) -> (u32, u32) {
        let edge = self.size.saturating_sub(1);
        (edge, edge)
    }

    fn observation(&self) -> NativeValue {
        let (x, y) = self.agent_pos;
        NativeValue::dict([
            ("pos", NativeValue::vector(vec![f64::from(x), f64::from(y)])),
            (
                "goal_reached",
                NativeValue::MultiBinary(vec![self.agent_pos == self.goal()]),
            ),
        ])
    }
}

impl Simulation for GridNav {
    fn name(&self) -> &'static str {
        "grid-nav"
    }

    fn observation_space(&self) -> DynSpace {
        self.observation_space.clone().into()
    }

    fn action_space(&self) -> DynSpace {
        self.action_space.clone().into()
    }

    fn reset(&mut self, _seed: Option<u64>) -> NativeValue {
        self.agent_pos = (0, 0);
        self.tick = 0;
        self.observation()
    }

    fn advance(&mut self, action: &NativeValue) -> Result<Transition> {
        let idx = discrete_action(action, MOVES.len() as u64)? as usize;
        let (dx, dy) = MOVES[idx];
        let edge = i64::from(self.size.saturating_sub(1));

        let x = (i64::from(self.agent_pos.0) + dx).clamp(0, edge);
        let y = (i64::from(self.agent_pos.1) + dy).clamp(0, edge);
        // Both coordinates are clamped into [0, size - 1].
        self.agent_pos = (x as u32, y as u32);
        self.tick += 1;

        let reached = self.agent_pos == self.goal();
        let reward = if reached { 1.0 } else { STEP_PENALTY };

        Ok(Transition {
            observation: self.observation(),
            reward,
            done: reached || self.tick >= self.max_ticks,
        })
    }
}
