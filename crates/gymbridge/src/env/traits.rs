//! Core environment trait definitions.

use crate::spaces::DynSpace;
use crate::Result;
use ndarray::ArrayD;
use std::collections::HashMap;

/// Agent-facing value for any space.
///
/// Mirrors [`DynSpace`] variant by variant: `Array` holds a Box value with
/// exactly the space's shape.
#[derive(Clone, Debug, PartialEq)]
pub enum NativeValue {
    /// Box value
    Array(ArrayD<f64>),
    /// Discrete index
    Discrete(u64),
    /// One index per MultiDiscrete slot
    MultiDiscrete(Vec<u64>),
    /// One flag per MultiBinary bit
    MultiBinary(Vec<bool>),
    /// Tuple of values
    Tuple(Vec<NativeValue>),
    /// Dictionary of values
    Dict(HashMap<String, NativeValue>),
}

impl NativeValue {
    /// Variant name, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            NativeValue::Array(_) => "Box",
            NativeValue::Discrete(_) => "Discrete",
            NativeValue::MultiDiscrete(_) => "MultiDiscrete",
            NativeValue::MultiBinary(_) => "MultiBinary",
            NativeValue::Tuple(_) => "Tuple",
            NativeValue::Dict(_) => "Dict",
        }
    }

    /// Build a Box value from a flat vector with a 1-D shape
    pub fn vector(values: Vec<f64>) -> Self {
        NativeValue::Array(ndarray::Array1::from_vec(values).into_dyn())
    }

    /// Build a Dict value from (name, value) pairs
    pub fn dict<'a>(pairs: impl IntoIterator<Item = (&'a str, NativeValue)>) -> Self {
        NativeValue::Dict(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }
}

/// Structured observation
pub type Observation = NativeValue;

/// Structured action
pub type Action = NativeValue;

/// Information returned from environment steps
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EnvInfo {
    /// Index of the episode this step belongs to (0-based)
    pub episode: u64,
    /// Number of requests received so far in this episode
    pub step: u64,
    /// Episode return (if done)
    pub episode_return: Option<f64>,
    /// Episode length (if done)
    pub episode_length: Option<u64>,
    /// The simulation announced that it is shutting down
    pub shutdown: bool,
}

impl EnvInfo {
    /// Create empty info
    pub fn new() -> Self {
        Self::default()
    }

    /// Add episode stats
    pub fn with_episode_stats(mut self, ret: f64, len: u64) -> Self {
        self.episode_return = Some(ret);
        self.episode_length = Some(len);
        self
    }

    /// Get a numeric value by key
    pub fn get(&self, key: &str) -> Option<f64> {
        match key {
            "episode" => Some(self.episode as f64),
            "step" => Some(self.step as f64),
            "episode_return" => self.episode_return,
            "episode_length" => self.episode_length.map(|l| l as f64),
            _ => None,
        }
    }
}

/// Result from a single environment step
#[derive(Clone, Debug)]
pub struct StepResult {
    /// Observation after the step
    pub observation: Observation,
    /// Reward received
    pub reward: f64,
    /// Whether the episode ended with this step
    pub done: bool,
    /// Additional info
    pub info: EnvInfo,
}

/// Agent-facing environment interface.
///
/// # Example
///
/// ```rust,ignore
/// use gymbridge::prelude::*;
///
/// fn run<E: Env>(env: &mut E) -> Result<f64> {
///     let (mut _obs, _) = env.reset()?;
///     let mut total = 0.0;
///     loop {
///         let action = NativeValue::Discrete(0);
///         let result = env.step(&action)?;
///         total += result.reward;
///         if result.done {
///             return Ok(total);
///         }
///     }
/// }
/// ```
pub trait Env: Send {
    /// Get the observation space, once known
    fn observation_space(&self) -> Option<&DynSpace>;

    /// Get the action space, once known
    fn action_space(&self) -> Option<&DynSpace>;

    /// Reset the environment and return the first observation of an episode
    fn reset(&mut self) -> Result<(Observation, EnvInfo)>;

    /// Take a single step in the environment
    fn step(&mut self, action: &Action) -> Result<StepResult>;

    /// Optional: Close the environment and free resources
    fn close(&mut self) {}
}
