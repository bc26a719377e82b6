//! Environment traits and wrappers.
//!
//! Provides the agent-facing `Env` trait, the `RemoteEnv` facade that drives a
//! session with a remote simulation, and the `EpisodeStats` wrapper.

mod remote;
mod traits;
mod wrappers;

pub use remote::RemoteEnv;
pub use traits::{Action, Env, EnvInfo, NativeValue, Observation, StepResult};
pub use wrappers::EpisodeStats;
