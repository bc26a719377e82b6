//! Environment wrappers for common functionality.

use super::{Action, Env, EnvInfo, Observation, StepResult};
use crate::spaces::DynSpace;
use crate::Result;

/// Wrapper that tracks episode statistics (return and length).
///
/// Adds `episode_return` and `episode_length` to info on episode completion.
/// A step taken after a terminal step opens the next episode; its result is
/// that episode's first observation and is not counted.
pub struct EpisodeStats<E: Env> {
    env: E,
    episode_return: f64,
    episode_length: u64,
    after_done: bool,
}

impl<E: Env> EpisodeStats<E> {
    /// Wrap an environment with episode statistics tracking
    pub fn new(env: E) -> Self {
        Self {
            env,
            episode_return: 0.0,
            episode_length: 0,
            after_done: false,
        }
    }

    /// Get a reference to the inner environment
    pub fn inner(&self) -> &E {
        &self.env
    }

    /// Get a mutable reference to the inner environment
    pub fn inner_mut(&mut self) -> &mut E {
        &mut self.env
    }

    /// Unwrap the inner environment
    pub fn into_inner(self) -> E {
        self.env
    }
}

impl<E: Env> Env for EpisodeStats<E> {
    fn observation_space(&self) -> Option<&DynSpace> {
        self.env.observation_space()
    }

    fn action_space(&self) -> Option<&DynSpace> {
        self.env.action_space()
    }

    fn reset(&mut self) -> Result<(Observation, EnvInfo)> {
        let out = self.env.reset()?;
        self.episode_return = 0.0;
        self.episode_length = 0;
        self.after_done = false;
        Ok(out)
    }

    fn step(&mut self, action: &Action) -> Result<StepResult> {
        let mut result = self.env.step(action)?;

        if self.after_done {
            self.after_done = result.done;
            return Ok(result);
        }

        self.episode_return += result.reward;
        self.episode_length += 1;

        if result.done {
            result.info = result
                .info
                .with_episode_stats(self.episode_return, self.episode_length);

            self.episode_return = 0.0;
            self.episode_length = 0;
            self.after_done = true;
        }

        Ok(result)
    }

    fn close(&mut self) {
        self.env.close()
    }
}
