//! Reset/step facade over a [`Session`].

use super::{Action, Env, EnvInfo, Observation, StepResult};
use crate::config::BridgeConfig;
use crate::session::{Incoming, NegotiatedSpaces, Session, SessionState, StepData};
use crate::spaces::DynSpace;
use crate::transport::{Channel, Connector};
use crate::{BridgeError, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::{Mutex, MutexGuard, OnceLock, TryLockError};
use tracing::{debug, info};

struct Inner<C: Channel> {
    session: Session<C>,
    rng: StdRng,
    /// Set once `reset` has returned an observation
    started: bool,
    /// First observation of the current episode while no step has been taken
    first: Option<(Observation, EnvInfo)>,
}

/// Environment whose dynamics live in a remote simulation.
///
/// All methods take `&self`, so one `RemoteEnv` can be shared through an
/// `Arc`. Calls are not queued: a `reset` or `step` issued while another is
/// running fails with `ConcurrentStepViolation`.
///
/// # Example
///
/// ```rust,ignore
/// let config = BridgeConfig::default().with_port(5555);
/// let env = RemoteEnv::with_connector(TcpAcceptor::bind(&config)?, &config);
/// let (obs, _) = env.reset()?;
/// let action = env.action_space().unwrap().sample(&mut rng);
/// let result = env.step(&action)?;
/// ```
pub struct RemoteEnv<C: Channel> {
    inner: Mutex<Inner<C>>,
    spaces: OnceLock<NegotiatedSpaces>,
}

impl<C: Channel> RemoteEnv<C> {
    /// Create over an established channel
    pub fn new(channel: C, config: &BridgeConfig) -> Self {
        Self::from_session(Session::new(channel, config), config)
    }

    /// Create and wait for the simulation through `connector` on first reset
    pub fn with_connector<K>(connector: K, config: &BridgeConfig) -> Self
    where
        K: Connector<Channel = C> + 'static,
    {
        Self::from_session(Session::with_connector(connector, config), config)
    }

    fn from_session(session: Session<C>, config: &BridgeConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                session,
                rng: StdRng::seed_from_u64(config.seed),
                started: false,
                first: None,
            }),
            spaces: OnceLock::new(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner<C>>> {
        match self.inner.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::WouldBlock) => Err(BridgeError::ConcurrentStepViolation),
            Err(TryLockError::Poisoned(_)) => Err(BridgeError::SessionTerminated),
        }
    }

    /// Observation space, available after the first `reset`
    pub fn observation_space(&self) -> Option<&DynSpace> {
        self.spaces.get().map(|s| &s.observation_space)
    }

    /// Action space, available after the first `reset`
    pub fn action_space(&self) -> Option<&DynSpace> {
        self.spaces.get().map(|s| &s.action_space)
    }

    /// Current session state
    pub fn state(&self) -> Result<SessionState> {
        Ok(self.lock()?.session.state())
    }

    /// Index of the current episode
    pub fn episode(&self) -> Result<u64> {
        Ok(self.lock()?.session.episode())
    }

    /// Return the first observation of an episode.
    ///
    /// Performs the handshake on first use. After a terminal step the pending
    /// request is answered with an action sampled from the action space.
    /// Calling `reset` again before any `step` returns the same observation.
    pub fn reset(&self) -> Result<(Observation, EnvInfo)> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;

        match inner.session.state() {
            SessionState::Terminated => return Err(BridgeError::SessionTerminated),
            SessionState::Connecting | SessionState::AwaitingHandshake => {
                inner.session.handshake()?;
                if let Some(spaces) = inner.session.spaces() {
                    let _ = self.spaces.set(spaces.clone());
                }
            }
            SessionState::Ready | SessionState::Stepping => {}
        }

        if let Some(first) = &inner.first {
            return Ok(first.clone());
        }

        if inner.session.state() == SessionState::Stepping {
            if !inner.session.last_done() {
                return Err(BridgeError::EpisodeInProgress);
            }
            let placeholder = self.sample_action(&mut inner.rng)?;
            debug!(episode = inner.session.episode(), "Releasing terminal step with a placeholder action");
            inner.session.send_action(&placeholder)?;
        }

        match inner.session.recv_step()? {
            Incoming::Step(data) => {
                let info = step_info(&inner.session);
                inner.started = true;
                inner.first = Some((data.observation.clone(), info.clone()));
                info!(episode = info.episode, "Episode started");
                Ok((data.observation, info))
            }
            Incoming::Shutdown => Err(BridgeError::ChannelClosed),
        }
    }

    /// Answer the pending request with `action` and wait for the next one.
    ///
    /// After a terminal step this starts the next episode and returns its
    /// first observation. If the simulation shuts down instead, the result is
    /// terminal with an observation sampled from the observation space,
    /// reward 0 and `info.shutdown` set.
    pub fn step(&self, action: &Action) -> Result<StepResult> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;

        if inner.session.is_terminated() {
            return Err(BridgeError::SessionTerminated);
        }
        if !inner.started {
            return Err(BridgeError::ResetRequired);
        }

        inner.session.send_action(action)?;
        inner.first = None;

        match inner.session.recv_step()? {
            Incoming::Step(StepData {
                observation,
                reward,
                done,
            }) => Ok(StepResult {
                observation,
                reward,
                done,
                info: step_info(&inner.session),
            }),
            Incoming::Shutdown => {
                let observation = match self.observation_space() {
                    Some(space) => space.sample(&mut inner.rng),
                    None => return Err(BridgeError::SessionTerminated),
                };
                let mut info = step_info(&inner.session);
                info.shutdown = true;
                Ok(StepResult {
                    observation,
                    reward: 0.0,
                    done: true,
                    info,
                })
            }
        }
    }

    /// Close the channel; the session terminates
    pub fn close(&self) -> Result<()> {
        self.lock()?.session.close();
        Ok(())
    }

    fn sample_action(&self, rng: &mut StdRng) -> Result<Action> {
        self.action_space()
            .map(|space| space.sample(rng))
            .ok_or(BridgeError::SessionTerminated)
    }
}

fn step_info<C: Channel>(session: &Session<C>) -> EnvInfo {
    EnvInfo {
        episode: session.episode(),
        step: session.steps_in_episode(),
        ..EnvInfo::default()
    }
}

impl<C: Channel> Env for RemoteEnv<C> {
    fn observation_space(&self) -> Option<&DynSpace> {
        RemoteEnv::observation_space(self)
    }

    fn action_space(&self) -> Option<&DynSpace> {
        RemoteEnv::action_space(self)
    }

    fn reset(&mut self) -> Result<(Observation, EnvInfo)> {
        RemoteEnv::reset(self)
    }

    fn step(&mut self, action: &Action) -> Result<StepResult> {
        RemoteEnv::step(self, action)
    }

    fn close(&mut self) {
        let _ = RemoteEnv::close(self);
    }
}
