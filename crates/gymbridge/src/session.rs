//! Agent-side session state machine.
//!
//! ```text
//! Connecting -> AwaitingHandshake -> Ready <-> Stepping
//!                      \               \        /
//!                       +-------------> Terminated
//! ```
//!
//! A session owns one channel. It receives the handshake, then alternates
//! between receiving a step request (`Ready -> Stepping`) and sending the
//! action that answers it (`Stepping -> Ready`). Any wire, codec or timeout
//! failure closes the channel and the session stays `Terminated`; every later
//! call fails with `SessionTerminated` without touching the channel.

use crate::codec;
use crate::config::BridgeConfig;
use crate::env::NativeValue;
use crate::protocol::wire::request_proto;
use crate::protocol::{
    AgentMessage, Handshake, SimMessage, StepReply, StepRequest, PROTOCOL_VERSION,
};
use crate::spaces::DynSpace;
use crate::transport::{Channel, Connector};
use crate::{BridgeError, Result};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lifecycle of a session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the simulation to connect
    Connecting,
    /// Connected, handshake not yet received
    AwaitingHandshake,
    /// Waiting for the next step request
    Ready,
    /// A step request is waiting for its action
    Stepping,
    /// Closed; no further I/O
    Terminated,
}

/// Spaces declared by the simulation in its handshake
#[derive(Clone, Debug, PartialEq)]
pub struct NegotiatedSpaces {
    pub observation_space: DynSpace,
    pub action_space: DynSpace,
}

/// A decoded step request
#[derive(Clone, Debug, PartialEq)]
pub struct StepData {
    pub observation: NativeValue,
    pub reward: f64,
    pub done: bool,
}

/// What the simulation sent while the session was `Ready`
#[derive(Clone, Debug, PartialEq)]
pub enum Incoming {
    Step(StepData),
    Shutdown,
}

/// One agent-side connection to a simulation
pub struct Session<C: Channel> {
    channel: Option<C>,
    connector: Option<Box<dyn Connector<Channel = C>>>,
    state: SessionState,
    spaces: Option<NegotiatedSpaces>,
    episode: u64,
    steps_in_episode: u64,
    last_done: bool,
    timeout: Option<Duration>,
    max_frame_len: usize,
}

impl<C: Channel> Session<C> {
    /// Start from an established channel
    pub fn new(channel: C, config: &BridgeConfig) -> Self {
        Self {
            channel: Some(channel),
            connector: None,
            state: SessionState::AwaitingHandshake,
            spaces: None,
            episode: 0,
            steps_in_episode: 0,
            last_done: false,
            timeout: config.timeout(),
            max_frame_len: config.max_frame_len,
        }
    }

    /// Start by waiting for a connection from `connector`
    pub fn with_connector<K>(connector: K, config: &BridgeConfig) -> Self
    where
        K: Connector<Channel = C> + 'static,
    {
        Self {
            channel: None,
            connector: Some(Box::new(connector)),
            state: SessionState::Connecting,
            spaces: None,
            episode: 0,
            steps_in_episode: 0,
            last_done: false,
            timeout: config.timeout(),
            max_frame_len: config.max_frame_len,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_terminated(&self) -> bool {
        self.state == SessionState::Terminated
    }

    /// Spaces from the handshake, once received
    pub fn spaces(&self) -> Option<&NegotiatedSpaces> {
        self.spaces.as_ref()
    }

    /// Index of the current episode (0-based)
    pub fn episode(&self) -> u64 {
        self.episode
    }

    /// Step requests received so far in the current episode
    pub fn steps_in_episode(&self) -> u64 {
        self.steps_in_episode
    }

    /// Whether the last step request ended its episode
    pub fn last_done(&self) -> bool {
        self.last_done
    }

    /// Wait for the simulation to connect
    pub fn connect(&mut self) -> Result<()> {
        self.expect_state(SessionState::Connecting, "connect")?;
        let connector = self.connector.as_mut().ok_or_else(|| {
            BridgeError::ProtocolViolation("session has no connector".into())
        })?;
        match connector.connect(self.timeout) {
            Ok(channel) => {
                self.channel = Some(channel);
                self.connector = None;
                self.state = SessionState::AwaitingHandshake;
                info!("Simulation connected");
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Receive and validate the handshake, then acknowledge it.
    ///
    /// Connects first when the session was built from a connector.
    pub fn handshake(&mut self) -> Result<()> {
        if self.state == SessionState::Connecting {
            self.connect()?;
        }
        self.expect_state(SessionState::AwaitingHandshake, "handshake")?;

        let handshake = match self.recv_body()? {
            request_proto::Body::Handshake(h) => {
                Handshake::try_from(h).map_err(|e| self.fail(e))?
            }
            request_proto::Body::Step(_) => {
                return Err(self.fail(BridgeError::ProtocolViolation(
                    "step request received before handshake".into(),
                )))
            }
            request_proto::Body::Shutdown(_) => {
                info!("Simulation shut down before the handshake");
                self.terminate();
                return Err(BridgeError::ChannelClosed);
            }
        };
        if handshake.protocol_version != PROTOCOL_VERSION {
            return Err(self.fail(BridgeError::ProtocolViolation(format!(
                "simulation speaks protocol version {}, agent speaks {}",
                handshake.protocol_version, PROTOCOL_VERSION
            ))));
        }
        for (role, space) in [
            ("observation", &handshake.observation_space),
            ("action", &handshake.action_space),
        ] {
            if space.flat_size() > self.max_frame_len {
                return Err(self.fail(BridgeError::MalformedSpace(format!(
                    "{} space has {} slots, more than a {} byte frame can carry",
                    role,
                    space.flat_size(),
                    self.max_frame_len
                ))));
            }
        }

        info!(
            observation_space = %handshake.observation_space,
            action_space = %handshake.action_space,
            "Handshake received"
        );
        self.spaces = Some(NegotiatedSpaces {
            observation_space: handshake.observation_space,
            action_space: handshake.action_space,
        });
        self.send_message(&AgentMessage::HandshakeAck {
            protocol_version: PROTOCOL_VERSION,
        })?;
        self.state = SessionState::Ready;
        Ok(())
    }

    /// Receive the next step request (or shutdown) and decode its observation
    pub fn recv_step(&mut self) -> Result<Incoming> {
        self.expect_state(SessionState::Ready, "recv_step")?;

        let request = match self.recv_body()? {
            request_proto::Body::Step(s) => StepRequest::try_from(s).map_err(|e| self.fail(e))?,
            request_proto::Body::Handshake(_) => {
                return Err(self.fail(BridgeError::ProtocolViolation(
                    "second handshake on an established session".into(),
                )))
            }
            request_proto::Body::Shutdown(_) => {
                info!(episode = self.episode, "Simulation shut down");
                self.terminate();
                return Ok(Incoming::Shutdown);
            }
        };

        let decoded = match self.spaces.as_ref() {
            Some(spaces) => codec::decode(&spaces.observation_space, request.observation),
            None => Err(BridgeError::ProtocolViolation("no negotiated spaces".into())),
        };
        let observation = decoded.map_err(|e| self.fail(e))?;

        self.steps_in_episode += 1;
        self.last_done = request.done;
        self.state = SessionState::Stepping;
        debug!(
            episode = self.episode,
            step = self.steps_in_episode,
            reward = request.reward,
            done = request.done,
            "Step request"
        );
        if request.done {
            info!(
                episode = self.episode,
                length = self.steps_in_episode,
                "Episode finished"
            );
        }
        Ok(Incoming::Step(StepData {
            observation,
            reward: request.reward,
            done: request.done,
        }))
    }

    /// Answer the pending step request with `action`.
    ///
    /// The action is checked against the action space before anything is
    /// sent. Answering a terminal request starts the next episode.
    pub fn send_action(&mut self, action: &NativeValue) -> Result<()> {
        self.expect_state(SessionState::Stepping, "send_action")?;

        let encoded = match self.spaces.as_ref() {
            Some(spaces) => codec::encode(&spaces.action_space, action),
            None => Err(BridgeError::ProtocolViolation("no negotiated spaces".into())),
        };
        let wire = encoded.map_err(|e| self.fail(e))?;

        let pending = match self.channel.as_mut() {
            Some(channel) => channel.has_pending(),
            None => Err(BridgeError::ChannelClosed),
        };
        match pending {
            Ok(false) => {}
            Ok(true) => {
                return Err(self.fail(BridgeError::ProtocolViolation(
                    "simulation sent again before the step was answered".into(),
                )))
            }
            Err(e) => return Err(self.fail(e)),
        }

        self.send_message(&AgentMessage::Step(StepReply { action: wire }))?;
        self.state = SessionState::Ready;
        if self.last_done {
            self.episode += 1;
            self.steps_in_episode = 0;
            self.last_done = false;
        }
        Ok(())
    }

    /// Close the channel and terminate
    pub fn close(&mut self) {
        if self.state != SessionState::Terminated {
            info!(episode = self.episode, "Closing session");
            self.terminate();
        }
    }

    fn expect_state(&self, expected: SessionState, operation: &str) -> Result<()> {
        match self.state {
            SessionState::Terminated => Err(BridgeError::SessionTerminated),
            state if state == expected => Ok(()),
            state => Err(BridgeError::ProtocolViolation(format!(
                "{} called in state {:?}",
                operation, state
            ))),
        }
    }

    /// Receive the next message and identify its kind; the caller converts
    /// the body once the current state accepts that kind
    fn recv_body(&mut self) -> Result<request_proto::Body> {
        let received = match self.channel.as_mut() {
            Some(channel) => channel
                .recv(self.timeout)
                .and_then(|bytes| SimMessage::decode_body(&bytes)),
            None => Err(BridgeError::ChannelClosed),
        };
        received.map_err(|e| self.fail(e))
    }

    fn send_message(&mut self, message: &AgentMessage) -> Result<()> {
        let sent = match self.channel.as_mut() {
            Some(channel) => channel.send(&message.encode()),
            None => Err(BridgeError::ChannelClosed),
        };
        sent.map_err(|e| self.fail(e))
    }

    fn fail(&mut self, err: BridgeError) -> BridgeError {
        warn!(error = %err, state = ?self.state, episode = self.episode, "Session terminated");
        self.terminate();
        err
    }

    fn terminate(&mut self) {
        if let Some(channel) = self.channel.as_mut() {
            channel.close();
        }
        self.channel = None;
        self.connector = None;
        self.state = SessionState::Terminated;
    }
}

impl<C: Channel> Drop for Session<C> {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::WireValue;
    use crate::protocol::wire;
    use crate::spaces::{Box as BoxSpace, Discrete, MultiBinary};
    use prost::Message;
    use crate::transport::MemoryChannel;

    fn spaces() -> (DynSpace, DynSpace) {
        (
            BoxSpace::symmetric(&[2]).into(),
            Discrete::new(3).unwrap().into(),
        )
    }

    fn send(sim: &mut MemoryChannel, msg: SimMessage) {
        sim.send(&msg.encode()).unwrap();
    }

    fn recv(sim: &mut MemoryChannel) -> AgentMessage {
        AgentMessage::decode(&sim.recv(Some(Duration::from_secs(1))).unwrap()).unwrap()
    }

    fn step(obs: Vec<f64>, reward: f64, done: bool) -> SimMessage {
        SimMessage::Step(StepRequest {
            observation: WireValue::Box(obs),
            reward,
            done,
        })
    }

    fn ready_session() -> (Session<MemoryChannel>, MemoryChannel) {
        let (agent, mut sim) = MemoryChannel::pair();
        let mut session = Session::new(agent, &BridgeConfig::default());
        let (obs, act) = spaces();
        send(&mut sim, SimMessage::Handshake(Handshake::new(obs, act)));
        session.handshake().unwrap();
        assert!(matches!(recv(&mut sim), AgentMessage::HandshakeAck { .. }));
        (session, sim)
    }

    #[test]
    fn test_handshake_stores_spaces() {
        let (session, _sim) = ready_session();
        let (obs, act) = spaces();
        assert_eq!(session.state(), SessionState::Ready);
        let negotiated = session.spaces().unwrap();
        assert_eq!(negotiated.observation_space, obs);
        assert_eq!(negotiated.action_space, act);
    }

    #[test]
    fn test_step_before_handshake_terminates() {
        let (agent, mut sim) = MemoryChannel::pair();
        let mut session = Session::new(agent, &BridgeConfig::default());
        send(&mut sim, step(vec![0.0, 0.0], 0.0, false));
        assert!(matches!(
            session.handshake(),
            Err(BridgeError::ProtocolViolation(_))
        ));
        assert!(session.is_terminated());
        assert!(matches!(
            session.handshake(),
            Err(BridgeError::SessionTerminated)
        ));
    }

    #[test]
    fn test_protocol_version_mismatch() {
        let (agent, mut sim) = MemoryChannel::pair();
        let mut session = Session::new(agent, &BridgeConfig::default());
        let (obs, act) = spaces();
        let mut handshake = Handshake::new(obs, act);
        handshake.protocol_version = PROTOCOL_VERSION + 1;
        send(&mut sim, SimMessage::Handshake(handshake));
        assert!(matches!(
            session.handshake(),
            Err(BridgeError::ProtocolViolation(_))
        ));
        assert!(session.is_terminated());
    }

    #[test]
    fn test_step_cycle_and_episode_counter() {
        let (mut session, mut sim) = ready_session();

        send(&mut sim, step(vec![0.5, -0.5], 0.0, false));
        match session.recv_step().unwrap() {
            Incoming::Step(data) => {
                assert_eq!(data.observation, NativeValue::vector(vec![0.5, -0.5]));
                assert!(!data.done);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(session.state(), SessionState::Stepping);
        session.send_action(&NativeValue::Discrete(2)).unwrap();
        assert_eq!(
            recv(&mut sim),
            AgentMessage::Step(StepReply {
                action: WireValue::Discrete(2)
            })
        );

        send(&mut sim, step(vec![1.0, 1.0], 1.0, true));
        session.recv_step().unwrap();
        assert_eq!(session.steps_in_episode(), 2);
        assert_eq!(session.episode(), 0);
        session.send_action(&NativeValue::Discrete(0)).unwrap();
        assert_eq!(session.episode(), 1);
        assert_eq!(session.steps_in_episode(), 0);
    }

    #[test]
    fn test_misuse_does_not_terminate() {
        let (mut session, _sim) = ready_session();
        assert!(matches!(
            session.send_action(&NativeValue::Discrete(0)),
            Err(BridgeError::ProtocolViolation(_))
        ));
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[test]
    fn test_invalid_action_terminates_without_sending() {
        let (mut session, mut sim) = ready_session();
        send(&mut sim, step(vec![0.0, 0.0], 0.0, false));
        session.recv_step().unwrap();
        assert!(matches!(
            session.send_action(&NativeValue::Discrete(3)),
            Err(BridgeError::OutOfRange { .. })
        ));
        assert!(session.is_terminated());
        assert!(matches!(
            sim.recv(Some(Duration::from_millis(50))),
            Err(BridgeError::ChannelClosed)
        ));
    }

    #[test]
    fn test_second_request_before_reply() {
        let (mut session, mut sim) = ready_session();
        send(&mut sim, step(vec![0.0, 0.0], 0.0, false));
        session.recv_step().unwrap();
        send(&mut sim, step(vec![0.0, 0.0], 0.0, false));
        assert!(matches!(
            session.send_action(&NativeValue::Discrete(1)),
            Err(BridgeError::ProtocolViolation(_))
        ));
        assert!(session.is_terminated());
    }

    #[test]
    fn test_second_handshake_is_violation() {
        let (mut session, mut sim) = ready_session();
        let (obs, act) = spaces();
        send(&mut sim, SimMessage::Handshake(Handshake::new(obs, act)));
        assert!(matches!(
            session.recv_step(),
            Err(BridgeError::ProtocolViolation(_))
        ));
        assert!(session.is_terminated());
    }

    #[test]
    fn test_bad_observation_terminates() {
        let (mut session, mut sim) = ready_session();
        send(&mut sim, step(vec![0.0, 2.0], 0.0, false));
        assert!(matches!(
            session.recv_step(),
            Err(BridgeError::OutOfRange { .. })
        ));
        assert!(session.is_terminated());
    }

    #[test]
    fn test_shutdown_terminates() {
        let (mut session, mut sim) = ready_session();
        send(&mut sim, SimMessage::Shutdown);
        assert_eq!(session.recv_step().unwrap(), Incoming::Shutdown);
        assert!(session.is_terminated());
    }

    #[test]
    fn test_receive_timeout_terminates() {
        let (agent, _sim) = MemoryChannel::pair();
        let config = BridgeConfig::default().with_timeout(Some(Duration::from_millis(20)));
        let mut session = Session::new(agent, &config);
        assert!(matches!(session.handshake(), Err(BridgeError::Timeout(_))));
        assert!(session.is_terminated());
    }

    #[test]
    fn test_connect_through_connector() {
        let (connector, dialer) = crate::transport::MemoryConnector::pair();
        let mut session = Session::with_connector(connector, &BridgeConfig::default());
        assert_eq!(session.state(), SessionState::Connecting);

        let mut sim = dialer.dial().unwrap();
        let (obs, act) = spaces();
        send(&mut sim, SimMessage::Handshake(Handshake::new(obs, act)));
        session.handshake().unwrap();
        assert_eq!(session.state(), SessionState::Ready);
    }

    fn empty_value_step() -> Vec<u8> {
        wire::RequestProto {
            body: Some(request_proto::Body::Step(wire::StepRequestProto {
                observation: Some(wire::ValueProto { kind: None }),
                reward: 0.0,
                done: false,
            })),
        }
        .encode_to_vec()
    }

    #[test]
    fn test_unreadable_step_before_handshake_is_violation() {
        let (agent, mut sim) = MemoryChannel::pair();
        let mut session = Session::new(agent, &BridgeConfig::default());
        sim.send(&empty_value_step()).unwrap();
        assert!(matches!(
            session.handshake(),
            Err(BridgeError::ProtocolViolation(_))
        ));
        assert!(session.is_terminated());
    }

    #[test]
    fn test_unreadable_step_after_handshake_is_framing() {
        let (mut session, mut sim) = ready_session();
        sim.send(&empty_value_step()).unwrap();
        assert!(matches!(session.recv_step(), Err(BridgeError::Framing(_))));
        assert!(session.is_terminated());
    }

    #[test]
    fn test_second_handshake_with_bad_space_is_violation() {
        let (mut session, mut sim) = ready_session();
        let bytes = wire::RequestProto {
            body: Some(request_proto::Body::Handshake(wire::HandshakeProto {
                observation_space: Some(wire::SpaceProto {
                    kind: Some(wire::space_proto::Kind::Discrete(wire::DiscreteSpaceProto {
                        n: 0,
                    })),
                }),
                action_space: None,
                protocol_version: PROTOCOL_VERSION,
            })),
        }
        .encode_to_vec();
        sim.send(&bytes).unwrap();
        assert!(matches!(
            session.recv_step(),
            Err(BridgeError::ProtocolViolation(_))
        ));
        assert!(session.is_terminated());
    }

    #[test]
    fn test_space_wider_than_frame_is_rejected() {
        let (agent, mut sim) = MemoryChannel::pair();
        let config = BridgeConfig::default().with_max_frame_len(64);
        let mut session = Session::new(agent, &config);
        send(
            &mut sim,
            SimMessage::Handshake(Handshake::new(
                MultiBinary::new(64).unwrap().into(),
                MultiBinary::new(65).unwrap().into(),
            )),
        );
        match session.handshake() {
            Err(BridgeError::MalformedSpace(msg)) => assert!(msg.contains("action")),
            other => panic!("expected MalformedSpace, got {:?}", other),
        }
        assert!(session.is_terminated());
        assert!(session.spaces().is_none());
    }

    #[test]
    fn test_huge_descriptor_is_malformed() {
        let (agent, mut sim) = MemoryChannel::pair();
        let mut session = Session::new(agent, &BridgeConfig::default());
        let bits = wire::SpaceProto {
            kind: Some(wire::space_proto::Kind::MultiBinary(wire::MultiBinarySpaceProto {
                n: 1 << 40,
            })),
        };
        let bytes = wire::RequestProto {
            body: Some(request_proto::Body::Handshake(wire::HandshakeProto {
                observation_space: Some(bits.clone()),
                action_space: Some(bits),
                protocol_version: PROTOCOL_VERSION,
            })),
        }
        .encode_to_vec();
        sim.send(&bytes).unwrap();
        assert!(matches!(
            session.handshake(),
            Err(BridgeError::MalformedSpace(_))
        ));
        assert!(session.is_terminated());
    }
}
