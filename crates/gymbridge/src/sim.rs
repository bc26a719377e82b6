//! Simulation-side endpoint.
//!
//! The counterpart of [`Session`](crate::session::Session): it declares the
//! spaces, sends one step request per turn and decodes the agent's action.

use crate::codec;
use crate::config::BridgeConfig;
use crate::env::NativeValue;
use crate::protocol::wire::reply_proto;
use crate::protocol::{
    AgentMessage, Handshake, SimMessage, StepReply, StepRequest, PROTOCOL_VERSION,
};
use crate::session::NegotiatedSpaces;
use crate::spaces::DynSpace;
use crate::transport::Channel;
use crate::{BridgeError, Result};
use std::time::Duration;
use tracing::{debug, info};

pub struct SimulationEndpoint<C: Channel> {
    channel: C,
    spaces: Option<NegotiatedSpaces>,
    timeout: Option<Duration>,
    awaiting_reply: bool,
    closed: bool,
}

impl<C: Channel> SimulationEndpoint<C> {
    pub fn new(channel: C, config: &BridgeConfig) -> Self {
        Self {
            channel,
            spaces: None,
            timeout: config.timeout(),
            awaiting_reply: false,
            closed: false,
        }
    }

    pub fn spaces(&self) -> Option<&NegotiatedSpaces> {
        self.spaces.as_ref()
    }

    /// Direct access to the channel, e.g. to inject raw bytes
    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Declare both spaces and wait for the agent's acknowledgement
    pub fn handshake(&mut self, observation_space: DynSpace, action_space: DynSpace) -> Result<()> {
        self.ensure_open()?;
        if self.spaces.is_some() {
            return Err(BridgeError::ProtocolViolation(
                "handshake already performed".into(),
            ));
        }
        let handshake = Handshake::new(observation_space, action_space);
        self.send(&SimMessage::Handshake(handshake.clone()))?;

        match self.recv_body()? {
            reply_proto::Body::HandshakeAck(ack) if ack.protocol_version == PROTOCOL_VERSION => {}
            reply_proto::Body::HandshakeAck(ack) => {
                return Err(self.fail(BridgeError::ProtocolViolation(format!(
                    "agent speaks protocol version {}, simulation speaks {}",
                    ack.protocol_version, PROTOCOL_VERSION
                ))))
            }
            reply_proto::Body::Step(_) => {
                return Err(self.fail(BridgeError::ProtocolViolation(
                    "expected HandshakeAck, got StepReply".into(),
                )))
            }
        }

        info!(
            observation_space = %handshake.observation_space,
            action_space = %handshake.action_space,
            "Handshake acknowledged"
        );
        self.spaces = Some(NegotiatedSpaces {
            observation_space: handshake.observation_space,
            action_space: handshake.action_space,
        });
        Ok(())
    }

    /// Send one step request; the observation is checked against the
    /// observation space first
    pub fn send_step(&mut self, observation: &NativeValue, reward: f64, done: bool) -> Result<()> {
        self.ensure_open()?;
        if self.awaiting_reply {
            return Err(BridgeError::ProtocolViolation(
                "previous step has not been answered".into(),
            ));
        }
        let space = match self.spaces.as_ref() {
            Some(spaces) => &spaces.observation_space,
            None => {
                return Err(BridgeError::ProtocolViolation(
                    "send_step called before handshake".into(),
                ))
            }
        };
        let wire = codec::encode(space, observation)?;
        self.send(&SimMessage::Step(StepRequest {
            observation: wire,
            reward,
            done,
        }))?;
        self.awaiting_reply = true;
        debug!(reward, done, "Step request sent");
        Ok(())
    }

    /// Wait for the action answering the last step request
    pub fn recv_action(&mut self) -> Result<NativeValue> {
        self.ensure_open()?;
        if !self.awaiting_reply {
            return Err(BridgeError::ProtocolViolation(
                "no step request awaiting an action".into(),
            ));
        }
        let reply = match self.recv_body()? {
            reply_proto::Body::Step(r) => StepReply::try_from(r).map_err(|e| self.fail(e))?,
            reply_proto::Body::HandshakeAck(_) => {
                return Err(self.fail(BridgeError::ProtocolViolation(
                    "expected StepReply, got HandshakeAck".into(),
                )))
            }
        };
        let decoded = match self.spaces.as_ref() {
            Some(spaces) => codec::decode(&spaces.action_space, reply.action),
            None => Err(BridgeError::ProtocolViolation("no negotiated spaces".into())),
        };
        let action = decoded.map_err(|e| self.fail(e))?;
        self.awaiting_reply = false;
        Ok(action)
    }

    /// Send a step request and wait for its action
    pub fn step(&mut self, observation: &NativeValue, reward: f64, done: bool) -> Result<NativeValue> {
        self.send_step(observation, reward, done)?;
        self.recv_action()
    }

    /// Announce shutdown and close the channel
    pub fn shutdown(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.send(&SimMessage::Shutdown)?;
        info!("Shutdown sent");
        self.close();
        Ok(())
    }

    pub fn close(&mut self) {
        if !self.closed {
            self.channel.close();
            self.closed = true;
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(BridgeError::ChannelClosed)
        } else {
            Ok(())
        }
    }

    fn send(&mut self, message: &SimMessage) -> Result<()> {
        let sent = self.channel.send(&message.encode());
        sent.map_err(|e| self.fail(e))
    }

    fn recv_body(&mut self) -> Result<reply_proto::Body> {
        let received = self
            .channel
            .recv(self.timeout)
            .and_then(|bytes| AgentMessage::decode_body(&bytes));
        received.map_err(|e| self.fail(e))
    }

    fn fail(&mut self, err: BridgeError) -> BridgeError {
        debug!(error = %err, "Simulation endpoint closing");
        self.close();
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::RemoteEnv;
    use crate::spaces::{Discrete, MultiBinary};
    use crate::transport::MemoryChannel;
    use std::thread;

    #[test]
    fn test_endpoint_drives_remote_env() {
        let (agent, sim) = MemoryChannel::pair();
        let config = BridgeConfig::default();

        let sim_config = config.clone();
        let handle = thread::spawn(move || {
            let mut endpoint = SimulationEndpoint::new(sim, &sim_config);
            endpoint
                .handshake(
                    MultiBinary::new(2).unwrap().into(),
                    Discrete::new(4).unwrap().into(),
                )
                .unwrap();
            let mut actions = Vec::new();
            let obs = NativeValue::MultiBinary(vec![true, false]);
            actions.push(endpoint.step(&obs, 0.0, false).unwrap());
            actions.push(endpoint.step(&obs, 1.0, true).unwrap());
            endpoint.shutdown().unwrap();
            actions
        });

        let env = RemoteEnv::new(agent, &config);
        let (obs, _) = env.reset().unwrap();
        assert_eq!(obs, NativeValue::MultiBinary(vec![true, false]));
        let result = env.step(&NativeValue::Discrete(3)).unwrap();
        assert!(result.done);
        assert_eq!(result.reward, 1.0);
        let last = env.step(&NativeValue::Discrete(1)).unwrap();
        assert!(last.info.shutdown);

        let actions = handle.join().unwrap();
        assert_eq!(
            actions,
            vec![NativeValue::Discrete(3), NativeValue::Discrete(1)]
        );
    }

    #[test]
    fn test_send_step_checks_observation() {
        let (_agent, sim) = MemoryChannel::pair();
        let mut endpoint = SimulationEndpoint::new(sim, &BridgeConfig::default());
        assert!(matches!(
            endpoint.send_step(&NativeValue::Discrete(0), 0.0, false),
            Err(BridgeError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_reply_before_ack_is_violation() {
        use crate::protocol::wire;
        use prost::Message;

        let (mut agent, sim) = MemoryChannel::pair();
        let reply = wire::ReplyProto {
            body: Some(reply_proto::Body::Step(wire::StepReplyProto {
                action: Some(wire::ValueProto { kind: None }),
            })),
        };
        agent.send(&reply.encode_to_vec()).unwrap();

        let mut endpoint = SimulationEndpoint::new(sim, &BridgeConfig::default());
        assert!(matches!(
            endpoint.handshake(
                Discrete::new(2).unwrap().into(),
                Discrete::new(2).unwrap().into()
            ),
            Err(BridgeError::ProtocolViolation(_))
        ));
        assert!(endpoint.spaces().is_none());
    }
}
