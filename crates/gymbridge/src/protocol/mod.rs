//! Message protocol between a simulation and an agent.
//!
//! The simulation drives the exchange: it opens with a [`Handshake`], then
//! sends one [`StepRequest`] per turn and waits for exactly one
//! [`StepReply`]. Either side's messages travel as protobuf payloads (see
//! [`wire`]); stream transports add length-prefixed framing (see [`frame`]).

pub mod frame;
pub mod wire;

pub use frame::{FrameCodec, DEFAULT_MAX_FRAME_LEN};

use crate::codec::WireValue;
use crate::spaces::DynSpace;
use crate::{BridgeError, Result};
use prost::Message;
use wire::{reply_proto, request_proto};

/// Version carried in the handshake and its acknowledgement
pub const PROTOCOL_VERSION: u32 = 1;

/// Opening message declaring both spaces
#[derive(Clone, Debug, PartialEq)]
pub struct Handshake {
    pub observation_space: DynSpace,
    pub action_space: DynSpace,
    pub protocol_version: u32,
}

impl Handshake {
    pub fn new(observation_space: DynSpace, action_space: DynSpace) -> Self {
        Self {
            observation_space,
            action_space,
            protocol_version: PROTOCOL_VERSION,
        }
    }
}

/// One simulation turn: the observation and the reward that led to it
#[derive(Clone, Debug, PartialEq)]
pub struct StepRequest {
    pub observation: WireValue,
    pub reward: f64,
    pub done: bool,
}

/// The agent's answer to a [`StepRequest`]
#[derive(Clone, Debug, PartialEq)]
pub struct StepReply {
    pub action: WireValue,
}

/// Messages sent by the simulation
#[derive(Clone, Debug, PartialEq)]
pub enum SimMessage {
    Handshake(Handshake),
    Step(StepRequest),
    /// The simulation is going away; no reply is expected
    Shutdown,
}

impl SimMessage {
    pub fn encode(&self) -> Vec<u8> {
        let body = match self {
            SimMessage::Handshake(h) => request_proto::Body::Handshake(wire::HandshakeProto {
                observation_space: Some((&h.observation_space).into()),
                action_space: Some((&h.action_space).into()),
                protocol_version: h.protocol_version,
            }),
            SimMessage::Step(s) => request_proto::Body::Step(wire::StepRequestProto {
                observation: Some(s.observation.clone().into()),
                reward: s.reward,
                done: s.done,
            }),
            SimMessage::Shutdown => request_proto::Body::Shutdown(wire::ShutdownProto {}),
        };
        wire::RequestProto { body: Some(body) }.encode_to_vec()
    }

    /// Parse a payload. Descriptor validation failures surface as
    /// `MalformedSpace`; everything else that does not parse is `Framing`.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(match Self::decode_body(bytes)? {
            request_proto::Body::Handshake(h) => SimMessage::Handshake(h.try_into()?),
            request_proto::Body::Step(s) => SimMessage::Step(s.try_into()?),
            request_proto::Body::Shutdown(_) => SimMessage::Shutdown,
        })
    }

    /// Parse the envelope only, leaving the body's contents unchecked
    pub(crate) fn decode_body(bytes: &[u8]) -> Result<request_proto::Body> {
        let proto: wire::RequestProto = wire::parse(bytes)?;
        proto
            .body
            .ok_or_else(|| BridgeError::Framing("request carries no message".into()))
    }
}

impl TryFrom<wire::HandshakeProto> for Handshake {
    type Error = BridgeError;

    fn try_from(h: wire::HandshakeProto) -> Result<Self> {
        let observation_space = h.observation_space.ok_or_else(|| {
            BridgeError::MalformedSpace("handshake has no observation space".into())
        })?;
        let action_space = h
            .action_space
            .ok_or_else(|| BridgeError::MalformedSpace("handshake has no action space".into()))?;
        Ok(Handshake {
            observation_space: DynSpace::try_from(observation_space)?,
            action_space: DynSpace::try_from(action_space)?,
            protocol_version: h.protocol_version,
        })
    }
}

impl TryFrom<wire::StepRequestProto> for StepRequest {
    type Error = BridgeError;

    fn try_from(s: wire::StepRequestProto) -> Result<Self> {
        let observation = s
            .observation
            .ok_or_else(|| BridgeError::Framing("step request has no observation".into()))?;
        Ok(StepRequest {
            observation: WireValue::try_from(observation)?,
            reward: s.reward,
            done: s.done,
        })
    }
}

impl TryFrom<wire::StepReplyProto> for StepReply {
    type Error = BridgeError;

    fn try_from(r: wire::StepReplyProto) -> Result<Self> {
        let action = r
            .action
            .ok_or_else(|| BridgeError::Framing("step reply has no action".into()))?;
        Ok(StepReply {
            action: WireValue::try_from(action)?,
        })
    }
}

/// Messages sent by the agent
#[derive(Clone, Debug, PartialEq)]
pub enum AgentMessage {
    HandshakeAck { protocol_version: u32 },
    Step(StepReply),
}

impl AgentMessage {
    pub fn encode(&self) -> Vec<u8> {
        let body = match self {
            AgentMessage::HandshakeAck { protocol_version } => {
                reply_proto::Body::HandshakeAck(wire::HandshakeAckProto {
                    protocol_version: *protocol_version,
                })
            }
            AgentMessage::Step(r) => reply_proto::Body::Step(wire::StepReplyProto {
                action: Some(r.action.clone().into()),
            }),
        };
        wire::ReplyProto { body: Some(body) }.encode_to_vec()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(match Self::decode_body(bytes)? {
            reply_proto::Body::HandshakeAck(a) => AgentMessage::HandshakeAck {
                protocol_version: a.protocol_version,
            },
            reply_proto::Body::Step(r) => AgentMessage::Step(r.try_into()?),
        })
    }

    /// Parse the envelope only, leaving the body's contents unchecked
    pub(crate) fn decode_body(bytes: &[u8]) -> Result<reply_proto::Body> {
        let proto: wire::ReplyProto = wire::parse(bytes)?;
        proto
            .body
            .ok_or_else(|| BridgeError::Framing("reply carries no message".into()))
    }
}
