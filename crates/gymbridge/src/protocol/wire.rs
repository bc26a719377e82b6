//! Protobuf messages exchanged between the simulation and the agent.
//!
//! Hand-written `prost` derives; field tags are part of the protocol and must
//! not be renumbered.

use crate::codec::WireValue;
use crate::spaces::{Box as BoxSpace, Dict, Discrete, DynSpace, MultiBinary, MultiDiscrete, Space, Tuple};
use crate::{BridgeError, Result};
use prost::{Message, Oneof};

#[derive(Clone, PartialEq, Message)]
pub struct SpaceProto {
    #[prost(oneof = "space_proto::Kind", tags = "1, 2, 3, 4, 5, 6")]
    pub kind: Option<space_proto::Kind>,
}

pub mod space_proto {
    use super::*;

    #[derive(Clone, PartialEq, Oneof)]
    pub enum Kind {
        #[prost(message, tag = "1")]
        Box(BoxSpaceProto),
        #[prost(message, tag = "2")]
        Discrete(DiscreteSpaceProto),
        #[prost(message, tag = "3")]
        MultiDiscrete(MultiDiscreteSpaceProto),
        #[prost(message, tag = "4")]
        MultiBinary(MultiBinarySpaceProto),
        #[prost(message, tag = "5")]
        Tuple(TupleSpaceProto),
        #[prost(message, tag = "6")]
        Dict(DictSpaceProto),
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct BoxSpaceProto {
    #[prost(double, repeated, tag = "1")]
    pub low: Vec<f64>,
    #[prost(double, repeated, tag = "2")]
    pub high: Vec<f64>,
    #[prost(uint64, repeated, tag = "3")]
    pub shape: Vec<u64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct DiscreteSpaceProto {
    #[prost(uint64, tag = "1")]
    pub n: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct MultiDiscreteSpaceProto {
    #[prost(uint64, repeated, tag = "1")]
    pub nvec: Vec<u64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct MultiBinarySpaceProto {
    #[prost(uint64, tag = "1")]
    pub n: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct TupleSpaceProto {
    #[prost(message, repeated, tag = "1")]
    pub items: Vec<SpaceProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct DictSpaceProto {
    #[prost(message, repeated, tag = "1")]
    pub items: Vec<DictSpaceEntry>,
}

#[derive(Clone, PartialEq, Message)]
pub struct DictSpaceEntry {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(message, optional, tag = "2")]
    pub space: Option<SpaceProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ValueProto {
    #[prost(oneof = "value_proto::Kind", tags = "1, 2, 3, 4, 5, 6")]
    pub kind: Option<value_proto::Kind>,
}

pub mod value_proto {
    use super::*;

    #[derive(Clone, PartialEq, Oneof)]
    pub enum Kind {
        #[prost(message, tag = "1")]
        Box(BoxValueProto),
        #[prost(uint64, tag = "2")]
        Discrete(u64),
        #[prost(message, tag = "3")]
        MultiDiscrete(MultiDiscreteValueProto),
        #[prost(message, tag = "4")]
        MultiBinary(MultiBinaryValueProto),
        #[prost(message, tag = "5")]
        Tuple(TupleValueProto),
        #[prost(message, tag = "6")]
        Dict(DictValueProto),
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct BoxValueProto {
    #[prost(double, repeated, tag = "1")]
    pub values: Vec<f64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct MultiDiscreteValueProto {
    #[prost(uint64, repeated, tag = "1")]
    pub values: Vec<u64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct MultiBinaryValueProto {
    #[prost(bool, repeated, tag = "1")]
    pub values: Vec<bool>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TupleValueProto {
    #[prost(message, repeated, tag = "1")]
    pub items: Vec<ValueProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct DictValueProto {
    #[prost(message, repeated, tag = "1")]
    pub items: Vec<DictValueEntry>,
}

#[derive(Clone, PartialEq, Message)]
pub struct DictValueEntry {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(message, optional, tag = "2")]
    pub value: Option<ValueProto>,
}

/// Simulation to agent envelope
#[derive(Clone, PartialEq, Message)]
pub struct RequestProto {
    #[prost(oneof = "request_proto::Body", tags = "1, 2, 3")]
    pub body: Option<request_proto::Body>,
}

pub mod request_proto {
    use super::*;

    #[derive(Clone, PartialEq, Oneof)]
    pub enum Body {
        #[prost(message, tag = "1")]
        Handshake(HandshakeProto),
        #[prost(message, tag = "2")]
        Step(StepRequestProto),
        #[prost(message, tag = "3")]
        Shutdown(ShutdownProto),
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct HandshakeProto {
    #[prost(message, optional, tag = "1")]
    pub observation_space: Option<SpaceProto>,
    #[prost(message, optional, tag = "2")]
    pub action_space: Option<SpaceProto>,
    #[prost(uint32, tag = "3")]
    pub protocol_version: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct StepRequestProto {
    #[prost(message, optional, tag = "1")]
    pub observation: Option<ValueProto>,
    #[prost(double, tag = "2")]
    pub reward: f64,
    #[prost(bool, tag = "3")]
    pub done: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct ShutdownProto {}

/// Agent to simulation envelope
#[derive(Clone, PartialEq, Message)]
pub struct ReplyProto {
    #[prost(oneof = "reply_proto::Body", tags = "1, 2")]
    pub body: Option<reply_proto::Body>,
}

pub mod reply_proto {
    use super::*;

    #[derive(Clone, PartialEq, Oneof)]
    pub enum Body {
        #[prost(message, tag = "1")]
        HandshakeAck(HandshakeAckProto),
        #[prost(message, tag = "2")]
        Step(StepReplyProto),
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct HandshakeAckProto {
    #[prost(uint32, tag = "1")]
    pub protocol_version: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct StepReplyProto {
    #[prost(message, optional, tag = "1")]
    pub action: Option<ValueProto>,
}

impl From<&DynSpace> for SpaceProto {
    fn from(space: &DynSpace) -> Self {
        use space_proto::Kind;
        let kind = match space {
            DynSpace::Box(s) => Kind::Box(BoxSpaceProto {
                low: s.low().iter().copied().collect(),
                high: s.high().iter().copied().collect(),
                shape: s.shape().iter().map(|&d| d as u64).collect(),
            }),
            DynSpace::Discrete(s) => Kind::Discrete(DiscreteSpaceProto { n: s.n() }),
            DynSpace::MultiDiscrete(s) => Kind::MultiDiscrete(MultiDiscreteSpaceProto {
                nvec: s.nvec().to_vec(),
            }),
            DynSpace::MultiBinary(s) => Kind::MultiBinary(MultiBinarySpaceProto { n: s.n() }),
            DynSpace::Tuple(s) => Kind::Tuple(TupleSpaceProto {
                items: s.spaces().iter().map(SpaceProto::from).collect(),
            }),
            DynSpace::Dict(s) => Kind::Dict(DictSpaceProto {
                items: s
                    .iter()
                    .map(|(key, child)| DictSpaceEntry {
                        key: key.clone(),
                        space: Some(SpaceProto::from(child)),
                    })
                    .collect(),
            }),
        };
        SpaceProto { kind: Some(kind) }
    }
}

impl TryFrom<SpaceProto> for DynSpace {
    type Error = BridgeError;

    /// Descriptors from the wire go through the same validating constructors
    /// as locally built ones.
    fn try_from(proto: SpaceProto) -> Result<Self> {
        use space_proto::Kind;
        let kind = proto
            .kind
            .ok_or_else(|| BridgeError::MalformedSpace("space descriptor has no kind".into()))?;
        let space = match kind {
            Kind::Box(b) => {
                let shape = b
                    .shape
                    .iter()
                    .map(|&d| {
                        usize::try_from(d).map_err(|_| {
                            BridgeError::MalformedSpace(format!("Box dimension {} too large", d))
                        })
                    })
                    .collect::<Result<Vec<usize>>>()?;
                BoxSpace::from_parts(b.low, b.high, shape)?.into()
            }
            Kind::Discrete(d) => Discrete::new(d.n)?.into(),
            Kind::MultiDiscrete(m) => MultiDiscrete::new(m.nvec)?.into(),
            Kind::MultiBinary(m) => MultiBinary::new(m.n)?.into(),
            Kind::Tuple(t) => Tuple::new(
                t.items
                    .into_iter()
                    .map(DynSpace::try_from)
                    .collect::<Result<Vec<_>>>()?,
            )?
            .into(),
            Kind::Dict(d) => {
                let entries = d
                    .items
                    .into_iter()
                    .map(|entry| {
                        let child = entry.space.ok_or_else(|| {
                            BridgeError::MalformedSpace(format!(
                                "Dict entry {:?} has no space",
                                entry.key
                            ))
                        })?;
                        Ok((entry.key, DynSpace::try_from(child)?))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Dict::new(entries)?.into()
            }
        };
        Ok(space)
    }
}

impl From<WireValue> for ValueProto {
    fn from(value: WireValue) -> Self {
        use value_proto::Kind;
        let kind = match value {
            WireValue::Box(values) => Kind::Box(BoxValueProto { values }),
            WireValue::Discrete(v) => Kind::Discrete(v),
            WireValue::MultiDiscrete(values) => {
                Kind::MultiDiscrete(MultiDiscreteValueProto { values })
            }
            WireValue::MultiBinary(values) => Kind::MultiBinary(MultiBinaryValueProto { values }),
            WireValue::Tuple(items) => Kind::Tuple(TupleValueProto {
                items: items.into_iter().map(ValueProto::from).collect(),
            }),
            WireValue::Dict(entries) => Kind::Dict(DictValueProto {
                items: entries
                    .into_iter()
                    .map(|(key, value)| DictValueEntry {
                        key,
                        value: Some(ValueProto::from(value)),
                    })
                    .collect(),
            }),
        };
        ValueProto { kind: Some(kind) }
    }
}

impl TryFrom<ValueProto> for WireValue {
    type Error = BridgeError;

    fn try_from(proto: ValueProto) -> Result<Self> {
        use value_proto::Kind;
        let kind = proto
            .kind
            .ok_or_else(|| BridgeError::Framing("value has no kind".into()))?;
        Ok(match kind {
            Kind::Box(b) => WireValue::Box(b.values),
            Kind::Discrete(v) => WireValue::Discrete(v),
            Kind::MultiDiscrete(m) => WireValue::MultiDiscrete(m.values),
            Kind::MultiBinary(m) => WireValue::MultiBinary(m.values),
            Kind::Tuple(t) => WireValue::Tuple(
                t.items
                    .into_iter()
                    .map(WireValue::try_from)
                    .collect::<Result<Vec<_>>>()?,
            ),
            Kind::Dict(d) => WireValue::Dict(
                d.items
                    .into_iter()
                    .map(|entry| {
                        let value = entry.value.ok_or_else(|| {
                            BridgeError::Framing(format!("Dict entry {:?} has no value", entry.key))
                        })?;
                        Ok((entry.key, WireValue::try_from(value)?))
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
        })
    }
}

/// Parse a protobuf payload, mapping decode failures to `Framing`
pub(crate) fn parse<M: Message + Default>(bytes: &[u8]) -> Result<M> {
    M::decode(bytes).map_err(|e| BridgeError::Framing(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_space_proto_conversion() {
        let space: DynSpace = Dict::from_pairs(vec![
            ("pos", BoxSpace::uniform(&[2], -5.0, 5.0).unwrap().into()),
            (
                "inner",
                Tuple::new(vec![
                    Discrete::new(3).unwrap().into(),
                    MultiDiscrete::new(vec![2, 2]).unwrap().into(),
                ])
                .unwrap()
                .into(),
            ),
        ])
        .unwrap()
        .into();
        let bytes = SpaceProto::from(&space).encode_to_vec();
        let decoded = DynSpace::try_from(parse::<SpaceProto>(&bytes).unwrap()).unwrap();
        assert_eq!(decoded, space);
    }

    #[test]
    fn test_malformed_descriptors_rejected() {
        let zero = SpaceProto {
            kind: Some(space_proto::Kind::Discrete(DiscreteSpaceProto { n: 0 })),
        };
        assert!(matches!(
            DynSpace::try_from(zero),
            Err(BridgeError::MalformedSpace(_))
        ));

        let short_bounds = SpaceProto {
            kind: Some(space_proto::Kind::Box(BoxSpaceProto {
                low: vec![0.0],
                high: vec![1.0],
                shape: vec![2],
            })),
        };
        assert!(matches!(
            DynSpace::try_from(short_bounds),
            Err(BridgeError::MalformedSpace(_))
        ));

        let duplicate = SpaceProto {
            kind: Some(space_proto::Kind::Dict(DictSpaceProto {
                items: vec![
                    DictSpaceEntry {
                        key: "a".into(),
                        space: Some(SpaceProto::from(&DynSpace::from(Discrete::new(2).unwrap()))),
                    },
                    DictSpaceEntry {
                        key: "a".into(),
                        space: Some(SpaceProto::from(&DynSpace::from(Discrete::new(2).unwrap()))),
                    },
                ],
            })),
        };
        assert!(matches!(
            DynSpace::try_from(duplicate),
            Err(BridgeError::MalformedSpace(_))
        ));

        assert!(matches!(
            DynSpace::try_from(SpaceProto { kind: None }),
            Err(BridgeError::MalformedSpace(_))
        ));
    }

    #[test]
    fn test_value_proto_preserves_float_bits() {
        let value = WireValue::Tuple(vec![
            WireValue::Box(vec![-0.0, f64::MAX, 1e-310]),
            WireValue::Dict(vec![("k".into(), WireValue::MultiBinary(vec![true, false]))]),
        ]);
        let bytes = ValueProto::from(value.clone()).encode_to_vec();
        let decoded = WireValue::try_from(parse::<ValueProto>(&bytes).unwrap()).unwrap();
        match (&decoded, &value) {
            (WireValue::Tuple(a), WireValue::Tuple(b)) => match (&a[0], &b[0]) {
                (WireValue::Box(x), WireValue::Box(y)) => {
                    let xb: Vec<u64> = x.iter().map(|v| v.to_bits()).collect();
                    let yb: Vec<u64> = y.iter().map(|v| v.to_bits()).collect();
                    assert_eq!(xb, yb);
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_garbage_is_framing_error() {
        assert!(matches!(
            parse::<RequestProto>(&[0xff, 0xff, 0xff]),
            Err(BridgeError::Framing(_))
        ));
    }

    #[test]
    fn test_oversized_descriptors_rejected() {
        let huge_box = SpaceProto {
            kind: Some(space_proto::Kind::Box(BoxSpaceProto {
                low: vec![],
                high: vec![],
                shape: vec![1 << 32; 3],
            })),
        };
        let bits = |n: u64| SpaceProto {
            kind: Some(space_proto::Kind::MultiBinary(MultiBinarySpaceProto { n })),
        };
        let pair = |n: u64| SpaceProto {
            kind: Some(space_proto::Kind::Tuple(TupleSpaceProto {
                items: vec![bits(n), bits(n)],
            })),
        };
        let limit = crate::spaces::MAX_FLAT_SIZE as u64;

        for proto in [huge_box, pair(u64::MAX), pair(limit)] {
            let bytes = proto.encode_to_vec();
            assert!(matches!(
                DynSpace::try_from(parse::<SpaceProto>(&bytes).unwrap()),
                Err(BridgeError::MalformedSpace(_))
            ));
        }
        assert!(DynSpace::try_from(pair(limit / 2)).is_ok());
    }
}
