//! # gymbridge
//!
//! A typed request/reply bridge between a turn-based simulation process and a
//! reinforcement-learning agent loop.
//!
//! ## Overview
//!
//! gymbridge provides:
//! - Recursive observation/action space descriptors (`spaces`)
//! - A value codec that checks agent-facing values against a negotiated space (`codec`)
//! - A protobuf wire protocol with length-prefixed framing (`protocol`)
//! - Message channels over memory and TCP (`transport`)
//! - The agent-side session state machine (`session`) and its reset/step facade (`env`)
//! - The simulation-side endpoint (`sim`)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gymbridge::prelude::*;
//!
//! let config = BridgeConfig::default().with_port(5555);
//! let env = RemoteEnv::with_connector(TcpAcceptor::bind(&config)?, &config);
//!
//! let (obs, _) = env.reset()?;
//! let action = NativeValue::Discrete(1);
//! let result = env.step(&action)?;
//! ```

pub mod codec;
pub mod config;
pub mod env;
pub mod protocol;
pub mod session;
pub mod sim;
pub mod spaces;
pub mod transport;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::codec::{decode, encode, WireValue};
    pub use crate::config::BridgeConfig;
    pub use crate::env::{
        Action, Env, EnvInfo, EpisodeStats, NativeValue, Observation, RemoteEnv, StepResult,
    };
    pub use crate::session::{Incoming, NegotiatedSpaces, Session, SessionState, StepData};
    pub use crate::sim::SimulationEndpoint;
    pub use crate::spaces::*;
    pub use crate::transport::{
        Channel, Connector, MemoryChannel, MemoryConnector, MemoryDialer, TcpAcceptor, TcpChannel,
    };
    pub use crate::{BridgeError, Result};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

use std::time::Duration;

/// Error types for the library
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Malformed space: {0}")]
    MalformedSpace(String),

    #[error("Shape mismatch at {path}: expected {expected}, got {actual}")]
    ShapeMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("Value out of range at {path}: {value} not in {bound}")]
    OutOfRange {
        path: String,
        value: String,
        bound: String,
    },

    #[error("Missing key at {path}: {key:?}")]
    MissingKey { path: String, key: String },

    #[error("Unexpected key at {path}: {key:?}")]
    UnexpectedKey { path: String, key: String },

    #[error("Framing error: {0}")]
    Framing(String),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Concurrent reset/step on the same session")]
    ConcurrentStepViolation,

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Session terminated")]
    SessionTerminated,

    #[error("Episode in progress: reset() is only valid before the first step or after a terminal step")]
    EpisodeInProgress,

    #[error("reset() must be called before step()")]
    ResetRequired,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether this error ends the session it was raised in.
    ///
    /// Misuse of the facade (`EpisodeInProgress`, `ResetRequired`,
    /// `ConcurrentStepViolation`) and configuration errors leave the session as it was.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            BridgeError::ConcurrentStepViolation
                | BridgeError::EpisodeInProgress
                | BridgeError::ResetRequired
                | BridgeError::InvalidConfig(_)
        )
    }
}

pub type Result<T> = core::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(BridgeError::ChannelClosed.is_fatal());
        assert!(BridgeError::Framing("bad".into()).is_fatal());
        assert!(BridgeError::Timeout(Duration::from_secs(1)).is_fatal());
        assert!(!BridgeError::ConcurrentStepViolation.is_fatal());
        assert!(!BridgeError::ResetRequired.is_fatal());
        assert!(!BridgeError::EpisodeInProgress.is_fatal());
    }

    #[test]
    fn test_error_messages_carry_path() {
        let err = BridgeError::MissingKey {
            path: "$.obs".into(),
            key: "pos".into(),
        };
        assert_eq!(err.to_string(), "Missing key at $.obs: \"pos\"");
    }
}
