//! Bridge configuration.

use crate::protocol::DEFAULT_MAX_FRAME_LEN;
use crate::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration shared by the agent and simulation sides of a bridge
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    // Network
    /// Address the agent listens on
    pub bind_addr: String,
    /// Port the agent listens on (`None` picks a free port)
    pub port: Option<u16>,

    // Limits
    /// Deadline in seconds for every receive and for accepting a connection
    pub timeout_secs: Option<f64>,
    /// Largest accepted payload in bytes
    pub max_frame_len: usize,

    // Random seed for placeholder actions and shutdown observations
    pub seed: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: None,
            timeout_secs: Some(3.0),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            seed: 0,
        }
    }
}

impl BridgeConfig {
    /// Set the listening address
    pub fn with_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    /// Set the listening port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the receive deadline; `None` waits forever
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout_secs = timeout.map(|t| t.as_secs_f64());
        self
    }

    /// Set the payload size limit
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    /// Set the random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Receive deadline as a `Duration`
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(Duration::from_secs_f64)
    }

    /// `host:port` to listen on, with port 0 when unset
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port.unwrap_or(0))
    }

    pub fn validate(&self) -> Result<()> {
        if self.bind_addr.is_empty() {
            return Err(BridgeError::InvalidConfig("bind_addr is empty".into()));
        }
        if let Some(secs) = self.timeout_secs {
            if !secs.is_finite() || secs <= 0.0 {
                return Err(BridgeError::InvalidConfig(format!(
                    "timeout_secs must be a positive number, got {}",
                    secs
                )));
            }
        }
        if self.max_frame_len == 0 || self.max_frame_len > u32::MAX as usize {
            return Err(BridgeError::InvalidConfig(format!(
                "max_frame_len must be in 1..={}, got {}",
                u32::MAX,
                self.max_frame_len
            )));
        }
        Ok(())
    }
}
