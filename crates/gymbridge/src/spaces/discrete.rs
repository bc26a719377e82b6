//! Discrete space

use super::Space;
use crate::{BridgeError, Result};
use rand::Rng;

/// `n` choices, encoded on the wire as a single index in `0..n`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Discrete {
    n: u64,
    shape: Vec<usize>,
}

impl Discrete {
    pub fn new(n: u64) -> Result<Self> {
        if n == 0 {
            return Err(BridgeError::MalformedSpace("Discrete(0) has no choices".into()));
        }
        Ok(Self { n, shape: vec![1] })
    }

    /// Number of choices
    pub fn n(&self) -> u64 {
        self.n
    }
}

impl Space for Discrete {
    type Sample = u64;

    fn sample<R: Rng>(&self, rng: &mut R) -> u64 {
        rng.gen_range(0..self.n)
    }

    fn contains(&self, index: &u64) -> bool {
        *index < self.n
    }

    fn shape(&self) -> &[usize] {
        &self.shape
    }
}
