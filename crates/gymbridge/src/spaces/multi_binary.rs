//! MultiBinary observation/action space

use super::{Space, MAX_FLAT_SIZE};
use crate::{BridgeError, Result};
use rand::Rng;

/// n independent bits
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultiBinary {
    n: u64,
    shape: Vec<usize>,
}

impl MultiBinary {
    pub fn new(n: u64) -> Result<Self> {
        let len = usize::try_from(n)
            .ok()
            .filter(|&len| len <= MAX_FLAT_SIZE)
            .ok_or_else(|| BridgeError::MalformedSpace(format!("MultiBinary({}) is too large", n)))?;
        Ok(Self {
            n,
            shape: vec![len],
        })
    }

    /// Number of bits
    pub fn n(&self) -> u64 {
        self.n
    }
}

impl Space for MultiBinary {
    type Sample = Vec<bool>;

    fn sample<R: Rng>(&self, rng: &mut R) -> Self::Sample {
        (0..self.shape[0]).map(|_| rng.gen::<bool>()).collect()
    }

    fn contains(&self, value: &Self::Sample) -> bool {
        value.len() == self.shape[0]
    }

    fn shape(&self) -> &[usize] {
        &self.shape
    }
}
