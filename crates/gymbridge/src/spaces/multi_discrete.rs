//! MultiDiscrete space

use super::Space;
use crate::{BridgeError, Result};
use rand::Rng;

/// One independent choice per slot; slot `i` takes values in `0..nvec[i]`.
///
/// An empty `nvec` is a valid space whose only value is the empty vector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultiDiscrete {
    nvec: Vec<u64>,
    shape: Vec<usize>,
}

impl MultiDiscrete {
    pub fn new(nvec: Vec<u64>) -> Result<Self> {
        if let Some(slot) = nvec.iter().position(|&n| n == 0) {
            return Err(BridgeError::MalformedSpace(format!(
                "MultiDiscrete slot {} has no choices",
                slot
            )));
        }
        let shape = vec![nvec.len()];
        Ok(Self { nvec, shape })
    }

    /// Choices per slot
    pub fn nvec(&self) -> &[u64] {
        &self.nvec
    }

    /// Number of slots
    pub fn ndim(&self) -> usize {
        self.nvec.len()
    }
}

impl Space for MultiDiscrete {
    type Sample = Vec<u64>;

    fn sample<R: Rng>(&self, rng: &mut R) -> Vec<u64> {
        self.nvec.iter().map(|&n| rng.gen_range(0..n)).collect()
    }

    fn contains(&self, value: &Vec<u64>) -> bool {
        value.len() == self.nvec.len() && value.iter().zip(&self.nvec).all(|(v, n)| v < n)
    }

    fn shape(&self) -> &[usize] {
        &self.shape
    }
}
