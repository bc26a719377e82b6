//! Observation and action space types.
//!
//! Provides Gymnasium-compatible space definitions. A [`DynSpace`] is declared
//! by the simulation at handshake time and fixes the shape of every value
//! exchanged for that role until the session ends.

mod r#box;
mod dict;
mod discrete;
mod multi_binary;
mod multi_discrete;
mod tuple;

pub use dict::Dict;
pub use discrete::Discrete;
pub use multi_binary::MultiBinary;
pub use multi_discrete::MultiDiscrete;
pub use r#box::Box;
pub use tuple::Tuple;

use crate::env::NativeValue;
use crate::{BridgeError, Result};
use rand::Rng;
use std::fmt;

/// Upper bound on the scalar slots a single space may declare. A wire value
/// spends at least one byte per slot, and no frame exceeds `u32::MAX` bytes.
pub const MAX_FLAT_SIZE: usize = u32::MAX as usize;

/// Element count of `shape`, rejecting overflow and anything past
/// [`MAX_FLAT_SIZE`]
pub(crate) fn checked_product(shape: &[usize]) -> Result<usize> {
    shape
        .iter()
        .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
        .filter(|&n| n <= MAX_FLAT_SIZE)
        .ok_or_else(|| {
            BridgeError::MalformedSpace(format!("shape {:?} has too many elements", shape))
        })
}

/// Total slots across sub-spaces, with the same limit as [`checked_product`]
pub(crate) fn checked_sum<'a>(spaces: impl IntoIterator<Item = &'a DynSpace>) -> Result<usize> {
    spaces
        .into_iter()
        .try_fold(0usize, |acc, s| acc.checked_add(s.flat_size()))
        .filter(|&n| n <= MAX_FLAT_SIZE)
        .ok_or_else(|| BridgeError::MalformedSpace("composite space has too many slots".into()))
}

/// Trait for observation and action spaces
pub trait Space: Clone + Send + Sync {
    /// The type of samples from this space
    type Sample;

    /// Sample a random element from this space
    fn sample<R: Rng>(&self, rng: &mut R) -> Self::Sample;

    /// Check if a value is contained in this space
    fn contains(&self, value: &Self::Sample) -> bool;

    /// Get the shape of samples from this space
    fn shape(&self) -> &[usize];

    /// Get the total number of elements in a sample
    fn num_elements(&self) -> usize {
        self.shape().iter().product()
    }
}

/// Enum for dynamic space types
#[derive(Clone, Debug, PartialEq)]
pub enum DynSpace {
    Box(Box),
    Discrete(Discrete),
    MultiDiscrete(MultiDiscrete),
    MultiBinary(MultiBinary),
    Tuple(Tuple),
    Dict(Dict),
}

impl DynSpace {
    /// Variant name, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            DynSpace::Box(_) => "Box",
            DynSpace::Discrete(_) => "Discrete",
            DynSpace::MultiDiscrete(_) => "MultiDiscrete",
            DynSpace::MultiBinary(_) => "MultiBinary",
            DynSpace::Tuple(_) => "Tuple",
            DynSpace::Dict(_) => "Dict",
        }
    }

    /// Get the shape of this space
    pub fn shape(&self) -> &[usize] {
        match self {
            DynSpace::Box(s) => s.shape(),
            DynSpace::Discrete(s) => s.shape(),
            DynSpace::MultiDiscrete(s) => s.shape(),
            DynSpace::MultiBinary(s) => s.shape(),
            DynSpace::Tuple(s) => s.shape(),
            DynSpace::Dict(s) => s.shape(),
        }
    }

    /// Number of scalar slots in a flattened sample
    pub fn flat_size(&self) -> usize {
        self.shape().iter().product()
    }

    /// Sample from this space
    pub fn sample<R: Rng>(&self, rng: &mut R) -> NativeValue {
        match self {
            DynSpace::Box(s) => NativeValue::Array(s.sample(rng)),
            DynSpace::Discrete(s) => NativeValue::Discrete(s.sample(rng)),
            DynSpace::MultiDiscrete(s) => NativeValue::MultiDiscrete(s.sample(rng)),
            DynSpace::MultiBinary(s) => NativeValue::MultiBinary(s.sample(rng)),
            DynSpace::Tuple(s) => NativeValue::Tuple(s.sample(rng)),
            DynSpace::Dict(s) => NativeValue::Dict(s.sample(rng)),
        }
    }

    /// Check if this space contains the value
    pub fn contains(&self, value: &NativeValue) -> bool {
        match (self, value) {
            (DynSpace::Box(s), NativeValue::Array(v)) => s.contains(v),
            (DynSpace::Discrete(s), NativeValue::Discrete(v)) => s.contains(v),
            (DynSpace::MultiDiscrete(s), NativeValue::MultiDiscrete(v)) => s.contains(v),
            (DynSpace::MultiBinary(s), NativeValue::MultiBinary(v)) => s.contains(v),
            (DynSpace::Tuple(s), NativeValue::Tuple(v)) => s.contains(v),
            (DynSpace::Dict(s), NativeValue::Dict(v)) => s.contains(v),
            _ => false,
        }
    }
}

impl From<Box> for DynSpace {
    fn from(space: Box) -> Self {
        DynSpace::Box(space)
    }
}

impl From<Discrete> for DynSpace {
    fn from(space: Discrete) -> Self {
        DynSpace::Discrete(space)
    }
}

impl From<MultiDiscrete> for DynSpace {
    fn from(space: MultiDiscrete) -> Self {
        DynSpace::MultiDiscrete(space)
    }
}

impl From<MultiBinary> for DynSpace {
    fn from(space: MultiBinary) -> Self {
        DynSpace::MultiBinary(space)
    }
}

impl From<Tuple> for DynSpace {
    fn from(space: Tuple) -> Self {
        DynSpace::Tuple(space)
    }
}

impl From<Dict> for DynSpace {
    fn from(space: Dict) -> Self {
        DynSpace::Dict(space)
    }
}

impl fmt::Display for DynSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DynSpace::Box(s) => {
                let low: Vec<f64> = s.low().iter().copied().collect();
                let high: Vec<f64> = s.high().iter().copied().collect();
                write!(f, "Box({:?}, {:?}, {:?})", low, high, s.shape())
            }
            DynSpace::Discrete(s) => write!(f, "Discrete({})", s.n()),
            DynSpace::MultiDiscrete(s) => write!(f, "MultiDiscrete({:?})", s.nvec()),
            DynSpace::MultiBinary(s) => write!(f, "MultiBinary({})", s.n()),
            DynSpace::Tuple(s) => {
                write!(f, "Tuple(")?;
                for (i, child) in s.spaces().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", child)?;
                }
                write!(f, ")")
            }
            DynSpace::Dict(s) => {
                write!(f, "Dict(")?;
                for (i, (key, child)) in s.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, child)?;
                }
                write!(f, ")")
            }
        }
    }
}
