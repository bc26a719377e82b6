//! Box (continuous) observation/action space

use super::{checked_product, Space};
use crate::{BridgeError, Result};
use ndarray::{ArrayD, IxDyn};
use rand::Rng;
use rand_distr::{Distribution, Exp1, StandardNormal, Uniform};

/// Box space for continuous values with element-wise inclusive bounds.
///
/// Bounds may be infinite. Equality is structural on low, high and shape.
#[derive(Clone, Debug, PartialEq)]
pub struct Box {
    low: ArrayD<f64>,
    high: ArrayD<f64>,
    shape: Vec<usize>,
}

impl Box {
    /// Create a new box space with given bounds
    pub fn new(low: ArrayD<f64>, high: ArrayD<f64>) -> Result<Self> {
        if low.shape() != high.shape() {
            return Err(BridgeError::MalformedSpace(format!(
                "low has shape {:?} but high has shape {:?}",
                low.shape(),
                high.shape()
            )));
        }
        for (i, (&l, &h)) in low.iter().zip(high.iter()).enumerate() {
            if l.is_nan() || h.is_nan() {
                return Err(BridgeError::MalformedSpace(format!(
                    "bound {} is NaN",
                    i
                )));
            }
            if l.is_finite() && h.is_finite() && l > h {
                return Err(BridgeError::MalformedSpace(format!(
                    "low[{}] = {} exceeds high[{}] = {}",
                    i, l, i, h
                )));
            }
        }
        let shape = low.shape().to_vec();
        checked_product(&shape)?;
        Ok(Self { low, high, shape })
    }

    /// Create a box space from flat bound vectors laid out in row-major order
    pub fn from_parts(low: Vec<f64>, high: Vec<f64>, shape: Vec<usize>) -> Result<Self> {
        let expected = checked_product(&shape)?;
        if low.len() != expected || high.len() != expected {
            return Err(BridgeError::MalformedSpace(format!(
                "shape {:?} needs {} bounds, got {} low and {} high",
                shape,
                expected,
                low.len(),
                high.len()
            )));
        }
        let to_array = |values: Vec<f64>| {
            ArrayD::from_shape_vec(IxDyn(&shape), values)
                .map_err(|e| BridgeError::MalformedSpace(e.to_string()))
        };
        Self::new(to_array(low)?, to_array(high)?)
    }

    /// Create a box space with uniform bounds
    pub fn uniform(shape: &[usize], low: f64, high: f64) -> Result<Self> {
        checked_product(shape)?;
        let low_arr = ArrayD::from_elem(IxDyn(shape), low);
        let high_arr = ArrayD::from_elem(IxDyn(shape), high);
        Self::new(low_arr, high_arr)
    }

    /// Create a box space from -inf to +inf (unbounded)
    pub fn unbounded(shape: &[usize]) -> Self {
        Self::filled(shape, f64::NEG_INFINITY, f64::INFINITY)
    }

    /// Create a unit box [0, 1] for all elements
    pub fn unit(shape: &[usize]) -> Self {
        Self::filled(shape, 0.0, 1.0)
    }

    /// Create a symmetric box [-1, 1] for all elements
    pub fn symmetric(shape: &[usize]) -> Self {
        Self::filled(shape, -1.0, 1.0)
    }

    fn filled(shape: &[usize], low: f64, high: f64) -> Self {
        Self {
            low: ArrayD::from_elem(IxDyn(shape), low),
            high: ArrayD::from_elem(IxDyn(shape), high),
            shape: shape.to_vec(),
        }
    }

    /// Lower bounds
    pub fn low(&self) -> &ArrayD<f64> {
        &self.low
    }

    /// Upper bounds
    pub fn high(&self) -> &ArrayD<f64> {
        &self.high
    }

    /// Iterate `(low, high)` pairs in row-major order
    pub fn bounds(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.low.iter().copied().zip(self.high.iter().copied())
    }

    /// Whether `value` lies within the bounds of element `index` (inclusive)
    pub fn element_contains(&self, index: usize, value: f64) -> bool {
        match (self.low.iter().nth(index), self.high.iter().nth(index)) {
            (Some(&l), Some(&h)) => value >= l && value <= h,
            _ => false,
        }
    }
}

/// Sample one element. Unbounded dimensions draw from a standard normal,
/// half-bounded ones from a shifted exponential, as gym does.
fn sample_element<R: Rng + ?Sized>(rng: &mut R, low: f64, high: f64) -> f64 {
    match (low.is_finite(), high.is_finite()) {
        (true, true) if low == high => low,
        (true, true) if (high - low).is_finite() => Uniform::new_inclusive(low, high).sample(rng),
        (true, true) => {
            // Width overflows f64; step through the midpoint in halves
            let half = high / 2.0 - low / 2.0;
            let u: f64 = rng.gen();
            (low + half * u + half * u).clamp(low, high)
        }
        (true, false) if high == f64::INFINITY => {
            let offset: f64 = Exp1.sample(rng);
            low + offset
        }
        (false, true) if low == f64::NEG_INFINITY => {
            let offset: f64 = Exp1.sample(rng);
            high - offset
        }
        (false, false) if low == f64::NEG_INFINITY && high == f64::INFINITY => {
            StandardNormal.sample(rng)
        }
        // Degenerate infinite bounds (e.g. low = +inf) have no interior.
        _ => low,
    }
}

impl Space for Box {
    type Sample = ArrayD<f64>;

    fn sample<R: Rng>(&self, rng: &mut R) -> Self::Sample {
        let mut result = ArrayD::zeros(IxDyn(&self.shape));
        for ((&l, &h), r) in self.low.iter().zip(self.high.iter()).zip(result.iter_mut()) {
            *r = sample_element(rng, l, h);
        }
        result
    }

    fn contains(&self, value: &Self::Sample) -> bool {
        if value.shape() != self.low.shape() {
            return false;
        }
        value
            .iter()
            .zip(self.bounds())
            .all(|(&v, (l, h))| v >= l && v <= h)
    }

    fn shape(&self) -> &[usize] {
        &self.shape
    }
}
