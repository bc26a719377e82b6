//! Tuple observation/action space

use super::{checked_sum, DynSpace, Space};
use crate::env::NativeValue;
use crate::Result;
use rand::Rng;

/// Tuple space containing an ordered list of sub-spaces
#[derive(Clone, Debug, PartialEq)]
pub struct Tuple {
    spaces: Vec<DynSpace>,
    /// Cached total shape
    shape: Vec<usize>,
}

impl Tuple {
    /// Create a new tuple space
    pub fn new(spaces: Vec<DynSpace>) -> Result<Self> {
        let total = checked_sum(&spaces)?;
        Ok(Self {
            spaces,
            shape: vec![total],
        })
    }

    /// Ordered sub-spaces
    pub fn spaces(&self) -> &[DynSpace] {
        &self.spaces
    }

    pub fn len(&self) -> usize {
        self.spaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spaces.is_empty()
    }
}

impl Space for Tuple {
    type Sample = Vec<NativeValue>;

    fn sample<R: Rng>(&self, rng: &mut R) -> Self::Sample {
        self.spaces.iter().map(|s| s.sample(rng)).collect()
    }

    fn contains(&self, value: &Self::Sample) -> bool {
        value.len() == self.spaces.len()
            && value.iter().zip(self.spaces.iter()).all(|(v, s)| s.contains(v))
    }

    fn shape(&self) -> &[usize] {
        &self.shape
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spaces::{Box as BoxSpace, Discrete, MultiBinary, MAX_FLAT_SIZE};
    use crate::BridgeError;

    #[test]
    fn test_tuple_creation() {
        let tuple = Tuple::new(vec![
            DynSpace::Discrete(Discrete::new(2).unwrap()),
            DynSpace::Box(BoxSpace::unit(&[2])),
        ])
        .unwrap();
        assert_eq!(tuple.shape(), &[3]); // 1 (discrete) + 2 (box)
        assert_eq!(tuple.len(), 2);
    }

    #[test]
    fn test_tuple_contains_checks_arity() {
        let tuple = Tuple::new(vec![DynSpace::Discrete(Discrete::new(2).unwrap())]).unwrap();
        assert!(tuple.contains(&vec![NativeValue::Discrete(1)]));
        assert!(!tuple.contains(&vec![NativeValue::Discrete(2)]));
        assert!(!tuple.contains(&vec![]));
    }

    #[test]
    fn test_tuple_slot_total_is_bounded() {
        let wide = || DynSpace::MultiBinary(MultiBinary::new(MAX_FLAT_SIZE as u64).unwrap());
        assert!(Tuple::new(vec![wide()]).is_ok());
        assert!(matches!(
            Tuple::new(vec![wide(), wide()]),
            Err(BridgeError::MalformedSpace(_))
        ));
    }
}
