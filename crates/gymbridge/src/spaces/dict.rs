//! Dict (dictionary) observation/action space

use super::{checked_sum, DynSpace, Space};
use crate::env::NativeValue;
use crate::{BridgeError, Result};
use rand::Rng;
use std::collections::HashMap;

/// Dictionary space containing named sub-spaces.
///
/// Entries keep their insertion order, which is the order they travel on the
/// wire. Equality and lookup ignore that order.
#[derive(Clone, Debug)]
pub struct Dict {
    entries: Vec<(String, DynSpace)>,
    /// Cached total shape (sum of all sub-space sizes)
    shape: Vec<usize>,
}

impl Dict {
    /// Create a new dict space; keys must be unique
    pub fn new(entries: Vec<(String, DynSpace)>) -> Result<Self> {
        for (i, (key, _)) in entries.iter().enumerate() {
            if entries[..i].iter().any(|(k, _)| k == key) {
                return Err(BridgeError::MalformedSpace(format!(
                    "duplicate Dict key {:?}",
                    key
                )));
            }
        }
        let total = checked_sum(entries.iter().map(|(_, s)| s))?;
        Ok(Self {
            entries,
            shape: vec![total],
        })
    }

    /// Create from a list of (name, space) pairs
    pub fn from_pairs(pairs: Vec<(&str, DynSpace)>) -> Result<Self> {
        Self::new(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    /// Get a sub-space by name
    pub fn get(&self, name: &str) -> Option<&DynSpace> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, s)| s)
    }

    /// Get all space names in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.iter().map(|(k, _)| k)
    }

    /// Iterate entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &DynSpace)> {
        self.entries.iter().map(|(k, s)| (k, s))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PartialEq for Dict {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .all(|(k, s)| other.get(k).is_some_and(|o| o == s))
    }
}

impl Space for Dict {
    type Sample = HashMap<String, NativeValue>;

    fn sample<R: Rng>(&self, rng: &mut R) -> Self::Sample {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.sample(rng)))
            .collect()
    }

    fn contains(&self, value: &Self::Sample) -> bool {
        value.len() == self.entries.len()
            && self
                .entries
                .iter()
                .all(|(k, s)| value.get(k).is_some_and(|v| s.contains(v)))
    }

    fn shape(&self) -> &[usize] {
        &self.shape
    }
}
