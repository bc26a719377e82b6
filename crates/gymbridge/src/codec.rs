//! Value codec between agent-facing values and wire values.
//!
//! [`encode`] and [`decode`] walk a [`DynSpace`] and a value together and
//! reject any disagreement in variant, cardinality, key set or range. Nothing
//! is clamped or converted lossily, so `decode(s, encode(s, x)?)? == x` holds
//! bit for bit for every `x` contained in `s`.
//!
//! Errors name the offending element with a path rooted at `$`, e.g.
//! `$.pos[1]` for the second element of the `pos` entry of a Dict.

use crate::env::NativeValue;
use crate::spaces::{Box as BoxSpace, Dict, DynSpace, MultiBinary, MultiDiscrete, Space};
use crate::{BridgeError, Result};
use ndarray::{ArrayD, IxDyn};
use std::collections::{HashMap, HashSet};
use std::fmt::Write;

/// Value as carried on the wire, shaped by a negotiated space
#[derive(Clone, Debug, PartialEq)]
pub enum WireValue {
    /// Box elements in row-major order
    Box(Vec<f64>),
    Discrete(u64),
    MultiDiscrete(Vec<u64>),
    MultiBinary(Vec<bool>),
    Tuple(Vec<WireValue>),
    /// Dict entries; the encoder emits them in the space's key order
    Dict(Vec<(String, WireValue)>),
}

impl WireValue {
    pub fn kind(&self) -> &'static str {
        match self {
            WireValue::Box(_) => "Box",
            WireValue::Discrete(_) => "Discrete",
            WireValue::MultiDiscrete(_) => "MultiDiscrete",
            WireValue::MultiBinary(_) => "MultiBinary",
            WireValue::Tuple(_) => "Tuple",
            WireValue::Dict(_) => "Dict",
        }
    }
}

/// Encode an agent-facing value against `space`
pub fn encode(space: &DynSpace, value: &NativeValue) -> Result<WireValue> {
    let mut path = String::from("$");
    encode_at(space, value, &mut path)
}

/// Decode a wire value against `space`
pub fn decode(space: &DynSpace, value: WireValue) -> Result<NativeValue> {
    let mut path = String::from("$");
    decode_at(space, value, &mut path)
}

fn encode_at(space: &DynSpace, value: &NativeValue, path: &mut String) -> Result<WireValue> {
    match (space, value) {
        (DynSpace::Box(s), NativeValue::Array(arr)) => {
            if arr.shape() != s.shape() {
                return Err(shape_mismatch(
                    path,
                    format!("Box of shape {:?}", s.shape()),
                    format!("array of shape {:?}", arr.shape()),
                ));
            }
            check_box_bounds(s, arr.iter().copied(), path)?;
            Ok(WireValue::Box(arr.iter().copied().collect()))
        }
        (DynSpace::Discrete(s), NativeValue::Discrete(v)) => {
            check_index(*v, s.n(), path)?;
            Ok(WireValue::Discrete(*v))
        }
        (DynSpace::MultiDiscrete(s), NativeValue::MultiDiscrete(values)) => {
            check_multi_discrete(s, values, path)?;
            Ok(WireValue::MultiDiscrete(values.clone()))
        }
        (DynSpace::MultiBinary(s), NativeValue::MultiBinary(bits)) => {
            check_multi_binary(s, bits.len(), path)?;
            Ok(WireValue::MultiBinary(bits.clone()))
        }
        (DynSpace::Tuple(s), NativeValue::Tuple(items)) => {
            check_arity(s.len(), items.len(), path)?;
            let mut encoded = Vec::with_capacity(items.len());
            for (i, (child, item)) in s.spaces().iter().zip(items).enumerate() {
                let mark = push_index(path, i);
                encoded.push(encode_at(child, item, path)?);
                path.truncate(mark);
            }
            Ok(WireValue::Tuple(encoded))
        }
        (DynSpace::Dict(s), NativeValue::Dict(items)) => {
            check_key_set(s, items.keys().map(String::as_str), path)?;
            let mut encoded = Vec::with_capacity(s.len());
            for (key, child) in s.iter() {
                let item = items.get(key).ok_or_else(|| BridgeError::MissingKey {
                    path: path.clone(),
                    key: key.clone(),
                })?;
                let mark = push_key(path, key);
                encoded.push((key.clone(), encode_at(child, item, path)?));
                path.truncate(mark);
            }
            Ok(WireValue::Dict(encoded))
        }
        (space, value) => Err(shape_mismatch(path, space.kind(), value.kind())),
    }
}

fn decode_at(space: &DynSpace, value: WireValue, path: &mut String) -> Result<NativeValue> {
    match (space, value) {
        (DynSpace::Box(s), WireValue::Box(values)) => {
            if values.len() != s.num_elements() {
                return Err(shape_mismatch(
                    path,
                    format!("{} Box elements", s.num_elements()),
                    format!("{} elements", values.len()),
                ));
            }
            check_box_bounds(s, values.iter().copied(), path)?;
            let arr = ArrayD::from_shape_vec(IxDyn(s.shape()), values)
                .map_err(|e| shape_mismatch(path, format!("Box of shape {:?}", s.shape()), e))?;
            Ok(NativeValue::Array(arr))
        }
        (DynSpace::Discrete(s), WireValue::Discrete(v)) => {
            check_index(v, s.n(), path)?;
            Ok(NativeValue::Discrete(v))
        }
        (DynSpace::MultiDiscrete(s), WireValue::MultiDiscrete(values)) => {
            check_multi_discrete(s, &values, path)?;
            Ok(NativeValue::MultiDiscrete(values))
        }
        (DynSpace::MultiBinary(s), WireValue::MultiBinary(bits)) => {
            check_multi_binary(s, bits.len(), path)?;
            Ok(NativeValue::MultiBinary(bits))
        }
        (DynSpace::Tuple(s), WireValue::Tuple(items)) => {
            check_arity(s.len(), items.len(), path)?;
            let mut decoded = Vec::with_capacity(items.len());
            for (i, (child, item)) in s.spaces().iter().zip(items).enumerate() {
                let mark = push_index(path, i);
                decoded.push(decode_at(child, item, path)?);
                path.truncate(mark);
            }
            Ok(NativeValue::Tuple(decoded))
        }
        (DynSpace::Dict(s), WireValue::Dict(entries)) => {
            let mut by_key: HashMap<String, WireValue> = HashMap::with_capacity(entries.len());
            for (key, item) in entries {
                if by_key.contains_key(&key) {
                    // A repeated key cannot be matched to a single entry of the space.
                    return Err(BridgeError::UnexpectedKey {
                        path: path.clone(),
                        key,
                    });
                }
                by_key.insert(key, item);
            }
            check_key_set(s, by_key.keys().map(String::as_str), path)?;
            let mut decoded = HashMap::with_capacity(s.len());
            for (key, child) in s.iter() {
                let item = by_key.remove(key).ok_or_else(|| BridgeError::MissingKey {
                    path: path.clone(),
                    key: key.clone(),
                })?;
                let mark = push_key(path, key);
                decoded.insert(key.clone(), decode_at(child, item, path)?);
                path.truncate(mark);
            }
            Ok(NativeValue::Dict(decoded))
        }
        (space, value) => Err(shape_mismatch(path, space.kind(), value.kind())),
    }
}

fn shape_mismatch(
    path: &str,
    expected: impl ToString,
    actual: impl ToString,
) -> BridgeError {
    BridgeError::ShapeMismatch {
        path: path.to_string(),
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}

fn push_index(path: &mut String, index: usize) -> usize {
    let mark = path.len();
    let _ = write!(path, "[{}]", index);
    mark
}

fn push_key(path: &mut String, key: &str) -> usize {
    let mark = path.len();
    path.push('.');
    path.push_str(key);
    mark
}

fn check_box_bounds(
    space: &BoxSpace,
    values: impl Iterator<Item = f64>,
    path: &str,
) -> Result<()> {
    for (i, (v, (l, h))) in values.zip(space.bounds()).enumerate() {
        // NaN fails both comparisons and is rejected here.
        if !(v >= l && v <= h) {
            return Err(BridgeError::OutOfRange {
                path: format!("{}[{}]", path, i),
                value: v.to_string(),
                bound: format!("[{}, {}]", l, h),
            });
        }
    }
    Ok(())
}

fn check_index(value: u64, n: u64, path: &str) -> Result<()> {
    if value >= n {
        return Err(BridgeError::OutOfRange {
            path: path.to_string(),
            value: value.to_string(),
            bound: format!("[0, {})", n),
        });
    }
    Ok(())
}

fn check_multi_discrete(space: &MultiDiscrete, values: &[u64], path: &str) -> Result<()> {
    if values.len() != space.ndim() {
        return Err(shape_mismatch(
            path,
            format!("{} MultiDiscrete slots", space.ndim()),
            format!("{} values", values.len()),
        ));
    }
    for (i, (&v, &n)) in values.iter().zip(space.nvec()).enumerate() {
        check_index(v, n, &format!("{}[{}]", path, i))?;
    }
    Ok(())
}

fn check_multi_binary(space: &MultiBinary, len: usize, path: &str) -> Result<()> {
    if len as u64 != space.n() {
        return Err(shape_mismatch(
            path,
            format!("{} MultiBinary bits", space.n()),
            format!("{} bits", len),
        ));
    }
    Ok(())
}

fn check_arity(expected: usize, actual: usize, path: &str) -> Result<()> {
    if expected != actual {
        return Err(shape_mismatch(
            path,
            format!("Tuple of {} items", expected),
            format!("{} items", actual),
        ));
    }
    Ok(())
}

/// Missing keys are reported before unexpected ones.
fn check_key_set<'a>(
    space: &Dict,
    keys: impl Iterator<Item = &'a str>,
    path: &str,
) -> Result<()> {
    let present: HashSet<&str> = keys.collect();
    if let Some(missing) = space.keys().find(|k| !present.contains(k.as_str())) {
        return Err(BridgeError::MissingKey {
            path: path.to_string(),
            key: missing.clone(),
        });
    }
    let mut unexpected: Vec<&str> = present
        .into_iter()
        .filter(|k| space.get(k).is_none())
        .collect();
    unexpected.sort_unstable();
    if let Some(key) = unexpected.first() {
        return Err(BridgeError::UnexpectedKey {
            path: path.to_string(),
            key: key.to_string(),
        });
    }
    Ok(())
}
