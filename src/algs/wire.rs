//! Fixed little-endian wire types for index exchanges.
//!
//! Restriction values and counts cross rank boundaries as `u64`/`u32` records
//! stored pre-LE with `.to_le()` and decoded with `.from_le()`. Structured
//! payloads (whole level meshes, boundary maps) use `bincode` instead; see
//! [`encode_serde`] and [`decode_serde`].

use crate::gamg_error::GamgError;
use bytemuck::{Pod, Zeroable};
use serde::Serialize;
use serde::de::DeserializeOwned;
use static_assertions::const_assert_eq;
use std::mem::size_of;

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_mut<T: Pod>(v: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

pub fn expect_exact_len(actual: usize, expected: usize) -> Result<(), String> {
    if actual == expected {
        Ok(())
    } else {
        Err(format!("expected {expected} bytes, got {actual}"))
    }
}

/// Record count carried ahead of a variable-size payload.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireCount {
    pub n_le: u32,
}

impl WireCount {
    /// Fails when `n` does not fit the 32-bit header.
    pub fn new(n: usize) -> Result<Self, GamgError> {
        let n = u32::try_from(n).map_err(|_| {
            GamgError::Wire(format!("payload of {n} bytes exceeds the u32 size header"))
        })?;
        Ok(Self { n_le: n.to_le() })
    }
    pub fn get(&self) -> usize {
        u32::from_le(self.n_le) as usize
    }
}

/// A cell, face or rank index carried on the wire.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireIndex {
    pub id_le: u64,
}

impl WireIndex {
    pub fn of(id: usize) -> Self {
        Self {
            id_le: (id as u64).to_le(),
        }
    }
    pub fn get(&self) -> usize {
        u64::from_le(self.id_le) as usize
    }
}

const_assert_eq!(size_of::<WireCount>(), 4);
const_assert_eq!(size_of::<WireIndex>(), 8);

/// Pack indices into wire records.
pub fn encode_indices(values: &[usize]) -> Vec<WireIndex> {
    values.iter().map(|&v| WireIndex::of(v)).collect()
}

/// Decode a received byte buffer of `expected` indices.
///
/// `peer` only feeds the error message.
pub fn decode_indices(bytes: &[u8], expected: usize, peer: usize) -> Result<Vec<usize>, GamgError> {
    let want = expected * size_of::<WireIndex>();
    if bytes.len() != want {
        return Err(GamgError::CommSizeMismatch {
            rank: peer,
            expected,
            found: bytes.len() / size_of::<WireIndex>(),
        });
    }
    let mut out = vec![WireIndex::zeroed(); expected];
    cast_slice_mut(&mut out).copy_from_slice(bytes);
    Ok(out.iter().map(WireIndex::get).collect())
}

pub fn encode_serde<T: Serialize>(value: &T) -> Result<Vec<u8>, GamgError> {
    Ok(bincode::serialize(value)?)
}

pub fn decode_serde<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, GamgError> {
    Ok(bincode::deserialize(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_roundtrip_through_bytes() {
        let wire = encode_indices(&[3, 0, 17]);
        let bytes = cast_slice(&wire).to_vec();
        assert_eq!(decode_indices(&bytes, 3, 1).unwrap(), vec![3, 0, 17]);
    }

    #[test]
    fn short_buffer_is_size_mismatch() {
        let wire = encode_indices(&[3, 0]);
        let bytes = cast_slice(&wire).to_vec();
        let err = decode_indices(&bytes, 3, 4).unwrap_err();
        assert_eq!(
            err,
            GamgError::CommSizeMismatch {
                rank: 4,
                expected: 3,
                found: 2
            }
        );
    }

    #[test]
    fn count_is_little_endian() {
        let c = WireCount::new(0x0102).unwrap();
        assert_eq!(cast_slice(std::slice::from_ref(&c)), &[0x02, 0x01, 0, 0]);
        assert_eq!(c.get(), 0x0102);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn oversized_count_is_rejected() {
        assert!(matches!(
            WireCount::new(u32::MAX as usize + 1),
            Err(GamgError::Wire(_))
        ));
        assert_eq!(WireCount::new(u32::MAX as usize).unwrap().get(), u32::MAX as usize);
    }
}
