//! Rooted collectives built on the point-to-point [`Communicator`].
//!
//! Every collective is two-phase: a [`WireCount`] size header first, then a
//! payload receive of exactly that size. The root is always rank 0 of the
//! communicator passed in (the cluster master on cluster sub-communicators).
//! All functions guarantee that every send/receive handle is drained before
//! returning, even if an error occurs.

use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::algs::wire::{
    WireCount, WireIndex, cast_slice, cast_slice_mut, decode_serde, encode_serde, expect_exact_len,
};
use crate::gamg_error::GamgError;
use bytemuck::{Pod, Zeroable};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::mem::size_of;

const ROOT: usize = 0;

fn size_tag(tag: CommTag) -> u16 {
    tag.as_u16()
}

fn payload_tag(tag: CommTag) -> u16 {
    tag.offset(1).as_u16()
}

/// Gather one byte buffer per rank onto the root.
///
/// Returns `Some(buffers)` indexed by rank on the root and `None` elsewhere.
pub fn gather_bytes<C: Communicator>(
    comm: &C,
    tag: CommTag,
    local: &[u8],
) -> Result<Option<Vec<Vec<u8>>>, GamgError> {
    if comm.rank() != ROOT {
        let count = WireCount::new(local.len())?;
        let sends = [
            comm.isend(ROOT, size_tag(tag), cast_slice(std::slice::from_ref(&count))),
            comm.isend(ROOT, payload_tag(tag), local),
        ];
        for send in sends {
            let _ = send.wait();
        }
        return Ok(None);
    }

    let n = comm.size();
    // 1) post all size receives
    let mut size_recvs = Vec::with_capacity(n.saturating_sub(1));
    for peer in 1..n {
        let mut cnt = WireCount::zeroed();
        let h = comm.irecv(
            peer,
            size_tag(tag),
            cast_slice_mut(std::slice::from_mut(&mut cnt)),
        );
        size_recvs.push((peer, h));
    }

    // 2) wait for all sizes (but do not early-return)
    let mut sizes = vec![local.len(); n];
    let mut maybe_err = None;
    for (peer, h) in size_recvs {
        match h.wait() {
            Some(data) if data.len() == size_of::<WireCount>() => {
                let mut cnt = WireCount::zeroed();
                cast_slice_mut(std::slice::from_mut(&mut cnt)).copy_from_slice(&data);
                sizes[peer] = cnt.get();
            }
            other => {
                if maybe_err.is_none() {
                    maybe_err = Some(GamgError::CommError {
                        neighbor: peer,
                        reason: match other {
                            Some(data) => format!(
                                "expected {} bytes for size header, got {}",
                                size_of::<WireCount>(),
                                data.len()
                            ),
                            None => format!("failed to receive size from rank {peer}"),
                        },
                    });
                }
            }
        }
    }

    // 3) payload receives of exactly the announced size
    let mut payload_recvs = Vec::with_capacity(n.saturating_sub(1));
    for peer in 1..n {
        let mut buf = vec![0u8; sizes[peer]];
        let h = comm.irecv(peer, payload_tag(tag), &mut buf);
        payload_recvs.push((peer, h));
    }
    let mut out = vec![Vec::new(); n];
    out[ROOT] = local.to_vec();
    for (peer, h) in payload_recvs {
        match h.wait() {
            Some(data) => match expect_exact_len(data.len(), sizes[peer]) {
                Ok(()) => out[peer] = data,
                Err(_) if maybe_err.is_none() => {
                    maybe_err = Some(GamgError::CommSizeMismatch {
                        rank: peer,
                        expected: sizes[peer],
                        found: data.len(),
                    });
                }
                Err(_) => {}
            },
            None if maybe_err.is_none() => {
                maybe_err = Some(GamgError::CommError {
                    neighbor: peer,
                    reason: format!("failed to receive payload from rank {peer}"),
                });
            }
            None => {}
        }
    }

    match maybe_err {
        Some(err) => Err(err),
        None => Ok(Some(out)),
    }
}

/// Scatter one byte buffer per rank from the root.
///
/// `parts` is only read on the root and must hold `comm.size()` buffers.
pub fn scatter_bytes<C: Communicator>(
    comm: &C,
    tag: CommTag,
    parts: Option<&[Vec<u8>]>,
) -> Result<Vec<u8>, GamgError> {
    if comm.rank() == ROOT {
        let parts = parts.unwrap_or(&[]);
        if parts.len() != comm.size() {
            return Err(GamgError::CommSizeMismatch {
                rank: ROOT,
                expected: comm.size(),
                found: parts.len(),
            });
        }
        let counts = parts
            .iter()
            .map(|p| WireCount::new(p.len()))
            .collect::<Result<Vec<_>, _>>()?;
        let mut pending = Vec::with_capacity(2 * parts.len());
        for peer in 1..parts.len() {
            pending.push(comm.isend(
                peer,
                size_tag(tag),
                cast_slice(std::slice::from_ref(&counts[peer])),
            ));
            pending.push(comm.isend(peer, payload_tag(tag), &parts[peer]));
        }
        for send in pending {
            let _ = send.wait();
        }
        return Ok(parts[ROOT].clone());
    }

    let mut cnt = WireCount::zeroed();
    let size = comm
        .irecv(
            ROOT,
            size_tag(tag),
            cast_slice_mut(std::slice::from_mut(&mut cnt)),
        )
        .wait()
        .ok_or_else(|| GamgError::CommError {
            neighbor: ROOT,
            reason: "failed to receive scatter size".into(),
        })?;
    expect_exact_len(size.len(), size_of::<WireCount>()).map_err(|reason| {
        GamgError::CommError {
            neighbor: ROOT,
            reason,
        }
    })?;
    cast_slice_mut(std::slice::from_mut(&mut cnt)).copy_from_slice(&size);

    let mut buf = vec![0u8; cnt.get()];
    let data = comm
        .irecv(ROOT, payload_tag(tag), &mut buf)
        .wait()
        .ok_or_else(|| GamgError::CommError {
            neighbor: ROOT,
            reason: "failed to receive scatter payload".into(),
        })?;
    if data.len() != cnt.get() {
        return Err(GamgError::CommSizeMismatch {
            rank: ROOT,
            expected: cnt.get(),
            found: data.len(),
        });
    }
    Ok(data)
}

/// Broadcast the root's buffer to every rank.
pub fn broadcast_bytes<C: Communicator>(
    comm: &C,
    tag: CommTag,
    data: &[u8],
) -> Result<Vec<u8>, GamgError> {
    let parts = (comm.rank() == ROOT).then(|| vec![data.to_vec(); comm.size()]);
    scatter_bytes(comm, tag, parts.as_deref())
}

fn bytes_to_pod<T: Pod>(bytes: &[u8], rank: usize) -> Result<Vec<T>, GamgError> {
    if bytes.len() % size_of::<T>() != 0 {
        return Err(GamgError::CommSizeMismatch {
            rank,
            expected: bytes.len().div_ceil(size_of::<T>()) * size_of::<T>(),
            found: bytes.len(),
        });
    }
    Ok(bytemuck::pod_collect_to_vec(bytes))
}

/// Gather plain-old-data slices onto the root.
pub fn gather_pod<C: Communicator, T: Pod>(
    comm: &C,
    tag: CommTag,
    local: &[T],
) -> Result<Option<Vec<Vec<T>>>, GamgError> {
    match gather_bytes(comm, tag, cast_slice(local))? {
        Some(parts) => parts
            .iter()
            .enumerate()
            .map(|(rank, bytes)| bytes_to_pod(bytes, rank))
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        None => Ok(None),
    }
}

/// Gather index lists onto the root.
pub fn gather_indices<C: Communicator>(
    comm: &C,
    tag: CommTag,
    local: &[usize],
) -> Result<Option<Vec<Vec<usize>>>, GamgError> {
    let wire: Vec<WireIndex> = local.iter().map(|&v| WireIndex::of(v)).collect();
    Ok(gather_pod(comm, tag, &wire)?
        .map(|parts| {
            parts
                .into_iter()
                .map(|p| p.iter().map(WireIndex::get).collect())
                .collect()
        }))
}

/// Scatter index lists from the root.
pub fn scatter_indices<C: Communicator>(
    comm: &C,
    tag: CommTag,
    parts: Option<&[Vec<usize>]>,
) -> Result<Vec<usize>, GamgError> {
    let encoded: Option<Vec<Vec<u8>>> = parts.map(|parts| {
        parts
            .iter()
            .map(|p| {
                let wire: Vec<WireIndex> = p.iter().map(|&v| WireIndex::of(v)).collect();
                cast_slice(&wire).to_vec()
            })
            .collect()
    });
    let bytes = scatter_bytes(comm, tag, encoded.as_deref())?;
    let wire: Vec<WireIndex> = bytes_to_pod(&bytes, ROOT)?;
    Ok(wire.iter().map(WireIndex::get).collect())
}

/// Gather serde-serialisable values onto the root.
pub fn gather_serde<C, T>(comm: &C, tag: CommTag, local: &T) -> Result<Option<Vec<T>>, GamgError>
where
    C: Communicator,
    T: Serialize + DeserializeOwned,
{
    let bytes = encode_serde(local)?;
    match gather_bytes(comm, tag, &bytes)? {
        Some(parts) => parts
            .iter()
            .map(|b| decode_serde(b))
            .collect::<Result<Vec<T>, _>>()
            .map(Some),
        None => Ok(None),
    }
}

/// Scatter serde-serialisable values from the root.
pub fn scatter_serde<C, T>(comm: &C, tag: CommTag, parts: Option<&[T]>) -> Result<T, GamgError>
where
    C: Communicator,
    T: Serialize + DeserializeOwned,
{
    let encoded = match parts {
        Some(parts) => Some(
            parts
                .iter()
                .map(encode_serde)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        None => None,
    };
    let bytes = scatter_bytes(comm, tag, encoded.as_deref())?;
    decode_serde(&bytes)
}

/// Sum `x` over every rank; every rank receives the total.
pub fn all_reduce_sum<C: Communicator>(comm: &C, tag: CommTag, x: u64) -> Result<u64, GamgError> {
    if comm.size() == 1 {
        return Ok(x);
    }
    let total = gather_pod(comm, tag, &[x])?
        .map(|parts| parts.iter().flatten().sum::<u64>())
        .unwrap_or(0);
    let bytes = broadcast_bytes(comm, tag.offset(2), cast_slice(&[total]))?;
    let total: Vec<u64> = bytes_to_pod(&bytes, ROOT)?;
    total.first().copied().ok_or(GamgError::CommSizeMismatch {
        rank: ROOT,
        expected: 1,
        found: 0,
    })
}

/// Logical or of `flag` over every rank.
pub fn all_reduce_or<C: Communicator>(comm: &C, tag: CommTag, flag: bool) -> Result<bool, GamgError> {
    Ok(all_reduce_sum(comm, tag, u64::from(flag))? > 0)
}

/// Make every rank of a step fail together.
///
/// Collective: ranks holding an error keep it, the others receive
/// [`GamgError::PeerFailed`] when any rank failed. Uses sub-tags
/// `tag..tag + 4`.
pub fn agree<C: Communicator, T>(
    comm: &C,
    tag: CommTag,
    local: Result<T, GamgError>,
) -> Result<T, GamgError> {
    let n_failed = all_reduce_sum(comm, tag, u64::from(local.is_err()))?;
    match local {
        Ok(_) if n_failed > 0 => Err(GamgError::PeerFailed {
            n_failed: n_failed as usize,
        }),
        local => local,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{LocalComm, NoComm};

    #[test]
    fn serial_gather_returns_own_buffer() {
        let got = gather_bytes(&NoComm, CommTag::new(1), &[4, 5]).unwrap();
        assert_eq!(got, Some(vec![vec![4, 5]]));
        assert_eq!(all_reduce_sum(&NoComm, CommTag::new(1), 9).unwrap(), 9);
    }

    #[test]
    fn gather_then_scatter_three_ranks() {
        let comms = LocalComm::universe(3);
        let tag = CommTag::new(0x40);
        std::thread::scope(|s| {
            let handles: Vec<_> = comms
                .iter()
                .map(|comm| {
                    s.spawn(move || {
                        let mine = vec![comm.rank(); comm.rank() + 1];
                        let gathered = gather_indices(comm, tag, &mine).unwrap();
                        let back = gathered.map(|g| {
                            g.into_iter().map(|v| vec![v.len()]).collect::<Vec<_>>()
                        });
                        let lens = scatter_indices(comm, tag.offset(4), back.as_deref()).unwrap();
                        let total = all_reduce_sum(comm, tag.offset(8), lens[0] as u64).unwrap();
                        (lens, total)
                    })
                })
                .collect();
            for (rank, h) in handles.into_iter().enumerate() {
                let (lens, total) = h.join().unwrap();
                assert_eq!(lens, vec![rank + 1]);
                assert_eq!(total, 6);
            }
        });
    }

    #[test]
    fn one_failing_rank_fails_everyone() {
        let comms = LocalComm::universe(3);
        let tag = CommTag::new(0x80);
        std::thread::scope(|s| {
            let handles: Vec<_> = comms
                .iter()
                .map(|comm| {
                    s.spawn(move || {
                        let local = if comm.rank() == 1 {
                            Err(GamgError::LevelCleared { level: 2 })
                        } else {
                            Ok(comm.rank())
                        };
                        agree(comm, tag, local)
                    })
                })
                .collect();
            let got: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            assert_eq!(got[0], Err(GamgError::PeerFailed { n_failed: 1 }));
            assert_eq!(got[1], Err(GamgError::LevelCleared { level: 2 }));
            assert_eq!(got[2], Err(GamgError::PeerFailed { n_failed: 1 }));
        });
        assert_eq!(agree(&NoComm, tag, Ok(7)), Ok(7));
    }
}
