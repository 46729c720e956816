//! Coarse level construction from a restriction map.
//!
//! Fine faces are collapsed through the map into deduplicated coarse faces
//! (see [`FaceTable`]), the coarse faces are renumbered into upper-triangular
//! order and the flip of every fine face relative to its coarse face is
//! recorded. Interfaces exchange the restriction values of their face cells
//! with the peer side; every send and receive of a level is posted before
//! any of them is waited on.

use super::face_table::FaceTable;
use super::{Agglomeration, FaceRestrict, LevelTransition};
use crate::algs::collectives::agree;
use crate::algs::communicator::{CommTag, Communicator, TAG_STRIDE, Wait};
use crate::algs::wire::{WireIndex, cast_slice, decode_indices, encode_indices};
use crate::gamg_error::GamgError;
use crate::topology::interfaces::{CoupledInterface, GamgInterface, Peer};
use crate::topology::ldu_addressing::LduAddressing;
use crate::topology::primitive_mesh::LduPrimitiveMesh;
use hashbrown::HashSet;
use log::debug;
use std::mem::size_of;

/// Interface channels available within one tag stride; the top sub-tags are
/// kept for the failure agreements of [`agglomerate_ldu_addressing`].
pub const MAX_CHANNELS: u16 = TAG_STRIDE - 8;
const CHECK_AGREE: u16 = MAX_CHANNELS;
const BUILD_AGREE: u16 = MAX_CHANNELS + 4;

/// Check a restriction map against its fine level.
///
/// The map must have one entry per fine cell, every value must lie in
/// `[0, n_coarse)` and every coarse cell must be hit at least once.
pub fn validate_restriction(
    level: usize,
    restrict: &[usize],
    n_fine: usize,
    n_coarse: usize,
) -> Result<(), GamgError> {
    if restrict.len() != n_fine {
        return Err(GamgError::RestrictSizeMismatch {
            level,
            expected: n_fine,
            found: restrict.len(),
        });
    }
    let mut hit = vec![false; n_coarse];
    for (cell, &value) in restrict.iter().enumerate() {
        if value >= n_coarse {
            return Err(GamgError::RestrictOutOfRange {
                level,
                cell,
                value,
                n_coarse,
            });
        }
        hit[value] = true;
    }
    match hit.iter().position(|&h| !h) {
        Some(coarse) => Err(GamgError::EmptyCoarseCell {
            level,
            coarse,
            n_coarse,
        }),
        None => Ok(()),
    }
}

/// Internal faces of the coarse level and the fine-face maps onto them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoarseFaces {
    pub addressing: LduAddressing,
    pub face_restrict_addressing: Vec<FaceRestrict>,
    pub face_flip_map: Vec<bool>,
}

/// Collapse the fine internal faces through a validated restriction map.
pub fn coarsen_faces(
    level: usize,
    fine: &LduAddressing,
    restrict: &[usize],
    n_coarse: usize,
) -> Result<CoarseFaces, GamgError> {
    let lower = fine.lower();
    let upper = fine.upper();
    let mut table = FaceTable::new(n_coarse);

    // face restriction in discovery numbering
    let mut face_restrict: Vec<FaceRestrict> = lower
        .iter()
        .zip(upper)
        .map(|(&l, &u)| {
            let (cl, cu) = (restrict[l], restrict[u]);
            if cl == cu {
                FaceRestrict::Interior(cl)
            } else {
                FaceRestrict::Coarse(table.find_or_insert(cl.min(cu), cl.max(cu)))
            }
        })
        .collect();

    let n_coarse_faces = table.n_faces();
    let mut renumber = vec![0usize; n_coarse_faces];
    let mut coarse_lower = Vec::with_capacity(n_coarse_faces);
    let mut coarse_upper = Vec::with_capacity(n_coarse_faces);
    let mut row: Vec<(usize, usize)> = Vec::new();
    for own in 0..table.n_cells() {
        let (nbrs, ids) = table.row(own);
        row.clear();
        row.extend(nbrs.iter().copied().zip(ids.iter().copied()));
        row.sort_unstable();
        for &(nei, id) in &row {
            renumber[id] = coarse_lower.len();
            coarse_lower.push(own);
            coarse_upper.push(nei);
        }
    }

    let mut face_flip_map = vec![false; face_restrict.len()];
    for (f, fr) in face_restrict.iter_mut().enumerate() {
        let FaceRestrict::Coarse(id) = *fr else {
            continue;
        };
        let k = renumber[id];
        *fr = FaceRestrict::Coarse(k);
        let (cl, cu) = (restrict[lower[f]], restrict[upper[f]]);
        let (own, nei) = (coarse_lower[k], coarse_upper[k]);
        face_flip_map[f] = if (cl, cu) == (own, nei) {
            false
        } else if (cl, cu) == (nei, own) {
            true
        } else {
            return Err(GamgError::FaceOrientationMismatch {
                level,
                face: f,
                lower_coarse: cl,
                upper_coarse: cu,
                coarse_face: k,
                coarse_owner: own,
                coarse_neighbour: nei,
            });
        };
    }

    Ok(CoarseFaces {
        addressing: LduAddressing::new(n_coarse, coarse_lower, coarse_upper)?,
        face_restrict_addressing: face_restrict,
        face_flip_map,
    })
}

/// Reject interfaces that point at an invalid rank or channel, or that
/// repeat a peer.
pub fn check_interface_layout<C: Communicator>(
    fine: &LduPrimitiveMesh,
    comm: &C,
) -> Result<(), GamgError> {
    let mut seen = HashSet::new();
    for iface in fine.interfaces() {
        let peer = iface.kind().peer();
        if let Peer::Rank { rank, channel } = peer {
            if rank >= comm.size() || rank == comm.rank() || channel >= MAX_CHANNELS {
                return Err(GamgError::InterfaceLayout(format!(
                    "interface {} on rank {} of {} points at rank {rank} channel {channel}",
                    iface.index(),
                    comm.rank(),
                    comm.size()
                )));
            }
        }
        if !seen.insert(peer) {
            return Err(GamgError::InterfaceLayout(format!(
                "interface {} repeats peer {peer:?}",
                iface.index()
            )));
        }
    }
    Ok(())
}

/// Build the coarse interfaces of `fine` under `restrict`.
///
/// Returns the coarse interfaces, in the order of the fine ones, and the
/// patch-face restriction of every fine interface. Processor-type interfaces
/// exchange with their peer rank on `tag.offset(channel)`; cyclic interfaces
/// read their paired patch directly.
pub fn agglomerate_interfaces<C: Communicator>(
    fine: &LduPrimitiveMesh,
    restrict: &[usize],
    comm: &C,
    tag: CommTag,
) -> Result<(Vec<GamgInterface>, Vec<Vec<usize>>), GamgError> {
    let interfaces = fine.interfaces();
    let local: Vec<Vec<usize>> = interfaces
        .iter()
        .map(|i| i.face_cells().iter().map(|&c| restrict[c]).collect())
        .collect();

    check_interface_layout(fine, comm)?;

    // post every exchange first
    let wire: Vec<Vec<WireIndex>> = local.iter().map(|l| encode_indices(l)).collect();
    let mut sends = Vec::new();
    let mut recvs = Vec::new();
    for (p, iface) in interfaces.iter().enumerate() {
        if let Peer::Rank { rank, channel } = iface.kind().peer() {
            let t = tag.offset(channel).as_u16();
            sends.push(comm.isend(rank, t, cast_slice(&wire[p])));
            let mut buf = vec![0u8; wire[p].len() * size_of::<WireIndex>()];
            recvs.push((p, rank, comm.irecv(rank, t, &mut buf)));
        }
    }

    let mut nbr: Vec<Option<Vec<usize>>> = vec![None; interfaces.len()];
    let mut maybe_err = None;
    for send in sends {
        let _ = send.wait();
    }
    for (p, rank, h) in recvs {
        match h.wait() {
            Some(bytes) => match decode_indices(&bytes, local[p].len(), rank) {
                Ok(values) => nbr[p] = Some(values),
                Err(_) if maybe_err.is_none() => {
                    maybe_err = Some(GamgError::InterfaceSizeMismatch {
                        interface: p,
                        expected: local[p].len(),
                        found: bytes.len() / size_of::<WireIndex>(),
                    });
                }
                Err(_) => {}
            },
            None if maybe_err.is_none() => {
                maybe_err = Some(GamgError::CommError {
                    neighbor: rank,
                    reason: format!("no restriction data for interface {p}"),
                });
            }
            None => {}
        }
    }
    if let Some(err) = maybe_err {
        return Err(err);
    }

    let mut coarse = Vec::with_capacity(interfaces.len());
    let mut patch_face_restrict = Vec::with_capacity(interfaces.len());
    for (p, iface) in interfaces.iter().enumerate() {
        let nbr_restrict = match (&nbr[p], iface.kind().peer()) {
            (Some(values), _) => values.as_slice(),
            (None, Peer::Patch { patch_id }) => {
                let other = fine.cyclic_patch(patch_id).ok_or_else(|| {
                    GamgError::InterfaceLayout(format!(
                        "interface {p} pairs with missing cyclic patch {patch_id}"
                    ))
                })?;
                local[other.index()].as_slice()
            }
            (None, Peer::Rank { rank, .. }) => {
                return Err(GamgError::CommError {
                    neighbor: rank,
                    reason: format!("no restriction data for interface {p}"),
                });
            }
        };
        let ci = GamgInterface::agglomerate(iface, &local[p], nbr_restrict)?;
        patch_face_restrict.push(ci.face_restrict_addressing().to_vec());
        coarse.push(ci);
    }
    Ok((coarse, patch_face_restrict))
}

/// Construct the next level from `fine` and a restriction map.
///
/// `level` is the index of `fine` and only feeds diagnostics. Any
/// inconsistency is returned as an error and nothing is built.
///
/// Collective over `comm`: the local checks and the finished build are each
/// agreed on, so when one rank fails every rank returns an error and none is
/// left waiting on an exchange.
pub fn agglomerate_ldu_addressing<C: Communicator>(
    level: usize,
    fine: &LduPrimitiveMesh,
    restrict: Vec<usize>,
    n_coarse: usize,
    comm: &C,
    tag: CommTag,
) -> Result<(LduPrimitiveMesh, LevelTransition), GamgError> {
    let checked = validate_restriction(level, &restrict, fine.n_cells(), n_coarse)
        .and_then(|()| check_interface_layout(fine, comm))
        .and_then(|()| coarsen_faces(level, fine.addressing(), &restrict, n_coarse));
    let faces = agree(comm, tag.offset(CHECK_AGREE), checked)?;
    let built = build_level(level, fine, restrict, n_coarse, faces, comm, tag);
    agree(comm, tag.offset(BUILD_AGREE), built)
}

fn build_level<C: Communicator>(
    level: usize,
    fine: &LduPrimitiveMesh,
    restrict: Vec<usize>,
    n_coarse: usize,
    faces: CoarseFaces,
    comm: &C,
    tag: CommTag,
) -> Result<(LduPrimitiveMesh, LevelTransition), GamgError> {
    let (interfaces, patch_face_restrict_addressing) =
        agglomerate_interfaces(fine, &restrict, comm, tag)?;

    let n_coarse_faces = faces.addressing.n_faces();
    let n_interior = faces
        .face_restrict_addressing
        .iter()
        .filter(|fr| matches!(fr, FaceRestrict::Interior(_)))
        .count();
    let n_flipped = faces.face_flip_map.iter().filter(|&&f| f).count();
    debug!(
        "level {level}: {} -> {n_coarse} cells, {} -> {n_coarse_faces} faces \
         ({n_interior} interior, {n_flipped} flipped), {} interfaces",
        fine.n_cells(),
        fine.n_faces(),
        interfaces.len()
    );

    let mesh = LduPrimitiveMesh::new(faces.addressing, interfaces)?;
    let transition = LevelTransition {
        restrict_addressing: restrict,
        n_coarse_cells: n_coarse,
        face_restrict_addressing: faces.face_restrict_addressing,
        n_coarse_faces,
        face_flip_map: faces.face_flip_map,
        patch_face_restrict_addressing,
    };
    crate::debug_invariants!(
        crate::debug_invariants::DebugInvariants::validate_invariants(&transition),
        "LevelTransition"
    );
    Ok((mesh, transition))
}

impl Agglomeration {
    /// Build level `n_levels()` from the current coarsest level.
    ///
    /// Returns the index of the new mesh level.
    pub fn agglomerate_level<C: Communicator>(
        &mut self,
        comm: &C,
        tag: CommTag,
        restrict: Vec<usize>,
        n_coarse: usize,
    ) -> Result<usize, GamgError> {
        let level = self.n_levels() - 1;
        let fine = self.mesh_level(level)?;
        let (mesh, transition) =
            agglomerate_ldu_addressing(level, fine, restrict, n_coarse, comm, tag)?;
        self.push_level(mesh, transition);
        Ok(level + 1)
    }
}
