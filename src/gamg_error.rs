//! GamgError: unified error type for mesh-gamg public APIs
//!
//! Every structural problem found while building or merging a level is
//! reported through this type. None of these conditions is recoverable: a
//! caller that receives an error must not keep using the hierarchy it was
//! building. Collective steps agree on failure, so in a distributed run every
//! rank of the step returns an error together: the failing ranks their own,
//! the others [`GamgError::PeerFailed`].

use thiserror::Error;

/// Unified error type for agglomeration operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GamgError {
    /// Restriction map length differs from the fine cell count.
    #[error("level {level}: restriction map has {found} entries but the fine level has {expected} cells")]
    RestrictSizeMismatch {
        level: usize,
        expected: usize,
        found: usize,
    },
    /// A fine cell restricts to a coarse index outside `[0, n_coarse)`.
    #[error("level {level}: fine cell {cell} restricts to {value}, outside [0, {n_coarse})")]
    RestrictOutOfRange {
        level: usize,
        cell: usize,
        value: usize,
        n_coarse: usize,
    },
    /// No fine cell restricts to this coarse cell.
    #[error("level {level}: coarse cell {coarse} of {n_coarse} is not referenced by any fine cell")]
    EmptyCoarseCell {
        level: usize,
        coarse: usize,
        n_coarse: usize,
    },
    /// Fine face endpoints do not restrict onto the recorded coarse face.
    #[error(
        "level {level}: fine face {face} restricts to ({lower_coarse}, {upper_coarse}) \
         but coarse face {coarse_face} is ({coarse_owner}, {coarse_neighbour})"
    )]
    FaceOrientationMismatch {
        level: usize,
        face: usize,
        lower_coarse: usize,
        upper_coarse: usize,
        coarse_face: usize,
        coarse_owner: usize,
        coarse_neighbour: usize,
    },
    /// Local and neighbour sides of an interface disagree on the face count.
    #[error("interface {interface}: expected {expected} faces, found {found}")]
    InterfaceSizeMismatch {
        interface: usize,
        expected: usize,
        found: usize,
    },
    /// Interface lists cannot be matched (cluster meshes, paired patches).
    #[error("interface layout mismatch: {0}")]
    InterfaceLayout(String),
    /// A point-to-point exchange with `neighbor` failed.
    #[error("communication with rank {neighbor} failed: {reason}")]
    CommError { neighbor: usize, reason: String },
    /// A rank contributed a different number of bytes or items than expected.
    #[error("rank {rank} sent {found} items where {expected} were expected")]
    CommSizeMismatch {
        rank: usize,
        expected: usize,
        found: usize,
    },
    /// The processor agglomeration map is malformed.
    #[error("invalid processor agglomeration map: {0}")]
    InvalidProcAgglomMap(String),
    /// Requested level does not exist.
    #[error("level {level} out of range (hierarchy has {n_levels} levels)")]
    LevelOutOfRange { level: usize, n_levels: usize },
    /// Requested level was cleared after cross-process agglomeration.
    #[error("level {level} was cleared on this rank by processor agglomeration")]
    LevelCleared { level: usize },
    /// Face addressing violates upper-triangular order.
    #[error("face {face} breaks upper-triangular order: ({lower}, {upper})")]
    NotUpperTriangular {
        face: usize,
        lower: usize,
        upper: usize,
    },
    /// A face references a cell outside the mesh.
    #[error("face {face} references cell {cell} but the mesh has {n_cells} cells")]
    CellOutOfRange {
        face: usize,
        cell: usize,
        n_cells: usize,
    },
    /// Field length does not match the level it is applied to.
    #[error("level {level}: field has {found} entries, expected {expected}")]
    FieldSizeMismatch {
        level: usize,
        expected: usize,
        found: usize,
    },
    /// Addressing arrays are malformed (offsets, lengths, permutations).
    #[error("invalid addressing: {0}")]
    InvalidAddressing(String),
    /// This rank was fine but another rank of the same collective step failed.
    #[error("{n_failed} other rank(s) failed in the same step")]
    PeerFailed { n_failed: usize },
    /// Payload (de)serialisation failed.
    #[error("wire error: {0}")]
    Wire(String),
}

impl From<bincode::Error> for GamgError {
    fn from(e: bincode::Error) -> Self {
        GamgError::Wire(e.to_string())
    }
}
