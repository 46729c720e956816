#![cfg_attr(docsrs, feature(doc_cfg))]
//! # mesh-gamg
//!
//! mesh-gamg builds the coarse-level hierarchy of a geometric-agglomeration
//! algebraic multigrid (GAMG) solver. Given a fine mesh in LDU (lower/diagonal/
//! upper) form and a restriction map per level, it derives the coarse cell
//! graph, the coarse coupled interfaces and the face maps used to move matrix
//! coefficients and fields between levels.
//!
//! ## Features
//! - Level construction from an arbitrary surjective cell restriction
//! - Level folding, so that one restriction replaces two
//! - Cross-process agglomeration of the coarse levels onto cluster masters
//! - Pluggable communication backends (serial, in-process threads, MPI)
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! mesh-gamg = "0.3"
//! # Optional features:
//! # features = ["mpi-support", "rayon", "strict-invariants"]
//! ```
//!
//! The usual entry point is [`GamgHierarchy::build`], fed by a
//! [`RestrictionStrategy`](agglomeration::driver::RestrictionStrategy) that
//! proposes the cell merges of every level.

pub mod agglomeration;
pub mod algs;
pub mod debug_invariants;
pub mod gamg_error;
pub mod proc_agglomeration;
pub mod topology;

pub use agglomeration::Agglomeration;
pub use agglomeration::driver::GamgHierarchy;
pub use debug_invariants::DebugInvariants;
pub use gamg_error::GamgError;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::agglomeration::config::{AgglomerationConfig, ProcAgglomerationPolicy};
    pub use crate::agglomeration::driver::{
        GamgHierarchy, PrescribedRestriction, RestrictionStrategy,
    };
    pub use crate::agglomeration::{Agglomeration, FaceRestrict, LevelStats, LevelTransition};
    pub use crate::algs::communicator::{CommTag, Communicator, LocalComm, NoComm, TagAllocator};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::gamg_error::GamgError;
    pub use crate::proc_agglomeration::{ProcAgglomeration, ProcAgglomerationSet};
    pub use crate::topology::interfaces::{
        CyclicInterface, GamgInterface, InterfaceKind, ProcessorCyclicInterface,
        ProcessorInterface,
    };
    pub use crate::topology::ldu_addressing::LduAddressing;
    pub use crate::topology::primitive_mesh::LduPrimitiveMesh;
}
