//! Coupled boundary interfaces of a level.
//!
//! The set of interface kinds is closed: [`InterfaceKind`] enumerates them and
//! [`CoupledInterface`] is the capability every kind provides to the level
//! builder. A [`GamgInterface`] pairs a kind with the level-local face-cell
//! list and, on coarse levels, the map from the finer interface's faces.

pub mod cyclic;
pub mod processor;
pub mod processor_cyclic;

pub use cyclic::CyclicInterface;
pub use processor::ProcessorInterface;
pub use processor_cyclic::ProcessorCyclicInterface;

use crate::gamg_error::GamgError;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

/// Where the other side of an interface lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Peer {
    /// On another rank; `channel` distinguishes interfaces to the same rank.
    Rank { rank: usize, channel: u16 },
    /// On this rank, as the interface carrying this global patch id.
    Patch { patch_id: usize },
}

pub trait CoupledInterface {
    /// Whether this side's cells come first in a coarse face pair. The two
    /// sides of one coupling must answer differently.
    fn owner(&self) -> bool;
    fn peer(&self) -> Peer;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterfaceKind {
    Processor(ProcessorInterface),
    Cyclic(CyclicInterface),
    ProcessorCyclic(ProcessorCyclicInterface),
}

impl InterfaceKind {
    /// True for kinds whose peer is on another rank.
    pub fn is_processor(&self) -> bool {
        matches!(self, Self::Processor(_) | Self::ProcessorCyclic(_))
    }

    /// Same kind with its rank pair replaced.
    pub fn with_ranks(self, my_rank: usize, neighb_rank: usize) -> Self {
        match self {
            Self::Processor(_) => Self::Processor(ProcessorInterface::new(my_rank, neighb_rank)),
            Self::ProcessorCyclic(p) => Self::ProcessorCyclic(ProcessorCyclicInterface {
                my_rank,
                neighb_rank,
                ..p
            }),
            Self::Cyclic(c) => Self::Cyclic(c),
        }
    }
}

impl CoupledInterface for InterfaceKind {
    fn owner(&self) -> bool {
        match self {
            Self::Processor(p) => p.owner(),
            Self::Cyclic(c) => c.owner(),
            Self::ProcessorCyclic(p) => p.owner(),
        }
    }

    fn peer(&self) -> Peer {
        match self {
            Self::Processor(p) => p.peer(),
            Self::Cyclic(c) => c.peer(),
            Self::ProcessorCyclic(p) => p.peer(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GamgInterface {
    index: usize,
    kind: InterfaceKind,
    face_cells: Vec<usize>,
    face_restrict_addressing: Vec<usize>,
}

impl GamgInterface {
    /// A fine-level interface.
    pub fn new(index: usize, kind: InterfaceKind, face_cells: Vec<usize>) -> Self {
        Self {
            index,
            kind,
            face_cells,
            face_restrict_addressing: Vec::new(),
        }
    }

    /// Position in the level's interface list.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn kind(&self) -> &InterfaceKind {
        &self.kind
    }

    /// Level-local cell next to every interface face.
    pub fn face_cells(&self) -> &[usize] {
        &self.face_cells
    }

    /// Finer-interface face -> face of this interface. Empty on the fine
    /// level.
    pub fn face_restrict_addressing(&self) -> &[usize] {
        &self.face_restrict_addressing
    }

    pub fn size(&self) -> usize {
        self.face_cells.len()
    }

    /// Build the coarse interface from the fine one.
    ///
    /// `local_restrict[i]` is the coarse cell behind fine face `i` on this
    /// side, `nbr_restrict[i]` the one on the other side. Fine faces whose
    /// (owner-side, neighbour-side) coarse pair coincide collapse into one
    /// coarse face. Coarse faces are numbered in ascending pair order, which
    /// both sides of a coupling agree on.
    pub fn agglomerate(
        fine: &GamgInterface,
        local_restrict: &[usize],
        nbr_restrict: &[usize],
    ) -> Result<Self, GamgError> {
        if nbr_restrict.len() != local_restrict.len() {
            return Err(GamgError::InterfaceSizeMismatch {
                interface: fine.index,
                expected: local_restrict.len(),
                found: nbr_restrict.len(),
            });
        }
        let owner = fine.kind.owner();
        let pairs: Vec<(usize, usize)> = local_restrict
            .iter()
            .zip(nbr_restrict)
            .map(|(&l, &n)| if owner { (l, n) } else { (n, l) })
            .collect();

        let mut unique = pairs.clone();
        unique.sort_unstable();
        unique.dedup();
        let coarse_face: HashMap<(usize, usize), usize> =
            unique.iter().enumerate().map(|(i, &p)| (p, i)).collect();

        let face_cells = unique
            .iter()
            .map(|&(m, s)| if owner { m } else { s })
            .collect();
        let face_restrict_addressing = pairs.iter().map(|p| coarse_face[p]).collect();

        Ok(Self {
            index: fine.index,
            kind: fine.kind,
            face_cells,
            face_restrict_addressing,
        })
    }

    /// Fold `coarser` (built from `self`) into `self`: take its face cells
    /// and compose the face restriction through it.
    pub fn combine(&mut self, coarser: &GamgInterface) -> Result<(), GamgError> {
        if coarser.face_restrict_addressing.len() != self.size() {
            return Err(GamgError::InterfaceSizeMismatch {
                interface: self.index,
                expected: self.size(),
                found: coarser.face_restrict_addressing.len(),
            });
        }
        for f in &mut self.face_restrict_addressing {
            *f = coarser.face_restrict_addressing[*f];
        }
        self.face_cells = coarser.face_cells.clone();
        Ok(())
    }

    pub(crate) fn from_parts(
        index: usize,
        kind: InterfaceKind,
        face_cells: Vec<usize>,
        face_restrict_addressing: Vec<usize>,
    ) -> Self {
        Self {
            index,
            kind,
            face_cells,
            face_restrict_addressing,
        }
    }
}
