//! A level mesh: addressing plus its coupled interfaces.

use crate::debug_invariants::DebugInvariants;
use crate::gamg_error::GamgError;
use crate::topology::interfaces::{GamgInterface, InterfaceKind};
use crate::topology::ldu_addressing::LduAddressing;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LduPrimitiveMesh {
    addressing: LduAddressing,
    interfaces: Vec<GamgInterface>,
}

impl LduPrimitiveMesh {
    pub fn new(addressing: LduAddressing, interfaces: Vec<GamgInterface>) -> Result<Self, GamgError> {
        let mesh = Self {
            addressing,
            interfaces,
        };
        mesh.validate_invariants()?;
        Ok(mesh)
    }

    /// A mesh without interfaces.
    pub fn serial(addressing: LduAddressing) -> Self {
        Self {
            addressing,
            interfaces: Vec::new(),
        }
    }

    pub fn addressing(&self) -> &LduAddressing {
        &self.addressing
    }

    pub fn interfaces(&self) -> &[GamgInterface] {
        &self.interfaces
    }

    pub(crate) fn interfaces_mut(&mut self) -> &mut [GamgInterface] {
        &mut self.interfaces
    }

    pub fn n_cells(&self) -> usize {
        self.addressing.n_cells()
    }

    pub fn n_faces(&self) -> usize {
        self.addressing.n_faces()
    }

    /// Interface of the cyclic patch `patch_id`, if this level has one.
    pub fn cyclic_patch(&self, patch_id: usize) -> Option<&GamgInterface> {
        self.interfaces
            .iter()
            .find(|i| matches!(i.kind(), InterfaceKind::Cyclic(c) if c.patch_id == patch_id))
    }
}

impl DebugInvariants for LduPrimitiveMesh {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "LduPrimitiveMesh");
    }

    fn validate_invariants(&self) -> Result<(), GamgError> {
        self.addressing.validate_invariants()?;
        let n_cells = self.n_cells();
        for (pos, iface) in self.interfaces.iter().enumerate() {
            if iface.index() != pos {
                return Err(GamgError::InterfaceLayout(format!(
                    "interface at position {pos} carries index {}",
                    iface.index()
                )));
            }
            if let Some((face, &cell)) = iface
                .face_cells()
                .iter()
                .enumerate()
                .find(|&(_, &c)| c >= n_cells)
            {
                return Err(GamgError::CellOutOfRange {
                    face,
                    cell,
                    n_cells,
                });
            }
        }
        Ok(())
    }
}
