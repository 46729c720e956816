//! Cyclic interface: a periodic patch paired with another patch on the same
//! rank.

use super::{CoupledInterface, Peer};
use serde::{Deserialize, Serialize};

/// One half of a cyclic pair.
///
/// `patch_id` and `neighb_patch_id` are global patch identifiers, identical
/// on every rank, so halves can be matched after interface lists are
/// reordered or merged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CyclicInterface {
    pub patch_id: usize,
    pub neighb_patch_id: usize,
    pub owner: bool,
}

impl CyclicInterface {
    pub fn new(patch_id: usize, neighb_patch_id: usize, owner: bool) -> Self {
        Self {
            patch_id,
            neighb_patch_id,
            owner,
        }
    }
}

impl CoupledInterface for CyclicInterface {
    fn owner(&self) -> bool {
        self.owner
    }

    fn peer(&self) -> Peer {
        Peer::Patch {
            patch_id: self.neighb_patch_id,
        }
    }
}
