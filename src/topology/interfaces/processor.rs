//! Processor interface: faces whose neighbour cells live on another rank.

use super::{CoupledInterface, Peer};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorInterface {
    pub my_rank: usize,
    pub neighb_rank: usize,
}

impl ProcessorInterface {
    pub fn new(my_rank: usize, neighb_rank: usize) -> Self {
        Self {
            my_rank,
            neighb_rank,
        }
    }
}

impl CoupledInterface for ProcessorInterface {
    /// The lower rank owns the face pairs.
    fn owner(&self) -> bool {
        self.my_rank < self.neighb_rank
    }

    fn peer(&self) -> Peer {
        Peer::Rank {
            rank: self.neighb_rank,
            channel: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lower_rank_owns() {
        assert!(ProcessorInterface::new(1, 3).owner());
        assert!(!ProcessorInterface::new(3, 1).owner());
        assert_eq!(
            ProcessorInterface::new(3, 1).peer(),
            Peer::Rank { rank: 1, channel: 0 }
        );
    }
}
