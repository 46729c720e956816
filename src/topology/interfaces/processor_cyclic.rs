//! Processor-cyclic interface: a cyclic patch whose halves were split onto
//! different ranks.

use super::{CoupledInterface, Peer};
use serde::{Deserialize, Serialize};

/// `channel` separates several processor-cyclic patches between the same
/// pair of ranks; both sides must use the same value. Channel 0 of a rank
/// pair is taken by the plain processor interface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorCyclicInterface {
    pub my_rank: usize,
    pub neighb_rank: usize,
    pub referring_patch_id: usize,
    pub channel: u16,
}

impl ProcessorCyclicInterface {
    pub fn new(my_rank: usize, neighb_rank: usize, referring_patch_id: usize, channel: u16) -> Self {
        Self {
            my_rank,
            neighb_rank,
            referring_patch_id,
            channel,
        }
    }
}

impl CoupledInterface for ProcessorCyclicInterface {
    fn owner(&self) -> bool {
        self.my_rank < self.neighb_rank
    }

    fn peer(&self) -> Peer {
        Peer::Rank {
            rank: self.neighb_rank,
            channel: self.channel.saturating_add(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_is_shifted_past_processor_slot() {
        let p = ProcessorCyclicInterface::new(2, 0, 7, 0);
        assert!(!p.owner());
        assert_eq!(p.peer(), Peer::Rank { rank: 0, channel: 1 });
    }
}
