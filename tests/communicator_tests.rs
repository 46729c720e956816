mod util;
use mesh_gamg::algs::collectives::{
    all_reduce_or, all_reduce_sum, gather_indices, gather_serde, scatter_indices, scatter_serde,
};
use mesh_gamg::algs::communicator::{CommTag, Communicator, LocalComm, Wait};
use util::*;

#[test]
fn local_fifo_order() {
    let comms = LocalComm::universe(2);
    let tag = CommTag::new(0x1001);
    for i in 0..10u8 {
        comms[0].isend(1, tag.as_u16(), &[i]);
    }
    let mut out = Vec::new();
    for _ in 0..10 {
        let mut b = [0u8; 1];
        out.push(comms[1].irecv(0, tag.as_u16(), &mut b).wait().unwrap()[0]);
    }
    assert_eq!(out, (0u8..10).collect::<Vec<_>>());
}

#[test]
fn gather_and_scatter_indices() {
    let out = run_ranks(3, |comm: LocalComm| {
        let local: Vec<usize> = (0..comm.rank()).collect();
        let gathered = gather_indices(&comm, CommTag::new(0x10), &local).unwrap();
        let parts = gathered.as_ref().map(|g| {
            g.iter()
                .map(|row| row.iter().map(|v| v * 10).collect())
                .collect::<Vec<Vec<usize>>>()
        });
        let back = scatter_indices(&comm, CommTag::new(0x20), parts.as_deref()).unwrap();
        (gathered, back)
    });
    assert_eq!(out[0].0, Some(vec![vec![], vec![0], vec![0, 1]]));
    assert_eq!(out[1].0, None);
    assert_eq!(out[2].1, vec![0, 10]);
}

#[test]
fn serde_values_travel_through_the_root() {
    let out = run_ranks(3, |comm: LocalComm| {
        let name = format!("rank-{}", comm.rank());
        let all: Option<Vec<String>> = gather_serde(&comm, CommTag::new(0x30), &name).unwrap();
        let reversed = all.map(|mut v| {
            v.reverse();
            v
        });
        let mine: String = scatter_serde(&comm, CommTag::new(0x40), reversed.as_deref()).unwrap();
        mine
    });
    assert_eq!(out, vec!["rank-2", "rank-1", "rank-0"]);
}

#[test]
fn reductions_reach_every_rank() {
    let out = run_ranks(4, |comm: LocalComm| {
        let sum = all_reduce_sum(&comm, CommTag::new(0x50), comm.rank() as u64 + 1).unwrap();
        let any = all_reduce_or(&comm, CommTag::new(0x60), comm.rank() == 3).unwrap();
        let none = all_reduce_or(&comm, CommTag::new(0x70), false).unwrap();
        (sum, any, none)
    });
    assert!(out.iter().all(|&r| r == (10, true, false)));
}

#[test]
fn split_ranks_follow_member_order() {
    let out = run_ranks(3, |comm: LocalComm| {
        let sub = comm.split(&[2, 1])?;
        let total = all_reduce_sum(&sub, CommTag::new(0x80), comm.rank() as u64).unwrap();
        Some((sub.rank(), total))
    });
    assert_eq!(out, vec![None, Some((1, 3)), Some((0, 3))]);
}
