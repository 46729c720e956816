#![allow(dead_code)]
use mesh_gamg::algs::communicator::LocalComm;
use mesh_gamg::topology::interfaces::{GamgInterface, InterfaceKind, ProcessorInterface};
use mesh_gamg::topology::ldu_addressing::LduAddressing;
use mesh_gamg::topology::primitive_mesh::LduPrimitiveMesh;

/// `n` cells in a row.
pub fn chain(n: usize) -> LduAddressing {
    LduAddressing::new(n, (0..n.saturating_sub(1)).collect(), (1..n).collect()).unwrap()
}

/// `nx * ny` structured grid, cell `j * nx + i`.
pub fn grid(nx: usize, ny: usize) -> LduAddressing {
    let mut lower = Vec::new();
    let mut upper = Vec::new();
    for j in 0..ny {
        for i in 0..nx {
            let c = j * nx + i;
            if i + 1 < nx {
                lower.push(c);
                upper.push(c + 1);
            }
            if j + 1 < ny {
                lower.push(c);
                upper.push(c + nx);
            }
        }
    }
    LduAddressing::new(nx * ny, lower, upper).unwrap()
}

/// Restriction of an `nx * ny` grid onto `bx * by` blocks.
pub fn block_restrict(nx: usize, ny: usize, bx: usize, by: usize) -> (Vec<usize>, usize) {
    let cx = nx.div_ceil(bx);
    let cy = ny.div_ceil(by);
    let r = (0..nx * ny)
        .map(|c| {
            let (i, j) = (c % nx, c / nx);
            (j / by) * cx + i / bx
        })
        .collect();
    (r, cx * cy)
}

pub fn proc_iface(index: usize, my: usize, nb: usize, cells: Vec<usize>) -> GamgInterface {
    GamgInterface::new(
        index,
        InterfaceKind::Processor(ProcessorInterface::new(my, nb)),
        cells,
    )
}

/// Rank `rank` of a chain of `n_local * size` cells split evenly over
/// `size` ranks.
pub fn split_chain(rank: usize, size: usize, n_local: usize) -> LduPrimitiveMesh {
    let mut interfaces = Vec::new();
    if rank > 0 {
        interfaces.push(proc_iface(interfaces.len(), rank, rank - 1, vec![0]));
    }
    if rank + 1 < size {
        interfaces.push(proc_iface(interfaces.len(), rank, rank + 1, vec![n_local - 1]));
    }
    LduPrimitiveMesh::new(chain(n_local), interfaces).unwrap()
}

/// Run `f` on every rank of a fresh universe, one scoped thread per rank.
pub fn run_ranks<T, F>(size: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(LocalComm) -> T + Sync,
{
    let f = &f;
    std::thread::scope(|s| {
        let handles: Vec<_> = LocalComm::universe(size)
            .into_iter()
            .map(|comm| s.spawn(move || f(comm)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}
