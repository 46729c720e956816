//! Thin façade over in-process or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees).
//! All handles are **waitable** but non-blocking: callers post every send and
//! receive of an exchange first and only then call `.wait()` on the handles.
//!
//! Tags are never drawn from global state. Each exchange takes a [`CommTag`]
//! issued by a [`TagAllocator`] that the caller threads through, so several
//! hierarchies can live in one process without cross-talk.

use bytes::Bytes;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Non-blocking communication interface (minimal by design).
pub trait Communicator: Sized {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    /// Rank of the caller within this communicator.
    fn rank(&self) -> usize;
    /// Number of ranks in this communicator.
    fn size(&self) -> usize;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    /// Post a receive of `buf.len()` bytes from `peer`.
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    /// Collective over `self`: build the sub-communicator over `members`
    /// (ranks of `self`, in the order that defines the new ranks).
    ///
    /// Returns `None` on ranks that are not in `members`.
    fn split(&self, members: &[usize]) -> Option<Self>;
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Message tag for one exchange.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CommTag(pub u16);

impl CommTag {
    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }

    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Sub-tag `k` of this tag's reserved stride.
    pub const fn offset(self, k: u16) -> Self {
        Self(self.0.wrapping_add(k))
    }
}

/// Number of consecutive sub-tags reserved by every allocation.
pub const TAG_STRIDE: u16 = 64;

/// Issues message tags in a deterministic sequence.
///
/// Every rank of a communicator must draw tags in the same order for the same
/// exchanges.
#[derive(Clone, Debug)]
pub struct TagAllocator {
    next: u16,
}

impl TagAllocator {
    pub fn new(base: CommTag) -> Self {
        Self { next: base.0 }
    }

    /// Reserve the next `TAG_STRIDE` sub-tags and return the first.
    pub fn next_tag(&mut self) -> CommTag {
        let tag = CommTag(self.next);
        self.next = self.next.wrapping_add(TAG_STRIDE);
        tag
    }
}

impl Default for TagAllocator {
    fn default() -> Self {
        Self::new(CommTag(0x1000))
    }
}

/// Compile-time no-op comm for pure serial runs.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}
    fn split(&self, members: &[usize]) -> Option<Self> {
        (members == [0]).then_some(NoComm)
    }
}

// --- LocalComm: in-process ranks on threads ---

/// (context, src, dst, tag) with src/dst as universe ranks.
type Key = (u64, usize, usize, u16);

#[derive(Debug, Default)]
struct Mailbox {
    slots: DashMap<Key, VecDeque<Bytes>>,
}

/// In-process communicator: each rank lives on its own thread and all ranks of
/// one universe share a mailbox. Messages with the same key are delivered in
/// FIFO order.
#[derive(Clone, Debug)]
pub struct LocalComm {
    mailbox: Arc<Mailbox>,
    context: u64,
    members: Arc<[usize]>,
    rank: usize,
}

impl LocalComm {
    /// Create the `size` ranks of a fresh universe.
    pub fn universe(size: usize) -> Vec<LocalComm> {
        let mailbox = Arc::new(Mailbox::default());
        let members: Arc<[usize]> = (0..size).collect();
        (0..size)
            .map(|rank| LocalComm {
                mailbox: mailbox.clone(),
                context: 0,
                members: members.clone(),
                rank,
            })
            .collect()
    }

    fn key(&self, src: usize, dst: usize, tag: u16) -> Key {
        (self.context, self.members[src], self.members[dst], tag)
    }
}

/// Receive handle of [`LocalComm`].
pub struct LocalRecvHandle {
    mailbox: Arc<Mailbox>,
    key: Key,
}

impl Wait for LocalRecvHandle {
    fn wait(self) -> Option<Vec<u8>> {
        loop {
            if let Some(mut queue) = self.mailbox.slots.get_mut(&self.key) {
                if let Some(bytes) = queue.pop_front() {
                    return Some(bytes.to_vec());
                }
            }
            std::thread::yield_now();
        }
    }
}

impl Communicator for LocalComm {
    type SendHandle = ();
    type RecvHandle = LocalRecvHandle;

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.members.len()
    }

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
        let key = self.key(self.rank, peer, tag);
        self.mailbox
            .slots
            .entry(key)
            .or_default()
            .push_back(Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16, _buf: &mut [u8]) -> Self::RecvHandle {
        LocalRecvHandle {
            mailbox: self.mailbox.clone(),
            key: self.key(peer, self.rank, tag),
        }
    }

    fn split(&self, members: &[usize]) -> Option<Self> {
        let rank = members.iter().position(|&m| m == self.rank)?;
        let mut hasher = DefaultHasher::new();
        self.context.hash(&mut hasher);
        members.hash(&mut hasher);
        Some(LocalComm {
            mailbox: self.mailbox.clone(),
            context: hasher.finish(),
            members: members.iter().map(|&m| self.members[m]).collect(),
            rank,
        })
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{Communicator, Wait};
    use mpi::request::{Request, StaticScope};
    use mpi::topology::{Color, SimpleCommunicator};
    use mpi::traits::*;

    /// MPI communicator; sub-communicators are freed when dropped.
    pub struct MpiComm {
        comm: SimpleCommunicator,
        rank: usize,
        size: usize,
    }

    impl MpiComm {
        pub fn new(comm: SimpleCommunicator) -> Self {
            let rank = comm.rank() as usize;
            let size = comm.size() as usize;
            Self { comm, rank, size }
        }

        pub fn world(universe: &mpi::environment::Universe) -> Self {
            Self::new(universe.world())
        }

        pub fn raw(&self) -> &SimpleCommunicator {
            &self.comm
        }
    }

    /// Owns the message buffer until the request completes.
    pub struct MpiHandle {
        request: Request<'static, [u8], StaticScope>,
        buf: *mut [u8],
        returns_data: bool,
    }

    impl Wait for MpiHandle {
        fn wait(self) -> Option<Vec<u8>> {
            self.request.wait();
            // SAFETY: `buf` came from `Box::into_raw` and the only borrow of it
            // was held by the request, which has now completed.
            let data = unsafe { Box::from_raw(self.buf) };
            self.returns_data.then(|| data.into_vec())
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiHandle;
        type RecvHandle = MpiHandle;

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> MpiHandle {
            let raw = Box::into_raw(buf.to_vec().into_boxed_slice());
            // SAFETY: the allocation outlives the request; see `MpiHandle::wait`.
            let data: &'static [u8] = unsafe { &*raw };
            let request = self
                .comm
                .process_at_rank(peer as i32)
                .immediate_send_with_tag(StaticScope, data, i32::from(tag));
            MpiHandle {
                request,
                buf: raw,
                returns_data: false,
            }
        }

        fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> MpiHandle {
            let raw = Box::into_raw(vec![0u8; buf.len()].into_boxed_slice());
            // SAFETY: as above.
            let data: &'static mut [u8] = unsafe { &mut *raw };
            let request = self
                .comm
                .process_at_rank(peer as i32)
                .immediate_receive_into_with_tag(StaticScope, data, i32::from(tag));
            MpiHandle {
                request,
                buf: raw,
                returns_data: true,
            }
        }

        fn split(&self, members: &[usize]) -> Option<Self> {
            let (color, key) = match members.iter().position(|&m| m == self.rank) {
                Some(pos) => (Color::with_value(members[0] as i32), pos as i32),
                None => (Color::undefined(), 0),
            };
            self.comm
                .split_by_color_with_key(color, key)
                .map(MpiComm::new)
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;
