//! Collective communication between the ranks of a process grid.
//!
//! The engine is written in SPMD style: every rank runs the same driver and
//! synchronises only through blocking collectives. The [`Communicator`] trait is
//! the whole contract the numerical code relies on:
//!
//! * `rank` / `size` queries;
//! * `all_reduce_sum` over `f64` words, with a deterministic reduction order so
//!   that every rank receives bit-identical results;
//! * `barrier`.
//!
//! Steps that can fail on a subset of ranks (root-only I/O, per-column
//! numerical checks) go through [`agree`], so that either every rank carries on
//! or every rank returns an error.
//!
//! Two implementations are provided. [`SelfComm`] is the trivial single-rank
//! communicator. [`ThreadComm`] realises a world of `p` ranks inside one OS
//! process, one thread per rank, exchanging contributions through shared
//! reduction slots.

use crate::error::{ErrorKind, PseudospectrumError};
use crate::scalar::{ShiftScalar, pack_slice, unpack_slice};
use parking_lot::Mutex;
use std::sync::{Arc, Barrier};

/// A group of ranks that take part in blocking collectives together.
///
/// All ranks of a communicator must call the same collectives in the same order
/// with buffers of the same length. Violations are logic errors and panic.
pub trait Communicator: Send {
    /// Rank of the caller within this communicator.
    fn rank(&self) -> usize;

    /// Number of ranks in this communicator.
    fn size(&self) -> usize;

    /// Replaces `buf` on every rank with the elementwise sum over all ranks.
    ///
    /// Contributions are summed in rank order on every rank.
    fn all_reduce_sum(&self, buf: &mut [f64]);

    /// Blocks until every rank of the communicator has arrived.
    fn barrier(&self);

    /// Sum-reduction of arbitrary shift scalars, shipped as `f64` words.
    fn all_reduce_sum_scalars<T: ShiftScalar>(&self, buf: &mut [T])
    where
        Self: Sized,
    {
        if self.size() == 1 || buf.is_empty() {
            return;
        }
        let mut words = pack_slice(buf);
        self.all_reduce_sum(&mut words);
        unpack_slice(&words, buf);
    }

    /// Sum-reduction of counters. Exact for values below 2^53.
    fn all_reduce_sum_counts(&self, buf: &mut [usize])
    where
        Self: Sized,
    {
        if self.size() == 1 || buf.is_empty() {
            return;
        }
        let mut words: Vec<f64> = buf.iter().map(|&v| v as f64).collect();
        self.all_reduce_sum(&mut words);
        for (dst, src) in buf.iter_mut().zip(words) {
            *dst = src as usize;
        }
    }
}

/// The communicator of a single rank. Every collective is a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelfComm;

impl Communicator for SelfComm {
    #[inline]
    fn rank(&self) -> usize {
        0
    }

    #[inline]
    fn size(&self) -> usize {
        1
    }

    #[inline]
    fn all_reduce_sum(&self, _buf: &mut [f64]) {}

    #[inline]
    fn barrier(&self) {}
}

struct Shared {
    size: usize,
    barrier: Barrier,
    slots: Mutex<Vec<Vec<f64>>>,
}

/// One rank's handle onto an in-process communicator.
///
/// Handles are created together by [`ThreadComm::world`] and are moved into the
/// threads that play the individual ranks.
#[derive(Clone)]
pub struct ThreadComm {
    rank: usize,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ThreadComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadComm")
            .field("rank", &self.rank)
            .field("size", &self.shared.size)
            .finish()
    }
}

impl ThreadComm {
    /// Creates the `size` rank handles of a fresh communicator.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero.
    pub fn world(size: usize) -> Vec<ThreadComm> {
        assert!(size > 0, "A communicator needs at least one rank");
        let shared = Arc::new(Shared {
            size,
            barrier: Barrier::new(size),
            slots: Mutex::new(vec![Vec::new(); size]),
        });
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect()
    }
}

impl Communicator for ThreadComm {
    #[inline]
    fn rank(&self) -> usize {
        self.rank
    }

    #[inline]
    fn size(&self) -> usize {
        self.shared.size
    }

    fn all_reduce_sum(&self, buf: &mut [f64]) {
        if self.shared.size == 1 {
            return;
        }
        {
            let mut slots = self.shared.slots.lock();
            slots[self.rank].clear();
            slots[self.rank].extend_from_slice(buf);
        }
        self.shared.barrier.wait();
        {
            let slots = self.shared.slots.lock();
            for (r, slot) in slots.iter().enumerate() {
                assert_eq!(
                    slot.len(),
                    buf.len(),
                    "all_reduce_sum: rank {} contributed {} words but rank {} expects {}",
                    r,
                    slot.len(),
                    self.rank,
                    buf.len()
                );
            }
            for (i, value) in buf.iter_mut().enumerate() {
                let mut acc = 0.0;
                for slot in slots.iter() {
                    acc += slot[i];
                }
                *value = acc;
            }
        }
        // Nobody may overwrite a slot before every rank has read all of them.
        self.shared.barrier.wait();
    }

    fn barrier(&self) {
        self.shared.barrier.wait();
    }
}

/// Collective agreement on the outcome of a step that may fail locally.
///
/// Every rank of `comm` must call this with its own `result`. If any rank
/// failed, every rank returns an error: failing ranks keep their own, the
/// others get a peer failure naming `what`.
pub fn agree<T, C>(
    comm: &C,
    result: Result<T, PseudospectrumError>,
    what: &'static str,
) -> Result<T, PseudospectrumError>
where
    C: Communicator,
{
    let mut failures = [usize::from(result.is_err())];
    comm.all_reduce_sum_counts(&mut failures);
    match result {
        Ok(_) if failures[0] > 0 => Err(ErrorKind::PeerFailure(what).into()),
        result => result,
    }
}
