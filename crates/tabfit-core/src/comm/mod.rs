//! Collective communication behind the evaluation protocol.
//!
//! The engine only ever needs four collectives: flag broadcast, value
//! broadcast, sum reduction onto the coordinator, and an in-place segment
//! gather. [`SoloCommunicator`] serves single-process runs;
//! [`ThreadGroup`] forms an in-process SPMD group of ranks connected by
//! barriers and shared slots, one handle per rank.

use std::sync::{Arc, Barrier, Mutex, MutexGuard};

pub trait Communicator {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    fn is_coordinator(&self) -> bool {
        self.rank() == 0
    }

    /// Coordinator's value wins; every other rank's `flag` is overwritten.
    fn broadcast_flag(&self, flag: &mut i32);

    /// Coordinator's buffer wins; all buffers must have equal length.
    fn broadcast_values(&self, values: &mut [f64]);

    /// Sum of every rank's `local`, delivered to the coordinator only.
    fn reduce_sum(&self, local: f64) -> Option<f64>;

    /// Merge per-rank buffer segments onto the coordinator. Rank `r` owns
    /// `buffer[offsets[r]..offsets[r] + lengths[r]]`; the coordinator's own
    /// segment is already in place. Non-coordinator buffers are left
    /// untouched.
    fn gather_segments(&self, buffer: &mut [f64], offsets: &[usize], lengths: &[usize]);
}

/// Single-process communicator: every collective is the identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoloCommunicator;

impl Communicator for SoloCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn broadcast_flag(&self, _flag: &mut i32) {}

    fn broadcast_values(&self, _values: &mut [f64]) {}

    fn reduce_sum(&self, local: f64) -> Option<f64> {
        Some(local)
    }

    fn gather_segments(&self, _buffer: &mut [f64], _offsets: &[usize], _lengths: &[usize]) {}
}

struct GroupShared {
    size: usize,
    barrier: Barrier,
    flag_slot: Mutex<i32>,
    value_slot: Mutex<Vec<f64>>,
    partial_sum: Mutex<f64>,
    inbox: Mutex<Vec<(usize, Vec<f64>)>>,
}

/// One rank's handle into an in-process SPMD group.
///
/// All ranks must call the same sequence of collectives; each collective is
/// a synchronization point for the whole group, mirroring the blocking
/// semantics of a message-passing world.
pub struct ThreadGroup {
    shared: Arc<GroupShared>,
    rank: usize,
}

impl ThreadGroup {
    /// Create a group of `size` connected rank handles; handle `r` is
    /// rank `r`, rank 0 is the coordinator.
    pub fn split(size: usize) -> Vec<ThreadGroup> {
        let shared = Arc::new(GroupShared {
            size,
            barrier: Barrier::new(size),
            flag_slot: Mutex::new(0),
            value_slot: Mutex::new(Vec::new()),
            partial_sum: Mutex::new(0.0),
            inbox: Mutex::new(Vec::new()),
        });
        (0..size)
            .map(|rank| ThreadGroup {
                shared: Arc::clone(&shared),
                rank,
            })
            .collect()
    }

    fn lock<'a, T>(slot: &'a Mutex<T>) -> MutexGuard<'a, T> {
        // A poisoned slot only means another rank panicked mid-collective;
        // the stored data is still plain numbers.
        slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Communicator for ThreadGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn broadcast_flag(&self, flag: &mut i32) {
        if self.is_coordinator() {
            *Self::lock(&self.shared.flag_slot) = *flag;
        }
        self.shared.barrier.wait();
        if !self.is_coordinator() {
            *flag = *Self::lock(&self.shared.flag_slot);
        }
        self.shared.barrier.wait();
    }

    fn broadcast_values(&self, values: &mut [f64]) {
        if self.is_coordinator() {
            let mut slot = Self::lock(&self.shared.value_slot);
            slot.clear();
            slot.extend_from_slice(values);
        }
        self.shared.barrier.wait();
        if !self.is_coordinator() {
            values.copy_from_slice(&Self::lock(&self.shared.value_slot));
        }
        self.shared.barrier.wait();
    }

    fn reduce_sum(&self, local: f64) -> Option<f64> {
        if self.is_coordinator() {
            *Self::lock(&self.shared.partial_sum) = 0.0;
        }
        self.shared.barrier.wait();
        *Self::lock(&self.shared.partial_sum) += local;
        self.shared.barrier.wait();
        self.is_coordinator()
            .then(|| *Self::lock(&self.shared.partial_sum))
    }

    fn gather_segments(&self, buffer: &mut [f64], offsets: &[usize], lengths: &[usize]) {
        self.shared.barrier.wait();
        if !self.is_coordinator() {
            let start = offsets[self.rank];
            let segment = buffer[start..start + lengths[self.rank]].to_vec();
            Self::lock(&self.shared.inbox).push((start, segment));
        }
        self.shared.barrier.wait();
        if self.is_coordinator() {
            for (start, segment) in Self::lock(&self.shared.inbox).drain(..) {
                buffer[start..start + segment.len()].copy_from_slice(&segment);
            }
        }
    }
}
