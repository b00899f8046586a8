//! Sharded ingress statistics.
//!
//! Counters are incremented from every execution context that processes
//! packets, so a single atomic per counter would serialize the hot path.
//! Each context hashes to a shard of cache-line padded atomics; reads
//! aggregate across shards.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::DropReason;

/// The counter set, mirroring the classic per-stack MIB group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum Counter {
    /// Datagrams presented to the pipeline.
    InReceives,
    /// Datagrams delivered to a protocol handler or observer.
    InDelivers,
    /// Structural header failures (malformed, bad checksum, bad version).
    InHdrErrors,
    /// Routing said the host is unreachable.
    InAddrErrors,
    /// Routing said the network is unreachable.
    InNoRoutes,
    /// Buffer shorter than the header claims.
    InTruncatedPkts,
    /// Discards for resource or policy reasons.
    InDiscards,
    /// No handler registered and no observer claimed the packet.
    InUnknownProtos,
    /// Datagrams whose route classified them as multicast.
    InMcastPkts,
    /// Datagrams whose route classified them as broadcast.
    InBcastPkts,
    /// Datagrams handed to the forwarding sink.
    ForwDatagrams,
}

impl Counter {
    pub const COUNT: usize = 11;

    pub const ALL: [Counter; Counter::COUNT] = [
        Counter::InReceives,
        Counter::InDelivers,
        Counter::InHdrErrors,
        Counter::InAddrErrors,
        Counter::InNoRoutes,
        Counter::InTruncatedPkts,
        Counter::InDiscards,
        Counter::InUnknownProtos,
        Counter::InMcastPkts,
        Counter::InBcastPkts,
        Counter::ForwDatagrams,
    ];

    /// Which counter a terminal drop increments.
    pub fn for_drop(reason: &DropReason) -> Counter {
        match reason {
            DropReason::Truncated => Counter::InTruncatedPkts,
            DropReason::Malformed | DropReason::ChecksumMismatch | DropReason::HeaderError => {
                Counter::InHdrErrors
            }
            DropReason::HostUnreachable => Counter::InAddrErrors,
            DropReason::NetworkUnreachable => Counter::InNoRoutes,
            DropReason::UnsupportedInNamespace { .. }
            | DropReason::ResourceExhausted
            | DropReason::ProtocolLoop { .. }
            | DropReason::PolicyDrop => Counter::InDiscards,
        }
    }
}

/// One shard: a full counter block on its own cache lines.
#[repr(align(64))]
struct Shard {
    counters: [AtomicU64; Counter::COUNT],
}

impl Shard {
    fn new() -> Self {
        Self {
            counters: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }
}

/// Sharded counter accumulator.
pub struct IngressStats {
    shards: Box<[Shard]>,
}

impl IngressStats {
    /// `shard_count` is rounded up to at least one; size it to the number
    /// of concurrent execution contexts.
    pub fn new(shard_count: usize) -> Self {
        let count = shard_count.max(1);
        Self {
            shards: (0..count).map(|_| Shard::new()).collect(),
        }
    }

    fn shard(&self) -> &Shard {
        // Each execution context gets a stable slot; collisions only
        // cost contention, never correctness.
        use std::sync::atomic::AtomicUsize;
        static NEXT_CONTEXT: AtomicUsize = AtomicUsize::new(0);
        thread_local! {
            static CONTEXT_SLOT: usize = NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed);
        }
        let idx = CONTEXT_SLOT.with(|slot| *slot) % self.shards.len();
        &self.shards[idx]
    }

    pub fn increment(&self, counter: Counter) {
        self.shard().counters[counter as usize].fetch_add(1, Ordering::Relaxed);
    }

    /// Aggregate value of one counter across all shards.
    pub fn get(&self, counter: Counter) -> u64 {
        self.shards
            .iter()
            .map(|s| s.counters[counter as usize].load(Ordering::Relaxed))
            .sum()
    }

    /// Aggregate every counter for reporting.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            values: std::array::from_fn(|i| self.get(Counter::ALL[i])),
        }
    }
}

impl Default for IngressStats {
    fn default() -> Self {
        Self::new(std::thread::available_parallelism().map_or(1, |n| n.get()))
    }
}

/// A point-in-time aggregation of all counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    values: [u64; Counter::COUNT],
}

impl StatsSnapshot {
    pub fn get(&self, counter: Counter) -> u64 {
        self.values[counter as usize]
    }
}
