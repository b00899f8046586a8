//! Inspection checkpoints.
//!
//! A checkpoint is a named point where externally registered hooks may
//! accept, drop, or take over a packet before the pipeline continues.
//! The dispatch skeleton knows nothing about what a hook does; it only
//! honors the verdict. An empty checkpoint is equivalent to an
//! unconditional proceed.

use std::sync::{Arc, RwLock};

use ingress4_core::PacketBuf;

/// The two checkpoints the pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    /// After structural validation, before routing resolution.
    PreRouting,
    /// Immediately before local-delivery demultiplexing.
    LocalIn,
}

/// Outcome of running a checkpoint. Ownership of the packet is expressed
/// in the type: only `Proceed` hands it back.
#[derive(Debug)]
pub enum Verdict {
    /// Continue with the (possibly modified) packet.
    Proceed(PacketBuf),
    /// Release the packet; silent discard.
    Drop,
    /// The hook now owns the packet; the pipeline must not touch it again.
    Steal,
}

/// A single registered inspection hook.
pub trait InspectHook: Send + Sync {
    /// Name used in trace events.
    fn name(&self) -> &str;

    fn inspect(&self, packet: PacketBuf) -> Verdict;
}

/// Ordered hook lists for both checkpoints.
///
/// Registration is rare and takes the write lock; evaluation clones the
/// hook handles out under the read lock so no lock is held across a
/// hook call.
#[derive(Default)]
pub struct HookRegistry {
    pre_routing: RwLock<Vec<Arc<dyn InspectHook>>>,
    local_in: RwLock<Vec<Arc<dyn InspectHook>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn list(&self, checkpoint: Checkpoint) -> &RwLock<Vec<Arc<dyn InspectHook>>> {
        match checkpoint {
            Checkpoint::PreRouting => &self.pre_routing,
            Checkpoint::LocalIn => &self.local_in,
        }
    }

    /// Append a hook; hooks run in registration order.
    pub fn register(&self, checkpoint: Checkpoint, hook: Arc<dyn InspectHook>) {
        self.list(checkpoint)
            .write()
            .expect("hook registry lock poisoned")
            .push(hook);
    }

    /// Remove a hook by name. Returns whether anything was removed.
    pub fn unregister(&self, checkpoint: Checkpoint, name: &str) -> bool {
        let mut hooks = self
            .list(checkpoint)
            .write()
            .expect("hook registry lock poisoned");
        let before = hooks.len();
        hooks.retain(|h| h.name() != name);
        hooks.len() != before
    }

    /// Run every hook at `checkpoint` in order until one terminates the
    /// traversal.
    pub fn run(&self, checkpoint: Checkpoint, packet: PacketBuf) -> Verdict {
        let hooks: Vec<_> = self
            .list(checkpoint)
            .read()
            .expect("hook registry lock poisoned")
            .clone();

        let mut current = packet;
        for hook in &hooks {
            match hook.inspect(current) {
                Verdict::Proceed(p) => current = p,
                Verdict::Drop => {
                    tracing::debug!(checkpoint = ?checkpoint, hook = hook.name(), "hook dropped packet");
                    return Verdict::Drop;
                }
                Verdict::Steal => {
                    tracing::debug!(checkpoint = ?checkpoint, hook = hook.name(), "hook stole packet");
                    return Verdict::Steal;
                }
            }
        }
        Verdict::Proceed(current)
    }
}
