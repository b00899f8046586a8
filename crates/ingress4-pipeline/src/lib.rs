//! IPv4 datagram ingress pipeline.
//!
//! This crate implements the receive-side dispatch skeleton: every raw
//! datagram handed up by a network interface is validated, run through
//! the inspection checkpoints, routed, has its options processed, and is
//! finally demultiplexed to a registered transport protocol handler, the
//! observer chain, or an error path.
//!
//! The pipeline executes synchronously on whatever context delivered the
//! packet. The only stage that can outlive a traversal is fragment
//! reassembly, which takes ownership of the in-flight packet and later
//! re-injects the completed datagram via
//! [`IngressPipeline::resume_local_delivery`].

pub mod config;
pub mod demux;
pub mod error;
pub mod hooks;
pub mod logging;
pub mod options;
pub mod pipeline;
pub mod ra_chain;
pub mod route;
pub mod stats;
pub mod validate;

pub use config::IngressConfig;
pub use demux::{
    HandlerFlags, HandlerOutcome, PolicyCheck, ProtocolHandler, ProtocolTable, Reassembler,
    ReassemblyContext, ReassemblyOutcome, TableError, UnreachableNotifier,
};
pub use error::DropReason;
pub use hooks::{Checkpoint, HookRegistry, InspectHook, Verdict};
pub use options::{SourceRouteError, SourceRouteHandler};
pub use pipeline::{Collaborators, IngressPipeline};
pub use ra_chain::{FanOut, Observer, ObserverChain, ObserverEntry, OwnerId};
pub use route::{ForwardSink, ResolveError, RouteResolver};
pub use stats::{Counter, IngressStats, StatsSnapshot};
