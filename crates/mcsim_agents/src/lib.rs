//! # mcsim_agents: the agent evaluation framework
//!
//! An agent is a stateful stochastic or deterministic process indexed by a
//! totally-ordered time coordinate. Agents form a DAG through shared
//! ownership; the framework drives the graph through the fixed lifecycle
//! `init -> (reset -> update*)*` with strict child-before-parent ordering,
//! a single shared random stream with a multiplicative path weight, and
//! optional replay caching for agents that never consume random draws.
//!
//! The crate provides:
//! - the [`driver`] (random stream + path weight + per-simulation context)
//! - the lifecycle traits and bookkeeping core ([`agent`], [`linkage`])
//! - replay caching ([`cached`])
//! - basic agents, operators, memory/lookback, expressions, stochastic
//!   models and the state adaptor

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod adaptor;
pub mod agent;
pub mod basic;
pub mod cached;
pub mod driver;
pub mod expressions;
pub mod linkage;
pub mod memory;
pub mod models;
pub mod operators;

pub use agent::{Agent, AgentCore, Lifecycle, Process};
pub use cached::Cached;
pub use driver::{RandomDriver, SharedDriver, SimContext};
pub use linkage::{DepList, Shared, SharedAgent, SharedFlag, SharedScalar};

/// Paths used by the [`impl_agent!`](crate::impl_agent) macro expansion; not
/// part of the public API.
#[doc(hidden)]
pub mod __private {
    pub use mcsim_core::types::error::SimResult;
    pub use mcsim_core::types::time::{Span, Time};
    pub use mcsim_core::xml::XmlSink;
}
