//! # mcsim_engine: the simulator driver and observer set
//!
//! The [`Simulator`](simulator::Simulator) owns the fix schedule, step size,
//! sample count, seed and the shared random driver; per fix it carries an
//! observer cloned from a template. Observers accumulate weighted
//! statistics of the root agent's state at each fix.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod observers;
pub mod simulator;

pub use observers::{
    Bounds, CrossMoments, Expectation, Histogram, Observer, ObserverVec, Scenarios, Statistics,
};
pub use simulator::Simulator;
