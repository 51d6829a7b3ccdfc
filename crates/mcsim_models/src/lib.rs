//! # mcsim_models: curves, cashflow legs and instruments
//!
//! Everything here is an agent in the sense of `mcsim_agents`: yield-curve
//! models exposing the discount-factor contract together with their bond
//! sub-agents, the rich cashflow leg, portfolio event machinery, and the
//! priced instruments (coupons, legs, cash accounts, forwards, options and
//! portfolios) over the composite `{value, flow, matured}` state.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod curves;
pub mod events;
pub mod flows;
pub mod instruments;
pub mod pricing;

pub use curves::{SharedCurve, YieldCurve};
pub use instruments::{InstrumentState, SharedInstrument};
