//! Replay caching for deterministic agents.
//!
//! A cached agent computes its trajectory once, on the first path of a
//! simulation, and replays the recorded `(time, state, live)` sequence on
//! every later path. Correctness rests on two conditions: the simulator
//! visits the same fixes on every path (it does, by construction), and the
//! wrapped process never consumes the shared random stream — a cached agent
//! drawing variates would replay stale values *and* desynchronise every
//! consumer of the stream. The framework cannot check the latter; do not
//! cache stochastic agents.

use mcsim_core::types::error::SimResult;
use mcsim_core::types::time::{Span, Time};
use mcsim_core::xml::{short_type_name, XmlSink, XmlTag};
use tracing::trace;

use crate::agent::{Agent, Lifecycle, Process};
use crate::driver::SimContext;

struct Record<S> {
    time: Time,
    state: S,
    live: bool,
}

/// Caching wrapper: same lifecycle contract as the wrapped process, with
/// first-path recording and later-path replay.
///
/// Records are kept strictly time-ordered. An off-schedule update on a later
/// path falls through to a real computation and inserts a record mid-list;
/// this is permitted but alters the cache for the paths that follow.
pub struct Cached<P: Process> {
    inner: P,
    records: Vec<Record<P::State>>,
    cursor: usize,
}

impl<P: Process> Cached<P> {
    /// Wraps a process in a replay cache.
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            records: Vec::new(),
            cursor: 0,
        }
    }

    /// The wrapped process.
    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Mutable access to the wrapped process, for configuration calls.
    pub fn inner_mut(&mut self) -> &mut P {
        &mut self.inner
    }

    /// Number of recorded time points.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    fn record_current(&mut self) {
        let core = self.inner.core();
        let record = Record {
            time: core.time(),
            state: core.state.clone(),
            live: core.is_live(),
        };
        self.records.insert(self.cursor, record);
    }
}

impl<P: Process + Lifecycle> Lifecycle for Cached<P> {
    fn init(&mut self, start: Time, end: Time, ctx: &SimContext) -> SimResult<()> {
        if self.inner.core().init_done() {
            return Ok(());
        }
        self.inner.deps().init_all(start, end, ctx)?;
        self.inner.core_mut().begin_init(start, end, ctx);
        self.inner.on_init()?;
        self.inner.core_mut().finish_init();
        self.records.clear();
        self.cursor = 0;
        Ok(())
    }

    fn reset(&mut self) -> SimResult<()> {
        if self.inner.core().reset_done() {
            return Ok(());
        }

        self.cursor = 0;
        if let Some(first) = self.records.first() {
            let (time, state, live) = (first.time, first.state.clone(), first.live);
            self.inner.core_mut().adopt(time, state, live);
            return Ok(());
        }

        trace!(agent = short_type_name::<P>(), "cached agent first reset");
        self.inner.deps().reset_all()?;
        self.inner.core_mut().begin_reset();
        self.inner.on_reset()?;
        self.inner.core_mut().finish_reset();
        self.record_current();
        Ok(())
    }

    fn update(&mut self, t: Time) -> SimResult<()> {
        if !self.inner.core().is_live() || t <= self.inner.core().time() {
            return Ok(());
        }

        while self.cursor < self.records.len() && self.records[self.cursor].time < t {
            self.cursor += 1;
        }
        if self.cursor < self.records.len() && self.records[self.cursor].time == t {
            let record = &self.records[self.cursor];
            let (time, state, live) = (record.time, record.state.clone(), record.live);
            self.inner.core_mut().adopt(time, state, live);
            return Ok(());
        }

        trace!(
            agent = short_type_name::<P>(),
            time = t,
            "cached agent computing new record"
        );
        self.inner.deps().update_all(t)?;
        self.inner.core_mut().begin_update(t);
        let live = self.inner.on_update()?;
        self.inner.core_mut().set_live(live);
        self.record_current();
        Ok(())
    }

    fn is_live(&self) -> bool {
        self.inner.core().is_live()
    }

    fn time(&self) -> Time {
        self.inner.core().time()
    }

    fn dtime(&self) -> Span {
        self.inner.core().dtime()
    }

    fn dump(&self, sink: &mut XmlSink) {
        sink.open(
            XmlTag::new("cached")
                .attr("node", format!("{:p}", self))
                .attr("records", self.records.len()),
        );
        self.inner.dump(sink);
        sink.close();
    }
}

impl<P: Process + Lifecycle> Agent for Cached<P> {
    type State = P::State;

    /// The state at the current record.
    ///
    /// Reading before the first `reset` returns the process default state;
    /// a debug build asserts against it.
    fn state(&self) -> P::State {
        debug_assert!(
            !self.records.is_empty(),
            "cached agent read before its first reset"
        );
        self.inner.core().state.clone()
    }
}
