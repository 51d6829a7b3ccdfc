//! The agent lifecycle contract and its bookkeeping core.
//!
//! Concrete agents implement [`Process`]: they embed an [`AgentCore`] (the
//! schedule, state and flag bookkeeping), expose their dependency list, and
//! fill in the `on_init` / `on_reset` / `on_update` hooks. The
//! [`impl_agent!`](crate::impl_agent) macro (or, for generic agents, a short
//! hand-written delegation to [`run_init`] / [`run_reset`] / [`run_update`])
//! then derives the public [`Lifecycle`] / [`Agent`] contract with the
//! standard choreography:
//!
//! - `init` runs once per simulation run (re-entry through a shared parent is
//!   a no-op), recursing into dependencies first, and snapshots the state for
//!   `reset`.
//! - `reset` restores the snapshot, rewinds time to `start`, revives the
//!   agent, and is idempotent until the next `update`.
//! - `update(t)` with `t <= time` is a no-op; otherwise dependencies advance
//!   to `t` before the owner computes, and an agent that went non-live stops
//!   computing while still forwarding time to its children.
//!
//! A child shared by several parents is advanced exactly once per time point:
//! the second parent's call arrives with `t <= time` and returns immediately.

use mcsim_core::types::error::{SimError, SimResult};
use mcsim_core::types::time::{Span, Time, YearFraction};
use mcsim_core::xml::{short_type_name, XmlSink, XmlTag};
use tracing::trace;

use crate::driver::SimContext;
use crate::linkage::DepList;

/// Type-erased lifecycle surface of an agent; what parents need to drive a
/// child without knowing its state type.
pub trait Lifecycle {
    /// Prepares the agent (and recursively its dependencies) for a
    /// simulation run over `[start, end]`.
    fn init(&mut self, start: Time, end: Time, ctx: &SimContext) -> SimResult<()>;

    /// Rewinds to the state saved at the end of `init`. Called at the start
    /// of every sample path.
    fn reset(&mut self) -> SimResult<()>;

    /// Moves forward in time. Never moves time backward.
    fn update(&mut self, t: Time) -> SimResult<()>;

    /// False once the agent stopped changing for the remainder of the path.
    fn is_live(&self) -> bool;

    /// Current time coordinate.
    fn time(&self) -> Time;

    /// Interval covered by the most recent update.
    fn dtime(&self) -> Span;

    /// Writes a tagged introspection record, nesting dependency records.
    fn dump(&self, sink: &mut XmlSink);
}

/// An agent: a lifecycle plus a typed observable state.
pub trait Agent: Lifecycle {
    /// The observable state type; must be cheap to clone.
    type State: Clone;

    /// Read-only access to the post-update state.
    fn state(&self) -> Self::State;
}

/// Schedule, state and flag bookkeeping embedded by every [`Process`].
#[derive(Clone, Default)]
pub struct AgentCore<S> {
    /// Current state, written by the process hooks.
    pub state: S,
    state0: S,
    start: Time,
    end: Time,
    time: Time,
    dtime: Span,
    live: bool,
    init_done: bool,
    reset_done: bool,
    ctx: Option<SimContext>,
}

impl<S: Clone + Default> AgentCore<S> {
    /// A core holding the default state, not yet initialised.
    pub fn new() -> Self {
        Self {
            state: S::default(),
            state0: S::default(),
            start: 0,
            end: 0,
            time: 0,
            dtime: 0,
            live: false,
            init_done: false,
            reset_done: false,
            ctx: None,
        }
    }

    /// Simulation start time.
    #[inline]
    pub fn start(&self) -> Time {
        self.start
    }

    /// Simulation end time.
    #[inline]
    pub fn end(&self) -> Time {
        self.end
    }

    /// Current time coordinate.
    #[inline]
    pub fn time(&self) -> Time {
        self.time
    }

    /// Interval covered by the most recent update.
    #[inline]
    pub fn dtime(&self) -> Span {
        self.dtime
    }

    /// Liveness flag.
    #[inline]
    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Overrides the liveness flag; used by hooks that detect termination
    /// outside `on_update` (memory triggers firing during reset, for
    /// instance).
    #[inline]
    pub fn set_live(&mut self, live: bool) {
        self.live = live;
    }

    /// True between a completed `init` and the next `reset`.
    #[inline]
    pub fn init_done(&self) -> bool {
        self.init_done
    }

    /// True between a completed `reset` and the next `update`.
    #[inline]
    pub fn reset_done(&self) -> bool {
        self.reset_done
    }

    /// The per-simulation context; an error before `init` ran.
    pub fn context(&self) -> SimResult<SimContext> {
        self.ctx
            .clone()
            .ok_or_else(|| SimError::invalid_state("agent", "used before init"))
    }

    /// The year-fraction convention of the current run (engine default
    /// before `init`).
    pub fn year_fraction(&self) -> YearFraction {
        self.ctx
            .as_ref()
            .map(|c| c.year_fraction())
            .unwrap_or_default()
    }

    /// Converts a span to years under the run's convention.
    #[inline]
    pub fn years(&self, dt: Span) -> f64 {
        self.year_fraction().years(dt)
    }

    /// The most recent update interval in years.
    #[inline]
    pub fn dt_years(&self) -> f64 {
        self.years(self.dtime)
    }

    /// Next uniform deviate from the shared driver.
    pub fn draw(&self) -> SimResult<f64> {
        let ctx = self
            .ctx
            .as_ref()
            .ok_or_else(|| SimError::invalid_state("agent", "random draw before init"))?;
        Ok(ctx.driver().borrow_mut().draw())
    }

    /// Multiplies `w` into the shared path weight.
    pub fn update_weight(&self, w: f64) -> SimResult<()> {
        let ctx = self
            .ctx
            .as_ref()
            .ok_or_else(|| SimError::invalid_state("agent", "weight update before init"))?;
        ctx.driver().borrow_mut().update_weight(w);
        Ok(())
    }

    pub(crate) fn begin_init(&mut self, start: Time, end: Time, ctx: &SimContext) {
        self.ctx = Some(ctx.clone());
        self.start = start;
        self.time = start;
        self.end = end;
    }

    pub(crate) fn finish_init(&mut self) {
        self.state0 = self.state.clone();
        self.init_done = true;
        self.reset_done = false;
    }

    pub(crate) fn begin_reset(&mut self) {
        self.time = self.start;
        self.state = self.state0.clone();
        self.dtime = 0;
        self.live = true;
        self.init_done = false;
    }

    pub(crate) fn finish_reset(&mut self) {
        self.reset_done = true;
    }

    pub(crate) fn begin_update(&mut self, t: Time) {
        self.reset_done = false;
        self.dtime = t - self.time;
        self.time = t;
    }

    /// Installs a replayed `(time, state, live)` record; used by the caching
    /// wrapper.
    pub(crate) fn adopt(&mut self, time: Time, state: S, live: bool) {
        self.time = time;
        self.state = state;
        self.live = live;
    }
}

/// The component-specific part of an agent.
///
/// Implementors embed an [`AgentCore`], list their traversal dependencies in
/// a [`DepList`], and compute in the hooks; [`impl_agent!`](crate::impl_agent)
/// adds the [`Lifecycle`] and [`Agent`] impls with the choreography described
/// at module level. Hooks run after the dependencies have been brought to the
/// current time, so a hook sees post-update children.
pub trait Process {
    /// The observable state type.
    type State: Clone + Default + 'static;

    /// The embedded bookkeeping core.
    fn core(&self) -> &AgentCore<Self::State>;

    /// Mutable access to the embedded core.
    fn core_mut(&mut self) -> &mut AgentCore<Self::State>;

    /// Dependencies traversed by `init`/`reset`/`update` before the hooks
    /// run. Agents that drive a child manually (sub-stepping, trigger
    /// gating) keep it out of this list.
    fn deps(&self) -> &DepList;

    /// Computes whatever `init` needs beyond the bookkeeping; the state at
    /// the end of this hook becomes the `reset` snapshot.
    fn on_init(&mut self) -> SimResult<()> {
        Ok(())
    }

    /// Computes the start-of-path state; runs after the snapshot has been
    /// restored.
    fn on_reset(&mut self) -> SimResult<()> {
        Ok(())
    }

    /// Computes the state at the (already advanced) current time; the
    /// return value becomes the liveness flag.
    fn on_update(&mut self) -> SimResult<bool> {
        Ok(true)
    }

    /// Adds constructor-style attributes to the introspection record.
    fn dump_attrs(&self, tag: XmlTag) -> XmlTag {
        tag
    }
}

/// Standard `init` choreography over a [`Process`]: guard the idempotence
/// flag, initialise dependencies, run the hook, snapshot the state.
pub fn run_init<P: Process>(agent: &mut P, start: Time, end: Time, ctx: &SimContext) -> SimResult<()> {
    if agent.core().init_done() {
        return Ok(());
    }
    trace!(
        agent = short_type_name::<P>(),
        start,
        end,
        "initialising agent"
    );
    agent.deps().init_all(start, end, ctx)?;
    agent.core_mut().begin_init(start, end, ctx);
    agent.on_init()?;
    agent.core_mut().finish_init();
    Ok(())
}

/// Standard `reset` choreography over a [`Process`].
pub fn run_reset<P: Process>(agent: &mut P) -> SimResult<()> {
    if agent.core().reset_done() {
        return Ok(());
    }
    agent.deps().reset_all()?;
    agent.core_mut().begin_reset();
    agent.on_reset()?;
    agent.core_mut().finish_reset();
    Ok(())
}

/// Standard `update` choreography over a [`Process`]: stale times are
/// no-ops, dependencies advance first, a dead agent skips its own step.
pub fn run_update<P: Process>(agent: &mut P, t: Time) -> SimResult<()> {
    if t <= agent.core().time() {
        return Ok(());
    }
    agent.deps().update_all(t)?;
    if !agent.core().is_live() {
        return Ok(());
    }
    agent.core_mut().begin_update(t);
    let live = agent.on_update()?;
    agent.core_mut().set_live(live);
    Ok(())
}

/// Standard introspection record over a [`Process`]: type name, node
/// identity, `dump_attrs` attributes and nested dependency records.
pub fn run_dump<P: Process>(agent: &P, sink: &mut XmlSink) {
    let tag = XmlTag::new(short_type_name::<P>()).attr("node", format!("{:p}", agent));
    let tag = agent.dump_attrs(tag);
    if agent.deps().is_empty() {
        sink.leaf(tag);
    } else {
        sink.open(tag);
        agent.deps().dump_all(sink);
        sink.close();
    }
}

/// Derives the [`Lifecycle`] and [`Agent`] impls for a concrete [`Process`]
/// type by delegating to the standard choreography.
///
/// Generic agents write the same eight one-line methods by hand; wrapper
/// agents with their own choreography (the caching wrapper, adaptors)
/// implement the traits directly instead.
///
/// ```
/// use mcsim_agents::agent::{AgentCore, Process};
/// use mcsim_agents::linkage::DepList;
///
/// #[derive(Default)]
/// struct Flat {
///     core: AgentCore<f64>,
///     deps: DepList,
/// }
///
/// impl Process for Flat {
///     type State = f64;
///     fn core(&self) -> &AgentCore<f64> { &self.core }
///     fn core_mut(&mut self) -> &mut AgentCore<f64> { &mut self.core }
///     fn deps(&self) -> &DepList { &self.deps }
/// }
///
/// mcsim_agents::impl_agent!(Flat);
/// ```
#[macro_export]
macro_rules! impl_agent {
    ($ty:ty) => {
        impl $crate::agent::Lifecycle for $ty {
            fn init(
                &mut self,
                start: $crate::__private::Time,
                end: $crate::__private::Time,
                ctx: &$crate::driver::SimContext,
            ) -> $crate::__private::SimResult<()> {
                $crate::agent::run_init(self, start, end, ctx)
            }

            fn reset(&mut self) -> $crate::__private::SimResult<()> {
                $crate::agent::run_reset(self)
            }

            fn update(
                &mut self,
                t: $crate::__private::Time,
            ) -> $crate::__private::SimResult<()> {
                $crate::agent::run_update(self, t)
            }

            fn is_live(&self) -> bool {
                $crate::agent::Process::core(self).is_live()
            }

            fn time(&self) -> $crate::__private::Time {
                $crate::agent::Process::core(self).time()
            }

            fn dtime(&self) -> $crate::__private::Span {
                $crate::agent::Process::core(self).dtime()
            }

            fn dump(&self, sink: &mut $crate::__private::XmlSink) {
                $crate::agent::run_dump(self, sink)
            }
        }

        impl $crate::agent::Agent for $ty {
            type State = <$ty as $crate::agent::Process>::State;

            fn state(&self) -> Self::State {
                $crate::agent::Process::core(self).state.clone()
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linkage::Shared;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Test process: counts hook invocations, state is the update count.
    #[derive(Default)]
    struct Probe {
        core: AgentCore<f64>,
        deps: DepList,
        inits: usize,
        resets: usize,
        updates: usize,
        die_at: Option<Time>,
    }

    impl Process for Probe {
        type State = f64;

        fn core(&self) -> &AgentCore<f64> {
            &self.core
        }
        fn core_mut(&mut self) -> &mut AgentCore<f64> {
            &mut self.core
        }
        fn deps(&self) -> &DepList {
            &self.deps
        }
        fn on_init(&mut self) -> SimResult<()> {
            self.inits += 1;
            Ok(())
        }
        fn on_reset(&mut self) -> SimResult<()> {
            self.resets += 1;
            Ok(())
        }
        fn on_update(&mut self) -> SimResult<bool> {
            self.updates += 1;
            self.core.state += 1.0;
            Ok(self.die_at.map_or(true, |d| self.core.time() < d))
        }
    }

    crate::impl_agent!(Probe);

    fn shared<T>(value: T) -> Shared<T> {
        Rc::new(RefCell::new(value))
    }

    #[test]
    fn init_is_idempotent_within_a_run() {
        let ctx = SimContext::standalone();
        let mut probe = Probe::default();
        probe.init(0, 10, &ctx).unwrap();
        probe.init(0, 10, &ctx).unwrap();
        assert_eq!(probe.inits, 1);
        assert_eq!(probe.time(), 0);
    }

    #[test]
    fn reset_restores_snapshot_and_rearms_init() {
        let ctx = SimContext::standalone();
        let mut probe = Probe::default();
        probe.init(0, 10, &ctx).unwrap();
        probe.reset().unwrap();
        probe.update(5).unwrap();
        assert_eq!(probe.state(), 1.0);
        assert_eq!(probe.time(), 5);

        probe.reset().unwrap();
        assert_eq!(probe.state(), 0.0);
        assert_eq!(probe.time(), 0);
        assert_eq!(probe.dtime(), 0);

        // A second reset without an intervening update is a no-op.
        probe.reset().unwrap();
        assert_eq!(probe.resets, 2);

        // Re-init after reset is allowed again.
        probe.init(0, 10, &ctx).unwrap();
        assert_eq!(probe.inits, 2);
    }

    #[test]
    fn stale_update_is_a_noop() {
        let ctx = SimContext::standalone();
        let mut probe = Probe::default();
        probe.init(0, 10, &ctx).unwrap();
        probe.reset().unwrap();
        probe.update(5).unwrap();
        probe.update(5).unwrap();
        probe.update(3).unwrap();
        assert_eq!(probe.updates, 1);
        assert_eq!(probe.time(), 5);
        assert_eq!(probe.dtime(), 5);
    }

    #[test]
    fn monotone_time_over_update_sequences() {
        let ctx = SimContext::standalone();
        let mut probe = Probe::default();
        probe.init(0, 100, &ctx).unwrap();
        probe.reset().unwrap();
        for t in [3, 1, 7, 7, 2, 9] {
            probe.update(t).unwrap();
        }
        assert_eq!(probe.time(), 9);
    }

    #[test]
    fn dead_agent_stops_computing() {
        let ctx = SimContext::standalone();
        let mut probe = Probe {
            die_at: Some(5),
            ..Probe::default()
        };
        probe.init(0, 10, &ctx).unwrap();
        probe.reset().unwrap();
        probe.update(5).unwrap();
        assert!(!probe.is_live());
        let frozen = probe.state();
        probe.update(8).unwrap();
        assert_eq!(probe.state(), frozen);
        assert_eq!(probe.time(), 5);

        // Reset revives it.
        probe.reset().unwrap();
        assert!(probe.is_live());
    }

    /// Parent with two traversal dependencies; its state is the sum of the
    /// children's.
    struct Pair {
        core: AgentCore<f64>,
        deps: DepList,
        left: Shared<Probe>,
        right: Shared<Probe>,
    }

    impl Process for Pair {
        type State = f64;

        fn core(&self) -> &AgentCore<f64> {
            &self.core
        }
        fn core_mut(&mut self) -> &mut AgentCore<f64> {
            &mut self.core
        }
        fn deps(&self) -> &DepList {
            &self.deps
        }
        fn on_update(&mut self) -> SimResult<bool> {
            self.core.state = self.left.borrow().state() + self.right.borrow().state();
            Ok(true)
        }
    }

    crate::impl_agent!(Pair);

    #[test]
    fn shared_child_is_advanced_exactly_once() {
        let child = shared(Probe::default());
        let mut deps = DepList::new();
        deps.push(&child);
        deps.push(&child); // same child under two edges
        let mut parent = Pair {
            core: AgentCore::new(),
            deps,
            left: child.clone(),
            right: child.clone(),
        };

        let ctx = SimContext::standalone();
        parent.init(0, 10, &ctx).unwrap();
        assert_eq!(child.borrow().inits, 1);

        parent.reset().unwrap();
        parent.update(4).unwrap();
        assert_eq!(child.borrow().updates, 1);
        assert_eq!(parent.state(), 2.0);
    }

    #[test]
    fn children_advance_even_when_parent_is_dead() {
        let child = shared(Probe::default());
        let mut deps = DepList::new();
        deps.push(&child);
        let mut parent = Pair {
            core: AgentCore::new(),
            deps,
            left: child.clone(),
            right: child.clone(),
        };

        let ctx = SimContext::standalone();
        parent.init(0, 10, &ctx).unwrap();
        parent.reset().unwrap();
        parent.core_mut().set_live(false);
        parent.update(6).unwrap();
        assert_eq!(child.borrow().time(), 6);
        assert_eq!(parent.time(), 0);
    }

    #[test]
    fn dump_writes_nested_records() {
        let child = shared(Probe::default());
        let mut deps = DepList::new();
        deps.push(&child);
        let parent = Pair {
            core: AgentCore::new(),
            deps,
            left: child.clone(),
            right: child,
        };

        let mut sink = XmlSink::new();
        parent.dump(&mut sink);
        let out = sink.finish();
        assert!(out.starts_with("<Pair"));
        assert!(out.contains("<Probe"));
        assert!(out.ends_with("</Pair>"));
    }
}
