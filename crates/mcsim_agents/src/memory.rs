//! Agents that remember past states: trigger-list memory, ramp memory and
//! the lookback window.

use std::collections::VecDeque;

use mcsim_core::types::error::{SimError, SimResult};
use mcsim_core::types::time::{Span, Time};
use mcsim_core::xml::{XmlSink, XmlTag};

use crate::agent::{run_dump, run_init, run_reset, run_update, Agent, AgentCore, Lifecycle, Process};
use crate::driver::SimContext;
use crate::linkage::{require, DepList, Shared, SharedAgent, SharedScalar};

/// Records the value of a source process at preset trigger times.
///
/// The source is driven manually: at a trigger it is brought to the current
/// time and sampled; between triggers it is advanced only when
/// `always_update` is set (needed when the source must keep consuming its
/// own random stream to preserve downstream path coupling). The agent goes
/// non-live once the last trigger has fired.
pub struct Memory<S: Clone + Default + 'static> {
    core: AgentCore<S>,
    deps: DepList,
    source: Option<SharedAgent<S>>,
    triggers: Vec<Time>,
    cursor: usize,
    start_cursor: usize,
    always_update: bool,
}

impl<S: Clone + Default + 'static> Memory<S> {
    /// An unconfigured memory.
    pub fn new() -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            source: None,
            triggers: Vec::new(),
            cursor: 0,
            start_cursor: 0,
            always_update: true,
        }
    }

    /// Connects the source, the ascending trigger times, the between-trigger
    /// update policy and the initial state.
    pub fn setup<C>(
        &mut self,
        source: &Shared<C>,
        triggers: Vec<Time>,
        always_update: bool,
        initial: S,
    ) -> SimResult<()>
    where
        C: Agent<State = S> + 'static,
    {
        for pair in triggers.windows(2) {
            if pair[1] <= pair[0] {
                return Err(SimError::InvalidSchedule(format!(
                    "memory triggers must be strictly increasing ({} then {})",
                    pair[0], pair[1]
                )));
            }
        }
        self.source = Some(source.clone() as SharedAgent<S>);
        self.triggers = triggers;
        self.always_update = always_update;
        self.core.state = initial;
        Ok(())
    }

    fn step(&mut self) -> SimResult<bool> {
        let source = require(&self.source, "memory source")?;
        let now = self.core.time();

        if self.cursor >= self.triggers.len() {
            return Ok(false);
        }

        if now >= self.triggers[self.cursor] {
            source.borrow_mut().update(now)?;
            self.core.state = source.borrow().state();
            while now >= self.triggers[self.cursor] {
                self.cursor += 1;
                if self.cursor >= self.triggers.len() {
                    return Ok(false);
                }
            }
        }

        if self.always_update {
            source.borrow_mut().update(now)?;
        }

        Ok(true)
    }
}

impl<S: Clone + Default + 'static> Default for Memory<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Clone + Default + 'static> Process for Memory<S> {
    type State = S;

    fn core(&self) -> &AgentCore<S> {
        &self.core
    }
    fn core_mut(&mut self) -> &mut AgentCore<S> {
        &mut self.core
    }
    fn deps(&self) -> &DepList {
        &self.deps
    }

    fn on_init(&mut self) -> SimResult<()> {
        let source = require(&self.source, "memory source")?;
        let ctx = self.core.context()?;
        source
            .borrow_mut()
            .init(self.core.start(), self.core.end(), &ctx)?;

        self.start_cursor = 0;
        while self.start_cursor < self.triggers.len()
            && self.core.start() > self.triggers[self.start_cursor]
        {
            self.start_cursor += 1;
        }
        Ok(())
    }

    fn on_reset(&mut self) -> SimResult<()> {
        let source = require(&self.source, "memory source")?;
        source.borrow_mut().reset()?;
        self.cursor = self.start_cursor;
        // A trigger crossed already at the start must freeze future updates.
        let live = self.step()?;
        self.core.set_live(live);
        Ok(())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        self.step()
    }

    fn dump_attrs(&self, tag: XmlTag) -> XmlTag {
        let mut tag = tag.attr("always_update", self.always_update);
        for trigger in &self.triggers {
            tag = tag.attr("trigger", trigger);
        }
        tag
    }
}

impl<S: Clone + Default + 'static> Lifecycle for Memory<S> {
    fn init(&mut self, start: Time, end: Time, ctx: &SimContext) -> SimResult<()> {
        run_init(self, start, end, ctx)
    }

    fn reset(&mut self) -> SimResult<()> {
        run_reset(self)
    }

    fn update(&mut self, t: Time) -> SimResult<()> {
        run_update(self, t)
    }

    fn is_live(&self) -> bool {
        self.core.is_live()
    }

    fn time(&self) -> Time {
        self.core.time()
    }

    fn dtime(&self) -> Span {
        self.core.dtime()
    }

    fn dump(&self, sink: &mut XmlSink) {
        run_dump(self, sink)
    }
}

impl<S: Clone + Default + 'static> Agent for Memory<S> {
    type State = S;

    fn state(&self) -> S {
        self.core.state.clone()
    }
}

/// Records the value of a source process every time a signal process
/// increases in value.
pub struct RampMemory<S: Clone + Default + 'static> {
    core: AgentCore<S>,
    deps: DepList,
    source: Option<SharedAgent<S>>,
    signal: Option<SharedScalar>,
    last_signal: f64,
    always_update: bool,
}

impl<S: Clone + Default + 'static> RampMemory<S> {
    /// An unconfigured ramp memory.
    pub fn new() -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            source: None,
            signal: None,
            last_signal: 0.0,
            always_update: true,
        }
    }

    /// Connects the source and signal processes, the between-trigger update
    /// policy and the initial state.
    pub fn setup<C, G>(
        &mut self,
        source: &Shared<C>,
        signal: &Shared<G>,
        always_update: bool,
        initial: S,
    ) where
        C: Agent<State = S> + 'static,
        G: Agent<State = f64> + 'static,
    {
        self.source = Some(source.clone() as SharedAgent<S>);
        self.signal = Some(signal.clone() as SharedScalar);
        self.always_update = always_update;
        self.core.state = initial;
    }
}

impl<S: Clone + Default + 'static> Default for RampMemory<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Clone + Default + 'static> Process for RampMemory<S> {
    type State = S;

    fn core(&self) -> &AgentCore<S> {
        &self.core
    }
    fn core_mut(&mut self) -> &mut AgentCore<S> {
        &mut self.core
    }
    fn deps(&self) -> &DepList {
        &self.deps
    }

    fn on_init(&mut self) -> SimResult<()> {
        let source = require(&self.source, "ramp memory source")?;
        let signal = require(&self.signal, "ramp memory signal")?;
        let ctx = self.core.context()?;
        let (start, end) = (self.core.start(), self.core.end());
        source.borrow_mut().init(start, end, &ctx)?;
        signal.borrow_mut().init(start, end, &ctx)
    }

    fn on_reset(&mut self) -> SimResult<()> {
        let source = require(&self.source, "ramp memory source")?;
        let signal = require(&self.signal, "ramp memory signal")?;
        source.borrow_mut().reset()?;
        signal.borrow_mut().reset()?;
        self.last_signal = signal.borrow().state();
        self.core.state = source.borrow().state();
        Ok(())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        let source = require(&self.source, "ramp memory source")?;
        let signal = require(&self.signal, "ramp memory signal")?;
        let now = self.core.time();

        signal.borrow_mut().update(now)?;
        let sig = signal.borrow().state();
        if sig > self.last_signal {
            source.borrow_mut().update(now)?;
            self.core.state = source.borrow().state();
        } else if self.always_update {
            source.borrow_mut().update(now)?;
        }
        self.last_signal = sig;
        Ok(true)
    }

    fn dump_attrs(&self, tag: XmlTag) -> XmlTag {
        tag.attr("always_update", self.always_update)
    }
}

impl<S: Clone + Default + 'static> Lifecycle for RampMemory<S> {
    fn init(&mut self, start: Time, end: Time, ctx: &SimContext) -> SimResult<()> {
        run_init(self, start, end, ctx)
    }

    fn reset(&mut self) -> SimResult<()> {
        run_reset(self)
    }

    fn update(&mut self, t: Time) -> SimResult<()> {
        run_update(self, t)
    }

    fn is_live(&self) -> bool {
        self.core.is_live()
    }

    fn time(&self) -> Time {
        self.core.time()
    }

    fn dtime(&self) -> Span {
        self.core.dtime()
    }

    fn dump(&self, sink: &mut XmlSink) {
        run_dump(self, sink)
    }
}

impl<S: Clone + Default + 'static> Agent for RampMemory<S> {
    type State = S;

    fn state(&self) -> S {
        self.core.state.clone()
    }
}

/// Reduction applied to the lookback window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueReducer {
    /// Oldest value still in the window (the delayed process).
    First,
    /// Sum of the window.
    Sum,
    /// Mean of the window.
    Mean,
    /// Root of the window's sum of squares over the window length plus one.
    Std,
}

impl QueueReducer {
    fn apply(self, queue: &VecDeque<(Time, f64)>) -> f64 {
        match self {
            QueueReducer::First => queue.front().map(|p| p.1).unwrap_or(0.0),
            QueueReducer::Sum => queue.iter().map(|p| p.1).sum(),
            QueueReducer::Mean => {
                let n = queue.len().max(1) as f64;
                queue.iter().map(|p| p.1).sum::<f64>() / n
            }
            QueueReducer::Std => {
                let sum_sq: f64 = queue.iter().map(|p| p.1 * p.1).sum();
                sum_sq.sqrt() / (queue.len() as f64 + 1.0)
            }
        }
    }
}

/// Sliding-window reducer over a delayed copy of the source.
///
/// Each update pushes the current source value stamped `time + period`,
/// drains every entry stamped at or before the current time, and exposes the
/// reduction of what remains.
pub struct Lookback {
    core: AgentCore<f64>,
    deps: DepList,
    source: Option<SharedScalar>,
    period: Span,
    reducer: QueueReducer,
    queue: VecDeque<(Time, f64)>,
}

impl Lookback {
    /// A lookback with the given reduction.
    pub fn new(reducer: QueueReducer) -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            source: None,
            period: 1,
            reducer,
            queue: VecDeque::new(),
        }
    }

    /// Connects the source and sets the window length. The period must be at
    /// least one day; a zero window would drain its own sample.
    pub fn setup<C>(&mut self, source: &Shared<C>, period: Span) -> SimResult<()>
    where
        C: Agent<State = f64> + 'static,
    {
        if period < 1 {
            return Err(SimError::InvalidSchedule(
                "lookback period must be at least one day".to_string(),
            ));
        }
        self.deps.clear();
        self.deps.push(source);
        self.source = Some(source.clone() as SharedScalar);
        self.period = period;
        Ok(())
    }

    fn step(&mut self) -> SimResult<bool> {
        let source = require(&self.source, "lookback source")?;
        let now = self.core.time();

        self.queue.push_back((now + self.period, source.borrow().state()));
        while self
            .queue
            .front()
            .map(|entry| entry.0 <= now)
            .unwrap_or(false)
        {
            self.queue.pop_front();
        }
        self.core.state = self.reducer.apply(&self.queue);
        Ok(true)
    }
}

impl Process for Lookback {
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
        require(&self.source, "lookback source").map(|_| ())
    }

    fn on_reset(&mut self) -> SimResult<()> {
        self.queue.clear();
        let live = self.step()?;
        self.core.set_live(live);
        Ok(())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        self.step()
    }

    fn dump_attrs(&self, tag: XmlTag) -> XmlTag {
        tag.attr("period", self.period)
            .attr("reducer", format!("{:?}", self.reducer))
    }
}

crate::impl_agent!(Lookback);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Lifecycle;
    use crate::basic::TimeProcess;
    use crate::driver::SimContext;
    use approx::assert_relative_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn time_agent() -> Shared<TimeProcess> {
        Rc::new(RefCell::new(TimeProcess::new()))
    }

    #[test]
    fn memory_snaps_at_triggers_only() {
        let ctx = SimContext::standalone();
        let t = time_agent();
        let mut mem = Memory::new();
        mem.setup(&t, vec![10, 30], true, -1.0).unwrap();
        mem.init(0, 100, &ctx).unwrap();
        mem.reset().unwrap();
        assert_relative_eq!(mem.state(), -1.0);

        mem.update(5).unwrap();
        assert_relative_eq!(mem.state(), -1.0);

        mem.update(12).unwrap();
        assert_relative_eq!(mem.state(), 12.0);

        mem.update(20).unwrap();
        assert_relative_eq!(mem.state(), 12.0);

        mem.update(30).unwrap();
        assert_relative_eq!(mem.state(), 30.0);
        // Final trigger fired: no longer live.
        assert!(!mem.is_live());

        mem.update(50).unwrap();
        assert_relative_eq!(mem.state(), 30.0);
    }

    #[test]
    fn memory_rejects_unsorted_triggers() {
        let t = time_agent();
        let mut mem: Memory<f64> = Memory::new();
        let err = mem.setup(&t, vec![10, 10], true, 0.0).unwrap_err();
        assert!(matches!(err, SimError::InvalidSchedule(_)));
    }

    #[test]
    fn memory_without_always_update_leaves_source_behind() {
        let ctx = SimContext::standalone();
        let t = time_agent();
        let mut mem = Memory::new();
        mem.setup(&t, vec![30], false, 0.0).unwrap();
        mem.init(0, 100, &ctx).unwrap();
        mem.reset().unwrap();
        mem.update(10).unwrap();
        assert_eq!(t.borrow().time(), 0);
        mem.update(30).unwrap();
        assert_eq!(t.borrow().time(), 30);
    }

    #[test]
    fn memory_skips_triggers_before_start() {
        let ctx = SimContext::standalone();
        let t = time_agent();
        let mut mem = Memory::new();
        mem.setup(&t, vec![5, 20], true, 0.0).unwrap();
        mem.init(10, 100, &ctx).unwrap();
        mem.reset().unwrap();
        mem.update(15).unwrap();
        assert_relative_eq!(mem.state(), 0.0);
        mem.update(20).unwrap();
        assert_relative_eq!(mem.state(), 20.0);
    }

    #[test]
    fn ramp_memory_snaps_on_signal_increase() {
        let ctx = SimContext::standalone();
        let src = time_agent();
        let sig = Rc::new(RefCell::new(crate::basic::Constant::new(0.0)));
        let mut mem = RampMemory::new();
        mem.setup(&src, &sig, true, -1.0);
        mem.init(0, 100, &ctx).unwrap();
        mem.reset().unwrap();

        mem.update(10).unwrap();
        assert_relative_eq!(mem.state(), -1.0);

        sig.borrow_mut().set(1.0);
        mem.update(20).unwrap();
        assert_relative_eq!(mem.state(), 20.0);

        mem.update(30).unwrap();
        assert_relative_eq!(mem.state(), 20.0);
    }

    #[test]
    fn lookback_first_delays_the_source() {
        let ctx = SimContext::standalone();
        let t = time_agent();
        let mut lb = Lookback::new(QueueReducer::First);
        lb.setup(&t, 20).unwrap();
        lb.init(0, 100, &ctx).unwrap();
        lb.reset().unwrap();
        // Window: [(20, 0)]
        lb.update(10).unwrap(); // [(20,0),(30,10)]
        assert_relative_eq!(lb.state(), 0.0);
        lb.update(20).unwrap(); // (20,0) drained -> [(30,10),(40,20)]
        assert_relative_eq!(lb.state(), 10.0);
        lb.update(40).unwrap(); // drains through (40,20) -> [(60,40)]
        assert_relative_eq!(lb.state(), 40.0);
    }

    #[test]
    fn lookback_mean_over_window() {
        let ctx = SimContext::standalone();
        let t = time_agent();
        let mut lb = Lookback::new(QueueReducer::Mean);
        lb.setup(&t, 100).unwrap();
        lb.init(0, 100, &ctx).unwrap();
        lb.reset().unwrap();
        lb.update(10).unwrap();
        lb.update(20).unwrap();
        // Window holds 0, 10, 20.
        assert_relative_eq!(lb.state(), 10.0);
    }

    #[test]
    fn lookback_rejects_degenerate_period() {
        let t = time_agent();
        let mut lb = Lookback::new(QueueReducer::Sum);
        assert!(matches!(
            lb.setup(&t, 0).unwrap_err(),
            SimError::InvalidSchedule(_)
        ));
    }
}
