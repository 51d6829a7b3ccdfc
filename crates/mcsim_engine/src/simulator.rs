//! The simulation driver: fix schedule, stepping and the sample loop.

use std::cell::RefCell;
use std::rc::Rc;

use mcsim_agents::agent::Agent;
use mcsim_agents::driver::{RandomDriver, SharedDriver, SimContext};
use mcsim_agents::linkage::{Shared, SharedScalar};
use mcsim_core::types::error::{SimError, SimResult};
use mcsim_core::types::time::{Span, Time, YearFraction};
use tracing::debug;

use crate::observers::Observer;

/// Drives a root agent through the fix schedule for a number of sample
/// paths, feeding one observer per fix.
///
/// The simulator owns the random driver; every agent in the graph
/// references it through the context handed to `init`. Between fixes the
/// root is advanced in increments of the step size, always landing exactly
/// on the fix — so the first path visits every time point any path will
/// ever visit, which is what cached agents rely on.
pub struct Simulator<O: Observer + Clone> {
    start: Time,
    fixes: Vec<Time>,
    observers: Vec<O>,
    template: O,
    step: Span,
    samples: usize,
    seed: u64,
    year_fraction: YearFraction,
    driver: SharedDriver,
}

impl<O: Observer + Clone> Simulator<O> {
    /// A simulator cloning `template` for every added fix.
    ///
    /// Defaults: start 0, a single step spanning each whole fix interval,
    /// one sample, the engine's default seed and ACT/365.
    pub fn new(template: O) -> Self {
        Self {
            start: 0,
            fixes: Vec::new(),
            observers: Vec::new(),
            template,
            step: Span::MAX,
            samples: 1,
            seed: 839_823,
            year_fraction: YearFraction::default(),
            driver: Rc::new(RefCell::new(RandomDriver::new())),
        }
    }

    /// Sets the simulation start time.
    pub fn set_start(&mut self, start: Time) {
        self.start = start;
    }

    /// Sets the stepping increment used between fixes.
    pub fn set_step(&mut self, step: Span) {
        self.step = step;
    }

    /// Sets the number of sample paths.
    pub fn set_samples(&mut self, samples: usize) {
        self.samples = samples;
    }

    /// Sets the random seed applied at `init`.
    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
    }

    /// Sets the year-fraction convention threaded to every agent.
    pub fn set_year_fraction(&mut self, year_fraction: YearFraction) {
        self.year_fraction = year_fraction;
    }

    /// Appends a fix, cloning the observer template for it.
    pub fn add_fix(&mut self, fix: Time) -> SimResult<()> {
        let observer = self.template.clone();
        self.add_fix_with(fix, observer)
    }

    /// Appends a fix with an explicitly configured observer.
    pub fn add_fix_with(&mut self, fix: Time, observer: O) -> SimResult<()> {
        if let Some(&last) = self.fixes.last() {
            if fix <= last {
                return Err(SimError::InvalidSchedule(format!(
                    "fix times must be strictly increasing ({} then {})",
                    last, fix
                )));
            }
        }
        self.fixes.push(fix);
        self.observers.push(observer);
        Ok(())
    }

    /// Clears every fix and its observer.
    pub fn clear_fixes(&mut self) {
        self.fixes.clear();
        self.observers.clear();
    }

    /// Replaces the template and every per-fix observer.
    pub fn set_observers(&mut self, observer: O) {
        for slot in &mut self.observers {
            *slot = observer.clone();
        }
        self.template = observer;
    }

    /// The fix schedule.
    pub fn fixes(&self) -> &[Time] {
        &self.fixes
    }

    /// The observer at fix index `i`.
    pub fn observer(&self, i: usize) -> &O {
        &self.observers[i]
    }

    /// Mutable access to the observer at fix index `i` (to configure agent
    /// lists before a run).
    pub fn observer_mut(&mut self, i: usize) -> &mut O {
        &mut self.observers[i]
    }

    /// The shared random driver.
    pub fn driver(&self) -> &SharedDriver {
        &self.driver
    }

    /// Runs the simulation: binds the observers to `root`, optionally
    /// (re)initialises the graph, then sweeps `samples` paths over the fix
    /// schedule observing at each fix, and closes the observers.
    ///
    /// With `reset_at_end` the driver and graph are left rewound, ready for
    /// inspection or another run.
    pub fn simulate<C>(&mut self, root: &Shared<C>, init: bool, reset_at_end: bool) -> SimResult<()>
    where
        C: Agent<State = f64> + 'static,
    {
        let last_fix = *self.fixes.last().ok_or_else(|| {
            SimError::not_configured("simulator", "simulate called before adding time fixes")
        })?;

        debug!(
            start = self.start,
            end = last_fix,
            fixes = self.fixes.len(),
            samples = self.samples,
            seed = self.seed,
            "starting simulation"
        );

        let erased: SharedScalar = root.clone();
        for observer in &mut self.observers {
            observer.bind(erased.clone());
        }

        if init {
            self.driver.borrow_mut().seed(self.seed);
            let ctx = SimContext::new(self.driver.clone(), self.year_fraction);
            root.borrow_mut().init(self.start, last_fix, &ctx)?;
            for observer in &mut self.observers {
                observer.init()?;
            }
        }

        for _ in 0..self.samples {
            self.driver.borrow_mut().reset();
            root.borrow_mut().reset()?;

            let mut from = self.start;
            for (i, &fix) in self.fixes.iter().enumerate() {
                self.advance(root, from, fix)?;
                let weight = self.driver.borrow().weight();
                self.observers[i].observe(weight)?;
                from = fix;
            }
        }

        for observer in &mut self.observers {
            observer.end()?;
        }

        if reset_at_end {
            self.driver.borrow_mut().reset();
            root.borrow_mut().reset()?;
        }

        debug!("simulation finished");
        Ok(())
    }

    /// Steps the root from `from` (exclusive) to `to`, landing exactly on
    /// `to`.
    fn advance<C>(&self, root: &Shared<C>, from: Time, to: Time) -> SimResult<()>
    where
        C: Agent<State = f64> + 'static,
    {
        let mut t = from.saturating_add(self.step);
        while t <= to {
            root.borrow_mut().update(t)?;
            t = t.saturating_add(self.step);
        }
        root.borrow_mut().update(to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observers::Statistics;
    use approx::assert_relative_eq;
    use mcsim_agents::agent::{AgentCore, Lifecycle, Process};
    use mcsim_agents::basic::TimeProcess;
    use mcsim_agents::linkage::DepList;

    fn shared<T>(value: T) -> Shared<T> {
        Rc::new(RefCell::new(value))
    }

    #[test]
    fn fixes_must_increase() {
        let mut sim = Simulator::new(Statistics::new());
        sim.add_fix(10).unwrap();
        let err = sim.add_fix(10).unwrap_err();
        assert!(matches!(err, SimError::InvalidSchedule(_)));
        sim.add_fix(20).unwrap();
        assert_eq!(sim.fixes(), &[10, 20]);
    }

    #[test]
    fn empty_schedule_is_rejected() {
        let mut sim = Simulator::new(Statistics::new());
        let root = shared(TimeProcess::new());
        let err = sim.simulate(&root, true, true).unwrap_err();
        assert!(matches!(err, SimError::NotConfigured { .. }));
    }

    /// Counts updates to verify the stepping grid.
    #[derive(Default)]
    struct StepProbe {
        core: AgentCore<f64>,
        deps: DepList,
        visited: Vec<Time>,
    }

    impl Process for StepProbe {
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
        fn on_update(&mut self) -> mcsim_core::SimResult<bool> {
            let t = self.core.time();
            self.visited.push(t);
            Ok(true)
        }
    }

    mcsim_agents::impl_agent!(StepProbe);

    #[test]
    fn stepping_lands_exactly_on_fixes() {
        let mut sim = Simulator::new(Statistics::new());
        sim.set_step(30);
        sim.set_samples(1);
        sim.add_fix(45).unwrap();
        sim.add_fix(100).unwrap();

        let root = shared(StepProbe::default());
        sim.simulate(&root, true, false).unwrap();

        // 30 then the fix at 45; 75, then the fix at 100.
        assert_eq!(root.borrow().visited, vec![30, 45, 75, 100]);
    }

    #[test]
    fn default_step_jumps_fix_to_fix() {
        let mut sim = Simulator::new(Statistics::new());
        sim.add_fix(45).unwrap();
        sim.add_fix(100).unwrap();

        let root = shared(StepProbe::default());
        sim.simulate(&root, true, false).unwrap();
        assert_eq!(root.borrow().visited, vec![45, 100]);
    }

    #[test]
    fn reset_at_end_rewinds_the_graph() {
        let mut sim = Simulator::new(Statistics::new());
        sim.add_fix(100).unwrap();
        let root = shared(TimeProcess::new());
        sim.simulate(&root, true, true).unwrap();
        assert_eq!(root.borrow().time(), 0);
        assert_relative_eq!(root.borrow().state(), 0.0);
    }

    #[test]
    fn observers_see_every_sample() {
        let mut sim = Simulator::new(Statistics::new());
        sim.set_samples(10);
        sim.add_fix(100).unwrap();
        let root = shared(TimeProcess::new());
        sim.simulate(&root, true, true).unwrap();

        let stats = sim.observer(0);
        assert_relative_eq!(stats.expectation(), 100.0);
        assert!(stats.variance().abs() < 1e-12);
    }
}
