//! Basic simulation agents: time, constants, line samplers, the gearbox and
//! the random variates.

use std::rc::Rc;

use mcsim_core::math::distributions::norm_inv_cdf;
use mcsim_core::math::line::Line;
use mcsim_core::types::error::{SimError, SimResult};
use mcsim_core::types::time::{Span, Time};
use mcsim_core::xml::{short_type_name, XmlSink, XmlTag};

use crate::agent::{Agent, AgentCore, Lifecycle, Process};
use crate::cached::Cached;
use crate::driver::SimContext;
use crate::linkage::{require, DepList, Shared, SharedAgent, SharedScalar};

/// The time process: its state is the current time coordinate as a float.
#[derive(Default)]
pub struct TimeProcess {
    core: AgentCore<f64>,
    deps: DepList,
}

impl TimeProcess {
    /// A fresh time process.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Process for TimeProcess {
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

    fn on_reset(&mut self) -> SimResult<()> {
        self.core.state = self.core.time() as f64;
        Ok(())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        self.core.state = self.core.time() as f64;
        Ok(true)
    }
}

crate::impl_agent!(TimeProcess);

/// Constant process.
///
/// The value may be changed during a simulation (it is often used as a
/// counter): `init` captures the current value and every `reset` restores
/// that capture. Implemented directly against the agent contract rather
/// than through [`Process`]; it needs none of the bookkeeping.
pub struct Constant<S: Clone> {
    state: S,
    initial: S,
    start: Time,
    time: Time,
}

impl<S: Clone> Constant<S> {
    /// A constant holding `value`.
    pub fn new(value: S) -> Self {
        Self {
            state: value.clone(),
            initial: value,
            start: 0,
            time: 0,
        }
    }

    /// Overwrites the current value.
    pub fn set(&mut self, value: S) {
        self.state = value;
    }
}

impl<S: Clone + 'static> Lifecycle for Constant<S> {
    fn init(&mut self, start: Time, _end: Time, _ctx: &SimContext) -> SimResult<()> {
        self.initial = self.state.clone();
        self.start = start;
        self.time = start;
        Ok(())
    }

    fn reset(&mut self) -> SimResult<()> {
        self.state = self.initial.clone();
        self.time = self.start;
        Ok(())
    }

    fn update(&mut self, t: Time) -> SimResult<()> {
        if t > self.time {
            self.time = t;
        }
        Ok(())
    }

    fn is_live(&self) -> bool {
        true
    }

    fn time(&self) -> Time {
        self.time
    }

    fn dtime(&self) -> Span {
        0
    }

    fn dump(&self, sink: &mut XmlSink) {
        sink.leaf(XmlTag::new(short_type_name::<Self>()).attr("node", format!("{:p}", self)));
    }
}

impl<S: Clone + 'static> Agent for Constant<S> {
    type State = S;

    fn state(&self) -> S {
        self.state.clone()
    }
}

/// Samples a math line at the current time. Deterministic, so normally used
/// behind the [`Cached`] wrapper; see [`cached_line_sampler`].
pub struct LineSampler {
    core: AgentCore<f64>,
    deps: DepList,
    line: Option<Rc<dyn Line>>,
}

impl LineSampler {
    /// A sampler over `line`.
    pub fn new(line: Rc<dyn Line>) -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            line: Some(line),
        }
    }

    fn sample(&mut self) -> SimResult<()> {
        let line = require(&self.line, "line sampler")?;
        self.core.state = line.value(self.core.time() as f64);
        Ok(())
    }
}

impl Process for LineSampler {
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

    fn on_reset(&mut self) -> SimResult<()> {
        self.sample()
    }

    fn on_update(&mut self) -> SimResult<bool> {
        self.sample()?;
        Ok(true)
    }
}

crate::impl_agent!(LineSampler);

/// A cached line sampler: the usual static-curve process.
pub fn cached_line_sampler(line: Rc<dyn Line>) -> Cached<LineSampler> {
    Cached::new(LineSampler::new(line))
}

/// Replays a source process on a fixed sub-step grid.
///
/// On every update the gearbox drives its source through intermediate steps
/// of the configured size before the target time, then mirrors the source
/// state. The source is driven manually, so it must not also be reachable
/// through another parent's dependency list at finer times.
pub struct Gearbox<S: Clone + Default + 'static> {
    core: AgentCore<S>,
    deps: DepList,
    source: Option<SharedAgent<S>>,
    step: Span,
    last: Time,
}

impl<S: Clone + Default + 'static> Gearbox<S> {
    /// An unconfigured gearbox.
    pub fn new() -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            source: None,
            step: 1,
            last: 0,
        }
    }

    /// Connects the source process and the sub-step size.
    pub fn setup<C>(&mut self, source: &Shared<C>, step: Span)
    where
        C: Agent<State = S> + 'static,
    {
        self.source = Some(source.clone() as SharedAgent<S>);
        self.step = step;
    }
}

impl<S: Clone + Default + 'static> Default for Gearbox<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Clone + Default + 'static> Process for Gearbox<S> {
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
        if self.step < 1 {
            return Err(SimError::InvalidSchedule(
                "gearbox step must be at least one day".to_string(),
            ));
        }
        let source = require(&self.source, "gearbox source")?;
        let ctx = self.core.context()?;
        source
            .borrow_mut()
            .init(self.core.start(), self.core.end(), &ctx)
    }

    fn on_reset(&mut self) -> SimResult<()> {
        let source = require(&self.source, "gearbox source")?;
        source.borrow_mut().reset()?;
        self.last = self.core.start();
        self.core.state = source.borrow().state();
        Ok(())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        let source = require(&self.source, "gearbox source")?;
        let target = self.core.time();
        let mut next = self.last + self.step;
        while next <= target {
            source.borrow_mut().update(next)?;
            self.last = next;
            next += self.step;
        }
        source.borrow_mut().update(target)?;
        self.core.state = source.borrow().state();
        Ok(source.borrow().is_live())
    }

    fn dump_attrs(&self, tag: XmlTag) -> XmlTag {
        let tag = tag.attr("step", self.step);
        match &self.source {
            Some(source) => tag.attr("source", format!("{:p}", Rc::as_ptr(source))),
            None => tag,
        }
    }
}

impl<S: Clone + Default + 'static> Lifecycle for Gearbox<S> {
    fn init(&mut self, start: Time, end: Time, ctx: &SimContext) -> SimResult<()> {
        crate::agent::run_init(self, start, end, ctx)
    }

    fn reset(&mut self) -> SimResult<()> {
        crate::agent::run_reset(self)
    }

    fn update(&mut self, t: Time) -> SimResult<()> {
        crate::agent::run_update(self, t)
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
        crate::agent::run_dump(self, sink)
    }
}

impl<S: Clone + Default + 'static> Agent for Gearbox<S> {
    type State = S;

    fn state(&self) -> S {
        self.core.state.clone()
    }
}

/// Uniformly distributed random process on `[0, 1)`.
///
/// Consumes exactly one driver draw per update.
#[derive(Default)]
pub struct UniformVariate {
    core: AgentCore<f64>,
    deps: DepList,
}

impl UniformVariate {
    /// A fresh uniform variate.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Process for UniformVariate {
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
        self.core.state = self.core.draw()?;
        Ok(true)
    }
}

crate::impl_agent!(UniformVariate);

/// Standard normal random process.
///
/// Transforms one uniform draw per update through the inverse normal CDF,
/// keeping the draw count independent of the sampling method.
#[derive(Default)]
pub struct GaussianVariate {
    core: AgentCore<f64>,
    deps: DepList,
}

impl GaussianVariate {
    /// A fresh Gaussian variate.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Process for GaussianVariate {
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
        self.core.state = norm_inv_cdf(self.core.draw()?);
        Ok(true)
    }
}

crate::impl_agent!(GaussianVariate);

/// Shifts the mean of a Gaussian process and compensates the path weight
/// with the likelihood ratio (importance sampling).
///
/// For a shift `theta`, the state is `x + theta` and each step multiplies
/// `exp(theta^2 / 2 - theta * state)` into the driver weight, so weighted
/// expectations are unchanged while the sampled paths concentrate where the
/// shift points.
pub struct GaussianTwister {
    core: AgentCore<f64>,
    deps: DepList,
    source: Option<SharedScalar>,
    theta: f64,
    half_theta_sq: f64,
}

impl GaussianTwister {
    /// An unconfigured twister.
    pub fn new() -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            source: None,
            theta: 0.0,
            half_theta_sq: 0.0,
        }
    }

    /// Connects the underlying Gaussian process and sets the mean shift.
    pub fn setup<C>(&mut self, source: &Shared<C>, theta: f64)
    where
        C: Agent<State = f64> + 'static,
    {
        self.deps.clear();
        self.deps.push(source);
        self.source = Some(source.clone() as SharedScalar);
        self.theta = theta;
        self.half_theta_sq = theta * theta / 2.0;
    }

    fn step(&mut self) -> SimResult<bool> {
        let source = require(&self.source, "gaussian twister source")?;
        self.core.state = source.borrow().state() + self.theta;
        let weight = (self.half_theta_sq - self.theta * self.core.state).exp();
        self.core.update_weight(weight)?;
        Ok(true)
    }
}

impl Default for GaussianTwister {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for GaussianTwister {
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
        require(&self.source, "gaussian twister source").map(|_| ())
    }

    fn on_reset(&mut self) -> SimResult<()> {
        self.step().map(|_| ())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        self.step()
    }

    fn dump_attrs(&self, tag: XmlTag) -> XmlTag {
        tag.attr("theta", self.theta)
    }
}

crate::impl_agent!(GaussianTwister);
