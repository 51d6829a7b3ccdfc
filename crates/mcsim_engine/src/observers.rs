//! Observers: per-fix accumulators over the root agent's state.
//!
//! The simulation weight passed to `observe` is the driver's path weight; an
//! observer must use it so that importance-sampled runs stay unbiased.

use mcsim_agents::linkage::SharedScalar;
use mcsim_core::math::numeric::TINY;
use mcsim_core::types::error::{SimError, SimResult};

/// Per-fix accumulator contract.
///
/// The simulator binds the root agent, calls `init` once per run, `observe`
/// once per sample at the observer's fix, and `end` after the last sample to
/// close the accumulation for reporting. `end` is not called on a failed
/// run.
pub trait Observer {
    /// Binds the observed agent; called on every `simulate`.
    fn bind(&mut self, agent: SharedScalar);

    /// Clears the accumulation for a new run.
    fn init(&mut self) -> SimResult<()>;

    /// Records the bound agent's state under the given path weight.
    fn observe(&mut self, weight: f64) -> SimResult<()>;

    /// Closes the accumulation for reporting.
    fn end(&mut self) -> SimResult<()> {
        Ok(())
    }
}

fn bound_agent(agent: &Option<SharedScalar>) -> SimResult<&SharedScalar> {
    agent
        .as_ref()
        .ok_or_else(|| SimError::not_configured("observer", "target agent is not bound"))
}

/// Weighted mean of the observed state.
#[derive(Clone, Default)]
pub struct Expectation {
    agent: Option<SharedScalar>,
    value: f64,
    weight: f64,
}

impl Expectation {
    /// An unbound expectation accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// The weighted mean; valid after `end`.
    pub fn value(&self) -> f64 {
        self.value
    }
}

impl Observer for Expectation {
    fn bind(&mut self, agent: SharedScalar) {
        self.agent = Some(agent);
    }

    fn init(&mut self) -> SimResult<()> {
        bound_agent(&self.agent)?;
        self.value = 0.0;
        self.weight = 0.0;
        Ok(())
    }

    fn observe(&mut self, weight: f64) -> SimResult<()> {
        let agent = bound_agent(&self.agent)?;
        self.value += agent.borrow().state() * weight;
        self.weight += weight;
        Ok(())
    }

    fn end(&mut self) -> SimResult<()> {
        self.value /= self.weight;
        Ok(())
    }
}

/// Running extremes of the observed state.
#[derive(Clone, Default)]
pub struct Bounds {
    agent: Option<SharedScalar>,
    min: f64,
    max: f64,
}

impl Bounds {
    /// An unbound bounds accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Smallest observed state.
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Largest observed state.
    pub fn max(&self) -> f64 {
        self.max
    }
}

impl Observer for Bounds {
    fn bind(&mut self, agent: SharedScalar) {
        self.agent = Some(agent);
    }

    fn init(&mut self) -> SimResult<()> {
        bound_agent(&self.agent)?;
        self.min = f64::MAX;
        self.max = f64::MIN;
        Ok(())
    }

    fn observe(&mut self, _weight: f64) -> SimResult<()> {
        let agent = bound_agent(&self.agent)?;
        let value = agent.borrow().state();
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        Ok(())
    }
}

/// Weighted mean, population variance, standard deviation, Monte Carlo
/// standard error and extremes.
#[derive(Clone, Default)]
pub struct Statistics {
    agent: Option<SharedScalar>,
    expectation: f64,
    variance: f64,
    std_error: f64,
    cum_weight: f64,
    samples: usize,
    min: f64,
    max: f64,
}

impl Statistics {
    /// An unbound statistics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Weighted mean; valid after `end`.
    pub fn expectation(&self) -> f64 {
        self.expectation
    }

    /// Population variance; valid after `end`.
    pub fn variance(&self) -> f64 {
        self.variance
    }

    /// Square root of the variance, zero for numerically zero variances.
    pub fn standard_deviation(&self) -> f64 {
        if self.variance.abs() < TINY {
            0.0
        } else {
            self.variance.sqrt()
        }
    }

    /// Monte Carlo standard error `sqrt(variance / samples)`; valid after
    /// `end`.
    pub fn standard_error(&self) -> f64 {
        self.std_error
    }

    /// Smallest observed state.
    pub fn minimum(&self) -> f64 {
        self.min
    }

    /// Largest observed state.
    pub fn maximum(&self) -> f64 {
        self.max
    }
}

impl Observer for Statistics {
    fn bind(&mut self, agent: SharedScalar) {
        self.agent = Some(agent);
    }

    fn init(&mut self) -> SimResult<()> {
        bound_agent(&self.agent)?;
        self.expectation = 0.0;
        self.variance = 0.0;
        self.std_error = 0.0;
        self.cum_weight = 0.0;
        self.samples = 0;
        self.min = f64::MAX;
        self.max = f64::MIN;
        Ok(())
    }

    fn observe(&mut self, weight: f64) -> SimResult<()> {
        let agent = bound_agent(&self.agent)?;
        let value = agent.borrow().state();

        self.expectation += value * weight;
        self.variance += value * value * weight;
        self.cum_weight += weight;
        self.samples += 1;

        self.min = self.min.min(value);
        self.max = self.max.max(value);
        Ok(())
    }

    fn end(&mut self) -> SimResult<()> {
        self.expectation /= self.cum_weight;
        self.variance = self.variance / self.cum_weight - self.expectation * self.expectation;
        self.std_error = (self.variance / self.samples as f64).sqrt();
        Ok(())
    }
}

/// Raw `(outcome, weight)` record of every sample.
#[derive(Clone, Default)]
pub struct Scenarios {
    agent: Option<SharedScalar>,
    outcomes: Vec<f64>,
    weights: Vec<f64>,
}

impl Scenarios {
    /// An unbound scenario recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Observed states, one per sample.
    pub fn outcomes(&self) -> &[f64] {
        &self.outcomes
    }

    /// Path weights, aligned with [`outcomes`](Scenarios::outcomes).
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }
}

impl Observer for Scenarios {
    fn bind(&mut self, agent: SharedScalar) {
        self.agent = Some(agent);
    }

    fn init(&mut self) -> SimResult<()> {
        bound_agent(&self.agent)?;
        self.outcomes.clear();
        self.weights.clear();
        Ok(())
    }

    fn observe(&mut self, weight: f64) -> SimResult<()> {
        let agent = bound_agent(&self.agent)?;
        self.outcomes.push(agent.borrow().state());
        self.weights.push(weight);
        Ok(())
    }
}

/// Weighted histogram over equally spaced bins.
///
/// Order 1 drops the whole weight into the nearest bin below; order 2
/// splits it linearly between the two adjacent bins. With `pdf` set, `end`
/// additionally divides by the bin width so the frequencies integrate to
/// one.
#[derive(Clone)]
pub struct Histogram {
    agent: Option<SharedScalar>,
    min: f64,
    max: f64,
    step: f64,
    order: usize,
    pdf: bool,
    cum_weight: f64,
    bins: Vec<f64>,
    frequencies: Vec<f64>,
}

impl Histogram {
    /// A histogram over `[min, max]` with the given bin width.
    pub fn new(min: f64, max: f64, step: f64, order: usize, pdf: bool) -> Self {
        Self {
            agent: None,
            min,
            max,
            step,
            order,
            pdf,
            cum_weight: 0.0,
            bins: Vec::new(),
            frequencies: Vec::new(),
        }
    }

    /// Lower edge of every bin.
    pub fn bins(&self) -> &[f64] {
        &self.bins
    }

    /// Accumulated frequency per bin; valid after `end`.
    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    fn position(&self, value: f64) -> (usize, f64) {
        let offset = (value - self.min) / self.step;
        if offset >= 0.0 {
            let grid = offset as usize;
            (grid, offset - grid as f64)
        } else {
            (0, 0.0)
        }
    }
}

impl Observer for Histogram {
    fn bind(&mut self, agent: SharedScalar) {
        self.agent = Some(agent);
    }

    fn init(&mut self) -> SimResult<()> {
        bound_agent(&self.agent)?;
        if self.max <= self.min + TINY {
            return Err(SimError::InvalidArgument(
                "histogram interval is degenerate".to_string(),
            ));
        }
        if self.order != 1 && self.order != 2 {
            return Err(SimError::InvalidArgument(format!(
                "unsupported histogram order {}",
                self.order
            )));
        }

        self.bins.clear();
        self.frequencies.clear();
        let mut edge = self.min;
        while edge <= self.max + TINY {
            self.bins.push(edge);
            self.frequencies.push(0.0);
            edge += self.step;
        }
        self.cum_weight = 0.0;
        Ok(())
    }

    fn observe(&mut self, weight: f64) -> SimResult<()> {
        let agent = bound_agent(&self.agent)?;
        let value = agent.borrow().state();
        let (grid, remainder) = self.position(value);
        let top = self.frequencies.len() - 1;

        self.cum_weight += weight;

        match self.order {
            1 => {
                self.frequencies[grid.min(top)] += weight;
            }
            2 => {
                self.frequencies[grid.min(top)] += weight * (1.0 - remainder);
                self.frequencies[(grid + 1).min(top)] += weight * remainder;
            }
            order => {
                return Err(SimError::InvalidArgument(format!(
                    "unsupported histogram order {}",
                    order
                )))
            }
        }
        Ok(())
    }

    fn end(&mut self) -> SimResult<()> {
        let mut norm = self.cum_weight;
        if self.pdf {
            norm *= self.step;
        }
        for frequency in &mut self.frequencies {
            *frequency /= norm;
        }
        Ok(())
    }
}

/// Joint means and covariance matrix across several agents.
///
/// Unlike the scalar observers this one carries its own agent list; the
/// simulator's per-fix bind is ignored.
#[derive(Clone, Default)]
pub struct CrossMoments {
    agents: Vec<SharedScalar>,
    means: Vec<f64>,
    covariance: Vec<Vec<f64>>,
    cum_weight: f64,
    samples: usize,
}

impl CrossMoments {
    /// An empty cross-moment accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an observed agent.
    pub fn add_agent(&mut self, agent: SharedScalar) {
        self.agents.push(agent);
    }

    /// Removes every observed agent.
    pub fn clear(&mut self) {
        self.agents.clear();
    }

    /// Mean of agent `i`; valid after `end`.
    pub fn expectation(&self, i: usize) -> f64 {
        self.means[i]
    }

    /// Covariance of agents `i` and `j`; valid after `end`.
    pub fn covariance(&self, i: usize, j: usize) -> f64 {
        self.covariance[i][j]
    }

    /// Monte Carlo standard error of agent `i`'s mean; valid after `end`.
    pub fn standard_error(&self, i: usize) -> f64 {
        (self.covariance[i][i] / self.samples as f64).sqrt()
    }
}

impl Observer for CrossMoments {
    fn bind(&mut self, _agent: SharedScalar) {
        // The agent list is explicit; the simulator's root is ignored.
    }

    fn init(&mut self) -> SimResult<()> {
        if self.agents.is_empty() {
            return Err(SimError::not_configured(
                "cross-moment observer",
                "no target agents added",
            ));
        }
        let n = self.agents.len();
        self.means = vec![0.0; n];
        self.covariance = vec![vec![0.0; n]; n];
        self.cum_weight = 0.0;
        self.samples = 0;
        Ok(())
    }

    fn observe(&mut self, weight: f64) -> SimResult<()> {
        let states: Vec<f64> = self.agents.iter().map(|a| a.borrow().state()).collect();
        for (i, &x) in states.iter().enumerate() {
            self.means[i] += x * weight;
            for (j, &y) in states.iter().enumerate().take(i + 1) {
                self.covariance[i][j] += x * y * weight;
            }
        }
        self.cum_weight += weight;
        self.samples += 1;
        Ok(())
    }

    fn end(&mut self) -> SimResult<()> {
        let n = self.agents.len();
        for mean in &mut self.means {
            *mean /= self.cum_weight;
        }
        for i in 0..n {
            for j in 0..=i {
                self.covariance[i][j] =
                    self.covariance[i][j] / self.cum_weight - self.means[i] * self.means[j];
                self.covariance[j][i] = self.covariance[i][j];
            }
        }
        Ok(())
    }
}

/// Sequence of sub-observers tracked in lock-step; lets one fix accumulate
/// several quantities.
#[derive(Clone, Default)]
pub struct ObserverVec<O: Observer> {
    observers: Vec<O>,
}

impl<O: Observer> ObserverVec<O> {
    /// An empty vector.
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    /// Appends a sub-observer.
    pub fn push(&mut self, observer: O) {
        self.observers.push(observer);
    }

    /// The sub-observers.
    pub fn observers(&self) -> &[O] {
        &self.observers
    }

    /// Mutable access to the sub-observers.
    pub fn observers_mut(&mut self) -> &mut [O] {
        &mut self.observers
    }
}

impl<O: Observer> Observer for ObserverVec<O> {
    fn bind(&mut self, agent: SharedScalar) {
        for observer in &mut self.observers {
            observer.bind(agent.clone());
        }
    }

    fn init(&mut self) -> SimResult<()> {
        for observer in &mut self.observers {
            observer.init()?;
        }
        Ok(())
    }

    fn observe(&mut self, weight: f64) -> SimResult<()> {
        for observer in &mut self.observers {
            observer.observe(weight)?;
        }
        Ok(())
    }

    fn end(&mut self) -> SimResult<()> {
        for observer in &mut self.observers {
            observer.end()?;
        }
        Ok(())
    }
}
