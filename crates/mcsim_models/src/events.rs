//! Portfolio termination events over a shared survivor counter.

use mcsim_agents::agent::{Agent, AgentCore, Process};
use mcsim_agents::basic::Constant;
use mcsim_agents::linkage::{require, DepList, Shared, SharedScalar};
use mcsim_core::types::error::SimResult;
use mcsim_core::xml::XmlTag;

/// Shared survivor counter: a constant agent holding the number of names
/// still outstanding. Event agents decrement it mid-path; every reset
/// restores the initial population.
pub type Counter = Constant<u64>;

/// Samples termination events (default, death, prepayment) for a portfolio
/// of names against a shared intensity process.
///
/// Events are determined by a recursion that tests the probability of one or
/// more events, then two or more, and so on, against uniform draws, until a
/// test fails, the survivors run out, or the tail probability falls below
/// 1e-5. Best suited to small portfolios or rare events; the recursion is
/// inefficient for large `n * p`.
///
/// The state is the number of events in the last step; the counter retains
/// the surviving population.
pub struct PortfolioEvents {
    core: AgentCore<u64>,
    deps: DepList,
    counter: Option<Shared<Counter>>,
    intensity: Option<SharedScalar>,
    impact: i64,
}

impl PortfolioEvents {
    /// An unconfigured event process.
    pub fn new() -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            counter: None,
            intensity: None,
            impact: -1,
        }
    }

    /// Connects the shared counter and intensity process; `impact` is the
    /// signed change each event applies to the counter (usually -1).
    pub fn setup<H>(&mut self, counter: &Shared<Counter>, intensity: &Shared<H>, impact: i64)
    where
        H: Agent<State = f64> + 'static,
    {
        self.deps.clear();
        self.deps.push(counter);
        self.deps.push(intensity);
        self.counter = Some(counter.clone());
        self.intensity = Some(intensity.clone() as SharedScalar);
        self.impact = impact;
    }
}

impl Default for PortfolioEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for PortfolioEvents {
    type State = u64;

    fn core(&self) -> &AgentCore<u64> {
        &self.core
    }
    fn core_mut(&mut self) -> &mut AgentCore<u64> {
        &mut self.core
    }
    fn deps(&self) -> &DepList {
        &self.deps
    }

    fn on_init(&mut self) -> SimResult<()> {
        require(&self.counter, "portfolio events counter")?;
        require(&self.intensity, "portfolio events intensity")?;
        self.core.state = 0;
        Ok(())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        let counter = require(&self.counter, "portfolio events counter")?.clone();
        let intensity = require(&self.intensity, "portfolio events intensity")?;

        let population = counter.borrow().state();
        let dt = self.core.dt_years();
        let hazard = intensity.borrow().state();

        // dp    per-name event probability since the last update
        // ln0k  log probability of at most k events (k starts at zero)
        // p0k   the same, exponentiated
        // pk1   probability of k+1 or more events
        let mut survivors = population;
        let dp = 1.0 - (-hazard * dt).exp();
        let mut ln0k = population as f64 * (1.0 - dp).ln();
        let mut p0k = if ln0k > -20.0 { ln0k.exp() } else { 0.0 };
        let mut pk1 = 1.0 - p0k;

        while survivors > 0 && pk1 > 1e-5 {
            if self.core.draw()? > pk1 {
                break;
            }

            ln0k += (survivors as f64 * dp
                / ((population - survivors) as f64 + 1.0)
                / (1.0 - dp))
                .ln();
            if ln0k > -20.0 {
                // TODO: reconcile this accumulation with the binomial
                // recursion; the property test below only pins the mean.
                p0k += ln0k.exp();
                pk1 = 1.0 - p0k;
            }

            survivors = survivors.saturating_add_signed(self.impact);
        }

        counter.borrow_mut().set(survivors);
        self.core.state = population.saturating_sub(survivors);
        Ok(true)
    }

    fn dump_attrs(&self, tag: XmlTag) -> XmlTag {
        tag.attr("impact", self.impact)
    }
}

mcsim_agents::impl_agent!(PortfolioEvents);

#[cfg(test)]
mod tests {
    use super::*;
    use mcsim_agents::agent::Lifecycle;
    use mcsim_agents::driver::SimContext;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn setup(population: u64, hazard: f64) -> (SimContext, Shared<Counter>, PortfolioEvents) {
        let ctx = SimContext::standalone();
        let counter = Rc::new(RefCell::new(Constant::new(population)));
        let intensity = Rc::new(RefCell::new(Constant::new(hazard)));
        let mut events = PortfolioEvents::new();
        events.setup(&counter, &intensity, -1);
        (ctx, counter, events)
    }

    #[test]
    fn zero_intensity_never_fires() {
        let (ctx, counter, mut events) = setup(10, 0.0);
        events.init(0, 3650, &ctx).unwrap();
        events.reset().unwrap();
        for year in 1..=10 {
            events.update(year * 365).unwrap();
            assert_eq!(events.state(), 0);
        }
        assert_eq!(counter.borrow().state(), 10);
    }

    #[test]
    fn counter_is_restored_each_path() {
        let (ctx, counter, mut events) = setup(5, 3.0);
        events.init(0, 3650, &ctx).unwrap();
        events.reset().unwrap();
        for year in 1..=10 {
            events.update(year * 365).unwrap();
        }
        assert!(counter.borrow().state() < 5);
        events.reset().unwrap();
        assert_eq!(counter.borrow().state(), 5);
    }

    #[test]
    fn mean_event_count_matches_the_binomial_expectation_for_rare_events() {
        // The recursion is exact for the first event, so in the rare-event
        // regime it serves well. The sample mean over one step must match
        // the analytic binomial expectation n * (1 - exp(-h * dt)).
        let (ctx, counter, mut events) = setup(10, 0.002);
        events.init(0, 365, &ctx).unwrap();

        let paths = 50_000;
        let mut total = 0u64;
        for _ in 0..paths {
            events.reset().unwrap();
            events.update(365).unwrap();
            total += events.state();
        }
        let _ = counter;

        let mean = total as f64 / paths as f64;
        let expected = 10.0 * (1.0 - (-0.002f64).exp());
        // Three standard errors of the sample mean plus the higher-order
        // multiple-event bias.
        assert!(
            (mean - expected).abs() < 2.5e-3,
            "mean = {}, expected = {}",
            mean,
            expected
        );
    }
}
