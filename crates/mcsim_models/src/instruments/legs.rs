//! Cashflow legs: fixed, risky and portfolio variants.

use mcsim_agents::agent::{Agent, AgentCore, Process};
use mcsim_agents::linkage::{require, DepList, Shared};
use mcsim_core::types::error::{SimError, SimResult};
use mcsim_core::types::time::{Span, Time};
use mcsim_core::xml::XmlTag;

use crate::curves::{SharedCurve, YieldCurve};
use crate::events::{Counter, PortfolioEvents};
use crate::instruments::InstrumentState;

#[derive(Debug, Clone, Copy)]
struct DatedAmount {
    time: Time,
    amount: f64,
}

/// The shared schedule-and-cursor machinery of the leg family.
struct LegSchedule {
    rows: Vec<DatedAmount>,
    cursor: usize,
    cursor0: usize,
}

impl LegSchedule {
    fn new() -> Self {
        Self {
            rows: Vec::new(),
            cursor: 0,
            cursor0: 0,
        }
    }

    fn set_schedule(
        &mut self,
        start: Time,
        end: Time,
        period: Span,
        amount: f64,
        payout: f64,
    ) -> SimResult<()> {
        if period < 1 {
            return Err(SimError::InvalidSchedule(
                "leg period must be at least one day".to_string(),
            ));
        }
        if end <= start {
            return Err(SimError::InvalidSchedule(format!(
                "leg end {} not after start {}",
                end, start
            )));
        }

        self.rows.clear();
        let mut t = start + period;
        while t < end {
            self.rows.push(DatedAmount { time: t, amount });
            t += period;
        }
        self.rows.push(DatedAmount {
            time: end,
            amount: amount + payout,
        });
        Ok(())
    }

    fn add(&mut self, time: Time, amount: f64) {
        self.rows.push(DatedAmount { time, amount });
    }

    /// Sums and consumes the rows paying at or before `t`.
    fn seek(&mut self, t: Time) -> f64 {
        let mut paid = 0.0;
        while self.cursor < self.rows.len() && self.rows[self.cursor].time <= t {
            paid += self.rows[self.cursor].amount;
            self.cursor += 1;
        }
        paid
    }

    fn rewind_to_start(&mut self, start: Time) {
        self.cursor = 0;
        self.seek(start);
        self.cursor0 = self.cursor;
    }

    fn exhausted(&self) -> bool {
        self.cursor == self.rows.len()
    }

    fn remaining(&self) -> &[DatedAmount] {
        &self.rows[self.cursor..]
    }
}

/// Leg of dated fixed amounts valued under a discount curve.
///
/// On update the amounts with `pay <= t` surface as `flow` and the remainder
/// is valued as `sum(amount * df(time))`; the leg matures when the schedule
/// is exhausted.
pub struct FixedLeg {
    core: AgentCore<InstrumentState>,
    deps: DepList,
    curve: Option<SharedCurve>,
    schedule: LegSchedule,
}

impl FixedLeg {
    /// An unconfigured leg.
    pub fn new() -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            curve: None,
            schedule: LegSchedule::new(),
        }
    }

    /// Connects the discount curve.
    pub fn set_curve<Y: YieldCurve + 'static>(&mut self, curve: &Shared<Y>) {
        self.deps.clear();
        self.deps.push(curve);
        self.curve = Some(curve.clone() as SharedCurve);
    }

    /// Replaces the rows with an equally spaced schedule of constant
    /// amounts plus an optional final payout.
    pub fn set_schedule(
        &mut self,
        start: Time,
        end: Time,
        period: Span,
        amount: f64,
        payout: f64,
    ) -> SimResult<()> {
        self.schedule.set_schedule(start, end, period, amount, payout)
    }

    /// Appends a single dated amount.
    pub fn add(&mut self, time: Time, amount: f64) {
        self.schedule.add(time, amount);
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.schedule.rows.len()
    }

    /// True when the leg holds no rows.
    pub fn is_empty(&self) -> bool {
        self.schedule.rows.is_empty()
    }

    /// Removes every row.
    pub fn clear(&mut self) {
        self.schedule.rows.clear();
    }

    fn step(&mut self) -> SimResult<bool> {
        if self.core.state.matured {
            self.core.state.flow = 0.0;
            self.core.state.value = 0.0;
            return Ok(false);
        }

        self.core.state.value = 0.0;
        self.core.state.flow = self.schedule.seek(self.core.time());

        if self.schedule.exhausted() {
            self.core.state.matured = true;
        } else {
            let curve = require(&self.curve, "fixed leg curve")?;
            let curve = curve.borrow();
            let mut value = 0.0;
            for row in self.schedule.remaining() {
                value += row.amount * curve.discount_to(row.time)?;
            }
            self.core.state.value = value;
        }
        Ok(true)
    }
}

impl Default for FixedLeg {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for FixedLeg {
    type State = InstrumentState;

    fn core(&self) -> &AgentCore<InstrumentState> {
        &self.core
    }
    fn core_mut(&mut self) -> &mut AgentCore<InstrumentState> {
        &mut self.core
    }
    fn deps(&self) -> &DepList {
        &self.deps
    }

    fn on_init(&mut self) -> SimResult<()> {
        require(&self.curve, "fixed leg curve")?;
        self.schedule.rewind_to_start(self.core.start());
        self.core.state.value = 0.0;
        self.core.state.flow = 0.0;
        self.core.state.matured = self.schedule.exhausted();
        Ok(())
    }

    fn on_reset(&mut self) -> SimResult<()> {
        self.schedule.cursor = self.schedule.cursor0;
        self.step().map(|_| ())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        self.step()
    }

    fn dump_attrs(&self, tag: XmlTag) -> XmlTag {
        tag.attr("rows", self.schedule.rows.len())
    }
}

mcsim_agents::impl_agent!(FixedLeg);

/// Fixed leg subject to termination events drawn against a survival curve.
///
/// Each step draws one uniform against the one-step survival probability
/// `exp(-h * dt)` with hazard `h = -ln S(t+1) * ratio`; on an event the
/// recovery amount surfaces as a flow and the leg matures. While alive the
/// remaining rows are valued under both curves,
/// `sum(amount * df(t_i) * S(t_i))`.
pub struct RiskyLeg {
    core: AgentCore<InstrumentState>,
    deps: DepList,
    curve: Option<SharedCurve>,
    survival: Option<SharedCurve>,
    schedule: LegSchedule,
    recovery: f64,
}

impl RiskyLeg {
    /// An unconfigured leg.
    pub fn new() -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            curve: None,
            survival: None,
            schedule: LegSchedule::new(),
            recovery: 0.0,
        }
    }

    /// Connects the discount and survival curves and sets the recovery
    /// amount paid on an event.
    pub fn setup<Y, S>(&mut self, curve: &Shared<Y>, survival: &Shared<S>, recovery: f64)
    where
        Y: YieldCurve + 'static,
        S: YieldCurve + 'static,
    {
        self.deps.clear();
        self.deps.push(curve);
        self.deps.push(survival);
        self.curve = Some(curve.clone() as SharedCurve);
        self.survival = Some(survival.clone() as SharedCurve);
        self.recovery = recovery;
    }

    /// Replaces the rows with an equally spaced schedule.
    pub fn set_schedule(
        &mut self,
        start: Time,
        end: Time,
        period: Span,
        amount: f64,
        payout: f64,
    ) -> SimResult<()> {
        self.schedule.set_schedule(start, end, period, amount, payout)
    }

    /// Appends a single dated amount.
    pub fn add(&mut self, time: Time, amount: f64) {
        self.schedule.add(time, amount);
    }

    fn step(&mut self) -> SimResult<bool> {
        if self.core.state.matured {
            self.core.state.flow = 0.0;
            self.core.state.value = 0.0;
            return Ok(false);
        }

        self.core.state.value = 0.0;
        self.core.state.flow = self.schedule.seek(self.core.time());

        if self.schedule.exhausted() {
            self.core.state.matured = true;
            return Ok(true);
        }

        let survival = require(&self.survival, "risky leg survival curve")?;
        let hazard = -survival
            .borrow()
            .discount_to(self.core.time() + 1)?
            .ln()
            * self.core.year_fraction().ratio();
        let dt = self.core.dt_years();
        let live_probability = (-hazard * dt).exp();

        if self.core.draw()? > live_probability {
            self.core.state.flow += self.recovery;
            self.core.state.matured = true;
        } else {
            let curve = require(&self.curve, "risky leg curve")?;
            let curve = curve.borrow();
            let survival = survival.borrow();
            let mut value = 0.0;
            for row in self.schedule.remaining() {
                value +=
                    row.amount * curve.discount_to(row.time)? * survival.discount_to(row.time)?;
            }
            self.core.state.value = value;
        }
        Ok(true)
    }
}

impl Default for RiskyLeg {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for RiskyLeg {
    type State = InstrumentState;

    fn core(&self) -> &AgentCore<InstrumentState> {
        &self.core
    }
    fn core_mut(&mut self) -> &mut AgentCore<InstrumentState> {
        &mut self.core
    }
    fn deps(&self) -> &DepList {
        &self.deps
    }

    fn on_init(&mut self) -> SimResult<()> {
        require(&self.curve, "risky leg curve")?;
        require(&self.survival, "risky leg survival curve")?;
        self.schedule.rewind_to_start(self.core.start());
        self.core.state.value = 0.0;
        self.core.state.flow = 0.0;
        self.core.state.matured = self.schedule.exhausted();
        Ok(())
    }

    fn on_reset(&mut self) -> SimResult<()> {
        self.schedule.cursor = self.schedule.cursor0;
        self.step().map(|_| ())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        self.step()
    }

    fn dump_attrs(&self, tag: XmlTag) -> XmlTag {
        tag.attr("rows", self.schedule.rows.len())
            .attr("recovery", self.recovery)
    }
}

mcsim_agents::impl_agent!(RiskyLeg);

/// Fixed leg scaled by the surviving members of a portfolio.
///
/// Flows are paid on the average of the population at the step endpoints;
/// defaults recover a fraction of the average outstanding value; the
/// remaining value scales with the survivors.
pub struct PortfolioFixedLeg {
    core: AgentCore<InstrumentState>,
    deps: DepList,
    curve: Option<SharedCurve>,
    survival: Option<SharedCurve>,
    counter: Option<Shared<Counter>>,
    schedule: LegSchedule,
    recovery_rate: f64,
    last_value: f64,
    last_size: u64,
}

impl PortfolioFixedLeg {
    /// An unconfigured leg.
    pub fn new() -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            curve: None,
            survival: None,
            counter: None,
            schedule: LegSchedule::new(),
            recovery_rate: 0.0,
            last_value: 0.0,
            last_size: 0,
        }
    }

    /// Connects the discount curve, survival curve and shared counter, and
    /// sets the recovered fraction of outstanding value per event.
    pub fn setup<Y, S>(
        &mut self,
        curve: &Shared<Y>,
        survival: &Shared<S>,
        counter: &Shared<Counter>,
        recovery_rate: f64,
    ) where
        Y: YieldCurve + 'static,
        S: YieldCurve + 'static,
    {
        self.deps.clear();
        self.deps.push(curve);
        self.deps.push(survival);
        self.deps.push(counter);
        self.curve = Some(curve.clone() as SharedCurve);
        self.survival = Some(survival.clone() as SharedCurve);
        self.counter = Some(counter.clone());
        self.recovery_rate = recovery_rate;
    }

    /// Replaces the rows with an equally spaced schedule.
    pub fn set_schedule(
        &mut self,
        start: Time,
        end: Time,
        period: Span,
        amount: f64,
        payout: f64,
    ) -> SimResult<()> {
        self.schedule.set_schedule(start, end, period, amount, payout)
    }

    /// Appends a single dated amount (per surviving member).
    pub fn add(&mut self, time: Time, amount: f64) {
        self.schedule.add(time, amount);
    }

    fn step(&mut self) -> SimResult<bool> {
        let counter = require(&self.counter, "portfolio leg counter")?.clone();
        let size = counter.borrow().state();

        if self.core.state.matured || size == 0 {
            self.core.state.matured = true;
            self.core.state.flow = 0.0;
            self.core.state.value = 0.0;
            return Ok(false);
        }

        self.core.state.value = 0.0;
        let paid = self.schedule.seek(self.core.time());
        // Flows accrue on the average population over the step.
        self.core.state.flow = paid * (size + self.last_size) as f64 / 2.0;

        if self.schedule.exhausted() {
            self.core.state.matured = true;
        } else {
            let curve = require(&self.curve, "portfolio leg curve")?;
            let survival = require(&self.survival, "portfolio leg survival curve")?;
            let curve = curve.borrow();
            let survival = survival.borrow();
            let mut value = 0.0;
            for row in self.schedule.remaining() {
                value +=
                    row.amount * curve.discount_to(row.time)? * survival.discount_to(row.time)?;
            }

            // Recovery on the members lost this step, at the average of the
            // per-member value at the step endpoints.
            self.core.state.flow += (value + self.last_value) / 2.0
                * self.recovery_rate
                * self.last_size.saturating_sub(size) as f64;

            self.core.state.value = value * size as f64;
        }

        self.last_size = size;
        self.last_value = self.core.state.value;
        Ok(true)
    }
}

impl Default for PortfolioFixedLeg {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for PortfolioFixedLeg {
    type State = InstrumentState;

    fn core(&self) -> &AgentCore<InstrumentState> {
        &self.core
    }
    fn core_mut(&mut self) -> &mut AgentCore<InstrumentState> {
        &mut self.core
    }
    fn deps(&self) -> &DepList {
        &self.deps
    }

    fn on_init(&mut self) -> SimResult<()> {
        require(&self.curve, "portfolio leg curve")?;
        require(&self.survival, "portfolio leg survival curve")?;
        require(&self.counter, "portfolio leg counter")?;
        self.schedule.rewind_to_start(self.core.start());
        self.core.state.value = 0.0;
        self.core.state.flow = 0.0;
        self.core.state.matured = self.schedule.exhausted();
        Ok(())
    }

    fn on_reset(&mut self) -> SimResult<()> {
        self.schedule.cursor = self.schedule.cursor0;
        self.step()?;
        self.last_value = self.core.state.value;
        let counter = require(&self.counter, "portfolio leg counter")?;
        self.last_size = counter.borrow().state();
        Ok(())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        self.step()
    }

    fn dump_attrs(&self, tag: XmlTag) -> XmlTag {
        tag.attr("rows", self.schedule.rows.len())
            .attr("recovery_rate", self.recovery_rate)
    }
}

mcsim_agents::impl_agent!(PortfolioFixedLeg);

/// Pays a fixed amount per portfolio event, and values the expected future
/// event payments by integrating `df * dS` over the remaining life.
pub struct PortfolioEventLeg {
    core: AgentCore<InstrumentState>,
    deps: DepList,
    curve: Option<SharedCurve>,
    survival: Option<SharedCurve>,
    events: Option<Shared<PortfolioEvents>>,
    counter: Option<Shared<Counter>>,
    maturity: Time,
    payout: f64,
    integration_step: Span,
}

impl PortfolioEventLeg {
    /// An unconfigured leg.
    pub fn new() -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            curve: None,
            survival: None,
            events: None,
            counter: None,
            maturity: 0,
            payout: 0.0,
            // Roughly monthly expected-value integration steps.
            integration_step: 30,
        }
    }

    /// Connects the curves, the shared event process and counter, and sets
    /// the legal maturity and per-event payout.
    pub fn setup<Y, S>(
        &mut self,
        curve: &Shared<Y>,
        survival: &Shared<S>,
        events: &Shared<PortfolioEvents>,
        counter: &Shared<Counter>,
        maturity: Time,
        payout: f64,
    ) where
        Y: YieldCurve + 'static,
        S: YieldCurve + 'static,
    {
        self.deps.clear();
        self.deps.push(curve);
        self.deps.push(survival);
        self.deps.push(counter);
        self.deps.push(events);
        self.curve = Some(curve.clone() as SharedCurve);
        self.survival = Some(survival.clone() as SharedCurve);
        self.events = Some(events.clone());
        self.counter = Some(counter.clone());
        self.maturity = maturity;
        self.payout = payout;
    }

    fn step(&mut self) -> SimResult<bool> {
        self.core.state.flow = 0.0;
        self.core.state.value = 0.0;

        let counter = require(&self.counter, "event leg counter")?;
        let size = counter.borrow().state();

        if self.core.state.matured || size == 0 {
            self.core.state.matured = true;
            return Ok(false);
        }

        if self.core.time() >= self.maturity {
            self.core.state.matured = true;
            return Ok(true);
        }

        let events = require(&self.events, "event leg events")?;
        self.core.state.flow = events.borrow().state() as f64 * self.payout;

        let curve = require(&self.curve, "event leg curve")?;
        let survival = require(&self.survival, "event leg survival curve")?;
        let curve = curve.borrow();
        let survival = survival.borrow();

        // Trapezoid of df * dS on the integration grid up to maturity.
        let mut value = 0.0;
        let mut survival_before = 1.0;
        let mut t = self.core.time();
        while t < self.maturity {
            let survival_now = survival.discount_to(t)?;
            value += curve.discount_to(t)? * (survival_before - survival_now);
            survival_before = survival_now;
            t += self.integration_step;
        }
        self.core.state.value = value * self.payout * size as f64;

        Ok(true)
    }
}

impl Default for PortfolioEventLeg {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for PortfolioEventLeg {
    type State = InstrumentState;

    fn core(&self) -> &AgentCore<InstrumentState> {
        &self.core
    }
    fn core_mut(&mut self) -> &mut AgentCore<InstrumentState> {
        &mut self.core
    }
    fn deps(&self) -> &DepList {
        &self.deps
    }

    fn on_init(&mut self) -> SimResult<()> {
        require(&self.curve, "event leg curve")?;
        require(&self.survival, "event leg survival curve")?;
        require(&self.events, "event leg events")?;
        require(&self.counter, "event leg counter").map(|_| ())
    }

    fn on_reset(&mut self) -> SimResult<()> {
        self.step().map(|_| ())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        self.step()
    }

    fn dump_attrs(&self, tag: XmlTag) -> XmlTag {
        tag.attr("maturity", self.maturity).attr("payout", self.payout)
    }
}

mcsim_agents::impl_agent!(PortfolioEventLeg);
