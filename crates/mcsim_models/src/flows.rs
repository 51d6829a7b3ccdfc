//! The rich cashflow leg: dated rows with an optional index fixing.

use mcsim_agents::agent::{Agent, AgentCore, Process};
use mcsim_agents::linkage::{DepList, Shared, SharedScalar};
use mcsim_core::types::error::{SimError, SimResult};
use mcsim_core::types::time::{Span, Time};
use mcsim_core::xml::XmlTag;

/// One cashflow row.
///
/// Pays `principal + (multiplier * fixing + margin) * year_fraction` on the
/// pay date; the fixing is read from the index process on the fix date.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FlowRow {
    /// Date the index fixing is read.
    pub fix: Time,
    /// Accrual start.
    pub start: Time,
    /// Accrual end.
    pub end: Time,
    /// Payment date.
    pub pay: Time,
    /// Factor on the fixing.
    pub multiplier: f64,
    /// Additive spread, in rate terms.
    pub margin: f64,
    /// Principal amount paid unconditionally.
    pub principal: f64,
    /// Accrual year fraction.
    pub year_fraction: f64,
    /// Latched index value; written during the simulation.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub fixing: f64,
}

/// Cashflow-generating agent: its scalar state is the sum of flows paid
/// since the previous update.
///
/// Rows are appended explicitly or generated as an equally spaced schedule;
/// an optional index agent supplies the floating fixings. The agent matures
/// once the last row has paid.
pub struct Flows {
    core: AgentCore<f64>,
    deps: DepList,
    index: Option<SharedScalar>,
    rows: Vec<FlowRow>,
    fix_cursor: usize,
    pay_cursor: usize,
    fix_cursor0: usize,
    pay_cursor0: usize,
    matured: bool,
}

impl Flows {
    /// An empty leg with no index.
    pub fn new() -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            index: None,
            rows: Vec::new(),
            fix_cursor: 0,
            pay_cursor: 0,
            fix_cursor0: 0,
            pay_cursor0: 0,
            matured: false,
        }
    }

    /// Connects the index process supplying the floating fixings.
    pub fn set_index<C: Agent<State = f64> + 'static>(&mut self, index: &Shared<C>) {
        self.deps.clear();
        self.deps.push(index);
        self.index = Some(index.clone() as SharedScalar);
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when the leg holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Removes every row.
    pub fn clear(&mut self) {
        self.rows.clear();
    }

    /// Appends one row. The year fraction defaults to `(end - start) / 365`
    /// when negative.
    #[allow(clippy::too_many_arguments)]
    pub fn add(
        &mut self,
        fix: Time,
        start: Time,
        end: Time,
        pay: Time,
        multiplier: f64,
        margin: f64,
        principal: f64,
        year_fraction: f64,
    ) -> SimResult<()> {
        if pay < fix {
            return Err(SimError::InvalidSchedule(format!(
                "payment date {} before fixing date {}",
                pay, fix
            )));
        }
        if end < start {
            return Err(SimError::InvalidSchedule(format!(
                "accrual end {} before accrual start {}",
                end, start
            )));
        }
        let year_fraction = if year_fraction < 0.0 {
            (end - start) as f64 / 365.0
        } else {
            year_fraction
        };
        self.rows.push(FlowRow {
            fix,
            start,
            end,
            pay,
            multiplier,
            margin,
            principal,
            year_fraction,
            fixing: 0.0,
        });
        Ok(())
    }

    /// Appends a row fixing and paying on its accrual boundaries.
    pub fn add_period(
        &mut self,
        start: Time,
        end: Time,
        multiplier: f64,
        margin: f64,
        principal: f64,
        year_fraction: f64,
    ) -> SimResult<()> {
        self.add(
            start,
            start,
            end,
            end,
            multiplier,
            margin,
            principal,
            year_fraction,
        )
    }

    /// Appends a bare principal payment.
    pub fn add_principal(&mut self, pay: Time, principal: f64) -> SimResult<()> {
        self.add(pay, pay, pay, pay, 0.0, 0.0, principal, 0.0)
    }

    /// Replaces the rows with an equally spaced schedule of coupons plus an
    /// optional final payout, with year fractions `period / dcc_ratio`.
    pub fn set_schedule(
        &mut self,
        start: Time,
        end: Time,
        period: Span,
        multiplier: f64,
        margin: f64,
        payout: f64,
        dcc_ratio: f64,
    ) -> SimResult<()> {
        if period < 1 {
            return Err(SimError::InvalidSchedule(
                "schedule period must be at least one day".to_string(),
            ));
        }
        if end <= start {
            return Err(SimError::InvalidSchedule(format!(
                "schedule end {} not after start {}",
                end, start
            )));
        }

        self.rows.clear();
        let mut t0 = start;
        let mut t1 = start + period;
        while t1 < end {
            self.add(t0, t0, t1, t1, multiplier, margin, 0.0, (t1 - t0) as f64 / dcc_ratio)?;
            t0 = t1;
            t1 += period;
        }
        self.add(
            t0,
            t0,
            end,
            end,
            multiplier,
            margin,
            payout,
            (t1 - t0) as f64 / dcc_ratio,
        )
    }

    /// Latches fixings up to `t` and returns the flows paying at or
    /// before `t`.
    fn seek(&mut self, t: Time) -> f64 {
        if let Some(index) = &self.index {
            let rate = index.borrow().state();
            while self.fix_cursor < self.rows.len() && self.rows[self.fix_cursor].fix <= t {
                self.rows[self.fix_cursor].fixing = rate;
                self.fix_cursor += 1;
            }
        }

        let mut paid = 0.0;
        while self.pay_cursor < self.rows.len() && self.rows[self.pay_cursor].pay <= t {
            let row = &self.rows[self.pay_cursor];
            paid += row.principal + (row.multiplier * row.fixing + row.margin) * row.year_fraction;
            self.pay_cursor += 1;
        }
        paid
    }

    fn step(&mut self) -> SimResult<bool> {
        if self.matured {
            self.core.state = 0.0;
            return Ok(false);
        }
        self.core.state = self.seek(self.core.time());
        if self.pay_cursor == self.rows.len() {
            self.matured = true;
        }
        Ok(true)
    }
}

impl Default for Flows {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for Flows {
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
        self.fix_cursor = 0;
        self.pay_cursor = 0;
        let start = self.core.start();
        self.seek(start);
        self.fix_cursor0 = self.fix_cursor;
        self.pay_cursor0 = self.pay_cursor;
        self.core.state = 0.0;
        Ok(())
    }

    fn on_reset(&mut self) -> SimResult<()> {
        self.matured = false;
        self.fix_cursor = self.fix_cursor0;
        self.pay_cursor = self.pay_cursor0;
        self.step().map(|_| ())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        self.step()
    }

    fn dump_attrs(&self, tag: XmlTag) -> XmlTag {
        tag.attr("rows", self.rows.len())
    }
}

mcsim_agents::impl_agent!(Flows);

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mcsim_agents::agent::Lifecycle;
    use mcsim_agents::basic::TimeProcess;
    use mcsim_agents::driver::SimContext;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn schedule_rows_and_maturity() {
        let mut leg = Flows::new();
        leg.set_schedule(0, 365, 91, 0.0, 0.04, 100.0, 365.0).unwrap();
        // Coupons at 91, 182, 273 and 364, plus the final stub row at 365.
        assert_eq!(leg.len(), 5);

        let ctx = SimContext::standalone();
        leg.init(0, 730, &ctx).unwrap();
        leg.reset().unwrap();
        assert_relative_eq!(leg.state(), 0.0);

        leg.update(91).unwrap();
        assert_relative_eq!(leg.state(), 0.04 * 91.0 / 365.0, epsilon = 1e-12);

        leg.update(180).unwrap();
        assert_relative_eq!(leg.state(), 0.0);

        leg.update(365).unwrap();
        // Coupons at 182, 273 and 364, then the final stub (which keeps the
        // period year fraction) plus the payout.
        assert_relative_eq!(
            leg.state(),
            100.0 + 0.04 * 91.0 / 365.0 * 4.0,
            epsilon = 1e-12
        );
        assert!(leg.is_live());
        leg.update(400).unwrap();
        assert!(!leg.is_live());
        assert_relative_eq!(leg.state(), 0.0);
    }

    #[test]
    fn indexed_rows_latch_the_fixing() {
        let ctx = SimContext::standalone();
        let index = Rc::new(RefCell::new(TimeProcess::new()));
        let mut leg = Flows::new();
        leg.set_index(&index);
        leg.add(30, 40, 90, 93, 1.0, 0.0, 0.0, -1.0).unwrap();
        leg.init(0, 730, &ctx).unwrap();
        leg.reset().unwrap();

        leg.update(30).unwrap();
        assert_relative_eq!(leg.state(), 0.0);

        // Pays at 93 with the fixing read at 30 (index state = 30) and the
        // default year fraction (90 - 40) / 365.
        leg.update(93).unwrap();
        assert_relative_eq!(leg.state(), 30.0 * 50.0 / 365.0, epsilon = 1e-12);
    }

    #[test]
    fn rows_before_start_are_skipped() {
        let ctx = SimContext::standalone();
        let mut leg = Flows::new();
        leg.add_principal(10, 100.0).unwrap();
        leg.add_principal(50, 1.0).unwrap();
        leg.init(20, 730, &ctx).unwrap();
        leg.reset().unwrap();
        leg.update(50).unwrap();
        assert_relative_eq!(leg.state(), 1.0);
    }

    #[test]
    fn malformed_rows_are_rejected() {
        let mut leg = Flows::new();
        assert!(matches!(
            leg.add(10, 0, 5, 5, 1.0, 0.0, 0.0, -1.0).unwrap_err(),
            SimError::InvalidSchedule(_)
        ));
        assert!(matches!(
            leg.add(0, 10, 5, 10, 1.0, 0.0, 0.0, -1.0).unwrap_err(),
            SimError::InvalidSchedule(_)
        ));
        assert!(matches!(
            leg.set_schedule(0, 365, 0, 0.0, 0.0, 0.0, 365.0).unwrap_err(),
            SimError::InvalidSchedule(_)
        ));
        assert!(matches!(
            leg.set_schedule(365, 365, 91, 0.0, 0.0, 0.0, 365.0).unwrap_err(),
            SimError::InvalidSchedule(_)
        ));
    }
}
