//! Constant-rate and static (non-stochastic) yield curves.

use std::rc::Rc;

use mcsim_agents::agent::{AgentCore, Process};
use mcsim_agents::linkage::{require, DepList};
use mcsim_core::math::line::Line;
use mcsim_core::types::error::SimResult;
use mcsim_core::types::time::Time;
use mcsim_core::xml::XmlTag;

use super::YieldCurve;

/// Yield curve with a single continuously-compounded rate.
///
/// Deterministic and flat: the state is the rate itself and the agent goes
/// non-live after its first update (there is nothing left to compute).
pub struct ConstantRateCurve {
    core: AgentCore<f64>,
    deps: DepList,
    rate: f64,
}

impl ConstantRateCurve {
    /// A curve at the given rate.
    pub fn new(rate: f64) -> Self {
        let mut core = AgentCore::new();
        core.state = rate;
        Self {
            core,
            deps: DepList::new(),
            rate,
        }
    }

    /// Replaces the rate.
    pub fn set_rate(&mut self, rate: f64) {
        self.rate = rate;
        self.core.state = rate;
    }
}

impl Process for ConstantRateCurve {
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
        Ok(false)
    }

    fn dump_attrs(&self, tag: XmlTag) -> XmlTag {
        tag.attr("rate", self.rate)
    }
}

mcsim_agents::impl_agent!(ConstantRateCurve);

impl YieldCurve for ConstantRateCurve {
    fn discount(&self) -> SimResult<f64> {
        Ok((-self.rate * self.core.years(self.core.time())).exp())
    }

    fn discount_to(&self, t: Time) -> SimResult<f64> {
        Ok((-self.rate * self.core.years(t - self.core.time())).exp())
    }
}

/// Yield curve driven by a supplied discount-factor line.
///
/// Deterministic: the numeraire rolls along the input curve and the state is
/// the one-day short rate `ln(df(t)/df(t+1)) * ratio`.
pub struct StaticCurve {
    core: AgentCore<f64>,
    deps: DepList,
    discounts: Option<Rc<dyn Line>>,
}

impl StaticCurve {
    /// A curve over the given discount-factor line.
    pub fn new(discounts: Rc<dyn Line>) -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            discounts: Some(discounts),
        }
    }

    fn short_rate(&self) -> SimResult<f64> {
        let df = require(&self.discounts, "static curve discount factors")?;
        let t = self.core.time() as f64;
        Ok((df.value(t) / df.value(t + 1.0)).ln() * self.core.year_fraction().ratio())
    }
}

impl Process for StaticCurve {
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
        require(&self.discounts, "static curve discount factors").map(|_| ())
    }

    fn on_reset(&mut self) -> SimResult<()> {
        self.core.state = self.short_rate()?;
        Ok(())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        self.core.state = self.short_rate()?;
        Ok(true)
    }
}

mcsim_agents::impl_agent!(StaticCurve);

impl YieldCurve for StaticCurve {
    fn discount(&self) -> SimResult<f64> {
        let df = require(&self.discounts, "static curve discount factors")?;
        Ok(df.value(self.core.time() as f64))
    }

    fn discount_to(&self, t: Time) -> SimResult<f64> {
        let df = require(&self.discounts, "static curve discount factors")?;
        Ok(df.value(t as f64) / df.value(self.core.time() as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mcsim_agents::agent::{Agent, Lifecycle};
    use mcsim_agents::driver::SimContext;
    use mcsim_core::math::line::InterpolatedLine;

    fn df_line(rate: f64) -> Rc<dyn Line> {
        Rc::new(InterpolatedLine::sampled(0.0, 4000.0, 1.0, move |t| (-rate * t / 365.0).exp()).unwrap())
    }

    #[test]
    fn constant_rate_discounts() {
        let ctx = SimContext::standalone();
        let mut curve = ConstantRateCurve::new(0.05);
        curve.init(0, 730, &ctx).unwrap();
        curve.reset().unwrap();
        assert_relative_eq!(curve.discount().unwrap(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(
            curve.discount_to(365).unwrap(),
            (-0.05f64).exp(),
            epsilon = 1e-12
        );

        curve.update(365).unwrap();
        assert_relative_eq!(curve.discount().unwrap(), (-0.05f64).exp(), epsilon = 1e-12);
        assert_relative_eq!(curve.discount_to(365).unwrap(), 1.0, epsilon = 1e-12);
        assert!(!curve.is_live());
    }

    #[test]
    fn static_curve_rolls_the_input_line() {
        let ctx = SimContext::standalone();
        let line = df_line(0.05);
        let mut curve = StaticCurve::new(line.clone());
        curve.init(0, 730, &ctx).unwrap();
        curve.reset().unwrap();
        assert_relative_eq!(curve.discount().unwrap(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(
            curve.discount_to(730).unwrap(),
            line.value(730.0),
            epsilon = 1e-9
        );

        curve.update(365).unwrap();
        assert_relative_eq!(curve.discount().unwrap(), line.value(365.0), epsilon = 1e-9);
        assert_relative_eq!(
            curve.discount_to(730).unwrap(),
            line.value(730.0) / line.value(365.0),
            epsilon = 1e-7
        );
        // discount at the current time is unity by construction
        assert_relative_eq!(curve.discount_to(365).unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn static_curve_state_is_the_short_rate() {
        let ctx = SimContext::standalone();
        let line = df_line(0.05);
        let mut curve = StaticCurve::new(line.clone());
        curve.init(0, 730, &ctx).unwrap();
        curve.reset().unwrap();
        let expected = (line.value(0.0) / line.value(1.0)).ln() * 365.0;
        assert_relative_eq!(curve.state(), expected, epsilon = 1e-9);
        assert_relative_eq!(curve.state(), 0.05, epsilon = 1e-4);
    }
}
