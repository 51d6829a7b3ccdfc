//! Hull-White (extended Vasicek) short-rate curve.

use std::cell::RefCell;
use std::rc::Rc;

use mcsim_agents::agent::{Agent, AgentCore, Process};
use mcsim_agents::cached::Cached;
use mcsim_agents::linkage::{require, DepList, Shared, SharedScalar};
use mcsim_core::math::line::Line;
use mcsim_core::types::error::SimResult;
use mcsim_core::types::time::Time;
use mcsim_core::xml::XmlTag;

use super::YieldCurve;

/// Calibration snapshot at a time point: input bond price, instantaneous
/// forward rate, and the drift increment applied to the short rate.
#[derive(Debug, Clone, Copy, Default)]
pub struct CalibrationPoint {
    /// Input discount factor at the current time.
    pub bond: f64,
    /// One-day forward rate of the input curve, annualised.
    pub forward: f64,
    /// Drift term for the short-rate transition over the last interval.
    pub drift: f64,
}

/// Deterministic drift calibrator: walks the input discount curve once and
/// replays thereafter (it is wrapped in [`Cached`]), producing the drift
/// that makes the model reprice the input bonds.
pub struct Calibrator {
    core: AgentCore<CalibrationPoint>,
    deps: DepList,
    bonds: Rc<dyn Line>,
    mean_reversion: f64,
    volatility: f64,
    accumulated: f64,
}

impl Calibrator {
    fn new(bonds: Rc<dyn Line>, mean_reversion: f64, volatility: f64) -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            bonds,
            mean_reversion,
            volatility,
            accumulated: 0.0,
        }
    }

    fn forward_at(&self, t: Time) -> f64 {
        let b = self.bonds.value(t as f64);
        -(self.bonds.value(t as f64 + 1.0) / b).ln() * self.core.year_fraction().ratio()
    }
}

impl Process for Calibrator {
    type State = CalibrationPoint;

    fn core(&self) -> &AgentCore<CalibrationPoint> {
        &self.core
    }
    fn core_mut(&mut self) -> &mut AgentCore<CalibrationPoint> {
        &mut self.core
    }
    fn deps(&self) -> &DepList {
        &self.deps
    }

    fn on_reset(&mut self) -> SimResult<()> {
        let start = self.core.start();
        let bond = self.bonds.value(start as f64);
        let forward = self.forward_at(start);
        self.core.state = CalibrationPoint {
            bond,
            forward,
            drift: forward,
        };
        self.accumulated = forward;
        Ok(())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        let now = self.core.time();
        let t = self.core.years(now - self.core.start());
        let dt = self.core.dt_years();
        let m = self.mean_reversion;

        let bond = self.bonds.value(now as f64);
        let forward = self.forward_at(now);

        let g = (1.0 - (-m * t).exp()) / m * self.volatility;
        let next = forward + g * g / 2.0;
        let drift = next - self.accumulated * (-m * dt).exp();
        self.accumulated = next;

        self.core.state = CalibrationPoint {
            bond,
            forward,
            drift,
        };
        Ok(true)
    }
}

mcsim_agents::impl_agent!(Calibrator);

/// Hull-White short-rate yield curve.
///
/// The short rate is Gaussian and mean reverting: every reset restores it to
/// the input forward rate at the start, every update advances
/// `r -> r * exp(-m dt) + mu(t) + sqrt(v) * z` with
/// `v = sigma^2 (1 - exp(-2 m dt)) / (2 m)` and the drift `mu` supplied by
/// the cached calibrator so that the model reprices the input discount
/// factors. `discount_to` uses the affine-term-structure closed form; the
/// numeraire rolls with the trapezoid of successive short rates.
pub struct HullWhiteCurve {
    core: AgentCore<f64>,
    deps: DepList,
    noise: Option<SharedScalar>,
    calibrator: Option<Shared<Cached<Calibrator>>>,
    bonds: Option<Rc<dyn Line>>,
    mean_reversion: f64,
    volatility: f64,
    numeraire_df: f64,
}

impl HullWhiteCurve {
    /// An unconfigured curve.
    pub fn new() -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            noise: None,
            calibrator: None,
            bonds: None,
            mean_reversion: 0.0,
            volatility: 0.0,
            numeraire_df: 1.0,
        }
    }

    /// Connects the driving Gaussian variate and the input discount curve,
    /// and sets the model parameters.
    pub fn setup<C>(
        &mut self,
        noise: &Shared<C>,
        bonds: Rc<dyn Line>,
        mean_reversion: f64,
        volatility: f64,
    ) where
        C: Agent<State = f64> + 'static,
    {
        let calibrator = Rc::new(RefCell::new(Cached::new(Calibrator::new(
            bonds.clone(),
            mean_reversion,
            volatility,
        ))));

        self.deps.clear();
        self.deps.push(noise);
        self.deps.push(&calibrator);
        self.noise = Some(noise.clone() as SharedScalar);
        self.calibrator = Some(calibrator);
        self.bonds = Some(bonds);
        self.mean_reversion = mean_reversion;
        self.volatility = volatility;
    }

    fn calibration(&self) -> SimResult<CalibrationPoint> {
        let calibrator = require(&self.calibrator, "hull-white calibrator")?;
        let point = calibrator.borrow().state();
        Ok(point)
    }
}

impl Default for HullWhiteCurve {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for HullWhiteCurve {
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
        require(&self.noise, "hull-white noise")?;
        require(&self.bonds, "hull-white input bonds").map(|_| ())
    }

    fn on_reset(&mut self) -> SimResult<()> {
        self.core.state = self.calibration()?.forward;
        self.numeraire_df = 1.0;
        Ok(())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        let noise = require(&self.noise, "hull-white noise")?;
        let last = self.core.state;
        let m = self.mean_reversion;
        let vol = self.volatility;
        let drift = self.calibration()?.drift;
        let dt = self.core.dt_years();

        let mean = last * (-m * dt).exp() + drift;
        let variance = (1.0 - (-2.0 * m * dt).exp()) / m * vol * vol / 2.0;

        self.core.state = mean + variance.sqrt() * noise.borrow().state();
        // Trapezoidal roll of the numeraire over the step.
        self.numeraire_df *= (-(last + self.core.state) / 2.0 * dt).exp();
        Ok(true)
    }

    fn dump_attrs(&self, tag: XmlTag) -> XmlTag {
        tag.attr("mean_reversion", self.mean_reversion)
            .attr("volatility", self.volatility)
    }
}

mcsim_agents::impl_agent!(HullWhiteCurve);

impl YieldCurve for HullWhiteCurve {
    fn discount(&self) -> SimResult<f64> {
        Ok(self.numeraire_df)
    }

    fn discount_to(&self, t: Time) -> SimResult<f64> {
        let bonds = require(&self.bonds, "hull-white input bonds")?;
        let m = self.mean_reversion;
        let vol = self.volatility;
        let point = self.calibration()?;

        let forward_bond = bonds.value(t as f64) / point.bond;
        let elapsed = self.core.years(self.core.time() - self.core.start());
        let dt = self.core.years(t - self.core.time());

        let b = (1.0 - (-m * dt).exp()) / m;
        let s = (1.0 - (-2.0 * m * elapsed).exp()) / m;
        let a = forward_bond * (b * (point.forward - b * vol * vol * s / 4.0)).exp();

        Ok(a * (-b * self.core.state).exp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mcsim_agents::agent::Lifecycle;
    use mcsim_agents::basic::GaussianVariate;
    use mcsim_agents::driver::SimContext;
    use mcsim_core::math::line::InterpolatedLine;

    fn flat_bonds(rate: f64) -> Rc<dyn Line> {
        Rc::new(
            InterpolatedLine::sampled(0.0, 4000.0, 1.0, move |t| (-rate * t / 365.0).exp())
                .unwrap(),
        )
    }

    fn make_curve(vol: f64) -> (SimContext, Shared<HullWhiteCurve>) {
        let ctx = SimContext::standalone();
        let noise = Rc::new(RefCell::new(GaussianVariate::new()));
        let mut curve = HullWhiteCurve::new();
        curve.setup(&noise, flat_bonds(0.05), 0.1, vol);
        (ctx, Rc::new(RefCell::new(curve)))
    }

    #[test]
    fn reset_restores_the_initial_forward() {
        let (ctx, curve) = make_curve(0.0);
        curve.borrow_mut().init(0, 730, &ctx).unwrap();
        curve.borrow_mut().reset().unwrap();
        assert_relative_eq!(curve.borrow().state(), 0.05, epsilon = 1e-3);
        assert_relative_eq!(curve.borrow().discount().unwrap(), 1.0);
    }

    #[test]
    fn zero_vol_numeraire_tracks_the_input_curve() {
        let (ctx, curve) = make_curve(0.0);
        curve.borrow_mut().init(0, 730, &ctx).unwrap();
        curve.borrow_mut().reset().unwrap();
        // Daily steps keep the trapezoidal roll close to the integral.
        for t in 1..=730 {
            curve.borrow_mut().update(t).unwrap();
        }
        assert_relative_eq!(
            curve.borrow().discount().unwrap(),
            (-0.05_f64 * 2.0).exp(),
            epsilon = 1e-4
        );
    }

    #[test]
    fn zero_vol_bond_prices_reprice_the_input() {
        let (ctx, curve) = make_curve(0.0);
        curve.borrow_mut().init(0, 730, &ctx).unwrap();
        curve.borrow_mut().reset().unwrap();
        assert_relative_eq!(
            curve.borrow().discount_to(730).unwrap(),
            (-0.05_f64 * 2.0).exp(),
            epsilon = 1e-4
        );

        curve.borrow_mut().update(365).unwrap();
        assert_relative_eq!(
            curve.borrow().discount_to(730).unwrap(),
            (-0.05f64).exp(),
            epsilon = 1e-3
        );
        assert_relative_eq!(curve.borrow().discount_to(365).unwrap(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn calibrator_is_replayed_across_paths() {
        let (ctx, curve) = make_curve(0.01);
        curve.borrow_mut().init(0, 730, &ctx).unwrap();

        curve.borrow_mut().reset().unwrap();
        curve.borrow_mut().update(365).unwrap();
        curve.borrow_mut().update(730).unwrap();
        let calibrator = curve.borrow().calibrator.as_ref().unwrap().clone();
        let records = calibrator.borrow().record_count();
        assert_eq!(records, 3);

        curve.borrow_mut().reset().unwrap();
        curve.borrow_mut().update(365).unwrap();
        curve.borrow_mut().update(730).unwrap();
        assert_eq!(calibrator.borrow().record_count(), records);
    }
}
