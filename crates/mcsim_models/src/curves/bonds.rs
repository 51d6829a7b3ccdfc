//! Bond sub-agents derived from a yield curve.

use mcsim_agents::agent::{AgentCore, Process};
use mcsim_agents::linkage::{require, DepList, Shared};
use mcsim_core::types::error::SimResult;
use mcsim_core::types::time::{Span, Time};
use mcsim_core::xml::XmlTag;

use super::{SharedCurve, YieldCurve};

/// Value of a discount bond with a fixed maturity.
///
/// Past maturity the state becomes one (when redemption is enabled) or zero,
/// and the agent goes non-live.
pub struct TermBond {
    core: AgentCore<f64>,
    deps: DepList,
    curve: Option<SharedCurve>,
    maturity: Time,
    redemption: bool,
}

impl TermBond {
    /// An unconfigured term bond; redemption is enabled by default.
    pub fn new() -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            curve: None,
            maturity: 0,
            redemption: true,
        }
    }

    /// Connects the underlying curve and sets the maturity.
    pub fn setup<Y: YieldCurve + 'static>(&mut self, curve: &Shared<Y>, maturity: Time) {
        self.deps.clear();
        self.deps.push(curve);
        self.curve = Some(curve.clone() as SharedCurve);
        self.maturity = maturity;
    }

    /// Chooses whether the state at maturity is unity (the bond redeems) or
    /// zero.
    pub fn set_redemption(&mut self, redemption: bool) {
        self.redemption = redemption;
    }
}

impl Default for TermBond {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for TermBond {
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
        require(&self.curve, "term bond curve").map(|_| ())
    }

    fn on_reset(&mut self) -> SimResult<()> {
        let curve = require(&self.curve, "term bond curve")?;
        self.core.state = curve.borrow().discount_to(self.maturity)?;
        Ok(())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        let curve = require(&self.curve, "term bond curve")?;
        let now = self.core.time();
        if self.maturity > now {
            self.core.state = curve.borrow().discount_to(self.maturity)?;
            Ok(true)
        } else if self.redemption && self.maturity == now {
            self.core.state = 1.0;
            Ok(true)
        } else {
            self.core.state = 0.0;
            Ok(false)
        }
    }

    fn dump_attrs(&self, tag: XmlTag) -> XmlTag {
        tag.attr("maturity", self.maturity)
            .attr("redemption", self.redemption)
    }
}

mcsim_agents::impl_agent!(TermBond);

/// Value of a discount bond whose maturity rolls with the current time:
/// `discount_to(time + tenor)`.
pub struct RollingBond {
    core: AgentCore<f64>,
    deps: DepList,
    curve: Option<SharedCurve>,
    tenor: Span,
}

impl RollingBond {
    /// An unconfigured rolling bond.
    pub fn new() -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            curve: None,
            tenor: 0,
        }
    }

    /// Connects the underlying curve and sets the rolling tenor.
    pub fn setup<Y: YieldCurve + 'static>(&mut self, curve: &Shared<Y>, tenor: Span) {
        self.deps.clear();
        self.deps.push(curve);
        self.curve = Some(curve.clone() as SharedCurve);
        self.tenor = tenor;
    }

    fn price(&mut self) -> SimResult<()> {
        let curve = require(&self.curve, "rolling bond curve")?;
        self.core.state = curve.borrow().discount_to(self.core.time() + self.tenor)?;
        Ok(())
    }
}

impl Default for RollingBond {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for RollingBond {
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
        require(&self.curve, "rolling bond curve").map(|_| ())
    }

    fn on_reset(&mut self) -> SimResult<()> {
        self.price()
    }

    fn on_update(&mut self) -> SimResult<bool> {
        self.price()?;
        Ok(true)
    }

    fn dump_attrs(&self, tag: XmlTag) -> XmlTag {
        tag.attr("tenor", self.tenor)
    }
}

mcsim_agents::impl_agent!(RollingBond);

/// The rolling money-market numeraire of a curve, as an agent.
pub struct SpotBond {
    core: AgentCore<f64>,
    deps: DepList,
    curve: Option<SharedCurve>,
}

impl SpotBond {
    /// An unconfigured spot bond.
    pub fn new() -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            curve: None,
        }
    }

    /// Connects the underlying curve.
    pub fn setup<Y: YieldCurve + 'static>(&mut self, curve: &Shared<Y>) {
        self.deps.clear();
        self.deps.push(curve);
        self.curve = Some(curve.clone() as SharedCurve);
    }

    fn price(&mut self) -> SimResult<()> {
        let curve = require(&self.curve, "spot bond curve")?;
        self.core.state = curve.borrow().discount()?;
        Ok(())
    }
}

impl Default for SpotBond {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for SpotBond {
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
        require(&self.curve, "spot bond curve").map(|_| ())
    }

    fn on_reset(&mut self) -> SimResult<()> {
        self.price()
    }

    fn on_update(&mut self) -> SimResult<bool> {
        self.price()?;
        Ok(true)
    }
}

mcsim_agents::impl_agent!(SpotBond);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curves::ConstantRateCurve;
    use approx::assert_relative_eq;
    use mcsim_agents::agent::{Agent, Lifecycle};
    use mcsim_agents::driver::SimContext;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn curve() -> Shared<ConstantRateCurve> {
        Rc::new(RefCell::new(ConstantRateCurve::new(0.05)))
    }

    #[test]
    fn term_bond_prices_then_redeems() {
        let ctx = SimContext::standalone();
        let yc = curve();
        let mut bond = TermBond::new();
        bond.setup(&yc, 365);
        bond.init(0, 730, &ctx).unwrap();
        bond.reset().unwrap();
        assert_relative_eq!(bond.state(), (-0.05f64).exp(), epsilon = 1e-12);

        bond.update(365).unwrap();
        assert_relative_eq!(bond.state(), 1.0);
        assert!(bond.is_live());

        bond.update(400).unwrap();
        assert_relative_eq!(bond.state(), 0.0);
        assert!(!bond.is_live());
    }

    #[test]
    fn term_bond_without_redemption_dies_at_maturity() {
        let ctx = SimContext::standalone();
        let yc = curve();
        let mut bond = TermBond::new();
        bond.setup(&yc, 365);
        bond.set_redemption(false);
        bond.init(0, 730, &ctx).unwrap();
        bond.reset().unwrap();
        bond.update(365).unwrap();
        assert_relative_eq!(bond.state(), 0.0);
        assert!(!bond.is_live());
    }

    #[test]
    fn rolling_bond_keeps_a_constant_tenor() {
        let ctx = SimContext::standalone();
        let yc = curve();
        let mut bond = RollingBond::new();
        bond.setup(&yc, 182);
        bond.init(0, 730, &ctx).unwrap();
        bond.reset().unwrap();
        let expected = (-0.05_f64 * 182.0 / 365.0).exp();
        assert_relative_eq!(bond.state(), expected, epsilon = 1e-12);
        bond.update(365).unwrap();
        assert_relative_eq!(bond.state(), expected, epsilon = 1e-12);
    }

    #[test]
    fn spot_bond_tracks_the_numeraire() {
        let ctx = SimContext::standalone();
        let yc = curve();
        let mut bond = SpotBond::new();
        bond.setup(&yc);
        bond.init(0, 730, &ctx).unwrap();
        bond.reset().unwrap();
        assert_relative_eq!(bond.state(), 1.0);
        bond.update(365).unwrap();
        assert_relative_eq!(bond.state(), (-0.05f64).exp(), epsilon = 1e-12);
    }
}
