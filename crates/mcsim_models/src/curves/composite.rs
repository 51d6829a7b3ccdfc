//! Curve composition: term-structure shifts and curve products.

use std::rc::Rc;

use mcsim_agents::agent::{AgentCore, Process};
use mcsim_agents::linkage::{require, DepList, Shared};
use mcsim_core::math::line::Line;
use mcsim_core::types::error::{SimError, SimResult};
use mcsim_core::types::time::Time;
use mcsim_core::xml::XmlTag;

use super::{SharedCurve, YieldCurve};

/// How a shift function composes with the base curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftKind {
    /// The shift adds to the base short rate. Discount queries are not
    /// defined for this mode; compose two curves instead.
    Additive,
    /// Discount factors are raised to the shift power.
    Product,
}

/// Applies a term-structure shift to a base curve.
///
/// The state mirrors the base short rate shifted at tenor zero; discount
/// queries are only supported for the product shift and surface
/// `Unsupported` otherwise.
pub struct ShiftedCurve {
    core: AgentCore<f64>,
    deps: DepList,
    base: Option<SharedCurve>,
    shift: Option<Rc<dyn Line>>,
    kind: ShiftKind,
}

impl ShiftedCurve {
    /// An unconfigured shifted curve.
    pub fn new(kind: ShiftKind) -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            base: None,
            shift: None,
            kind,
        }
    }

    /// Connects the base curve and the shift function.
    pub fn setup<Y: YieldCurve + 'static>(&mut self, base: &Shared<Y>, shift: Rc<dyn Line>) {
        self.deps.clear();
        self.deps.push(base);
        self.base = Some(base.clone() as SharedCurve);
        self.shift = Some(shift);
    }

    fn shifted_state(&self) -> SimResult<f64> {
        let base = require(&self.base, "shifted curve base")?;
        let shift = require(&self.shift, "shifted curve shift")?;
        let rate = base.borrow().state();
        Ok(match self.kind {
            ShiftKind::Additive => rate + shift.value(0.0),
            ShiftKind::Product => rate * shift.value(0.0),
        })
    }
}

impl Process for ShiftedCurve {
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
        require(&self.base, "shifted curve base")?;
        require(&self.shift, "shifted curve shift").map(|_| ())
    }

    fn on_reset(&mut self) -> SimResult<()> {
        self.core.state = self.shifted_state()?;
        Ok(())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        self.core.state = self.shifted_state()?;
        Ok(true)
    }

    fn dump_attrs(&self, tag: XmlTag) -> XmlTag {
        tag.attr("kind", format!("{:?}", self.kind))
    }
}

mcsim_agents::impl_agent!(ShiftedCurve);

impl YieldCurve for ShiftedCurve {
    fn discount(&self) -> SimResult<f64> {
        let base = require(&self.base, "shifted curve base")?;
        let shift = require(&self.shift, "shifted curve shift")?;
        match self.kind {
            ShiftKind::Additive => Err(SimError::Unsupported(
                "additive rate shifts cannot answer discount queries; combine two curves instead"
                    .to_string(),
            )),
            ShiftKind::Product => {
                let df = base.borrow().discount()?;
                Ok(df.powf(shift.value(0.0)))
            }
        }
    }

    fn discount_to(&self, t: Time) -> SimResult<f64> {
        let base = require(&self.base, "shifted curve base")?;
        let shift = require(&self.shift, "shifted curve shift")?;
        match self.kind {
            ShiftKind::Additive => Err(SimError::Unsupported(
                "additive rate shifts cannot answer discount queries; combine two curves instead"
                    .to_string(),
            )),
            ShiftKind::Product => {
                let dt = (t - self.core.time()) as f64;
                let df = base.borrow().discount_to(t)?;
                Ok(df.powf(shift.value(dt)))
            }
        }
    }
}

/// Product of two curves: discount factors multiply, short rates add.
pub struct CombinedCurve {
    core: AgentCore<f64>,
    deps: DepList,
    first: Option<SharedCurve>,
    second: Option<SharedCurve>,
}

impl CombinedCurve {
    /// An unconfigured combined curve.
    pub fn new() -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            first: None,
            second: None,
        }
    }

    /// Connects the two component curves.
    pub fn setup<A, B>(&mut self, first: &Shared<A>, second: &Shared<B>)
    where
        A: YieldCurve + 'static,
        B: YieldCurve + 'static,
    {
        self.deps.clear();
        self.deps.push(first);
        self.deps.push(second);
        self.first = Some(first.clone() as SharedCurve);
        self.second = Some(second.clone() as SharedCurve);
    }

    fn combined_state(&self) -> SimResult<f64> {
        let first = require(&self.first, "combined curve first component")?;
        let second = require(&self.second, "combined curve second component")?;
        let state = first.borrow().state() + second.borrow().state();
        Ok(state)
    }
}

impl Default for CombinedCurve {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for CombinedCurve {
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
        require(&self.first, "combined curve first component")?;
        require(&self.second, "combined curve second component").map(|_| ())
    }

    fn on_reset(&mut self) -> SimResult<()> {
        self.core.state = self.combined_state()?;
        Ok(())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        self.core.state = self.combined_state()?;
        Ok(true)
    }
}

mcsim_agents::impl_agent!(CombinedCurve);

impl YieldCurve for CombinedCurve {
    fn discount(&self) -> SimResult<f64> {
        let first = require(&self.first, "combined curve first component")?;
        let second = require(&self.second, "combined curve second component")?;
        let df = first.borrow().discount()? * second.borrow().discount()?;
        Ok(df)
    }

    fn discount_to(&self, t: Time) -> SimResult<f64> {
        let first = require(&self.first, "combined curve first component")?;
        let second = require(&self.second, "combined curve second component")?;
        let df = first.borrow().discount_to(t)? * second.borrow().discount_to(t)?;
        Ok(df)
    }
}
