//! Fundamental stochastic model agents.
//!
//! Each model is driven by variate agents connected as dependencies (so a
//! shared variate keeps the coupling between models sampled from the same
//! stream) and advances with the year-fraction convention of the current
//! run.

use mcsim_core::math::numeric::TINY;
use mcsim_core::types::error::SimResult;
use mcsim_core::xml::XmlTag;

use crate::agent::{Agent, AgentCore, Process};
use crate::linkage::{require, DepList, Shared, SharedScalar};

/// Arithmetic Brownian motion with constant drift and volatility.
///
/// `x += mu * dt + sigma * sqrt(dt) * z`, with `z` read from the connected
/// Gaussian variate.
pub struct Diffusion {
    core: AgentCore<f64>,
    deps: DepList,
    noise: Option<SharedScalar>,
    drift: f64,
    volatility: f64,
    initial: f64,
}

impl Diffusion {
    /// An unconfigured diffusion.
    pub fn new() -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            noise: None,
            drift: 0.0,
            volatility: 0.0,
            initial: 0.0,
        }
    }

    /// Connects the Gaussian noise source and sets the parameters.
    pub fn setup<C>(&mut self, noise: &Shared<C>, drift: f64, volatility: f64, initial: f64)
    where
        C: Agent<State = f64> + 'static,
    {
        self.deps.clear();
        self.deps.push(noise);
        self.noise = Some(noise.clone() as SharedScalar);
        self.drift = drift;
        self.volatility = volatility;
        self.initial = initial;
        self.core.state = initial;
    }
}

impl Default for Diffusion {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for Diffusion {
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
        require(&self.noise, "diffusion noise").map(|_| ())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        let noise = require(&self.noise, "diffusion noise")?;
        let dt = self.core.dt_years();
        let z = noise.borrow().state();
        self.core.state += self.drift * dt + self.volatility * dt.sqrt() * z;
        Ok(true)
    }

    fn dump_attrs(&self, tag: XmlTag) -> XmlTag {
        tag.attr("initial", self.initial)
            .attr("drift", self.drift)
            .attr("volatility", self.volatility)
    }
}

crate::impl_agent!(Diffusion);

/// Geometric Brownian motion with constant drift and volatility.
pub struct LogNormalDiffusion {
    core: AgentCore<f64>,
    deps: DepList,
    noise: Option<SharedScalar>,
    drift: f64,
    volatility: f64,
    initial: f64,
}

impl LogNormalDiffusion {
    /// An unconfigured lognormal diffusion.
    pub fn new() -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            noise: None,
            drift: 0.0,
            volatility: 0.0,
            initial: 0.0,
        }
    }

    /// Connects the Gaussian noise source and sets the parameters.
    pub fn setup<C>(&mut self, noise: &Shared<C>, drift: f64, volatility: f64, initial: f64)
    where
        C: Agent<State = f64> + 'static,
    {
        self.deps.clear();
        self.deps.push(noise);
        self.noise = Some(noise.clone() as SharedScalar);
        self.drift = drift;
        self.volatility = volatility;
        self.initial = initial;
        self.core.state = initial;
    }
}

impl Default for LogNormalDiffusion {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for LogNormalDiffusion {
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
        require(&self.noise, "lognormal diffusion noise").map(|_| ())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        let noise = require(&self.noise, "lognormal diffusion noise")?;
        let dt = self.core.dt_years();
        let z = noise.borrow().state();
        let vol = self.volatility;
        self.core.state *= ((self.drift - vol * vol / 2.0) * dt + vol * dt.sqrt() * z).exp();
        Ok(true)
    }

    fn dump_attrs(&self, tag: XmlTag) -> XmlTag {
        tag.attr("initial", self.initial)
            .attr("drift", self.drift)
            .attr("volatility", self.volatility)
    }
}

crate::impl_agent!(LogNormalDiffusion);

/// Ornstein-Uhlenbeck process reverting to an agent-valued level.
///
/// Uses the exact transition: decay towards the level with
/// `exp(-speed * dt)` plus a Gaussian increment of variance
/// `sigma^2 (1 - exp(-2 speed dt)) / (2 speed)`.
pub struct OrnsteinUhlenbeck {
    core: AgentCore<f64>,
    deps: DepList,
    noise: Option<SharedScalar>,
    level: Option<SharedScalar>,
    speed: f64,
    volatility: f64,
    initial: f64,
}

impl OrnsteinUhlenbeck {
    /// An unconfigured process.
    pub fn new() -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            noise: None,
            level: None,
            speed: 0.0,
            volatility: 0.0,
            initial: 0.0,
        }
    }

    /// Connects the noise and reversion-level agents and sets the
    /// parameters.
    pub fn setup<C, L>(
        &mut self,
        noise: &Shared<C>,
        level: &Shared<L>,
        speed: f64,
        volatility: f64,
        initial: f64,
    ) where
        C: Agent<State = f64> + 'static,
        L: Agent<State = f64> + 'static,
    {
        self.deps.clear();
        self.deps.push(noise);
        self.deps.push(level);
        self.noise = Some(noise.clone() as SharedScalar);
        self.level = Some(level.clone() as SharedScalar);
        self.speed = speed;
        self.volatility = volatility;
        self.initial = initial;
        self.core.state = initial;
    }
}

impl Default for OrnsteinUhlenbeck {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for OrnsteinUhlenbeck {
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
        require(&self.noise, "ou noise")?;
        require(&self.level, "ou reversion level").map(|_| ())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        let noise = require(&self.noise, "ou noise")?;
        let level = require(&self.level, "ou reversion level")?;
        let dt = self.core.dt_years();
        let decay = (-self.speed * dt).exp();
        let variance =
            self.volatility * self.volatility * (1.0 - decay * decay) / (2.0 * self.speed);
        let mean = level.borrow().state();
        self.core.state =
            self.core.state * decay + mean * (1.0 - decay) + variance.sqrt() * noise.borrow().state();
        Ok(true)
    }

    fn dump_attrs(&self, tag: XmlTag) -> XmlTag {
        tag.attr("initial", self.initial)
            .attr("speed", self.speed)
            .attr("volatility", self.volatility)
    }
}

crate::impl_agent!(OrnsteinUhlenbeck);

/// Single-jump survival process.
///
/// Each step the connected uniform variate is compared against
/// `exp(-h * dt)`; at the first failure the state toggles between zero and
/// one and the process goes non-live.
pub struct EventProcess {
    core: AgentCore<f64>,
    deps: DepList,
    noise: Option<SharedScalar>,
    intensity: Option<SharedScalar>,
}

impl EventProcess {
    /// An unconfigured event process.
    pub fn new() -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            noise: None,
            intensity: None,
        }
    }

    /// Connects the uniform noise source and intensity process, and sets the
    /// initial state.
    pub fn setup<C, H>(&mut self, noise: &Shared<C>, intensity: &Shared<H>, initial: f64)
    where
        C: Agent<State = f64> + 'static,
        H: Agent<State = f64> + 'static,
    {
        self.deps.clear();
        self.deps.push(noise);
        self.deps.push(intensity);
        self.noise = Some(noise.clone() as SharedScalar);
        self.intensity = Some(intensity.clone() as SharedScalar);
        self.core.state = initial;
    }
}

impl Default for EventProcess {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for EventProcess {
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
        require(&self.noise, "event process noise")?;
        require(&self.intensity, "event process intensity").map(|_| ())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        let noise = require(&self.noise, "event process noise")?;
        let intensity = require(&self.intensity, "event process intensity")?;
        let q = intensity.borrow().state() * self.core.dt_years();
        let survival = (-q).exp();

        if noise.borrow().state() > survival {
            self.core.state = if self.core.state > TINY { 0.0 } else { 1.0 };
            return Ok(false);
        }
        Ok(true)
    }
}

crate::impl_agent!(EventProcess);

/// Poisson jump counter.
///
/// One uniform value per step is pushed through the cumulative Poisson
/// probabilities to sample the number of jumps over the interval; the state
/// accumulates the count.
pub struct JumpProcess {
    core: AgentCore<f64>,
    deps: DepList,
    noise: Option<SharedScalar>,
    intensity: Option<SharedScalar>,
}

impl JumpProcess {
    /// An unconfigured jump process.
    pub fn new() -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            noise: None,
            intensity: None,
        }
    }

    /// Connects the uniform noise source and intensity process, and sets the
    /// initial count.
    pub fn setup<C, H>(&mut self, noise: &Shared<C>, intensity: &Shared<H>, initial: f64)
    where
        C: Agent<State = f64> + 'static,
        H: Agent<State = f64> + 'static,
    {
        self.deps.clear();
        self.deps.push(noise);
        self.deps.push(intensity);
        self.noise = Some(noise.clone() as SharedScalar);
        self.intensity = Some(intensity.clone() as SharedScalar);
        self.core.state = initial;
    }
}

impl Default for JumpProcess {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for JumpProcess {
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
        require(&self.noise, "jump process noise")?;
        require(&self.intensity, "jump process intensity").map(|_| ())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        let noise = require(&self.noise, "jump process noise")?;
        let intensity = require(&self.intensity, "jump process intensity")?;
        let q = intensity.borrow().state() * self.core.dt_years();
        let u = noise.borrow().state();

        let mut pk = (-q).exp();
        let mut cumulative = pk;
        let mut jumps = 0.0;
        while u > cumulative {
            jumps += 1.0;
            pk *= q / jumps;
            cumulative += pk;
        }

        self.core.state += jumps;
        Ok(true)
    }
}

crate::impl_agent!(JumpProcess);

/// Two-state lognormal diffusion: drift and volatility switch between two
/// regimes, with per-regime exit probabilities tested against a uniform
/// switching process.
pub struct RegimeLognormal {
    core: AgentCore<f64>,
    deps: DepList,
    noise: Option<SharedScalar>,
    switch: Option<SharedScalar>,
    drift: [f64; 2],
    volatility: [f64; 2],
    hazard: [f64; 2],
    regime: usize,
    initial: f64,
}

impl RegimeLognormal {
    /// An unconfigured regime-switching diffusion.
    pub fn new() -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            noise: None,
            switch: None,
            drift: [0.0; 2],
            volatility: [0.0; 2],
            hazard: [0.0; 2],
            regime: 0,
            initial: 0.0,
        }
    }

    /// Connects the Gaussian diffusion driver and the uniform switching
    /// driver, with per-regime drift, volatility and stay probability.
    #[allow(clippy::too_many_arguments)]
    pub fn setup<C, W>(
        &mut self,
        noise: &Shared<C>,
        switch: &Shared<W>,
        drift0: f64,
        vol0: f64,
        stay0: f64,
        drift1: f64,
        vol1: f64,
        stay1: f64,
        initial: f64,
    ) where
        C: Agent<State = f64> + 'static,
        W: Agent<State = f64> + 'static,
    {
        self.deps.clear();
        self.deps.push(noise);
        self.deps.push(switch);
        self.noise = Some(noise.clone() as SharedScalar);
        self.switch = Some(switch.clone() as SharedScalar);
        self.drift = [drift0, drift1];
        self.volatility = [vol0, vol1];
        self.hazard = [-stay0.ln(), -stay1.ln()];
        self.initial = initial;
        self.core.state = initial;
    }
}

impl Default for RegimeLognormal {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for RegimeLognormal {
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
        require(&self.noise, "regime lognormal noise")?;
        require(&self.switch, "regime lognormal switch").map(|_| ())
    }

    fn on_reset(&mut self) -> SimResult<()> {
        self.regime = 0;
        Ok(())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        let noise = require(&self.noise, "regime lognormal noise")?;
        let switch = require(&self.switch, "regime lognormal switch")?;
        let dt = self.core.dt_years();

        let stay = (-self.hazard[self.regime] * dt).exp();
        if switch.borrow().state() < stay {
            self.regime = 1 - self.regime;
        }
        let mu = self.drift[self.regime];
        let vol = self.volatility[self.regime];

        self.core.state *=
            ((mu - vol * vol / 2.0) * dt + vol * dt.sqrt() * noise.borrow().state()).exp();
        Ok(true)
    }
}

crate::impl_agent!(RegimeLognormal);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Lifecycle;
    use crate::basic::{Constant, GaussianVariate, UniformVariate};
    use crate::driver::SimContext;
    use approx::assert_relative_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn gaussian() -> Shared<GaussianVariate> {
        Rc::new(RefCell::new(GaussianVariate::new()))
    }

    fn uniform() -> Shared<UniformVariate> {
        Rc::new(RefCell::new(UniformVariate::new()))
    }

    #[test]
    fn diffusion_zero_vol_is_deterministic_drift() {
        let ctx = SimContext::standalone();
        let z = gaussian();
        let mut model = Diffusion::new();
        model.setup(&z, 0.10, 0.0, 1.0);
        model.init(0, 730, &ctx).unwrap();
        model.reset().unwrap();
        model.update(365).unwrap();
        assert_relative_eq!(model.state(), 1.1, epsilon = 1e-12);
        model.update(730).unwrap();
        assert_relative_eq!(model.state(), 1.2, epsilon = 1e-12);
    }

    #[test]
    fn lognormal_zero_vol_grows_exponentially() {
        let ctx = SimContext::standalone();
        let z = gaussian();
        let mut model = LogNormalDiffusion::new();
        model.setup(&z, 0.05, 0.0, 100.0);
        model.init(0, 365, &ctx).unwrap();
        model.reset().unwrap();
        model.update(365).unwrap();
        assert_relative_eq!(model.state(), 100.0 * (0.05f64).exp(), epsilon = 1e-9);
    }

    #[test]
    fn lognormal_reset_restores_initial() {
        let ctx = SimContext::standalone();
        let z = gaussian();
        let mut model = LogNormalDiffusion::new();
        model.setup(&z, 0.0, 0.2, 50.0);
        model.init(0, 365, &ctx).unwrap();
        model.reset().unwrap();
        model.update(100).unwrap();
        model.reset().unwrap();
        assert_relative_eq!(model.state(), 50.0, epsilon = 1e-12);
    }

    #[test]
    fn ou_zero_vol_reverts_to_level() {
        let ctx = SimContext::standalone();
        let z = gaussian();
        let level = Rc::new(RefCell::new(Constant::new(0.05)));
        let mut model = OrnsteinUhlenbeck::new();
        model.setup(&z, &level, 2.0, 0.0, 0.20);
        model.init(0, 3650, &ctx).unwrap();
        model.reset().unwrap();
        model.update(3650).unwrap();
        // Ten years at speed 2: essentially at the level.
        assert_relative_eq!(model.state(), 0.05, epsilon = 1e-8);
    }

    #[test]
    fn event_process_fires_once_and_dies() {
        let ctx = SimContext::standalone();
        let u = uniform();
        let intensity = Rc::new(RefCell::new(Constant::new(1000.0)));
        let mut model = EventProcess::new();
        model.setup(&u, &intensity, 1.0);
        model.init(0, 3650, &ctx).unwrap();
        model.reset().unwrap();
        // With a huge intensity the event is essentially certain.
        model.update(365).unwrap();
        assert!(!model.is_live());
        assert_relative_eq!(model.state(), 0.0);
        let frozen = model.state();
        model.update(730).unwrap();
        assert_relative_eq!(model.state(), frozen);
    }

    #[test]
    fn jump_process_counts_roughly_the_intensity() {
        let ctx = SimContext::standalone();
        let u = uniform();
        let intensity = Rc::new(RefCell::new(Constant::new(10.0)));
        let mut model = JumpProcess::new();
        model.setup(&u, &intensity, 0.0);
        model.init(0, 365_000, &ctx).unwrap();

        // One thousand years of jumps at 10 per year.
        let mut total = 0.0;
        model.reset().unwrap();
        for year in 1..=1000 {
            model.update(year * 365).unwrap();
        }
        total += model.state();
        let rate = total / 1000.0;
        assert!((rate - 10.0).abs() < 0.5, "rate = {}", rate);
    }

    #[test]
    fn regime_lognormal_is_positive() {
        let ctx = SimContext::standalone();
        let z = gaussian();
        let u = uniform();
        let mut model = RegimeLognormal::new();
        model.setup(&z, &u, 0.05, 0.1, 0.95, -0.1, 0.4, 0.8, 100.0);
        model.init(0, 3650, &ctx).unwrap();
        model.reset().unwrap();
        for t in 1..=120 {
            model.update(t * 30).unwrap();
            assert!(model.state() > 0.0);
        }
    }
}
