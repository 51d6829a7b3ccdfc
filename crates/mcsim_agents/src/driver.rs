//! The shared random stream and per-simulation context.

use std::cell::RefCell;
use std::rc::Rc;

use mcsim_core::types::time::YearFraction;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Default seed of a driver that was never explicitly seeded.
const DEFAULT_SEED: u64 = 839_823;

/// Random number source shared by every agent of a simulation, plus the
/// path-weight accumulator for importance sampling.
///
/// Call [`reset`](RandomDriver::reset) before generating a new path; call
/// [`update_weight`](RandomDriver::update_weight) each time the path
/// weighting is altered. `reset` does **not** reseed: the draw sequence is
/// deterministic in the seed and the number of draws since the last
/// [`seed`](RandomDriver::seed) call.
pub struct RandomDriver {
    rng: StdRng,
    saved: Option<StdRng>,
    weight: f64,
    seed: u64,
}

impl RandomDriver {
    /// A driver seeded with the engine default.
    pub fn new() -> Self {
        Self::from_seed(DEFAULT_SEED)
    }

    /// A driver seeded with `seed`.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            saved: None,
            weight: 1.0,
            seed,
        }
    }

    /// Reseeds the generator, restarting the draw sequence.
    pub fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
        self.seed = seed;
    }

    /// The seed of the last [`seed`](RandomDriver::seed) call.
    pub fn seed_value(&self) -> u64 {
        self.seed
    }

    /// Next uniform deviate in `[0, 1)`.
    #[inline]
    pub fn draw(&mut self) -> f64 {
        self.rng.gen()
    }

    /// Current path weight.
    #[inline]
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Multiplies the likelihood ratio `w` into the path weight.
    #[inline]
    pub fn update_weight(&mut self, w: f64) {
        self.weight *= w;
    }

    /// Starts a new path: the weight returns to 1. The generator state is
    /// untouched.
    pub fn reset(&mut self) {
        self.weight = 1.0;
    }

    /// Snapshots the generator state for a later [`restore`].
    ///
    /// [`restore`]: RandomDriver::restore
    pub fn save(&mut self) {
        self.saved = Some(self.rng.clone());
    }

    /// Rewinds the generator to the last [`save`](RandomDriver::save).
    /// Without a prior save this is a no-op.
    pub fn restore(&mut self) {
        if let Some(saved) = &self.saved {
            self.rng = saved.clone();
        }
    }
}

impl Default for RandomDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle to the driver; the simulator owns one and every agent in a
/// run references it.
pub type SharedDriver = Rc<RefCell<RandomDriver>>;

/// Per-simulation configuration handed to every agent at `init`: the shared
/// driver plus the year-fraction convention.
///
/// Cheap to clone; agents keep a copy for the duration of a run.
#[derive(Clone)]
pub struct SimContext {
    driver: SharedDriver,
    year_fraction: YearFraction,
}

impl SimContext {
    /// Bundles a driver with a year-fraction convention.
    pub fn new(driver: SharedDriver, year_fraction: YearFraction) -> Self {
        Self {
            driver,
            year_fraction,
        }
    }

    /// A context with a fresh default-seeded driver; mostly for tests.
    pub fn standalone() -> Self {
        Self::new(
            Rc::new(RefCell::new(RandomDriver::new())),
            YearFraction::default(),
        )
    }

    /// The shared driver handle.
    pub fn driver(&self) -> &SharedDriver {
        &self.driver
    }

    /// The year-fraction convention of this simulation.
    pub fn year_fraction(&self) -> YearFraction {
        self.year_fraction
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draws_are_in_unit_interval() {
        let mut driver = RandomDriver::from_seed(42);
        for _ in 0..1000 {
            let u = driver.draw();
            assert!((0.0..1.0).contains(&u));
        }
    }

    #[test]
    fn same_seed_same_sequence() {
        let mut a = RandomDriver::from_seed(7);
        let mut b = RandomDriver::from_seed(7);
        for _ in 0..100 {
            assert_eq!(a.draw(), b.draw());
        }
    }

    #[test]
    fn reseed_restarts_sequence() {
        let mut driver = RandomDriver::from_seed(7);
        let first = driver.draw();
        driver.draw();
        driver.seed(7);
        assert_eq!(driver.draw(), first);
    }

    #[test]
    fn reset_touches_weight_only() {
        let mut driver = RandomDriver::from_seed(7);
        driver.draw();
        let next = {
            let mut probe = RandomDriver::from_seed(7);
            probe.draw();
            probe.draw()
        };
        driver.update_weight(0.5);
        driver.reset();
        assert_eq!(driver.weight(), 1.0);
        assert_eq!(driver.draw(), next);
    }

    #[test]
    fn weight_accumulates_multiplicatively() {
        let mut driver = RandomDriver::new();
        driver.update_weight(2.0);
        driver.update_weight(0.25);
        assert_eq!(driver.weight(), 0.5);
    }

    #[test]
    fn save_restore_rewinds_draws() {
        let mut driver = RandomDriver::from_seed(11);
        driver.save();
        let a: Vec<f64> = (0..5).map(|_| driver.draw()).collect();
        driver.restore();
        let b: Vec<f64> = (0..5).map(|_| driver.draw()).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn restore_without_save_is_noop() {
        let mut driver = RandomDriver::from_seed(11);
        let first = driver.draw();
        driver.restore();
        assert_ne!(driver.draw(), first);
    }
}
