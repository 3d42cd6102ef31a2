//! Randomness behind item effects, begging and the chocolate jackpot.
//!
//! The engine only ever asks three questions, so tests can swap in [`FixedDice`] and
//! replays can use [`SeededDice`].
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub trait EffectDice: Send {
    /// `true` with probability `percent / 100`.
    fn chance(&mut self, percent: u32) -> bool;

    /// Uniform fraction in `[lo, hi)`.
    fn fraction(&mut self, lo: f64, hi: f64) -> f64;

    /// Uniform integer in `[lo, hi]`.
    fn range(&mut self, lo: i64, hi: i64) -> i64;
}

/// Thread-local RNG, the production default.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadDice;

impl EffectDice for ThreadDice {
    fn chance(&mut self, percent: u32) -> bool {
        rand::thread_rng().gen_range(0..100) < percent.min(100)
    }

    fn fraction(&mut self, lo: f64, hi: f64) -> f64 {
        if hi <= lo {
            return lo;
        }
        rand::thread_rng().gen_range(lo..hi)
    }

    fn range(&mut self, lo: i64, hi: i64) -> i64 {
        if hi <= lo {
            return lo;
        }
        rand::thread_rng().gen_range(lo..=hi)
    }
}

/// Reproducible dice from a fixed seed.
pub struct SeededDice {
    rng: StdRng,
}

impl SeededDice {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl EffectDice for SeededDice {
    fn chance(&mut self, percent: u32) -> bool {
        self.rng.gen_range(0..100) < percent.min(100)
    }

    fn fraction(&mut self, lo: f64, hi: f64) -> f64 {
        if hi <= lo {
            return lo;
        }
        self.rng.gen_range(lo..hi)
    }

    fn range(&mut self, lo: i64, hi: i64) -> i64 {
        if hi <= lo {
            return lo;
        }
        self.rng.gen_range(lo..=hi)
    }
}

/// Dice that always land the same way.
///
/// `position` picks where inside a requested range the result falls: `0.0` is the low
/// end, values approaching `1.0` the high end.
#[derive(Debug, Clone, Copy)]
pub struct FixedDice {
    pub lucky: bool,
    pub position: f64,
}

impl FixedDice {
    pub fn new(lucky: bool, position: f64) -> Self {
        Self {
            lucky,
            position: position.clamp(0.0, 0.999_999),
        }
    }

    /// Never lucky, always the low end of every range.
    pub fn low() -> Self {
        Self::new(false, 0.0)
    }
}

impl EffectDice for FixedDice {
    fn chance(&mut self, _percent: u32) -> bool {
        self.lucky
    }

    fn fraction(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.position
    }

    fn range(&mut self, lo: i64, hi: i64) -> i64 {
        if hi <= lo {
            return lo;
        }
        let span = (hi - lo + 1) as f64;
        lo + (span * self.position) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_dice_stay_in_range() {
        let mut dice = SeededDice::new(7);
        for _ in 0..1000 {
            let f = dice.fraction(0.1, 0.6);
            assert!((0.1..0.6).contains(&f));
            let r = dice.range(1, 10);
            assert!((1..=10).contains(&r));
        }
    }

    #[test]
    fn seeded_dice_are_reproducible() {
        let mut a = SeededDice::new(42);
        let mut b = SeededDice::new(42);
        for _ in 0..20 {
            assert_eq!(a.range(0, 1000), b.range(0, 1000));
        }
    }

    #[test]
    fn chance_extremes() {
        let mut dice = ThreadDice;
        assert!(!dice.chance(0));
        assert!(dice.chance(100));
    }

    #[test]
    fn fixed_dice_positions() {
        let mut low = FixedDice::low();
        assert_eq!(low.range(1, 10), 1);
        assert!((low.fraction(0.2, 0.3) - 0.2).abs() < f64::EPSILON);

        let mut high = FixedDice::new(true, 1.0);
        assert_eq!(high.range(1, 10), 10);
        assert!(high.fraction(0.1, 0.6) < 0.6);
        assert!(high.chance(1));
    }
}
