//! The deterministic random stream.
//!
//! A single multiplicative linear-congruential generator (Lehmer, modulus
//! 2^31 - 1, multiplier 48271) feeds every pipeline stage in a strict,
//! order-dependent sequence. Reproducibility of the whole model therefore
//! depends on two rules: no stage may draw from any other source, and no
//! retry loop may reset the stream. A failed attempt leaves the stream
//! advanced so the next attempt explores different choices.
//!
//! `save`/`restore` checkpoint the raw state so optional sub-computations
//! (the coastline carve, for example) can be skipped without perturbing the
//! numbers later stages consume.

use crate::error::{BuildError, Result};

const MODULUS: u64 = 2_147_483_647; // 2^31 - 1
const MULTIPLIER: u64 = 48_271;

/// Saved generator state, opaque to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenState(u32);

#[derive(Debug, Clone)]
pub struct Gen {
    state: u32,
}

impl Gen {
    /// Seed the stream. Any seed is accepted; 0 and multiples of the modulus
    /// are remapped to keep the state inside the cycle.
    pub fn new(seed: u64) -> Self {
        let mut s = (seed % MODULUS) as u32;
        if s == 0 {
            s = 1;
        }
        Self { state: s }
    }

    fn step(&mut self) -> u32 {
        self.state = ((self.state as u64 * MULTIPLIER) % MODULUS) as u32;
        self.state
    }

    /// Uniform float in [0, 1).
    pub fn float(&mut self) -> f64 {
        (self.step() - 1) as f64 / (MODULUS - 1) as f64
    }

    /// Roughly normal float in [0, 1): mean of three uniform draws.
    pub fn normal(&mut self) -> f64 {
        (self.float() + self.float() + self.float()) / 3.0
    }

    /// Uniform integer in [min, max).
    pub fn int(&mut self, min: i32, max: i32) -> i32 {
        debug_assert!(min < max);
        min + (self.float() * (max - min) as f64) as i32
    }

    /// Uniform index in [0, len).
    pub fn index(&mut self, len: usize) -> usize {
        debug_assert!(len > 0);
        (self.float() * len as f64) as usize
    }

    /// Bernoulli draw with probability `p`.
    pub fn chance(&mut self, p: f64) -> bool {
        self.float() < p
    }

    /// Multiplicative jitter: 1 ± f, centred on 1.
    pub fn fuzzy(&mut self, f: f64) -> f64 {
        if f == 0.0 {
            1.0
        } else {
            1.0 + (self.float() * 2.0 - 1.0) * f
        }
    }

    /// Pick an index according to the given non-negative weights.
    /// Returns `weights.len() - 1` when rounding eats the tail.
    pub fn weighted(&mut self, weights: &[f64]) -> usize {
        debug_assert!(!weights.is_empty());
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return self.index(weights.len());
        }
        let mut target = self.float() * total;
        for (i, w) in weights.iter().enumerate() {
            target -= w;
            if target < 0.0 {
                return i;
            }
        }
        weights.len() - 1
    }

    /// Fisher–Yates shuffle driven by this stream.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.index(i + 1);
            items.swap(i, j);
        }
    }

    /// Checkpoint the stream.
    pub fn save(&self) -> GenState {
        GenState(self.state)
    }

    /// Roll the stream back to a checkpoint.
    pub fn restore(&mut self, state: GenState) {
        self.state = state.0;
    }
}

/// Bounded retry combinator. Re-invokes `f` with the same, already-advanced
/// generator until it succeeds or the attempt budget runs out. The stream is
/// never reset between attempts; that advancement is what lets a retried
/// stage converge on a buildable configuration. Exhaustion names the stage
/// and carries the final attempt's error as its source.
pub fn retry<T>(
    gen: &mut Gen,
    max_attempts: usize,
    stage: &'static str,
    mut f: impl FnMut(&mut Gen) -> Result<T>,
) -> Result<T> {
    let mut last: Option<BuildError> = None;
    for _ in 0..max_attempts {
        match f(gen) {
            Ok(v) => return Ok(v),
            Err(e) => last = Some(e),
        }
    }
    let source = last.unwrap_or(BuildError::InvalidTopology("retry with a zero attempt budget"));
    Err(BuildError::Exhausted { stage, source: Box::new(source) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_sequence() {
        let mut a = Gen::new(1234);
        let mut b = Gen::new(1234);
        for _ in 0..1000 {
            assert_eq!(a.float().to_bits(), b.float().to_bits());
        }
    }

    #[test]
    fn save_restore_replays_draws() {
        let mut g = Gen::new(99);
        g.float();
        let mark = g.save();
        let first: Vec<f64> = (0..16).map(|_| g.float()).collect();
        g.restore(mark);
        let second: Vec<f64> = (0..16).map(|_| g.float()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn int_stays_in_range() {
        let mut g = Gen::new(7);
        for _ in 0..1000 {
            let v = g.int(3, 9);
            assert!((3..9).contains(&v));
        }
    }

    #[test]
    fn weighted_respects_zero_weights() {
        let mut g = Gen::new(5);
        for _ in 0..200 {
            let i = g.weighted(&[0.0, 1.0, 0.0]);
            assert_eq!(i, 1);
        }
    }

    #[test]
    fn retry_advances_stream_between_attempts() {
        let mut g = Gen::new(42);
        let mut draws = Vec::new();
        let result = retry(&mut g, 5, "test", |gen| {
            let v = gen.float();
            draws.push(v);
            if draws.len() < 3 {
                Err(BuildError::NoPath)
            } else {
                Ok(v)
            }
        });
        assert!(result.is_ok());
        assert_eq!(draws.len(), 3);
        assert!(draws[0] != draws[1] && draws[1] != draws[2]);
    }

    #[test]
    fn retry_exhaustion_names_the_stage_and_keeps_the_cause() {
        let mut g = Gen::new(1);
        let err = retry(&mut g, 3, "gates", |_| -> Result<()> { Err(BuildError::NoGates) });
        match err {
            Err(BuildError::Exhausted { stage, source }) => {
                assert_eq!(stage, "gates");
                assert!(matches!(*source, BuildError::NoGates));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
