//! Random job inputs.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::PoolConfig;

/// `count` inputs drawn uniformly from `[min, max)`.
#[derive(Debug, Clone)]
pub struct RandomInputs {
    remaining: usize,
    min: i64,
    max: i64,
    rng: StdRng,
}

impl RandomInputs {
    /// # Panics
    ///
    /// Panics if `min >= max`; [`PoolConfig::validate`] rejects such ranges.
    pub fn new(count: usize, min: i64, max: i64) -> Self {
        Self::with_rng(count, min, max, StdRng::from_entropy())
    }

    /// Deterministic sequence for a given seed.
    pub fn seeded(count: usize, min: i64, max: i64, seed: u64) -> Self {
        Self::with_rng(count, min, max, StdRng::seed_from_u64(seed))
    }

    pub fn from_config(config: &PoolConfig) -> Self {
        Self::new(config.tasks, config.min_input, config.max_input)
    }

    fn with_rng(count: usize, min: i64, max: i64, rng: StdRng) -> Self {
        assert!(min < max, "empty input range [{min}, {max})");
        Self {
            remaining: count,
            min,
            max,
            rng,
        }
    }
}

impl Iterator for RandomInputs {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(self.rng.gen_range(self.min..self.max))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for RandomInputs {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yields_count_values_in_range() {
        let inputs: Vec<i64> = RandomInputs::new(500, 3, 10).collect();
        assert_eq!(inputs.len(), 500);
        assert!(inputs.iter().all(|n| (3..10).contains(n)));
    }

    #[test]
    fn seeded_inputs_repeat() {
        let a: Vec<i64> = RandomInputs::seeded(20, 0, 1000, 42).collect();
        let b: Vec<i64> = RandomInputs::seeded(20, 0, 1000, 42).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn exact_size() {
        let mut inputs = RandomInputs::seeded(3, 0, 2, 1);
        assert_eq!(inputs.len(), 3);
        inputs.next();
        assert_eq!(inputs.len(), 2);
    }

    #[test]
    fn from_config_uses_task_count_and_bounds() {
        let config = PoolConfig::default().with_tasks(7).with_input_range(5, 6);
        let inputs: Vec<i64> = RandomInputs::from_config(&config).collect();
        assert_eq!(inputs, vec![5; 7]);
    }

    #[test]
    #[should_panic(expected = "empty input range")]
    fn empty_range_panics() {
        let _ = RandomInputs::new(1, 4, 4);
    }
}
