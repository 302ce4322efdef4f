use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Clone, Copy, Debug)]
pub struct LootGeneratorParams {
    pub period_ms: u64,
    pub probability: f64,
}

impl Default for LootGeneratorParams {
    fn default() -> Self {
        Self {
            period_ms: 5_000,
            probability: 1.0,
        }
    }
}

// Scarcity-driven spawner. The residual accumulator is local to the owning
// session; full periods consume it one at a time, each with an independent
// Bernoulli draw.
#[derive(Debug)]
pub struct LootGenerator {
    period_ms: u64,
    probability: f64,
    accumulated_ms: u64,
    rng: StdRng,
}

impl LootGenerator {
    pub fn new(params: LootGeneratorParams) -> Self {
        Self::with_rng(params, StdRng::from_os_rng())
    }

    pub fn with_rng(params: LootGeneratorParams, rng: StdRng) -> Self {
        Self {
            period_ms: params.period_ms.max(1),
            probability: params.probability.clamp(0.0, 1.0),
            accumulated_ms: 0,
            rng,
        }
    }

    pub fn generate(&mut self, delta_ms: u64, loot_count: usize, looter_count: usize) -> usize {
        if looter_count <= loot_count {
            return 0;
        }
        let need = looter_count - loot_count;

        self.accumulated_ms += delta_ms;
        let mut spawned = 0;
        while self.accumulated_ms >= self.period_ms {
            self.accumulated_ms -= self.period_ms;
            if spawned < need && self.rng.random_bool(self.probability) {
                spawned += 1;
            }
        }
        spawned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator(period_ms: u64, probability: f64) -> LootGenerator {
        LootGenerator::new(LootGeneratorParams {
            period_ms,
            probability,
        })
    }

    #[test]
    fn no_scarcity_spawns_nothing() {
        let mut gen = generator(5_000, 1.0);
        assert_eq!(gen.generate(60_000, 3, 3), 0);
        assert_eq!(gen.generate(60_000, 5, 2), 0);
    }

    #[test]
    fn one_looter_spawns_one_item_after_full_period() {
        let mut gen = generator(5_000, 1.0);
        assert_eq!(gen.generate(5_000, 0, 1), 1);
    }

    #[test]
    fn residual_time_accumulates_across_calls() {
        let mut gen = generator(5_000, 1.0);
        assert_eq!(gen.generate(3_000, 0, 1), 0);
        assert_eq!(gen.generate(2_000, 0, 1), 1);
    }

    #[test]
    fn spawn_count_is_capped_by_shortage() {
        let mut gen = generator(1_000, 1.0);
        assert_eq!(gen.generate(10_000, 0, 2), 2);
    }

    #[test]
    fn zero_probability_never_spawns() {
        let mut gen = generator(1_000, 0.0);
        assert_eq!(gen.generate(100_000, 0, 10), 0);
    }
}
