//! Estimated coverage models

use crate::config::FingerprintConfig;

/// Inputs available to a coverage estimator for one candidate track
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverageInput {
    /// Aligned coverage of the candidate, in `0.0..=1.0`
    pub coverage: f64,
    /// Votes in the winning offset bin
    pub votes: usize,
    /// Winning votes at least one block apart; neighbouring sub-fingerprints
    /// share most of their frames and so collide together
    pub distinct_votes: usize,
    /// Query sub-fingerprints with at least one visible hit
    pub query_hits: usize,
    /// Query sub-fingerprints that are not silent
    pub query_len: usize,
    /// Sub-fingerprints stored across the visible corpus
    pub corpus_size: u64,
}

/// Adjusts coverage for votes expected from chance code collisions
pub trait CoverageEstimator: Send + Sync {
    fn estimate(&self, input: &CoverageInput) -> f64;
}

/// Upper bound on the chance vote count searched for
const MAX_CHANCE_VOTES: u32 = 4096;

/// Chance-collision model derived from code width and corpus size
///
/// A query block collides by chance with a stored block with probability
/// `p = 1 - (1 - 2^-bits)^codes`. Collisions of overlapping blocks are one
/// event, so the query contributes `query_len / block_frames` independent
/// trials per alignment and the chance votes of one alignment are Poisson with
/// `lambda = trials * p`. Every stored position is a candidate alignment; the
/// expected best chance bin is the largest `k` that at least one of them is
/// expected to reach. Coverage is scaled by the share of distinct votes that
/// chance cannot explain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionModel {
    code_bits: u32,
    codes_per_block: usize,
    block_frames: usize,
}

impl CollisionModel {
    pub fn new(config: &FingerprintConfig) -> Self {
        Self {
            code_bits: config.code_bits,
            codes_per_block: config.codes_per_block,
            block_frames: config.block_frames.max(1),
        }
    }

    /// Probability that one sub-fingerprint shares any code with a random one
    pub fn collision_probability(&self) -> f64 {
        let per_code = 0.5f64.powi(self.code_bits as i32);
        1.0 - (1.0 - per_code).powi(self.codes_per_block as i32)
    }

    /// Distinct votes the best chance alignment is expected to collect
    pub fn expected_false_votes(&self, query_len: usize, corpus_size: u64) -> f64 {
        let trials = query_len as f64 / self.block_frames as f64;
        let lambda = trials * self.collision_probability();
        let alignments = (corpus_size + query_len as u64) as f64;

        let mut k = 0;
        while k < MAX_CHANCE_VOTES && alignments * poisson_tail(lambda, k + 1) >= 1.0 {
            k += 1;
        }
        k as f64
    }
}

/// `P(X >= k)` for `X ~ Poisson(lambda)`
fn poisson_tail(lambda: f64, k: u32) -> f64 {
    if k == 0 {
        return 1.0;
    }
    if lambda <= 0.0 {
        return 0.0;
    }
    let ln_factorial: f64 = (1..=k).map(|i| (i as f64).ln()).sum();
    let mut term = (k as f64 * lambda.ln() - lambda - ln_factorial).exp();
    let mut sum = term;
    let mut i = k;
    while i < k + MAX_CHANCE_VOTES {
        i += 1;
        term *= lambda / i as f64;
        sum += term;
        if term <= sum * 1e-12 {
            break;
        }
    }
    sum.min(1.0)
}

impl CoverageEstimator for CollisionModel {
    fn estimate(&self, input: &CoverageInput) -> f64 {
        if input.distinct_votes == 0 {
            return 0.0;
        }
        let expected = self.expected_false_votes(input.query_len, input.corpus_size);
        let genuine = (1.0 - expected / input.distinct_votes as f64).clamp(0.0, 1.0);
        input.coverage * genuine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn input(distinct_votes: usize, query_len: usize, corpus_size: u64) -> CoverageInput {
        CoverageInput {
            coverage: 0.8,
            votes: distinct_votes * 8,
            distinct_votes,
            query_hits: query_len / 2,
            query_len,
            corpus_size,
        }
    }

    #[test]
    fn test_collision_probability() {
        let mut config = FingerprintConfig::default();
        config.code_bits = 1;
        config.codes_per_block = 1;
        assert_relative_eq!(CollisionModel::new(&config).collision_probability(), 0.5);

        config.codes_per_block = 2;
        assert_relative_eq!(CollisionModel::new(&config).collision_probability(), 0.75);
    }

    #[test]
    fn test_poisson_tail() {
        assert_eq!(poisson_tail(0.3, 0), 1.0);
        assert_relative_eq!(poisson_tail(0.3, 1), 1.0 - (-0.3f64).exp(), epsilon = 1e-10);
        assert_relative_eq!(
            poisson_tail(2.0, 2),
            1.0 - 3.0 * (-2.0f64).exp(),
            epsilon = 1e-10
        );
        assert_eq!(poisson_tail(0.0, 1), 0.0);
    }

    #[test]
    fn test_estimate_is_bounded_by_coverage() {
        let model = CollisionModel::new(&FingerprintConfig::default());
        for votes in [0, 1, 4, 50, 500] {
            let est = model.estimate(&input(votes, 16_000, 100_000));
            assert!((0.0..=0.8).contains(&est));
        }
    }

    #[test]
    fn test_estimate_orders_by_votes_and_corpus() {
        let model = CollisionModel::new(&FingerprintConfig::default());
        let small_corpus = model.estimate(&input(5, 16_000, 1_000));
        let large_corpus = model.estimate(&input(5, 16_000, 10_000_000));
        let more_votes = model.estimate(&input(50, 16_000, 10_000_000));

        assert!(large_corpus < small_corpus);
        assert!(large_corpus < more_votes);
        assert!(small_corpus > 0.0);
        assert_eq!(model.estimate(&input(0, 16_000, 10)), 0.0);
    }

    #[test]
    fn test_clustered_chance_votes_are_discounted() {
        let model = CollisionModel::new(&FingerprintConfig::default());
        // A single collision repeated over neighbouring positions
        let burst = CoverageInput {
            coverage: 0.003,
            votes: 6,
            distinct_votes: 1,
            query_hits: 1500,
            query_len: 1800,
            corpus_size: 3600,
        };
        assert_eq!(model.expected_false_votes(1800, 3600), 1.0);
        assert_eq!(model.estimate(&burst), 0.0);

        // Tiny corpora explain no chance votes
        assert_eq!(model.expected_false_votes(60, 60), 0.0);
        assert_relative_eq!(model.estimate(&input(4, 60, 60)), 0.8);
    }
}
