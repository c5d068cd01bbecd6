//! Random choices made per transaction: which scan to issue, which
//! dataset record to use as the reference point, and the scan parameters.

use rand::distributions::{Distribution, Uniform, WeightedIndex};
use rand::Rng;
use rand_distr::Exp;
use crate::core::config::{IntRange, OperationMix, RequestDistribution};
use crate::core::error::{Error, Result};
use crate::core::types::Operation;

/// Rejection draws tried before sampling the truncated distribution directly.
const MAX_REJECTION_DRAWS: usize = 64;

/// Weighted pick among the enabled scan kinds.
#[derive(Debug, Clone)]
pub struct OperationChooser {
    kinds: Vec<Operation>,
    index: Option<WeightedIndex<f64>>,
}

impl OperationChooser {
    pub fn new(mix: &OperationMix) -> Self {
        let (kinds, weights): (Vec<Operation>, Vec<f64>) = [
            (Operation::ScanKnn, mix.knn),
            (Operation::ScanByDistance, mix.distance),
            (Operation::ScanByPolygon, mix.polygon),
        ]
        .into_iter()
        .filter(|(_, w)| *w > 0.0)
        .unzip();

        let index = if kinds.is_empty() { None } else { WeightedIndex::new(&weights).ok() };
        OperationChooser { kinds, index }
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_none()
    }

    pub fn enabled(&self) -> &[Operation] {
        &self.kinds
    }

    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Operation> {
        let index = self.index.as_ref()?;
        Some(self.kinds[index.sample(rng)])
    }
}

/// Picks the dataset index of the reference point for a scan.
#[derive(Debug, Clone)]
pub enum KeyChooser {
    /// Uniform over `[start, end]`, restricted to what has been acknowledged.
    Uniform { start: u64, end: u64 },
    /// `limit - X` with `X ~ Exp(rate)`, favouring recent inserts, never
    /// below `start`.
    Exponential { start: u64, rate: f64, exp: Exp<f64> },
}

impl KeyChooser {
    pub fn new(distribution: RequestDistribution, insert_start: u64, insert_count: u64) -> Result<Self> {
        if insert_count == 0 {
            return Err(Error::config("insert range is empty"));
        }
        let end = insert_start
            .checked_add(insert_count - 1)
            .ok_or_else(|| Error::config("insertstart + insertcount overflows"))?;
        match distribution {
            RequestDistribution::Uniform => Ok(KeyChooser::Uniform { start: insert_start, end }),
            RequestDistribution::Exponential { percentile, frac } => {
                let rate = -(1.0 - percentile / 100.0).ln() / (insert_count as f64 * frac);
                let exp = Exp::new(rate)
                    .map_err(|e| Error::config(format!("invalid exponential distribution: {}", e)))?;
                Ok(KeyChooser::Exponential { start: insert_start, rate, exp })
            }
        }
    }

    /// `acknowledged` is the highest index known to be inserted, if any.
    /// Never returns an index above it.
    pub fn next_keynum<R: Rng + ?Sized>(&self, rng: &mut R, acknowledged: Option<u64>) -> Option<u64> {
        let limit = acknowledged?;
        match self {
            KeyChooser::Uniform { start, .. } | KeyChooser::Exponential { start, .. } if limit < *start => None,
            KeyChooser::Uniform { start, end } => {
                // uniform over [start, end] conditioned on <= limit
                Some(rng.gen_range(*start..=limit.min(*end)))
            }
            KeyChooser::Exponential { start, rate, exp } => {
                let span = limit - start;
                for _ in 0..MAX_REJECTION_DRAWS {
                    let offset = exp.sample(rng).floor();
                    if offset <= span as f64 {
                        return Some(limit - offset as u64);
                    }
                }
                Some(limit - truncated_exponential(rng, *rate, span))
            }
        }
    }
}

/// Inverse-CDF draw of `floor(X)` for `X ~ Exp(rate)` conditioned on
/// `X < max + 1`.
fn truncated_exponential<R: Rng + ?Sized>(rng: &mut R, rate: f64, max: u64) -> u64 {
    let mass = 1.0 - (-rate * (max as f64 + 1.0)).exp();
    let u: f64 = rng.gen_range(0.0..1.0);
    let x = -(1.0 - u * mass).ln() / rate;
    (x.floor() as u64).min(max)
}

/// Inclusive integer parameter drawn fresh per transaction.
#[derive(Debug, Clone, Copy)]
pub struct UniformRange {
    range: IntRange,
    dist: Uniform<u64>,
}

impl UniformRange {
    pub fn new(range: IntRange) -> Self {
        UniformRange {
            range,
            dist: Uniform::new_inclusive(range.min, range.max),
        }
    }

    pub fn range(&self) -> IntRange {
        self.range
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        self.dist.sample(rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    #[test]
    fn chooser_skips_disabled_kinds() {
        let chooser = OperationChooser::new(&OperationMix { knn: 1.0, distance: 0.0, polygon: 3.0 });
        assert_eq!(chooser.enabled(), &[Operation::ScanKnn, Operation::ScanByPolygon]);

        let mut rng = StdRng::seed_from_u64(3);
        let mut counts: HashMap<Operation, usize> = HashMap::new();
        for _ in 0..4000 {
            *counts.entry(chooser.choose(&mut rng).unwrap()).or_default() += 1;
        }
        assert!(!counts.contains_key(&Operation::ScanByDistance));
        let polygon = counts[&Operation::ScanByPolygon] as f64 / 4000.0;
        assert!((polygon - 0.75).abs() < 0.05, "polygon share {}", polygon);
    }

    #[test]
    fn chooser_without_enabled_kinds_yields_nothing() {
        let chooser = OperationChooser::new(&OperationMix::default());
        assert!(chooser.is_empty());
        assert_eq!(chooser.choose(&mut StdRng::seed_from_u64(1)), None);
    }

    #[test]
    fn no_key_before_anything_is_acknowledged() {
        let mut rng = StdRng::seed_from_u64(5);
        let uniform = KeyChooser::new(RequestDistribution::Uniform, 10, 100).unwrap();
        assert_eq!(uniform.next_keynum(&mut rng, None), None);
        assert_eq!(uniform.next_keynum(&mut rng, Some(9)), None);
        assert_eq!(uniform.next_keynum(&mut rng, Some(10)), Some(10));

        let exponential = KeyChooser::new(
            RequestDistribution::Exponential { percentile: 95.0, frac: RequestDistribution::DEFAULT_EXPONENTIAL_FRAC },
            0,
            100,
        )
        .unwrap();
        assert_eq!(exponential.next_keynum(&mut rng, None), None);
        assert_eq!(exponential.next_keynum(&mut rng, Some(0)), Some(0));
    }

    #[test]
    fn uniform_keys_stay_within_acknowledged_limit() {
        let chooser = KeyChooser::new(RequestDistribution::Uniform, 0, 1000).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        for i in 0..10_000u64 {
            let limit = i % 1000;
            let key = chooser.next_keynum(&mut rng, Some(limit)).unwrap();
            assert!(key <= limit);
        }
    }

    #[test]
    fn exponential_keys_are_never_negative_and_favour_recent() {
        let chooser = KeyChooser::new(
            RequestDistribution::Exponential { percentile: 95.0, frac: RequestDistribution::DEFAULT_EXPONENTIAL_FRAC },
            0,
            1000,
        )
        .unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let mut recent = 0;
        for _ in 0..10_000 {
            let key = chooser.next_keynum(&mut rng, Some(999)).unwrap();
            assert!(key <= 999);
            if key >= 500 {
                recent += 1;
            }
        }
        assert!(recent > 7_000, "only {} of 10000 keys in the newer half", recent);

        // small limits go through the truncated path
        for _ in 0..1000 {
            assert!(chooser.next_keynum(&mut rng, Some(3)).unwrap() <= 3);
        }
    }

    #[test]
    fn exponential_keys_stay_inside_the_insert_range() {
        let chooser = KeyChooser::new(RequestDistribution::Exponential { percentile: 95.0, frac: 0.857 }, 50, 10).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        assert_eq!(chooser.next_keynum(&mut rng, Some(49)), None);
        for _ in 0..10_000 {
            let key = chooser.next_keynum(&mut rng, Some(59)).unwrap();
            assert!((50..=59).contains(&key), "key {} outside [50, 59]", key);
        }
        for _ in 0..1000 {
            assert_eq!(chooser.next_keynum(&mut rng, Some(50)), Some(50));
        }
    }

    #[test]
    fn overflowing_insert_range_is_rejected() {
        let err = KeyChooser::new(RequestDistribution::Uniform, u64::MAX, 2).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn uniform_range_is_inclusive() {
        let range = UniformRange::new(IntRange::new(1, 3));
        let mut rng = StdRng::seed_from_u64(9);
        let mut seen = [false; 4];
        for _ in 0..500 {
            let v = range.sample(&mut rng);
            assert!((1..=3).contains(&v));
            seen[v as usize] = true;
        }
        assert!(seen[1] && seen[3]);
    }
}
