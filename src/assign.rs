//! Random assignment of simulated events to trigger paths
//!
//! In mixture mode, each simulated event is given exactly one trigger path,
//! drawn according to the share of the analysed data that each path
//! recorded. This emulates a dataset blended from several trigger menus.

use crate::{numeric::Float, trigger::TriggerCatalog};

/// Number of random draws consumed per event
pub const DRAWS_PER_EVENT: usize = 1;

/// Weighted categorical sampler over the paths of a trigger catalog
///
/// Owned by one pipeline run: two runs with different catalogs in the same
/// process get two independent assigners.
///
#[derive(Clone, Debug)]
pub struct TriggerAssigner {
    /// Cumulative distribution of the normalized fractions, in catalog order
    cdf: Box<[Float]>,
}
//
impl TriggerAssigner {
    /// Build the cumulative distribution of a (validated) trigger catalog
    pub fn new(catalog: &TriggerCatalog) -> Self {
        let total: Float = catalog.paths().iter().map(|p| p.fraction).sum();
        let cdf = catalog
            .paths()
            .iter()
            .scan(0., |acc, path| {
                *acc += path.fraction / total;
                Some(*acc)
            })
            .collect();
        Self { cdf }
    }

    /// Pick the catalog index of the path associated with a draw in [0, 1)
    ///
    /// This is the first path whose cumulative probability is strictly
    /// greater than the draw, so a draw sitting exactly on a boundary goes to
    /// the next path. Rounding can leave the last cumulative value slightly
    /// below 1, in which case the last path is used.
    ///
    pub fn assign(&self, draw: Float) -> usize {
        self.cdf
            .iter()
            .position(|&cdf| draw < cdf)
            .unwrap_or(self.cdf.len() - 1)
    }

    /// Cumulative distribution, mostly for diagnostics
    pub fn cdf(&self) -> &[Float] {
        &self.cdf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{random::RandomGenerator, trigger::tests::catalog};

    #[test]
    fn boundary_goes_to_next_path() {
        let assigner = TriggerAssigner::new(&catalog(&[("A", 0.3), ("B", 0.7)]));
        assert_eq!(assigner.assign(0.29), 0);
        assert_eq!(assigner.assign(0.3), 1);
        assert_eq!(assigner.assign(0.31), 1);
        assert_eq!(assigner.assign(0.), 0);
    }

    #[test]
    fn fractions_are_normalized() {
        let assigner = TriggerAssigner::new(&catalog(&[("A", 3.), ("B", 7.)]));
        assert!((assigner.cdf()[0] - 0.3).abs() < 1e-6);
        assert_eq!(assigner.assign(0.29), 0);
        assert_eq!(assigner.assign(0.31), 1);
    }

    #[test]
    fn rounding_falls_back_to_last_path() {
        let assigner = TriggerAssigner::new(&catalog(&[("A", 1.), ("B", 1.), ("C", 1.)]));
        assert_eq!(assigner.assign(1.), 2);
        assert_eq!(assigner.assign(0.9999999), 2);
    }

    #[test]
    fn zero_fraction_path_is_never_picked() {
        let assigner = TriggerAssigner::new(&catalog(&[("A", 0.5), ("Z", 0.), ("B", 0.5)]));
        let mut rng = RandomGenerator::new(1);
        for _ in 0..10_000 {
            assert_ne!(assigner.assign(rng.random()), 1);
        }
        assert_eq!(assigner.assign(0.5), 2);
    }

    #[test]
    fn empirical_shares_match_fractions() {
        let fractions = [("A", 0.2), ("B", 0.5), ("C", 0.3)];
        let assigner = TriggerAssigner::new(&catalog(&fractions));
        let mut rng = RandomGenerator::new(12345);
        let num_events = 100_000;
        let mut counts = [0usize; 3];
        for _ in 0..num_events {
            counts[assigner.assign(rng.random())] += 1;
        }

        // Every event got exactly one path
        assert_eq!(counts.iter().sum::<usize>(), num_events);

        // Pearson chi-square with 2 degrees of freedom, 99.9% quantile ~13.8
        let chi2: f64 = counts
            .iter()
            .zip(fractions.iter())
            .map(|(&observed, &(_, p))| {
                let expected = f64::from(p) * num_events as f64;
                (observed as f64 - expected).powi(2) / expected
            })
            .sum();
        assert!(chi2 < 13.8, "chi2 = {chi2}, counts = {counts:?}");
    }

    #[test]
    fn thousand_events_split_around_300_700() {
        let assigner = TriggerAssigner::new(&catalog(&[("A", 0.3), ("B", 0.7)]));
        let mut rng = RandomGenerator::new(2024);
        let num_a = (0..1000)
            .filter(|_| assigner.assign(rng.random()) == 0)
            .count();
        // Binomial standard deviation is ~14.5, allow for 5 of them
        assert!((227..=373).contains(&num_a), "got {num_a} events on A");
    }
}
