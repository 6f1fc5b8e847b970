//! Seeded train/test split.

use rand::{SeedableRng as _, rngs::StdRng, seq::SliceRandom as _};

/// Shuffles `0..n` with a seeded RNG and returns `(train, test)` index
/// lists. The test fold takes `ceil(test_fraction * n)` indices.
#[must_use]
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let n_test = ((n as f64 * test_fraction).ceil().max(0.0) as usize).min(n);

    let train = indices.split_off(n_test);
    (train, indices)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    #[test]
    fn split_sizes_round_test_fold_up() {
        let (train, test) = train_test_split(11, 0.2, 42);
        assert_eq!(test.len(), 3);
        assert_eq!(train.len(), 8);
    }

    #[test]
    fn folds_partition_all_indices() {
        let (train, test) = train_test_split(50, 0.2, 7);
        let all: BTreeSet<usize> = train.iter().chain(&test).copied().collect();
        assert_eq!(all.len(), 50);
        assert!(train.iter().all(|i| !test.contains(i)));
    }

    #[test]
    fn same_seed_same_split() {
        assert_eq!(train_test_split(100, 0.2, 42), train_test_split(100, 0.2, 42));
        assert_ne!(train_test_split(100, 0.2, 42), train_test_split(100, 0.2, 43));
    }
}
