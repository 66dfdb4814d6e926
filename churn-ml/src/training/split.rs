//! Seeded train/test split.

use churn_core::ChurnError;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Row indices of each partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Number of test rows: `ceil(test_size · n)`.
pub fn test_count(n_samples: usize, test_size: f64) -> usize {
    (test_size * n_samples as f64).ceil() as usize
}

/// Shuffle `0..n_samples` with `seed`; the first `test_count` rows of the
/// permutation form the test set. Same inputs, same partition.
pub fn train_test_split(
    n_samples: usize,
    test_size: f64,
    seed: u64,
) -> Result<SplitIndices, ChurnError> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(ChurnError::invalid_input(format!(
            "test_size must be in (0, 1), got {test_size}"
        )));
    }
    let n_test = test_count(n_samples, test_size);
    if n_test == 0 || n_test >= n_samples {
        return Err(ChurnError::invalid_input(format!(
            "cannot split {n_samples} samples with test_size {test_size}: \
             both partitions need at least one sample"
        )));
    }

    let mut permutation: Vec<usize> = (0..n_samples).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    permutation.shuffle(&mut rng);
    let train = permutation.split_off(n_test);
    Ok(SplitIndices {
        train,
        test: permutation,
    })
}
