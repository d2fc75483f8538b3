//! Holdout split of an assembled dataset.
//!
//! The random source is always passed in; callers seed it from the
//! configuration so the split is reproducible.

use rand::seq::SliceRandom;
use rand::Rng;

use super::assemble::Dataset;

/// Shuffled `(train, test)` index lists over `n` examples.
///
/// The test side gets `ceil(test_size * n)` examples, capped at `n`.
pub fn split_indices<R: Rng + ?Sized>(
    n: usize,
    test_size: f64,
    rng: &mut R,
) -> (Vec<usize>, Vec<usize>) {
    let n_test = ((test_size * n as f64).ceil() as usize).min(n);
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);
    let test = indices.split_off(n - n_test);
    (indices, test)
}

/// Split a dataset into training and validation parts.
///
/// Both parts share the original vocabularies.
pub fn train_test_split<R: Rng + ?Sized>(
    dataset: &Dataset,
    test_size: f64,
    rng: &mut R,
) -> (Dataset, Dataset) {
    let (train, test) = split_indices(dataset.len(), test_size, rng);
    (dataset.subset(&train), dataset.subset(&test))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_split_sizes() {
        let mut rng = StdRng::seed_from_u64(1337);
        let (train, test) = split_indices(10, 0.25, &mut rng);
        assert_eq!(test.len(), 3);
        assert_eq!(train.len(), 7);

        let mut all: Vec<usize> = train.iter().chain(test.iter()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_zero_test_size() {
        let mut rng = StdRng::seed_from_u64(7);
        let (train, test) = split_indices(5, 0.0, &mut rng);
        assert_eq!(train.len(), 5);
        assert!(test.is_empty());
    }

    #[test]
    fn test_same_seed_same_split() {
        let a = split_indices(50, 0.2, &mut StdRng::seed_from_u64(42));
        let b = split_indices(50, 0.2, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }
}
