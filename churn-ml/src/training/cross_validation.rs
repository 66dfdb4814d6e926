//! Stratified k-fold splitting.

use churn_core::ChurnError;
use serde::{Deserialize, Serialize};

/// One validation fold: fit on `train`, score on `test`. Indices are in
/// ascending order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Stratified k-fold without shuffling.
///
/// Fold sizes per class come from dealing the sorted labels round-robin
/// across the folds; each class's samples, in their original order, then fill
/// the folds contiguously. Every fold keeps roughly the class ratio of `y`.
///
/// Fails only when every class has fewer than `k` members. A class smaller
/// than `k` is allowed but leaves some folds without it.
pub fn stratified_kfold(y: &[u8], k: usize) -> Result<Vec<Fold>, ChurnError> {
    if k < 2 {
        return Err(ChurnError::invalid_input(format!(
            "need at least 2 folds, got {k}"
        )));
    }
    if y.len() < k {
        return Err(ChurnError::invalid_input(format!(
            "cannot make {k} folds from {} samples",
            y.len()
        )));
    }

    let mut classes: Vec<u8> = y.to_vec();
    classes.sort_unstable();
    classes.dedup();
    let class_index = |label: u8| classes.iter().position(|&c| c == label).unwrap_or(0);

    let counts: Vec<usize> = classes
        .iter()
        .map(|&c| y.iter().filter(|&&l| l == c).count())
        .collect();
    if counts.iter().all(|&c| c < k) {
        return Err(ChurnError::invalid_input(format!(
            "n_splits={k} cannot be greater than the number of members in each class"
        )));
    }
    let smallest = counts.iter().copied().min().unwrap_or(0);
    if smallest < k {
        tracing::warn!(
            smallest,
            folds = k,
            "Least populated class has fewer members than folds"
        );
    }

    // allocation[fold][class]: how many of the class's samples the fold gets.
    let mut sorted: Vec<usize> = y.iter().map(|&l| class_index(l)).collect();
    sorted.sort_unstable();
    let mut allocation = vec![vec![0usize; classes.len()]; k];
    for (pos, &class) in sorted.iter().enumerate() {
        allocation[pos % k][class] += 1;
    }

    let mut test_fold = vec![0usize; y.len()];
    for class in 0..classes.len() {
        let fold_ids = (0..k).flat_map(|fold| std::iter::repeat_n(fold, allocation[fold][class]));
        let members = (0..y.len()).filter(|&i| class_index(y[i]) == class);
        for (sample, fold) in members.zip(fold_ids) {
            test_fold[sample] = fold;
        }
    }

    Ok((0..k)
        .map(|fold| {
            let (test, train): (Vec<usize>, Vec<usize>) =
                (0..y.len()).partition(|&i| test_fold[i] == fold);
            Fold { train, test }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folds_cover_each_sample_once() {
        let y = [0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 0];
        let folds = stratified_kfold(&y, 3).unwrap();
        assert_eq!(folds.len(), 3);
        let mut seen: Vec<usize> = folds.iter().flat_map(|f| f.test.clone()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..y.len()).collect::<Vec<_>>());
        for fold in &folds {
            assert_eq!(fold.train.len() + fold.test.len(), y.len());
        }
    }

    #[test]
    fn test_folds_are_stratified() {
        // 10 negatives, 5 positives across 5 folds: two and one per fold.
        let y: Vec<u8> = (0..15).map(|i| u8::from(i % 3 == 0)).collect();
        for fold in stratified_kfold(&y, 5).unwrap() {
            let pos = fold.test.iter().filter(|&&i| y[i] == 1).count();
            assert_eq!(fold.test.len(), 3);
            assert_eq!(pos, 1);
        }
    }

    #[test]
    fn test_class_members_fill_folds_in_order() {
        let y = [1, 1, 0, 0, 1, 0, 0, 1];
        let folds = stratified_kfold(&y, 2).unwrap();
        // Positives are samples 0, 1, 4, 7: the first two go to fold 0.
        assert_eq!(folds[0].test, vec![0, 1, 2, 3]);
        assert_eq!(folds[1].test, vec![4, 5, 6, 7]);
    }

    #[test]
    fn test_uneven_allocation() {
        // Sorted labels 0,0,0,1,1,1,1 dealt over 3 folds.
        let y = [0, 0, 0, 1, 1, 1, 1];
        let sizes: Vec<usize> = stratified_kfold(&y, 3)
            .unwrap()
            .iter()
            .map(|f| f.test.len())
            .collect();
        assert_eq!(sizes, vec![3, 2, 2]);
    }

    #[test]
    fn test_all_classes_too_small() {
        assert!(matches!(
            stratified_kfold(&[0, 0, 1, 1], 3),
            Err(ChurnError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_one_small_class_is_allowed() {
        let y = [0, 0, 0, 0, 0, 1];
        let folds = stratified_kfold(&y, 5).unwrap();
        let with_positive = folds
            .iter()
            .filter(|f| f.test.iter().any(|&i| y[i] == 1))
            .count();
        assert_eq!(with_positive, 1);
    }
}
