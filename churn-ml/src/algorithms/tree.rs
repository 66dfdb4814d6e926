//! CART decision tree with Gini impurity.

use super::{Classifier, check_width, class_counts, not_fitted};
use churn_core::ChurnError;
use ndarray::{Array1, ArrayView1, ArrayView2};
use std::cmp::Ordering;

/// Tree node
#[derive(Debug, Clone)]
enum Node {
    Leaf {
        /// Fraction of class-1 training samples in the leaf.
        proba: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn proba(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                Node::Leaf { proba } => return *proba,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }

    fn depth(&self) -> usize {
        match self {
            Node::Leaf { .. } => 0,
            Node::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    fn n_leaves(&self) -> usize {
        match self {
            Node::Leaf { .. } => 1,
            Node::Split { left, right, .. } => left.n_leaves() + right.n_leaves(),
        }
    }
}

fn gini(positives: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let p = positives as f64 / total as f64;
    1.0 - p * p - (1.0 - p) * (1.0 - p)
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    /// Weighted child impurity; lower is better.
    impurity: f64,
}

/// Decision tree classifier.
///
/// Nodes split until they are pure, hold a single sample, or reach
/// `max_depth`. Every feature and every midpoint between consecutive distinct
/// values is a split candidate; the first best split wins ties.
#[derive(Debug, Clone)]
pub struct DecisionTreeClassifier {
    max_depth: Option<usize>,
    root: Option<Node>,
    n_features: usize,
}

impl DecisionTreeClassifier {
    pub fn new(max_depth: Option<usize>) -> Self {
        Self {
            max_depth,
            root: None,
            n_features: 0,
        }
    }

    pub fn depth(&self) -> usize {
        self.root.as_ref().map_or(0, Node::depth)
    }

    pub fn n_leaves(&self) -> usize {
        self.root.as_ref().map_or(0, Node::n_leaves)
    }

    fn build(
        &self,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, u8>,
        indices: &mut [usize],
        depth: usize,
    ) -> Node {
        let total = indices.len();
        let positives = indices.iter().filter(|&&i| y[i] == 1).count();
        let leaf = Node::Leaf {
            proba: positives as f64 / total as f64,
        };
        let pure = positives == 0 || positives == total;
        let depth_reached = self.max_depth.is_some_and(|max| depth >= max);
        if pure || total < 2 || depth_reached {
            return leaf;
        }

        let Some(best) = best_split(x, y, indices) else {
            return leaf;
        };

        // Partition in place: rows going left first.
        let mut boundary = 0;
        for k in 0..total {
            if x[[indices[k], best.feature]] <= best.threshold {
                indices.swap(k, boundary);
                boundary += 1;
            }
        }
        let (left_idx, right_idx) = indices.split_at_mut(boundary);
        let left = self.build(x, y, left_idx, depth + 1);
        let right = self.build(x, y, right_idx, depth + 1);
        Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn root(&self) -> Result<&Node, ChurnError> {
        self.root.as_ref().ok_or_else(|| not_fitted("decision tree"))
    }
}

fn best_split(
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, u8>,
    indices: &[usize],
) -> Option<BestSplit> {
    let total = indices.len();
    let total_pos = indices.iter().filter(|&&i| y[i] == 1).count();
    let mut best: Option<BestSplit> = None;
    let mut sorted = indices.to_vec();

    for feature in 0..x.ncols() {
        sorted.sort_by(|&a, &b| {
            x[[a, feature]]
                .partial_cmp(&x[[b, feature]])
                .unwrap_or(Ordering::Equal)
        });
        let mut left_pos = 0;
        for k in 0..total - 1 {
            if y[sorted[k]] == 1 {
                left_pos += 1;
            }
            let (here, next) = (x[[sorted[k], feature]], x[[sorted[k + 1], feature]]);
            if next <= here {
                continue;
            }
            let left_n = k + 1;
            let right_n = total - left_n;
            let impurity = (left_n as f64 * gini(left_pos, left_n)
                + right_n as f64 * gini(total_pos - left_pos, right_n))
                / total as f64;
            if best.as_ref().is_none_or(|b| impurity < b.impurity) {
                let mut threshold = here + (next - here) / 2.0;
                // Midpoint can round up to `next` for adjacent floats.
                if threshold >= next {
                    threshold = here;
                }
                best = Some(BestSplit {
                    feature,
                    threshold,
                    impurity,
                });
            }
        }
    }
    best
}

impl Classifier for DecisionTreeClassifier {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, u8>) -> Result<(), ChurnError> {
        class_counts(x, y)?;
        let mut indices: Vec<usize> = (0..x.nrows()).collect();
        let root = self.build(x, y, &mut indices, 0);
        self.n_features = x.ncols();
        tracing::debug!(
            depth = root.depth(),
            leaves = root.n_leaves(),
            max_depth = ?self.max_depth,
            "Decision tree fitted"
        );
        self.root = Some(root);
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<u8>, ChurnError> {
        Ok(self
            .predict_proba(x)?
            .unwrap_or_default()
            .mapv(|p| u8::from(p > 0.5)))
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Option<Array1<f64>>, ChurnError> {
        let root = self.root()?;
        check_width(self.n_features, x)?;
        Ok(Some(x.outer_iter().map(|row| root.proba(row)).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_unbounded_tree_memorizes_training_data() {
        let x = array![[1.0, 5.0], [2.0, 3.0], [3.0, 8.0], [4.0, 1.0], [5.0, 7.0], [6.0, 2.0]];
        let y = array![0u8, 1, 0, 1, 0, 1];
        let mut tree = DecisionTreeClassifier::new(None);
        tree.fit(x.view(), y.view()).unwrap();
        assert_eq!(tree.predict(x.view()).unwrap(), y);
        // Feature 1 separates the classes at 4.0 in one split.
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.n_leaves(), 2);
    }

    #[test]
    fn test_max_depth_limits_growth() {
        let x = array![[0.0], [1.0], [2.0], [3.0], [4.0], [5.0], [6.0], [7.0]];
        let y = array![0u8, 1, 0, 1, 0, 1, 0, 1];
        let mut shallow = DecisionTreeClassifier::new(Some(1));
        shallow.fit(x.view(), y.view()).unwrap();
        assert_eq!(shallow.depth(), 1);

        let mut deep = DecisionTreeClassifier::new(None);
        deep.fit(x.view(), y.view()).unwrap();
        assert_eq!(deep.predict(x.view()).unwrap(), y);
        assert!(deep.depth() > 1);
    }

    #[test]
    fn test_leaf_probabilities_are_class_fractions() {
        // Identical rows cannot be split, so the root is a mixed leaf.
        let x = array![[1.0], [1.0], [1.0], [1.0]];
        let y = array![0u8, 1, 1, 1];
        let mut tree = DecisionTreeClassifier::new(None);
        tree.fit(x.view(), y.view()).unwrap();
        let proba = tree.predict_proba(array![[1.0]].view()).unwrap().unwrap();
        assert_eq!(proba[0], 0.75);
        assert_eq!(tree.predict(array![[1.0]].view()).unwrap()[0], 1);
    }

    #[test]
    fn test_gini() {
        assert_eq!(gini(0, 4), 0.0);
        assert_eq!(gini(2, 4), 0.5);
    }
}
