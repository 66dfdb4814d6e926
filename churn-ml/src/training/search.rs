//! Exhaustive hyperparameter search scored by cross-validation.
//!
//! Every (candidate, fold) fit runs on the blocking pool and holds one of the
//! context's fit permits while it does. Results are gathered back in
//! candidate order, so the selected candidate never depends on scheduling.

use super::cross_validation::Fold;
use super::features::FeatureMatrix;
use crate::algorithms::{ModelFamily, ModelParams, ranking_scores};
use crate::eval::{CrossValidationResult, accuracy, roc_auc};
use churn_core::{ChurnError, PipelineContext};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Metric computed on each validation fold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoldMetric {
    /// Area under the ROC curve of the model's ranking scores.
    RocAuc,
    /// Fraction of correct hard predictions.
    Accuracy,
}

impl FoldMetric {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RocAuc => "roc_auc",
            Self::Accuracy => "accuracy",
        }
    }
}

/// Cross-validated score of one grid point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub params: ModelParams,
    pub cv: CrossValidationResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub family: ModelFamily,
    pub candidates: Vec<CandidateScore>,
    pub best_index: usize,
}

impl SearchOutcome {
    pub fn best(&self) -> &CandidateScore {
        &self.candidates[self.best_index]
    }

    pub fn best_params(&self) -> &ModelParams {
        &self.best().params
    }

    pub fn best_score(&self) -> f64 {
        self.best().cv.mean_score
    }
}

/// Grid search over a fixed set of folds.
pub struct GridSearch {
    data: Arc<FeatureMatrix>,
    folds: Arc<Vec<Fold>>,
    metric: FoldMetric,
    seed: u64,
}

impl GridSearch {
    pub fn new(data: Arc<FeatureMatrix>, folds: Arc<Vec<Fold>>, seed: u64) -> Self {
        Self {
            data,
            folds,
            metric: FoldMetric::RocAuc,
            seed,
        }
    }

    pub fn with_metric(mut self, metric: FoldMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Score every candidate and pick the best mean.
    pub async fn run(
        &self,
        ctx: &PipelineContext,
        family: ModelFamily,
        candidates: Vec<ModelParams>,
    ) -> Result<SearchOutcome, ChurnError> {
        if candidates.is_empty() {
            return Err(ChurnError::invalid_input(format!(
                "empty search space for {family}"
            )));
        }

        // Submit everything first so fits from different candidates overlap.
        let mut pending = Vec::with_capacity(candidates.len());
        for params in &candidates {
            pending.push(self.spawn_folds(ctx, params).await?);
        }

        let mut scored = Vec::with_capacity(candidates.len());
        for (params, handles) in candidates.into_iter().zip(pending) {
            let cv = collect_scores(handles, self.metric).await?;
            debug!(
                family = family.key(),
                params = %params,
                mean = cv.mean_score,
                std = cv.std_score,
                "Candidate scored"
            );
            scored.push(CandidateScore { params, cv });
        }

        let best_index = select_best(&scored).map_err(|_| {
            ChurnError::fit(format!("no {family} candidate could be scored on any fold"))
        })?;
        let outcome = SearchOutcome {
            family,
            candidates: scored,
            best_index,
        };
        info!(
            family = family.key(),
            best_params = %outcome.best_params(),
            metric = self.metric.name(),
            best_score = outcome.best_score(),
            "Grid search finished"
        );
        Ok(outcome)
    }

    /// Cross-validate a single configuration.
    pub async fn cross_validate(
        &self,
        ctx: &PipelineContext,
        params: &ModelParams,
    ) -> Result<CrossValidationResult, ChurnError> {
        let handles = self.spawn_folds(ctx, params).await?;
        collect_scores(handles, self.metric).await
    }

    async fn spawn_folds(
        &self,
        ctx: &PipelineContext,
        params: &ModelParams,
    ) -> Result<Vec<JoinHandle<f64>>, ChurnError> {
        let mut handles = Vec::with_capacity(self.folds.len());
        for fold_index in 0..self.folds.len() {
            let permit = ctx.acquire_fit_permit().await?;
            let data = Arc::clone(&self.data);
            let folds = Arc::clone(&self.folds);
            let params = params.clone();
            let (metric, seed) = (self.metric, self.seed);
            handles.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                let fold = &folds[fold_index];
                match score_fold(&data, fold, &params, seed, metric) {
                    Ok(score) => {
                        debug!(fold = fold_index, params = %params, score, "Fold scored");
                        score
                    }
                    Err(e) => {
                        warn!(
                            fold = fold_index,
                            params = %params,
                            error = %e,
                            "Fold could not be scored; recording NaN"
                        );
                        f64::NAN
                    }
                }
            }));
        }
        Ok(handles)
    }
}

async fn collect_scores(
    handles: Vec<JoinHandle<f64>>,
    metric: FoldMetric,
) -> Result<CrossValidationResult, ChurnError> {
    let mut scores = Vec::with_capacity(handles.len());
    for handle in handles {
        scores.push(handle.await?);
    }
    Ok(CrossValidationResult::from_scores(scores, metric.name()))
}

/// Fit on the fold's training rows and score its validation rows.
pub fn score_fold(
    data: &FeatureMatrix,
    fold: &Fold,
    params: &ModelParams,
    seed: u64,
    metric: FoldMetric,
) -> Result<f64, ChurnError> {
    let train = data.select(&fold.train);
    let test = data.select(&fold.test);
    let mut model = params.build(seed);
    model.fit(train.x.view(), train.y.view())?;
    match metric {
        FoldMetric::RocAuc => {
            let scores = ranking_scores(model.as_ref(), test.x.view())?;
            roc_auc(&test.labels(), &scores.to_vec())
        }
        FoldMetric::Accuracy => {
            let predicted = model.predict(test.x.view())?;
            accuracy(&test.labels(), &predicted.to_vec())
        }
    }
}

/// Index of the highest mean score. The first of equal means wins and a NaN
/// mean never wins; if every mean is NaN no candidate could be scored and
/// that is a [`ChurnError::Fit`].
pub fn select_best(candidates: &[CandidateScore]) -> Result<usize, ChurnError> {
    let mut best: Option<usize> = None;
    for (i, candidate) in candidates.iter().enumerate() {
        let score = candidate.cv.mean_score;
        if score.is_nan() {
            continue;
        }
        if best.is_none_or(|b| score > candidates[b].cv.mean_score) {
            best = Some(i);
        }
    }
    best.ok_or_else(|| ChurnError::fit("every candidate failed to score on every fold"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::cross_validation::stratified_kfold;
    use churn_core::ChurnConfig;
    use ndarray::{Array1, Array2};

    fn candidate(c: f64, scores: Vec<f64>) -> CandidateScore {
        CandidateScore {
            params: ModelParams::LogisticRegression { c },
            cv: CrossValidationResult::from_scores(scores, "roc_auc"),
        }
    }

    #[test]
    fn test_select_best_first_wins_ties() {
        let candidates = vec![
            candidate(0.1, vec![0.8, 0.9]),
            candidate(1.0, vec![0.9, 0.8]),
            candidate(10.0, vec![0.7, 0.7]),
        ];
        assert_eq!(select_best(&candidates).unwrap(), 0);
    }

    #[test]
    fn test_select_best_skips_nan() {
        let candidates = vec![
            candidate(0.1, vec![f64::NAN, 1.0]),
            candidate(1.0, vec![0.6, 0.6]),
        ];
        assert_eq!(select_best(&candidates).unwrap(), 1);

        let all_nan = vec![
            candidate(0.1, vec![f64::NAN]),
            candidate(1.0, vec![f64::NAN]),
        ];
        assert!(matches!(select_best(&all_nan), Err(ChurnError::Fit(_))));
    }

    /// One informative feature (the label plus small noise) and one constant.
    fn separable(n: usize) -> FeatureMatrix {
        let y: Array1<u8> = (0..n).map(|i| u8::from(i % 2 == 0)).collect();
        let x = Array2::from_shape_fn((n, 2), |(i, j)| {
            if j == 0 {
                f64::from(y[i]) * 4.0 + (i % 5) as f64 * 0.1
            } else {
                1.0
            }
        });
        FeatureMatrix {
            x,
            y,
            feature_names: vec!["signal".into(), "constant".into()],
        }
    }

    fn context() -> PipelineContext {
        let mut config = ChurnConfig::default();
        config.storage.backend = churn_core::config::StorageBackend::Memory;
        config.training.max_parallel_fits = 2;
        PipelineContext::open(config).unwrap()
    }

    #[tokio::test]
    async fn test_grid_search_on_separable_data() {
        let ctx = context();
        let data = Arc::new(separable(40));
        let folds = Arc::new(stratified_kfold(data.y.as_slice().unwrap(), 5).unwrap());
        let search = GridSearch::new(Arc::clone(&data), folds, 42);

        let outcome = search
            .run(
                &ctx,
                ModelFamily::DecisionTree,
                ModelFamily::DecisionTree.search_space(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.candidates.len(), 4);
        assert_eq!(outcome.best_score(), 1.0);
        // Every depth separates perfectly, so the first one is kept.
        assert_eq!(outcome.best_index, 0);
        for candidate in &outcome.candidates {
            assert_eq!(candidate.cv.fold_scores.len(), 5);
        }
    }

    #[tokio::test]
    async fn test_cross_validate_accuracy() {
        let ctx = context();
        let data = Arc::new(separable(30));
        let folds = Arc::new(stratified_kfold(data.y.as_slice().unwrap(), 3).unwrap());
        let cv = GridSearch::new(data, folds, 42)
            .with_metric(FoldMetric::Accuracy)
            .cross_validate(&ctx, &ModelParams::NaiveBayes { var_smoothing: 1e-9 })
            .await
            .unwrap();
        assert_eq!(cv.metric_name, "accuracy");
        assert_eq!(cv.fold_scores, vec![1.0, 1.0, 1.0]);
    }

    #[tokio::test]
    async fn test_fold_failure_scores_nan() {
        let ctx = context();
        // Fold 0 trains on positives only, so its fit fails.
        let data = Arc::new(separable(6));
        let folds = Arc::new(vec![Fold {
            train: vec![0, 2, 4],
            test: vec![1, 3, 5],
        }]);
        let cv = GridSearch::new(data, folds, 42)
            .cross_validate(&ctx, &ModelParams::LogisticRegression { c: 1.0 })
            .await
            .unwrap();
        assert!(cv.fold_scores[0].is_nan());
    }

    #[tokio::test]
    async fn test_search_fails_when_no_fold_can_be_fit() {
        let ctx = context();
        // Every training fold holds positives only.
        let data = Arc::new(separable(6));
        let folds = Arc::new(vec![Fold {
            train: vec![0, 2, 4],
            test: vec![1, 3, 5],
        }]);
        let result = GridSearch::new(data, folds, 42)
            .run(
                &ctx,
                ModelFamily::LogisticRegression,
                ModelFamily::LogisticRegression.search_space(),
            )
            .await;
        assert!(matches!(result, Err(ChurnError::Fit(_))));
    }

    #[tokio::test]
    async fn test_empty_search_space() {
        let ctx = context();
        let data = Arc::new(separable(10));
        let folds = Arc::new(stratified_kfold(data.y.as_slice().unwrap(), 2).unwrap());
        let result = GridSearch::new(data, folds, 0)
            .run(&ctx, ModelFamily::Svm, Vec::new())
            .await;
        assert!(matches!(result, Err(ChurnError::InvalidInput(_))));
    }
}
