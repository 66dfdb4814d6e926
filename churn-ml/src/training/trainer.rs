//! Per-family search, refit and held-out evaluation.

use super::cross_validation::stratified_kfold;
use super::features::FeatureMatrix;
use super::search::{FoldMetric, GridSearch};
use super::split::train_test_split;
use crate::algorithms::{Classifier, ModelFamily, ModelParams};
use crate::eval::{
    ClassificationReport, ConfusionMatrix, RocCurve, accuracy, precision, recall, roc_curve,
};
use churn_core::config::TrainingConfig;
use churn_core::{ChurnError, Dataset, PipelineContext};
use ndarray::{Array1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Evaluation of one family's best configuration on the held-out rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResult {
    pub family: ModelFamily,
    pub name: String,
    pub best_params: ModelParams,
    /// Mean validation ROC-AUC of the selected configuration.
    pub best_cv_roc_auc: f64,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    /// Absent when the test partition holds a single class.
    pub roc_auc: Option<f64>,
    pub confusion_matrix: ConfusionMatrix,
    pub classification_report: String,
    /// Per-fold accuracy of the selected configuration on the training rows.
    pub cv_scores: Vec<f64>,
    pub roc_curve: Option<RocCurve>,
}

#[derive(Debug, Clone)]
pub struct ModelTrainer {
    families: Vec<ModelFamily>,
    test_size: f64,
    random_state: u64,
    cv_folds: usize,
}

impl ModelTrainer {
    /// Unknown family names are a [`ChurnError::Config`] error.
    pub fn from_config(config: &TrainingConfig) -> Result<Self, ChurnError> {
        let families = config
            .families
            .iter()
            .map(|key| ModelFamily::from_key(key))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            families,
            test_size: config.test_size,
            random_state: config.random_state,
            cv_folds: config.cv_folds,
        })
    }

    pub fn families(&self) -> &[ModelFamily] {
        &self.families
    }

    /// Split, then search, refit and evaluate every family in order.
    pub async fn train_and_evaluate(
        &self,
        ctx: &PipelineContext,
        dataset: &Dataset,
    ) -> Result<Vec<ModelResult>, ChurnError> {
        let features = FeatureMatrix::from_dataset(dataset)?;
        let split = train_test_split(features.n_samples(), self.test_size, self.random_state)?;
        let train = Arc::new(features.select(&split.train));
        let test = features.select(&split.test);
        info!(
            rows = features.n_samples(),
            features = features.n_features(),
            train_rows = train.n_samples(),
            test_rows = test.n_samples(),
            "Training data prepared"
        );

        let folds = Arc::new(stratified_kfold(&train.labels(), self.cv_folds)?);
        let search = GridSearch::new(Arc::clone(&train), Arc::clone(&folds), self.random_state);
        let cv_accuracy = GridSearch::new(Arc::clone(&train), folds, self.random_state)
            .with_metric(FoldMetric::Accuracy);

        let mut results = Vec::with_capacity(self.families.len());
        for &family in &self.families {
            info!("Training {}...", family.display_name());
            let outcome = search.run(ctx, family, family.search_space()).await?;
            let best_params = outcome.best_params().clone();

            let (predicted, proba) = self
                .refit_and_score(ctx, &train, &test, &best_params)
                .await?;
            let cv = cv_accuracy.cross_validate(ctx, &best_params).await?;
            let result = evaluate(
                family,
                best_params,
                outcome.best_score(),
                &test,
                &predicted,
                proba.as_ref(),
                cv.fold_scores,
            )?;
            info!(
                family = family.key(),
                accuracy = result.accuracy,
                roc_auc = ?result.roc_auc,
                "Model evaluated"
            );
            results.push(result);
        }
        Ok(results)
    }

    /// Fit `params` on all training rows; predictions and class-1
    /// probabilities for the test rows.
    async fn refit_and_score(
        &self,
        ctx: &PipelineContext,
        train: &Arc<FeatureMatrix>,
        test: &FeatureMatrix,
        params: &ModelParams,
    ) -> Result<(Array1<u8>, Option<Array1<f64>>), ChurnError> {
        let permit = ctx.acquire_fit_permit().await?;
        let train = Arc::clone(train);
        let test_x = test.x.clone();
        let params = params.clone();
        let seed = self.random_state;
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let mut model = params.build(seed);
            fit_and_predict(model.as_mut(), &train, test_x.view())
        })
        .await?
    }
}

fn fit_and_predict(
    model: &mut dyn Classifier,
    train: &FeatureMatrix,
    test_x: ArrayView2<'_, f64>,
) -> Result<(Array1<u8>, Option<Array1<f64>>), ChurnError> {
    model.fit(train.x.view(), train.y.view())?;
    let predicted = model.predict(test_x)?;
    let proba = model.predict_proba(test_x)?;
    Ok((predicted, proba))
}

fn evaluate(
    family: ModelFamily,
    best_params: ModelParams,
    best_cv_roc_auc: f64,
    test: &FeatureMatrix,
    predicted: &Array1<u8>,
    proba: Option<&Array1<f64>>,
    cv_scores: Vec<f64>,
) -> Result<ModelResult, ChurnError> {
    let y_true = test.labels();
    let y_pred = predicted.to_vec();

    let both_classes = y_true.contains(&0) && y_true.contains(&1);
    let roc = match proba {
        None => {
            info!(
                family = family.key(),
                "No probability output; ROC AUC omitted"
            );
            None
        }
        Some(_) if !both_classes => {
            warn!(
                family = family.key(),
                "Test partition holds a single class; ROC AUC is undefined"
            );
            None
        }
        Some(p) => Some(roc_curve(&y_true, &p.to_vec())?),
    };

    Ok(ModelResult {
        family,
        name: family.display_name().to_string(),
        best_params,
        best_cv_roc_auc,
        accuracy: accuracy(&y_true, &y_pred)?,
        precision: precision(&y_true, &y_pred)?,
        recall: recall(&y_true, &y_pred)?,
        roc_auc: roc.as_ref().map(RocCurve::auc),
        confusion_matrix: ConfusionMatrix::from_predictions(&y_true, &y_pred)?,
        classification_report: ClassificationReport::new(&y_true, &y_pred)?.render(),
        cv_scores,
        roc_curve: roc,
    })
}
