//! Pipeline B: load, train and evaluate, report.

use crate::report::{print_report, write_roc_svg};
use crate::training::{ModelResult, ModelTrainer};
use churn_core::data::{DataSource, ObjectStoreSource};
use churn_core::{ChurnError, PipelineContext};
use std::io;

/// Train every configured family on `training.dataset` and report to `out`.
pub async fn run_training(
    ctx: &PipelineContext,
    out: &mut impl io::Write,
) -> Result<Vec<ModelResult>, ChurnError> {
    let source = ObjectStoreSource::new(ctx.config().training.dataset.clone());
    train_with(ctx, &source, out).await
}

/// The training stages over an explicit source.
///
/// The figure (when enabled) is written before the console report.
pub async fn train_with(
    ctx: &PipelineContext,
    source: &dyn DataSource,
    out: &mut impl io::Write,
) -> Result<Vec<ModelResult>, ChurnError> {
    let info = source.source_info();
    tracing::info!(
        run_id = %ctx.run_id(),
        source = %info.source_type,
        location = %info.location,
        "Training started"
    );

    let trainer = ModelTrainer::from_config(&ctx.config().training)?;
    let dataset = source.load(ctx).await?;
    let results = trainer.train_and_evaluate(ctx, &dataset).await?;

    let report = &ctx.config().report;
    if report.show_plot {
        write_roc_svg(&results, &report.roc_curve_path).await?;
    } else {
        tracing::debug!("ROC figure disabled");
    }
    print_report(&results, out)?;

    tracing::info!(models = results.len(), "Training finished");
    Ok(results)
}
