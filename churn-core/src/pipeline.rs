//! Pipeline A: load, transform, write.

use crate::config::InputSource;
use crate::context::PipelineContext;
use crate::data::{
    DataSource, ObjectStoreSource, ParquetSink, SinkReport, SyntheticSource, TransformPipeline,
};
use crate::error::ChurnError;

/// Run the preprocessing pipeline with the source and locations configured on
/// `ctx`.
pub async fn run_preprocess(ctx: &PipelineContext) -> Result<SinkReport, ChurnError> {
    let config = &ctx.config().preprocess;
    let source: Box<dyn DataSource> = match config.source {
        InputSource::Synthetic => Box::new(SyntheticSource::reference()),
        InputSource::ObjectStore => Box::new(ObjectStoreSource::new(config.input.clone())),
    };
    preprocess_with(ctx, source.as_ref(), &TransformPipeline::churn_default()).await
}

/// Run the preprocessing stages with an explicit source and transform.
pub async fn preprocess_with(
    ctx: &PipelineContext,
    source: &dyn DataSource,
    transform: &TransformPipeline,
) -> Result<SinkReport, ChurnError> {
    let info = source.source_info();
    tracing::info!(
        run_id = %ctx.run_id(),
        source = %info.source_type,
        location = %info.location,
        "Preprocessing started"
    );

    let raw = source.load(ctx).await?;
    if !raw.unique_ids("account_id")? {
        tracing::warn!("account_id values are not unique in the input");
    }
    let transformed = transform.apply(raw)?;
    tracing::info!(
        rows = transformed.row_count(),
        schema = %transformed.schema(),
        "Transformed dataset"
    );

    ParquetSink::new()
        .write(ctx, &transformed, &ctx.config().preprocess.output)
        .await
}
