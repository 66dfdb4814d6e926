//! Dataset model, columnar codec and the preprocessing stages.

pub mod columnar;
pub mod dataset;
pub mod schema;
pub mod sink;
pub mod source;
pub mod transform;

pub use dataset::{AccountRecord, Column, ColumnData, Dataset, reference_records};
pub use schema::{ColumnSchema, ColumnStats, ColumnType, SchemaDefinition};
pub use sink::{ParquetSink, SinkReport};
pub use source::{DataSource, DataSourceInfo, ObjectStoreSource, SyntheticSource};
pub use transform::{REFERENCE_DATE, TransformPipeline, TransformStep};
