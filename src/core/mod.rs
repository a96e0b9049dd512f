pub mod aggregation;
pub mod collection;
pub mod database;
pub mod document;
pub mod errors;
pub mod executor;
pub mod pipeline;
pub mod query;
pub mod query_builder;

pub use aggregation::AggregationPipeline;
pub use collection::{Collection, Update, UpdateResult};
pub use database::Database;
pub use document::ValueType;
pub use executor::execute_pipeline;
pub use pipeline::{Accumulator, AccumulatorOp, ProjectField, ProjectSpec, SortKey, Stage};
pub use query::{parse_filter, CompareOp, Filter};
pub use query_builder::{QueryBuilder, SortOrder};
