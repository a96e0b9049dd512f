pub mod core;

pub use core::errors::{Error, Result};
pub use core::{
    AggregationPipeline, Collection, CompareOp, Database, Filter, ProjectField, ProjectSpec,
    SortKey, SortOrder, Stage, Update, UpdateResult, ValueType,
};
pub use core::{Accumulator, AccumulatorOp, QueryBuilder};
