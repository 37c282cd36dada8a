//! Robin Hood score: confiscated properties versus social services, per municipality.

pub mod advisor;
pub mod analyzer;
pub mod cache;
pub mod coordinates;
pub mod error;
pub mod export;
pub mod loader;
pub mod models;
pub mod pipeline;

pub use advisor::{Advisor, PropertyCategory, Size};
pub use analyzer::{attach_scores, count_by_key, merge_aggregates, opportunity_score, JoinReport};
pub use coordinates::{plottable, CoordinateTable};
pub use error::{DataLoadError, Dataset, PipelineError};
pub use loader::{DatasetLoader, DelimiterMode, SourceSpec, Table};
pub use models::{normalize_city_key, Config, Coordinates, DetailRecord, MunicipalityAggregate, PropertyRecord};
pub use pipeline::{build_output, Pipeline, PipelineOutput, Summary};
