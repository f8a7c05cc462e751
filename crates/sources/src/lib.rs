//! Tabular query sources over the configured relational anomaly groups.
//!
//! Each source follows the same host contract ([`DataSource`]): declare its
//! input arguments, process the values the host supplies, declare columns,
//! then hand out pages of rows.

pub mod cache;
pub mod error;
pub mod feed;
pub mod groups;
pub mod host;
pub mod listing;
pub mod rows;
pub mod scores;
pub mod sorting;
pub mod subgroups;

pub use cache::{AnomalyScoreCache, HistoricalAnomalyCache, TtlCache};
pub use error::SourceError;
pub use feed::{AnomalyFeed, FitScore, HistoricalAnomaly, InMemoryFeed, ScorePoint, ScoreTarget};
pub use groups::GroupsDataSource;
pub use host::{
    ArgKind, ArgValue, ArgumentSpec, Arguments, Cell, Column, ColumnKind, DataSource, Page, Row,
};
pub use rows::{GroupRow, RowCommon};
pub use scores::AnomalyScoreDataSource;
pub use sorting::SortingColumn;
pub use subgroups::SubgroupsDataSource;
