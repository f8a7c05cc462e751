use chrono::{DateTime, Duration, Utc};
use rad_core::ConfigurationService;
use tracing::debug;
use uuid::Uuid;

use crate::cache::AnomalyScoreCache;
use crate::error::SourceError;
use crate::feed::{AnomalyFeed, ScorePoint, ScoreTarget};
use crate::host::{
    ArgKind, ArgValue, ArgumentSpec, Arguments, Cell, Column, ColumnKind, DataSource, Page, Row,
};

pub const ARG_DATA_MINER_ID: &str = "DataMiner ID";
pub const ARG_GROUP_NAME: &str = "Group Name";
pub const ARG_SUBGROUP_NAME: &str = "Subgroup Name";
pub const ARG_SUBGROUP_ID: &str = "Subgroup ID";
pub const ARG_START_TIME: &str = "Start Time";
pub const ARG_END_TIME: &str = "End Time";
pub const ARG_SKIP_CACHE: &str = "Skip Cache";

/// A gap longer than this between the window edge and the first or last
/// sample gets a null row, so charts do not interpolate across it.
pub const SCORE_PADDING_MINUTES: i64 = 5;

const COLUMNS: [Column; 2] = [
    Column::new("Time", ColumnKind::DateTime),
    Column::new("AnomalyScore", ColumnKind::Double),
];

#[derive(Debug, Clone, Default)]
struct Query {
    data_miner_id: i32,
    group_name: Option<String>,
    subgroup_name: Option<String>,
    subgroup_id: Option<Uuid>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    skip_cache: bool,
}

/// Anomaly score series of one group or subgroup over a time window.
pub struct AnomalyScoreDataSource<'a> {
    service: &'a dyn ConfigurationService,
    feed: &'a dyn AnomalyFeed,
    cache: &'a AnomalyScoreCache,
    query: Option<Query>,
    target: Option<ScoreTarget>,
    done: bool,
}

impl<'a> AnomalyScoreDataSource<'a> {
    pub fn new(
        service: &'a dyn ConfigurationService,
        feed: &'a dyn AnomalyFeed,
        cache: &'a AnomalyScoreCache,
    ) -> Self {
        Self {
            service,
            feed,
            cache,
            query: None,
            target: None,
            done: false,
        }
    }

    /// The model resolved by [`DataSource::prepare_fetch`], if any.
    pub fn target(&self) -> Option<&ScoreTarget> {
        self.target.as_ref()
    }

    fn resolve_target(&self, query: &Query) -> Result<Option<ScoreTarget>, SourceError> {
        let Some(group_name) = query.group_name.as_deref() else {
            return Ok(None);
        };
        let Some(group) = self.service.fetch_group(query.data_miner_id, group_name)? else {
            debug!(
                group = %group_name,
                data_miner_id = query.data_miner_id,
                "No such group, no scores"
            );
            return Ok(None);
        };

        if group.is_simple() {
            return Ok(Some(ScoreTarget::Group {
                data_miner_id: group.data_miner_id,
                group_name: group.name,
            }));
        }
        if let Some(id) = query.subgroup_id.filter(|id| group.find_subgroup(*id).is_some()) {
            return Ok(Some(ScoreTarget::SubgroupId {
                data_miner_id: group.data_miner_id,
                group_name: group.name,
                subgroup_id: id,
            }));
        }
        let by_name = query
            .subgroup_name
            .as_deref()
            .and_then(|name| group.find_subgroup_by_name(name))
            .and_then(|s| s.name.clone());
        Ok(by_name.map(|subgroup_name| ScoreTarget::SubgroupName {
            data_miner_id: group.data_miner_id,
            group_name: group.name,
            subgroup_name,
        }))
    }
}

/// Score rows for `[start, end]`, with a null row at either edge when the
/// samples stop short of it by more than the padding.
pub fn padded_rows(points: &[ScorePoint], start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Row> {
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return Vec::new();
    };
    let padding = Duration::minutes(SCORE_PADDING_MINUTES);
    let null_at = |t: DateTime<Utc>| Row::new(vec![Cell::DateTime(t), Cell::Null]);

    let mut rows = Vec::with_capacity(points.len() + 2);
    if start + padding < first.time {
        rows.push(null_at(start));
    }
    rows.extend(
        points
            .iter()
            .map(|p| Row::new(vec![Cell::DateTime(p.time), Cell::Double(p.score)])),
    );
    if last.time + padding < end {
        rows.push(null_at(end));
    }
    rows
}

fn optional_string(args: &Arguments, name: &str) -> Option<String> {
    args.string(name)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl DataSource for AnomalyScoreDataSource<'_> {
    fn input_arguments(&self) -> Vec<ArgumentSpec> {
        vec![
            ArgumentSpec::new(ARG_DATA_MINER_ID, ArgKind::Int).with_default(ArgValue::Int(-1)),
            ArgumentSpec::new(ARG_GROUP_NAME, ArgKind::String),
            ArgumentSpec::new(ARG_SUBGROUP_NAME, ArgKind::String),
            ArgumentSpec::new(ARG_SUBGROUP_ID, ArgKind::String),
            ArgumentSpec::new(ARG_START_TIME, ArgKind::DateTime),
            ArgumentSpec::new(ARG_END_TIME, ArgKind::DateTime),
            ArgumentSpec::new(ARG_SKIP_CACHE, ArgKind::Bool).with_default(ArgValue::Bool(false)),
        ]
    }

    fn process_arguments(&mut self, args: &Arguments) -> Result<(), SourceError> {
        let data_miner_id = match args.int(ARG_DATA_MINER_ID) {
            None => -1,
            Some(id) => i32::try_from(id).map_err(|_| SourceError::InvalidArgument {
                name: ARG_DATA_MINER_ID,
                reason: format!("{} is out of range", id),
            })?,
        };
        let subgroup_id = match optional_string(args, ARG_SUBGROUP_ID) {
            None => None,
            Some(s) => Some(s.parse::<Uuid>().map_err(|e| SourceError::InvalidArgument {
                name: ARG_SUBGROUP_ID,
                reason: e.to_string(),
            })?),
        };
        self.query = Some(Query {
            data_miner_id,
            group_name: optional_string(args, ARG_GROUP_NAME),
            subgroup_name: optional_string(args, ARG_SUBGROUP_NAME),
            subgroup_id,
            start: args.datetime(ARG_START_TIME),
            end: args.datetime(ARG_END_TIME),
            skip_cache: args.bool(ARG_SKIP_CACHE).unwrap_or(false),
        });
        self.target = None;
        self.done = false;
        Ok(())
    }

    fn prepare_fetch(&mut self) -> Result<(), SourceError> {
        let query = self.query.clone().ok_or(SourceError::NotReady)?;
        self.target = if query.start.is_some() && query.end.is_some() {
            self.resolve_target(&query)?
        } else {
            None
        };
        debug!(score_target = ?self.target, "Resolved anomaly score target");
        Ok(())
    }

    fn columns(&self) -> Vec<Column> {
        COLUMNS.to_vec()
    }

    fn next_page(&mut self) -> Result<Page, SourceError> {
        let query = self.query.as_ref().ok_or(SourceError::NotReady)?;
        if self.done {
            return Ok(Page::empty());
        }
        self.done = true;
        let (Some(target), Some(start), Some(end)) = (self.target.as_ref(), query.start, query.end)
        else {
            return Ok(Page::empty());
        };
        let points = self.cache.scores(self.feed, target, start, end, query.skip_cache)?;
        Ok(Page::last(padded_rows(&points, start, end)))
    }
}
