use chrono::{DateTime, Utc};
use rad_core::{ConfigurationService, OptionDefaults};
use tracing::{debug, warn};

use crate::cache::HistoricalAnomalyCache;
use crate::error::SourceError;
use crate::feed::AnomalyFeed;
use crate::host::{ArgKind, ArgValue, ArgumentSpec, Arguments, Column, DataSource, Page};
use crate::listing::{row_name, AnomalyStats, ListingOptions};
use crate::rows::{GroupRow, RowCommon, SUBGROUP_COLUMNS};
use crate::sorting::SortingColumn;

pub const ARG_DATA_MINER_ID: &str = "DataMiner ID";
pub const ARG_GROUP_NAME: &str = "Group Name";
pub const ARG_ONLY_ERRORS: &str = "Show only groups with error";

#[derive(Debug, Clone)]
struct Query {
    data_miner_id: i32,
    group_name: String,
    listing: ListingOptions,
}

/// The subgroups of one group, with model fit where the platform reports it.
pub struct SubgroupsDataSource<'a> {
    service: &'a dyn ConfigurationService,
    feed: &'a dyn AnomalyFeed,
    history: &'a HistoricalAnomalyCache,
    defaults: OptionDefaults,
    query: Option<Query>,
    now: Option<DateTime<Utc>>,
    done: bool,
}

impl<'a> SubgroupsDataSource<'a> {
    pub fn new(
        service: &'a dyn ConfigurationService,
        feed: &'a dyn AnomalyFeed,
        history: &'a HistoricalAnomalyCache,
        defaults: OptionDefaults,
    ) -> Self {
        Self {
            service,
            feed,
            history,
            defaults,
            query: None,
            now: None,
            done: false,
        }
    }

    pub fn with_clock(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    pub fn rows(&self) -> Result<Vec<GroupRow>, SourceError> {
        let query = self.query.as_ref().ok_or(SourceError::NotReady)?;
        let group = self
            .service
            .fetch_group(query.data_miner_id, &query.group_name)?
            .ok_or_else(|| SourceError::GroupNotFound {
                name: query.group_name.clone(),
                data_miner_id: query.data_miner_id,
            })?;

        let capabilities = self.service.capabilities();
        let fit_scores = if capabilities.fit_score_available {
            self.feed
                .fit_scores(group.data_miner_id, &group.name)
                .unwrap_or_else(|e| {
                    warn!(group = %group.name, error = %e, "Could not fetch model fit scores");
                    Default::default()
                })
        } else {
            Default::default()
        };
        let now = self.now.unwrap_or_else(Utc::now);
        let stats = AnomalyStats::fetch(self.feed, self.history, capabilities, now);

        let rows: Vec<GroupRow> = group
            .subgroups
            .iter()
            .enumerate()
            .map(|(i, subgroup)| {
                let mut row = GroupRow::Subgroup {
                    common: RowCommon::new(&group, subgroup, row_name(&group, i), &self.defaults),
                    fit_score: subgroup.id.and_then(|id| fit_scores.get(&id).copied()),
                };
                stats.annotate(&mut row);
                row
            })
            .collect();
        debug!(group = %group.name, rows = rows.len(), "Built subgroup listing");
        Ok(query.listing.apply(rows))
    }
}

impl DataSource for SubgroupsDataSource<'_> {
    fn input_arguments(&self) -> Vec<ArgumentSpec> {
        let mut args = vec![
            ArgumentSpec::new(ARG_DATA_MINER_ID, ArgKind::Int).with_default(ArgValue::Int(-1)),
            ArgumentSpec::new(ARG_GROUP_NAME, ArgKind::String).required(),
        ];
        args.extend(ListingOptions::arguments(ARG_ONLY_ERRORS, &SortingColumn::ALL));
        args
    }

    fn process_arguments(&mut self, args: &Arguments) -> Result<(), SourceError> {
        let group_name = args
            .string(ARG_GROUP_NAME)
            .filter(|s| !s.trim().is_empty())
            .ok_or(SourceError::MissingArgument(ARG_GROUP_NAME))?;
        let data_miner_id = match args.int(ARG_DATA_MINER_ID) {
            None => -1,
            Some(id) => i32::try_from(id).map_err(|_| SourceError::InvalidArgument {
                name: ARG_DATA_MINER_ID,
                reason: format!("{} is out of range", id),
            })?,
        };
        self.query = Some(Query {
            data_miner_id,
            group_name: group_name.to_string(),
            listing: ListingOptions::from_arguments(args, ARG_ONLY_ERRORS, &SortingColumn::ALL)?,
        });
        self.done = false;
        Ok(())
    }

    fn columns(&self) -> Vec<Column> {
        SUBGROUP_COLUMNS.to_vec()
    }

    fn next_page(&mut self) -> Result<Page, SourceError> {
        if self.done {
            return Ok(Page::empty());
        }
        let rows = self.rows()?;
        self.done = true;
        Ok(Page::last(rows.iter().map(GroupRow::to_row).collect()))
    }
}
