use chrono::{DateTime, Utc};
use rad_core::{ConfigurationService, OptionDefaults};
use tracing::debug;

use crate::cache::HistoricalAnomalyCache;
use crate::error::SourceError;
use crate::feed::AnomalyFeed;
use crate::host::{ArgumentSpec, Arguments, Column, DataSource, Page};
use crate::listing::{row_name, AnomalyStats, ListingOptions};
use crate::rows::{GroupRow, RowCommon, GROUP_COLUMNS};
use crate::sorting::SortingColumn;

pub const ARG_ONLY_UNMONITORED: &str = "Show only unmonitored groups";

const SORT_COLUMNS: [SortingColumn; 5] = [
    SortingColumn::Name,
    SortingColumn::AnomaliesInLast30Days,
    SortingColumn::UpdateModel,
    SortingColumn::AnomalyThreshold,
    SortingColumn::MinimumAnomalyDuration,
];

/// Every subgroup of every configured group, one row each.
pub struct GroupsDataSource<'a> {
    service: &'a dyn ConfigurationService,
    feed: &'a dyn AnomalyFeed,
    history: &'a HistoricalAnomalyCache,
    defaults: OptionDefaults,
    options: Option<ListingOptions>,
    now: Option<DateTime<Utc>>,
    done: bool,
}

impl<'a> GroupsDataSource<'a> {
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
            options: None,
            now: None,
            done: false,
        }
    }

    /// Pin the clock used for the anomaly history window.
    pub fn with_clock(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    /// All rows, filtered and sorted per the processed arguments.
    pub fn rows(&self) -> Result<Vec<GroupRow>, SourceError> {
        let options = self.options.as_ref().ok_or(SourceError::NotReady)?;
        let groups = self.service.fetch_groups()?;
        let stats = AnomalyStats::fetch(
            self.feed,
            self.history,
            self.service.capabilities(),
            self.now.unwrap_or_else(Utc::now),
        );

        let mut rows = Vec::new();
        for group in &groups {
            for (i, subgroup) in group.subgroups.iter().enumerate() {
                let common = RowCommon::new(group, subgroup, row_name(group, i), &self.defaults);
                let mut row = if group.is_simple() {
                    GroupRow::Simple(common)
                } else {
                    GroupRow::SharedModel(common)
                };
                stats.annotate(&mut row);
                rows.push(row);
            }
        }
        debug!(groups = groups.len(), rows = rows.len(), "Built group listing");
        Ok(options.apply(rows))
    }
}

impl DataSource for GroupsDataSource<'_> {
    fn input_arguments(&self) -> Vec<ArgumentSpec> {
        ListingOptions::arguments(ARG_ONLY_UNMONITORED, &SORT_COLUMNS)
    }

    fn process_arguments(&mut self, args: &Arguments) -> Result<(), SourceError> {
        let options = ListingOptions::from_arguments(args, ARG_ONLY_UNMONITORED, &SORT_COLUMNS)?;
        self.options = Some(options);
        self.done = false;
        Ok(())
    }

    fn columns(&self) -> Vec<Column> {
        GROUP_COLUMNS.to_vec()
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{HistoricalAnomaly, InMemoryFeed};
    use crate::host::{ArgValue, Cell};
    use crate::listing::{ARG_ONLY_ACTIVE, ARG_SORT_BY, ARG_SORT_DESCENDING};
    use rad_core::{GroupInfo, GroupOptions, ParameterKey, ServiceCapabilities, SubgroupInfo};
    use rad_store::MemoryStore;
    use std::time::Duration;
    use uuid::Uuid;

    fn sub(base: i32) -> SubgroupInfo {
        SubgroupInfo::from_keys([ParameterKey::new(1, 1, base), ParameterKey::new(1, 1, base + 1)])
            .with_id(Uuid::new_v4())
    }

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new(ServiceCapabilities::default());
        store
            .add_group(&GroupInfo::new("Pumps", vec![sub(1)]).with_data_miner_id(1), None)
            .unwrap();
        let mut unmonitored = sub(10).with_name("west");
        unmonitored.is_monitored = false;
        store
            .add_group(
                &GroupInfo::new("Fans", vec![sub(20), unmonitored])
                    .with_data_miner_id(1)
                    .with_options(GroupOptions {
                        update_model: true,
                        anomaly_threshold: Some(5.0),
                        minimum_anomaly_duration: Some(15),
                    }),
                None,
            )
            .unwrap();
        store
    }

    fn names(rows: &[GroupRow]) -> Vec<&str> {
        rows.iter().map(GroupRow::name).collect()
    }

    #[test]
    fn one_row_per_subgroup() {
        let store = store();
        let feed = InMemoryFeed::new();
        let history = HistoricalAnomalyCache::new(Duration::from_secs(60));
        let mut source = GroupsDataSource::new(&store, &feed, &history, OptionDefaults::default());
        source.process_arguments(&Arguments::new()).unwrap();

        let rows = source.rows().unwrap();
        assert_eq!(names(&rows), ["Pumps", "Subgroup 1", "west"]);
        assert!(matches!(rows[0], GroupRow::Simple(_)));
        assert!(matches!(rows[1], GroupRow::SharedModel(_)));
        assert_eq!(rows[1].common().parent_group, "Fans");
        assert_eq!(rows[1].common().minimum_anomaly_duration, 15);

        let page = source.next_page().unwrap();
        assert!(!page.has_next_page);
        assert_eq!(page.rows.len(), 3);
        assert_eq!(page.rows[0].cells.len(), source.columns().len());
        assert_eq!(page.rows[1].cells[9], Cell::Bool(true));
        assert!(source.next_page().unwrap().rows.is_empty());
    }

    #[test]
    fn needs_processed_arguments() {
        let store = store();
        let feed = InMemoryFeed::new();
        let history = HistoricalAnomalyCache::new(Duration::from_secs(60));
        let mut source = GroupsDataSource::new(&store, &feed, &history, OptionDefaults::default());
        assert!(matches!(source.next_page(), Err(SourceError::NotReady)));
    }

    #[test]
    fn filters_unmonitored_and_active() {
        let store = store();
        let fans = store.fetch_group(1, "fans").unwrap().unwrap();
        let mut feed = InMemoryFeed::new();
        feed.active.insert(fans.subgroups[0].id.unwrap());
        let history = HistoricalAnomalyCache::new(Duration::from_secs(60));
        let mut source = GroupsDataSource::new(&store, &feed, &history, OptionDefaults::default());

        source
            .process_arguments(&Arguments::new().with(ARG_ONLY_UNMONITORED, ArgValue::Bool(true)))
            .unwrap();
        assert_eq!(names(&source.rows().unwrap()), ["west"]);

        source
            .process_arguments(&Arguments::new().with(ARG_ONLY_ACTIVE, ArgValue::Bool(true)))
            .unwrap();
        assert_eq!(names(&source.rows().unwrap()), ["Subgroup 1"]);
    }

    #[test]
    fn sorts_by_anomaly_count() {
        let store = store();
        let pumps = store.fetch_group(1, "Pumps").unwrap().unwrap();
        let now = Utc::now();
        let mut feed = InMemoryFeed::new();
        feed.historical = (0..3)
            .map(|_| HistoricalAnomaly {
                anomaly_id: Uuid::new_v4(),
                subgroup_id: pumps.subgroups[0].id.unwrap(),
                start_time: now - chrono::Duration::days(2),
            })
            .collect();
        let history = HistoricalAnomalyCache::new(Duration::from_secs(60));
        let mut source =
            GroupsDataSource::new(&store, &feed, &history, OptionDefaults::default())
                .with_clock(now);
        source
            .process_arguments(
                &Arguments::new()
                    .with(
                        ARG_SORT_BY,
                        ArgValue::String("Number of anomalies in Last 30 Days".into()),
                    )
                    .with(ARG_SORT_DESCENDING, ArgValue::Bool(true)),
            )
            .unwrap();

        let rows = source.rows().unwrap();
        assert_eq!(names(&rows), ["Pumps", "Subgroup 1", "west"]);
        assert_eq!(rows[0].common().anomalies_in_last_30_days, 3);
    }

    #[test]
    fn outlier_sort_is_not_offered() {
        let store = store();
        let feed = InMemoryFeed::new();
        let history = HistoricalAnomalyCache::new(Duration::from_secs(60));
        let mut source = GroupsDataSource::new(&store, &feed, &history, OptionDefaults::default());
        let err = source
            .process_arguments(
                &Arguments::new().with(ARG_SORT_BY, ArgValue::String("Is Outlier".into())),
            )
            .unwrap_err();
        assert!(matches!(err, SourceError::InvalidArgument { .. }));
    }
}
