use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use rad_core::validation::validate_group;
use rad_core::{Config, ConfigurationService, GroupInfo, TimeRange, TrainingConfiguration};
use rad_reconcile::{EditSession, PlanExecutor, Reconciler};
use rad_sources::{
    ArgValue, Arguments, DataSource, GroupsDataSource, HistoricalAnomalyCache, InMemoryFeed,
    SortingColumn, SubgroupsDataSource,
};
use rad_sources::listing::{ARG_ONLY_ACTIVE, ARG_SORT_BY, ARG_SORT_DESCENDING};
use rad_sources::{groups, subgroups};
use rad_store::FileStore;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::info;

use crate::cli::{ListingArgs, StoreArg};
use crate::terminal::Terminal;

pub struct RunContext<'a> {
    pub config: &'a Config,
    pub terminal: &'a Terminal,
    pub json: bool,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

fn open_store(ctx: &RunContext<'_>, arg: &StoreArg) -> Result<FileStore> {
    let path: PathBuf = arg.store.clone().unwrap_or_else(|| ctx.config.storage.store_file());
    FileStore::open(&path, ctx.config.platform.capabilities())
        .with_context(|| format!("failed to open store {}", path.display()))
}

// ── Plan and apply ────────────────────────────────────────────

pub fn plan(ctx: &RunContext<'_>, original: Option<&Path>, desired: &Path) -> Result<()> {
    let original: Option<GroupInfo> = original.map(read_json::<GroupInfo>).transpose()?;
    let desired: GroupInfo = read_json(desired)?;

    let reconciler = Reconciler::new(ctx.config.platform.capabilities());
    let plan = reconciler.plan(original.as_ref(), &desired);
    if ctx.json {
        ctx.terminal.print_json(&plan)
    } else {
        ctx.terminal.print_plan(&plan)
    }
}

pub fn apply(
    ctx: &RunContext<'_>,
    store: &StoreArg,
    desired: &Path,
    original_name: Option<&str>,
    training: Option<&Path>,
    dry_run: bool,
) -> Result<()> {
    let mut store = open_store(ctx, store)?;
    let desired: GroupInfo = read_json(desired)?;
    let training: Option<TrainingConfiguration> =
        training.map(read_json::<TrainingConfiguration>).transpose()?;

    let mut session = match original_name {
        Some(name) => EditSession::load(&store, desired.data_miner_id, name)
            .with_context(|| format!("failed to load group '{}'", name))?,
        None => {
            let existing = store
                .fetch_group_names(desired.data_miner_id)
                .context("failed to fetch group names")?;
            EditSession::new_group(desired.data_miner_id, existing, store.capabilities())
        }
    }
    .with_training_days(ctx.config.training.default_days);
    session.set_desired(desired);
    session.set_training(training);

    let outcome = session.finish()?;
    for warning in &outcome.warnings {
        ctx.terminal.print_warning(warning)?;
    }
    if dry_run {
        return if ctx.json {
            ctx.terminal.print_json(&outcome.plan)
        } else {
            ctx.terminal.print_plan(&outcome.plan)
        };
    }

    info!(
        group = %outcome.plan.group_name,
        operations = outcome.plan.operations.len(),
        "Applying plan"
    );
    let report = PlanExecutor::new(&mut store).apply(&outcome.plan, outcome.training.as_ref());
    if ctx.json {
        ctx.terminal.print_json(&report)?;
    } else {
        ctx.terminal.print_plan(&outcome.plan)?;
        ctx.terminal.print_report(&report)?;
    }
    if let Some(message) = report.failure_message() {
        bail!(message);
    }
    if report.aborted {
        bail!("apply was aborted");
    }
    Ok(())
}

// ── Bulk add and remove ───────────────────────────────────────

pub fn add(ctx: &RunContext<'_>, store: &StoreArg, files: &[PathBuf]) -> Result<()> {
    let mut store = open_store(ctx, store)?;
    let groups = files
        .iter()
        .map(|f| read_json::<GroupInfo>(f))
        .collect::<Result<Vec<_>>>()?;
    // Name clashes are left to the store so they show up in the bulk report.
    for (file, group) in files.iter().zip(&groups) {
        let validation = validate_group(group, &[], None);
        if let Some(error) = validation.first_error() {
            bail!("{}: {}", file.display(), error);
        }
    }

    let report = PlanExecutor::new(&mut store).add_groups(&groups, None);
    if ctx.json {
        ctx.terminal.print_json(&report)?;
    } else {
        ctx.terminal.print_bulk(&report)?;
    }
    match report.failure_message() {
        Some(message) => bail!(message),
        None => Ok(()),
    }
}

pub fn remove(
    ctx: &RunContext<'_>,
    store: &StoreArg,
    data_miner_id: i32,
    names: &[String],
) -> Result<()> {
    let mut store = open_store(ctx, store)?;
    let report = PlanExecutor::new(&mut store).remove_groups(data_miner_id, names);
    if ctx.json {
        ctx.terminal.print_json(&report)?;
    } else {
        ctx.terminal.print_bulk(&report)?;
    }
    match report.failure_message() {
        Some(message) => bail!(message),
        None => Ok(()),
    }
}

// ── Retrain ───────────────────────────────────────────────────

pub fn retrain(
    ctx: &RunContext<'_>,
    store: &StoreArg,
    group: &str,
    data_miner_id: i32,
    ranges: &[TimeRange],
) -> Result<()> {
    let mut store = open_store(ctx, store)?;
    PlanExecutor::new(&mut store)
        .retrain(data_miner_id, group, ranges)
        .with_context(|| format!("failed to retrain group '{}'", group))?;
    if ctx.json {
        ctx.terminal.print_json(&json!({ "group": group, "time_ranges": ranges }))
    } else {
        ctx.terminal.print_success(&format!(
            "Retraining requested for '{}' on {} time range(s).",
            group,
            ranges.len()
        ))
    }
}

// ── Listings ──────────────────────────────────────────────────

fn listing_arguments(listing: &ListingArgs) -> Result<Arguments> {
    let mut args = Arguments::new()
        .with(ARG_SORT_DESCENDING, ArgValue::Bool(listing.descending))
        .with(ARG_ONLY_ACTIVE, ArgValue::Bool(listing.only_active));
    if let Some(sort_by) = &listing.sort_by {
        let column: SortingColumn = sort_by.parse().map_err(anyhow::Error::msg)?;
        args.set(ARG_SORT_BY, ArgValue::String(column.description().to_string()));
    }
    Ok(args)
}

fn print_source(ctx: &RunContext<'_>, source: &mut dyn DataSource) -> Result<()> {
    source.prepare_fetch()?;
    let columns = source.columns();
    let mut rows = Vec::new();
    loop {
        let page = source.next_page()?;
        rows.extend(page.rows);
        if !page.has_next_page {
            break;
        }
    }
    if ctx.json {
        ctx.terminal.print_json(&rows)
    } else {
        ctx.terminal.print_table(&columns, &rows)
    }
}

pub fn list_groups(
    ctx: &RunContext<'_>,
    store: &StoreArg,
    listing: &ListingArgs,
    only_unmonitored: bool,
) -> Result<()> {
    let store = open_store(ctx, store)?;
    let feed = InMemoryFeed::new();
    let history = HistoricalAnomalyCache::from_config(&ctx.config.cache);
    let mut source = GroupsDataSource::new(&store, &feed, &history, ctx.config.defaults);

    let args = listing_arguments(listing)?
        .with(groups::ARG_ONLY_UNMONITORED, ArgValue::Bool(only_unmonitored));
    source.process_arguments(&args)?;
    print_source(ctx, &mut source)
}

pub fn list_subgroups(
    ctx: &RunContext<'_>,
    store: &StoreArg,
    group: &str,
    data_miner_id: i32,
    listing: &ListingArgs,
    only_errors: bool,
) -> Result<()> {
    let store = open_store(ctx, store)?;
    let feed = InMemoryFeed::new();
    let history = HistoricalAnomalyCache::from_config(&ctx.config.cache);
    let mut source = SubgroupsDataSource::new(&store, &feed, &history, ctx.config.defaults);

    let args = listing_arguments(listing)?
        .with(subgroups::ARG_GROUP_NAME, ArgValue::String(group.to_string()))
        .with(subgroups::ARG_DATA_MINER_ID, ArgValue::Int(i64::from(data_miner_id)))
        .with(subgroups::ARG_ONLY_ERRORS, ArgValue::Bool(only_errors));
    source.process_arguments(&args)?;
    print_source(ctx, &mut source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rad_core::{ParameterKey, SubgroupInfo};

    fn write_group(dir: &Path, file: &str, group: &GroupInfo) -> PathBuf {
        let path = dir.join(file);
        fs::write(&path, serde_json::to_string(group).unwrap()).unwrap();
        path
    }

    fn group(name: &str, params: &[i32]) -> GroupInfo {
        let subgroups = params
            .chunks(2)
            .map(|c| SubgroupInfo::from_keys(c.iter().map(|p| ParameterKey::new(1, 1, *p))))
            .collect();
        GroupInfo::new(name, subgroups)
    }

    #[test]
    fn add_then_edit_through_the_store_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::for_profile("");
        let terminal = Terminal::new();
        let ctx = RunContext {
            config: &config,
            terminal: &terminal,
            json: true,
        };
        let store_arg = StoreArg {
            store: Some(dir.path().join("groups.json")),
        };

        let created = write_group(dir.path(), "fans.json", &group("Fans", &[1, 2, 3, 4]));
        add(&ctx, &store_arg, &[created]).unwrap();

        let edited = write_group(dir.path(), "fans2.json", &group("Fans2", &[3, 4, 5, 6]));
        apply(&ctx, &store_arg, &edited, Some("Fans"), None, false).unwrap();

        let store = open_store(&ctx, &store_arg).unwrap();
        assert!(store.fetch_group(-1, "Fans").unwrap().is_none());
        let fans2 = store.fetch_group(-1, "Fans2").unwrap().unwrap();
        assert_eq!(fans2.subgroups.len(), 2);

        remove(&ctx, &store_arg, -1, &["Fans2".to_string()]).unwrap();
        assert!(store.fetch_group_names(-1).unwrap().is_empty());
    }

    #[test]
    fn removing_a_missing_group_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::for_profile("");
        let terminal = Terminal::new();
        let ctx = RunContext {
            config: &config,
            terminal: &terminal,
            json: true,
        };
        let store_arg = StoreArg {
            store: Some(dir.path().join("groups.json")),
        };
        let err = remove(&ctx, &store_arg, -1, &["Nope".to_string()]).unwrap_err();
        assert!(err.to_string().starts_with("Failed to remove 'Nope'"), "{}", err);
    }

    #[test]
    fn retrain_validates_ranges_and_records_the_request() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::for_profile("");
        let terminal = Terminal::new();
        let ctx = RunContext {
            config: &config,
            terminal: &terminal,
            json: true,
        };
        let store_arg = StoreArg {
            store: Some(dir.path().join("groups.json")),
        };
        let created = write_group(dir.path(), "fans.json", &group("Fans", &[1, 2, 3, 4]));
        add(&ctx, &store_arg, &[created]).unwrap();

        let err = retrain(&ctx, &store_arg, "Fans", -1, &[]).unwrap_err();
        assert!(format!("{:#}", err).contains("at least one time range"), "{:#}", err);

        let start = chrono::Utc::now() - chrono::Duration::days(2);
        let range = TimeRange::new(start, start + chrono::Duration::hours(12));
        retrain(&ctx, &store_arg, "fans", -1, &[range]).unwrap();

        let store = open_store(&ctx, &store_arg).unwrap();
        let requests = store.load().unwrap().training_requests;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].time_ranges, vec![range]);
    }

    #[test]
    fn unknown_sort_column_is_an_error() {
        let listing = ListingArgs {
            sort_by: Some("colour".into()),
            descending: false,
            only_active: false,
        };
        assert!(listing_arguments(&listing).is_err());
    }
}
