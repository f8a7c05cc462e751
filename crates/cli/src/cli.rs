use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use rad_core::TimeRange;

/// Manage relational anomaly detection groups.
///
/// Groups live in a JSON store file. Edits are diffed against the stored
/// group and applied as a minimal sequence of operations.
#[derive(Parser, Debug)]
#[command(name = "rad", about = "Manage relational anomaly detection groups")]
pub struct CliArgs {
    /// Configuration profile; keys are looked up as {PROFILE}_{KEY} first
    #[arg(long, env = "RAD_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct StoreArg {
    /// Store file (default: <RAD_DATA_DIR>/rad-groups.json)
    #[arg(long, env = "RAD_STORE")]
    pub store: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ListingArgs {
    /// Sort column: name, anomalies, update-model, threshold, duration, outlier
    #[arg(long)]
    pub sort_by: Option<String>,

    #[arg(long)]
    pub descending: bool,

    /// Only rows with an active anomaly
    #[arg(long)]
    pub only_active: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the operations that turn one group definition into another
    Plan {
        /// Stored group (JSON); omit to plan a brand new group
        #[arg(long)]
        original: Option<PathBuf>,

        /// Desired group (JSON)
        #[arg(long)]
        desired: PathBuf,
    },

    /// Validate a group definition and apply it to the store
    Apply {
        #[command(flatten)]
        store: StoreArg,

        /// Desired group (JSON)
        #[arg(long)]
        desired: PathBuf,

        /// Name of the stored group being edited; omit to add a new group
        #[arg(long)]
        original_name: Option<String>,

        /// Training configuration (JSON: time_ranges, excluded_subgroup_ids)
        #[arg(long)]
        training: Option<PathBuf>,

        /// Show the plan without applying it
        #[arg(long)]
        dry_run: bool,
    },

    /// Add one or more groups
    Add {
        #[command(flatten)]
        store: StoreArg,

        /// Group definition (JSON), repeatable
        #[arg(long = "group", required = true)]
        groups: Vec<PathBuf>,
    },

    /// Remove groups by name
    Remove {
        #[command(flatten)]
        store: StoreArg,

        /// Agent the groups live on; negative matches any
        #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
        data_miner_id: i32,

        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Retrain the model of a group on well-behaved time ranges
    Retrain {
        #[command(flatten)]
        store: StoreArg,

        #[arg(long)]
        group: String,

        #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
        data_miner_id: i32,

        /// Training range as <start>/<end> (RFC 3339), repeatable
        #[arg(long = "range", required = true, value_parser = parse_time_range)]
        ranges: Vec<TimeRange>,
    },

    /// List every subgroup of every group
    Groups {
        #[command(flatten)]
        store: StoreArg,

        #[command(flatten)]
        listing: ListingArgs,

        #[arg(long)]
        only_unmonitored: bool,
    },

    /// List the subgroups of one group
    Subgroups {
        #[command(flatten)]
        store: StoreArg,

        #[arg(long)]
        group: String,

        #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
        data_miner_id: i32,

        #[command(flatten)]
        listing: ListingArgs,

        /// Only subgroups in error
        #[arg(long)]
        only_errors: bool,
    },
}

/// Parse `<start>/<end>`, both RFC 3339 timestamps.
fn parse_time_range(value: &str) -> Result<TimeRange, String> {
    let (start, end) = value
        .split_once('/')
        .ok_or_else(|| format!("expected <start>/<end>, got '{}'", value))?;
    let parse = |s: &str| {
        DateTime::parse_from_rfc3339(s.trim())
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| format!("invalid timestamp '{}': {}", s, e))
    };
    Ok(TimeRange::new(parse(start)?, parse(end)?))
}
