use std::time::Duration;

use rad_core::{parameter_keys_to_string, GroupInfo, OptionDefaults, ParameterKey, SubgroupInfo};
use uuid::Uuid;

use crate::feed::FitScore;
use crate::host::{Cell, Column, ColumnKind, Row};

/// Columns of the group listing, one row per subgroup of every group.
pub const GROUP_COLUMNS: [Column; 12] = [
    Column::new("Name", ColumnKind::String),
    Column::new("DataMiner Id", ColumnKind::Int),
    Column::new("Parameters", ColumnKind::String),
    Column::new("Update Model", ColumnKind::Bool),
    Column::new("Anomaly Threshold", ColumnKind::Double),
    Column::new("Minimum Anomaly Duration", ColumnKind::TimeSpan),
    Column::new("Is Monitored", ColumnKind::Bool),
    Column::new("Parent Group", ColumnKind::String),
    Column::new("Subgroup ID", ColumnKind::String),
    Column::new("Is Shared Model Group", ColumnKind::Bool),
    Column::new("Has Active Anomaly", ColumnKind::Bool),
    Column::new("Anomalies in Last 30 Days", ColumnKind::Int),
];

/// Columns of the subgroup listing of a single group.
pub const SUBGROUP_COLUMNS: [Column; 13] = [
    Column::new("Name", ColumnKind::String),
    Column::new("DataMiner Id", ColumnKind::Int),
    Column::new("Parameters", ColumnKind::String),
    Column::new("Update Model", ColumnKind::Bool),
    Column::new("Anomaly Threshold", ColumnKind::Double),
    Column::new("Minimum Anomaly Duration", ColumnKind::TimeSpan),
    Column::new("Has Error", ColumnKind::Bool),
    Column::new("Has Active Anomaly", ColumnKind::Bool),
    Column::new("Anomalies in Last 30 Days", ColumnKind::Int),
    Column::new("Parent Group", ColumnKind::String),
    Column::new("Subgroup ID", ColumnKind::String),
    Column::new("Model Fit Score", ColumnKind::Double),
    Column::new("Is Outlier Group", ColumnKind::Bool),
];

/// Values every row kind carries, with options already resolved against the
/// group and the platform defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct RowCommon {
    pub name: String,
    pub data_miner_id: i32,
    pub parameters: Vec<ParameterKey>,
    pub update_model: bool,
    pub anomaly_threshold: f64,
    /// Minutes.
    pub minimum_anomaly_duration: u32,
    pub is_monitored: bool,
    pub parent_group: String,
    pub subgroup_id: Option<Uuid>,
    pub has_active_anomaly: bool,
    pub anomalies_in_last_30_days: usize,
}

impl RowCommon {
    pub fn new(
        group: &GroupInfo,
        subgroup: &SubgroupInfo,
        name: impl Into<String>,
        defaults: &OptionDefaults,
    ) -> Self {
        Self {
            name: name.into(),
            data_miner_id: group.data_miner_id,
            parameters: subgroup.parameter_keys().cloned().collect(),
            update_model: group.options.update_model,
            anomaly_threshold: subgroup.effective_anomaly_threshold(&group.options, defaults),
            minimum_anomaly_duration: subgroup
                .effective_minimum_anomaly_duration(&group.options, defaults),
            is_monitored: subgroup.is_monitored,
            parent_group: group.name.clone(),
            subgroup_id: subgroup.id,
            has_active_anomaly: false,
            anomalies_in_last_30_days: 0,
        }
    }

    fn duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.minimum_anomaly_duration) * 60)
    }

    fn subgroup_id_cell(&self) -> Cell {
        Cell::String(self.subgroup_id.map(|id| id.to_string()).unwrap_or_default())
    }
}

/// One listing row. The variant decides which columns it renders.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupRow {
    /// The only subgroup of a simple group, in the group listing.
    Simple(RowCommon),
    /// One subgroup of a shared-model group, in the group listing.
    SharedModel(RowCommon),
    /// A subgroup in the subgroup listing, with its model fit.
    Subgroup {
        common: RowCommon,
        fit_score: Option<FitScore>,
    },
}

impl GroupRow {
    pub fn common(&self) -> &RowCommon {
        match self {
            GroupRow::Simple(c) | GroupRow::SharedModel(c) => c,
            GroupRow::Subgroup { common, .. } => common,
        }
    }

    pub fn common_mut(&mut self) -> &mut RowCommon {
        match self {
            GroupRow::Simple(c) | GroupRow::SharedModel(c) => c,
            GroupRow::Subgroup { common, .. } => common,
        }
    }

    pub fn name(&self) -> &str {
        &self.common().name
    }

    /// A subgroup that is not monitored is in error.
    pub fn has_error(&self) -> bool {
        !self.common().is_monitored
    }

    pub fn fit_score(&self) -> Option<f64> {
        match self {
            GroupRow::Subgroup { fit_score, .. } => fit_score.map(|f| f.model_fit),
            _ => None,
        }
    }

    pub fn cells(&self) -> Vec<Cell> {
        let c = self.common();
        let head = vec![
            Cell::String(c.name.clone()),
            Cell::Int(i64::from(c.data_miner_id)),
            Cell::String(parameter_keys_to_string(&c.parameters)),
            Cell::Bool(c.update_model),
            Cell::Double(c.anomaly_threshold),
            Cell::TimeSpan(c.duration()),
        ];
        let tail = match self {
            GroupRow::Simple(_) | GroupRow::SharedModel(_) => vec![
                Cell::Bool(c.is_monitored),
                Cell::String(c.parent_group.clone()),
                c.subgroup_id_cell(),
                Cell::Bool(matches!(self, GroupRow::SharedModel(_))),
                Cell::Bool(c.has_active_anomaly),
                Cell::Int(c.anomalies_in_last_30_days as i64),
            ],
            GroupRow::Subgroup { fit_score, .. } => vec![
                Cell::Bool(self.has_error()),
                Cell::Bool(c.has_active_anomaly),
                Cell::Int(c.anomalies_in_last_30_days as i64),
                Cell::String(c.parent_group.clone()),
                c.subgroup_id_cell(),
                fit_score.map_or(Cell::Null, |f| Cell::Double(f.model_fit)),
                Cell::Bool(fit_score.is_some_and(|f| f.is_outlier)),
            ],
        };
        head.into_iter().chain(tail).collect()
    }

    pub fn to_row(&self) -> Row {
        Row {
            cells: self.cells(),
            parameters: self.common().parameters.clone(),
        }
    }
}
