//! Where anomaly information comes from.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use rad_core::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A past anomaly event on one subgroup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalAnomaly {
    pub anomaly_id: Uuid,
    pub subgroup_id: Uuid,
    pub start_time: DateTime<Utc>,
}

/// How well a subgroup fits the shared model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitScore {
    pub model_fit: f64,
    pub is_outlier: bool,
}

/// The model whose anomaly score is requested.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScoreTarget {
    /// A simple group: the score of its only model.
    Group { data_miner_id: i32, group_name: String },
    SubgroupId {
        data_miner_id: i32,
        group_name: String,
        subgroup_id: Uuid,
    },
    SubgroupName {
        data_miner_id: i32,
        group_name: String,
        subgroup_name: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScorePoint {
    pub time: DateTime<Utc>,
    pub score: f64,
}

impl ScorePoint {
    pub fn new(time: DateTime<Utc>, score: f64) -> Self {
        Self { time, score }
    }
}

pub trait AnomalyFeed {
    /// Subgroups that currently have an open anomaly.
    fn active_anomaly_subgroups(&self) -> Result<HashSet<Uuid>>;

    /// Anomalies that started at or after `since`.
    fn historical_anomalies(&self, since: DateTime<Utc>) -> Result<Vec<HistoricalAnomaly>>;

    /// Score samples in `[start, end]`, oldest first.
    fn anomaly_scores(
        &self,
        target: &ScoreTarget,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ScorePoint>>;

    fn fit_scores(&self, data_miner_id: i32, group_name: &str) -> Result<HashMap<Uuid, FitScore>>;
}

/// Feed backed by plain collections. An empty feed reports no anomalies at all.
#[derive(Debug, Default)]
pub struct InMemoryFeed {
    pub active: HashSet<Uuid>,
    pub historical: Vec<HistoricalAnomaly>,
    pub scores: HashMap<ScoreTarget, Vec<ScorePoint>>,
    /// Keyed by (agent, lowercased group name).
    pub fit_scores: HashMap<(i32, String), HashMap<Uuid, FitScore>>,
    score_requests: AtomicUsize,
    history_requests: AtomicUsize,
}

impl InMemoryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fit_scores(
        &mut self,
        data_miner_id: i32,
        group_name: &str,
        scores: HashMap<Uuid, FitScore>,
    ) {
        self.fit_scores.insert((data_miner_id, group_name.to_lowercase()), scores);
    }

    /// Number of score lookups served, for checking cache behavior.
    pub fn score_requests(&self) -> usize {
        self.score_requests.load(Ordering::Relaxed)
    }

    pub fn history_requests(&self) -> usize {
        self.history_requests.load(Ordering::Relaxed)
    }
}

impl AnomalyFeed for InMemoryFeed {
    fn active_anomaly_subgroups(&self) -> Result<HashSet<Uuid>> {
        Ok(self.active.clone())
    }

    fn historical_anomalies(&self, since: DateTime<Utc>) -> Result<Vec<HistoricalAnomaly>> {
        self.history_requests.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .historical
            .iter()
            .filter(|a| a.start_time >= since)
            .cloned()
            .collect())
    }

    fn anomaly_scores(
        &self,
        target: &ScoreTarget,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ScorePoint>> {
        self.score_requests.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .scores
            .get(target)
            .map(|points| {
                points
                    .iter()
                    .filter(|p| p.time >= start && p.time <= end)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn fit_scores(&self, data_miner_id: i32, group_name: &str) -> Result<HashMap<Uuid, FitScore>> {
        Ok(self
            .fit_scores
            .get(&(data_miner_id, group_name.to_lowercase()))
            .cloned()
            .unwrap_or_default())
    }
}
