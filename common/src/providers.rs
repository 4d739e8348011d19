// External collaborator contracts: analytics, pending content and schedule persistence
//
// The optimizer core never reaches for global services; every collaborator is
// passed in explicitly through one of these traits.

use crate::errors::ProviderError;
use crate::models::{AnalyticsSample, DateRange, PendingItem, Schedule};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

/// Source of historical engagement samples
#[async_trait]
pub trait AnalyticsProvider: Send + Sync {
    /// Samples for one board whose timestamps fall inside `range`.
    /// Implementations should fail fast; the caller applies its own timeout.
    async fn fetch(
        &self,
        board_id: &str,
        range: DateRange,
    ) -> Result<Vec<AnalyticsSample>, ProviderError>;
}

/// Read-only source of items awaiting a publish time
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn pending_items(&self) -> Result<Vec<PendingItem>, ProviderError>;
}

/// Sink for produced schedules. Serializing concurrent writes is the store's job.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn save(&self, schedule: &Schedule) -> Result<(), ProviderError>;
}

// ============================================================================
// In-memory implementations
// ============================================================================

/// Analytics keyed by board id, held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryAnalyticsProvider {
    samples: HashMap<String, Vec<AnalyticsSample>>,
}

impl InMemoryAnalyticsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_board(mut self, board_id: impl Into<String>, samples: Vec<AnalyticsSample>) -> Self {
        self.samples.entry(board_id.into()).or_default().extend(samples);
        self
    }
}

#[async_trait]
impl AnalyticsProvider for InMemoryAnalyticsProvider {
    async fn fetch(
        &self,
        board_id: &str,
        range: DateRange,
    ) -> Result<Vec<AnalyticsSample>, ProviderError> {
        Ok(filter_range(self.samples.get(board_id), range))
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryContentStore {
    items: Vec<PendingItem>,
}

impl InMemoryContentStore {
    pub fn new(items: Vec<PendingItem>) -> Self {
        Self { items }
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn pending_items(&self) -> Result<Vec<PendingItem>, ProviderError> {
        Ok(self.items.clone())
    }
}

/// Keeps every saved schedule; the latest one is the committed schedule
#[derive(Debug, Clone, Default)]
pub struct InMemoryScheduleStore {
    saved: Arc<RwLock<Vec<Schedule>>>,
}

impl InMemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn latest(&self) -> Option<Schedule> {
        self.saved.read().await.last().cloned()
    }

    pub async fn save_count(&self) -> usize {
        self.saved.read().await.len()
    }
}

#[async_trait]
impl ScheduleStore for InMemoryScheduleStore {
    async fn save(&self, schedule: &Schedule) -> Result<(), ProviderError> {
        self.saved.write().await.push(schedule.clone());
        Ok(())
    }
}

// ============================================================================
// JSON file implementations
// ============================================================================

/// Reads `{ "<board id>": [ sample, ... ] }` from a JSON file on each fetch
#[derive(Debug, Clone)]
pub struct JsonFileAnalyticsProvider {
    path: PathBuf,
}

impl JsonFileAnalyticsProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl AnalyticsProvider for JsonFileAnalyticsProvider {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn fetch(
        &self,
        board_id: &str,
        range: DateRange,
    ) -> Result<Vec<AnalyticsSample>, ProviderError> {
        let by_board: HashMap<String, Vec<AnalyticsSample>> = read_json(&self.path).await?;
        let samples = filter_range(by_board.get(board_id), range);
        debug!(samples = samples.len(), "Loaded analytics samples");
        Ok(samples)
    }
}

/// Reads a JSON array of pending items
#[derive(Debug, Clone)]
pub struct JsonFileContentStore {
    path: PathBuf,
}

impl JsonFileContentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ContentStore for JsonFileContentStore {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn pending_items(&self) -> Result<Vec<PendingItem>, ProviderError> {
        read_json(&self.path).await
    }
}

/// Writes the schedule as pretty-printed JSON, creating parent directories
#[derive(Debug, Clone)]
pub struct JsonFileScheduleStore {
    path: PathBuf,
}

impl JsonFileScheduleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ScheduleStore for JsonFileScheduleStore {
    #[instrument(skip(self, schedule), fields(path = %self.path.display(), slots = schedule.len()))]
    async fn save(&self, schedule: &Schedule) -> Result<(), ProviderError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let body = serde_json::to_vec_pretty(schedule)?;
        fs::write(&self.path, body).await?;
        info!("Schedule written");
        Ok(())
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ProviderError> {
    let bytes = fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn filter_range(samples: Option<&Vec<AnalyticsSample>>, range: DateRange) -> Vec<AnalyticsSample> {
    samples
        .map(|samples| {
            samples
                .iter()
                .filter(|s| range.contains(s.timestamp))
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}
