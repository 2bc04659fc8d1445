//! Data pipeline orchestrator.
//!
//! Coordinates the source adapters, upserts normalized records by natural
//! key, writes the append-only fetch log, and falls back to the calibrated
//! synthetic dataset when districts would otherwise have no history for
//! forecasting. One source's failure never aborts the run for the others.

pub mod seed;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::SourcesConfig;
use crate::districts;
use crate::domain::{FetchLogEntry, FetchStatus, Period, PropertyType};
use crate::sources::{FetchWindow, SourceAdapter, SourceError, SourceRecord};
use crate::store::{HousingStore, StoreError};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Minimum delay between successive adapter invocations. A deliberate
    /// serialization point, not an optimisation knob.
    pub rate_limit: Duration,
    pub window: FetchWindow,
}

impl PipelineConfig {
    pub fn from_sources(config: &SourcesConfig) -> Self {
        Self {
            rate_limit: config.rate_limit,
            window: FetchWindow {
                quarters: config.index_quarters,
                months: config.mortgage_months,
            },
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            rate_limit: Duration::from_millis(500),
            window: FetchWindow::default(),
        }
    }
}

/// Selects which sources a refresh touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshScope {
    All,
    Source(String),
}

/// Per-source outcome inside a [`PipelineRunReport`].
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source: String,
    pub status: FetchStatus,
    pub records: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Row counts written by a seed or backfill pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SeedReport {
    pub sale_rows: usize,
    pub rental_rows: usize,
    pub index_rows: usize,
    pub mortgage_rows: usize,
}

impl SeedReport {
    pub fn total(&self) -> usize {
        self.sale_rows + self.rental_rows + self.index_rows + self.mortgage_rows
    }
}

/// Structured result of one `refresh` run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRunReport {
    pub districts: usize,
    pub sources: Vec<SourceReport>,
    /// Present when the run had to seed synthetic rows for districts with no
    /// sale history.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backfill: Option<SeedReport>,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unknown source '{0}'")]
    UnknownSource(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("source task panicked: {0}")]
    SourceTask(String),
}

/// Coordinates adapters, persistence, and the synthetic fallback.
pub struct PipelineOrchestrator<S> {
    store: Arc<S>,
    adapters: Vec<Arc<dyn SourceAdapter>>,
    config: PipelineConfig,
}

impl<S: HousingStore + 'static> PipelineOrchestrator<S> {
    pub fn new(
        store: Arc<S>,
        adapters: Vec<Arc<dyn SourceAdapter>>,
        config: PipelineConfig,
    ) -> Self {
        Self { store, adapters, config }
    }

    /// Run a refresh over the selected sources and return a structured
    /// report. Source failures are absorbed into the report and the fetch
    /// log; only store failures propagate.
    pub async fn refresh(&self, scope: RefreshScope) -> Result<PipelineRunReport, PipelineError> {
        let districts = self.ensure_districts().await?;

        let selected: Vec<Arc<dyn SourceAdapter>> = match &scope {
            RefreshScope::All => self.adapters.clone(),
            RefreshScope::Source(name) => {
                let found: Vec<_> = self
                    .adapters
                    .iter()
                    .filter(|a| a.name() == name.as_str())
                    .cloned()
                    .collect();
                if found.is_empty() {
                    return Err(PipelineError::UnknownSource(name.clone()));
                }
                found
            }
        };

        let mut sources = Vec::with_capacity(selected.len());
        for (i, adapter) in selected.into_iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.rate_limit).await;
            }
            sources.push(self.run_source(adapter).await?);
        }

        let backfill = self.backfill_missing().await?;

        info!(
            districts,
            sources = sources.len(),
            backfilled = backfill.as_ref().map(SeedReport::total).unwrap_or(0),
            "refresh complete"
        );
        Ok(PipelineRunReport { districts, sources, backfill })
    }

    /// Regenerate and upsert the full calibrated synthetic dataset,
    /// overwriting existing rows regardless of provenance. Idempotent: the
    /// generator is deterministic, so repeated seeds converge to identical
    /// rows.
    pub async fn seed(&self) -> Result<SeedReport, PipelineError> {
        self.ensure_districts().await?;
        let dataset = seed::generate();

        for obs in &dataset.sales {
            self.store.upsert_sale_price(obs).await?;
        }
        for obs in &dataset.rentals {
            self.store.upsert_rental_price(obs).await?;
        }
        for obs in &dataset.index {
            self.store.upsert_price_index(obs).await?;
        }
        for obs in &dataset.mortgages {
            self.store.upsert_mortgage(obs).await?;
        }

        let report = SeedReport {
            sale_rows: dataset.sales.len(),
            rental_rows: dataset.rentals.len(),
            index_rows: dataset.index.len(),
            mortgage_rows: dataset.mortgages.len(),
        };
        info!(rows = report.total(), "synthetic dataset seeded");
        Ok(report)
    }

    async fn ensure_districts(&self) -> Result<usize, StoreError> {
        let mut count = 0;
        for district in districts::all() {
            self.store.upsert_district(&district).await?;
            count += 1;
        }
        Ok(count)
    }

    async fn run_source(
        &self,
        adapter: Arc<dyn SourceAdapter>,
    ) -> Result<SourceReport, PipelineError> {
        let started_at = Utc::now();
        let window = self.config.window;
        let task = adapter.clone();
        let outcome = tokio::task::spawn_blocking(move || task.fetch(&window))
            .await
            .map_err(|err| PipelineError::SourceTask(err.to_string()))?;

        let (status, records, error) = match outcome {
            Ok(records) if records.is_empty() => (FetchStatus::Skipped, 0, None),
            Ok(records) => {
                let count = records.len() as u32;
                for record in &records {
                    self.apply(record).await?;
                }
                (FetchStatus::Success, count, None)
            }
            Err(SourceError::Empty) => {
                (FetchStatus::Skipped, 0, Some(SourceError::Empty.to_string()))
            }
            Err(err @ SourceError::Unavailable(_)) => {
                (FetchStatus::Failed, 0, Some(err.to_string()))
            }
        };

        match status {
            FetchStatus::Success => {
                info!(source = adapter.name(), records, "source refreshed")
            }
            FetchStatus::Skipped => warn!(source = adapter.name(), "source skipped"),
            FetchStatus::Failed => warn!(
                source = adapter.name(),
                error = error.as_deref().unwrap_or(""),
                "source failed"
            ),
        }

        self.store
            .append_fetch_log(&FetchLogEntry {
                source: adapter.name().to_string(),
                operation: adapter.operation().to_string(),
                status,
                records,
                error_message: error.clone(),
                started_at,
                finished_at: Utc::now(),
            })
            .await?;

        Ok(SourceReport {
            source: adapter.name().to_string(),
            status,
            records,
            error,
        })
    }

    async fn apply(&self, record: &SourceRecord) -> Result<(), StoreError> {
        match record {
            SourceRecord::SalePrice(obs) => self.store.upsert_sale_price(obs).await,
            SourceRecord::RentalPrice(obs) => self.store.upsert_rental_price(obs).await,
            SourceRecord::PriceIndex(obs) => self.store.upsert_price_index(obs).await,
            SourceRecord::Mortgage(obs) => self.store.upsert_mortgage(obs).await,
        }
    }

    /// Seed synthetic rows for natural keys with no data yet. Existing rows,
    /// live or synthetic, are left untouched, so live data always survives a
    /// refresh.
    async fn backfill_missing(&self) -> Result<Option<SeedReport>, PipelineError> {
        let mut needs_backfill = false;
        for district in self.store.list_districts().await? {
            let series = self
                .store
                .sale_price_series(&district.code, PropertyType::All)
                .await?;
            if series.is_empty() {
                needs_backfill = true;
                break;
            }
        }
        if !needs_backfill {
            return Ok(None);
        }

        let dataset = seed::generate();
        let mut report = SeedReport::default();

        let mut sale_keys: HashSet<(String, Period, PropertyType)> = HashSet::new();
        let mut rental_keys: HashSet<(String, Period)> = HashSet::new();
        for district in self.store.list_districts().await? {
            for property_type in PropertyType::ALL {
                for obs in self
                    .store
                    .sale_price_series(&district.code, property_type)
                    .await?
                {
                    sale_keys.insert((obs.district_code, obs.period, obs.property_type));
                }
            }
            for obs in self.store.rental_price_series(&district.code).await? {
                rental_keys.insert((obs.district_code, obs.period));
            }
        }

        let mut index_keys: HashSet<(Period, PropertyType)> = HashSet::new();
        for property_type in PropertyType::ALL {
            for obs in self.store.price_index_series(property_type, 0).await? {
                index_keys.insert((obs.period, obs.property_type));
            }
        }
        let mortgage_keys: HashSet<(i32, u8)> = self
            .store
            .mortgage_series(0)
            .await?
            .into_iter()
            .map(|m| (m.year, m.month))
            .collect();

        for obs in &dataset.sales {
            let key = (obs.district_code.clone(), obs.period, obs.property_type);
            if !sale_keys.contains(&key) {
                self.store.upsert_sale_price(obs).await?;
                report.sale_rows += 1;
            }
        }
        for obs in &dataset.rentals {
            let key = (obs.district_code.clone(), obs.period);
            if !rental_keys.contains(&key) {
                self.store.upsert_rental_price(obs).await?;
                report.rental_rows += 1;
            }
        }
        for obs in &dataset.index {
            if !index_keys.contains(&(obs.period, obs.property_type)) {
                self.store.upsert_price_index(obs).await?;
                report.index_rows += 1;
            }
        }
        for obs in &dataset.mortgages {
            if !mortgage_keys.contains(&(obs.year, obs.month)) {
                self.store.upsert_mortgage(obs).await?;
                report.mortgage_rows += 1;
            }
        }

        info!(rows = report.total(), "synthetic backfill applied");
        Ok(Some(report))
    }
}
