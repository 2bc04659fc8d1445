//! The [`HousingStore`] trait and its SQLite backend.
//!
//! The pipeline, forecast engine, and analytics aggregator all depend on this
//! abstraction rather than on a concrete backend. Every write is an upsert by
//! the entity's natural key; the schema enforces those keys as UNIQUE
//! constraints, which makes the store the single concurrency guard for
//! overlapping refresh or forecast runs.

mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use std::future::Future;

use thiserror::Error;

use crate::domain::{
    District, FetchLogEntry, ForecastRecord, MortgageObservation, Period,
    PriceIndexObservation, PropertyType, RentalPriceObservation, SalePriceObservation,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    /// A uniqueness constraint fired on a write that should have been an
    /// upsert. This indicates a logic bug, not a data problem.
    #[error("unique-key conflict on {entity} ({key})")]
    Conflict { entity: &'static str, key: String },

    #[error("invalid stored value: {0}")]
    Decode(String),
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Abstraction over the persistent housing-market store.
///
/// All methods return `Send` futures so the trait can be used from a
/// multi-threaded tokio runtime.
pub trait HousingStore: Send + Sync {
    // ── Districts ─────────────────────────────────────────────────────────

    fn upsert_district(
        &self,
        district: &District,
    ) -> impl Future<Output = Result<()>> + Send + '_;

    fn list_districts(&self) -> impl Future<Output = Result<Vec<District>>> + Send + '_;

    fn get_district<'a>(
        &'a self,
        code: &'a str,
    ) -> impl Future<Output = Result<Option<District>>> + Send + 'a;

    // ── Sale prices ───────────────────────────────────────────────────────

    fn upsert_sale_price(
        &self,
        obs: &SalePriceObservation,
    ) -> impl Future<Output = Result<()>> + Send + '_;

    /// Full history for one district and property type, ordered by
    /// (year, quarter).
    fn sale_price_series<'a>(
        &'a self,
        district_code: &'a str,
        property_type: PropertyType,
    ) -> impl Future<Output = Result<Vec<SalePriceObservation>>> + Send + 'a;

    fn sale_prices_for_period(
        &self,
        period: Period,
        property_type: PropertyType,
    ) -> impl Future<Output = Result<Vec<SalePriceObservation>>> + Send + '_;

    fn latest_sale_period(&self) -> impl Future<Output = Result<Option<Period>>> + Send + '_;

    fn city_avg_sale_price(
        &self,
        period: Period,
    ) -> impl Future<Output = Result<Option<f64>>> + Send + '_;

    // ── Rental prices ─────────────────────────────────────────────────────

    fn upsert_rental_price(
        &self,
        obs: &RentalPriceObservation,
    ) -> impl Future<Output = Result<()>> + Send + '_;

    fn rental_price_series<'a>(
        &'a self,
        district_code: &'a str,
    ) -> impl Future<Output = Result<Vec<RentalPriceObservation>>> + Send + 'a;

    fn rental_prices_for_period(
        &self,
        period: Period,
    ) -> impl Future<Output = Result<Vec<RentalPriceObservation>>> + Send + '_;

    fn latest_rental_period(&self)
        -> impl Future<Output = Result<Option<Period>>> + Send + '_;

    fn city_avg_rental_price(
        &self,
        period: Period,
    ) -> impl Future<Output = Result<Option<f64>>> + Send + '_;

    // ── Price index (IPV) ─────────────────────────────────────────────────

    fn upsert_price_index(
        &self,
        obs: &PriceIndexObservation,
    ) -> impl Future<Output = Result<()>> + Send + '_;

    fn price_index_series(
        &self,
        property_type: PropertyType,
        from_year: i32,
    ) -> impl Future<Output = Result<Vec<PriceIndexObservation>>> + Send + '_;

    // ── Mortgages ─────────────────────────────────────────────────────────

    fn upsert_mortgage(
        &self,
        obs: &MortgageObservation,
    ) -> impl Future<Output = Result<()>> + Send + '_;

    fn mortgage_series(
        &self,
        from_year: i32,
    ) -> impl Future<Output = Result<Vec<MortgageObservation>>> + Send + '_;

    fn mortgage_total_for_year(
        &self,
        year: i32,
    ) -> impl Future<Output = Result<Option<u64>>> + Send + '_;

    // ── Forecasts ─────────────────────────────────────────────────────────

    fn upsert_forecast(
        &self,
        record: &ForecastRecord,
    ) -> impl Future<Output = Result<()>> + Send + '_;

    /// Stored forecasts for one district and model, ordered by period.
    fn forecasts<'a>(
        &'a self,
        district_code: &'a str,
        model_name: &'a str,
    ) -> impl Future<Output = Result<Vec<ForecastRecord>>> + Send + 'a;

    // ── Fetch log — append-only ───────────────────────────────────────────

    fn append_fetch_log(
        &self,
        entry: &FetchLogEntry,
    ) -> impl Future<Output = Result<()>> + Send + '_;

    /// Most recent log entries, newest first.
    fn recent_fetch_log(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<FetchLogEntry>>> + Send + '_;
}
