//! Source adapter trait and structured error types.
//!
//! Each upstream provider implements [`SourceAdapter`] and returns records
//! already normalized to the store's entity shapes. The pipeline owns a
//! collection of adapters and never branches on provider identity.

pub mod catastro;
pub mod ine;
pub mod idealista;

pub use catastro::CatastroAdapter;
pub use idealista::IdealistaAdapter;
pub use ine::IneAdapter;

use thiserror::Error;

use crate::domain::{
    MortgageObservation, PriceIndexObservation, RentalPriceObservation, SalePriceObservation,
};

/// How far back a refresh asks each provider to look.
#[derive(Debug, Clone, Copy)]
pub struct FetchWindow {
    pub quarters: usize,
    pub months: usize,
}

impl Default for FetchWindow {
    fn default() -> Self {
        Self { quarters: 24, months: 36 }
    }
}

/// A normalized record produced by a source adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceRecord {
    SalePrice(SalePriceObservation),
    RentalPrice(RentalPriceObservation),
    PriceIndex(PriceIndexObservation),
    Mortgage(MortgageObservation),
}

/// Failure modes of a fetch attempt. `Empty` is a valid response carrying no
/// usable records and is logged as `skipped`; `Unavailable` covers transport
/// and protocol failures and is logged as `failed`.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),

    #[error("source returned no records")]
    Empty,
}

/// Trait for upstream data providers.
///
/// `fetch` performs synchronous blocking network I/O; the pipeline runs it on
/// a blocking thread and serializes calls with the configured rate-limit
/// delay. Implementations must bound each request with their own timeout so a
/// stalled upstream fails the attempt instead of hanging the run.
pub trait SourceAdapter: Send + Sync {
    /// Stable provider name used in run reports and the fetch log.
    fn name(&self) -> &'static str;

    /// Endpoint or operation label recorded in the fetch log.
    fn operation(&self) -> &'static str;

    fn fetch(&self, window: &FetchWindow) -> Result<Vec<SourceRecord>, SourceError>;
}
