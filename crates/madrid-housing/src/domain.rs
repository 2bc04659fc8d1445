use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Market segment an observation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    All,
    New,
    SecondHand,
}

impl PropertyType {
    pub const ALL: [PropertyType; 3] = [Self::All, Self::New, Self::SecondHand];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::New => "new",
            Self::SecondHand => "second_hand",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "all" => Some(Self::All),
            "new" => Some(Self::New),
            "second_hand" => Some(Self::SecondHand),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A calendar quarter. Ordering follows chronology, so observation series can
/// be sorted with `sort` directly.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Period {
    pub year: i32,
    pub quarter: u8,
}

impl Period {
    pub fn new(year: i32, quarter: u8) -> Self {
        debug_assert!((1..=4).contains(&quarter), "quarter must be 1..=4");
        Self { year, quarter }
    }

    pub fn next(self) -> Self {
        if self.quarter == 4 {
            Self { year: self.year + 1, quarter: 1 }
        } else {
            Self { year: self.year, quarter: self.quarter + 1 }
        }
    }

    pub fn prev(self) -> Self {
        if self.quarter == 1 {
            Self { year: self.year - 1, quarter: 4 }
        } else {
            Self { year: self.year, quarter: self.quarter - 1 }
        }
    }

    pub fn year_earlier(self) -> Self {
        Self { year: self.year - 1, quarter: self.quarter }
    }

    pub fn label(&self) -> String {
        format!("{} Q{}", self.year, self.quarter)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Q{}", self.year, self.quarter)
    }
}

/// Distinguishes rows ingested from a live upstream source from rows produced
/// by the calibrated synthetic generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Live,
    Synthetic,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Synthetic => "synthetic",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "live" => Some(Self::Live),
            "synthetic" => Some(Self::Synthetic),
            _ => None,
        }
    }
}

/// Madrid administrative district. Reference data: created at bootstrap,
/// never deleted. Identity is the two-digit administrative code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct District {
    pub code: String,
    pub name: String,
    pub name_es: String,
    pub latitude: f64,
    pub longitude: f64,
    pub area_km2: f64,
    pub population: Option<u32>,
}

/// Average sale price per m² for one district, period, and market segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalePriceObservation {
    pub district_code: String,
    pub period: Period,
    pub property_type: PropertyType,
    pub price_per_m2: f64,
    pub transactions: Option<u32>,
    pub provenance: Provenance,
}

/// Average rental price per m² per month for one district and period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RentalPriceObservation {
    pub district_code: String,
    pub period: Period,
    pub price_per_m2_month: f64,
    pub listings: Option<u32>,
    pub provenance: Provenance,
}

/// INE housing price index (IPV) point. District-agnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceIndexObservation {
    pub period: Period,
    pub property_type: PropertyType,
    pub index_value: f64,
    pub annual_variation_pct: Option<f64>,
    pub quarterly_variation_pct: Option<f64>,
    pub provenance: Provenance,
}

/// Monthly mortgage statistics for the Madrid province.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MortgageObservation {
    pub year: i32,
    pub month: u8,
    pub mortgage_count: u32,
    pub avg_amount_eur: f64,
    pub avg_interest_rate: Option<f64>,
    pub fixed_rate_pct: Option<f64>,
    pub avg_duration_years: Option<f64>,
    pub provenance: Provenance,
}

/// Stored forecast point. Keyed by (district, model_name, period); reruns
/// overwrite in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRecord {
    pub district_code: String,
    pub model_name: String,
    pub period: Period,
    pub predicted_price_m2: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub confidence_level: f64,
    pub generated_at: DateTime<Utc>,
}

/// Outcome of a single ingestion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    Success,
    Skipped,
    Failed,
}

impl FetchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "success" => Some(Self::Success),
            "skipped" => Some(Self::Skipped),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Append-only audit record for one ingestion attempt. Never updated after
/// creation; read only for operational visibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchLogEntry {
    pub source: String,
    pub operation: String,
    pub status: FetchStatus,
    pub records: u32,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_arithmetic_wraps_year_boundaries() {
        assert_eq!(Period::new(2024, 4).next(), Period::new(2025, 1));
        assert_eq!(Period::new(2025, 1).prev(), Period::new(2024, 4));
        assert_eq!(Period::new(2024, 2).next(), Period::new(2024, 3));
        assert_eq!(Period::new(2024, 3).year_earlier(), Period::new(2023, 3));
    }

    #[test]
    fn period_ordering_is_chronological() {
        let mut periods = vec![
            Period::new(2024, 1),
            Period::new(2023, 4),
            Period::new(2024, 3),
            Period::new(2023, 1),
        ];
        periods.sort();
        assert_eq!(
            periods,
            vec![
                Period::new(2023, 1),
                Period::new(2023, 4),
                Period::new(2024, 1),
                Period::new(2024, 3),
            ]
        );
    }

    #[test]
    fn enum_round_trips() {
        for pt in PropertyType::ALL {
            assert_eq!(PropertyType::parse(pt.as_str()), Some(pt));
        }
        assert_eq!(Provenance::parse("live"), Some(Provenance::Live));
        assert_eq!(FetchStatus::parse("skipped"), Some(FetchStatus::Skipped));
        assert_eq!(PropertyType::parse("commercial"), None);
    }
}
