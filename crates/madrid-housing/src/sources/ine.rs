//! INE (Instituto Nacional de Estadística) adapter.
//!
//! Public JSON API, no authentication. Two tables are read per refresh:
//! 25171 (IPV quarterly index by Comunidad Autónoma) and 18862 (monthly
//! mortgages on housing by province). The API has no official quota, so the
//! configured rate-limit delay is respected between the two requests.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::DateTime;
use serde::Deserialize;

use crate::config::SourcesConfig;
use crate::domain::{
    MortgageObservation, Period, PriceIndexObservation, PropertyType, Provenance,
};

use super::{FetchWindow, SourceAdapter, SourceError, SourceRecord};

const IPV_TABLE: &str = "25171";
const MORTGAGE_TABLE: &str = "18862";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// One series in a `DATOS_TABLA` response.
#[derive(Debug, Deserialize)]
struct TableSeries {
    #[serde(rename = "Nombre")]
    name: String,
    #[serde(rename = "Data", default)]
    data: Vec<TablePoint>,
}

#[derive(Debug, Deserialize)]
struct TablePoint {
    #[serde(rename = "Anyo")]
    year: Option<i32>,
    #[serde(rename = "Fecha")]
    epoch_ms: Option<i64>,
    #[serde(rename = "FK_Periodo")]
    month: Option<u8>,
    #[serde(rename = "Valor")]
    value: Option<f64>,
}

pub struct IneAdapter {
    client: reqwest::blocking::Client,
    base_url: String,
    rate_limit: Duration,
}

impl IneAdapter {
    pub fn new(config: &SourcesConfig) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            base_url: config.ine_base_url.clone(),
            rate_limit: config.rate_limit,
        }
    }

    fn fetch_table(&self, table_id: &str, n_last: usize) -> Result<Vec<TableSeries>, SourceError> {
        let url = format!("{}/DATOS_TABLA/{table_id}", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("nult", n_last)])
            .send()
            .map_err(|err| {
                if err.is_timeout() {
                    SourceError::Unavailable(format!("timeout fetching table {table_id}"))
                } else {
                    SourceError::Unavailable(format!("table {table_id}: {err}"))
                }
            })?;

        let response = response.error_for_status().map_err(|err| {
            SourceError::Unavailable(format!("table {table_id}: {err}"))
        })?;

        response.json::<Vec<TableSeries>>().map_err(|err| {
            SourceError::Unavailable(format!("table {table_id}: unexpected payload ({err})"))
        })
    }

    /// Keep Comunidad de Madrid index series; property type comes from the
    /// series name, (year, quarter) from the epoch-millisecond `Fecha`.
    fn parse_index(series: &[TableSeries]) -> Vec<PriceIndexObservation> {
        let mut records = Vec::new();
        for entry in series {
            if !entry.name.contains("Madrid, Comunidad de") || !entry.name.contains("Índice") {
                continue;
            }

            let lowered = entry.name.to_lowercase();
            let property_type = if lowered.contains("nueva") {
                PropertyType::New
            } else if lowered.contains("segunda") {
                PropertyType::SecondHand
            } else {
                PropertyType::All
            };

            for point in &entry.data {
                let (Some(value), Some(epoch_ms)) = (point.value, point.epoch_ms) else {
                    continue;
                };
                let Some(date) = DateTime::from_timestamp_millis(epoch_ms) else {
                    continue;
                };
                let quarter = (chrono::Datelike::month(&date) as u8 - 1) / 3 + 1;
                records.push(PriceIndexObservation {
                    period: Period::new(chrono::Datelike::year(&date), quarter),
                    property_type,
                    index_value: value,
                    annual_variation_pct: None,
                    quarterly_variation_pct: None,
                    provenance: Provenance::Live,
                });
            }
        }
        records
    }

    /// Merge the per-month count and average-amount series for Madrid into
    /// one observation per (year, month).
    fn parse_mortgages(series: &[TableSeries]) -> Vec<MortgageObservation> {
        #[derive(Default)]
        struct Partial {
            count: Option<u32>,
            amount: Option<f64>,
        }

        let mut merged: BTreeMap<(i32, u8), Partial> = BTreeMap::new();
        for entry in series {
            if !entry.name.contains("Madrid") {
                continue;
            }
            let lowered = entry.name.to_lowercase();
            let is_count = lowered.contains("número") || lowered.contains("number");
            let is_amount = lowered.contains("importe");
            if !is_count && !is_amount {
                continue;
            }

            for point in &entry.data {
                let (Some(year), Some(month), Some(value)) =
                    (point.year, point.month, point.value)
                else {
                    continue;
                };
                if !(1..=12).contains(&month) {
                    continue;
                }
                let slot = merged.entry((year, month)).or_default();
                if is_count {
                    slot.count = Some(value as u32);
                } else {
                    slot.amount = Some(value);
                }
            }
        }

        merged
            .into_iter()
            .filter_map(|((year, month), partial)| {
                let (count, amount) = (partial.count?, partial.amount?);
                Some(MortgageObservation {
                    year,
                    month,
                    mortgage_count: count,
                    avg_amount_eur: amount,
                    avg_interest_rate: None,
                    fixed_rate_pct: None,
                    avg_duration_years: None,
                    provenance: Provenance::Live,
                })
            })
            .collect()
    }
}

impl SourceAdapter for IneAdapter {
    fn name(&self) -> &'static str {
        "ine"
    }

    fn operation(&self) -> &'static str {
        "DATOS_TABLA ipv+mortgages"
    }

    fn fetch(&self, window: &FetchWindow) -> Result<Vec<SourceRecord>, SourceError> {
        let index_series = self.fetch_table(IPV_TABLE, window.quarters)?;
        std::thread::sleep(self.rate_limit);
        let mortgage_series = self.fetch_table(MORTGAGE_TABLE, window.months)?;

        let mut records: Vec<SourceRecord> = Self::parse_index(&index_series)
            .into_iter()
            .map(SourceRecord::PriceIndex)
            .collect();
        records.extend(
            Self::parse_mortgages(&mortgage_series)
                .into_iter()
                .map(SourceRecord::Mortgage),
        );

        if records.is_empty() {
            return Err(SourceError::Empty);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(name: &str, data: Vec<TablePoint>) -> TableSeries {
        TableSeries { name: name.to_string(), data }
    }

    fn quarterly_point(epoch_ms: i64, value: f64) -> TablePoint {
        TablePoint { year: None, epoch_ms: Some(epoch_ms), month: None, value: Some(value) }
    }

    fn monthly_point(year: i32, month: u8, value: f64) -> TablePoint {
        TablePoint { year: Some(year), epoch_ms: None, month: Some(month), value: Some(value) }
    }

    #[test]
    fn index_parser_keeps_only_madrid_index_series() {
        // 2024-07-01 UTC in epoch milliseconds → Q3 2024.
        let july_2024 = 1_719_792_000_000;
        let payload = vec![
            series(
                "Madrid, Comunidad de. General. Índice.",
                vec![quarterly_point(july_2024, 148.2)],
            ),
            series(
                "Madrid, Comunidad de. Vivienda nueva. Índice.",
                vec![quarterly_point(july_2024, 152.9)],
            ),
            series(
                "Andalucía. General. Índice.",
                vec![quarterly_point(july_2024, 131.0)],
            ),
            series(
                "Madrid, Comunidad de. General. Variación anual.",
                vec![quarterly_point(july_2024, 8.1)],
            ),
        ];

        let records = IneAdapter::parse_index(&payload);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].period, Period::new(2024, 3));
        assert_eq!(records[0].property_type, PropertyType::All);
        assert_eq!(records[1].property_type, PropertyType::New);
    }

    #[test]
    fn mortgage_parser_merges_count_and_amount_series() {
        let payload = vec![
            series(
                "Madrid. Número de hipotecas.",
                vec![monthly_point(2024, 5, 7123.0), monthly_point(2024, 6, 7301.0)],
            ),
            series(
                "Madrid. Importe medio.",
                vec![monthly_point(2024, 5, 262_400.0)],
            ),
        ];

        let records = IneAdapter::parse_mortgages(&payload);
        // 2024-06 lacks an amount, so only 2024-05 merges fully.
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].year, 2024);
        assert_eq!(records[0].month, 5);
        assert_eq!(records[0].mortgage_count, 7123);
        assert_eq!(records[0].avg_amount_eur, 262_400.0);
        assert_eq!(records[0].provenance, Provenance::Live);
    }
}
