//! Idealista listings adapter.
//!
//! OAuth 2.0 client-credentials API. Listing searches for the Madrid
//! municipality are aggregated into per-district sale and rental price
//! observations for the current quarter. Without configured credentials the
//! adapter degrades to an empty fetch instead of failing the run. The free
//! tier quota (100 searches/month) also makes every call count.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{Datelike, Utc};
use serde::Deserialize;

use crate::config::SourcesConfig;
use crate::districts;
use crate::domain::{
    Period, PropertyType, Provenance, RentalPriceObservation, SalePriceObservation,
};

use super::{FetchWindow, SourceAdapter, SourceError, SourceRecord};

const TOKEN_URL: &str = "https://api.idealista.com/oauth/token";
const MADRID_LOCATION_ID: &str = "0-EU-ES-28-07-001-079";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expiry")]
    expires_in: u64,
}

fn default_expiry() -> u64 {
    3600
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "elementList", default)]
    element_list: Vec<Listing>,
}

#[derive(Debug, Deserialize)]
struct Listing {
    #[serde(rename = "priceByArea")]
    price_by_area: Option<f64>,
    district: Option<String>,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

pub struct IdealistaAdapter {
    client: reqwest::blocking::Client,
    base_url: String,
    credentials: Option<(String, String)>,
    rate_limit: Duration,
    token: Mutex<Option<CachedToken>>,
}

impl IdealistaAdapter {
    pub fn new(config: &SourcesConfig) -> Self {
        let credentials = config
            .idealista_api_key
            .clone()
            .zip(config.idealista_secret.clone());
        if credentials.is_none() {
            tracing::warn!(
                "idealista credentials not set; adapter will report empty fetches"
            );
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            base_url: config.idealista_base_url.clone(),
            credentials,
            rate_limit: config.rate_limit,
            token: Mutex::new(None),
        }
    }

    fn bearer_token(&self) -> Result<String, SourceError> {
        let mut guard = self.token.lock().expect("token mutex poisoned");
        if let Some(cached) = guard.as_ref() {
            if cached.expires_at > Instant::now() {
                return Ok(cached.value.clone());
            }
        }

        let (key, secret) = self
            .credentials
            .as_ref()
            .ok_or(SourceError::Empty)?;

        let response = self
            .client
            .post(TOKEN_URL)
            .basic_auth(key, Some(secret))
            .form(&[("grant_type", "client_credentials"), ("scope", "read")])
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|err| SourceError::Unavailable(format!("token request: {err}")))?;

        let token: TokenResponse = response
            .json()
            .map_err(|err| SourceError::Unavailable(format!("token payload: {err}")))?;

        let expires_in = Duration::from_secs(token.expires_in.saturating_sub(30));
        let value = token.access_token.clone();
        *guard = Some(CachedToken {
            value: token.access_token,
            expires_at: Instant::now() + expires_in,
        });
        Ok(value)
    }

    fn search(&self, operation: &str, token: &str) -> Result<Vec<Listing>, SourceError> {
        let url = format!("{}/es/{operation}/homes/search", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .form(&[
                ("locationId", MADRID_LOCATION_ID),
                ("maxItems", "50"),
                ("numPage", "1"),
                ("language", "en"),
            ])
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|err| SourceError::Unavailable(format!("{operation} search: {err}")))?;

        let payload: SearchResponse = response
            .json()
            .map_err(|err| SourceError::Unavailable(format!("{operation} payload: {err}")))?;
        Ok(payload.element_list)
    }

    /// Mean price-per-area and listing count per recognised district.
    fn aggregate(listings: &[Listing]) -> BTreeMap<&'static str, (f64, u32)> {
        let mut sums: BTreeMap<&'static str, (f64, u32)> = BTreeMap::new();
        for listing in listings {
            let (Some(price), Some(district)) =
                (listing.price_by_area, listing.district.as_deref())
            else {
                continue;
            };
            if price <= 0.0 {
                continue;
            }
            let Some(code) = districts::code_for_name(district) else {
                continue;
            };
            let slot = sums.entry(code).or_insert((0.0, 0));
            slot.0 += price;
            slot.1 += 1;
        }
        sums.into_iter()
            .map(|(code, (sum, count))| (code, (sum / count as f64, count)))
            .collect()
    }

    fn current_period() -> Period {
        let now = Utc::now();
        Period::new(now.year(), (now.month() as u8 - 1) / 3 + 1)
    }
}

impl SourceAdapter for IdealistaAdapter {
    fn name(&self) -> &'static str {
        "idealista"
    }

    fn operation(&self) -> &'static str {
        "listing search sale+rental"
    }

    fn fetch(&self, _window: &FetchWindow) -> Result<Vec<SourceRecord>, SourceError> {
        if self.credentials.is_none() {
            return Err(SourceError::Empty);
        }

        let token = self.bearer_token()?;
        let period = Self::current_period();

        let sale_listings = self.search("sale", &token)?;
        std::thread::sleep(self.rate_limit);
        let rental_listings = self.search("rent", &token)?;

        let mut records = Vec::new();
        for (code, (avg_price, count)) in Self::aggregate(&sale_listings) {
            records.push(SourceRecord::SalePrice(SalePriceObservation {
                district_code: code.to_string(),
                period,
                property_type: PropertyType::All,
                price_per_m2: avg_price,
                transactions: Some(count),
                provenance: Provenance::Live,
            }));
        }
        for (code, (avg_price, count)) in Self::aggregate(&rental_listings) {
            records.push(SourceRecord::RentalPrice(RentalPriceObservation {
                district_code: code.to_string(),
                period,
                price_per_m2_month: avg_price,
                listings: Some(count),
                provenance: Provenance::Live,
            }));
        }

        if records.is_empty() {
            return Err(SourceError::Empty);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(price: Option<f64>, district: Option<&str>) -> Listing {
        Listing {
            price_by_area: price,
            district: district.map(str::to_string),
        }
    }

    #[test]
    fn aggregation_averages_per_district_and_drops_unknowns() {
        let listings = vec![
            listing(Some(5000.0), Some("Salamanca")),
            listing(Some(5400.0), Some("Salamanca")),
            listing(Some(3100.0), Some("Latina")),
            listing(Some(2900.0), Some("Narnia")),
            listing(None, Some("Retiro")),
            listing(Some(-10.0), Some("Retiro")),
        ];

        let aggregated = IdealistaAdapter::aggregate(&listings);
        assert_eq!(aggregated.len(), 2);
        assert_eq!(aggregated["04"], (5200.0, 2));
        assert_eq!(aggregated["10"], (3100.0, 1));
    }

    #[test]
    fn unconfigured_adapter_reports_empty() {
        let adapter = IdealistaAdapter::new(&SourcesConfig::default());
        let err = adapter.fetch(&FetchWindow::default()).expect_err("no creds");
        assert!(matches!(err, SourceError::Empty));
    }
}
