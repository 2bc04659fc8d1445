//! Read-side market analytics.
//!
//! Everything here is computed on the fly from the store; nothing is
//! persisted. Metrics degrade to explicit `None` fields when the prior
//! period or series they need is absent, so the presentation layer always
//! has something to render.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::config::AnalyticsConfig;
use crate::domain::{MortgageObservation, Period, PriceIndexObservation, PropertyType};
use crate::store::{HousingStore, StoreError};

/// High-level KPIs for the most recent period.
#[derive(Debug, Clone, Serialize)]
pub struct MarketSummary {
    pub period: String,
    pub avg_sale_price_m2: f64,
    pub yoy_price_change_pct: Option<f64>,
    pub avg_rental_m2_month: Option<f64>,
    pub gross_rental_yield_pct: Option<f64>,
    pub annual_mortgages: Option<u64>,
    pub ipv_annual_variation_pct: Option<f64>,
    pub years_to_buy: f64,
    pub affordability_index: f64,
}

/// Period-over-period change for one district and segment.
#[derive(Debug, Clone, Serialize)]
pub struct PriceChange {
    pub period: Period,
    pub price_per_m2: f64,
    pub yoy_pct: Option<f64>,
    pub qoq_pct: Option<f64>,
}

/// Presentation bands for gross rental yield.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum YieldBand {
    High,
    Medium,
    Low,
}

impl YieldBand {
    pub fn classify(yield_pct: f64) -> Self {
        if yield_pct >= 4.0 {
            Self::High
        } else if yield_pct >= 3.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Rental yield entry for one district in one period.
#[derive(Debug, Clone, Serialize)]
pub struct DistrictYield {
    pub district_code: String,
    pub district_name: String,
    pub rental_price_m2_month: f64,
    pub sale_price_m2: f64,
    pub gross_yield_pct: f64,
    pub band: YieldBand,
    pub listings: Option<u32>,
}

/// Affordability metrics for the typical home.
#[derive(Debug, Clone, Serialize)]
pub struct AffordabilityReport {
    pub typical_home_m2: f64,
    pub avg_total_price_eur: f64,
    pub monthly_mortgage_payment_eur: f64,
    pub monthly_income_eur: f64,
    pub mortgage_to_income_pct: f64,
    pub rent_to_income_pct: Option<f64>,
    pub years_of_income_to_buy: f64,
    pub affordability_index: f64,
}

/// Per-district price snapshot for one period, highest price first.
#[derive(Debug, Clone, Serialize)]
pub struct DistrictPrice {
    pub district_code: String,
    pub district_name: String,
    pub price_per_m2: f64,
    pub transactions: Option<u32>,
    pub latitude: f64,
    pub longitude: f64,
    pub period: String,
}

pub struct AnalyticsAggregator<S> {
    store: Arc<S>,
    config: AnalyticsConfig,
}

impl<S: HousingStore> AnalyticsAggregator<S> {
    pub fn new(store: Arc<S>, config: AnalyticsConfig) -> Self {
        Self { store, config }
    }

    /// Latest-period KPIs, or `None` on an empty store.
    pub async fn market_summary(&self) -> Result<Option<MarketSummary>, StoreError> {
        let Some(period) = self.store.latest_sale_period().await? else {
            return Ok(None);
        };
        let Some(avg_price) = self.store.city_avg_sale_price(period).await? else {
            return Ok(None);
        };

        let prior_year_avg = self
            .store
            .city_avg_sale_price(period.year_earlier())
            .await?;
        let avg_rental = self.store.city_avg_rental_price(period).await?;
        let annual_mortgages = self.store.mortgage_total_for_year(period.year).await?;
        let ipv_annual_variation_pct = self
            .store
            .price_index_series(PropertyType::All, period.year)
            .await?
            .into_iter()
            .find(|obs| obs.period == period)
            .and_then(|obs| obs.annual_variation_pct);

        Ok(Some(MarketSummary {
            period: period.label(),
            avg_sale_price_m2: round2(avg_price),
            yoy_price_change_pct: prior_year_avg.map(|prior| pct_change(avg_price, prior)),
            avg_rental_m2_month: avg_rental.map(round2),
            gross_rental_yield_pct: avg_rental.map(|rent| gross_yield_pct(rent, avg_price)),
            annual_mortgages,
            ipv_annual_variation_pct,
            years_to_buy: self.years_to_buy(avg_price),
            affordability_index: self.affordability_index(avg_price),
        }))
    }

    /// YoY/QoQ change for the latest observation of a district and segment.
    /// Either change is `None` when the prior period has no row.
    pub async fn price_change(
        &self,
        district_code: &str,
        property_type: PropertyType,
    ) -> Result<Option<PriceChange>, StoreError> {
        let series = self
            .store
            .sale_price_series(district_code, property_type)
            .await?;
        let Some(current) = series.last() else {
            return Ok(None);
        };

        let price_at = |period: Period| {
            series
                .iter()
                .find(|obs| obs.period == period)
                .map(|obs| obs.price_per_m2)
        };
        let year_ago = price_at(current.period.year_earlier());
        let quarter_ago = price_at(current.period.prev());

        Ok(Some(PriceChange {
            period: current.period,
            price_per_m2: current.price_per_m2,
            yoy_pct: year_ago.map(|prior| pct_change(current.price_per_m2, prior)),
            qoq_pct: quarter_ago.map(|prior| pct_change(current.price_per_m2, prior)),
        }))
    }

    /// Gross rental yield per district for `period` (latest rental period
    /// when omitted), highest rent first. Districts lacking either side of
    /// the ratio are skipped.
    pub async fn rental_yields(
        &self,
        period: Option<Period>,
    ) -> Result<Vec<DistrictYield>, StoreError> {
        let period = match period {
            Some(period) => period,
            None => match self.store.latest_rental_period().await? {
                Some(period) => period,
                None => return Ok(Vec::new()),
            },
        };

        let names: HashMap<String, String> = self
            .store
            .list_districts()
            .await?
            .into_iter()
            .map(|d| (d.code, d.name))
            .collect();
        let sales: HashMap<String, f64> = self
            .store
            .sale_prices_for_period(period, PropertyType::All)
            .await?
            .into_iter()
            .map(|obs| (obs.district_code, obs.price_per_m2))
            .collect();

        let mut yields = Vec::new();
        for rental in self.store.rental_prices_for_period(period).await? {
            let Some(&sale_price) = sales.get(&rental.district_code) else {
                continue;
            };
            if sale_price <= 0.0 {
                continue;
            }
            let yield_pct = gross_yield_pct(rental.price_per_m2_month, sale_price);
            yields.push(DistrictYield {
                district_name: names
                    .get(&rental.district_code)
                    .cloned()
                    .unwrap_or_else(|| rental.district_code.clone()),
                district_code: rental.district_code,
                rental_price_m2_month: rental.price_per_m2_month,
                sale_price_m2: sale_price,
                gross_yield_pct: yield_pct,
                band: YieldBand::classify(yield_pct),
                listings: rental.listings,
            });
        }
        Ok(yields)
    }

    /// Affordability of the typical home at the configured baselines, or
    /// `None` on an empty store.
    pub async fn affordability(&self) -> Result<Option<AffordabilityReport>, StoreError> {
        let Some(period) = self.store.latest_sale_period().await? else {
            return Ok(None);
        };
        let Some(avg_price) = self.store.city_avg_sale_price(period).await? else {
            return Ok(None);
        };
        let avg_rental = self.store.city_avg_rental_price(period).await?;

        let cfg = &self.config;
        let total_price = avg_price * cfg.typical_home_m2;
        let payment = annuity_payment(
            total_price * cfg.mortgage_ltv,
            cfg.reference_interest_rate,
            cfg.mortgage_term_years,
        );
        let monthly_income = cfg.avg_household_income_eur / 12.0;
        let rental_monthly = avg_rental.map(|rent| rent * cfg.typical_home_m2);

        Ok(Some(AffordabilityReport {
            typical_home_m2: cfg.typical_home_m2,
            avg_total_price_eur: total_price.round(),
            monthly_mortgage_payment_eur: payment.round(),
            monthly_income_eur: monthly_income.round(),
            mortgage_to_income_pct: round1(payment / monthly_income * 100.0),
            rent_to_income_pct: rental_monthly
                .map(|rent| round1(rent / monthly_income * 100.0)),
            years_of_income_to_buy: round1(total_price / cfg.avg_household_income_eur),
            affordability_index: self.affordability_index(avg_price),
        }))
    }

    /// Per-district prices for `period` (latest when omitted).
    pub async fn district_snapshot(
        &self,
        period: Option<Period>,
    ) -> Result<Vec<DistrictPrice>, StoreError> {
        let period = match period {
            Some(period) => period,
            None => match self.store.latest_sale_period().await? {
                Some(period) => period,
                None => return Ok(Vec::new()),
            },
        };

        let districts: HashMap<String, crate::domain::District> = self
            .store
            .list_districts()
            .await?
            .into_iter()
            .map(|d| (d.code.clone(), d))
            .collect();

        let mut snapshot = Vec::new();
        for obs in self
            .store
            .sale_prices_for_period(period, PropertyType::All)
            .await?
        {
            let Some(district) = districts.get(&obs.district_code) else {
                continue;
            };
            snapshot.push(DistrictPrice {
                district_code: obs.district_code.clone(),
                district_name: district.name.clone(),
                price_per_m2: obs.price_per_m2,
                transactions: obs.transactions,
                latitude: district.latitude,
                longitude: district.longitude,
                period: period.label(),
            });
        }
        Ok(snapshot)
    }

    pub async fn mortgage_trends(
        &self,
        from_year: i32,
    ) -> Result<Vec<MortgageObservation>, StoreError> {
        self.store.mortgage_series(from_year).await
    }

    pub async fn price_index_trends(
        &self,
        property_type: PropertyType,
        from_year: i32,
    ) -> Result<Vec<PriceIndexObservation>, StoreError> {
        self.store.price_index_series(property_type, from_year).await
    }

    fn affordability_index(&self, avg_price_m2: f64) -> f64 {
        affordability_index(&self.config, avg_price_m2)
    }

    fn years_to_buy(&self, avg_price_m2: f64) -> f64 {
        years_to_buy(&self.config, avg_price_m2)
    }
}

/// 100 = the reference income spends exactly the configured share of income
/// on the typical mortgage; falls as prices rise.
fn affordability_index(config: &AnalyticsConfig, avg_price_m2: f64) -> f64 {
    let threshold_monthly =
        config.avg_household_income_eur / 12.0 * config.housing_cost_income_share;
    let payment = annuity_payment(
        avg_price_m2 * config.typical_home_m2 * config.mortgage_ltv,
        config.reference_interest_rate,
        config.mortgage_term_years,
    );
    round1(threshold_monthly / payment * 100.0)
}

/// Years of savings (at the configured rate) needed for the deposit.
fn years_to_buy(config: &AnalyticsConfig, avg_price_m2: f64) -> f64 {
    let deposit = avg_price_m2 * config.typical_home_m2 * (1.0 - config.mortgage_ltv);
    let annual_savings = config.avg_household_income_eur * config.savings_rate;
    round1(deposit / annual_savings)
}

/// `(monthly_rent × 12) / sale_price` as a percentage.
fn gross_yield_pct(monthly_rent_m2: f64, sale_price_m2: f64) -> f64 {
    round2(monthly_rent_m2 * 12.0 / sale_price_m2 * 100.0)
}

/// Standard annuity formula; degrades to straight-line for a zero rate.
fn annuity_payment(loan: f64, annual_rate: f64, term_years: u32) -> f64 {
    let n = f64::from(term_years * 12);
    if annual_rate == 0.0 {
        return loan / n;
    }
    let monthly_rate = annual_rate / 12.0;
    loan * monthly_rate / (1.0 - (1.0 + monthly_rate).powf(-n))
}

fn pct_change(current: f64, prior: f64) -> f64 {
    round2((current - prior) / prior * 100.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yield_of_four_percent_is_high() {
        // 15 €/m²·month against 4500 €/m² → (15 × 12) / 4500 = 4.0 %.
        let yield_pct = gross_yield_pct(15.0, 4500.0);
        assert_eq!(yield_pct, 4.0);
        assert_eq!(YieldBand::classify(yield_pct), YieldBand::High);
    }

    #[test]
    fn yield_bands_have_the_documented_edges() {
        assert_eq!(YieldBand::classify(4.01), YieldBand::High);
        assert_eq!(YieldBand::classify(3.99), YieldBand::Medium);
        assert_eq!(YieldBand::classify(3.0), YieldBand::Medium);
        assert_eq!(YieldBand::classify(2.99), YieldBand::Low);
    }

    #[test]
    fn pct_change_is_signed() {
        assert_eq!(pct_change(110.0, 100.0), 10.0);
        assert_eq!(pct_change(95.0, 100.0), -5.0);
    }

    #[test]
    fn annuity_payment_matches_reference() {
        // 200 000 € at 3.5 % over 25 years ≈ 1001.25 €/month.
        let payment = annuity_payment(200_000.0, 0.035, 25);
        assert!((payment - 1001.25).abs() < 0.5, "payment {payment}");
        // Zero-rate fallback.
        assert!((annuity_payment(120_000.0, 0.0, 10) - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn affordability_index_decreases_as_prices_rise() {
        let config = AnalyticsConfig::default();
        let cheap = affordability_index(&config, 2000.0);
        let mid = affordability_index(&config, 4000.0);
        let pricey = affordability_index(&config, 6000.0);
        assert!(cheap > mid && mid > pricey);
    }

    #[test]
    fn years_to_buy_scales_with_price() {
        let config = AnalyticsConfig::default();
        // Deposit 20 % of 80 m² × 4500 €/m² = 72 000 €, savings 7000 €/yr.
        assert_eq!(years_to_buy(&config, 4500.0), 10.3);
    }
}
