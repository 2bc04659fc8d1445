//! Calibrated synthetic dataset.
//!
//! When every upstream source is unreachable (or on first run) the pipeline
//! falls back to this generator: a city-wide quarterly base series scaled per
//! district by a fixed calibration multiplier, rentals derived from sale
//! prices at a fixed ratio, and mortgage figures modelling the 2020 dip and
//! the rate climb that followed. Generation is fully deterministic (fixed
//! RNG seeds), so reseeding is idempotent down to the exact values.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::districts;
use crate::domain::{
    MortgageObservation, Period, PriceIndexObservation, PropertyType, Provenance,
    RentalPriceObservation, SalePriceObservation,
};

const SALE_SEED: u64 = 42;
const RENTAL_SEED: u64 = 99;
const MORTGAGE_SEED: u64 = 77;

/// Monthly rent per m² per 1 €/m² of sale price (~3 €/m²·month per
/// 1000 €/m² sale price).
pub const RENTAL_SALE_RATIO: f64 = 0.003;

/// City-wide average sale price per m² by quarter, 2019 Q1 → 2025 Q4.
pub const CITY_AVG_PRICE_SERIES: [(i32, u8, f64); 28] = [
    (2019, 1, 3520.0), (2019, 2, 3580.0), (2019, 3, 3640.0), (2019, 4, 3680.0),
    (2020, 1, 3700.0), (2020, 2, 3550.0), (2020, 3, 3580.0), (2020, 4, 3620.0),
    (2021, 1, 3680.0), (2021, 2, 3760.0), (2021, 3, 3840.0), (2021, 4, 3920.0),
    (2022, 1, 4020.0), (2022, 2, 4140.0), (2022, 3, 4220.0), (2022, 4, 4280.0),
    (2023, 1, 4340.0), (2023, 2, 4400.0), (2023, 3, 4460.0), (2023, 4, 4520.0),
    (2024, 1, 4600.0), (2024, 2, 4680.0), (2024, 3, 4760.0), (2024, 4, 4820.0),
    (2025, 1, 4900.0), (2025, 2, 4960.0), (2025, 3, 5020.0), (2025, 4, 5080.0),
];

/// New-build and second-hand prices relative to the segment-wide average.
const PROPERTY_TYPE_FACTORS: [(PropertyType, f64); 3] = [
    (PropertyType::All, 1.0),
    (PropertyType::New, 1.18),
    (PropertyType::SecondHand, 0.96),
];

#[derive(Debug, Default)]
pub struct SyntheticDataset {
    pub sales: Vec<SalePriceObservation>,
    pub rentals: Vec<RentalPriceObservation>,
    pub index: Vec<PriceIndexObservation>,
    pub mortgages: Vec<MortgageObservation>,
}

/// Generate the full calibrated dataset. Deterministic: two calls produce
/// identical values.
pub fn generate() -> SyntheticDataset {
    SyntheticDataset {
        sales: sale_prices(),
        rentals: rental_prices(),
        index: price_index(),
        mortgages: mortgages(),
    }
}

fn sale_prices() -> Vec<SalePriceObservation> {
    let mut rng = StdRng::seed_from_u64(SALE_SEED);
    let mut rows = Vec::new();
    for (year, quarter, city_avg) in CITY_AVG_PRICE_SERIES {
        for district in &districts::MADRID_DISTRICTS {
            let multiplier = districts::price_multiplier(district.code);
            let noise = gauss(&mut rng, 0.0, city_avg * 0.01);
            let base = round2(city_avg * multiplier + noise);
            for (property_type, factor) in PROPERTY_TYPE_FACTORS {
                rows.push(SalePriceObservation {
                    district_code: district.code.to_string(),
                    period: Period::new(year, quarter),
                    property_type,
                    price_per_m2: round2(base * factor),
                    transactions: Some(rng.gen_range(80..=600)),
                    provenance: Provenance::Synthetic,
                });
            }
        }
    }
    rows
}

fn rental_prices() -> Vec<RentalPriceObservation> {
    let mut rng = StdRng::seed_from_u64(RENTAL_SEED);
    let mut rows = Vec::new();
    for (year, quarter, city_avg) in CITY_AVG_PRICE_SERIES {
        for district in &districts::MADRID_DISTRICTS {
            let multiplier = districts::price_multiplier(district.code);
            let rental = round2(city_avg * multiplier * RENTAL_SALE_RATIO);
            let noise = gauss(&mut rng, 0.0, rental * 0.05);
            rows.push(RentalPriceObservation {
                district_code: district.code.to_string(),
                period: Period::new(year, quarter),
                price_per_m2_month: round2(rental + noise),
                listings: Some(rng.gen_range(50..=400)),
                provenance: Provenance::Synthetic,
            });
        }
    }
    rows
}

/// Index series grown from base 100 by the city series' quarter-over-quarter
/// change, with a slight divergence between segments.
fn price_index() -> Vec<PriceIndexObservation> {
    const BASE_INDEX: f64 = 100.0;
    const GROWTH_FACTORS: [(PropertyType, f64); 3] = [
        (PropertyType::All, 1.0),
        (PropertyType::New, 1.02),
        (PropertyType::SecondHand, 0.99),
    ];

    let mut rows = Vec::new();
    let mut prev_index = [BASE_INDEX; 3];
    for (i, &(year, quarter, city_avg)) in CITY_AVG_PRICE_SERIES.iter().enumerate() {
        for (slot, (property_type, growth)) in GROWTH_FACTORS.into_iter().enumerate() {
            let index = if i == 0 {
                BASE_INDEX
            } else {
                let prev_avg = CITY_AVG_PRICE_SERIES[i - 1].2;
                let qoq = (city_avg - prev_avg) / prev_avg;
                prev_index[slot] * (1.0 + qoq) * growth
            };

            let annual = (i >= 4).then(|| {
                let year_ago_avg = CITY_AVG_PRICE_SERIES[i - 4].2;
                round2((city_avg - year_ago_avg) / year_ago_avg * 100.0)
            });
            let quarterly = (i > 0).then(|| {
                let prev_avg = CITY_AVG_PRICE_SERIES[i - 1].2;
                round2((city_avg - prev_avg) / prev_avg * 100.0)
            });

            rows.push(PriceIndexObservation {
                period: Period::new(year, quarter),
                property_type,
                index_value: round2(index),
                annual_variation_pct: annual,
                quarterly_variation_pct: quarterly,
                provenance: Provenance::Synthetic,
            });
            prev_index[slot] = index;
        }
    }
    rows
}

/// Monthly mortgage series 2019-01 → 2025-09: volumes dip to half during the
/// 2020 Q2 shutdown, rates climb from 1.5 % by 0.3 pp per year.
fn mortgages() -> Vec<MortgageObservation> {
    let mut rng = StdRng::seed_from_u64(MORTGAGE_SEED);
    let mut rows = Vec::new();
    for year in 2019..=2025 {
        for month in 1u8..=12 {
            if year == 2025 && month > 9 {
                break;
            }
            let years_in = (year - 2019) as f64;
            let mut base = 6000 + (year - 2019) * 200;
            if year == 2020 && (4..=6).contains(&month) {
                base /= 2;
            }
            let noise = rng.gen_range(-400..=400);
            let rate = 1.5 + years_in * 0.3 + gauss(&mut rng, 0.0, 0.1);
            rows.push(MortgageObservation {
                year,
                month,
                mortgage_count: (base + noise).max(1000) as u32,
                avg_amount_eur: (230_000.0 + years_in * 8000.0 + gauss(&mut rng, 0.0, 5000.0))
                    .round(),
                avg_interest_rate: Some(round2(rate.max(0.5))),
                fixed_rate_pct: Some(round1(
                    (45.0 + years_in * 5.0 + gauss(&mut rng, 0.0, 3.0)).min(90.0),
                )),
                avg_duration_years: Some(round1(24.0 + gauss(&mut rng, 0.0, 1.0))),
                provenance: Provenance::Synthetic,
            });
        }
    }
    rows
}

fn gauss(rng: &mut StdRng, mean: f64, std_dev: f64) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    mean + std_dev * (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
