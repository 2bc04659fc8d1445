//! [`SqliteStore`] — the SQLite implementation of [`HousingStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;

use crate::domain::{
    District, FetchLogEntry, FetchStatus, ForecastRecord, MortgageObservation, Period,
    PriceIndexObservation, PropertyType, Provenance, RentalPriceObservation,
    SalePriceObservation,
};

use super::schema::SCHEMA;
use super::{HousingStore, Result, StoreError};

/// A housing-market store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
    conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
    /// Open (or create) a store at `path` and run schema initialisation.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = tokio_rusqlite::Connection::open(path).await?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory store — useful for testing.
    pub async fn open_in_memory() -> Result<Self> {
        let conn = tokio_rusqlite::Connection::open_in_memory().await?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

// ─── Encoding helpers ────────────────────────────────────────────────────────

fn encode_dt(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn decode_dt(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| StoreError::Decode(format!("timestamp '{raw}': {err}")))
}

fn decode_period(year: i64, quarter: i64) -> Result<Period> {
    if !(1..=4).contains(&quarter) {
        return Err(StoreError::Decode(format!("quarter out of range: {quarter}")));
    }
    Ok(Period::new(year as i32, quarter as u8))
}

fn decode_property_type(raw: &str) -> Result<PropertyType> {
    PropertyType::parse(raw)
        .ok_or_else(|| StoreError::Decode(format!("unknown property type '{raw}'")))
}

fn decode_provenance(raw: &str) -> Result<Provenance> {
    Provenance::parse(raw)
        .ok_or_else(|| StoreError::Decode(format!("unknown provenance '{raw}'")))
}

fn decode_status(raw: &str) -> Result<FetchStatus> {
    FetchStatus::parse(raw)
        .ok_or_else(|| StoreError::Decode(format!("unknown fetch status '{raw}'")))
}

/// Translate a write error into [`StoreError::Conflict`] when a uniqueness
/// constraint fired; upserts make that unreachable unless there is a bug.
fn map_write_err(entity: &'static str, key: String, err: tokio_rusqlite::Error) -> StoreError {
    let constraint = matches!(
        &err,
        tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    );
    if constraint {
        StoreError::Conflict { entity, key }
    } else {
        StoreError::Database(err)
    }
}

// ─── Raw row types ───────────────────────────────────────────────────────────

struct RawSale {
    district_code: String,
    year: i64,
    quarter: i64,
    property_type: String,
    price_per_m2: f64,
    transactions: Option<i64>,
    source: String,
}

impl RawSale {
    fn into_obs(self) -> Result<SalePriceObservation> {
        Ok(SalePriceObservation {
            district_code: self.district_code,
            period: decode_period(self.year, self.quarter)?,
            property_type: decode_property_type(&self.property_type)?,
            price_per_m2: self.price_per_m2,
            transactions: self.transactions.map(|t| t as u32),
            provenance: decode_provenance(&self.source)?,
        })
    }
}

struct RawRental {
    district_code: String,
    year: i64,
    quarter: i64,
    price_per_m2_month: f64,
    listings: Option<i64>,
    source: String,
}

impl RawRental {
    fn into_obs(self) -> Result<RentalPriceObservation> {
        Ok(RentalPriceObservation {
            district_code: self.district_code,
            period: decode_period(self.year, self.quarter)?,
            price_per_m2_month: self.price_per_m2_month,
            listings: self.listings.map(|l| l as u32),
            provenance: decode_provenance(&self.source)?,
        })
    }
}

const SALE_COLUMNS: &str =
    "district_code, year, quarter, property_type, price_per_m2, transactions, source";

fn sale_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawSale> {
    Ok(RawSale {
        district_code: row.get(0)?,
        year: row.get(1)?,
        quarter: row.get(2)?,
        property_type: row.get(3)?,
        price_per_m2: row.get(4)?,
        transactions: row.get(5)?,
        source: row.get(6)?,
    })
}

fn district_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<District> {
    Ok(District {
        code: row.get(0)?,
        name: row.get(1)?,
        name_es: row.get(2)?,
        latitude: row.get(3)?,
        longitude: row.get(4)?,
        area_km2: row.get(5)?,
        population: row.get::<_, Option<i64>>(6)?.map(|p| p as u32),
    })
}

// ─── HousingStore impl ───────────────────────────────────────────────────────

impl HousingStore for SqliteStore {
    // ── Districts ─────────────────────────────────────────────────────────

    async fn upsert_district(&self, district: &District) -> Result<()> {
        let d = district.clone();
        let key = d.code.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO districts (code, name, name_es, latitude, longitude, area_km2, population)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT (code) DO UPDATE SET
                        name       = excluded.name,
                        name_es    = excluded.name_es,
                        latitude   = excluded.latitude,
                        longitude  = excluded.longitude,
                        area_km2   = excluded.area_km2,
                        population = excluded.population",
                    rusqlite::params![
                        d.code,
                        d.name,
                        d.name_es,
                        d.latitude,
                        d.longitude,
                        d.area_km2,
                        d.population.map(|p| p as i64),
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(|err| map_write_err("districts", key, err))
    }

    async fn list_districts(&self) -> Result<Vec<District>> {
        let districts = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT code, name, name_es, latitude, longitude, area_km2, population
                     FROM districts ORDER BY code",
                )?;
                let rows = stmt
                    .query_map([], district_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        Ok(districts)
    }

    async fn get_district<'a>(&'a self, code: &'a str) -> Result<Option<District>> {
        let code = code.to_owned();
        let district = self
            .conn
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT code, name, name_es, latitude, longitude, area_km2, population
                         FROM districts WHERE code = ?1",
                        rusqlite::params![code],
                        district_from_row,
                    )
                    .optional()?)
            })
            .await?;
        Ok(district)
    }

    // ── Sale prices ───────────────────────────────────────────────────────

    async fn upsert_sale_price(&self, obs: &SalePriceObservation) -> Result<()> {
        let o = obs.clone();
        let key = format!(
            "{}/{}/{}",
            o.district_code,
            o.period,
            o.property_type.as_str()
        );
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO sale_prices
                        (district_code, year, quarter, property_type, price_per_m2, transactions, source)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT (district_code, year, quarter, property_type) DO UPDATE SET
                        price_per_m2 = excluded.price_per_m2,
                        transactions = excluded.transactions,
                        source       = excluded.source",
                    rusqlite::params![
                        o.district_code,
                        o.period.year,
                        o.period.quarter,
                        o.property_type.as_str(),
                        o.price_per_m2,
                        o.transactions.map(|t| t as i64),
                        o.provenance.as_str(),
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(|err| map_write_err("sale_prices", key, err))
    }

    async fn sale_price_series<'a>(
        &'a self,
        district_code: &'a str,
        property_type: PropertyType,
    ) -> Result<Vec<SalePriceObservation>> {
        let code = district_code.to_owned();
        let ptype = property_type.as_str();
        let raws = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SALE_COLUMNS} FROM sale_prices
                     WHERE district_code = ?1 AND property_type = ?2
                     ORDER BY year, quarter"
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![code, ptype], sale_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        raws.into_iter().map(RawSale::into_obs).collect()
    }

    async fn sale_prices_for_period(
        &self,
        period: Period,
        property_type: PropertyType,
    ) -> Result<Vec<SalePriceObservation>> {
        let ptype = property_type.as_str();
        let raws = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SALE_COLUMNS} FROM sale_prices
                     WHERE year = ?1 AND quarter = ?2 AND property_type = ?3
                     ORDER BY price_per_m2 DESC"
                ))?;
                let rows = stmt
                    .query_map(
                        rusqlite::params![period.year, period.quarter, ptype],
                        sale_from_row,
                    )?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        raws.into_iter().map(RawSale::into_obs).collect()
    }

    async fn latest_sale_period(&self) -> Result<Option<Period>> {
        let row: Option<(i64, i64)> = self
            .conn
            .call(|conn| {
                Ok(conn
                    .query_row(
                        "SELECT year, quarter FROM sale_prices
                         ORDER BY year DESC, quarter DESC LIMIT 1",
                        [],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?)
            })
            .await?;
        row.map(|(y, q)| decode_period(y, q)).transpose()
    }

    async fn city_avg_sale_price(&self, period: Period) -> Result<Option<f64>> {
        let avg = self
            .conn
            .call(move |conn| {
                Ok(conn.query_row(
                    "SELECT AVG(price_per_m2) FROM sale_prices
                     WHERE year = ?1 AND quarter = ?2 AND property_type = 'all'",
                    rusqlite::params![period.year, period.quarter],
                    |row| row.get::<_, Option<f64>>(0),
                )?)
            })
            .await?;
        Ok(avg)
    }

    // ── Rental prices ─────────────────────────────────────────────────────

    async fn upsert_rental_price(&self, obs: &RentalPriceObservation) -> Result<()> {
        let o = obs.clone();
        let key = format!("{}/{}", o.district_code, o.period);
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO rental_prices
                        (district_code, year, quarter, price_per_m2_month, listings, source)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT (district_code, year, quarter) DO UPDATE SET
                        price_per_m2_month = excluded.price_per_m2_month,
                        listings           = excluded.listings,
                        source             = excluded.source",
                    rusqlite::params![
                        o.district_code,
                        o.period.year,
                        o.period.quarter,
                        o.price_per_m2_month,
                        o.listings.map(|l| l as i64),
                        o.provenance.as_str(),
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(|err| map_write_err("rental_prices", key, err))
    }

    async fn rental_price_series<'a>(
        &'a self,
        district_code: &'a str,
    ) -> Result<Vec<RentalPriceObservation>> {
        let code = district_code.to_owned();
        let raws = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT district_code, year, quarter, price_per_m2_month, listings, source
                     FROM rental_prices WHERE district_code = ?1
                     ORDER BY year, quarter",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![code], |row| {
                        Ok(RawRental {
                            district_code: row.get(0)?,
                            year: row.get(1)?,
                            quarter: row.get(2)?,
                            price_per_m2_month: row.get(3)?,
                            listings: row.get(4)?,
                            source: row.get(5)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        raws.into_iter().map(RawRental::into_obs).collect()
    }

    async fn rental_prices_for_period(
        &self,
        period: Period,
    ) -> Result<Vec<RentalPriceObservation>> {
        let raws = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT district_code, year, quarter, price_per_m2_month, listings, source
                     FROM rental_prices WHERE year = ?1 AND quarter = ?2
                     ORDER BY price_per_m2_month DESC",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![period.year, period.quarter], |row| {
                        Ok(RawRental {
                            district_code: row.get(0)?,
                            year: row.get(1)?,
                            quarter: row.get(2)?,
                            price_per_m2_month: row.get(3)?,
                            listings: row.get(4)?,
                            source: row.get(5)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        raws.into_iter().map(RawRental::into_obs).collect()
    }

    async fn latest_rental_period(&self) -> Result<Option<Period>> {
        let row: Option<(i64, i64)> = self
            .conn
            .call(|conn| {
                Ok(conn
                    .query_row(
                        "SELECT year, quarter FROM rental_prices
                         ORDER BY year DESC, quarter DESC LIMIT 1",
                        [],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?)
            })
            .await?;
        row.map(|(y, q)| decode_period(y, q)).transpose()
    }

    async fn city_avg_rental_price(&self, period: Period) -> Result<Option<f64>> {
        let avg = self
            .conn
            .call(move |conn| {
                Ok(conn.query_row(
                    "SELECT AVG(price_per_m2_month) FROM rental_prices
                     WHERE year = ?1 AND quarter = ?2",
                    rusqlite::params![period.year, period.quarter],
                    |row| row.get::<_, Option<f64>>(0),
                )?)
            })
            .await?;
        Ok(avg)
    }

    // ── Price index ───────────────────────────────────────────────────────

    async fn upsert_price_index(&self, obs: &PriceIndexObservation) -> Result<()> {
        let o = obs.clone();
        let key = format!("{}/{}", o.period, o.property_type.as_str());
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO price_index
                        (year, quarter, property_type, index_value,
                         annual_variation_pct, quarterly_variation_pct, source)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT (year, quarter, property_type) DO UPDATE SET
                        index_value             = excluded.index_value,
                        annual_variation_pct    = excluded.annual_variation_pct,
                        quarterly_variation_pct = excluded.quarterly_variation_pct,
                        source                  = excluded.source",
                    rusqlite::params![
                        o.period.year,
                        o.period.quarter,
                        o.property_type.as_str(),
                        o.index_value,
                        o.annual_variation_pct,
                        o.quarterly_variation_pct,
                        o.provenance.as_str(),
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(|err| map_write_err("price_index", key, err))
    }

    async fn price_index_series(
        &self,
        property_type: PropertyType,
        from_year: i32,
    ) -> Result<Vec<PriceIndexObservation>> {
        let ptype = property_type.as_str();
        let raws: Vec<(i64, i64, f64, Option<f64>, Option<f64>, String)> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT year, quarter, index_value, annual_variation_pct,
                            quarterly_variation_pct, source
                     FROM price_index
                     WHERE property_type = ?1 AND year >= ?2
                     ORDER BY year, quarter",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![ptype, from_year], |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                        ))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        raws.into_iter()
            .map(|(year, quarter, index_value, annual, quarterly, source)| {
                Ok(PriceIndexObservation {
                    period: decode_period(year, quarter)?,
                    property_type,
                    index_value,
                    annual_variation_pct: annual,
                    quarterly_variation_pct: quarterly,
                    provenance: decode_provenance(&source)?,
                })
            })
            .collect()
    }

    // ── Mortgages ─────────────────────────────────────────────────────────

    async fn upsert_mortgage(&self, obs: &MortgageObservation) -> Result<()> {
        let o = obs.clone();
        let key = format!("{}-{:02}", o.year, o.month);
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO mortgage_stats
                        (year, month, mortgage_count, avg_amount_eur, avg_interest_rate,
                         fixed_rate_pct, avg_duration_years, source)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT (year, month) DO UPDATE SET
                        mortgage_count     = excluded.mortgage_count,
                        avg_amount_eur     = excluded.avg_amount_eur,
                        avg_interest_rate  = excluded.avg_interest_rate,
                        fixed_rate_pct     = excluded.fixed_rate_pct,
                        avg_duration_years = excluded.avg_duration_years,
                        source             = excluded.source",
                    rusqlite::params![
                        o.year,
                        o.month,
                        o.mortgage_count,
                        o.avg_amount_eur,
                        o.avg_interest_rate,
                        o.fixed_rate_pct,
                        o.avg_duration_years,
                        o.provenance.as_str(),
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(|err| map_write_err("mortgage_stats", key, err))
    }

    async fn mortgage_series(&self, from_year: i32) -> Result<Vec<MortgageObservation>> {
        type Row = (i64, i64, i64, f64, Option<f64>, Option<f64>, Option<f64>, String);
        let raws: Vec<Row> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT year, month, mortgage_count, avg_amount_eur, avg_interest_rate,
                            fixed_rate_pct, avg_duration_years, source
                     FROM mortgage_stats WHERE year >= ?1
                     ORDER BY year, month",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![from_year], |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                            row.get(6)?,
                            row.get(7)?,
                        ))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        raws.into_iter()
            .map(|(year, month, count, amount, rate, fixed, duration, source)| {
                if !(1..=12).contains(&month) {
                    return Err(StoreError::Decode(format!("month out of range: {month}")));
                }
                Ok(MortgageObservation {
                    year: year as i32,
                    month: month as u8,
                    mortgage_count: count as u32,
                    avg_amount_eur: amount,
                    avg_interest_rate: rate,
                    fixed_rate_pct: fixed,
                    avg_duration_years: duration,
                    provenance: decode_provenance(&source)?,
                })
            })
            .collect()
    }

    async fn mortgage_total_for_year(&self, year: i32) -> Result<Option<u64>> {
        let total = self
            .conn
            .call(move |conn| {
                Ok(conn.query_row(
                    "SELECT SUM(mortgage_count) FROM mortgage_stats WHERE year = ?1",
                    rusqlite::params![year],
                    |row| row.get::<_, Option<i64>>(0),
                )?)
            })
            .await?;
        Ok(total.map(|t| t as u64))
    }

    // ── Forecasts ─────────────────────────────────────────────────────────

    async fn upsert_forecast(&self, record: &ForecastRecord) -> Result<()> {
        let r = record.clone();
        let key = format!("{}/{}/{}", r.district_code, r.model_name, r.period);
        let generated_at = encode_dt(r.generated_at);
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO price_forecasts
                        (district_code, model_name, forecast_year, forecast_quarter,
                         predicted_price_m2, lower_bound, upper_bound, confidence_level,
                         generated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                     ON CONFLICT (district_code, model_name, forecast_year, forecast_quarter)
                     DO UPDATE SET
                        predicted_price_m2 = excluded.predicted_price_m2,
                        lower_bound        = excluded.lower_bound,
                        upper_bound        = excluded.upper_bound,
                        confidence_level   = excluded.confidence_level,
                        generated_at       = excluded.generated_at",
                    rusqlite::params![
                        r.district_code,
                        r.model_name,
                        r.period.year,
                        r.period.quarter,
                        r.predicted_price_m2,
                        r.lower_bound,
                        r.upper_bound,
                        r.confidence_level,
                        generated_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(|err| map_write_err("price_forecasts", key, err))
    }

    async fn forecasts<'a>(
        &'a self,
        district_code: &'a str,
        model_name: &'a str,
    ) -> Result<Vec<ForecastRecord>> {
        let code = district_code.to_owned();
        let model = model_name.to_owned();
        type Row = (String, String, i64, i64, f64, f64, f64, f64, String);
        let raws: Vec<Row> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT district_code, model_name, forecast_year, forecast_quarter,
                            predicted_price_m2, lower_bound, upper_bound, confidence_level,
                            generated_at
                     FROM price_forecasts
                     WHERE district_code = ?1 AND model_name = ?2
                     ORDER BY forecast_year, forecast_quarter",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![code, model], |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                            row.get(6)?,
                            row.get(7)?,
                            row.get(8)?,
                        ))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        raws.into_iter()
            .map(
                |(district_code, model_name, year, quarter, predicted, lower, upper, conf, at)| {
                    Ok(ForecastRecord {
                        district_code,
                        model_name,
                        period: decode_period(year, quarter)?,
                        predicted_price_m2: predicted,
                        lower_bound: lower,
                        upper_bound: upper,
                        confidence_level: conf,
                        generated_at: decode_dt(&at)?,
                    })
                },
            )
            .collect()
    }

    // ── Fetch log ─────────────────────────────────────────────────────────

    async fn append_fetch_log(&self, entry: &FetchLogEntry) -> Result<()> {
        let e = entry.clone();
        let started = encode_dt(e.started_at);
        let finished = encode_dt(e.finished_at);
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO fetch_log
                        (source, operation, status, records, error_message, started_at, finished_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    rusqlite::params![
                        e.source,
                        e.operation,
                        e.status.as_str(),
                        e.records,
                        e.error_message,
                        started,
                        finished,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn recent_fetch_log(&self, limit: usize) -> Result<Vec<FetchLogEntry>> {
        let limit = limit as i64;
        type Row = (String, String, String, i64, Option<String>, String, String);
        let raws: Vec<Row> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT source, operation, status, records, error_message,
                            started_at, finished_at
                     FROM fetch_log ORDER BY id DESC LIMIT ?1",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![limit], |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                            row.get(6)?,
                        ))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        raws.into_iter()
            .map(|(source, operation, status, records, error_message, started, finished)| {
                Ok(FetchLogEntry {
                    source,
                    operation,
                    status: decode_status(&status)?,
                    records: records as u32,
                    error_message,
                    started_at: decode_dt(&started)?,
                    finished_at: decode_dt(&finished)?,
                })
            })
            .collect()
    }
}
