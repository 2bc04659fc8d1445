//! SQL schema for the SQLite housing store.
//!
//! Executed at every open; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
//! Natural keys are enforced here as UNIQUE constraints so idempotence under
//! reinsertion is a storage guarantee, not an application-side check.

pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS districts (
    code        TEXT PRIMARY KEY,    -- two-digit administrative code
    name        TEXT NOT NULL,
    name_es     TEXT NOT NULL,
    latitude    REAL NOT NULL,
    longitude   REAL NOT NULL,
    area_km2    REAL NOT NULL,
    population  INTEGER
);

CREATE TABLE IF NOT EXISTS sale_prices (
    id             INTEGER PRIMARY KEY,
    district_code  TEXT NOT NULL REFERENCES districts(code),
    year           INTEGER NOT NULL,
    quarter        INTEGER NOT NULL CHECK (quarter BETWEEN 1 AND 4),
    property_type  TEXT NOT NULL,    -- 'all' | 'new' | 'second_hand'
    price_per_m2   REAL NOT NULL,
    transactions   INTEGER,
    source         TEXT NOT NULL,    -- 'live' | 'synthetic'
    UNIQUE (district_code, year, quarter, property_type)
);

CREATE TABLE IF NOT EXISTS rental_prices (
    id                  INTEGER PRIMARY KEY,
    district_code       TEXT NOT NULL REFERENCES districts(code),
    year                INTEGER NOT NULL,
    quarter             INTEGER NOT NULL CHECK (quarter BETWEEN 1 AND 4),
    price_per_m2_month  REAL NOT NULL,
    listings            INTEGER,
    source              TEXT NOT NULL,
    UNIQUE (district_code, year, quarter)
);

CREATE TABLE IF NOT EXISTS price_index (
    id                       INTEGER PRIMARY KEY,
    year                     INTEGER NOT NULL,
    quarter                  INTEGER NOT NULL CHECK (quarter BETWEEN 1 AND 4),
    property_type            TEXT NOT NULL,
    index_value              REAL NOT NULL,
    annual_variation_pct     REAL,
    quarterly_variation_pct  REAL,
    source                   TEXT NOT NULL,
    UNIQUE (year, quarter, property_type)
);

CREATE TABLE IF NOT EXISTS mortgage_stats (
    id                  INTEGER PRIMARY KEY,
    year                INTEGER NOT NULL,
    month               INTEGER NOT NULL CHECK (month BETWEEN 1 AND 12),
    mortgage_count      INTEGER NOT NULL,
    avg_amount_eur      REAL NOT NULL,
    avg_interest_rate   REAL,
    fixed_rate_pct      REAL,
    avg_duration_years  REAL,
    source              TEXT NOT NULL,
    UNIQUE (year, month)
);

CREATE TABLE IF NOT EXISTS price_forecasts (
    id                  INTEGER PRIMARY KEY,
    district_code       TEXT NOT NULL REFERENCES districts(code),
    model_name          TEXT NOT NULL,
    forecast_year       INTEGER NOT NULL,
    forecast_quarter    INTEGER NOT NULL CHECK (forecast_quarter BETWEEN 1 AND 4),
    predicted_price_m2  REAL NOT NULL,
    lower_bound         REAL NOT NULL,
    upper_bound         REAL NOT NULL,
    confidence_level    REAL NOT NULL CHECK (confidence_level > 0 AND confidence_level <= 1),
    generated_at        TEXT NOT NULL,   -- ISO 8601 UTC
    UNIQUE (district_code, model_name, forecast_year, forecast_quarter)
);

-- The fetch log is strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS fetch_log (
    id             INTEGER PRIMARY KEY,
    source         TEXT NOT NULL,
    operation      TEXT NOT NULL,
    status         TEXT NOT NULL,    -- 'success' | 'skipped' | 'failed'
    records        INTEGER NOT NULL DEFAULT 0,
    error_message  TEXT,
    started_at     TEXT NOT NULL,
    finished_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS sale_prices_series_idx
    ON sale_prices(district_code, property_type, year, quarter);
CREATE INDEX IF NOT EXISTS rental_prices_series_idx
    ON rental_prices(district_code, year, quarter);
CREATE INDEX IF NOT EXISTS price_forecasts_series_idx
    ON price_forecasts(district_code, model_name, forecast_year, forecast_quarter);

PRAGMA user_version = 1;
";
