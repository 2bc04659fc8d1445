//! Catastro (Sede Electrónica del Catastro) adapter.
//!
//! The public REST endpoints expose per-parcel lookups, not aggregate
//! statistics; those require the bulk download service. The adapter performs
//! a municipality query to verify the service is reachable and reports an
//! empty fetch, which the pipeline records as `skipped` rather than `failed`.

use std::time::Duration;

use serde::Deserialize;

use crate::config::SourcesConfig;

use super::{FetchWindow, SourceAdapter, SourceError, SourceRecord};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct MunicipalityResponse {
    #[serde(rename = "consulta_municipiero", default)]
    consulta: Option<serde_json::Value>,
}

pub struct CatastroAdapter {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl CatastroAdapter {
    pub fn new(config: &SourcesConfig) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            base_url: config.catastro_base_url.clone(),
        }
    }
}

impl SourceAdapter for CatastroAdapter {
    fn name(&self) -> &'static str {
        "catastro"
    }

    fn operation(&self) -> &'static str {
        "Consulta_VMUN"
    }

    fn fetch(&self, _window: &FetchWindow) -> Result<Vec<SourceRecord>, SourceError> {
        let url = format!("{}/OVCCallejero.svc/json/Consulta_VMUN", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("Provincia", "Madrid"), ("Municipio", "Madrid")])
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|err| {
                if err.is_timeout() {
                    SourceError::Unavailable("municipality query timed out".to_string())
                } else {
                    SourceError::Unavailable(format!("municipality query: {err}"))
                }
            })?;

        let payload: MunicipalityResponse = response
            .json()
            .map_err(|err| SourceError::Unavailable(format!("unexpected payload: {err}")))?;

        if payload.consulta.is_none() {
            return Err(SourceError::Unavailable(
                "municipality query returned an unrecognised document".to_string(),
            ));
        }

        // Reachable, but no aggregate series on the free API.
        Err(SourceError::Empty)
    }
}
