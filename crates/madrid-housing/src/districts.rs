//! The 21 Madrid administrative districts. Immutable reference data.

use crate::domain::District;

pub struct DistrictRef {
    pub code: &'static str,
    pub name: &'static str,
    pub name_es: &'static str,
    pub latitude: f64,
    pub longitude: f64,
    pub area_km2: f64,
}

/// Administrative codes 01–21, city-hall naming.
pub const MADRID_DISTRICTS: [DistrictRef; 21] = [
    DistrictRef { code: "01", name: "Centro", name_es: "Centro", latitude: 40.4153, longitude: -3.7074, area_km2: 5.23 },
    DistrictRef { code: "02", name: "Arganzuela", name_es: "Arganzuela", latitude: 40.3964, longitude: -3.7014, area_km2: 6.77 },
    DistrictRef { code: "03", name: "Retiro", name_es: "Retiro", latitude: 40.4083, longitude: -3.6822, area_km2: 5.46 },
    DistrictRef { code: "04", name: "Salamanca", name_es: "Salamanca", latitude: 40.4296, longitude: -3.6764, area_km2: 5.22 },
    DistrictRef { code: "05", name: "Chamartin", name_es: "Chamartín", latitude: 40.4575, longitude: -3.6806, area_km2: 8.63 },
    DistrictRef { code: "06", name: "Tetuan", name_es: "Tetuán", latitude: 40.4607, longitude: -3.7022, area_km2: 5.36 },
    DistrictRef { code: "07", name: "Chamberi", name_es: "Chamberí", latitude: 40.4371, longitude: -3.7036, area_km2: 4.68 },
    DistrictRef { code: "08", name: "Fuencarral-El Pardo", name_es: "Fuencarral-El Pardo", latitude: 40.4902, longitude: -3.7169, area_km2: 235.87 },
    DistrictRef { code: "09", name: "Moncloa-Aravaca", name_es: "Moncloa-Aravaca", latitude: 40.4348, longitude: -3.7308, area_km2: 49.70 },
    DistrictRef { code: "10", name: "Latina", name_es: "Latina", latitude: 40.3938, longitude: -3.7385, area_km2: 25.42 },
    DistrictRef { code: "11", name: "Carabanchel", name_es: "Carabanchel", latitude: 40.3735, longitude: -3.7374, area_km2: 21.00 },
    DistrictRef { code: "12", name: "Usera", name_es: "Usera", latitude: 40.3863, longitude: -3.7129, area_km2: 7.72 },
    DistrictRef { code: "13", name: "Puente de Vallecas", name_es: "Puente de Vallecas", latitude: 40.3868, longitude: -3.6786, area_km2: 14.77 },
    DistrictRef { code: "14", name: "Moratalaz", name_es: "Moratalaz", latitude: 40.4061, longitude: -3.6467, area_km2: 7.15 },
    DistrictRef { code: "15", name: "Ciudad Lineal", name_es: "Ciudad Lineal", latitude: 40.4413, longitude: -3.6578, area_km2: 11.79 },
    DistrictRef { code: "16", name: "Hortaleza", name_es: "Hortaleza", latitude: 40.4753, longitude: -3.6364, area_km2: 27.32 },
    DistrictRef { code: "17", name: "Villaverde", name_es: "Villaverde", latitude: 40.3474, longitude: -3.7092, area_km2: 23.42 },
    DistrictRef { code: "18", name: "Villa de Vallecas", name_es: "Villa de Vallecas", latitude: 40.3640, longitude: -3.6153, area_km2: 55.30 },
    DistrictRef { code: "19", name: "Vicalvaro", name_es: "Vicálvaro", latitude: 40.4036, longitude: -3.6089, area_km2: 58.05 },
    DistrictRef { code: "20", name: "San Blas-Canillejas", name_es: "San Blas-Canillejas", latitude: 40.4283, longitude: -3.6239, area_km2: 16.80 },
    DistrictRef { code: "21", name: "Barajas", name_es: "Barajas", latitude: 40.4762, longitude: -3.5787, area_km2: 44.20 },
];

/// Price calibration multiplier relative to the city average (1.0 = average).
/// Reflects the known relative ranking of district price levels.
pub fn price_multiplier(code: &str) -> f64 {
    match code {
        "01" => 1.25,
        "02" => 1.00,
        "03" => 1.25,
        "04" => 1.40,
        "05" => 1.20,
        "06" => 0.95,
        "07" => 1.30,
        "08" => 1.05,
        "09" => 1.15,
        "10" => 0.85,
        "11" => 0.75,
        "12" => 0.70,
        "13" => 0.65,
        "14" => 0.75,
        "15" => 0.95,
        "16" => 0.95,
        "17" => 0.60,
        "18" => 0.65,
        "19" => 0.65,
        "20" => 0.75,
        "21" => 0.85,
        _ => 1.0,
    }
}

/// Resolve a district code from a display name, tolerating accents and case
/// differences (listing portals tend to use unaccented names).
pub fn code_for_name(name: &str) -> Option<&'static str> {
    let wanted = normalize(name);
    MADRID_DISTRICTS
        .iter()
        .find(|d| normalize(d.name) == wanted || normalize(d.name_es) == wanted)
        .map(|d| d.code)
}

fn normalize(name: &str) -> String {
    name.trim()
        .chars()
        .filter_map(|c| match c {
            'á' | 'à' | 'Á' => Some('a'),
            'é' | 'è' | 'É' => Some('e'),
            'í' | 'Í' => Some('i'),
            'ó' | 'Ó' => Some('o'),
            'ú' | 'Ú' => Some('u'),
            'ñ' | 'Ñ' => Some('n'),
            c if c.is_alphanumeric() => Some(c.to_ascii_lowercase()),
            ' ' | '-' => Some(' '),
            _ => None,
        })
        .collect()
}

pub fn all() -> impl Iterator<Item = District> {
    MADRID_DISTRICTS.iter().map(|d| District {
        code: d.code.to_string(),
        name: d.name.to_string(),
        name_es: d.name_es.to_string(),
        latitude: d.latitude,
        longitude: d.longitude,
        area_km2: d.area_km2,
        population: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twenty_one_districts_with_unique_codes() {
        let mut codes: Vec<_> = MADRID_DISTRICTS.iter().map(|d| d.code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), 21);
    }

    #[test]
    fn multipliers_span_the_calibrated_range() {
        let values: Vec<f64> = MADRID_DISTRICTS
            .iter()
            .map(|d| price_multiplier(d.code))
            .collect();
        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(min, 0.60);
        assert_eq!(max, 1.40);
    }

    #[test]
    fn name_lookup_handles_accents() {
        assert_eq!(code_for_name("Chamberí"), Some("07"));
        assert_eq!(code_for_name("chamberi"), Some("07"));
        assert_eq!(code_for_name("Salamanca"), Some("04"));
        assert_eq!(code_for_name("Gotham"), None);
    }
}
