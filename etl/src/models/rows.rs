use super::neo::{CloseApproach, NearEarthObject};
use serde::{Deserialize, Serialize};

/// One close approach, flattened with its owning NEO's identifier.
/// Numeric fields stay as received; typing happens at load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCloseApproach {
    pub neo_reference_id: String,
    pub epoch_date_close_approach: i64,
    pub close_approach_date: Option<String>,
    pub relative_velocity_kps: Option<String>,
    pub relative_velocity_kph: Option<String>,
    pub miss_distance_astronomical: Option<String>,
    pub miss_distance_lunar: Option<String>,
    pub miss_distance_km: Option<String>,
    pub orbiting_body: Option<String>,
}

/// Descriptor snapshot of one asteroid from the lookup endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAsteroid {
    pub neo_reference_id: String,
    pub name: Option<String>,
    pub nasa_jpl_url: Option<String>,
    pub absolute_magnitude_h: Option<f64>,
    pub estimated_diameter_min_km: Option<f64>,
    pub estimated_diameter_max_km: Option<f64>,
    pub is_potentially_hazardous_asteroid: bool,
    pub is_sentry_object: bool,
    pub approaches_to_earth: i64,
}

impl RawCloseApproach {
    fn from_approach(neo_reference_id: &str, approach: &CloseApproach) -> Self {
        let velocity = approach.relative_velocity.as_ref();
        let distance = approach.miss_distance.as_ref();
        Self {
            neo_reference_id: neo_reference_id.to_string(),
            epoch_date_close_approach: approach.epoch_date_close_approach,
            close_approach_date: approach.close_approach_date.clone(),
            relative_velocity_kps: velocity.and_then(|v| v.kilometers_per_second.clone()),
            relative_velocity_kph: velocity.and_then(|v| v.kilometers_per_hour.clone()),
            miss_distance_astronomical: distance.and_then(|d| d.astronomical.clone()),
            miss_distance_lunar: distance.and_then(|d| d.lunar.clone()),
            miss_distance_km: distance.and_then(|d| d.kilometers.clone()),
            orbiting_body: approach.orbiting_body.clone(),
        }
    }
}

impl NearEarthObject {
    pub fn close_approach_rows(&self) -> Vec<RawCloseApproach> {
        self.close_approach_data
            .iter()
            .map(|approach| RawCloseApproach::from_approach(&self.neo_reference_id, approach))
            .collect()
    }

    pub fn asteroid_row(&self) -> RawAsteroid {
        let kilometers = self
            .estimated_diameter
            .as_ref()
            .and_then(|d| d.kilometers);

        let approaches_to_earth = self
            .close_approach_data
            .iter()
            .filter(|a| a.orbiting_body.as_deref() == Some("Earth"))
            .count() as i64;

        RawAsteroid {
            neo_reference_id: self.neo_reference_id.clone(),
            name: self.name.clone(),
            nasa_jpl_url: self.nasa_jpl_url.clone(),
            absolute_magnitude_h: self.absolute_magnitude_h,
            estimated_diameter_min_km: kilometers.map(|k| k.estimated_diameter_min),
            estimated_diameter_max_km: kilometers.map(|k| k.estimated_diameter_max),
            is_potentially_hazardous_asteroid: self.is_potentially_hazardous_asteroid,
            is_sentry_object: self.is_sentry_object,
            approaches_to_earth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eros() -> NearEarthObject {
        serde_json::from_str(
            r#"{
                "neo_reference_id": "2000433",
                "name": "433 Eros (A898 PA)",
                "absolute_magnitude_h": 10.38,
                "estimated_diameter": {
                    "kilometers": {"estimated_diameter_min": 22.1, "estimated_diameter_max": 49.4}
                },
                "close_approach_data": [
                    {"epoch_date_close_approach": 1704283200000, "orbiting_body": "Earth",
                     "miss_distance": {"kilometers": "1000.5", "lunar": "0.1"}},
                    {"epoch_date_close_approach": 1604283200000, "orbiting_body": "Mars"},
                    {"epoch_date_close_approach": 1504283200000, "orbiting_body": "Earth"}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_asteroid_row_counts_only_earth_approaches() {
        let row = eros().asteroid_row();

        assert_eq!(row.neo_reference_id, "2000433");
        assert_eq!(row.approaches_to_earth, 2);
        assert_eq!(row.estimated_diameter_min_km, Some(22.1));
        assert_eq!(row.estimated_diameter_max_km, Some(49.4));
    }

    #[test]
    fn test_close_approach_rows_carry_reference_id() {
        let rows = eros().close_approach_rows();

        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.neo_reference_id == "2000433"));
        assert_eq!(rows[0].miss_distance_km.as_deref(), Some("1000.5"));
        assert_eq!(rows[0].miss_distance_lunar.as_deref(), Some("0.1"));
        assert!(rows[1].miss_distance_km.is_none());
    }
}
