use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Response of `GET /feed`: NEOs grouped by approach date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedResponse {
    #[serde(default)]
    pub element_count: Option<u64>,
    #[serde(default)]
    pub near_earth_objects: BTreeMap<String, Vec<NearEarthObject>>,
}

impl FeedResponse {
    /// Flattens the per-date groups, keeping date order.
    pub fn into_objects(self) -> Vec<NearEarthObject> {
        self.near_earth_objects.into_values().flatten().collect()
    }
}

/// One NEO as returned by both `/feed` and `/neo/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NearEarthObject {
    #[serde(default)]
    pub id: Option<String>,
    pub neo_reference_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub nasa_jpl_url: Option<String>,
    #[serde(default)]
    pub absolute_magnitude_h: Option<f64>,
    #[serde(default)]
    pub estimated_diameter: Option<EstimatedDiameter>,
    #[serde(default)]
    pub is_potentially_hazardous_asteroid: bool,
    #[serde(default)]
    pub is_sentry_object: bool,
    #[serde(default)]
    pub close_approach_data: Vec<CloseApproach>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatedDiameter {
    #[serde(default)]
    pub kilometers: Option<DiameterRange>,
    #[serde(default)]
    pub meters: Option<DiameterRange>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DiameterRange {
    pub estimated_diameter_min: f64,
    pub estimated_diameter_max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseApproach {
    #[serde(default)]
    pub close_approach_date: Option<String>,
    #[serde(default)]
    pub close_approach_date_full: Option<String>,
    pub epoch_date_close_approach: i64,
    #[serde(default)]
    pub relative_velocity: Option<RelativeVelocity>,
    #[serde(default)]
    pub miss_distance: Option<MissDistance>,
    #[serde(default)]
    pub orbiting_body: Option<String>,
}

// NeoWs sends these numbers as strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelativeVelocity {
    #[serde(default)]
    pub kilometers_per_second: Option<String>,
    #[serde(default)]
    pub kilometers_per_hour: Option<String>,
    #[serde(default)]
    pub miles_per_hour: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissDistance {
    #[serde(default)]
    pub astronomical: Option<String>,
    #[serde(default)]
    pub lunar: Option<String>,
    #[serde(default)]
    pub kilometers: Option<String>,
    #[serde(default)]
    pub miles: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"{
        "element_count": 2,
        "near_earth_objects": {
            "2024-01-04": [{
                "id": "3542519",
                "neo_reference_id": "3542519",
                "name": "(2010 PK9)",
                "absolute_magnitude_h": 21.9,
                "is_potentially_hazardous_asteroid": true,
                "close_approach_data": [{
                    "close_approach_date": "2024-01-04",
                    "epoch_date_close_approach": 1704369600000,
                    "relative_velocity": {"kilometers_per_second": "17.1"},
                    "miss_distance": {"kilometers": "4500000.5"},
                    "orbiting_body": "Earth"
                }]
            }],
            "2024-01-03": [{
                "id": "2000433",
                "neo_reference_id": "2000433",
                "name": "433 Eros (A898 PA)",
                "estimated_diameter": {
                    "kilometers": {"estimated_diameter_min": 22.1, "estimated_diameter_max": 49.4}
                },
                "close_approach_data": []
            }]
        }
    }"#;

    #[test]
    fn test_feed_flattens_in_date_order() {
        let feed: FeedResponse = serde_json::from_str(FEED).unwrap();
        let objects = feed.into_objects();

        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].neo_reference_id, "2000433");
        assert_eq!(objects[1].neo_reference_id, "3542519");
        assert!(objects[1].is_potentially_hazardous_asteroid);
        assert!(!objects[0].is_sentry_object);
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let neo: NearEarthObject =
            serde_json::from_str(r#"{"neo_reference_id": "1"}"#).unwrap();

        assert!(neo.name.is_none());
        assert!(neo.estimated_diameter.is_none());
        assert!(neo.close_approach_data.is_empty());
    }
}
