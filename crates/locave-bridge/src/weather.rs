//! Weather capability
//!
//! The weather scheduler pulls current conditions from a [`WeatherSource`] and
//! broadcasts their text form into the mesh.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Current conditions as reported by a forecast service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    /// Observation time as reported by the service
    pub time: String,
    /// Air temperature at 2 m, °C
    pub temperature_2m: f64,
    /// Wind speed at 10 m, km/h
    pub wind_speed_10m: f64,
}

impl std::fmt::Display for CurrentConditions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{'time': '{}', 'temperature_2m': {:?}, 'wind_speed_10m': {:?}}}",
            self.time, self.temperature_2m, self.wind_speed_10m
        )
    }
}

/// Source of current weather conditions
#[async_trait]
pub trait WeatherSource: Send + Sync {
    /// Fetch the current conditions
    async fn fetch_current(&self) -> Result<CurrentConditions>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_form() {
        let conditions = CurrentConditions {
            time: "2024-05-01T12:00".to_string(),
            temperature_2m: 12.5,
            wind_speed_10m: 3.0,
        };
        assert_eq!(
            conditions.to_string(),
            "{'time': '2024-05-01T12:00', 'temperature_2m': 12.5, 'wind_speed_10m': 3.0}"
        );
    }

    #[test]
    fn test_deserialize_forecast_current() {
        let json = r#"{"time":"2024-05-01T12:00","interval":900,"temperature_2m":9.8,"wind_speed_10m":14.2}"#;
        let conditions: CurrentConditions = serde_json::from_str(json).unwrap();
        assert_eq!(conditions.temperature_2m, 9.8);
        assert_eq!(conditions.wind_speed_10m, 14.2);
    }
}
