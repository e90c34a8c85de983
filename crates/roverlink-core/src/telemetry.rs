//! Telemetry extraction
//!
//! Turns raw `sensor_data` messages into typed updates for the
//! presentation layer. Validation stops at the readings each update needs;
//! out-of-range values are passed through untouched.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::protocol::SensorDataMessage;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TelemetryError {
    #[error("Sensor {sensor} is missing reading {field}")]
    MissingReading { sensor: String, field: String },
}

/// Which bay an environmental sensor sits in
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SensorLocation {
    Internal,
    External,
}

/// A typed reading derived from one sensor sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Telemetry {
    Position {
        lat: f64,
        lon: f64,
        alt: Option<f64>,
        hdop: Option<f64>,
        num_sats: Option<u32>,
    },
    Orientation {
        roll: f64,
        pitch: f64,
        yaw: f64,
    },
    /// Unreadable values are reported by the rover as `null`
    Environment {
        location: SensorLocation,
        temp: Option<f64>,
        humidity: Option<f64>,
        pressure: Option<f64>,
    },
    Power {
        voltage: Option<f64>,
        current: Option<f64>,
    },
    /// Any sensor without a dedicated shape (host stats, new hardware)
    Readings { values: BTreeMap<String, f64> },
}

impl fmt::Display for SensorLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorLocation::Internal => write!(f, "internal"),
            SensorLocation::External => write!(f, "external"),
        }
    }
}

struct Reading(Option<f64>);

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{v}"),
            None => write!(f, "-"),
        }
    }
}

impl fmt::Display for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Telemetry::Position {
                lat,
                lon,
                alt,
                num_sats,
                ..
            } => write!(
                f,
                "position {lat:.6}, {lon:.6} alt {} sats {}",
                Reading(*alt),
                Reading(num_sats.map(f64::from))
            ),
            Telemetry::Orientation { roll, pitch, yaw } => {
                write!(f, "orientation roll {roll:.1} pitch {pitch:.1} yaw {yaw:.1}")
            }
            Telemetry::Environment {
                location,
                temp,
                humidity,
                pressure,
            } => write!(
                f,
                "{location} environment temp {} humidity {} pressure {}",
                Reading(*temp),
                Reading(*humidity),
                Reading(*pressure)
            ),
            Telemetry::Power { voltage, current } => write!(
                f,
                "power voltage {} current {}",
                Reading(*voltage),
                Reading(*current)
            ),
            Telemetry::Readings { values } => {
                f.write_str("readings")?;
                for (name, value) in values {
                    write!(f, " {name}={value}")?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryUpdate {
    pub time: DateTime<Utc>,
    pub sensor: String,
    #[serde(flatten)]
    pub telemetry: Telemetry,
}

impl TelemetryUpdate {
    pub fn from_sensor_data(data: &SensorDataMessage) -> Result<Self, TelemetryError> {
        let readings = Readings {
            sensor: &data.sensor,
            measurements: &data.measurements,
        };

        let telemetry = match data.sensor.as_str() {
            "gps" => Telemetry::Position {
                lat: readings.require("lat")?,
                lon: readings.require("lon")?,
                alt: readings.number("alt"),
                hdop: readings.number("hdop"),
                num_sats: readings
                    .number("num_sats")
                    .map(|n| n.max(0.0).round() as u32),
            },
            "imu" => Telemetry::Orientation {
                roll: readings.require("roll")?,
                pitch: readings.require("pitch")?,
                yaw: readings.require("yaw")?,
            },
            "internal_bme" | "external_bme" => Telemetry::Environment {
                location: if data.sensor.starts_with("internal") {
                    SensorLocation::Internal
                } else {
                    SensorLocation::External
                },
                temp: readings.number("temp"),
                humidity: readings.number("humidity"),
                pressure: readings.number("pressure"),
            },
            "panel_power" => Telemetry::Power {
                voltage: readings.number("voltage"),
                current: readings.number("current"),
            },
            "load_current" => Telemetry::Power {
                voltage: None,
                current: readings.number("current"),
            },
            _ => Telemetry::Readings {
                values: data
                    .measurements
                    .iter()
                    .filter_map(|(k, v)| v.as_f64().map(|n| (k.clone(), n)))
                    .collect(),
            },
        };

        Ok(Self {
            time: Utc.timestamp_nanos(data.time),
            sensor: data.sensor.clone(),
            telemetry,
        })
    }
}

struct Readings<'a> {
    sensor: &'a str,
    measurements: &'a Map<String, Value>,
}

impl Readings<'_> {
    fn number(&self, field: &str) -> Option<f64> {
        self.measurements.get(field).and_then(Value::as_f64)
    }

    fn require(&self, field: &str) -> Result<f64, TelemetryError> {
        self.number(field)
            .ok_or_else(|| TelemetryError::MissingReading {
                sensor: self.sensor.to_string(),
                field: field.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(sensor: &str, measurements: Value) -> SensorDataMessage {
        SensorDataMessage {
            time: 1_700_000_000_123_000_000,
            sensor: sensor.to_string(),
            measurements: measurements.as_object().cloned().unwrap(),
        }
    }

    #[test]
    fn test_gps_position() {
        let data = sample(
            "gps",
            json!({"time": "12:00:01", "lat": 38.4, "lon": -110.8, "alt": 1400.2, "hdop": 0.9, "num_sats": 9}),
        );
        let update = TelemetryUpdate::from_sensor_data(&data).unwrap();
        assert_eq!(update.sensor, "gps");
        assert_eq!(update.time.timestamp(), 1_700_000_000);
        assert_eq!(update.time.timestamp_subsec_millis(), 123);
        assert_eq!(
            update.telemetry,
            Telemetry::Position {
                lat: 38.4,
                lon: -110.8,
                alt: Some(1400.2),
                hdop: Some(0.9),
                num_sats: Some(9),
            }
        );
    }

    #[test]
    fn test_out_of_range_passes_through() {
        let data = sample("gps", json!({"lat": 200.0, "lon": 0}));
        let update = TelemetryUpdate::from_sensor_data(&data).unwrap();
        assert!(matches!(update.telemetry, Telemetry::Position { lat, .. } if lat == 200.0));
    }

    #[test]
    fn test_imu_requires_all_axes() {
        let data = sample("imu", json!({"roll": 1.5, "pitch": -2.0, "yaw": null, "temp": 31}));
        let err = TelemetryUpdate::from_sensor_data(&data).unwrap_err();
        assert_eq!(
            err,
            TelemetryError::MissingReading {
                sensor: "imu".to_string(),
                field: "yaw".to_string(),
            }
        );
    }

    #[test]
    fn test_environment_with_null_readings() {
        let data = sample(
            "external_bme",
            json!({"temp": 21.5, "humidity": null, "pressure": 84210}),
        );
        let update = TelemetryUpdate::from_sensor_data(&data).unwrap();
        assert_eq!(
            update.telemetry,
            Telemetry::Environment {
                location: SensorLocation::External,
                temp: Some(21.5),
                humidity: None,
                pressure: Some(84210.0),
            }
        );
    }

    #[test]
    fn test_power_sensors() {
        let panel = sample("panel_power", json!({"voltage": 13.1, "current": 2.4}));
        let load = sample("load_current", json!({"current": 1.2}));

        assert_eq!(
            TelemetryUpdate::from_sensor_data(&panel).unwrap().telemetry,
            Telemetry::Power {
                voltage: Some(13.1),
                current: Some(2.4),
            }
        );
        assert_eq!(
            TelemetryUpdate::from_sensor_data(&load).unwrap().telemetry,
            Telemetry::Power {
                voltage: None,
                current: Some(1.2),
            }
        );
    }

    #[test]
    fn test_unknown_sensor_keeps_numeric_readings() {
        let data = sample(
            "pi",
            json!({"cpu_percent": 12.5, "ram_free": 1024, "label": "host"}),
        );
        let update = TelemetryUpdate::from_sensor_data(&data).unwrap();
        match update.telemetry {
            Telemetry::Readings { values } => {
                assert_eq!(values.len(), 2);
                assert_eq!(values["cpu_percent"], 12.5);
                assert_eq!(values["ram_free"], 1024.0);
            }
            other => panic!("Unexpected telemetry: {other:?}"),
        }
    }

    #[test]
    fn test_display() {
        let env = Telemetry::Environment {
            location: SensorLocation::Internal,
            temp: Some(30.5),
            humidity: None,
            pressure: None,
        };
        assert_eq!(
            env.to_string(),
            "internal environment temp 30.5 humidity - pressure -"
        );

        let mut values = BTreeMap::new();
        values.insert("cpu_temp".to_string(), 48.0);
        assert_eq!(
            Telemetry::Readings { values }.to_string(),
            "readings cpu_temp=48"
        );
    }

    #[test]
    fn test_update_serializes_flat() {
        let data = sample("imu", json!({"roll": 0.0, "pitch": 1.0, "yaw": 90.0}));
        let update = TelemetryUpdate::from_sensor_data(&data).unwrap();
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["kind"], "orientation");
        assert_eq!(json["sensor"], "imu");
        assert_eq!(json["yaw"], 90.0);
    }
}
