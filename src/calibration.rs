// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Per-beam geometry of the sensor.
//!
//! The calibration is read once at startup from the sensor metadata, the
//! angles converted from degrees to radians, and then shared read-only with
//! every sweep.  Runtime reconfiguration never touches it.

use crate::packet::PIXELS_PER_COLUMN;
use serde::Deserialize;
use std::{
    fmt,
    fs::File,
    io::{self, BufReader, Read},
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{info, instrument, warn};

/// Beam altitude angles in degrees, from the topmost beam down.
pub const DEFAULT_BEAM_ALTITUDE_ANGLES: [f64; PIXELS_PER_COLUMN] = [
    16.611, 16.084, 15.557, 15.029, 14.502, 13.975, 13.447, 12.920, //
    12.393, 11.865, 11.338, 10.811, 10.283, 9.756, 9.229, 8.701, //
    8.174, 7.646, 7.119, 6.592, 6.064, 5.537, 5.010, 4.482, //
    3.955, 3.428, 2.900, 2.373, 1.846, 1.318, 0.791, 0.264, //
    -0.264, -0.791, -1.318, -1.846, -2.373, -2.900, -3.428, -3.955, //
    -4.482, -5.010, -5.537, -6.064, -6.592, -7.119, -7.646, -8.174, //
    -8.701, -9.229, -9.756, -10.283, -10.811, -11.338, -11.865, -12.393, //
    -12.920, -13.447, -13.975, -14.502, -15.029, -15.557, -16.084, -16.611,
];

/// Beam azimuth offsets in degrees, the four emitter columns repeat.
pub const DEFAULT_BEAM_AZIMUTH_ANGLES: [f64; PIXELS_PER_COLUMN] = [
    3.164, 1.055, -1.055, -3.164, 3.164, 1.055, -1.055, -3.164, //
    3.164, 1.055, -1.055, -3.164, 3.164, 1.055, -1.055, -3.164, //
    3.164, 1.055, -1.055, -3.164, 3.164, 1.055, -1.055, -3.164, //
    3.164, 1.055, -1.055, -3.164, 3.164, 1.055, -1.055, -3.164, //
    3.164, 1.055, -1.055, -3.164, 3.164, 1.055, -1.055, -3.164, //
    3.164, 1.055, -1.055, -3.164, 3.164, 1.055, -1.055, -3.164, //
    3.164, 1.055, -1.055, -3.164, 3.164, 1.055, -1.055, -3.164, //
    3.164, 1.055, -1.055, -3.164, 3.164, 1.055, -1.055, -3.164,
];

/// Row-major 4x4 homogeneous transform, translation in millimeters.
pub const DEFAULT_IMU_TO_SENSOR_TRANSFORM: [f64; 16] = [
    1.0, 0.0, 0.0, 6.253, //
    0.0, 1.0, 0.0, -11.775, //
    0.0, 0.0, 1.0, 7.645, //
    0.0, 0.0, 0.0, 1.0,
];

/// Row-major 4x4 homogeneous transform, translation in millimeters.
pub const DEFAULT_LIDAR_TO_SENSOR_TRANSFORM: [f64; 16] = [
    -1.0, 0.0, 0.0, 0.0, //
    0.0, -1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 36.18, //
    0.0, 0.0, 0.0, 1.0,
];

/// Hostname reported when the metadata omits it.
pub const DEFAULT_HOSTNAME: &str = "UNKNOWN";

/// Errors raised while reading the sensor metadata.
#[derive(Debug)]
pub enum Error {
    /// The metadata document could not be read.
    Io(io::Error),
    /// The metadata document is not valid JSON or lacks the beam tables.
    Json(serde_json::Error),
    /// Altitude and azimuth tables must both hold one entry per beam.
    BeamCount(usize, usize),
    /// A transform must hold the 16 entries of a 4x4 matrix.
    TransformSize(usize),
    /// The lidar mode is not one of the supported resolutions.
    UnknownLidarMode(String),
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Error::Json(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "io error: {}", err),
            Error::Json(err) => write!(f, "metadata error: {}", err),
            Error::BeamCount(altitude, azimuth) => write!(
                f,
                "expected {} beams but metadata has {} altitude and {} azimuth angles",
                PIXELS_PER_COLUMN, altitude, azimuth
            ),
            Error::TransformSize(len) => write!(f, "invalid transform size: {}", len),
            Error::UnknownLidarMode(mode) => write!(f, "unknown lidar mode: {}", mode),
        }
    }
}

/// Horizontal resolution and rotation rate of the sensor.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[allow(missing_docs)]
pub enum LidarMode {
    Mode512x10,
    Mode512x20,
    #[default]
    Mode1024x10,
    Mode1024x20,
    Mode2048x10,
}

impl LidarMode {
    /// Columns in one revolution.
    pub fn columns(&self) -> usize {
        match self {
            LidarMode::Mode512x10 | LidarMode::Mode512x20 => 512,
            LidarMode::Mode1024x10 | LidarMode::Mode1024x20 => 1024,
            LidarMode::Mode2048x10 => 2048,
        }
    }

    /// Revolutions per second.
    pub fn frequency(&self) -> usize {
        match self {
            LidarMode::Mode512x20 | LidarMode::Mode1024x20 => 20,
            _ => 10,
        }
    }
}

impl FromStr for LidarMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "512x10" => Ok(LidarMode::Mode512x10),
            "512x20" => Ok(LidarMode::Mode512x20),
            "1024x10" => Ok(LidarMode::Mode1024x10),
            "1024x20" => Ok(LidarMode::Mode1024x20),
            "2048x10" => Ok(LidarMode::Mode2048x10),
            _ => Err(Error::UnknownLidarMode(s.to_string())),
        }
    }
}

impl fmt::Display for LidarMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}x{}", self.columns(), self.frequency())
    }
}

/// Sensor metadata document as reported by the sensor, angles in degrees.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SensorMetadata {
    /// Sensor hostname.
    #[serde(default = "default_hostname")]
    pub hostname: String,
    /// Lidar mode such as `1024x10`.
    #[serde(default = "default_lidar_mode")]
    pub lidar_mode: String,
    /// Beam altitude angles, topmost beam first.
    pub beam_altitude_angles: Vec<f64>,
    /// Beam azimuth offsets.
    pub beam_azimuth_angles: Vec<f64>,
    /// Row-major 4x4 IMU to sensor transform.
    #[serde(default = "default_imu_to_sensor")]
    pub imu_to_sensor_transform: Vec<f64>,
    /// Row-major 4x4 lidar to sensor transform.
    #[serde(default = "default_lidar_to_sensor")]
    pub lidar_to_sensor_transform: Vec<f64>,
}

fn default_hostname() -> String {
    DEFAULT_HOSTNAME.to_string()
}

fn default_lidar_mode() -> String {
    LidarMode::default().to_string()
}

fn default_imu_to_sensor() -> Vec<f64> {
    DEFAULT_IMU_TO_SENSOR_TRANSFORM.to_vec()
}

fn default_lidar_to_sensor() -> Vec<f64> {
    DEFAULT_LIDAR_TO_SENSOR_TRANSFORM.to_vec()
}

impl Default for SensorMetadata {
    fn default() -> Self {
        SensorMetadata {
            hostname: default_hostname(),
            lidar_mode: default_lidar_mode(),
            beam_altitude_angles: DEFAULT_BEAM_ALTITUDE_ANGLES.to_vec(),
            beam_azimuth_angles: DEFAULT_BEAM_AZIMUTH_ANGLES.to_vec(),
            imu_to_sensor_transform: default_imu_to_sensor(),
            lidar_to_sensor_transform: default_lidar_to_sensor(),
        }
    }
}

impl SensorMetadata {
    /// Parses a JSON metadata document.
    pub fn from_reader<R: Read>(reader: R) -> Result<SensorMetadata, Error> {
        Ok(serde_json::from_reader(reader)?)
    }
}

/// Provider of the sensor metadata queried once at startup.
pub trait CalibrationSource {
    /// Fetches the metadata, failing when the provider is unavailable.
    fn fetch(&self) -> Result<SensorMetadata, Error>;
}

/// Sensor metadata stored as a JSON document on disk.
#[derive(Clone, Debug)]
pub struct MetadataFile {
    path: PathBuf,
}

impl MetadataFile {
    /// Metadata read from `path` when fetched.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        MetadataFile {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl CalibrationSource for MetadataFile {
    fn fetch(&self) -> Result<SensorMetadata, Error> {
        let file = File::open(&self.path)?;
        SensorMetadata::from_reader(BufReader::new(file))
    }
}

/// Immutable beam geometry with angles in radians.
#[derive(Clone, Debug, PartialEq)]
pub struct Calibration {
    altitude: Vec<f64>,
    azimuth: Vec<f64>,
    mode: LidarMode,
    hostname: String,
    imu_to_sensor: [f64; 16],
    lidar_to_sensor: [f64; 16],
}

impl Default for Calibration {
    fn default() -> Self {
        Calibration {
            altitude: to_radians(&DEFAULT_BEAM_ALTITUDE_ANGLES),
            azimuth: to_radians(&DEFAULT_BEAM_AZIMUTH_ANGLES),
            mode: LidarMode::default(),
            hostname: DEFAULT_HOSTNAME.to_string(),
            imu_to_sensor: DEFAULT_IMU_TO_SENSOR_TRANSFORM,
            lidar_to_sensor: DEFAULT_LIDAR_TO_SENSOR_TRANSFORM,
        }
    }
}

impl Calibration {
    /// Builds the calibration from beam angles in degrees.
    pub fn from_degrees(altitude: &[f64], azimuth: &[f64]) -> Result<Calibration, Error> {
        if altitude.len() != PIXELS_PER_COLUMN || azimuth.len() != PIXELS_PER_COLUMN {
            return Err(Error::BeamCount(altitude.len(), azimuth.len()));
        }

        Ok(Calibration {
            altitude: to_radians(altitude),
            azimuth: to_radians(azimuth),
            ..Default::default()
        })
    }

    /// Builds the calibration from a metadata document, validating the beam
    /// tables, transforms and lidar mode.
    pub fn from_metadata(metadata: &SensorMetadata) -> Result<Calibration, Error> {
        let mut calibration = Calibration::from_degrees(
            &metadata.beam_altitude_angles,
            &metadata.beam_azimuth_angles,
        )?;
        calibration.mode = metadata.lidar_mode.parse()?;
        calibration.hostname = metadata.hostname.clone();
        calibration.imu_to_sensor = transform(&metadata.imu_to_sensor_transform)?;
        calibration.lidar_to_sensor = transform(&metadata.lidar_to_sensor_transform)?;
        Ok(calibration)
    }

    /// Queries the source once, falling back to the built-in table when the
    /// source is unavailable or its metadata is unusable.
    #[instrument(skip_all)]
    pub fn load<S: CalibrationSource + ?Sized>(source: &S) -> Calibration {
        match source.fetch().and_then(|metadata| Calibration::from_metadata(&metadata)) {
            Ok(calibration) => {
                info!("read sensor info from metadata");
                calibration
            }
            Err(err) => {
                warn!("sensor metadata unavailable ({}), revert to default", err);
                Calibration::default()
            }
        }
    }

    /// Beam altitude angles in radians, row 0 is the topmost beam.
    pub fn altitude(&self) -> &[f64] {
        &self.altitude
    }

    /// Beam azimuth offsets in radians.
    pub fn azimuth(&self) -> &[f64] {
        &self.azimuth
    }

    /// Number of beams, the raster row count.
    pub fn beams(&self) -> usize {
        self.altitude.len()
    }

    /// Lidar mode reported by the sensor.
    pub fn mode(&self) -> LidarMode {
        self.mode
    }

    /// Hostname reported by the sensor.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Row-major 4x4 IMU to sensor transform, translation in millimeters.
    pub fn imu_to_sensor(&self) -> &[f64; 16] {
        &self.imu_to_sensor
    }

    /// Row-major 4x4 lidar to sensor transform, translation in millimeters.
    pub fn lidar_to_sensor(&self) -> &[f64; 16] {
        &self.lidar_to_sensor
    }
}

fn to_radians(degrees: &[f64]) -> Vec<f64> {
    degrees.iter().map(|deg| deg.to_radians()).collect()
}

fn transform(values: &[f64]) -> Result<[f64; 16], Error> {
    values
        .try_into()
        .map_err(|_| Error::TransformSize(values.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unreachable;

    impl CalibrationSource for Unreachable {
        fn fetch(&self) -> Result<SensorMetadata, Error> {
            Err(Error::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "sensor not reachable",
            )))
        }
    }

    const METADATA: &str = r#"{
        "hostname": "os1-991900123456.local",
        "lidar_mode": "2048x10",
        "beam_altitude_angles": [
            16.611, 16.084, 15.557, 15.029, 14.502, 13.975, 13.447, 12.92,
            12.393, 11.865, 11.338, 10.811, 10.283, 9.756, 9.229, 8.701,
            8.174, 7.646, 7.119, 6.592, 6.064, 5.537, 5.01, 4.482,
            3.955, 3.428, 2.9, 2.373, 1.846, 1.318, 0.791, 0.264,
            -0.264, -0.791, -1.318, -1.846, -2.373, -2.9, -3.428, -3.955,
            -4.482, -5.01, -5.537, -6.064, -6.592, -7.119, -7.646, -8.174,
            -8.701, -9.229, -9.756, -10.283, -10.811, -11.338, -11.865, -12.393,
            -12.92, -13.447, -13.975, -14.502, -15.029, -15.557, -16.084, -90.0
        ],
        "beam_azimuth_angles": [
            180.0, 1.055, -1.055, -3.164, 3.164, 1.055, -1.055, -3.164,
            3.164, 1.055, -1.055, -3.164, 3.164, 1.055, -1.055, -3.164,
            3.164, 1.055, -1.055, -3.164, 3.164, 1.055, -1.055, -3.164,
            3.164, 1.055, -1.055, -3.164, 3.164, 1.055, -1.055, -3.164,
            3.164, 1.055, -1.055, -3.164, 3.164, 1.055, -1.055, -3.164,
            3.164, 1.055, -1.055, -3.164, 3.164, 1.055, -1.055, -3.164,
            3.164, 1.055, -1.055, -3.164, 3.164, 1.055, -1.055, -3.164,
            3.164, 1.055, -1.055, -3.164, 3.164, 1.055, -1.055, -3.164
        ]
    }"#;

    #[test]
    fn test_default_radians() {
        let calibration = Calibration::default();
        assert_eq!(calibration.beams(), PIXELS_PER_COLUMN);
        assert!((calibration.altitude()[0] - 16.611f64.to_radians()).abs() < 1e-12);
        assert!((calibration.azimuth()[3] - (-3.164f64).to_radians()).abs() < 1e-12);
        assert_eq!(calibration.hostname(), DEFAULT_HOSTNAME);
        assert_eq!(calibration.mode(), LidarMode::Mode1024x10);
    }

    #[test]
    fn test_metadata() {
        let metadata = SensorMetadata::from_reader(METADATA.as_bytes()).unwrap();
        let calibration = Calibration::from_metadata(&metadata).unwrap();

        assert_eq!(calibration.hostname(), "os1-991900123456.local");
        assert_eq!(calibration.mode(), LidarMode::Mode2048x10);
        assert_eq!(calibration.mode().columns(), 2048);
        assert!((calibration.altitude()[63] + std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        assert!((calibration.azimuth()[0] - std::f64::consts::PI).abs() < 1e-12);
        // Transforms fall back to the defaults when absent.
        assert_eq!(calibration.lidar_to_sensor(), &DEFAULT_LIDAR_TO_SENSOR_TRANSFORM);
        assert_eq!(calibration.imu_to_sensor(), &DEFAULT_IMU_TO_SENSOR_TRANSFORM);
    }

    #[test]
    fn test_beam_count() {
        let metadata = SensorMetadata {
            beam_altitude_angles: vec![0.0; 16],
            ..Default::default()
        };
        assert!(matches!(
            Calibration::from_metadata(&metadata),
            Err(Error::BeamCount(16, 64))
        ));
    }

    #[test]
    fn test_unknown_mode() {
        let metadata = SensorMetadata {
            lidar_mode: "4096x5".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            Calibration::from_metadata(&metadata),
            Err(Error::UnknownLidarMode(_))
        ));
    }

    #[test]
    fn test_fallback() {
        assert_eq!(Calibration::load(&Unreachable), Calibration::default());

        let missing = MetadataFile::new("/nonexistent/sensor_metadata.json");
        assert_eq!(Calibration::load(&missing), Calibration::default());
    }

    #[test]
    fn test_mode_names() {
        for name in ["512x10", "512x20", "1024x10", "1024x20", "2048x10"] {
            let mode: LidarMode = name.parse().unwrap();
            assert_eq!(mode.to_string(), name);
        }
    }
}
