// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Conversion of sweeps into ROS2 sensor messages.

use crate::{
    calibration::Calibration,
    cloud::PointCloud,
    raster::{Raster, CHANNELS},
};
use edgefirst_schemas::{
    sensor_msgs::{CameraInfo, Image, PointCloud2, PointField, RegionOfInterest},
    std_msgs::Header,
};
use tracing::instrument;

/// `sensor_msgs/PointField` datatype codes.
#[derive(Debug)]
#[allow(dead_code, missing_docs)]
pub enum PointFieldType {
    INT8 = 1,
    UINT8 = 2,
    INT16 = 3,
    UINT16 = 4,
    INT32 = 5,
    UINT32 = 6,
    FLOAT32 = 7,
    FLOAT64 = 8,
}

/// Image encoding of the range image, three float channels per pixel.
pub const RASTER_ENCODING: &str = "32FC3";

const POINT_STEP: u32 = 16;

/// Formats the cloud as x, y, z, intensity float32 fields.
#[instrument(skip_all, fields(points = cloud.len()))]
pub fn format_cloud(cloud: &PointCloud, header: Header) -> PointCloud2 {
    let data: Vec<u8> = cloud
        .points
        .iter()
        .flat_map(|p| [p.x, p.y, p.z, p.intensity])
        .flat_map(|elem| elem.to_ne_bytes())
        .collect();

    let fields = ["x", "y", "z", "intensity"]
        .iter()
        .enumerate()
        .map(|(i, name)| PointField {
            name: name.to_string(),
            offset: 4 * i as u32,
            datatype: PointFieldType::FLOAT32 as u8,
            count: 1,
        })
        .collect();

    PointCloud2 {
        header,
        height: cloud.height as u32,
        width: cloud.width as u32,
        fields,
        is_bigendian: cfg!(target_endian = "big"),
        point_step: POINT_STEP,
        row_step: POINT_STEP * cloud.width as u32,
        data,
        is_dense: cloud.is_dense(),
    }
}

/// Formats the raster as a rows x cols image of [range, reflectivity,
/// azimuth] float triples.
#[instrument(skip_all)]
pub fn format_raster(raster: &Raster, header: Header) -> Image {
    let height = raster.rows() as u32;
    let width = raster.cols() as u32;
    let data: Vec<u8> = raster
        .data()
        .iter()
        .flat_map(|elem| elem.to_ne_bytes())
        .collect();

    Image {
        header,
        height,
        width,
        encoding: RASTER_ENCODING.to_string(),
        is_bigendian: cfg!(target_endian = "big") as u8,
        step: width * (CHANNELS * std::mem::size_of::<f32>()) as u32,
        data,
    }
}

/// Camera info accompanying the raster, `d` carries the beam altitude
/// angles in radians from the topmost row down.
pub fn format_camera_info(raster: &Raster, calibration: &Calibration, header: Header) -> CameraInfo {
    CameraInfo {
        header,
        height: raster.rows() as u32,
        width: raster.cols() as u32,
        distortion_model: String::new(),
        d: calibration.altitude().to_vec(),
        k: [0.0; 9],
        r: [0.0; 9],
        p: [0.0; 12],
        binning_x: 0,
        binning_y: 0,
        roi: RegionOfInterest {
            x_offset: 0,
            y_offset: 0,
            height: 0,
            width: 0,
            do_rectify: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cloud::{project, Point},
        packet::{testing::uniform_packet, Packet, PIXELS_PER_COLUMN},
        raster::build_raster,
    };
    use edgefirst_schemas::builtin_interfaces::Time;

    fn header() -> Header {
        Header {
            stamp: Time { sec: 1, nanosec: 2 },
            frame_id: "lidar".to_string(),
        }
    }

    fn raster() -> (Raster, Calibration) {
        let calibration = Calibration::default();
        let packet = Packet::new(uniform_packet(0, 1234, 56)).unwrap();
        (build_raster(&[packet], 32, &calibration), calibration)
    }

    #[test]
    fn test_format_cloud() {
        let (raster, calibration) = raster();
        let cloud = project(&raster, &calibration, true);
        let msg = format_cloud(&cloud, header());

        assert_eq!(msg.width, 32);
        assert_eq!(msg.height, PIXELS_PER_COLUMN as u32);
        assert_eq!(msg.data.len(), cloud.len() * POINT_STEP as usize);
        assert_eq!(msg.row_step, 32 * POINT_STEP);
        assert!(!msg.is_dense);

        let names: Vec<_> = msg.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["x", "y", "z", "intensity"]);

        let intensity = f32::from_ne_bytes(msg.data[12..16].try_into().unwrap());
        assert_eq!(intensity, 56.0);
    }

    #[test]
    fn test_format_unorganized() {
        let cloud = PointCloud {
            points: vec![Point::default(); 5],
            width: 5,
            height: 1,
            organized: false,
        };
        let msg = format_cloud(&cloud, header());
        assert_eq!(msg.width, 5);
        assert_eq!(msg.height, 1);
        assert!(msg.is_dense);
    }

    #[test]
    fn test_format_raster() {
        let (raster, calibration) = raster();
        let image = format_raster(&raster, header());
        assert_eq!(image.encoding, RASTER_ENCODING);
        assert_eq!(image.step, 32 * 12);
        assert_eq!(image.data.len(), (image.step * image.height) as usize);

        let range = f32::from_ne_bytes(image.data[0..4].try_into().unwrap());
        assert!((range - 1.234).abs() < 1e-6);
        // Column 16 onwards was never received.
        let offset = 16 * 12;
        let missing = f32::from_ne_bytes(image.data[offset..offset + 4].try_into().unwrap());
        assert!(missing.is_nan());

        let info = format_camera_info(&raster, &calibration, header());
        assert_eq!(info.width, image.width);
        assert_eq!(info.height, image.height);
        assert_eq!(info.d, calibration.altitude());
    }
}
