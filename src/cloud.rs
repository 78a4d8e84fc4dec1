// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Projection of a range image into a Cartesian point cloud.
//!
//! For a cell with range `d`, beam altitude `phi` and azimuth `theta`:
//!
//! ```text
//! x = d * cos(phi) * cos(theta)
//! y = Y_AXIS_SIGN * d * cos(phi) * sin(theta)
//! z = d * sin(phi)
//! ```

use crate::{
    calibration::Calibration,
    raster::{Raster, AZIMUTH, RANGE, REFLECTIVITY},
};
use tracing::instrument;

/// The sensor measures azimuth clockwise while the published frame is
/// right-handed with y to the left, so the y axis is mirrored.
pub const Y_AXIS_SIGN: f64 = -1.0;

/// One point in meters, with the reflectivity as intensity.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Point {
    /// Forward.
    pub x: f32,
    /// Left.
    pub y: f32,
    /// Up.
    pub z: f32,
    /// Reflectivity of the return.
    pub intensity: f32,
}

impl Point {
    /// Placeholder for a missing return in an organized cloud.
    pub const NAN: Point = Point {
        x: f32::NAN,
        y: f32::NAN,
        z: f32::NAN,
        intensity: f32::NAN,
    };

    /// True for the missing return placeholder.
    pub fn is_nan(&self) -> bool {
        self.x.is_nan() && self.y.is_nan() && self.z.is_nan() && self.intensity.is_nan()
    }
}

/// Point cloud of one sweep.
///
/// An organized cloud mirrors the raster (`width` columns by `height` beams)
/// and keeps NaN placeholders for missing returns.  An unorganized cloud
/// only holds valid returns with `height` of 1.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointCloud {
    /// Points in row-major order.
    pub points: Vec<Point>,
    /// Raster columns, or the point count when unorganized.
    pub width: usize,
    /// Raster rows, or 1 when unorganized.
    pub height: usize,
    /// Whether placeholders were kept.
    pub organized: bool,
}

impl PointCloud {
    /// Number of points, placeholders included.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True when the cloud holds no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// True when no point is a placeholder.
    pub fn is_dense(&self) -> bool {
        !self.organized || self.points.iter().all(|p| !p.x.is_nan())
    }
}

/// Projects every cell of the raster, in row-major order.  Missing returns
/// become [`Point::NAN`] when `organized` and are skipped otherwise.
#[instrument(skip_all, fields(organized = organized))]
pub fn project(raster: &Raster, calibration: &Calibration, organized: bool) -> PointCloud {
    let rows = raster.rows();
    let cols = raster.cols();
    let range = raster.channel(RANGE);
    let reflectivity = raster.channel(REFLECTIVITY);
    let azimuth = raster.channel(AZIMUTH);

    let mut points = Vec::with_capacity(rows * cols);

    for row in 0..rows {
        // Row 0 is the topmost beam.
        let phi = calibration.altitude()[row];
        let cos_phi = phi.cos();
        let sin_phi = phi.sin();

        for col in 0..cols {
            let d = range[[row, col]];
            if d.is_nan() {
                if organized {
                    points.push(Point::NAN);
                }
                continue;
            }

            let d = d as f64;
            let theta = azimuth[[row, col]] as f64;
            points.push(Point {
                x: (d * cos_phi * theta.cos()) as f32,
                y: (Y_AXIS_SIGN * d * cos_phi * theta.sin()) as f32,
                z: (d * sin_phi) as f32,
                intensity: reflectivity[[row, col]],
            });
        }
    }

    let (width, height) = if organized {
        (cols, rows)
    } else {
        (points.len(), 1)
    };

    PointCloud {
        points,
        width,
        height,
        organized,
    }
}
