// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    calibration::Calibration,
    packet::{Packet, COLUMNS_PER_PACKET},
};
use ndarray::{s, Array3, ArrayView2, Axis};
use tracing::{debug, instrument};

/// Raw range units (millimeters) to meters.
pub const RANGE_SCALE: f32 = 0.001;

/// Channel of the range in meters.
pub const RANGE: usize = 0;
/// Channel of the reflectivity.
pub const REFLECTIVITY: usize = 1;
/// Channel of the azimuth in radians.
pub const AZIMUTH: usize = 2;
/// Channels per raster cell.
pub const CHANNELS: usize = 3;

/// Dense range image of one sweep, one row per beam and one column per
/// azimuth block.  Each cell holds [range (m), reflectivity, azimuth (rad)];
/// missing returns are NaN in all three channels.
#[derive(Clone, Debug, PartialEq)]
pub struct Raster {
    data: Array3<f32>,
}

impl Raster {
    /// Creates a raster with every cell set to the no-return sentinel.
    pub fn new(rows: usize, cols: usize) -> Self {
        Raster {
            data: Array3::from_elem((rows, cols, CHANNELS), f32::NAN),
        }
    }

    /// Number of beams.
    pub fn rows(&self) -> usize {
        self.data.shape()[0]
    }

    /// Number of columns, the sweep width.
    pub fn cols(&self) -> usize {
        self.data.shape()[1]
    }

    /// Returns the [range, reflectivity, azimuth] triple of a cell.
    #[inline]
    pub fn cell(&self, row: usize, col: usize) -> [f32; CHANNELS] {
        [
            self.data[[row, col, RANGE]],
            self.data[[row, col, REFLECTIVITY]],
            self.data[[row, col, AZIMUTH]],
        ]
    }

    /// Returns one channel as a rows x cols view.
    pub fn channel(&self, channel: usize) -> ArrayView2<'_, f32> {
        self.data.index_axis(Axis(2), channel)
    }

    /// Number of cells holding a return.
    pub fn valid_cells(&self) -> usize {
        self.channel(RANGE).iter().filter(|r| !r.is_nan()).count()
    }

    /// The rows x cols x channels array.
    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    /// Row-major interleaved cell data.
    pub fn into_raw_vec(self) -> Vec<f32> {
        self.data.into_raw_vec_and_offset().0
    }
}

/// Builds the raster of one sweep from the packets in arrival order.
///
/// Packet `i`, column `j` lands in raster column `i * COLUMNS_PER_PACKET + j`.
/// Invalid columns stay entirely NaN and columns beyond `width` are dropped.
#[instrument(skip_all, fields(packets = packets.len(), width = width))]
pub fn build_raster(packets: &[Packet], width: usize, calibration: &Calibration) -> Raster {
    let mut raster = Raster::new(calibration.beams(), width);
    let azimuth = calibration.azimuth();

    for (ibuf, packet) in packets.iter().enumerate() {
        for (icol, column) in packet.view().columns().enumerate() {
            let col = ibuf * COLUMNS_PER_PACKET + icol;
            if col >= width {
                break;
            }

            // An invalid column also zeroes its measurements so nothing is
            // written, keeping every cell of the column at NaN.
            if !column.is_valid() {
                debug!(
                    "invalid column {} (measurement {})",
                    col,
                    column.measurement_id()
                );
                continue;
            }

            let theta0 = column.h_angle();
            for (ipx, pixel) in column.pixels().enumerate() {
                let mut cell = raster.data.slice_mut(s![ipx, col, ..]);
                cell[RANGE] = pixel.range() as f32 * RANGE_SCALE;
                cell[REFLECTIVITY] = pixel.reflectivity() as f32;
                cell[AZIMUTH] = (theta0 + azimuth[ipx]) as f32;
            }
        }
    }

    raster
}
