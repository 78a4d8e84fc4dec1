// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::packet::COLUMNS_PER_PACKET;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Runtime parameters which may be changed while the decoder is running.
///
/// Requests are accepted as-is and brought into range by
/// [`RuntimeConfig::normalized`] rather than rejected.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Minimum range in meters, never above `max_range`.
    pub min_range: f64,
    /// Maximum range in meters.
    pub max_range: f64,
    /// Columns per published sweep, a multiple of the packet column count.
    pub sweep_width: usize,
    /// Keep NaN placeholders so the cloud mirrors the raster layout.
    pub organized: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            min_range: 0.0,
            max_range: 120.0,
            sweep_width: 1024,
            organized: true,
        }
    }
}

impl RuntimeConfig {
    /// Clamps `min_range` to `max_range` and rounds `sweep_width` down to a
    /// whole number of packets.
    ///
    /// Unlike plain rounding down, a width below one packet becomes one
    /// packet.  A zero width would complete an empty sweep on every packet.
    pub fn normalized(self) -> RuntimeConfig {
        let sweep_width = (self.sweep_width / COLUMNS_PER_PACKET).max(1) * COLUMNS_PER_PACKET;

        RuntimeConfig {
            min_range: self.min_range.min(self.max_range),
            max_range: self.max_range,
            sweep_width,
            organized: self.organized,
        }
    }
}

/// A partial reconfiguration request, absent fields keep their value.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    /// New minimum range in meters.
    pub min_range: Option<f64>,
    /// New maximum range in meters.
    pub max_range: Option<f64>,
    /// New sweep width in columns.
    pub sweep_width: Option<usize>,
    /// New organized setting.
    pub organized: Option<bool>,
}

impl RuntimeConfig {
    /// Overlays the fields present in `update`.
    pub fn apply(self, update: &ConfigUpdate) -> RuntimeConfig {
        RuntimeConfig {
            min_range: update.min_range.unwrap_or(self.min_range),
            max_range: update.max_range.unwrap_or(self.max_range),
            sweep_width: update.sweep_width.unwrap_or(self.sweep_width),
            organized: update.organized.unwrap_or(self.organized),
        }
    }
}

impl fmt::Display for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "min_range: {}, max_range: {}, sweep_width: {}, organized: {}",
            self.min_range, self.max_range, self.sweep_width, self.organized
        )
    }
}
