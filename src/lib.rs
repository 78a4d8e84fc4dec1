// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! LiDAR Decoder Library
//!
//! This library assembles the fixed-size packets of a rotating multi-beam
//! LiDAR into complete sweeps and publishes each sweep both as a dense range
//! image and as a point cloud.
//!
//! ```text
//! packet ─► PacketView ─► FrameAccumulator ─► build_raster ─► project
//!                                                  │              │
//!                                                  ▼              ▼
//!                                            Image + CameraInfo  PointCloud2
//! ```
//!
//! # Features
//!
//! - **Packet Decoding** - Zero-copy, bounds-checked views over the packet
//! - **Sweep Assembly** - Packet accumulation up to the configured width
//! - **Range Image** - Range, reflectivity and azimuth per beam and column
//! - **Point Cloud** - Organized or unorganized Cartesian projection
//! - **Zenoh Publishing** - ROS2-compatible message publishing

#![warn(missing_docs)]

/// Sweep accumulation
pub mod accumulator;

/// Beam calibration and sensor metadata
pub mod calibration;

/// Point cloud projection
pub mod cloud;

/// Common utilities
pub mod common;

/// Runtime configuration
pub mod config;

/// Event driven decoding pipeline
pub mod decoder;

/// ROS2 message formatting
pub mod format;

/// LiDAR packet layout
pub mod packet;

/// Range image construction
pub mod raster;

pub use calibration::Calibration;
pub use cloud::{Point, PointCloud};
pub use config::RuntimeConfig;
pub use decoder::{Decoder, Event, Sweep};
pub use packet::{DecodeError, Packet, PacketView};
pub use raster::Raster;
