// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use std::path::PathBuf;

use clap::{ArgAction, Parser};
use lidardecoder::RuntimeConfig;
use serde_json::json;
use tracing::level_filters::LevelFilter;
use zenoh::config::{Config, WhatAmI};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Sensor metadata JSON with the beam altitude and azimuth angles.  The
    /// built-in calibration is used when absent or unreadable.
    #[arg(long, env)]
    pub calibration: Option<PathBuf>,

    /// Minimum range in meters, clamped to the maximum range.
    #[arg(long, env, default_value = "0.0")]
    pub min_range: f64,

    /// Maximum range in meters.
    #[arg(long, env, default_value = "120.0")]
    pub max_range: f64,

    /// Columns per published sweep, rounded down to a multiple of the
    /// columns per packet.
    #[arg(long, env, default_value = "1024")]
    pub sweep_width: usize,

    /// Publish organized point clouds, keeping NaN points for missing returns.
    #[arg(long, env, default_value = "true", action = ArgAction::Set)]
    pub organized: bool,

    /// lidar frame transform vector from base_link
    #[arg(
        long,
        env,
        default_value = "0 0 0",
        value_delimiter = ' ',
        num_args = 3
    )]
    pub lidar_tf_vec: Vec<f64>,

    /// lidar frame transform quaternion from base_link
    #[arg(
        long,
        env,
        default_value = "0 0 0 1",
        value_delimiter = ' ',
        num_args = 4
    )]
    pub lidar_tf_quat: Vec<f64>,

    /// The name of the base frame
    #[arg(long, env, default_value = "base_link")]
    pub base_frame_id: String,

    /// The name of the lidar frame
    #[arg(long, env, default_value = "lidar")]
    pub lidar_frame_id: String,

    /// lidar packets topic name
    #[arg(long, default_value = "rt/lidar/packets")]
    pub packets_topic: String,

    /// imu packets topic name
    #[arg(long, default_value = "rt/lidar/imu_packets")]
    pub imu_packets_topic: String,

    /// runtime configuration topic name, JSON encoded
    #[arg(long, default_value = "rt/lidar/config")]
    pub config_topic: String,

    /// range image topic name
    #[arg(long, default_value = "rt/lidar/image")]
    pub image_topic: String,

    /// range image camera info topic name
    #[arg(long, default_value = "rt/lidar/camera_info")]
    pub camera_info_topic: String,

    /// point cloud topic name
    #[arg(long, default_value = "rt/lidar/points")]
    pub points_topic: String,

    /// Application log level
    #[arg(long, env, default_value = "info")]
    pub rust_log: LevelFilter,

    /// Enable Tracy profiler broadcast
    #[arg(long, env)]
    pub tracy: bool,

    /// zenoh connection mode
    #[arg(long, env, default_value = "peer")]
    mode: WhatAmI,

    /// connect to zenoh endpoints
    #[arg(long, env)]
    connect: Vec<String>,

    /// listen to zenoh endpoints
    #[arg(long, env)]
    listen: Vec<String>,

    /// disable zenoh multicast scouting
    #[arg(long, env)]
    no_multicast_scouting: bool,
}

impl Args {
    /// The runtime configuration requested on the command line.
    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            min_range: self.min_range,
            max_range: self.max_range,
            sweep_width: self.sweep_width,
            organized: self.organized,
        }
    }
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        let mut config = Config::default();

        config
            .insert_json5("mode", &json!(args.mode).to_string())
            .unwrap();

        if !args.connect.is_empty() {
            config
                .insert_json5("connect/endpoints", &json!(args.connect).to_string())
                .unwrap();
        }

        if !args.listen.is_empty() {
            config
                .insert_json5("listen/endpoints", &json!(args.listen).to_string())
                .unwrap();
        }

        if args.no_multicast_scouting {
            config
                .insert_json5("scouting/multicast/enabled", &json!(false).to_string())
                .unwrap();
        }

        config
            .insert_json5("scouting/multicast/interface", &json!("lo").to_string())
            .unwrap();

        config
    }
}
