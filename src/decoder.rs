// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! The decoding pipeline: packets in, range image and point cloud out.
//!
//! The decoder is driven by a single consumer which hands it [`Event`]s in
//! arrival order.  Each event is processed to completion before the next so
//! a reconfiguration can never interleave with a sweep in progress.

use crate::{
    accumulator::FrameAccumulator,
    calibration::Calibration,
    cloud::{project, PointCloud},
    config::RuntimeConfig,
    packet::{DecodeError, Packet, IMU_PACKET_SIZE},
    raster::{build_raster, Raster},
};
use std::sync::Arc;
use tracing::{info, instrument, trace, warn};

/// Input events of the decoder.
#[derive(Clone, Debug)]
pub enum Event {
    /// One raw lidar packet.
    LidarPacket(Vec<u8>),
    /// Accepted but not decoded.
    ImuPacket(Vec<u8>),
    /// Requested runtime configuration, normalized on receipt.
    Reconfigure(RuntimeConfig),
}

/// Outputs of one completed sweep.
#[derive(Clone, Debug)]
pub struct Sweep {
    /// Range image, beams by sweep width.
    pub raster: Raster,
    /// Projection of the range image.
    pub cloud: PointCloud,
    /// Frame id reported by the first valid column of the sweep.
    pub frame_id: Option<u16>,
}

/// Owns the sweep in progress and the current runtime configuration.
pub struct Decoder {
    calibration: Arc<Calibration>,
    config: RuntimeConfig,
    accumulator: FrameAccumulator,
}

impl Decoder {
    /// Creates a decoder with the normalized `config` and no sweep in
    /// progress.
    pub fn new(calibration: Arc<Calibration>, config: RuntimeConfig) -> Self {
        let config = config.normalized();
        info!("decoder config: {}", config);

        Decoder {
            calibration,
            accumulator: FrameAccumulator::new(config.sweep_width),
            config,
        }
    }

    /// The shared calibration, identical for the lifetime of the decoder.
    pub fn calibration(&self) -> &Arc<Calibration> {
        &self.calibration
    }

    /// The configuration currently in effect, always normalized.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Packets buffered towards the current sweep.
    pub fn pending(&self) -> usize {
        self.accumulator.len()
    }

    /// Processes one event, returning the sweep it completed if any.
    pub fn handle(&mut self, event: Event) -> Result<Option<Sweep>, DecodeError> {
        match event {
            Event::LidarPacket(data) => self.lidar_packet(data),
            Event::ImuPacket(data) => {
                self.imu_packet(&data);
                Ok(None)
            }
            Event::Reconfigure(config) => {
                self.reconfigure(config);
                Ok(None)
            }
        }
    }

    /// A malformed packet is rejected without touching the buffered sweep.
    #[instrument(skip_all, level = "trace")]
    pub fn lidar_packet(&mut self, data: Vec<u8>) -> Result<Option<Sweep>, DecodeError> {
        let packet = Packet::new(data)?;
        self.accumulator.ingest(packet);

        if !self.accumulator.is_ready() {
            return Ok(None);
        }

        trace!(
            "got enough packets {}, ready to publish",
            self.accumulator.len()
        );
        let packets = self.accumulator.drain();
        Ok(Some(self.sweep(&packets)))
    }

    #[instrument(skip_all, fields(packets = packets.len()))]
    fn sweep(&self, packets: &[Packet]) -> Sweep {
        let raster = build_raster(packets, self.config.sweep_width, &self.calibration);
        let cloud = project(&raster, &self.calibration, self.config.organized);
        let frame_id = packets
            .iter()
            .flat_map(|packet| packet.view().columns())
            .find(|column| column.is_valid())
            .map(|column| column.frame_id());

        Sweep {
            raster,
            cloud,
            frame_id,
        }
    }

    /// Motion sensor packets are not decoded.
    pub fn imu_packet(&mut self, data: &[u8]) {
        if data.len() < IMU_PACKET_SIZE {
            warn!("short imu packet: {} bytes", data.len());
        } else {
            trace!("imu packet: {} bytes", data.len());
        }
    }

    /// Applies a new runtime configuration and discards any partial sweep.
    /// Returns the configuration as normalized.
    pub fn reconfigure(&mut self, requested: RuntimeConfig) -> RuntimeConfig {
        let config = requested.normalized();
        if config != requested {
            info!("reconfigure request adjusted: {} => {}", requested, config);
        }
        info!("reconfigure request: {}", config);

        self.config = config;
        self.accumulator.reset(config.sweep_width);
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{
        testing::{uniform_packet, PacketWriter},
        COLUMNS_PER_PACKET, PACKET_SIZE, PIXELS_PER_COLUMN,
    };

    fn decoder(sweep_width: usize, organized: bool) -> Decoder {
        Decoder::new(
            Arc::new(Calibration::default()),
            RuntimeConfig {
                sweep_width,
                organized,
                ..Default::default()
            },
        )
    }

    fn feed(decoder: &mut Decoder, packets: usize) -> Vec<Sweep> {
        (0..packets)
            .filter_map(|i| {
                let data = uniform_packet((i * COLUMNS_PER_PACKET) as u16, 2000, 9);
                decoder.handle(Event::LidarPacket(data)).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_sweep() {
        let mut decoder = decoder(64, true);
        let sweeps = feed(&mut decoder, 9);
        assert_eq!(sweeps.len(), 2);
        assert_eq!(decoder.pending(), 1);

        for sweep in &sweeps {
            assert_eq!(sweep.raster.rows(), PIXELS_PER_COLUMN);
            assert_eq!(sweep.raster.cols(), 64);
            assert_eq!(sweep.cloud.len(), PIXELS_PER_COLUMN * 64);
            assert_eq!(sweep.frame_id, Some(0));
        }
    }

    #[test]
    fn test_malformed_packet() {
        let mut decoder = decoder(32, false);
        feed(&mut decoder, 1);

        let result = decoder.handle(Event::LidarPacket(vec![0; PACKET_SIZE / 2]));
        assert_eq!(
            result.unwrap_err(),
            DecodeError::UnexpectedEndOfSlice(PACKET_SIZE / 2)
        );
        let result = decoder.handle(Event::LidarPacket(vec![0; PACKET_SIZE + 4]));
        assert_eq!(
            result.unwrap_err(),
            DecodeError::TrailingBytes(PACKET_SIZE + 4)
        );
        // The partial sweep survives the rejected packets.
        assert_eq!(decoder.pending(), 1);
        assert_eq!(feed(&mut decoder, 1).len(), 1);
    }

    #[test]
    fn test_reconfigure_resets() {
        let mut decoder = decoder(64, true);
        feed(&mut decoder, 3);
        assert_eq!(decoder.pending(), 3);

        let config = decoder.reconfigure(RuntimeConfig {
            min_range: 10.0,
            max_range: 5.0,
            sweep_width: 100,
            organized: false,
        });
        assert_eq!(config.sweep_width, 96);
        assert_eq!(config.min_range, 5.0);
        assert_eq!(decoder.pending(), 0);
        assert_eq!(decoder.config(), &config);

        let sweeps = feed(&mut decoder, 6);
        assert_eq!(sweeps.len(), 1);
        assert_eq!(sweeps[0].raster.cols(), 96);
        assert_eq!(sweeps[0].cloud.height, 1);
    }

    #[test]
    fn test_calibration_untouched() {
        let calibration = Arc::new(Calibration::default());
        let mut decoder = Decoder::new(calibration.clone(), RuntimeConfig::default());

        for width in [100, 3, 4096, 512, 100] {
            decoder.handle(Event::Reconfigure(RuntimeConfig {
                sweep_width: width,
                ..Default::default()
            }))
            .unwrap();
        }

        assert_eq!(decoder.calibration().as_ref(), calibration.as_ref());
        assert_eq!(decoder.calibration().altitude(), Calibration::default().altitude());
    }

    #[test]
    fn test_imu_ignored() {
        let mut decoder = decoder(16, true);
        assert!(decoder
            .handle(Event::ImuPacket(vec![0; IMU_PACKET_SIZE]))
            .unwrap()
            .is_none());
        assert!(decoder.handle(Event::ImuPacket(vec![])).unwrap().is_none());
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_invalid_sweep() {
        let mut decoder = decoder(16, true);
        let data = PacketWriter::new().finish();
        let sweep = decoder
            .handle(Event::LidarPacket(data))
            .unwrap()
            .expect("sweep");

        assert_eq!(sweep.raster.valid_cells(), 0);
        assert_eq!(sweep.cloud.len(), PIXELS_PER_COLUMN * 16);
        assert!(sweep.cloud.points.iter().all(|p| p.is_nan()));
        assert_eq!(sweep.frame_id, None);
    }
}
