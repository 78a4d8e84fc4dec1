// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::{ArgAction, Parser};
use lidardecoder::{
    calibration::{Calibration, MetadataFile},
    packet::PACKET_SIZE,
    Decoder, Event, RuntimeConfig, Sweep,
};
use log::{error, info, warn};
use std::{fs::File, io::Read, path::Path, path::PathBuf, sync::Arc};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Recording to replay, raw lidar packets back to back unless --pcap.
    #[arg()]
    input: PathBuf,

    /// Read the input as a pcapng capture of the sensor UDP traffic.
    #[cfg(feature = "pcap")]
    #[arg(long)]
    pcap: bool,

    /// UDP port of the lidar packets within a pcap capture.
    #[cfg(feature = "pcap")]
    #[arg(long, default_value = "7502")]
    lidar_port: u16,

    /// UDP port of the IMU packets within a pcap capture.
    #[cfg(feature = "pcap")]
    #[arg(long, default_value = "7503")]
    imu_port: u16,

    /// Sensor metadata JSON with the beam altitude and azimuth angles.
    #[arg(long)]
    calibration: Option<PathBuf>,

    /// Columns per sweep, rounded down to a multiple of the columns per packet.
    #[arg(long, default_value = "1024")]
    sweep_width: usize,

    /// Keep NaN points for missing returns.
    #[arg(long, default_value = "true", action = ArgAction::Set)]
    organized: bool,

    /// Save Numpy files of the range image to this directory, one per sweep.
    #[cfg(feature = "npy")]
    #[arg(short, long)]
    numpy: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let calibration = match &args.calibration {
        Some(path) => Calibration::load(&MetadataFile::new(path)),
        None => Calibration::default(),
    };
    info!(
        "replaying {} with {} calibration",
        args.input.display(),
        calibration.hostname()
    );

    let config = RuntimeConfig {
        sweep_width: args.sweep_width,
        organized: args.organized,
        ..Default::default()
    };
    #[allow(unused_mut)]
    let mut replay = Replay::new(Decoder::new(Arc::new(calibration), config));

    #[cfg(feature = "npy")]
    if let Some(numpy) = &args.numpy {
        std::fs::create_dir_all(numpy)?;
        replay.numpy = Some(numpy.clone());
    }

    #[cfg(feature = "pcap")]
    if args.pcap {
        replay.pcap(&args.input, args.lidar_port, args.imu_port)?;
        replay.finish();
        return Ok(());
    }

    replay.raw(&args.input)?;
    replay.finish();

    Ok(())
}

struct Replay {
    decoder: Decoder,
    sweeps: usize,
    #[cfg(feature = "pcap")]
    defrag: etherparse::defrag::IpDefragPool<(), ()>,
    #[cfg(feature = "npy")]
    numpy: Option<PathBuf>,
}

impl Replay {
    fn new(decoder: Decoder) -> Self {
        Replay {
            decoder,
            sweeps: 0,
            #[cfg(feature = "pcap")]
            defrag: etherparse::defrag::IpDefragPool::new(),
            #[cfg(feature = "npy")]
            numpy: None,
        }
    }

    /// Feeds a raw recording of packets stored back to back.
    fn raw(&mut self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let mut file = File::open(path)?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;

        if buf.len() % PACKET_SIZE != 0 {
            warn!(
                "{} trailing bytes do not form a complete packet",
                buf.len() % PACKET_SIZE
            );
        }

        for chunk in buf.chunks(PACKET_SIZE) {
            self.event(Event::LidarPacket(chunk.to_vec()))?;
        }

        Ok(())
    }

    /// Feeds the UDP payloads of a pcapng capture, other traffic is skipped.
    #[cfg(feature = "pcap")]
    fn pcap(
        &mut self,
        path: &Path,
        lidar_port: u16,
        imu_port: u16,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let file = File::open(path)?;

        for cap in pcarp::Capture::new(file) {
            let cap = cap?;
            self.frame(&cap.data, lidar_port, imu_port)?;
        }

        Ok(())
    }

    /// Handles one captured ethernet frame.  Lidar packets are larger than
    /// the link MTU so their datagrams arrive as IP fragments which are
    /// reassembled before the port is matched.
    #[cfg(feature = "pcap")]
    fn frame(
        &mut self,
        data: &[u8],
        lidar_port: u16,
        imu_port: u16,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let pkt = match etherparse::SlicedPacket::from_ethernet(data) {
            Ok(pkt) => pkt,
            Err(err) => {
                error!("Err {:?}", err);
                return Ok(());
            }
        };

        let datagram = match self.defrag.process_sliced_packet(&pkt, (), ()) {
            Ok(Some(ip)) if ip.ip_number == etherparse::IpNumber::UDP => {
                match etherparse::UdpSlice::from_slice(&ip.payload) {
                    Ok(udp) => Some((udp.destination_port(), udp.payload().to_vec())),
                    Err(err) => {
                        warn!("dropping reassembled datagram: {:?}", err);
                        None
                    }
                }
            }
            Ok(Some(_)) => None,
            // Not a fragment, or a fragment of an incomplete datagram.
            Ok(None) => match pkt.transport {
                Some(etherparse::TransportSlice::Udp(udp)) => {
                    Some((udp.destination_port(), udp.payload().to_vec()))
                }
                _ => None,
            },
            Err(err) => {
                warn!("dropping ip fragment: {:?}", err);
                None
            }
        };

        match datagram {
            Some((port, payload)) if port == lidar_port => {
                self.event(Event::LidarPacket(payload))
            }
            Some((port, payload)) if port == imu_port => self.event(Event::ImuPacket(payload)),
            _ => Ok(()),
        }
    }

    fn event(&mut self, event: Event) -> Result<(), Box<dyn std::error::Error>> {
        match self.decoder.handle(event) {
            Ok(Some(sweep)) => self.sweep(sweep)?,
            Ok(None) => (),
            Err(err) => error!("dropping malformed lidar packet: {}", err),
        }
        Ok(())
    }

    fn sweep(&mut self, sweep: Sweep) -> Result<(), Box<dyn std::error::Error>> {
        println!(
            "sweep {} frame {:?} {}x{} returns {} points {}",
            self.sweeps,
            sweep.frame_id,
            sweep.raster.rows(),
            sweep.raster.cols(),
            sweep.raster.valid_cells(),
            sweep.cloud.len(),
        );

        #[cfg(feature = "npy")]
        if let Some(numpy) = &self.numpy {
            ndarray_npy::write_npy(
                numpy.join(format!("sweep_{}.npy", self.sweeps)),
                sweep.raster.data(),
            )?;
        }

        self.sweeps += 1;
        Ok(())
    }

    fn finish(&self) {
        if self.decoder.pending() > 0 {
            info!(
                "{} packets left over from an incomplete sweep of {} columns",
                self.decoder.pending(),
                self.decoder.config().sweep_width
            );
        }
        info!("replayed {} sweeps", self.sweeps);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lidardecoder::packet::COLUMNS_PER_PACKET;

    fn replay() -> Replay {
        Replay::new(Decoder::new(
            Arc::new(Calibration::default()),
            RuntimeConfig {
                sweep_width: COLUMNS_PER_PACKET,
                ..Default::default()
            },
        ))
    }

    #[test]
    fn test_raw() {
        let path = std::env::temp_dir().join(format!("lidarreplay-{}.bin", std::process::id()));
        let mut data = vec![0u8; 2 * PACKET_SIZE];
        data.extend_from_slice(&[0u8; 10]);
        std::fs::write(&path, &data).unwrap();

        let mut replay = replay();
        let result = replay.raw(&path);
        std::fs::remove_file(&path).unwrap();

        result.unwrap();
        // The trailing partial packet is rejected.
        assert_eq!(replay.sweeps, 2);
        assert_eq!(replay.decoder.pending(), 0);
    }

    #[cfg(feature = "pcap")]
    mod pcap {
        use super::*;

        const LIDAR_PORT: u16 = 7502;
        const IMU_PORT: u16 = 7503;
        // Largest multiple of 8 within a 1500 byte MTU.
        const FRAGMENT: usize = 1480;

        fn checksum(header: &[u8]) -> u16 {
            let mut sum: u32 = header
                .chunks(2)
                .map(|w| u16::from_be_bytes([w[0], w[1]]) as u32)
                .sum();
            while sum > 0xFFFF {
                sum = (sum & 0xFFFF) + (sum >> 16);
            }
            !(sum as u16)
        }

        /// Ethernet II + IPv4 frame carrying `payload` at `offset` of the
        /// datagram `id`.
        fn ipv4_frame(id: u16, offset: usize, more: bool, payload: &[u8]) -> Vec<u8> {
            let mut frame = vec![0x02, 0, 0, 0, 0, 0x02, 0x02, 0, 0, 0, 0, 0x01, 0x08, 0x00];

            let mut ip = [0u8; 20];
            ip[0] = 0x45;
            ip[2..4].copy_from_slice(&((ip.len() + payload.len()) as u16).to_be_bytes());
            ip[4..6].copy_from_slice(&id.to_be_bytes());
            let flags = (if more { 0x2000 } else { 0 }) | (offset / 8) as u16;
            ip[6..8].copy_from_slice(&flags.to_be_bytes());
            ip[8] = 64;
            ip[9] = 17;
            ip[12..16].copy_from_slice(&[192, 168, 1, 2]);
            ip[16..20].copy_from_slice(&[192, 168, 1, 100]);
            let sum = checksum(&ip);
            ip[10..12].copy_from_slice(&sum.to_be_bytes());

            frame.extend_from_slice(&ip);
            frame.extend_from_slice(payload);
            frame
        }

        fn udp_datagram(port: u16, payload: &[u8]) -> Vec<u8> {
            let mut datagram = Vec::with_capacity(8 + payload.len());
            datagram.extend_from_slice(&port.to_be_bytes());
            datagram.extend_from_slice(&port.to_be_bytes());
            datagram.extend_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
            datagram.extend_from_slice(&[0, 0]);
            datagram.extend_from_slice(payload);
            datagram
        }

        /// Splits the datagram into MTU sized fragments.
        fn fragments(id: u16, port: u16, payload: &[u8]) -> Vec<Vec<u8>> {
            let datagram = udp_datagram(port, payload);
            let count = datagram.len().div_ceil(FRAGMENT);
            datagram
                .chunks(FRAGMENT)
                .enumerate()
                .map(|(i, chunk)| ipv4_frame(id, i * FRAGMENT, i + 1 < count, chunk))
                .collect()
        }

        #[test]
        fn test_fragmented_packets() {
            let mut replay = replay();
            let first = fragments(1, LIDAR_PORT, &[0u8; PACKET_SIZE]);
            let second = fragments(2, LIDAR_PORT, &[0u8; PACKET_SIZE]);
            assert!(first.len() > 1);

            for frame in &first {
                replay.frame(frame, LIDAR_PORT, IMU_PORT).unwrap();
            }
            assert_eq!(replay.sweeps, 1);

            // IMU traffic interleaved with the fragments of the next packet.
            let imu = ipv4_frame(3, 0, false, &udp_datagram(IMU_PORT, &[0u8; 48]));
            for (i, frame) in second.iter().enumerate() {
                replay.frame(frame, LIDAR_PORT, IMU_PORT).unwrap();
                if i == 0 {
                    replay.frame(&imu, LIDAR_PORT, IMU_PORT).unwrap();
                }
            }
            assert_eq!(replay.sweeps, 2);
        }

        #[test]
        fn test_incomplete_datagram() {
            let mut replay = replay();
            let frames = fragments(7, LIDAR_PORT, &[0u8; PACKET_SIZE]);
            for frame in &frames[..frames.len() - 1] {
                replay.frame(frame, LIDAR_PORT, IMU_PORT).unwrap();
            }
            assert_eq!(replay.sweeps, 0);
            assert_eq!(replay.decoder.pending(), 0);
        }

        #[test]
        fn test_unfragmented_and_other_ports() {
            let mut replay = replay();

            let other = ipv4_frame(4, 0, false, &udp_datagram(5353, &[0u8; PACKET_SIZE]));
            replay.frame(&other, LIDAR_PORT, IMU_PORT).unwrap();
            assert_eq!(replay.sweeps, 0);

            // Jumbo frame capture, the packet arrives in one piece.
            let jumbo = ipv4_frame(5, 0, false, &udp_datagram(LIDAR_PORT, &[0u8; PACKET_SIZE]));
            replay.frame(&jumbo, LIDAR_PORT, IMU_PORT).unwrap();
            assert_eq!(replay.sweeps, 1);
        }
    }
}
