// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::packet::{Packet, COLUMNS_PER_PACKET};

/// Buffers packets until enough columns for one sweep have arrived.
///
/// Packets are kept in arrival order.  There is no reordering, no
/// deduplication by measurement id and no stall timeout: when the packet
/// stream stops short of a full sweep the buffered packets wait until more
/// packets arrive or the accumulator is reset.
#[derive(Clone, Debug)]
pub struct FrameAccumulator {
    packets: Vec<Packet>,
    sweep_width: usize,
}

impl FrameAccumulator {
    /// Creates an empty accumulator for sweeps of `sweep_width` columns.
    pub fn new(sweep_width: usize) -> Self {
        FrameAccumulator {
            packets: Vec::with_capacity(Self::capacity(sweep_width)),
            sweep_width,
        }
    }

    fn capacity(sweep_width: usize) -> usize {
        sweep_width.div_ceil(COLUMNS_PER_PACKET)
    }

    /// Appends a packet to the sweep in progress.
    pub fn ingest(&mut self, packet: Packet) {
        self.packets.push(packet);
    }

    /// Number of columns currently buffered.
    #[inline]
    pub fn columns(&self) -> usize {
        self.packets.len() * COLUMNS_PER_PACKET
    }

    /// True once the buffered columns cover the sweep width.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.columns() >= self.sweep_width
    }

    /// Hands over the buffered packets and starts the next sweep.
    pub fn drain(&mut self) -> Vec<Packet> {
        std::mem::replace(
            &mut self.packets,
            Vec::with_capacity(Self::capacity(self.sweep_width)),
        )
    }

    /// Discards any partial sweep and adopts a new sweep width.
    pub fn reset(&mut self, sweep_width: usize) {
        self.sweep_width = sweep_width;
        self.packets.clear();
        self.packets.reserve(Self::capacity(sweep_width));
    }

    /// Columns per sweep.
    pub fn sweep_width(&self) -> usize {
        self.sweep_width
    }

    /// Number of packets buffered.
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    /// True when no packet is buffered.
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::testing::uniform_packet;

    fn packet(first_column: u16) -> Packet {
        Packet::new(uniform_packet(first_column, 1000, 10)).unwrap()
    }

    #[test]
    fn test_ready() {
        let mut acc = FrameAccumulator::new(64);
        for i in 0..3 {
            acc.ingest(packet(i * 16));
            assert!(!acc.is_ready());
        }
        acc.ingest(packet(48));
        assert!(acc.is_ready());
        assert_eq!(acc.columns(), 64);

        let packets = acc.drain();
        assert_eq!(packets.len(), 4);
        assert!(acc.is_empty());
        assert!(!acc.is_ready());
        assert_eq!(acc.sweep_width(), 64);
    }

    #[test]
    fn test_arrival_order() {
        let mut acc = FrameAccumulator::new(48);
        // Out of order and duplicated measurement ids are kept as delivered.
        for first in [32, 0, 0] {
            acc.ingest(packet(first));
        }
        let ids: Vec<u16> = acc
            .drain()
            .iter()
            .map(|p| p.view().column(0).unwrap().measurement_id())
            .collect();
        assert_eq!(ids, vec![32, 0, 0]);
    }

    #[test]
    fn test_reset() {
        let mut acc = FrameAccumulator::new(64);
        acc.ingest(packet(0));
        acc.ingest(packet(16));
        acc.reset(32);
        assert!(acc.is_empty());
        assert_eq!(acc.sweep_width(), 32);
        acc.ingest(packet(0));
        acc.ingest(packet(16));
        assert!(acc.is_ready());
    }
}
