// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Zero-copy views over the fixed-size LiDAR packet layout.
//!
//! A packet carries [`COLUMNS_PER_PACKET`] columns, each holding a 16 byte
//! header, [`PIXELS_PER_COLUMN`] pixel blocks and a 4 byte status word. All
//! fields are little-endian.
//!
//! ```text
//! column  [ timestamp u64 | measurement_id u16 | frame_id u16 | encoder u32 ]
//!         [ pixel 0 .. pixel 63 (12 bytes each)                            ]
//!         [ status u32                                                      ]
//! pixel   [ range u32 (20 bits, mm) | reflectivity u16 | signal u16 |
//!           noise u16 | unused u16 ]
//! ```

use std::{f64::consts::PI, fmt};

/// Number of columns (azimuth blocks) in one LiDAR packet.
pub const COLUMNS_PER_PACKET: usize = 16;

/// Number of beams measured by one column, one raster row per beam.
pub const PIXELS_PER_COLUMN: usize = 64;

/// Number of encoder ticks in one revolution.
pub const ENCODER_TICKS_PER_REV: u32 = 90112;

/// Fixed size of one LiDAR packet in bytes.
pub const PACKET_SIZE: usize = COLUMNS_PER_PACKET * Column::LEN;

/// Fixed size of one IMU packet in bytes.
pub const IMU_PACKET_SIZE: usize = 48;

/// Errors raised while reading a LiDAR packet.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DecodeError {
    /// The buffer is shorter than the fixed packet size.
    UnexpectedEndOfSlice(usize),
    /// The buffer is longer than the fixed packet size.
    TrailingBytes(usize),
    /// Column index beyond [`COLUMNS_PER_PACKET`].
    ColumnOutOfRange(usize),
    /// Pixel index beyond [`PIXELS_PER_COLUMN`].
    PixelOutOfRange(usize),
}

impl std::error::Error for DecodeError {}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DecodeError::UnexpectedEndOfSlice(len) => {
                write!(f, "unexpected end of slice: {} of {} bytes", len, PACKET_SIZE)
            }
            DecodeError::TrailingBytes(len) => {
                write!(f, "trailing bytes: {} of {} bytes", len, PACKET_SIZE)
            }
            DecodeError::ColumnOutOfRange(index) => {
                write!(f, "column index out of range: {}", index)
            }
            DecodeError::PixelOutOfRange(index) => {
                write!(f, "pixel index out of range: {}", index)
            }
        }
    }
}

/// Decoded header and status of one column.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Column {
    /// Nanoseconds.
    pub timestamp: u64,
    /// Column index within the revolution.
    pub measurement_id: u16,
    /// Revolution counter.
    pub frame_id: u16,
    /// Encoder position, see [`ENCODER_TICKS_PER_REV`].
    pub encoder_count: u32,
    /// Validity word, [`Column::VALID`] when every pixel is valid.
    pub status: u32,
}

impl Column {
    /// Length of the column header in bytes/octets.
    pub const HEADER_LEN: usize = 16;
    /// Length of the column status trailer in bytes/octets.
    pub const STATUS_LEN: usize = 4;
    /// Length of one column in bytes/octets.
    pub const LEN: usize = Self::HEADER_LEN + PIXELS_PER_COLUMN * Pixel::LEN + Self::STATUS_LEN;
    /// Status value of a column whose measurements are all valid.
    pub const VALID: u32 = 0xFFFF_FFFF;
}

/// Decoded measurement of one beam.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Pixel {
    /// Millimeters, masked to 20 bits.
    pub range: u32,
    /// Calibrated reflectivity.
    pub reflectivity: u16,
    /// Signal photons.
    pub signal: u16,
    /// Ambient noise photons.
    pub noise: u16,
}

impl Pixel {
    /// Length of one pixel block in bytes/octets.
    pub const LEN: usize = 12;
    /// Only the low 20 bits of the range word carry the range in millimeters.
    pub const RANGE_MASK: u32 = 0x000F_FFFF;
}

/// A slice containing one complete LiDAR packet.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PacketView<'a> {
    slice: &'a [u8],
}

impl<'a> PacketView<'a> {
    /// Validates the slice holds at least one packet and views the first
    /// [`PACKET_SIZE`] bytes.
    pub fn from_slice(slice: &'a [u8]) -> Result<PacketView<'a>, DecodeError> {
        if slice.len() < PACKET_SIZE {
            return Err(DecodeError::UnexpectedEndOfSlice(slice.len()));
        }

        Ok(PacketView {
            slice: &slice[..PACKET_SIZE],
        })
    }

    /// Returns the column at `index` or an error if the index is beyond the
    /// packet.
    #[inline]
    pub fn column(&self, index: usize) -> Result<ColumnSlice<'a>, DecodeError> {
        if index >= COLUMNS_PER_PACKET {
            return Err(DecodeError::ColumnOutOfRange(index));
        }

        let begin = index * Column::LEN;
        Ok(ColumnSlice {
            slice: &self.slice[begin..begin + Column::LEN],
        })
    }

    /// Iterates the columns in packet order.
    #[inline]
    pub fn columns(&self) -> impl Iterator<Item = ColumnSlice<'a>> {
        let slice: &'a [u8] = self.slice;
        slice
            .chunks_exact(Column::LEN)
            .map(|slice| ColumnSlice { slice })
    }
}

/// A slice containing one column of a LiDAR packet.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ColumnSlice<'a> {
    slice: &'a [u8],
}

impl<'a> ColumnSlice<'a> {
    /// Copies the column header and status.
    pub fn to_column(&self) -> Column {
        Column {
            timestamp: self.timestamp(),
            measurement_id: self.measurement_id(),
            frame_id: self.frame_id(),
            encoder_count: self.encoder_count(),
            status: self.status(),
        }
    }

    /// Returns the column timestamp in nanoseconds.
    #[inline]
    pub fn timestamp(&self) -> u64 {
        u64::from_le_bytes([
            self.slice[0],
            self.slice[1],
            self.slice[2],
            self.slice[3],
            self.slice[4],
            self.slice[5],
            self.slice[6],
            self.slice[7],
        ])
    }

    /// Returns the measurement id, the column index within the revolution.
    #[inline]
    pub fn measurement_id(&self) -> u16 {
        u16::from_le_bytes([self.slice[8], self.slice[9]])
    }

    /// Returns the frame id, incremented once per revolution.
    #[inline]
    pub fn frame_id(&self) -> u16 {
        u16::from_le_bytes([self.slice[10], self.slice[11]])
    }

    /// Returns the raw encoder position.
    #[inline]
    pub fn encoder_count(&self) -> u32 {
        u32::from_le_bytes([
            self.slice[12],
            self.slice[13],
            self.slice[14],
            self.slice[15],
        ])
    }

    /// Returns the horizontal angle of the column in radians.
    #[inline]
    pub fn h_angle(&self) -> f64 {
        2.0 * PI * self.encoder_count() as f64 / ENCODER_TICKS_PER_REV as f64
    }

    /// Returns the raw status trailer.
    #[inline]
    pub fn status(&self) -> u32 {
        let offset = Column::LEN - Column::STATUS_LEN;
        u32::from_le_bytes([
            self.slice[offset],
            self.slice[offset + 1],
            self.slice[offset + 2],
            self.slice[offset + 3],
        ])
    }

    /// Returns true when every measurement of the column is valid.  An
    /// invalid column also reports zero for its measurement id, encoder count
    /// and pixel data.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.status() == Column::VALID
    }

    /// Returns the pixel of beam `index` or an error if the index is beyond
    /// the column.
    #[inline]
    pub fn pixel(&self, index: usize) -> Result<PixelSlice<'a>, DecodeError> {
        if index >= PIXELS_PER_COLUMN {
            return Err(DecodeError::PixelOutOfRange(index));
        }

        let begin = Column::HEADER_LEN + index * Pixel::LEN;
        Ok(PixelSlice {
            slice: &self.slice[begin..begin + Pixel::LEN],
        })
    }

    /// Iterates the pixels from the topmost beam down.
    #[inline]
    pub fn pixels(&self) -> impl Iterator<Item = PixelSlice<'a>> {
        let slice: &'a [u8] = self.slice;
        slice[Column::HEADER_LEN..Column::LEN - Column::STATUS_LEN]
            .chunks_exact(Pixel::LEN)
            .map(|slice| PixelSlice { slice })
    }
}

/// A slice containing one pixel (beam measurement) of a column.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PixelSlice<'a> {
    slice: &'a [u8],
}

impl PixelSlice<'_> {
    /// Copies the pixel measurements.
    pub fn to_pixel(&self) -> Pixel {
        Pixel {
            range: self.range(),
            reflectivity: self.reflectivity(),
            signal: self.signal(),
            noise: self.noise(),
        }
    }

    /// Returns the raw range in millimeters.
    #[inline]
    pub fn range(&self) -> u32 {
        u32::from_le_bytes([self.slice[0], self.slice[1], self.slice[2], self.slice[3]])
            & Pixel::RANGE_MASK
    }

    /// Returns the calibrated reflectivity.
    #[inline]
    pub fn reflectivity(&self) -> u16 {
        u16::from_le_bytes([self.slice[4], self.slice[5]])
    }

    /// Returns the signal photon count.
    #[inline]
    pub fn signal(&self) -> u16 {
        u16::from_le_bytes([self.slice[6], self.slice[7]])
    }

    /// Returns the ambient noise photon count.
    #[inline]
    pub fn noise(&self) -> u16 {
        u16::from_le_bytes([self.slice[8], self.slice[9]])
    }
}

/// An owned LiDAR packet whose length was verified on construction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Packet {
    data: Vec<u8>,
}

impl Packet {
    /// Takes ownership of a delivered buffer, which must be exactly
    /// [`PACKET_SIZE`] bytes.
    pub fn new(data: Vec<u8>) -> Result<Packet, DecodeError> {
        PacketView::from_slice(&data)?;
        if data.len() > PACKET_SIZE {
            return Err(DecodeError::TrailingBytes(data.len()));
        }
        Ok(Packet { data })
    }

    /// Views the packet.
    #[inline]
    pub fn view(&self) -> PacketView<'_> {
        // Length verified by Packet::new.
        PacketView { slice: &self.data }
    }

    /// Returns the raw packet bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}
