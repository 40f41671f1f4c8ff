//! Fixed-layout measurement packet exchanged between acquisition and
//! transmit, and sent byte-for-byte as the data-stream payload.
//!
//! Wire layout (little-endian, natural alignment, padded to 4 bytes):
//!
//! ```text
//!  0  i32  packet_count
//!  4  i16  error_flag
//!  6  i16  active_channels
//!  8  i32  sample_rate
//! 12  f32  measured_output_rate
//! 16  i16  calib_attenuation
//! 18  i16  calib_dc_offset
//! 20  i16  samples_per_channel
//! 22  i16  calib_coeff_a
//! 24  i16  calib_coeff_b
//! 26  i16  channel_coeffs[channels]
//!  …  i16  samples[channels][samples_per_channel]
//! ```

use crate::config::DeviceConfig;
use crate::prelude::{CoreError, CoreResult};

const FIXED_HEADER_LEN: usize = 26;
const WIRE_ALIGN: usize = 4;

/// Channel and sample dimensions that fix the packet size for a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketLayout {
    pub channels: usize,
    pub samples_per_channel: usize,
}

impl PacketLayout {
    pub fn new(channels: usize, samples_per_channel: usize) -> Self {
        Self {
            channels,
            samples_per_channel,
        }
    }

    pub fn from_config(config: &DeviceConfig) -> Self {
        Self::new(
            config.acquisition.channel_count(),
            config.acquisition.samples_per_channel,
        )
    }

    pub fn header_len(&self) -> usize {
        FIXED_HEADER_LEN + 2 * self.channels
    }

    pub fn sample_count(&self) -> usize {
        self.channels * self.samples_per_channel
    }

    pub fn wire_len(&self) -> usize {
        let unpadded = self.header_len() + 2 * self.sample_count();
        unpadded.div_ceil(WIRE_ALIGN) * WIRE_ALIGN
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementPacket {
    layout: PacketLayout,
    /// Wraps silently; orders packets, does not track delivery.
    pub packet_count: u32,
    /// Reserved; no fault detection exists, so this is always zero.
    pub error_flag: i16,
    pub active_channels: i16,
    /// Nominal per-channel rate in samples per second.
    pub sample_rate: i32,
    /// Observed packets per second; zero until the second cycle.
    pub measured_output_rate: f32,
    pub calib_attenuation: i16,
    pub calib_dc_offset: i16,
    pub samples_per_channel: i16,
    pub calib_coeff_a: i16,
    pub calib_coeff_b: i16,
    pub channel_coeffs: Vec<i16>,
    samples: Vec<i16>,
}

impl MeasurementPacket {
    pub fn new(layout: PacketLayout) -> Self {
        Self {
            layout,
            packet_count: 0,
            error_flag: 0,
            active_channels: 0,
            sample_rate: 0,
            measured_output_rate: 0.0,
            calib_attenuation: 0,
            calib_dc_offset: 0,
            samples_per_channel: 0,
            calib_coeff_a: 0,
            calib_coeff_b: 0,
            channel_coeffs: vec![0; layout.channels],
            samples: vec![0; layout.sample_count()],
        }
    }

    pub fn layout(&self) -> PacketLayout {
        self.layout
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn channel(&self, row: usize) -> &[i16] {
        let width = self.layout.samples_per_channel;
        &self.samples[row * width..(row + 1) * width]
    }

    pub fn channel_mut(&mut self, row: usize) -> &mut [i16] {
        let width = self.layout.samples_per_channel;
        &mut self.samples[row * width..(row + 1) * width]
    }

    pub fn clear_samples(&mut self) {
        self.samples.fill(0);
    }

    /// Serializes the packet into `buf`, replacing its contents.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.clear();
        buf.reserve(self.layout.wire_len());
        buf.extend_from_slice(&self.packet_count.to_le_bytes());
        buf.extend_from_slice(&self.error_flag.to_le_bytes());
        buf.extend_from_slice(&self.active_channels.to_le_bytes());
        buf.extend_from_slice(&self.sample_rate.to_le_bytes());
        buf.extend_from_slice(&self.measured_output_rate.to_le_bytes());
        for field in [
            self.calib_attenuation,
            self.calib_dc_offset,
            self.samples_per_channel,
            self.calib_coeff_a,
            self.calib_coeff_b,
        ] {
            buf.extend_from_slice(&field.to_le_bytes());
        }
        for coeff in self.channel_coeffs.iter().take(self.layout.channels) {
            buf.extend_from_slice(&coeff.to_le_bytes());
        }
        for sample in &self.samples {
            buf.extend_from_slice(&sample.to_le_bytes());
        }
        buf.resize(self.layout.wire_len(), 0);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf);
        buf
    }

    /// Parses a datagram produced by a device built with `layout`.
    pub fn decode(bytes: &[u8], layout: PacketLayout) -> CoreResult<Self> {
        if bytes.len() != layout.wire_len() {
            return Err(CoreError::PacketLength {
                expected: layout.wire_len(),
                actual: bytes.len(),
            });
        }

        let mut reader = FieldReader { bytes, offset: 0 };
        let mut packet = Self::new(layout);
        packet.packet_count = u32::from_le_bytes(reader.take());
        packet.error_flag = i16::from_le_bytes(reader.take());
        packet.active_channels = i16::from_le_bytes(reader.take());
        packet.sample_rate = i32::from_le_bytes(reader.take());
        packet.measured_output_rate = f32::from_le_bytes(reader.take());
        packet.calib_attenuation = i16::from_le_bytes(reader.take());
        packet.calib_dc_offset = i16::from_le_bytes(reader.take());
        packet.samples_per_channel = i16::from_le_bytes(reader.take());
        packet.calib_coeff_a = i16::from_le_bytes(reader.take());
        packet.calib_coeff_b = i16::from_le_bytes(reader.take());
        for coeff in packet.channel_coeffs.iter_mut() {
            *coeff = i16::from_le_bytes(reader.take());
        }
        for sample in packet.samples.iter_mut() {
            *sample = i16::from_le_bytes(reader.take());
        }
        Ok(packet)
    }
}

struct FieldReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl FieldReader<'_> {
    // Callers check the total length up front.
    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut field = [0u8; N];
        field.copy_from_slice(&self.bytes[self.offset..self.offset + N]);
        self.offset += N;
        field
    }
}
