use crate::packet::PacketLayout;
use crate::prelude::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Largest channel id the 3-bit pattern field can address.
pub const MAX_CHANNEL_ID: u8 = 0x7;

/// Largest payload a single IPv4 UDP datagram can carry.
pub const MAX_DATAGRAM_PAYLOAD: usize = 65_507;

/// Attenuation code of the 12 dB input range.
pub const ATTENUATION_DB_12: i16 = 3;

/// Complete build configuration of the device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub acquisition: AcquisitionConfig,
    pub filters: FilterConfig,
    pub calibration: CalibrationConfig,
    pub network: NetworkConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Hardware channel ids in scan order; the position is the packet row.
    pub channel_pattern: Vec<u8>,
    pub samples_per_channel: usize,
    /// Nominal per-channel rate in samples per second.
    pub per_channel_rate: u32,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            channel_pattern: vec![0, 3, 6, 7, 4, 5],
            samples_per_channel: 80,
            per_channel_rate: 5867,
        }
    }
}

impl AcquisitionConfig {
    pub fn channel_count(&self) -> usize {
        self.channel_pattern.len()
    }

    /// Rate the sampler runs at across all channels.
    pub fn aggregate_rate(&self) -> u32 {
        self.per_channel_rate
            .saturating_mul(self.channel_count() as u32)
    }

    /// Number of conversion records in one full frame.
    pub fn frame_capacity(&self) -> usize {
        self.channel_count() * self.samples_per_channel
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub fractional_delay: bool,
    pub low_pass: bool,
    /// Packet rows that get the fractional-delay phase correction.
    pub delayed_channels: Vec<usize>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            fractional_delay: true,
            low_pass: true,
            delayed_channels: vec![1, 3, 5],
        }
    }
}

/// Calibration constants stamped verbatim into every packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub attenuation: i16,
    pub dc_offset: i16,
    pub coeff_a: i16,
    pub coeff_b: i16,
    pub channel_coeffs: Vec<i16>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            attenuation: ATTENUATION_DB_12,
            dc_offset: 1860,
            coeff_a: 0,
            coeff_b: 0,
            channel_coeffs: vec![0; 6],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Fallback destination before selection and target of announcements.
    pub broadcast_ip: Ipv4Addr,
    pub discovery_port: u16,
    pub data_port: u16,
    pub selection_port: u16,
    pub greeting_port: u16,
    pub advertise_interval_ms: u64,
    pub greeting: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            broadcast_ip: Ipv4Addr::BROADCAST,
            discovery_port: 5000,
            data_port: 5001,
            selection_port: 6000,
            greeting_port: 7000,
            advertise_interval_ms: 1000,
            greeting: "Hello, PC! I am the energy meter.".to_string(),
        }
    }
}

impl NetworkConfig {
    pub fn advertise_interval(&self) -> Duration {
        Duration::from_millis(self.advertise_interval_ms)
    }
}

impl DeviceConfig {
    pub fn validate(&self) -> CoreResult<()> {
        let acq = &self.acquisition;
        if acq.channel_pattern.is_empty() {
            return Err(CoreError::InvalidConfig("channel pattern is empty".into()));
        }
        if acq.channel_count() > usize::from(MAX_CHANNEL_ID) + 1 {
            return Err(CoreError::InvalidConfig(format!(
                "{} channels exceed the {} the pattern can address",
                acq.channel_count(),
                usize::from(MAX_CHANNEL_ID) + 1
            )));
        }
        if let Some(id) = acq.channel_pattern.iter().find(|&&id| id > MAX_CHANNEL_ID) {
            return Err(CoreError::InvalidConfig(format!(
                "channel id {} does not fit the 3-bit pattern field",
                id
            )));
        }
        let mut seen = HashSet::new();
        if !acq.channel_pattern.iter().all(|id| seen.insert(*id)) {
            return Err(CoreError::InvalidConfig(
                "channel pattern contains duplicate ids".into(),
            ));
        }
        if acq.samples_per_channel < 2 {
            return Err(CoreError::InvalidConfig(
                "at least two samples per channel are required".into(),
            ));
        }
        if i16::try_from(acq.samples_per_channel).is_err() {
            return Err(CoreError::InvalidConfig(format!(
                "{} samples per channel do not fit the packet header",
                acq.samples_per_channel
            )));
        }
        let wire_len = PacketLayout::from_config(self).wire_len();
        if wire_len > MAX_DATAGRAM_PAYLOAD {
            return Err(CoreError::InvalidConfig(format!(
                "{}-byte packet does not fit one {}-byte datagram",
                wire_len, MAX_DATAGRAM_PAYLOAD
            )));
        }
        if acq.per_channel_rate == 0 {
            return Err(CoreError::InvalidConfig("sample rate must be positive".into()));
        }
        if let Some(row) = self
            .filters
            .delayed_channels
            .iter()
            .find(|&&row| row >= acq.channel_count())
        {
            return Err(CoreError::InvalidConfig(format!(
                "delayed channel {} is outside the {} configured channels",
                row,
                acq.channel_count()
            )));
        }
        if self.calibration.channel_coeffs.len() != acq.channel_count() {
            return Err(CoreError::InvalidConfig(format!(
                "expected {} channel coefficients, found {}",
                acq.channel_count(),
                self.calibration.channel_coeffs.len()
            )));
        }
        let net = &self.network;
        if net.advertise_interval_ms == 0 {
            return Err(CoreError::InvalidConfig(
                "advertise interval must be positive".into(),
            ));
        }
        let ports = [
            net.discovery_port,
            net.data_port,
            net.selection_port,
            net.greeting_port,
        ];
        let mut seen = HashSet::new();
        if !ports.iter().all(|port| seen.insert(*port)) {
            return Err(CoreError::InvalidConfig(format!(
                "network ports must be distinct: {:?}",
                ports
            )));
        }
        Ok(())
    }
}
