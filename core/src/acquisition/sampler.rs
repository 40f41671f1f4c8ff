use crate::config::{AcquisitionConfig, MAX_CHANNEL_ID};
use crate::signal::ReadySignal;
use std::sync::Arc;

/// Bytes per conversion result in the type-1 digital output format.
pub const TYPE1_RESULT_BYTES: usize = 2;

/// Conversion results are 12 bits wide.
pub const ADC_VALUE_MASK: u16 = 0x0fff;
const TYPE1_CHANNEL_SHIFT: u16 = 12;

/// One conversion result delivered by the hardware sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionRecord {
    pub channel: u8,
    pub value: u16,
}

impl ConversionRecord {
    pub fn new(channel: u8, value: u16) -> Self {
        Self { channel, value }
    }

    /// Unpacks a type-1 word: bits 0-11 value, bits 12-15 channel.
    pub fn from_type1(word: u16) -> Self {
        Self {
            channel: (word >> TYPE1_CHANNEL_SHIFT) as u8,
            value: word & ADC_VALUE_MASK,
        }
    }

    pub fn to_type1(self) -> u16 {
        (u16::from(self.channel) << TYPE1_CHANNEL_SHIFT) | (self.value & ADC_VALUE_MASK)
    }
}

/// Decodes a raw type-1 frame, appending to `out`. A trailing odd byte is ignored.
pub fn decode_type1_frame(raw: &[u8], out: &mut Vec<ConversionRecord>) {
    out.extend(
        raw.chunks_exact(TYPE1_RESULT_BYTES)
            .map(|word| ConversionRecord::from_type1(u16::from_le_bytes([word[0], word[1]]))),
    );
}

#[derive(thiserror::Error, Debug)]
pub enum SamplerError {
    #[error("sampler configuration rejected: {0}")]
    Configuration(String),
    #[error("sampler not started")]
    NotStarted,
    #[error("no frame available")]
    Empty,
    #[error("frame read failed: {0}")]
    Read(String),
}

/// What the sampler has to scan, and how fast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplerSettings {
    pub channel_pattern: Vec<u8>,
    pub aggregate_rate: u32,
    /// Records per frame-ready signal.
    pub frame_capacity: usize,
}

impl SamplerSettings {
    pub fn from_config(config: &AcquisitionConfig) -> Self {
        Self {
            channel_pattern: config
                .channel_pattern
                .iter()
                .map(|id| id & MAX_CHANNEL_ID)
                .collect(),
            aggregate_rate: config.aggregate_rate(),
            frame_capacity: config.frame_capacity(),
        }
    }
}

/// Continuous multi-channel digitizer driven by the acquisition task.
///
/// The sampler raises `frame_ready` each time a frame completes, from
/// whatever thread or interrupt context it runs in.
pub trait Sampler: Send {
    fn configure(
        &mut self,
        settings: &SamplerSettings,
        frame_ready: Arc<ReadySignal>,
    ) -> Result<(), SamplerError>;
    fn start(&mut self) -> Result<(), SamplerError>;
    fn stop(&mut self) -> Result<(), SamplerError>;
    /// Non-blocking read of the latest completed frame into `out`.
    fn read_frame(&mut self, out: &mut Vec<ConversionRecord>) -> Result<(), SamplerError>;
}
