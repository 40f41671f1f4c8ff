use energycore::acquisition::{ConversionRecord, SamplerSettings, TYPE1_RESULT_BYTES};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

const ADC_FULL_SCALE: f32 = 4095.0;

/// Drops a share of one channel's conversions, as a congested scan would.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Imbalance {
    pub channel: u8,
    pub drop_ratio: f32,
}

/// Configuration for generating synthetic conversion frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Line frequency in Hz.
    pub frequency: f32,
    /// Peak amplitude in ADC counts around the DC offset.
    pub amplitude: f32,
    /// Phase advance between consecutive pattern slots, in radians.
    pub phase_step: f32,
    /// Uniform noise half-width in ADC counts.
    pub noise: f32,
    pub seed: u64,
    pub imbalance: Option<Imbalance>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            frequency: 50.0,
            amplitude: 1200.0,
            phase_step: 2.0 * PI / 3.0,
            noise: 4.0,
            seed: 0,
            imbalance: None,
        }
    }
}

/// Produces type-1 raw frames that scan the channel pattern round-robin.
pub struct WaveformGenerator {
    config: GeneratorConfig,
    pattern: Vec<u8>,
    frame_capacity: usize,
    per_channel_rate: f32,
    dc_offset: f32,
    rng: StdRng,
    slot: usize,
    scan: u64,
}

impl WaveformGenerator {
    pub fn new(config: &GeneratorConfig, settings: &SamplerSettings, dc_offset: i16) -> Self {
        let channels = settings.channel_pattern.len().max(1);
        Self {
            config: config.clone(),
            pattern: settings.channel_pattern.clone(),
            frame_capacity: settings.frame_capacity,
            per_channel_rate: (settings.aggregate_rate as f32 / channels as f32).max(1.0),
            dc_offset: f32::from(dc_offset),
            rng: StdRng::seed_from_u64(config.seed),
            slot: 0,
            scan: 0,
        }
    }

    /// Next conversion of the scan, or `None` when the imbalance drops it.
    fn next_record(&mut self) -> Option<ConversionRecord> {
        let slot = self.slot;
        let channel = self.pattern[slot];
        let t = self.scan as f32 / self.per_channel_rate;

        self.slot += 1;
        if self.slot == self.pattern.len() {
            self.slot = 0;
            self.scan += 1;
        }

        if let Some(imbalance) = self.config.imbalance {
            if imbalance.channel == channel && self.rng.gen::<f32>() < imbalance.drop_ratio {
                return None;
            }
        }

        let phase = 2.0 * PI * self.config.frequency * t + slot as f32 * self.config.phase_step;
        let jitter = if self.config.noise > 0.0 {
            self.rng.gen_range(-self.config.noise..self.config.noise)
        } else {
            0.0
        };
        let value = (self.dc_offset + self.config.amplitude * phase.sin() + jitter)
            .round()
            .clamp(0.0, ADC_FULL_SCALE);
        Some(ConversionRecord::new(channel, value as u16))
    }

    /// Replaces `raw` with the next frame. Dropped conversions shorten it.
    pub fn next_frame(&mut self, raw: &mut Vec<u8>) {
        raw.clear();
        if self.pattern.is_empty() {
            return;
        }
        for _ in 0..self.frame_capacity {
            if let Some(record) = self.next_record() {
                raw.extend_from_slice(&record.to_type1().to_le_bytes());
            }
        }
    }

    pub fn frame_bytes(&self) -> usize {
        self.frame_capacity * TYPE1_RESULT_BYTES
    }
}
