use crate::generator::profile::WaveformGenerator;
use crate::workflow::config::SimulatorConfig;
use anyhow::Context;
use energycore::acquisition::{decode_type1_frame, AcquisitionPipeline, SamplerSettings};
use serde::Serialize;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize)]
pub struct ChannelSummary {
    pub channel: u8,
    pub mean: f32,
    /// RMS of the signal around its mean, in ADC counts.
    pub rms: f32,
}

/// Outcome of an offline run over the last packet produced.
#[derive(Debug, Clone, Serialize)]
pub struct OfflineSummary {
    pub packets: usize,
    pub last_packet_count: u32,
    pub dropped_records: usize,
    pub measured_rate: f32,
    pub wire_bytes: usize,
    pub channels: Vec<ChannelSummary>,
}

/// Drives the acquisition pipeline with generated frames, without sockets
/// or threads. Frame timestamps advance by the nominal frame period.
#[derive(Clone)]
pub struct Runner {
    config: SimulatorConfig,
}

impl Runner {
    pub fn new(config: SimulatorConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self, cycles: usize) -> anyhow::Result<OfflineSummary> {
        let device = &self.config.device;
        let mut pipeline =
            AcquisitionPipeline::new(device).context("building acquisition pipeline")?;
        let settings = SamplerSettings::from_config(&device.acquisition);
        let mut generator =
            WaveformGenerator::new(&self.config.generator, &settings, device.calibration.dc_offset);
        let period = Duration::from_secs_f64(
            settings.frame_capacity as f64 / f64::from(settings.aggregate_rate),
        );

        let start = Instant::now();
        let mut raw = Vec::with_capacity(generator.frame_bytes());
        let mut records = Vec::with_capacity(settings.frame_capacity);
        let mut dropped_records = 0;
        let mut measured_rate = 0.0;

        for cycle in 0..cycles {
            generator.next_frame(&mut raw);
            records.clear();
            decode_type1_frame(&raw, &mut records);
            let report = pipeline.process_frame(&records, start + period * cycle as u32);
            dropped_records += report.dropped_records;
            measured_rate = report.measured_rate.unwrap_or(0.0);
        }

        let packet = pipeline.packet();
        let channels = settings
            .channel_pattern
            .iter()
            .enumerate()
            .map(|(row, &channel)| {
                let (mean, rms) = mean_and_rms(packet.channel(row));
                ChannelSummary { channel, mean, rms }
            })
            .collect();

        Ok(OfflineSummary {
            packets: cycles,
            last_packet_count: packet.packet_count,
            dropped_records,
            measured_rate,
            wire_bytes: packet.layout().wire_len(),
            channels,
        })
    }
}

fn mean_and_rms(samples: &[i16]) -> (f32, f32) {
    if samples.is_empty() {
        return (0.0, 0.0);
    }
    let n = samples.len() as f32;
    let mean = samples.iter().map(|&s| f32::from(s)).sum::<f32>() / n;
    let variance = samples
        .iter()
        .map(|&s| (f32::from(s) - mean).powi(2))
        .sum::<f32>()
        / n;
    (mean, variance.sqrt())
}
