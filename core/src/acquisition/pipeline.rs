use crate::acquisition::demux::ChannelAssembler;
use crate::acquisition::rate::RateMeter;
use crate::acquisition::sampler::{ConversionRecord, SamplerSettings};
use crate::config::{CalibrationConfig, DeviceConfig};
use crate::filters::FilterBank;
use crate::packet::{MeasurementPacket, PacketLayout};
use crate::prelude::CoreResult;
use std::time::Instant;

/// Summary of one processed frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleReport {
    pub packet_count: u32,
    pub dropped_records: usize,
    pub measured_rate: Option<f32>,
}

/// Turns conversion frames into stamped, filtered measurement packets.
///
/// Owns the working packet (reused every cycle) and the per-channel filter
/// state, which carries across packets.
pub struct AcquisitionPipeline {
    assembler: ChannelAssembler,
    filters: FilterBank,
    rate: RateMeter,
    calibration: CalibrationConfig,
    per_channel_rate: i32,
    packet: MeasurementPacket,
    next_count: u32,
}

impl AcquisitionPipeline {
    pub fn new(config: &DeviceConfig) -> CoreResult<Self> {
        config.validate()?;
        let layout = PacketLayout::from_config(config);
        let settings = SamplerSettings::from_config(&config.acquisition);

        Ok(Self {
            assembler: ChannelAssembler::new(settings.channel_pattern, layout.samples_per_channel),
            filters: FilterBank::new(&config.filters, layout.channels, layout.samples_per_channel),
            rate: RateMeter::new(),
            calibration: config.calibration.clone(),
            per_channel_rate: i32::try_from(config.acquisition.per_channel_rate)
                .unwrap_or(i32::MAX),
            packet: MeasurementPacket::new(layout),
            next_count: 0,
        })
    }

    /// Runs demux, gap-fill, stamping, filtering and rate measurement for one
    /// frame completed at `now`. The result is left in [`Self::packet`].
    pub fn process_frame(&mut self, records: &[ConversionRecord], now: Instant) -> CycleReport {
        self.packet.clear_samples();
        let dropped_records = self.assembler.push_frame(records, &mut self.packet);
        self.assembler.fill_gaps(&mut self.packet);

        self.stamp();
        self.filters.apply(&mut self.packet);

        let measured_rate = self.rate.observe(now);
        self.packet.measured_output_rate = measured_rate.unwrap_or(0.0);

        self.assembler.reset();

        CycleReport {
            packet_count: self.packet.packet_count,
            dropped_records,
            measured_rate,
        }
    }

    fn stamp(&mut self) {
        let layout = self.packet.layout();
        let packet = &mut self.packet;
        packet.packet_count = self.next_count;
        self.next_count = self.next_count.wrapping_add(1);
        packet.error_flag = 0;
        packet.active_channels = layout.channels as i16;
        packet.sample_rate = self.per_channel_rate;
        packet.calib_attenuation = self.calibration.attenuation;
        packet.calib_dc_offset = self.calibration.dc_offset;
        packet.samples_per_channel = layout.samples_per_channel as i16;
        packet.calib_coeff_a = self.calibration.coeff_a;
        packet.calib_coeff_b = self.calibration.coeff_b;
        packet
            .channel_coeffs
            .copy_from_slice(&self.calibration.channel_coeffs);
    }

    pub fn packet(&self) -> &MeasurementPacket {
        &self.packet
    }

    #[cfg(test)]
    fn set_next_count(&mut self, count: u32) {
        self.next_count = count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterConfig;
    use approx::assert_relative_eq;
    use std::time::Duration;

    fn unfiltered() -> DeviceConfig {
        DeviceConfig {
            filters: FilterConfig {
                fractional_delay: false,
                low_pass: false,
                delayed_channels: vec![1, 3, 5],
            },
            ..DeviceConfig::default()
        }
    }

    fn balanced_frame(config: &DeviceConfig, value: impl Fn(usize, usize) -> u16) -> Vec<ConversionRecord> {
        let acq = &config.acquisition;
        (0..acq.samples_per_channel)
            .flat_map(|i| {
                acq.channel_pattern
                    .iter()
                    .enumerate()
                    .map(move |(row, &id)| (i, row, id))
                    .collect::<Vec<_>>()
            })
            .map(|(i, row, id)| ConversionRecord::new(id, value(i, row)))
            .collect()
    }

    #[test]
    fn stamps_reference_metadata() {
        let config = unfiltered();
        let mut pipeline = AcquisitionPipeline::new(&config).unwrap();
        let frame = balanced_frame(&config, |_, row| 1000 + row as u16);
        let report = pipeline.process_frame(&frame, Instant::now());

        let packet = pipeline.packet();
        assert_eq!(report.packet_count, 0);
        assert_eq!(packet.error_flag, 0);
        assert_eq!(packet.active_channels, 6);
        assert_eq!(packet.sample_rate, 5867);
        assert_eq!(packet.samples_per_channel, 80);
        assert_eq!(packet.calib_attenuation, 3);
        assert_eq!(packet.calib_dc_offset, 1860);
        assert_eq!(packet.channel_coeffs, vec![0; 6]);
        assert!(packet.channel(4).iter().all(|&s| s == 1004));
    }

    #[test]
    fn every_row_is_full_after_short_unbalanced_frame() {
        let config = unfiltered();
        let mut pipeline = AcquisitionPipeline::new(&config).unwrap();
        let frame: Vec<ConversionRecord> = balanced_frame(&config, |i, _| 1800 + i as u16)
            .into_iter()
            .filter(|r| !(r.channel == 6 && r.value > 1830))
            .take(300)
            .collect();

        let report = pipeline.process_frame(&frame, Instant::now());
        assert_eq!(report.dropped_records, 0);
        for (row, &id) in config.acquisition.channel_pattern.iter().enumerate() {
            let delivered: Vec<i16> = frame
                .iter()
                .filter(|r| r.channel == id)
                .map(|r| r.value as i16)
                .collect();
            let samples = pipeline.packet().channel(row);
            let last = *delivered.last().unwrap();
            assert!(delivered.len() < 80, "row {} should be short", row);
            assert_eq!(&samples[..delivered.len()], delivered.as_slice());
            assert!(samples[delivered.len()..].iter().all(|&s| s == last), "row {}", row);
            assert!(samples.iter().all(|&s| s != 0), "row {} kept a zero slot", row);
        }
        assert_eq!(pipeline.packet().channel(2)[79], 1830);
        assert_eq!(pipeline.packet().channel(5)[79], 1852);
    }

    #[test]
    fn packet_counter_wraps_silently() {
        let config = unfiltered();
        let mut pipeline = AcquisitionPipeline::new(&config).unwrap();
        pipeline.set_next_count(u32::MAX);
        let frame = balanced_frame(&config, |_, _| 10);
        let start = Instant::now();
        assert_eq!(pipeline.process_frame(&frame, start).packet_count, u32::MAX);
        assert_eq!(
            pipeline
                .process_frame(&frame, start + Duration::from_millis(10))
                .packet_count,
            0
        );
    }

    #[test]
    fn rate_is_unset_first_then_reciprocal() {
        let config = unfiltered();
        let mut pipeline = AcquisitionPipeline::new(&config).unwrap();
        let frame = balanced_frame(&config, |_, _| 10);
        let start = Instant::now();

        let first = pipeline.process_frame(&frame, start);
        assert_eq!(first.measured_rate, None);
        assert_eq!(pipeline.packet().measured_output_rate, 0.0);

        let second = pipeline.process_frame(&frame, start + Duration::from_millis(40));
        assert_relative_eq!(second.measured_rate.unwrap(), 25.0, epsilon = 1e-3);
        assert_relative_eq!(pipeline.packet().measured_output_rate, 25.0, epsilon = 1e-3);

        let stalled = pipeline.process_frame(&frame, start + Duration::from_millis(40));
        assert_relative_eq!(stalled.measured_rate.unwrap(), 25.0, epsilon = 1e-3);
    }

    #[test]
    fn identical_frames_differ_only_through_filter_memory() {
        let config = DeviceConfig::default();
        let mut pipeline = AcquisitionPipeline::new(&config).unwrap();
        let frame = balanced_frame(&config, |i, row| 1700 + (i * 3 + row * 11) as u16);
        let start = Instant::now();

        pipeline.process_frame(&frame, start);
        let first = pipeline.packet().clone();
        pipeline.process_frame(&frame, start + Duration::from_millis(14));
        let second = pipeline.packet().clone();

        assert_eq!(first.samples().len(), second.samples().len());
        assert_ne!(first.samples(), second.samples());

        let mut raw = AcquisitionPipeline::new(&unfiltered()).unwrap();
        raw.process_frame(&frame, start);
        let raw_first = raw.packet().clone();
        raw.process_frame(&frame, start + Duration::from_millis(14));
        assert_eq!(raw_first.samples(), raw.packet().samples());
    }

    #[test]
    fn rejects_invalid_configuration() {
        let mut config = DeviceConfig::default();
        config.acquisition.channel_pattern.clear();
        assert!(AcquisitionPipeline::new(&config).is_err());
    }
}
