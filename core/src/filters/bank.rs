use crate::config::FilterConfig;
use crate::filters::{ButterworthLowPass, ThiranDelay};
use crate::packet::MeasurementPacket;
use crate::prelude::ChannelFilter;

/// Clamps a filtered value to the 16-bit range, then truncates toward zero.
pub fn saturate_to_i16(value: f32) -> i16 {
    if value > f32::from(i16::MAX) {
        i16::MAX
    } else if value < f32::from(i16::MIN) {
        i16::MIN
    } else {
        value as i16
    }
}

/// Per-channel filter state for one pipeline, built once at startup.
pub struct FilterBank {
    delay_enabled: bool,
    low_pass_enabled: bool,
    delays: Vec<(usize, ThiranDelay)>,
    low_pass: Vec<ButterworthLowPass>,
    input: Vec<f32>,
    output: Vec<f32>,
}

impl FilterBank {
    pub fn new(config: &FilterConfig, channels: usize, samples_per_channel: usize) -> Self {
        let mut rows: Vec<usize> = config
            .delayed_channels
            .iter()
            .copied()
            .filter(|&row| row < channels)
            .collect();
        rows.sort_unstable();
        rows.dedup();

        Self {
            delay_enabled: config.fractional_delay,
            low_pass_enabled: config.low_pass,
            delays: rows.into_iter().map(|row| (row, ThiranDelay::new())).collect(),
            low_pass: (0..channels).map(|_| ButterworthLowPass::new()).collect(),
            input: vec![0.0; samples_per_channel],
            output: vec![0.0; samples_per_channel],
        }
    }

    /// Phase correction on the delayed rows first, then low-pass on every row.
    pub fn apply(&mut self, packet: &mut MeasurementPacket) {
        if self.delay_enabled {
            for (row, filter) in self.delays.iter_mut() {
                run_filter(filter, packet.channel_mut(*row), &mut self.input, &mut self.output);
            }
        }
        if self.low_pass_enabled {
            for (row, filter) in self.low_pass.iter_mut().enumerate() {
                run_filter(filter, packet.channel_mut(row), &mut self.input, &mut self.output);
            }
        }
    }

    /// Clears every delay line, e.g. after the sampler was restarted.
    pub fn reset(&mut self) {
        self.delays.iter_mut().for_each(|(_, filter)| filter.reset());
        self.low_pass.iter_mut().for_each(ChannelFilter::reset);
    }

    pub fn delayed_rows(&self) -> Vec<usize> {
        self.delays.iter().map(|(row, _)| *row).collect()
    }

    pub fn low_pass_state(&self, row: usize) -> Option<&ButterworthLowPass> {
        self.low_pass.get(row)
    }
}

fn run_filter<F: ChannelFilter>(
    filter: &mut F,
    samples: &mut [i16],
    input: &mut Vec<f32>,
    output: &mut Vec<f32>,
) {
    input.clear();
    input.extend(samples.iter().map(|&s| f32::from(s)));
    output.resize(samples.len(), 0.0);

    filter.apply(input, output);

    for (sample, value) in samples.iter_mut().zip(output.iter()) {
        *sample = saturate_to_i16(*value);
    }
}
