use crate::prelude::ChannelFilter;

const B0: f32 = 0.7094;
const B1: f32 = 1.0;
const A1: f32 = 0.7094;

/// First-order Thiran all-pass used as a fractional delay.
///
/// Corrects the phase skew between channels that the sequential scan
/// introduces; only the odd packet rows go through it by default.
#[derive(Debug, Clone, Default)]
pub struct ThiranDelay {
    prev_input: f32,
    prev_output: f32,
}

impl ThiranDelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> (f32, f32) {
        (self.prev_input, self.prev_output)
    }
}

impl ChannelFilter for ThiranDelay {
    fn apply(&mut self, input: &[f32], output: &mut [f32]) {
        for (sample, out) in input.iter().zip(output.iter_mut()) {
            let value = B0 * sample + B1 * self.prev_input - A1 * self.prev_output;
            self.prev_input = *sample;
            self.prev_output = value;
            *out = value;
        }
    }

    fn reset(&mut self) {
        self.prev_input = 0.0;
        self.prev_output = 0.0;
    }
}
