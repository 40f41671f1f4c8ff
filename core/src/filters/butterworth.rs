use crate::prelude::ChannelFilter;

/// Design cutoff the literal coefficients were computed for.
pub const DESIGN_CUTOFF_HZ: f32 = 350.0;
/// Sample rate the literal coefficients were computed for. The device
/// samples each channel at a different rate; the coefficients are kept as-is.
pub const DESIGN_SAMPLE_RATE_HZ: f32 = 4800.0;

const OUTPUT_GAIN: f32 = 1.0;

/// Fixed coefficients of one second-order section.
#[derive(Debug, Clone, Copy)]
pub struct SectionCoeffs {
    pub b: [f32; 3],
    pub a: [f32; 3],
    pub gain: f32,
}

#[allow(clippy::excessive_precision)]
pub const SECTION_1: SectionCoeffs = SectionCoeffs {
    b: [1.0, 2.0, 1.0],
    a: [1.0, -1.534090595278471, 0.710488594688278],
    gain: 0.0440994998524517,
};

#[allow(clippy::excessive_precision)]
pub const SECTION_2: SectionCoeffs = SectionCoeffs {
    b: [1.0, 2.0, 1.0],
    a: [1.0, -1.273404902142154, 0.419827856476049],
    gain: 0.0366057385834737,
};

/// Direct-form I biquad with two-sample input and output delay lines.
#[derive(Debug, Clone)]
struct BiquadSection {
    coeffs: SectionCoeffs,
    x: [f32; 2],
    y: [f32; 2],
}

impl BiquadSection {
    fn new(coeffs: SectionCoeffs) -> Self {
        Self {
            coeffs,
            x: [0.0; 2],
            y: [0.0; 2],
        }
    }

    fn step(&mut self, input: f32) -> f32 {
        let c = &self.coeffs;
        let output = c.gain * (c.b[0] * input + c.b[1] * self.x[0] + c.b[2] * self.x[1])
            - (c.a[1] * self.y[0] + c.a[2] * self.y[1]);

        self.x[1] = self.x[0];
        self.x[0] = input;
        self.y[1] = self.y[0];
        self.y[0] = output;

        output
    }

    fn clear(&mut self) {
        self.x = [0.0; 2];
        self.y = [0.0; 2];
    }

    fn is_clear(&self) -> bool {
        self.x == [0.0; 2] && self.y == [0.0; 2]
    }
}

/// Fourth-order Butterworth low-pass built from two cascaded biquads.
#[derive(Debug, Clone)]
pub struct ButterworthLowPass {
    first: BiquadSection,
    second: BiquadSection,
}

impl ButterworthLowPass {
    pub fn new() -> Self {
        Self {
            first: BiquadSection::new(SECTION_1),
            second: BiquadSection::new(SECTION_2),
        }
    }

    /// True while every delay line still holds zero.
    pub fn is_at_rest(&self) -> bool {
        self.first.is_clear() && self.second.is_clear()
    }

    /// Snapshot of the delay lines as `[x1, y1, x2, y2]` pairs.
    pub fn state(&self) -> [[f32; 2]; 4] {
        [self.first.x, self.first.y, self.second.x, self.second.y]
    }
}

impl Default for ButterworthLowPass {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelFilter for ButterworthLowPass {
    fn apply(&mut self, input: &[f32], output: &mut [f32]) {
        for (sample, out) in input.iter().zip(output.iter_mut()) {
            let stage_one = self.first.step(*sample);
            *out = self.second.step(stage_one) * OUTPUT_GAIN;
        }
    }

    fn reset(&mut self) {
        self.first.clear();
        self.second.clear();
    }
}
