use crate::acquisition::sampler::{ConversionRecord, ADC_VALUE_MASK};
use crate::packet::MeasurementPacket;

/// Sorts conversion records into packet rows and pads short rows.
#[derive(Debug, Clone)]
pub struct ChannelAssembler {
    pattern: Vec<u8>,
    fill: Vec<usize>,
    capacity: usize,
}

impl ChannelAssembler {
    pub fn new(pattern: Vec<u8>, capacity: usize) -> Self {
        let fill = vec![0; pattern.len()];
        Self {
            pattern,
            fill,
            capacity,
        }
    }

    /// Appends each record to its row; returns how many were dropped
    /// because the channel is unknown or its row is already full.
    pub fn push_frame(&mut self, records: &[ConversionRecord], packet: &mut MeasurementPacket) -> usize {
        let mut dropped = 0;
        for record in records {
            let Some(row) = self.pattern.iter().position(|&id| id == record.channel) else {
                dropped += 1;
                continue;
            };
            let index = self.fill[row];
            if index >= self.capacity {
                dropped += 1;
                continue;
            }
            packet.channel_mut(row)[index] = (record.value & ADC_VALUE_MASK) as i16;
            self.fill[row] = index + 1;
        }
        dropped
    }

    /// Holds each short row's last stored value forward to full length.
    ///
    /// Zero doubles as the "not written" marker: a zero in the first slot is
    /// replaced by the second sample, a zero in the last slot by the one
    /// before it, even when the hardware genuinely read zero.
    pub fn fill_gaps(&mut self, packet: &mut MeasurementPacket) {
        let capacity = self.capacity;
        for (row, filled) in self.fill.iter_mut().enumerate() {
            let samples = packet.channel_mut(row);
            if *filled > 0 && *filled < capacity {
                let held = samples[*filled - 1];
                samples[*filled..].fill(held);
            }
            *filled = capacity;

            if capacity >= 2 {
                if samples[0] == 0 {
                    samples[0] = samples[1];
                }
                if samples[capacity - 1] == 0 {
                    samples[capacity - 1] = samples[capacity - 2];
                }
            }
        }
    }

    pub fn fill_levels(&self) -> &[usize] {
        &self.fill
    }

    pub fn reset(&mut self) {
        self.fill.iter_mut().for_each(|slot| *slot = 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketLayout;

    fn setup(samples: usize) -> (ChannelAssembler, MeasurementPacket) {
        (
            ChannelAssembler::new(vec![0, 3, 6], samples),
            MeasurementPacket::new(PacketLayout::new(3, samples)),
        )
    }

    fn interleaved(rounds: u16) -> Vec<ConversionRecord> {
        (0..rounds)
            .flat_map(|i| {
                [
                    ConversionRecord::new(0, 100 + i),
                    ConversionRecord::new(3, 200 + i),
                    ConversionRecord::new(6, 300 + i),
                ]
            })
            .collect()
    }

    #[test]
    fn balanced_frame_fills_every_row() {
        let (mut assembler, mut packet) = setup(4);
        let dropped = assembler.push_frame(&interleaved(4), &mut packet);
        assert_eq!(dropped, 0);
        assert_eq!(assembler.fill_levels(), &[4, 4, 4]);
        assert_eq!(packet.channel(1), &[200, 201, 202, 203]);
    }

    #[test]
    fn unknown_and_overflowing_records_are_dropped() {
        let (mut assembler, mut packet) = setup(2);
        let mut records = interleaved(3);
        records.push(ConversionRecord::new(5, 999));
        let dropped = assembler.push_frame(&records, &mut packet);
        assert_eq!(dropped, 4);
        assert_eq!(packet.channel(2), &[300, 301]);
    }

    #[test]
    fn short_rows_hold_last_value() {
        let (mut assembler, mut packet) = setup(6);
        let mut records = interleaved(2);
        records.push(ConversionRecord::new(0, 150));
        assembler.push_frame(&records, &mut packet);
        assembler.fill_gaps(&mut packet);

        assert_eq!(packet.channel(0), &[100, 101, 150, 150, 150, 150]);
        assert_eq!(packet.channel(1), &[200, 201, 201, 201, 201, 201]);
        assert_eq!(assembler.fill_levels(), &[6, 6, 6]);
    }

    #[test]
    fn silent_row_stays_zero() {
        let (mut assembler, mut packet) = setup(4);
        let records = vec![ConversionRecord::new(0, 5), ConversionRecord::new(3, 6)];
        assembler.push_frame(&records, &mut packet);
        assembler.fill_gaps(&mut packet);
        assert_eq!(packet.channel(2), &[0, 0, 0, 0]);
        assert!(packet.channel(0).iter().all(|&s| s == 5));
    }

    #[test]
    fn zero_reading_at_edges_is_treated_as_unwritten() {
        // A genuine zero reading is indistinguishable from an unwritten slot.
        let (mut assembler, mut packet) = setup(4);
        let records: Vec<ConversionRecord> = [0u16, 40, 41, 0]
            .iter()
            .map(|&v| ConversionRecord::new(3, v))
            .collect();
        assembler.push_frame(&records, &mut packet);
        assembler.fill_gaps(&mut packet);
        assert_eq!(packet.channel(1), &[40, 40, 41, 41]);
    }

    #[test]
    fn values_are_limited_to_adc_width() {
        let (mut assembler, mut packet) = setup(2);
        let records = vec![
            ConversionRecord::new(0, 0xffff),
            ConversionRecord::new(0, 0x8123),
        ];
        assembler.push_frame(&records, &mut packet);
        assert_eq!(&packet.channel(0)[..2], &[0x0fff, 0x0123]);
    }

    #[test]
    fn repeated_frames_produce_identical_shape() {
        let (mut assembler, mut first) = setup(5);
        let records = vec![
            ConversionRecord::new(6, 7),
            ConversionRecord::new(0, 9),
            ConversionRecord::new(6, 8),
        ];
        assembler.push_frame(&records, &mut first);
        assembler.fill_gaps(&mut first);
        assembler.reset();

        let mut second = MeasurementPacket::new(first.layout());
        assembler.push_frame(&records, &mut second);
        assembler.fill_gaps(&mut second);
        assert_eq!(first.samples(), second.samples());
    }
}
