/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of SPECTACT, a Rust library for building emulators.

    For the full copyright notice, see the lib.rs file.
*/
#[cfg(feature = "snapshot")]
use serde::{Serialize, Deserialize};

use log::{debug, trace};

use crate::tap::TapeBlock;
use super::consts::*;

/// The classification of a MIC pulse by its length.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MicPulse {
    None,
    TooShort,
    TooLong,
    Pilot,
    Sync1,
    Sync2,
    Bit0,
    Bit1,
    TermSync,
}

/// The phase of a [MicPulseRecorder].
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SavePhase {
    None,
    Pilot,
    Sync1,
    Sync2,
    Data,
    Error,
}

/// Decodes MIC pulse lengths into [TapeBlock]s.
///
/// Pulses must be fed with [MicPulseRecorder::process_pulse] in the order they were produced.
/// An unexpected pulse drops the block being recorded and the recorder waits for the next
/// lead tone.
#[derive(Clone, Debug)]
pub struct MicPulseRecorder {
    phase: SavePhase,
    pilot_pulse_count: u32,
    bit_offset: u8,
    data_byte: u8,
    data_buffer: Vec<u8>,
    prev_data_pulse: MicPulse,
    data_block_count: u32,
}

impl Default for MicPulseRecorder {
    fn default() -> Self {
        MicPulseRecorder {
            phase: SavePhase::None,
            pilot_pulse_count: 0,
            bit_offset: 0,
            data_byte: 0,
            data_buffer: Vec::new(),
            prev_data_pulse: MicPulse::None,
            data_block_count: 0,
        }
    }
}

#[inline]
fn is_near(length: u64, expected: u32) -> bool {
    let expected = u64::from(expected);
    let tolerance = u64::from(SAVE_PULSE_TOLERANCE);
    length >= expected - tolerance && length <= expected + tolerance
}

/// Classifies the pulse by its `length` in T-states.
pub fn classify_pulse(length: u64) -> MicPulse {
    if is_near(length, ZERO_PULSE_LENGTH) {
        MicPulse::Bit0
    }
    else if is_near(length, ONE_PULSE_LENGTH) {
        MicPulse::Bit1
    }
    else if is_near(length, LEAD_PULSE_LENGTH) {
        MicPulse::Pilot
    }
    else if is_near(length, SYNC_PULSE1_LENGTH) {
        MicPulse::Sync1
    }
    else if is_near(length, SYNC_PULSE2_LENGTH) {
        MicPulse::Sync2
    }
    else if is_near(length, TERM_SYNC_LENGTH) {
        MicPulse::TermSync
    }
    else if length < u64::from(SYNC_PULSE1_LENGTH - SAVE_PULSE_TOLERANCE) {
        MicPulse::TooShort
    }
    else if length > u64::from(LEAD_PULSE_LENGTH + 2 * SAVE_PULSE_TOLERANCE) {
        MicPulse::TooLong
    }
    else {
        MicPulse::None
    }
}

impl MicPulseRecorder {
    pub fn new() -> Self {
        MicPulseRecorder::default()
    }
    /// Forgets everything recorded so far including the block counter.
    pub fn reset(&mut self) {
        *self = MicPulseRecorder::default();
    }
    #[inline]
    pub fn phase(&self) -> SavePhase {
        self.phase
    }
    #[inline]
    pub fn pilot_pulse_count(&self) -> u32 {
        self.pilot_pulse_count
    }
    /// The bytes of the block recorded so far.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data_buffer
    }
    /// The number of blocks terminated since the last reset.
    #[inline]
    pub fn data_block_count(&self) -> u32 {
        self.data_block_count
    }
    /// Processes the pulse of the given `length` in T-states.
    ///
    /// Returns a block when its terminating sync pulse has been received.
    pub fn process_pulse(&mut self, length: u64) -> Option<TapeBlock> {
        let pulse = classify_pulse(length);
        let mut block = None;
        let next_phase = match (self.phase, pulse) {
            (SavePhase::None, MicPulse::TooShort|MicPulse::TooLong) => SavePhase::None,
            (SavePhase::None, MicPulse::Pilot) => {
                self.pilot_pulse_count = 1;
                SavePhase::Pilot
            }
            (SavePhase::Pilot, MicPulse::Pilot) => {
                self.pilot_pulse_count += 1;
                SavePhase::Pilot
            }
            (SavePhase::Pilot, MicPulse::Sync1) if self.pilot_pulse_count >= MIN_PILOT_PULSE_COUNT => {
                SavePhase::Sync1
            }
            (SavePhase::Sync1, MicPulse::Sync2) => SavePhase::Sync2,
            (SavePhase::Sync2, MicPulse::Bit0|MicPulse::Bit1) => {
                self.prev_data_pulse = pulse;
                self.bit_offset = 0;
                self.data_byte = 0;
                self.data_buffer.clear();
                SavePhase::Data
            }
            (SavePhase::Data, MicPulse::Bit0|MicPulse::Bit1) => self.data_pulse(pulse),
            (SavePhase::Data, MicPulse::TermSync) => {
                self.data_block_count += 1;
                let data = core::mem::take(&mut self.data_buffer);
                debug!("recorded block {}: {} bytes", self.data_block_count, data.len());
                block = TapeBlock::new(data).ok();
                SavePhase::None
            }
            _ => SavePhase::Error
        };
        self.phase = match next_phase {
            SavePhase::Error => {
                trace!("unexpected {:?} pulse ({} T) in {:?}", pulse, length, self.phase);
                SavePhase::None
            }
            phase => phase
        };
        block
    }

    fn data_pulse(&mut self, pulse: MicPulse) -> SavePhase {
        if self.prev_data_pulse == MicPulse::None {
            self.prev_data_pulse = pulse;
            return SavePhase::Data
        }
        if self.prev_data_pulse != pulse {
            return SavePhase::Error
        }
        self.prev_data_pulse = MicPulse::None;
        self.bit_offset += 1;
        self.data_byte = (self.data_byte << 1) | (pulse == MicPulse::Bit1) as u8;
        if self.bit_offset == 8 {
            if self.data_buffer.len() == DATA_BUFFER_LENGTH {
                debug!("recorded block exceeds {} bytes", DATA_BUFFER_LENGTH);
                return SavePhase::Error
            }
            self.data_buffer.push(self.data_byte);
            self.data_byte = 0;
            self.bit_offset = 0;
        }
        SavePhase::Data
    }
}

#[cfg(test)]
mod tests {
    use crate::tap::TapFileWriter;
    use crate::tap::pulse::BlockPulseIter;
    use super::*;

    fn record(recorder: &mut MicPulseRecorder, data: &[u8]) -> Option<TapeBlock> {
        let mut result = None;
        for pulse in BlockPulseIter::new(data) {
            assert!(result.is_none());
            result = recorder.process_pulse(pulse.into());
        }
        result
    }

    #[test]
    fn classify_pulse_works() {
        assert_eq!(classify_pulse(2168), MicPulse::Pilot);
        assert_eq!(classify_pulse(2168 - 24), MicPulse::Pilot);
        assert_eq!(classify_pulse(2168 + 24), MicPulse::Pilot);
        assert_eq!(classify_pulse(2168 + 25), MicPulse::None);
        assert_eq!(classify_pulse(2168 + 49), MicPulse::TooLong);
        assert_eq!(classify_pulse(667), MicPulse::Sync1);
        assert_eq!(classify_pulse(735 + 24), MicPulse::Sync2);
        assert_eq!(classify_pulse(855 - 24), MicPulse::Bit0);
        assert_eq!(classify_pulse(1710 + 24), MicPulse::Bit1);
        assert_eq!(classify_pulse(947), MicPulse::TermSync);
        assert_eq!(classify_pulse(642), MicPulse::TooShort);
        assert_eq!(classify_pulse(0), MicPulse::TooShort);
        assert_eq!(classify_pulse(1200), MicPulse::None);
        assert_eq!(classify_pulse(u64::MAX), MicPulse::TooLong);
    }

    #[test]
    fn recorder_round_trip_works() {
        let mut recorder = MicPulseRecorder::new();
        let header = TapeBlock::with_checksum(0x00, b"\x03HELLO     \x02\x00\x00\x00\x00\x80");
        let block = record(&mut recorder, header.data()).unwrap();
        assert_eq!(block.data(), header.data());
        assert_eq!(block.name().as_deref(), Some("HELLO"));
        assert_eq!(recorder.phase(), SavePhase::None);
        let data: Vec<u8> = (0..=255).collect();
        let block = record(&mut recorder, &data).unwrap();
        assert_eq!(block.data(), &data[..]);
        assert_eq!(recorder.data_block_count(), 2);
    }

    #[test]
    fn recorder_requires_long_pilot() {
        let mut recorder = MicPulseRecorder::new();
        for _ in 0..2999 {
            assert_eq!(recorder.process_pulse(2168), None);
        }
        assert_eq!(recorder.pilot_pulse_count(), 2999);
        recorder.process_pulse(667);
        assert_eq!(recorder.phase(), SavePhase::None);
        for _ in 0..3000 {
            recorder.process_pulse(2170);
        }
        recorder.process_pulse(667);
        assert_eq!(recorder.phase(), SavePhase::Sync1);
    }

    #[test]
    fn recorder_drops_malformed_blocks() {
        let mut recorder = MicPulseRecorder::new();
        let pulses: Vec<u32> = BlockPulseIter::new(&[0xff, 0x55]).collect();
        let n = pulses.len();
        // unequal halves of a bit
        for (i, &pulse) in pulses.iter().enumerate() {
            let pulse = if i == n - 4 { ONE_PULSE_LENGTH } else { pulse };
            assert_eq!(recorder.process_pulse(pulse.into()), None);
            if i == n - 4 {
                assert_eq!(recorder.phase(), SavePhase::None);
            }
        }
        assert_eq!(recorder.data_block_count(), 0);
        // noise in the pilot tone resets the state
        recorder.process_pulse(2168);
        assert_eq!(recorder.phase(), SavePhase::Pilot);
        recorder.process_pulse(1200);
        assert_eq!(recorder.phase(), SavePhase::None);
        // the next block is recorded as usual
        let block = record(&mut recorder, &[0xff, 1, 2, 3]).unwrap();
        assert_eq!(block.data(), [0xff, 1, 2, 3]);
        recorder.reset();
        assert_eq!(recorder.data_block_count(), 0);
    }

    #[test]
    fn recorder_limits_block_size() {
        let mut recorder = MicPulseRecorder::new();
        let data = vec![0xA5u8; DATA_BUFFER_LENGTH];
        let block = record(&mut recorder, &data).unwrap();
        assert_eq!(block.len(), 0xFFFF);
        let mut writer = TapFileWriter::new(Vec::new());
        writer.write_block(&block).unwrap();
        assert_eq!(writer.get_ref().len(), 2 + 0xFFFF);
        // one byte more does not fit in a TAP chunk
        let data = vec![0xA5u8; DATA_BUFFER_LENGTH + 1];
        for pulse in BlockPulseIter::new(&data) {
            assert_eq!(recorder.process_pulse(pulse.into()), None);
        }
        assert_eq!(recorder.data_block_count(), 1);
    }
}
