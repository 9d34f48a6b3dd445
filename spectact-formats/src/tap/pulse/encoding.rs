/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of SPECTACT, a Rust library for building emulators.

    For the full copyright notice, see the lib.rs file.
*/
use super::consts::*;

/// The current state of the [BlockPulseIter].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PulseIterState {
    /// Emitting lead pulses.
    Lead {
        /// How many pulses left to the end of this lead.
        countdown: u32
    },
    /// Emitting the 1st sync pulse.
    Sync1,
    /// Emitting the 2nd sync pulse.
    Sync2,
    /// Emitting data pulses.
    Data {
        /// The index of the current byte.
        index: usize,
        /// A pulse counter for the current byte.
        /// There are two pulses per each bit (16 pulses per byte).
        pulse: u8
    },
    /// Emitting the terminating sync pulse.
    TermSync,
    /// Emitting is done.
    Done
}

/// Encodes block data as *TAPE* T-state pulse intervals via an [Iterator] interface.
///
/// The pulses are those the ROM *SAVE* routine produces on the MIC output: lead pulses
/// ([LEAD_PULSES_HEAD] if the first byte is less than 128, otherwise [LEAD_PULSES_DATA]), two sync
/// pulses, two pulses per each data bit and the terminating sync pulse.
#[derive(Clone, Debug)]
pub struct BlockPulseIter<'a> {
    data: &'a [u8],
    state: PulseIterState,
}

impl<'a> BlockPulseIter<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        let state = match data.first() {
            Some(flag) => PulseIterState::Lead {
                countdown: if flag & 0x80 == 0 { LEAD_PULSES_HEAD } else { LEAD_PULSES_DATA }
            },
            None => PulseIterState::Done
        };
        BlockPulseIter { data, state }
    }
    /// Returns the current state.
    pub fn state(&self) -> PulseIterState {
        self.state
    }
    /// Returns `true` if there are no more pulses to emit.
    pub fn is_done(&self) -> bool {
        self.state == PulseIterState::Done
    }
}

impl<'a> Iterator for BlockPulseIter<'a> {
    type Item = u32;
    fn next(&mut self) -> Option<u32> {
        match self.state {
            PulseIterState::Lead { countdown } => {
                self.state = match countdown - 1 {
                    0 => PulseIterState::Sync1,
                    countdown => PulseIterState::Lead { countdown }
                };
                Some(LEAD_PULSE_LENGTH)
            }
            PulseIterState::Sync1 => {
                self.state = PulseIterState::Sync2;
                Some(SYNC_PULSE1_LENGTH)
            }
            PulseIterState::Sync2 => {
                self.state = PulseIterState::Data { index: 0, pulse: 0 };
                Some(SYNC_PULSE2_LENGTH)
            }
            PulseIterState::Data { index, pulse } => {
                let bit_one = self.data[index] & (0x80 >> (pulse >> 1)) != 0;
                self.state = if pulse < 15 {
                    PulseIterState::Data { index, pulse: pulse + 1 }
                }
                else if index + 1 < self.data.len() {
                    PulseIterState::Data { index: index + 1, pulse: 0 }
                }
                else {
                    PulseIterState::TermSync
                };
                Some(if bit_one { ONE_PULSE_LENGTH } else { ZERO_PULSE_LENGTH })
            }
            PulseIterState::TermSync => {
                self.state = PulseIterState::Done;
                Some(TERM_SYNC_LENGTH)
            }
            PulseIterState::Done => None
        }
    }
}
