/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of SPECTACT, a Rust library for building emulators.

    For the full copyright notice, see the lib.rs file.
*/
//! **TAPE** pulse signal playing (LOAD) and recording (SAVE).
mod encoding;
mod player;
mod recorder;

pub mod consts {
    /// Length of the lead (pilot) pulse in T-states.
    pub const LEAD_PULSE_LENGTH : u32 = 2168;
    /// Length of the 1st sync pulse in T-states.
    pub const SYNC_PULSE1_LENGTH: u32 = 667;
    /// Length of the 2nd sync pulse in T-states.
    pub const SYNC_PULSE2_LENGTH: u32 = 735;
    /// Length of the bit value 0 pulse in T-states.
    pub const ZERO_PULSE_LENGTH : u32 = 855;
    /// Length of the bit value 1 pulse in T-states.
    pub const ONE_PULSE_LENGTH  : u32 = 1710;
    /// Length of the terminating sync pulse in T-states.
    pub const TERM_SYNC_LENGTH  : u32 = 947;
    /// Length of a single millisecond of pause in T-states.
    pub const PAUSE_MS_LENGTH   : u32 = 3500;

    /// The number of LEAD pulses for the header block.
    pub const LEAD_PULSES_HEAD: u32 = 8063;
    /// The number of LEAD pulses for the data block.
    pub const LEAD_PULSES_DATA: u32 = 3223;

    /// The tolerance of the recorded pulse length in T-states.
    pub const SAVE_PULSE_TOLERANCE: u32 = 24;
    /// The number of LEAD pulses needed to accept the 1st sync pulse while recording.
    pub const MIN_PILOT_PULSE_COUNT: u32 = 3000;
    /// The maximum size of a recorded block, the largest chunk a *TAP* file can hold.
    pub const DATA_BUFFER_LENGTH: usize = 0xFFFF;
    /// The silence in T-states after which recording stops.
    pub const SAVE_STOP_SILENCE: u64 = 17_500_000;
}

pub use encoding::*;
pub use player::*;
pub use recorder::*;
