/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of SPECTACT, a Rust library for building emulators.

    For the full copyright notice, see the lib.rs file.
*/
#[cfg(feature = "snapshot")]
use serde::{Serialize, Deserialize};

use log::{debug, trace};

use spectact_core::clock::Tact;
use crate::tap::{TapeBlock, TapeError};
use super::consts::*;

/// The phase of a [TapeBlockPlayer].
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlayPhase {
    /// Playing the lead tone.
    Pilot,
    /// Playing the sync pulses.
    Sync,
    /// Playing data bits.
    Data,
    /// Playing the terminating sync pulse.
    TermSync,
    /// Playing the pause after the block.
    Pause,
    /// The block has been played.
    Completed,
}

/// Plays a single [TapeBlock] as the EAR bit signal.
///
/// The signal is a function of the time elapsed since [TapeBlockPlayer::init_play].
/// [TapeBlockPlayer::get_ear_bit] advances the internal byte and bit cursors, so it must be
/// called with monotonically non-decreasing tacts.
#[derive(Clone, Debug)]
pub struct TapeBlockPlayer {
    block: TapeBlock,
    started: bool,
    phase: PlayPhase,
    start_tact: Tact,
    pilot_end_tact: Tact,
    sync1_end_tact: Tact,
    sync2_end_tact: Tact,
    byte_index: usize,
    bit_mask: u8,
    bit_start_tact: Tact,
    term_sync_end_tact: Tact,
    pause_end_tact: Tact,
}

/// Plays a sequence of [TapeBlock]s one after another.
#[derive(Clone, Debug)]
pub struct TapeSetPlayer {
    blocks: Vec<TapeBlock>,
    current: usize,
    player: Option<TapeBlockPlayer>,
    eof: bool,
}

impl TapeBlockPlayer {
    pub fn new(block: TapeBlock) -> Self {
        TapeBlockPlayer {
            block,
            started: false,
            phase: PlayPhase::Pilot,
            start_tact: 0,
            pilot_end_tact: 0,
            sync1_end_tact: 0,
            sync2_end_tact: 0,
            byte_index: 0,
            bit_mask: 0x80,
            bit_start_tact: 0,
            term_sync_end_tact: 0,
            pause_end_tact: 0,
        }
    }
    #[inline]
    pub fn block(&self) -> &TapeBlock {
        &self.block
    }
    #[inline]
    pub fn phase(&self) -> PlayPhase {
        self.phase
    }
    #[inline]
    pub fn is_started(&self) -> bool {
        self.started
    }
    /// The index of the byte being played.
    #[inline]
    pub fn byte_index(&self) -> usize {
        self.byte_index
    }
    #[inline]
    pub fn start_tact(&self) -> Tact {
        self.start_tact
    }
    /// Starts playing the block at `start_tact`.
    pub fn init_play(&mut self, start_tact: Tact) {
        let pulses = if self.block.is_header() { LEAD_PULSES_HEAD } else { LEAD_PULSES_DATA };
        self.started = true;
        self.phase = PlayPhase::Pilot;
        self.start_tact = start_tact;
        self.pilot_end_tact = start_tact + Tact::from(pulses * LEAD_PULSE_LENGTH);
        self.sync1_end_tact = self.pilot_end_tact + Tact::from(SYNC_PULSE1_LENGTH);
        self.sync2_end_tact = self.sync1_end_tact + Tact::from(SYNC_PULSE2_LENGTH);
        self.byte_index = 0;
        self.bit_mask = 0x80;
        self.bit_start_tact = self.sync2_end_tact;
        self.term_sync_end_tact = 0;
        self.pause_end_tact = 0;
    }
    /// Returns the EAR bit at the given `tact` advancing the play cursors.
    ///
    /// Returns an error if called before [TapeBlockPlayer::init_play].
    pub fn get_ear_bit(&mut self, tact: Tact) -> Result<bool, TapeError> {
        if !self.started {
            return Err(TapeError::NotStarted)
        }
        if let PlayPhase::Pilot|PlayPhase::Sync = self.phase {
            if tact <= self.pilot_end_tact {
                let pos = tact.saturating_sub(self.start_tact);
                return Ok((pos / Tact::from(LEAD_PULSE_LENGTH)) % 2 == 0)
            }
            self.phase = PlayPhase::Sync;
            if tact <= self.sync1_end_tact {
                return Ok(false)
            }
            if tact <= self.sync2_end_tact {
                return Ok(true)
            }
            trace!("tape data at: {}", tact);
            self.phase = PlayPhase::Data;
        }
        match self.phase {
            PlayPhase::Data => Ok(self.data_bit(tact)),
            PlayPhase::TermSync => {
                if tact < self.term_sync_end_tact {
                    return Ok(false)
                }
                self.phase = PlayPhase::Pause;
                self.pause_end_tact = tact + Tact::from(self.block.pause_after_ms()) *
                                             Tact::from(PAUSE_MS_LENGTH);
                Ok(true)
            }
            PlayPhase::Pause => {
                if tact > self.pause_end_tact {
                    self.phase = PlayPhase::Completed;
                }
                Ok(true)
            }
            _ => Ok(true)
        }
    }

    fn data_bit(&mut self, tact: Tact) -> bool {
        let data = self.block.data();
        loop {
            let length = Tact::from(
                if data[self.byte_index] & self.bit_mask != 0 { ONE_PULSE_LENGTH }
                else { ZERO_PULSE_LENGTH });
            let bit_pos = tact.saturating_sub(self.bit_start_tact);
            if bit_pos < length {
                return false
            }
            if bit_pos < 2 * length {
                return true
            }
            self.bit_start_tact += 2 * length;
            self.bit_mask >>= 1;
            if self.bit_mask == 0 {
                self.bit_mask = 0x80;
                self.byte_index += 1;
                if self.byte_index >= data.len() {
                    self.phase = PlayPhase::TermSync;
                    self.term_sync_end_tact = tact + Tact::from(TERM_SYNC_LENGTH);
                    return false
                }
            }
        }
    }
}

impl TapeSetPlayer {
    /// Creates a player of the given blocks. Returns an error if there are no blocks.
    pub fn new(blocks: Vec<TapeBlock>) -> Result<Self, TapeError> {
        if blocks.is_empty() {
            return Err(TapeError::NoBlocks)
        }
        Ok(TapeSetPlayer { blocks, current: 0, player: None, eof: false })
    }
    #[inline]
    pub fn blocks(&self) -> &[TapeBlock] {
        &self.blocks
    }
    /// Returns `true` once all blocks have been played.
    #[inline]
    pub fn is_eof(&self) -> bool {
        self.eof
    }
    #[inline]
    pub fn current_block_index(&self) -> usize {
        self.current
    }
    /// Returns the block being played, `None` after the last block.
    pub fn current_block(&self) -> Option<&TapeBlock> {
        if self.eof { None } else { self.blocks.get(self.current) }
    }
    /// Returns the phase of the block being played, `None` if not playing.
    pub fn play_phase(&self) -> Option<PlayPhase> {
        self.player.as_ref().map(|p| p.phase())
    }
    /// Starts playing from the first block at `start_tact`.
    pub fn init_play(&mut self, start_tact: Tact) {
        self.eof = false;
        self.current = 0;
        self.start_block(start_tact);
    }
    /// Returns the EAR bit at the given `tact`, moving to the next block when the current one
    /// has been completed.
    ///
    /// The signal is high after the last block.
    pub fn get_ear_bit(&mut self, tact: Tact) -> Result<bool, TapeError> {
        if self.eof {
            return Ok(true)
        }
        let player = self.player.as_mut().ok_or(TapeError::NotStarted)?;
        let bit = player.get_ear_bit(tact)?;
        if player.phase() == PlayPhase::Completed {
            self.next_block(tact);
        }
        Ok(bit)
    }
    /// Skips to the next block, starting it at `tact`.
    pub fn next_block(&mut self, tact: Tact) {
        if self.eof {
            return
        }
        self.current += 1;
        if self.current >= self.blocks.len() {
            debug!("tape end of file");
            self.eof = true;
            self.player = None;
        }
        else {
            self.start_block(tact);
        }
    }

    fn start_block(&mut self, tact: Tact) {
        let block = self.blocks[self.current].clone();
        debug!("tape block {}: {}", self.current, block);
        let mut player = TapeBlockPlayer::new(block);
        player.init_play(tact);
        self.player = Some(player);
    }
}
