/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of SPECTACT, a Rust library for building emulators.

    For the full copyright notice, see the lib.rs file.
*/
//! The **TAPE** recorder device.
//!
//! [TapeDevice] watches the program counter of the CPU to detect when the ROM routines
//! are about to LOAD or SAVE data. While loading it provides the EAR input signal from the
//! blocks of the inserted tape, while saving it records the MIC output signal as tape blocks.
//! Both the tape content and the recorded blocks are handled by a [TapeProvider].
use core::fmt;

#[cfg(feature = "snapshot")]
use serde::{Serialize, Deserialize};

use log::{debug, trace, warn};

use spectact_core::clock::Tact;
use spectact_core::memory::MemoryAccess;
use spectact_core::z80emu::Cpu;
use spectact_formats::tap::pulse::{MicPulseRecorder, TapeSetPlayer, consts::SAVE_STOP_SILENCE};

mod provider;
pub mod romload;

pub use provider::*;
use romload::FastLoadStatus;

/// The current mode of the [TapeDevice].
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TapeMode {
    Passive,
    Load,
    Save
}

impl Default for TapeMode {
    fn default() -> Self {
        TapeMode::Passive
    }
}

/// Events published by the [TapeDevice] to its observers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TapeEvent {
    EnteredLoadMode,
    LeftLoadMode,
    EnteredSaveMode,
    LeftSaveMode,
    /// A block has been fast-loaded or the LOAD mode has ended.
    LoadCompleted
}

/// Subscribers of the [TapeDevice] events.
pub trait TapeObserver {
    fn on_tape_event(&mut self, event: TapeEvent);
}

impl<F: FnMut(TapeEvent)> TapeObserver for F {
    fn on_tape_event(&mut self, event: TapeEvent) {
        self(event)
    }
}

/// Addresses of the ROM routines the [TapeDevice] reacts to.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "snapshot", serde(rename_all = "camelCase"))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RomHooks {
    /// The entry of the LD-BYTES routine.
    pub load_bytes: u16,
    /// The entry of the SA-BYTES routine.
    pub save_bytes: u16,
    /// Where LD-BYTES returns on a flag byte mismatch or a verification failure.
    pub load_invalid_header: u16,
    /// Where LD-BYTES continues after the data has been loaded.
    pub load_resume: u16,
    /// The ROM error restart.
    pub error: u16,
}

impl RomHooks {
    /// The routines of the 48k ROM.
    pub const ZX_SPECTRUM_48: RomHooks = RomHooks {
        load_bytes: 0x056C,
        save_bytes: 0x04C2,
        load_invalid_header: 0x05B6,
        load_resume: 0x05E2,
        error: 0x0008,
    };
}

impl Default for RomHooks {
    fn default() -> Self {
        RomHooks::ZX_SPECTRUM_48
    }
}

/// The tape recorder.
///
/// Call [TapeDevice::on_cpu_operation_completed] after each CPU instruction and route the
/// EAR input and the MIC output of the ULA to [TapeDevice::get_ear_bit] and
/// [TapeDevice::process_mic_bit].
pub struct TapeDevice<P> {
    provider: P,
    hooks: RomHooks,
    fast_load: bool,
    mode: TapeMode,
    player: Option<TapeSetPlayer>,
    recorder: MicPulseRecorder,
    mic_bit: bool,
    last_mic_bit_tact: Tact,
    observers: Vec<Box<dyn TapeObserver>>,
}

impl<P: fmt::Debug> fmt::Debug for TapeDevice<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TapeDevice")
            .field("provider", &self.provider)
            .field("hooks", &self.hooks)
            .field("fast_load", &self.fast_load)
            .field("mode", &self.mode)
            .field("player", &self.player)
            .field("recorder", &self.recorder)
            .field("mic_bit", &self.mic_bit)
            .field("last_mic_bit_tact", &self.last_mic_bit_tact)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl<P: TapeProvider> TapeDevice<P> {
    /// Creates a device hooked to the 48k ROM routines with fast loading enabled.
    pub fn new(provider: P) -> Self {
        TapeDevice::with_hooks(provider, RomHooks::ZX_SPECTRUM_48)
    }

    pub fn with_hooks(provider: P, hooks: RomHooks) -> Self {
        TapeDevice {
            provider,
            hooks,
            fast_load: true,
            mode: TapeMode::Passive,
            player: None,
            recorder: MicPulseRecorder::new(),
            mic_bit: true,
            last_mic_bit_tact: 0,
            observers: Vec::new()
        }
    }

    pub fn hooks(&self) -> &RomHooks {
        &self.hooks
    }

    pub fn fast_load_enabled(&self) -> bool {
        self.fast_load
    }
    /// Enables or disables instant loading of blocks.
    pub fn set_fast_load(&mut self, enabled: bool) {
        self.fast_load = enabled;
    }

    pub fn mode(&self) -> TapeMode {
        self.mode
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn into_provider(self) -> P {
        self.provider
    }
    /// The player of the tape blocks while in the LOAD mode.
    pub fn player(&self) -> Option<&TapeSetPlayer> {
        self.player.as_ref()
    }

    pub fn recorder(&self) -> &MicPulseRecorder {
        &self.recorder
    }

    pub fn add_observer<O: TapeObserver + 'static>(&mut self, observer: O) {
        self.observers.push(Box::new(observer));
    }
    /// Rewinds the tape and returns to the passive mode without notifying observers.
    pub fn reset(&mut self) {
        self.provider.reset();
        self.player = None;
        self.recorder.reset();
        self.mode = TapeMode::Passive;
        self.mic_bit = true;
    }
    /// Should be called after every CPU instruction with the current T-state counter.
    ///
    /// Switches the mode of the device and performs fast loading when enabled.
    pub fn on_cpu_operation_completed<C: Cpu, M: MemoryAccess + ?Sized>(
            &mut self,
            cpu: &mut C,
            memory: &mut M,
            tact: Tact
        )
    {
        let pc = cpu.get_pc();
        self.set_tape_mode(pc, tact);
        if self.mode == TapeMode::Load && self.fast_load && pc == self.hooks.load_bytes
           && self.player.as_ref().map_or(false, |p| !p.is_eof())
           && self.fast_load(cpu, memory, tact)
        {
            self.notify(TapeEvent::LoadCompleted);
        }
    }
    /// Switches the mode depending on the program counter and the time passed since
    /// the last MIC output change.
    pub fn set_tape_mode(&mut self, pc: u16, tact: Tact) {
        match self.mode {
            TapeMode::Passive => {
                if pc == self.hooks.load_bytes {
                    self.enter_load_mode(tact);
                }
                else if pc == self.hooks.save_bytes {
                    self.enter_save_mode(tact);
                }
            }
            TapeMode::Save => {
                if pc == self.hooks.error
                   || tact.saturating_sub(self.last_mic_bit_tact) > SAVE_STOP_SILENCE
                {
                    self.leave_save_mode();
                }
            }
            TapeMode::Load => {
                if pc == self.hooks.error || self.player.as_ref().map_or(true, |p| p.is_eof()) {
                    self.leave_load_mode();
                    self.notify(TapeEvent::LoadCompleted);
                }
            }
        }
    }
    /// Returns the state of the EAR input at the given `tact`.
    ///
    /// This method advances the player, so it must be called with non-decreasing `tact` values.
    /// Returns `true` unless the device is loading.
    pub fn get_ear_bit(&mut self, tact: Tact) -> bool {
        if self.mode != TapeMode::Load {
            return true
        }
        match self.player.as_mut().map(|p| p.get_ear_bit(tact)) {
            Some(Ok(bit)) => bit,
            Some(Err(err)) => {
                trace!("tape player: {}", err);
                true
            }
            None => true
        }
    }
    /// Records the MIC output change at the given `tact`.
    ///
    /// Ignored unless the device is saving and the `bit` differs from the previous one.
    pub fn process_mic_bit(&mut self, tact: Tact, bit: bool) {
        if self.mode != TapeMode::Save || bit == self.mic_bit {
            return
        }
        let length = tact.saturating_sub(self.last_mic_bit_tact);
        self.mic_bit = bit;
        self.last_mic_bit_tact = tact;
        if let Some(block) = self.recorder.process_pulse(length) {
            debug!("saving {}", block);
            if self.recorder.data_block_count() == 1 {
                if let Some(name) = block.name() {
                    if let Err(err) = self.provider.set_name(&name) {
                        warn!("tape name: {}", err);
                    }
                }
            }
            if let Err(err) = self.provider.save_tape_block(&block) {
                warn!("tape save: {}", err);
            }
        }
    }
    /// Loads the current block directly into memory as the ROM LD-BYTES routine would and
    /// moves the player to the next block.
    ///
    /// Returns `false` if there is no block to load.
    pub fn fast_load<C: Cpu, M: MemoryAccess + ?Sized>(
            &mut self,
            cpu: &mut C,
            memory: &mut M,
            tact: Tact
        ) -> bool
    {
        let player = match self.player.as_mut() {
            Some(player) => player,
            None => return false
        };
        let block = match player.current_block() {
            Some(block) => block,
            None => return false
        };
        let status = romload::load_block(cpu, memory, &self.hooks, block);
        match status {
            FastLoadStatus::Completed { checksum_ok: true } => debug!("fast loaded {}", block),
            status => debug!("fast load {}: {:?}", block, status)
        }
        player.next_block(tact);
        true
    }

    fn enter_load_mode(&mut self, tact: Tact) {
        debug!("tape: entering LOAD mode");
        self.mode = TapeMode::Load;
        self.notify(TapeEvent::EnteredLoadMode);
        self.player = match self.provider.tape_content() {
            Ok(Some(blocks)) => match TapeSetPlayer::new(blocks) {
                Ok(mut player) => {
                    player.init_play(tact);
                    Some(player)
                }
                Err(err) => {
                    debug!("tape: {}", err);
                    None
                }
            }
            Ok(None) => None,
            Err(err) => {
                warn!("tape content: {}", err);
                None
            }
        };
    }

    fn leave_load_mode(&mut self) {
        debug!("tape: leaving LOAD mode");
        self.mode = TapeMode::Passive;
        self.player = None;
        self.provider.reset();
        self.notify(TapeEvent::LeftLoadMode);
    }

    fn enter_save_mode(&mut self, tact: Tact) {
        debug!("tape: entering SAVE mode");
        self.mode = TapeMode::Save;
        self.recorder.reset();
        self.mic_bit = true;
        self.last_mic_bit_tact = tact;
        if let Err(err) = self.provider.create_tape_file() {
            warn!("tape create: {}", err);
        }
        self.notify(TapeEvent::EnteredSaveMode);
    }

    fn leave_save_mode(&mut self) {
        debug!("tape: leaving SAVE mode");
        self.mode = TapeMode::Passive;
        if let Err(err) = self.provider.finalize_tape_file() {
            warn!("tape finalize: {}", err);
        }
        self.notify(TapeEvent::LeftSaveMode);
    }

    fn notify(&mut self, event: TapeEvent) {
        for observer in self.observers.iter_mut() {
            observer.on_tape_event(event);
        }
    }
}
