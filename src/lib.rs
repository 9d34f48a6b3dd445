/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of SPECTACT, a Rust library for building emulators.

    SPECTACT is free software: you can redistribute it and/or modify it under
    the terms of the GNU Lesser General Public License (LGPL) as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    SPECTACT is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Lesser General Public License for more details.

    You should have received a copy of the GNU Lesser General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.

    Author contact information: see Cargo.toml file, section [package.authors].
*/
//! # SPECTACT
//!
//! Components for building ZX Spectrum emulators, driven by the T-state counter of the host
//! CPU emulation loop:
//!
//! * [video] - a tact-accurate ULA screen renderer with memory contention tables,
//! * [peripherals::tape] - the tape recorder with instant ROM loading,
//! * [peripherals::fdc] - the +3 floppy disk controller operating on [formats::vfd] images,
//! * [formats::tap] - *TAP* files and *TAPE* pulse encoding and decoding.
//!
//! The CPU is provided by the [z80emu] crate.
//!
//! ```no_run
//! use spectact::peripherals::tape::{TapeDevice, TapFileProvider};
//!
//! let mut provider = TapFileProvider::new("saved");
//! provider.insert(Some("game.tap"));
//! let mut tape = TapeDevice::new(provider);
//! // call tape.on_cpu_operation_completed(&mut cpu, &mut memory, tact) after each instruction
//! # let _ = tape.mode();
//! ```
pub use spectact_core::{clock, memory, video, z80emu};

#[cfg(feature = "formats")]
pub use spectact_formats as formats;

#[cfg(feature = "peripherals")]
pub use spectact_peripherals as peripherals;
