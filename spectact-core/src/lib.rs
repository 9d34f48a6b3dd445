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
//! The core components of the SPECTACT library.
//!
//! Every device in this library is a pure function of a monotonically increasing tact
//! (T-state) counter supplied by the host CPU loop. This crate defines that counter,
//! the contracts the host fulfills and the ULA screen renderer driven by a
//! precomputed [tact timing table][video::TactTimingTable].
pub mod clock;
pub mod memory;
pub mod video;

pub use z80emu;
