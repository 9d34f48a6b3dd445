/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of SPECTACT, a Rust library for building emulators.

    For the full copyright notice, see the lib.rs file.
*/
//! Tact (T-state) counter types and the clock contract of the host CPU loop.
use core::num::NonZeroU32;

#[cfg(feature = "snapshot")]
use serde::{Serialize, Deserialize};

/// A monotonically increasing CPU clock cycle counter, counted since the emulation started.
pub type Tact = u64;
/// A tact offset counted from the beginning of a single video frame.
pub type FrameTact = u32;

/// The CPU clock rate of the ZX Spectrum 16k/48k in tacts per second.
pub const CPU_HZ_48K: u32 = 3_500_000;

/// Implemented by the host CPU loop to provide the running tact counter.
///
/// Devices never run on their own clock. All waiting is expressed as a comparison
/// of the values returned from this method.
pub trait TactClock {
    /// Returns the current value of the CPU tact counter.
    fn current_tact(&self) -> Tact;
}

impl TactClock for Tact {
    #[inline]
    fn current_tact(&self) -> Tact {
        *self
    }
}

/// A simple tact counter, advanced by the host after each executed instruction.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TactCounter {
    /// The current tact value.
    pub tact: Tact,
}

impl TactCounter {
    pub const fn new(tact: Tact) -> Self {
        TactCounter { tact }
    }
    /// Advances the counter by the given number of tacts.
    #[inline]
    pub fn add(&mut self, delta: u32) {
        self.tact = self.tact.wrapping_add(delta.into());
    }
    /// Returns the number of completed frames and the tact offset within the current frame.
    #[inline]
    pub fn frame_tact(self, frame_tacts: NonZeroU32) -> (u64, FrameTact) {
        normalize_tact(self.tact, frame_tacts)
    }
}

impl TactClock for TactCounter {
    #[inline]
    fn current_tact(&self) -> Tact {
        self.tact
    }
}

impl From<Tact> for TactCounter {
    fn from(tact: Tact) -> Self {
        TactCounter { tact }
    }
}

/// Splits an absolute `tact` into a frame counter and a tact offset within that frame.
///
/// The returned offset is always in the range: `[0, frame_tacts)`.
#[inline]
pub fn normalize_tact(tact: Tact, frame_tacts: NonZeroU32) -> (u64, FrameTact) {
    let frame_tacts = u64::from(frame_tacts.get());
    (tact / frame_tacts, (tact % frame_tacts) as FrameTact)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tact_counter_works() {
        let frame = NonZeroU32::new(69888).unwrap();
        let mut counter = TactCounter::default();
        assert_eq!(0, counter.current_tact());
        assert_eq!((0, 0), counter.frame_tact(frame));
        counter.add(69887);
        assert_eq!((0, 69887), counter.frame_tact(frame));
        counter.add(1);
        assert_eq!((1, 0), counter.frame_tact(frame));
        counter.add(70000);
        assert_eq!(139888, counter.current_tact());
        assert_eq!((2, 112), counter.frame_tact(frame));
        assert_eq!(42, 42u64.current_tact());
    }
}
