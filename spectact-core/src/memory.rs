/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of SPECTACT, a Rust library for building emulators.

    For the full copyright notice, see the lib.rs file.
*/
//! Memory access contracts of the host emulator.
use core::fmt;

/// The address of the first byte of the screen memory in the 16-bit address space.
pub const SCREEN_ADDRESS: u16 = 0x4000;
/// The address of the first byte of the screen attributes in the 16-bit address space.
pub const ATTRS_ADDRESS: u16 = 0x5800;
/// The size of the whole screen memory (pixels and attributes).
pub const SCREEN_SIZE: u16 = 0x1B00;

/// A trait used by the screen renderer to fetch pixel and attribute bytes.
///
/// This is the ULA side of the memory bus, so implementations should not apply
/// any contention or side effects.
pub trait ScreenMemory {
    /// Reads a byte at the given `addr` in the 16-bit address space.
    fn read_screen_byte(&self, addr: u16) -> u8;
}

/// A trait for interfacing the CPU side of the host memory.
///
/// The library never assumes an address space larger than 64K.
pub trait MemoryAccess {
    /// Reads a byte at the given `addr`.
    fn read_byte(&self, addr: u16) -> u8;
    /// Writes a byte at the given `addr`.
    ///
    /// Writes to read-only regions should be silently ignored.
    fn write_byte(&mut self, addr: u16, val: u8);
}

impl<M: MemoryAccess + ?Sized> ScreenMemory for M {
    #[inline]
    fn read_screen_byte(&self, addr: u16) -> u8 {
        self.read_byte(addr)
    }
}

impl<M: MemoryAccess + ?Sized> MemoryAccess for &mut M {
    #[inline]
    fn read_byte(&self, addr: u16) -> u8 {
        (**self).read_byte(addr)
    }
    #[inline]
    fn write_byte(&mut self, addr: u16, val: u8) {
        (**self).write_byte(addr, val)
    }
}

/// A flat, writable 64K memory.
///
/// Useful as a host memory implementation for tools and tests.
#[derive(Clone)]
pub struct Memory64k {
    mem: Box<[u8; 0x10000]>,
}

impl Default for Memory64k {
    fn default() -> Self {
        Memory64k { mem: Box::new([0; 0x10000]) }
    }
}

impl fmt::Debug for Memory64k {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memory64k").finish_non_exhaustive()
    }
}

impl Memory64k {
    pub fn new() -> Self {
        Self::default()
    }
    /// Returns a view into the whole memory.
    pub fn mem_ref(&self) -> &[u8] {
        &self.mem[..]
    }
    /// Returns a mutable view into the whole memory.
    pub fn mem_mut(&mut self) -> &mut [u8] {
        &mut self.mem[..]
    }
    /// Copies `data` into memory starting at `addr`, wrapping at the end of the address space.
    pub fn load(&mut self, addr: u16, data: &[u8]) {
        let mut addr = addr;
        for &byte in data {
            self.mem[addr as usize] = byte;
            addr = addr.wrapping_add(1);
        }
    }
}

impl MemoryAccess for Memory64k {
    #[inline]
    fn read_byte(&self, addr: u16) -> u8 {
        self.mem[addr as usize]
    }
    #[inline]
    fn write_byte(&mut self, addr: u16, val: u8) {
        self.mem[addr as usize] = val;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory64k_works() {
        let mut mem = Memory64k::new();
        assert_eq!(0, mem.read_byte(0xFFFF));
        mem.write_byte(SCREEN_ADDRESS, 0xA5);
        assert_eq!(0xA5, mem.read_screen_byte(SCREEN_ADDRESS));
        mem.load(0xFFFE, &[1, 2, 3]);
        assert_eq!(&[3], &mem.mem_ref()[0..1]);
        assert_eq!(&[1, 2], &mem.mem_ref()[0xFFFE..]);
        let mref = &mut mem;
        mref.write_byte(ATTRS_ADDRESS, 0x38);
        assert_eq!(0x38, mem.read_byte(ATTRS_ADDRESS));
    }
}
