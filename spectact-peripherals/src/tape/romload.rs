/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of SPECTACT, a Rust library for building emulators.

    For the full copyright notice, see the lib.rs file.
*/
//! Instant loading of **TAPE** blocks into memory via the ROM loading routine.
use core::num::Wrapping;

use spectact_core::memory::MemoryAccess;
use spectact_core::z80emu::{Cpu, CpuFlags, Prefix, StkReg16, Reg8};
use spectact_formats::tap::TapeBlock;

use super::RomHooks;

/// The outcome of [load_block].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FastLoadStatus {
    /// The block type did not match the expected flag byte in `A'`.
    HeaderMismatch,
    /// Verifying found a byte differing from memory.
    VerifyFailed,
    /// All bytes have been loaded or verified, `checksum_ok` tells the outcome of the parity check.
    Completed { checksum_ok: bool },
}

/// Loads (or verifies) the `block` into `memory` the way the ROM LD-BYTES routine would,
/// after being entered with:
///
/// * `A'` - the expected flag byte,
/// * `F'` - CF=1 for LOAD, CF=0 for VERIFY,
/// * `IX` - the destination address,
/// * `DE` - the number of bytes to load.
///
/// On return `AF` holds the copy of `A'F'` with CF set only if the whole block was loaded
/// and its checksum matched, `IX` and `DE` are advanced by the number of processed bytes,
/// `H` holds the running checksum, `L` the last byte read and `PC` points to the ROM code
/// resuming after the routine.
pub fn load_block<C: Cpu, M: MemoryAccess + ?Sized>(
        cpu: &mut C,
        memory: &mut M,
        hooks: &RomHooks,
        block: &TapeBlock
    ) -> FastLoadStatus
{
    let (acc, flags) = cpu.get_alt_reg2(StkReg16::AF);
    let mut flags = CpuFlags::from_bits_truncate(flags);
    let is_load = flags.cf();
    let data = block.data();

    if data[0] != acc {
        let l = cpu.get_reg(Reg8::L, None);
        flags.remove(CpuFlags::Z|CpuFlags::C);
        cpu.set_acc(acc ^ l);
        cpu.set_flags(flags);
        cpu.set_pc(hooks.load_invalid_header);
        return FastLoadStatus::HeaderMismatch
    }

    let mut checksum = acc;
    let mut last = cpu.get_reg(Reg8::L, None);
    let mut limit = cpu.get_reg16(StkReg16::DE);
    let mut tgt_addr = Wrapping(cpu.get_index16(Prefix::Xdd));
    let mut bytes = data[1..].iter();
    let mut status = None;

    while limit > 0 {
        let octet = match bytes.next() {
            Some(&octet) => octet,
            None => break
        };
        last = octet;
        if !is_load {
            let current = memory.read_byte(tgt_addr.0);
            if current != octet {
                flags.remove(CpuFlags::Z|CpuFlags::C);
                cpu.set_acc(current ^ octet);
                cpu.set_flags(flags);
                cpu.set_pc(hooks.load_invalid_header);
                status = Some(FastLoadStatus::VerifyFailed);
                break
            }
        }
        else {
            memory.write_byte(tgt_addr.0, octet);
        }
        checksum ^= octet;
        tgt_addr += Wrapping(1);
        limit -= 1;
    }

    cpu.set_index16(Prefix::Xdd, tgt_addr.0);
    cpu.set_reg16(StkReg16::DE, limit);
    cpu.set_reg2(StkReg16::HL, checksum, last);
    if let Some(status) = status {
        return status
    }

    let checksum_ok = limit == 0 && bytes.next() == Some(&checksum);
    flags.set(CpuFlags::C, checksum_ok);
    cpu.set_acc(acc);
    cpu.set_flags(flags);
    cpu.set_pc(hooks.load_resume);
    FastLoadStatus::Completed { checksum_ok }
}

#[cfg(test)]
mod tests {
    use spectact_core::memory::Memory64k;
    use spectact_core::z80emu::Z80NMOS;
    use super::*;

    fn prepare_cpu(flag: u8, load: bool, addr: u16, len: u16) -> Z80NMOS {
        let mut cpu = Z80NMOS::default();
        cpu.reset();
        cpu.set_acc(flag);
        cpu.set_flags(if load { CpuFlags::C } else { CpuFlags::empty() });
        cpu.ex_af_af();
        cpu.set_acc(0x55);
        cpu.set_flags(CpuFlags::empty());
        cpu.set_index16(Prefix::Xdd, addr);
        cpu.set_reg16(StkReg16::DE, len);
        cpu.set_pc(RomHooks::ZX_SPECTRUM_48.load_bytes);
        cpu
    }

    #[test]
    fn fast_load_header_works() {
        let header = TapeBlock::with_checksum(0x00, b"\x03ROM       \x02\x00\x00\x00\x00\x80");
        let mut cpu = prepare_cpu(0x00, true, 0x5C00, 17);
        let mut mem = Memory64k::new();
        let status = load_block(&mut cpu, &mut mem, &RomHooks::ZX_SPECTRUM_48, &header);
        assert_eq!(status, FastLoadStatus::Completed { checksum_ok: true });
        assert_eq!(&mem.mem_ref()[0x5C00..0x5C11], &header.data()[1..18]);
        assert_eq!(mem.read_byte(0x5C11), 0);
        assert!(cpu.get_flags().cf());
        assert_eq!(cpu.get_pc(), 0x05E2);
        assert_eq!(cpu.get_index16(Prefix::Xdd), 0x5C11);
        assert_eq!(cpu.get_reg16(StkReg16::DE), 0);
        assert_eq!(cpu.get_reg2(StkReg16::HL).0, header.data()[18]);
    }

    #[test]
    fn fast_load_bad_checksum_works() {
        let mut data = TapeBlock::with_checksum(0xff, &[1, 2, 3, 4]).into_data().into_vec();
        data[5] ^= 1;
        let block = TapeBlock::new(data).unwrap();
        let mut cpu = prepare_cpu(0xff, true, 0x8000, 4);
        let mut mem = Memory64k::new();
        let status = load_block(&mut cpu, &mut mem, &RomHooks::ZX_SPECTRUM_48, &block);
        assert_eq!(status, FastLoadStatus::Completed { checksum_ok: false });
        assert_eq!(&mem.mem_ref()[0x8000..0x8004], [1, 2, 3, 4]);
        assert!(!cpu.get_flags().cf());
        assert_eq!(cpu.get_pc(), 0x05E2);
        // a block shorter than requested fails too
        let block = TapeBlock::with_checksum(0xff, &[9, 9]);
        let mut cpu = prepare_cpu(0xff, true, 0x8000, 4);
        let status = load_block(&mut cpu, &mut mem, &RomHooks::ZX_SPECTRUM_48, &block);
        assert_eq!(status, FastLoadStatus::Completed { checksum_ok: false });
        assert_eq!(cpu.get_reg16(StkReg16::DE), 1);
        assert_eq!(&mem.mem_ref()[0x8000..0x8004], [9, 9, 0xff, 4]);
    }

    #[test]
    fn fast_load_flag_mismatch_works() {
        let block = TapeBlock::with_checksum(0xff, &[1, 2, 3]);
        let mut cpu = prepare_cpu(0x00, true, 0x8000, 3);
        cpu.set_reg(Reg8::L, None, 0x0F);
        let mut mem = Memory64k::new();
        let status = load_block(&mut cpu, &mut mem, &RomHooks::ZX_SPECTRUM_48, &block);
        assert_eq!(status, FastLoadStatus::HeaderMismatch);
        assert_eq!(cpu.get_acc(), 0x0F);
        assert!(!cpu.get_flags().cf());
        assert!(!cpu.get_flags().zf());
        assert_eq!(cpu.get_pc(), 0x05B6);
        assert!(mem.mem_ref().iter().all(|&b| b == 0));
    }

    #[test]
    fn fast_verify_works() {
        let block = TapeBlock::with_checksum(0xff, &[1, 2, 3]);
        let mut mem = Memory64k::new();
        mem.load(0x8000, &[1, 2, 3]);
        let mut cpu = prepare_cpu(0xff, false, 0x8000, 3);
        let status = load_block(&mut cpu, &mut mem, &RomHooks::ZX_SPECTRUM_48, &block);
        assert_eq!(status, FastLoadStatus::Completed { checksum_ok: true });
        assert!(cpu.get_flags().cf());
        mem.write_byte(0x8001, 7);
        let mut cpu = prepare_cpu(0xff, false, 0x8000, 3);
        let status = load_block(&mut cpu, &mut mem, &RomHooks::ZX_SPECTRUM_48, &block);
        assert_eq!(status, FastLoadStatus::VerifyFailed);
        assert!(!cpu.get_flags().cf());
        assert_eq!(cpu.get_acc(), 7 ^ 2);
        assert_eq!(cpu.get_pc(), 0x05B6);
        assert_eq!(cpu.get_index16(Prefix::Xdd), 0x8001);
        assert_eq!(cpu.get_reg16(StkReg16::DE), 2);
        assert_eq!(mem.read_byte(0x8001), 7);
    }
}
