/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of SPECTACT, a Rust library for building emulators.

    For the full copyright notice, see the lib.rs file.
*/
//! An emulator of the **uPD765A** floppy disk controller of the ZX Spectrum +3.
//!
//! The controller is programmed through two I/O ports: the main status register (read-only)
//! and the data register. A command is written to the data register as an opcode byte followed
//! by its parameter bytes. When the last parameter arrives the command is executed at once,
//! there is no emulation of the mechanical delays. Commands that transfer sectors to the host
//! make the sector data available in the data register, followed by the result bytes.
//!
//! Disks are [VirtualDiskImage] files inserted in one of 4 drives.
use core::fmt;

#[cfg(feature = "snapshot")]
use serde::{Serialize, Deserialize};

use log::{debug, trace, warn};

use spectact_formats::vfd::{VirtualDiskImage, SECTOR_SIZE};

/// The number of drives the controller can address.
pub const DRIVES: usize = 4;
/// The head will not be moved beyond this track.
pub const MAX_TRACK: u8 = 79;

/// ST0: invalid command.
pub const ST0_INVALID_COMMAND: u8 = 0x80;
/// ST0: abnormal termination.
pub const ST0_ABNORMAL: u8 = 0x40;
/// ST0: seek end.
pub const ST0_SEEK_END: u8 = 0x20;
/// ST0: drive not ready.
pub const ST0_NOT_READY: u8 = 0x08;
/// ST1: end of cylinder.
pub const ST1_END_OF_CYLINDER: u8 = 0x80;
/// ST1: no data.
pub const ST1_NO_DATA: u8 = 0x04;
/// ST2: wrong cylinder.
pub const ST2_WRONG_CYLINDER: u8 = 0x10;
/// ST3: drive ready.
pub const ST3_READY: u8 = 0x20;
/// ST3: the head is at track 0.
pub const ST3_TRACK0: u8 = 0x10;
/// ST3: the disk is double sided.
pub const ST3_TWO_SIDE: u8 = 0x08;

/// Matches I/O port addresses.
pub trait PortAddress {
    /// Relevant address bits should be set to 1.
    const ADDRESS_MASK: u16;
    /// Bits from this constant will be matching only if `ADDRESS_MASK` contains 1 for bits in the same positions.
    const ADDRESS_BITS: u16;
    /// Returns `true` if a provided `address` masked with `ADDRESS_MASK` matches `ADDRESS_BITS`.
    #[inline]
    fn match_port(address: u16) -> bool {
        address & Self::ADDRESS_MASK == Self::ADDRESS_BITS & Self::ADDRESS_MASK
    }
}

/// The main status register port of the +3: `0x2FFD`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Plus3FdcStatusPort;

/// The data register port of the +3: `0x3FFD`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Plus3FdcDataPort;

impl PortAddress for Plus3FdcStatusPort {
    const ADDRESS_MASK: u16 = 0b1111_0000_0000_0010;
    const ADDRESS_BITS: u16 = 0b0010_1111_1111_1101;
}

impl PortAddress for Plus3FdcDataPort {
    const ADDRESS_MASK: u16 = 0b1111_0000_0000_0010;
    const ADDRESS_BITS: u16 = 0b0011_1111_1111_1101;
}

bitflags! {
    /// The main status register flags.
    #[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
    #[cfg_attr(feature = "snapshot", serde(from = "u8", into = "u8"))]
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct MainStatus: u8 {
        /// Request for master: the data register is ready.
        const RQM = 0x80;
        /// Data input/output: set when the controller has bytes for the host.
        const DIO = 0x40;
        /// Execution mode: sector data is being transferred.
        const EXM = 0x20;
        /// Controller busy: a command is in progress.
        const CB  = 0x10;
        const D3B = 0x08;
        const D2B = 0x04;
        const D1B = 0x02;
        const D0B = 0x01;
        /// Drive busy bits.
        const DRIVES_BUSY = 0x0F;
    }
}

impl Default for MainStatus {
    fn default() -> Self {
        MainStatus::RQM
    }
}

impl From<u8> for MainStatus {
    fn from(flags: u8) -> Self {
        MainStatus::from_bits_retain(flags)
    }
}

impl From<MainStatus> for u8 {
    fn from(flags: MainStatus) -> u8 {
        flags.bits()
    }
}

/// The commands recognized by the controller.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FloppyCommand {
    None,
    Specify,
    SenseDriveStatus,
    Recalibrate,
    SenseInterruptStatus,
    Seek,
    ReadId,
    ReadData,
    FormatTrack,
    WriteData,
}

impl Default for FloppyCommand {
    fn default() -> Self {
        FloppyCommand::None
    }
}

/// Opcode decoding table: `(mask, value, command, number of parameter bytes)`.
///
/// Entries are tested in order and the first one with `opcode & mask == value` wins.
pub const COMMAND_TABLE: [(u8, u8, FloppyCommand, usize); 9] = [
    (0xFF, 0x03, FloppyCommand::Specify,              2),
    (0xFF, 0x04, FloppyCommand::SenseDriveStatus,     1),
    (0xFF, 0x07, FloppyCommand::Recalibrate,          1),
    (0xFF, 0x08, FloppyCommand::SenseInterruptStatus, 0),
    (0xFF, 0x0F, FloppyCommand::Seek,                 2),
    (0xBF, 0x0A, FloppyCommand::ReadId,               1),
    (0x1F, 0x06, FloppyCommand::ReadData,             8),
    (0xBD, 0x0D, FloppyCommand::FormatTrack,          5),
    (0x3F, 0x05, FloppyCommand::WriteData,            8),
];

impl FloppyCommand {
    /// Decodes the command from the opcode byte.
    pub fn decode(opcode: u8) -> FloppyCommand {
        COMMAND_TABLE.iter()
            .find(|&&(mask, value, ..)| opcode & mask == value)
            .map_or(FloppyCommand::None, |&(_, _, command, _)| command)
    }
    /// The number of parameter bytes following the opcode.
    pub fn param_count(self) -> usize {
        COMMAND_TABLE.iter()
            .find(|&&(_, _, command, _)| command == self)
            .map_or(0, |&(.., count)| count)
    }
}

impl fmt::Display for FloppyCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A drive with an optional disk inserted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FloppyDrive {
    disk: Option<VirtualDiskImage>,
    track: u8,
    next_sector: u8,
}

impl FloppyDrive {
    pub fn disk(&self) -> Option<&VirtualDiskImage> {
        self.disk.as_ref()
    }
    /// The track the head is positioned over.
    pub fn track(&self) -> u8 {
        self.track
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Command,
    Parameters,
    DataIn,
    Output,
}

/// The parameters of a sector being written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct SectorId {
    track: u8,
    head: u8,
    sector: u8,
    size: u8,
    eot: u8,
}

/// The floppy disk controller.
#[derive(Clone, Debug)]
pub struct FloppyController {
    msr: MainStatus,
    phase: Phase,
    command: FloppyCommand,
    params: Vec<u8>,
    params_expected: usize,
    data_in: Vec<u8>,
    data_in_expected: usize,
    write_target: Option<SectorId>,
    data_out: Vec<u8>,
    data_index: usize,
    result: Vec<u8>,
    result_index: usize,
    exec_status: u8,
    selected_drive: u8,
    head: u8,
    step_rate_time: u8,
    head_unload_time: u8,
    head_load_time: u8,
    non_dma: bool,
    drives: [FloppyDrive; DRIVES],
}

impl Default for FloppyController {
    fn default() -> Self {
        FloppyController {
            msr: MainStatus::default(),
            phase: Phase::Command,
            command: FloppyCommand::None,
            params: Vec::with_capacity(8),
            params_expected: 0,
            data_in: Vec::new(),
            data_in_expected: 0,
            write_target: None,
            data_out: Vec::new(),
            data_index: 0,
            result: Vec::new(),
            result_index: 0,
            exec_status: ST0_INVALID_COMMAND,
            selected_drive: 0,
            head: 0,
            step_rate_time: 0,
            head_unload_time: 0,
            head_load_time: 0,
            non_dma: false,
            drives: Default::default(),
        }
    }
}

impl FloppyController {
    pub fn new() -> Self {
        FloppyController::default()
    }
    /// Resets the controller state and moves heads of all drives to track 0.
    ///
    /// Inserted disks stay in their drives.
    pub fn reset(&mut self) {
        let drives = core::mem::take(&mut self.drives);
        *self = FloppyController::default();
        for (drive, FloppyDrive { disk, .. }) in self.drives.iter_mut().zip(drives) {
            drive.disk = disk;
        }
    }
    /// Inserts the `disk` into the `drive` (0-3) and returns the disk previously inserted.
    ///
    /// Only the two lowest bits of `drive` are used.
    pub fn insert_disk(&mut self, drive: u8, disk: VirtualDiskImage) -> Option<VirtualDiskImage> {
        debug!("FDC: drive {} inserted {}", drive & 3, disk.path().display());
        self.drive_mut(drive).disk.replace(disk)
    }
    /// Removes the disk from the `drive` (0-3).
    pub fn eject_disk(&mut self, drive: u8) -> Option<VirtualDiskImage> {
        self.drive_mut(drive).disk.take()
    }

    pub fn disk(&self, drive: u8) -> Option<&VirtualDiskImage> {
        self.drive(drive).disk()
    }

    pub fn drive(&self, drive: u8) -> &FloppyDrive {
        &self.drives[usize::from(drive & 3)]
    }
    /// The track the head of the `drive` is positioned over.
    pub fn current_track(&self, drive: u8) -> u8 {
        self.drive(drive).track
    }

    pub fn main_status(&self) -> MainStatus {
        self.msr
    }
    /// The most recently received command.
    pub fn command(&self) -> FloppyCommand {
        self.command
    }

    pub fn selected_drive(&self) -> u8 {
        self.selected_drive
    }

    pub fn head(&self) -> u8 {
        self.head
    }
    /// Returns `true` if the controller waits for a new command.
    pub fn is_accepting_command(&self) -> bool {
        self.phase == Phase::Command
    }

    pub fn step_rate_time(&self) -> u8 {
        self.step_rate_time
    }

    pub fn head_unload_time(&self) -> u8 {
        self.head_unload_time
    }

    pub fn head_load_time(&self) -> u8 {
        self.head_load_time
    }

    pub fn is_non_dma(&self) -> bool {
        self.non_dma
    }
    /// Reads the controller port. Returns `None` if the `port` doesn't belong to the controller.
    ///
    /// Reading the data port consumes the byte, see [FloppyController::read_result_byte].
    pub fn read_port(&mut self, port: u16) -> Option<u8> {
        if Plus3FdcStatusPort::match_port(port) {
            Some(self.msr.bits())
        }
        else if Plus3FdcDataPort::match_port(port) {
            Some(self.read_result_byte())
        }
        else {
            None
        }
    }
    /// Writes to the controller port. Returns `false` if the `port` doesn't belong to the controller.
    pub fn write_port(&mut self, port: u16, data: u8) -> bool {
        if Plus3FdcDataPort::match_port(port) {
            self.write_command_byte(data);
            true
        }
        else {
            false
        }
    }
    /// Sends a byte to the data register: an opcode, a parameter or a data byte of the sector
    /// being written.
    ///
    /// Ignored while the controller has bytes pending for the host.
    pub fn write_command_byte(&mut self, byte: u8) {
        if self.msr.contains(MainStatus::DIO) {
            trace!("FDC: ignored {:02x} while sending", byte);
            return
        }
        match self.phase {
            Phase::Command => {
                let command = FloppyCommand::decode(byte);
                self.command = command;
                self.params.clear();
                self.params_expected = command.param_count();
                if command == FloppyCommand::None {
                    debug!("FDC: invalid command {:02x}", byte);
                    self.send_result(vec![ST0_INVALID_COMMAND]);
                    return
                }
                trace!("FDC: {} {:02x}", command, byte);
                self.msr.insert(MainStatus::CB);
                if self.params_expected == 0 {
                    self.execute();
                }
                else {
                    self.phase = Phase::Parameters;
                }
            }
            Phase::Parameters => {
                self.params.push(byte);
                if self.params.len() == self.params_expected {
                    self.execute();
                }
            }
            Phase::DataIn => {
                self.data_in.push(byte);
                if self.data_in.len() == self.data_in_expected {
                    self.complete_write();
                }
            }
            Phase::Output => {}
        }
    }
    /// Reads the next byte from the data register: sector data first, then the result bytes.
    ///
    /// This consumes the byte. When the last result byte is read the controller becomes ready
    /// for the next command. Returns `0xFF` if there is nothing to read.
    pub fn read_result_byte(&mut self) -> u8 {
        if !self.msr.contains(MainStatus::DIO) {
            trace!("FDC: nothing to read");
            return 0xFF
        }
        if let Some(&byte) = self.data_out.get(self.data_index) {
            self.data_index += 1;
            if self.data_index == self.data_out.len() {
                trace!("FDC: sent data {:02x?}", self.data_out);
                self.msr.remove(MainStatus::EXM);
            }
            return byte
        }
        match self.result.get(self.result_index) {
            Some(&byte) => {
                self.result_index += 1;
                if self.result_index == self.result.len() {
                    self.finish();
                }
                byte
            }
            None => {
                self.finish();
                0xFF
            }
        }
    }

    fn drive_mut(&mut self, drive: u8) -> &mut FloppyDrive {
        &mut self.drives[usize::from(drive & 3)]
    }

    fn selected_mut(&mut self) -> &mut FloppyDrive {
        let drive = self.selected_drive;
        self.drive_mut(drive)
    }

    fn select(&mut self, hd_us: u8) {
        self.selected_drive = hd_us & 3;
        self.head = (hd_us >> 2) & 1;
    }
    /// ST0 with the selected head and drive.
    fn st0(&self) -> u8 {
        self.head << 2 | self.selected_drive
    }

    fn execute(&mut self) {
        let params = core::mem::take(&mut self.params);
        debug!("FDC: {} {:02x?}", self.command, params);
        match (self.command, params.as_slice()) {
            (FloppyCommand::Specify, &[srt_hut, hlt_nd]) => {
                self.step_rate_time = srt_hut >> 4;
                self.head_unload_time = srt_hut & 0x0F;
                self.head_load_time = hlt_nd >> 1;
                self.non_dma = hlt_nd & 1 != 0;
                self.finish();
            }
            (FloppyCommand::SenseDriveStatus, &[hd_us]) => {
                self.select(hd_us);
                let drive = self.drive(self.selected_drive);
                let mut st3 = self.st0();
                if let Some(disk) = drive.disk() {
                    st3 |= ST3_READY;
                    if disk.is_double_sided() {
                        st3 |= ST3_TWO_SIDE;
                    }
                }
                if drive.track == 0 {
                    st3 |= ST3_TRACK0;
                }
                self.send_result(vec![st3]);
            }
            (FloppyCommand::Recalibrate, &[hd_us]) => {
                self.select(hd_us);
                self.seek_to(0);
                self.finish();
            }
            (FloppyCommand::SenseInterruptStatus, &[]) => {
                let st0 = self.exec_status | self.st0();
                let pcn = self.current_track(self.selected_drive);
                self.exec_status = ST0_INVALID_COMMAND;
                self.msr.remove(MainStatus::DRIVES_BUSY);
                self.send_result(vec![st0, pcn]);
            }
            (FloppyCommand::Seek, &[hd_us, ncn]) => {
                self.select(hd_us);
                self.seek_to(ncn.min(MAX_TRACK));
                self.finish();
            }
            (FloppyCommand::ReadId, &[hd_us]) => {
                self.select(hd_us);
                self.read_id();
            }
            (FloppyCommand::ReadData, &[hd_us, c, h, r, n, eot, _gpl, dtl]) => {
                self.select(hd_us);
                let id = SectorId { track: c, head: h, sector: r, size: n, eot };
                self.read_data(id, dtl);
            }
            (FloppyCommand::WriteData, &[hd_us, c, h, r, n, eot, _gpl, dtl]) => {
                self.select(hd_us);
                let id = SectorId { track: c, head: h, sector: r, size: n, eot };
                self.begin_write(id, dtl);
            }
            (FloppyCommand::FormatTrack, &[hd_us, n, sc, _gpl, filler]) => {
                self.select(hd_us);
                self.format_track(n, sc, filler);
            }
            (command, params) => {
                warn!("FDC: {} with unexpected parameters {:02x?}", command, params);
                self.send_result(vec![ST0_INVALID_COMMAND]);
            }
        }
    }

    fn seek_to(&mut self, track: u8) {
        let drive = self.selected_drive;
        let ready = self.drive(drive).disk.is_some();
        self.selected_mut().track = track;
        self.exec_status = if ready { ST0_SEEK_END } else { ST0_ABNORMAL|ST0_NOT_READY };
        self.msr.insert(MainStatus::from_bits_retain(1 << drive));
    }

    fn read_id(&mut self) {
        let st0 = self.st0();
        let head = self.head;
        let drive = self.selected_mut();
        let track = drive.track;
        match drive.disk.as_ref().map(|disk| disk.sectors_per_track()) {
            Some(spt) => {
                let sector = drive.next_sector % spt + 1;
                drive.next_sector = sector;
                self.send_result(vec![st0, 0, 0, track, head, sector, 2]);
            }
            None => {
                self.send_result(vec![ST0_ABNORMAL|ST0_NOT_READY|st0, 0, 0, track, head, 0, 2]);
            }
        }
    }
    /// Validates the addressed sector and returns the length of the transfer.
    fn check_transfer(&mut self, id: SectorId, dtl: u8) -> Option<usize> {
        let drive = self.drive(self.selected_drive);
        let (ready, track) = (drive.disk.is_some(), drive.track);
        if !ready {
            debug!("FDC: drive {} not ready", self.selected_drive);
            self.send_status(ST0_ABNORMAL|ST0_NOT_READY, 0, 0, id);
            return None
        }
        if id.track != track || id.head != self.head {
            debug!("FDC: sector C:{} H:{} not under the head at C:{} H:{}",
                    id.track, id.head, track, self.head);
            self.send_status(ST0_ABNORMAL, ST1_NO_DATA, ST2_WRONG_CYLINDER, id);
            return None
        }
        let length = if id.size == 0 { usize::from(dtl) } else { SECTOR_SIZE };
        if length == 0 || length > SECTOR_SIZE {
            debug!("FDC: invalid transfer length {}", length);
            self.send_status(ST0_ABNORMAL, ST1_NO_DATA, 0, id);
            return None
        }
        Some(length)
    }

    fn read_data(&mut self, id: SectorId, dtl: u8) {
        let length = match self.check_transfer(id, dtl) {
            Some(length) => length,
            None => return
        };
        let read = match self.disk(self.selected_drive) {
            Some(disk) => disk.read_data(self.head, id.track, id.sector, length),
            None => return
        };
        match read {
            Ok(data) => {
                self.data_out = data;
                self.data_index = 0;
                self.msr.insert(MainStatus::EXM);
                self.send_status(0, end_of_cylinder(id), 0, id);
            }
            Err(err) => {
                warn!("FDC: read C:{} H:{} R:{}: {}", id.track, self.head, id.sector, err);
                self.send_status(ST0_ABNORMAL, ST1_NO_DATA, 0, id);
            }
        }
    }

    fn begin_write(&mut self, id: SectorId, dtl: u8) {
        if let Some(length) = self.check_transfer(id, dtl) {
            self.data_in.clear();
            self.data_in_expected = length;
            self.write_target = Some(id);
            self.phase = Phase::DataIn;
            self.msr.insert(MainStatus::EXM);
        }
    }

    fn complete_write(&mut self) {
        self.msr.remove(MainStatus::EXM);
        let data = core::mem::take(&mut self.data_in);
        let id = match self.write_target.take() {
            Some(id) => id,
            None => return self.finish()
        };
        trace!("FDC: received data {:02x?}", data);
        let written = match self.disk(self.selected_drive) {
            Some(disk) => disk.write_data(self.head, id.track, id.sector, &data),
            None => return self.send_status(ST0_ABNORMAL|ST0_NOT_READY, 0, 0, id)
        };
        match written {
            Ok(()) => self.send_status(0, end_of_cylinder(id), 0, id),
            Err(err) => {
                warn!("FDC: write C:{} H:{} R:{}: {}", id.track, self.head, id.sector, err);
                self.send_status(ST0_ABNORMAL, ST1_NO_DATA, 0, id)
            }
        }
    }

    fn format_track(&mut self, n: u8, sectors: u8, filler: u8) {
        let track = self.current_track(self.selected_drive);
        let id = SectorId { track, head: self.head, sector: sectors, size: n, eot: sectors };
        if self.disk(self.selected_drive).is_none() {
            return self.send_status(ST0_ABNORMAL|ST0_NOT_READY, 0, 0, id)
        }
        if n > 2 {
            debug!("FDC: invalid sector size code {}", n);
            return self.send_status(ST0_ABNORMAL, ST1_NO_DATA, 0, id)
        }
        let data = vec![filler; 128usize << n];
        let head = self.head;
        let result = match self.disk(self.selected_drive) {
            Some(disk) => (1..=sectors.min(disk.sectors_per_track()))
                          .try_for_each(|sector| disk.write_data(head, track, sector, &data)),
            None => return
        };
        match result {
            Ok(()) => self.send_status(0, 0, 0, id),
            Err(err) => {
                warn!("FDC: format C:{} H:{}: {}", track, head, err);
                self.send_status(ST0_ABNORMAL, ST1_NO_DATA, 0, id)
            }
        }
    }
    /// Sends the standard 7 byte result.
    fn send_status(&mut self, st0: u8, st1: u8, st2: u8, id: SectorId) {
        let st0 = st0 | self.st0();
        self.send_result(vec![st0, st1, st2, id.track, id.head, id.sector, id.size]);
    }

    fn send_result(&mut self, result: Vec<u8>) {
        trace!("FDC: result {:02x?}", result);
        self.result = result;
        self.result_index = 0;
        self.phase = Phase::Output;
        self.msr.insert(MainStatus::DIO|MainStatus::CB);
    }

    fn finish(&mut self) {
        self.phase = Phase::Command;
        self.params.clear();
        self.data_out.clear();
        self.data_index = 0;
        self.result.clear();
        self.result_index = 0;
        self.msr = MainStatus::RQM | (self.msr & MainStatus::DRIVES_BUSY);
    }
}

fn end_of_cylinder(id: SectorId) -> u8 {
    if id.sector == id.eot { ST1_END_OF_CYLINDER } else { 0 }
}
