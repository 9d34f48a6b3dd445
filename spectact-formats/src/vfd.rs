/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of SPECTACT, a Rust library for building emulators.

    For the full copyright notice, see the lib.rs file.
*/
/*! **VFD** virtual floppy disk images.

A disk image file starts with an 8 byte header followed by `sides * tracks * sectors_per_track`
sectors of 512 bytes each, ordered by side, track and sector.

| offset | size | description                 |
|--------|------|-----------------------------|
|    0   |    5 | signature `VFDDF`           |
|    5   |    1 | double sided (0 or 1)       |
|    6   |    1 | number of tracks            |
|    7   |    1 | number of sectors per track |

Sector numbers start from 1. Each [read][VirtualDiskImage::read_data] and
[write][VirtualDiskImage::write_data] opens the image file, accesses a single sector and closes it.
*/
use core::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::debug;
use nom::bytes::complete::tag;
use nom::combinator::map;
use nom::number::complete::be_u8;
use nom::sequence::tuple;
use nom::IResult;

use crate::ReadExactEx;

/// The signature of the image file.
pub const SIGNATURE: &[u8; 5] = b"VFDDF";
/// The size of the image file header.
pub const HEADER_SIZE: u64 = 8;
/// The size of a single sector in bytes.
pub const SECTOR_SIZE: usize = 512;
/// The number of tracks of a compatible disk.
pub const TRACKS: u8 = 40;
/// The number of sectors per track of a compatible disk.
pub const SECTORS_PER_TRACK: u8 = 9;

/// Errors returned by [VirtualDiskImage] methods.
#[non_exhaustive]
#[derive(Debug)]
pub enum DiskError {
    /// The file does not start with a valid header.
    InvalidHeader,
    /// The file is shorter than its geometry requires.
    Truncated { expected: u64, found: u64 },
    /// The geometry is not the one of a double sided 40 track disk with 9 sectors per track.
    IncompatibleGeometry { double_sided: bool, tracks: u8, sectors_per_track: u8 },
    InvalidHead(u8),
    InvalidTrack(u8),
    InvalidSector(u8),
    /// The data length must be between 1 and 512.
    InvalidLength(usize),
    Io(io::Error),
}

/// A virtual floppy disk image file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VirtualDiskImage {
    path: PathBuf,
    double_sided: bool,
    tracks: u8,
    sectors_per_track: u8,
}

impl std::error::Error for DiskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DiskError::Io(err) => Some(err),
            _ => None
        }
    }
}

impl fmt::Display for DiskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiskError::InvalidHeader => f.write_str("invalid disk image header"),
            DiskError::Truncated { expected, found } =>
                write!(f, "disk image is truncated: expected {} bytes, found {}", expected, found),
            DiskError::IncompatibleGeometry { double_sided, tracks, sectors_per_track } =>
                write!(f, "incompatible disk geometry: {} side(s), {} tracks, {} sectors per track",
                            if *double_sided { 2 } else { 1 }, tracks, sectors_per_track),
            DiskError::InvalidHead(head) => write!(f, "head must be 0 or 1, got {}", head),
            DiskError::InvalidTrack(track) => write!(f, "invalid track number: {}", track),
            DiskError::InvalidSector(sector) => write!(f, "invalid sector number: {}", sector),
            DiskError::InvalidLength(len) =>
                write!(f, "data length must be between 1 and {}, got {}", SECTOR_SIZE, len),
            DiskError::Io(err) => write!(f, "{}", err),
        }
    }
}

impl From<io::Error> for DiskError {
    fn from(err: io::Error) -> Self {
        DiskError::Io(err)
    }
}

impl From<DiskError> for io::Error {
    fn from(err: DiskError) -> Self {
        match err {
            DiskError::Io(err) => err,
            err => io::Error::new(io::ErrorKind::InvalidData, err)
        }
    }
}

fn parse_header(input: &[u8]) -> IResult<&[u8], (bool, u8, u8)> {
    map(tuple((tag(&SIGNATURE[..]), be_u8, be_u8, be_u8)),
        |(_, double_sided, tracks, sectors)| (double_sided != 0, tracks, sectors))(input)
}

impl VirtualDiskImage {
    /// Creates a new zero filled disk image, creating missing parent directories.
    ///
    /// An existing file is overwritten.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, DiskError> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let disk = VirtualDiskImage {
            path: path.to_path_buf(),
            double_sided: true,
            tracks: TRACKS,
            sectors_per_track: SECTORS_PER_TRACK
        };
        let mut file = File::create(path)?;
        file.write_all(SIGNATURE)?;
        file.write_all(&[disk.double_sided as u8, disk.tracks, disk.sectors_per_track])?;
        file.set_len(disk.file_size())?;
        debug!("created disk image: {}", path.display());
        Ok(disk)
    }
    /// Opens an existing disk image validating its header, geometry and size.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DiskError> {
        let path = path.as_ref();
        let mut file = File::open(path)?;
        let mut header = [0u8; HEADER_SIZE as usize];
        let len = file.read_exact_or_to_end(&mut header)?;
        let (_, (double_sided, tracks, sectors_per_track)) = parse_header(&header[..len])
                                                             .map_err(|_| DiskError::InvalidHeader)?;
        if !double_sided || tracks != TRACKS || sectors_per_track != SECTORS_PER_TRACK {
            return Err(DiskError::IncompatibleGeometry { double_sided, tracks, sectors_per_track })
        }
        let disk = VirtualDiskImage { path: path.to_path_buf(), double_sided, tracks, sectors_per_track };
        let expected = disk.file_size();
        let found = file.metadata()?.len();
        if found < expected {
            return Err(DiskError::Truncated { expected, found })
        }
        debug!("opened disk image: {}", path.display());
        Ok(disk)
    }
    /// Opens the disk image if the file exists, otherwise creates it.
    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<Self, DiskError> {
        let path = path.as_ref();
        if path.exists() {
            VirtualDiskImage::open(path)
        }
        else {
            VirtualDiskImage::create(path)
        }
    }
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }
    #[inline]
    pub fn is_double_sided(&self) -> bool {
        self.double_sided
    }
    #[inline]
    pub fn tracks(&self) -> u8 {
        self.tracks
    }
    #[inline]
    pub fn sectors_per_track(&self) -> u8 {
        self.sectors_per_track
    }
    /// The size of the image file in bytes.
    pub fn file_size(&self) -> u64 {
        let sides = if self.double_sided { 2 } else { 1 };
        HEADER_SIZE + sides * u64::from(self.tracks) * u64::from(self.sectors_per_track) * SECTOR_SIZE as u64
    }
    /// Writes `data` at the beginning of the given sector.
    pub fn write_data(&self, head: u8, track: u8, sector: u8, data: &[u8]) -> Result<(), DiskError> {
        let offset = self.sector_offset(head, track, sector)?;
        check_length(data.len())?;
        let mut file = OpenOptions::new().write(true).open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        Ok(())
    }
    /// Reads `length` bytes from the beginning of the given sector.
    pub fn read_data(&self, head: u8, track: u8, sector: u8, length: usize) -> Result<Vec<u8>, DiskError> {
        let offset = self.sector_offset(head, track, sector)?;
        check_length(length)?;
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut data = vec![0u8; length];
        file.read_exact(&mut data)?;
        Ok(data)
    }
    /// Returns the byte offset of the given sector in the image file.
    pub fn sector_offset(&self, head: u8, track: u8, sector: u8) -> Result<u64, DiskError> {
        if head > 1 || (head == 1 && !self.double_sided) {
            return Err(DiskError::InvalidHead(head))
        }
        if track >= self.tracks {
            return Err(DiskError::InvalidTrack(track))
        }
        if sector < 1 || sector > self.sectors_per_track {
            return Err(DiskError::InvalidSector(sector))
        }
        let track_size = u64::from(self.sectors_per_track) * SECTOR_SIZE as u64;
        Ok(HEADER_SIZE +
           u64::from(head) * u64::from(self.tracks) * track_size +
           u64::from(track) * track_size +
           u64::from(sector - 1) * SECTOR_SIZE as u64)
    }
}

fn check_length(length: usize) -> Result<(), DiskError> {
    if length == 0 || length > SECTOR_SIZE {
        return Err(DiskError::InvalidLength(length))
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rand::prelude::*;
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("spectact-vfd-{}-{}", std::process::id(), name))
    }

    #[test]
    fn disk_create_and_open_works() {
        let path = temp_path("create").join("nested").join("disk.vfd");
        let disk = VirtualDiskImage::create(&path).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), 8 + 2 * 40 * 9 * 512);
        assert_eq!(disk.file_size(), 368648);
        let head = fs::read(&path).unwrap();
        assert_eq!(&head[..8], b"VFDDF\x01\x28\x09");
        assert!(head[8..].iter().all(|&b| b == 0));
        let opened = VirtualDiskImage::open(&path).unwrap();
        assert_eq!(opened, disk);
        assert_eq!(VirtualDiskImage::open_or_create(&path).unwrap(), disk);
        assert_eq!(disk.sector_offset(1, 39, 9).unwrap(), disk.file_size() - 512);
        fs::remove_dir_all(temp_path("create")).unwrap();
    }

    #[test]
    fn disk_open_errors_work() {
        let path = temp_path("errors.vfd");
        let _ = fs::remove_file(&path);
        assert!(matches!(VirtualDiskImage::open(&path), Err(DiskError::Io(..))));
        fs::write(&path, b"VFD").unwrap();
        assert!(matches!(VirtualDiskImage::open(&path), Err(DiskError::InvalidHeader)));
        fs::write(&path, b"VFDXX\x01\x28\x09").unwrap();
        assert!(matches!(VirtualDiskImage::open(&path), Err(DiskError::InvalidHeader)));
        fs::write(&path, b"VFDDF\x01\x50\x09").unwrap();
        assert!(matches!(VirtualDiskImage::open(&path),
                         Err(DiskError::IncompatibleGeometry { double_sided: true, tracks: 80, .. })));
        let mut data = b"VFDDF\x01\x28\x09".to_vec();
        data.resize(1000, 0);
        fs::write(&path, &data).unwrap();
        match VirtualDiskImage::open(&path) {
            Err(DiskError::Truncated { expected, found }) => {
                assert_eq!((expected, found), (368648, 1000));
            }
            res => panic!("unexpected: {:?}", res)
        }
        let err: io::Error = DiskError::InvalidHeader.into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn disk_round_trip_works() {
        let path = temp_path("round-trip.vfd");
        let disk = VirtualDiskImage::create(&path).unwrap();
        let mut rng = thread_rng();
        let mut sectors = Vec::new();
        for head in 0..2 {
            for track in 0..40 {
                for sector in 1..=9 {
                    let len = rng.gen_range(1..=512);
                    let mut data = vec![0u8; len];
                    rng.fill(&mut data[..]);
                    disk.write_data(head, track, sector, &data).unwrap();
                    sectors.push((head, track, sector, data));
                }
            }
        }
        for (head, track, sector, data) in sectors {
            assert_eq!(disk.read_data(head, track, sector, data.len()).unwrap(), data);
        }
        assert_eq!(fs::metadata(&path).unwrap().len(), disk.file_size());
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn disk_address_errors_work() {
        let path = temp_path("address.vfd");
        let disk = VirtualDiskImage::create(&path).unwrap();
        let data = [0xAAu8; 16];
        assert!(matches!(disk.write_data(0, 40, 1, &data), Err(DiskError::InvalidTrack(40))));
        assert!(matches!(disk.write_data(0, 0, 0, &data), Err(DiskError::InvalidSector(0))));
        assert!(matches!(disk.write_data(0, 0, 10, &data), Err(DiskError::InvalidSector(10))));
        assert!(matches!(disk.write_data(2, 0, 1, &data), Err(DiskError::InvalidHead(2))));
        assert!(matches!(disk.write_data(0, 0, 1, &[]), Err(DiskError::InvalidLength(0))));
        assert!(matches!(disk.write_data(0, 0, 1, &[0; 513]), Err(DiskError::InvalidLength(513))));
        assert!(matches!(disk.read_data(0, 40, 1, 16), Err(DiskError::InvalidTrack(40))));
        assert!(matches!(disk.read_data(0, 0, 0, 16), Err(DiskError::InvalidSector(0))));
        assert!(matches!(disk.read_data(0, 0, 10, 16), Err(DiskError::InvalidSector(10))));
        assert!(matches!(disk.read_data(2, 0, 1, 16), Err(DiskError::InvalidHead(2))));
        assert!(matches!(disk.read_data(0, 0, 1, 0), Err(DiskError::InvalidLength(0))));
        assert!(matches!(disk.read_data(0, 0, 1, 513), Err(DiskError::InvalidLength(513))));
        assert_eq!(disk.read_data(1, 39, 9, 512).unwrap(), vec![0u8; 512]);
        fs::remove_file(&path).unwrap();
    }
}
