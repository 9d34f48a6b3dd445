/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of SPECTACT, a Rust library for building emulators.

    For the full copyright notice, see the lib.rs file.
*/
/*! **TAP** file format utilities and **TAPE** blocks.

# TAP format

A **TAP** file consists of blocks of data each prepended by a 2 byte (LSB) block length indicator.

The standard Spectrum's ROM *TAPE* routine produces 2 kinds of blocks:

* a header block
* a data block

This is determined by the first byte of each block, here called a `flag` byte.

A flag byte is `0x00` for header blocks and `0xff` for data blocks.
After the flag byte, the actual data follows, after which a checksum byte, calculated such that
XORing all the data bytes together (including the flag byte) produces `0`.

The structure of the 17 byte header is as follows.

| offset | size | description                      |
|--------|------|----------------------------------|
|    0   |    1 | type (0,1,2,3)                   |
|    1   |   10 | filename (padded with space)     |
|   11   |    2 | length of data block (LSB first) |
|   13   |    2 | parameter 1 (LSB first)          |
|   15   |    2 | parameter 2 (LSB first)          |

These 17 bytes are prefixed by the flag byte (0x00) and suffixed by the checksum byte to produce
the 19-byte block seen on tape.

The above text uses material from the ["TAP format"](https://sinclair.wiki.zxnet.co.uk/wiki/TAP_format) article
on the [Sinclair FAQ wiki](https://sinclair.wiki.zxnet.co.uk/) and is released under the
[Creative Commons Attribution-Share Alike License](https://creativecommons.org/licenses/by-sa/3.0/).

# Blocks and pulses

A [TapeBlock] is the unit played by the [pulse::TapeBlockPlayer] and [pulse::TapeSetPlayer] and
produced by the [pulse::MicPulseRecorder].

```no_run
use spectact_formats::tap::*;

let file = std::fs::File::open("some.tap")?;
let blocks = read_tap_blocks(file)?;
let mut player = pulse::TapeSetPlayer::new(blocks)?;
player.init_play(0);
let ear = player.get_ear_bit(100)?;
# Ok::<(), Box<dyn std::error::Error>>(())
```
*/
use core::borrow::Borrow;
#[cfg(feature = "snapshot")]
use core::convert::TryFrom;
use core::fmt;
use std::io::{self, Read};

#[cfg(feature = "snapshot")]
use serde::{Serialize, Deserialize};

use log::debug;

use crate::ReadExactEx;

pub mod pulse;
mod write;

pub use write::TapFileWriter;

/// The flag byte of a header block.
pub const HEAD_BLOCK_FLAG: u8 = 0x00;
/// The flag byte of a data block.
pub const DATA_BLOCK_FLAG: u8 = 0xFF;
/// The size of a header block including the flag and the checksum bytes.
pub const HEADER_SIZE: usize = 19;
/// The default pause after a block in milliseconds.
pub const DEFAULT_PAUSE_MS: u16 = 1000;

/// Errors returned from *TAPE* block constructors and players.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TapeError {
    /// A block must contain at least the flag byte.
    EmptyBlock,
    /// A player was queried before playing was initialized.
    NotStarted,
    /// A block set contains no blocks.
    NoBlocks,
}

/// A single *TAPE* block with the pause which follows it.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "snapshot", serde(try_from = "TapeBlockSnapshot"))]
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TapeBlock {
    data: Box<[u8]>,
    pause_after_ms: u16,
}

#[cfg(feature = "snapshot")]
#[derive(Deserialize)]
struct TapeBlockSnapshot {
    data: Box<[u8]>,
    pause_after_ms: u16,
}

#[cfg(feature = "snapshot")]
impl TryFrom<TapeBlockSnapshot> for TapeBlock {
    type Error = TapeError;

    fn try_from(snapshot: TapeBlockSnapshot) -> Result<Self, Self::Error> {
        TapeBlock::with_pause(snapshot.data, snapshot.pause_after_ms)
    }
}

impl TapeError {
    fn as_str(&self) -> &'static str {
        match self {
            TapeError::EmptyBlock => "a tape block must not be empty",
            TapeError::NotStarted => "tape playing has not been initialized",
            TapeError::NoBlocks => "there are no tape blocks to play",
        }
    }
}

impl std::error::Error for TapeError {}

impl fmt::Display for TapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<TapeError> for io::Error {
    fn from(err: TapeError) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, err)
    }
}

impl TapeBlock {
    /// Creates a block with the [default pause][DEFAULT_PAUSE_MS].
    pub fn new<D: Into<Box<[u8]>>>(data: D) -> Result<Self, TapeError> {
        TapeBlock::with_pause(data, DEFAULT_PAUSE_MS)
    }
    /// Creates a block followed by a pause of `pause_after_ms` milliseconds.
    pub fn with_pause<D: Into<Box<[u8]>>>(data: D, pause_after_ms: u16) -> Result<Self, TapeError> {
        let data = data.into();
        if data.is_empty() {
            return Err(TapeError::EmptyBlock)
        }
        Ok(TapeBlock { data, pause_after_ms })
    }
    /// Creates a block from the given flag byte and data appending the checksum byte.
    pub fn with_checksum(flag: u8, data: &[u8]) -> Self {
        let mut block = Vec::with_capacity(data.len() + 2);
        block.push(flag);
        block.extend_from_slice(data);
        block.push(checksum(&block));
        TapeBlock { data: block.into_boxed_slice(), pause_after_ms: DEFAULT_PAUSE_MS }
    }
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
    #[inline]
    pub fn pause_after_ms(&self) -> u16 {
        self.pause_after_ms
    }
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }
    /// Always `false`, blocks are never empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    /// The flag byte of the block.
    #[inline]
    pub fn flag(&self) -> u8 {
        self.data[0]
    }
    /// Returns `true` if the block is played with the longer header pilot tone.
    #[inline]
    pub fn is_header(&self) -> bool {
        self.flag() & 0x80 == 0
    }
    /// Returns `true` if XORing all bytes of the block gives 0.
    pub fn is_valid(&self) -> bool {
        checksum(self.data.iter()) == 0
    }
    /// Returns the file name if this is a 19 byte header block.
    pub fn name(&self) -> Option<String> {
        header_name(&self.data)
    }
    pub fn into_data(self) -> Box<[u8]> {
        self.data
    }
}

impl AsRef<[u8]> for TapeBlock {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Display for TapeBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "Header: {:10} ({} bytes)", name, self.len()),
            None => write!(f, "Data: flag {:02x} ({} bytes)", self.flag(), self.len())
        }
    }
}

/// Calculates bit toggle checksum from the given iterator of `u8`.
pub fn checksum<I: IntoIterator<Item=B>, B: Borrow<u8>>(iter: I) -> u8 {
    iter.into_iter().fold(0, |acc, x| acc ^ x.borrow())
}

/// Extracts the file name from a 19 byte header block with trailing spaces removed.
///
/// Returns `None` if `data` is not exactly [HEADER_SIZE] bytes long.
pub fn header_name(data: &[u8]) -> Option<String> {
    if data.len() != HEADER_SIZE {
        return None
    }
    let name: String = data[2..12].iter().map(|&b| char::from(b)).collect();
    Some(name.trim_end().to_string())
}

/// Reads all *TAP* chunks from the given reader as [TapeBlock]s.
///
/// Chunks of zero length are skipped.
pub fn read_tap_blocks<R: Read>(mut rd: R) -> io::Result<Vec<TapeBlock>> {
    let mut blocks = Vec::new();
    let mut size = [0u8; 2];
    while rd.read_exact_or_none(&mut size)? {
        let len = u16::from_le_bytes(size) as usize;
        if len == 0 {
            debug!("skipping an empty TAP chunk");
            continue
        }
        let mut data = vec![0u8; len];
        rd.read_exact(&mut data)?;
        blocks.push(TapeBlock::new(data)?);
    }
    debug!("read {} TAP blocks", blocks.len());
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use super::*;

    const HEADER: [u8; 19] = [0x00, 0x03, b'R', b'O', b'M', b' ', b' ', b' ', b' ', b' ', b' ', b' ',
                              0x02, 0x00, 0x00, 0x00, 0x00, 0x80, 0xF1];

    #[test]
    fn tape_block_works() {
        assert_eq!(TapeBlock::new(Vec::<u8>::new()), Err(TapeError::EmptyBlock));
        let block = TapeBlock::new(&HEADER[..]).unwrap();
        assert_eq!(block.pause_after_ms(), 1000);
        assert!(block.is_header());
        assert!(block.is_valid());
        assert_eq!(block.name().as_deref(), Some("ROM"));
        assert_eq!(format!("{}", block), "Header: ROM        (19 bytes)");
        let data = TapeBlock::with_checksum(DATA_BLOCK_FLAG, &[0xf3, 0xaf]);
        assert_eq!(data.data(), [0xff, 0xf3, 0xaf, 0xa3]);
        assert!(!data.is_header());
        assert!(data.is_valid());
        assert_eq!(data.name(), None);
        let block = TapeBlock::with_pause(vec![0x80], 0).unwrap();
        assert_eq!(block.pause_after_ms(), 0);
        assert!(!block.is_header());
    }

    #[test]
    fn header_name_works() {
        assert_eq!(header_name(&HEADER), Some("ROM".to_string()));
        assert_eq!(header_name(&HEADER[..18]), None);
        let mut head = HEADER;
        head[2..12].copy_from_slice(b" my prog  ");
        assert_eq!(header_name(&head), Some(" my prog".to_string()));
    }

    #[test]
    fn read_tap_blocks_works() {
        let mut tap = vec![19, 0];
        tap.extend_from_slice(&HEADER);
        tap.extend_from_slice(&[0, 0, 4, 0, 0xff, 0xf3, 0xaf, 0xa3]);
        let blocks = read_tap_blocks(Cursor::new(&tap)).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].data(), &HEADER[..]);
        assert_eq!(blocks[1].data(), [0xff, 0xf3, 0xaf, 0xa3]);
        tap.pop();
        let err = read_tap_blocks(Cursor::new(&tap)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert!(read_tap_blocks(Cursor::new(Vec::<u8>::new())).unwrap().is_empty());
    }

    #[cfg(feature = "snapshot")]
    #[test]
    fn tape_block_snapshot_works() {
        let block = TapeBlock::with_pause(vec![0xff, 1, 2], 500).unwrap();
        let json = serde_json::to_string(&block).unwrap();
        let restored: TapeBlock = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, block);
        let err = serde_json::from_str::<TapeBlock>(r#"{"data":[],"pause_after_ms":0}"#).unwrap_err();
        assert!(err.to_string().starts_with("a tape block must not be empty"));
        let phase: pulse::PlayPhase = serde_json::from_str("\"TermSync\"").unwrap();
        assert_eq!(phase, pulse::PlayPhase::TermSync);
    }
}
