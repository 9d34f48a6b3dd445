/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of SPECTACT, a Rust library for building emulators.

    For the full copyright notice, see the lib.rs file.
*/
use core::convert::TryFrom;
use std::io::{ErrorKind, Error, Write, Result};
use super::TapeBlock;

/// A tool for writing *TAP* file chunks to byte streams.
pub struct TapFileWriter<W> {
    chunks: usize,
    wr: W
}

impl<W> TapFileWriter<W> {
    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.wr
    }
    /// Returns a mutable reference to the inner writer.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.wr
    }
    /// Returns a shared reference to the inner writer.
    pub fn get_ref(&self) -> &W {
        &self.wr
    }
    /// Returns the number of chunks written so far.
    pub fn chunks_written(&self) -> usize {
        self.chunks
    }
}

impl<W: Write> TapFileWriter<W> {
    /// The writer should be positioned where the next chunk will be written.
    pub fn new(wr: W) -> Self {
        TapFileWriter { chunks: 0, wr }
    }
    /// Flushes the underlying writer, ensuring that all intermediately buffered
    /// contents reach their destination (invokes [Write::flush]).
    pub fn flush(&mut self) -> Result<()> {
        self.wr.flush()
    }
    /// Writes the data of the block as a *TAP* chunk.
    pub fn write_block(&mut self, block: &TapeBlock) -> Result<()> {
        self.write_chunk(block.data())
    }
    /// Writes provided data as a *TAP* chunk.
    pub fn write_chunk<D: AsRef<[u8]>>(&mut self, chunk: D) -> Result<()> {
        let data = chunk.as_ref();
        let size = u16::try_from(data.len()).map_err(|_|
                    Error::new(ErrorKind::InvalidData, "TAP chunk too large."))?;
        self.wr.write_all(&size.to_le_bytes())?;
        self.wr.write_all(data)?;
        self.chunks += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use crate::tap::read_tap_blocks;
    use super::*;

    #[test]
    fn tap_writer_works() -> Result<()> {
        let blocks = vec![TapeBlock::with_checksum(0x00, &[3; 17]),
                          TapeBlock::with_checksum(0xff, &[1, 2, 3, 4, 5])];
        let mut writer = TapFileWriter::new(Cursor::new(Vec::new()));
        for block in blocks.iter() {
            writer.write_block(block)?;
        }
        assert_eq!(writer.chunks_written(), 2);
        let tap = writer.into_inner().into_inner();
        assert_eq!(tap.len(), 2 + 19 + 2 + 7);
        assert_eq!(&tap[0..3], [19, 0, 0]);
        assert_eq!(&tap[21..24], [7, 0, 0xff]);
        assert_eq!(read_tap_blocks(Cursor::new(tap))?, blocks);
        let mut writer = TapFileWriter::new(Vec::new());
        let err = writer.write_chunk(vec![0u8; 0x10000]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
        assert!(writer.get_ref().is_empty());
        Ok(())
    }
}
