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
//! ZX Spectrum tape and disk storage: *TAP* containers, *TAPE* pulse players and recorders
//! and virtual floppy disk images.
// http://www.worldofspectrum.org/faq/reference/formats.htm
use std::io::{self, Read};

pub mod tap;
pub mod vfd;

/// A trait that extends [Read] with methods that ease reading from chunked files.
pub trait ReadExactEx: Read {
    /// Reads bytes until `buf` is filled or EOF is reached. Returns the number of bytes read.
    fn read_exact_or_to_end(&mut self, mut buf: &mut[u8]) -> io::Result<usize> {
        let orig_len = buf.len();
        while !buf.is_empty() {
            match self.read(buf) {
                Ok(0) => break,
                Ok(n) => buf = &mut buf[n..],
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(orig_len - buf.len())
    }
    /// Reads the exact number of bytes required to fill `buf` and returns `Ok(true)` or returns
    /// `Ok(false)` if exactly zero bytes were read. In this instance `buf` will be left unmodified.
    ///
    /// If at least one byte was read, this function behaves exactly like [Read::read_exact].
    fn read_exact_or_none(&mut self, buf: &mut [u8]) -> io::Result<bool> {
        let bytes_read = self.read_exact_or_to_end(buf)?;
        if bytes_read == 0 {
            Ok(false)
        }
        else if bytes_read == buf.len() {
            Ok(true)
        }
        else {
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, "failed to fill whole buffer"))
        }
    }
}

impl<R: Read> ReadExactEx for R {}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use super::*;

    #[test]
    fn read_exact_ex_works() {
        let mut rd = Cursor::new(vec![1u8, 2, 3]);
        let mut buf = [0u8; 2];
        assert!(rd.read_exact_or_none(&mut buf).unwrap());
        assert_eq!(buf, [1, 2]);
        let err = rd.read_exact_or_none(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert!(!rd.read_exact_or_none(&mut buf).unwrap());
    }
}
