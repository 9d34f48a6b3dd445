/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of SPECTACT, a Rust library for building emulators.

    For the full copyright notice, see the lib.rs file.
*/
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use log::debug;

use spectact_formats::tap::{read_tap_blocks, TapeBlock, TapFileWriter};

/// The name of a saved tape file until the first header block names it.
pub const DEFAULT_TAPE_NAME: &str = "tape";

/// The source of blocks for LOAD and the destination of blocks recorded by SAVE.
pub trait TapeProvider {
    /// Returns the blocks to be played when the device enters the LOAD mode.
    ///
    /// `None` means there is no tape inserted.
    fn tape_content(&mut self) -> io::Result<Option<Vec<TapeBlock>>>;
    /// Starts a new tape file for saving.
    fn create_tape_file(&mut self) -> io::Result<()>;
    /// Names the tape file being saved.
    fn set_name(&mut self, name: &str) -> io::Result<()>;
    /// Appends a recorded block to the tape file being saved.
    fn save_tape_block(&mut self, block: &TapeBlock) -> io::Result<()>;
    /// Completes the tape file being saved.
    fn finalize_tape_file(&mut self) -> io::Result<()>;
    /// Rewinds the tape.
    fn reset(&mut self);
}

/// A tape saved by [MemoryTapeProvider].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SavedTape {
    pub name: String,
    pub blocks: Vec<TapeBlock>,
}

/// Keeps both the loaded and the saved tapes in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryTapeProvider {
    content: Option<Vec<TapeBlock>>,
    saving: Option<SavedTape>,
    saved: Vec<SavedTape>,
}

impl MemoryTapeProvider {
    pub fn new() -> Self {
        MemoryTapeProvider::default()
    }

    pub fn with_content(blocks: Vec<TapeBlock>) -> Self {
        MemoryTapeProvider { content: Some(blocks), ..Default::default() }
    }
    /// Inserts (`Some`) or ejects (`None`) the tape to be loaded.
    pub fn set_content(&mut self, blocks: Option<Vec<TapeBlock>>) {
        self.content = blocks;
    }

    pub fn content(&self) -> Option<&[TapeBlock]> {
        self.content.as_deref()
    }
    /// Tapes finalized so far, in the order of saving.
    pub fn saved_tapes(&self) -> &[SavedTape] {
        &self.saved
    }
    /// Takes the saved tapes out of the provider.
    pub fn take_saved_tapes(&mut self) -> Vec<SavedTape> {
        core::mem::take(&mut self.saved)
    }
}

impl TapeProvider for MemoryTapeProvider {
    fn tape_content(&mut self) -> io::Result<Option<Vec<TapeBlock>>> {
        Ok(self.content.clone())
    }

    fn create_tape_file(&mut self) -> io::Result<()> {
        self.saving = Some(SavedTape { name: DEFAULT_TAPE_NAME.into(), blocks: Vec::new() });
        Ok(())
    }

    fn set_name(&mut self, name: &str) -> io::Result<()> {
        if let Some(tape) = self.saving.as_mut() {
            tape.name = name.into();
        }
        Ok(())
    }

    fn save_tape_block(&mut self, block: &TapeBlock) -> io::Result<()> {
        let tape = self.saving.as_mut().ok_or_else(not_saving)?;
        tape.blocks.push(block.clone());
        Ok(())
    }

    fn finalize_tape_file(&mut self) -> io::Result<()> {
        if let Some(tape) = self.saving.take() {
            if !tape.blocks.is_empty() {
                self.saved.push(tape);
            }
        }
        Ok(())
    }

    fn reset(&mut self) {}
}

/// Loads blocks from a *TAP* file and saves recorded blocks as *TAP* files in a directory.
///
/// Saved blocks are collected in memory and written to `<dir>/<name>.tap` when the file is
/// finalized. An existing file with the same name is overwritten.
#[derive(Clone, Debug)]
pub struct TapFileProvider {
    load_path: Option<PathBuf>,
    save_dir: PathBuf,
    cached: Option<Vec<TapeBlock>>,
    saving: Option<SavedTape>,
    last_saved: Option<PathBuf>,
}

impl TapFileProvider {
    /// Creates a provider saving files in `save_dir`.
    pub fn new<P: Into<PathBuf>>(save_dir: P) -> Self {
        TapFileProvider {
            load_path: None,
            save_dir: save_dir.into(),
            cached: None,
            saving: None,
            last_saved: None
        }
    }
    /// Selects the *TAP* file to be loaded. `None` ejects the tape.
    pub fn insert<P: Into<PathBuf>>(&mut self, load_path: Option<P>) {
        self.load_path = load_path.map(Into::into);
        self.cached = None;
    }

    pub fn load_path(&self) -> Option<&Path> {
        self.load_path.as_deref()
    }

    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }
    /// The path of the most recently written tape file.
    pub fn last_saved(&self) -> Option<&Path> {
        self.last_saved.as_deref()
    }
}

impl TapeProvider for TapFileProvider {
    fn tape_content(&mut self) -> io::Result<Option<Vec<TapeBlock>>> {
        if self.cached.is_none() {
            if let Some(path) = self.load_path.as_ref() {
                let blocks = read_tap_blocks(BufReader::new(File::open(path)?))?;
                debug!("read {} blocks from {}", blocks.len(), path.display());
                self.cached = Some(blocks);
            }
        }
        Ok(self.cached.clone().filter(|blocks| !blocks.is_empty()))
    }

    fn create_tape_file(&mut self) -> io::Result<()> {
        self.saving = Some(SavedTape { name: DEFAULT_TAPE_NAME.into(), blocks: Vec::new() });
        Ok(())
    }

    fn set_name(&mut self, name: &str) -> io::Result<()> {
        let name = file_stem(name);
        if let Some(tape) = self.saving.as_mut() {
            if !name.is_empty() {
                tape.name = name;
            }
        }
        Ok(())
    }

    fn save_tape_block(&mut self, block: &TapeBlock) -> io::Result<()> {
        let tape = self.saving.as_mut().ok_or_else(not_saving)?;
        tape.blocks.push(block.clone());
        Ok(())
    }

    fn finalize_tape_file(&mut self) -> io::Result<()> {
        let tape = match self.saving.take() {
            Some(tape) if !tape.blocks.is_empty() => tape,
            _ => return Ok(())
        };
        fs::create_dir_all(&self.save_dir)?;
        let path = self.save_dir.join(format!("{}.tap", tape.name));
        let part = path.with_extension("tap.part");
        let written = write_tap_file(&part, &tape.blocks)
                      .and_then(|count| fs::rename(&part, &path).map(|_| count));
        match written {
            Ok(count) => {
                debug!("saved {} blocks to {}", count, path.display());
                self.last_saved = Some(path);
                Ok(())
            }
            Err(err) => {
                if let Err(e) = fs::remove_file(&part) {
                    debug!("could not remove {}: {}", part.display(), e);
                }
                Err(err)
            }
        }
    }

    fn reset(&mut self) {
        self.cached = None;
    }
}

/// Writes the blocks to a new file at `path`, returning the number of chunks written.
fn write_tap_file(path: &Path, blocks: &[TapeBlock]) -> io::Result<usize> {
    let mut writer = TapFileWriter::new(BufWriter::new(File::create(path)?));
    for block in blocks.iter() {
        writer.write_block(block)?;
    }
    writer.flush()?;
    Ok(writer.chunks_written())
}

fn not_saving() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "no tape file is being saved")
}

/// Replaces characters not welcome in file names.
fn file_stem(name: &str) -> String {
    name.trim().chars().map(|c|
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' }
    ).collect()
}
