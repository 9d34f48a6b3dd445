/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of SPECTACT, a Rust library for building emulators.

    For the full copyright notice, see the lib.rs file.
*/
use core::convert::TryFrom;

#[cfg(feature = "snapshot")]
use serde::{Serialize, Deserialize};

use crate::clock::FrameTact;
use crate::memory::{SCREEN_ADDRESS, ATTRS_ADDRESS};
use super::{ScreenConfiguration, ScreenConfigError, pixel_line_offset, color_line_offset};

/// Contention delays of a single 8 tact cycle, starting 2 tacts before the first pixel is drawn.
const CONTENTION_PATTERN: [u8; 8] = [6, 5, 4, 3, 2, 1, 0, 0];

/// What the ULA does during a single tact.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TactPhase {
    /// Invisible: vertical sync, blanking or non visible border.
    None,
    /// Draws 2 border pixels.
    Border,
    /// Draws border pixels, fetches the first pixel byte of a display line.
    BorderFetchPixel,
    /// Draws border pixels, fetches the first attribute byte of a display line.
    BorderFetchAttr,
    /// Draws pixels from the first byte latch.
    DisplayB1,
    /// Draws pixels from the second byte latch.
    DisplayB2,
    /// Draws pixels from the first latch, fetches the second pixel byte.
    DisplayB1FetchB2,
    /// Draws pixels from the first latch, fetches the second attribute byte.
    DisplayB1FetchA2,
    /// Draws pixels from the second latch, fetches the next first pixel byte.
    DisplayB2FetchB1,
    /// Draws pixels from the second latch, fetches the next first attribute byte.
    DisplayB2FetchA1,
}

/// The precomputed description of a single frame tact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TactDescriptor {
    pub phase: TactPhase,
    /// The number of tacts a CPU access to contended memory is delayed by at this tact.
    pub contention_delay: u8,
    /// The address of a bitmap byte fetched at this tact, 0 if no bitmap byte is fetched.
    pub pixel_fetch_address: u16,
    /// The address of an attribute byte fetched at this tact, 0 if no attribute byte is fetched.
    pub attr_fetch_address: u16,
    /// Horizontal pixel coordinate in the pixel buffer.
    pub x: u16,
    /// Vertical pixel coordinate in the pixel buffer.
    pub y: u16,
}

impl Default for TactDescriptor {
    fn default() -> Self {
        TactDescriptor {
            phase: TactPhase::None,
            contention_delay: 0,
            pixel_fetch_address: 0,
            attr_fetch_address: 0,
            x: 0,
            y: 0
        }
    }
}

impl TactPhase {
    /// Returns `true` for phases drawing INK/PAPER pixels.
    #[inline]
    pub fn is_display(self) -> bool {
        use TactPhase::*;
        matches!(self, DisplayB1|DisplayB2|DisplayB1FetchB2|DisplayB1FetchA2|DisplayB2FetchB1|DisplayB2FetchA1)
    }
    /// Returns `true` for phases drawing any pixels.
    #[inline]
    pub fn is_visible(self) -> bool {
        self != TactPhase::None
    }
}

/// A table with one [TactDescriptor] for every tact of a frame.
#[derive(Clone, Debug)]
pub struct TactTimingTable {
    config: ScreenConfiguration,
    table: Box<[TactDescriptor]>,
}

impl TactTimingTable {
    /// Builds the table for the given screen configuration.
    pub fn new(config: ScreenConfiguration) -> Result<Self, ScreenConfigError> {
        config.validate()?;
        let line_time = config.screen_line_time();
        let table = (0..config.frame_tact_count())
                    .map(|tact| describe_tact(&config, tact / line_time, tact % line_time))
                    .collect();
        Ok(TactTimingTable { config, table })
    }
    #[inline]
    pub fn config(&self) -> &ScreenConfiguration {
        &self.config
    }
    /// Returns the number of tacts in a frame.
    #[inline]
    pub fn len(&self) -> FrameTact {
        self.table.len() as FrameTact
    }
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
    /// Returns the descriptor of the given frame tact, wrapping it modulo frame length.
    #[inline]
    pub fn descriptor(&self, tact: FrameTact) -> &TactDescriptor {
        &self.table[(tact % self.len()) as usize]
    }
    /// Returns the contention delay at the given frame tact, wrapping it modulo frame length.
    #[inline]
    pub fn contention_delay(&self, tact: FrameTact) -> u8 {
        self.descriptor(tact).contention_delay
    }
    pub fn descriptors(&self) -> &[TactDescriptor] {
        &self.table
    }
}

fn describe_tact(cfg: &ScreenConfiguration, line: u32, tact_in_line: u32) -> TactDescriptor {
    use TactPhase::*;
    let mut desc = TactDescriptor::default();
    if !cfg.is_visible(line, tact_in_line) {
        return desc
    }
    desc.x = u16::try_from((tact_in_line - cfg.horizontal_blanking_time) * 2).unwrap_or(u16::MAX);
    desc.y = u16::try_from(line - cfg.vertical_sync_lines - cfg.non_visible_border_top_lines)
             .unwrap_or(u16::MAX);

    let is_display_line = line >= cfg.first_display_line() && line <= cfg.last_display_line();
    let first_pixel = cfg.first_pixel_tact();
    let pixel_prefetch = cfg.pixel_data_prefetch_time;
    let attr_prefetch = cfg.attribute_data_prefetch_time;
    let display_time = cfg.display_line_time;

    if is_display_line {
        // the contended window spans from 2 tacts before the first pixel to 2 tacts before the last
        let start = first_pixel - 2;
        if tact_in_line >= start && tact_in_line < start + display_time {
            desc.contention_delay = CONTENTION_PATTERN[((tact_in_line - start) & 7) as usize];
        }
    }

    if !cfg.is_display(line, tact_in_line) {
        desc.phase = Border;
        if is_display_line {
            if tact_in_line == first_pixel - pixel_prefetch {
                desc.phase = BorderFetchPixel;
                desc.pixel_fetch_address = pixel_address(cfg, line, first_pixel);
            }
            else if tact_in_line == first_pixel - attr_prefetch {
                desc.phase = BorderFetchAttr;
                desc.attr_fetch_address = attr_address(cfg, line, first_pixel);
            }
        }
        return desc
    }

    let pixel_tact = tact_in_line - first_pixel;
    let offset = pixel_tact & 7;
    let last_group = pixel_tact - offset + 8 >= display_time;
    let fetch_pixel = 4 - pixel_prefetch;
    let fetch_attr = 4 - attr_prefetch;
    desc.phase = if offset < 4 {
        if offset == fetch_pixel {
            desc.pixel_fetch_address = pixel_address(cfg, line, tact_in_line + pixel_prefetch);
            DisplayB1FetchB2
        }
        else if offset == fetch_attr {
            desc.attr_fetch_address = attr_address(cfg, line, tact_in_line + attr_prefetch);
            DisplayB1FetchA2
        }
        else {
            DisplayB1
        }
    }
    else if !last_group && offset == 4 + fetch_pixel {
        desc.pixel_fetch_address = pixel_address(cfg, line, tact_in_line + pixel_prefetch);
        DisplayB2FetchB1
    }
    else if !last_group && offset == 4 + fetch_attr {
        desc.attr_fetch_address = attr_address(cfg, line, tact_in_line + attr_prefetch);
        DisplayB2FetchA1
    }
    else {
        DisplayB2
    };
    desc
}

/// The bitmap address of the pixel byte drawn at the given display line and tact.
fn pixel_address(cfg: &ScreenConfiguration, line: u32, tact_in_line: u32) -> u16 {
    let row = (line - cfg.first_display_line()) as u16;
    let column = ((tact_in_line - cfg.first_pixel_tact()) >> 2) as u16;
    SCREEN_ADDRESS | pixel_line_offset(row) | column
}

/// The attribute address of the cell drawn at the given display line and tact.
fn attr_address(cfg: &ScreenConfiguration, line: u32, tact_in_line: u32) -> u16 {
    let row = (line - cfg.first_display_line()) as u16;
    let column = ((tact_in_line - cfg.first_pixel_tact()) >> 2) as u16;
    ATTRS_ADDRESS + (color_line_offset(row) | column)
}
