/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of SPECTACT, a Rust library for building emulators.

    For the full copyright notice, see the lib.rs file.
*/
//! # Video API
//!
//! The ULA draws the screen while the CPU runs. Every tact of a frame is classified up front
//! by a [TactTimingTable] built from a [ScreenConfiguration], and a [ScreenRenderer] consumes
//! ranges of tacts writing palette indexes into its pixel buffer.
mod renderer;
mod tact_table;

use core::convert::TryFrom;
use core::fmt;
use core::ops::{BitAnd, BitOr, Shl, Shr};

#[cfg(feature = "snapshot")]
use serde::{Serialize, Deserialize};

use bitflags::bitflags;

use crate::clock::FrameTact;

pub use renderer::{ScreenRenderer, FrameSink, NoFrameSink};
pub use tact_table::{TactPhase, TactDescriptor, TactTimingTable};

/// The number of columns of INK/PAPER pixels in a single display line.
pub const DISPLAY_PIXELS: u32 = 256;
/// The number of display lines of INK/PAPER pixels.
pub const DISPLAY_LINES: u32 = 192;

/// The ARGB values of the 16 Spectrum colors.
///
/// Indexes 0-7 are the normal colors: black, blue, red, magenta, green, cyan, yellow, white.
/// Indexes 8-15 are the same colors with BRIGHT set.
pub const SPECTRUM_COLORS: [u32; 16] = [
    0xFF00_0000, 0xFF00_00AA, 0xFFAA_0000, 0xFFAA_00AA,
    0xFF00_AA00, 0xFF00_AAAA, 0xFFAA_AA00, 0xFFAA_AAAA,
    0xFF00_0000, 0xFF00_00FF, 0xFFFF_0000, 0xFFFF_00FF,
    0xFF00_FF00, 0xFF00_FFFF, 0xFFFF_FF00, 0xFFFF_FFFF,
];

bitflags! {
    /// Bitflags defining ZX Spectrum's border colors.
    #[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
    #[cfg_attr(feature = "snapshot", serde(try_from = "u8", into = "u8"))]
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct BorderColor: u8 {
        const BLACK   = 0b000;
        const BLUE    = 0b001;
        const RED     = 0b010;
        const MAGENTA = 0b011;
        const GREEN   = 0b100;
        const CYAN    = 0b101;
        const YELLOW  = 0b110;
        const WHITE   = 0b111;
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TryFromU8BorderColorError(pub u8);

/// The timing parameters of a single screen variant.
///
/// All horizontal values are measured in tacts, all vertical values in lines.
/// A single tact covers 2 horizontal pixels.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScreenConfiguration {
    pub vertical_sync_lines: u32,
    pub non_visible_border_top_lines: u32,
    pub border_top_lines: u32,
    pub display_lines: u32,
    pub border_bottom_lines: u32,
    pub non_visible_border_bottom_lines: u32,
    pub horizontal_blanking_time: u32,
    pub border_left_time: u32,
    pub display_line_time: u32,
    pub border_right_time: u32,
    pub non_visible_border_right_time: u32,
    /// How many tacts before being displayed a pixel byte is fetched.
    pub pixel_data_prefetch_time: u32,
    /// How many tacts before being displayed an attribute byte is fetched.
    pub attribute_data_prefetch_time: u32,
}

/// Returned from [ScreenConfiguration::validate].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScreenConfigError {
    /// The display area must fit into 192 lines by 128 tacts, in whole 8 tact groups.
    DisplaySize,
    /// Prefetch times must satisfy `0 < attribute < pixel <= 4`.
    PrefetchTime,
    /// The left border must be wide enough to hold the first fetches.
    BorderTooNarrow,
}

impl ScreenConfiguration {
    /// The ZX Spectrum 48k screen.
    pub const ZX_SPECTRUM_48: ScreenConfiguration = ScreenConfiguration {
        vertical_sync_lines: 8,
        non_visible_border_top_lines: 8,
        border_top_lines: 48,
        display_lines: 192,
        border_bottom_lines: 48,
        non_visible_border_bottom_lines: 8,
        horizontal_blanking_time: 40,
        border_left_time: 24,
        display_line_time: 128,
        border_right_time: 24,
        non_visible_border_right_time: 8,
        pixel_data_prefetch_time: 2,
        attribute_data_prefetch_time: 1,
    };

    /// Checks that the configuration describes a screen the tact table can be built for.
    pub fn validate(&self) -> Result<(), ScreenConfigError> {
        if self.display_lines == 0 || self.display_lines > DISPLAY_LINES ||
           self.display_line_time == 0 || self.display_line_time % 8 != 0 ||
           self.display_line_time > DISPLAY_PIXELS / 2 {
            return Err(ScreenConfigError::DisplaySize)
        }
        let (pixel, attr) = (self.pixel_data_prefetch_time, self.attribute_data_prefetch_time);
        if attr == 0 || attr >= pixel || pixel > 4 {
            return Err(ScreenConfigError::PrefetchTime)
        }
        if self.border_left_time < pixel {
            return Err(ScreenConfigError::BorderTooNarrow)
        }
        Ok(())
    }
    /// The number of tacts in a single screen line.
    #[inline]
    pub fn screen_line_time(&self) -> u32 {
        self.horizontal_blanking_time + self.border_left_time + self.display_line_time +
        self.border_right_time + self.non_visible_border_right_time
    }
    /// The number of screen lines in a frame.
    #[inline]
    pub fn screen_lines(&self) -> u32 {
        self.vertical_sync_lines + self.non_visible_border_top_lines + self.border_top_lines +
        self.display_lines + self.border_bottom_lines + self.non_visible_border_bottom_lines
    }
    /// The number of tacts in a single frame.
    #[inline]
    pub fn frame_tact_count(&self) -> FrameTact {
        self.screen_line_time() * self.screen_lines()
    }
    /// The index of the first screen line with INK/PAPER pixels.
    #[inline]
    pub fn first_display_line(&self) -> u32 {
        self.vertical_sync_lines + self.non_visible_border_top_lines + self.border_top_lines
    }
    /// The index of the last screen line with INK/PAPER pixels.
    #[inline]
    pub fn last_display_line(&self) -> u32 {
        self.first_display_line() + self.display_lines - 1
    }
    /// The tact in a line at which the first INK/PAPER pixel pair is drawn.
    #[inline]
    pub fn first_pixel_tact(&self) -> u32 {
        self.horizontal_blanking_time + self.border_left_time
    }
    /// The width of the visible screen area in pixels.
    #[inline]
    pub fn screen_width(&self) -> u32 {
        2 * (self.border_left_time + self.display_line_time + self.border_right_time)
    }
    /// The number of visible screen lines.
    #[inline]
    pub fn screen_visible_lines(&self) -> u32 {
        self.border_top_lines + self.display_lines + self.border_bottom_lines
    }
    /// Returns `true` if the given line and tact in line is drawn on the visible screen.
    pub fn is_visible(&self, line: u32, tact_in_line: u32) -> bool {
        let top = self.vertical_sync_lines + self.non_visible_border_top_lines;
        line >= top && line < top + self.screen_visible_lines() &&
        tact_in_line >= self.horizontal_blanking_time &&
        tact_in_line < self.screen_line_time() - self.non_visible_border_right_time
    }
    /// Returns `true` if the given line and tact in line is inside the INK/PAPER area.
    pub fn is_display(&self, line: u32, tact_in_line: u32) -> bool {
        let first_pixel = self.first_pixel_tact();
        line >= self.first_display_line() && line <= self.last_display_line() &&
        tact_in_line >= first_pixel && tact_in_line < first_pixel + self.display_line_time
    }
}

impl Default for ScreenConfiguration {
    fn default() -> Self {
        ScreenConfiguration::ZX_SPECTRUM_48
    }
}

impl std::error::Error for ScreenConfigError {}

impl fmt::Display for ScreenConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScreenConfigError::DisplaySize => "display area exceeds 192 lines of 128 tacts or is not 8 tact aligned",
            ScreenConfigError::PrefetchTime => "invalid pixel or attribute prefetch time",
            ScreenConfigError::BorderTooNarrow => "left border is narrower than the pixel prefetch time",
        })
    }
}

impl std::error::Error for TryFromU8BorderColorError {}

impl fmt::Display for TryFromU8BorderColorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "converted integer ({}) out of range for `BorderColor`", self.0)
    }
}

impl TryFrom<u8> for BorderColor {
    type Error = TryFromU8BorderColorError;
    fn try_from(color: u8) -> core::result::Result<Self, Self::Error> {
        BorderColor::from_bits(color).ok_or(TryFromU8BorderColorError(color))
    }
}

impl From<BorderColor> for u8 {
    fn from(color: BorderColor) -> u8 {
        color.bits()
    }
}

impl BorderColor {
    /// Extracts the border color from a value written to the ULA port.
    #[inline]
    pub fn from_ula_port(data: u8) -> Self {
        BorderColor::from_bits_truncate(data & 7)
    }
}

/// Decodes the INK color index (0-15) from the given attribute.
#[inline]
pub fn ink_index(attr: u8) -> u8 {
    (attr & 0b0000_0111) | ((attr & 0b0100_0000) >> 3)
}

/// Decodes the PAPER color index (0-15) from the given attribute.
#[inline]
pub fn paper_index(attr: u8) -> u8 {
    ((attr & 0b0011_1000) >> 3) | ((attr & 0b0100_0000) >> 3)
}

/// Returns an offset into INK/PAPER bitmap memory of the given vertical coordinate `y` [0, 192) (0 on top).
#[inline(always)]
pub fn pixel_line_offset<T>(y: T) -> T
    where T: Copy + From<u16> + BitAnd<Output=T> + Shl<u16, Output=T> + BitOr<Output=T>
{
    (y & T::from(0b0000_0111) ) << 8 |
    (y & T::from(0b0011_1000) ) << 2 |
    (y & T::from(0b1100_0000) ) << 5
}

/// Returns an offset into attributes memory of the given vertical coordinate `y` [0, 192) (0 on top).
#[inline(always)]
pub fn color_line_offset<T>(y: T) -> T
    where T: Copy + From<u16> + Shr<u16, Output=T> + Shl<u16, Output=T>
{
    (y >> 3) << 5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screen_48_geometry_works() {
        let cfg = ScreenConfiguration::ZX_SPECTRUM_48;
        assert_eq!(cfg.validate(), Ok(()));
        assert_eq!(cfg.screen_line_time(), 224);
        assert_eq!(cfg.screen_lines(), 312);
        assert_eq!(cfg.frame_tact_count(), 69888);
        assert_eq!(cfg.first_display_line(), 64);
        assert_eq!(cfg.last_display_line(), 255);
        assert_eq!(cfg.first_pixel_tact(), 64);
        assert_eq!(cfg.screen_width(), 352);
        assert_eq!(cfg.screen_visible_lines(), 288);
        assert!(!cfg.is_visible(15, 100));
        assert!(cfg.is_visible(16, 40));
        assert!(!cfg.is_visible(16, 39));
        assert!(!cfg.is_visible(16, 216));
        assert!(cfg.is_display(64, 64));
        assert!(!cfg.is_display(64, 192));
        assert!(!cfg.is_display(256, 100));
    }

    #[test]
    fn screen_config_validation_works() {
        let mut cfg = ScreenConfiguration::ZX_SPECTRUM_48;
        cfg.attribute_data_prefetch_time = 2;
        assert_eq!(cfg.validate(), Err(ScreenConfigError::PrefetchTime));
        cfg = ScreenConfiguration::ZX_SPECTRUM_48;
        cfg.display_lines = 200;
        assert_eq!(cfg.validate(), Err(ScreenConfigError::DisplaySize));
        cfg = ScreenConfiguration::ZX_SPECTRUM_48;
        cfg.border_left_time = 1;
        assert_eq!(cfg.validate(), Err(ScreenConfigError::BorderTooNarrow));
    }

    #[test]
    fn border_color_conversion_works() {
        assert_eq!(BorderColor::try_from(0b101), Ok(BorderColor::CYAN));
        assert_eq!(BorderColor::try_from(8), Err(TryFromU8BorderColorError(8)));
        assert_eq!(BorderColor::from_ula_port(0b1111_1010), BorderColor::RED);
        assert_eq!(u8::from(BorderColor::WHITE), 7);
    }

    #[test]
    fn attribute_colors_work() {
        assert_eq!(ink_index(0b0100_0010), 10);
        assert_eq!(paper_index(0b0100_0010), 8);
        assert_eq!(paper_index(0b1011_1000), 7);
        assert_eq!(ink_index(0b1011_1000), 0);
    }

    #[test]
    fn line_offsets_work() {
        assert_eq!(pixel_line_offset(0u16), 0);
        assert_eq!(pixel_line_offset(1u16), 0x100);
        assert_eq!(pixel_line_offset(8u16), 0x20);
        assert_eq!(pixel_line_offset(64u16), 0x800);
        assert_eq!(pixel_line_offset(191u16), 0x17E0);
        assert_eq!(color_line_offset(191u16), 0x2E0);
    }
}
