/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of SPECTACT, a Rust library for building emulators.

    For the full copyright notice, see the lib.rs file.
*/
use log::debug;

use crate::clock::{Tact, FrameTact};
use crate::memory::ScreenMemory;
use super::{
    BorderColor, ScreenConfiguration, ScreenConfigError,
    TactPhase, TactDescriptor, TactTimingTable,
    ink_index, paper_index
};

/// Receives rendered frames from a [ScreenRenderer].
///
/// All methods have empty default implementations.
pub trait FrameSink {
    /// Called when the renderer starts drawing a new frame.
    fn start_new_frame(&mut self) {}
    /// Called with the pixel buffer once a frame has been completely drawn.
    ///
    /// The buffer contains palette indexes (0-15) into [SPECTRUM_COLORS][super::SPECTRUM_COLORS],
    /// `width` pixels per line.
    fn display_frame(&mut self, _pixels: &[u8], _width: usize) {}
    /// Called when the renderer is reset.
    fn reset(&mut self) {}
}

/// A [FrameSink] discarding everything.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NoFrameSink;

impl FrameSink for NoFrameSink {}

/// Renders the screen memory tact by tact into a buffer of palette indexes.
///
/// The pixel latches are never shifted in place, rendering the same range twice
/// with unchanged memory yields the same pixels.
pub struct ScreenRenderer<S = NoFrameSink> {
    table: TactTimingTable,
    width: usize,
    pixel_buffer: Box<[u8]>,
    flash_off_colors: Box<[u8; 512]>,
    flash_on_colors: Box<[u8; 512]>,
    flash_toggle_frames: u32,
    flash_phase: bool,
    frame_count: u32,
    border_color: BorderColor,
    overflow: FrameTact,
    pixel_byte1: u8,
    pixel_byte2: u8,
    attr_byte1: u8,
    attr_byte2: u8,
    sink: S,
}

impl ScreenRenderer<NoFrameSink> {
    /// Creates a renderer for the given screen, with the CPU running at `cpu_hz`.
    pub fn new(config: ScreenConfiguration, cpu_hz: u32) -> Result<Self, ScreenConfigError> {
        ScreenRenderer::with_sink(config, cpu_hz, NoFrameSink)
    }
}

impl<S: FrameSink> ScreenRenderer<S> {
    /// Creates a renderer passing completed frames to the given `sink`.
    pub fn with_sink(config: ScreenConfiguration, cpu_hz: u32, sink: S) -> Result<Self, ScreenConfigError> {
        let table = TactTimingTable::new(config)?;
        let width = config.screen_width() as usize;
        let pixel_buffer = vec![0u8; width * config.screen_visible_lines() as usize].into_boxed_slice();
        let refresh_rate = cpu_hz as f64 / config.frame_tact_count() as f64;
        let flash_toggle_frames = ((refresh_rate / 2.0).round() as u32).max(1);
        debug!("screen renderer: {}x{} flash every {} frames",
                width, config.screen_visible_lines(), flash_toggle_frames);
        let (flash_off_colors, flash_on_colors) = attribute_color_tables();
        Ok(ScreenRenderer {
            table,
            width,
            pixel_buffer,
            flash_off_colors,
            flash_on_colors,
            flash_toggle_frames,
            flash_phase: false,
            frame_count: 0,
            border_color: BorderColor::default(),
            overflow: 0,
            pixel_byte1: 0,
            pixel_byte2: 0,
            attr_byte1: 0,
            attr_byte2: 0,
            sink,
        })
    }
    #[inline]
    pub fn config(&self) -> &ScreenConfiguration {
        self.table.config()
    }
    #[inline]
    pub fn tact_table(&self) -> &TactTimingTable {
        &self.table
    }
    #[inline]
    pub fn sink(&self) -> &S {
        &self.sink
    }
    #[inline]
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
    /// The rendered palette indexes, [ScreenConfiguration::screen_width] pixels per line.
    #[inline]
    pub fn pixel_buffer(&self) -> &[u8] {
        &self.pixel_buffer
    }
    /// The width of a single pixel buffer line.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }
    #[inline]
    pub fn border_color(&self) -> BorderColor {
        self.border_color
    }
    #[inline]
    pub fn set_border_color(&mut self, border: BorderColor) {
        self.border_color = border;
    }
    #[inline]
    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }
    /// `true` if flashing attributes currently have their INK and PAPER swapped.
    #[inline]
    pub fn flash_phase(&self) -> bool {
        self.flash_phase
    }
    /// The number of frames between flash phase changes.
    #[inline]
    pub fn flash_toggle_frames(&self) -> u32 {
        self.flash_toggle_frames
    }
    /// Sets the number of tacts the previous frame overran its end by.
    ///
    /// These tacts are rendered at the start of the next frame.
    #[inline]
    pub fn set_overflow(&mut self, overflow: FrameTact) {
        self.overflow = overflow;
    }
    /// Returns the contention delay at the given tact.
    #[inline]
    pub fn contention_delay(&self, tact: Tact) -> u8 {
        self.table.contention_delay(self.frame_tact(tact))
    }
    /// Fills the whole pixel buffer with the given palette index.
    pub fn fill_pixel_buffer(&mut self, color: u8) {
        for pixel in self.pixel_buffer.iter_mut() {
            *pixel = color;
        }
    }
    /// Resets counters, latches and the border, clears the pixel buffer.
    pub fn reset(&mut self) {
        self.frame_count = 0;
        self.flash_phase = false;
        self.overflow = 0;
        self.border_color = BorderColor::default();
        self.pixel_byte1 = 0;
        self.pixel_byte2 = 0;
        self.attr_byte1 = 0;
        self.attr_byte2 = 0;
        self.fill_pixel_buffer(0);
        self.sink.reset();
    }
    /// Counts a new frame, toggles the flash phase when due and renders the overflow tacts.
    pub fn start_new_frame<M: ScreenMemory + ?Sized>(&mut self, memory: &M) {
        self.frame_count = self.frame_count.wrapping_add(1);
        if self.frame_count % self.flash_toggle_frames == 0 {
            self.flash_phase = !self.flash_phase;
        }
        self.sink.start_new_frame();
        let overflow = Tact::from(self.overflow);
        self.render_screen(memory, 0, overflow);
    }
    /// Passes the pixel buffer to the sink.
    pub fn complete_frame(&mut self) {
        self.sink.display_frame(&self.pixel_buffer, self.width);
    }
    /// Renders all tacts from `from_tact` to `to_tact` inclusive.
    ///
    /// Both ends are taken modulo the frame length. If `to_tact` precedes `from_tact` in the frame
    /// the range wraps around the end of the frame.
    pub fn render_screen<M: ScreenMemory + ?Sized>(&mut self, memory: &M, from_tact: Tact, to_tact: Tact) {
        let from = self.frame_tact(from_tact);
        let to = self.frame_tact(to_tact);
        if from <= to {
            self.render_frame_tacts(memory, from, to + 1);
        }
        else {
            self.render_frame_tacts(memory, from, self.table.len());
            self.render_frame_tacts(memory, 0, to + 1);
        }
    }

    fn frame_tact(&self, tact: Tact) -> FrameTact {
        (tact % Tact::from(self.table.len())) as FrameTact
    }

    fn render_frame_tacts<M: ScreenMemory + ?Sized>(&mut self, memory: &M, from: FrameTact, end: FrameTact) {
        for tact in from..end {
            let desc = *self.table.descriptor(tact);
            self.render_tact(memory, &desc);
        }
    }

    fn render_tact<M: ScreenMemory + ?Sized>(&mut self, memory: &M, desc: &TactDescriptor) {
        use TactPhase::*;
        let border = self.border_color.bits();
        let (left, right) = match desc.phase {
            None => return,
            Border => (border, border),
            BorderFetchPixel => {
                self.pixel_byte1 = memory.read_screen_byte(desc.pixel_fetch_address);
                (border, border)
            }
            BorderFetchAttr => {
                self.attr_byte1 = memory.read_screen_byte(desc.attr_fetch_address);
                (border, border)
            }
            DisplayB1|DisplayB1FetchB2|DisplayB1FetchA2 => {
                let pixels = self.display_pixels(self.pixel_byte1, self.attr_byte1, desc);
                match desc.phase {
                    DisplayB1FetchB2 => self.pixel_byte2 = memory.read_screen_byte(desc.pixel_fetch_address),
                    DisplayB1FetchA2 => self.attr_byte2 = memory.read_screen_byte(desc.attr_fetch_address),
                    _ => {}
                }
                pixels
            }
            DisplayB2|DisplayB2FetchB1|DisplayB2FetchA1 => {
                let pixels = self.display_pixels(self.pixel_byte2, self.attr_byte2, desc);
                match desc.phase {
                    DisplayB2FetchB1 => self.pixel_byte1 = memory.read_screen_byte(desc.pixel_fetch_address),
                    DisplayB2FetchA1 => self.attr_byte1 = memory.read_screen_byte(desc.attr_fetch_address),
                    _ => {}
                }
                pixels
            }
        };
        let index = desc.y as usize * self.width + desc.x as usize;
        if let Some(target) = self.pixel_buffer.get_mut(index..index + 2) {
            target[0] = left;
            target[1] = right;
        }
    }

    /// Returns the colors of 2 pixels drawn from the given latched bytes at the tact.
    #[inline]
    fn display_pixels(&self, pixel_byte: u8, attr: u8, desc: &TactDescriptor) -> (u8, u8) {
        // each tact draws 2 of the 8 bits, starting with the most significant
        let pixel_tact = (u32::from(desc.x) >> 1) - self.config().border_left_time;
        let bits = pixel_byte << ((pixel_tact & 3) * 2);
        let colors = if self.flash_phase { &self.flash_on_colors } else { &self.flash_off_colors };
        let color = |mask: u8| {
            let ink = if bits & mask != 0 { 0x100 } else { 0 };
            colors[ink | attr as usize]
        };
        (color(0x80), color(0x40))
    }
}

/// Builds the attribute color tables for both flash phases.
///
/// A table is indexed by the attribute, adding 0x100 for INK pixels.
fn attribute_color_tables() -> (Box<[u8; 512]>, Box<[u8; 512]>) {
    let mut flash_off = Box::new([0u8; 512]);
    let mut flash_on = Box::new([0u8; 512]);
    for attr in 0..=255u8 {
        let (ink, paper) = (ink_index(attr), paper_index(attr));
        let index = attr as usize;
        flash_off[index] = paper;
        flash_off[0x100 + index] = ink;
        let flash = attr & 0x80 != 0;
        flash_on[index] = if flash { ink } else { paper };
        flash_on[0x100 + index] = if flash { paper } else { ink };
    }
    (flash_off, flash_on)
}
