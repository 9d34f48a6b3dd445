//! Rendering the screen along with the emulated frame.
use spectact::clock::{Tact, CPU_HZ_48K};
use spectact::memory::{Memory64k, MemoryAccess};
use spectact::video::{BorderColor, FrameSink, ScreenConfiguration, ScreenRenderer};

#[derive(Default)]
struct FrameCollector {
    frames: Vec<Vec<u8>>,
    width: usize,
}

impl FrameSink for FrameCollector {
    fn display_frame(&mut self, pixels: &[u8], width: usize) {
        self.frames.push(pixels.to_vec());
        self.width = width;
    }
}

#[test]
fn screen_border_stripes_follow_tacts() {
    let config = ScreenConfiguration::ZX_SPECTRUM_48;
    let frame = Tact::from(config.frame_tact_count());
    let line = Tact::from(config.screen_line_time());
    let mut mem = Memory64k::new();
    for addr in 0x5800..0x5B00 {
        mem.write_byte(addr, 0b0011_1000);
    }
    let mut r = ScreenRenderer::with_sink(config, CPU_HZ_48K, FrameCollector::default()).unwrap();
    for n in 0..2 {
        let start = n * frame;
        r.start_new_frame(&mem);
        r.set_border_color(BorderColor::RED);
        r.render_screen(&mem, start, start + 116 * line - 1);
        r.set_border_color(BorderColor::CYAN);
        r.render_screen(&mem, start + 116 * line, start + frame - 1);
        r.complete_frame();
    }
    let sink = r.sink();
    assert_eq!(sink.frames.len(), 2);
    assert_eq!(sink.frames[0], sink.frames[1]);
    let width = sink.width;
    let pixel = |x: usize, y: usize| sink.frames[0][y * width + x];
    for &x in &[0, 1, 40, 47, 304, 351] {
        assert_eq!(pixel(x, 90), 2);
        assert_eq!(pixel(x, 110), 5);
    }
    // white paper with no ink in the display area
    assert_eq!(pixel(48, 90), 7);
    assert_eq!(pixel(303, 110), 7);
}

#[test]
fn screen_contention_follows_display_lines() {
    let config = ScreenConfiguration::ZX_SPECTRUM_48;
    let r = ScreenRenderer::new(config, CPU_HZ_48K).unwrap();
    let frame = Tact::from(config.frame_tact_count());
    let total: u64 = (0..frame).map(|t| u64::from(r.contention_delay(t))).sum();
    assert_eq!(total, 192 * 16 * 21);
    // the pattern repeats in the next frames
    let line = Tact::from(config.screen_line_time());
    let first = u64::from(config.first_display_line()) * line + u64::from(config.first_pixel_tact()) - 2;
    let delays: Vec<u8> = (0..8).map(|t| r.contention_delay(frame * 3 + first + t)).collect();
    assert_eq!(delays, [6, 5, 4, 3, 2, 1, 0, 0]);
}
