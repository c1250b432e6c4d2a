//! Main PPU (Picture Processing Unit) implementation.
//!
//! The Ricoh 2C02 PPU is responsible for generating the video output
//! for the NES. It renders 256x240 pixel frames at 60Hz (NTSC).
//!
//! # Memory Map (PPU address space)
//!
//! ```text
//! $0000-$0FFF: Pattern Table 0 (CHR ROM/RAM, via mapper)
//! $1000-$1FFF: Pattern Table 1 (CHR ROM/RAM, via mapper)
//! $2000-$2FFF: Nametables (internal VRAM with mirroring)
//! $3F00-$3F1F: Palette RAM
//! ```
//!
//! # CPU Registers ($2000-$2007)
//!
//! ```text
//! $2000: PPUCTRL   - Control register
//! $2001: PPUMASK   - Mask register
//! $2002: PPUSTATUS - Status register
//! $2003: OAMADDR   - OAM address
//! $2004: OAMDATA   - OAM data
//! $2005: PPUSCROLL - Scroll position
//! $2006: PPUADDR   - VRAM address
//! $2007: PPUDATA   - VRAM data
//! ```

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use crate::background::Background;
use crate::oam::{Oam, SecondaryOam};
use crate::registers::{PpuCtrl, PpuMask, PpuStatus};
use crate::scroll::Scroll;
use crate::sprites::{SpriteEvaluator, SpriteRenderer};
use crate::timing::Timing;
use crate::vram::{Mirroring, Vram};

/// Frame buffer width (256 pixels).
pub const FRAME_WIDTH: usize = 256;
/// Frame buffer height (240 pixels).
pub const FRAME_HEIGHT: usize = 240;
/// Frame buffer total size (256x240 = 61440 pixels).
pub const FRAME_SIZE: usize = FRAME_WIDTH * FRAME_HEIGHT;

/// PPU (Picture Processing Unit).
///
/// Implements the Ricoh 2C02 PPU for cycle-accurate NES emulation.
pub struct Ppu {
    ctrl: PpuCtrl,
    mask: PpuMask,
    status: PpuStatus,
    scroll: Scroll,

    vram: Vram,
    oam: Oam,

    background: Background,
    sprite_renderer: SpriteRenderer,
    sprite_evaluator: SpriteEvaluator,
    secondary_oam: SecondaryOam,

    timing: Timing,

    /// Palette indices (0-63), one per pixel.
    frame_buffer: Vec<u8>,

    vram_read_buffer: u8,
    open_bus_latch: u8,
    decay_counter: u32,
    nmi_pending: bool,

    /// A12 line state from the most recent pattern-table fetch.
    last_chr_a12: bool,
    /// Set when a pattern-table fetch raises A12 from low to high; consumed
    /// by the bus to clock mapper IRQ counters (MMC3 and similar).
    a12_rising_edge: bool,
}

impl Ppu {
    /// Create a new PPU with the given nametable mirroring.
    #[must_use]
    pub fn new(mirroring: Mirroring) -> Self {
        Self {
            ctrl: PpuCtrl::empty(),
            mask: PpuMask::empty(),
            status: PpuStatus::empty(),
            scroll: Scroll::new(),
            vram: Vram::new(mirroring),
            oam: Oam::new(),
            background: Background::new(),
            sprite_renderer: SpriteRenderer::new(),
            sprite_evaluator: SpriteEvaluator::new(),
            secondary_oam: SecondaryOam::new(),
            timing: Timing::new(),
            frame_buffer: zeroed_frame_buffer(),
            vram_read_buffer: 0,
            open_bus_latch: 0,
            decay_counter: 0,
            nmi_pending: false,
            last_chr_a12: false,
            a12_rising_edge: false,
        }
    }

    /// Record a pattern-table fetch address, detecting an A12 rising edge.
    fn note_chr_fetch(&mut self, addr: u16) {
        let a12 = addr & 0x1000 != 0;
        if a12 && !self.last_chr_a12 {
            self.a12_rising_edge = true;
        }
        self.last_chr_a12 = a12;
    }

    /// Take and clear the pending A12 rising-edge flag.
    ///
    /// The bus polls this after each [`Self::step_with_chr`] call to clock
    /// mapper IRQ counters (e.g. MMC3) the way real hardware does.
    pub fn take_a12_rising_edge(&mut self) -> bool {
        let edge = self.a12_rising_edge;
        self.a12_rising_edge = false;
        edge
    }

    /// Open-bus decay models roughly one second at the PPU dot rate.
    fn refresh_open_bus(&mut self) {
        self.decay_counter = 5_300_000;
    }

    /// Read a PPU register (CPU memory map $2000-$2007).
    ///
    /// `read_chr` services pattern-table reads below $2000 for buffered PPUDATA.
    pub fn read_register<F: FnMut(u16) -> u8>(&mut self, addr: u16, mut read_chr: F) -> u8 {
        match addr & 0x07 {
            // PPUCTRL, PPUMASK, OAMADDR, PPUSCROLL, PPUADDR are write-only.
            0 | 1 | 3 | 5 | 6 => self.open_bus_latch,

            // PPUSTATUS
            2 => {
                // Suppress NMI if read lands exactly on the set dot.
                if self.timing.scanline() == 241 && self.timing.dot() == 1 {
                    self.nmi_pending = false;
                }
                let result = (self.status.bits() & 0xE0) | (self.open_bus_latch & 0x1F);
                self.status.clear_vblank();
                self.scroll.reset_latch();
                self.open_bus_latch = result;
                self.refresh_open_bus();
                result
            }

            // OAMDATA
            4 => {
                let value = self.oam.read();
                self.open_bus_latch = value;
                self.refresh_open_bus();
                value
            }

            // PPUDATA
            7 => {
                let addr = self.scroll.vram_addr();
                let result = if (addr & 0x3FFF) < 0x2000 {
                    let buffered = self.vram_read_buffer;
                    self.vram_read_buffer = read_chr(addr & 0x3FFF);
                    buffered
                } else if addr >= 0x3F00 {
                    self.vram_read_buffer = self.vram.read(addr.wrapping_sub(0x1000));
                    self.vram.read(addr)
                } else {
                    let buffered = self.vram_read_buffer;
                    self.vram_read_buffer = self.vram.read(addr);
                    buffered
                };

                let increment = self.ctrl.vram_increment();
                self.scroll.increment_vram(increment);

                self.open_bus_latch = result;
                self.refresh_open_bus();
                result
            }

            _ => unreachable!(),
        }
    }

    /// Write a PPU register (CPU memory map $2000-$2007).
    ///
    /// `write_chr` services pattern-table (CHR-RAM) writes below $2000.
    pub fn write_register<F: FnMut(u16, u8)>(&mut self, addr: u16, value: u8, mut write_chr: F) {
        self.open_bus_latch = value;
        self.refresh_open_bus();

        match addr & 0x07 {
            // PPUCTRL
            0 => {
                let was_nmi_enabled = self.ctrl.nmi_enabled();
                self.ctrl = PpuCtrl::from_bits_truncate(value);
                self.scroll.write_ctrl(value);

                if !was_nmi_enabled && self.ctrl.nmi_enabled() && self.status.in_vblank() {
                    self.nmi_pending = true;
                }
            }

            // PPUMASK
            1 => self.mask = PpuMask::from_bits_truncate(value),

            // PPUSTATUS is read-only.
            2 => {}

            // OAMADDR
            3 => self.oam.set_addr(value),

            // OAMDATA
            4 => self.oam.write(value),

            // PPUSCROLL
            5 => self.scroll.write_scroll(value),

            // PPUADDR
            6 => self.scroll.write_addr(value),

            // PPUDATA
            7 => {
                let addr = self.scroll.vram_addr();
                if (addr & 0x3FFF) < 0x2000 {
                    write_chr(addr & 0x3FFF, value);
                } else {
                    self.vram.write(addr, value);
                }
                let increment = self.ctrl.vram_increment();
                self.scroll.increment_vram(increment);
            }

            _ => unreachable!(),
        }
    }

    /// Perform OAM DMA (copy 256 bytes from CPU memory into OAM).
    pub fn oam_dma(&mut self, data: &[u8; 256]) {
        self.oam.dma_write(data);
    }

    /// Step the PPU by one dot without CHR access. Useful for tests that
    /// never fetch background/sprite pattern data.
    #[inline]
    pub fn step(&mut self) -> (bool, bool) {
        self.step_with_chr(|_| 0)
    }

    /// Step the PPU by one dot, sourcing pattern-table fetches through
    /// `read_chr`. Returns `(frame_complete, nmi_triggered)`.
    #[allow(clippy::too_many_lines)]
    pub fn step_with_chr<F: Fn(u16) -> u8>(&mut self, read_chr: F) -> (bool, bool) {
        if self.decay_counter > 0 {
            self.decay_counter -= 1;
            if self.decay_counter == 0 {
                self.open_bus_latch = 0;
            }
        }

        let rendering_enabled = self.mask.rendering_enabled();
        let frame_complete = self.timing.tick(rendering_enabled);
        let scanline = self.timing.scanline();
        let dot = self.timing.dot();

        if self.timing.is_vblank_set_dot() {
            self.status.set_vblank();
            if self.ctrl.nmi_enabled() {
                self.nmi_pending = true;
            }
        }

        if self.timing.is_vblank_clear_dot() {
            self.status.clear_vblank();
            self.status.clear_sprite_flags();
        }

        if rendering_enabled && self.timing.is_rendering_scanline() {
            if self.timing.is_visible_dot() || self.timing.is_prefetch_dot() {
                self.background.shift_registers();

                match dot % 8 {
                    1 => {
                        let nt_addr = self.scroll.nametable_addr();
                        let tile_index = self.vram.read(nt_addr);
                        self.background.set_nametable_byte(tile_index);
                    }
                    3 => {
                        let attr_addr = self.scroll.attribute_addr();
                        let attr_byte = self.vram.read(attr_addr);
                        self.background.set_attribute_byte(
                            attr_byte,
                            self.scroll.coarse_x(),
                            self.scroll.coarse_y(),
                        );
                    }
                    5 => {
                        let bg_base = self.ctrl.bg_table_addr();
                        let tile_index = self.background.nametable_byte();
                        let pattern_addr = self.scroll.pattern_addr(tile_index, bg_base);
                        self.note_chr_fetch(pattern_addr);
                        self.background.set_pattern_low(read_chr(pattern_addr));
                    }
                    7 => {
                        let bg_base = self.ctrl.bg_table_addr();
                        let tile_index = self.background.nametable_byte();
                        let pattern_addr = self.scroll.pattern_addr(tile_index, bg_base) + 8;
                        self.note_chr_fetch(pattern_addr);
                        self.background.set_pattern_high(read_chr(pattern_addr));
                    }
                    0 => {
                        self.background.load_shift_registers();
                        self.scroll.increment_x();
                    }
                    _ => {}
                }

                if dot == 256 {
                    self.scroll.increment_y();
                }
            }

            if self.timing.is_visible_dot() {
                self.sprite_renderer.tick();
            }

            if self.timing.is_hori_copy_dot() {
                self.scroll.copy_horizontal();
            }

            if self.timing.is_vert_copy_range() {
                self.scroll.copy_vertical();
            }

            if self.timing.is_visible_scanline() {
                if self.timing.is_sprite_eval_start() {
                    self.sprite_evaluator.start_evaluation();
                    self.secondary_oam.clear();
                }

                if self.timing.is_sprite_eval_range() {
                    self.sprite_evaluator.evaluate_step(
                        self.oam.data(),
                        scanline + 1,
                        self.ctrl.sprite_height(),
                        &mut self.secondary_oam,
                    );
                    if self.sprite_evaluator.overflow() {
                        self.status.set_sprite_overflow();
                    }
                }
            }

            if self.timing.is_sprite_fetch_start() {
                let sprite_zero_in_range = self.sprite_evaluator.sprite_zero_in_range();
                self.sprite_renderer
                    .load_sprites(&self.secondary_oam, sprite_zero_in_range);
            }

            if self.timing.is_sprite_fetch_range() {
                let fetch_cycle = dot - 257;
                let sprite_index = fetch_cycle / 8;
                let fetch_step = fetch_cycle % 8;

                if fetch_step == 7 {
                    if let Some(sprite) = self.secondary_oam.get_sprite(sprite_index as u8) {
                        let sprite_base = self.ctrl.sprite_table_addr();
                        let tile_index = sprite.tile_index;
                        let next_scanline = scanline + 1;
                        let sprite_y = next_scanline.saturating_sub(u16::from(sprite.y)).min(7);
                        let row = if sprite.attributes.flip_vertical() {
                            7 - sprite_y
                        } else {
                            sprite_y
                        };

                        let pattern_addr_low = sprite_base + u16::from(tile_index) * 16 + row;
                        self.note_chr_fetch(pattern_addr_low);
                        let mut pattern_low = read_chr(pattern_addr_low);
                        self.note_chr_fetch(pattern_addr_low + 8);
                        let mut pattern_high = read_chr(pattern_addr_low + 8);

                        if sprite.attributes.flip_horizontal() {
                            pattern_low = pattern_low.reverse_bits();
                            pattern_high = pattern_high.reverse_bits();
                        }

                        self.sprite_renderer.load_sprite_pattern(
                            sprite_index as u8,
                            pattern_low,
                            pattern_high,
                        );
                    }
                }
            }

            if self.timing.is_visible_scanline() && self.timing.is_visible_dot() {
                let x = dot - 1;
                let y = scanline;
                self.render_pixel(x as usize, y as usize);
            }
        }

        let nmi = self.nmi_pending;
        if nmi {
            self.nmi_pending = false;
        }

        (frame_complete, nmi)
    }

    fn render_pixel(&mut self, x: usize, y: usize) {
        let (mut bg_pixel, mut bg_palette) = (0, 0);
        if self.mask.show_background() {
            let fine_x = self.scroll.fine_x();
            let (pixel, palette) = self.background.get_pixel(fine_x);
            bg_pixel = pixel;
            bg_palette = palette;
        }

        let (mut sprite_pixel, mut sprite_palette, mut sprite_priority, mut sprite_zero) =
            (0, 0, false, false);
        if self.mask.show_sprites() {
            if let Some((pixel, palette, priority, is_sprite_zero)) =
                self.sprite_renderer.get_pixel()
            {
                sprite_pixel = pixel;
                sprite_palette = palette;
                sprite_priority = priority;
                sprite_zero = is_sprite_zero;
            }
        }

        if sprite_zero && bg_pixel != 0 && sprite_pixel != 0 && x != 255 {
            self.status.set_sprite_zero_hit();
        }

        let (final_pixel, final_palette) = if bg_pixel == 0 && sprite_pixel == 0 {
            (0, 0)
        } else if bg_pixel == 0 {
            (sprite_pixel, sprite_palette + 4)
        } else if sprite_pixel == 0 {
            (bg_pixel, bg_palette)
        } else if sprite_priority {
            (bg_pixel, bg_palette)
        } else {
            (sprite_pixel, sprite_palette + 4)
        };

        let palette_addr = (final_palette << 2) | final_pixel;
        let color_index = self.vram.read_palette(palette_addr);

        self.frame_buffer[y * FRAME_WIDTH + x] = color_index;
    }

    /// Current frame buffer (palette indices 0-63, row-major, 256x240).
    #[inline]
    #[must_use]
    pub fn frame_buffer(&self) -> &[u8] {
        &self.frame_buffer
    }

    /// Number of complete frames rendered since power-on or reset.
    #[inline]
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.timing.frame()
    }

    /// Current scanline (0-261).
    #[inline]
    #[must_use]
    pub fn scanline(&self) -> u16 {
        self.timing.scanline()
    }

    /// Current dot within the scanline (0-340).
    #[inline]
    #[must_use]
    pub fn dot(&self) -> u16 {
        self.timing.dot()
    }

    /// Current PPUCTRL value.
    #[inline]
    #[must_use]
    pub fn ctrl(&self) -> PpuCtrl {
        self.ctrl
    }

    /// Current PPUMASK value.
    #[inline]
    #[must_use]
    pub fn mask(&self) -> PpuMask {
        self.mask
    }

    /// Current PPUSTATUS value, as raw bits, for save-state capture.
    ///
    /// Unlike reading $2002 through [`Ppu::read_register`], this does not
    /// clear the vblank flag or reset the address latch.
    #[inline]
    #[must_use]
    pub fn status_bits(&self) -> u8 {
        self.status.bits()
    }

    /// Current loopy `v` register (VRAM address).
    #[inline]
    #[must_use]
    pub fn vram_addr(&self) -> u16 {
        self.scroll.vram_addr()
    }

    /// Current loopy `t` register (temporary VRAM address).
    #[inline]
    #[must_use]
    pub fn temp_vram_addr(&self) -> u16 {
        self.scroll.temp_addr()
    }

    /// Current fine-X scroll (0-7).
    #[inline]
    #[must_use]
    pub fn fine_x(&self) -> u8 {
        self.scroll.fine_x()
    }

    /// Set nametable mirroring (called after cartridge load/reset).
    pub fn set_mirroring(&mut self, mirroring: Mirroring) {
        self.vram.set_mirroring(mirroring);
    }

    /// Current write-toggle latch (`w`): false before the first of a pair of
    /// writes to $2005/$2006, true after.
    #[inline]
    #[must_use]
    pub fn write_latch(&self) -> bool {
        self.scroll.write_latch()
    }

    /// Current OAMADDR.
    #[inline]
    #[must_use]
    pub fn oam_addr(&self) -> u8 {
        self.oam.get_addr()
    }

    /// Raw 256-byte primary OAM, for save-state capture.
    #[inline]
    #[must_use]
    pub fn oam_bytes(&self) -> &[u8] {
        self.oam.data()
    }

    /// Raw 2 KiB nametable RAM, for save-state capture.
    #[inline]
    #[must_use]
    pub fn nametable_bytes(&self) -> &[u8] {
        self.vram.nametable_bytes()
    }

    /// Raw 32-byte palette RAM, for save-state capture.
    #[inline]
    #[must_use]
    pub fn palette_bytes(&self) -> &[u8] {
        self.vram.palette_bytes()
    }

    /// PPUDATA read-buffer contents ($2007 buffered-read state).
    #[inline]
    #[must_use]
    pub fn vram_read_buffer(&self) -> u8 {
        self.vram_read_buffer
    }

    /// Restore the full PPU register/memory state from a save state.
    ///
    /// `nametables` must be 2048 bytes, `palette` 32 bytes, `oam` 256 bytes.
    #[allow(clippy::too_many_arguments)]
    pub fn restore_state(
        &mut self,
        ctrl: u8,
        mask: u8,
        status: u8,
        oam_addr: u8,
        v: u16,
        t: u16,
        x: u8,
        w: bool,
        scanline: u16,
        dot: u16,
        frame: u64,
        vram_read_buffer: u8,
        nametables: &[u8],
        palette: &[u8],
        oam: &[u8; 256],
    ) {
        self.ctrl = PpuCtrl::from_bits_truncate(ctrl);
        self.mask = PpuMask::from_bits_truncate(mask);
        self.status = PpuStatus::from_bits_truncate(status);
        self.scroll = Scroll::from_raw(v, t, x, w);
        self.timing.set_state(scanline, dot, frame);
        self.vram_read_buffer = vram_read_buffer;
        self.vram.set_nametable_bytes(nametables);
        self.vram.set_palette_bytes(palette);
        self.oam.load(oam);
        self.oam.set_addr(oam_addr);
    }

    /// Reset to power-up state.
    pub fn reset(&mut self) {
        self.ctrl = PpuCtrl::empty();
        self.mask = PpuMask::empty();
        self.status = PpuStatus::empty();
        self.scroll = Scroll::new();
        self.vram.reset();
        self.oam.reset();
        self.background.reset();
        self.sprite_renderer.reset();
        self.timing.reset();
        self.frame_buffer.fill(0);
        self.vram_read_buffer = 0;
        self.open_bus_latch = 0;
        self.decay_counter = 0;
        self.nmi_pending = false;
    }
}

#[cfg(feature = "std")]
fn zeroed_frame_buffer() -> Vec<u8> {
    vec![0; FRAME_SIZE]
}

#[cfg(not(feature = "std"))]
fn zeroed_frame_buffer() -> Vec<u8> {
    alloc::vec![0; FRAME_SIZE]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ppu_creation() {
        let ppu = Ppu::new(Mirroring::Horizontal);
        assert_eq!(ppu.frame_buffer().len(), FRAME_SIZE);
    }

    #[test]
    fn test_ppuctrl_write() {
        let mut ppu = Ppu::new(Mirroring::Horizontal);
        ppu.write_register(0x2000, 0x80, |_, _| {});
        assert!(ppu.ctrl.nmi_enabled());
    }

    #[test]
    fn test_ppustatus_read_clears_vblank() {
        let mut ppu = Ppu::new(Mirroring::Horizontal);
        ppu.status.set_vblank();
        let status = ppu.read_register(0x2002, |_| 0);
        assert_eq!(status & 0x80, 0x80);
        assert!(!ppu.status.in_vblank());
    }

    #[test]
    fn test_oam_write_read() {
        let mut ppu = Ppu::new(Mirroring::Horizontal);
        ppu.write_register(0x2003, 0x00, |_, _| {});
        ppu.write_register(0x2004, 0x42, |_, _| {});
        ppu.write_register(0x2003, 0x00, |_, _| {});
        assert_eq!(ppu.read_register(0x2004, |_| 0), 0x42);
    }

    #[test]
    fn test_vram_write_read_buffered() {
        let mut ppu = Ppu::new(Mirroring::Horizontal);
        ppu.write_register(0x2006, 0x20, |_, _| {});
        ppu.write_register(0x2006, 0x00, |_, _| {});
        ppu.write_register(0x2007, 0x55, |_, _| {});

        ppu.write_register(0x2006, 0x20, |_, _| {});
        ppu.write_register(0x2006, 0x00, |_, _| {});
        let _ = ppu.read_register(0x2007, |_| 0);
        assert_eq!(ppu.read_register(0x2007, |_| 0), 0x55);
    }

    #[test]
    fn test_palette_immediate_read() {
        let mut ppu = Ppu::new(Mirroring::Horizontal);
        ppu.write_register(0x2006, 0x3F, |_, _| {});
        ppu.write_register(0x2006, 0x00, |_, _| {});
        ppu.write_register(0x2007, 0x0F, |_, _| {});

        ppu.write_register(0x2006, 0x3F, |_, _| {});
        ppu.write_register(0x2006, 0x00, |_, _| {});
        assert_eq!(ppu.read_register(0x2007, |_| 0), 0x0F);
    }

    #[test]
    fn test_vblank_flag_and_nmi() {
        let mut ppu = Ppu::new(Mirroring::Horizontal);
        ppu.write_register(0x2000, 0x80, |_, _| {});

        let mut nmi_triggered = false;
        for _ in 0..100_000 {
            let (_, nmi) = ppu.step();
            if nmi {
                nmi_triggered = true;
                break;
            }
        }
        assert!(nmi_triggered);
        assert!(ppu.status.in_vblank());
    }

    #[test]
    fn test_prerender_clears_status() {
        let mut ppu = Ppu::new(Mirroring::Horizontal);
        ppu.status.set_vblank();
        ppu.status.set_sprite_zero_hit();
        ppu.status.set_sprite_overflow();

        while !(ppu.timing.scanline() == 261 && ppu.timing.dot() == 1) {
            ppu.step();
        }

        assert!(!ppu.status.in_vblank());
        assert!(!ppu.status.sprite_zero_hit());
        assert!(!ppu.status.sprite_overflow());
    }

    #[test]
    fn test_oam_dma() {
        let mut ppu = Ppu::new(Mirroring::Horizontal);
        let mut data = [0u8; 256];
        for (i, byte) in data.iter_mut().enumerate() {
            *byte = i as u8;
        }
        ppu.oam_dma(&data);

        for i in 0..256u16 {
            ppu.oam.set_addr(i as u8);
            let expected = if i % 4 == 2 { (i as u8) & 0xE3 } else { i as u8 };
            assert_eq!(ppu.oam.read(), expected);
        }
    }

    #[test]
    fn test_frame_length_cpu_dots() {
        let mut ppu = Ppu::new(Mirroring::Horizontal);
        ppu.mask = PpuMask::SHOW_BG;
        let start_frame = ppu.frame();
        let mut dots = 0u64;
        while ppu.frame() == start_frame {
            ppu.step();
            dots += 1;
        }
        // Even frames: 341 * 262 = 89342 dots. Odd frames with rendering
        // enabled skip the last dot of the pre-render scanline.
        assert!(dots == 89342 || dots == 89341, "dots = {dots}");
    }
}
