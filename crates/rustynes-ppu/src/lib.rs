//! NES 2C02 PPU (Picture Processing Unit) emulation.
//!
//! This crate provides a cycle-accurate implementation of the NES PPU,
//! responsible for all graphics rendering.
//!
//! # Overview
//!
//! The PPU operates at 3x the CPU clock rate and generates a 256x240 pixel
//! image. It consists of several subsystems:
//!
//! - **Registers**: `PpuCtrl`, `PpuMask`, `PpuStatus`, OAM address/data, scroll/address latches
//! - **Background rendering**: nametables, pattern tables, attribute tables
//! - **Sprite rendering**: OAM, sprite evaluation, sprite 0 hit detection
//! - **Palette**: 32-byte palette RAM with mirroring
//!
//! # Timing
//!
//! NTSC timing (the primary target):
//! - Master clock: 21.477272 MHz
//! - PPU clock: 5.369318 MHz (master / 4)
//! - 341 dots per scanline
//! - 262 scanlines per frame
//! - 89,341-89,342 dots per frame (odd frame skip)
//!
//! # Usage
//!
//! ```no_run
//! use rustynes_ppu::{Ppu, Mirroring};
//!
//! let mut ppu = Ppu::new(Mirroring::Horizontal);
//!
//! // Step the PPU once per PPU dot (call 3 times per CPU cycle for NTSC).
//! // `read_chr` lets the PPU pull pattern data from the cartridge mapper.
//! let (frame_complete, nmi) = ppu.step_with_chr(|_addr| 0);
//!
//! ppu.write_register(0x2000, 0x80, |_addr, _value| {}); // enable NMI
//! let status = ppu.read_register(0x2002, |_addr| 0);
//! ```
//!
//! # Features
//!
//! - `serde`: Enable serialization support for save states

#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[cfg(not(any(test, feature = "std")))]
extern crate alloc;

mod background;
mod oam;
mod ppu;
mod registers;
mod scroll;
mod sprites;
mod timing;
mod vram;

pub use oam::{Sprite, SpriteAttributes};
pub use ppu::{FRAME_HEIGHT, FRAME_SIZE, FRAME_WIDTH, Ppu};
pub use registers::{PpuCtrl, PpuMask, PpuStatus};
pub use scroll::Scroll;
pub use vram::Mirroring;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ppu_integration() {
        let mut ppu = Ppu::new(Mirroring::Horizontal);

        ppu.write_register(0x2000, 0x80, |_, _| {}); // Enable NMI
        ppu.write_register(0x2001, 0x1E, |_, _| {}); // Enable rendering

        assert!(ppu.ctrl().nmi_enabled());
        assert!(ppu.mask().rendering_enabled());
    }

    #[test]
    fn test_frame_completion() {
        let mut ppu = Ppu::new(Mirroring::Horizontal);

        for _ in 0..(341u32 * 262) {
            ppu.step_with_chr(|_| 0);
        }

        assert!(ppu.frame() >= 1);
    }

    #[test]
    fn test_vblank_nmi() {
        let mut ppu = Ppu::new(Mirroring::Horizontal);
        ppu.write_register(0x2000, 0x80, |_, _| {});

        let mut nmi_triggered = false;
        for _ in 0..100_000 {
            let (_, nmi) = ppu.step_with_chr(|_| 0);
            if nmi {
                nmi_triggered = true;
                break;
            }
        }

        assert!(nmi_triggered, "NMI should have been triggered");
    }
}
