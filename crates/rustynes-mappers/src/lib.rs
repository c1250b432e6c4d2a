//! NES Cartridge Mapper Implementations.
//!
//! This crate provides mapper implementations for NES cartridge emulation.
//! Mappers handle memory banking for PRG-ROM, CHR-ROM/RAM, and provide
//! various hardware features like IRQ generation.
//!
//! # Supported Mappers
//!
//! | Mapper | Name  | Description |
//! |--------|-------|-------------|
//! | 0      | NROM  | No banking, simplest mapper |
//! | 1      | MMC1  | Serial shift-register bank switching |
//! | 2      | UxROM | PRG-ROM banking only |
//! | 3      | CNROM | CHR-ROM banking only |
//! | 4      | MMC3  | Fine-grained banking + scanline IRQ |
//! | 66     | GxROM | Coarse PRG+CHR bank switching |
//!
//! # Dispatch
//!
//! [`CartMapper`] is a closed, tagged enum over the supported mapper
//! implementations rather than a `Box<dyn Mapper>`. This keeps mapper
//! dispatch monomorphic and avoids a heap allocation and vtable indirection
//! per cartridge, at the cost of the mapper set being fixed at compile time.
//!
//! # Example
//!
//! ```no_run
//! use rustynes_mappers::{Rom, create_mapper};
//!
//! let rom_data = std::fs::read("game.nes").expect("Failed to read ROM");
//! let rom = Rom::load(&rom_data).expect("Failed to parse ROM");
//! let mut mapper = create_mapper(&rom).expect("Unsupported mapper");
//!
//! let opcode = mapper.read_prg(0x8000);
//! let tile = mapper.read_chr(0x0000);
//! ```
//!
//! # no_std Support
//!
//! This crate supports `no_std` environments with the `alloc` feature.
//! Disable the default `std` feature for embedded use.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod mapper;
pub mod rom;

mod cnrom;
mod gxrom;
mod mmc1;
mod mmc3;
mod nrom;
mod uxrom;

pub use cnrom::Cnrom;
pub use gxrom::Gxrom;
pub use mapper::{Mapper, Mirroring};
pub use mmc1::Mmc1;
pub use mmc3::Mmc3;
pub use nrom::Nrom;
pub use rom::{Rom, RomError, RomHeader};
pub use uxrom::Uxrom;

/// Tagged-enum dispatch over every supported mapper implementation.
///
/// Each variant owns its concrete mapper struct; [`Mapper`] is implemented
/// for `CartMapper` itself by matching and forwarding to the active variant.
#[derive(Debug)]
pub enum CartMapper {
    /// Mapper 0.
    Nrom(Nrom),
    /// Mapper 1.
    Mmc1(Mmc1),
    /// Mapper 2.
    Uxrom(Uxrom),
    /// Mapper 3.
    Cnrom(Cnrom),
    /// Mapper 4.
    Mmc3(Mmc3),
    /// Mapper 66.
    Gxrom(Gxrom),
}

macro_rules! dispatch {
    ($self:ident, $method:ident $(, $arg:expr)*) => {
        match $self {
            CartMapper::Nrom(m) => m.$method($($arg),*),
            CartMapper::Mmc1(m) => m.$method($($arg),*),
            CartMapper::Uxrom(m) => m.$method($($arg),*),
            CartMapper::Cnrom(m) => m.$method($($arg),*),
            CartMapper::Mmc3(m) => m.$method($($arg),*),
            CartMapper::Gxrom(m) => m.$method($($arg),*),
        }
    };
}

impl Mapper for CartMapper {
    fn read_prg(&self, addr: u16) -> u8 {
        dispatch!(self, read_prg, addr)
    }

    fn write_prg(&mut self, addr: u16, val: u8) {
        dispatch!(self, write_prg, addr, val)
    }

    fn read_chr(&self, addr: u16) -> u8 {
        dispatch!(self, read_chr, addr)
    }

    fn write_chr(&mut self, addr: u16, val: u8) {
        dispatch!(self, write_chr, addr, val)
    }

    fn mirroring(&self) -> Mirroring {
        dispatch!(self, mirroring)
    }

    fn irq_pending(&self) -> bool {
        dispatch!(self, irq_pending)
    }

    fn irq_acknowledge(&mut self) {
        dispatch!(self, irq_acknowledge)
    }

    fn clock(&mut self, cycles: u8) {
        dispatch!(self, clock, cycles)
    }

    fn scanline(&mut self) {
        dispatch!(self, scanline)
    }

    fn ppu_a12_rising(&mut self) {
        dispatch!(self, ppu_a12_rising)
    }

    fn mapper_number(&self) -> u16 {
        dispatch!(self, mapper_number)
    }

    fn mapper_name(&self) -> &'static str {
        dispatch!(self, mapper_name)
    }

    fn has_battery(&self) -> bool {
        dispatch!(self, has_battery)
    }

    fn battery_ram(&self) -> Option<&[u8]> {
        dispatch!(self, battery_ram)
    }

    fn set_battery_ram(&mut self, data: &[u8]) {
        dispatch!(self, set_battery_ram, data)
    }

    fn reset(&mut self) {
        dispatch!(self, reset)
    }
}

/// Create a mapper instance from ROM data.
///
/// Returns the appropriate mapper implementation based on the ROM header's
/// mapper number. Returns an error if the mapper is not supported.
///
/// # Errors
///
/// Returns `RomError::UnsupportedMapper` if the mapper number is not
/// implemented in this crate.
///
/// # Example
///
/// ```no_run
/// use rustynes_mappers::{Rom, create_mapper};
///
/// let rom_data = std::fs::read("game.nes").expect("Failed to read ROM");
/// let rom = Rom::load(&rom_data).expect("Failed to parse ROM");
/// let mapper = create_mapper(&rom).expect("Unsupported mapper");
///
/// println!("Mapper: {} ({})", mapper.mapper_name(), mapper.mapper_number());
/// ```
pub fn create_mapper(rom: &Rom) -> Result<CartMapper, RomError> {
    match rom.header.mapper_number {
        0 => Ok(CartMapper::Nrom(Nrom::new(rom))),
        1 => Ok(CartMapper::Mmc1(Mmc1::new(rom))),
        2 => Ok(CartMapper::Uxrom(Uxrom::new(rom))),
        3 => Ok(CartMapper::Cnrom(Cnrom::new(rom))),
        4 => Ok(CartMapper::Mmc3(Mmc3::new(rom))),
        66 => Ok(CartMapper::Gxrom(Gxrom::new(rom))),
        n => Err(RomError::UnsupportedMapper(n)),
    }
}

/// Get a list of supported mapper numbers.
#[must_use]
pub fn supported_mappers() -> &'static [u16] {
    &[0, 1, 2, 3, 4, 66]
}

/// Check if a mapper number is supported.
#[must_use]
pub fn is_mapper_supported(mapper: u16) -> bool {
    supported_mappers().contains(&mapper)
}

/// Get the name of a mapper by number.
#[must_use]
pub fn mapper_name(mapper: u16) -> Option<&'static str> {
    match mapper {
        0 => Some("NROM"),
        1 => Some("MMC1"),
        2 => Some("UxROM"),
        3 => Some("CNROM"),
        4 => Some("MMC3"),
        66 => Some("GxROM"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_header(mapper_number: u16) -> RomHeader {
        RomHeader {
            prg_rom_size: 32768,
            chr_rom_size: 8192,
            mapper_number,
            submapper: 0,
            mirroring: Mirroring::Vertical,
            has_battery: false,
            has_trainer: false,
            nes2_format: false,
            prg_ram_size: 8192,
            prg_nvram_size: 0,
            chr_ram_size: 0,
            chr_nvram_size: 0,
        }
    }

    fn create_test_rom(mapper_number: u16) -> Rom {
        let prg_rom: Vec<u8> = (0..32768).map(|i| (i & 0xFF) as u8).collect();
        let chr_rom: Vec<u8> = (0..8192).map(|i| (i & 0xFF) as u8).collect();

        Rom {
            header: test_header(mapper_number),
            prg_rom,
            chr_rom,
            trainer: None,
        }
    }

    #[test]
    fn test_create_mapper_nrom() {
        let rom = create_test_rom(0);
        let mapper = create_mapper(&rom).unwrap();
        assert_eq!(mapper.mapper_number(), 0);
        assert_eq!(mapper.mapper_name(), "NROM");
    }

    #[test]
    fn test_create_mapper_mmc1() {
        let rom = create_test_rom(1);
        let mapper = create_mapper(&rom).unwrap();
        assert_eq!(mapper.mapper_number(), 1);
        assert_eq!(mapper.mapper_name(), "MMC1");
    }

    #[test]
    fn test_create_mapper_uxrom() {
        let rom = create_test_rom(2);
        let mapper = create_mapper(&rom).unwrap();
        assert_eq!(mapper.mapper_number(), 2);
        assert_eq!(mapper.mapper_name(), "UxROM");
    }

    #[test]
    fn test_create_mapper_cnrom() {
        let rom = create_test_rom(3);
        let mapper = create_mapper(&rom).unwrap();
        assert_eq!(mapper.mapper_number(), 3);
        assert_eq!(mapper.mapper_name(), "CNROM");
    }

    #[test]
    fn test_create_mapper_mmc3() {
        let rom = create_test_rom(4);
        let mapper = create_mapper(&rom).unwrap();
        assert_eq!(mapper.mapper_number(), 4);
        assert_eq!(mapper.mapper_name(), "MMC3");
    }

    #[test]
    fn test_create_mapper_gxrom() {
        let rom = create_test_rom(66);
        let mapper = create_mapper(&rom).unwrap();
        assert_eq!(mapper.mapper_number(), 66);
        assert_eq!(mapper.mapper_name(), "GxROM");
    }

    #[test]
    fn test_create_mapper_unsupported() {
        let rom = create_test_rom(100);
        let result = create_mapper(&rom);
        assert!(matches!(result, Err(RomError::UnsupportedMapper(100))));
    }

    #[test]
    fn test_supported_mappers() {
        assert_eq!(supported_mappers(), &[0, 1, 2, 3, 4, 66]);
    }

    #[test]
    fn test_is_mapper_supported() {
        assert!(is_mapper_supported(0));
        assert!(is_mapper_supported(4));
        assert!(is_mapper_supported(66));
        assert!(!is_mapper_supported(100));
    }

    #[test]
    fn test_mapper_name() {
        assert_eq!(mapper_name(0), Some("NROM"));
        assert_eq!(mapper_name(1), Some("MMC1"));
        assert_eq!(mapper_name(4), Some("MMC3"));
        assert_eq!(mapper_name(66), Some("GxROM"));
        assert_eq!(mapper_name(100), None);
    }

    #[test]
    fn test_mapper_trait_read_write() {
        let rom = create_test_rom(0);
        let mut mapper = create_mapper(&rom).unwrap();

        // Read PRG-ROM
        let val = mapper.read_prg(0x8000);
        assert_eq!(val, 0); // First byte of PRG-ROM

        // Write has no effect on NROM
        mapper.write_prg(0x8000, 0xFF);
        assert_eq!(mapper.read_prg(0x8000), 0);
    }
}
