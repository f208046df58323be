use std::io;

use crate::error::LoadError;

// NB. addresses are u16 as per the chip-8; lengths are usize to stop endless casting

/// Represents memory map: font, program space etc.
pub trait MemoryMap {
    /// write unknown len of data into memory at a particular address
    fn write_any(&mut self, reader: &mut impl io::Read, addr: u16) -> Result<usize, LoadError> {
        let mut buf = Vec::new();
        let len = reader.read_to_end(&mut buf)?;
        let capacity = self.size().saturating_sub(addr as usize);
        if len > capacity {
            return Err(LoadError::ProgramTooLarge { size: len, capacity });
        }
        self.write(&buf, addr);
        Ok(len)
    }

    /// write a chunk of bytes into "RAM"
    fn write(&mut self, data: &[u8], addr: u16) {
        self.get_rw_slice(addr, data.len()).copy_from_slice(data);
    }

    /// get a two-byte big-endian word (instruction fetch); wraps at the top of memory
    fn get_word(&self, addr: u16) -> u16 {
        ((self.read_byte(addr) as u16) << 8) | (self.read_byte(addr.wrapping_add(1)) as u16)
    }

    /// single byte read; addresses wrap modulo the memory size
    fn read_byte(&self, addr: u16) -> u8 {
        let a = addr as usize % self.size();
        self.get_ro_slice(a as u16, 1)[0]
    }

    /// single byte write; addresses wrap modulo the memory size
    fn write_byte(&mut self, addr: u16, value: u8) {
        let a = addr as usize % self.size();
        self.get_rw_slice(a as u16, 1)[0] = value;
    }

    /// how many bytes are addressable
    fn size(&self) -> usize;

    /// get a r/w slice of the underlying memory (heap)
    fn get_rw_slice(&mut self, addr: u16, len: usize) -> &mut [u8];

    /// get a r/o slice of the underlying memory (heap)
    fn get_ro_slice(&self, addr: u16, len: usize) -> &[u8];
}

/// Defines the CHIP-8 standard memory map, 4K configuration:
///   0x0000-0x01ff  interpreter (font set lives at 0x000)
///   0x0200-0x0fff  program and data
///
/// the font area is written once and never touched by the program loader
#[derive(Clone)]
pub struct Chip8MemoryMap {
    bytes: Box<[u8]>,
    pub program_addr: u16,
}

impl MemoryMap for Chip8MemoryMap {
    fn size(&self) -> usize {
        self.bytes.len()
    }
    fn get_rw_slice(&mut self, addr: u16, len: usize) -> &mut [u8] {
        let a = addr as usize;
        &mut self.bytes[a..(a + len)]
    }
    fn get_ro_slice(&self, addr: u16, len: usize) -> &[u8] {
        let a = addr as usize;
        &self.bytes[a..(a + len)]
    }
}

/// how much RAM we have
pub const CHIP8_RAM_SIZE_BYTES: u16 = 4096;

/// where the program is loaded
pub const CHIP8_PROGRAM_ADDR: u16 = 0x0200;

/// where the hex digit sprites live; `LD F, Vx` points I at `Vx * 5`
pub const CHIP8_FONT_ADDR: u16 = 0x000;

/// bytes per font glyph
pub const CHIP8_FONT_GLYPH_BYTES: u16 = 5;

impl Chip8MemoryMap {
    /// initialises CHIP-8 with the font baked in below the program area
    pub fn new() -> Self {
        let mut mm = Chip8MemoryMap {
            bytes: vec![0u8; CHIP8_RAM_SIZE_BYTES as usize].into_boxed_slice(),
            program_addr: CHIP8_PROGRAM_ADDR,
        };
        mm.write(&CHIP8_CONTEMPORARY_FONT, CHIP8_FONT_ADDR);
        mm
    }

    /// zero program space, 0x200 to the top of RAM
    pub fn clear_program(&mut self) {
        self.bytes[self.program_addr as usize..].fill(0);
    }

    /// load a CHIP-8 program at 0x200, clearing program space first; returns
    /// the program length. an oversized program leaves program space cleared
    pub fn load_program(&mut self, reader: &mut impl io::Read) -> Result<usize, LoadError> {
        self.clear_program();
        self.write_any(reader, self.program_addr)
    }
}

impl Default for Chip8MemoryMap {
    fn default() -> Self {
        Self::new()
    }
}

const CHIP8_CONTEMPORARY_FONT: [u8; 80] = [
    0xF0, 0x90, 0x90, 0x90, 0xF0, // 0
    0x20, 0x60, 0x20, 0x20, 0x70, // 1
    0xF0, 0x10, 0xF0, 0x80, 0xF0, // 2
    0xF0, 0x10, 0xF0, 0x10, 0xF0, // 3
    0x90, 0x90, 0xF0, 0x10, 0x10, // 4
    0xF0, 0x80, 0xF0, 0x10, 0xF0, // 5
    0xF0, 0x80, 0xF0, 0x90, 0xF0, // 6
    0xF0, 0x10, 0x20, 0x40, 0x40, // 7
    0xF0, 0x90, 0xF0, 0x90, 0xF0, // 8
    0xF0, 0x90, 0xF0, 0x10, 0xF0, // 9
    0xF0, 0x90, 0xF0, 0x90, 0x90, // A
    0xE0, 0x90, 0xE0, 0x90, 0xE0, // B
    0xF0, 0x80, 0x80, 0x80, 0xF0, // C
    0xE0, 0x90, 0x90, 0x90, 0xE0, // D
    0xF0, 0x80, 0xF0, 0x80, 0xF0, // E
    0xF0, 0x80, 0xF0, 0x80, 0x80, // F
];
