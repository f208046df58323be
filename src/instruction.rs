//! # instruction
//!
//! Decodes 16-bit CHIP-8 words into an opcode tag plus operand fields:
//!
//! ```text
//!   nnn (addr)  lowest 12 bits
//!   x           low nibble of the high byte
//!   y           high nibble of the low byte
//!   kk          low byte
//!   n           lowest nibble
//! ```
//!
//! Decoding never fails. Anything that isn't a known instruction comes back as
//! `Opcode::Unknown`, which the interpreter treats as a no-op, like the
//! original interpreter ignored junk.
use std::fmt;

use crate::memory::MemoryMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Sys,     // 0nnn - SYS addr
    Cls,     // 00E0 - CLS
    Ret,     // 00EE - RET
    Jp,      // 1nnn - JP addr
    Call,    // 2nnn - CALL addr
    SeByte,  // 3xkk - SE Vx, byte
    SneByte, // 4xkk - SNE Vx, byte
    SeReg,   // 5xy0 - SE Vx, Vy
    LdByte,  // 6xkk - LD Vx, byte
    AddByte, // 7xkk - ADD Vx, byte
    LdReg,   // 8xy0 - LD Vx, Vy
    Or,      // 8xy1 - OR Vx, Vy
    And,     // 8xy2 - AND Vx, Vy
    Xor,     // 8xy3 - XOR Vx, Vy
    AddReg,  // 8xy4 - ADD Vx, Vy
    Sub,     // 8xy5 - SUB Vx, Vy
    Shr,     // 8xy6 - SHR Vx {, Vy}
    Subn,    // 8xy7 - SUBN Vx, Vy
    Shl,     // 8xyE - SHL Vx {, Vy}
    SneReg,  // 9xy0 - SNE Vx, Vy
    LdI,     // Annn - LD I, addr
    JpV0,    // Bnnn - JP V0, addr
    Rnd,     // Cxkk - RND Vx, byte
    Drw,     // Dxyn - DRW Vx, Vy, nibble
    Skp,     // Ex9E - SKP Vx
    Sknp,    // ExA1 - SKNP Vx
    LdVxDt,  // Fx07 - LD Vx, DT
    LdVxK,   // Fx0A - LD Vx, K
    LdDtVx,  // Fx15 - LD DT, Vx
    LdStVx,  // Fx18 - LD ST, Vx
    AddI,    // Fx1E - ADD I, Vx
    LdF,     // Fx29 - LD F, Vx
    LdB,     // Fx33 - LD B, Vx
    Save,    // Fx55 - LD [I], Vx
    Restore, // Fx65 - LD Vx, [I]
    Unknown,
}

/// One decoded instruction word. All operand fields are always filled in;
/// which ones mean anything depends on `op`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub op: Opcode,
    /// the raw word this was decoded from
    pub word: u16,
    pub addr: u16,
    pub x: usize,
    pub y: usize,
    pub kk: u8,
    pub n: u8,
}

/// decode a 16-bit instruction word
pub fn decode(word: u16) -> Instruction {
    let op = match word {
        0x00e0 => Opcode::Cls,
        0x00ee => Opcode::Ret,
        _ => match word & 0xf000 {
            0x0000 => Opcode::Sys,
            0x1000 => Opcode::Jp,
            0x2000 => Opcode::Call,
            0x3000 => Opcode::SeByte,
            0x4000 => Opcode::SneByte,
            0x5000 => Opcode::SeReg,
            0x6000 => Opcode::LdByte,
            0x7000 => Opcode::AddByte,
            0x8000 => match word & 0xf00f {
                0x8000 => Opcode::LdReg,
                0x8001 => Opcode::Or,
                0x8002 => Opcode::And,
                0x8003 => Opcode::Xor,
                0x8004 => Opcode::AddReg,
                0x8005 => Opcode::Sub,
                0x8006 => Opcode::Shr,
                0x8007 => Opcode::Subn,
                0x800e => Opcode::Shl,
                _ => Opcode::Unknown,
            },
            0x9000 => Opcode::SneReg,
            0xa000 => Opcode::LdI,
            0xb000 => Opcode::JpV0,
            0xc000 => Opcode::Rnd,
            0xd000 => Opcode::Drw,
            0xe000 => match word & 0xf0ff {
                0xe09e => Opcode::Skp,
                0xe0a1 => Opcode::Sknp,
                _ => Opcode::Unknown,
            },
            _ => match word & 0xf0ff {
                0xf007 => Opcode::LdVxDt,
                0xf00a => Opcode::LdVxK,
                0xf015 => Opcode::LdDtVx,
                0xf018 => Opcode::LdStVx,
                0xf01e => Opcode::AddI,
                0xf029 => Opcode::LdF,
                0xf033 => Opcode::LdB,
                0xf055 => Opcode::Save,
                0xf065 => Opcode::Restore,
                _ => Opcode::Unknown,
            },
        },
    };
    Instruction {
        op,
        word,
        addr: word & 0x0fff,
        x: ((word & 0x0f00) >> 8) as usize,
        y: ((word & 0x00f0) >> 4) as usize,
        kk: (word & 0x00ff) as u8,
        n: (word & 0x000f) as u8,
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (x, y) = (self.x, self.y);
        match self.op {
            Opcode::Sys => write!(f, "SYS 0x{:03x}", self.addr),
            Opcode::Cls => write!(f, "CLS"),
            Opcode::Ret => write!(f, "RET"),
            Opcode::Jp => write!(f, "JP 0x{:03x}", self.addr),
            Opcode::Call => write!(f, "CALL 0x{:03x}", self.addr),
            Opcode::SeByte => write!(f, "SE V{:X}, 0x{:02x}", x, self.kk),
            Opcode::SneByte => write!(f, "SNE V{:X}, 0x{:02x}", x, self.kk),
            Opcode::SeReg => write!(f, "SE V{:X}, V{:X}", x, y),
            Opcode::LdByte => write!(f, "LD V{:X}, 0x{:02x}", x, self.kk),
            Opcode::AddByte => write!(f, "ADD V{:X}, 0x{:02x}", x, self.kk),
            Opcode::LdReg => write!(f, "LD V{:X}, V{:X}", x, y),
            Opcode::Or => write!(f, "OR V{:X}, V{:X}", x, y),
            Opcode::And => write!(f, "AND V{:X}, V{:X}", x, y),
            Opcode::Xor => write!(f, "XOR V{:X}, V{:X}", x, y),
            Opcode::AddReg => write!(f, "ADD V{:X}, V{:X}", x, y),
            Opcode::Sub => write!(f, "SUB V{:X}, V{:X}", x, y),
            Opcode::Shr => write!(f, "SHR V{:X} {{, V{:X}}}", x, y),
            Opcode::Subn => write!(f, "SUBN V{:X}, V{:X}", x, y),
            Opcode::Shl => write!(f, "SHL V{:X} {{, V{:X}}}", x, y),
            Opcode::SneReg => write!(f, "SNE V{:X}, V{:X}", x, y),
            Opcode::LdI => write!(f, "LD I, 0x{:03x}", self.addr),
            Opcode::JpV0 => write!(f, "JP V0, 0x{:03x}", self.addr),
            Opcode::Rnd => write!(f, "RND V{:X}, 0x{:02x}", x, self.kk),
            Opcode::Drw => write!(f, "DRW V{:X}, V{:X}, 0x{:x}", x, y, self.n),
            Opcode::Skp => write!(f, "SKP V{:X}", x),
            Opcode::Sknp => write!(f, "SKNP V{:X}", x),
            Opcode::LdVxDt => write!(f, "LD V{:X}, DT", x),
            Opcode::LdVxK => write!(f, "LD V{:X}, K", x),
            Opcode::LdDtVx => write!(f, "LD DT, V{:X}", x),
            Opcode::LdStVx => write!(f, "LD ST, V{:X}", x),
            Opcode::AddI => write!(f, "ADD I, V{:X}", x),
            Opcode::LdF => write!(f, "LD F, V{:X}", x),
            Opcode::LdB => write!(f, "LD B, V{:X}", x),
            Opcode::Save => write!(f, "LD [I], V{:X}", x),
            Opcode::Restore => write!(f, "LD V{:X}, [I]", x),
            Opcode::Unknown => write!(f, "UNKNOWN 0x{:04x}", self.word),
        }
    }
}

/// disassemble `count` instructions starting at `base`, one per line, as
/// `0xADDR: 0xWORD MNEMONIC`; addresses past the end of memory are skipped
pub fn disassemble(memory: &impl MemoryMap, base: u16, count: usize) -> Vec<String> {
    (0..count)
        .map(|i| (base as usize).saturating_add(i.saturating_mul(2)))
        .take_while(|&addr| addr < memory.size())
        .map(|addr| {
            let word = memory.get_word(addr as u16);
            format!("0x{:03x}: 0x{:04x} {}", addr, word, decode(word))
        })
        .collect()
}
