//! # machine
//!
//! All CHIP-8 program-visible state, gathered into one owned aggregate:
//!
//! ```text
//!   V0-VF   16 8-bit registers; VF doubles as carry/borrow/collision flag
//!   I       16-bit address register
//!   DT, ST  delay and sound timers, counted down once per 60Hz tick
//!   PC      program counter, starts at 0x200
//!   SP      stack pointer, starts at 16 and counts *down* on CALL
//!   stack   16 return addresses, filled from slot 15 downwards
//!   pixmap  64x32 monochrome display
//!   keypad  16 keys, written by the input side while the machine runs
//! ```
//!
//! Only the interpreter and scheduler mutate a `Machine`. The keypad is the
//! exception: it sits behind an `Arc` with one atomic flag per key, so an
//! input thread can press keys without taking the machine lock.
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::Config;
use crate::error::LoadError;
use crate::memory::{Chip8MemoryMap, CHIP8_PROGRAM_ADDR};

pub const SCREEN_WIDTH: usize = 64;
pub const SCREEN_HEIGHT: usize = 32;
pub const STACK_DEPTH: usize = 16;
pub const KEY_COUNT: usize = 16;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registers {
    pub v: [u8; 16],
    pub i: u16,
    pub delay_timer: u8,
    pub sound_timer: u8,
    pub pc: u16,
    pub sp: u8,
}

impl Registers {
    fn reset(&mut self) {
        *self = Registers {
            pc: CHIP8_PROGRAM_ADDR,
            sp: STACK_DEPTH as u8,
            ..Registers::default()
        };
    }
}

/// 64x32 display, one bool per pixel
#[derive(Clone, PartialEq, Eq)]
pub struct Pixmap {
    rows: [[bool; SCREEN_WIDTH]; SCREEN_HEIGHT],
}

impl Pixmap {
    pub fn new() -> Self {
        Pixmap {
            rows: [[false; SCREEN_WIDTH]; SCREEN_HEIGHT],
        }
    }

    pub fn get(&self, x: usize, y: usize) -> bool {
        self.rows[y][x]
    }

    /// XOR a pixel on; returns true if it was lit and is now dark (collision)
    pub fn flip(&mut self, x: usize, y: usize) -> bool {
        let p = &mut self.rows[y][x];
        *p = !*p;
        !*p
    }

    pub fn clear(&mut self) {
        self.rows = [[false; SCREEN_WIDTH]; SCREEN_HEIGHT];
    }

    /// coordinates of every lit pixel, row by row
    pub fn lit(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.rows.iter().enumerate().flat_map(|(y, row)| {
            row.iter()
                .enumerate()
                .filter(|(_, on)| **on)
                .map(move |(x, _)| (x, y))
        })
    }
}

impl Default for Pixmap {
    fn default() -> Self {
        Self::new()
    }
}

/// renders as 32 lines of 64 `0`/`1` characters
impl fmt::Display for Pixmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.rows.iter() {
            for on in row.iter() {
                f.write_str(if *on { "1" } else { "0" })?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Pixmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pixmap({} lit)", self.lit().count())
    }
}

/// hex keypad state; every key is independent so each is its own atomic
#[derive(Debug, Default)]
pub struct Keypad {
    keys: [AtomicBool; KEY_COUNT],
}

impl Keypad {
    pub fn new() -> Self {
        Self::default()
    }

    /// the one entry point for the input side; codes above 0xF use the low nibble
    pub fn set_key_state(&self, code: u8, pressed: bool) {
        self.keys[(code & 0x0f) as usize].store(pressed, Ordering::Release);
    }

    pub fn is_pressed(&self, code: u8) -> bool {
        self.keys[(code & 0x0f) as usize].load(Ordering::Acquire)
    }

    /// lowest-numbered key currently held, if any
    pub fn first_pressed(&self) -> Option<u8> {
        (0..KEY_COUNT as u8).find(|&k| self.is_pressed(k))
    }

    pub fn clear(&self) {
        for k in self.keys.iter() {
            k.store(false, Ordering::Release);
        }
    }
}

pub struct Machine {
    pub memory: Chip8MemoryMap,
    pub registers: Registers,
    pub stack: [u16; STACK_DEPTH],
    pub pixmap: Pixmap,
    /// instructions executed so far in the current tick, 0..CYCLES_PER_TICK
    pub cycles: u8,
    pub keypad: Arc<Keypad>,
    pub(crate) rng: StdRng,
}

impl Machine {
    pub fn new(config: &Config) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut m = Machine {
            memory: Chip8MemoryMap::new(),
            registers: Registers::default(),
            stack: [0; STACK_DEPTH],
            pixmap: Pixmap::new(),
            cycles: 0,
            keypad: Arc::new(Keypad::new()),
            rng,
        };
        m.reset();
        m
    }

    /// zero registers, timers, stack, cycle count and display; release all
    /// keys; PC back to 0x200. memory is left alone
    pub fn reset(&mut self) {
        self.registers.reset();
        self.stack = [0; STACK_DEPTH];
        self.pixmap.clear();
        self.cycles = 0;
        self.keypad.clear();
    }

    /// reset, then replace program space with the program read from `reader`
    pub fn load_program(&mut self, reader: &mut impl std::io::Read) -> Result<usize, LoadError> {
        self.reset();
        let len = self.memory.load_program(reader)?;
        log::info!("loaded {} byte program at 0x{:03x}", len, CHIP8_PROGRAM_ADDR);
        Ok(len)
    }

    /// audio side wants a tone whenever the sound timer is live
    pub fn tone_on(&self) -> bool {
        self.registers.sound_timer > 0
    }

    /// register and stack dump, one line per register
    pub fn dump_registers(&self) -> String {
        let r = &self.registers;
        let side = |n: usize| match n {
            0x0 => format!("[DT]=0x{:02x}   ", r.delay_timer),
            0x1 => format!("[ST]=0x{:02x}   ", r.sound_timer),
            0x3 => format!("[I]=0x{:03x}   ", r.i),
            0x5 => format!("[PC]=0x{:03x}  ", r.pc),
            0x6 => format!("[SP]=0x{:02x}   ", r.sp),
            _ => " ".repeat(12),
        };
        (0..16)
            .map(|n| {
                format!(
                    "[V{:X}] 0x{:02x}    {} [S{:X}] 0x{:03x}\n",
                    n,
                    r.v[n],
                    side(n),
                    n,
                    self.stack[n]
                )
            })
            .collect()
    }
}

/// take the machine lock; a panic elsewhere while holding it doesn't make the
/// state any less readable
pub fn lock(machine: &Mutex<Machine>) -> MutexGuard<'_, Machine> {
    machine.lock().unwrap_or_else(PoisonError::into_inner)
}
