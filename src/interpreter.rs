//! # interpreter
//!
//! Fetch, decode and execute one CHIP-8 instruction against a `Machine`.
//!
//! Flag conventions (VF is always written *after* the destination register,
//! so an instruction targeting VF ends up holding the flag):
//!  - 7xkk / 8xy4  carry: VF = 1 iff the unsigned sum is over 255
//!  - 8xy5 / 8xy7  no borrow: VF = 1 iff minuend >= subtrahend
//!  - 8xy6 / 8xyE  VF = bit shifted out (LSB / MSB)
//!  - Dxyn         VF = 1 iff any lit pixel was turned off
//!
//! Control flow: PC moves on by 2 unless the instruction sets it itself (JP,
//! CALL, RET, JP V0) or takes a skip (PC moves on by 4).
//!
//! Timers are never touched here; that is the scheduler's job, once per tick.
//! `LD Vx, K` never blocks: with no key down it reports `Step::WaitingForKey`
//! and leaves PC where it is, so the caller decides how to wait.
use rand::Rng;

use crate::error::MachineError;
use crate::instruction::{decode, Instruction, Opcode};
use crate::machine::{Machine, SCREEN_HEIGHT, SCREEN_WIDTH};
use crate::memory::{MemoryMap, CHIP8_FONT_ADDR, CHIP8_FONT_GLYPH_BYTES};

/// what happened during one call to `step`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// the instruction ran
    Executed(Instruction),
    /// `LD Vx, K` with no key held; nothing changed
    WaitingForKey,
}

/// where PC goes after an instruction
enum Flow {
    Next,
    Skip,
    Jump(u16),
}

/// execute the instruction at PC
pub fn step(m: &mut Machine) -> Result<Step, MachineError> {
    let instruction = decode(m.memory.get_word(m.registers.pc));
    execute(m, instruction)
}

/// execute an already-decoded instruction as if it had been fetched from PC
pub fn execute(m: &mut Machine, ins: Instruction) -> Result<Step, MachineError> {
    let (x, y, kk) = (ins.x, ins.y, ins.kk);
    let pc = m.registers.pc;
    let r = &mut m.registers;

    let flow = match ins.op {
        Opcode::Sys => Flow::Next,
        Opcode::Unknown => {
            log::debug!("ignoring unknown instruction 0x{:04x} at 0x{:03x}", ins.word, pc);
            Flow::Next
        }
        Opcode::Cls => {
            m.pixmap.clear();
            Flow::Next
        }
        Opcode::Ret => {
            let sp = r.sp as usize;
            if sp >= m.stack.len() {
                return Err(MachineError::StackUnderflow { pc });
            }
            let addr = m.stack[sp];
            m.stack[sp] = 0; // not required, but tidier in a stack dump
            r.sp += 1;
            Flow::Jump(addr)
        }
        Opcode::Jp => Flow::Jump(ins.addr),
        Opcode::Call => {
            if r.sp == 0 {
                return Err(MachineError::StackOverflow { pc });
            }
            r.sp -= 1;
            m.stack[r.sp as usize] = pc.wrapping_add(2);
            Flow::Jump(ins.addr)
        }
        Opcode::SeByte => skip_if(r.v[x] == kk),
        Opcode::SneByte => skip_if(r.v[x] != kk),
        Opcode::SeReg => skip_if(r.v[x] == r.v[y]),
        Opcode::SneReg => skip_if(r.v[x] != r.v[y]),
        Opcode::LdByte => {
            r.v[x] = kk;
            Flow::Next
        }
        Opcode::AddByte => {
            let (sum, carry) = r.v[x].overflowing_add(kk);
            r.v[x] = sum;
            r.v[0xf] = carry as u8;
            Flow::Next
        }
        Opcode::LdReg => {
            r.v[x] = r.v[y];
            Flow::Next
        }
        Opcode::Or => {
            r.v[x] |= r.v[y];
            Flow::Next
        }
        Opcode::And => {
            r.v[x] &= r.v[y];
            Flow::Next
        }
        Opcode::Xor => {
            r.v[x] ^= r.v[y];
            Flow::Next
        }
        Opcode::AddReg => {
            let (sum, carry) = r.v[x].overflowing_add(r.v[y]);
            r.v[x] = sum;
            r.v[0xf] = carry as u8;
            Flow::Next
        }
        Opcode::Sub => {
            let no_borrow = r.v[x] >= r.v[y];
            r.v[x] = r.v[x].wrapping_sub(r.v[y]);
            r.v[0xf] = no_borrow as u8;
            Flow::Next
        }
        Opcode::Subn => {
            let no_borrow = r.v[y] >= r.v[x];
            r.v[x] = r.v[y].wrapping_sub(r.v[x]);
            r.v[0xf] = no_borrow as u8;
            Flow::Next
        }
        Opcode::Shr => {
            let out = r.v[x] & 0x01;
            r.v[x] >>= 1;
            r.v[0xf] = out;
            Flow::Next
        }
        Opcode::Shl => {
            let out = r.v[x] >> 7;
            r.v[x] <<= 1;
            r.v[0xf] = out;
            Flow::Next
        }
        Opcode::LdI => {
            r.i = ins.addr;
            Flow::Next
        }
        Opcode::JpV0 => Flow::Jump((r.v[0] as u16 + ins.addr) & 0x0fff),
        Opcode::Rnd => {
            r.v[x] = m.rng.gen::<u8>() & kk;
            Flow::Next
        }
        Opcode::Drw => {
            let (vx, vy) = (r.v[x] as usize, r.v[y] as usize);
            r.v[0xf] = 0;
            for row in 0..ins.n as usize {
                let py = vy + row;
                if py >= SCREEN_HEIGHT {
                    break;
                }
                let sprite = m.memory.read_byte(r.i.wrapping_add(row as u16));
                for col in 0..8 {
                    let px = vx + col;
                    if px >= SCREEN_WIDTH {
                        break;
                    }
                    if (sprite >> (7 - col)) & 1 == 1 && m.pixmap.flip(px, py) {
                        r.v[0xf] = 1;
                    }
                }
            }
            Flow::Next
        }
        Opcode::Skp => skip_if(m.keypad.is_pressed(r.v[x])),
        Opcode::Sknp => skip_if(!m.keypad.is_pressed(r.v[x])),
        Opcode::LdVxDt => {
            r.v[x] = r.delay_timer;
            Flow::Next
        }
        Opcode::LdVxK => match m.keypad.first_pressed() {
            Some(key) => {
                r.v[x] = key;
                Flow::Next
            }
            None => return Ok(Step::WaitingForKey),
        },
        Opcode::LdDtVx => {
            r.delay_timer = r.v[x];
            Flow::Next
        }
        Opcode::LdStVx => {
            r.sound_timer = r.v[x];
            Flow::Next
        }
        Opcode::AddI => {
            r.i = r.i.wrapping_add(r.v[x] as u16);
            Flow::Next
        }
        Opcode::LdF => {
            r.i = CHIP8_FONT_ADDR + (r.v[x] & 0x0f) as u16 * CHIP8_FONT_GLYPH_BYTES;
            Flow::Next
        }
        Opcode::LdB => {
            let n = r.v[x];
            m.memory.write_byte(r.i, n / 100);
            m.memory.write_byte(r.i.wrapping_add(1), n / 10 % 10);
            m.memory.write_byte(r.i.wrapping_add(2), n % 10);
            Flow::Next
        }
        Opcode::Save => {
            for j in 0..=x {
                m.memory.write_byte(r.i.wrapping_add(j as u16), r.v[j]);
            }
            Flow::Next
        }
        Opcode::Restore => {
            for j in 0..=x {
                r.v[j] = m.memory.read_byte(r.i.wrapping_add(j as u16));
            }
            Flow::Next
        }
    };

    r.pc = match flow {
        Flow::Next => pc.wrapping_add(2),
        Flow::Skip => pc.wrapping_add(4),
        Flow::Jump(addr) => addr,
    };
    Ok(Step::Executed(ins))
}

fn skip_if(cond: bool) -> Flow {
    if cond {
        Flow::Skip
    } else {
        Flow::Next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::LoadError;
    use proptest::prelude::*;

    fn machine_with(prog: &[u8]) -> Result<Machine, LoadError> {
        let mut m = Machine::new(&Config {
            seed: Some(8),
            ..Config::default()
        });
        let mut p = prog;
        m.load_program(&mut p)?;
        Ok(m)
    }

    /// run a single instruction word at the current PC
    fn run_word(m: &mut Machine, word: u16) -> Result<Step, MachineError> {
        let pc = m.registers.pc;
        m.memory.write(&word.to_be_bytes(), pc);
        step(m)
    }

    #[test]
    fn test_load_then_add() -> Result<(), Box<dyn std::error::Error>> {
        let mut m = machine_with(&[0x60, 0x05, 0x70, 0x03])?;
        step(&mut m)?;
        step(&mut m)?;
        assert_eq!(m.registers.v[0], 8);
        assert_eq!(m.registers.pc, 0x204);
        Ok(())
    }

    #[test]
    fn test_call_and_return() -> Result<(), Box<dyn std::error::Error>> {
        let mut m = machine_with(&[0x23, 0x00])?;
        m.memory.write(&[0x00, 0xee], 0x300);
        let sp = m.registers.sp;
        step(&mut m)?;
        assert_eq!(m.registers.pc, 0x300);
        assert_eq!(m.registers.sp, sp - 1);
        assert_eq!(m.stack[15], 0x202);
        step(&mut m)?;
        assert_eq!(m.registers.pc, 0x202);
        assert_eq!(m.registers.sp, sp);
        Ok(())
    }

    #[test]
    fn test_sixteen_calls_fit_seventeenth_overflows() -> Result<(), Box<dyn std::error::Error>> {
        // 0x200: CALL 0x200, forever
        let mut m = machine_with(&[0x22, 0x00])?;
        for _ in 0..16 {
            step(&mut m)?;
        }
        assert_eq!(m.registers.sp, 0);
        let before = m.stack;
        assert_eq!(step(&mut m), Err(MachineError::StackOverflow { pc: 0x200 }));
        assert_eq!(m.registers.sp, 0);
        assert_eq!(m.registers.pc, 0x200);
        assert_eq!(m.stack, before);
        Ok(())
    }

    #[test]
    fn test_return_with_empty_stack_underflows() -> Result<(), Box<dyn std::error::Error>> {
        let mut m = machine_with(&[0x00, 0xee])?;
        assert_eq!(step(&mut m), Err(MachineError::StackUnderflow { pc: 0x200 }));
        assert_eq!(m.registers.sp, 16);
        assert_eq!(m.registers.pc, 0x200);
        Ok(())
    }

    #[test]
    fn test_jumps() -> Result<(), Box<dyn std::error::Error>> {
        let mut m = machine_with(&[])?;
        run_word(&mut m, 0x1abc)?;
        assert_eq!(m.registers.pc, 0xabc);
        m.registers.v[0] = 0x10;
        run_word(&mut m, 0xb300)?;
        assert_eq!(m.registers.pc, 0x310);
        // JP V0 past the top of memory wraps to 12 bits
        m.registers.v[0] = 0xff;
        run_word(&mut m, 0xbfff)?;
        assert_eq!(m.registers.pc, 0x0fe);
        Ok(())
    }

    #[test]
    fn test_skips() -> Result<(), Box<dyn std::error::Error>> {
        let mut m = machine_with(&[])?;
        m.registers.v[1] = 0x42;
        m.registers.v[2] = 0x42;
        run_word(&mut m, 0x3142)?; // SE V1, 0x42 -> taken
        assert_eq!(m.registers.pc, 0x204);
        run_word(&mut m, 0x4142)?; // SNE V1, 0x42 -> not taken
        assert_eq!(m.registers.pc, 0x206);
        run_word(&mut m, 0x5120)?; // SE V1, V2 -> taken
        assert_eq!(m.registers.pc, 0x20a);
        run_word(&mut m, 0x9120)?; // SNE V1, V2 -> not taken
        assert_eq!(m.registers.pc, 0x20c);
        Ok(())
    }

    #[test]
    fn test_sys_and_unknown_are_no_ops() -> Result<(), Box<dyn std::error::Error>> {
        let mut m = machine_with(&[0x01, 0x23, 0xff, 0xff])?;
        let regs = m.registers.clone();
        match step(&mut m)? {
            Step::Executed(i) => assert_eq!(i.op, Opcode::Sys),
            other => panic!("unexpected {:?}", other),
        }
        match step(&mut m)? {
            Step::Executed(i) => assert_eq!(i.op, Opcode::Unknown),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(m.registers.v, regs.v);
        assert_eq!(m.registers.pc, 0x204);
        Ok(())
    }

    #[test]
    fn test_add_byte_carry_boundary() -> Result<(), Box<dyn std::error::Error>> {
        let mut m = machine_with(&[])?;
        m.registers.v[0] = 0xff;
        run_word(&mut m, 0x7001)?; // 255 + 1 = 256 overflows
        assert_eq!(m.registers.v[0], 0);
        assert_eq!(m.registers.v[0xf], 1);
        m.registers.v[0] = 0xfe;
        run_word(&mut m, 0x7001)?;
        assert_eq!(m.registers.v[0], 0xff);
        assert_eq!(m.registers.v[0xf], 0);
        Ok(())
    }

    #[test]
    fn test_logic_ops() -> Result<(), Box<dyn std::error::Error>> {
        let mut m = machine_with(&[])?;
        m.registers.v[1] = 0b1100;
        m.registers.v[2] = 0b1010;
        run_word(&mut m, 0x8121)?;
        assert_eq!(m.registers.v[1], 0b1110);
        m.registers.v[1] = 0b1100;
        run_word(&mut m, 0x8122)?;
        assert_eq!(m.registers.v[1], 0b1000);
        m.registers.v[1] = 0b1100;
        run_word(&mut m, 0x8123)?;
        assert_eq!(m.registers.v[1], 0b0110);
        run_word(&mut m, 0x8120)?;
        assert_eq!(m.registers.v[1], 0b1010);
        Ok(())
    }

    #[test]
    fn test_shifts() -> Result<(), Box<dyn std::error::Error>> {
        let mut m = machine_with(&[])?;
        m.registers.v[3] = 0b0000_0011;
        run_word(&mut m, 0x8306)?;
        assert_eq!(m.registers.v[3], 0b0000_0001);
        assert_eq!(m.registers.v[0xf], 1);
        m.registers.v[3] = 0b1000_0001;
        run_word(&mut m, 0x830e)?;
        assert_eq!(m.registers.v[3], 0b0000_0010);
        assert_eq!(m.registers.v[0xf], 1);
        m.registers.v[3] = 0b0100_0000;
        run_word(&mut m, 0x830e)?;
        assert_eq!(m.registers.v[3], 0b1000_0000);
        assert_eq!(m.registers.v[0xf], 0);
        Ok(())
    }

    #[test]
    fn test_flag_wins_when_vf_is_destination() -> Result<(), Box<dyn std::error::Error>> {
        let mut m = machine_with(&[])?;
        m.registers.v[0xf] = 0xff;
        m.registers.v[0x1] = 0x01;
        run_word(&mut m, 0x8f14)?;
        assert_eq!(m.registers.v[0xf], 1);
        Ok(())
    }

    #[test]
    fn test_draw_twice_restores_and_collides() -> Result<(), Box<dyn std::error::Error>> {
        let mut m = machine_with(&[])?;
        m.registers.v[0] = 10;
        m.registers.v[1] = 5;
        m.registers.v[2] = 0x0;
        run_word(&mut m, 0xf229)?; // I = glyph "0"
        let blank = m.pixmap.clone();
        run_word(&mut m, 0xd015)?;
        assert_eq!(m.registers.v[0xf], 0);
        assert!(m.pixmap.get(10, 5)); // 0xF0 top row
        assert!(!m.pixmap.get(14, 5));
        assert_eq!(m.pixmap.lit().count(), 14);
        run_word(&mut m, 0xd015)?;
        assert_eq!(m.registers.v[0xf], 1);
        assert_eq!(m.pixmap, blank);
        Ok(())
    }

    #[test]
    fn test_draw_clears_stale_flag() -> Result<(), Box<dyn std::error::Error>> {
        let mut m = machine_with(&[])?;
        m.registers.v[0xf] = 1;
        run_word(&mut m, 0xa000)?;
        run_word(&mut m, 0xd001)?;
        assert_eq!(m.registers.v[0xf], 0);
        Ok(())
    }

    #[test]
    fn test_draw_clips_instead_of_wrapping() -> Result<(), Box<dyn std::error::Error>> {
        let mut m = machine_with(&[])?;
        m.memory.write(&[0xff, 0xff, 0xff], 0x300);
        m.registers.i = 0x300;
        m.registers.v[0] = 60;
        m.registers.v[1] = 30;
        run_word(&mut m, 0xd013)?;
        // 4 columns x 2 rows survive
        assert_eq!(m.pixmap.lit().count(), 8);
        assert!(!m.pixmap.get(0, 30));
        assert!(!m.pixmap.get(60, 0));
        assert_eq!(m.registers.v[0xf], 0);
        Ok(())
    }

    #[test]
    fn test_clear_display() -> Result<(), Box<dyn std::error::Error>> {
        let mut m = machine_with(&[])?;
        m.pixmap.flip(1, 1);
        run_word(&mut m, 0x00e0)?;
        assert_eq!(m.pixmap.lit().count(), 0);
        Ok(())
    }

    #[test]
    fn test_key_skips() -> Result<(), Box<dyn std::error::Error>> {
        let mut m = machine_with(&[])?;
        m.registers.v[4] = 0xb;
        run_word(&mut m, 0xe49e)?;
        assert_eq!(m.registers.pc, 0x202);
        run_word(&mut m, 0xe4a1)?;
        assert_eq!(m.registers.pc, 0x206);
        m.keypad.set_key_state(0xb, true);
        run_word(&mut m, 0xe49e)?;
        assert_eq!(m.registers.pc, 0x20a);
        assert!(m.keypad.is_pressed(0xb));
        Ok(())
    }

    #[test]
    fn test_wait_for_key() -> Result<(), Box<dyn std::error::Error>> {
        let mut m = machine_with(&[0xf5, 0x0a])?;
        assert_eq!(step(&mut m)?, Step::WaitingForKey);
        assert_eq!(step(&mut m)?, Step::WaitingForKey);
        assert_eq!(m.registers.pc, 0x200);
        m.keypad.set_key_state(0xe, true);
        m.keypad.set_key_state(0x7, true);
        assert!(matches!(step(&mut m)?, Step::Executed(_)));
        assert_eq!(m.registers.v[5], 0x7);
        assert_eq!(m.registers.pc, 0x202);
        Ok(())
    }

    #[test]
    fn test_timers_load_and_read() -> Result<(), Box<dyn std::error::Error>> {
        let mut m = machine_with(&[])?;
        m.registers.v[2] = 30;
        run_word(&mut m, 0xf215)?;
        run_word(&mut m, 0xf218)?;
        assert_eq!(m.registers.delay_timer, 30);
        assert_eq!(m.registers.sound_timer, 30);
        run_word(&mut m, 0xf307)?;
        assert_eq!(m.registers.v[3], 30);
        Ok(())
    }

    #[test]
    fn test_index_ops() -> Result<(), Box<dyn std::error::Error>> {
        let mut m = machine_with(&[])?;
        run_word(&mut m, 0xa123)?;
        assert_eq!(m.registers.i, 0x123);
        m.registers.v[6] = 0x10;
        run_word(&mut m, 0xf61e)?;
        assert_eq!(m.registers.i, 0x133);
        m.registers.v[6] = 0x1a; // only the low nibble picks a glyph
        run_word(&mut m, 0xf629)?;
        assert_eq!(m.registers.i, 0xa * 5);
        Ok(())
    }

    #[test]
    fn test_bcd() -> Result<(), Box<dyn std::error::Error>> {
        let mut m = machine_with(&[])?;
        m.registers.i = 0x400;
        m.registers.v[1] = 254;
        run_word(&mut m, 0xf133)?;
        assert_eq!(m.memory.get_ro_slice(0x400, 3), &[2, 5, 4]);
        m.registers.v[1] = 7;
        run_word(&mut m, 0xf133)?;
        assert_eq!(m.memory.get_ro_slice(0x400, 3), &[0, 0, 7]);
        Ok(())
    }

    #[test]
    fn test_save_restore_x0_touches_one_byte() -> Result<(), Box<dyn std::error::Error>> {
        let mut m = machine_with(&[])?;
        m.registers.i = 0x400;
        m.registers.v = [0xaa; 16];
        run_word(&mut m, 0xf055)?;
        assert_eq!(m.memory.get_ro_slice(0x400, 2), &[0xaa, 0x00]);

        m.memory.write(&[1, 2], 0x400);
        m.registers.v = [0; 16];
        run_word(&mut m, 0xf065)?;
        assert_eq!(m.registers.v[0], 1);
        assert_eq!(m.registers.v[1], 0);
        Ok(())
    }

    #[test]
    fn test_save_restore_x15_touches_all_sixteen() -> Result<(), Box<dyn std::error::Error>> {
        let mut m = machine_with(&[])?;
        m.registers.i = 0x400;
        for n in 0..16 {
            m.registers.v[n] = n as u8 + 1;
        }
        run_word(&mut m, 0xff55)?;
        let expected: Vec<u8> = (1..=16).collect();
        assert_eq!(m.memory.get_ro_slice(0x400, 16), expected.as_slice());
        assert_eq!(m.memory.read_byte(0x410), 0);
        assert_eq!(m.registers.i, 0x400);

        m.registers.v = [0; 16];
        run_word(&mut m, 0xff65)?;
        assert_eq!(m.registers.v.to_vec(), expected);
        Ok(())
    }

    #[test]
    fn test_random_is_masked() -> Result<(), Box<dyn std::error::Error>> {
        let mut m = machine_with(&[])?;
        for _ in 0..64 {
            run_word(&mut m, 0xc10f)?;
            assert_eq!(m.registers.v[1] & 0xf0, 0);
        }
        run_word(&mut m, 0xc100)?;
        assert_eq!(m.registers.v[1], 0);
        Ok(())
    }

    #[test]
    fn test_executor_leaves_timers_alone() -> Result<(), Box<dyn std::error::Error>> {
        let mut m = machine_with(&[])?;
        m.registers.delay_timer = 5;
        for _ in 0..20 {
            run_word(&mut m, 0x6000)?;
        }
        assert_eq!(m.registers.delay_timer, 5);
        Ok(())
    }

    proptest! {
        #[test]
        fn prop_add_registers(a: u8, b: u8) {
            let mut m = machine_with(&[]).unwrap();
            m.registers.v[0] = a;
            m.registers.v[1] = b;
            run_word(&mut m, 0x8014).unwrap();
            prop_assert_eq!(m.registers.v[0], ((a as u16 + b as u16) % 256) as u8);
            prop_assert_eq!(m.registers.v[0xf] == 1, a as u16 + b as u16 > 255);
        }

        #[test]
        fn prop_sub_registers(a: u8, b: u8) {
            let mut m = machine_with(&[]).unwrap();
            m.registers.v[0] = a;
            m.registers.v[1] = b;
            run_word(&mut m, 0x8015).unwrap();
            prop_assert_eq!(m.registers.v[0], a.wrapping_sub(b));
            prop_assert_eq!(m.registers.v[0xf] == 1, a >= b);
        }

        #[test]
        fn prop_subn_registers(a: u8, b: u8) {
            let mut m = machine_with(&[]).unwrap();
            m.registers.v[0] = a;
            m.registers.v[1] = b;
            run_word(&mut m, 0x8017).unwrap();
            prop_assert_eq!(m.registers.v[0], b.wrapping_sub(a));
            prop_assert_eq!(m.registers.v[0xf] == 1, b >= a);
        }

        #[test]
        fn prop_add_byte(a: u8, kk: u8) {
            let mut m = machine_with(&[]).unwrap();
            m.registers.v[2] = a;
            run_word(&mut m, 0x7200 | kk as u16).unwrap();
            prop_assert_eq!(m.registers.v[2], a.wrapping_add(kk));
            prop_assert_eq!(m.registers.v[0xf] == 1, a as u16 + kk as u16 > 255);
        }

        #[test]
        fn prop_shifts(a: u8) {
            let mut m = machine_with(&[]).unwrap();
            m.registers.v[4] = a;
            run_word(&mut m, 0x8406).unwrap();
            prop_assert_eq!(m.registers.v[4], a >> 1);
            prop_assert_eq!(m.registers.v[0xf], a & 1);
            m.registers.v[4] = a;
            run_word(&mut m, 0x840e).unwrap();
            prop_assert_eq!(m.registers.v[4], a << 1);
            prop_assert_eq!(m.registers.v[0xf], a >> 7);
        }
    }
}
