//! # debugger
//!
//! Line-based command interpreter driving the engine. Several commands can go
//! on one line, separated by `;`. Runs happen on a background thread so the
//! prompt stays usable; how a run ended is reported at the next command.
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::control::StopReason;
use crate::error::{ControlError, DebuggerError, LoadError};
use crate::instruction::{decode, disassemble};
use crate::interpreter::Step;
use crate::machine::lock;
use crate::memory::MemoryMap;
use crate::scheduler::Scheduler;

pub const PROMPT: &str = "chip> ";

/// how long `kill` waits for the run loop to acknowledge
const STOP_TIMEOUT: Duration = Duration::from_secs(2);

const DEFAULT_DISASSEMBLY_COUNT: usize = 10;

const HELP: &str = "Available commands:
e[xit] or q[uit]                quit the interpreter
h[elp]                          show this message

l[oad] [file]                   reset the machine and (re)load a program from file
run                             reset registers and run the machine
s[tep] [count]                  step machine execution
k[ill]                          stop machine execution
c[ontinue]                      resume machine execution

d[isassemble]                   disassemble the next 10 instructions
d[isassemble] <count>           disassemble the next count instructions
d[isassemble] <address> <count> disassemble count instructions, starting at address

r[egs]                          show registers
p[ixmap]                        show the display pixmap
key <0-f> down|up               press or release a keypad key

b[reak] <address>               set a new breakpoint at address
b[reak]p[oints]                 show breakpoints
del[ete] <breakpoint#>          remove breakpoint number #
cl[ear]                         delete all breakpoints";

/// whether the prompt loop should keep going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Debugger {
    sched: Arc<Scheduler>,
    program: Option<PathBuf>,
    run: Option<JoinHandle<StopReason>>,
}

/// `0x`-prefixed hex or plain decimal
fn parse_number(s: &str) -> Result<usize, DebuggerError> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|_| DebuggerError::BadNumber(s.to_string()))
}

fn parse_address(s: &str) -> Result<u16, DebuggerError> {
    match parse_number(s)? {
        n if n < 0x1000 => Ok(n as u16),
        _ => Err(DebuggerError::BadNumber(s.to_string())),
    }
}

fn parse_key(s: &str) -> Result<u8, DebuggerError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    match u8::from_str_radix(digits, 16) {
        Ok(k) if k < 16 => Ok(k),
        _ => Err(DebuggerError::BadNumber(s.to_string())),
    }
}

fn describe(reason: StopReason, pc: u16) -> String {
    match reason {
        StopReason::Breakpoint(addr) => format!("Found breakpoint at 0x{:03x}", addr),
        StopReason::Requested => format!("Stopped at 0x{:03x}", pc),
        StopReason::Fault(e) => format!("Stopped by fault: {}", e),
    }
}

impl Debugger {
    pub fn new(sched: Arc<Scheduler>) -> Self {
        Debugger {
            sched,
            program: None,
            run: None,
        }
    }

    /// reset the machine and load a program file
    pub fn load(&mut self, path: &Path) -> Result<usize, DebuggerError> {
        if self.sched.control().is_running() {
            return Err(ControlError::Busy.into());
        }
        let mut f = File::open(path).map_err(LoadError::from)?;
        let len = lock(self.sched.machine()).load_program(&mut f)?;
        self.program = Some(path.to_path_buf());
        Ok(len)
    }

    /// run every `;`-separated command on the line, printing results to `out`;
    /// command errors are printed too, only output failures come back as `Err`
    pub fn execute_line(&mut self, line: &str, out: &mut impl Write) -> Result<Flow, io::Error> {
        self.reap(out)?;
        for command in line.split(';') {
            let args: Vec<&str> = command.split_whitespace().collect();
            if args.is_empty() {
                continue;
            }
            match self.command(&args, out) {
                Ok(Flow::Quit) => return Ok(Flow::Quit),
                Ok(Flow::Continue) => {}
                Err(DebuggerError::Io(e)) => return Err(e),
                Err(e) => writeln!(out, "{}", e)?,
            }
        }
        Ok(Flow::Continue)
    }

    /// report on a background run that has ended since we last looked
    pub fn reap(&mut self, out: &mut impl Write) -> Result<(), io::Error> {
        // once the controller reads Stopped the run thread is on its way out
        let finished = self.run.as_ref().map_or(false, |h| {
            h.is_finished() || !self.sched.control().is_running()
        });
        if finished {
            if let Some(handle) = self.run.take() {
                let pc = lock(self.sched.machine()).registers.pc;
                match handle.join() {
                    Ok(reason) => writeln!(out, "{}", describe(reason, pc))?,
                    Err(_) => writeln!(out, "run thread panicked")?,
                }
            }
        }
        Ok(())
    }

    /// stop any run in progress and wait for its thread
    pub fn shutdown(&mut self) {
        if self.sched.control().is_running() {
            if let Err(e) = self.sched.control().stop(STOP_TIMEOUT) {
                log::warn!("stopping on exit: {}", e);
            }
        }
        if let Some(handle) = self.run.take() {
            if handle.join().is_err() {
                log::warn!("run thread panicked");
            }
        }
    }

    fn command(&mut self, args: &[&str], out: &mut impl Write) -> Result<Flow, DebuggerError> {
        match args[0] {
            "b" | "break" => {
                let addr = parse_address(args.get(1).ok_or(DebuggerError::MissingArgument("break"))?)?;
                self.sched.control().add_breakpoint(addr);
                let id = self.sched.control().list_breakpoints().len();
                writeln!(out, "Breakpoint {} at 0x{:03x}", id, addr)?;
            }
            "bp" | "breakpoints" => {
                let list = self.sched.control().list_breakpoints();
                if list.is_empty() {
                    writeln!(out, "No breakpoints")?;
                }
                for (n, addr) in list.iter().enumerate() {
                    writeln!(out, "{}: 0x{:03x}", n + 1, addr)?;
                }
            }
            "cl" | "clear" => self.sched.control().clear_breakpoints(),
            "del" | "delete" => {
                let id = parse_number(args.get(1).ok_or(DebuggerError::MissingArgument("delete"))?)?;
                let addr = self.sched.control().delete_breakpoint(id)?;
                writeln!(out, "Deleted breakpoint {} at 0x{:03x}", id, addr)?;
            }
            "c" | "continue" => {
                self.ensure_stopped()?;
                // step off a breakpoint we may be sitting on
                if self.step_once(out)?.is_some() {
                    self.start_run()?;
                }
            }
            "run" => {
                self.ensure_stopped()?;
                lock(self.sched.machine()).reset();
                self.start_run()?;
            }
            "k" | "kill" => {
                if !self.sched.control().stop(STOP_TIMEOUT)? {
                    writeln!(out, "machine did not stop in time")?;
                }
                self.reap(out)?;
            }
            "s" | "step" => {
                let count = match args.get(1) {
                    Some(n) => parse_number(n)?,
                    None => 1,
                };
                self.ensure_stopped()?;
                for _ in 0..count {
                    if !matches!(self.step_once(out)?, Some(Step::Executed(_))) {
                        break;
                    }
                }
            }
            "d" | "disassemble" => {
                let m = lock(self.sched.machine());
                let (base, count) = match args {
                    [_, base, count, ..] => (parse_address(base)?, parse_number(count)?),
                    [_, count] => (m.registers.pc, parse_number(count)?),
                    _ => (m.registers.pc, DEFAULT_DISASSEMBLY_COUNT),
                };
                for line in disassemble(&m.memory, base, count) {
                    writeln!(out, "{}", line)?;
                }
            }
            "r" | "regs" => write!(out, "{}", lock(self.sched.machine()).dump_registers())?,
            "p" | "pixmap" => write!(out, "{}", lock(self.sched.machine()).pixmap)?,
            "key" => {
                let code = parse_key(args.get(1).ok_or(DebuggerError::MissingArgument("key"))?)?;
                let pressed = match args.get(2).copied() {
                    Some("down") | None => true,
                    Some("up") => false,
                    Some(other) => return Err(DebuggerError::BadNumber(other.to_string())),
                };
                lock(self.sched.machine()).keypad.set_key_state(code, pressed);
            }
            "l" | "load" => {
                let path = match args.get(1) {
                    Some(p) => PathBuf::from(p),
                    None => self.program.clone().ok_or(DebuggerError::MissingArgument("load"))?,
                };
                let len = self.load(&path)?;
                writeln!(out, "Loaded {} bytes from {}", len, path.display())?;
            }
            "h" | "help" => writeln!(out, "{}", HELP)?,
            "e" | "exit" | "q" | "quit" => return Ok(Flow::Quit),
            other => return Err(DebuggerError::UnknownCommand(other.to_string())),
        }
        Ok(Flow::Continue)
    }

    fn ensure_stopped(&self) -> Result<(), ControlError> {
        if self.sched.control().is_running() {
            return Err(ControlError::Busy);
        }
        Ok(())
    }

    fn start_run(&mut self) -> Result<(), ControlError> {
        self.run = Some(self.sched.spawn_run()?);
        Ok(())
    }

    /// single step, printing what happened; `None` if the program faulted
    fn step_once(&mut self, out: &mut impl Write) -> Result<Option<Step>, DebuggerError> {
        let pc = lock(self.sched.machine()).registers.pc;
        match self.sched.step()? {
            Ok(step @ Step::Executed(ins)) => {
                writeln!(out, "0x{:03x}: {}", pc, ins)?;
                Ok(Some(step))
            }
            Ok(Step::WaitingForKey) => {
                let word = lock(self.sched.machine()).memory.get_word(pc);
                writeln!(out, "0x{:03x}: {} (waiting for a key)", pc, decode(word))?;
                Ok(Some(Step::WaitingForKey))
            }
            Err(e) => {
                writeln!(out, "{}", describe(StopReason::Fault(e), pc))?;
                Ok(None)
            }
        }
    }
}

impl Drop for Debugger {
    fn drop(&mut self) {
        self.shutdown();
    }
}
