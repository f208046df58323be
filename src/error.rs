use std::io;
use thiserror::Error;

/// Faults raised while executing a program. Everything else a program can do,
/// however nonsensical, is just executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MachineError {
    #[error("stack overflow: CALL at 0x{pc:03x} with 16 return addresses already pushed")]
    StackOverflow { pc: u16 },

    #[error("stack underflow: RET at 0x{pc:03x} with an empty stack")]
    StackUnderflow { pc: u16 },
}

/// Failures loading a program image into memory.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("can't read program: {0}")]
    Io(#[from] io::Error),

    #[error("program is {size} bytes but only {capacity} bytes of program space exist")]
    ProgramTooLarge { size: usize, capacity: usize },
}

/// Rejected run-control requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("Invalid breakpoint id {0}")]
    InvalidBreakpoint(usize),

    #[error("machine is running; stop it first")]
    Busy,

    #[error("machine is not running")]
    NotRunning,
}

/// Errors reported back to the person typing at the debugger prompt.
#[derive(Debug, Error)]
pub enum DebuggerError {
    #[error("{0}: unrecognized command")]
    UnknownCommand(String),

    #[error("{0}: missing argument")]
    MissingArgument(&'static str),

    #[error("{0}: not a number")]
    BadNumber(String),

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Io(#[from] io::Error),
}
