//! CHIP-8 execution engine
//!
//! ## Design
//!
//! * 9 instructions per 60Hz tick (540Hz); timers and display refresh once
//!   per tick. instructions run as fast as possible then sleep out the rest
//!   of the tick, so not quite authentic
//! * abstract display, sound and input so alternatives can be plugged in;
//!   a TUI in-console display to start with
//! * a debugger can step, run, stop and set breakpoints while the machine
//!   runs on another thread
//!
//! Model
//!
//! ```text
//! Machine (memory, registers, stack, pixmap, keypad)      machine, memory
//!  |-- instruction: decode a word, disassemble
//!  |-- interpreter: execute one instruction against the Machine
//!  `-- scheduler: 9 x interpreter::step, then tick
//!       |-- checks RunController before every instruction  control
//!       |     (breakpoints, stop requests)
//!       `-- tick: timers down, notify display + sound     signal
//!
//! display  <-- tick --  scheduler  -- tick -->  sound
//!    `-- reads pixmap                              `-- reads sound timer
//! input  --> Keypad::set_key_state (no machine lock needed)
//! debugger --> Scheduler::{step, spawn_run}, RunController
//! ```
pub mod config;
pub mod control;
pub mod debugger;
pub mod display;
pub mod error;
pub mod input;
pub mod instruction;
pub mod interpreter;
pub mod machine;
pub mod memory;
pub mod scheduler;
pub mod signal;
pub mod sound;

pub use config::Config;
pub use control::{Breakpoints, RunController, RunState, StopReason};
pub use error::{ControlError, DebuggerError, LoadError, MachineError};
pub use instruction::{decode, Instruction, Opcode};
pub use interpreter::Step;
pub use machine::{Keypad, Machine, Pixmap};
pub use scheduler::Scheduler;
