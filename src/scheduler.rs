//! # scheduler
//!
//! Ties instruction throughput to wall-clock time. One tick is 1/60s:
//!
//! ```text
//!   tick:
//!     repeat until 9 instructions have run this tick:
//!       PC on a breakpoint?  -> Stopped (instruction not executed)
//!       stop requested?      -> Stopped
//!       execute one instruction
//!     DT -= 1, ST -= 1 (if nonzero)
//!     notify display + audio (never blocks)
//!     sleep whatever is left of the 1/60s
//! ```
//!
//! The tick accounting lives in `Machine::cycles`, so single steps from the
//! debugger count towards the same tick: nine single steps decrement the
//! timers exactly once, and a run started mid-tick finishes that tick first.
//!
//! The machine lock is held for one instruction at a time so display, audio
//! and debugger threads can look at the state while a program runs.
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use crate::config::{Config, CYCLES_PER_TICK, KEY_POLL_INTERVAL};
use crate::control::{RunController, StopReason};
use crate::error::{ControlError, MachineError};
use crate::interpreter::{self, Step};
use crate::machine::{lock, Machine};
use crate::signal::TickSender;

/// outcome of trying to run one instruction inside a run
enum Cycle {
    Stop(StopReason),
    Executed { tick_done: bool },
    WaitingForKey,
}

pub struct Scheduler {
    machine: Arc<Mutex<Machine>>,
    control: Arc<RunController>,
    display: TickSender,
    audio: TickSender,
    config: Config,
}

impl Scheduler {
    pub fn new(
        machine: Arc<Mutex<Machine>>,
        control: Arc<RunController>,
        display: TickSender,
        audio: TickSender,
        config: Config,
    ) -> Self {
        Scheduler {
            machine,
            control,
            display,
            audio,
            config,
        }
    }

    pub fn machine(&self) -> &Arc<Mutex<Machine>> {
        &self.machine
    }

    pub fn control(&self) -> &Arc<RunController> {
        &self.control
    }

    /// execute a single instruction on the caller's thread; refused while a
    /// run is in progress
    pub fn step(&self) -> Result<Result<Step, MachineError>, ControlError> {
        if self.control.is_running() {
            return Err(ControlError::Busy);
        }
        let mut m = lock(&self.machine);
        Ok(self.advance(&mut m).map(|(step, _)| step))
    }

    /// run on the caller's thread until a breakpoint, stop request or fault
    pub fn run(&self) -> Result<StopReason, ControlError> {
        self.control.begin_run()?;
        log::info!("running from 0x{:03x}", lock(&self.machine).registers.pc);
        let reason = self.run_loop();
        match reason {
            StopReason::Breakpoint(addr) => log::info!("Found breakpoint at 0x{:03x}", addr),
            StopReason::Requested => log::info!("stopped on request"),
            StopReason::Fault(e) => log::warn!("stopped: {}", e),
        }
        self.control.finish(reason);
        Ok(reason)
    }

    /// `run` on a new thread; the controller is already Running when this returns
    pub fn spawn_run(self: &Arc<Self>) -> Result<thread::JoinHandle<StopReason>, ControlError> {
        self.control.begin_run()?;
        let sched = Arc::clone(self);
        Ok(thread::spawn(move || {
            let reason = sched.run_loop();
            log::info!("run ended: {:?}", reason);
            sched.control.finish(reason);
            reason
        }))
    }

    fn run_loop(&self) -> StopReason {
        let period = self.config.tick_period();
        loop {
            let tick_start = Instant::now();
            let mut waiting_since = None;
            loop {
                match self.cycle() {
                    Cycle::Stop(reason) => return reason,
                    Cycle::Executed { tick_done: true } => break,
                    Cycle::Executed { tick_done: false } => waiting_since = None,
                    Cycle::WaitingForKey => {
                        let since = *waiting_since.get_or_insert_with(Instant::now);
                        if self.config.timers_during_key_wait && since.elapsed() >= period {
                            self.tick(&mut lock(&self.machine));
                            waiting_since = Some(Instant::now());
                        }
                        spin_sleep::sleep(KEY_POLL_INTERVAL);
                    }
                }
            }
            let elapsed = tick_start.elapsed();
            if elapsed < period {
                spin_sleep::sleep(period - elapsed);
            }
        }
    }

    /// one pass through the per-instruction checks and, if they pass, one instruction
    fn cycle(&self) -> Cycle {
        let mut m = lock(&self.machine);
        let pc = m.registers.pc;
        if self.control.is_breakpoint(pc) {
            return Cycle::Stop(StopReason::Breakpoint(pc));
        }
        if self.control.take_stop_request() {
            return Cycle::Stop(StopReason::Requested);
        }
        match self.advance(&mut m) {
            Ok((Step::Executed(_), tick_done)) => Cycle::Executed { tick_done },
            Ok((Step::WaitingForKey, _)) => Cycle::WaitingForKey,
            Err(e) => Cycle::Stop(StopReason::Fault(e)),
        }
    }

    /// execute one instruction and do the tick bookkeeping; true in the
    /// second slot when this instruction completed a tick
    fn advance(&self, m: &mut Machine) -> Result<(Step, bool), MachineError> {
        let step = interpreter::step(m)?;
        if step == Step::WaitingForKey {
            return Ok((step, false));
        }
        m.cycles += 1;
        if m.cycles >= CYCLES_PER_TICK {
            self.tick(m);
            return Ok((step, true));
        }
        Ok((step, false))
    }

    /// timers down by one, cycle count reset, collaborators poked
    fn tick(&self, m: &mut Machine) {
        let r = &mut m.registers;
        r.delay_timer = r.delay_timer.saturating_sub(1);
        r.sound_timer = r.sound_timer.saturating_sub(1);
        m.cycles = 0;
        self.display.notify();
        self.audio.notify();
    }
}
