//! # control
//!
//! Run/stop state and breakpoints, shared between the thread driving the
//! scheduler and whoever is debugging it.
//!
//! Stopping is a handshake rather than a call into the run loop:
//!
//! ```text
//!   debugger                         run loop (checks before every instruction)
//!   request_stop() ── flag ───────▶  take_stop_request() (consumes it)
//!   wait_until_stopped() ◀── ack ──  finish(reason)
//! ```
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::error::{ControlError, MachineError};

/// Breakpoint addresses in the order they were set. Ids shown to people are
/// 1-based positions in this list; duplicates are allowed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Breakpoints {
    addrs: Vec<u16>,
}

impl Breakpoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, addr: u16) {
        self.addrs.push(addr);
    }

    pub fn list(&self) -> &[u16] {
        &self.addrs
    }

    /// remove breakpoint number `id` (1-based), returning its address
    pub fn delete(&mut self, id: usize) -> Result<u16, ControlError> {
        if id == 0 || id > self.addrs.len() {
            return Err(ControlError::InvalidBreakpoint(id));
        }
        Ok(self.addrs.remove(id - 1))
    }

    pub fn clear(&mut self) {
        self.addrs.clear();
    }

    pub fn contains(&self, addr: u16) -> bool {
        self.addrs.contains(&addr)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    Running,
}

/// why a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// PC hit this breakpoint address; the instruction there hasn't run
    Breakpoint(u16),
    /// someone called `request_stop`
    Requested,
    /// the program did something unrecoverable
    Fault(MachineError),
}

struct Status {
    state: RunState,
    last_stop: Option<StopReason>,
}

pub struct RunController {
    status: Mutex<Status>,
    stopped: Condvar,
    stop_requested: AtomicBool,
    breakpoints: Mutex<Breakpoints>,
}

fn relock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RunController {
    pub fn new() -> Self {
        RunController {
            status: Mutex::new(Status {
                state: RunState::Stopped,
                last_stop: None,
            }),
            stopped: Condvar::new(),
            stop_requested: AtomicBool::new(false),
            breakpoints: Mutex::new(Breakpoints::new()),
        }
    }

    pub fn state(&self) -> RunState {
        relock(&self.status).state
    }

    pub fn is_running(&self) -> bool {
        self.state() == RunState::Running
    }

    /// the reason the most recent run ended, if any run has
    pub fn last_stop(&self) -> Option<StopReason> {
        relock(&self.status).last_stop
    }

    /// Stopped -> Running. any stale stop request from before is dropped
    pub fn begin_run(&self) -> Result<(), ControlError> {
        let mut status = relock(&self.status);
        if status.state == RunState::Running {
            return Err(ControlError::Busy);
        }
        self.stop_requested.store(false, Ordering::Release);
        status.state = RunState::Running;
        Ok(())
    }

    /// Running -> Stopped, waking anyone waiting for the ack
    pub fn finish(&self, reason: StopReason) {
        let mut status = relock(&self.status);
        status.state = RunState::Stopped;
        status.last_stop = Some(reason);
        self.stop_requested.store(false, Ordering::Release);
        self.stopped.notify_all();
    }

    /// ask the run loop to stop at its next instruction boundary
    pub fn request_stop(&self) -> Result<(), ControlError> {
        let status = relock(&self.status);
        if status.state != RunState::Running {
            return Err(ControlError::NotRunning);
        }
        self.stop_requested.store(true, Ordering::Release);
        log::info!("stop requested");
        Ok(())
    }

    /// called by the run loop; true at most once per request
    pub fn take_stop_request(&self) -> bool {
        self.stop_requested.swap(false, Ordering::AcqRel)
    }

    /// block until the machine is stopped; false if `timeout` ran out first
    pub fn wait_until_stopped(&self, timeout: Duration) -> bool {
        let status = relock(&self.status);
        let (status, _) = self
            .stopped
            .wait_timeout_while(status, timeout, |s| s.state == RunState::Running)
            .unwrap_or_else(PoisonError::into_inner);
        status.state == RunState::Stopped
    }

    /// request a stop and wait for the run loop to acknowledge it
    pub fn stop(&self, timeout: Duration) -> Result<bool, ControlError> {
        self.request_stop()?;
        Ok(self.wait_until_stopped(timeout))
    }

    pub fn add_breakpoint(&self, addr: u16) {
        relock(&self.breakpoints).add(addr);
    }

    pub fn delete_breakpoint(&self, id: usize) -> Result<u16, ControlError> {
        relock(&self.breakpoints).delete(id)
    }

    pub fn clear_breakpoints(&self) {
        relock(&self.breakpoints).clear();
    }

    /// snapshot of the breakpoint list, in insertion order
    pub fn list_breakpoints(&self) -> Vec<u16> {
        relock(&self.breakpoints).list().to_vec()
    }

    pub fn is_breakpoint(&self, addr: u16) -> bool {
        relock(&self.breakpoints).contains(addr)
    }
}

impl Default for RunController {
    fn default() -> Self {
        Self::new()
    }
}
