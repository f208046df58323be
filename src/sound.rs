use beep::beep;
use std::error::Error;
use std::sync::Mutex;

use crate::control::RunController;
use crate::machine::{lock, Machine};
use crate::signal::TickReceiver;

pub trait Sound {
    fn beep(&mut self) -> Result<(), Box<dyn Error>>;
    fn stop(&mut self) -> Result<(), Box<dyn Error>>;
    fn is_beeping(&self) -> bool;
}

const SIMPLEBEEP_PITCH: u16 = 2093; // C

pub struct SimpleBeep {
    is_beeping: bool,
}

impl SimpleBeep {
    pub fn new() -> Self {
        SimpleBeep { is_beeping: false }
    }
}

impl Default for SimpleBeep {
    fn default() -> Self {
        Self::new()
    }
}

impl Sound for SimpleBeep {
    fn beep(&mut self) -> Result<(), Box<dyn Error>> {
        beep(SIMPLEBEEP_PITCH)?;
        self.is_beeping = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Box<dyn Error>> {
        beep(0)?;
        self.is_beeping = false;
        Ok(())
    }

    fn is_beeping(&self) -> bool {
        self.is_beeping
    }
}

/// silent, but keeps track of whether it would be beeping
#[derive(Default)]
pub struct Mute {
    is_beeping: bool,
    pub toggles: usize,
}

impl Mute {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Sound for Mute {
    fn beep(&mut self) -> Result<(), Box<dyn Error>> {
        self.is_beeping = true;
        self.toggles += 1;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Box<dyn Error>> {
        self.is_beeping = false;
        self.toggles += 1;
        Ok(())
    }

    fn is_beeping(&self) -> bool {
        self.is_beeping
    }
}

/// On every tick, turn the tone on while the sound timer is live and the
/// machine is running, off otherwise. Only state changes reach the device.
/// Returns once the scheduler goes away, leaving the tone off.
pub fn run_buzzer(
    sound: &mut dyn Sound,
    machine: &Mutex<Machine>,
    control: &RunController,
    ticks: TickReceiver,
) -> Result<(), Box<dyn Error>> {
    while ticks.wait() {
        let want = lock(machine).tone_on() && control.is_running();
        if want != sound.is_beeping() {
            if want {
                sound.beep()?;
            } else {
                sound.stop()?;
            }
        }
    }
    if sound.is_beeping() {
        sound.stop()?;
    }
    Ok(())
}
