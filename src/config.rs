use std::time::Duration;

/// instructions executed per 60Hz tick (9 * 60 = 540Hz)
pub const CYCLES_PER_TICK: u8 = 9;

/// timer and display refresh rate
pub const TICKS_PER_SECOND: u32 = 60;

/// how often a pending `LD Vx, K` re-checks the keypad
pub const KEY_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Runtime knobs handed to the engine by whoever builds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// keep ticking timers while `LD Vx, K` is blocked (real hardware does)
    pub timers_during_key_wait: bool,
    /// seed for `RND`; `None` seeds from entropy
    pub seed: Option<u64>,
    /// terminals never report key releases, so a press is held this long
    pub key_hold: Duration,
    pub sound: bool,
}

impl Config {
    /// wall-clock budget of one tick
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs(1) / TICKS_PER_SECOND
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            timers_during_key_wait: false,
            seed: None,
            key_hold: Duration::from_millis(100),
            sound: true,
        }
    }
}
