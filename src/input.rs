use crossterm::event::{poll, read, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal;
use std::collections::HashMap;
use std::io;
use std::time::{Duration, Instant};

use crate::machine::{Keypad, KEY_COUNT};

/// left-hand side of a qwerty keyboard, laid out like the COSMAC keypad:
///   1 2 3 4      1 2 3 C
///   q w e r  =>  4 5 6 D
///   a s d f      7 8 9 E
///   z x c v      A 0 B F
const CHIP8_CONVENTIONAL_KEYMAP: [(char, u8); 16] = [
    ('x', 0x00), // x
    ('1', 0x01), // 1
    ('2', 0x02), // 2
    ('3', 0x03), // 3
    ('q', 0x04), // q
    ('w', 0x05), // w
    ('e', 0x06), // e
    ('a', 0x07), // a
    ('s', 0x08), // s
    ('d', 0x09), // d
    ('z', 0x0a), // z
    ('c', 0x0b), // c
    ('4', 0x0c), // 4
    ('r', 0x0d), // r
    ('f', 0x0e), // f
    ('v', 0x0f), // v
];

/// what the front-end should do after polling input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    Continue,
    Quit,
}

/// a source of key presses for the keypad
pub trait Input {
    /// wait up to `timeout` for input, pushing key changes into `keypad`
    fn poll(&mut self, keypad: &Keypad, timeout: Duration) -> Result<Poll, io::Error>;
}

/// Terminals only report presses, so each press is held down for a fixed
/// time and then released; a repeat press before then extends the hold.
struct KeyHold {
    hold: Duration,
    pressed_at: [Option<Instant>; KEY_COUNT],
}

impl KeyHold {
    fn new(hold: Duration) -> Self {
        KeyHold {
            hold,
            pressed_at: [None; KEY_COUNT],
        }
    }

    fn press(&mut self, keypad: &Keypad, code: u8, now: Instant) {
        let code = code & 0x0f;
        self.pressed_at[code as usize] = Some(now);
        keypad.set_key_state(code, true);
    }

    fn expire(&mut self, keypad: &Keypad, now: Instant) {
        for (code, at) in self.pressed_at.iter_mut().enumerate() {
            if let Some(t) = at {
                if now.duration_since(*t) >= self.hold {
                    *at = None;
                    keypad.set_key_state(code as u8, false);
                }
            }
        }
    }
}

/// keyboard input from a raw-mode terminal, via crossterm
pub struct StdinInput {
    keymap: HashMap<char, u8>,
    held: KeyHold,
}

impl StdinInput {
    pub fn new(hold: Duration) -> Result<Self, io::Error> {
        terminal::enable_raw_mode()?;
        Ok(StdinInput {
            keymap: HashMap::from(CHIP8_CONVENTIONAL_KEYMAP),
            held: KeyHold::new(hold),
        })
    }

    fn handle(&mut self, keypad: &Keypad, event: Event) -> Poll {
        match event {
            Event::Key(KeyEvent {
                code: KeyCode::Esc, ..
            }) => Poll::Quit,
            Event::Key(KeyEvent {
                code: KeyCode::Char('c'),
                modifiers,
            }) if modifiers.contains(KeyModifiers::CONTROL) => Poll::Quit,
            Event::Key(KeyEvent {
                code: KeyCode::Char(key),
                ..
            }) => {
                match self.keymap.get(&key.to_ascii_lowercase()) {
                    Some(mapped_key) => self.held.press(keypad, *mapped_key, Instant::now()),
                    None => log::warn!("can't map {:?} to a COSMAC key", key),
                }
                Poll::Continue
            }
            _ => Poll::Continue,
        }
    }
}

impl Drop for StdinInput {
    fn drop(&mut self) {
        if let Err(e) = terminal::disable_raw_mode() {
            log::warn!("can't leave raw mode: {}", e);
        }
    }
}

impl Input for StdinInput {
    fn poll(&mut self, keypad: &Keypad, timeout: Duration) -> Result<Poll, io::Error> {
        let mut result = Poll::Continue;
        if poll(timeout)? {
            while result == Poll::Continue {
                let event = read()?;
                result = self.handle(keypad, event);
                if !poll(Duration::from_millis(0))? {
                    break;
                }
            }
        }
        self.held.expire(keypad, Instant::now());
        Ok(result)
    }
}

/// scripted Input for testing: hands out one key code per poll, then quits
pub struct DummyInput {
    keys: Vec<u8>,
    held: KeyHold,
}

impl DummyInput {
    pub fn new(keys: &[u8], hold: Duration) -> Self {
        let mut keys = Vec::from(keys);
        keys.reverse();
        DummyInput {
            keys,
            held: KeyHold::new(hold),
        }
    }
}

impl Input for DummyInput {
    fn poll(&mut self, keypad: &Keypad, _timeout: Duration) -> Result<Poll, io::Error> {
        let now = Instant::now();
        self.held.expire(keypad, now);
        match self.keys.pop() {
            Some(code) => {
                self.held.press(keypad, code, now);
                Ok(Poll::Continue)
            }
            None => Ok(Poll::Quit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keymap_covers_every_key() {
        let mut codes: Vec<u8> = CHIP8_CONVENTIONAL_KEYMAP.iter().map(|(_, c)| *c).collect();
        codes.sort_unstable();
        assert_eq!(codes, (0..16).collect::<Vec<u8>>());
    }

    #[test]
    fn test_hold_releases_after_timeout() {
        let keypad = Keypad::new();
        let mut h = KeyHold::new(Duration::from_millis(100));
        let t0 = Instant::now();
        h.press(&keypad, 0x5, t0);
        h.expire(&keypad, t0 + Duration::from_millis(50));
        assert!(keypad.is_pressed(0x5));
        h.expire(&keypad, t0 + Duration::from_millis(100));
        assert!(!keypad.is_pressed(0x5));
    }

    #[test]
    fn test_repeat_press_extends_hold() {
        let keypad = Keypad::new();
        let mut h = KeyHold::new(Duration::from_millis(100));
        let t0 = Instant::now();
        h.press(&keypad, 0xa, t0);
        h.press(&keypad, 0xa, t0 + Duration::from_millis(80));
        h.expire(&keypad, t0 + Duration::from_millis(150));
        assert!(keypad.is_pressed(0xa));
    }

    #[test]
    fn test_dummy_input() -> Result<(), io::Error> {
        let keypad = Keypad::new();
        let mut i = DummyInput::new(&[0x3], Duration::from_secs(60));
        assert_eq!(i.poll(&keypad, Duration::ZERO)?, Poll::Continue);
        assert!(keypad.is_pressed(0x3));
        assert_eq!(i.poll(&keypad, Duration::ZERO)?, Poll::Quit);
        Ok(())
    }

    #[test]
    fn test_out_of_range_code_uses_low_nibble() -> Result<(), io::Error> {
        let keypad = Keypad::new();
        let mut i = DummyInput::new(&[0x1b], Duration::from_millis(10));
        assert_eq!(i.poll(&keypad, Duration::ZERO)?, Poll::Continue);
        assert!(keypad.is_pressed(0xb));
        // and it still gets released
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(i.poll(&keypad, Duration::ZERO)?, Poll::Quit);
        assert!(!keypad.is_pressed(0xb));
        Ok(())
    }
}
