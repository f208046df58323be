use std::io;
use std::sync::Mutex;

use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute};
use tui::backend::CrosstermBackend;
use tui::layout::Rect;
use tui::style::{Color, Style};
use tui::symbols::Marker;
use tui::widgets::canvas::{Canvas, Points};
use tui::widgets::{Block, Borders};
use tui::Terminal;

use crate::machine::{lock, Machine, Pixmap, SCREEN_HEIGHT, SCREEN_WIDTH};
use crate::signal::TickReceiver;

/// Display is fed the pixmap on every refresh. It should abstract the
/// implementation details, so a variety of kinds of screen would work.
pub trait Display {
    /// draw the whole 64x32 pixmap
    fn draw(&mut self, pixmap: &Pixmap) -> Result<(), io::Error>;
}

// store useful metadata about the screen: width, height
struct Resolution(usize, usize);

impl Resolution {
    fn pixel_count(&self) -> usize {
        self.0 * self.1
    }

    fn x_bounds(&self) -> [f64; 2] {
        [0.0, (self.0 - 1) as f64]
    }

    fn y_bounds(&self) -> [f64; 2] {
        [-1.0 * (self.1 - 1) as f64, 0.0]
    }

    /// canvas coordinates of every pixel that is (or isn't) lit; y grows
    /// downwards on the chip-8 but upwards on the canvas
    fn bitplane_from_pixmap(&self, pixmap: &Pixmap, lit: bool) -> Vec<(f64, f64)> {
        (0..self.pixel_count())
            .map(|n| (n % self.0, n / self.0))
            .filter(|&(x, y)| pixmap.get(x, y) == lit)
            .map(|(x, y)| (x as f64, -1.0 * y as f64))
            .collect()
    }
}

/// monochrome display in a terminal, rendered using TUI and Crossterm
pub struct MonoTermDisplay {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
    resolution: Resolution,
}

impl MonoTermDisplay {
    pub fn new() -> Result<MonoTermDisplay, io::Error> {
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, cursor::Hide)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;
        Ok(MonoTermDisplay {
            terminal,
            resolution: Resolution(SCREEN_WIDTH, SCREEN_HEIGHT),
        })
    }
}

impl Drop for MonoTermDisplay {
    fn drop(&mut self) {
        if let Err(e) = execute!(io::stdout(), LeaveAlternateScreen, cursor::Show) {
            log::warn!("can't restore terminal: {}", e);
        }
    }
}

impl Display for MonoTermDisplay {
    fn draw(&mut self, pixmap: &Pixmap) -> Result<(), io::Error> {
        let dark = self.resolution.bitplane_from_pixmap(pixmap, false);
        let lit = self.resolution.bitplane_from_pixmap(pixmap, true);
        let (x_bounds, y_bounds) = (self.resolution.x_bounds(), self.resolution.y_bounds());
        let (w, h) = (self.resolution.0 as u16, self.resolution.1 as u16);

        // for now this assumes a 1:1 ratio between terminal, chip8 and the
        // internal TUI canvas
        self.terminal.draw(|f| {
            let size = Rect::new(0, 0, 2 + w, 2 + h);

            let canvas = Canvas::default()
                .block(
                    Block::default()
                        .title("CHIP-8")
                        .borders(Borders::ALL)
                        .style(Style::default().bg(Color::Black)),
                )
                .x_bounds(x_bounds)
                .y_bounds(y_bounds)
                .marker(Marker::Block)
                .paint(|ctx| {
                    ctx.draw(&Points {
                        coords: &dark,
                        color: Color::Black,
                    });
                    ctx.draw(&Points {
                        coords: &lit,
                        color: Color::White,
                    });
                });
            f.render_widget(canvas, size);
        })?;
        Ok(())
    }
}

/// useful for headless runs and testing; remembers what it was last given
#[derive(Default)]
pub struct DummyDisplay {
    pub frames: usize,
    pub last: Option<Pixmap>,
}

impl DummyDisplay {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Display for DummyDisplay {
    fn draw(&mut self, pixmap: &Pixmap) -> Result<(), io::Error> {
        self.frames += 1;
        self.last = Some(pixmap.clone());
        Ok(())
    }
}

/// Redraw on every tick notification until the scheduler goes away. The
/// pixmap is copied out under the machine lock and drawn without it.
pub fn run_display(
    display: &mut dyn Display,
    machine: &Mutex<Machine>,
    ticks: TickReceiver,
) -> Result<(), io::Error> {
    display.draw(&lock(machine).pixmap)?;
    while ticks.wait() {
        let pixmap = lock(machine).pixmap.clone();
        display.draw(&pixmap)?;
    }
    Ok(())
}

/// true if stdout looks like something the terminal display can take over
pub fn terminal_available() -> bool {
    terminal::size().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::signal::tick_channel;

    // Resolution tests
    #[test]
    fn test_pixel_count() {
        let r = Resolution(64, 32);
        assert_eq!(r.pixel_count(), 2048)
    }

    #[test]
    fn test_x_bounds() {
        let r = Resolution(64, 32);
        assert_eq!(r.x_bounds(), [0.0, 63.0]);
    }

    #[test]
    fn test_y_bounds() {
        let r = Resolution(64, 32);
        assert_eq!(r.y_bounds(), [-31.0, 0.0]);
    }

    #[test]
    fn test_bitplanes_partition_the_screen() {
        let r = Resolution(64, 32);
        let mut p = Pixmap::new();
        p.flip(2, 3);
        p.flip(63, 31);
        let lit = r.bitplane_from_pixmap(&p, true);
        assert_eq!(lit, vec![(2.0, -3.0), (63.0, -31.0)]);
        assert_eq!(r.bitplane_from_pixmap(&p, false).len(), 2046);
    }

    #[test]
    fn test_consumer_draws_current_state() {
        let machine = Mutex::new(Machine::new(&Config::default()));
        let (tx, rx) = tick_channel();
        lock(&machine).pixmap.flip(5, 5);
        tx.notify();
        drop(tx);
        let mut d = DummyDisplay::new();
        run_display(&mut d, &machine, rx).unwrap();
        // initial frame plus one per tick
        assert_eq!(d.frames, 2);
        assert!(d.last.map(|p| p.get(5, 5)).unwrap_or(false));
    }
}
