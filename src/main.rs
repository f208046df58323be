use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use chip8::debugger::{Debugger, Flow, PROMPT};
use chip8::display::{run_display, terminal_available, MonoTermDisplay};
use chip8::input::{Input, Poll, StdinInput};
use chip8::signal::{tick_channel, TickReceiver};
use chip8::sound::{run_buzzer, Mute, SimpleBeep, Sound};
use chip8::{Config, Machine, RunController, Scheduler, StopReason};

/// how often the front-end checks for keys while the machine runs
const INPUT_POLL: Duration = Duration::from_millis(10);

/// how long to wait for the run loop to acknowledge a stop on exit
const STOP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "chip8")]
#[command(version)]
#[command(about = "CHIP-8 interpreter with a breakpoint debugger")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program in the terminal, with keyboard and beeper; Esc quits
    Play {
        /// Path to the CHIP-8 program image
        rom: PathBuf,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Load a program and drive it from a command prompt
    Debug {
        /// Path to the CHIP-8 program image
        rom: PathBuf,
        /// Also draw the display in the terminal while the prompt runs
        #[arg(long)]
        screen: bool,
        #[command(flatten)]
        engine: EngineArgs,
    },
}

#[derive(Args)]
struct EngineArgs {
    /// Seed for the RND instruction (default: random)
    #[arg(long)]
    seed: Option<u64>,
    /// Keep the timers running while LD Vx, K waits for a key
    #[arg(long)]
    timers_during_key_wait: bool,
    /// How long a terminal key press is held down, in milliseconds
    #[arg(long, default_value = "100")]
    key_hold_ms: u64,
    /// Don't beep
    #[arg(long)]
    mute: bool,
}

impl From<&EngineArgs> for Config {
    fn from(args: &EngineArgs) -> Self {
        Config {
            timers_during_key_wait: args.timers_during_key_wait,
            seed: args.seed,
            key_hold: Duration::from_millis(args.key_hold_ms),
            sound: !args.mute,
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    env_logger::builder()
        .format(|buf, record| writeln!(buf, "{}: {}", record.level(), record.args()))
        .init();

    match &cli.command {
        Commands::Play { rom, engine } => play(rom, Config::from(engine)),
        Commands::Debug {
            rom,
            screen,
            engine,
        } => debug(rom, *screen, Config::from(engine)),
    }
}

/// everything the front-ends share: the machine, its controller and the
/// scheduler, with the receiving ends of the tick channels
struct Engine {
    machine: Arc<Mutex<Machine>>,
    control: Arc<RunController>,
    sched: Arc<Scheduler>,
    display_ticks: TickReceiver,
    audio_ticks: TickReceiver,
}

impl Engine {
    fn new(machine: Machine, config: &Config) -> Self {
        let machine = Arc::new(Mutex::new(machine));
        let control = Arc::new(RunController::new());
        let (display_tx, display_ticks) = tick_channel();
        let (audio_tx, audio_ticks) = tick_channel();
        let sched = Arc::new(Scheduler::new(
            Arc::clone(&machine),
            Arc::clone(&control),
            display_tx,
            audio_tx,
            config.clone(),
        ));
        Engine {
            machine,
            control,
            sched,
            display_ticks,
            audio_ticks,
        }
    }
}

/// terminal display on its own thread; ends when the scheduler is dropped
fn spawn_display(
    engine_machine: &Arc<Mutex<Machine>>,
    ticks: TickReceiver,
) -> thread::JoinHandle<Result<(), String>> {
    let machine = Arc::clone(engine_machine);
    thread::spawn(move || {
        let mut display = MonoTermDisplay::new().map_err(|e| e.to_string())?;
        run_display(&mut display, &machine, ticks).map_err(|e| e.to_string())
    })
}

fn join_logged(name: &str, handle: thread::JoinHandle<Result<(), String>>) {
    match handle.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::warn!("{} failed: {}", name, e),
        Err(_) => log::warn!("{} thread panicked", name),
    }
}

/// beeper on its own thread; ends when the scheduler is dropped
fn spawn_buzzer(
    engine_machine: &Arc<Mutex<Machine>>,
    control: &Arc<RunController>,
    ticks: TickReceiver,
    config: &Config,
) -> thread::JoinHandle<Result<(), String>> {
    let machine = Arc::clone(engine_machine);
    let control = Arc::clone(control);
    let sound_on = config.sound;
    thread::spawn(move || {
        let mut sound: Box<dyn Sound> = if sound_on {
            Box::new(SimpleBeep::new())
        } else {
            Box::new(Mute::new())
        };
        run_buzzer(sound.as_mut(), &machine, &control, ticks).map_err(|e| e.to_string())
    })
}

fn play(rom: &Path, config: Config) -> Result<(), Box<dyn Error>> {
    if !terminal_available() {
        return Err("play needs a terminal".into());
    }
    let mut machine = Machine::new(&config);
    let mut f = File::open(rom)?;
    machine.load_program(&mut f)?;
    let keypad = Arc::clone(&machine.keypad);

    let Engine {
        machine,
        control,
        sched,
        display_ticks,
        audio_ticks,
    } = Engine::new(machine, &config);

    let display = spawn_display(&machine, display_ticks);
    let buzzer = spawn_buzzer(&machine, &control, audio_ticks, &config);

    let mut input = StdinInput::new(config.key_hold)?;
    let run = sched.spawn_run()?;
    while control.is_running() {
        if input.poll(&keypad, INPUT_POLL)? == Poll::Quit {
            if control.stop(STOP_TIMEOUT).is_err() {
                log::debug!("machine had already stopped");
            }
            break;
        }
    }
    let reason = run.join().map_err(|_| "run thread panicked")?;
    drop(input);

    // the scheduler owns the tick senders; dropping it ends both consumers
    drop(sched);
    join_logged("display", display);
    join_logged("sound", buzzer);

    // shove some junk on stdout to stop the cli messing up the last frame
    println!();
    match reason {
        StopReason::Fault(e) => Err(e.into()),
        _ => Ok(()),
    }
}

fn debug(rom: &Path, screen: bool, config: Config) -> Result<(), Box<dyn Error>> {
    let Engine {
        machine,
        control,
        sched,
        display_ticks,
        audio_ticks,
    } = Engine::new(Machine::new(&config), &config);
    // without a screen the pixmap command shows the display
    let display = if screen && terminal_available() {
        Some(spawn_display(&machine, display_ticks))
    } else {
        if screen {
            log::warn!("no terminal to draw the screen on");
        }
        drop(display_ticks);
        None
    };
    let buzzer = spawn_buzzer(&machine, &control, audio_ticks, &config);

    let mut debugger = Debugger::new(sched);
    let len = debugger.load(rom)?;

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    writeln!(stdout, "Loaded {} bytes from {}", len, rom.display())?;
    writeln!(stdout, "Type \"h\" or \"help\" for commands usage")?;
    let mut lines = stdin.lock().lines();
    loop {
        write!(stdout, "{}", PROMPT)?;
        stdout.flush()?;
        let line = match lines.next() {
            Some(line) => line?,
            None => break,
        };
        if debugger.execute_line(&line, &mut stdout)? == Flow::Quit {
            break;
        }
    }
    writeln!(stdout)?;

    debugger.shutdown();
    drop(debugger);
    if let Some(display) = display {
        join_logged("display", display);
    }
    join_logged("sound", buzzer);
    Ok(())
}
