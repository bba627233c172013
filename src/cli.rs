//! Command line front end for running intcode listings

use std::fmt::Write;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use thiserror::Error;

use devices::hull::{self, Color};
use devices::geometry::Coord;
use devices::{arcade, ascii, droid};
use vmm::disasm::disassemble;
use vmm::topology::{best_phase_sequence, run_chain, run_feedback_loop};
use vmm::{Program, ProgramError, RuntimeConfig, VmError, Word};

#[derive(Parser, Debug)]
#[command(name = "intcode", version)]
#[command(about = "Run intcode programs, alone or wired into circuits and devices")]
pub struct Cli {
    /// Trace every executed instruction
    #[arg(long, global = true)]
    pub debug: bool,

    /// Relay poll interval in milliseconds
    #[arg(long = "poll-ms", global = true)]
    pub poll_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a program and print its output
    Run {
        file: PathBuf,
        /// Input values, repeatable or comma separated
        #[arg(long = "input", short = 'i', value_delimiter = ',', allow_hyphen_values = true)]
        inputs: Vec<Word>,
    },
    /// Print a program as instructions
    Disasm { file: PathBuf },
    /// Search phase settings for the strongest amplifier signal
    Amplify {
        file: PathBuf,
        /// Wire the chain into a feedback loop (phases 5-9)
        #[arg(long)]
        feedback: bool,
    },
    /// Run a hull painting robot and draw the hull
    Paint {
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = StartColor::Black)]
        start: StartColor,
    },
    /// Play an arcade game to completion
    Arcade {
        file: PathBuf,
        /// Value stored at address 0 before the game starts
        #[arg(long)]
        quarters: Option<Word>,
    },
    /// Show what an ASCII camera unit sees
    Ascii { file: PathBuf },
    /// Map the area around a repair droid
    Droid { file: PathBuf },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartColor {
    Black,
    White,
}

impl From<StartColor> for Color {
    fn from(start: StartColor) -> Color {
        match start {
            StartColor::Black => Color::Black,
            StartColor::White => Color::White,
        }
    }
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Program error: {0}")]
    Program(#[from] ProgramError),
    #[error("Execution error: {0}")]
    Execution(#[from] VmError),
    #[error("No phase ordering produced a signal")]
    NoSignal,
}

impl Cli {
    /// Environment defaults with command line overrides applied
    pub fn config(&self) -> RuntimeConfig {
        let mut config = RuntimeConfig::from_env();
        if self.debug {
            config = config.with_debug(true);
        }
        if let Some(ms) = self.poll_ms.filter(|ms| *ms > 0) {
            config = config.with_poll_interval(Duration::from_millis(ms));
        }
        config
    }
}

/// Execute a parsed command line, returning the report to print
pub fn execute(cli: &Cli) -> Result<String, CliError> {
    let config = cli.config();
    match &cli.command {
        Command::Run { file, inputs } => cmd_run(&Program::from_file(file)?, inputs, &config),
        Command::Disasm { file } => Ok(disassemble(&Program::from_file(file)?)),
        Command::Amplify { file, feedback } => {
            cmd_amplify(&Program::from_file(file)?, *feedback, &config)
        }
        Command::Paint { file, start } => {
            let grid = hull::paint_hull(&Program::from_file(file)?, (*start).into(), &config)?;
            Ok(format!("{} panels painted\n{}", grid.painted(), grid.render()))
        }
        Command::Arcade { file, quarters } => {
            let screen = arcade::play(&Program::from_file(file)?, *quarters, &config)?;
            Ok(format!(
                "{}\nblocks: {}\nscore: {}",
                screen.render(),
                screen.block_count(),
                screen.score()
            ))
        }
        Command::Ascii { file } => {
            let feed = ascii::capture(&Program::from_file(file)?, &[], &config)?;
            let mut report = feed.render();
            write!(report, "\nalignment parameter: {}", feed.alignment_parameter()).ok();
            if let Some(value) = feed.report() {
                write!(report, "\nreport: {}", value).ok();
            }
            Ok(report)
        }
        Command::Droid { file } => {
            let map = droid::explore(&Program::from_file(file)?, &config)?;
            let mut report = map.render();
            match map.oxygen_system() {
                Some(oxygen) => {
                    let moves = map.distance(Coord::ORIGIN, oxygen);
                    write!(report, "\noxygen system at {}", oxygen).ok();
                    if let Some(moves) = moves {
                        write!(report, ", {} moves from the start", moves).ok();
                    }
                }
                None => report.push_str("\nno oxygen system found"),
            }
            Ok(report)
        }
    }
}

fn cmd_run(program: &Program, inputs: &[Word], config: &RuntimeConfig) -> Result<String, CliError> {
    let output = if config.debug {
        let mut machine = vmm::Machine::new(program).with_label("main").with_debug(true);
        let mut input = vmm::Tape::from(inputs.to_vec());
        let mut output = vmm::Tape::new();
        machine.run(&mut input, &mut output)?;
        output.drain()
    } else {
        vmm::run_program(program, inputs)?
    };
    Ok(output
        .iter()
        .map(Word::to_string)
        .collect::<Vec<_>>()
        .join(","))
}

fn cmd_amplify(program: &Program, feedback: bool, config: &RuntimeConfig) -> Result<String, CliError> {
    let best = if feedback {
        best_phase_sequence(&[5, 6, 7, 8, 9], |phases| {
            run_feedback_loop(program, phases, 0, config)
        })?
    } else {
        best_phase_sequence(&[0, 1, 2, 3, 4], |phases| run_chain(program, phases, 0, config))?
    };
    let (phases, signal) = best.ok_or(CliError::NoSignal)?;
    let phases: Vec<String> = phases.iter().map(Word::to_string).collect();
    Ok(format!("phases {} -> signal {}", phases.join(","), signal))
}
