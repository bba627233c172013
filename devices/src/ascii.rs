//! ASCII-speaking units: the camera prints its view of the scaffold as text,
//! one character per output value, rows separated by newline (10).

use log::debug;
use vmm::{Processor, RuntimeConfig, Tape, Word};

use crate::geometry::{Coord, Heading};

const NEWLINE: Word = 10;

/// Snapshot of the scaffold as reported by the camera
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CameraFeed {
    rows: Vec<Vec<u8>>,
    report: Option<Word>,
}

impl CameraFeed {
    /// Decode camera output. A value outside the ASCII range is a numeric report
    /// rather than part of the picture.
    pub fn decode(output: &[Word]) -> Self {
        let mut feed = CameraFeed::default();
        let mut row = Vec::new();
        for &value in output {
            match u8::try_from(value) {
                Ok(b'\n') => {
                    if !row.is_empty() {
                        feed.rows.push(std::mem::take(&mut row));
                    }
                }
                Ok(ch) if ch.is_ascii() => row.push(ch),
                _ => feed.report = Some(value),
            }
        }
        if !row.is_empty() {
            feed.rows.push(row);
        }
        feed
    }

    pub fn rows(&self) -> usize {
        self.rows.len()
    }

    pub fn report(&self) -> Option<Word> {
        self.report
    }

    pub fn at(&self, pos: Coord) -> Option<u8> {
        let y = usize::try_from(pos.y).ok()?;
        let x = usize::try_from(pos.x).ok()?;
        self.rows.get(y)?.get(x).copied()
    }

    pub fn is_scaffold(&self, pos: Coord) -> bool {
        matches!(self.at(pos), Some(b'#' | b'^' | b'v' | b'<' | b'>'))
    }

    /// Where the vacuum robot stands and which way it faces
    pub fn robot(&self) -> Option<(Coord, Heading)> {
        self.cells().find_map(|(pos, ch)| {
            let heading = match ch {
                b'^' => Heading::North,
                b'>' => Heading::East,
                b'v' => Heading::South,
                b'<' => Heading::West,
                _ => return None,
            };
            Some((pos, heading))
        })
    }

    /// Scaffold cells whose four neighbours are all scaffold
    pub fn scaffold_intersections(&self) -> Vec<Coord> {
        self.cells()
            .map(|(pos, _)| pos)
            .filter(|pos| {
                self.is_scaffold(*pos) && pos.neighbours().iter().all(|n| self.is_scaffold(*n))
            })
            .collect()
    }

    /// Sum of `x * y` over every intersection
    pub fn alignment_parameter(&self) -> i64 {
        self.scaffold_intersections()
            .iter()
            .map(|pos| pos.x * pos.y)
            .sum()
    }

    pub fn render(&self) -> String {
        self.rows
            .iter()
            .map(|row| String::from_utf8_lossy(row).into_owned())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn cells(&self) -> impl Iterator<Item = (Coord, u8)> + '_ {
        self.rows.iter().enumerate().flat_map(|(y, row)| {
            row.iter()
                .enumerate()
                .map(move |(x, ch)| (Coord::new(x as i64, y as i64), *ch))
        })
    }
}

/// Text as program input, newline terminated
pub fn encode_line(line: &str) -> Vec<Word> {
    line.bytes()
        .map(Word::from)
        .chain(std::iter::once(NEWLINE))
        .collect()
}

/// Run a camera program to completion and decode everything it printed.
/// `input` lines are typed in up front; reading past them is
/// [`vmm::VmError::InputExhausted`].
pub fn capture(program: &[Word], input: &[&str], config: &RuntimeConfig) -> vmm::Result<CameraFeed> {
    let keyboard: Tape = input.iter().flat_map(|line| encode_line(line)).collect();
    let screen = Tape::new();
    let mut unit = Processor::new("ascii", program, keyboard, screen.clone(), config.debug);
    unit.start();
    unit.join()?;
    let output = screen.drain();
    debug!("camera printed {} values", output.len());
    Ok(CameraFeed::decode(&output))
}
