//! Arcade cabinet
//!
//! The game emits `(x, y, tile)` triples; `(-1, 0, score)` updates the score display.
//! The joystick is read whenever the game asks for input and holds its last tilt.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, info, warn};
use vmm::topology::run_device;
use vmm::{Channel, Program, RuntimeConfig, Transform, Word};

use crate::geometry::Coord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tile {
    Empty,
    Wall,
    Block,
    Paddle,
    Ball,
}

impl Tile {
    fn glyph(self) -> char {
        match self {
            Tile::Empty => ' ',
            Tile::Wall => '|',
            Tile::Block => '#',
            Tile::Paddle => '_',
            Tile::Ball => 'o',
        }
    }
}

impl TryFrom<Word> for Tile {
    type Error = Word;

    fn try_from(id: Word) -> Result<Self, Word> {
        match id {
            0 => Ok(Tile::Empty),
            1 => Ok(Tile::Wall),
            2 => Ok(Tile::Block),
            3 => Ok(Tile::Paddle),
            4 => Ok(Tile::Ball),
            other => Err(other),
        }
    }
}

#[derive(Debug, Default)]
struct Board {
    tiles: HashMap<Coord, Tile>,
    score: Word,
    ball: Option<Coord>,
    paddle: Option<Coord>,
}

/// What the cabinet has drawn so far. Clones share the same display.
#[derive(Debug, Clone, Default)]
pub struct Screen {
    board: Arc<Mutex<Board>>,
}

impl Screen {
    pub fn new() -> Self {
        Self::default()
    }

    fn board(&self) -> MutexGuard<'_, Board> {
        self.board.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn tile_at(&self, pos: Coord) -> Tile {
        self.board()
            .tiles
            .get(&pos)
            .copied()
            .unwrap_or(Tile::Empty)
    }

    pub fn score(&self) -> Word {
        self.board().score
    }

    pub fn block_count(&self) -> usize {
        self.board()
            .tiles
            .values()
            .filter(|tile| **tile == Tile::Block)
            .count()
    }

    pub fn ball(&self) -> Option<Coord> {
        self.board().ball
    }

    pub fn paddle(&self) -> Option<Coord> {
        self.board().paddle
    }

    pub fn render(&self) -> String {
        let board = self.board();
        let width = board.tiles.keys().map(|c| c.x).max().unwrap_or(-1) + 1;
        let height = board.tiles.keys().map(|c| c.y).max().unwrap_or(-1) + 1;
        let mut rows = vec![format!("score: {}", board.score)];
        for y in 0..height {
            let row: String = (0..width)
                .map(|x| {
                    board
                        .tiles
                        .get(&Coord::new(x, y))
                        .copied()
                        .unwrap_or(Tile::Empty)
                        .glyph()
                })
                .collect();
            rows.push(row.trim_end().to_string());
        }
        rows.join("\n")
    }
}

/// Joystick position: `-1` left, `0` neutral, `1` right
#[derive(Debug, Clone, Default)]
pub struct Joystick {
    tilt: Arc<AtomicI64>,
}

impl Joystick {
    pub const LEFT: Word = -1;
    pub const NEUTRAL: Word = 0;
    pub const RIGHT: Word = 1;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn tilt(&self) -> Word {
        self.tilt.load(Ordering::SeqCst)
    }

    pub fn set_tilt(&self, tilt: Word) {
        self.tilt.store(tilt.signum(), Ordering::SeqCst);
    }
}

impl Channel for Joystick {
    fn take(&mut self) -> vmm::Result<Word> {
        Ok(self.tilt())
    }

    fn put(&mut self, value: Word) -> vmm::Result<()> {
        self.set_tilt(value);
        Ok(())
    }

    fn poll(&mut self, _timeout: Duration) -> vmm::Result<Option<Word>> {
        Ok(Some(self.tilt()))
    }
}

/// Decodes game output onto a [`Screen`] and steers the paddle under the ball.
///
/// Every ball or paddle move is answered with a tilt once both are on screen;
/// the device loop delivers it to the [`Joystick`] before the game's next read.
#[derive(Debug)]
pub struct Cabinet {
    screen: Screen,
    pending: Vec<Word>,
}

impl Cabinet {
    pub fn new(screen: Screen) -> Self {
        Cabinet {
            screen,
            pending: Vec::with_capacity(3),
        }
    }

    fn draw(&mut self, x: Word, y: Word, id: Word) -> Option<Word> {
        let mut board = self.screen.board();
        if (x, y) == (-1, 0) {
            debug!("score {}", id);
            board.score = id;
            return None;
        }
        let tile = match Tile::try_from(id) {
            Ok(tile) => tile,
            Err(id) => {
                warn!("ignoring unknown tile id {} at [{},{}]", id, x, y);
                return None;
            }
        };
        let pos = Coord::new(x, y);
        board.tiles.insert(pos, tile);
        match tile {
            Tile::Ball => board.ball = Some(pos),
            Tile::Paddle => board.paddle = Some(pos),
            _ => return None,
        }
        let (ball, paddle) = (board.ball?, board.paddle?);
        let blocks_left = board.tiles.values().any(|t| *t == Tile::Block);
        if blocks_left {
            Some((ball.x - paddle.x).signum())
        } else {
            Some(Joystick::NEUTRAL)
        }
    }
}

impl Transform for Cabinet {
    fn apply(&mut self, value: Word) -> Option<Word> {
        self.pending.push(value);
        if self.pending.len() < 3 {
            return None;
        }
        let (x, y, id) = (self.pending[0], self.pending[1], self.pending[2]);
        self.pending.clear();
        self.draw(x, y, id)
    }
}

/// Run a game to completion. With `quarters`, address 0 is patched first to play
/// for free.
pub fn play(program: &[Word], quarters: Option<Word>, config: &RuntimeConfig) -> vmm::Result<Screen> {
    let mut program = Program::new(program.to_vec());
    if let Some(quarters) = quarters {
        program = program.patch(0, quarters);
    }
    let screen = Screen::new();
    run_device("game", &program, Joystick::new(), Cabinet::new(screen.clone()), config)?;
    info!(
        "game over: score {}, {} blocks left",
        screen.score(),
        screen.block_count()
    );
    Ok(screen)
}
