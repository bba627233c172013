//! Hull painting robot
//!
//! The robot's brain emits pairs `(color, turn)`: paint the panel under the robot,
//! turn left (`0`) or right (`1`), step forward. After every move the camera
//! replies with the color of the new panel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, warn};
use vmm::topology::run_device;
use vmm::{RuntimeConfig, Transform, Wire, Word};

use crate::geometry::{Coord, Heading};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Color {
    #[default]
    Black,
    White,
}

impl Color {
    pub fn word(self) -> Word {
        match self {
            Color::Black => 0,
            Color::White => 1,
        }
    }

    pub fn from_word(word: Word) -> Color {
        match word {
            0 => Color::Black,
            1 => Color::White,
            other => {
                warn!("unexpected paint color {}, using white", other);
                Color::White
            }
        }
    }

    fn glyph(self) -> char {
        match self {
            Color::Black => '.',
            Color::White => '#',
        }
    }
}

/// Panels painted so far. Clones share the same grid.
#[derive(Debug, Clone, Default)]
pub struct PaintGrid {
    panels: Arc<Mutex<HashMap<Coord, Color>>>,
}

impl PaintGrid {
    pub fn new() -> Self {
        Self::default()
    }

    fn panels(&self) -> MutexGuard<'_, HashMap<Coord, Color>> {
        self.panels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Unpainted panels are black
    pub fn color_at(&self, pos: Coord) -> Color {
        self.panels().get(&pos).copied().unwrap_or_default()
    }

    pub fn paint(&self, pos: Coord, color: Color) {
        self.panels().insert(pos, color);
    }

    /// Panels painted at least once
    pub fn painted(&self) -> usize {
        self.panels().len()
    }

    pub fn snapshot(&self) -> HashMap<Coord, Color> {
        self.panels().clone()
    }

    /// Rows of `#` (white) and `.` (black) covering every painted panel
    pub fn render(&self) -> String {
        let panels = self.panels();
        let (Some(x_min), Some(x_max)) = (
            panels.keys().map(|c| c.x).min(),
            panels.keys().map(|c| c.x).max(),
        ) else {
            return String::new();
        };
        let y_min = panels.keys().map(|c| c.y).min().unwrap_or(0);
        let y_max = panels.keys().map(|c| c.y).max().unwrap_or(0);

        let mut rows = Vec::new();
        for y in y_min..=y_max {
            let row: String = (x_min..=x_max)
                .map(|x| {
                    panels
                        .get(&Coord::new(x, y))
                        .copied()
                        .unwrap_or_default()
                        .glyph()
                })
                .collect();
            rows.push(row);
        }
        rows.join("\n")
    }
}

/// Mover half of the robot: applies paint-and-move commands to a shared grid
#[derive(Debug)]
pub struct HullRobot {
    grid: PaintGrid,
    pos: Coord,
    heading: Heading,
    color: Option<Color>,
}

impl HullRobot {
    pub fn new(grid: PaintGrid) -> Self {
        HullRobot {
            grid,
            pos: Coord::ORIGIN,
            heading: Heading::North,
            color: None,
        }
    }

    pub fn position(&self) -> Coord {
        self.pos
    }

    pub fn heading(&self) -> Heading {
        self.heading
    }
}

impl Transform for HullRobot {
    fn apply(&mut self, value: Word) -> Option<Word> {
        let Some(color) = self.color.take() else {
            self.color = Some(Color::from_word(value));
            return None;
        };
        self.grid.paint(self.pos, color);
        self.heading = if value == 0 {
            self.heading.left()
        } else {
            self.heading.right()
        };
        self.pos = self.pos + self.heading.step();
        let under = self.grid.color_at(self.pos);
        debug!(
            "robot painted {:?}, now at {} facing {:?} over {:?}",
            color, self.pos, self.heading, under
        );
        Some(under.word())
    }
}

/// Run a robot brain over a fresh hull whose starting panel has `start` color
pub fn paint_hull(program: &[Word], start: Color, config: &RuntimeConfig) -> vmm::Result<PaintGrid> {
    let grid = PaintGrid::new();
    if start == Color::White {
        grid.paint(Coord::ORIGIN, Color::White);
    }
    let camera = Wire::new();
    camera.push(start.word());
    run_device("brain", program, camera, HullRobot::new(grid.clone()), config)?;
    debug!("hull robot painted {} panels", grid.painted());
    Ok(grid)
}
