//! Repair droid
//!
//! The droid reads a movement command (1 north, 2 south, 3 west, 4 east) and
//! answers with a status: 0 hit a wall, 1 moved, 2 moved and found the oxygen
//! system. The controller maps the area by always heading for the least visited
//! open neighbour, and closes the command line once every reachable cell has been
//! seen.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};
use vmm::topology::run_device;
use vmm::{RuntimeConfig, Transform, VmError, Wire, Word};

use crate::geometry::{Coord, Heading};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cell {
    Wall,
    Open,
    OxygenSystem,
}

impl Cell {
    fn glyph(self) -> char {
        match self {
            Cell::Wall => '#',
            Cell::Open => '.',
            Cell::OxygenSystem => '$',
        }
    }
}

/// Movement command understood by the droid
pub fn command(heading: Heading) -> Word {
    match heading {
        Heading::North => 1,
        Heading::South => 2,
        Heading::West => 3,
        Heading::East => 4,
    }
}

/// Neighbour order used for exploration
const SCAN: [Heading; 4] = [Heading::North, Heading::West, Heading::South, Heading::East];

#[derive(Debug, Default)]
struct Survey {
    cells: HashMap<Coord, Cell>,
    visits: HashMap<Coord, u32>,
    complete: bool,
}

impl Survey {
    fn is_wall(&self, pos: Coord) -> bool {
        self.cells.get(&pos) == Some(&Cell::Wall)
    }

    fn fully_explored(&self) -> bool {
        self.cells
            .iter()
            .filter(|(_, cell)| **cell != Cell::Wall)
            .all(|(pos, _)| pos.neighbours().iter().all(|n| self.cells.contains_key(n)))
    }

    fn visit(&mut self, pos: Coord) {
        *self.visits.entry(pos).or_insert(0) += 1;
    }

    /// Least visited passable neighbour; the last one scanned wins ties
    fn next_heading(&self, pos: Coord) -> Option<Heading> {
        let mut best: Option<(Heading, u32)> = None;
        for heading in SCAN {
            let next = pos + heading.step();
            if self.is_wall(next) {
                continue;
            }
            let visits = self.visits.get(&next).copied().unwrap_or(0);
            if best.is_none_or(|(_, fewest)| visits <= fewest) {
                best = Some((heading, visits));
            }
        }
        best.map(|(heading, _)| heading)
    }
}

/// What the droid has found so far. Clones share the same map.
#[derive(Debug, Clone)]
pub struct MazeMap {
    survey: Arc<Mutex<Survey>>,
}

impl MazeMap {
    /// A map whose only known cell is the open starting point
    pub fn new() -> Self {
        let mut survey = Survey::default();
        survey.cells.insert(Coord::ORIGIN, Cell::Open);
        survey.visit(Coord::ORIGIN);
        MazeMap {
            survey: Arc::new(Mutex::new(survey)),
        }
    }

    fn survey(&self) -> MutexGuard<'_, Survey> {
        self.survey.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn cell_at(&self, pos: Coord) -> Option<Cell> {
        self.survey().cells.get(&pos).copied()
    }

    /// Cells whose content is known, walls included
    pub fn known(&self) -> usize {
        self.survey().cells.len()
    }

    pub fn is_complete(&self) -> bool {
        self.survey().complete
    }

    pub fn oxygen_system(&self) -> Option<Coord> {
        self.survey()
            .cells
            .iter()
            .find(|(_, cell)| **cell == Cell::OxygenSystem)
            .map(|(pos, _)| *pos)
    }

    /// Fewest moves between two known open cells, walking only known cells
    pub fn distance(&self, from: Coord, to: Coord) -> Option<usize> {
        let survey = self.survey();
        let passable = |pos: &Coord| matches!(survey.cells.get(pos), Some(Cell::Open | Cell::OxygenSystem));
        if !passable(&from) {
            return None;
        }
        let mut seen: HashMap<Coord, usize> = HashMap::from([(from, 0)]);
        let mut queue = VecDeque::from([from]);
        while let Some(pos) = queue.pop_front() {
            let steps = seen[&pos];
            if pos == to {
                return Some(steps);
            }
            for next in pos.neighbours() {
                if passable(&next) && !seen.contains_key(&next) {
                    seen.insert(next, steps + 1);
                    queue.push_back(next);
                }
            }
        }
        None
    }

    /// Known cells as rows, with the start marked `S`
    pub fn render(&self) -> String {
        let survey = self.survey();
        let (Some(x_min), Some(x_max)) = (
            survey.cells.keys().map(|c| c.x).min(),
            survey.cells.keys().map(|c| c.x).max(),
        ) else {
            return String::new();
        };
        let y_min = survey.cells.keys().map(|c| c.y).min().unwrap_or(0);
        let y_max = survey.cells.keys().map(|c| c.y).max().unwrap_or(0);
        (y_min..=y_max)
            .map(|y| {
                (x_min..=x_max)
                    .map(|x| {
                        let pos = Coord::new(x, y);
                        match survey.cells.get(&pos) {
                            _ if pos == Coord::ORIGIN => 'S',
                            Some(cell) => cell.glyph(),
                            None => ' ',
                        }
                    })
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for MazeMap {
    fn default() -> Self {
        Self::new()
    }
}

/// Explores with the droid: each status reply is answered with the next move
#[derive(Debug)]
pub struct DroidController {
    map: MazeMap,
    commands: Wire,
    pos: Coord,
    moving: Option<Heading>,
}

impl DroidController {
    /// `commands` is the droid's input; it is closed when exploration ends
    pub fn new(map: MazeMap, commands: Wire) -> Self {
        DroidController {
            map,
            commands,
            pos: Coord::ORIGIN,
            moving: None,
        }
    }

    pub fn position(&self) -> Coord {
        self.pos
    }

    /// Pick the next move, or finish the survey when nothing is left to see
    pub fn next_command(&mut self) -> Option<Word> {
        let mut survey = self.map.survey();
        let heading = if survey.fully_explored() {
            None
        } else {
            survey.next_heading(self.pos)
        };
        match heading {
            Some(heading) => {
                self.moving = Some(heading);
                Some(command(heading))
            }
            None => {
                survey.complete = true;
                info!("droid survey complete: {} cells known", survey.cells.len());
                drop(survey);
                self.moving = None;
                self.commands.close();
                None
            }
        }
    }
}

impl Transform for DroidController {
    fn apply(&mut self, status: Word) -> Option<Word> {
        let Some(heading) = self.moving.take() else {
            warn!("droid status {} without a pending move", status);
            return None;
        };
        let target = self.pos + heading.step();
        {
            let mut survey = self.map.survey();
            let cell = match status {
                0 => Cell::Wall,
                1 => Cell::Open,
                2 => Cell::OxygenSystem,
                other => {
                    warn!("unknown droid status {}, treating as wall", other);
                    Cell::Wall
                }
            };
            survey.cells.insert(target, cell);
            if cell != Cell::Wall {
                self.pos = target;
                survey.visit(target);
            }
        }
        debug!("droid {:?} -> status {}, now at {}", heading, status, self.pos);
        self.next_command()
    }
}

/// Map everything reachable from the droid's starting point
pub fn explore(program: &[Word], config: &RuntimeConfig) -> vmm::Result<MazeMap> {
    let map = MazeMap::new();
    let commands = Wire::new();
    let mut controller = DroidController::new(map.clone(), commands.clone());
    if let Some(first) = controller.next_command() {
        commands.push(first);
    }
    match run_device("droid", program, commands, controller, config) {
        Ok(_) => Ok(map),
        // the controller hangs up on the droid once the survey is done
        Err(VmError::ChannelNotConnected) if map.is_complete() => Ok(map),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const MAZE: [&str; 5] = [
        "######",
        "#S..$#",
        "#.##.#",
        "#....#",
        "######",
    ];

    /// Answer droid commands against `MAZE`
    struct Simulator {
        pos: Coord,
    }

    impl Simulator {
        fn new() -> Self {
            Simulator { pos: Coord::new(1, 1) }
        }

        fn step(&mut self, cmd: Word) -> Word {
            let heading = match cmd {
                1 => Heading::North,
                2 => Heading::South,
                3 => Heading::West,
                _ => Heading::East,
            };
            let next = self.pos + heading.step();
            match MAZE[next.y as usize].as_bytes()[next.x as usize] {
                b'#' => 0,
                b'$' => {
                    self.pos = next;
                    2
                }
                _ => {
                    self.pos = next;
                    1
                }
            }
        }
    }

    #[test]
    fn test_controller_maps_whole_maze() {
        let map = MazeMap::new();
        let mut controller = DroidController::new(map.clone(), Wire::new());
        let mut droid = Simulator::new();
        let mut cmd = controller.next_command();
        let mut moves = 0;
        while let Some(c) = cmd {
            moves += 1;
            assert!(moves < 500, "exploration does not terminate");
            cmd = controller.apply(droid.step(c));
        }
        assert!(map.is_complete());
        assert_eq!(map.oxygen_system(), Some(Coord::new(3, 0)));
        assert_eq!(map.distance(Coord::ORIGIN, Coord::new(3, 0)), Some(3));
        assert_eq!(map.cell_at(Coord::new(0, 1)), Some(Cell::Open));
        assert_eq!(map.cell_at(Coord::new(1, 1)), Some(Cell::Wall));
        // corners touch no open cell, so they are never tried
        assert_eq!(
            map.render(),
            [" #### ", "#S..$#", "#.##.#", "#....#", " #### "].join("\n")
        );
    }

    #[test]
    fn test_walled_in_droid() {
        // the droid answers "wall" to every command
        let program = [3, 100, 104, 0, 1105, 1, 0];
        let config = RuntimeConfig::default().with_poll_interval(Duration::from_millis(5));
        let map = explore(&program, &config).unwrap();
        assert!(map.is_complete());
        assert_eq!(map.known(), 5);
        assert_eq!(map.oxygen_system(), None);
        assert_eq!(map.render(), " # \n#S#\n # ");
    }

    #[test]
    fn test_commands() {
        assert_eq!(command(Heading::North), 1);
        assert_eq!(command(Heading::South), 2);
        assert_eq!(command(Heading::West), 3);
        assert_eq!(command(Heading::East), 4);
    }
}
