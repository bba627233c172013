//! Devices - peripherals for intcode processors
//!
//! Each device is a [`vmm::Transform`]: it consumes the values a processor emits,
//! updates its own state, and optionally replies with the next value the processor
//! should read. Running one is a matter of handing it to
//! [`vmm::topology::run_device`].

pub mod arcade;
pub mod ascii;
pub mod droid;
pub mod geometry;
pub mod hull;

pub use arcade::{Cabinet, Joystick, Screen, Tile};
pub use ascii::CameraFeed;
pub use droid::{Cell, DroidController, MazeMap};
pub use geometry::{Coord, Heading};
pub use hull::{Color, HullRobot, PaintGrid};
