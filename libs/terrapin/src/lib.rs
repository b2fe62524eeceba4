// This file is part of Terrapin.
//
// Terrapin is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Terrapin is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with Terrapin.  If not, see <http://www.gnu.org/licenses/>.

//! Threaded access to geospatial elevation data.
//!
//! The centrepiece is the tile [`Stack`]: a bounded, LRU-ordered cache of
//! 1°×1° elevation tiles shared between worker threads. Each thread talks
//! to the stack through its own [`Client`], which keeps the tile it used
//! last pinned so the cache cannot evict it between queries. A [`Stepper`]
//! composes stacks, single projected [`Map`]s and flat ground into a
//! prioritised terrain oracle sampled directly from ECEF positions, using
//! the WGS84 transforms in [`ecef`].

mod client;
mod error;
mod io;
mod map;
mod projection;
mod stack;
mod stepper;
#[cfg(test)]
mod testing;
mod tile;

pub mod ecef;

pub use client::Client;
pub use error::{set_handler, Error, ErrorKind, Handler, Result};
pub use map::{Map, MapInfo};
pub use projection::{Hemisphere, LambertZone, Projection};
pub use stack::{Locker, Stack, TileFormat};
pub use stepper::{Step, Stepper};
pub use tile::Tile;
