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

//! File format codecs.
//!
//! Maps read `.png` (16 bit grayscale with embedded JSON metadata) and
//! `.grd` (ASCII grids, e.g. EGM96 undulations); only `.png` can be
//! written back. Tile stacks read 16 bit GeoTIFF (ASTER GDEM2, SRTM) and
//! raw `.hgt` (SRTM binary) cells.
//!
//! All decoded grids are row-major with row 0 at the southern edge;
//! codecs whose on-disk order starts at the north flip their rows.

pub(crate) mod geotiff16;
pub(crate) mod grd;
pub(crate) mod hgt;
pub(crate) mod png16;

use crate::projection::Projection;

/// A decoded map file: quantised samples plus the grid geometry.
pub(crate) struct RawMap {
    pub nx: usize,
    pub ny: usize,
    pub x: [f64; 2],
    pub y: [f64; 2],
    pub z: [f64; 2],
    pub data: Vec<u16>,
    pub projection: Option<Projection>,
}

/// A decoded tile payload: raw elevations in metres. The geographic
/// footprint comes from the tile's integer-degree key, not the file.
#[derive(Debug)]
pub(crate) struct RawTile {
    pub nx: usize,
    pub ny: usize,
    pub data: Vec<i16>,
}
