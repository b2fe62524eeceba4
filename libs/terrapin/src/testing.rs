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

//! Shared fixtures for the test suite.

use crate::stack::TileFormat;
use std::path::Path;

/// Write an `n x n` SRTM style tile for the cell `(latitude, longitude)`,
/// with samples produced by `elevation(ix, iy)` on the south-first grid.
pub(crate) fn write_hgt_tile<F>(directory: &Path, latitude: i32, longitude: i32, n: usize, elevation: F)
where
    F: Fn(usize, usize) -> i16,
{
    let filename = TileFormat::SrtmHgt
        .filename(latitude, longitude, "write_hgt_tile")
        .unwrap();
    let mut bytes = Vec::with_capacity(2 * n * n);
    for iy in (0..n).rev() {
        for ix in 0..n {
            bytes.extend_from_slice(&elevation(ix, iy).to_be_bytes());
        }
    }
    std::fs::write(directory.join(filename), &bytes).unwrap();
}
