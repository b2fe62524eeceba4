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

//! ASCII elevation grids, e.g. EGM96 geoid undulations.
//!
//! The file is whitespace separated: a `nx ny x0 y0 dx dy z0 z1` header
//! followed by `nx * ny` samples, row-major starting from the southern
//! row. Reading only.

use super::RawMap;
use crate::error::{raise, ErrorKind, Result};
use std::{fs, path::Path};

// Anything larger is assumed to be a corrupt header rather than a grid.
const MAX_SAMPLES: usize = 1 << 28;

pub(crate) fn load(path: &Path) -> Result<RawMap> {
    let content = fs::read_to_string(path).map_err(|what| {
        raise(
            ErrorKind::PathError,
            "Map::load",
            format!("could not open file `{}' ({})", path.display(), what),
        )
    })?;
    let mut tokens = content.split_whitespace();

    let bad_format = |what: &str| {
        raise(
            ErrorKind::BadFormat,
            "Map::load",
            format!("{} in `{}'", what, path.display()),
        )
    };

    let mut header = [0.0; 8];
    for slot in header.iter_mut() {
        *slot = tokens
            .next()
            .and_then(|token| token.parse::<f64>().ok())
            .ok_or_else(|| bad_format("invalid grid header"))?;
    }
    let [nx, ny, x0, y0, dx, dy, z0, z1] = header;
    if (nx.fract() != 0.0) || (ny.fract() != 0.0) || (nx < 2.0) || (ny < 2.0) {
        return Err(bad_format("invalid grid shape"));
    }
    if (dx <= 0.0) || (dy <= 0.0) || (z0 > z1) {
        return Err(bad_format("invalid grid ranges"));
    }
    let nx = nx as usize;
    let ny = ny as usize;
    let size = nx
        .checked_mul(ny)
        .filter(|&size| size <= MAX_SAMPLES)
        .ok_or_else(|| {
            raise(
                ErrorKind::MemoryError,
                "Map::load",
                format!("unreasonable grid size in `{}'", path.display()),
            )
        })?;

    let dz = (z1 - z0) / f64::from(u16::MAX);
    let mut data = Vec::with_capacity(size);
    for _ in 0..size {
        let z = tokens
            .next()
            .and_then(|token| token.parse::<f64>().ok())
            .ok_or_else(|| bad_format("truncated grid data"))?;
        let sample = if dz > 0.0 {
            ((z - z0) / dz).round().clamp(0.0, 65_535.0) as u16
        } else {
            0
        };
        data.push(sample);
    }

    Ok(RawMap {
        nx,
        ny,
        x: [x0, x0 + dx * (nx - 1) as f64],
        y: [y0, y0 + dy * (ny - 1) as f64],
        z: [z0, z1],
        data,
        projection: None,
    })
}
