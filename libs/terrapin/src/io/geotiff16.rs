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

//! 16 bit GeoTIFF tiles, as distributed for ASTER GDEM2 and SRTM.
//!
//! Only the sample payload is read; the geographic footprint of a tile is
//! fixed by its integer-degree key. Reading only.

use super::RawTile;
use crate::error::{raise, ErrorKind, Result};
use std::{fs::File, io::BufReader, path::Path};
use tiff::decoder::{Decoder, DecodingResult};

pub(crate) fn load(path: &Path, function: &'static str) -> Result<RawTile> {
    let file = File::open(path).map_err(|what| {
        raise(
            ErrorKind::PathError,
            function,
            format!("could not open file `{}' ({})", path.display(), what),
        )
    })?;

    let bad_format = |what: String| {
        raise(
            ErrorKind::BadFormat,
            function,
            format!("invalid geotiff file `{}' ({})", path.display(), what),
        )
    };

    let mut decoder =
        Decoder::new(BufReader::new(file)).map_err(|what| bad_format(what.to_string()))?;
    let (width, height) = decoder
        .dimensions()
        .map_err(|what| bad_format(what.to_string()))?;
    let nx = width as usize;
    let ny = height as usize;
    if (nx < 2) || (ny < 2) {
        return Err(bad_format("empty image".to_owned()));
    }

    let flat: Vec<i16> = match decoder
        .read_image()
        .map_err(|what| bad_format(what.to_string()))?
    {
        DecodingResult::I16(samples) => samples,
        // ASTER ships signed data but some SRTM conversions tag it
        // unsigned; the bit patterns are what matters.
        DecodingResult::U16(samples) => samples.iter().map(|&s| s as i16).collect(),
        _ => return Err(bad_format("not a 16 bit image".to_owned())),
    };
    if flat.len() != nx * ny {
        return Err(bad_format("truncated image".to_owned()));
    }

    // Scanlines run from the north; the grid starts at the south.
    let mut data = vec![0_i16; nx * ny];
    for iy in 0..ny {
        data[iy * nx..(iy + 1) * nx].copy_from_slice(&flat[(ny - 1 - iy) * nx..(ny - iy) * nx]);
    }

    Ok(RawTile { nx, ny, data })
}
