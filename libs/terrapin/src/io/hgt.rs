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

//! Raw SRTM `.hgt` tiles: a bare square of big-endian 16 bit samples,
//! northern row first. The side is not recorded in the file; it follows
//! from the size (1201 for SRTM3, 3601 for SRTM1). Reading only.

use super::RawTile;
use crate::error::{raise, ErrorKind, Result};
use memmap::Mmap;
use std::{fs::File, path::Path};

pub(crate) fn load(path: &Path, function: &'static str) -> Result<RawTile> {
    let file = File::open(path).map_err(|what| {
        raise(
            ErrorKind::PathError,
            function,
            format!("could not open file `{}' ({})", path.display(), what),
        )
    })?;

    let bad_format = |what: &str| {
        raise(
            ErrorKind::BadFormat,
            function,
            format!("invalid hgt file `{}' ({})", path.display(), what),
        )
    };

    let mmap = unsafe { Mmap::map(&file) }.map_err(|_| bad_format("could not map"))?;
    if mmap.len() % 2 != 0 {
        return Err(bad_format("odd size"));
    }
    let count = mmap.len() / 2;
    let n = (count as f64).sqrt().round() as usize;
    if (n < 2) || (n * n != count) {
        return Err(bad_format("not a square grid"));
    }

    // Rows run from the north; the grid starts at the south.
    let mut data = vec![0_i16; count];
    for iy in 0..n {
        let row = &mmap[(n - 1 - iy) * 2 * n..(n - iy) * 2 * n];
        for (ix, sample) in row.chunks_exact(2).enumerate() {
            data[iy * n + ix] = i16::from_be_bytes([sample[0], sample[1]]);
        }
    }

    Ok(RawTile {
        nx: n,
        ny: n,
        data,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_hgt_load() {
        crate::error::set_handler(None);
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("N45E003.hgt");

        // A 3x3 tile, northern row first on disk.
        let mut bytes = Vec::new();
        for sample in [600_i16, 700, 800, 300, 400, 500, 0, 100, -200] {
            bytes.extend_from_slice(&sample.to_be_bytes());
        }
        std::fs::write(&path, &bytes).unwrap();

        let tile = load(&path, "test").unwrap();
        assert_eq!((tile.nx, tile.ny), (3, 3));
        assert_eq!(tile.data, vec![0, 100, -200, 300, 400, 500, 600, 700, 800]);
    }

    #[test]
    fn test_hgt_errors() {
        crate::error::set_handler(None);
        let directory = tempfile::tempdir().unwrap();

        let error = load(&directory.path().join("N00E000.hgt"), "test").unwrap_err();
        assert_eq!(error.kind(), crate::ErrorKind::PathError);

        let ragged = directory.path().join("N45E004.hgt");
        std::fs::write(&ragged, &[0_u8; 10]).unwrap();
        let error = load(&ragged, "test").unwrap_err();
        assert_eq!(error.kind(), crate::ErrorKind::BadFormat);
    }
}
