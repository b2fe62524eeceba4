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

//! One 1°×1° cell of global elevation data.

use crate::io::RawTile;
use std::sync::atomic::{AtomicI32, Ordering};

/// A tile owned by a [`Stack`](crate::Stack), covering exactly
/// `[longitude, longitude + 1] × [latitude, latitude + 1]` degrees.
///
/// The sample payload is immutable after load. The pin count tracks how
/// many clients currently reserve the tile; it is only ever updated under
/// the owning stack's lock.
#[derive(Debug)]
pub struct Tile {
    latitude: i32,
    longitude: i32,
    nx: usize,
    ny: usize,
    dx: f64,
    dy: f64,
    data: Vec<i16>,
    clients: AtomicI32,
}

impl Tile {
    pub(crate) fn new(latitude: i32, longitude: i32, raw: RawTile) -> Self {
        Self {
            latitude,
            longitude,
            nx: raw.nx,
            ny: raw.ny,
            dx: 1.0 / (raw.nx - 1) as f64,
            dy: 1.0 / (raw.ny - 1) as f64,
            data: raw.data,
            clients: AtomicI32::new(0),
        }
    }

    /// The southern edge of the tile, in degrees.
    pub fn latitude(&self) -> i32 {
        self.latitude
    }

    /// The western edge of the tile, in degrees.
    pub fn longitude(&self) -> i32 {
        self.longitude
    }

    /// Number of clients currently pinning this tile.
    pub fn clients(&self) -> i32 {
        self.clients.load(Ordering::Relaxed)
    }

    pub(crate) fn key(&self) -> (i32, i32) {
        (self.latitude, self.longitude)
    }

    pub(crate) fn pin(&self) {
        self.clients.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop one pin; `None` flags an underflow, with the count clamped
    /// back to zero.
    pub(crate) fn unpin(&self) -> Option<i32> {
        let count = self.clients.load(Ordering::Relaxed) - 1;
        if count < 0 {
            self.clients.store(0, Ordering::Relaxed);
            None
        } else {
            self.clients.store(count, Ordering::Relaxed);
            Some(count)
        }
    }

    /// Bilinear interpolation at geodetic coordinates, or `None` when the
    /// point lies outside of the tile.
    pub(crate) fn interpolate(&self, latitude: f64, longitude: f64) -> Option<f64> {
        let hx = (longitude - f64::from(self.longitude)) / self.dx;
        let hy = (latitude - f64::from(self.latitude)) / self.dy;
        if !(hx >= 0.0)
            || !(hx <= (self.nx - 1) as f64)
            || !(hy >= 0.0)
            || !(hy <= (self.ny - 1) as f64)
        {
            return None;
        }

        let ix = (hx.floor() as usize).min(self.nx - 2);
        let iy = (hy.floor() as usize).min(self.ny - 2);
        let fx = hx - ix as f64;
        let fy = hy - iy as f64;

        let z = |ix: usize, iy: usize| f64::from(self.data[iy * self.nx + ix]);
        Some(
            z(ix, iy) * (1.0 - fx) * (1.0 - fy)
                + z(ix, iy + 1) * (1.0 - fx) * fy
                + z(ix + 1, iy) * fx * (1.0 - fy)
                + z(ix + 1, iy + 1) * fx * fy,
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn tile() -> Tile {
        // A 3x3 ramp rising to the north-east.
        Tile::new(
            45,
            3,
            RawTile {
                nx: 3,
                ny: 3,
                data: vec![0, 10, 20, 100, 110, 120, 200, 210, 220],
            },
        )
    }

    #[test]
    fn test_tile_interpolation() {
        let tile = tile();
        assert_abs_diff_eq!(tile.interpolate(45.0, 3.0).unwrap(), 0.0);
        assert_abs_diff_eq!(tile.interpolate(46.0, 4.0).unwrap(), 220.0);
        assert_abs_diff_eq!(tile.interpolate(45.5, 3.5).unwrap(), 110.0);
        assert_abs_diff_eq!(tile.interpolate(45.25, 3.0).unwrap(), 50.0);

        assert!(tile.interpolate(44.999, 3.5).is_none());
        assert!(tile.interpolate(45.5, 4.001).is_none());
    }

    #[test]
    fn test_pin_count() {
        let tile = tile();
        assert_eq!(tile.clients(), 0);
        tile.pin();
        tile.pin();
        assert_eq!(tile.clients(), 2);
        assert_eq!(tile.unpin(), Some(1));
        assert_eq!(tile.unpin(), Some(0));
        assert_eq!(tile.unpin(), None);
        assert_eq!(tile.clients(), 0);
    }
}
