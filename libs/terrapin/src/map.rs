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

//! Projected elevation maps.
//!
//! A map is a regular grid of elevations over a rectangle, either in
//! projected coordinates or directly in (longitude, latitude). Samples are
//! quantised to 16 bits over the map's elevation range; both grid edges are
//! included, so the step is `(x1 - x0) / (nx - 1)`.

use crate::{
    error::{raise, ErrorKind, Result},
    io,
    projection::Projection,
};
use std::path::Path;

/// The geometry of a map: grid shape, coordinate ranges and elevation
/// range.
#[derive(Clone, Debug, PartialEq)]
pub struct MapInfo {
    pub nx: usize,
    pub ny: usize,
    pub x: [f64; 2],
    pub y: [f64; 2],
    pub z: [f64; 2],
}

#[derive(Debug)]
pub struct Map {
    nx: usize,
    ny: usize,
    x0: f64,
    y0: f64,
    z0: f64,
    dx: f64,
    dy: f64,
    dz: f64,
    x1: f64,
    y1: f64,
    z1: f64,
    data: Vec<u16>,
    projection: Option<Projection>,
}

impl Map {
    /// Create a new map, initialised flat at the bottom of its elevation
    /// range.
    pub fn new(info: &MapInfo, projection: Option<Projection>) -> Result<Self> {
        if (info.nx < 2) || (info.ny < 2) {
            return Err(raise(
                ErrorKind::DomainError,
                "Map::new",
                format!("bad grid shape {}x{}", info.nx, info.ny),
            ));
        }
        if (info.x[0] >= info.x[1]) || (info.y[0] >= info.y[1]) || (info.z[0] > info.z[1]) {
            return Err(raise(
                ErrorKind::DomainError,
                "Map::new",
                "inconsistent coordinate ranges",
            ));
        }

        Ok(Self {
            nx: info.nx,
            ny: info.ny,
            x0: info.x[0],
            y0: info.y[0],
            z0: info.z[0],
            dx: (info.x[1] - info.x[0]) / (info.nx - 1) as f64,
            dy: (info.y[1] - info.y[0]) / (info.ny - 1) as f64,
            dz: (info.z[1] - info.z[0]) / f64::from(u16::MAX),
            x1: info.x[1],
            y1: info.y[1],
            z1: info.z[1],
            data: vec![0; info.nx * info.ny],
            projection,
        })
    }

    /// Load a map from a file. The format is selected by the filename
    /// extension; `.png` and `.grd` are supported.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = match path.extension().and_then(|e| e.to_str()) {
            Some("png") => io::png16::load(path)?,
            Some("grd") => io::grd::load(path)?,
            _ => {
                return Err(raise(
                    ErrorKind::BadExtension,
                    "Map::load",
                    format!("unsupported file format `{}'", path.display()),
                ))
            }
        };

        let mut map = Self::new(
            &MapInfo {
                nx: raw.nx,
                ny: raw.ny,
                x: raw.x,
                y: raw.y,
                z: raw.z,
            },
            raw.projection,
        )?;
        debug_assert_eq!(raw.data.len(), map.nx * map.ny);
        map.data = raw.data;
        Ok(map)
    }

    /// Dump the map to a file. Only the `.png` format can be written.
    pub fn dump<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some("png") => io::png16::dump(path, self),
            Some("grd") => Err(raise(
                ErrorKind::BadFormat,
                "Map::dump",
                "writing is not implemented for the grd format",
            )),
            _ => Err(raise(
                ErrorKind::BadExtension,
                "Map::dump",
                format!("unsupported file format `{}'", path.display()),
            )),
        }
    }

    /// Set the elevation of the grid node `(ix, iy)`.
    ///
    /// The stored value is quantised over the map's elevation range; it can
    /// differ from the input by up to `(z1 - z0) / 65535`.
    pub fn fill(&mut self, ix: usize, iy: usize, elevation: f64) -> Result<()> {
        if (ix >= self.nx) || (iy >= self.ny) {
            return Err(raise(
                ErrorKind::DomainError,
                "Map::fill",
                format!("node ({}, {}) is outside of the grid", ix, iy),
            ));
        }
        if (elevation < self.z0) || (elevation > self.z1) {
            return Err(raise(
                ErrorKind::DomainError,
                "Map::fill",
                format!(
                    "elevation {} is outside of [{}, {}]",
                    elevation, self.z0, self.z1
                ),
            ));
        }

        let s = if self.dz > 0.0 {
            ((elevation - self.z0) / self.dz).round().clamp(0.0, 65_535.0) as u16
        } else {
            0
        };
        self.data[iy * self.nx + ix] = s;
        Ok(())
    }

    /// Get the geographic coordinates and elevation of the grid node
    /// `(ix, iy)`.
    pub fn node(&self, ix: usize, iy: usize) -> Result<(f64, f64, f64)> {
        if (ix >= self.nx) || (iy >= self.ny) {
            return Err(raise(
                ErrorKind::DomainError,
                "Map::node",
                format!("node ({}, {}) is outside of the grid", ix, iy),
            ));
        }
        Ok((
            self.x0 + ix as f64 * self.dx,
            self.y0 + iy as f64 * self.dy,
            self.z(ix, iy),
        ))
    }

    /// Estimate the map elevation at `(x, y)` by bilinear interpolation of
    /// the four surrounding nodes. Fails with `DomainError` outside of the
    /// map.
    pub fn elevation(&self, x: f64, y: f64) -> Result<f64> {
        match self.interpolate(x, y) {
            Some(elevation) => Ok(elevation),
            None => Err(raise(
                ErrorKind::DomainError,
                "Map::elevation",
                format!("coordinates ({}, {}) are outside of the map", x, y),
            )),
        }
    }

    /// Bounds-checked variant of [`Map::elevation`]: returns `Ok(None)`
    /// instead of failing when `(x, y)` lies outside of the map.
    pub fn elevation_inside(&self, x: f64, y: f64) -> Result<Option<f64>> {
        Ok(self.interpolate(x, y))
    }

    /// The map geometry.
    pub fn info(&self) -> MapInfo {
        MapInfo {
            nx: self.nx,
            ny: self.ny,
            x: [self.x0, self.x1],
            y: [self.y0, self.y1],
            z: [self.z0, self.z1],
        }
    }

    pub fn projection(&self) -> Option<&Projection> {
        self.projection.as_ref()
    }

    pub(crate) fn data(&self) -> &[u16] {
        &self.data
    }

    fn z(&self, ix: usize, iy: usize) -> f64 {
        self.z0 + f64::from(self.data[iy * self.nx + ix]) * self.dz
    }

    fn interpolate(&self, x: f64, y: f64) -> Option<f64> {
        let hx = (x - self.x0) / self.dx;
        let hy = (y - self.y0) / self.dy;
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

        Some(
            self.z(ix, iy) * (1.0 - fx) * (1.0 - fy)
                + self.z(ix, iy + 1) * (1.0 - fx) * fy
                + self.z(ix + 1, iy) * fx * (1.0 - fy)
                + self.z(ix + 1, iy + 1) * fx * fy,
        )
    }
}
