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

//! A bounded stack of global topography tiles.
//!
//! The stack keeps at most `max_size` unpinned tiles in memory, most
//! recently used first. Tiles reserved by a [`Client`](crate::Client) are
//! never evicted, so the stack may transiently overflow its bound while
//! every tile is pinned.
//!
//! All mutation happens inside one mutex region covering the tile table
//! and its recency order. On top of that, user supplied lock callbacks
//! are honoured around every critical section, so that access can be
//! serialised with non-Rust parts of a simulation.

use crate::{
    error::{raise, ErrorKind, Result},
    io::{self, RawTile},
    tile::Tile,
};
use parking_lot::Mutex;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

/// The on-disk layout of a stack's tiles.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TileFormat {
    /// 16 bit GeoTIFF cells named like `ASTGTM2_N45W072_dem.tif`.
    AsterGdem2,
    /// Raw SRTM cells named like `N45W072.hgt`.
    SrtmHgt,
}

impl TileFormat {
    /// Derive the tile filename for an integer-degree key.
    pub(crate) fn filename(
        &self,
        latitude: i32,
        longitude: i32,
        function: &'static str,
    ) -> Result<String> {
        if (latitude.abs() > 89) || (longitude.abs() > 180) {
            return Err(raise(
                ErrorKind::DomainError,
                function,
                format!("no tile at ({}, {})", latitude, longitude),
            ));
        }
        let ns = if latitude >= 0 { 'N' } else { 'S' };
        let ew = if longitude >= 0 { 'E' } else { 'W' };
        Ok(match self {
            Self::AsterGdem2 => format!(
                "ASTGTM2_{}{:02}{}{:03}_dem.tif",
                ns,
                latitude.abs(),
                ew,
                longitude.abs()
            ),
            Self::SrtmHgt => {
                format!("{}{:02}{}{:03}.hgt", ns, latitude.abs(), ew, longitude.abs())
            }
        })
    }

    fn load(&self, path: &Path, function: &'static str) -> Result<RawTile> {
        match self {
            Self::AsterGdem2 => io::geotiff16::load(path, function),
            Self::SrtmHgt => io::hgt::load(path, function),
        }
    }
}

/// User supplied callbacks serialising access to a stack. Both return
/// `true` on success; a `false` return is surfaced as `LockError` or
/// `UnlockError` and aborts the operation.
pub struct Locker {
    lock: Box<dyn Fn() -> bool + Send + Sync>,
    unlock: Box<dyn Fn() -> bool + Send + Sync>,
}

impl std::fmt::Debug for Locker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Locker").finish_non_exhaustive()
    }
}

impl Locker {
    pub fn new<L, U>(lock: L, unlock: U) -> Self
    where
        L: Fn() -> bool + Send + Sync + 'static,
        U: Fn() -> bool + Send + Sync + 'static,
    {
        Self {
            lock: Box::new(lock),
            unlock: Box::new(unlock),
        }
    }
}

#[derive(Debug)]
pub(crate) struct StackInner {
    /// Most recently used first.
    pub(crate) tiles: Vec<Arc<Tile>>,
    /// Successful tile loads, for diagnostics.
    pub(crate) loads: usize,
}

impl StackInner {
    pub(crate) fn touch(&mut self, index: usize) {
        if index > 0 {
            let tile = self.tiles.remove(index);
            self.tiles.insert(0, tile);
        }
    }

    #[cfg(test)]
    pub(crate) fn unpinned(&self) -> usize {
        self.tiles.iter().filter(|tile| tile.clients() == 0).count()
    }
}

#[derive(Debug)]
pub struct Stack {
    path: PathBuf,
    format: TileFormat,
    max_size: usize,
    locker: Option<Locker>,
    pub(crate) inner: Mutex<StackInner>,
}

impl Stack {
    /// Create an empty stack over the tiles stored under `path`.
    ///
    /// A stack without a [`Locker`] is single-thread only: clients cannot
    /// be created against it.
    pub fn new<P: Into<PathBuf>>(
        path: P,
        format: TileFormat,
        max_size: usize,
        locker: Option<Locker>,
    ) -> Self {
        Self {
            path: path.into(),
            format,
            max_size,
            locker,
            inner: Mutex::new(StackInner {
                tiles: Vec::new(),
                loads: 0,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> TileFormat {
        self.format
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Whether the stack carries lock callbacks and thus supports clients.
    pub fn is_threaded(&self) -> bool {
        self.locker.is_some()
    }

    /// Number of tiles currently in memory. This may exceed `max_size`
    /// while more than `max_size` tiles are pinned.
    pub fn len(&self) -> usize {
        self.inner.lock().tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evict every unpinned tile. Pinned tiles remain.
    pub fn clear(&self) -> Result<()> {
        self.acquire("Stack::clear")?;
        {
            let mut inner = self.inner.lock();
            inner.tiles.retain(|tile| tile.clients() > 0);
        }
        self.release("Stack::clear")
    }

    /// Preload the tile covering `(latitude, longitude)`, or promote it if
    /// it is already in memory.
    pub fn load(&self, latitude: f64, longitude: f64) -> Result<()> {
        self.acquire("Stack::load")?;
        let outcome = {
            let mut inner = self.inner.lock();
            self.load_locked(
                &mut inner,
                latitude.floor() as i32,
                longitude.floor() as i32,
                "Stack::load",
            )
        };
        self.release("Stack::load")?;
        outcome
    }

    /// Estimate the elevation at geodetic coordinates, loading the
    /// covering tile if needed.
    ///
    /// This convenience path bypasses the lock callbacks and client
    /// reservations; use a [`Client`](crate::Client) for concurrent
    /// queries.
    pub fn elevation(&self, latitude: f64, longitude: f64) -> Result<f64> {
        let mut inner = self.inner.lock();
        match self.sample_locked(&mut inner, latitude, longitude, "Stack::elevation")? {
            Some(elevation) => Ok(elevation),
            None => Err(raise(
                ErrorKind::PathError,
                "Stack::elevation",
                format!("missing elevation data in `{}'", self.path.display()),
            )),
        }
    }

    /// Bounds-checked variant of [`Stack::elevation`]: returns `Ok(None)`
    /// when no tile covers the coordinates.
    pub fn elevation_inside(&self, latitude: f64, longitude: f64) -> Result<Option<f64>> {
        let mut inner = self.inner.lock();
        self.sample_locked(&mut inner, latitude, longitude, "Stack::elevation")
    }

    /// Run the user lock callback, if any.
    pub(crate) fn acquire(&self, function: &'static str) -> Result<()> {
        if let Some(locker) = &self.locker {
            if !(locker.lock)() {
                return Err(raise(
                    ErrorKind::LockError,
                    function,
                    "could not acquire the lock",
                ));
            }
        }
        Ok(())
    }

    /// Run the user unlock callback, if any.
    pub(crate) fn release(&self, function: &'static str) -> Result<()> {
        if let Some(locker) = &self.locker {
            if !(locker.unlock)() {
                return Err(raise(
                    ErrorKind::UnlockError,
                    function,
                    "could not release the lock",
                ));
            }
        }
        Ok(())
    }

    /// Search then load, promoting whatever tile ends up serving the
    /// query. `Ok(None)` flags missing data.
    pub(crate) fn sample_locked(
        &self,
        inner: &mut StackInner,
        latitude: f64,
        longitude: f64,
        function: &'static str,
    ) -> Result<Option<f64>> {
        for i in 0..inner.tiles.len() {
            if let Some(elevation) = inner.tiles[i].interpolate(latitude, longitude) {
                inner.touch(i);
                return Ok(Some(elevation));
            }
        }

        match self.load_locked(
            inner,
            latitude.floor() as i32,
            longitude.floor() as i32,
            function,
        ) {
            Ok(()) => Ok(inner.tiles[0].interpolate(latitude, longitude)),
            Err(error) if error.kind() == ErrorKind::PathError => Ok(None),
            Err(error) => Err(error),
        }
    }

    /// Load the tile keyed `(latitude, longitude)` as the new head and
    /// enforce the size bound, evicting unpinned tiles from the tail.
    pub(crate) fn load_locked(
        &self,
        inner: &mut StackInner,
        latitude: i32,
        longitude: i32,
        function: &'static str,
    ) -> Result<()> {
        if let Some(i) = inner
            .tiles
            .iter()
            .position(|tile| tile.key() == (latitude, longitude))
        {
            inner.touch(i);
            return Ok(());
        }

        let filename = self.format.filename(latitude, longitude, function)?;
        let raw = self.format.load(&self.path.join(filename), function)?;
        log::debug!(
            "loaded tile ({}, {}) with {}x{} samples",
            latitude,
            longitude,
            raw.nx,
            raw.ny
        );
        inner
            .tiles
            .insert(0, Arc::new(Tile::new(latitude, longitude, raw)));
        inner.loads += 1;

        let mut i = inner.tiles.len();
        while (inner.tiles.len() > self.max_size) && (i > 1) {
            i -= 1;
            if inner.tiles[i].clients() == 0 {
                let evicted = inner.tiles.remove(i);
                log::debug!(
                    "evicted tile ({}, {})",
                    evicted.latitude(),
                    evicted.longitude()
                );
            }
        }
        Ok(())
    }

    /// Evict `tile` if it is unpinned and the stack overflows its bound.
    /// Used when a client drops its reservation.
    pub(crate) fn shrink_locked(&self, inner: &mut StackInner, tile: &Arc<Tile>) {
        if (tile.clients() == 0) && (inner.tiles.len() > self.max_size) {
            if let Some(i) = inner
                .tiles
                .iter()
                .position(|candidate| Arc::ptr_eq(candidate, tile))
            {
                let evicted = inner.tiles.remove(i);
                log::debug!(
                    "evicted tile ({}, {})",
                    evicted.latitude(),
                    evicted.longitude()
                );
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_filename_derivation() {
        crate::error::set_handler(None);
        let gdem2 = TileFormat::AsterGdem2;
        let hgt = TileFormat::SrtmHgt;

        assert_eq!(
            gdem2.filename(45, -72, "test").unwrap(),
            "ASTGTM2_N45W072_dem.tif"
        );
        assert_eq!(gdem2.filename(-8, 3, "test").unwrap(), "ASTGTM2_S08E003_dem.tif");
        assert_eq!(hgt.filename(45, -72, "test").unwrap(), "N45W072.hgt");
        assert_eq!(hgt.filename(0, 180, "test").unwrap(), "N00E180.hgt");

        for (latitude, longitude) in [(90, 0), (-91, 0), (0, 181), (0, -200)] {
            let error = gdem2.filename(latitude, longitude, "test").unwrap_err();
            assert_eq!(error.kind(), crate::ErrorKind::DomainError);
        }
    }

    #[test]
    fn test_search_and_load() {
        crate::error::set_handler(None);
        let directory = tempfile::tempdir().unwrap();
        for (latitude, longitude) in [(45, 3), (45, 4)] {
            testing::write_hgt_tile(directory.path(), latitude, longitude, 3, |_, _| {
                (100 * latitude + longitude) as i16
            });
        }
        let stack = Stack::new(directory.path(), TileFormat::SrtmHgt, 4, None);

        assert_abs_diff_eq!(stack.elevation(45.5, 3.5).unwrap(), 4503.0);
        assert_abs_diff_eq!(stack.elevation(45.5, 4.5).unwrap(), 4504.0);
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.inner.lock().loads, 2);

        // A repeat hits the cache.
        assert_abs_diff_eq!(stack.elevation(45.5, 3.5).unwrap(), 4503.0);
        assert_eq!(stack.inner.lock().loads, 2);

        // Missing data.
        assert_eq!(stack.elevation_inside(50.5, 3.5).unwrap(), None);
        let error = stack.elevation(50.5, 3.5).unwrap_err();
        assert_eq!(error.kind(), crate::ErrorKind::PathError);

        // Out of range keys are domain errors, not misses.
        let error = stack.elevation_inside(90.5, 3.5).unwrap_err();
        assert_eq!(error.kind(), crate::ErrorKind::DomainError);
    }

    #[test]
    fn test_lru_eviction() {
        crate::error::set_handler(None);
        let directory = tempfile::tempdir().unwrap();
        for longitude in 3..=5 {
            testing::write_hgt_tile(directory.path(), 45, longitude, 3, |_, _| longitude as i16);
        }
        let stack = Stack::new(directory.path(), TileFormat::SrtmHgt, 2, None);

        // Walk three cells, then revisit the first: it was evicted as LRU,
        // so a fourth load is needed.
        for longitude in [3.5, 4.5, 5.5, 3.5] {
            assert!(stack.elevation_inside(45.5, longitude).unwrap().is_some());
        }
        assert_eq!(stack.inner.lock().loads, 4);
        assert_eq!(stack.len(), 2);

        // With a single slot, repeats of one cell load exactly once.
        let stack = Stack::new(directory.path(), TileFormat::SrtmHgt, 1, None);
        for _ in 0..8 {
            assert!(stack.elevation_inside(45.5, 3.5).unwrap().is_some());
        }
        assert_eq!(stack.inner.lock().loads, 1);
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn test_preload_and_clear() {
        crate::error::set_handler(None);
        let directory = tempfile::tempdir().unwrap();
        testing::write_hgt_tile(directory.path(), 45, 3, 3, |_, _| 42);
        let stack = Stack::new(directory.path(), TileFormat::SrtmHgt, 2, None);

        stack.load(45.5, 3.5).unwrap();
        assert_eq!(stack.len(), 1);
        // Loading the same cell again only promotes.
        stack.load(45.9, 3.1).unwrap();
        assert_eq!(stack.inner.lock().loads, 1);

        stack.clear().unwrap();
        assert!(stack.is_empty());

        let error = stack.load(50.5, 3.5).unwrap_err();
        assert_eq!(error.kind(), crate::ErrorKind::PathError);
    }

    #[test]
    fn test_lock_callbacks() {
        crate::error::set_handler(None);
        let directory = tempfile::tempdir().unwrap();

        let stack = Stack::new(
            directory.path(),
            TileFormat::SrtmHgt,
            2,
            Some(Locker::new(|| false, || true)),
        );
        assert_eq!(
            stack.clear().unwrap_err().kind(),
            crate::ErrorKind::LockError
        );

        let stack = Stack::new(
            directory.path(),
            TileFormat::SrtmHgt,
            2,
            Some(Locker::new(|| true, || false)),
        );
        assert_eq!(
            stack.clear().unwrap_err().kind(),
            crate::ErrorKind::UnlockError
        );
    }
}
