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

//! Per-thread reservation handles over a tile stack.
//!
//! A client pins the tile serving its last query, so repeated queries
//! along a trajectory interpolate without taking the stack lock at all.
//! The lock is only acquired when the trajectory leaves the pinned tile;
//! the pin is then transferred under it. A cell known to have no data is
//! also remembered, so absent tiles are not re-probed on every step.

use crate::{
    error::{raise, ErrorKind, Result},
    stack::{Stack, StackInner},
    tile::Tile,
};
use std::sync::Arc;

#[derive(Debug)]
pub struct Client {
    stack: Arc<Stack>,
    pinned: Option<Arc<Tile>>,
    miss: Option<(i32, i32)>,
}

impl Client {
    /// Create an idle client for a stack. Fails with `BadAddress` when the
    /// stack carries no lock callbacks, since nothing would then serialise
    /// the reservations.
    pub fn new(stack: &Arc<Stack>) -> Result<Self> {
        if !stack.is_threaded() {
            return Err(raise(
                ErrorKind::BadAddress,
                "Client::new",
                "invalid stack (missing lock callbacks)",
            ));
        }
        Ok(Self {
            stack: stack.clone(),
            pinned: None,
            miss: None,
        })
    }

    pub fn stack(&self) -> &Arc<Stack> {
        &self.stack
    }

    /// Estimate the elevation at geodetic coordinates, reserving the
    /// covering tile. Fails with `PathError` when no tile covers the
    /// coordinates.
    pub fn elevation(&mut self, latitude: f64, longitude: f64) -> Result<f64> {
        match self.sample(latitude, longitude, "Client::elevation")? {
            Some(elevation) => Ok(elevation),
            None => Err(raise(
                ErrorKind::PathError,
                "Client::elevation",
                format!(
                    "missing elevation data in `{}'",
                    self.stack.path().display()
                ),
            )),
        }
    }

    /// Bounds-checked variant of [`Client::elevation`]: returns `Ok(None)`
    /// when no tile covers the coordinates.
    pub fn elevation_inside(&mut self, latitude: f64, longitude: f64) -> Result<Option<f64>> {
        self.sample(latitude, longitude, "Client::elevation")
    }

    /// Drop any reservation and forget the last missing cell.
    pub fn clear(&mut self) -> Result<()> {
        self.miss = None;
        if self.pinned.is_none() {
            return Ok(());
        }
        let stack = self.stack.clone();
        stack.acquire("Client::clear")?;
        let outcome = {
            let mut inner = stack.inner.lock();
            self.unpin_locked(&mut inner, "Client::clear")
        };
        stack.release("Client::clear")?;
        outcome
    }

    fn sample(
        &mut self,
        latitude: f64,
        longitude: f64,
        function: &'static str,
    ) -> Result<Option<f64>> {
        // Fast path: the reserved tile, off-lock.
        if let Some(tile) = &self.pinned {
            if let Some(elevation) = tile.interpolate(latitude, longitude) {
                return Ok(Some(elevation));
            }
        } else if self.miss == Some((latitude.floor() as i32, longitude.floor() as i32)) {
            // Known missing cell, off-lock as well.
            return Ok(None);
        }

        // Slow path: search and load under the stack lock.
        let stack = self.stack.clone();
        stack.acquire(function)?;
        let outcome = {
            let mut inner = stack.inner.lock();
            self.update(&mut inner, latitude, longitude, function)
        };
        stack.release(function)?;

        match outcome? {
            // Interpolate off-lock; the reservation keeps the tile alive
            // and in place.
            Some(tile) => Ok(tile.interpolate(latitude, longitude)),
            None => Ok(None),
        }
    }

    /// Find or load a covering tile and transfer the reservation to it.
    /// Runs under the stack lock. `Ok(None)` flags missing data.
    fn update(
        &mut self,
        inner: &mut StackInner,
        latitude: f64,
        longitude: f64,
        function: &'static str,
    ) -> Result<Option<Arc<Tile>>> {
        let mut candidate = None;
        for i in 0..inner.tiles.len() {
            let tile = &inner.tiles[i];
            if let Some(pinned) = &self.pinned {
                // The reserved tile was already checked off-lock.
                if Arc::ptr_eq(tile, pinned) {
                    continue;
                }
            }
            if tile.interpolate(latitude, longitude).is_some() {
                inner.touch(i);
                candidate = Some(inner.tiles[0].clone());
                break;
            }
        }

        let candidate = match candidate {
            Some(tile) => tile,
            None => {
                let key = (latitude.floor() as i32, longitude.floor() as i32);
                match self.stack.load_locked(inner, key.0, key.1, function) {
                    Ok(()) => inner.tiles[0].clone(),
                    Err(error) if error.kind() == ErrorKind::PathError => {
                        // The cell has no data: drop the reservation and
                        // remember the miss.
                        self.unpin_locked(inner, function)?;
                        self.miss = Some(key);
                        return Ok(None);
                    }
                    Err(error) => return Err(error),
                }
            }
        };

        self.unpin_locked(inner, function)?;
        candidate.pin();
        self.pinned = Some(candidate.clone());
        self.miss = None;
        Ok(Some(candidate))
    }

    /// Drop the current reservation, evicting its tile when the stack
    /// overflows. Runs under the stack lock.
    fn unpin_locked(&mut self, inner: &mut StackInner, function: &'static str) -> Result<()> {
        if let Some(tile) = self.pinned.take() {
            if tile.unpin().is_none() {
                return Err(raise(
                    ErrorKind::LibraryError,
                    function,
                    "negative tile reference count",
                ));
            }
            self.stack.shrink_locked(inner, &tile);
        }
        Ok(())
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Err(error) = self.clear() {
            log::warn!("could not release the client's tile ({})", error);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        stack::{Locker, TileFormat},
        testing,
    };
    use approx::assert_abs_diff_eq;
    use std::collections::HashSet;

    fn threaded_stack(directory: &std::path::Path, max_size: usize) -> Arc<Stack> {
        Arc::new(Stack::new(
            directory,
            TileFormat::SrtmHgt,
            max_size,
            Some(Locker::new(|| true, || true)),
        ))
    }

    #[test]
    fn test_client_requires_lock() {
        crate::error::set_handler(None);
        let stack = Arc::new(Stack::new("data", TileFormat::SrtmHgt, 2, None));
        let error = Client::new(&stack).unwrap_err();
        assert_eq!(error.kind(), crate::ErrorKind::BadAddress);
    }

    #[test]
    fn test_cache_discipline() {
        crate::error::set_handler(None);
        let directory = tempfile::tempdir().unwrap();
        for longitude in 3..=5 {
            testing::write_hgt_tile(directory.path(), 45, longitude, 3, |_, _| {
                (100 + longitude) as i16
            });
        }
        let stack = threaded_stack(directory.path(), 2);
        let mut client = Client::new(&stack).unwrap();

        // Walk three cells and come back: the first cell was evicted as
        // LRU meanwhile, for a total of four loads.
        for longitude in [3.5, 4.5, 5.5, 3.5] {
            let elevation = client.elevation(45.5, longitude).unwrap();
            assert_abs_diff_eq!(elevation, 100.0 + longitude.floor());
        }
        assert_eq!(stack.inner.lock().loads, 4);
        assert_eq!(stack.len(), 2);

        // Repeats inside the reserved tile do not touch the stack.
        let before = stack.inner.lock().loads;
        for _ in 0..16 {
            client.elevation(45.25, 3.75).unwrap();
        }
        assert_eq!(stack.inner.lock().loads, before);
    }

    #[test]
    fn test_pin_survives_overflow() {
        crate::error::set_handler(None);
        let directory = tempfile::tempdir().unwrap();
        testing::write_hgt_tile(directory.path(), 45, 3, 3, |_, _| 1);
        testing::write_hgt_tile(directory.path(), 46, 3, 3, |_, _| 2);
        let stack = threaded_stack(directory.path(), 1);

        let mut a = Client::new(&stack).unwrap();
        let mut b = Client::new(&stack).unwrap();

        a.elevation(45.5, 3.5).unwrap();
        b.elevation(46.5, 3.5).unwrap();

        // Both tiles are reserved: the stack overflows its bound rather
        // than evicting either.
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.inner.lock().unpinned(), 0);

        // Releasing a reservation shrinks the stack back to its bound.
        a.clear().unwrap();
        assert_eq!(stack.len(), 1);

        drop(b);
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.inner.lock().unpinned(), 1);
    }

    #[test]
    fn test_known_miss_cache() {
        crate::error::set_handler(None);
        let directory = tempfile::tempdir().unwrap();
        testing::write_hgt_tile(directory.path(), 45, 3, 3, |_, _| 7);
        let stack = threaded_stack(directory.path(), 2);
        let mut client = Client::new(&stack).unwrap();

        assert_eq!(client.elevation_inside(50.5, 3.5).unwrap(), None);
        let error = client.elevation(50.5, 3.5).unwrap_err();
        assert_eq!(error.kind(), crate::ErrorKind::PathError);

        // The cell is remembered as missing: even now that data exists,
        // the short circuit answers without probing the disk.
        testing::write_hgt_tile(directory.path(), 50, 3, 3, |_, _| 8);
        assert_eq!(client.elevation_inside(50.5, 3.5).unwrap(), None);
        assert_eq!(stack.len(), 0);

        // A successful query clears the memory.
        assert_abs_diff_eq!(client.elevation(45.5, 3.5).unwrap(), 7.0);
        assert_abs_diff_eq!(client.elevation(50.5, 3.5).unwrap(), 8.0);
    }

    #[test]
    fn test_lock_failures_are_terminal() {
        crate::error::set_handler(None);
        let directory = tempfile::tempdir().unwrap();
        testing::write_hgt_tile(directory.path(), 45, 3, 3, |_, _| 7);

        let stack = Arc::new(Stack::new(
            directory.path(),
            TileFormat::SrtmHgt,
            2,
            Some(Locker::new(|| false, || true)),
        ));
        let mut client = Client::new(&stack).unwrap();
        let error = client.elevation(45.5, 3.5).unwrap_err();
        assert_eq!(error.kind(), crate::ErrorKind::LockError);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_concurrent_clients() {
        crate::error::set_handler(None);
        let directory = tempfile::tempdir().unwrap();
        for longitude in 0..6 {
            testing::write_hgt_tile(directory.path(), 45, longitude, 3, |_, _| {
                longitude as i16
            });
        }
        let stack = threaded_stack(directory.path(), 2);

        let workers: Vec<_> = (0..4)
            .map(|seed: usize| {
                let stack = stack.clone();
                std::thread::spawn(move || {
                    let mut client = Client::new(&stack).unwrap();
                    for i in 0..200 {
                        let longitude = ((seed * 3 + i * 7) % 6) as f64 + 0.5;
                        let elevation = client.elevation(45.5, longitude).unwrap();
                        assert_abs_diff_eq!(elevation, longitude.floor());
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        // Dropped clients released every reservation; the bound holds and
        // keys are unique.
        let inner = stack.inner.lock();
        assert!(inner.unpinned() <= 2);
        assert!(inner.tiles.len() <= 2);
        let keys: HashSet<_> = inner.tiles.iter().map(|tile| tile.key()).collect();
        assert_eq!(keys.len(), inner.tiles.len());
    }
}
