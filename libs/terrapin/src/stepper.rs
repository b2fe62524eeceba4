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

//! Stepping through terrain layers from ECEF positions.
//!
//! A stepper composes tile stacks, single maps and flat ground into one
//! terrain oracle. Layers are prioritised last-added first, so a local
//! high resolution map can sit on top of a world wide stack with a flat
//! fallback at the bottom.
//!
//! For small consecutive steps the geodetic transform can optionally be
//! replaced by a first-order expansion around the last exact solution,
//! which is a large win when a ray tracer advances metre by metre.

use crate::{
    client::Client,
    ecef::{self, EnuBasis, Geodetic, WGS84_A, WGS84_E},
    error::Result,
    map::Map,
    stack::Stack,
};
use nalgebra::Vector3;
use std::sync::Arc;

enum Layer {
    Stack {
        stack: Arc<Stack>,
        client: Option<Client>,
    },
    Map(Arc<Map>),
    Flat(f64),
}

/// The geography at a stepped position.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Step {
    pub latitude: f64,
    pub longitude: f64,
    /// Altitude above the geoid when a geoid map is set, above the WGS84
    /// ellipsoid otherwise.
    pub altitude: f64,
    /// Ground elevation of the serving layer, or `0` when the position is
    /// outside of all layers.
    pub ground: f64,
    /// Index of the serving layer, or `None` when outside of all layers.
    pub layer: Option<usize>,
}

// The last exact geodetic solution, with everything needed to expand
// around it.
struct Anchor {
    position: Vector3<f64>,
    geodetic: Geodetic,
    basis: EnuBasis,
    /// Meridional curvature radius plus altitude, in m.
    meridional: f64,
    /// Prime-vertical curvature radius plus altitude, scaled to the
    /// parallel, in m.
    transverse: f64,
}

#[derive(Default)]
pub struct Stepper {
    layers: Vec<Layer>,
    geoid: Option<Arc<Map>>,
    range: f64,
    anchor: Option<Anchor>,
}

impl Stepper {
    /// Create a stepper with no layers and no geoid, and the local
    /// approximation disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tile stack as the new top layer. When the stack supports
    /// threading, the stepper creates and owns a [`Client`] for it.
    pub fn add_stack(&mut self, stack: &Arc<Stack>) -> Result<()> {
        let client = if stack.is_threaded() {
            Some(Client::new(stack)?)
        } else {
            None
        };
        self.layers.push(Layer::Stack {
            stack: stack.clone(),
            client,
        });
        Ok(())
    }

    /// Add a projected map as the new top layer.
    pub fn add_map(&mut self, map: &Arc<Map>) {
        self.layers.push(Layer::Map(map.clone()));
    }

    /// Add a flat ground layer on top.
    pub fn add_flat(&mut self, ground_level: f64) {
        self.layers.push(Layer::Flat(ground_level));
    }

    /// Set the geoid undulation map, or `None` for altitudes w.r.t. the
    /// ellipsoid.
    pub fn set_geoid(&mut self, geoid: Option<Arc<Map>>) {
        self.geoid = geoid;
    }

    pub fn geoid(&self) -> Option<&Arc<Map>> {
        self.geoid.as_ref()
    }

    /// Set the validity range of the local approximation, in m. Zero, the
    /// default, disables it; 100 m keeps distortions below the cm level.
    pub fn set_range(&mut self, range: f64) {
        self.range = range.max(0.0);
        if self.range == 0.0 {
            self.anchor = None;
        }
    }

    pub fn range(&self) -> f64 {
        self.range
    }

    /// Release the stepper's tile reservations and drop the local anchor.
    pub fn clear(&mut self) -> Result<()> {
        self.anchor = None;
        for layer in &mut self.layers {
            if let Layer::Stack {
                client: Some(client),
                ..
            } = layer
            {
                client.clear()?;
            }
        }
        Ok(())
    }

    /// Resolve the geography at an ECEF position: geodetic coordinates,
    /// altitude, and the ground elevation of the top-most layer covering
    /// the position.
    pub fn step(&mut self, position: &Vector3<f64>) -> Result<Step> {
        let geodetic = self.locate(position);

        let mut altitude = geodetic.altitude;
        if let Some(geoid) = &self.geoid {
            // The geoid is sampled as a plain carthographic grid.
            altitude -= geoid.elevation(geodetic.longitude, geodetic.latitude)?;
        }

        for (index, layer) in self.layers.iter_mut().enumerate().rev() {
            let ground = match layer {
                Layer::Stack { stack, client } => match client {
                    Some(client) => {
                        client.elevation_inside(geodetic.latitude, geodetic.longitude)?
                    }
                    None => stack.elevation_inside(geodetic.latitude, geodetic.longitude)?,
                },
                Layer::Map(map) => {
                    let (x, y) = match map.projection() {
                        Some(projection) => {
                            projection.project(geodetic.latitude, geodetic.longitude)
                        }
                        None => (geodetic.longitude, geodetic.latitude),
                    };
                    map.elevation_inside(x, y)?
                }
                Layer::Flat(ground_level) => Some(*ground_level),
            };
            if let Some(ground) = ground {
                return Ok(Step {
                    latitude: geodetic.latitude,
                    longitude: geodetic.longitude,
                    altitude,
                    ground,
                    layer: Some(index),
                });
            }
        }

        Ok(Step {
            latitude: geodetic.latitude,
            longitude: geodetic.longitude,
            altitude,
            ground: 0.0,
            layer: None,
        })
    }

    // Geodetic coordinates of the position, by first-order expansion
    // around the anchor when allowed, exactly otherwise.
    fn locate(&mut self, position: &Vector3<f64>) -> Geodetic {
        if self.range > 0.0 {
            if let Some(anchor) = &self.anchor {
                let delta = position - anchor.position;
                if delta.norm() <= self.range {
                    return Geodetic {
                        latitude: anchor.geodetic.latitude
                            + (anchor.basis.north.dot(&delta) / anchor.meridional)
                                .to_degrees(),
                        longitude: anchor.geodetic.longitude
                            + (anchor.basis.east.dot(&delta) / anchor.transverse)
                                .to_degrees(),
                        altitude: anchor.geodetic.altitude + anchor.basis.up.dot(&delta),
                    };
                }
            }
        }

        let geodetic = ecef::ecef_to_geodetic(position);
        if self.range > 0.0 {
            self.anchor = Self::anchor(position, geodetic);
        }
        geodetic
    }

    fn anchor(position: &Vector3<f64>, geodetic: Geodetic) -> Option<Anchor> {
        let (sp, cp) = geodetic.latitude.to_radians().sin_cos();
        // Too close to a pole the expansion of the longitude degenerates.
        if cp < 1e-9 {
            return None;
        }
        let u2 = 1.0 - WGS84_E * WGS84_E * sp * sp;
        let rn = WGS84_A / u2.sqrt();
        let rm = WGS84_A * (1.0 - WGS84_E * WGS84_E) / (u2 * u2.sqrt());

        Some(Anchor {
            position: *position,
            geodetic,
            basis: ecef::enu_basis(geodetic.latitude, geodetic.longitude),
            meridional: rm + geodetic.altitude,
            transverse: (rn + geodetic.altitude) * cp,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        stack::{Locker, TileFormat},
        testing, MapInfo,
    };
    use approx::assert_abs_diff_eq;

    fn flat_map(x: [f64; 2], y: [f64; 2], z: [f64; 2], level: f64) -> Arc<Map> {
        let mut map = Map::new(
            &MapInfo {
                nx: 3,
                ny: 3,
                x,
                y,
                z,
            },
            None,
        )
        .unwrap();
        for iy in 0..3 {
            for ix in 0..3 {
                map.fill(ix, iy, level).unwrap();
            }
        }
        Arc::new(map)
    }

    #[test]
    fn test_layer_priority() {
        crate::error::set_handler(None);
        let mut stepper = Stepper::new();
        stepper.add_flat(0.0);
        stepper.add_map(&flat_map([0.0, 1.0], [0.0, 1.0], [0.0, 100.0], 50.0));
        stepper.add_flat(100.0);

        // The top layer wins everywhere, even where the map has data.
        let position = ecef::ecef_from_geodetic(0.5, 0.5, 200.0);
        let step = stepper.step(&position).unwrap();
        assert_abs_diff_eq!(step.ground, 100.0);
        assert_eq!(step.layer, Some(2));
        assert_abs_diff_eq!(step.altitude, 200.0, epsilon = 1e-3);
        assert_abs_diff_eq!(step.latitude, 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(step.longitude, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_map_over_flat() {
        crate::error::set_handler(None);
        let quantum = 100.0 / 65_535.0;
        let mut stepper = Stepper::new();
        stepper.add_flat(0.0);
        stepper.add_map(&flat_map([0.0, 1.0], [0.0, 1.0], [0.0, 100.0], 50.0));

        // Inside the map, the map wins over the bottom flat.
        let position = ecef::ecef_from_geodetic(0.5, 0.5, 200.0);
        let step = stepper.step(&position).unwrap();
        assert_abs_diff_eq!(step.ground, 50.0, epsilon = quantum);
        assert_eq!(step.layer, Some(1));

        // Outside of the map, the flat below serves.
        let position = ecef::ecef_from_geodetic(10.0, 10.0, 200.0);
        let step = stepper.step(&position).unwrap();
        assert_abs_diff_eq!(step.ground, 0.0);
        assert_eq!(step.layer, Some(0));
    }

    #[test]
    fn test_outside_all_layers() {
        crate::error::set_handler(None);
        let mut stepper = Stepper::new();
        stepper.add_map(&flat_map([0.0, 1.0], [0.0, 1.0], [0.0, 100.0], 50.0));

        let position = ecef::ecef_from_geodetic(10.0, 10.0, 200.0);
        let step = stepper.step(&position).unwrap();
        assert_eq!(step.layer, None);
        assert_abs_diff_eq!(step.ground, 0.0);
        assert_abs_diff_eq!(step.latitude, 10.0, epsilon = 1e-6);
    }

    #[test]
    fn test_geoid_correction() {
        crate::error::set_handler(None);
        let quantum = 40.0 / 65_535.0;
        let mut stepper = Stepper::new();
        stepper.add_flat(10.0);
        stepper.set_geoid(Some(flat_map([-1.0, 1.0], [-1.0, 1.0], [0.0, 40.0], 25.0)));
        assert!(stepper.geoid().is_some());

        let position = ecef::ecef_from_geodetic(0.2, 0.3, 100.0);
        let step = stepper.step(&position).unwrap();
        assert_abs_diff_eq!(step.altitude, 75.0, epsilon = 1e-3 + quantum);
        assert_abs_diff_eq!(step.ground, 10.0);

        // Outside of the geoid map the correction is a hard error.
        let position = ecef::ecef_from_geodetic(45.0, 3.0, 100.0);
        let error = stepper.step(&position).unwrap_err();
        assert_eq!(error.kind(), crate::ErrorKind::DomainError);
    }

    #[test]
    fn test_stack_layer() {
        crate::error::set_handler(None);
        let directory = tempfile::tempdir().unwrap();
        testing::write_hgt_tile(directory.path(), 45, 3, 3, |_, _| 250);
        let stack = Arc::new(Stack::new(
            directory.path(),
            TileFormat::SrtmHgt,
            2,
            Some(Locker::new(|| true, || true)),
        ));

        let mut stepper = Stepper::new();
        stepper.add_flat(0.0);
        stepper.add_stack(&stack).unwrap();

        let position = ecef::ecef_from_geodetic(45.5, 3.5, 1000.0);
        let step = stepper.step(&position).unwrap();
        assert_abs_diff_eq!(step.ground, 250.0);
        assert_eq!(step.layer, Some(1));

        // The stepper's client keeps the tile reserved between steps.
        assert_eq!(stack.inner.lock().unpinned(), 0);

        // Off-tile positions fall through to the flat layer.
        let position = ecef::ecef_from_geodetic(50.5, 3.5, 1000.0);
        let step = stepper.step(&position).unwrap();
        assert_eq!(step.layer, Some(0));

        stepper.clear().unwrap();
        assert_eq!(stack.inner.lock().unpinned(), 1);
    }

    #[test]
    fn test_local_approximation() {
        crate::error::set_handler(None);
        let mut exact = Stepper::new();
        exact.add_flat(0.0);
        let mut approximated = Stepper::new();
        approximated.add_flat(0.0);
        approximated.set_range(100.0);
        assert_abs_diff_eq!(approximated.range(), 100.0);

        // The first step anchors the expansion.
        let origin = ecef::ecef_from_geodetic(45.0, 3.0, 500.0);
        let reference = approximated.step(&origin).unwrap();
        assert_abs_diff_eq!(reference.latitude, 45.0, epsilon = 1e-9);

        // Within range, the expansion tracks the exact transform closely.
        let north = ecef::ecef_from_horizontal(45.0, 3.0, 0.0, 0.0);
        let east = ecef::ecef_from_horizontal(45.0, 3.0, 90.0, 0.0);
        for offset in [
            north * 50.0,
            east * 50.0,
            north * 30.0 + east * 30.0,
            north * -80.0,
        ] {
            let position = origin + offset;
            let fast = approximated.step(&position).unwrap();
            let slow = exact.step(&position).unwrap();
            assert_abs_diff_eq!(fast.latitude, slow.latitude, epsilon = 1e-8);
            assert_abs_diff_eq!(fast.longitude, slow.longitude, epsilon = 1e-8);
            assert_abs_diff_eq!(fast.altitude, slow.altitude, epsilon = 1e-3);
        }

        // Out of range, the anchor is refreshed from the exact transform.
        let position = origin + north * 5000.0;
        let fast = approximated.step(&position).unwrap();
        let slow = exact.step(&position).unwrap();
        assert_abs_diff_eq!(fast.latitude, slow.latitude, epsilon = 1e-12);
        assert_abs_diff_eq!(fast.longitude, slow.longitude, epsilon = 1e-12);
        assert_abs_diff_eq!(fast.altitude, slow.altitude, epsilon = 1e-9);
    }
}
