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

//! WGS84 transforms between geodetic, ECEF and horizontal coordinates.
//!
//! All angles on the API surface are in degrees, all lengths in metres.

use crate::error::{raise, ErrorKind, Result};
use nalgebra::Vector3;

/// WGS84 semi-major axis, in m.
pub const WGS84_A: f64 = 6_378_137.0;

/// WGS84 first eccentricity.
pub const WGS84_E: f64 = 0.081_819_190_842_622;

/// Geodetic coordinates: latitude and longitude in degrees, height above
/// the ellipsoid in metres.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Geodetic {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

/// Horizontal angles, in degrees. Azimuth is measured clockwise from
/// geographic north.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Horizontal {
    pub azimuth: f64,
    pub elevation: f64,
}

/// The local East, North, Up unit vectors at a geodetic point, expressed
/// in ECEF.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EnuBasis {
    pub east: Vector3<f64>,
    pub north: Vector3<f64>,
    pub up: Vector3<f64>,
}

/// Transform geodetic coordinates to Cartesian ECEF ones.
pub fn ecef_from_geodetic(latitude: f64, longitude: f64, altitude: f64) -> Vector3<f64> {
    let (sp, cp) = latitude.to_radians().sin_cos();
    let (sl, cl) = longitude.to_radians().sin_cos();
    let r = WGS84_A / (1.0 - WGS84_E * WGS84_E * sp * sp).sqrt();

    Vector3::new(
        (r + altitude) * cp * cl,
        (r + altitude) * cp * sl,
        (r * (1.0 - WGS84_E * WGS84_E) + altitude) * sp,
    )
}

/// Transform Cartesian ECEF coordinates to geodetic ones.
///
/// B. R. Bowring's 1985 algorithm with a single iteration.
pub fn ecef_to_geodetic(ecef: &Vector3<f64>) -> Geodetic {
    let e2 = WGS84_E * WGS84_E;
    let b2 = WGS84_A * WGS84_A * (1.0 - e2);
    let b = b2.sqrt();
    let eb2 = e2 * WGS84_A * WGS84_A / b2;

    // On the polar axis the longitude is degenerate.
    if (ecef[0] == 0.0) && (ecef[1] == 0.0) {
        return Geodetic {
            latitude: if ecef[2] >= 0.0 { 90.0 } else { -90.0 },
            longitude: 0.0,
            altitude: ecef[2].abs() - b,
        };
    }

    let longitude = ecef[1].atan2(ecef[0]).to_degrees();

    let p2 = ecef[0] * ecef[0] + ecef[1] * ecef[1];
    let p = p2.sqrt();
    if ecef[2] == 0.0 {
        return Geodetic {
            latitude: 0.0,
            longitude,
            altitude: p - WGS84_A,
        };
    }

    let r = (p2 + ecef[2] * ecef[2]).sqrt();
    let tu = b * ecef[2] * (1.0 + eb2 * b / r) / (WGS84_A * p);
    let cu = 1.0 / (1.0 + tu * tu).sqrt();
    let su = cu * tu;
    let tp = (ecef[2] + eb2 * b * su * su * su) / (p - e2 * WGS84_A * cu * cu * cu);
    let latitude = tp.atan().to_degrees();
    let cp = 1.0 / (1.0 + tp * tp).sqrt();
    let sp = cp * tp;
    let altitude = p * cp + ecef[2] * sp - WGS84_A * (1.0 - e2 * sp * sp).sqrt();

    Geodetic {
        latitude,
        longitude,
        altitude,
    }
}

/// Compute the local East, North, Up basis at a geodetic point.
pub fn enu_basis(latitude: f64, longitude: f64) -> EnuBasis {
    let (sp, cp) = latitude.to_radians().sin_cos();
    let (sl, cl) = longitude.to_radians().sin_cos();

    EnuBasis {
        east: Vector3::new(-sl, cl, 0.0),
        north: Vector3::new(-cl * sp, -sl * sp, cp),
        up: Vector3::new(cl * cp, sl * cp, sp),
    }
}

/// Transform horizontal angles at a geodetic point to an ECEF direction
/// vector.
pub fn ecef_from_horizontal(
    latitude: f64,
    longitude: f64,
    azimuth: f64,
    elevation: f64,
) -> Vector3<f64> {
    let basis = enu_basis(latitude, longitude);
    let (sa, ca) = azimuth.to_radians().sin_cos();
    let (se, ce) = elevation.to_radians().sin_cos();

    basis.east * (sa * ce) + basis.north * (ca * ce) + basis.up * se
}

/// Transform an ECEF direction vector to horizontal angles at a geodetic
/// point. Fails with `DomainError` on a null direction.
pub fn ecef_to_horizontal(
    latitude: f64,
    longitude: f64,
    direction: &Vector3<f64>,
) -> Result<Horizontal> {
    let basis = enu_basis(latitude, longitude);
    let x = basis.east.dot(direction);
    let y = basis.north.dot(direction);
    let z = basis.up.dot(direction);

    let r2 = direction.dot(direction);
    if r2 <= 0.0 {
        return Err(raise(
            ErrorKind::DomainError,
            "ecef_to_horizontal",
            "null direction vector",
        ));
    }

    Ok(Horizontal {
        azimuth: x.atan2(y).to_degrees(),
        elevation: (z / r2.sqrt()).asin().to_degrees(),
    })
}
