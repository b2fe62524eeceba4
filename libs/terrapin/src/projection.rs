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

//! Geographic projections for maps: the French Lambert conformal conic
//! zones and UTM.
//!
//! Projections are identified by a round-trippable name, e.g. `Lambert 93`
//! or `UTM 31N`. Latitudes and longitudes are in degrees, projected
//! coordinates in metres.

use crate::error::{raise, ErrorKind, Result};
use std::fmt;
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Hemisphere {
    North,
    South,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LambertZone {
    I,
    II,
    IIe,
    III,
    IV,
    Rgf93,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Projection {
    Lambert(LambertZone),
    Utm {
        /// Central longitude of the zone, in degrees.
        longitude_0: f64,
        hemisphere: Hemisphere,
    },
}

// Secant-cone parameters of the IGN Lambert zones: central meridian
// (radians from Greenwich), cone exponent, projection constant and false
// origin (metres), and the eccentricity of the underlying ellipsoid
// (Clarke 1880 IGN for zones I-IV, GRS80 for Lambert 93).
struct LambertParameters {
    lambda_0: f64,
    n: f64,
    c: f64,
    xs: f64,
    ys: f64,
    e: f64,
}

const PARIS_MERIDIAN: f64 = 0.040_792_344_33;
const CLARKE80_E: f64 = 0.082_483_256_8;
const GRS80_E: f64 = 0.081_819_191_042_815_8;

fn lambert_parameters(zone: LambertZone) -> &'static LambertParameters {
    use LambertZone::*;
    static PARAMETERS: [LambertParameters; 6] = [
        LambertParameters {
            lambda_0: PARIS_MERIDIAN,
            n: 0.760_405_965_6,
            c: 11_603_796.98,
            xs: 600_000.0,
            ys: 5_657_616.674,
            e: CLARKE80_E,
        },
        LambertParameters {
            lambda_0: PARIS_MERIDIAN,
            n: 0.728_968_627_4,
            c: 11_745_793.39,
            xs: 600_000.0,
            ys: 6_199_695.768,
            e: CLARKE80_E,
        },
        LambertParameters {
            lambda_0: PARIS_MERIDIAN,
            n: 0.728_968_627_4,
            c: 11_745_793.39,
            xs: 600_000.0,
            ys: 8_199_695.768,
            e: CLARKE80_E,
        },
        LambertParameters {
            lambda_0: PARIS_MERIDIAN,
            n: 0.695_912_796_6,
            c: 11_947_992.52,
            xs: 600_000.0,
            ys: 6_791_905.085,
            e: CLARKE80_E,
        },
        LambertParameters {
            lambda_0: PARIS_MERIDIAN,
            n: 0.671_267_932_2,
            c: 12_136_281.99,
            xs: 234.358,
            ys: 7_239_161.542,
            e: CLARKE80_E,
        },
        LambertParameters {
            lambda_0: 0.052_359_877_559_829_88,
            n: 0.725_607_765_0,
            c: 11_754_255.426,
            xs: 700_000.0,
            ys: 12_655_612.050,
            e: GRS80_E,
        },
    ];
    match zone {
        I => &PARAMETERS[0],
        II => &PARAMETERS[1],
        IIe => &PARAMETERS[2],
        III => &PARAMETERS[3],
        IV => &PARAMETERS[4],
        Rgf93 => &PARAMETERS[5],
    }
}

// Isometric latitude on an ellipsoid of eccentricity e.
fn isometric_latitude(phi: f64, e: f64) -> f64 {
    let esin = e * phi.sin();
    (FRAC_PI_4 + 0.5 * phi).tan().ln() - 0.5 * e * ((1.0 + esin) / (1.0 - esin)).ln()
}

// Invert the isometric latitude by fixed point iteration.
fn inverse_isometric_latitude(l: f64, e: f64) -> f64 {
    let expl = l.exp();
    let mut phi = 2.0 * expl.atan() - FRAC_PI_2;
    for _ in 0..100 {
        let esin = e * phi.sin();
        let next =
            2.0 * (((1.0 + esin) / (1.0 - esin)).powf(0.5 * e) * expl).atan() - FRAC_PI_2;
        if (next - phi).abs() < 1e-12 {
            return next;
        }
        phi = next;
    }
    phi
}

fn lambert_project(zone: LambertZone, latitude: f64, longitude: f64) -> (f64, f64) {
    let p = lambert_parameters(zone);
    let l = isometric_latitude(latitude.to_radians(), p.e);
    let r = p.c * (-p.n * l).exp();
    let gamma = p.n * (longitude.to_radians() - p.lambda_0);
    (p.xs + r * gamma.sin(), p.ys - r * gamma.cos())
}

fn lambert_unproject(zone: LambertZone, x: f64, y: f64) -> (f64, f64) {
    let p = lambert_parameters(zone);
    let dx = x - p.xs;
    let dy = p.ys - y;
    let r = dx.hypot(dy);
    let gamma = dx.atan2(dy);
    let longitude = gamma / p.n + p.lambda_0;
    let l = -(r / p.c).ln() / p.n;
    let latitude = inverse_isometric_latitude(l, p.e);
    (latitude.to_degrees(), longitude.to_degrees())
}

// UTM parameters over WGS84, per the classic Snyder series.
const UTM_K0: f64 = 0.9996;
const UTM_A: f64 = 6_378_137.0;
const UTM_E2: f64 = 0.006_694_379_990_141_317;
const UTM_FALSE_EASTING: f64 = 500_000.0;
const UTM_FALSE_NORTHING: f64 = 10_000_000.0;

// Meridional arc from the equator.
fn utm_meridional_arc(phi: f64) -> f64 {
    let e2 = UTM_E2;
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    UTM_A
        * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
            - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
            + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
            - (35.0 * e6 / 3072.0) * (6.0 * phi).sin())
}

fn utm_project(
    longitude_0: f64,
    hemisphere: Hemisphere,
    latitude: f64,
    longitude: f64,
) -> (f64, f64) {
    let ep2 = UTM_E2 / (1.0 - UTM_E2);
    let phi = latitude.to_radians();
    let (sp, cp) = phi.sin_cos();
    let n = UTM_A / (1.0 - UTM_E2 * sp * sp).sqrt();
    let t = (sp / cp) * (sp / cp);
    let c = ep2 * cp * cp;
    let a = (longitude - longitude_0).to_radians() * cp;
    let m = utm_meridional_arc(phi);

    let x = UTM_K0
        * n
        * (a + (1.0 - t + c) * a.powi(3) / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a.powi(5) / 120.0)
        + UTM_FALSE_EASTING;
    let mut y = UTM_K0
        * (m + n * (sp / cp)
            * (a * a / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a.powi(4) / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a.powi(6) / 720.0));
    if hemisphere == Hemisphere::South {
        y += UTM_FALSE_NORTHING;
    }
    (x, y)
}

fn utm_unproject(longitude_0: f64, hemisphere: Hemisphere, x: f64, y: f64) -> (f64, f64) {
    let e2 = UTM_E2;
    let ep2 = e2 / (1.0 - e2);
    let y = match hemisphere {
        Hemisphere::North => y,
        Hemisphere::South => y - UTM_FALSE_NORTHING,
    };

    let m = y / UTM_K0;
    let mu = m / (UTM_A * (1.0 - e2 / 4.0 - 3.0 * e2 * e2 / 64.0 - 5.0 * e2 * e2 * e2 / 256.0));
    let e1 = (1.0 - (1.0 - e2).sqrt()) / (1.0 + (1.0 - e2).sqrt());
    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

    let (sp, cp) = phi1.sin_cos();
    let c1 = ep2 * cp * cp;
    let t1 = (sp / cp) * (sp / cp);
    let n1 = UTM_A / (1.0 - e2 * sp * sp).sqrt();
    let r1 = UTM_A * (1.0 - e2) / (1.0 - e2 * sp * sp).powf(1.5);
    let d = (x - UTM_FALSE_EASTING) / (n1 * UTM_K0);

    let phi = phi1
        - (n1 * sp / cp / r1)
            * (d * d / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d.powi(4) / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1
                    - 252.0 * ep2
                    - 3.0 * c1 * c1)
                    * d.powi(6)
                    / 720.0);
    let lambda = (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
        + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1)
            * d.powi(5)
            / 120.0)
        / cp;

    (phi.to_degrees(), longitude_0 + lambda.to_degrees())
}

impl Projection {
    /// Parse a projection from its name tag, e.g. `Lambert IIe`,
    /// `UTM 31N` or `UTM 3.5S`.
    pub fn from_name(name: &str) -> Result<Self> {
        if let Some(zone) = name.strip_prefix("Lambert ") {
            let zone = match zone {
                "I" => LambertZone::I,
                "II" => LambertZone::II,
                "IIe" => LambertZone::IIe,
                "III" => LambertZone::III,
                "IV" => LambertZone::IV,
                "93" => LambertZone::Rgf93,
                _ => {
                    return Err(raise(
                        ErrorKind::BadProjection,
                        "Projection::from_name",
                        format!("unknown Lambert zone `{}'", zone),
                    ))
                }
            };
            return Ok(Self::Lambert(zone));
        }

        if let Some(tag) = name.strip_prefix("UTM ") {
            let (zone, hemisphere) = match tag.char_indices().last() {
                Some((i, 'N')) => (&tag[..i], Hemisphere::North),
                Some((i, 'S')) => (&tag[..i], Hemisphere::South),
                _ => {
                    return Err(raise(
                        ErrorKind::BadProjection,
                        "Projection::from_name",
                        format!("missing hemisphere in `{}'", name),
                    ))
                }
            };
            // An integer in [1, 60] is a world zone; anything else must
            // be an explicit central longitude.
            let longitude_0 = match zone.parse::<i32>() {
                Ok(z) if (1..=60).contains(&z) => f64::from(6 * z - 183),
                _ => match zone.parse::<f64>() {
                    Ok(l) if l.is_finite() => l,
                    _ => {
                        return Err(raise(
                            ErrorKind::BadProjection,
                            "Projection::from_name",
                            format!("invalid UTM zone in `{}'", name),
                        ))
                    }
                },
            };
            return Ok(Self::Utm {
                longitude_0,
                hemisphere,
            });
        }

        Err(raise(
            ErrorKind::BadProjection,
            "Projection::from_name",
            format!("unknown projection `{}'", name),
        ))
    }

    /// The canonical name tag. Feeding it back to [`Projection::from_name`]
    /// recovers the projection.
    pub fn name(&self) -> String {
        format!("{}", self)
    }

    /// Re-configure in place from a name tag.
    pub fn configure(&mut self, name: &str) -> Result<()> {
        *self = Self::from_name(name)?;
        Ok(())
    }

    /// Project geodetic coordinates to map coordinates.
    pub fn project(&self, latitude: f64, longitude: f64) -> (f64, f64) {
        match *self {
            Self::Lambert(zone) => lambert_project(zone, latitude, longitude),
            Self::Utm {
                longitude_0,
                hemisphere,
            } => utm_project(longitude_0, hemisphere, latitude, longitude),
        }
    }

    /// Unfold map coordinates back to geodetic ones.
    pub fn unproject(&self, x: f64, y: f64) -> (f64, f64) {
        match *self {
            Self::Lambert(zone) => lambert_unproject(zone, x, y),
            Self::Utm {
                longitude_0,
                hemisphere,
            } => utm_unproject(longitude_0, hemisphere, x, y),
        }
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::Lambert(zone) => {
                let tag = match zone {
                    LambertZone::I => "I",
                    LambertZone::II => "II",
                    LambertZone::IIe => "IIe",
                    LambertZone::III => "III",
                    LambertZone::IV => "IV",
                    LambertZone::Rgf93 => "93",
                };
                write!(f, "Lambert {}", tag)
            }
            Self::Utm {
                longitude_0,
                hemisphere,
            } => {
                let h = match hemisphere {
                    Hemisphere::North => 'N',
                    Hemisphere::South => 'S',
                };
                let zone = (longitude_0 + 183.0) / 6.0;
                if (zone - zone.round()).abs() < 1e-9
                    && (1.0..=60.0).contains(&zone.round())
                {
                    write!(f, "UTM {}{}", zone.round() as i32, h)
                } else {
                    write!(f, "UTM {}{}", longitude_0, h)
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_name_roundtrip() {
        crate::error::set_handler(None);

        for name in [
            "Lambert I",
            "Lambert II",
            "Lambert IIe",
            "Lambert III",
            "Lambert IV",
            "Lambert 93",
            "UTM 31N",
            "UTM 17S",
            "UTM 3.5N",
        ] {
            let projection = Projection::from_name(name).unwrap();
            assert_eq!(projection.name(), name);
        }

        for name in ["Mercator", "Lambert V", "UTM 31", "UTM xN"] {
            let error = Projection::from_name(name).unwrap_err();
            assert_eq!(error.kind(), crate::ErrorKind::BadProjection);
        }
    }

    #[test]
    fn test_utm_31n() {
        crate::error::set_handler(None);
        let projection = Projection::from_name("UTM 31N").unwrap();
        assert_eq!(projection.name(), "UTM 31N");

        // (45, 3) sits on the central meridian of zone 31.
        let (x, y) = projection.project(45.0, 3.0);
        assert_abs_diff_eq!(x, 500_000.0, epsilon = 1e-6);
        assert_abs_diff_eq!(y, 4_982_950.4, epsilon = 1.0);

        let (latitude, longitude) = projection.unproject(x, y);
        assert_abs_diff_eq!(latitude, 45.0, epsilon = 1e-8);
        assert_abs_diff_eq!(longitude, 3.0, epsilon = 1e-8);
    }

    #[test]
    fn test_utm_roundtrip() {
        crate::error::set_handler(None);
        let north = Projection::from_name("UTM 31N").unwrap();
        let south = Projection::from_name("UTM 23S").unwrap();

        for (projection, lat0, lon0) in [(north, 45.0, 3.0), (south, -23.0, -45.0)] {
            for dlat in [-2.0, -0.5, 0.0, 0.5, 2.0] {
                for dlon in [-2.5, -1.0, 0.0, 1.0, 2.5] {
                    let (x, y) = projection.project(lat0 + dlat, lon0 + dlon);
                    let (lat, lon) = projection.unproject(x, y);
                    assert_abs_diff_eq!(lat, lat0 + dlat, epsilon = 1e-8);
                    assert_abs_diff_eq!(lon, lon0 + dlon, epsilon = 1e-8);
                }
            }
        }
    }

    #[test]
    fn test_lambert_roundtrip() {
        crate::error::set_handler(None);

        for zone in [
            LambertZone::I,
            LambertZone::II,
            LambertZone::IIe,
            LambertZone::III,
            LambertZone::IV,
            LambertZone::Rgf93,
        ] {
            let projection = Projection::Lambert(zone);
            for lat in [42.0, 45.0, 48.5] {
                for lon in [-1.5, 2.337, 6.0] {
                    let (x, y) = projection.project(lat, lon);
                    let (plat, plon) = projection.unproject(x, y);
                    assert_abs_diff_eq!(plat, lat, epsilon = 1e-9);
                    assert_abs_diff_eq!(plon, lon, epsilon = 1e-9);
                }
            }
        }
    }

    #[test]
    fn test_lambert_93_false_origin() {
        let projection = Projection::Lambert(LambertZone::Rgf93);
        // The central meridian of Lambert 93 maps to the false easting.
        let (x, _y) = projection.project(46.5, 3.0);
        assert_abs_diff_eq!(x, 700_000.0, epsilon = 1e-6);
    }
}
