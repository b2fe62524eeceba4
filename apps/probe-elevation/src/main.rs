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
use anyhow::{bail, Result};
use nalgebra::Vector3;
use std::{path::PathBuf, sync::Arc};
use structopt::StructOpt;
use terrapin::{ecef, Map, Stack, Stepper, TileFormat};

#[derive(Debug, StructOpt)]
#[structopt(
    name = "probe-elevation",
    about = "Query elevation data sets.\n\n\
             Layers are stacked flat < tiles < map, the last one winning. \
             Points are `latitude longitude` pairs, or `x y z` ECEF \
             triplets with --ecef."
)]
struct Opt {
    /// A projected map to query (.png or .grd).
    #[structopt(short, long)]
    map: Option<PathBuf>,

    /// A directory of elevation tiles to query.
    #[structopt(short, long)]
    stack: Option<PathBuf>,

    /// The tile layout under --stack: gdem2 or hgt.
    #[structopt(long, default_value = "hgt")]
    tile_format: String,

    /// The number of tiles kept in memory.
    #[structopt(long, default_value = "4")]
    cache_size: usize,

    /// A flat fallback ground level, in m.
    #[structopt(short, long)]
    flat: Option<f64>,

    /// A geoid undulation map (.grd), for altitudes w.r.t. the mean sea
    /// level.
    #[structopt(short, long)]
    geoid: Option<PathBuf>,

    /// Validity range of the local transform approximation, in m.
    #[structopt(short, long, default_value = "0")]
    range: f64,

    /// Interpret points as ECEF coordinates.
    #[structopt(long)]
    ecef: bool,

    /// The points to query.
    points: Vec<f64>,
}

fn main() -> Result<()> {
    env_logger::init();
    let opt = Opt::from_args();

    // Errors are reported through the returned codes only.
    terrapin::set_handler(None);

    let mut stepper = Stepper::new();
    if let Some(ground_level) = opt.flat {
        stepper.add_flat(ground_level);
    }
    if let Some(directory) = &opt.stack {
        let format = match opt.tile_format.as_str() {
            "gdem2" => TileFormat::AsterGdem2,
            "hgt" => TileFormat::SrtmHgt,
            other => bail!("unknown tile format `{}'", other),
        };
        let stack = Arc::new(Stack::new(directory, format, opt.cache_size, None));
        stepper.add_stack(&stack)?;
    }
    if let Some(path) = &opt.map {
        stepper.add_map(&Arc::new(Map::load(path)?));
    }
    if let Some(path) = &opt.geoid {
        stepper.set_geoid(Some(Arc::new(Map::load(path)?)));
    }
    stepper.set_range(opt.range);

    let stride = if opt.ecef { 3 } else { 2 };
    if opt.points.is_empty() || (opt.points.len() % stride != 0) {
        bail!("expected a multiple of {} point coordinates", stride);
    }

    println!("latitude longitude altitude ground layer");
    for point in opt.points.chunks(stride) {
        let position = if opt.ecef {
            Vector3::new(point[0], point[1], point[2])
        } else {
            ecef::ecef_from_geodetic(point[0], point[1], 0.0)
        };
        let step = stepper.step(&position)?;
        match step.layer {
            Some(layer) => println!(
                "{:.6} {:.6} {:.3} {:.3} {}",
                step.latitude, step.longitude, step.altitude, step.ground, layer
            ),
            None => println!(
                "{:.6} {:.6} {:.3} - -",
                step.latitude, step.longitude, step.altitude
            ),
        }
    }

    Ok(())
}
