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

//! Terrapin's own map format: a 16 bit grayscale PNG with the grid
//! geometry embedded as a JSON `tEXt` chunk:
//!
//! ```text
//! {"projection": "UTM 31N", "x": [x0, x1], "y": [y0, y1],
//!  "z": [z0, z1], "encoding": "uint16"}
//! ```

use super::RawMap;
use crate::{
    error::{raise, ErrorKind, Result},
    map::Map,
    projection::Projection,
};
use json::JsonValue;
use std::{
    fs::File,
    io::BufWriter,
    path::Path,
};

const METADATA_KEYWORD: &str = "Comment";
const ENCODING: &str = "uint16";

fn parse_range(meta: &JsonValue, key: &str, path: &Path) -> Result<[f64; 2]> {
    let lo = meta[key][0].as_f64();
    let hi = meta[key][1].as_f64();
    match (lo, hi) {
        (Some(lo), Some(hi)) => Ok([lo, hi]),
        _ => Err(raise(
            ErrorKind::BadJson,
            "Map::load",
            format!("missing `{}' range in `{}'", key, path.display()),
        )),
    }
}

pub(crate) fn load(path: &Path) -> Result<RawMap> {
    let file = File::open(path).map_err(|what| {
        raise(
            ErrorKind::PathError,
            "Map::load",
            format!("could not open file `{}' ({})", path.display(), what),
        )
    })?;

    let decoder = png::Decoder::new(file);
    let mut reader = decoder.read_info().map_err(|what| {
        raise(
            ErrorKind::BadFormat,
            "Map::load",
            format!("invalid png file `{}' ({})", path.display(), what),
        )
    })?;

    // The metadata chunk carries everything the pixels do not.
    let text = reader
        .info()
        .uncompressed_latin1_text
        .iter()
        .find(|chunk| chunk.keyword == METADATA_KEYWORD)
        .map(|chunk| chunk.text.clone())
        .ok_or_else(|| {
            raise(
                ErrorKind::BadJson,
                "Map::load",
                format!("missing metadata in `{}'", path.display()),
            )
        })?;
    let meta = json::parse(&text).map_err(|what| {
        raise(
            ErrorKind::BadJson,
            "Map::load",
            format!("invalid metadata in `{}' ({})", path.display(), what),
        )
    })?;

    let x = parse_range(&meta, "x", path)?;
    let y = parse_range(&meta, "y", path)?;
    let z = parse_range(&meta, "z", path)?;
    if !meta["encoding"].is_null() && (meta["encoding"].as_str() != Some(ENCODING)) {
        return Err(raise(
            ErrorKind::BadFormat,
            "Map::load",
            format!("unsupported encoding in `{}'", path.display()),
        ));
    }
    let projection = match meta["projection"].as_str() {
        None | Some("") => None,
        Some(name) => Some(Projection::from_name(name)?),
    };

    let mut buffer = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buffer).map_err(|what| {
        raise(
            ErrorKind::BadFormat,
            "Map::load",
            format!("invalid png file `{}' ({})", path.display(), what),
        )
    })?;
    if (info.bit_depth != png::BitDepth::Sixteen)
        || (info.color_type != png::ColorType::Grayscale)
    {
        return Err(raise(
            ErrorKind::BadFormat,
            "Map::load",
            format!("`{}' is not a 16 bit grayscale png", path.display()),
        ));
    }

    let nx = info.width as usize;
    let ny = info.height as usize;
    let mut data = vec![0_u16; nx * ny];
    for iy in 0..ny {
        // The png rows run from the north; the grid starts at the south.
        let row = &buffer[(ny - 1 - iy) * 2 * nx..(ny - iy) * 2 * nx];
        for (ix, sample) in row.chunks_exact(2).enumerate() {
            data[iy * nx + ix] = u16::from_be_bytes([sample[0], sample[1]]);
        }
    }

    Ok(RawMap {
        nx,
        ny,
        x,
        y,
        z,
        data,
        projection,
    })
}

pub(crate) fn dump(path: &Path, map: &Map) -> Result<()> {
    let info = map.info();
    let mut meta = JsonValue::new_object();
    meta["projection"] = match map.projection() {
        Some(projection) => projection.name().into(),
        None => "".into(),
    };
    meta["x"] = vec![info.x[0], info.x[1]].into();
    meta["y"] = vec![info.y[0], info.y[1]].into();
    meta["z"] = vec![info.z[0], info.z[1]].into();
    meta["encoding"] = ENCODING.into();

    let file = File::create(path).map_err(|what| {
        raise(
            ErrorKind::PathError,
            "Map::dump",
            format!("could not create file `{}' ({})", path.display(), what),
        )
    })?;

    let mut encoder = png::Encoder::new(BufWriter::new(file), info.nx as u32, info.ny as u32);
    encoder.set_color(png::ColorType::Grayscale);
    encoder.set_depth(png::BitDepth::Sixteen);
    encoder
        .add_text_chunk(METADATA_KEYWORD.to_owned(), meta.dump())
        .and_then(|_| {
            let mut bytes = Vec::with_capacity(info.nx * info.ny * 2);
            for iy in (0..info.ny).rev() {
                for &sample in &map.data()[iy * info.nx..(iy + 1) * info.nx] {
                    bytes.extend_from_slice(&sample.to_be_bytes());
                }
            }
            encoder.write_header()?.write_image_data(&bytes)
        })
        .map_err(|what| {
            raise(
                ErrorKind::BadFormat,
                "Map::dump",
                format!("could not encode `{}' ({})", path.display(), what),
            )
        })
}
