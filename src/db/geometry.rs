//! EWKB codec for the geometry columns this crate writes and reads
//! (`geometry(Point,4326)` and `geometry(Polygon,4326)`).
//!
//! Adapted from `openmander`'s minimal WKB encoder/decoder
//! (`src/io/wkb/{read,write}.rs`), extended with the PostGIS EWKB SRID flag
//! so geometry round-trips through `sqlx` as raw bytes without a spatial
//! extension crate.

use anyhow::{anyhow, Context, Result};
use geo::{Coord, LineString, Point, Polygon};
use std::io::{Read, Write};

const WKB_LE: u8 = 1;
const EWKB_SRID_FLAG: u32 = 0x2000_0000;
const WKB_POINT: u32 = 1;
const WKB_POLYGON: u32 = 3;

pub const WGS84_SRID: u32 = 4326;

fn write_header(out: &mut Vec<u8>, geom_type: u32, srid: u32) -> Result<()> {
    out.write_all(&[WKB_LE])?;
    out.write_all(&(geom_type | EWKB_SRID_FLAG).to_le_bytes())?;
    out.write_all(&srid.to_le_bytes())?;
    Ok(())
}

struct Cursor<'a> {
    inner: std::io::Cursor<&'a [u8]>,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { inner: std::io::Cursor::new(bytes) }
    }

    fn u32(&mut self, little_endian: bool) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.inner.read_exact(&mut buf).context("[ewkb] truncated u32")?;
        Ok(if little_endian { u32::from_le_bytes(buf) } else { u32::from_be_bytes(buf) })
    }

    fn f64(&mut self, little_endian: bool) -> Result<f64> {
        let mut buf = [0u8; 8];
        self.inner.read_exact(&mut buf).context("[ewkb] truncated f64")?;
        Ok(if little_endian { f64::from_le_bytes(buf) } else { f64::from_be_bytes(buf) })
    }

    fn header(&mut self) -> Result<(bool, u32, Option<u32>)> {
        let mut byte_order = [0u8; 1];
        self.inner.read_exact(&mut byte_order).context("[ewkb] truncated byte order")?;
        let little_endian = byte_order[0] == WKB_LE;
        let raw_type = self.u32(little_endian)?;
        let has_srid = raw_type & EWKB_SRID_FLAG != 0;
        let srid = if has_srid { Some(self.u32(little_endian)?) } else { None };
        Ok((little_endian, raw_type & !EWKB_SRID_FLAG, srid))
    }

    fn ring(&mut self, little_endian: bool) -> Result<LineString<f64>> {
        let count = self.u32(little_endian)? as usize;
        let mut coords = Vec::with_capacity(count);
        for _ in 0..count {
            let x = self.f64(little_endian)?;
            let y = self.f64(little_endian)?;
            coords.push(Coord { x, y });
        }
        Ok(LineString::from(coords))
    }
}

/// Encode a point as EWKB with SRID 4326.
pub fn point_to_ewkb(point: Point<f64>) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(25);
    write_header(&mut out, WKB_POINT, WGS84_SRID)?;
    out.write_all(&point.x().to_le_bytes())?;
    out.write_all(&point.y().to_le_bytes())?;
    Ok(out)
}

/// Decode an EWKB point.
pub fn point_from_ewkb(bytes: &[u8]) -> Result<Point<f64>> {
    let mut cur = Cursor::new(bytes);
    let (le, geom_type, _srid) = cur.header()?;
    if geom_type != WKB_POINT {
        return Err(anyhow!("[ewkb] expected Point, got type {geom_type}"));
    }
    let x = cur.f64(le)?;
    let y = cur.f64(le)?;
    Ok(Point::new(x, y))
}

/// Encode a polygon (exterior + holes) as EWKB with SRID 4326.
pub fn polygon_to_ewkb(poly: &Polygon<f64>) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_header(&mut out, WKB_POLYGON, WGS84_SRID)?;

    let num_rings = 1 + poly.interiors().len();
    out.write_all(&(num_rings as u32).to_le_bytes())?;

    for ring in std::iter::once(poly.exterior()).chain(poly.interiors()) {
        out.write_all(&(ring.0.len() as u32).to_le_bytes())?;
        for coord in ring.coords() {
            out.write_all(&coord.x.to_le_bytes())?;
            out.write_all(&coord.y.to_le_bytes())?;
        }
    }
    Ok(out)
}

/// Decode an EWKB polygon.
pub fn polygon_from_ewkb(bytes: &[u8]) -> Result<Polygon<f64>> {
    let mut cur = Cursor::new(bytes);
    let (le, geom_type, _srid) = cur.header()?;
    if geom_type != WKB_POLYGON {
        return Err(anyhow!("[ewkb] expected Polygon, got type {geom_type}"));
    }
    let num_rings = cur.u32(le)?;
    if num_rings == 0 {
        return Err(anyhow!("[ewkb] polygon must have at least one ring"));
    }
    let exterior = cur.ring(le)?;
    let mut interiors = Vec::with_capacity(num_rings as usize - 1);
    for _ in 1..num_rings {
        interiors.push(cur.ring(le)?);
    }
    Ok(Polygon::new(exterior, interiors))
}
