//! Hex (E)WKB point encoding as used by `PostGIS` geometry columns.
//!
//! Layout: one byte order marker (`0` big-endian, `1` little-endian), a
//! `u32` geometry type whose high bits flag Z/M/SRID, an optional `u32`
//! SRID, then `x` (longitude) and `y` (latitude) as `f64`. Extra Z/M
//! ordinates are ignored.

use crate::Coordinates;

const POINT_TYPE: u32 = 1;
const FLAG_SRID: u32 = 0x2000_0000;
const TYPE_MASK: u32 = 0x0FFF_FFFF;

/// Length in hex characters of the smallest possible point (no SRID).
pub const MIN_POINT_HEX_LEN: usize = 42;

/// Decodes a WKB or EWKB point.
///
/// Returns `None` for truncated input, non-point geometries, or
/// coordinates outside the WGS84 range.
#[must_use]
pub fn decode_point(bytes: &[u8]) -> Option<Coordinates> {
    let mut reader = Reader::new(bytes)?;
    let geometry_type = reader.u32()?;

    // ISO WKB encodes Z/M as +1000/+2000/+3000 instead of flag bits.
    if (geometry_type & TYPE_MASK) % 1000 != POINT_TYPE {
        return None;
    }
    if geometry_type & FLAG_SRID != 0 {
        reader.u32()?;
    }

    let x = reader.f64()?;
    let y = reader.f64()?;
    Coordinates::new(y, x).ok()
}

/// Encodes a point as little-endian hex EWKB, tagging it with `srid` when
/// given.
#[must_use]
pub fn encode_point(point: Coordinates, srid: Option<u32>) -> String {
    let mut bytes = Vec::with_capacity(25);
    bytes.push(1);
    match srid {
        Some(srid) => {
            bytes.extend_from_slice(&(POINT_TYPE | FLAG_SRID).to_le_bytes());
            bytes.extend_from_slice(&srid.to_le_bytes());
        }
        None => bytes.extend_from_slice(&POINT_TYPE.to_le_bytes()),
    }
    bytes.extend_from_slice(&point.longitude.to_le_bytes());
    bytes.extend_from_slice(&point.latitude.to_le_bytes());
    hex::encode_upper(bytes)
}

struct Reader<'a> {
    bytes: &'a [u8],
    little_endian: bool,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Option<Self> {
        let (&order, rest) = bytes.split_first()?;
        let little_endian = match order {
            0 => false,
            1 => true,
            _ => return None,
        };
        Some(Self {
            bytes: rest,
            little_endian,
        })
    }

    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        if self.bytes.len() < N {
            return None;
        }
        let (head, rest) = self.bytes.split_at(N);
        self.bytes = rest;
        head.try_into().ok()
    }

    fn u32(&mut self) -> Option<u32> {
        let raw = self.take::<4>()?;
        Some(if self.little_endian {
            u32::from_le_bytes(raw)
        } else {
            u32::from_be_bytes(raw)
        })
    }

    fn f64(&mut self) -> Option<f64> {
        let raw = self.take::<8>()?;
        Some(if self.little_endian {
            f64::from_le_bytes(raw)
        } else {
            f64::from_be_bytes(raw)
        })
    }
}
