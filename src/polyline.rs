//! Encoded polyline codec.
//!
//! Routing providers ship route geometry in the Google encoded polyline
//! format at precision 5: each coordinate is a zigzag-encoded delta from
//! the previous one, split into 5-bit chunks offset by 63.

use crate::error::{NavError, Result};
use crate::geometry::Point;

const FACTOR: f64 = 1e5;

/// Decode an encoded polyline into (lat, lon) points.
pub fn decode(encoded: &str) -> Result<Vec<Point>> {
    let bytes = encoded.as_bytes();
    let mut index = 0;
    let mut lat: i64 = 0;
    let mut lon: i64 = 0;
    let mut points = Vec::new();

    while index < bytes.len() {
        lat = accumulate(lat, next_delta(bytes, &mut index)?)?;
        lon = accumulate(lon, next_delta(bytes, &mut index)?)?;

        let point = Point {
            lat: lat as f64 / FACTOR,
            lon: lon as f64 / FACTOR,
        };
        if point.lat.abs() > 90.0 || point.lon.abs() > 180.0 {
            return Err(NavError::RouteFetch(format!(
                "polyline point {}, {} out of range",
                point.lat, point.lon
            )));
        }
        points.push(point);
    }

    Ok(points)
}

/// Encode points into a polyline string.
pub fn encode(points: &[Point]) -> String {
    let mut out = String::new();
    let mut prev_lat: i64 = 0;
    let mut prev_lon: i64 = 0;

    for p in points {
        let lat = (p.lat * FACTOR).round() as i64;
        let lon = (p.lon * FACTOR).round() as i64;
        push_delta(&mut out, lat - prev_lat);
        push_delta(&mut out, lon - prev_lon);
        prev_lat = lat;
        prev_lon = lon;
    }

    out
}

fn accumulate(value: i64, delta: i64) -> Result<i64> {
    value
        .checked_add(delta)
        .ok_or_else(|| NavError::RouteFetch("polyline value overflow".to_string()))
}

fn next_delta(bytes: &[u8], index: &mut usize) -> Result<i64> {
    let mut result: i64 = 0;
    let mut shift = 0;

    loop {
        let byte = *bytes
            .get(*index)
            .ok_or_else(|| NavError::RouteFetch("truncated polyline".to_string()))?;
        let chunk = i64::from(byte) - 63;
        if !(0..64).contains(&chunk) {
            return Err(NavError::RouteFetch(format!(
                "invalid polyline character {:?} at {}",
                byte as char, *index
            )));
        }
        *index += 1;

        result |= (chunk & 0x1f) << shift;
        shift += 5;

        if chunk < 0x20 {
            break;
        }
        if shift > 60 {
            return Err(NavError::RouteFetch("polyline value overflow".to_string()));
        }
    }

    if result & 1 == 1 {
        Ok(!(result >> 1))
    } else {
        Ok(result >> 1)
    }
}

fn push_delta(out: &mut String, delta: i64) {
    let mut value = delta << 1;
    if delta < 0 {
        value = !value;
    }

    while value >= 0x20 {
        out.push(char::from((0x20 | (value & 0x1f)) as u8 + 63));
        value >>= 5;
    }
    out.push(char::from(value as u8 + 63));
}
