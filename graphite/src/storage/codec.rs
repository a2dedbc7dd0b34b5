//! Fixed-width point encoding: an 8 byte big-endian timestamp followed by
//! the 8 byte big-endian IEEE-754 bit pattern of the value.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{Error, Result};

pub(crate) const POINT_LEN: usize = 16;

pub(crate) fn encode_point(buf: &mut BytesMut, timestamp: i64, value: f64) {
    buf.put_i64(timestamp);
    buf.put_u64(value.to_bits());
}

pub(crate) fn encode_points(points: &[(i64, f64)]) -> Bytes {
    let mut buf = BytesMut::with_capacity(points.len() * POINT_LEN);
    for &(ts, value) in points {
        encode_point(&mut buf, ts, value);
    }
    buf.freeze()
}

pub(crate) fn decode_points(mut buf: &[u8]) -> Result<Vec<(i64, f64)>> {
    if buf.len() % POINT_LEN != 0 {
        return Err(Error::Encoding(format!(
            "point buffer length {} is not a multiple of {}",
            buf.len(),
            POINT_LEN
        )));
    }
    let mut points = Vec::with_capacity(buf.len() / POINT_LEN);
    while buf.has_remaining() {
        let ts = buf.get_i64();
        let value = f64::from_bits(buf.get_u64());
        points.push((ts, value));
    }
    Ok(points)
}
