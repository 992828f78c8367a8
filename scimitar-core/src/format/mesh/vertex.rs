//! Per-vertex field decoders for the quantized mesh streams.
//!
//! The divisors mirror the serialized encoding exactly: positions scale by
//! `s / 0x7FFF`, packed unit vectors map `[0, 254]` to `[-1, 1+ε]` via
//! `x / 0x7F - 1`. Do not "fix" them to 127.5 or 128 without validating
//! against reference exports.

use std::io::{Read, Seek};

use binrw::{BinRead, BinResult};
use glam::{Vec2, Vec3, Vec4};
use half::f16;

/// Quantized position: four i16 `(x, y, z, s)` where `s` is the scale.
pub(super) fn read_quantized_pos<R: Read + Seek>(r: &mut R) -> BinResult<Vec3> {
    let [x, y, z, s] = <[i16; 4]>::read_le(r)?;
    let s = s as f32;
    Ok(Vec3::new(
        x as f32 * s / 0x7FFF as f32,
        y as f32 * s / 0x7FFF as f32,
        z as f32 * s / 0x7FFF as f32,
    ))
}

/// Full-precision position: three f32.
pub(super) fn read_pos<R: Read + Seek>(r: &mut R) -> BinResult<Vec3> {
    let [x, y, z] = <[f32; 3]>::read_le(r)?;
    Ok(Vec3::new(x, y, z))
}

/// Packed unit vector: four u8, the last ignored.
pub(super) fn read_packed_vec<R: Read + Seek>(r: &mut R) -> BinResult<Vec3> {
    let [x, y, z, _] = <[u8; 4]>::read_le(r)?;
    Ok(Vec3::new(
        x as f32 / 0x7F as f32 - 1.0,
        y as f32 / 0x7F as f32 - 1.0,
        z as f32 / 0x7F as f32 - 1.0,
    ))
}

/// Packed RGBA color: four u8 scaled to `[0, 1]`.
pub(super) fn read_packed_color<R: Read + Seek>(r: &mut R) -> BinResult<Vec4> {
    let [r_, g, b, a] = <[u8; 4]>::read_le(r)?;
    Ok(Vec4::new(
        r_ as f32 / 255.0,
        g as f32 / 255.0,
        b as f32 / 255.0,
        a as f32 / 255.0,
    ))
}

/// UV pair as two IEEE-754 half floats.
pub(super) fn read_half_uv<R: Read + Seek>(r: &mut R) -> BinResult<Vec2> {
    let [u, v] = <[u16; 2]>::read_le(r)?;
    Ok(Vec2::new(
        f16::from_bits(u).to_f32(),
        f16::from_bits(v).to_f32(),
    ))
}
