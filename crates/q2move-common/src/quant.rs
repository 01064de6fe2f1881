// quant.rs -- 12.3 fixed point used for networked origins and velocities

use crate::q_shared::Vec3;

/// Fixed-point counts per world unit.
pub const QUANT_SCALE: f32 = 8.0;
/// World units per fixed-point count.
pub const QUANT_STEP: f32 = 1.0 / QUANT_SCALE;

/// Truncate toward zero to the nearest eighth of a unit. Out-of-range
/// values saturate at the `i16` limits instead of wrapping; inside the
/// +/-4096 map bounds the two agree.
#[inline]
pub fn quantize(v: f32) -> i16 {
    (v * QUANT_SCALE) as i16
}

#[inline]
pub fn dequantize(q: i16) -> f32 {
    q as f32 * QUANT_STEP
}

pub fn quantize_vec(v: &Vec3) -> [i16; 3] {
    [quantize(v[0]), quantize(v[1]), quantize(v[2])]
}

pub fn dequantize_vec(q: &[i16; 3]) -> Vec3 {
    [dequantize(q[0]), dequantize(q[1]), dequantize(q[2])]
}
