// Copyright 2025 the Spatialq Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Z-order (Morton) codes for sorting points along a space-filling curve.

use kurbo::{Point, Rect};

/// Largest quantized coordinate per axis.
pub const MAX_COORD: u16 = u16::MAX;

/// Spread the 16 bits of `v` over the even bits of a `u32`.
#[inline]
const fn spread(v: u16) -> u32 {
    let mut x = v as u32;
    x = (x | (x << 8)) & 0x00ff_00ff;
    x = (x | (x << 4)) & 0x0f0f_0f0f;
    x = (x | (x << 2)) & 0x3333_3333;
    x = (x | (x << 1)) & 0x5555_5555;
    x
}

/// Inverse of [`spread`].
#[inline]
#[allow(clippy::cast_possible_truncation, reason = "masked to 16 bits")]
const fn compact(v: u32) -> u16 {
    let mut x = v & 0x5555_5555;
    x = (x | (x >> 1)) & 0x3333_3333;
    x = (x | (x >> 2)) & 0x0f0f_0f0f;
    x = (x | (x >> 4)) & 0x00ff_00ff;
    x = (x | (x >> 8)) & 0x0000_ffff;
    x as u16
}

/// Interleave two 16-bit coordinates; `x` occupies the even bits.
#[inline]
pub const fn encode(x: u16, y: u16) -> u32 {
    spread(x) | (spread(y) << 1)
}

/// Split a code back into its coordinates.
#[inline]
pub const fn decode(code: u32) -> (u16, u16) {
    (compact(code), compact(code >> 1))
}

/// Map `p` into the `[0, MAX_COORD]` grid spanned by `bounds`.
///
/// Degenerate axes map to 0; points outside `bounds` are clamped.
pub fn quantize(p: Point, bounds: Rect) -> (u16, u16) {
    #[allow(
        clippy::cast_possible_truncation,
        reason = "the scaled value is in [0, MAX_COORD]"
    )]
    fn axis(v: f64, lo: f64, hi: f64) -> u16 {
        let extent = hi - lo;
        if extent <= 0.0 || !extent.is_finite() {
            return 0;
        }
        let t = ((v - lo) / extent).clamp(0.0, 1.0);
        (t * f64::from(MAX_COORD)).round() as u16
    }
    (
        axis(p.x, bounds.x0, bounds.x1),
        axis(p.y, bounds.y0, bounds.y1),
    )
}

/// Morton code of `p` relative to `bounds`.
pub fn code(p: Point, bounds: Rect) -> u32 {
    let (x, y) = quantize(p, bounds);
    encode(x, y)
}
