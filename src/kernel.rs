// kernel.rs — The horizontal derivative (Sobel-x) kernel.
//
// One output sample is a pure function of the 3×3 source window whose
// top-left corner is (row, col):
//
//   mask = [ 1  0 -1 ]
//          [ 2  0 -2 ]
//          [ 1  0 -1 ]
//
//   sample = s[r][c]   - s[r][c+2]
//          + 2*s[r+1][c] - 2*s[r+1][c+2]
//          + s[r+2][c]   - s[r+2][c+2]
//
// The mathematically signed result spans [-1020, 1020]. It is NOT clamped
// to [0, 255]; the byte stored depends on the active `NumericPolicy`:
//
//   Wrap     every partial sum is kept in a u8 (wrapping arithmetic)
//   Widened  sum in i32, truncate to the low 8 bits on store
//
// Both reduce the same integer modulo 256, so they agree byte-for-byte.
// They remain separate code paths; shaders/sobel_x.wgsl mirrors each one.

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use crate::raster::RasterView;

/// The fixed horizontal derivative mask, row-major.
pub const DERIVATIVE_MASK: [[i32; 3]; 3] = [[1, 0, -1], [2, 0, -2], [1, 0, -1]];

/// Side length of the square window the mask covers.
pub const WINDOW: usize = 3;

/// How the signed kernel sum is narrowed to one output byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NumericPolicy {
    /// Accumulate in an 8-bit unsigned cell; every step wraps modulo 256.
    #[default]
    Wrap,
    /// Accumulate in a signed 32-bit integer, keep the low byte on store.
    Widened,
}

impl NumericPolicy {
    pub const ALL: [NumericPolicy; 2] = [NumericPolicy::Wrap, NumericPolicy::Widened];

    /// Numeric tag shared with the WGSL `Params.policy` field.
    pub fn shader_tag(self) -> u32 {
        match self {
            NumericPolicy::Wrap => 0,
            NumericPolicy::Widened => 1,
        }
    }
}

impl fmt::Display for NumericPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumericPolicy::Wrap => write!(f, "wrap"),
            NumericPolicy::Widened => write!(f, "widened"),
        }
    }
}

impl FromStr for NumericPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wrap" | "u8" => Ok(NumericPolicy::Wrap),
            "widened" | "widen" | "i32" => Ok(NumericPolicy::Widened),
            other => Err(format!("unknown numeric policy '{other}' (expected wrap|widened)")),
        }
    }
}

/// Signed, un-narrowed response of a window. Reference value for tests and
/// for callers that want the full [-1020, 1020] range.
#[inline]
pub fn response(w: &[[u8; 3]; 3]) -> i32 {
    let mut acc = 0i32;
    for (mask_row, px_row) in DERIVATIVE_MASK.iter().zip(w.iter()) {
        for (&m, &p) in mask_row.iter().zip(px_row.iter()) {
            acc += m * p as i32;
        }
    }
    acc
}

#[inline(always)]
fn sample_wrap(a0: u8, a2: u8, b0: u8, b2: u8, c0: u8, c2: u8) -> u8 {
    // Same accumulation order as the widened path, one u8 step at a time.
    let mut acc = a0;
    acc = acc.wrapping_sub(a2);
    acc = acc.wrapping_add(b0.wrapping_mul(2));
    acc = acc.wrapping_sub(b2.wrapping_mul(2));
    acc = acc.wrapping_add(c0);
    acc.wrapping_sub(c2)
}

#[inline(always)]
fn sample_widened(a0: u8, a2: u8, b0: u8, b2: u8, c0: u8, c2: u8) -> u8 {
    let acc = a0 as i32 - a2 as i32 + 2 * b0 as i32 - 2 * b2 as i32 + c0 as i32 - c2 as i32;
    // Two's-complement truncation, no clamping.
    acc as u8
}

/// Evaluate the kernel on an already-gathered window.
#[inline]
pub fn evaluate_window(w: &[[u8; 3]; 3], policy: NumericPolicy) -> u8 {
    match policy {
        NumericPolicy::Wrap => sample_wrap(w[0][0], w[0][2], w[1][0], w[1][2], w[2][0], w[2][2]),
        NumericPolicy::Widened => {
            sample_widened(w[0][0], w[0][2], w[1][0], w[1][2], w[2][0], w[2][2])
        }
    }
}

/// Evaluate the kernel at output index (`row`, `col`).
///
/// # Panics
/// Panics unless `row <= height - 3` and `col <= width - 3`.
#[inline]
pub fn evaluate(src: &RasterView<'_>, row: usize, col: usize, policy: NumericPolicy) -> u8 {
    evaluate_window(&src.window(row, col), policy)
}

/// Evaluate a contiguous run of columns of one output row.
///
/// `out[i]` receives the sample for column `cols.start + i`. This is the
/// unit of work every partition strategy hands to a worker: a disjoint
/// `&mut` slice of the destination plus the read-only source.
///
/// # Panics
/// Panics if `out.len() != cols.len()` or the run leaves the valid region.
pub fn convolve_span(
    src: &RasterView<'_>,
    row: usize,
    cols: Range<usize>,
    out: &mut [u8],
    policy: NumericPolicy,
) {
    assert_eq!(out.len(), cols.len(), "span length mismatch");
    assert!(
        row + WINDOW <= src.height() && cols.end + WINDOW - 1 <= src.width(),
        "span row {row} cols {cols:?} leaves the valid region of {}×{}",
        src.width(),
        src.height(),
    );
    let r0 = &src.row(row)[cols.start..cols.end + 2];
    let r1 = &src.row(row + 1)[cols.start..cols.end + 2];
    let r2 = &src.row(row + 2)[cols.start..cols.end + 2];

    // Policy is resolved once per span, not per pixel.
    match policy {
        NumericPolicy::Wrap => {
            for (i, o) in out.iter_mut().enumerate() {
                *o = sample_wrap(r0[i], r0[i + 2], r1[i], r1[i + 2], r2[i], r2[i + 2]);
            }
        }
        NumericPolicy::Widened => {
            for (i, o) in out.iter_mut().enumerate() {
                *o = sample_widened(r0[i], r0[i + 2], r1[i], r1[i + 2], r2[i], r2[i + 2]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::Raster;

    const FIXED: [[u8; 3]; 3] = [[10, 20, 30], [40, 50, 60], [70, 80, 90]];

    #[test]
    fn test_fixed_vector_signed() {
        // 10-30 + 2*40-2*60 + 70-90 = -80
        assert_eq!(response(&FIXED), -80);
    }

    #[test]
    fn test_fixed_vector_widened() {
        // -80 as two's-complement byte = 256 - 80 = 176
        assert_eq!(evaluate_window(&FIXED, NumericPolicy::Widened), 176);
    }

    #[test]
    fn test_fixed_vector_wrap() {
        // Step by step in u8:
        //   10 - 30  = 236
        //   236 + 80 = 60   (316 mod 256)
        //   60 - 120 = 196  (-60 mod 256)
        //   196 + 70 = 10   (266 mod 256)
        //   10 - 90  = 176  (-80 mod 256)
        assert_eq!(evaluate_window(&FIXED, NumericPolicy::Wrap), 176);
    }

    #[test]
    fn test_extremes_not_clamped() {
        // Left column 255, right column 0 → +1020, low byte 0xFC.
        let hi = [[255, 0, 0], [255, 0, 0], [255, 0, 0]];
        assert_eq!(response(&hi), 1020);
        assert_eq!(evaluate_window(&hi, NumericPolicy::Widened), (1020 % 256) as u8);
        assert_eq!(evaluate_window(&hi, NumericPolicy::Wrap), 252);

        // Mirror → -1020 → 4 (not 0, which clamping would give).
        let lo = [[0, 0, 255], [0, 0, 255], [0, 0, 255]];
        assert_eq!(response(&lo), -1020);
        assert_eq!(evaluate_window(&lo, NumericPolicy::Widened), 4);
        assert_eq!(evaluate_window(&lo, NumericPolicy::Wrap), 4);
    }

    #[test]
    fn test_middle_column_ignored() {
        let a = [[5, 0, 7], [9, 0, 1], [3, 0, 2]];
        let b = [[5, 255, 7], [9, 200, 1], [3, 17, 2]];
        for p in NumericPolicy::ALL {
            assert_eq!(evaluate_window(&a, p), evaluate_window(&b, p));
        }
    }

    #[test]
    fn test_evaluate_matches_window() {
        let r = Raster::from_fn(5, 4, |x, y| (x * 37 + y * 91) as u8);
        let v = r.view();
        for row in 0..2 {
            for col in 0..3 {
                for p in NumericPolicy::ALL {
                    assert_eq!(evaluate(&v, row, col, p), evaluate_window(&v.window(row, col), p));
                }
            }
        }
    }

    #[test]
    fn test_convolve_span_matches_evaluate() {
        let r = Raster::from_fn(9, 5, |x, y| ((x * 53) ^ (y * 29)) as u8);
        let v = r.view();
        let mut out = vec![0u8; 4];
        convolve_span(&v, 2, 3..7, &mut out, NumericPolicy::Widened);
        for (i, &o) in out.iter().enumerate() {
            assert_eq!(o, evaluate(&v, 2, 3 + i, NumericPolicy::Widened));
        }
    }

    #[test]
    #[should_panic(expected = "valid region")]
    fn test_convolve_span_rejects_margin() {
        let r = Raster::new(5, 5);
        let mut out = vec![0u8; 2];
        // cols 2..4 needs source columns up to 5, width is 5.
        convolve_span(&r.view(), 0, 2..4, &mut out, NumericPolicy::Wrap);
    }

    #[test]
    fn test_policy_parse_round_trip() {
        for p in NumericPolicy::ALL {
            assert_eq!(p.to_string().parse::<NumericPolicy>().unwrap(), p);
        }
        assert!("clamp".parse::<NumericPolicy>().is_err());
    }
}
