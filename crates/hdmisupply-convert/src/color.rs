//! Rec.709 YCbCr to RGB matrixing
//!
//! Code values are de-biased (luma by the range offset, chroma by 512),
//! pushed through a fixed 3×3 matrix whose luma column is the range gain,
//! and scaled by 1/1023 so nominal white lands near 1.0.
//!
//! ```text
//! R = (Y' * gain                 + Cr' * 1.793) / 1023
//! G = (Y' * gain + Cb' * -0.213  + Cr' * -0.533) / 1023
//! B = (Y' * gain + Cb' *  2.112                ) / 1023
//! ```

use crate::encode::{HalfBackend, HalfEncoder};
use crate::v210::{YCbCr, CHUNK_PIXELS};

/// Chroma zero point for 10-bit samples
pub const CHROMA_OFFSET: f32 = 512.0;

/// Full-scale divisor for 10-bit samples
pub const SCALE: f32 = 1023.0;

/// Chroma columns of the Rec.709 matrix: `[Cb, Cr]` weights per output channel
pub const REC709_CHROMA: [[f32; 2]; 3] = [
    [0.000, 1.793],   // R
    [-0.213, -0.533], // G
    [2.112, 0.000],   // B
];

/// Luma encoding convention of the incoming signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LumaRange {
    /// Video levels, black at 64 (16 in 8-bit terms)
    #[default]
    Limited,
    /// Headroom included, black at 0
    Full,
}

impl LumaRange {
    /// Luma code value subtracted before matrixing
    pub fn offset(self) -> f32 {
        match self {
            Self::Limited => 64.0,
            Self::Full => 0.0,
        }
    }

    /// Luma column of the matrix
    pub fn gain(self) -> f32 {
        match self {
            Self::Limited => 1.164,
            Self::Full => 1.0,
        }
    }

    /// Map the host's "YUV headroom" switch to a range
    pub fn from_headroom(headroom: bool) -> Self {
        if headroom {
            Self::Full
        } else {
            Self::Limited
        }
    }
}

/// Convert one pixel to linear-scaled RGB floats
///
/// Evaluation order is fixed (luma term, then Cb, then Cr, then scale) so
/// results are reproducible from the constants alone.
#[inline]
pub fn ycbcr_to_rgb(px: YCbCr, range: LumaRange) -> [f32; 3] {
    let y = px.y - range.offset();
    let cb = px.cb - CHROMA_OFFSET;
    let cr = px.cr - CHROMA_OFFSET;
    let gain = range.gain();

    REC709_CHROMA.map(|[kb, kr]| (y * gain + cb * kb + cr * kr) / SCALE)
}

/// Per-call pixel converter: colour matrix plus half-float encoding
#[derive(Debug, Clone, Copy)]
pub struct ColorConverter {
    range: LumaRange,
    backend: HalfBackend,
}

impl ColorConverter {
    pub fn new(range: LumaRange, backend: HalfBackend) -> Self {
        Self { range, backend }
    }

    pub fn range(&self) -> LumaRange {
        self.range
    }

    pub fn backend(&self) -> HalfBackend {
        self.backend
    }

    /// Convert one pixel to three half-float components
    pub fn convert_pixel(&self, px: YCbCr) -> [u16; 3] {
        let rgb = ycbcr_to_rgb(px, self.range);
        let mut out = [0u16; 3];
        self.backend.encode(&rgb, &mut out);
        out
    }

    /// Convert one unpacked chunk into 18 interleaved RGB components
    #[inline]
    pub fn convert_chunk(&self, pixels: &[YCbCr; CHUNK_PIXELS], out: &mut [u16]) {
        let mut floats = [0.0f32; CHUNK_PIXELS * 3];
        for (dst, px) in floats.chunks_exact_mut(3).zip(pixels) {
            dst.copy_from_slice(&ycbcr_to_rgb(*px, self.range));
        }
        self.backend.encode(&floats, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::SoftwareHalf;

    fn px(y: f32, cb: f32, cr: f32) -> YCbCr {
        YCbCr { y, cb, cr }
    }

    #[test]
    fn test_limited_black_is_zero() {
        let rgb = ycbcr_to_rgb(px(64.0, 512.0, 512.0), LumaRange::Limited);
        assert_eq!(rgb, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_full_black_is_zero() {
        let rgb = ycbcr_to_rgb(px(0.0, 512.0, 512.0), LumaRange::Full);
        assert_eq!(rgb, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_limited_white_is_near_one() {
        // 940 is nominal 10-bit white
        let rgb = ycbcr_to_rgb(px(940.0, 512.0, 512.0), LumaRange::Limited);
        for c in rgb {
            assert!((c - 0.997).abs() < 0.01, "{c}");
        }
    }

    #[test]
    fn test_neutral_chroma_gives_grey() {
        let rgb = ycbcr_to_rgb(px(500.0, 512.0, 512.0), LumaRange::Full);
        assert_eq!(rgb[0], rgb[1]);
        assert_eq!(rgb[1], rgb[2]);
    }

    #[test]
    fn test_red_chroma_raises_red() {
        let rgb = ycbcr_to_rgb(px(500.0, 512.0, 800.0), LumaRange::Limited);
        assert!(rgb[0] > rgb[2]);
        assert!(rgb[1] < rgb[2]);
    }

    #[test]
    fn test_range_constants() {
        assert_eq!((LumaRange::Limited.offset(), LumaRange::Limited.gain()), (64.0, 1.164));
        assert_eq!((LumaRange::Full.offset(), LumaRange::Full.gain()), (0.0, 1.0));
        assert_eq!(LumaRange::from_headroom(true), LumaRange::Full);
        assert_eq!(LumaRange::from_headroom(false), LumaRange::Limited);
    }

    #[test]
    fn test_convert_chunk_matches_pixels() {
        let conv = ColorConverter::new(LumaRange::Limited, HalfBackend::Software(SoftwareHalf));
        let pixels: [YCbCr; CHUNK_PIXELS] =
            std::array::from_fn(|i| px(100.0 + 50.0 * i as f32, 300.0, 700.5));

        let mut out = [0u16; CHUNK_PIXELS * 3];
        conv.convert_chunk(&pixels, &mut out);

        for (i, p) in pixels.iter().enumerate() {
            assert_eq!(out[i * 3..i * 3 + 3], conv.convert_pixel(*p));
        }
    }
}
