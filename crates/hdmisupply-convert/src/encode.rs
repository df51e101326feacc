//! Float to half-float encoding backends
//!
//! Two interchangeable encoders turn `f32` components into IEEE 754
//! binary16 bit patterns:
//!
//! - [`F16cHalf`] uses the x86 F16C `vcvtps2ph` instruction
//! - [`SoftwareHalf`] uses the `half` crate's portable conversion
//!
//! Both round to nearest, ties to even, so for finite inputs they produce
//! bit-identical output. The backend is chosen once at startup with
//! [`HalfBackend::select`].

use tracing::info;

use crate::error::{ConversionError, Result};

/// Strategy for encoding `f32` components as half-float bits
pub trait HalfEncoder: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Encode `src` into `dst`
    ///
    /// `dst` must be at least as long as `src`.
    fn encode(&self, src: &[f32], dst: &mut [u16]);
}

/// Portable software encoder
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareHalf;

impl HalfEncoder for SoftwareHalf {
    fn name(&self) -> &'static str {
        "software"
    }

    #[inline]
    fn encode(&self, src: &[f32], dst: &mut [u16]) {
        for (d, &s) in dst.iter_mut().zip(src) {
            // from_f32_const never dispatches to hardware conversion
            *d = half::f16::from_f32_const(s).to_bits();
        }
    }
}

/// Hardware encoder using the F16C instruction set
///
/// Can only be constructed on CPUs that report F16C support.
#[derive(Debug, Clone, Copy)]
pub struct F16cHalf {
    _detected: (),
}

impl F16cHalf {
    /// Check the CPU and return the encoder if F16C is present
    pub fn detect() -> Option<Self> {
        if cpu_supports_f16c() {
            Some(Self { _detected: () })
        } else {
            None
        }
    }
}

impl HalfEncoder for F16cHalf {
    fn name(&self) -> &'static str {
        "f16c"
    }

    #[inline]
    fn encode(&self, src: &[f32], dst: &mut [u16]) {
        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        {
            // SAFETY: an F16cHalf only exists after detect() confirmed F16C support.
            unsafe { f16c::encode(src, dst) }
        }

        #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
        {
            SoftwareHalf.encode(src, dst);
        }
    }
}

/// Whether the running CPU can do hardware half-float conversion
pub fn cpu_supports_f16c() -> bool {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        std::arch::is_x86_feature_detected!("f16c")
    }

    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
    {
        false
    }
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
mod f16c {
    #[cfg(target_arch = "x86")]
    use std::arch::x86::{__m128i, _mm_cvtps_ph, _mm_loadu_ps, _mm_storel_epi64, _MM_FROUND_TO_NEAREST_INT};
    #[cfg(target_arch = "x86_64")]
    use std::arch::x86_64::{
        __m128i, _mm_cvtps_ph, _mm_loadu_ps, _mm_storel_epi64, _MM_FROUND_TO_NEAREST_INT,
    };

    /// Convert four lanes at a time, padding the tail
    ///
    /// # Safety
    ///
    /// The CPU must support F16C and `dst.len() >= src.len()`.
    #[target_feature(enable = "f16c")]
    pub(super) unsafe fn encode(src: &[f32], dst: &mut [u16]) {
        let dst = &mut dst[..src.len()];
        let mut src_lanes = src.chunks_exact(4);
        let mut dst_lanes = dst.chunks_exact_mut(4);

        for (s, d) in (&mut src_lanes).zip(&mut dst_lanes) {
            // SAFETY: s holds exactly 4 floats and d exactly 4 u16 (8 bytes);
            // both intrinsics are unaligned accesses.
            unsafe {
                let packed = _mm_cvtps_ph::<_MM_FROUND_TO_NEAREST_INT>(_mm_loadu_ps(s.as_ptr()));
                _mm_storel_epi64(d.as_mut_ptr().cast::<__m128i>(), packed);
            }
        }

        let tail = src_lanes.remainder();
        if !tail.is_empty() {
            let mut lanes = [0.0f32; 4];
            lanes[..tail.len()].copy_from_slice(tail);
            let mut out = [0u16; 4];
            // SAFETY: fixed 4-lane local arrays.
            unsafe {
                let packed = _mm_cvtps_ph::<_MM_FROUND_TO_NEAREST_INT>(_mm_loadu_ps(lanes.as_ptr()));
                _mm_storel_epi64(out.as_mut_ptr().cast::<__m128i>(), packed);
            }
            dst_lanes
                .into_remainder()
                .copy_from_slice(&out[..tail.len()]);
        }
    }
}

/// Which half-float backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HalfPreference {
    /// Hardware when the CPU supports it, software otherwise
    #[default]
    Auto,
    /// Require F16C; selection fails without it
    Hardware,
    /// Always use the software path
    Software,
}

/// The backend selected at startup
#[derive(Debug, Clone, Copy)]
pub enum HalfBackend {
    F16c(F16cHalf),
    Software(SoftwareHalf),
}

impl HalfBackend {
    /// Check the CPU and pick a backend according to `preference`
    pub fn select(preference: HalfPreference) -> Result<Self> {
        let backend = match preference {
            HalfPreference::Software => Self::Software(SoftwareHalf),
            HalfPreference::Hardware => match F16cHalf::detect() {
                Some(hw) => Self::F16c(hw),
                None => {
                    return Err(ConversionError::BackendUnavailable(
                        "CPU does not support F16C".to_string(),
                    ))
                }
            },
            HalfPreference::Auto => match F16cHalf::detect() {
                Some(hw) => {
                    info!("CPU supports F16C hardware half-float conversion");
                    Self::F16c(hw)
                }
                None => {
                    info!("CPU lacks F16C, using software half-float conversion");
                    Self::Software(SoftwareHalf)
                }
            },
        };

        info!("Selected {} half-float backend", backend.name());
        Ok(backend)
    }

    /// Pick the best backend available on this CPU
    pub fn detect() -> Self {
        match F16cHalf::detect() {
            Some(hw) => Self::F16c(hw),
            None => Self::Software(SoftwareHalf),
        }
    }

    /// Whether this is the hardware path
    pub fn is_hardware(&self) -> bool {
        matches!(self, Self::F16c(_))
    }
}

impl HalfEncoder for HalfBackend {
    fn name(&self) -> &'static str {
        match self {
            Self::F16c(hw) => hw.name(),
            Self::Software(sw) => sw.name(),
        }
    }

    #[inline]
    fn encode(&self, src: &[f32], dst: &mut [u16]) {
        match self {
            Self::F16c(hw) => hw.encode(src, dst),
            Self::Software(sw) => sw.encode(src, dst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: [f32; 11] = [
        0.0, -0.0, 1.0, -1.0, 0.5, 65504.0, 1.0e-7, 0.333_333_34, 0.1, 70000.0, -2.5,
    ];

    #[test]
    fn test_software_known_values() {
        let mut out = [0u16; 4];
        SoftwareHalf.encode(&[0.0, 1.0, -2.0, 65504.0], &mut out);
        assert_eq!(out, [0x0000, 0x3c00, 0xc000, 0x7bff]);
    }

    #[test]
    fn test_software_overflow_is_infinite() {
        let mut out = [0u16; 1];
        SoftwareHalf.encode(&[70000.0], &mut out);
        assert_eq!(out[0], 0x7c00);
    }

    #[test]
    fn test_hardware_matches_software() {
        let Some(hw) = F16cHalf::detect() else {
            return;
        };

        let mut expected = [0u16; SAMPLES.len()];
        let mut actual = [0u16; SAMPLES.len()];
        SoftwareHalf.encode(&SAMPLES, &mut expected);
        hw.encode(&SAMPLES, &mut actual);
        assert_eq!(expected, actual);
    }

    #[test]
    fn test_hardware_tail_lengths() {
        let Some(hw) = F16cHalf::detect() else {
            return;
        };

        for len in 1..=SAMPLES.len() {
            let mut expected = vec![0u16; len];
            let mut actual = vec![0u16; len];
            SoftwareHalf.encode(&SAMPLES[..len], &mut expected);
            hw.encode(&SAMPLES[..len], &mut actual);
            assert_eq!(expected, actual, "length {len}");
        }
    }

    #[test]
    fn test_select_software() {
        let backend = HalfBackend::select(HalfPreference::Software).expect("software");
        assert!(!backend.is_hardware());
        assert_eq!(backend.name(), "software");
    }

    #[test]
    fn test_select_hardware_matches_cpu() {
        let result = HalfBackend::select(HalfPreference::Hardware);
        assert_eq!(result.is_ok(), cpu_supports_f16c());
    }

    #[test]
    fn test_select_auto_matches_cpu() {
        let backend = HalfBackend::select(HalfPreference::Auto).expect("auto");
        assert_eq!(backend.is_hardware(), cpu_supports_f16c());
    }
}
