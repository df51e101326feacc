//! Output pixel formats and capability query

use std::fmt;

/// Pixel formats a host may offer for output slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostPixelFormat {
    /// 8-bit RGB
    Rgb24,
    /// 16-bit integer RGB
    Rgb48,
    /// 16-bit half-float RGB, interleaved per pixel
    Rgb48Half,
    /// 16-bit half-float RGBA
    Rgba64Half,
}

impl HostPixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb24 => 3,
            Self::Rgb48 | Self::Rgb48Half => 6,
            Self::Rgba64Half => 8,
        }
    }
}

impl fmt::Display for HostPixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Rgb24 => "RGB 8-bit",
            Self::Rgb48 => "RGB 16-bit",
            Self::Rgb48Half => "RGB 16-bit half float",
            Self::Rgba64Half => "RGBA 16-bit half float",
        };
        f.write_str(name)
    }
}

/// The one output format this plugin produces
pub const SUPPORTED_OUTPUT_FORMAT: HostPixelFormat = HostPixelFormat::Rgb48Half;

/// Input clips the plugin consumes; it only generates
pub const INPUT_CLIP_COUNT: usize = 0;

/// Output slot the converted frame is written to
pub const OUTPUT_SLOT: usize = 1;

/// Formats to advertise to the host
pub fn supported_output_formats() -> &'static [HostPixelFormat] {
    &[SUPPORTED_OUTPUT_FORMAT]
}

pub fn is_output_format_supported(format: HostPixelFormat) -> bool {
    format == SUPPORTED_OUTPUT_FORMAT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_rgb_half_supported() {
        assert_eq!(supported_output_formats(), &[HostPixelFormat::Rgb48Half]);
        assert!(is_output_format_supported(HostPixelFormat::Rgb48Half));
        assert!(!is_output_format_supported(HostPixelFormat::Rgb48));
        assert!(!is_output_format_supported(HostPixelFormat::Rgba64Half));
        assert_eq!(INPUT_CLIP_COUNT, 0);
    }

    #[test]
    fn test_bytes_per_pixel() {
        assert_eq!(SUPPORTED_OUTPUT_FORMAT.bytes_per_pixel(), 6);
        assert_eq!(HostPixelFormat::Rgb24.bytes_per_pixel(), 3);
    }
}
