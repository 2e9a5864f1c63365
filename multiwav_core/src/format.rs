//! Output sample formats and the conversions between them.
//!
//! Samples travel through the engine as `f64` values normalised to
//! `[-1.0, 1.0)`. Every integer PCM width up to 32 bits and both IEEE float
//! widths fit into an `f64` mantissa, so reading and writing the same width
//! never alters a sample.

use std::fmt;
use std::str::FromStr;

/// Sample encodings available for extracted files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SampleFormat {
    Pcm16,
    #[default]
    Pcm24,
    Pcm32,
    Float,
    Double,
}

impl SampleFormat {
    /// All formats in the order they are offered to users.
    pub const ALL: [SampleFormat; 5] = [
        SampleFormat::Pcm16,
        SampleFormat::Pcm24,
        SampleFormat::Pcm32,
        SampleFormat::Float,
        SampleFormat::Double,
    ];

    /// Width of one sample on disk. This table drives the rotation capacity.
    pub fn bytes_per_sample(self) -> u64 {
        match self {
            SampleFormat::Pcm16 => 2,
            SampleFormat::Pcm24 => 3,
            SampleFormat::Pcm32 => 4,
            SampleFormat::Float => 4,
            SampleFormat::Double => 8,
        }
    }

    pub fn bits_per_sample(self) -> u16 {
        (self.bytes_per_sample() * 8) as u16
    }

    pub fn is_float(self) -> bool {
        matches!(self, SampleFormat::Float | SampleFormat::Double)
    }

    pub fn name(self) -> &'static str {
        match self {
            SampleFormat::Pcm16 => "PCM_16",
            SampleFormat::Pcm24 => "PCM_24",
            SampleFormat::Pcm32 => "PCM_32",
            SampleFormat::Float => "FLOAT",
            SampleFormat::Double => "DOUBLE",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returned when a format name is not one of [`SampleFormat::ALL`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSampleFormat(pub String);

impl fmt::Display for UnknownSampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown sample format '{}' (expected one of PCM_16, PCM_24, PCM_32, FLOAT, DOUBLE)",
            self.0
        )
    }
}

impl std::error::Error for UnknownSampleFormat {}

impl FromStr for SampleFormat {
    type Err = UnknownSampleFormat;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        SampleFormat::ALL
            .into_iter()
            .find(|format| format.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownSampleFormat(value.to_owned()))
    }
}

/// Scale factor between a normalised sample and a signed integer of `bits` width.
pub(crate) fn int_scale(bits: u16) -> f64 {
    (1u64 << (bits - 1)) as f64
}

/// Convert a signed integer PCM sample to the normalised representation.
pub(crate) fn int_to_sample(value: i32, bits: u16) -> f64 {
    f64::from(value) / int_scale(bits)
}

/// Convert a normalised sample to a signed integer PCM sample, rounding to the
/// nearest step and clipping to the representable range.
pub(crate) fn sample_to_int(sample: f64, bits: u16) -> i32 {
    let scale = int_scale(bits);
    let scaled = (sample * scale).round();
    scaled.clamp(-scale, scale - 1.0) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_widths_match_format_table() {
        let widths: Vec<u64> = SampleFormat::ALL
            .iter()
            .map(|f| f.bytes_per_sample())
            .collect();
        assert_eq!(widths, vec![2, 3, 4, 4, 8]);
    }

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("pcm_16".parse::<SampleFormat>(), Ok(SampleFormat::Pcm16));
        assert_eq!("Double".parse::<SampleFormat>(), Ok(SampleFormat::Double));
        assert_eq!(" FLOAT ".parse::<SampleFormat>(), Ok(SampleFormat::Float));
        assert!("PCM_8".parse::<SampleFormat>().is_err());
    }

    #[test]
    fn default_is_pcm24() {
        assert_eq!(SampleFormat::default(), SampleFormat::Pcm24);
    }

    #[test]
    fn integer_samples_survive_conversion() {
        for bits in [16u16, 24, 32] {
            let max = (int_scale(bits) - 1.0) as i32;
            let min = -(int_scale(bits) as i64) as i32;
            for value in [min, -12_345, -1, 0, 1, 12_345, max] {
                assert_eq!(sample_to_int(int_to_sample(value, bits), bits), value);
            }
        }
    }

    #[test]
    fn out_of_range_samples_are_clipped() {
        assert_eq!(sample_to_int(1.5, 16), i16::MAX as i32);
        assert_eq!(sample_to_int(-2.0, 16), i16::MIN as i32);
        assert_eq!(sample_to_int(1.0, 32), i32::MAX);
    }
}
