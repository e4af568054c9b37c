use thiserror::Error;

/// Errors returned when building DSP tables.
#[derive(Debug, Error)]
pub enum DspError {
    #[error("FFT size must be a power of two, got {0}")]
    FftSizeNotPowerOfTwo(usize),

    #[error("filter frequencies {lower}..{upper} Hz outside valid range 0..{nyquist} Hz")]
    FilterRange {
        lower: f32,
        upper: f32,
        nyquist: f32,
    },

    #[error("inconsistent sizes: {0}")]
    BadSize(String),
}
