use thiserror::Error;

#[derive(Debug, Error)]
pub enum VadError {
    #[error("invalid segmenter parameters: {0}")]
    InvalidConfig(String),

    #[error("output buffer holds {got} samples, need at least one frame ({need})")]
    BufferTooSmall { need: usize, got: usize },

    #[error("calibration needs {need} samples, got {got}")]
    ShortCalibration { need: usize, got: usize },

    #[error("estimated noise floor {level} dB outside [{min}, {max}], check the input channel")]
    BadSignal { level: u32, min: u32, max: u32 },
}
