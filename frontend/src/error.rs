use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error("invalid front-end parameters: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Dsp(#[from] sona_dsp::DspError),

    #[error("output buffer holds {got} values, need {need}")]
    OutputTooSmall { need: usize, got: usize },

    #[error("cepstral frame has {got} values, expected {expected}")]
    BadFrameSize { expected: usize, got: usize },

    #[error("invalid feature transform: {0}")]
    InvalidTransform(String),

    #[error("invalid subvector specification: {0}")]
    InvalidSubvectors(String),
}
