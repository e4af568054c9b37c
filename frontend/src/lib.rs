//! Streaming acoustic front end: raw PCM in, feature vectors out.
//!
//! The pipeline is caller-driven and synchronous. A typical loop gates
//! audio through a `sona_vad::Segmenter`, turns each speech span into
//! cepstra with [`FrontEnd`], and composes model-ready features with
//! [`FeatureAssembler`]:
//!
//! ```no_run
//! use sona_frontend::{
//!     AgcMode, CmnMode, FeatureAssembler, FeatureScheme, FrontEnd, FrontendConfig,
//! };
//!
//! # fn main() -> Result<(), sona_frontend::FrontendError> {
//! let mut fe = FrontEnd::new(FrontendConfig::default())?;
//! let mut fa = FeatureAssembler::new(
//!     FeatureScheme::S3_1x39,
//!     CmnMode::Prior,
//!     false,
//!     AgcMode::None,
//!     13,
//! )?;
//!
//! let speech: Vec<i16> = vec![0; 16_000]; // one gated speech span
//! fe.start_utt();
//! let mut cep = fe.process_utt(&speech)?;
//! let mut tail = vec![0.0f32; fe.output_dim()];
//! if fe.end_utt(&mut tail)? == 1 {
//!     cep.push(tail);
//! }
//! let features = fa.process_block(&mut cep)?;
//! # let _ = features;
//! # Ok(())
//! # }
//! ```
//!
//! For lower latency, feed [`FrontEnd::process_frames`] and
//! [`FeatureAssembler::process_live`] with whatever chunk sizes arrive; the
//! output is identical to block processing.

mod config;
mod error;
mod feat;
mod frontend;
mod noise;
mod norm;

#[cfg(test)]
mod tests;

pub use config::{FrontendConfig, SpectrumMode, Transform};
pub use sona_dsp::Warp;
pub use error::FrontendError;
pub use feat::{FeatureAssembler, FeatureScheme, LinearTransform};
pub use frontend::FrontEnd;
pub use noise::NoiseSuppressor;
pub use norm::{Agc, AgcMode, Cmn, CmnMode};
