//! Numeric kernels for the acoustic front end.
//!
//! This crate holds the leaf signal-processing pieces that the streaming
//! front end is built from:
//!
//! - [`fft`]: in-place real-input FFT with precomputed twiddle tables
//! - [`window`]: Hamming windowing and pre-emphasis
//! - [`mel`]: triangular mel filter bank, DCT-II/III bases, liftering
//! - [`dither`]: per-stream seeded amplitude dither
//!
//! Everything here is pure computation: no I/O, no hidden global state.
//! Tables (twiddle factors, window halves, filter coefficients, cosine
//! bases) are built once at construction and reused per frame.

mod dither;
mod error;
pub mod fft;
pub mod mel;
pub mod window;

pub use dither::Dither;
pub use error::DspError;
pub use fft::RealFft;
pub use mel::{MelBank, MelConfig, Warp};
pub use window::{pre_emphasis, samples_to_frame, HammingWindow};
