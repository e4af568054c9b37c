//! Continuous voice-activity segmentation.
//!
//! [`Segmenter`] consumes a raw 16-bit PCM stream and hands back alternating
//! speech and silence spans, with silence dropped by default. Detection is
//! energy based: each 16 ms frame gets a dB-scale power estimate, a decaying
//! power histogram tracks the background noise floor, and a sliding analysis
//! window applies hysteresis so that isolated loud or quiet frames do not
//! flip the state.
//!
//! The caller pushes audio with [`Segmenter::feed`] and pulls spans with
//! [`Segmenter::read`]; no thread or callback is involved.

mod error;
mod segmenter;

pub use error::VadError;
pub use segmenter::{Segmenter, Span, SpanKind, VadConfig};
