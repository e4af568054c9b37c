use serde::{Deserialize, Serialize};
use sona_dsp::Warp;

/// Cepstral transform applied to the log mel spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transform {
    /// Classic non-unitary DCT with half-weight first band.
    Legacy,
    /// Unitary DCT-II.
    Dct2,
    /// Unitary DCT-II with HTK C0 scaling.
    Htk,
}

/// What each output frame contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpectrumMode {
    /// Cepstra via the configured [`Transform`]. The usual mode.
    Cepstral,
    /// The log mel spectrum itself, `num_filters` wide.
    RawLog,
    /// Log mel spectrum smoothed through a DCT-II/DCT-III round trip.
    SmoothLog,
}

/// Front-end parameters. The defaults are the standard wideband setup:
/// 16 kHz, 100 frames/s, 25.625 ms Hamming window, 512-point FFT, 40 mel
/// filters, 13 cepstra.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontendConfig {
    pub sample_rate: f64,
    /// Output frames per second.
    pub frame_rate: u32,
    /// Analysis window length in seconds.
    pub window_length: f64,
    pub fft_size: usize,
    pub num_filters: usize,
    pub num_cepstra: usize,
    /// Lower edge of the mel filter bank, Hz.
    pub lower_freq: f64,
    /// Upper edge of the mel filter bank, Hz.
    pub upper_freq: f64,
    /// Pre-emphasis coefficient, 0 disables.
    pub pre_emphasis_alpha: f64,
    /// Subtract the frame DC mean before windowing.
    pub remove_dc: bool,
    /// Add half-bit dither to the input samples.
    pub dither: bool,
    /// Dither RNG seed.
    pub seed: u64,
    /// Run the spectral noise suppressor on the mel spectrum.
    pub remove_noise: bool,
    /// HTK-style lifter length, 0 disables.
    pub lifter: usize,
    pub transform: Transform,
    pub spectrum: SpectrumMode,
    pub warp: Warp,
    pub doublewide_filters: bool,
    pub unit_area: bool,
    pub round_filters: bool,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000.0,
            frame_rate: 100,
            window_length: 0.025625,
            fft_size: 512,
            num_filters: 40,
            num_cepstra: 13,
            lower_freq: 133.33334,
            upper_freq: 6855.4976,
            pre_emphasis_alpha: 0.97,
            remove_dc: false,
            dither: false,
            seed: 0,
            remove_noise: false,
            lifter: 0,
            transform: Transform::Legacy,
            spectrum: SpectrumMode::Cepstral,
            warp: Warp::None,
            doublewide_filters: false,
            unit_area: false,
            round_filters: false,
        }
    }
}

impl FrontendConfig {
    /// Samples between successive frames.
    pub fn frame_shift(&self) -> usize {
        (self.sample_rate / self.frame_rate as f64 + 0.5) as usize
    }

    /// Samples in one analysis window.
    pub fn frame_size(&self) -> usize {
        (self.window_length * self.sample_rate + 0.5) as usize
    }

    /// Values per output frame.
    pub fn output_dim(&self) -> usize {
        match self.spectrum {
            SpectrumMode::Cepstral => self.num_cepstra,
            SpectrumMode::RawLog | SpectrumMode::SmoothLog => self.num_filters,
        }
    }
}
