//! Triangular mel filter bank, cosine transform bases and liftering.
//!
//! The filter bank is stored in the compact layout used by the classic
//! front ends: per filter, a start index into the power spectrum, a width
//! in DFT points and a slice into one flattened coefficient array. The
//! cosine (DCT) basis and optional lifter weights are precomputed alongside.

use std::f64::consts::{FRAC_1_SQRT_2, PI};

use serde::{Deserialize, Serialize};

use crate::error::DspError;

/// Frequency-axis warping applied inside the Hz<->mel conversion (VTLN).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Warp {
    /// No warping.
    None,
    /// `w' = w / a`.
    InverseLinear { a: f64 },
    /// `w' = a * w + b`.
    Affine { a: f64, b: f64 },
    /// Linear with slope `a` below the breakpoint `f`, then a straight
    /// piece mapping Nyquist onto Nyquist.
    PiecewiseLinear { a: f64, f: f64 },
}

impl Warp {
    fn unwarped_to_warped(&self, linear: f64, nyquist: f64) -> f64 {
        match *self {
            Warp::None => linear,
            Warp::InverseLinear { a } => linear / a,
            Warp::Affine { a, b } => linear * a + b,
            Warp::PiecewiseLinear { a, f } => {
                if linear < f {
                    linear * a
                } else {
                    let (fa, fb) = Self::final_piece(a, f, nyquist);
                    fa * linear + fb
                }
            }
        }
    }

    fn warped_to_unwarped(&self, nonlinear: f64, nyquist: f64) -> f64 {
        match *self {
            Warp::None => nonlinear,
            Warp::InverseLinear { a } => nonlinear * a,
            Warp::Affine { a, b } => (nonlinear - b) / a,
            Warp::PiecewiseLinear { a, f } => {
                if nonlinear < a * f {
                    nonlinear / a
                } else {
                    let (fa, fb) = Self::final_piece(a, f, nyquist);
                    (nonlinear - fb) / fa
                }
            }
        }
    }

    /// Coefficients of the straight line through (f, a*f) and (nyq, nyq).
    fn final_piece(a: f64, f: f64, nyquist: f64) -> (f64, f64) {
        let fa = (nyquist - a * f) / (nyquist - f);
        let fb = nyquist * f * (a - 1.0) / (nyquist - f);
        (fa, fb)
    }
}

/// Filter bank construction parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MelConfig {
    /// Input sample rate in Hz (default: 16000).
    pub sample_rate: f64,
    /// FFT analysis size (default: 512).
    pub fft_size: usize,
    /// Number of triangular filters (default: 40).
    pub num_filters: usize,
    /// Number of cepstral coefficients (default: 13).
    pub num_cepstra: usize,
    /// Lower edge of the filter bank in Hz (default: 133.33334).
    pub lower_freq: f64,
    /// Upper edge of the filter bank in Hz (default: 6855.4976).
    pub upper_freq: f64,
    /// Frequency warping (default: none).
    pub warp: Warp,
    /// Double-width filters spanning two bands (default: false).
    pub doublewide: bool,
    /// Normalize each filter to unit area (default: false).
    pub unit_area: bool,
    /// Round filter edges to DFT points; legacy behaviour (default: false).
    pub round_filters: bool,
    /// HTK-style lifter length, 0 disables liftering (default: 0).
    pub lifter: usize,
}

impl Default for MelConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000.0,
            fft_size: 512,
            num_filters: 40,
            num_cepstra: 13,
            lower_freq: 133.33334,
            upper_freq: 6855.4976,
            warp: Warp::None,
            doublewide: false,
            unit_area: false,
            round_filters: false,
            lifter: 0,
        }
    }
}

/// Immutable filter bank plus transform tables, built once per stream
/// configuration.
pub struct MelBank {
    num_filters: usize,
    num_cepstra: usize,
    /// Start of each filter in the power spectrum.
    spec_start: Vec<usize>,
    /// Width of each filter in DFT points.
    filt_width: Vec<usize>,
    /// Start of each filter in `coeffs`.
    filt_start: Vec<usize>,
    /// Flattened triangular weights.
    coeffs: Vec<f64>,
    /// `num_cepstra x num_filters` cosine basis.
    cosine: Vec<Vec<f64>>,
    sqrt_inv_n: f64,
    sqrt_inv_2n: f64,
    lifter: Option<Vec<f32>>,
}

impl MelBank {
    pub fn new(cfg: &MelConfig) -> Result<Self, DspError> {
        let nyquist = cfg.sample_rate / 2.0;
        if cfg.lower_freq < 0.0 || cfg.upper_freq > nyquist || cfg.lower_freq >= cfg.upper_freq {
            return Err(DspError::FilterRange {
                lower: cfg.lower_freq as f32,
                upper: cfg.upper_freq as f32,
                nyquist: nyquist as f32,
            });
        }
        if cfg.num_filters == 0 || cfg.num_cepstra == 0 {
            return Err(DspError::BadSize("zero filters or cepstra".into()));
        }
        if cfg.num_cepstra > cfg.num_filters {
            return Err(DspError::BadSize(format!(
                "num_cepstra {} exceeds num_filters {}",
                cfg.num_cepstra, cfg.num_filters
            )));
        }
        if !cfg.fft_size.is_power_of_two() {
            return Err(DspError::FftSizeNotPowerOfTwo(cfg.fft_size));
        }

        let mel = |hz: f64| {
            let warped = cfg.warp.unwarped_to_warped(hz, nyquist);
            2595.0 * (1.0 + warped / 700.0).log10()
        };
        let mel_inv = |m: f64| {
            let warped = 700.0 * (10f64.powf(m / 2595.0) - 1.0);
            cfg.warp.warped_to_unwarped(warped, nyquist)
        };

        let mut mel_min = mel(cfg.lower_freq);
        let mut mel_max = mel(cfg.upper_freq);
        let mel_bw = (mel_max - mel_min) / (cfg.num_filters + 1) as f64;
        if cfg.doublewide {
            mel_min -= mel_bw;
            mel_max += mel_bw;
            if mel_inv(mel_min) < 0.0 || mel_inv(mel_max) > nyquist {
                return Err(DspError::FilterRange {
                    lower: mel_inv(mel_min) as f32,
                    upper: mel_inv(mel_max) as f32,
                    nyquist: nyquist as f32,
                });
            }
        }

        // DFT point spacing.
        let fft_freq = cfg.sample_rate / cfg.fft_size as f64;
        let half = cfg.fft_size / 2;

        // Left/center/right edges in Hz for filter i.
        let edges = |i: usize| -> [f64; 3] {
            let mut freqs = [0.0f64; 3];
            for (j, fr) in freqs.iter_mut().enumerate() {
                let step = if cfg.doublewide { j * 2 } else { j };
                *fr = mel_inv((i + step) as f64 * mel_bw + mel_min);
                if cfg.round_filters {
                    *fr = (*fr / fft_freq + 0.5).floor() * fft_freq;
                }
            }
            freqs
        };

        let mut spec_start = vec![0usize; cfg.num_filters];
        let mut filt_width = vec![0usize; cfg.num_filters];
        let mut filt_start = vec![0usize; cfg.num_filters];
        let mut coeffs = Vec::new();

        for i in 0..cfg.num_filters {
            let freqs = edges(i);
            let mut start = None;
            for j in 0..=half {
                let hz = j as f64 * fft_freq;
                if hz < freqs[0] {
                    continue;
                }
                if hz > freqs[2] || j == half {
                    let s = start.ok_or_else(|| {
                        DspError::BadSize(format!("filter {i} covers no DFT point"))
                    })?;
                    spec_start[i] = s;
                    filt_width[i] = j - s;
                    filt_start[i] = coeffs.len();
                    break;
                }
                if start.is_none() {
                    start = Some(j);
                }
            }

            for j in 0..filt_width[i] {
                let hz = (spec_start[i] + j) as f64 * fft_freq;
                let mut lo = (hz - freqs[0]) / (freqs[1] - freqs[0]);
                let mut hi = (freqs[2] - hz) / (freqs[2] - freqs[1]);
                if cfg.unit_area {
                    lo *= 2.0 / (freqs[2] - freqs[0]);
                    hi *= 2.0 / (freqs[2] - freqs[0]);
                }
                coeffs.push(lo.min(hi));
            }
        }

        // Cosine basis; the first row is all ones but kept for clarity.
        let freq_step = PI / cfg.num_filters as f64;
        let cosine: Vec<Vec<f64>> = (0..cfg.num_cepstra)
            .map(|i| {
                (0..cfg.num_filters)
                    .map(|j| (freq_step * i as f64 * (j as f64 + 0.5)).cos())
                    .collect()
            })
            .collect();

        let lifter = if cfg.lifter > 0 {
            let l = cfg.lifter as f64;
            Some(
                (0..cfg.num_cepstra)
                    .map(|i| (1.0 + (PI * i as f64 / l).sin() * l / 2.0) as f32)
                    .collect(),
            )
        } else {
            None
        };

        Ok(Self {
            num_filters: cfg.num_filters,
            num_cepstra: cfg.num_cepstra,
            spec_start,
            filt_width,
            filt_start,
            coeffs,
            cosine,
            sqrt_inv_n: (cfg.num_filters as f64).sqrt().recip(),
            sqrt_inv_2n: (cfg.num_filters as f64 * 0.5).sqrt().recip(),
            lifter,
        })
    }

    pub fn num_filters(&self) -> usize {
        self.num_filters
    }

    pub fn num_cepstra(&self) -> usize {
        self.num_cepstra
    }

    /// Projects a power spectrum onto the filter bank.
    pub fn apply(&self, power: &[f64], mel_out: &mut [f64]) {
        debug_assert_eq!(mel_out.len(), self.num_filters);
        for i in 0..self.num_filters {
            let s = self.spec_start[i];
            let c = self.filt_start[i];
            let w = self.filt_width[i];
            mel_out[i] = power[s..s + w]
                .iter()
                .zip(&self.coeffs[c..c + w])
                .map(|(p, k)| p * k)
                .sum();
        }
    }

    /// Legacy cepstral transform: C0 uses half weight on the first band and
    /// the result is scaled by `1/num_filters`.
    pub fn spec_to_cep(&self, log_spec: &[f64], cep: &mut [f32]) {
        let n = self.num_filters as f64;
        let mut c0 = log_spec[0] / 2.0;
        for &v in &log_spec[1..self.num_filters] {
            c0 += v;
        }
        cep[0] = (c0 / n) as f32;

        for i in 1..self.num_cepstra {
            let mut acc = 0.0;
            for j in 0..self.num_filters {
                let w = if j == 0 { 0.5 } else { 1.0 };
                acc += log_spec[j] * self.cosine[i][j] * w;
            }
            cep[i] = (acc / n) as f32;
        }
    }

    /// Unitary DCT-II. With `htk` the C0 normalizer is `sqrt(2/N)` instead
    /// of `sqrt(1/N)`.
    pub fn dct2(&self, log_spec: &[f64], cep: &mut [f32], htk: bool) {
        let mut c0 = 0.0;
        for &v in &log_spec[..self.num_filters] {
            c0 += v;
        }
        cep[0] = (c0 * if htk { self.sqrt_inv_2n } else { self.sqrt_inv_n }) as f32;

        for i in 1..self.num_cepstra {
            let mut acc = 0.0;
            for j in 0..self.num_filters {
                acc += log_spec[j] * self.cosine[i][j];
            }
            cep[i] = (acc * self.sqrt_inv_2n) as f32;
        }
    }

    /// Unitary DCT-III, the inverse of [`MelBank::dct2`]; reconstructs a
    /// smoothed log spectrum from truncated cepstra.
    pub fn dct3(&self, cep: &[f32], log_spec: &mut [f64]) {
        for i in 0..self.num_filters {
            let mut acc = cep[0] as f64 * FRAC_1_SQRT_2;
            for j in 1..self.num_cepstra {
                acc += cep[j] as f64 * self.cosine[j][i];
            }
            log_spec[i] = acc * self.sqrt_inv_2n;
        }
    }

    /// Applies HTK-style liftering in place; no-op when not configured.
    pub fn lifter(&self, cep: &mut [f32]) {
        if let Some(weights) = &self.lifter {
            for (c, &w) in cep.iter_mut().zip(weights.iter()) {
                *c *= w;
            }
        }
    }
}
