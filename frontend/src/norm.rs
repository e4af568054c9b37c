//! Cepstral mean normalization and automatic gain control.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Frames after which the running CMN window is decayed.
const CMN_WIN_HWM: usize = 800;
/// Window size the accumulator decays back to.
const CMN_WIN: usize = 500;

/// Front-end dependent prior for C0 before any data is seen.
const INITIAL_C0_MEAN: f32 = 12.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmnMode {
    None,
    /// Whole-utterance mean (and optionally variance) normalization.
    Current,
    /// Streaming normalization against a running prior mean.
    Prior,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgcMode {
    None,
    /// Shift C0 so the utterance max is 0.
    Max,
    /// Subtract a cross-utterance decaying max estimate.
    Emax,
    /// Subtract the mean C0 of the quietest frames.
    Noise,
}

/// Cepstral mean normalizer with a fixed vector length.
pub struct Cmn {
    mean: Vec<f32>,
    var: Vec<f32>,
    sum: Vec<f32>,
    nframe: usize,
    veclen: usize,
}

impl Cmn {
    pub fn new(veclen: usize) -> Self {
        let mut mean = vec![0.0; veclen];
        mean[0] = INITIAL_C0_MEAN;
        Self {
            mean,
            var: vec![0.0; veclen],
            sum: vec![0.0; veclen],
            nframe: 0,
            veclen,
        }
    }

    /// Whole-utterance normalization: subtract the utterance mean from every
    /// frame, optionally scaling each dimension to unit variance.
    pub fn calc(&mut self, frames: &mut [Vec<f32>], varnorm: bool) {
        let n = frames.len();
        if n == 0 {
            return;
        }

        self.mean.iter_mut().for_each(|m| *m = 0.0);
        for f in frames.iter() {
            for (m, &v) in self.mean.iter_mut().zip(f.iter()) {
                *m += v;
            }
        }
        for m in self.mean.iter_mut() {
            *m /= n as f32;
        }

        if !varnorm {
            for f in frames.iter_mut() {
                for (v, &m) in f.iter_mut().zip(self.mean.iter()) {
                    *v -= m;
                }
            }
        } else {
            self.var.iter_mut().for_each(|v| *v = 0.0);
            for f in frames.iter() {
                for ((s, &v), &m) in self.var.iter_mut().zip(f.iter()).zip(self.mean.iter()) {
                    *s += (v - m) * (v - m);
                }
            }
            // Inverse stddev, with a floor against constant dimensions.
            for s in self.var.iter_mut() {
                *s = if *s > 0.0 { (n as f32 / *s).sqrt() } else { 1.0 };
            }
            for f in frames.iter_mut() {
                for ((v, &m), &s) in f.iter_mut().zip(self.mean.iter()).zip(self.var.iter()) {
                    *v = (*v - m) * s;
                }
            }
        }
    }

    /// Streaming normalization: subtract the current prior mean from each
    /// frame while accumulating it into the running window.
    pub fn prior(&mut self, frames: &mut [Vec<f32>]) {
        if frames.is_empty() {
            return;
        }

        for f in frames.iter_mut() {
            for ((v, s), &m) in f.iter_mut().zip(self.sum.iter_mut()).zip(self.mean.iter()) {
                *s += *v;
                *v -= m;
            }
            self.nframe += 1;
        }

        if self.nframe > CMN_WIN_HWM {
            self.shift_window();
        }
    }

    /// Folds the accumulated frames into the prior mean; called at utterance
    /// end.
    pub fn prior_update(&mut self) {
        if self.nframe == 0 {
            return;
        }
        for (m, &s) in self.mean.iter_mut().zip(self.sum.iter()) {
            *m = s / self.nframe as f32;
        }
        debug!(c0_mean = self.mean[0], frames = self.nframe, "prior mean updated");
        if self.nframe > CMN_WIN_HWM {
            self.decay();
        }
    }

    fn shift_window(&mut self) {
        for (m, &s) in self.mean.iter_mut().zip(self.sum.iter()) {
            *m = s / self.nframe as f32;
        }
        if self.nframe >= CMN_WIN_HWM {
            self.decay();
        }
    }

    /// Exponentially decay the accumulation window back to `CMN_WIN` frames.
    fn decay(&mut self) {
        let sf = CMN_WIN as f32 / self.nframe as f32;
        for s in self.sum.iter_mut() {
            *s *= sf;
        }
        self.nframe = CMN_WIN;
    }

    pub fn prior_set(&mut self, vec: &[f32]) {
        for ((m, s), &v) in self.mean.iter_mut().zip(self.sum.iter_mut()).zip(vec.iter()) {
            *m = v;
            *s = v * CMN_WIN as f32;
        }
        self.nframe = CMN_WIN;
    }

    pub fn prior_get(&self) -> &[f32] {
        &self.mean
    }

    /// Back to the initial state. Idempotent.
    pub fn reset(&mut self) {
        self.mean.iter_mut().for_each(|m| *m = 0.0);
        self.mean[0] = INITIAL_C0_MEAN;
        self.sum.iter_mut().for_each(|s| *s = 0.0);
        self.var.iter_mut().for_each(|v| *v = 0.0);
        self.nframe = 0;
    }

    pub fn veclen(&self) -> usize {
        self.veclen
    }
}

/// C0 gain control with per-utterance and cross-utterance estimators.
pub struct Agc {
    /// Estimated max for the current utterance (Emax mode).
    max: f32,
    obs_max: f32,
    obs_frame: bool,
    obs_utt: u32,
    obs_max_sum: f32,
    noise_thresh: f32,
}

impl Default for Agc {
    fn default() -> Self {
        Self::new()
    }
}

impl Agc {
    pub fn new() -> Self {
        Self {
            max: 0.0,
            obs_max: -1000.0,
            obs_frame: false,
            obs_utt: 0,
            obs_max_sum: 0.0,
            noise_thresh: 2.0,
        }
    }

    pub fn emax_get(&self) -> f32 {
        self.max
    }

    pub fn emax_set(&mut self, m: f32) {
        self.max = m;
    }

    pub fn set_threshold(&mut self, threshold: f32) {
        self.noise_thresh = threshold;
    }

    /// Shift C0 so that its utterance max is exactly 0.
    pub fn calc_max(&mut self, frames: &mut [Vec<f32>]) {
        if frames.is_empty() {
            return;
        }
        self.obs_max = frames[0][0];
        for f in frames.iter() {
            if f[0] > self.obs_max {
                self.obs_max = f[0];
                self.obs_frame = true;
            }
        }
        for f in frames.iter_mut() {
            f[0] -= self.obs_max;
        }
    }

    /// Subtract the running max estimate while observing this block's max.
    pub fn emax(&mut self, frames: &mut [Vec<f32>]) {
        for f in frames.iter_mut() {
            if f[0] > self.obs_max {
                self.obs_max = f[0];
                self.obs_frame = true;
            }
            f[0] -= self.max;
        }
    }

    /// Fold the observed utterance max into the estimate for the next
    /// utterance; the history is halved every 8 utterances.
    pub fn emax_update(&mut self) {
        if self.obs_frame {
            self.obs_max_sum += self.obs_max;
            self.obs_utt += 1;
            self.max = self.obs_max_sum / self.obs_utt as f32;
            if self.obs_utt == 8 {
                self.obs_max_sum /= 2.0;
                self.obs_utt = 4;
            }
            debug!(max = self.max, utts = self.obs_utt, "emax updated");
        }
        self.obs_frame = false;
        self.obs_max = -1000.0;
    }

    /// Subtract the mean C0 of frames within `noise_thresh` of the
    /// utterance minimum.
    pub fn noise(&mut self, frames: &mut [Vec<f32>]) {
        if frames.is_empty() {
            return;
        }
        let mut min_energy = frames[0][0];
        for f in frames.iter() {
            min_energy = min_energy.min(f[0]);
        }
        min_energy += self.noise_thresh;

        let mut level = 0.0;
        let mut count = 0usize;
        for f in frames.iter() {
            if f[0] < min_energy {
                level += f[0];
                count += 1;
            }
        }
        if count == 0 {
            return;
        }
        level /= count as f32;

        for f in frames.iter_mut() {
            f[0] -= level;
        }
    }

    /// Back to the initial state, keeping the noise threshold. Idempotent.
    pub fn reset(&mut self) {
        let thresh = self.noise_thresh;
        *self = Self::new();
        self.noise_thresh = thresh;
    }
}
