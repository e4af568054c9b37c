//! Spectral noise suppression over the mel spectrum.
//!
//! A smoothed power track feeds an asymmetric low-envelope noise estimate;
//! the excess over the noise is floored, temporally masked, turned into a
//! bounded per-band gain and smoothed across neighbouring bands before being
//! applied.

/// Bands averaged on each side when smoothing gains.
const SMOOTH_WINDOW: usize = 4;
/// Power smoothing factor.
const LAMBDA_POWER: f64 = 0.7;
/// Slow (upward) envelope factor.
const LAMBDA_A: f64 = 0.999;
/// Fast (downward) envelope factor.
const LAMBDA_B: f64 = 0.5;
/// Temporal masking decay.
const LAMBDA_T: f64 = 0.85;
/// Masked-value scale.
const MU_T: f64 = 0.2;
/// Gain clamp; gains stay within [1/MAX_GAIN, MAX_GAIN].
const MAX_GAIN: f64 = 20.0;

pub struct NoiseSuppressor {
    power: Vec<f64>,
    noise: Vec<f64>,
    floor: Vec<f64>,
    peak: Vec<f64>,
    signal: Vec<f64>,
    gain: Vec<f64>,
    /// Seed the trackers from the next frame.
    undefined: bool,
}

impl NoiseSuppressor {
    pub fn new(num_filters: usize) -> Self {
        Self {
            power: vec![0.0; num_filters],
            noise: vec![0.0; num_filters],
            floor: vec![0.0; num_filters],
            peak: vec![0.0; num_filters],
            signal: vec![0.0; num_filters],
            gain: vec![0.0; num_filters],
            undefined: true,
        }
    }

    /// Re-arm first-frame seeding; the next frame redefines all trackers.
    pub fn reset(&mut self) {
        self.undefined = true;
    }

    fn low_envelope(buf: &[f64], floor_buf: &mut [f64]) {
        for (f, &b) in floor_buf.iter_mut().zip(buf) {
            *f = if b >= *f {
                LAMBDA_A * *f + (1.0 - LAMBDA_A) * b
            } else {
                LAMBDA_B * *f + (1.0 - LAMBDA_B) * b
            };
        }
    }

    fn temp_masking(buf: &mut [f64], peak: &mut [f64]) {
        for (b, p) in buf.iter_mut().zip(peak.iter_mut()) {
            let cur = *b;
            *p *= LAMBDA_T;
            if *b < LAMBDA_T * *p {
                *b = *p * MU_T;
            }
            if cur > *p {
                *p = cur;
            }
        }
    }

    /// Multiplies each band by the average gain of its neighbourhood.
    fn weight_smooth(buf: &mut [f64], gains: &[f64]) {
        let n = buf.len();
        for i in 0..n {
            let l1 = i.saturating_sub(SMOOTH_WINDOW);
            let l2 = (i + SMOOTH_WINDOW).min(n - 1);
            let coef: f64 = gains[l1..=l2].iter().sum();
            buf[i] *= coef / (l2 - l1 + 1) as f64;
        }
    }

    /// Suppresses the estimated noise component of one mel spectrum frame,
    /// in place. Values stay non-negative; the applied gain never leaves
    /// `[1/20, 20]` per band.
    pub fn remove_noise(&mut self, mfspec: &mut [f64]) {
        let n = mfspec.len();
        debug_assert_eq!(n, self.power.len());

        if self.undefined {
            for i in 0..n {
                self.power[i] = mfspec[i];
                self.noise[i] = mfspec[i];
                self.floor[i] = mfspec[i] / MAX_GAIN;
                self.peak[i] = 0.0;
            }
            self.undefined = false;
        }

        for i in 0..n {
            self.power[i] = LAMBDA_POWER * self.power[i] + (1.0 - LAMBDA_POWER) * mfspec[i];
        }

        Self::low_envelope(&self.power, &mut self.noise);

        for i in 0..n {
            self.signal[i] = (self.power[i] - self.noise[i]).max(0.0);
        }

        Self::low_envelope(&self.signal, &mut self.floor);
        Self::temp_masking(&mut self.signal, &mut self.peak);

        for i in 0..n {
            if self.signal[i] < self.floor[i] {
                self.signal[i] = self.floor[i];
            }
        }

        for i in 0..n {
            self.gain[i] = if self.signal[i] < MAX_GAIN * self.power[i] {
                self.signal[i] / self.power[i]
            } else {
                MAX_GAIN
            };
            if self.gain[i] < 1.0 / MAX_GAIN {
                self.gain[i] = 1.0 / MAX_GAIN;
            }
        }

        Self::weight_smooth(mfspec, &self.gain);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spectrum(seed: u64, n: usize) -> Vec<f64> {
        let mut s = seed;
        (0..n)
            .map(|_| {
                s = s.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                1.0 + (s >> 33) as f64 / 1e7
            })
            .collect()
    }

    #[test]
    fn first_frame_is_heavily_attenuated() {
        // With no history the whole frame is treated as noise; the floor
        // tracker pins the gain near its lower clamp.
        let mut ns = NoiseSuppressor::new(40);
        let mut frame = vec![1000.0; 40];
        ns.remove_noise(&mut frame);
        for &v in &frame {
            assert!((v - 1000.0 / 20.0).abs() < 1.0, "got {v}");
        }
    }

    #[test]
    fn output_stays_within_gain_bounds() {
        let mut ns = NoiseSuppressor::new(40);
        for seed in 1..50u64 {
            let clean = spectrum(seed, 40);
            let mut frame = clean.clone();
            ns.remove_noise(&mut frame);
            for (i, (&out, &inp)) in frame.iter().zip(clean.iter()).enumerate() {
                assert!(out >= inp / 20.0 - 1e-9, "band {i}: {out} below floor");
                assert!(out <= inp * 20.0 + 1e-9, "band {i}: {out} above ceiling");
                assert!(out >= 0.0);
            }
        }
    }

    #[test]
    fn reset_rearms_seeding() {
        let mut ns = NoiseSuppressor::new(8);
        let mut a = vec![10.0; 8];
        ns.remove_noise(&mut a);
        ns.reset();
        let mut b = vec![10.0; 8];
        ns.remove_noise(&mut b);
        assert_eq!(a, b);
    }
}
