//! Windowing and pre-emphasis.

use std::f64::consts::PI;

/// First-order pre-emphasis: `y[n] = x[n] - alpha * x[n-1]`.
///
/// `prior` is the last sample of the previous call, so that streaming
/// invocations are seamless across frame boundaries.
pub fn pre_emphasis(input: &[i16], out: &mut [f64], alpha: f64, prior: i16) {
    debug_assert!(out.len() >= input.len());
    if input.is_empty() {
        return;
    }
    out[0] = input[0] as f64 - prior as f64 * alpha;
    for i in 1..input.len() {
        out[i] = input[i] as f64 - input[i - 1] as f64 * alpha;
    }
}

/// Widens samples into the frame buffer without filtering.
pub fn samples_to_frame(input: &[i16], out: &mut [f64]) {
    for (o, &s) in out.iter_mut().zip(input.iter()) {
        *o = s as f64;
    }
}

/// Symmetric Hamming window; only the first half is stored.
pub struct HammingWindow {
    half: Vec<f64>,
    frame_size: usize,
}

impl HammingWindow {
    pub fn new(frame_size: usize) -> Self {
        let mut half = Vec::with_capacity(frame_size / 2);
        for i in 0..frame_size / 2 {
            half.push(0.54 - 0.46 * (2.0 * PI * i as f64 / (frame_size - 1) as f64).cos());
        }
        Self { half, frame_size }
    }

    /// Applies the window to `frame[..frame_size]` in place, from both ends
    /// simultaneously. Optionally removes the DC mean first.
    pub fn apply(&self, frame: &mut [f64], remove_dc: bool) {
        let n = self.frame_size;
        debug_assert!(frame.len() >= n);

        if remove_dc {
            let mean = frame[..n].iter().sum::<f64>() / n as f64;
            for v in &mut frame[..n] {
                *v -= mean;
            }
        }

        for i in 0..n / 2 {
            frame[i] *= self.half[i];
            frame[n - 1 - i] *= self.half[i];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_is_symmetric() {
        let w = HammingWindow::new(410);
        let mut frame = vec![1.0; 410];
        w.apply(&mut frame, false);
        for i in 0..205 {
            assert!(
                (frame[i] - frame[409 - i]).abs() < 1e-12,
                "asymmetry at {i}"
            );
        }
        // Edges near 0.08, center near 1.
        assert!((frame[0] - 0.08).abs() < 0.01);
        assert!((frame[205] - 1.0).abs() < 0.01);
    }

    #[test]
    fn remove_dc_zeroes_mean() {
        let w = HammingWindow::new(8);
        let mut frame = vec![5.0; 8];
        w.apply(&mut frame, true);
        for &v in &frame {
            assert!(v.abs() < 1e-12);
        }
    }

    #[test]
    fn pre_emphasis_carries_prior() {
        let mut out = vec![0.0; 4];
        pre_emphasis(&[100, 100, 100, 100], &mut out, 0.97, 100);
        for &v in &out {
            assert!((v - 3.0).abs() < 1e-12, "constant input should leave residual 3, got {v}");
        }

        // Without the prior the first sample passes through unattenuated.
        pre_emphasis(&[100, 100], &mut out[..2], 0.97, 0);
        assert!((out[0] - 100.0).abs() < 1e-12);
    }
}
