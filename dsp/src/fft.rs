//! In-place real-input FFT with precomputed twiddle factors.
//!
//! Decimation-in-time transform after Sorensen et al., "Real-Valued Fast
//! Fourier Transform Algorithms" (IEEE Trans. ASSP 35(6)). The output is
//! packed into the input buffer: slot 0 holds the DC term, slot `n/2` the
//! Nyquist term, and slots `k` / `n-k` the real and imaginary parts of bin
//! `k` for `0 < k < n/2`.

use crate::error::DspError;

/// Real-input FFT of a fixed power-of-two size.
pub struct RealFft {
    size: usize,
    order: u32,
    cos_tab: Vec<f64>,
    sin_tab: Vec<f64>,
}

impl RealFft {
    /// Builds twiddle tables for an FFT of the given size.
    pub fn new(size: usize) -> Result<Self, DspError> {
        if size < 4 || !size.is_power_of_two() {
            return Err(DspError::FftSizeNotPowerOfTwo(size));
        }
        let order = size.trailing_zeros();
        let quarter = size / 4;
        let mut cos_tab = Vec::with_capacity(quarter);
        let mut sin_tab = Vec::with_capacity(quarter);
        for i in 0..quarter {
            let a = 2.0 * std::f64::consts::PI * i as f64 / size as f64;
            cos_tab.push(a.cos());
            sin_tab.push(a.sin());
        }
        Ok(Self {
            size,
            order,
            cos_tab,
            sin_tab,
        })
    }

    /// FFT size in points.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of power-spectrum bins (`size/2 + 1`).
    pub fn num_bins(&self) -> usize {
        self.size / 2 + 1
    }

    /// Transforms `x` in place. `x.len()` must equal `size`.
    pub fn transform(&self, x: &mut [f64]) {
        debug_assert_eq!(x.len(), self.size);
        let n = self.size;
        let m = self.order as usize;

        // Bit-reverse the input.
        let mut j = 0usize;
        for i in 0..n - 1 {
            if i < j {
                x.swap(i, j);
            }
            let mut k = n / 2;
            while k <= j {
                j -= k;
                k /= 2;
            }
            j += k;
        }

        // Basic 2-point butterflies with real twiddle factors.
        for i in (0..n).step_by(2) {
            let xt = x[i];
            x[i] = xt + x[i + 1];
            x[i + 1] = xt - x[i + 1];
        }

        // The remaining stages.
        for k in 1..m {
            let n4 = k - 1;
            let n2 = k;
            let n1 = k + 1;
            for i in (0..n).step_by(1 << n1) {
                let xt = x[i];
                x[i] = xt + x[i + (1 << n2)];
                x[i + (1 << n2)] = xt - x[i + (1 << n2)];
                x[i + (1 << n2) + (1 << n4)] = -x[i + (1 << n2) + (1 << n4)];

                // Butterflies with complex twiddle factors; symmetry keeps
                // this to four multiplications each.
                for j in 1..(1 << n4) {
                    let i1 = i + j;
                    let i2 = i + (1 << n2) - j;
                    let i3 = i + (1 << n2) + j;
                    let i4 = i + (1 << n2) + (1 << n2) - j;

                    let cc = self.cos_tab[j << (m - n1)];
                    let ss = self.sin_tab[j << (m - n1)];

                    let t1 = x[i3] * cc + x[i4] * ss;
                    let t2 = x[i3] * ss - x[i4] * cc;

                    x[i4] = x[i2] - t2;
                    x[i3] = -x[i2] - t2;
                    x[i2] = x[i1] - t1;
                    x[i1] = x[i1] + t1;
                }
            }
        }
    }

    /// Computes the power spectrum (`re^2 + im^2` per bin) from a packed
    /// transform result into `out`, which must hold `size/2 + 1` values.
    /// DC and Nyquist have zero imaginary part.
    pub fn power_spectrum(&self, x: &[f64], out: &mut [f64]) {
        debug_assert_eq!(x.len(), self.size);
        debug_assert_eq!(out.len(), self.num_bins());
        let half = self.size / 2;
        out[0] = x[0] * x[0];
        for j in 1..half {
            out[j] = x[j] * x[j] + x[self.size - j] * x[self.size - j];
        }
        out[half] = x[half] * x[half];
    }
}
